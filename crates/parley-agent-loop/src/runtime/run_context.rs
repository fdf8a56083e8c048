use futures::future::pending;
use tokio_util::sync::CancellationToken;

/// Cancels a run: fired by the transport when the client goes away.
pub type RunCancellationToken = CancellationToken;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelAware<T> {
    Value(T),
    Cancelled,
}

pub fn is_cancelled(token: Option<&RunCancellationToken>) -> bool {
    token.is_some_and(RunCancellationToken::is_cancelled)
}

pub async fn cancelled(token: Option<&RunCancellationToken>) {
    if let Some(token) = token {
        token.cancelled().await;
    } else {
        pending::<()>().await;
    }
}

pub async fn await_or_cancel<T, F>(token: Option<&RunCancellationToken>, fut: F) -> CancelAware<T>
where
    F: std::future::Future<Output = T>,
{
    if let Some(token) = token {
        tokio::select! {
            _ = token.cancelled() => CancelAware::Cancelled,
            value = fut => CancelAware::Value(value),
        }
    } else {
        CancelAware::Value(fut.await)
    }
}
