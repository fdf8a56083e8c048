//! Credential provider handed to collaborators at construction time.
//!
//! Acquisition, refresh and teardown are part of the provider's contract, so
//! nothing in the engine holds ambient auth state.

use async_trait::async_trait;
use std::sync::RwLock;
use thiserror::Error;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CredentialError {
    #[error("missing credential: {0}")]
    Missing(String),

    #[error("credential refresh failed: {0}")]
    RefreshFailed(String),
}

/// An opaque secret. `Debug` never prints the value.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    secret: String,
}

impl Credential {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            secret: secret.into(),
        }
    }

    pub fn expose(&self) -> &str {
        &self.secret
    }
}

impl std::fmt::Debug for Credential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credential").field("secret", &"<redacted>").finish()
    }
}

#[async_trait]
pub trait CredentialProvider: Send + Sync {
    /// Obtain a credential for the current turn.
    async fn acquire(&self) -> Result<Credential, CredentialError>;

    /// Obtain a fresh credential after the previous one was rejected.
    async fn refresh(&self) -> Result<Credential, CredentialError> {
        self.acquire().await
    }

    /// Drop anything cached by the provider.
    async fn teardown(&self) {}
}

/// Reads a credential from an environment variable, caching it after the first read.
#[derive(Debug)]
pub struct EnvCredentialProvider {
    var: String,
    cached: RwLock<Option<Credential>>,
}

impl EnvCredentialProvider {
    pub fn new(var: impl Into<String>) -> Self {
        Self {
            var: var.into(),
            cached: RwLock::new(None),
        }
    }

    pub fn var(&self) -> &str {
        &self.var
    }

    fn read_env(&self) -> Result<Credential, CredentialError> {
        match std::env::var(&self.var) {
            Ok(value) if !value.trim().is_empty() => Ok(Credential::new(value)),
            _ => Err(CredentialError::Missing(self.var.clone())),
        }
    }
}

#[async_trait]
impl CredentialProvider for EnvCredentialProvider {
    async fn acquire(&self) -> Result<Credential, CredentialError> {
        if let Ok(guard) = self.cached.read() {
            if let Some(credential) = guard.as_ref() {
                return Ok(credential.clone());
            }
        }
        let credential = self.read_env()?;
        if let Ok(mut guard) = self.cached.write() {
            *guard = Some(credential.clone());
        }
        Ok(credential)
    }

    async fn refresh(&self) -> Result<Credential, CredentialError> {
        let credential = self
            .read_env()
            .map_err(|e| CredentialError::RefreshFailed(e.to_string()))?;
        if let Ok(mut guard) = self.cached.write() {
            *guard = Some(credential.clone());
        }
        Ok(credential)
    }

    async fn teardown(&self) {
        if let Ok(mut guard) = self.cached.write() {
            guard.take();
        }
    }
}

/// Provider with a fixed value, for embedding and tests.
#[derive(Debug, Clone)]
pub struct StaticCredentialProvider {
    credential: Option<Credential>,
}

impl StaticCredentialProvider {
    pub fn new(secret: impl Into<String>) -> Self {
        Self {
            credential: Some(Credential::new(secret)),
        }
    }

    pub fn missing() -> Self {
        Self { credential: None }
    }
}

#[async_trait]
impl CredentialProvider for StaticCredentialProvider {
    async fn acquire(&self) -> Result<Credential, CredentialError> {
        self.credential
            .clone()
            .ok_or_else(|| CredentialError::Missing("static credential".to_string()))
    }
}
