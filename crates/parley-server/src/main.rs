use clap::Parser;
use parley_agent_loop::contracts::{CredentialProvider, EnvCredentialProvider};
use parley_server::http;
use parley_server::{AppState, LocalToolset, ServerConfig};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "parley-server")]
struct Args {
    #[arg(long, env = "PARLEY_HTTP_ADDR", default_value = "127.0.0.1:8080")]
    http_addr: String,

    /// JSON config file; flags below override its values.
    #[arg(long, env = "PARLEY_CONFIG")]
    config: Option<PathBuf>,

    #[arg(long, env = "PARLEY_MODEL")]
    model: Option<String>,

    #[arg(long, env = "PARLEY_MAX_STEPS")]
    max_steps: Option<usize>,

    /// OpenAI-compatible endpoint for model calls.
    #[arg(long, env = "PARLEY_MODEL_BASE_URL")]
    base_url: Option<String>,
}

fn load_config(args: &Args) -> Result<ServerConfig, parley_server::ConfigError> {
    let mut config = match &args.config {
        Some(path) => ServerConfig::load(path)?,
        None => ServerConfig::default(),
    };
    if let Some(model) = &args.model {
        config.model = model.clone();
    }
    if let Some(max_steps) = args.max_steps {
        config.max_steps = max_steps;
    }
    if let Some(base_url) = &args.base_url {
        config.base_url = Some(base_url.clone());
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    let config = match load_config(&args) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{e}");
            std::process::exit(2);
        }
    };

    let credentials = Arc::new(EnvCredentialProvider::new(&config.api_key_env));
    let toolset = Arc::new(LocalToolset::new(config.collapsible));
    let state = AppState::new(config, credentials.clone(), toolset);

    let app = http::router(state);

    let listener = match tokio::net::TcpListener::bind(&args.http_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("failed to bind {}: {e}", args.http_addr);
            std::process::exit(1);
        }
    };
    tracing::info!(addr = %args.http_addr, "parley server listening");

    let served = axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await;

    credentials.teardown().await;
    if let Err(e) = served {
        tracing::error!(error = %e, "server stopped with error");
        std::process::exit(1);
    }
}
