use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use parley_agent_loop::contracts::{Credential, CredentialProvider, Tool};
use parley_agent_loop::{AgentConfig, GenaiLlmExecutor, LlmExecutor, RegistryError, ToolRegistry};
use parley_extension_collapsible::CollapsibleTool;
use std::sync::Arc;

use crate::config::ServerConfig;

/// Builds the tool registry for one turn.
///
/// Called per request so sources that hold resources (connections, processes)
/// are scoped to the turn and released by the registry's guard.
pub trait ToolsetFactory: Send + Sync {
    fn build(&self, credential: &Credential) -> Result<ToolRegistry, RegistryError>;
}

/// Local tools only: `collapsible` when enabled plus any extra tools.
#[derive(Default, Clone)]
pub struct LocalToolset {
    collapsible: bool,
    extra: Vec<Arc<dyn Tool>>,
}

impl LocalToolset {
    pub fn new(collapsible: bool) -> Self {
        Self {
            collapsible,
            extra: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_tool(mut self, tool: Arc<dyn Tool>) -> Self {
        self.extra.push(tool);
        self
    }
}

impl ToolsetFactory for LocalToolset {
    fn build(&self, _credential: &Credential) -> Result<ToolRegistry, RegistryError> {
        let mut builder = ToolRegistry::builder().tools(self.extra.iter().cloned());
        if self.collapsible {
            builder = builder.tool(Arc::new(CollapsibleTool::new()) as Arc<dyn Tool>);
        }
        builder.build()
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<ServerConfig>,
    pub credentials: Arc<dyn CredentialProvider>,
    pub toolset: Arc<dyn ToolsetFactory>,
    /// Backend override; `None` builds a genai client per turn from the credential.
    pub llm_executor: Option<Arc<dyn LlmExecutor>>,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        credentials: Arc<dyn CredentialProvider>,
        toolset: Arc<dyn ToolsetFactory>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            credentials,
            toolset,
            llm_executor: None,
        }
    }

    #[must_use]
    pub fn with_llm_executor(mut self, executor: Arc<dyn LlmExecutor>) -> Self {
        self.llm_executor = Some(executor);
        self
    }

    /// Loop configuration for a turn authenticated with `credential`.
    pub fn agent_config(&self, credential: &Credential) -> AgentConfig {
        let config = self.config.agent_config();
        match &self.llm_executor {
            Some(executor) => config.with_llm_executor(executor.clone()),
            None => config.with_llm_executor(Arc::new(genai_executor(
                credential,
                self.config.base_url.as_deref(),
            ))),
        }
    }
}

fn genai_executor(credential: &Credential, base_url: Option<&str>) -> GenaiLlmExecutor {
    let key = credential.expose().to_string();
    let endpoint = base_url.map(str::to_string);
    let client = genai::Client::builder()
        .with_service_target_resolver_fn(move |mut t: genai::ServiceTarget| {
            if let Some(endpoint) = &endpoint {
                t.endpoint = genai::resolver::Endpoint::from_owned(endpoint.as_str());
            }
            t.auth = genai::resolver::AuthData::from_single(key.as_str());
            Ok(t)
        })
        .build();
    GenaiLlmExecutor::new(client)
}

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let code = match &self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = Json(serde_json::json!({ "error": self.to_string() }));
        (code, body).into_response()
    }
}

impl From<RegistryError> for ApiError {
    fn from(e: RegistryError) -> Self {
        ApiError::Internal(e.to_string())
    }
}
