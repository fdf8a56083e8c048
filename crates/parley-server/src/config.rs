//! Server configuration: CLI flags plus an optional JSON file.

use parley_agent_loop::{AgentConfig, DEFAULT_MAX_STEPS};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config (JSON): {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid config: {0}")]
    Invalid(String),
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_max_steps() -> usize {
    DEFAULT_MAX_STEPS
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_true() -> bool {
    true
}

/// Contents of the JSON config file. Every field is optional.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerConfig {
    #[serde(default = "default_model")]
    pub model: String,
    /// Base system prompt; empty uses the built-in default.
    #[serde(default)]
    pub system_prompt: String,
    #[serde(default = "default_max_steps")]
    pub max_steps: usize,
    /// Per tool call bound in milliseconds.
    #[serde(default)]
    pub tool_timeout_ms: Option<u64>,
    /// Environment variable holding the model API key.
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    /// Override for the model endpoint (OpenAI-compatible base URL).
    #[serde(default)]
    pub base_url: Option<String>,
    /// Register the `collapsible` tool.
    #[serde(default = "default_true")]
    pub collapsible: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            system_prompt: String::new(),
            max_steps: default_max_steps(),
            tool_timeout_ms: None,
            api_key_env: default_api_key_env(),
            base_url: None,
            collapsible: true,
        }
    }
}

impl ServerConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&raw)
    }

    pub fn from_json(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_steps == 0 {
            return Err(ConfigError::Invalid("max_steps must be at least 1".to_string()));
        }
        if self.model.trim().is_empty() {
            return Err(ConfigError::Invalid("model cannot be empty".to_string()));
        }
        Ok(())
    }

    /// Loop configuration for one turn.
    pub fn agent_config(&self) -> AgentConfig {
        let mut config = AgentConfig::new(&self.model).with_max_steps(self.max_steps);
        if !self.system_prompt.is_empty() {
            config = config.with_system_prompt(&self.system_prompt);
        }
        if let Some(ms) = self.tool_timeout_ms {
            config = config.with_tool_timeout(Duration::from_millis(ms));
        }
        config
    }
}
