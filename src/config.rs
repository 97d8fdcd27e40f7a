//! Configuration management for Dune.
//!
//! Configuration is read from environment variables:
//! - `LLM_API_KEY` - Required. API key for the completion provider. Falls back to `GROQ_API_KEY`.
//! - `LLM_BASE_URL` - Optional. OpenAI-compatible API base URL. Defaults to `https://api.groq.com/openai/v1`.
//! - `DEFAULT_MODEL` - Optional. Model identifier. Defaults to `qwen/qwen3-32b`.
//! - `WORKSPACE_PATH` - Optional. The workspace directory. Defaults to current directory.
//! - `MAX_ROUNDS` - Optional. Completions allowed per user turn. Defaults to `25`.
//! - `TOOL_TIMEOUT_SECS` - Optional. Per-call tool timeout. Defaults to `60`.
//! - `AUTO_APPROVE` - Optional. Run mutating tools without asking. Defaults to `false`.
//! - `TOOL_CALL_TEXT` - Optional. `retain` or `discard` text sent alongside tool calls. Defaults to `retain`.
//! - `EXIT_COMMAND` - Optional. Input that ends the session. Defaults to `exit`.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::agent::{ApprovalMode, ToolCallTextPolicy};

pub const DEFAULT_BASE_URL: &str = "https://api.groq.com/openai/v1";
pub const DEFAULT_MODEL: &str = "qwen/qwen3-32b";
const DEFAULT_MAX_ROUNDS: u32 = 25;
const DEFAULT_TOOL_TIMEOUT_SECS: u64 = 60;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Agent configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Provider API key
    pub api_key: String,

    /// OpenAI-compatible base URL (without `/chat/completions`)
    pub base_url: String,

    /// Model identifier sent with every completion
    pub default_model: String,

    /// Workspace directory for file operations
    pub workspace_path: PathBuf,

    /// Maximum completions per user turn
    pub max_rounds: u32,

    /// Timeout applied to each tool call
    pub tool_timeout: Duration,

    /// Skip approval prompts for mutating tools
    pub auto_approve: bool,

    pub tool_call_text: ToolCallTextPolicy,

    /// Input that ends the session (case-insensitive)
    pub exit_command: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if neither `LLM_API_KEY` nor
    /// `GROQ_API_KEY` is set, and `ConfigError::InvalidValue` for values that
    /// do not parse.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(var: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let api_key = ["LLM_API_KEY", "GROQ_API_KEY"]
            .into_iter()
            .filter_map(|key| var(key))
            .find(|key| !key.trim().is_empty())
            .ok_or_else(|| ConfigError::MissingEnvVar("LLM_API_KEY".to_string()))?;

        let base_url = var("LLM_BASE_URL").unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let default_model = var("DEFAULT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let workspace_path = var("WORKSPACE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")));

        let max_rounds = parse_positive(&var, "MAX_ROUNDS", u64::from(DEFAULT_MAX_ROUNDS))?;
        let max_rounds = u32::try_from(max_rounds)
            .map_err(|e| ConfigError::InvalidValue("MAX_ROUNDS".to_string(), e.to_string()))?;

        let tool_timeout_secs = parse_positive(&var, "TOOL_TIMEOUT_SECS", DEFAULT_TOOL_TIMEOUT_SECS)?;

        let auto_approve = var("AUTO_APPROVE")
            .map(|v| parse_bool(&v).map_err(|e| ConfigError::InvalidValue("AUTO_APPROVE".to_string(), e)))
            .transpose()?
            .unwrap_or(false);

        let tool_call_text = var("TOOL_CALL_TEXT")
            .map(|v| {
                v.parse::<ToolCallTextPolicy>()
                    .map_err(|e| ConfigError::InvalidValue("TOOL_CALL_TEXT".to_string(), e))
            })
            .transpose()?
            .unwrap_or_default();

        let exit_command = var("EXIT_COMMAND")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .unwrap_or_else(|| "exit".to_string());

        Ok(Self {
            api_key,
            base_url,
            default_model,
            workspace_path,
            max_rounds,
            tool_timeout: Duration::from_secs(tool_timeout_secs),
            auto_approve,
            tool_call_text,
            exit_command,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(api_key: String, default_model: String, workspace_path: PathBuf) -> Self {
        Self {
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            default_model,
            workspace_path,
            max_rounds: DEFAULT_MAX_ROUNDS,
            tool_timeout: Duration::from_secs(DEFAULT_TOOL_TIMEOUT_SECS),
            auto_approve: false,
            tool_call_text: ToolCallTextPolicy::Retain,
            exit_command: "exit".to_string(),
        }
    }

    pub fn approval_mode(&self) -> ApprovalMode {
        if self.auto_approve {
            ApprovalMode::AutoApprove
        } else {
            ApprovalMode::Interactive
        }
    }

    /// Whether `input` is the exit sentinel.
    pub fn is_exit_command(&self, input: &str) -> bool {
        input.trim().eq_ignore_ascii_case(&self.exit_command)
    }
}

fn parse_positive(
    var: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: u64,
) -> Result<u64, ConfigError> {
    let Some(raw) = var(key) else {
        return Ok(default);
    };
    let value = raw
        .trim()
        .parse::<u64>()
        .map_err(|e| ConfigError::InvalidValue(key.to_string(), format!("{}", e)))?;
    if value == 0 {
        return Err(ConfigError::InvalidValue(
            key.to_string(),
            "must be greater than zero".to_string(),
        ));
    }
    Ok(value)
}

fn parse_bool(value: &str) -> Result<bool, String> {
    match value.trim().to_lowercase().as_str() {
        "1" | "true" | "t" | "yes" | "y" | "on" => Ok(true),
        "0" | "false" | "f" | "no" | "n" | "off" => Ok(false),
        other => Err(format!("expected boolean-like value, got: {}", other)),
    }
}
