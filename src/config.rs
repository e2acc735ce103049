use crate::processing::ContextBudget;
use serde::Deserialize;
use std::env;
use std::path::PathBuf;
use std::sync::OnceLock;
use thiserror::Error;

const DEFAULT_TOKENIZER_ENCODING: &str = "p50k_base";
const DEFAULT_STORAGE_ROOT: &str = "./data";

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the docflow pipelines.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Completion backend used for masking and summarization calls.
    pub completion_provider: CompletionProvider,
    /// Optional base URL override for the completion backend.
    pub completion_url: Option<String>,
    /// Model identifier passed to the completion backend.
    pub completion_model: String,
    /// Optional bearer token for hosted completion APIs.
    pub completion_api_key: Option<String>,
    /// Optional sampling temperature forwarded with each request.
    pub completion_temperature: Option<f32>,
    /// BPE encoding (or model name) used to estimate token counts.
    pub tokenizer_encoding: String,
    /// Token budgets derived from the model context window.
    pub budget: ContextBudget,
    /// Root directory of the filesystem object store.
    pub storage_root: PathBuf,
    /// Optional base URL of the OCR service; image and PDF inputs fail without it.
    pub ocr_url: Option<String>,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported completion backends.
#[derive(Clone, Copy, Debug, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum CompletionProvider {
    /// Local Ollama runtime (`/api/generate`).
    Ollama,
    /// OpenAI-compatible text completion API (`/v1/completions`).
    OpenAI,
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = ContextBudget::default();
        Ok(Self {
            completion_provider: load_env("COMPLETION_PROVIDER")?.parse().map_err(|()| {
                ConfigError::InvalidValue("COMPLETION_PROVIDER".to_string())
            })?,
            completion_url: load_env_optional("COMPLETION_URL"),
            completion_model: load_env("COMPLETION_MODEL")?,
            completion_api_key: load_env_optional("COMPLETION_API_KEY"),
            completion_temperature: parse_optional("COMPLETION_TEMPERATURE")?,
            tokenizer_encoding: load_env_optional("TOKENIZER_ENCODING")
                .unwrap_or_else(|| DEFAULT_TOKENIZER_ENCODING.to_string()),
            budget: ContextBudget {
                context_window: parse_optional("CONTEXT_WINDOW")?
                    .unwrap_or(defaults.context_window),
                prompt_tokens: parse_optional("PROMPT_TOKENS")?.unwrap_or(defaults.prompt_tokens),
                output_token_buffer: parse_optional("OUTPUT_TOKEN_BUFFER")?
                    .unwrap_or(defaults.output_token_buffer),
                max_summary_length: parse_optional("MAX_SUMMARY_LENGTH")?
                    .unwrap_or(defaults.max_summary_length),
                chunk_size_override: parse_optional("TEXT_SPLITTER_CHUNK_SIZE")?,
            },
            storage_root: load_env_optional("STORAGE_ROOT")
                .unwrap_or_else(|| DEFAULT_STORAGE_ROOT.to_string())
                .into(),
            ocr_url: load_env_optional("OCR_URL"),
            server_port: parse_optional("SERVER_PORT")?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_optional<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .trim()
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for CompletionProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
pub fn init_config() -> Result<&'static Config, ConfigError> {
    dotenvy::dotenv().ok();
    let config = Config::from_env()?;
    tracing::debug!(
        provider = ?config.completion_provider,
        model = %config.completion_model,
        encoding = %config.tokenizer_encoding,
        context_window = config.budget.context_window,
        chunk_size_override = ?config.budget.chunk_size_override,
        storage_root = %config.storage_root.display(),
        ocr_configured = config.ocr_url.is_some(),
        "Loaded configuration"
    );
    Ok(CONFIG.get_or_init(|| config))
}
