//! Process-wide configuration: provider endpoints, credentials, tuning knobs.
//!
//! Credentials are sourced from the environment, never compiled in. Every
//! `ProviderConfig` is read-only after construction; the only runtime
//! "mutation" in the system is the orchestrator's switch of which provider
//! is tried first, which never touches these values.

use std::fmt;
use std::path::PathBuf;

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Dermascope";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Environment variable holding the OpenRouter API key.
pub const OPENROUTER_KEY_VAR: &str = "DERMASCOPE_OPENROUTER_KEY";
/// Environment variable holding the Google Gemini API key.
pub const GEMINI_KEY_VAR: &str = "DERMASCOPE_GEMINI_KEY";

/// Default per-attempt network timeout. Vision completions are slow;
/// anything past this is treated as a provider failure and falls back.
pub const DEFAULT_TIMEOUT_SECS: u64 = 75;

/// Default log filter when RUST_LOG is unset.
pub fn default_log_filter() -> String {
    format!("{}=info", env!("CARGO_PKG_NAME"))
}

/// Get the application data directory (`~/.dermascope/`).
pub fn app_data_dir() -> PathBuf {
    let home = dirs::home_dir().expect("Cannot determine home directory");
    home.join(".dermascope")
}

/// Default location of the analysis history database.
pub fn history_db_path() -> PathBuf {
    app_data_dir().join("history.sqlite")
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing environment variable {0}")]
    MissingKey(&'static str),
}

/// The two interchangeable analysis backends.
///
/// `OpenRouter` is the fast/free chat-completions endpoint; `Gemini` is the
/// vision-capable generate-content endpoint. Both accept an image + text
/// prompt and return a single text completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderId {
    OpenRouter,
    Gemini,
}

impl fmt::Display for ProviderId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OpenRouter => write!(f, "OpenRouter"),
            Self::Gemini => write!(f, "Google Gemini"),
        }
    }
}

/// Static configuration for one provider.
///
/// Invariant: the configured model must accept an image+text multimodal
/// request and return a single text completion.
#[derive(Clone)]
pub struct ProviderConfig {
    pub provider_id: ProviderId,
    /// For OpenRouter: the full chat-completions URL.
    /// For Gemini: the models base URL (model + verb are appended per call).
    pub endpoint: String,
    pub auth_token: String,
    pub model_name: String,
    pub timeout_secs: u64,
    pub max_output_tokens: u32,
    pub temperature: f32,
}

// Keep the API key out of logs and panic messages.
impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("provider_id", &self.provider_id)
            .field("endpoint", &self.endpoint)
            .field("auth_token", &"<redacted>")
            .field("model_name", &self.model_name)
            .field("timeout_secs", &self.timeout_secs)
            .field("max_output_tokens", &self.max_output_tokens)
            .field("temperature", &self.temperature)
            .finish()
    }
}

impl ProviderConfig {
    /// Production defaults for the OpenRouter chat-completions provider.
    pub fn openrouter(api_key: String) -> Self {
        Self {
            provider_id: ProviderId::OpenRouter,
            endpoint: "https://openrouter.ai/api/v1/chat/completions".into(),
            auth_token: api_key,
            model_name: "meta-llama/llama-3.2-11b-vision-instruct:free".into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_output_tokens: 2048,
            temperature: 0.7,
        }
    }

    /// Production defaults for the Gemini generate-content provider.
    pub fn gemini(api_key: String) -> Self {
        Self {
            provider_id: ProviderId::Gemini,
            endpoint: "https://generativelanguage.googleapis.com/v1beta/models".into(),
            auth_token: api_key,
            model_name: "gemini-1.5-flash".into(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            max_output_tokens: 2048,
            temperature: 0.7,
        }
    }

    /// OpenRouter config with the key read from the environment.
    pub fn openrouter_from_env() -> Result<Self, ConfigError> {
        std::env::var(OPENROUTER_KEY_VAR)
            .map(Self::openrouter)
            .map_err(|_| ConfigError::MissingKey(OPENROUTER_KEY_VAR))
    }

    /// Gemini config with the key read from the environment.
    pub fn gemini_from_env() -> Result<Self, ConfigError> {
        std::env::var(GEMINI_KEY_VAR)
            .map(Self::gemini)
            .map_err(|_| ConfigError::MissingKey(GEMINI_KEY_VAR))
    }
}
