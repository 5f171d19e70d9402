//! Dermascope core: skin photo analysis over external AI providers.
//!
//! The crate takes raw photo bytes from a capture/pick surface, normalizes
//! them, submits them to a primary provider with automatic fallback to a
//! secondary, and turns the provider's free-text report into a typed
//! [`models::AnalysisReport`]. Completed analyses can be kept in a local
//! SQLite history. No account, no server of our own: the only network
//! traffic is the provider round trip.

pub mod config;
pub mod history;
pub mod models;
pub mod pipeline;

use std::sync::Arc;

use tracing_subscriber::EnvFilter;

use pipeline::{AnalysisOrchestrator, PhotoPreprocessor};
use pipeline::providers::{GeminiClient, OpenRouterClient};

/// Initialize tracing. `RUST_LOG` overrides the default filter. Safe to
/// call more than once; later calls are no-ops.
pub fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config::default_log_filter())),
        )
        .try_init()
        .ok();
}

/// Build the production orchestrator: OpenRouter primary, Gemini fallback,
/// credentials from the environment.
pub fn build_orchestrator() -> Result<AnalysisOrchestrator, config::ConfigError> {
    let openrouter = config::ProviderConfig::openrouter_from_env()?;
    let gemini = config::ProviderConfig::gemini_from_env()?;

    Ok(AnalysisOrchestrator::new(
        Arc::new(PhotoPreprocessor::default()),
        Arc::new(OpenRouterClient::new(openrouter)),
        Arc::new(GeminiClient::new(gemini)),
    ))
}
