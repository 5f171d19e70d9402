//! The analysis pipeline: preprocess → provider call (with fallback) →
//! formatted report text → section parsing.
//!
//! Data flow for one user-initiated analysis:
//! raw photo bytes → [`preprocess`] → [`orchestrator`] (primary provider,
//! fallback on any failure) → formatted report string → [`report::parse`]
//! (or [`structured::build_structured`] for JSON-prompted providers) →
//! [`crate::models::AnalysisReport`].

pub mod orchestrator;
pub mod preprocess;
pub mod prompt;
pub mod providers;
pub mod report;
pub mod structured;

pub use orchestrator::*;
pub use preprocess::*;
pub use prompt::*;
pub use report::*;
pub use structured::*;

use thiserror::Error;

use providers::ProviderError;

/// Failures of one `run_analysis` call.
///
/// Provider-level errors are recoverable via fallback inside the
/// orchestrator; only the composite `AllProvidersFailed` reaches the caller.
/// Parsing never fails; it degrades to a text-only report instead.
#[derive(Error, Debug)]
pub enum AnalysisError {
    /// Source image undecodable or unencodable. Fatal for the current
    /// request; no network call is attempted.
    #[error("image processing failed: {0}")]
    ImageProcessing(String),

    /// A second `run_analysis` was issued while one was in flight.
    #[error("an analysis is already in progress")]
    AnalysisInProgress,

    /// Both providers failed. The user-facing message derives from the
    /// secondary (last) attempt; the primary's reason is retained for
    /// diagnostics rather than discarded.
    #[error("analysis failed after fallback: {secondary}")]
    AllProvidersFailed {
        primary: ProviderError,
        secondary: ProviderError,
    },
}
