//! Analysis orchestration: one in-flight run, primary provider with
//! sequential fallback to the secondary, composite failure when both fail.
//!
//! Concurrency model: at most one analysis per orchestrator at a time.
//! Admission is a single `compare_exchange` on an atomic flag; the flag is
//! released by an RAII guard, so every exit path (success, failure, caller
//! cancellation via dropped future) resets it.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use tracing::{info, info_span, warn, Instrument};

use super::preprocess::ImagePreprocessor;
use super::prompt::{self, ANALYSIS_USER_PROMPT, STRUCTURED_JSON_PROMPT};
use super::providers::{ProviderClient, ProviderError};
use super::{report, structured, AnalysisError};
use crate::config::ProviderId;
use crate::models::AnalysisReport;

/// Result of one successful analysis run.
#[derive(Debug, Clone)]
pub struct AnalysisOutcome {
    /// Typed report, `provider_used` populated.
    pub report: AnalysisReport,
    /// Formatted text: raw completion + divider + disclaimer + attribution.
    pub formatted_text: String,
    pub provider_used: ProviderId,
}

/// Which report contract the provider is asked for, and therefore which
/// decode path handles the completion.
#[derive(Debug, Clone, Copy)]
enum ReportMode {
    Sections,
    StructuredJson,
}

/// Coordinates preprocess → provider call (with fallback) → parse.
pub struct AnalysisOrchestrator {
    preprocessor: Arc<dyn ImagePreprocessor>,
    /// Exactly two providers in construction order. `primary_index` selects
    /// which one is tried first; the other is the fallback.
    providers: Vec<Arc<dyn ProviderClient>>,
    primary_index: AtomicUsize,
    is_analyzing: AtomicBool,
}

/// Resets the in-flight flag when the run ends, however it ends.
struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl AnalysisOrchestrator {
    pub fn new(
        preprocessor: Arc<dyn ImagePreprocessor>,
        primary: Arc<dyn ProviderClient>,
        secondary: Arc<dyn ProviderClient>,
    ) -> Self {
        Self {
            preprocessor,
            providers: vec![primary, secondary],
            primary_index: AtomicUsize::new(0),
            is_analyzing: AtomicBool::new(false),
        }
    }

    /// Whether a run is currently in flight.
    pub fn is_analyzing(&self) -> bool {
        self.is_analyzing.load(Ordering::SeqCst)
    }

    /// The provider currently tried first.
    pub fn active_provider(&self) -> ProviderId {
        self.providers[self.primary_index.load(Ordering::SeqCst) % 2].id()
    }

    /// Swap which provider is tried first. Takes effect on future calls
    /// only; a run already in flight keeps the order it started with.
    pub fn switch_active_provider(&self) -> ProviderId {
        let prev = self.primary_index.fetch_xor(1, Ordering::SeqCst);
        let now = self.providers[(prev ^ 1) % 2].id();
        info!(provider = %now, "Active provider switched");
        now
    }

    /// Run one full analysis of the given photo bytes.
    ///
    /// Rejects immediately with [`AnalysisError::AnalysisInProgress`] if a
    /// run is already in flight. Provider attempts are strictly sequential:
    /// the fallback is contacted only after the primary has failed.
    pub async fn run_analysis(
        &self,
        image_bytes: &[u8],
    ) -> Result<AnalysisOutcome, AnalysisError> {
        self.run(image_bytes, ReportMode::Sections).await
    }

    /// Same pipeline, but the provider is prompted for JSON and the result
    /// goes through the structured decode path (with text-parse fallback).
    pub async fn run_analysis_structured(
        &self,
        image_bytes: &[u8],
    ) -> Result<AnalysisOutcome, AnalysisError> {
        self.run(image_bytes, ReportMode::StructuredJson).await
    }

    async fn run(
        &self,
        image_bytes: &[u8],
        mode: ReportMode,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        if self
            .is_analyzing
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            warn!("Analysis request rejected, another run is in flight");
            return Err(AnalysisError::AnalysisInProgress);
        }
        let _guard = InFlightGuard(&self.is_analyzing);

        let span = info_span!("run_analysis", bytes = image_bytes.len());
        self.run_inner(image_bytes, mode).instrument(span).await
    }

    async fn run_inner(
        &self,
        image_bytes: &[u8],
        mode: ReportMode,
    ) -> Result<AnalysisOutcome, AnalysisError> {
        // Preprocess first; an undecodable image must never cost a
        // network call.
        let prepared = self.preprocessor.prepare(image_bytes)?;
        info!(
            width = prepared.width,
            height = prepared.height,
            payload = prepared.jpeg_bytes.len(),
            "Image prepared"
        );

        // Provider order is fixed for the whole run, read once.
        let first = self.primary_index.load(Ordering::SeqCst) % 2;
        let primary = &self.providers[first];
        let secondary = &self.providers[first ^ 1];

        let user_prompt = match mode {
            ReportMode::Sections => ANALYSIS_USER_PROMPT,
            ReportMode::StructuredJson => STRUCTURED_JSON_PROMPT,
        };

        let (completion, provider_used) = match primary.analyze(&prepared, user_prompt).await {
            Ok(text) => (text, primary.id()),
            Err(primary_err) => {
                warn!(
                    provider = %primary.id(),
                    error = %primary_err,
                    "Primary provider failed, falling back"
                );
                match secondary.analyze(&prepared, user_prompt).await {
                    Ok(text) => (text, secondary.id()),
                    Err(secondary_err) => {
                        warn!(
                            provider = %secondary.id(),
                            error = %secondary_err,
                            "Fallback provider failed"
                        );
                        return Err(AnalysisError::AllProvidersFailed {
                            primary: primary_err,
                            secondary: secondary_err,
                        });
                    }
                }
            }
        };

        let formatted_text = prompt::format_report(&completion, provider_used);
        // The footer is presentation text; parsing runs over the formatted
        // string in section mode so raw_text matches what the user sees,
        // while the JSON path decodes the bare completion.
        let mut report = match mode {
            ReportMode::Sections => report::parse(&formatted_text),
            ReportMode::StructuredJson => structured::build_structured(&completion),
        };
        report.provider_used = Some(provider_used);

        info!(
            provider = %provider_used,
            severity = %report.severity_level,
            conditions = report.possible_conditions.len(),
            "Analysis complete"
        );

        Ok(AnalysisOutcome {
            report,
            formatted_text,
            provider_used,
        })
    }
}
