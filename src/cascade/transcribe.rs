//! Audio transcription cascade.
//!
//! Cloud transcription first, an alternate cloud vendor second, the local
//! whisper runtime third. Transcripts are screened by the quality gate but
//! deliberately NOT sanitized: the narration layer wants verbatim speech,
//! fillers included, and cleanup belongs to the refinement cascade.
//!
//! There is no honest way to invent speech, so the deterministic floor of
//! this cascade is an empty-segment outcome carrying the baseline's fixed
//! placeholder sentence. Callers distinguish it by its tier tag.

use std::path::Path;
use std::sync::Arc;

use crate::baseline::baseline_polish;
use crate::cascade::report_phase;
use crate::error::LoomError;
use crate::health::HealthRegistry;
use crate::model::{CascadeResult, ProgressPhase, Tier, TranscriptOutcome};
use crate::provider::{NoopReporter, ProgressReporter, TranscriptionProvider};
use crate::quality::is_junk;
use crate::retry::BackoffPolicy;

const SUPPORTED_FORMATS: &[&str] = &["wav", "mp3", "webm", "ogg", "m4a", "flac", "mp4"];

pub struct TranscriptionCascade {
    primary: Option<Arc<dyn TranscriptionProvider>>,
    secondary: Option<Arc<dyn TranscriptionProvider>>,
    local: Option<Arc<dyn TranscriptionProvider>>,
    health: Arc<HealthRegistry>,
    reporter: Arc<dyn ProgressReporter>,
    backoff: BackoffPolicy,
}

impl TranscriptionCascade {
    #[must_use]
    pub fn new(health: Arc<HealthRegistry>) -> Self {
        Self {
            primary: None,
            secondary: None,
            local: None,
            health,
            reporter: Arc::new(NoopReporter),
            backoff: BackoffPolicy::default(),
        }
    }

    #[must_use]
    pub fn with_primary(mut self, provider: Arc<dyn TranscriptionProvider>) -> Self {
        self.primary = Some(provider);
        self
    }

    #[must_use]
    pub fn with_secondary(mut self, provider: Arc<dyn TranscriptionProvider>) -> Self {
        self.secondary = Some(provider);
        self
    }

    #[must_use]
    pub fn with_local(mut self, provider: Arc<dyn TranscriptionProvider>) -> Self {
        self.local = Some(provider);
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    #[must_use]
    pub fn with_backoff(mut self, backoff: BackoffPolicy) -> Self {
        self.backoff = backoff;
        self
    }

    /// Transcribe an audio file. Never errors; a request that no provider
    /// can serve degrades to the placeholder outcome.
    pub fn transcribe(
        &self,
        audio_path: &Path,
        language: Option<&str>,
    ) -> CascadeResult<TranscriptOutcome> {
        if let Err(error) = validate_request(audio_path) {
            tracing::warn!(%error, "unservable transcription request");
            return floor_outcome();
        }

        let tiers: [(&Option<Arc<dyn TranscriptionProvider>>, Tier, ProgressPhase); 3] = [
            (&self.primary, Tier::PrimaryCloud, ProgressPhase::PrimaryEngaged),
            (&self.secondary, Tier::SecondaryCloud, ProgressPhase::FallbackEngaged),
            (&self.local, Tier::LocalModel, ProgressPhase::LocalRescue),
        ];

        for (slot, tier, phase) in tiers {
            let Some(provider) = slot else { continue };
            if !provider.is_configured() {
                continue;
            }
            report_phase(self.reporter.as_ref(), phase, 0, 0.0);
            let service = format!("transcribe.{}", provider.name());

            // The local runtime must fail fast when its host process is
            // down; only the cloud tiers get the transient-retry budget.
            let policy = if tier == Tier::LocalModel {
                BackoffPolicy::immediate(1)
            } else {
                self.backoff.clone()
            };

            let reporter = Arc::clone(&self.reporter);
            let result = policy.execute(
                |_| provider.transcribe(audio_path, language),
                |context| {
                    report_phase(
                        reporter.as_ref(),
                        context.phase,
                        context.attempt,
                        context.wait_seconds,
                    );
                },
            );

            match result {
                Ok(outcome) if !is_junk(&outcome.text) => {
                    self.health.report_success(&service);
                    return CascadeResult::accepted(outcome, tier);
                }
                Ok(_) => {
                    tracing::warn!(service = %service, "transcript rejected by quality gate");
                    self.health
                        .report_failure(&service, "rejected: junk transcript");
                }
                Err(error) => {
                    tracing::warn!(service = %service, %error, "transcription tier failed");
                    self.health.report_failure(&service, &error.to_string());
                }
            }
        }

        floor_outcome()
    }
}

fn validate_request(audio_path: &Path) -> Result<(), LoomError> {
    let extension = audio_path
        .extension()
        .and_then(|ext| ext.to_str())
        .map(str::to_lowercase)
        .unwrap_or_default();
    if !SUPPORTED_FORMATS.contains(&extension.as_str()) {
        return Err(LoomError::InvalidRequest(format!(
            "unsupported audio format: {extension}"
        )));
    }
    Ok(())
}

fn floor_outcome() -> CascadeResult<TranscriptOutcome> {
    CascadeResult::accepted(
        TranscriptOutcome {
            text: baseline_polish(""),
            language: None,
            segments: Vec::new(),
        },
        Tier::DeterministicBaseline,
    )
}
