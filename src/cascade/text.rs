//! Text refinement and summarization cascade.
//!
//! Tier order: primary cloud completion, rotating secondary cloud models
//! with backoff, local text runtime, deterministic baseline. Every
//! candidate is screened (meta-response phrases, quality gate) before
//! acceptance and sanitized afterwards; the chain terminates in
//! [`baseline_polish`] which cannot fail.

use std::collections::HashSet;
use std::sync::Arc;

use crate::baseline::baseline_polish;
use crate::cascade::{TierOutcome, report_phase, screen_text};
use crate::error::ErrorClass;
use crate::health::HealthRegistry;
use crate::model::{CascadeResult, ProgressPhase, Tier};
use crate::provider::{
    LocalTextRuntime, NoopReporter, ProgressReporter, RotatingTextProvider, TextProvider,
};
use crate::retry::BackoffPolicy;
use crate::structure::first_words;

const REFINE_SYSTEM: &str = "You are an elite book editor. Refine the provided text into \
    polished first-person memoir prose in professional English. Fix grammar, remove spoken \
    fillers, keep every fact. Return ONLY the refined prose.";

const SUMMARIZE_SYSTEM: &str = "Condense the provided text into a short, vivid visual \
    description suitable as an image-generation prompt. Return ONLY the description.";

/// Leading words used when summarization falls to the deterministic tier.
const SUMMARY_FALLBACK_WORDS: usize = 10;

pub struct TextCascade {
    primary: Option<Arc<dyn TextProvider>>,
    secondary: Option<Arc<dyn RotatingTextProvider>>,
    local: Option<Arc<dyn LocalTextRuntime>>,
    health: Arc<HealthRegistry>,
    reporter: Arc<dyn ProgressReporter>,
    backoff: BackoffPolicy,
}

impl TextCascade {
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
    pub fn with_primary(mut self, provider: Arc<dyn TextProvider>) -> Self {
        self.primary = Some(provider);
        self
    }

    #[must_use]
    pub fn with_secondary(mut self, provider: Arc<dyn RotatingTextProvider>) -> Self {
        self.secondary = Some(provider);
        self
    }

    #[must_use]
    pub fn with_local(mut self, runtime: Arc<dyn LocalTextRuntime>) -> Self {
        self.local = Some(runtime);
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

    /// Refine raw narrative text. Always returns polished, non-empty
    /// prose; on total provider failure the deterministic baseline is the
    /// producer.
    pub fn refine(&self, raw_text: &str) -> CascadeResult<String> {
        let prompt = format!("Refine this text:\n\n{raw_text}");
        self.run_chain(&prompt, REFINE_SYSTEM, &[], || baseline_polish(raw_text))
    }

    /// Produce a short visual summary for illustration prompts. The
    /// deterministic tier takes the leading words of the input.
    pub fn summarize(&self, text: &str) -> CascadeResult<String> {
        let prompt = format!(
            "Summarize the following text into a vivid image-generation prompt focusing on \
             key visual elements:\n\n{text}\n\nImage prompt:"
        );
        self.run_chain(&prompt, SUMMARIZE_SYSTEM, &["summarize:", "image prompt:"], || {
            let lead = first_words(text, SUMMARY_FALLBACK_WORDS);
            if lead.is_empty() {
                baseline_polish(text)
            } else {
                lead
            }
        })
    }

    fn run_chain(
        &self,
        prompt: &str,
        system: &str,
        known_prefixes: &[&str],
        terminal: impl FnOnce() -> String,
    ) -> CascadeResult<String> {
        // Tier A: primary cloud provider.
        if let Some(primary) = &self.primary
            && primary.is_configured()
        {
            report_phase(self.reporter.as_ref(), ProgressPhase::PrimaryEngaged, 0, 0.0);
            let service = format!("text.{}", primary.name());
            let outcome = match primary.complete(prompt, system) {
                Ok(candidate) => screen_text(&candidate, known_prefixes),
                Err(error) => TierOutcome::Failed(error),
            };
            match outcome {
                TierOutcome::Accepted(value) => {
                    self.health.report_success(&service);
                    return CascadeResult::accepted(value, Tier::PrimaryCloud);
                }
                other => {
                    let reason = other.failure_reason().unwrap_or_default();
                    tracing::warn!(service = %service, reason = %reason, "primary text tier failed");
                    self.health.report_failure(&service, &reason);
                }
            }
        }

        // Tier B: secondary cloud, rotating models with backoff.
        if let Some(secondary) = &self.secondary {
            report_phase(self.reporter.as_ref(), ProgressPhase::FallbackEngaged, 0, 0.0);
            let service = format!("text.{}", secondary.name());
            match self.rotate_secondary(secondary.as_ref(), prompt, system, known_prefixes) {
                TierOutcome::Accepted(value) => {
                    self.health.report_success(&service);
                    return CascadeResult::accepted(value, Tier::SecondaryCloud);
                }
                other => {
                    let reason = other.failure_reason().unwrap_or_default();
                    tracing::warn!(service = %service, reason = %reason, "secondary text tier failed");
                    self.health.report_failure(&service, &reason);
                }
            }
        }

        // Tier C: local runtime. Connectivity errors mean the runtime is
        // not running at all: skip straight to the baseline.
        if let Some(local) = &self.local {
            report_phase(self.reporter.as_ref(), ProgressPhase::LocalRescue, 0, 0.0);
            let service = format!("text.{}", local.name());
            let outcome = match local.generate(prompt, Some(system)) {
                Ok(Some(candidate)) => screen_text(&candidate, known_prefixes),
                Ok(None) => TierOutcome::Rejected("local runtime produced no output".to_owned()),
                Err(error) => {
                    if error.class() == ErrorClass::Connectivity {
                        tracing::info!(service = %service, "local runtime offline, skipping to baseline");
                    }
                    TierOutcome::Failed(error)
                }
            };
            match outcome {
                TierOutcome::Accepted(value) => {
                    self.health.report_success(&service);
                    return CascadeResult::accepted(value, Tier::LocalModel);
                }
                other => {
                    let reason = other.failure_reason().unwrap_or_default();
                    self.health.report_failure(&service, &reason);
                }
            }
        }

        // Tier D: deterministic floor.
        CascadeResult::accepted(terminal(), Tier::DeterministicBaseline)
    }

    /// Walk the secondary provider's model list: transient capacity errors
    /// back off and rotate to the next untried model; anything else ends
    /// the tier immediately.
    fn rotate_secondary(
        &self,
        provider: &dyn RotatingTextProvider,
        prompt: &str,
        system: &str,
        known_prefixes: &[&str],
    ) -> TierOutcome<String> {
        let models = provider.models();
        if models.is_empty() {
            return TierOutcome::Failed(crate::error::LoomError::InvalidRequest(
                "secondary provider exposes no models".to_owned(),
            ));
        }

        let mut tried: HashSet<&str> = HashSet::new();
        let mut last_failure: Option<TierOutcome<String>> = None;

        for attempt in 0..self.backoff.max_attempts {
            let Some(model) = models.iter().find(|model| !tried.contains(model.as_str()))
            else {
                break;
            };
            tried.insert(model.as_str());

            match provider.complete_with(model, prompt, system) {
                Ok(candidate) => return screen_text(&candidate, known_prefixes),
                Err(error) if error.class() == ErrorClass::Transient => {
                    tracing::warn!(model = %model, attempt, %error, "secondary model busy, rotating");
                    last_failure = Some(TierOutcome::Failed(error));
                    let exhausted = attempt + 1 >= self.backoff.max_attempts
                        || models.iter().all(|m| tried.contains(m.as_str()));
                    if !exhausted {
                        let wait = self.backoff.delay_for(attempt);
                        report_phase(
                            self.reporter.as_ref(),
                            ProgressPhase::BackoffWait,
                            attempt,
                            wait.as_secs_f64(),
                        );
                        std::thread::sleep(wait);
                    }
                }
                Err(error) => return TierOutcome::Failed(error),
            }
        }

        last_failure.unwrap_or_else(|| {
            TierOutcome::Failed(crate::error::LoomError::ProviderBusy(
                "secondary retry budget exhausted".to_owned(),
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::{Arc, Mutex};

    use super::TextCascade;
    use crate::error::{LoomError, LoomResult};
    use crate::health::HealthRegistry;
    use crate::model::Tier;
    use crate::provider::{LocalTextRuntime, RotatingTextProvider, TextProvider};
    use crate::retry::BackoffPolicy;

    struct ScriptedPrimary {
        response: LoomResult<String>,
        calls: AtomicU32,
    }

    impl ScriptedPrimary {
        fn ok(text: &str) -> Self {
            Self {
                response: Ok(text.to_owned()),
                calls: AtomicU32::new(0),
            }
        }
        fn failing(error: LoomError) -> Self {
            Self {
                response: Err(error),
                calls: AtomicU32::new(0),
            }
        }
    }

    impl TextProvider for ScriptedPrimary {
        fn name(&self) -> &'static str {
            "scripted-primary"
        }
        fn complete(&self, _prompt: &str, _system: &str) -> LoomResult<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match &self.response {
                Ok(text) => Ok(text.clone()),
                Err(_) => Err(LoomError::ProviderFailed("scripted failure".to_owned())),
            }
        }
    }

    struct RotatingFake {
        /// Per-model scripted results keyed by model name.
        script: Mutex<Vec<(String, LoomResult<String>)>>,
        models_called: Mutex<Vec<String>>,
    }

    impl RotatingTextProvider for RotatingFake {
        fn name(&self) -> &'static str {
            "rotating-fake"
        }
        fn models(&self) -> Vec<String> {
            self.script
                .lock()
                .unwrap()
                .iter()
                .map(|(model, _)| model.clone())
                .collect()
        }
        fn complete_with(&self, model: &str, _prompt: &str, _system: &str) -> LoomResult<String> {
            self.models_called.lock().unwrap().push(model.to_owned());
            let script = self.script.lock().unwrap();
            let entry = script.iter().find(|(name, _)| name == model);
            match entry {
                Some((_, Ok(text))) => Ok(text.clone()),
                Some((_, Err(LoomError::ProviderBusy(msg)))) => {
                    Err(LoomError::ProviderBusy(msg.clone()))
                }
                Some((_, Err(_))) => Err(LoomError::MissingCredentials("bad key".to_owned())),
                None => Err(LoomError::InvalidRequest("unknown model".to_owned())),
            }
        }
    }

    struct OfflineLocal;
    impl LocalTextRuntime for OfflineLocal {
        fn name(&self) -> &'static str {
            "offline-local"
        }
        fn generate(&self, _prompt: &str, _system: Option<&str>) -> LoomResult<Option<String>> {
            Err(LoomError::ProviderUnreachable("connection refused".to_owned()))
        }
    }

    fn cascade() -> TextCascade {
        TextCascade::new(Arc::new(HealthRegistry::new())).with_backoff(BackoffPolicy::immediate(3))
    }

    const GOOD_PROSE: &str = "I remember the long walk home from the mill, dust on my \
        sandals and the smell of rain arriving over the fields.";

    #[test]
    fn primary_success_is_sanitized_and_tagged() {
        let cascade = cascade().with_primary(Arc::new(ScriptedPrimary::ok(&format!(
            "Refined: {GOOD_PROSE}"
        ))));
        let result = cascade.refine("raw input text");
        assert_eq!(result.tier, Tier::PrimaryCloud);
        assert!(result.accepted);
        assert!(!result.value.contains("Refined:"));
        assert!(result.value.contains("dust on my sandals"));
    }

    #[test]
    fn meta_response_from_primary_falls_to_baseline() {
        let cascade =
            cascade().with_primary(Arc::new(ScriptedPrimary::ok("please provide the text")));
        let result = cascade.refine("umm i was born in a small village la.");
        assert_eq!(result.tier, Tier::DeterministicBaseline);
        assert!(result.accepted);
        assert!(!result.value.to_lowercase().contains("please provide"));
        assert!(result.value.contains("born"));
    }

    #[test]
    fn primary_failure_records_health_and_advances() {
        let health = Arc::new(HealthRegistry::new());
        let cascade = TextCascade::new(Arc::clone(&health))
            .with_backoff(BackoffPolicy::immediate(2))
            .with_primary(Arc::new(ScriptedPrimary::failing(LoomError::ProviderFailed(
                "down".to_owned(),
            ))));

        let result = cascade.refine("a short memory about the sea.");
        assert_eq!(result.tier, Tier::DeterministicBaseline);

        let record = health.record("text.scripted-primary").unwrap();
        assert_eq!(record.consecutive_failures, 1);
    }

    #[test]
    fn secondary_rotates_past_busy_model() {
        let rotating = Arc::new(RotatingFake {
            script: Mutex::new(vec![
                (
                    "model-a".to_owned(),
                    Err(LoomError::ProviderBusy("429".to_owned())),
                ),
                ("model-b".to_owned(), Ok(GOOD_PROSE.to_owned())),
            ]),
            models_called: Mutex::new(Vec::new()),
        });
        let cascade = cascade()
            .with_secondary(Arc::clone(&rotating) as Arc<dyn RotatingTextProvider>);

        let result = cascade.refine("anything");
        assert_eq!(result.tier, Tier::SecondaryCloud);
        assert_eq!(
            *rotating.models_called.lock().unwrap(),
            vec!["model-a".to_owned(), "model-b".to_owned()]
        );
    }

    #[test]
    fn secondary_fatal_error_aborts_tier_without_rotation() {
        let rotating = Arc::new(RotatingFake {
            script: Mutex::new(vec![
                (
                    "model-a".to_owned(),
                    Err(LoomError::MissingCredentials("bad".to_owned())),
                ),
                ("model-b".to_owned(), Ok(GOOD_PROSE.to_owned())),
            ]),
            models_called: Mutex::new(Vec::new()),
        });
        let cascade = cascade()
            .with_secondary(Arc::clone(&rotating) as Arc<dyn RotatingTextProvider>);

        let result = cascade.refine("memories of the harvest festival at home.");
        // Fatal error aborted tier B; terminal tier produced the value.
        assert_eq!(result.tier, Tier::DeterministicBaseline);
        assert_eq!(rotating.models_called.lock().unwrap().len(), 1);
    }

    #[test]
    fn offline_local_runtime_skips_to_baseline() {
        let health = Arc::new(HealthRegistry::new());
        let cascade = TextCascade::new(Arc::clone(&health))
            .with_backoff(BackoffPolicy::immediate(2))
            .with_local(Arc::new(OfflineLocal));

        let result = cascade.refine("i met my wife at the tea stall near the station.");
        assert_eq!(result.tier, Tier::DeterministicBaseline);
        assert!(result.value.contains("tea stall"));
        assert!(health.record("text.offline-local").is_some());
    }

    #[test]
    fn summarize_terminal_uses_leading_words() {
        let cascade = cascade();
        let result = cascade.summarize(
            "An old bicycle leaning on a mango tree beside the well in summer light.",
        );
        assert_eq!(result.tier, Tier::DeterministicBaseline);
        assert_eq!(
            result.value,
            "An old bicycle leaning on a mango tree beside the"
        );
    }

    #[test]
    fn refine_with_no_providers_still_returns_usable_text() {
        let result = cascade().refine("");
        assert!(result.accepted);
        assert!(!result.value.is_empty());
    }
}
