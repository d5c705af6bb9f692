//! Multi-tier producer cascades.
//!
//! Each cascade walks an ordered chain of producers for one logical
//! operation, validating candidates through the quality gate and falling
//! through on failure or rejection. Advancement is driven by explicit
//! [`TierOutcome`] pattern matching; errors never cross a cascade's public
//! boundary, because the terminal tier is a deterministic algorithm that
//! cannot fail.
//!
//! Single-invocation state machine:
//! `START -> TRYING_TIER(i) -> {ACCEPTED | REJECTED -> TRYING_TIER(i+1) |
//! ERROR -> TRYING_TIER(i+1)} -> ... -> TERMINAL(ACCEPTED)`.

pub mod book;
pub mod image;
pub mod text;
pub mod transcribe;

use crate::error::LoomError;
use crate::model::{ProgressPhase, RetryContext};
use crate::provider::ProgressReporter;
use crate::quality::{is_junk, is_meta_response};
use crate::sanitize::sanitize_with_prefixes;

/// Outcome of one producer tier.
#[derive(Debug)]
pub enum TierOutcome<T> {
    /// Candidate passed validation; carries the sanitized value.
    Accepted(T),
    /// Producer answered, but the quality gate refused the output.
    Rejected(String),
    /// Producer itself failed.
    Failed(LoomError),
}

impl<T> TierOutcome<T> {
    /// Human-readable reason for a non-accepted outcome, for health
    /// reporting.
    #[must_use]
    pub fn failure_reason(&self) -> Option<String> {
        match self {
            Self::Accepted(_) => None,
            Self::Rejected(reason) => Some(format!("rejected: {reason}")),
            Self::Failed(error) => Some(error.to_string()),
        }
    }
}

/// Validate and sanitize a text candidate from any producer tier.
pub(crate) fn screen_text(candidate: &str, known_prefixes: &[&str]) -> TierOutcome<String> {
    if is_meta_response(candidate) {
        return TierOutcome::Rejected("meta response instead of content".to_owned());
    }
    if is_junk(candidate) {
        return TierOutcome::Rejected("junk output".to_owned());
    }
    TierOutcome::Accepted(sanitize_with_prefixes(candidate, known_prefixes))
}

/// Deliver a tier-transition signal. The reporter is fire-and-forget: it
/// must not block, and a panicking reporter is swallowed so it can never
/// take a cascade down with it.
pub(crate) fn report_phase(
    reporter: &dyn ProgressReporter,
    phase: ProgressPhase,
    attempt: u32,
    wait_seconds: f64,
) {
    let context = RetryContext {
        attempt,
        wait_seconds,
        phase,
    };
    let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
        reporter.on_tier_change(context);
    }));
    if outcome.is_err() {
        tracing::warn!(code = phase.signal_code(), "progress reporter panicked; ignored");
    }
}

#[cfg(test)]
mod tests {
    use super::{TierOutcome, report_phase, screen_text};
    use crate::model::ProgressPhase;
    use crate::provider::ProgressReporter;

    #[test]
    fn screen_accepts_and_sanitizes_clean_text() {
        match screen_text("Summary: the river froze early that winter.", &[]) {
            TierOutcome::Accepted(text) => {
                assert_eq!(text, "The river froze early that winter.");
            }
            other => panic!("expected acceptance, got {other:?}"),
        }
    }

    #[test]
    fn screen_rejects_meta_and_junk() {
        assert!(matches!(
            screen_text("Please provide the text you would like refined.", &[]),
            TierOutcome::Rejected(_)
        ));
        assert!(matches!(screen_text("ok", &[]), TierOutcome::Rejected(_)));
    }

    #[test]
    fn failure_reason_covers_all_arms() {
        let accepted: TierOutcome<&str> = TierOutcome::Accepted("x");
        assert!(accepted.failure_reason().is_none());

        let rejected: TierOutcome<&str> = TierOutcome::Rejected("looping".to_owned());
        assert!(rejected.failure_reason().unwrap().contains("looping"));

        let failed: TierOutcome<&str> =
            TierOutcome::Failed(crate::error::LoomError::ProviderBusy("429".to_owned()));
        assert!(failed.failure_reason().unwrap().contains("capacity"));
    }

    #[test]
    fn panicking_reporter_is_swallowed() {
        struct Exploding;
        impl ProgressReporter for Exploding {
            fn on_tier_change(&self, _context: crate::model::RetryContext) {
                panic!("reporter bug");
            }
        }
        // Must not propagate.
        report_phase(&Exploding, ProgressPhase::FallbackEngaged, 1, 2.0);
    }
}
