use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Cascade tiers and results
// ---------------------------------------------------------------------------

/// Producer tier that ultimately supplied a cascade's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    PrimaryCloud,
    SecondaryCloud,
    LocalModel,
    DeterministicBaseline,
}

impl Tier {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PrimaryCloud => "primary_cloud",
            Self::SecondaryCloud => "secondary_cloud",
            Self::LocalModel => "local_model",
            Self::DeterministicBaseline => "deterministic_baseline",
        }
    }
}

/// Outcome of one cascade invocation. By the time a cascade returns,
/// `accepted` is always true: the deterministic terminal tier cannot be
/// rejected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CascadeResult<T> {
    pub value: T,
    pub tier: Tier,
    pub accepted: bool,
}

impl<T> CascadeResult<T> {
    #[must_use]
    pub fn accepted(value: T, tier: Tier) -> Self {
        Self {
            value,
            tier,
            accepted: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Book structures
// ---------------------------------------------------------------------------

/// One chapter of a generated book draft. Field names match the JSON
/// contract the cloud book producers are asked to emit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChapterDraft {
    pub chapter_title: String,
    /// Short visual description handed to the illustration cascade.
    pub chapter_summary: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookDraft {
    pub title: String,
    pub subtitle: String,
    pub chapters: Vec<ChapterDraft>,
}

impl BookDraft {
    /// Whether this draft is structurally usable: at least one chapter
    /// with non-empty content.
    #[must_use]
    pub fn is_well_formed(&self) -> bool {
        !self.chapters.is_empty() && self.chapters.iter().all(|c| !c.content.trim().is_empty())
    }
}

/// Persisted chapter shape as seen by the excluded storage layer. The core
/// reads `content_text`/`summary` and writes `content_text`/`image_reference`;
/// it does not own the lifecycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chapter {
    pub id: String,
    pub title: String,
    pub summary: String,
    pub content_text: String,
    pub image_reference: Option<String>,
    pub locked: bool,
}

// ---------------------------------------------------------------------------
// Transcription
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    pub start_sec: Option<f64>,
    pub end_sec: Option<f64>,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptOutcome {
    pub text: String,
    pub language: Option<String>,
    pub segments: Vec<TranscriptSegment>,
}

// ---------------------------------------------------------------------------
// Images
// ---------------------------------------------------------------------------

/// Which producer stage supplied an image reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImageSource {
    Primary,
    PromptOptimized,
    IndexSearch,
    CommunityQueue,
    Placeholder,
}

impl ImageSource {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Primary => "primary",
            Self::PromptOptimized => "prompt_optimized",
            Self::IndexSearch => "index_search",
            Self::CommunityQueue => "community_queue",
            Self::Placeholder => "placeholder",
        }
    }
}

/// Reference to a generated image. A `Placeholder` carries the seed text
/// that keys the deterministic local rendering.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageRef {
    Url { url: String },
    Placeholder { seed: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageOutcome {
    pub reference: ImageRef,
    pub source: ImageSource,
    /// Compact visual prompt derived from the chapter summary, when a
    /// prompt-optimization pass ran.
    pub visual_prompt: Option<String>,
}

// ---------------------------------------------------------------------------
// Health registry records
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ServiceStatus {
    Online,
    Degraded,
    Offline,
}

impl ServiceStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Online => "ONLINE",
            Self::Degraded => "DEGRADED",
            Self::Offline => "OFFLINE",
        }
    }
}

/// Per-service health history. One record per service name, created on
/// first report, never deleted for the life of the process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceHealthRecord {
    pub status: ServiceStatus,
    pub consecutive_failures: u32,
    pub last_success: Option<DateTime<Utc>>,
    pub last_failure: Option<DateTime<Utc>>,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SystemStatus {
    Stable,
    Critical,
}

impl SystemStatus {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Stable => "STABLE",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Snapshot of the whole registry. `services` is a copy: callers never see
/// the registry's mutable internal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusReport {
    pub system_status: SystemStatus,
    pub services: BTreeMap<String, ServiceHealthRecord>,
    pub generated_at: DateTime<Utc>,
}

// ---------------------------------------------------------------------------
// Progress signals
// ---------------------------------------------------------------------------

/// Phase marker delivered to the progress reporter on tier transitions.
/// The numeric codes are the stable wire values the front end already
/// understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProgressPhase {
    PrimaryEngaged,
    FallbackEngaged,
    LocalRescue,
    BackoffWait,
}

impl ProgressPhase {
    #[must_use]
    pub const fn signal_code(self) -> u8 {
        match self {
            Self::PrimaryEngaged => 99,
            Self::FallbackEngaged => 88,
            Self::LocalRescue => 77,
            Self::BackoffWait => 55,
        }
    }
}

/// Ephemeral context handed to the progress callback. Ownership stays with
/// the cascade; reporters must not block on it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetryContext {
    pub attempt: u32,
    pub wait_seconds: f64,
    pub phase: ProgressPhase,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tier_serializes_snake_case() {
        let json = serde_json::to_string(&Tier::DeterministicBaseline).unwrap();
        assert_eq!(json, "\"deterministic_baseline\"");
        assert_eq!(Tier::SecondaryCloud.as_str(), "secondary_cloud");
    }

    #[test]
    fn cascade_result_accepted_constructor() {
        let result = CascadeResult::accepted("hello".to_owned(), Tier::PrimaryCloud);
        assert!(result.accepted);
        assert_eq!(result.tier, Tier::PrimaryCloud);
        assert_eq!(result.value, "hello");
    }

    #[test]
    fn book_draft_well_formed_rules() {
        let mut book = BookDraft {
            title: "T".to_owned(),
            subtitle: "S".to_owned(),
            chapters: vec![],
        };
        assert!(!book.is_well_formed(), "no chapters");

        book.chapters.push(ChapterDraft {
            chapter_title: "1".to_owned(),
            chapter_summary: "s".to_owned(),
            content: "  ".to_owned(),
        });
        assert!(!book.is_well_formed(), "blank content");

        book.chapters[0].content = "The story begins.".to_owned();
        assert!(book.is_well_formed());
    }

    #[test]
    fn chapter_draft_round_trips_json_contract_keys() {
        let json = r#"{"chapter_title":"A","chapter_summary":"B","content":"C"}"#;
        let draft: ChapterDraft = serde_json::from_str(json).unwrap();
        assert_eq!(draft.chapter_title, "A");
        let back = serde_json::to_value(&draft).unwrap();
        assert!(back.get("chapter_summary").is_some());
    }

    #[test]
    fn service_status_wire_values() {
        assert_eq!(
            serde_json::to_string(&ServiceStatus::Offline).unwrap(),
            "\"OFFLINE\""
        );
        assert_eq!(SystemStatus::Critical.as_str(), "CRITICAL");
    }

    #[test]
    fn progress_phase_signal_codes_are_stable() {
        assert_eq!(ProgressPhase::PrimaryEngaged.signal_code(), 99);
        assert_eq!(ProgressPhase::FallbackEngaged.signal_code(), 88);
        assert_eq!(ProgressPhase::LocalRescue.signal_code(), 77);
        assert_eq!(ProgressPhase::BackoffWait.signal_code(), 55);
    }

    #[test]
    fn image_ref_tagged_serialization() {
        let url = ImageRef::Url {
            url: "https://example.net/a.png".to_owned(),
        };
        let value = serde_json::to_value(&url).unwrap();
        assert_eq!(value.get("kind").and_then(|v| v.as_str()), Some("url"));

        let ph = ImageRef::Placeholder {
            seed: "Chapter One".to_owned(),
        };
        let value = serde_json::to_value(&ph).unwrap();
        assert_eq!(
            value.get("kind").and_then(|v| v.as_str()),
            Some("placeholder")
        );
    }
}
