//! Capability traits for the collaborators the cascades depend on.
//!
//! Cloud text/image services, local runtimes, the image index and
//! community queue, the progress reporter, and the chapter store are all
//! owned elsewhere; the cascades only see these contracts. Concrete
//! implementations are constructed at the composition root and injected —
//! there are no process-global client handles.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use serde::{Deserialize, Serialize};

use crate::error::{LoomError, LoomResult};
use crate::model::{Chapter, ImageRef, RetryContext, TranscriptOutcome};

// ---------------------------------------------------------------------------
// Text producers
// ---------------------------------------------------------------------------

/// A cloud text-completion service.
pub trait TextProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether credentials/config are present. Unconfigured providers are
    /// skipped without counting as failures.
    fn is_configured(&self) -> bool {
        true
    }

    fn complete(&self, prompt: &str, system: &str) -> LoomResult<String>;
}

/// A cloud text service exposing several interchangeable models, in
/// priority order. The cascade rotates through models not yet tried in the
/// current call when the service reports transient capacity errors.
pub trait RotatingTextProvider: Send + Sync {
    fn name(&self) -> &'static str;

    /// Model identifiers in descending order of preference.
    fn models(&self) -> Vec<String>;

    fn complete_with(&self, model: &str, prompt: &str, system: &str) -> LoomResult<String>;
}

/// A locally hosted text model behind a bounded-timeout channel.
///
/// `Ok(None)` means the runtime answered but produced nothing usable.
/// An error classified as connectivity (see [`crate::ErrorClass`]) means
/// the runtime itself is absent, which cascades treat as an instant skip
/// signal rather than a retryable failure.
pub trait LocalTextRuntime: Send + Sync {
    fn name(&self) -> &'static str;

    fn generate(&self, prompt: &str, system: Option<&str>) -> LoomResult<Option<String>>;
}

// ---------------------------------------------------------------------------
// Transcription producers
// ---------------------------------------------------------------------------

pub trait TranscriptionProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_configured(&self) -> bool {
        true
    }

    fn transcribe(
        &self,
        audio_path: &Path,
        language: Option<&str>,
    ) -> LoomResult<TranscriptOutcome>;
}

// ---------------------------------------------------------------------------
// Image producers
// ---------------------------------------------------------------------------

/// A cloud image-synthesis service.
pub trait ImageProvider: Send + Sync {
    fn name(&self) -> &'static str;

    fn is_configured(&self) -> bool {
        true
    }

    fn synthesize(&self, prompt: &str) -> LoomResult<ImageRef>;

    /// Alternate form of a URL this provider issued (mirror host, legacy
    /// path scheme), tried by the download step when the original form
    /// keeps failing.
    fn alternate_url(&self, _url: &str) -> Option<String> {
        None
    }
}

/// Search over a pre-generated image index.
pub trait ImageIndex: Send + Sync {
    fn name(&self) -> &'static str;

    fn search(&self, query: &str) -> LoomResult<Option<ImageRef>>;
}

/// Ticket for a job submitted to the slow community-compute queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueTicket(pub String);

/// A slow, asynchronous community-compute image queue.
pub trait ImageQueue: Send + Sync {
    fn name(&self) -> &'static str;

    fn submit(&self, prompt: &str) -> LoomResult<QueueTicket>;

    /// `Ok(None)` while the job is still queued or rendering.
    fn poll(&self, ticket: &QueueTicket) -> LoomResult<Option<ImageRef>>;
}

/// Result of a lightweight reachability probe against an image URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadInfo {
    pub reachable: bool,
    pub content_type: Option<String>,
}

/// Downloaded image payload, prior to validation.
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub content_type: String,
    pub bytes: Vec<u8>,
}

/// Transport for fetching image bytes. Implementations own their timeout
/// and User-Agent policy; both calls must be bounded.
pub trait ImageFetcher: Send + Sync {
    fn head(&self, url: &str) -> LoomResult<HeadInfo>;

    fn get(&self, url: &str) -> LoomResult<FetchedImage>;
}

// ---------------------------------------------------------------------------
// Progress reporting
// ---------------------------------------------------------------------------

/// Fire-and-forget tier-transition callback. Implementations must not
/// block; the cascades swallow nothing here because the trait cannot fail.
pub trait ProgressReporter: Send + Sync {
    fn on_tier_change(&self, context: RetryContext);
}

/// Reporter that discards every signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopReporter;

impl ProgressReporter for NoopReporter {
    fn on_tier_change(&self, _context: RetryContext) {}
}

// ---------------------------------------------------------------------------
// Entity tagging (optional collaborator for chapter titling)
// ---------------------------------------------------------------------------

/// Named-entity recognizer used to derive chapter titles. Optional: the
/// structural fallback uses ordinal titles when none is wired in.
pub trait EntityTagger: Send + Sync {
    /// People, places, and events found in the text, most salient first.
    fn entities(&self, text: &str) -> Vec<String>;
}

// ---------------------------------------------------------------------------
// Chapter store
// ---------------------------------------------------------------------------

/// Key-value update sink for chapter state. The real store lives in the
/// excluded persistence layer; [`MemoryChapterStore`] is the degraded-mode
/// stand-in selected at startup.
pub trait ChapterStore: Send + Sync {
    fn upsert(&self, chapter: Chapter) -> LoomResult<()>;

    fn chapter(&self, chapter_id: &str) -> LoomResult<Option<Chapter>>;

    /// Replace a chapter's narrative content. Locked chapters are left
    /// untouched.
    fn update_content(&self, chapter_id: &str, content: &str) -> LoomResult<()>;

    fn update_image(&self, chapter_id: &str, image_reference: &str) -> LoomResult<()>;
}

#[derive(Debug, Default)]
pub struct MemoryChapterStore {
    inner: Mutex<BTreeMap<String, Chapter>>,
}

impl MemoryChapterStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn guard(&self) -> MutexGuard<'_, BTreeMap<String, Chapter>> {
        match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

impl ChapterStore for MemoryChapterStore {
    fn upsert(&self, chapter: Chapter) -> LoomResult<()> {
        self.guard().insert(chapter.id.clone(), chapter);
        Ok(())
    }

    fn chapter(&self, chapter_id: &str) -> LoomResult<Option<Chapter>> {
        Ok(self.guard().get(chapter_id).cloned())
    }

    fn update_content(&self, chapter_id: &str, content: &str) -> LoomResult<()> {
        let mut map = self.guard();
        let chapter = map
            .get_mut(chapter_id)
            .ok_or_else(|| LoomError::InvalidRequest(format!("unknown chapter `{chapter_id}`")))?;
        if chapter.locked {
            tracing::warn!(chapter_id, "skipping content update for locked chapter");
            return Ok(());
        }
        chapter.content_text = content.to_owned();
        Ok(())
    }

    fn update_image(&self, chapter_id: &str, image_reference: &str) -> LoomResult<()> {
        let mut map = self.guard();
        let chapter = map
            .get_mut(chapter_id)
            .ok_or_else(|| LoomError::InvalidRequest(format!("unknown chapter `{chapter_id}`")))?;
        chapter.image_reference = Some(image_reference.to_owned());
        Ok(())
    }
}
