//! Chapter illustration cascade.
//!
//! Five producer tiers: primary image synthesis, a prompt-optimized
//! request to a secondary service (probed for reachability before it is
//! trusted), a pre-generated image index, a slow community-compute queue
//! polled under a bounded budget, and finally the deterministic local
//! placeholder. Downstream of any URL-bearing tier, [`ImageCascade::materialize`]
//! downloads and validates the actual bytes (content type, minimum size,
//! magic number), rotating to alternate URL forms mid-retry and
//! substituting the placeholder when everything fails.

use std::sync::Arc;
use std::time::Duration;

use crate::cascade::report_phase;
use crate::config::CascadeConfig;
use crate::error::{LoomError, LoomResult};
use crate::health::HealthRegistry;
use crate::model::{ImageOutcome, ImageRef, ImageSource, ProgressPhase};
use crate::placeholder::render_placeholder;
use crate::provider::{
    FetchedImage, ImageFetcher, ImageIndex, ImageProvider, ImageQueue, NoopReporter,
    ProgressReporter, RotatingTextProvider,
};
use crate::quality::is_junk;
use crate::retry::BackoffPolicy;
use crate::structure::first_words;

const OPTIMIZER_SYSTEM: &str = "Extract descriptive visual elements from biography snippets \
    as short comma-separated noun phrases. Keep them professional and family-suitable.";

/// Downloaded images smaller than this are rejected as error pages.
const MIN_IMAGE_BYTES: usize = 2000;

/// Magic numbers accepted by the byte validator: JPEG, PNG, WebP.
const VALID_MAGIC: [&[u8]; 3] = [b"\xff\xd8", b"\x89PNG", b"RIFF"];

/// Placeholder seeds use the leading characters of the chapter summary so
/// identical chapters get identical placeholder art.
const SEED_CHARS: usize = 30;

/// Download attempt (zero-based) at which the alternate URL form kicks in.
const ALTERNATE_URL_ATTEMPT: u32 = 2;

pub struct ImageCascade {
    primary: Option<Arc<dyn ImageProvider>>,
    secondary: Option<Arc<dyn ImageProvider>>,
    prompt_optimizer: Option<Arc<dyn RotatingTextProvider>>,
    index: Option<Arc<dyn ImageIndex>>,
    queue: Option<Arc<dyn ImageQueue>>,
    fetcher: Option<Arc<dyn ImageFetcher>>,
    health: Arc<HealthRegistry>,
    reporter: Arc<dyn ProgressReporter>,
    backoff: BackoffPolicy,
    queue_poll_budget: u32,
    queue_poll_interval: Duration,
    download_attempts: u32,
}

impl ImageCascade {
    #[must_use]
    pub fn new(health: Arc<HealthRegistry>) -> Self {
        let defaults = CascadeConfig::default();
        Self {
            primary: None,
            secondary: None,
            prompt_optimizer: None,
            index: None,
            queue: None,
            fetcher: None,
            health,
            reporter: Arc::new(NoopReporter),
            backoff: BackoffPolicy::default(),
            queue_poll_budget: defaults.queue_poll_budget,
            queue_poll_interval: defaults.queue_poll_interval,
            download_attempts: defaults.download_attempts,
        }
    }

    #[must_use]
    pub fn with_config(mut self, config: &CascadeConfig) -> Self {
        self.backoff = config.backoff.clone();
        self.queue_poll_budget = config.queue_poll_budget;
        self.queue_poll_interval = config.queue_poll_interval;
        self.download_attempts = config.download_attempts;
        self
    }

    #[must_use]
    pub fn with_primary(mut self, provider: Arc<dyn ImageProvider>) -> Self {
        self.primary = Some(provider);
        self
    }

    #[must_use]
    pub fn with_secondary(mut self, provider: Arc<dyn ImageProvider>) -> Self {
        self.secondary = Some(provider);
        self
    }

    #[must_use]
    pub fn with_prompt_optimizer(mut self, provider: Arc<dyn RotatingTextProvider>) -> Self {
        self.prompt_optimizer = Some(provider);
        self
    }

    #[must_use]
    pub fn with_index(mut self, index: Arc<dyn ImageIndex>) -> Self {
        self.index = Some(index);
        self
    }

    #[must_use]
    pub fn with_queue(mut self, queue: Arc<dyn ImageQueue>) -> Self {
        self.queue = Some(queue);
        self
    }

    #[must_use]
    pub fn with_fetcher(mut self, fetcher: Arc<dyn ImageFetcher>) -> Self {
        self.fetcher = Some(fetcher);
        self
    }

    #[must_use]
    pub fn with_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Obtain an image reference for a chapter summary. Never fails: the
    /// placeholder tier terminates the cascade unconditionally.
    pub fn generate(&self, chapter_summary: &str, style: &str) -> ImageOutcome {
        // Tier 1: primary synthesis.
        if let Some(primary) = &self.primary
            && primary.is_configured()
        {
            report_phase(self.reporter.as_ref(), ProgressPhase::PrimaryEngaged, 0, 0.0);
            let service = format!("image.{}", primary.name());
            let prompt = format!(
                "A beautiful, high-quality {style} illustration for a family biography \
                 book: {chapter_summary}. Cinematic lighting, emotional depth, no text."
            );
            match primary.synthesize(&prompt) {
                Ok(reference) => {
                    self.health.report_success(&service);
                    return ImageOutcome {
                        reference,
                        source: ImageSource::Primary,
                        visual_prompt: None,
                    };
                }
                Err(error) => {
                    tracing::warn!(service = %service, %error, "primary image tier failed");
                    self.health.report_failure(&service, &error.to_string());
                }
            }
        }

        report_phase(self.reporter.as_ref(), ProgressPhase::FallbackEngaged, 0, 0.0);
        let visual_prompt = self.optimize_prompt(chapter_summary);

        // Tier 2: prompt-optimized secondary, probed before trusting.
        // The probe is an optimization only; byte-level validation at
        // download time remains the real gate.
        if let Some(secondary) = &self.secondary
            && secondary.is_configured()
        {
            let service = format!("image.{}", secondary.name());
            let prompt = format!(
                "Professional biography illustration of {visual_prompt}. High-quality, \
                 historical setting, artistic, family suitable, no text."
            );
            match secondary.synthesize(&prompt) {
                Ok(reference) => {
                    if self.probe_ok(&reference) {
                        self.health.report_success(&service);
                        return ImageOutcome {
                            reference,
                            source: ImageSource::PromptOptimized,
                            visual_prompt: Some(visual_prompt),
                        };
                    }
                    self.health
                        .report_failure(&service, "reachability probe failed");
                }
                Err(error) => {
                    self.health.report_failure(&service, &error.to_string());
                }
            }
        }

        // Tier 3: pre-generated image index.
        if let Some(index) = &self.index {
            let service = format!("image.{}", index.name());
            let query = format!("biography book illustration {visual_prompt}");
            match index.search(&query) {
                Ok(Some(reference)) => {
                    self.health.report_success(&service);
                    return ImageOutcome {
                        reference,
                        source: ImageSource::IndexSearch,
                        visual_prompt: Some(visual_prompt),
                    };
                }
                Ok(None) => {
                    tracing::info!(service = %service, "image index had no match");
                }
                Err(error) => {
                    self.health.report_failure(&service, &error.to_string());
                }
            }
        }

        // Tier 4: community-compute queue, bounded polling.
        if let Some(queue) = &self.queue
            && let Some(reference) = self.poll_queue(queue.as_ref(), &visual_prompt)
        {
            return ImageOutcome {
                reference,
                source: ImageSource::CommunityQueue,
                visual_prompt: Some(visual_prompt),
            };
        }

        // Tier 5: deterministic local placeholder.
        report_phase(self.reporter.as_ref(), ProgressPhase::LocalRescue, 0, 0.0);
        ImageOutcome {
            reference: ImageRef::Placeholder {
                seed: placeholder_seed_text(chapter_summary),
            },
            source: ImageSource::Placeholder,
            visual_prompt: Some(visual_prompt),
        }
    }

    /// Turn an image reference into validated bytes. URL references are
    /// downloaded under the guarded retry loop; on total failure (or when
    /// no fetcher is wired in) the placeholder is rendered from
    /// `fallback_seed`.
    #[must_use]
    pub fn materialize(&self, reference: &ImageRef, fallback_seed: &str) -> Vec<u8> {
        match reference {
            ImageRef::Placeholder { seed } => render_placeholder(seed),
            ImageRef::Url { url } => self
                .download_validated(url)
                .unwrap_or_else(|| render_placeholder(fallback_seed)),
        }
    }

    fn download_validated(&self, url: &str) -> Option<Vec<u8>> {
        let fetcher = self.fetcher.as_ref()?;
        let mut current = url.to_owned();

        for attempt in 0..self.download_attempts {
            if attempt == ALTERNATE_URL_ATTEMPT
                && let Some(alternate) = self.alternate_url(&current)
            {
                tracing::info!(url = %alternate, "rotating to alternate url form");
                current = alternate;
            }

            match fetcher.get(&current) {
                Ok(image) => match validate_image(&image) {
                    Ok(()) => return Some(image.bytes),
                    Err(error) => {
                        tracing::warn!(attempt, %error, "downloaded image failed validation");
                    }
                },
                Err(error) => {
                    tracing::warn!(attempt, %error, "image download failed");
                }
            }

            if attempt + 1 < self.download_attempts {
                std::thread::sleep(self.backoff.base_delay.saturating_mul(attempt + 1));
            }
        }

        tracing::error!(url = %url, "all image downloads failed, substituting placeholder");
        None
    }

    fn alternate_url(&self, url: &str) -> Option<String> {
        if let Some(secondary) = &self.secondary
            && let Some(alternate) = secondary.alternate_url(url)
        {
            return Some(alternate);
        }
        self.primary
            .as_ref()
            .and_then(|primary| primary.alternate_url(url))
    }

    fn probe_ok(&self, reference: &ImageRef) -> bool {
        let ImageRef::Url { url } = reference else {
            return true;
        };
        let Some(fetcher) = &self.fetcher else {
            // No probe transport wired in: trust the reference and let
            // download-time validation decide.
            return true;
        };
        match fetcher.head(url) {
            Ok(info) => {
                info.reachable
                    && info
                        .content_type
                        .as_deref()
                        .is_none_or(|kind| kind.contains("image"))
            }
            Err(error) => {
                tracing::warn!(%error, "image probe failed");
                false
            }
        }
    }

    /// Derive a compact visual prompt from the chapter summary via the
    /// optimizer provider under the shared backoff policy; leading words
    /// of the summary when no optimizer answers.
    fn optimize_prompt(&self, summary: &str) -> String {
        let fallback = first_words(summary, 4);
        let Some(optimizer) = &self.prompt_optimizer else {
            return fallback;
        };
        let models = optimizer.models();
        if models.is_empty() {
            return fallback;
        }

        let prompt = format!(
            "Extract 4 or 5 descriptive visual elements from this biography snippet, as \
             comma-separated noun phrases:\n\n{summary}"
        );
        let reporter = Arc::clone(&self.reporter);
        let result = self.backoff.execute(
            |attempt| {
                let model = &models[attempt as usize % models.len()];
                optimizer.complete_with(model, &prompt, OPTIMIZER_SYSTEM)
            },
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
            Ok(text) if !is_junk(&text) => text.replace(['"', '.'], "").trim().to_owned(),
            _ => fallback,
        }
    }

    fn poll_queue(&self, queue: &dyn ImageQueue, visual_prompt: &str) -> Option<ImageRef> {
        let service = format!("image.{}", queue.name());
        let ticket = match queue.submit(visual_prompt) {
            Ok(ticket) => ticket,
            Err(error) => {
                self.health.report_failure(&service, &error.to_string());
                return None;
            }
        };

        for _ in 0..self.queue_poll_budget {
            std::thread::sleep(self.queue_poll_interval);
            match queue.poll(&ticket) {
                Ok(Some(reference)) => {
                    self.health.report_success(&service);
                    return Some(reference);
                }
                Ok(None) => {}
                Err(error) => {
                    self.health.report_failure(&service, &error.to_string());
                    return None;
                }
            }
        }
        self.health
            .report_failure(&service, "queue poll budget exhausted");
        None
    }
}

/// Validate downloaded image bytes: content type, minimum size, and a
/// known magic number.
pub fn validate_image(image: &FetchedImage) -> LoomResult<()> {
    if !image.content_type.to_lowercase().contains("image") {
        return Err(LoomError::ImageValidation(format!(
            "invalid content type: {}",
            image.content_type
        )));
    }
    if image.bytes.len() < MIN_IMAGE_BYTES {
        return Err(LoomError::ImageValidation(format!(
            "file too small: {} bytes",
            image.bytes.len()
        )));
    }
    if !VALID_MAGIC
        .iter()
        .any(|magic| image.bytes.starts_with(magic))
    {
        return Err(LoomError::ImageValidation(
            "not a valid image header".to_owned(),
        ));
    }
    Ok(())
}

fn placeholder_seed_text(chapter_summary: &str) -> String {
    chapter_summary.chars().take(SEED_CHARS).collect()
}
