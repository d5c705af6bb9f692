//! Book generation cascade.
//!
//! Cloud tiers ask a provider for a complete book as JSON and recover
//! aggressively from malformed payloads (markdown fences, prose-wrapped
//! objects, trailing commas). When every model path is gone, the
//! structural tier segments the transcript into chapters itself and
//! polishes each one through the local runtime or the baseline — so a
//! book always comes back.

use std::collections::HashSet;
use std::sync::Arc;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;

use crate::baseline::baseline_polish;
use crate::cascade::{TierOutcome, report_phase, screen_text};
use crate::error::{ErrorClass, LoomError, LoomResult};
use crate::health::HealthRegistry;
use crate::model::{BookDraft, CascadeResult, ChapterDraft, ProgressPhase, Tier};
use crate::provider::{
    EntityTagger, LocalTextRuntime, NoopReporter, ProgressReporter, RotatingTextProvider,
    TextProvider,
};
use crate::retry::BackoffPolicy;
use crate::sanitize::sanitize;
use crate::structure::{DEFAULT_SUBTITLE, fallback_book_with, first_words};

const BOOK_SYSTEM: &str = "You are a world-class biographer. Write grammatically flawless, \
    first-person memoir prose in professional English and respond with valid JSON only.";

const REGENERATE_SYSTEM: &str = "You are a professional biographer. Respond ONLY with the new \
    chapter content as plain prose.";

const REFINE_SYSTEM: &str = "Refine the provided text into polished first-person memoir \
    prose. Return ONLY the refined prose.";

const SUMMARIZE_SYSTEM: &str = "Condense the provided text into a short, vivid visual \
    description for an illustrator. Return ONLY the description.";

/// Transcripts with fewer words than this are treated as a seed and
/// expanded into a full narrative brief before the cloud tiers run.
const SEED_WORD_FLOOR: usize = 30;

const SUMMARY_FALLBACK_WORDS: usize = 10;

static TRAILING_COMMA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r",\s*([\]\}])").expect("trailing comma pattern"));

pub struct BookCascade {
    primary: Option<Arc<dyn TextProvider>>,
    secondary: Option<Arc<dyn RotatingTextProvider>>,
    local: Option<Arc<dyn LocalTextRuntime>>,
    tagger: Option<Arc<dyn EntityTagger>>,
    health: Arc<HealthRegistry>,
    reporter: Arc<dyn ProgressReporter>,
    backoff: BackoffPolicy,
}

impl BookCascade {
    #[must_use]
    pub fn new(health: Arc<HealthRegistry>) -> Self {
        Self {
            primary: None,
            secondary: None,
            local: None,
            tagger: None,
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
    pub fn with_tagger(mut self, tagger: Arc<dyn EntityTagger>) -> Self {
        self.tagger = Some(tagger);
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

    /// Generate a full book structure from a transcript. Always returns a
    /// well-formed one-to-five-chapter book.
    pub fn generate(&self, transcript: &str, title: &str) -> CascadeResult<BookDraft> {
        let brief = seed_expand(transcript);
        let prompt = book_prompt(&brief, title);

        // Tier A: primary cloud provider.
        if let Some(primary) = &self.primary
            && primary.is_configured()
        {
            report_phase(self.reporter.as_ref(), ProgressPhase::PrimaryEngaged, 0, 0.0);
            let service = format!("book.{}", primary.name());
            let outcome = match primary.complete(&prompt, BOOK_SYSTEM) {
                Ok(candidate) => match parse_book_json(&candidate, title) {
                    Ok(book) => TierOutcome::Accepted(book),
                    Err(error) => TierOutcome::Rejected(error.to_string()),
                },
                Err(error) => TierOutcome::Failed(error),
            };
            match outcome {
                TierOutcome::Accepted(book) => {
                    self.health.report_success(&service);
                    return CascadeResult::accepted(book, Tier::PrimaryCloud);
                }
                other => {
                    let reason = other.failure_reason().unwrap_or_default();
                    tracing::warn!(service = %service, reason = %reason, "primary book tier failed");
                    self.health.report_failure(&service, &reason);
                }
            }
        }

        // Tier B: rotating secondary models.
        if let Some(secondary) = &self.secondary {
            report_phase(self.reporter.as_ref(), ProgressPhase::FallbackEngaged, 0, 0.0);
            let service = format!("book.{}", secondary.name());
            match self.rotate_secondary(secondary.as_ref(), &prompt, title) {
                TierOutcome::Accepted(book) => {
                    self.health.report_success(&service);
                    return CascadeResult::accepted(book, Tier::SecondaryCloud);
                }
                other => {
                    let reason = other.failure_reason().unwrap_or_default();
                    tracing::warn!(service = %service, reason = %reason, "secondary book tier failed");
                    self.health.report_failure(&service, &reason);
                }
            }
        }

        // Tier C: local model, same JSON contract.
        if let Some(local) = &self.local {
            report_phase(self.reporter.as_ref(), ProgressPhase::LocalRescue, 0, 0.0);
            let service = format!("book.{}", local.name());
            let outcome = match local.generate(&prompt, Some(BOOK_SYSTEM)) {
                Ok(Some(candidate)) => match parse_book_json(&candidate, title) {
                    Ok(book) => TierOutcome::Accepted(book),
                    Err(error) => TierOutcome::Rejected(error.to_string()),
                },
                Ok(None) => TierOutcome::Rejected("local runtime produced no output".to_owned()),
                Err(error) => {
                    if error.class() == ErrorClass::Connectivity {
                        tracing::info!(service = %service, "local runtime offline, skipping to structural recovery");
                    }
                    TierOutcome::Failed(error)
                }
            };
            match outcome {
                TierOutcome::Accepted(book) => {
                    self.health.report_success(&service);
                    return CascadeResult::accepted(book, Tier::LocalModel);
                }
                other => {
                    let reason = other.failure_reason().unwrap_or_default();
                    self.health.report_failure(&service, &reason);
                }
            }
        }

        // Tier D: structural recovery over the raw transcript.
        let book = fallback_book_with(
            transcript,
            title,
            &|text| self.local_polish(text),
            &|text| self.local_summary(text),
            self.tagger.as_deref(),
        );
        CascadeResult::accepted(book, Tier::DeterministicBaseline)
    }

    /// Regenerate one chapter as plain prose.
    pub fn regenerate_chapter(
        &self,
        transcript: &str,
        chapter_title: &str,
        context: &str,
    ) -> CascadeResult<String> {
        let prompt = format!(
            "Regenerate the chapter \"{chapter_title}\" based on the following story \
             transcript.\n{context}\n\nTRANSCRIPT:\n{transcript}"
        );

        // Tier A.
        if let Some(primary) = &self.primary
            && primary.is_configured()
        {
            let service = format!("book.{}", primary.name());
            let outcome = match primary.complete(&prompt, REGENERATE_SYSTEM) {
                Ok(candidate) => screen_text(&candidate, &[]),
                Err(error) => TierOutcome::Failed(error),
            };
            match outcome {
                TierOutcome::Accepted(content) => {
                    self.health.report_success(&service);
                    return CascadeResult::accepted(content, Tier::PrimaryCloud);
                }
                other => {
                    let reason = other.failure_reason().unwrap_or_default();
                    self.health.report_failure(&service, &reason);
                }
            }
        }

        // Tier B.
        if let Some(secondary) = &self.secondary {
            let service = format!("book.{}", secondary.name());
            let models = secondary.models();
            let mut accepted = None;
            for model in models.iter().take(self.backoff.max_attempts as usize) {
                match secondary.complete_with(model, &prompt, REGENERATE_SYSTEM) {
                    Ok(candidate) => {
                        if let TierOutcome::Accepted(content) = screen_text(&candidate, &[]) {
                            accepted = Some(content);
                        }
                        break;
                    }
                    Err(error) if error.class() == ErrorClass::Transient => continue,
                    Err(_) => break,
                }
            }
            match accepted {
                Some(content) => {
                    self.health.report_success(&service);
                    return CascadeResult::accepted(content, Tier::SecondaryCloud);
                }
                None => self
                    .health
                    .report_failure(&service, "no usable chapter from secondary models"),
            }
        }

        // Tier C/D: local polish over the transcript, baseline beneath it.
        CascadeResult::accepted(self.local_polish(transcript), Tier::DeterministicBaseline)
    }

    fn rotate_secondary(
        &self,
        provider: &dyn RotatingTextProvider,
        prompt: &str,
        title: &str,
    ) -> TierOutcome<BookDraft> {
        let models = provider.models();
        if models.is_empty() {
            return TierOutcome::Failed(LoomError::InvalidRequest(
                "secondary provider exposes no models".to_owned(),
            ));
        }

        let mut tried: HashSet<&str> = HashSet::new();
        let mut last_failure: Option<TierOutcome<BookDraft>> = None;

        for attempt in 0..self.backoff.max_attempts {
            let Some(model) = models.iter().find(|model| !tried.contains(model.as_str()))
            else {
                break;
            };
            tried.insert(model.as_str());

            match provider.complete_with(model, prompt, BOOK_SYSTEM) {
                Ok(candidate) => {
                    return match parse_book_json(&candidate, title) {
                        Ok(book) => TierOutcome::Accepted(book),
                        Err(error) => TierOutcome::Rejected(error.to_string()),
                    };
                }
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
            TierOutcome::Failed(LoomError::ProviderBusy(
                "secondary retry budget exhausted".to_owned(),
            ))
        })
    }

    /// Chapter polish for the structural tier: local runtime if it is up,
    /// baseline underneath.
    fn local_polish(&self, text: &str) -> String {
        if let Some(local) = &self.local
            && let Ok(Some(candidate)) =
                local.generate(&format!("Refine this text:\n\n{text}"), Some(REFINE_SYSTEM))
            && let TierOutcome::Accepted(polished) = screen_text(&candidate, &[])
        {
            return polished;
        }
        baseline_polish(text)
    }

    fn local_summary(&self, text: &str) -> String {
        if let Some(local) = &self.local
            && let Ok(Some(candidate)) = local.generate(
                &format!("Describe the key visual elements of:\n\n{text}"),
                Some(SUMMARIZE_SYSTEM),
            )
            && let TierOutcome::Accepted(summary) =
                screen_text(&candidate, &["summarize:", "image prompt:"])
        {
            return summary;
        }
        let lead = first_words(text, SUMMARY_FALLBACK_WORDS);
        if lead.is_empty() {
            baseline_polish(text)
        } else {
            lead
        }
    }
}

/// Wrap very short transcripts in a narrative-expansion brief so the
/// cloud tiers produce a substantial book instead of a one-liner.
#[must_use]
pub fn seed_expand(transcript: &str) -> String {
    if transcript.split_whitespace().count() >= SEED_WORD_FLOOR {
        return transcript.to_owned();
    }
    format!(
        "The following memory is the seed of a legacy: {transcript}. Bloom this short \
         memory into a substantial, multi-chapter narrative chronicling the depth hidden \
         within these few words."
    )
}

fn book_prompt(transcript: &str, title: &str) -> String {
    format!(
        "Transform the following transcript into a profound first-person memoir titled \
         \"{title}\". Break the story into 3 to 5 substantial chapters with evocative \
         titles. Respond ONLY with valid JSON of the form \
         {{\"title\": \"...\", \"subtitle\": \"...\", \"chapters\": \
         [{{\"chapter_title\": \"...\", \"chapter_summary\": \"...\", \"content\": \"...\"}}]}}.\
         \n\nTRANSCRIPT:\n{transcript}"
    )
}

#[derive(Debug, Deserialize)]
struct RawBook {
    title: Option<String>,
    subtitle: Option<String>,
    #[serde(default)]
    chapters: Vec<RawChapter>,
}

#[derive(Debug, Deserialize)]
struct RawChapter {
    chapter_title: Option<String>,
    chapter_summary: Option<String>,
    content: String,
}

/// Parse a provider's book JSON with structural recovery: markdown fences
/// are stripped, a JSON object embedded in prose is sliced out, and one
/// repair pass removes trailing commas before giving up.
pub fn parse_book_json(text: &str, fallback_title: &str) -> LoomResult<BookDraft> {
    let mut body = text.replace("```json", "").replace("```", "");
    body = body.trim().to_owned();

    if !body.starts_with('{')
        && let (Some(start), Some(end)) = (body.find('{'), body.rfind('}'))
        && start < end
    {
        body = body[start..=end].to_owned();
    }

    let raw: RawBook = match serde_json::from_str(&body) {
        Ok(raw) => raw,
        Err(_) => {
            let repaired = TRAILING_COMMA.replace_all(&body, "$1");
            serde_json::from_str(&repaired)?
        }
    };

    let chapters: Vec<ChapterDraft> = raw
        .chapters
        .into_iter()
        .enumerate()
        .map(|(index, chapter)| ChapterDraft {
            chapter_title: chapter
                .chapter_title
                .unwrap_or_else(|| format!("{}. A New Chapter", index + 1)),
            chapter_summary: chapter.chapter_summary.unwrap_or_default(),
            content: sanitize(&chapter.content),
        })
        .filter(|chapter| !chapter.content.trim().is_empty())
        .collect();

    if chapters.is_empty() {
        return Err(LoomError::ProviderFailed(
            "book JSON contained no usable chapters".to_owned(),
        ));
    }

    Ok(BookDraft {
        title: raw.title.unwrap_or_else(|| fallback_title.to_owned()),
        subtitle: raw
            .subtitle
            .unwrap_or_else(|| DEFAULT_SUBTITLE.to_owned()),
        chapters,
    })
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::{BookCascade, parse_book_json, seed_expand};
    use crate::error::{LoomError, LoomResult};
    use crate::health::HealthRegistry;
    use crate::model::Tier;
    use crate::provider::TextProvider;
    use crate::retry::BackoffPolicy;

    const BOOK_JSON: &str = r#"{
        "title": "Harvest Days",
        "subtitle": "A Life Remembered",
        "chapters": [
            {
                "chapter_title": "The Village",
                "chapter_summary": "a child in a paddy field at dawn",
                "content": "Refined: I was born where the fields met the river."
            }
        ]
    }"#;

    struct CapturingPrimary {
        reply: String,
        prompts: Mutex<Vec<String>>,
    }

    impl TextProvider for CapturingPrimary {
        fn name(&self) -> &'static str {
            "capturing-primary"
        }
        fn complete(&self, prompt: &str, _system: &str) -> LoomResult<String> {
            self.prompts.lock().unwrap().push(prompt.to_owned());
            if self.reply.is_empty() {
                Err(LoomError::ProviderFailed("no reply scripted".to_owned()))
            } else {
                Ok(self.reply.clone())
            }
        }
    }

    fn cascade_with_primary(reply: &str) -> (BookCascade, Arc<CapturingPrimary>) {
        let primary = Arc::new(CapturingPrimary {
            reply: reply.to_owned(),
            prompts: Mutex::new(Vec::new()),
        });
        let cascade = BookCascade::new(Arc::new(HealthRegistry::new()))
            .with_backoff(BackoffPolicy::immediate(2))
            .with_primary(Arc::clone(&primary) as Arc<dyn TextProvider>);
        (cascade, primary)
    }

    const LONG_TRANSCRIPT: &str = "I was born in a small village by the river. The \
        mornings began before sunrise. My mother cooked over a wood fire. My father \
        mended nets on the porch. We walked to the school across two fields. The rains \
        came every June without fail. Everything smelled of wet earth for weeks.";

    #[test]
    fn parse_accepts_clean_json() {
        let book = parse_book_json(BOOK_JSON, "Fallback").unwrap();
        assert_eq!(book.title, "Harvest Days");
        assert_eq!(book.chapters.len(), 1);
        // Content is sanitized: the task label is gone.
        assert!(!book.chapters[0].content.contains("Refined:"));
        assert!(book.chapters[0].content.contains("fields met the river"));
    }

    #[test]
    fn parse_strips_fences_and_slices_prose() {
        let fenced = format!("```json\n{BOOK_JSON}\n```");
        assert!(parse_book_json(&fenced, "T").is_ok());

        let wrapped = format!("Certainly, here is your book:\n{BOOK_JSON}\nEnjoy!");
        assert!(parse_book_json(&wrapped, "T").is_ok());
    }

    #[test]
    fn parse_repairs_trailing_commas() {
        let broken = r#"{
            "title": "T",
            "chapters": [
                {"chapter_title": "One", "chapter_summary": "s", "content": "The rains came early.",},
            ],
        }"#;
        let book = parse_book_json(broken, "T").unwrap();
        assert_eq!(book.chapters.len(), 1);
    }

    #[test]
    fn parse_rejects_empty_and_chapterless_payloads() {
        assert!(parse_book_json("not json at all", "T").is_err());
        assert!(parse_book_json(r#"{"title": "T", "chapters": []}"#, "T").is_err());
    }

    #[test]
    fn parse_fills_missing_title_and_subtitle() {
        let minimal = r#"{"chapters": [{"content": "A long enough chapter body."}]}"#;
        let book = parse_book_json(minimal, "Given Title").unwrap();
        assert_eq!(book.title, "Given Title");
        assert!(!book.subtitle.is_empty());
        assert_eq!(book.chapters[0].chapter_title, "1. A New Chapter");
    }

    #[test]
    fn primary_json_reply_is_accepted() {
        let (cascade, _) = cascade_with_primary(BOOK_JSON);
        let result = cascade.generate(LONG_TRANSCRIPT, "Harvest Days");
        assert_eq!(result.tier, Tier::PrimaryCloud);
        assert!(result.value.is_well_formed());
    }

    #[test]
    fn unparseable_primary_reply_falls_to_structural_tier() {
        let (cascade, _) = cascade_with_primary("I am sorry, I cannot produce JSON.");
        let result = cascade.generate(LONG_TRANSCRIPT, "My Story");
        assert_eq!(result.tier, Tier::DeterministicBaseline);
        assert!(result.value.is_well_formed());
        assert_eq!(result.value.title, "My Story");
        assert!((1..=5).contains(&result.value.chapters.len()));
    }

    #[test]
    fn no_providers_at_all_still_yields_a_book() {
        let cascade = BookCascade::new(Arc::new(HealthRegistry::new()));
        let result = cascade.generate(LONG_TRANSCRIPT, "Alone");
        assert_eq!(result.tier, Tier::DeterministicBaseline);
        assert!(result.value.is_well_formed());
    }

    #[test]
    fn short_transcript_is_seed_expanded_for_cloud_tiers() {
        let (cascade, primary) = cascade_with_primary(BOOK_JSON);
        let _ = cascade.generate("Grandfather's lost kitten.", "Seed");

        let prompts = primary.prompts.lock().unwrap();
        assert!(prompts[0].contains("seed of a legacy"));
        assert!(prompts[0].contains("Grandfather's lost kitten."));
    }

    #[test]
    fn long_transcript_is_not_seed_expanded() {
        assert_eq!(seed_expand(LONG_TRANSCRIPT), LONG_TRANSCRIPT);
        assert!(seed_expand("tiny memory").contains("seed of a legacy"));
    }

    #[test]
    fn regenerate_chapter_prefers_primary_prose() {
        let (cascade, _) = cascade_with_primary(
            "The monsoon chapter, rewritten: rain hammered the tin roof for nine days \
             while we counted lentils and told old stories.",
        );
        let result = cascade.regenerate_chapter(LONG_TRANSCRIPT, "The Rains", "");
        assert_eq!(result.tier, Tier::PrimaryCloud);
        assert!(result.value.contains("tin roof"));
    }

    #[test]
    fn regenerate_chapter_without_providers_uses_baseline() {
        let cascade = BookCascade::new(Arc::new(HealthRegistry::new()));
        let result = cascade.regenerate_chapter("a short memory of rain.", "Rain", "");
        assert_eq!(result.tier, Tier::DeterministicBaseline);
        assert!(!result.value.is_empty());
    }
}
