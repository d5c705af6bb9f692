//! Structural book fallback: segment a raw transcript into chapters with
//! no AI at all.
//!
//! Sentences accumulate into groups; a group closes when a narrative-pivot
//! keyword (time, place, life stage) appears in a sentence and the group
//! already carries real substance, or at end of input. Small trailing
//! groups merge backwards, oversized books merge their shortest chapter
//! into a neighbor until at most five remain. Every group is then polished
//! and titled. The function cannot fail and always yields a well-formed
//! one-to-five-chapter book.

use crate::baseline::baseline_polish;
use crate::model::{BookDraft, ChapterDraft};
use crate::provider::EntityTagger;

/// Narrative pivots: temporal, location, and life-stage markers that tend
/// to open a new episode in spoken life stories.
const PIVOT_KEYWORDS: &[&str] = &[
    "then",
    "later",
    "moved",
    "born",
    "school",
    "college",
    "work",
    "career",
    "married",
    "children",
    "finally",
    "today",
    "chennai",
    "india",
    "home",
    "university",
    "job",
    "retirement",
    "village",
    "city",
];

/// A pivot only closes a group that already has more sentences than this.
const PIVOT_GROUP_FLOOR: usize = 8;

/// Groups smaller than this never stand alone; they merge backwards.
const MIN_GROUP_SENTENCES: usize = 5;

const MAX_CHAPTERS: usize = 5;

pub const DEFAULT_SUBTITLE: &str = "A Masterfully Chronicled Legacy";
const EMPTY_SUBTITLE: &str = "A journey of legacy";

/// Number of leading words used for the default chapter summary.
const SUMMARY_WORDS: usize = 10;

/// Build a book from a transcript using only the deterministic baseline:
/// no providers, no network. This is the terminal tier of the book
/// cascade.
#[must_use]
pub fn fallback_book(transcript: &str, title: &str) -> BookDraft {
    fallback_book_with(
        transcript,
        title,
        &baseline_polish,
        &|content| first_words(content, SUMMARY_WORDS),
        None,
    )
}

/// Build a book structurally, with injectable polish/summary paths so the
/// book cascade can route chapter text through its own refinement chain,
/// and an optional entity tagger for chapter titling.
#[must_use]
pub fn fallback_book_with(
    transcript: &str,
    title: &str,
    polish: &dyn Fn(&str) -> String,
    summarize: &dyn Fn(&str) -> String,
    tagger: Option<&dyn EntityTagger>,
) -> BookDraft {
    let sentences = segment_sentences(transcript);
    if sentences.is_empty() {
        return empty_book(title);
    }

    let mut groups: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let last_index = sentences.len() - 1;

    for (index, sentence) in sentences.iter().enumerate() {
        current.push(sentence);
        let lower = sentence.to_lowercase();
        let is_pivot = current.len() > PIVOT_GROUP_FLOOR
            && PIVOT_KEYWORDS.iter().any(|pivot| lower.contains(pivot));
        let is_last = index == last_index;

        if (is_pivot || is_last) && current.len() >= MIN_GROUP_SENTENCES {
            groups.push(current.join(" "));
            current.clear();
        } else if is_last && !current.is_empty() {
            // Trailing remnant: fold into the previous chapter, or keep
            // alone when it is all we have.
            let remnant = current.join(" ");
            match groups.last_mut() {
                Some(last) => {
                    last.push(' ');
                    last.push_str(&remnant);
                }
                None => groups.push(remnant),
            }
            current.clear();
        }
    }

    merge_to_limit(&mut groups);

    let chapters = groups
        .iter()
        .enumerate()
        .map(|(index, group)| {
            let content = polish(group);
            let chapter_summary = summarize(&content);
            ChapterDraft {
                chapter_title: chapter_title(index, group, tagger),
                chapter_summary,
                content,
            }
        })
        .collect();

    BookDraft {
        title: title.to_owned(),
        subtitle: DEFAULT_SUBTITLE.to_owned(),
        chapters,
    }
}

/// Split text into sentences: a boundary is `.`, `!`, or `?` followed by
/// whitespace.
#[must_use]
pub fn segment_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        current.push(ch);
        if matches!(ch, '.' | '!' | '?')
            && chars.peek().is_none_or(|next| next.is_whitespace())
        {
            let sentence = current.trim();
            if !sentence.is_empty() {
                sentences.push(sentence.to_owned());
            }
            current.clear();
        }
    }
    let tail = current.trim();
    if !tail.is_empty() {
        sentences.push(tail.to_owned());
    }
    sentences
}

/// Merge the shortest chapter (by character length) into its neighbor
/// until at most [`MAX_CHAPTERS`] remain.
fn merge_to_limit(groups: &mut Vec<String>) {
    while groups.len() > MAX_CHAPTERS {
        let min_index = groups
            .iter()
            .enumerate()
            .min_by_key(|(_, group)| group.len())
            .map(|(index, _)| index)
            .unwrap_or(0);

        if min_index == 0 {
            let merged = groups.remove(1);
            groups[0].push(' ');
            groups[0].push_str(&merged);
        } else {
            let merged = groups.remove(min_index);
            groups[min_index - 1].push(' ');
            groups[min_index - 1].push_str(&merged);
        }
    }
}

fn chapter_title(index: usize, group: &str, tagger: Option<&dyn EntityTagger>) -> String {
    let ordinal = index + 1;
    match tagger.and_then(|tagger| tagger.entities(group).into_iter().next()) {
        Some(entity) => format!("{ordinal}. The Journey to {entity}"),
        None => format!("{ordinal}. A New Chapter"),
    }
}

/// First `count` whitespace-delimited words of `text`.
#[must_use]
pub fn first_words(text: &str, count: usize) -> String {
    text.split_whitespace()
        .take(count)
        .collect::<Vec<_>>()
        .join(" ")
}

fn empty_book(title: &str) -> BookDraft {
    BookDraft {
        title: title.to_owned(),
        subtitle: EMPTY_SUBTITLE.to_owned(),
        chapters: vec![ChapterDraft {
            chapter_title: "Our Legacy".to_owned(),
            chapter_summary: "Initial entry".to_owned(),
            content: "The story begins...".to_owned(),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::{fallback_book, fallback_book_with, first_words, segment_sentences};
    use crate::provider::EntityTagger;

    fn transcript_of(count: usize, pivot_every: usize) -> String {
        (0..count)
            .map(|i| {
                if pivot_every > 0 && i % pivot_every == pivot_every - 1 {
                    format!("And then everything changed for sentence {i}.")
                } else {
                    format!("Sentence number {i} speaks of quiet ordinary things.")
                }
            })
            .collect::<Vec<_>>()
            .join(" ")
    }

    #[test]
    fn segments_on_terminal_punctuation_before_whitespace() {
        let sentences = segment_sentences("One here. Two there! Three? Four trails on");
        assert_eq!(sentences.len(), 4);
        assert_eq!(sentences[0], "One here.");
        assert_eq!(sentences[3], "Four trails on");
        // Decimals and versions do not split.
        assert_eq!(segment_sentences("about 3.5 kilometers away.").len(), 1);
    }

    #[test]
    fn empty_transcript_yields_single_placeholder_chapter() {
        let book = fallback_book("", "My Story");
        assert_eq!(book.title, "My Story");
        assert_eq!(book.chapters.len(), 1);
        assert_eq!(book.chapters[0].chapter_title, "Our Legacy");
        assert!(!book.chapters[0].content.is_empty());
    }

    #[test]
    fn three_sentences_stay_one_chapter() {
        let book = fallback_book(
            "I was small. The house was smaller. We were happy.",
            "Title",
        );
        assert_eq!(book.chapters.len(), 1);
        assert!(!book.chapters[0].content.trim().is_empty());
    }

    #[test]
    fn long_transcript_with_pivots_lands_between_one_and_five_chapters() {
        let transcript = transcript_of(200, 10);
        let book = fallback_book(&transcript, "Long Life");
        assert!(
            (1..=5).contains(&book.chapters.len()),
            "got {} chapters",
            book.chapters.len()
        );
        for chapter in &book.chapters {
            assert!(!chapter.content.trim().is_empty());
            assert!(!chapter.chapter_summary.trim().is_empty());
        }
    }

    #[test]
    fn no_pivots_means_single_chapter_regardless_of_length() {
        let transcript = transcript_of(40, 0);
        let book = fallback_book(&transcript, "Plain");
        assert_eq!(book.chapters.len(), 1);
    }

    #[test]
    fn oversized_group_count_merges_down_to_five() {
        let transcript = transcript_of(120, 10);
        let book = fallback_book(&transcript, "Merged");
        assert!(book.chapters.len() <= 5);
        assert!(!book.chapters.is_empty());
    }

    #[test]
    fn ordinal_titles_without_tagger_entity_titles_with() {
        struct FixedTagger;
        impl EntityTagger for FixedTagger {
            fn entities(&self, _text: &str) -> Vec<String> {
                vec!["Madurai".to_owned()]
            }
        }

        let plain = fallback_book("We lived well. Days were slow. Nights were warm.", "T");
        assert_eq!(plain.chapters[0].chapter_title, "1. A New Chapter");

        let tagged = fallback_book_with(
            "We lived well. Days were slow. Nights were warm.",
            "T",
            &|text| text.to_owned(),
            &|text| super::first_words(text, 4),
            Some(&FixedTagger),
        );
        assert_eq!(tagged.chapters[0].chapter_title, "1. The Journey to Madurai");
    }

    #[test]
    fn injected_polish_path_is_used() {
        let book = fallback_book_with(
            "One sentence here. Another one there. A third follows.",
            "T",
            &|_| "POLISHED".to_owned(),
            &|text| first_words(text, 2),
            None,
        );
        assert_eq!(book.chapters[0].content, "POLISHED");
        assert_eq!(book.chapters[0].chapter_summary, "POLISHED");
    }

    #[test]
    fn first_words_truncates() {
        assert_eq!(first_words("a b c d e", 3), "a b c");
        assert_eq!(first_words("short", 10), "short");
    }
}
