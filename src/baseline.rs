//! Rule-based text polish: the unconditional floor of every text cascade.
//!
//! No model, no network, no failure mode. Whatever the providers above it
//! did, [`baseline_polish`] turns any printable input into a non-empty,
//! printable, ASCII-only result.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::sanitize;

/// Returned when the input itself is empty.
pub const EMPTY_INPUT_PLACEHOLDER: &str = "A legacy of moments and memories.";

/// Returned when polishing strips the input down to nothing usable.
pub const SHORT_RESULT_PLACEHOLDER: &str =
    "This chapter of life is being recounted with great care.";

const MIN_USABLE_CHARS: usize = 5;

/// Spoken filler and discourse-particle vocabulary for the code-switched
/// Roman-script locale mix this pipeline targets.
static FILLER_TABLES: Lazy<[Regex; 2]> = Lazy::new(|| {
    [
        Regex::new(
            r"(?i)\b(la|da|na|pa|dei|machan|ra|ga|umm+|ahh+|like|you\s+know|basically|actually|literally|meaning|what\s+happened|u\s+know|you\s+see|ya|ma|paa|nga|re|yaar)\b",
        )
        .expect("filler table one"),
        Regex::new(
            r"(?i)\b(seri|enna|epdi|romba|konjam|naan|poren|irukken|vandhu|appram|nu|iru|va|solu|pannu|podu)\b",
        )
        .expect("filler table two"),
    ]
});

/// Common spoken-grammar fixes. Verb corrections run before the pronoun
/// capitalization so `\bi\s+is\b` still sees the lowercase pronoun.
static GRAMMAR_TABLE: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    vec![
        (Regex::new(r"(?i)\bi\s+is\b").expect("i is"), "I am"),
        (Regex::new(r"(?i)\byou\s+was\b").expect("you was"), "you were"),
        (Regex::new(r"(?i)\bwe\s+was\b").expect("we was"), "we were"),
        (
            Regex::new(r"(?i)\bthey\s+was\b").expect("they was"),
            "they were",
        ),
        (Regex::new(r"(?i)\bgonna\b").expect("gonna"), "going to"),
        (Regex::new(r"(?i)\bwanna\b").expect("wanna"), "want to"),
        (Regex::new(r"(?i)\bgotta\b").expect("gotta"), "got to"),
        (Regex::new(r"\bi\b").expect("bare i"), "I"),
        (Regex::new(r"\ba\s+([aeiou])").expect("article"), "an $1"),
    ]
});

/// Polish text using pure logic. Never fails and never touches the
/// network; for any printable input (including the empty string) the
/// result is non-empty and contains only ASCII characters.
#[must_use]
pub fn baseline_polish(text: &str) -> String {
    if text.trim().is_empty() {
        return EMPTY_INPUT_PLACEHOLDER.to_owned();
    }

    // 1. hard ASCII-only policy for the Roman-script target
    let mut polished: String = text.chars().filter(char::is_ascii).collect();

    // 2. filler vocabulary removal
    for table in FILLER_TABLES.iter() {
        polished = table.replace_all(&polished, "").into_owned();
    }

    // 3. grammar corrections
    for (pattern, replacement) in GRAMMAR_TABLE.iter() {
        polished = pattern.replace_all(&polished, *replacement).into_owned();
    }

    // 4. stutter collapse
    polished = collapse_adjacent_duplicates(&polished);

    // 5. shared sanitizer pass
    polished = sanitize::sanitize(&polished);

    // 6. resilience floor
    if polished.trim().chars().count() < MIN_USABLE_CHARS {
        return SHORT_RESULT_PLACEHOLDER.to_owned();
    }

    // 7. sentence capitalization
    sanitize::capitalize_sentences(polished.trim())
}

/// Plain adjacent-duplicate collapse over whitespace tokens,
/// case-insensitive, first occurrence wins.
fn collapse_adjacent_duplicates(text: &str) -> String {
    let mut kept: Vec<&str> = Vec::new();
    for token in text.split_whitespace() {
        if let Some(prev) = kept.last()
            && prev.eq_ignore_ascii_case(token)
        {
            continue;
        }
        kept.push(token);
    }
    kept.join(" ")
}
