//! Output sanitization for AI-produced prose.
//!
//! Providers leak task labels ("Summary:"), polite preambles, markdown
//! fences, thinking spans, and stutter repetitions into their output. The
//! sanitizer strips all of it and normalizes whitespace, punctuation, and
//! sentence capitalization. It never fails: on any internal
//! pattern-matching problem the input is returned unchanged.

use once_cell::sync::Lazy;
use regex::Regex;

static FENCE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```[a-z]*\n?").expect("fence pattern"));

static THINK_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<think>.*?</think>").expect("think pattern"));

static THOUGHT_SPAN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)\[thought\].*?\[/thought\]").expect("thought pattern"));

/// Task-label prefixes such as "Summary:", "Refined -", "Output:".
static TASK_LABEL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(paraphrased?|summar\w+|refined|corrected|polished|rephrased|output|result|note|translation|translated|prose|narrative)\s*[:\-]+\s*",
    )
    .expect("task label pattern")
});

/// Polite assistant preambles ("Here is the refined text:"). Only strips
/// when a colon or dash terminates the phrase, so narrative uses of
/// "here is the ..." survive.
static PREAMBLE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(here is|here's|this is|certainly|sure|absolutely)[,\s]+the\s+(refined|corrected|polished|final)?\s*(text|prose|translation|result|narrative|story|version)?\s*[:\-]+\s*",
    )
    .expect("preamble pattern")
});

/// Bare courtesy openers anchored to the start of the string.
static COURTESY_OPENER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(certainly|sure|here you go|absolutely|no problem)[,!. ]+")
        .expect("courtesy pattern")
});

/// Spoken-filler tokens for the Roman-script code-switched locale mix.
static FILLERS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(la|da|na|pa|dei|machan|kanne|ra|ga|umm+|ahh+|you know|basically)\b[ ,]*")
        .expect("filler pattern")
});

static WHITESPACE_RUN: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").expect("ws pattern"));

static DOT_SPACE_DOT: Lazy<Regex> = Lazy::new(|| Regex::new(r"\.\s+\.").expect("dot pattern"));

static REPEAT_PUNCT: Lazy<[(Regex, &'static str); 4]> = Lazy::new(|| {
    [
        (Regex::new(r"\.{2,}").expect("dots"), "."),
        (Regex::new(r"!{2,}").expect("bangs"), "!"),
        (Regex::new(r"\?{2,}").expect("questions"), "?"),
        (Regex::new(r",{2,}").expect("commas"), ","),
    ]
});

/// Sanitize AI output with no caller-supplied prefixes.
#[must_use]
pub fn sanitize(text: &str) -> String {
    sanitize_with_prefixes(text, &[])
}

/// Sanitize AI output, additionally stripping any of `known_prefixes`
/// anchored at the start of the string (e.g. the prompt's own label that a
/// model echoed back).
///
/// Empty input returns empty input.
#[must_use]
pub fn sanitize_with_prefixes(text: &str, known_prefixes: &[&str]) -> String {
    if text.trim().is_empty() {
        return text.to_owned();
    }

    // 1. markdown fences and thinking spans, content included
    let mut cleaned = FENCE.replace_all(text, "").into_owned();
    cleaned = cleaned.replace("```", "");
    cleaned = THINK_SPAN.replace_all(&cleaned, "").into_owned();
    cleaned = THOUGHT_SPAN.replace_all(&cleaned, "").into_owned();

    // 2. artifact labels, preambles, fillers, caller prefixes
    cleaned = TASK_LABEL.replace_all(&cleaned, " ").into_owned();
    cleaned = PREAMBLE.replace_all(&cleaned, " ").into_owned();
    cleaned = COURTESY_OPENER.replace(cleaned.trim_start(), "").into_owned();
    cleaned = FILLERS.replace_all(&cleaned, "").into_owned();
    for prefix in known_prefixes {
        let anchored = format!(r"(?i)^\s*{}\s*", regex::escape(prefix));
        if let Ok(pattern) = Regex::new(&anchored) {
            cleaned = pattern.replace(&cleaned, "").into_owned();
        }
    }

    // 3. iterate until stable: nested labels surface after outer ones are
    //    removed, and stutter collapse can expose further stutters
    loop {
        let before = cleaned.len();
        cleaned = TASK_LABEL.replace_all(&cleaned, " ").into_owned();
        cleaned = collapse_repeated_words(&cleaned);
        if cleaned.len() == before {
            break;
        }
    }

    // 4. whitespace and punctuation runs
    cleaned = WHITESPACE_RUN.replace_all(&cleaned, " ").into_owned();
    loop {
        let before = cleaned.len();
        cleaned = DOT_SPACE_DOT.replace_all(&cleaned, ".").into_owned();
        if cleaned.len() == before {
            break;
        }
    }
    for (pattern, replacement) in REPEAT_PUNCT.iter() {
        cleaned = pattern.replace_all(&cleaned, *replacement).into_owned();
    }

    // 5. sentence capitalization
    capitalize_sentences(cleaned.trim())
}

/// Collapse immediate word repetitions ("the the" -> "the"),
/// case-insensitively and word-boundary aware: trailing punctuation on the
/// dropped duplicate is carried onto the kept word.
#[must_use]
pub fn collapse_repeated_words(text: &str) -> String {
    let mut kept: Vec<String> = Vec::new();
    for token in text.split_whitespace() {
        let key = word_key(token);
        if !key.is_empty()
            && let Some(prev) = kept.last()
            && word_key(prev) == key
        {
            let trail = trailing_punct(token);
            if !trail.is_empty() && trailing_punct(prev).is_empty() {
                let merged = format!("{prev}{trail}");
                *kept.last_mut().expect("non-empty") = merged;
            }
            continue;
        }
        kept.push(token.to_owned());
    }
    kept.join(" ")
}

fn word_key(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_lowercase()
}

fn trailing_punct(token: &str) -> String {
    let tail: Vec<char> = token
        .chars()
        .rev()
        .take_while(|c| !c.is_alphanumeric())
        .collect();
    tail.into_iter().rev().collect()
}

/// Upper-case the first letter of each sentence. Sentence boundaries are
/// `.`, `!`, or `?` followed by whitespace.
#[must_use]
pub fn capitalize_sentences(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut boundary = true;
    let mut after_terminal = false;

    for ch in text.chars() {
        if ch.is_whitespace() {
            if after_terminal {
                boundary = true;
            }
            out.push(ch);
            continue;
        }
        after_terminal = matches!(ch, '.' | '!' | '?');
        if boundary && ch.is_alphabetic() {
            out.extend(ch.to_uppercase());
        } else {
            out.push(ch);
        }
        boundary = false;
    }
    out
}
