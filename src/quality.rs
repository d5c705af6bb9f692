//! Junk detection for AI-produced text.
//!
//! A cascade never trusts provider output blindly: each candidate passes
//! through [`is_junk`] before acceptance, and the conversational cascades
//! additionally screen for task-deflection replies via
//! [`is_meta_response`]. Both checks are pure functions over the text and
//! run without any network access.

/// Anything shorter than this after trimming is unusable.
const MIN_USABLE_CHARS: usize = 5;

/// More than this fraction of characters outside the ASCII range marks
/// wrong-script garbage for the Roman-script pipeline.
const NON_ASCII_RATIO_LIMIT: f64 = 0.30;

/// Repetition screening only applies to texts with more tokens than this.
const REPETITION_TOKEN_THRESHOLD: usize = 20;

/// Distinct-token ratio below this marks degenerate looping output.
const DISTINCT_RATIO_FLOOR: f64 = 0.30;

/// Meta-commentary only condemns short replies; long prose that merely
/// mentions such a phrase is not penalized.
const META_LENGTH_CEILING: usize = 100;

/// Phrases of a model talking about the task instead of doing it.
const META_MARKERS: &[&str] = &[
    "please provide",
    "the text is not",
    "translate the",
    "as an ai",
    "i cannot",
    "here is the",
    "translation of",
];

/// Task-deflection replies ("send me the text first") that the text and
/// book cascades reject at any length.
const META_RESPONSE_PHRASES: &[&str] = &[
    "please provide",
    "provide the text",
    "provide the raw",
    "what would you like",
    "i need the text",
    "kindly share",
    "once you provide",
    "once the input",
];

/// Classify a candidate output as unusable.
///
/// Rules are evaluated in order; any match condemns the text:
/// 1. empty or shorter than 5 characters after trimming,
/// 2. more than 30% of characters outside the ASCII range,
/// 3. for texts over 20 tokens, a distinct-token ratio under 0.30,
/// 4. a meta-commentary marker in a reply under 100 characters.
#[must_use]
pub fn is_junk(text: &str) -> bool {
    let trimmed = text.trim();
    if trimmed.chars().count() < MIN_USABLE_CHARS {
        return true;
    }

    let total = text.chars().count();
    let non_ascii = text.chars().filter(|c| !c.is_ascii()).count();
    if non_ascii as f64 > total as f64 * NON_ASCII_RATIO_LIMIT {
        return true;
    }

    let lower = text.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();
    if words.len() > REPETITION_TOKEN_THRESHOLD {
        let distinct: std::collections::HashSet<&str> = words.iter().copied().collect();
        let unique_ratio = distinct.len() as f64 / words.len() as f64;
        if unique_ratio < DISTINCT_RATIO_FLOOR {
            return true;
        }
    }

    if total < META_LENGTH_CEILING && META_MARKERS.iter().any(|marker| lower.contains(marker)) {
        return true;
    }

    false
}

/// Whether the text reads as a request for input rather than a result.
/// Checked independently of [`is_junk`] so that even a long, fluent
/// deflection ("Certainly! Once you provide the text, I will...") is
/// rejected by the cascades.
#[must_use]
pub fn is_meta_response(text: &str) -> bool {
    let lower = text.to_lowercase();
    META_RESPONSE_PHRASES
        .iter()
        .any(|phrase| lower.contains(phrase))
}

#[cfg(test)]
mod tests {
    use super::{is_junk, is_meta_response};

    #[test]
    fn empty_and_tiny_inputs_are_junk() {
        assert!(is_junk(""));
        assert!(is_junk("   "));
        assert!(is_junk("ok"));
        assert!(is_junk("hey\n"));
    }

    #[test]
    fn coherent_paragraph_is_not_junk() {
        let paragraph = "I grew up in a small coastal town where the mornings \
            smelled of salt and diesel from the fishing boats. My grandfather \
            taught me to mend nets on the porch, and those quiet hours shaped \
            how I think about patience, repair, and the slow accumulation of \
            skill over many unremarkable days.";
        assert!(!is_junk(paragraph));
    }

    #[test]
    fn degenerate_repetition_is_junk() {
        let looping = "the cat sat down ".repeat(30);
        assert!(is_junk(&looping));
    }

    #[test]
    fn short_varied_text_is_not_flagged_by_repetition_rule() {
        // 21-token threshold: below it the ratio rule never applies.
        assert!(!is_junk("one two three four five six seven eight nine ten"));
    }

    #[test]
    fn wrong_script_density_is_junk() {
        assert!(is_junk("நான் சென்னையில் வளர்ந்தேன், அது ஒரு அழகான நகரம்"));
        // A sprinkle of non-ASCII in mostly-Roman text is fine.
        assert!(!is_junk("My grandmother called me kanmani — her little jewel — every single morning."));
    }

    #[test]
    fn short_meta_reply_is_junk_but_long_mention_is_not() {
        assert!(is_junk("Please provide the text to refine."));
        assert!(is_junk("As an AI, I cannot do that."));

        let long = "He said here is the thing about my father: he never \
            raised his voice, not once in forty years, and that silence \
            taught all of us more about anger than shouting ever could have.";
        assert!(!is_junk(long));
    }

    #[test]
    fn meta_response_screen_catches_deflections_at_any_length() {
        assert!(is_meta_response("Certainly! Once you provide the text I will refine it into polished memoir prose for you right away."));
        assert!(is_meta_response("What would you like me to do?"));
        assert!(!is_meta_response(
            "The monsoon arrived early that year and flooded the paddy fields."
        ));
    }
}
