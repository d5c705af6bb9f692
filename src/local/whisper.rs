//! Local transcription runtime over the `whisper-cli` binary.
//!
//! Runs `whisper-cli -oj` against the audio file and normalizes the JSON
//! it writes. whisper.cpp emits either a `segments` array with float
//! second timestamps or a `transcription` array with millisecond
//! `offsets`; both forms are handled, and when the top-level `text` field
//! is blank the transcript is rebuilt from the segments.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_json::Value;

use crate::error::{LoomError, LoomResult};
use crate::model::{TranscriptOutcome, TranscriptSegment};
use crate::process::{command_exists, run_command_with_timeout};
use crate::provider::TranscriptionProvider;

const DEFAULT_BINARY: &str = "whisper-cli";
const BINARY_ENV: &str = "STORYLOOM_WHISPER_BIN";
const MODEL_ENV: &str = "STORYLOOM_WHISPER_MODEL";

#[derive(Debug, Clone)]
pub struct WhisperCppRuntime {
    binary: String,
    model_path: Option<PathBuf>,
    timeout: Duration,
}

impl WhisperCppRuntime {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let binary = std::env::var(BINARY_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BINARY.to_owned());
        let model_path = std::env::var(MODEL_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        Self {
            binary,
            model_path,
            timeout,
        }
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        command_exists(&self.binary)
    }
}

impl TranscriptionProvider for WhisperCppRuntime {
    fn name(&self) -> &'static str {
        "whisper-cli"
    }

    fn is_configured(&self) -> bool {
        self.is_available()
    }

    fn transcribe(
        &self,
        audio_path: &Path,
        language: Option<&str>,
    ) -> LoomResult<TranscriptOutcome> {
        if !self.is_available() {
            return Err(LoomError::CommandMissing {
                command: self.binary.clone(),
            });
        }
        if !audio_path.exists() {
            return Err(LoomError::InvalidRequest(format!(
                "audio file not found: {}",
                audio_path.display()
            )));
        }

        let output_prefix =
            std::env::temp_dir().join(format!("storyloom-{}", uuid::Uuid::new_v4()));
        let mut args = vec![
            "-f".to_owned(),
            audio_path.display().to_string(),
            "-oj".to_owned(),
            "-of".to_owned(),
            output_prefix.display().to_string(),
        ];
        if let Some(model) = &self.model_path {
            args.push("-m".to_owned());
            args.push(model.display().to_string());
        }
        if let Some(language) = language {
            args.push("-l".to_owned());
            args.push(language.to_owned());
        }

        run_command_with_timeout(&self.binary, &args, None, self.timeout)?;

        let json_path = output_prefix.with_extension("json");
        let raw_text = std::fs::read_to_string(&json_path)?;
        let _ = std::fs::remove_file(&json_path);
        let raw: Value = serde_json::from_str(&raw_text)?;
        Ok(normalize_output(&raw))
    }
}

/// Normalize whisper.cpp JSON into a [`TranscriptOutcome`].
#[must_use]
pub fn normalize_output(raw: &Value) -> TranscriptOutcome {
    let segments = extract_segments(raw);

    let text = raw
        .get("text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
        .unwrap_or_else(|| transcript_from_segments(&segments));

    let language = raw
        .pointer("/result/language")
        .or_else(|| raw.get("language"))
        .and_then(Value::as_str)
        .map(str::to_owned);

    TranscriptOutcome {
        text,
        language,
        segments,
    }
}

fn extract_segments(raw: &Value) -> Vec<TranscriptSegment> {
    let array = raw
        .get("segments")
        .or_else(|| raw.get("transcription"))
        .and_then(Value::as_array);
    let Some(entries) = array else {
        return Vec::new();
    };

    entries
        .iter()
        .filter_map(|entry| {
            let text = entry.get("text").and_then(Value::as_str)?.trim().to_owned();
            // Float seconds (`start`/`end`) or millisecond offsets
            // (`offsets.from`/`offsets.to`).
            let start_sec = entry
                .get("start")
                .and_then(Value::as_f64)
                .or_else(|| ms_to_sec(entry.pointer("/offsets/from")));
            let end_sec = entry
                .get("end")
                .and_then(Value::as_f64)
                .or_else(|| ms_to_sec(entry.pointer("/offsets/to")));
            Some(TranscriptSegment {
                start_sec,
                end_sec,
                text,
            })
        })
        .filter(|segment| !segment.text.is_empty())
        .collect()
}

fn ms_to_sec(value: Option<&Value>) -> Option<f64> {
    value.and_then(Value::as_f64).map(|ms| ms / 1000.0)
}

fn transcript_from_segments(segments: &[TranscriptSegment]) -> String {
    segments
        .iter()
        .map(|segment| segment.text.as_str())
        .collect::<Vec<_>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::normalize_output;

    #[test]
    fn top_level_text_wins_when_present() {
        let raw = json!({
            "text": "  hello world  ",
            "segments": [{"start": 0.0, "end": 1.0, "text": "different"}],
            "language": "en",
        });
        let outcome = normalize_output(&raw);
        assert_eq!(outcome.text, "hello world");
        assert_eq!(outcome.language.as_deref(), Some("en"));
        assert_eq!(outcome.segments.len(), 1);
    }

    #[test]
    fn blank_text_falls_back_to_joined_segments() {
        let raw = json!({
            "text": "   ",
            "segments": [
                {"start": 0.0, "end": 1.0, "text": "hello"},
                {"start": 1.0, "end": 2.0, "text": "world"},
            ],
        });
        assert_eq!(normalize_output(&raw).text, "hello world");
    }

    #[test]
    fn transcription_array_with_millisecond_offsets() {
        let raw = json!({
            "transcription": [
                {"offsets": {"from": 1000, "to": 2500}, "text": "offset based"},
            ],
        });
        let outcome = normalize_output(&raw);
        assert_eq!(outcome.segments.len(), 1);
        assert!((outcome.segments[0].start_sec.unwrap() - 1.0).abs() < f64::EPSILON);
        assert!((outcome.segments[0].end_sec.unwrap() - 2.5).abs() < f64::EPSILON);
        assert_eq!(outcome.text, "offset based");
    }

    #[test]
    fn language_under_result_pointer() {
        let raw = json!({
            "text": "bonjour",
            "result": {"language": "fr"},
        });
        assert_eq!(normalize_output(&raw).language.as_deref(), Some("fr"));
    }

    #[test]
    fn empty_object_normalizes_to_empty_outcome() {
        let outcome = normalize_output(&json!({}));
        assert!(outcome.text.is_empty());
        assert!(outcome.segments.is_empty());
        assert!(outcome.language.is_none());
    }

    #[test]
    fn segments_with_blank_text_are_dropped() {
        let raw = json!({
            "segments": [
                {"start": 0.0, "end": 1.0, "text": "   "},
                {"start": 1.0, "end": 2.0, "text": "kept"},
            ],
        });
        let outcome = normalize_output(&raw);
        assert_eq!(outcome.segments.len(), 1);
        assert_eq!(outcome.segments[0].text, "kept");
    }
}
