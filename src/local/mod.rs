//! Local runtime adapters.
//!
//! Both adapters shell out to locally installed CLI tools through
//! [`crate::process`], so "runtime absent" (binary not on PATH) is cleanly
//! distinguishable from "generation failed" (non-zero exit). The cascades
//! rely on that distinction: absence skips the local tier instantly.

pub mod ollama;
pub mod whisper;

pub use ollama::OllamaRuntime;
pub use whisper::WhisperCppRuntime;

/// Per-runtime availability diagnostics for the `health` command.
#[must_use]
pub fn diagnostics() -> Vec<serde_json::Value> {
    let ollama_bin = resolved_binary("STORYLOOM_OLLAMA_BIN", "ollama");
    let whisper_bin = resolved_binary("STORYLOOM_WHISPER_BIN", "whisper-cli");
    vec![
        serde_json::json!({
            "runtime": "ollama",
            "available": crate::process::command_exists(&ollama_bin),
            "binary": ollama_bin,
            "env_override": "STORYLOOM_OLLAMA_BIN",
        }),
        serde_json::json!({
            "runtime": "whisper-cli",
            "available": crate::process::command_exists(&whisper_bin),
            "binary": whisper_bin,
            "env_override": "STORYLOOM_WHISPER_BIN",
        }),
    ]
}

fn resolved_binary(env: &str, default: &str) -> String {
    std::env::var(env)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| default.to_owned())
}
