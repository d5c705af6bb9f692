//! Local text-model runtime over the `ollama` CLI.
//!
//! Models are tried in priority order within a single `generate` call; a
//! timeout on one model moves on to the next (smaller) one rather than
//! failing the call. A missing binary is reported as `CommandMissing`,
//! which the cascades treat as the runtime being offline.

use std::time::Duration;

use crate::error::{LoomError, LoomResult};
use crate::process::{command_exists, run_command_with_timeout};
use crate::provider::LocalTextRuntime;

const DEFAULT_BINARY: &str = "ollama";
const BINARY_ENV: &str = "STORYLOOM_OLLAMA_BIN";

/// Modern, efficient local models in descending order of preference.
const PRIORITY_MODELS: &[&str] = &[
    "llama3.2",
    "qwen2.5:3b",
    "gemma2:2b",
    "llama3.1",
    "phi3.5",
    "mistral",
    "phi3",
];

#[derive(Debug, Clone)]
pub struct OllamaRuntime {
    binary: String,
    models: Vec<String>,
    timeout: Duration,
}

impl OllamaRuntime {
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let binary = std::env::var(BINARY_ENV)
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BINARY.to_owned());
        Self {
            binary,
            models: PRIORITY_MODELS.iter().map(|m| (*m).to_owned()).collect(),
            timeout,
        }
    }

    #[must_use]
    pub fn with_models(mut self, models: Vec<String>) -> Self {
        self.models = models;
        self
    }

    #[must_use]
    pub fn is_available(&self) -> bool {
        command_exists(&self.binary)
    }
}

impl LocalTextRuntime for OllamaRuntime {
    fn name(&self) -> &'static str {
        "ollama"
    }

    fn generate(&self, prompt: &str, system: Option<&str>) -> LoomResult<Option<String>> {
        if !self.is_available() {
            return Err(LoomError::CommandMissing {
                command: self.binary.clone(),
            });
        }

        let rendered_prompt = match system {
            Some(system) => format!("{system}\n\n{prompt}"),
            None => prompt.to_owned(),
        };

        for model in &self.models {
            let args = vec!["run".to_owned(), model.clone(), rendered_prompt.clone()];
            match run_command_with_timeout(&self.binary, &args, None, self.timeout) {
                Ok(output) => {
                    let text = String::from_utf8_lossy(&output.stdout).trim().to_owned();
                    if !text.is_empty() {
                        return Ok(Some(text));
                    }
                    tracing::warn!(model = %model, "local model returned empty output");
                }
                Err(error @ LoomError::CommandMissing { .. }) => return Err(error),
                Err(LoomError::CommandTimedOut { .. }) => {
                    tracing::warn!(model = %model, "local model timed out, trying a faster one");
                }
                Err(error) => {
                    tracing::warn!(model = %model, %error, "local model failed");
                }
            }
        }
        Ok(None)
    }
}
