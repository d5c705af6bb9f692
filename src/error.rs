use thiserror::Error;

pub type LoomResult<T> = Result<T, LoomError>;

/// Failure classification used by the cascades to decide how to advance.
///
/// - `Transient`: capacity-style failures (rate limit, server busy) worth
///   retrying with backoff inside the current tier.
/// - `Connectivity`: the producer is not reachable at all; for local
///   runtimes this is an instant skip signal, never a retry.
/// - `Fatal`: configuration or request errors; abort the tier immediately
///   and move on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Connectivity,
    Fatal,
}

#[derive(Debug, Error)]
pub enum LoomError {
    #[error("i/o failure: {0}")]
    Io(#[from] std::io::Error),

    #[error("json failure: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing command `{command}` on PATH")]
    CommandMissing { command: String },

    #[error("command failed: `{command}` (status: {status}){stderr_suffix}")]
    CommandFailed {
        command: String,
        status: i32,
        stderr_suffix: String,
    },

    #[error("command timed out after {timeout_ms}ms: `{command}`{stderr_suffix}")]
    CommandTimedOut {
        command: String,
        timeout_ms: u64,
        stderr_suffix: String,
    },

    #[error("provider at capacity: {0}")]
    ProviderBusy(String),

    #[error("provider unreachable: {0}")]
    ProviderUnreachable(String),

    #[error("provider failed: {0}")]
    ProviderFailed(String),

    #[error("missing credentials: {0}")]
    MissingCredentials(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("image validation failed: {0}")]
    ImageValidation(String),
}

impl LoomError {
    #[must_use]
    pub fn from_command_failure(command: String, status: i32, stderr: String) -> Self {
        let trimmed = stderr.trim();
        let stderr_suffix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("; stderr: {trimmed}")
        };
        Self::CommandFailed {
            command,
            status,
            stderr_suffix,
        }
    }

    #[must_use]
    pub fn from_command_timeout(command: String, timeout_ms: u64, stderr: String) -> Self {
        let trimmed = stderr.trim();
        let stderr_suffix = if trimmed.is_empty() {
            String::new()
        } else {
            format!("; stderr: {trimmed}")
        };
        Self::CommandTimedOut {
            command,
            timeout_ms,
            stderr_suffix,
        }
    }

    /// Taxonomy of this failure, consulted by the cascades: transient
    /// errors are retried within a tier, connectivity errors skip the tier
    /// instantly, fatal errors abort the tier without retry.
    #[must_use]
    pub const fn class(&self) -> ErrorClass {
        match self {
            Self::ProviderBusy(_) | Self::CommandTimedOut { .. } => ErrorClass::Transient,
            Self::ProviderUnreachable(_) | Self::CommandMissing { .. } => ErrorClass::Connectivity,
            _ => ErrorClass::Fatal,
        }
    }

    /// Stable, unique, machine-readable error code for every variant.
    #[must_use]
    pub const fn error_code(&self) -> &'static str {
        match self {
            Self::Io(_) => "SL-IO",
            Self::Json(_) => "SL-JSON",
            Self::CommandMissing { .. } => "SL-CMD-MISSING",
            Self::CommandFailed { .. } => "SL-CMD-FAILED",
            Self::CommandTimedOut { .. } => "SL-CMD-TIMEOUT",
            Self::ProviderBusy(_) => "SL-PROVIDER-BUSY",
            Self::ProviderUnreachable(_) => "SL-PROVIDER-UNREACHABLE",
            Self::ProviderFailed(_) => "SL-PROVIDER-FAILED",
            Self::MissingCredentials(_) => "SL-CREDENTIALS",
            Self::InvalidRequest(_) => "SL-INVALID-REQUEST",
            Self::ImageValidation(_) => "SL-IMAGE-VALIDATION",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ErrorClass, LoomError};

    fn all_variants() -> Vec<LoomError> {
        vec![
            LoomError::Io(std::io::Error::other("disk fail")),
            LoomError::Json(serde_json::from_str::<serde_json::Value>("{").unwrap_err()),
            LoomError::CommandMissing {
                command: "ollama".to_owned(),
            },
            LoomError::CommandFailed {
                command: "ollama run llama3.2".to_owned(),
                status: 1,
                stderr_suffix: String::new(),
            },
            LoomError::CommandTimedOut {
                command: "whisper-cli".to_owned(),
                timeout_ms: 5000,
                stderr_suffix: String::new(),
            },
            LoomError::ProviderBusy("429 resource exhausted".to_owned()),
            LoomError::ProviderUnreachable("connection refused".to_owned()),
            LoomError::ProviderFailed("empty completion".to_owned()),
            LoomError::MissingCredentials("no api key".to_owned()),
            LoomError::InvalidRequest("unsupported audio format".to_owned()),
            LoomError::ImageValidation("not a valid image header".to_owned()),
        ]
    }

    #[test]
    fn error_codes_are_unique_and_prefixed() {
        let errors = all_variants();
        assert_eq!(errors.len(), 11, "test should cover every variant");

        let mut seen = std::collections::HashSet::new();
        for error in &errors {
            let code = error.error_code();
            assert!(code.starts_with("SL-"), "code must start with SL-: {code}");
            assert!(seen.insert(code), "duplicate error_code: {code}");
        }
    }

    #[test]
    fn capacity_errors_classify_as_transient() {
        assert_eq!(
            LoomError::ProviderBusy("busy".to_owned()).class(),
            ErrorClass::Transient
        );
        assert_eq!(
            LoomError::from_command_timeout("slow".to_owned(), 100, String::new()).class(),
            ErrorClass::Transient
        );
    }

    #[test]
    fn unreachable_and_missing_classify_as_connectivity() {
        assert_eq!(
            LoomError::ProviderUnreachable("refused".to_owned()).class(),
            ErrorClass::Connectivity
        );
        assert_eq!(
            LoomError::CommandMissing {
                command: "ollama".to_owned()
            }
            .class(),
            ErrorClass::Connectivity
        );
    }

    #[test]
    fn config_and_request_errors_classify_as_fatal() {
        for error in [
            LoomError::MissingCredentials("key".to_owned()),
            LoomError::InvalidRequest("bad".to_owned()),
            LoomError::ProviderFailed("broke".to_owned()),
            LoomError::ImageValidation("bad header".to_owned()),
        ] {
            assert_eq!(error.class(), ErrorClass::Fatal, "{error:?}");
        }
    }

    #[test]
    fn from_command_failure_with_nonempty_stderr() {
        let err = LoomError::from_command_failure("prog arg".to_owned(), 2, "  oh no  \n".to_owned());
        let text = err.to_string();
        assert!(text.contains("prog arg"));
        assert!(text.contains("status: 2"));
        assert!(text.contains("stderr: oh no"), "should trim stderr: {text}");
    }

    #[test]
    fn from_command_failure_whitespace_only_stderr_treated_as_empty() {
        let err = LoomError::from_command_failure("cmd".to_owned(), 1, "   \n\t  ".to_owned());
        assert!(!err.to_string().contains("stderr"));
    }

    #[test]
    fn from_command_timeout_display() {
        let err =
            LoomError::from_command_timeout("slow".to_owned(), 1000, " partial ".to_owned());
        let text = err.to_string();
        assert!(text.contains("1000ms"));
        assert!(text.contains("stderr: partial"));
    }

    #[test]
    fn loom_error_is_send_and_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}
        assert_send::<LoomError>();
        assert_sync::<LoomError>();
    }
}
