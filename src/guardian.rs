//! The guardian: a two-level execution wrapper that cannot fail.
//!
//! `execute` runs a primary closure, falls back to an optional secondary,
//! and returns a caller-supplied default when both fail. No error ever
//! propagates out, which makes the wrapper safe to compose arbitrarily
//! deep inside the cascades. Outcomes are reported to the shared
//! [`HealthRegistry`] under the primary's service name only; a fallback
//! success is not separately tracked there.

use std::sync::Arc;

use crate::error::LoomResult;
use crate::health::HealthRegistry;

#[derive(Debug, Clone)]
pub struct Guardian {
    registry: Arc<HealthRegistry>,
}

impl Guardian {
    #[must_use]
    pub fn new(registry: Arc<HealthRegistry>) -> Self {
        Self { registry }
    }

    #[must_use]
    pub fn registry(&self) -> &Arc<HealthRegistry> {
        &self.registry
    }

    /// Execute `primary`; on failure report it, then try `fallback` if one
    /// was given; on total failure return `default`. Never panics, never
    /// returns an error.
    pub fn execute<T, P, F>(
        &self,
        service: &str,
        primary: P,
        fallback: Option<F>,
        default: T,
    ) -> T
    where
        P: FnOnce() -> LoomResult<T>,
        F: FnOnce() -> LoomResult<T>,
    {
        tracing::info!(service, "executing primary task");
        match primary() {
            Ok(value) => {
                self.registry.report_success(service);
                value
            }
            Err(error) => {
                self.registry.report_failure(service, &error.to_string());
                match fallback {
                    Some(fallback) => {
                        tracing::warn!(service, %error, "primary failed, deploying fallback");
                        match fallback() {
                            Ok(value) => value,
                            Err(fallback_error) => {
                                tracing::error!(
                                    service,
                                    %fallback_error,
                                    "fallback also failed, returning default"
                                );
                                default
                            }
                        }
                    }
                    None => default,
                }
            }
        }
    }
}

/// Type alias usable as the `fallback` argument when no fallback exists;
/// `None::<NoFallback<T>>` keeps the generic parameter inferable.
pub type NoFallback<T> = fn() -> LoomResult<T>;
