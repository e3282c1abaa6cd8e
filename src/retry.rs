//! Support utilities for [`keen_retry`]'s retry API.
//!
//! Remote OCR APIs fail in two very different ways: rate limits and gateway
//! hiccups that clear up on their own, and configuration or input errors that
//! never will. We classify errors up front and only retry the first kind, a
//! bounded number of times with linearly increasing backoff.

use std::time::Duration;

use keen_retry::{ResolvedResult, RetryResult};
use reqwest::StatusCode;

use crate::prelude::*;

/// On error, return a [`RetryResult::Fatal`] value.
macro_rules! try_fatal {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(error) => {
                return ::keen_retry::RetryResult::Fatal {
                    input: (),
                    error: From::from(error),
                };
            }
        }
    };
}

/// On error, return either a [`RetryResult::Transient`] or
/// [`RetryResult::Fatal`] value, depending on
/// [`IsKnownTransient::is_known_transient`].
macro_rules! try_potentially_transient {
    ($result:expr) => {
        match $result {
            Ok(value) => value,
            Err(error) if IsKnownTransient::is_known_transient(&error) => {
                debug!("Potentially transient error: {:?}", error);
                return ::keen_retry::RetryResult::Transient {
                    input: (),
                    error: From::from(error),
                };
            }
            Err(error) => {
                return ::keen_retry::RetryResult::Fatal {
                    input: (),
                    error: From::from(error),
                };
            }
        }
    };
}

// Here's a trick to export a macro within a crate as if it were a normal
// symbol.
pub(crate) use {try_fatal, try_potentially_transient};

/// A [`RetryResult`] carrying no retry state, as our engines use it.
pub type EngineRetryResult<T> = RetryResult<(), (), T, anyhow::Error>;

/// Build an [`RetryResult::Ok`] value.
pub(crate) fn retry_result_ok<T, E>(output: T) -> RetryResult<(), (), T, E> {
    RetryResult::Ok {
        reported_input: (),
        output,
    }
}

/// Build an [`RetryResult::Fatal`] value.
pub(crate) fn retry_result_fatal<T, E>(error: E) -> RetryResult<(), (), T, E> {
    RetryResult::Fatal { input: (), error }
}

/// Linearly increasing backoff delays: `base`, `2 * base`, `3 * base`, ...
///
/// The iterator's length bounds the retry count.
pub fn linear_backoff(base: Duration, retries: usize) -> impl Iterator<Item = Duration> {
    (1..=retries as u32).map(move |attempt| base * attempt)
}

/// Collapse a [`ResolvedResult`] into a plain [`Result`], logging retry
/// history and keeping the last underlying error.
pub fn resolve<T>(
    engine: &str,
    result: ResolvedResult<(), (), T, anyhow::Error>,
) -> Result<T> {
    match result {
        ResolvedResult::Ok { output, .. } => Ok(output),
        ResolvedResult::Recovered {
            output,
            retry_errors,
            ..
        } => {
            warn!(
                engine,
                "succeeded after {} retries (failed attempts: [{}])",
                retry_errors.len(),
                keen_retry::loggable_retry_errors(&retry_errors),
            );
            Ok(output)
        }
        ResolvedResult::Fatal { error, .. } => Err(error),
        ResolvedResult::GivenUp {
            retry_errors,
            fatal_error,
            ..
        }
        | ResolvedResult::Unrecoverable {
            retry_errors,
            fatal_error,
            ..
        } => {
            error!(
                engine,
                "giving up after {} failed attempts: [{}]",
                retry_errors.len() + 1,
                keen_retry::loggable_retry_errors(&retry_errors),
            );
            Err(fatal_error)
        }
    }
}

/// Is this error a known transient error?
///
/// By default, we assume errors are not transient until they've been observed
/// in the wild and determined to be worth retrying. This prevents us from
/// retrying errors that will never resolve.
pub trait IsKnownTransient {
    /// Is this error likely to be transient?
    fn is_known_transient(&self) -> bool;
}

impl IsKnownTransient for reqwest::Error {
    fn is_known_transient(&self) -> bool {
        if let Some(status) = self.status() {
            status.is_known_transient()
        } else {
            // Connection resets, timeouts and friends. `reqwest` doesn't
            // expose most of them in enough detail to be certain which are
            // transient, so assume they are.
            true
        }
    }
}

impl IsKnownTransient for StatusCode {
    fn is_known_transient(&self) -> bool {
        let transient_failures = [
            StatusCode::TOO_MANY_REQUESTS,
            StatusCode::BAD_GATEWAY,
            StatusCode::SERVICE_UNAVAILABLE,
            StatusCode::GATEWAY_TIMEOUT,
        ];
        transient_failures.contains(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_linear_backoff_is_linear_and_bounded() {
        let delays: Vec<_> = linear_backoff(Duration::from_millis(600), 3).collect();
        assert_eq!(
            delays,
            vec![
                Duration::from_millis(600),
                Duration::from_millis(1200),
                Duration::from_millis(1800),
            ]
        );
    }

    #[test]
    fn test_status_code_classification() {
        assert!(StatusCode::TOO_MANY_REQUESTS.is_known_transient());
        assert!(StatusCode::SERVICE_UNAVAILABLE.is_known_transient());
        assert!(!StatusCode::UNAUTHORIZED.is_known_transient());
        assert!(!StatusCode::BAD_REQUEST.is_known_transient());
    }
}
