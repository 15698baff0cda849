use reqwest::blocking::{Client, Response};
use std::time::Duration;
use tracing::{debug, warn};

use crate::OracleError;

const INITIAL_BACKOFF_MS: u64 = 500;

pub(crate) fn build_client(timeout: Duration) -> Result<Client, OracleError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(Duration::from_secs(10))
        .build()
        .map_err(|e| OracleError::Http {
            message: format!("Failed to create HTTP client: {}", e),
        })
}

/// Turn a response into its body, mapping non-success statuses to
/// [`OracleError::Status`].
pub(crate) fn read_body(response: Response) -> Result<String, OracleError> {
    let status = response.status();
    let body = response.text().map_err(|e| OracleError::Http {
        message: format!("Failed to read response body: {}", e),
    })?;
    if status.is_success() {
        Ok(body)
    } else {
        Err(OracleError::Status {
            status: status.as_u16(),
            body,
        })
    }
}

fn is_retryable(error: &OracleError) -> bool {
    match error {
        OracleError::Http { .. } => true,
        OracleError::Status { status, .. } => *status == 429 || *status >= 500,
        _ => false,
    }
}

/// Run `operation` up to `max_attempts` times, backing off exponentially
/// between transient failures. Auth and other client errors return at once.
pub(crate) fn retry_with_backoff<F, T>(max_attempts: u32, mut operation: F) -> Result<T, OracleError>
where
    F: FnMut() -> Result<T, OracleError>,
{
    let max_attempts = max_attempts.max(1);
    let mut backoff_ms = INITIAL_BACKOFF_MS;
    let mut last_error = None;

    for attempt in 0..max_attempts {
        match operation() {
            Ok(result) => return Ok(result),
            Err(e) if !is_retryable(&e) => return Err(e),
            Err(e) => {
                if attempt + 1 < max_attempts {
                    warn!(
                        attempt = attempt + 1,
                        max_attempts,
                        error = %e,
                        "oracle call failed, retrying in {}ms",
                        backoff_ms
                    );
                    std::thread::sleep(Duration::from_millis(backoff_ms));
                    backoff_ms *= 2;
                } else {
                    debug!(attempt = attempt + 1, "oracle retries exhausted");
                }
                last_error = Some(e);
            }
        }
    }

    Err(last_error.unwrap_or_else(|| OracleError::Http {
        message: "All retry attempts exhausted".to_string(),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;

    #[test]
    fn auth_failures_are_not_retried() {
        let calls = Cell::new(0);
        let result: Result<(), _> = retry_with_backoff(3, || {
            calls.set(calls.get() + 1);
            Err(OracleError::Status {
                status: 401,
                body: "bad key".into(),
            })
        });
        assert!(matches!(result, Err(OracleError::Status { status: 401, .. })));
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn transient_failure_then_success() {
        let calls = Cell::new(0);
        let result = retry_with_backoff(3, || {
            calls.set(calls.get() + 1);
            if calls.get() == 1 {
                Err(OracleError::Status {
                    status: 503,
                    body: String::new(),
                })
            } else {
                Ok("ok")
            }
        });
        assert_eq!(result.unwrap(), "ok");
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn zero_attempts_still_calls_once() {
        let calls = Cell::new(0);
        let _ = retry_with_backoff(0, || {
            calls.set(calls.get() + 1);
            Ok::<_, OracleError>(())
        });
        assert_eq!(calls.get(), 1);
    }
}
