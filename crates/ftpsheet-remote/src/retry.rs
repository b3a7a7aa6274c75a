//! Retry classification and backoff for idempotent Sheets API calls.

use std::time::Duration;

use reqwest::blocking::RequestBuilder;
use reqwest::StatusCode;
use serde_json::Value as JsonValue;
use tracing::warn;

use crate::SheetError;

const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDisposition {
    Retryable,
    NonRetryable,
}

pub fn classify_status(status: StatusCode) -> RetryDisposition {
    if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

pub fn classify_reqwest_error(err: &reqwest::Error) -> RetryDisposition {
    if err.is_timeout() || err.is_connect() {
        RetryDisposition::Retryable
    } else {
        RetryDisposition::NonRetryable
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    pub max_retries: usize,
    pub base_delay: Duration,
    pub max_delay: Duration,
}

impl Default for BackoffPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl BackoffPolicy {
    /// Single attempt, no sleeping.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    pub fn delay_for_attempt(&self, attempt_index: usize) -> Duration {
        let factor = 1u32.checked_shl(attempt_index as u32).unwrap_or(u32::MAX);
        let delay = self.base_delay.saturating_mul(factor);
        delay.min(self.max_delay)
    }
}

/// Sends the request built by `build` until it succeeds, a non-retryable failure
/// occurs, or the policy runs out of retries. An empty success body maps to `Null`.
pub(crate) fn send_json(
    backoff: &BackoffPolicy,
    build: impl Fn() -> RequestBuilder,
) -> Result<JsonValue, SheetError> {
    let mut last_request_error: Option<reqwest::Error> = None;

    for attempt in 0..=backoff.max_retries {
        match build().send() {
            Ok(resp) => {
                let status = resp.status();
                let url = resp.url().to_string();

                if status.is_success() {
                    let text = resp.text()?;
                    if text.trim().is_empty() {
                        return Ok(JsonValue::Null);
                    }
                    return Ok(serde_json::from_str(&text)?);
                }

                if classify_status(status) == RetryDisposition::Retryable
                    && attempt < backoff.max_retries
                {
                    warn!(%status, url = %url, attempt, "retryable status; backing off");
                    std::thread::sleep(backoff.delay_for_attempt(attempt));
                    continue;
                }

                let mut body = resp.text().unwrap_or_default();
                if body.len() > ERROR_BODY_LIMIT {
                    let mut cut = ERROR_BODY_LIMIT;
                    while !body.is_char_boundary(cut) {
                        cut -= 1;
                    }
                    body.truncate(cut);
                }
                return Err(SheetError::Status {
                    status: status.as_u16(),
                    url,
                    body,
                });
            }
            Err(err) => {
                if classify_reqwest_error(&err) == RetryDisposition::Retryable
                    && attempt < backoff.max_retries
                {
                    warn!(error = %err, attempt, "request error; backing off");
                    last_request_error = Some(err);
                    std::thread::sleep(backoff.delay_for_attempt(attempt));
                    continue;
                }
                return Err(SheetError::Http(err));
            }
        }
    }

    match last_request_error {
        Some(err) => Err(SheetError::Http(err)),
        None => Err(SheetError::Unavailable("retry budget exhausted".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use httpmock::prelude::*;

    fn fast(max_retries: usize) -> BackoffPolicy {
        BackoffPolicy {
            max_retries,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
        }
    }

    fn status_of(err: SheetError) -> u16 {
        match err {
            SheetError::Status { status, .. } => status,
            other => panic!("expected a status error, got {other:?}"),
        }
    }

    #[test]
    fn none_policy_never_sleeps() {
        let policy = BackoffPolicy::none();
        assert_eq!(policy.max_retries, 0);
        for attempt in [0, 1, 5, 63, 64] {
            assert_eq!(policy.delay_for_attempt(attempt), Duration::ZERO);
        }
    }

    #[test]
    fn default_policy_total_wait_stays_under_two_seconds() {
        let policy = BackoffPolicy::default();
        let waits: Vec<Duration> = (0..policy.max_retries)
            .map(|attempt| policy.delay_for_attempt(attempt))
            .collect();
        assert_eq!(
            waits,
            [
                Duration::from_millis(250),
                Duration::from_millis(500),
                Duration::from_secs(1)
            ]
        );
        assert!(waits.iter().sum::<Duration>() < Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(10), policy.max_delay);
    }

    #[test]
    fn none_policy_sends_a_failing_request_once() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/spreadsheets/sheet123");
            then.status(503).body("backend unavailable");
        });

        let http = reqwest::blocking::Client::new();
        let url = server.url("/spreadsheets/sheet123");
        let err = send_json(&BackoffPolicy::none(), || http.get(&url)).expect_err("503");
        mock.assert_hits(1);
        assert_eq!(status_of(err), 503);
    }

    #[test]
    fn throttled_request_is_retried_until_the_budget_runs_out() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/spreadsheets/sheet123");
            then.status(429);
        });

        let http = reqwest::blocking::Client::new();
        let url = server.url("/spreadsheets/sheet123");
        let err = send_json(&fast(2), || http.get(&url)).expect_err("429");
        mock.assert_hits(3);
        assert_eq!(status_of(err), 429);
    }

    #[test]
    fn permission_errors_are_not_retried() {
        let server = MockServer::start();
        let mock = server.mock(|when, then| {
            when.method(GET).path("/spreadsheets/sheet123");
            then.status(403).body("caller lacks permission");
        });

        let http = reqwest::blocking::Client::new();
        let url = server.url("/spreadsheets/sheet123");
        let err = send_json(&fast(3), || http.get(&url)).expect_err("403");
        mock.assert_hits(1);
        match err {
            SheetError::Status { status, body, .. } => {
                assert_eq!(status, 403);
                assert!(body.contains("permission"));
            }
            other => panic!("expected a status error, got {other:?}"),
        }
    }

    #[test]
    fn empty_success_body_is_null() {
        let server = MockServer::start();
        server.mock(|when, then| {
            when.method(POST).path("/spreadsheets/sheet123/values:clear");
            then.status(200);
        });

        let http = reqwest::blocking::Client::new();
        let url = server.url("/spreadsheets/sheet123/values:clear");
        let value = send_json(&fast(0), || http.post(&url)).expect("ok");
        assert_eq!(value, JsonValue::Null);
    }

    #[test]
    fn only_throttling_and_server_errors_are_retryable() {
        assert_eq!(
            classify_status(StatusCode::TOO_MANY_REQUESTS),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::BAD_GATEWAY),
            RetryDisposition::Retryable
        );
        assert_eq!(
            classify_status(StatusCode::FORBIDDEN),
            RetryDisposition::NonRetryable
        );
        assert_eq!(
            classify_status(StatusCode::NOT_FOUND),
            RetryDisposition::NonRetryable
        );
    }
}
