//! Bounded retry with cached/mock fallback for backend calls.
//!
//! Every remote operation goes through [`with_retry`]: a fixed number of
//! attempts, a linearly growing pause between them, and a hard per-attempt
//! timeout. Callers abort in-flight work through a [`CancellationToken`].
//!
//! Reads use [`resilient_fetch`], which degrades to the last cached copy and
//! then to mock data once the backend is unreachable. Writes use
//! [`resilient_write`], which may apply a local-only variant but always says
//! so through [`WriteOutcome::applied_locally_only`]. An explicit rejection
//! from the backend is never hidden behind either fallback.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::{LedgerError, Result};

/// Retry settings shared by all remote operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RetryPolicy {
    /// Total attempts, including the first.
    pub attempts: u32,
    /// Pause before attempt `n + 1` is `backoff * n`.
    #[serde(with = "duration_ms")]
    pub backoff: Duration,
    /// Hard limit for a single attempt.
    #[serde(with = "duration_ms")]
    pub attempt_timeout: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 3,
            backoff: Duration::from_secs(1),
            attempt_timeout: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Pause after the given (1-based) failed attempt.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        self.backoff.saturating_mul(attempt)
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}

// ---------------------------------------------------------------------------
// Retry
// ---------------------------------------------------------------------------

/// Run `call` until it succeeds, fails with a non-connectivity error, or the
/// attempts run out. Cancellation aborts the current attempt immediately.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    operation: &str,
    mut call: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let attempts = policy.attempts.max(1);
    let mut last_error = LedgerError::Connectivity(format!("{operation}: no attempt made"));

    for attempt in 1..=attempts {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(LedgerError::Connectivity(format!("{operation} cancelled")));
            }
            r = tokio::time::timeout(policy.attempt_timeout, call()) => r,
        };

        match outcome {
            Ok(Ok(value)) => {
                if attempt > 1 {
                    debug!(operation, attempt, "succeeded after retry");
                }
                return Ok(value);
            }
            Ok(Err(e)) if !e.is_connectivity() => return Err(e),
            Ok(Err(e)) => last_error = e,
            Err(_) => {
                last_error = LedgerError::Connectivity(format!(
                    "{operation} timed out after {}ms",
                    policy.attempt_timeout.as_millis()
                ));
            }
        }

        if attempt < attempts {
            let delay = policy.delay_after(attempt);
            warn!(
                operation,
                attempt,
                delay_ms = delay.as_millis() as u64,
                error = %last_error,
                "attempt failed, retrying"
            );
            tokio::select! {
                _ = cancel.cancelled() => {
                    return Err(LedgerError::Connectivity(format!("{operation} cancelled")));
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    warn!(operation, attempts, error = %last_error, "giving up");
    Err(last_error)
}

// ---------------------------------------------------------------------------
// Reads
// ---------------------------------------------------------------------------

/// Where a piece of displayed data came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataSource {
    Remote,
    Cache,
    Mock,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Fetched<T> {
    pub data: T,
    pub source: DataSource,
}

impl<T> Fetched<T> {
    /// Only data that came straight from the backend is authoritative.
    pub fn is_authoritative(&self) -> bool {
        self.source == DataSource::Remote
    }
}

/// Fetch with retry; on connectivity failure fall back to `cached()` and then
/// to `mock()`. API errors are returned as-is.
pub async fn resilient_fetch<T, F, Fut, C, M>(
    endpoint: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    fetch: F,
    cached: C,
    mock: M,
) -> Result<Fetched<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    C: FnOnce() -> Option<T>,
    M: FnOnce() -> T,
{
    match with_retry(policy, cancel, endpoint, fetch).await {
        Ok(data) => Ok(Fetched {
            data,
            source: DataSource::Remote,
        }),
        Err(e) if e.is_connectivity() => {
            if let Some(data) = cached() {
                info!(endpoint, error = %e, "backend unreachable, serving cached data");
                return Ok(Fetched {
                    data,
                    source: DataSource::Cache,
                });
            }
            info!(endpoint, error = %e, "backend unreachable, serving mock data");
            Ok(Fetched {
                data: mock(),
                source: DataSource::Mock,
            })
        }
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Writes
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct WriteOutcome<T> {
    pub value: T,
    /// `true` when the backend never saw this change.
    pub applied_locally_only: bool,
}

/// Perform a write with retry. When the backend is unreachable and `local`
/// is given, its result is returned flagged as local-only; otherwise the
/// connectivity error is surfaced.
pub async fn resilient_write<T, F, Fut, L>(
    endpoint: &str,
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    call: F,
    local: Option<L>,
) -> Result<WriteOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
    L: FnOnce() -> T,
{
    match with_retry(policy, cancel, endpoint, call).await {
        Ok(value) => Ok(WriteOutcome {
            value,
            applied_locally_only: false,
        }),
        Err(e) if e.is_connectivity() => match local {
            Some(apply_locally) => {
                warn!(endpoint, error = %e, "backend unreachable, applying change locally only");
                Ok(WriteOutcome {
                    value: apply_locally(),
                    applied_locally_only: true,
                })
            }
            None => Err(e),
        },
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_policy(attempts: u32) -> RetryPolicy {
        RetryPolicy {
            attempts,
            backoff: Duration::from_millis(1),
            attempt_timeout: Duration::from_millis(200),
        }
    }

    #[test]
    fn backoff_grows_linearly() {
        let p = RetryPolicy {
            attempts: 4,
            backoff: Duration::from_millis(500),
            attempt_timeout: Duration::from_secs(1),
        };
        assert_eq!(p.delay_after(1), Duration::from_millis(500));
        assert_eq!(p.delay_after(2), Duration::from_millis(1000));
        assert_eq!(p.delay_after(3), Duration::from_millis(1500));
    }

    #[tokio::test]
    async fn retries_connectivity_errors_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result = with_retry(&fast_policy(3), &CancellationToken::new(), "entries", || {
            let c = c.clone();
            async move {
                if c.fetch_add(1, Ordering::SeqCst) < 2 {
                    Err(LedgerError::Connectivity("refused".into()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn api_errors_are_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let c = calls.clone();
        let result: Result<()> =
            with_retry(&fast_policy(3), &CancellationToken::new(), "approve", || {
                let c = c.clone();
                async move {
                    c.fetch_add(1, Ordering::SeqCst);
                    Err(LedgerError::Api {
                        status: 403,
                        message: "Forbidden".into(),
                    })
                }
            })
            .await;
        assert!(matches!(result, Err(LedgerError::Api { status: 403, .. })));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn slow_attempts_time_out() {
        let policy = RetryPolicy {
            attempts: 2,
            backoff: Duration::from_millis(1),
            attempt_timeout: Duration::from_millis(20),
        };
        let result: Result<()> = with_retry(&policy, &CancellationToken::new(), "health", || async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        let err = result.unwrap_err();
        assert!(err.is_connectivity());
        assert!(err.to_string().contains("timed out"));
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_attempt() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            trigger.cancel();
        });
        let policy = RetryPolicy {
            attempts: 3,
            backoff: Duration::from_millis(1),
            attempt_timeout: Duration::from_secs(30),
        };
        let result: Result<()> = with_retry(&policy, &cancel, "entries", || async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
        .await;
        assert!(result.unwrap_err().to_string().contains("cancelled"));
    }

    #[tokio::test]
    async fn fetch_prefers_cache_over_mock() {
        let unreachable = || async { Err::<Vec<u32>, _>(LedgerError::Connectivity("down".into())) };

        let fetched = resilient_fetch(
            "entries",
            &fast_policy(1),
            &CancellationToken::new(),
            unreachable,
            || Some(vec![1, 2]),
            || vec![9],
        )
        .await
        .unwrap();
        assert_eq!(fetched.source, DataSource::Cache);
        assert_eq!(fetched.data, vec![1, 2]);
        assert!(!fetched.is_authoritative());

        let fetched = resilient_fetch(
            "entries",
            &fast_policy(1),
            &CancellationToken::new(),
            unreachable,
            || None,
            || vec![9],
        )
        .await
        .unwrap();
        assert_eq!(fetched.source, DataSource::Mock);
    }

    #[tokio::test]
    async fn fetch_does_not_mask_api_rejection() {
        let result = resilient_fetch(
            "entries",
            &fast_policy(2),
            &CancellationToken::new(),
            || async {
                Err::<Vec<u32>, _>(LedgerError::Api {
                    status: 400,
                    message: "bad filter".into(),
                })
            },
            || Some(vec![1]),
            || vec![9],
        )
        .await;
        assert!(matches!(result, Err(LedgerError::Api { status: 400, .. })));
    }

    #[tokio::test]
    async fn write_flags_local_only_fallback() {
        let outcome = resilient_write(
            "approve",
            &fast_policy(2),
            &CancellationToken::new(),
            || async { Err::<&str, _>(LedgerError::Connectivity("down".into())) },
            Some(|| "local"),
        )
        .await
        .unwrap();
        assert!(outcome.applied_locally_only);
        assert_eq!(outcome.value, "local");

        let outcome = resilient_write(
            "approve",
            &fast_policy(2),
            &CancellationToken::new(),
            || async { Ok::<_, LedgerError>("remote") },
            Some(|| "local"),
        )
        .await
        .unwrap();
        assert!(!outcome.applied_locally_only);
        assert_eq!(outcome.value, "remote");
    }

    #[tokio::test]
    async fn write_without_local_variant_surfaces_error() {
        let result = resilient_write(
            "submit",
            &fast_policy(1),
            &CancellationToken::new(),
            || async { Err::<(), _>(LedgerError::Connectivity("down".into())) },
            None::<fn()>,
        )
        .await;
        assert!(result.unwrap_err().is_connectivity());
    }
}
