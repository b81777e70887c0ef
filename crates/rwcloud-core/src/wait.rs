//! Bounded polling with cooperative cancellation
//!
//! Every await-flow in this crate issues a mutation and then waits in
//! [`poll`] until the resource reaches its terminal state. The condition is
//! evaluated once per interval tick and never before the first interval has
//! elapsed, so a timeout shorter than the interval always times out without
//! evaluating the condition.

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::error::{CoreError, Result};

/// Interval and timeout for one wait loop
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollingParams {
    #[serde(with = "secs")]
    pub interval: Duration,
    #[serde(with = "secs")]
    pub timeout: Duration,
}

impl PollingParams {
    pub const fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }
}

/// Poll `condition` until it reports done, fails, times out or is cancelled
///
/// # Returns
///
/// - `Ok(())` on the first tick where the condition returns `Ok(true)`
/// - the condition's own error, unchanged, as soon as it returns one
/// - [`CoreError::WaitTimeout`] when `params.timeout` elapses first
/// - [`CoreError::Cancelled`] when `cancel` fires, ahead of any pending tick
///
/// # Example
///
/// ```rust,ignore
/// use rwcloud_core::wait::{poll, PollingParams};
/// use std::time::Duration;
///
/// poll(
///     &PollingParams::new(Duration::from_secs(3), Duration::from_secs(900)),
///     &cancel,
///     || async { Ok(backend.get_cluster_by_id(id).await?.status == 404) },
/// )
/// .await?;
/// ```
pub async fn poll<F, Fut>(
    params: &PollingParams,
    cancel: &CancellationToken,
    mut condition: F,
) -> Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<bool>>,
{
    if params.interval.is_zero() {
        return Err(CoreError::Validation(
            "polling interval must be greater than zero".to_string(),
        ));
    }

    let start = Instant::now();
    let deadline = tokio::time::sleep(params.timeout);
    tokio::pin!(deadline);

    let first_tick = start.checked_add(params.interval).ok_or_else(|| {
        CoreError::Validation(format!(
            "polling interval of {}s is too large",
            params.interval.as_secs()
        ))
    })?;
    let mut ticker = tokio::time::interval_at(first_tick, params.interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut attempt = 0u32;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(CoreError::Cancelled),
            _ = &mut deadline => {
                debug!(attempt, timeout = ?params.timeout, "wait timed out");
                return Err(CoreError::WaitTimeout {
                    timeout: params.timeout,
                    waiting_for: None,
                    last_observed: None,
                });
            }
            _ = ticker.tick() => {
                attempt += 1;
                let done = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(CoreError::Cancelled),
                    done = condition() => done?,
                };
                debug!(attempt, elapsed = ?start.elapsed(), done, "polled condition");
                if done {
                    return Ok(());
                }
            }
        }
    }
}

mod secs {
    use serde::ser::Error;
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        if d.subsec_nanos() != 0 {
            return Err(S::Error::custom(format!(
                "polling durations must be whole seconds, got {d:?}"
            )));
        }
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        u64::deserialize(d).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    fn params(interval_secs: u64, timeout_secs: u64) -> PollingParams {
        PollingParams::new(
            Duration::from_secs(interval_secs),
            Duration::from_secs(timeout_secs),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_nth_tick_after_n_intervals() {
        let start = Instant::now();
        let mut calls = 0u32;

        poll(&params(2, 60), &CancellationToken::new(), || {
            calls += 1;
            let n = calls;
            async move { Ok(n == 3) }
        })
        .await
        .unwrap();

        assert_eq!(calls, 3);
        assert!(start.elapsed() >= Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_times_out_without_exceeding_budget() {
        let start = Instant::now();
        let err = poll(&params(1, 5), &CancellationToken::new(), || async { Ok(false) })
            .await
            .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::WaitTimeout);
        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(5));
        assert!(elapsed < Duration::from_secs(6));
    }

    #[tokio::test(start_paused = true)]
    async fn test_no_eager_check_when_timeout_shorter_than_interval() {
        let mut calls = 0u32;
        let err = poll(&params(10, 3), &CancellationToken::new(), || {
            calls += 1;
            async { Ok(true) }
        })
        .await
        .unwrap_err();

        assert!(err.is_timeout());
        assert_eq!(calls, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_condition_error_fails_fast() {
        let mut calls = 0u32;
        let err = poll(&params(1, 60), &CancellationToken::new(), || {
            calls += 1;
            async { Err::<bool, _>(CoreError::ClusterNotFound("42".into())) }
        })
        .await
        .unwrap_err();

        assert_eq!(err.kind(), ErrorKind::ClusterNotFound);
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancellation_takes_priority() {
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(2500)).await;
            trigger.cancel();
        });

        let start = Instant::now();
        let err = poll(&params(1, 600), &cancel, || async { Ok(false) })
            .await
            .unwrap_err();

        assert!(err.is_cancelled());
        assert!(!err.is_timeout());
        assert!(start.elapsed() < Duration::from_secs(3));
    }

    #[tokio::test(start_paused = true)]
    async fn test_already_cancelled_never_evaluates() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let mut calls = 0u32;

        let err = poll(&params(1, 60), &cancel, || {
            calls += 1;
            async { Ok(true) }
        })
        .await
        .unwrap_err();

        assert!(err.is_cancelled());
        assert_eq!(calls, 0);
    }

    #[tokio::test]
    async fn test_zero_interval_rejected() {
        let err = poll(
            &PollingParams::new(Duration::ZERO, Duration::from_secs(1)),
            &CancellationToken::new(),
            || async { Ok(true) },
        )
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_params_serialize_as_seconds() {
        let p: PollingParams = toml::from_str("interval = 3\ntimeout = 900").unwrap();
        assert_eq!(p, params(3, 900));
        let back: PollingParams = toml::from_str(&toml::to_string(&p).unwrap()).unwrap();
        assert_eq!(back, p);
    }

    #[test]
    fn test_sub_second_params_do_not_serialize() {
        let p = PollingParams::new(Duration::from_millis(500), Duration::from_secs(10));
        let err = toml::to_string(&p).unwrap_err();
        assert!(err.to_string().contains("whole seconds"), "{err}");
    }

    #[tokio::test]
    async fn test_oversized_interval_rejected() {
        let p: PollingParams =
            toml::from_str("interval = 9223372036854775807\ntimeout = 5").unwrap();
        let mut calls = 0;
        let err = poll(&p, &CancellationToken::new(), || {
            calls += 1;
            async { Ok(true) }
        })
        .await
        .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(err.to_string().contains("too large"), "{err}");
        assert_eq!(calls, 0);
    }
}
