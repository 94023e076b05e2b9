//! Bounded retry with a fixed delay between attempts.
//!
//! Tool invocations collapse their outcome into a small result enum, and one
//! designated value of that enum means "failed, worth another try". Everything
//! is passed in as arguments: the policy, the task, the callbacks, and (for
//! tests) the sleep function. There is no shared state and no error-type
//! inspection; a task error is fatal and never retried.

use std::future::Future;
use std::time::Duration;

/// How often and how patiently a task is retried.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Treated as at least 1.
    pub max_attempts: u32,
    /// Delay between attempts. Never applied before the first attempt or
    /// after the last.
    pub interval: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, interval: Duration) -> Self {
        Self {
            max_attempts,
            interval,
        }
    }

    /// A single attempt, no waiting.
    pub fn once() -> Self {
        Self::new(1, Duration::ZERO)
    }
}

/// Runs `task` up to `policy.max_attempts` times, sleeping with
/// [`tokio::time::sleep`] between attempts.
///
/// See [`run_with_sleep`] for the exact semantics.
pub async fn run<R, E, T, F>(
    policy: RetryPolicy,
    retryable: R,
    task: T,
    on_try_start: impl FnMut(u32),
    on_eventual_failure: impl FnOnce(&R, u32),
) -> Result<R, E>
where
    R: PartialEq,
    T: FnMut() -> F,
    F: Future<Output = Result<R, E>>,
{
    run_with_sleep(
        policy,
        retryable,
        task,
        on_try_start,
        on_eventual_failure,
        tokio::time::sleep,
    )
    .await
}

/// Retry core with an injectable delay function.
///
/// Semantics:
/// - `on_try_start(n)` is invoked exactly once before attempt `n` (1-based).
/// - An `Ok` result different from `retryable` ends the run immediately; the
///   infra plan's advisory outcome passes through here untouched.
/// - An `Ok(retryable)` result with attempts left sleeps `policy.interval`
///   and tries again.
/// - If the final attempt is still `retryable`, `on_eventual_failure` is
///   invoked exactly once and the retryable value is returned; callers read
///   that as overall failure.
/// - An `Err` from the task is returned immediately and never retried.
///
/// Dropping the returned future mid-sleep simply abandons the run; no
/// further attempts are made.
pub async fn run_with_sleep<R, E, T, F, S, SF>(
    policy: RetryPolicy,
    retryable: R,
    mut task: T,
    mut on_try_start: impl FnMut(u32),
    on_eventual_failure: impl FnOnce(&R, u32),
    mut sleep: S,
) -> Result<R, E>
where
    R: PartialEq,
    T: FnMut() -> F,
    F: Future<Output = Result<R, E>>,
    S: FnMut(Duration) -> SF,
    SF: Future<Output = ()>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;
    loop {
        on_try_start(attempt);
        let result = task().await?;
        if result != retryable {
            return Ok(result);
        }
        if attempt >= max_attempts {
            on_eventual_failure(&result, attempt);
            return Ok(result);
        }
        sleep(policy.interval).await;
        attempt += 1;
    }
}
