// ── Fixed-delay retry ──
//
// Multi-step workflows re-issue a failed step after the same delay each
// time. The wait is a delayed scheduler task, never a sleep.

use std::rc::Rc;
use std::time::Duration;

use tracing::debug;

use crate::executor::UiScheduler;
use crate::future::{ClientFuture, SettableClientFuture};

/// Fixed-delay retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Delay between attempts. Never grows.
    pub delay: Duration,
    /// Total attempts including the first. Zero is treated as one.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            delay: Duration::from_secs(5),
            max_attempts: 3,
        }
    }
}

impl RetryPolicy {
    /// Policy that never retries.
    pub fn none() -> Self {
        Self {
            delay: Duration::ZERO,
            max_attempts: 1,
        }
    }
}

type Operation<T> = Rc<dyn Fn(u32) -> ClientFuture<T>>;

/// Run `operation` until it succeeds, fails terminally, or runs out of
/// attempts. The operation receives the 1-based attempt number.
pub fn retry_with_fixed_delay<T: Clone + 'static>(
    scheduler: &UiScheduler,
    policy: RetryPolicy,
    operation: impl Fn(u32) -> ClientFuture<T> + 'static,
) -> ClientFuture<T> {
    let out = SettableClientFuture::new();
    let future = out.future();
    attempt(scheduler.clone(), policy, Rc::new(operation), 1, out);
    future
}

fn attempt<T: Clone + 'static>(
    scheduler: UiScheduler,
    policy: RetryPolicy,
    operation: Operation<T>,
    number: u32,
    out: SettableClientFuture<T>,
) {
    let step = operation(number);
    step.on_completion(move |result| match result {
        Ok(value) => {
            out.set(value);
        }
        Err(error) if error.is_terminal() || number >= policy.max_attempts.max(1) => {
            out.set_error(error);
        }
        Err(error) => {
            debug!(
                attempt = number,
                delay_ms = u64::try_from(policy.delay.as_millis()).unwrap_or(u64::MAX),
                error = %error,
                "retrying after fixed delay"
            );
            let next = scheduler.clone();
            scheduler.post_delayed(policy.delay, move || {
                attempt(next, policy, operation, number + 1, out);
            });
        }
    });
}
