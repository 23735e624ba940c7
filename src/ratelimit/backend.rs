//! Limiter trait and the admission predicates built on it.

use std::time::Duration;

use async_trait::async_trait;

use super::delay::Delay;
use crate::error::Result;

/// Slice charged by [`allow`].
pub const UNIT_SLICE: Duration = Duration::from_secs(1);

/// Trait for limiter implementations.
///
/// This is the whole surface an admission layer (such as HTTP middleware
/// keyed by request host) needs from a limiter.
#[async_trait]
pub trait Limiter: Send + Sync {
    /// The time budget allocated to every task. This is a limiter-wide
    /// watermark, not the budget currently left for any one task.
    fn quantum(&self) -> Duration;

    /// Schedule the task to run for the given slice if it has quantum
    /// available. See [`Delay`] for how to read the result.
    async fn schedule(&self, task: &str, slice: Duration) -> Result<Delay>;

    /// Release the limiter's resources.
    async fn close(&self) -> Result<()>;
}

/// Returns true if `task` may run for one [`UNIT_SLICE`] now.
pub async fn allow<L: Limiter + ?Sized>(limiter: &L, task: &str) -> Result<bool> {
    allow_slice(limiter, task, UNIT_SLICE).await
}

/// Returns true if `task` may run for `slice` now.
pub async fn allow_slice<L: Limiter + ?Sized>(limiter: &L, task: &str, slice: Duration) -> Result<bool> {
    Ok(limiter.schedule(task, slice).await?.is_granted())
}
