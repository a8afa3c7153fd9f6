//! Per-call retry budget shared by the call wrapper and the auth middleware.
//!
//! The wrapper scopes a budget around each logical call; the middleware finds
//! it through a task-local, so operations never have to pass it along.
//! Outside a scope every request is allowed its single refresh.

use std::future::Future;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Refresh attempts allowed per logical call, across both layers
pub const MAX_REFRESHES_PER_CALL: u32 = 2;

/// Resends of the original request allowed per logical call
pub const MAX_RESENDS_PER_CALL: u32 = 2;

tokio::task_local! {
    static CALL_BUDGET: Arc<RetryBudget>;
}

#[derive(Debug)]
pub struct RetryBudget {
    refreshes: AtomicU32,
    resends: AtomicU32,
}

impl RetryBudget {
    pub fn new(refreshes: u32, resends: u32) -> Self {
        Self {
            refreshes: AtomicU32::new(refreshes),
            resends: AtomicU32::new(resends),
        }
    }

    pub fn per_call() -> Self {
        Self::new(MAX_REFRESHES_PER_CALL, MAX_RESENDS_PER_CALL)
    }

    pub fn take_refresh(&self) -> bool {
        Self::take(&self.refreshes)
    }

    pub fn take_resend(&self) -> bool {
        Self::take(&self.resends)
    }

    pub fn refreshes_left(&self) -> u32 {
        self.refreshes.load(Ordering::Acquire)
    }

    pub fn resends_left(&self) -> u32 {
        self.resends.load(Ordering::Acquire)
    }

    fn take(counter: &AtomicU32) -> bool {
        counter
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |n| n.checked_sub(1))
            .is_ok()
    }
}

/// Run `fut` with `budget` visible to [`try_refresh`] and [`try_resend`].
pub async fn scope<F: Future>(budget: Arc<RetryBudget>, fut: F) -> F::Output {
    CALL_BUDGET.scope(budget, fut).await
}

pub(crate) fn try_refresh() -> bool {
    CALL_BUDGET.try_with(|b| b.take_refresh()).unwrap_or(true)
}

pub(crate) fn try_resend() -> bool {
    CALL_BUDGET.try_with(|b| b.take_resend()).unwrap_or(true)
}
