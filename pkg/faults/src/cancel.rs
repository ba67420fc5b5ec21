use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use parking_lot::{Condvar, Mutex};

/// Sticky cancellation flag shared between a service and its blocked callers.
/// Once cancelled it stays cancelled, so callers can check after a wait why
/// it ended early.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: Mutex<bool>,
    wakeup: Condvar,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SleepOutcome {
    pub slept: Duration,
    pub interrupted: bool,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        let mut cancelled = self.inner.cancelled.lock();
        *cancelled = true;
        self.inner.wakeup.notify_all();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.inner.cancelled.lock()
    }

    /// Blocks for `duration` unless the token is cancelled first.
    pub fn sleep(&self, duration: Duration) -> SleepOutcome {
        let started = Instant::now();
        if duration.is_zero() {
            return SleepOutcome {
                slept: Duration::ZERO,
                interrupted: false,
            };
        }
        let deadline = started + duration;
        let mut cancelled = self.inner.cancelled.lock();
        while !*cancelled {
            if self
                .inner
                .wakeup
                .wait_until(&mut cancelled, deadline)
                .timed_out()
            {
                break;
            }
        }
        SleepOutcome {
            slept: started.elapsed(),
            interrupted: *cancelled,
        }
    }
}
