//! Exponential backoff and the single-slot retry timer

use rand::Rng;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Backoff for the attempt after `failures` consecutive failures, with a
/// random jitter drawn from `[0, base)`.
pub fn backoff_delay(failures: u32, base: Duration, max: Duration) -> Duration {
    let base_ms = base.as_millis() as u64;
    let jitter = if base_ms == 0 {
        Duration::ZERO
    } else {
        Duration::from_millis(rand::thread_rng().gen_range(0..base_ms))
    };
    backoff_with_jitter(failures, base, max, jitter)
}

/// `min(2^failures * base + jitter, max)`
pub fn backoff_with_jitter(failures: u32, base: Duration, max: Duration, jitter: Duration) -> Duration {
    base.saturating_mul(2u32.saturating_pow(failures))
        .saturating_add(jitter)
        .min(max)
}

/// Runs at most one delayed task at a time.
///
/// Scheduling replaces whatever was pending. A task either runs to
/// completion or is suppressed entirely; cancelling after it fired is a
/// no-op.
#[derive(Default)]
pub struct RetryScheduler {
    slot: Arc<Mutex<Slot>>,
}

#[derive(Default)]
struct Slot {
    generation: u64,
    handle: Option<JoinHandle<()>>,
}

fn lock(slot: &Mutex<Slot>) -> MutexGuard<'_, Slot> {
    slot.lock().unwrap_or_else(PoisonError::into_inner)
}

impl RetryScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `task` after `delay` unless cancelled or replaced first.
    ///
    /// Must be called from within a tokio runtime.
    pub fn schedule_after<F>(&self, delay: Duration, task: F)
    where
        F: FnOnce() + Send + 'static,
    {
        let mut slot = lock(&self.slot);
        slot.generation += 1;
        if let Some(previous) = slot.handle.take() {
            previous.abort();
        }

        let generation = slot.generation;
        let shared = Arc::clone(&self.slot);
        slot.handle = Some(tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            {
                let mut slot = lock(&shared);
                if slot.generation != generation {
                    return;
                }
                // Claimed: from here on cancel() cannot touch this task.
                slot.handle = None;
            }
            task();
        }));
    }

    /// Suppress the pending task, if it has not fired yet.
    pub fn cancel(&self) {
        let mut slot = lock(&self.slot);
        slot.generation += 1;
        if let Some(handle) = slot.handle.take() {
            handle.abort();
        }
    }

    pub fn is_pending(&self) -> bool {
        lock(&self.slot).handle.is_some()
    }
}

impl Drop for RetryScheduler {
    fn drop(&mut self) {
        self.cancel();
    }
}
