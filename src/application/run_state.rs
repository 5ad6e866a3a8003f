//! Process-wide run state of the maintenance controller
//!
//! Two orthogonal pieces:
//! - the scheduler slot, holding the token of the armed trigger loop
//! - the batch slot, holding the start time and stop token of the running sweep
//!
//! Both live behind one short-held mutex so "start if not already running"
//! is a single check-and-set. A fresh stop token per batch means the stop
//! flag is cleared whenever a new batch begins.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::{DateTime, Utc};
use tokio_util::sync::CancellationToken;

#[derive(Debug, Default)]
struct Slots {
    scheduler: Option<CancellationToken>,
    batch: Option<ActiveBatch>,
}

#[derive(Debug, Clone)]
struct ActiveBatch {
    id: u64,
    started_at: DateTime<Utc>,
    stop: CancellationToken,
}

/// Read-only copy of the flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunFlags {
    pub scheduler_active: bool,
    pub batch_active: bool,
    pub stop_requested: bool,
    pub batch_started_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
pub struct RunState {
    slots: Mutex<Slots>,
    next_batch_id: std::sync::atomic::AtomicU64,
}

impl RunState {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn lock(&self) -> MutexGuard<'_, Slots> {
        // The guarded data is plain flags; a panic elsewhere cannot leave it torn.
        self.slots
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Arms the scheduler slot. `None` if it was already armed.
    pub fn arm_scheduler(&self) -> Option<CancellationToken> {
        let mut slots = self.lock();
        if slots.scheduler.is_some() {
            return None;
        }
        let token = CancellationToken::new();
        slots.scheduler = Some(token.clone());
        Some(token)
    }

    /// Disarms and cancels the scheduler loop. Returns whether it was armed.
    pub fn disarm_scheduler(&self) -> bool {
        let token = self.lock().scheduler.take();
        token.is_some_and(|token| {
            token.cancel();
            true
        })
    }

    /// Claims the batch slot. `None` while another batch holds it.
    pub fn try_begin_batch(self: &Arc<Self>) -> Option<BatchGuard> {
        let mut slots = self.lock();
        if slots.batch.is_some() {
            return None;
        }
        let batch = ActiveBatch {
            id: self
                .next_batch_id
                .fetch_add(1, std::sync::atomic::Ordering::Relaxed),
            started_at: Utc::now(),
            stop: CancellationToken::new(),
        };
        slots.batch = Some(batch.clone());
        Some(BatchGuard {
            state: Arc::clone(self),
            id: batch.id,
            started_at: batch.started_at,
            stop: batch.stop,
        })
    }

    /// Signals the running batch to stop. Returns whether one was running.
    pub fn request_stop(&self) -> bool {
        let stop = self.lock().batch.as_ref().map(|batch| batch.stop.clone());
        stop.is_some_and(|stop| {
            stop.cancel();
            true
        })
    }

    pub fn flags(&self) -> RunFlags {
        let slots = self.lock();
        RunFlags {
            scheduler_active: slots.scheduler.is_some(),
            batch_active: slots.batch.is_some(),
            stop_requested: slots
                .batch
                .as_ref()
                .is_some_and(|batch| batch.stop.is_cancelled()),
            batch_started_at: slots.batch.as_ref().map(|batch| batch.started_at),
        }
    }

    fn end_batch(&self, id: u64) {
        let mut slots = self.lock();
        if slots.batch.as_ref().is_some_and(|batch| batch.id == id) {
            slots.batch = None;
        }
    }
}

/// Ownership of the batch slot. Dropping it frees the slot, including on
/// panic or when the owning task is aborted.
#[derive(Debug)]
pub struct BatchGuard {
    state: Arc<RunState>,
    id: u64,
    started_at: DateTime<Utc>,
    stop: CancellationToken,
}

impl BatchGuard {
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub const fn stop_token(&self) -> &CancellationToken {
        &self.stop
    }
}

impl Drop for BatchGuard {
    fn drop(&mut self) {
        self.state.end_batch(self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scheduler_arms_once() {
        let state = RunState::new();
        let token = state.arm_scheduler().expect("first arm");
        assert!(state.arm_scheduler().is_none());
        assert!(state.flags().scheduler_active);

        assert!(state.disarm_scheduler());
        assert!(token.is_cancelled());
        assert!(!state.disarm_scheduler());
        assert!(!state.flags().scheduler_active);
    }

    #[test]
    fn batch_slot_is_exclusive_and_released_on_drop() {
        let state = RunState::new();
        let guard = state.try_begin_batch().expect("slot free");
        assert!(state.try_begin_batch().is_none());
        assert!(state.flags().batch_active);
        assert_eq!(state.flags().batch_started_at, Some(guard.started_at()));

        drop(guard);
        let flags = state.flags();
        assert!(!flags.batch_active);
        assert!(!flags.stop_requested);
        assert!(flags.batch_started_at.is_none());
    }

    #[test]
    fn stop_only_signals_a_running_batch() {
        let state = RunState::new();
        assert!(!state.request_stop());

        let guard = state.try_begin_batch().expect("slot free");
        assert!(state.request_stop());
        assert!(guard.stop_token().is_cancelled());
        assert!(state.flags().stop_requested);
        drop(guard);

        let next = state.try_begin_batch().expect("slot free again");
        assert!(!next.stop_token().is_cancelled());
        assert!(!state.flags().stop_requested);
    }
}
