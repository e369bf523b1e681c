//! Single-run guard.

use std::sync::atomic::{AtomicBool, Ordering};

use serde::Serialize;

/// Whether a digest run is in flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running,
}

/// At most one holder at a time. Acquire with [`RunSlot::try_acquire`];
/// the returned guard frees the slot when dropped, including on unwind.
#[derive(Debug, Default)]
pub struct RunSlot {
    running: AtomicBool,
}

impl RunSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Idle -> Running in one compare-and-set. `None` if already Running.
    pub fn try_acquire(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard { slot: self })
    }

    pub fn state(&self) -> RunState {
        if self.running.load(Ordering::Acquire) {
            RunState::Running
        } else {
            RunState::Idle
        }
    }
}

/// Holds the slot in the Running state until dropped.
#[derive(Debug)]
pub struct RunGuard<'a> {
    slot: &'a RunSlot,
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.slot.running.store(false, Ordering::Release);
    }
}
