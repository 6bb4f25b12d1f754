//! Per-monitor lifecycle state.
//!
//! Each active monitor has exactly one `StatusCell`, shared between the
//! scheduler worker (which drives the trigger protocol) and handle-side
//! flows (status queries, stop requests). Under strict single-worker
//! processing the mutex degenerates to a formality, but stop and query
//! flows legitimately touch the status from outside the worker, so the
//! boundary stays locked.

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

/// Lifecycle status of a monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MonitorStatus {
    /// Never started (no live state exists).
    Uninitialized,
    /// Start accepted; first trigger not yet armed.
    Initializing,
    /// Idle between triggers; eligible to execute.
    Ready,
    /// A trigger is executing the probe right now.
    Running,
    /// Terminal. A stopped monitor has no live timer and never reschedules.
    Stopped,
}

/// Guarded status shared between the worker and handle-side flows.
#[derive(Debug)]
pub struct StatusCell {
    status: Mutex<MonitorStatus>,
}

impl StatusCell {
    /// Creates a cell in the `Initializing` state.
    #[must_use]
    pub fn initializing() -> Arc<Self> {
        Arc::new(Self {
            status: Mutex::new(MonitorStatus::Initializing),
        })
    }

    /// Guarded read of the current status.
    pub fn get(&self) -> MonitorStatus {
        *self.status.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Guarded write. Returns the status that was replaced.
    pub fn set(&self, status: MonitorStatus) -> MonitorStatus {
        let mut guard = self
            .status
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        std::mem::replace(&mut *guard, status)
    }

    /// Guarded compare-and-set: writes `to` only if the cell still holds
    /// `from`. Returns whether the write happened.
    ///
    /// The trigger protocol uses this for its status resets so a concurrent
    /// stop always wins: a cell that moved to `Stopped` mid-cycle is never
    /// resurrected.
    pub fn transition(&self, from: MonitorStatus, to: MonitorStatus) -> bool {
        let mut guard = self
            .status
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        if *guard == from {
            *guard = to;
            true
        } else {
            false
        }
    }
}

/// The pending delayed re-trigger for a monitor.
///
/// At most one exists per active monitor. Owned solely by the worker;
/// cancelled on stop, superseded on reschedule. Cancelling an absent or
/// already-fired entry is a no-op, never an error.
#[derive(Debug, Clone, Copy)]
pub struct TimerEntry {
    /// When the next trigger fires.
    pub deadline: Instant,
}

/// Worker-owned record for one active monitor.
///
/// Exists iff the monitor has been started and not yet fully stopped.
#[derive(Debug)]
pub struct MonitorState {
    /// Effective delay between trigger completion and the next trigger.
    pub interval: Duration,
    /// Shared guarded status.
    pub status: Arc<StatusCell>,
    /// Pending re-trigger, if armed.
    pub timer: Option<TimerEntry>,
}

impl MonitorState {
    /// Creates a state record around an already-installed status cell.
    #[must_use]
    pub fn new(interval: Duration, status: Arc<StatusCell>) -> Self {
        Self {
            interval,
            status,
            timer: None,
        }
    }

    /// Cancels any pending timer. No-op when none is armed.
    pub fn cancel_timer(&mut self) {
        self.timer = None;
    }

    /// Arms the re-trigger `interval` from now, superseding any stray
    /// pending entry.
    pub fn arm_timer(&mut self, now: Instant) {
        self.timer = Some(TimerEntry {
            deadline: now + self.interval,
        });
    }

    /// Arms an immediate first trigger.
    pub fn arm_now(&mut self, now: Instant) {
        self.timer = Some(TimerEntry { deadline: now });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cell_starts_initializing() {
        let cell = StatusCell::initializing();
        assert_eq!(cell.get(), MonitorStatus::Initializing);
    }

    #[test]
    fn set_returns_previous_status() {
        let cell = StatusCell::initializing();
        assert_eq!(cell.set(MonitorStatus::Ready), MonitorStatus::Initializing);
        assert_eq!(cell.get(), MonitorStatus::Ready);
    }

    #[test]
    fn transition_only_fires_from_expected_state() {
        let cell = StatusCell::initializing();
        cell.set(MonitorStatus::Running);

        // Stop wins: once stopped, the reset back to ready must not happen.
        cell.set(MonitorStatus::Stopped);
        assert!(!cell.transition(MonitorStatus::Running, MonitorStatus::Ready));
        assert_eq!(cell.get(), MonitorStatus::Stopped);

        let cell = StatusCell::initializing();
        cell.set(MonitorStatus::Running);
        assert!(cell.transition(MonitorStatus::Running, MonitorStatus::Ready));
        assert_eq!(cell.get(), MonitorStatus::Ready);
    }

    #[test]
    fn timer_cancel_is_idempotent() {
        let mut state = MonitorState::new(Duration::from_secs(3), StatusCell::initializing());
        assert!(state.timer.is_none());
        state.cancel_timer();
        state.cancel_timer();
        assert!(state.timer.is_none());

        let now = Instant::now();
        state.arm_timer(now);
        let deadline = state.timer.unwrap().deadline;
        assert_eq!(deadline, now + Duration::from_secs(3));

        state.cancel_timer();
        assert!(state.timer.is_none());
    }

    #[test]
    fn rearm_supersedes_pending_entry() {
        let mut state = MonitorState::new(Duration::from_secs(3), StatusCell::initializing());
        let t0 = Instant::now();
        state.arm_now(t0);
        state.arm_timer(t0 + Duration::from_secs(1));
        assert_eq!(
            state.timer.unwrap().deadline,
            t0 + Duration::from_secs(1) + Duration::from_secs(3),
        );
    }
}
