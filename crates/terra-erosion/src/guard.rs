//! Single-flight guard shared by every simulator and the orchestrator.

use std::sync::atomic::{AtomicBool, Ordering};

/// Result of a `run` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The run executed and its results are published.
    Completed,
    /// Another run was already in flight; nothing happened.
    Skipped,
}

impl RunOutcome {
    pub fn is_completed(self) -> bool {
        self == Self::Completed
    }
}

/// At most one holder at a time; a second `try_begin` fails instead of waiting.
#[derive(Debug, Default)]
pub struct SingleFlight {
    running: AtomicBool,
}

impl SingleFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claim the flag, or `None` if a run is already active.
    pub fn try_begin(&self) -> Option<FlightGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| FlightGuard { flag: &self.running })
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }
}

/// Releases the flag on drop, including when the run errors or is cancelled.
#[derive(Debug)]
pub struct FlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}
