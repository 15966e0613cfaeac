//! Cross-thread coordination: the benchmark phase, the abort flag and the handle
//! used to interrupt a running pacer.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    thread::Thread,
};

use parking_lot::Mutex;

/// Where the benchmark currently is.
///
/// Transitions:
/// `Warmup -> Measuring` (latched by the sample that completes warmup),
/// `Measuring -> Draining` (a run's invocations are all issued),
/// `Draining -> Measuring` (the run's samples arrived and another run follows),
/// `Measuring | Draining -> Complete`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Phase {
    Warmup = 0,
    Measuring = 1,
    Draining = 2,
    Complete = 3,
}

impl Phase {
    fn from_u8(value: u8) -> Self {
        match value {
            0 => Phase::Warmup,
            1 => Phase::Measuring,
            2 => Phase::Draining,
            _ => Phase::Complete,
        }
    }
}

/// Shared between the pacer, the collector, the watchdog and any abort handles.
#[derive(Debug)]
pub(crate) struct Control {
    phase: AtomicU8,
    aborted: AtomicBool,
    pacer: Mutex<Option<Thread>>,
}

impl Control {
    pub(crate) fn new(initial: Phase) -> Self {
        Self {
            phase: AtomicU8::new(initial as u8),
            aborted: AtomicBool::new(false),
            pacer: Mutex::new(None),
        }
    }

    pub(crate) fn phase(&self) -> Phase {
        Phase::from_u8(self.phase.load(Ordering::Acquire))
    }

    pub(crate) fn set_phase(&self, phase: Phase) {
        self.phase.store(phase as u8, Ordering::Release);
    }

    /// Move from `from` to `to` only if nobody else got there first.
    pub(crate) fn transition(&self, from: Phase, to: Phase) -> bool {
        self.phase
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::Acquire)
    }

    pub(crate) fn abort(&self) {
        self.aborted.store(true, Ordering::Release);
        if let Some(thread) = self.pacer.lock().as_ref() {
            thread.unpark();
        }
    }

    /// Register the thread that should be woken when an abort arrives.
    pub(crate) fn attach_pacer(&self, thread: Thread) {
        *self.pacer.lock() = Some(thread);
    }

    pub(crate) fn detach_pacer(&self) {
        self.pacer.lock().take();
    }
}

/// Stops a running benchmark from any thread.
///
/// Obtained from [`crate::Harness::abort_handle`] before calling
/// [`crate::Harness::start`]. Aborting sets a shared flag and wakes the pacing
/// thread out of any coarse sleep; the pacer finishes its current invocation,
/// skips the unfinished run and publishes what completed.
#[derive(Debug, Clone)]
pub struct AbortHandle {
    pub(crate) control: Arc<Control>,
}

impl AbortHandle {
    pub fn abort(&self) {
        tracing::info!("Abort requested");
        self.control.abort();
    }

    pub fn is_aborted(&self) -> bool {
        self.control.is_aborted()
    }

    pub fn phase(&self) -> Phase {
        self.control.phase()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transition_only_from_expected_phase() {
        let control = Control::new(Phase::Warmup);
        assert!(control.transition(Phase::Warmup, Phase::Measuring));
        assert!(!control.transition(Phase::Warmup, Phase::Measuring));
        assert_eq!(control.phase(), Phase::Measuring);
    }

    #[test]
    fn abort_without_pacer_sets_flag() {
        let handle = AbortHandle {
            control: Arc::new(Control::new(Phase::Measuring)),
        };
        assert!(!handle.is_aborted());
        handle.abort();
        assert!(handle.is_aborted());
    }
}
