//! OS jitter monitor.
//!
//! A dedicated thread reads the clock in a tight loop. Any gap between two
//! consecutive reads above the threshold is time the thread was not running:
//! the scheduler, interrupts or the host took the core away. Those gaps go into a
//! histogram that the harness reads and resets once per run.

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use parking_lot::Mutex;

use crate::{clock::nano_time, error::Error, histogram::Histogram};

/// Clock reads between checks of the reset and shutdown flags.
const READS_PER_PASS: u32 = 1_000;

/// The monitor briefly sleeps after this long of uninterrupted spinning.
const SPIN_BUDGET_NS: u64 = 60_000_000_000;

const BREATHER: Duration = Duration::from_millis(1);

#[derive(Debug)]
struct Shared<H> {
    histogram: Mutex<H>,
    reset: AtomicBool,
    shutdown: AtomicBool,
}

/// Handle to the running monitor thread. Dropping it stops the thread.
#[derive(Debug)]
pub(crate) struct JitterMonitor<H: Histogram> {
    shared: Arc<Shared<H>>,
    handle: Option<JoinHandle<()>>,
}

impl<H: Histogram> JitterMonitor<H> {
    pub(crate) fn spawn(threshold_ns: u64, affinity: bool) -> Result<Self, Error> {
        let shared = Arc::new(Shared {
            histogram: Mutex::new(H::new()),
            reset: AtomicBool::new(false),
            shutdown: AtomicBool::new(false),
        });
        if affinity {
            tracing::info!("Jitter thread affinity requested; running unpinned");
        }
        let worker = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("lathe-os-jitter".into())
            .spawn(move || monitor(worker, threshold_ns))?;
        tracing::debug!("OS jitter monitor started with threshold {threshold_ns}ns");
        Ok(Self {
            shared,
            handle: Some(handle),
        })
    }

    /// Forget everything recorded so far.
    ///
    /// The running thread clears the readout and its unpublished samples
    /// together, under the readout lock, at its next check-in. A stopped monitor
    /// is cleared here.
    pub(crate) fn reset(&self) {
        if self.handle.is_none() {
            self.shared.histogram.lock().reset();
            return;
        }
        self.shared.reset.store(true, Ordering::Release);
    }

    pub(crate) fn total_count(&self) -> u64 {
        self.shared.histogram.lock().total_count()
    }

    pub(crate) fn percentiles(&self) -> Vec<f64> {
        self.shared.histogram.lock().percentiles()
    }

    pub(crate) fn stop(&mut self) {
        self.shared.shutdown.store(true, Ordering::Release);
        if let Some(handle) = self.handle.take() {
            if handle.join().is_err() {
                tracing::warn!("OS jitter monitor panicked");
            }
            tracing::debug!("OS jitter monitor stopped");
        }
    }
}

impl<H: Histogram> Drop for JitterMonitor<H> {
    fn drop(&mut self) {
        self.stop();
    }
}

fn monitor<H: Histogram>(shared: Arc<Shared<H>>, threshold_ns: u64) {
    let mut local = H::new();
    let mut last = nano_time();
    let mut breather_due = last + SPIN_BUDGET_NS;

    while !shared.shutdown.load(Ordering::Acquire) {
        for _ in 0..READS_PER_PASS {
            let now = nano_time();
            let gap = now - last;
            if gap > threshold_ns {
                local.sample(gap);
            }
            last = now;
        }

        if local.total_count() > 0 || shared.reset.load(Ordering::Acquire) {
            // Never wait on the reader; publish on a later pass instead.
            if let Some(mut published) = shared.histogram.try_lock() {
                // Samples from before a reset must not reach the cleared readout.
                if shared.reset.swap(false, Ordering::AcqRel) {
                    published.reset();
                } else {
                    published.merge(&local);
                }
                drop(published);
                local.reset();
                // Publishing is our own overhead, not the OS's.
                last = nano_time();
            }
        }

        if last > breather_due {
            thread::sleep(BREATHER);
            last = nano_time();
            breather_due = last + SPIN_BUDGET_NS;
        }
    }
}
