use std::{
    sync::Arc,
    thread::{self, JoinHandle},
    time::{Duration, Instant},
};

use crate::{
    collector::Collector,
    control::{Control, Phase},
    error::Error,
    histogram::Histogram,
    sink::OutputSink,
};

/// Upper bound on how often the watchdog looks at the sample counter.
const MAX_POLL: Duration = Duration::from_secs(10);

/// Aborts the benchmark when samples stop arriving.
///
/// Progress is measured on the collector's received counter, which is never
/// reset, and the silence window starts when the watchdog does.
#[derive(Debug)]
pub(crate) struct Watchdog {
    handle: Option<JoinHandle<()>>,
}

impl Watchdog {
    pub(crate) fn spawn<H: Histogram>(
        timeout: Duration,
        collector: Collector<H>,
        control: Arc<Control>,
        sink: OutputSink,
    ) -> Result<Self, Error> {
        let poll = timeout.min(MAX_POLL);
        let handle = thread::Builder::new()
            .name("lathe-watchdog".into())
            .spawn(move || {
                let mut seen = collector.samples_received();
                let mut last_progress = Instant::now();
                loop {
                    thread::park_timeout(poll);
                    if control.phase() == Phase::Complete || control.is_aborted() {
                        return;
                    }
                    let received = collector.samples_received();
                    if received > seen {
                        seen = received;
                        last_progress = Instant::now();
                    } else if last_progress.elapsed() >= timeout {
                        sink.line("Sample timed out. Aborting test...");
                        tracing::warn!("No samples for {timeout:?}, aborting");
                        control.abort();
                        return;
                    }
                }
            })?;
        tracing::debug!("Sample timeout watchdog started ({timeout:?})");
        Ok(Self {
            handle: Some(handle),
        })
    }

    /// Wake the watchdog and wait for it to exit. The caller must already have
    /// moved the phase to `Complete` or aborted.
    pub(crate) fn stop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.thread().unpark();
            if handle.join().is_err() {
                tracing::warn!("Sample timeout watchdog panicked");
            }
        }
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        self.stop();
    }
}
