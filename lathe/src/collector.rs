//! Sample collection: the end-to-end histogram, named probes and the warmup latch.

use std::{
    collections::BTreeMap,
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
};

use parking_lot::{Mutex, RwLock};

use crate::{
    control::{Control, Phase},
    histogram::{Histogram, LatencyHistogram},
};

/// Anything a task can hand a latency sample to.
///
/// Implementations must be callable from any thread: a task may issue work on
/// the pacing thread and record its completion on a worker.
pub trait NanoSampler: Send + Sync {
    fn sample_nanos(&self, nanos: u64);
}

/// A named latency sink.
///
/// Cloning is cheap and every clone records into the same histogram.
#[derive(Debug)]
pub struct Probe<H: Histogram = LatencyHistogram> {
    inner: Arc<ProbeInner<H>>,
}

impl<H: Histogram> Clone for Probe<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[derive(Debug)]
struct ProbeInner<H> {
    histogram: Mutex<H>,
    // Mirrors the histogram count so draining can poll without locking.
    count: AtomicU64,
}

impl<H: Histogram> Probe<H> {
    fn new() -> Self {
        Self {
            inner: Arc::new(ProbeInner {
                histogram: Mutex::new(H::new()),
                count: AtomicU64::new(0),
            }),
        }
    }

    #[inline]
    pub fn sample(&self, nanos: u64) {
        let mut histogram = self.inner.histogram.lock();
        histogram.sample(nanos);
        self.inner.count.fetch_add(1, Ordering::AcqRel);
    }

    /// Samples recorded since the last reset.
    pub fn count(&self) -> u64 {
        self.inner.count.load(Ordering::Acquire)
    }

    pub(crate) fn reset(&self) {
        let mut histogram = self.inner.histogram.lock();
        histogram.reset();
        self.inner.count.store(0, Ordering::Release);
    }

    pub(crate) fn percentiles(&self) -> Vec<f64> {
        self.inner.histogram.lock().percentiles()
    }
}

impl<H: Histogram> NanoSampler for Probe<H> {
    fn sample_nanos(&self, nanos: u64) {
        self.sample(nanos);
    }
}

/// Owns the end-to-end histogram and the probe registry.
///
/// This is the handle a [`crate::Task`] receives in `init`. It is cheap to clone
/// and safe to share with worker threads: probes can be registered and sampled
/// concurrently without any locking on the caller's side.
///
/// # Warmup
///
/// End-to-end samples received before `warmup_iterations` are recorded and later
/// discarded. The sample that brings the count to exactly `warmup_iterations`
/// resets the end-to-end histogram and every probe and is itself dropped. That
/// reset happens once: it is guarded by the `Warmup -> Measuring` phase latch,
/// not by the count alone, so late duplicates from asynchronous completions
/// cannot trigger it again.
#[derive(Debug)]
pub struct Collector<H: Histogram = LatencyHistogram> {
    inner: Arc<CollectorInner<H>>,
}

impl<H: Histogram> Clone for Collector<H> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

#[derive(Debug)]
struct CollectorInner<H: Histogram> {
    warmup_iterations: u64,
    // Never reset; the watchdog watches it for progress.
    received: AtomicU64,
    control: Arc<Control>,
    end_to_end: Probe<H>,
    probes: RwLock<BTreeMap<String, Probe<H>>>,
}

impl<H: Histogram> Collector<H> {
    pub(crate) fn new(warmup_iterations: u64, control: Arc<Control>) -> Self {
        Self {
            inner: Arc::new(CollectorInner {
                warmup_iterations,
                received: AtomicU64::new(0),
                control,
                end_to_end: Probe::new(),
                probes: RwLock::new(BTreeMap::new()),
            }),
        }
    }

    /// Register a named probe, or fetch the existing one of the same name.
    ///
    /// The first registration of a name wins; later calls return a handle to the
    /// same histogram. Probes added after warmup start empty.
    pub fn add_probe(&self, name: impl Into<String>) -> Probe<H> {
        let name = name.into();
        if let Some(probe) = self.inner.probes.read().get(&name) {
            return probe.clone();
        }
        self.inner
            .probes
            .write()
            .entry(name)
            .or_insert_with(Probe::new)
            .clone()
    }

    /// Record an end-to-end latency.
    pub fn sample(&self, nanos: u64) {
        let inner = &self.inner;
        let received = inner.received.fetch_add(1, Ordering::AcqRel) + 1;
        if inner.control.phase() == Phase::Warmup {
            if received < inner.warmup_iterations {
                inner.end_to_end.sample(nanos);
                return;
            }
            if received == inner.warmup_iterations
                && inner.control.transition(Phase::Warmup, Phase::Measuring)
            {
                self.reset_all();
                tracing::debug!("Warmup latched after {received} samples");
                return;
            }
        }
        inner.end_to_end.sample(nanos);
    }

    /// End-to-end samples received in total, warmup included.
    pub fn samples_received(&self) -> u64 {
        self.inner.received.load(Ordering::Acquire)
    }

    /// End-to-end samples recorded in the current run.
    pub fn end_to_end_count(&self) -> u64 {
        self.inner.end_to_end.count()
    }

    pub fn is_warmed_up(&self) -> bool {
        self.inner.control.phase() != Phase::Warmup
    }

    pub(crate) fn end_to_end(&self) -> &Probe<H> {
        &self.inner.end_to_end
    }

    /// Probes in lexicographic name order.
    pub(crate) fn probes(&self) -> Vec<(String, Probe<H>)> {
        self.inner
            .probes
            .read()
            .iter()
            .map(|(name, probe)| (name.clone(), probe.clone()))
            .collect()
    }

    pub(crate) fn reset_all(&self) {
        self.inner.end_to_end.reset();
        for probe in self.inner.probes.read().values() {
            probe.reset();
        }
    }
}

impl<H: Histogram> NanoSampler for Collector<H> {
    fn sample_nanos(&self, nanos: u64) {
        self.sample(nanos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn collector(warmup: u64) -> Collector {
        let phase = if warmup == 0 {
            Phase::Measuring
        } else {
            Phase::Warmup
        };
        Collector::new(warmup, Arc::new(Control::new(phase)))
    }

    mod warmup {
        use super::*;

        #[test]
        fn samples_before_threshold_are_kept_until_latch() {
            let c = collector(5);
            for _ in 0..4 {
                c.sample(10);
            }
            assert_eq!(c.end_to_end_count(), 4);
            assert!(!c.is_warmed_up());
        }

        #[test]
        fn threshold_sample_resets_everything_once() {
            let c = collector(5);
            let a = c.add_probe("A");
            for _ in 0..4 {
                c.sample(10);
                a.sample(10);
            }
            c.sample(10);
            assert!(c.is_warmed_up());
            assert_eq!(c.end_to_end_count(), 0);
            assert_eq!(a.count(), 0);

            c.sample(20);
            a.sample(20);
            assert_eq!(c.end_to_end_count(), 1);
            assert_eq!(a.count(), 1);
        }

        #[test]
        fn no_reset_after_latch() {
            let c = collector(3);
            for _ in 0..3 {
                c.sample(10);
            }
            for _ in 0..10 {
                c.sample(10);
            }
            assert_eq!(c.end_to_end_count(), 10);
        }

        #[test]
        fn zero_warmup_records_everything() {
            let c = collector(0);
            c.sample(1);
            c.sample(2);
            assert!(c.is_warmed_up());
            assert_eq!(c.end_to_end_count(), 2);
        }

        #[test]
        fn concurrent_samplers_latch_exactly_once() {
            let c = collector(1_000);
            let handles: Vec<_> = (0..4)
                .map(|_| {
                    let c = c.clone();
                    thread::spawn(move || {
                        for _ in 0..1_000 {
                            c.sample(5);
                        }
                    })
                })
                .collect();
            for h in handles {
                h.join().unwrap();
            }
            assert!(c.is_warmed_up());
            assert_eq!(c.samples_received(), 4_000);
            // Samples that raced the reset may land either side of it, but the
            // threshold sample itself is always dropped.
            assert!(c.end_to_end_count() <= 3_000 + 999);
            assert!(c.end_to_end_count() >= 3_000 - 999);
        }
    }

    mod probes {
        use super::*;

        #[test]
        fn first_registration_wins() {
            let c = collector(0);
            let a1 = c.add_probe("A");
            a1.sample(1);
            let a2 = c.add_probe("A");
            assert_eq!(a2.count(), 1);
            assert_eq!(c.probes().len(), 1);
        }

        #[test]
        fn iteration_is_lexicographic() {
            let c = collector(0);
            for name in ["zeta", "alpha", "mid"] {
                c.add_probe(name);
            }
            let names: Vec<_> = c.probes().into_iter().map(|(n, _)| n).collect();
            assert_eq!(names, vec!["alpha", "mid", "zeta"]);
        }

        #[test]
        fn probe_added_after_warmup_starts_empty() {
            let c = collector(1);
            c.sample(1);
            let late = c.add_probe("late");
            assert_eq!(late.count(), 0);
        }

        #[test]
        fn samplers_work_through_the_trait() {
            let c = collector(0);
            let sinks: Vec<Box<dyn NanoSampler>> =
                vec![Box::new(c.clone()), Box::new(c.add_probe("A"))];
            for s in &sinks {
                s.sample_nanos(7);
            }
            assert_eq!(c.end_to_end_count(), 1);
            assert_eq!(c.add_probe("A").count(), 1);
        }
    }
}
