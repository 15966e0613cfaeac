use std::fmt::Debug;

/// Percentile levels beyond the 99th, each paired with the minimum sample count
/// needed before it is reported. A level is only resolvable when at least 50
/// samples sit above it, i.e. `count >= 50 / (1 - level)`.
const TAIL_LEVELS: [(f64, u64); 8] = [
    (0.997, 16_667),
    (0.999, 50_000),
    (0.9997, 166_667),
    (0.9999, 500_000),
    (0.99997, 1_666_667),
    (0.99999, 5_000_000),
    (0.999997, 16_666_667),
    (0.999999, 50_000_000),
];

/// The level that always closes a percentile array: the worst sample.
pub const WORST: f64 = 1.0;

/// Ordered percentile levels worth reporting for `count` samples.
///
/// Always contains 0.5, 0.9 and 0.99, then as many tail levels as the sample
/// count can support, and finally [`WORST`].
pub fn percentile_levels(count: u64) -> Vec<f64> {
    let mut levels = vec![0.5, 0.9, 0.99];
    levels.extend(
        TAIL_LEVELS
            .iter()
            .take_while(|(_, min_count)| count >= *min_count)
            .map(|(level, _)| *level),
    );
    levels.push(WORST);
    levels
}

/// The `Histogram` trait describes the fixed-bucket latency store the harness
/// records into.
///
/// Every probe, the end-to-end measurement and the OS jitter monitor each own one
/// histogram. The harness never looks inside: it records nanosecond samples,
/// asks for the total count while draining a run, turns the histogram into a
/// percentile array at run end and resets it for the next run.
///
/// # Role
///
/// - Record individual samples cheaply; this sits on the measured hot path.
/// - Produce a percentile array whose levels follow [`percentile_levels`] for the
///   histogram's own sample count, so a sparsely sampled probe yields a shorter
///   array than the end-to-end probe of the same run.
/// - Be mergeable, so a thread can record privately and publish in batches.
///
/// # Implementor notes
///
/// - The last element of [`Histogram::percentiles`] must always be the worst
///   sample, whatever the length of the array.
/// - `merge` must be associative and commutative.
/// - An empty histogram still yields a full-length array (of zeros) for a count
///   of zero.
pub trait Histogram
where
    Self: Send + Debug + 'static,
{
    /// Create a new, empty histogram.
    fn new() -> Self;

    /// Record one sample, in nanoseconds.
    fn sample(&mut self, nanos: u64);

    /// Number of samples recorded since creation or the last reset.
    fn total_count(&self) -> u64;

    /// Values (nanoseconds) at each of [`percentile_levels`]`(self.total_count())`.
    fn percentiles(&self) -> Vec<f64>;

    /// Forget all recorded samples.
    fn reset(&mut self);

    /// Fold another histogram's counts into this one.
    fn merge(&mut self, other: &Self);
}

pub use builtins::*;

mod builtins {
    use super::*;

    /// Significant figures kept by the built-in histogram. Values below 2048 ns
    /// are recorded exactly.
    const SIGNIFICANT_FIGURES: u8 = 3;

    /// The default [`Histogram`], backed by an auto-resizing HDR histogram.
    #[derive(Debug, Clone)]
    pub struct LatencyHistogram {
        inner: hdrhistogram::Histogram<u64>,
    }

    impl Histogram for LatencyHistogram {
        fn new() -> Self {
            Self {
                inner: hdrhistogram::Histogram::new(SIGNIFICANT_FIGURES)
                    .expect("3 significant figures is within hdrhistogram limits"),
            }
        }

        #[inline]
        fn sample(&mut self, nanos: u64) {
            self.inner.saturating_record(nanos);
        }

        fn total_count(&self) -> u64 {
            self.inner.len()
        }

        fn percentiles(&self) -> Vec<f64> {
            percentile_levels(self.inner.len())
                .into_iter()
                .map(|level| {
                    if level >= WORST {
                        self.inner.max() as f64
                    } else {
                        self.inner.value_at_quantile(level) as f64
                    }
                })
                .collect()
        }

        fn reset(&mut self) {
            self.inner.reset();
        }

        fn merge(&mut self, other: &Self) {
            if let Err(e) = self.inner.add(&other.inner) {
                tracing::warn!("Dropping samples that could not be merged: {e}");
            }
        }
    }
}
