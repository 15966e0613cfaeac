//! The immutable result a harness publishes once all runs are done.

use std::{collections::BTreeMap, time::Duration};

use serde::Serialize;

/// Percentiles a [`RunResult`] can report.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[allow(non_camel_case_types)]
pub enum Percentile {
    P50,
    P90,
    P99,
    P99_7,
    P99_9,
    P99_97,
    P99_99,
    Worst,
}

/// Percentile-to-latency mapping for one run of one probe.
///
/// Levels the run could not resolve are absent, never zero. `Worst` is always
/// the final element of the run's percentile array.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunResult {
    percentiles: BTreeMap<Percentile, Duration>,
}

impl RunResult {
    /// Build from a nanosecond percentile array laid out as
    /// [`crate::histogram::percentile_levels`] produces it.
    pub fn from_percentiles(values: &[f64]) -> Self {
        let duration_at = |i: usize| values.get(i).map(|v| Duration::from_nanos(*v as u64));
        let mut percentiles = BTreeMap::new();
        let mut put = |p, i| {
            if let Some(d) = duration_at(i) {
                percentiles.insert(p, d);
            }
        };
        put(Percentile::P50, 0);
        put(Percentile::P90, 1);
        put(Percentile::P99, 2);
        // Tail entries only count when the worst value follows them.
        let tail = [
            Percentile::P99_7,
            Percentile::P99_9,
            Percentile::P99_97,
            Percentile::P99_99,
        ];
        for (offset, p) in tail.into_iter().enumerate() {
            let index = 3 + offset;
            if values.len() > index + 1 {
                put(p, index);
            }
        }
        if let Some(last) = values.len().checked_sub(1) {
            put(Percentile::Worst, last);
        }
        Self { percentiles }
    }

    pub fn percentiles(&self) -> &BTreeMap<Percentile, Duration> {
        &self.percentiles
    }

    pub fn get(&self, percentile: Percentile) -> Option<Duration> {
        self.percentiles.get(&percentile).copied()
    }

    pub fn p50(&self) -> Option<Duration> {
        self.get(Percentile::P50)
    }

    pub fn p90(&self) -> Option<Duration> {
        self.get(Percentile::P90)
    }

    pub fn p99(&self) -> Option<Duration> {
        self.get(Percentile::P99)
    }

    pub fn p99_9(&self) -> Option<Duration> {
        self.get(Percentile::P99_9)
    }

    pub fn p99_99(&self) -> Option<Duration> {
        self.get(Percentile::P99_99)
    }

    pub fn worst(&self) -> Option<Duration> {
        self.get(Percentile::Worst)
    }
}

/// Every completed run of one probe.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeResult {
    percentile_runs: Vec<Vec<f64>>,
    runs: Vec<RunResult>,
}

impl ProbeResult {
    pub fn new(percentile_runs: Vec<Vec<f64>>) -> Self {
        let runs = percentile_runs
            .iter()
            .map(|values| RunResult::from_percentiles(values))
            .collect();
        Self {
            percentile_runs,
            runs,
        }
    }

    pub fn summary_of_last_run(&self) -> Option<&RunResult> {
        self.runs.last()
    }

    pub fn each_run_summary(&self) -> &[RunResult] {
        &self.runs
    }

    /// Raw nanosecond percentile arrays, one per run.
    pub fn percentile_runs(&self) -> &[Vec<f64>] {
        &self.percentile_runs
    }
}

/// What a benchmark produced: the end-to-end probe, each named probe and, when
/// recorded, OS jitter.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BenchResult {
    end_to_end: ProbeResult,
    probes: BTreeMap<String, ProbeResult>,
    os_jitter: Option<ProbeResult>,
}

impl BenchResult {
    pub(crate) fn new(
        end_to_end: ProbeResult,
        probes: BTreeMap<String, ProbeResult>,
        os_jitter: Option<ProbeResult>,
    ) -> Self {
        Self {
            end_to_end,
            probes,
            os_jitter,
        }
    }

    pub fn end_to_end(&self) -> &ProbeResult {
        &self.end_to_end
    }

    pub fn probe(&self, name: &str) -> Option<&ProbeResult> {
        self.probes.get(name)
    }

    /// Probe names in lexicographic order.
    pub fn probe_names(&self) -> impl Iterator<Item = &str> {
        self.probes.keys().map(String::as_str)
    }

    pub fn probes(&self) -> &BTreeMap<String, ProbeResult> {
        &self.probes
    }

    pub fn os_jitter(&self) -> Option<&ProbeResult> {
        self.os_jitter.as_ref()
    }

    /// Completed runs, as seen by the end-to-end probe.
    pub fn run_count(&self) -> usize {
        self.end_to_end.runs.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nanos(n: u64) -> Option<Duration> {
        Some(Duration::from_nanos(n))
    }

    mod run_result {
        use super::*;

        #[test]
        fn four_levels() {
            let r = RunResult::from_percentiles(&[10.0, 20.0, 30.0, 40.0]);
            assert_eq!(r.percentiles().len(), 4);
            assert_eq!(r.p50(), nanos(10));
            assert_eq!(r.p99(), nanos(30));
            assert_eq!(r.p99_9(), None);
            assert_eq!(r.worst(), nanos(40));
        }

        #[test]
        fn tail_levels_need_a_worst_after_them() {
            let r = RunResult::from_percentiles(&[1.0, 2.0, 3.0, 4.0, 5.0]);
            assert_eq!(r.percentiles().len(), 5);
            assert_eq!(r.get(Percentile::P99_7), nanos(4));
            assert_eq!(r.worst(), nanos(5));

            let r = RunResult::from_percentiles(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0]);
            assert_eq!(r.p99_99(), nanos(7));
            assert_eq!(r.worst(), nanos(8));
        }

        #[test]
        fn worst_is_always_the_last_element() {
            for len in 1..=10 {
                let values: Vec<f64> = (0..len).map(|v| v as f64).collect();
                let r = RunResult::from_percentiles(&values);
                assert_eq!(r.worst(), nanos(len as u64 - 1));
            }
        }

        #[test]
        fn fractional_nanos_truncate() {
            let r = RunResult::from_percentiles(&[1.9, 2.0, 3.0, 4.7]);
            assert_eq!(r.p50(), nanos(1));
            assert_eq!(r.worst(), nanos(4));
        }
    }

    mod bench_result {
        use super::*;

        fn sample() -> BenchResult {
            let mut probes = BTreeMap::new();
            probes.insert("B".to_string(), ProbeResult::new(vec![vec![1.0; 4]]));
            probes.insert("A".to_string(), ProbeResult::new(vec![vec![2.0; 4]]));
            BenchResult::new(
                ProbeResult::new(vec![vec![3.0; 4], vec![4.0; 4]]),
                probes,
                None,
            )
        }

        #[test]
        fn lookups() {
            let r = sample();
            assert!(r.probe("A").is_some());
            assert!(r.probe("C").is_none());
            assert!(r.os_jitter().is_none());
            assert_eq!(r.probe_names().collect::<Vec<_>>(), vec!["A", "B"]);
            assert_eq!(r.run_count(), 2);
        }

        #[test]
        fn last_run_is_the_final_entry() {
            let r = sample();
            let e2e = r.end_to_end();
            assert_eq!(e2e.each_run_summary().len(), 2);
            assert_eq!(e2e.summary_of_last_run(), e2e.each_run_summary().last());
            assert_ne!(e2e.each_run_summary()[0], e2e.each_run_summary()[1]);
        }

        #[test]
        fn serializes_to_json() {
            let json = serde_json::to_value(sample()).unwrap();
            assert!(json["probes"]["A"]["runs"].is_array());
        }
    }
}
