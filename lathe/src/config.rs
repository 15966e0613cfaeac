use std::{fmt, time::Duration};

use serde::{Deserialize, Serialize};
use typed_builder::TypedBuilder;

use crate::{distributor::LatencyDistributor, error::Error, histogram::percentile_levels};

/// Benchmark options.
///
/// Every field has a default, so `Config::builder().build()` is a usable
/// configuration and a JSON document only needs the fields it overrides.
///
/// ```rust
/// use lathe::{Config, Throughput, TimeUnit};
///
/// let config = Config::builder()
///     .iterations(50_000)
///     .warmup_iterations(5_000)
///     .throughput(Throughput::new(100_000, TimeUnit::Seconds))
///     .build();
/// assert_eq!(config.gap_ns(), 10_000);
/// ```
#[derive(Debug, Clone, TypedBuilder, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Invocations per run.
    #[builder(default = 100_000)]
    pub iterations: u64,
    /// End-to-end samples to discard before measuring.
    #[builder(default = 10_000)]
    pub warmup_iterations: u64,
    #[builder(default = 3)]
    pub runs: u32,
    #[builder(default)]
    pub throughput: Throughput,
    #[builder(default)]
    pub latency_distributor: LatencyDistributor,
    /// Schedule against an ideal timeline and hand the task its ideal start
    /// time, rather than pacing from "now".
    #[builder(default = true)]
    pub account_for_coordinated_omission: bool,
    #[builder(default = true)]
    pub record_os_jitter: bool,
    /// Scheduling gaps at or below this are not recorded as jitter.
    #[builder(default = 1_000)]
    pub jitter_threshold_ns: u64,
    #[builder(default = false)]
    pub jitter_affinity: bool,
    #[builder(default = Duration::ZERO)]
    pub pause_after_warmup: Duration,
    /// Abort when no sample has arrived for this long.
    #[builder(default, setter(strip_option))]
    pub sample_timeout: Option<Duration>,
    #[builder(default)]
    pub skip_first_run: SkipFirstRun,
}

impl Default for Config {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Config {
    /// Nominal nanoseconds between invocations.
    pub fn gap_ns(&self) -> u64 {
        self.throughput.gap_ns()
    }

    /// Percentile levels the summary tables use.
    pub fn summary_levels(&self) -> Vec<f64> {
        percentile_levels(self.iterations)
    }

    /// Whether the first run is left out of variance figures.
    pub fn skips_first_run(&self) -> bool {
        self.skip_first_run.resolve(self.summary_levels().len())
    }

    pub(crate) fn validate(&self) -> Result<(), Error> {
        if self.iterations == 0 {
            return Err(Error::InvalidConfig("iterations must be positive".into()));
        }
        if self.runs == 0 {
            return Err(Error::InvalidConfig("runs must be positive".into()));
        }
        if self.throughput.rate == 0 {
            return Err(Error::InvalidConfig("throughput must be positive".into()));
        }
        if self.gap_ns() == 0 {
            return Err(Error::InvalidConfig(format!(
                "throughput {} is above one invocation per nanosecond",
                self.throughput
            )));
        }
        Ok(())
    }
}

/// Target invocation rate: `rate` invocations per one `unit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Throughput {
    pub rate: u64,
    pub unit: TimeUnit,
}

impl Throughput {
    pub fn new(rate: u64, unit: TimeUnit) -> Self {
        Self { rate, unit }
    }

    pub fn per_second(rate: u64) -> Self {
        Self::new(rate, TimeUnit::Seconds)
    }

    pub fn gap_ns(&self) -> u64 {
        self.unit.to_nanos(1).checked_div(self.rate).unwrap_or(0)
    }
}

impl Default for Throughput {
    fn default() -> Self {
        Self::per_second(10_000)
    }
}

impl fmt::Display for Throughput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.rate, self.unit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TimeUnit {
    Nanoseconds,
    Microseconds,
    Milliseconds,
    Seconds,
    Minutes,
    Hours,
    Days,
}

impl TimeUnit {
    pub fn to_nanos(&self, amount: u64) -> u64 {
        let scale: u64 = match self {
            Self::Nanoseconds => 1,
            Self::Microseconds => 1_000,
            Self::Milliseconds => 1_000_000,
            Self::Seconds => 1_000_000_000,
            Self::Minutes => 60_000_000_000,
            Self::Hours => 3_600_000_000_000,
            Self::Days => 86_400_000_000_000,
        };
        amount.saturating_mul(scale)
    }

    pub fn short_name(&self) -> &'static str {
        match self {
            Self::Nanoseconds => "ns",
            Self::Microseconds => "us",
            Self::Milliseconds => "ms",
            Self::Seconds => "s",
            Self::Minutes => "min",
            Self::Hours => "h",
            Self::Days => "day",
        }
    }
}

impl fmt::Display for TimeUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.short_name())
    }
}

/// Whether the first run counts towards the variance column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum SkipFirstRun {
    /// Skip when the summary has more than three percentile levels.
    #[default]
    Auto,
    Skip,
    NoSkip,
}

impl SkipFirstRun {
    pub fn resolve(&self, level_count: usize) -> bool {
        match self {
            Self::Auto => level_count > 3,
            Self::Skip => true,
            Self::NoSkip => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    mod defaults {
        use super::*;

        #[test]
        fn builder_defaults() {
            let c = Config::default();
            assert_eq!(c.iterations, 100_000);
            assert_eq!(c.warmup_iterations, 10_000);
            assert_eq!(c.runs, 3);
            assert_eq!(c.gap_ns(), 100_000);
            assert!(c.account_for_coordinated_omission);
            assert!(c.record_os_jitter);
            assert_eq!(c.jitter_threshold_ns, 1_000);
            assert_eq!(c.sample_timeout, None);
            assert_eq!(c.skip_first_run, SkipFirstRun::Auto);
        }

        #[test]
        fn json_overrides_only_what_it_names() {
            let c: Config = serde_json::from_str(
                r#"{"iterations": 9000, "throughput": {"rate": 1000000, "unit": "Seconds"}}"#,
            )
            .unwrap();
            assert_eq!(c.iterations, 9_000);
            assert_eq!(c.gap_ns(), 1_000);
            assert_eq!(c.runs, 3);
        }
    }

    mod validate {
        use super::*;

        #[test]
        fn rejects_zero_values() {
            for c in [
                Config::builder().iterations(0).build(),
                Config::builder().runs(0).build(),
                Config::builder()
                    .throughput(Throughput::per_second(0))
                    .build(),
            ] {
                assert!(matches!(c.validate(), Err(Error::InvalidConfig(_))));
            }
        }

        #[test]
        fn rejects_sub_nanosecond_gap() {
            let c = Config::builder()
                .throughput(Throughput::new(2, TimeUnit::Nanoseconds))
                .build();
            assert!(matches!(c.validate(), Err(Error::InvalidConfig(_))));
        }

        #[test]
        fn accepts_defaults() {
            assert!(Config::default().validate().is_ok());
        }
    }

    mod time_unit {
        use super::*;

        #[test]
        fn conversions() {
            assert_eq!(TimeUnit::Microseconds.to_nanos(3), 3_000);
            assert_eq!(TimeUnit::Minutes.to_nanos(1), 60_000_000_000);
            assert_eq!(TimeUnit::Days.to_nanos(u64::MAX), u64::MAX);
        }

        #[test]
        fn short_names() {
            assert_eq!(Throughput::per_second(1_000_000).to_string(), "1000000/s");
            assert_eq!(TimeUnit::Days.to_string(), "day");
        }
    }

    #[test]
    fn skip_first_run_resolution() {
        assert!(SkipFirstRun::Auto.resolve(4));
        assert!(!SkipFirstRun::Auto.resolve(3));
        assert!(SkipFirstRun::Skip.resolve(1));
        assert!(!SkipFirstRun::NoSkip.resolve(10));
    }
}
