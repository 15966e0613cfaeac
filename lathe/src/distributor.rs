//! Latency distributors turn the average gap between invocations into the actual
//! gap used for the next one, so a benchmark can be paced non-uniformly while
//! keeping the same target throughput.

use std::fmt;

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Smallest gap the random distributors will produce.
const MIN_GAP_NS: u64 = 1_000;

#[derive(Clone, Copy, Default, Serialize, Deserialize)]
pub enum LatencyDistributor {
    /// Every gap equals the average.
    #[default]
    Identity,
    /// Uniform in `[1000ns, 2 * average - 1000ns)`.
    UniformRandom,
    /// `1000 + 4 * (average - 1000) * f^3` for uniform `f` in `[0, 1)`: mostly short
    /// gaps with the occasional long one, same mean.
    CubicSkewed,
    /// A caller-supplied mapping from average gap to actual gap.
    #[serde(skip)]
    Custom(fn(u64) -> u64),
}

impl LatencyDistributor {
    pub fn apply(&self, average_ns: u64) -> u64 {
        match self {
            Self::Identity => average_ns,
            Self::UniformRandom => {
                let upper = (2 * average_ns).saturating_sub(MIN_GAP_NS);
                if upper <= MIN_GAP_NS {
                    return average_ns;
                }
                rand::rng().random_range(MIN_GAP_NS..upper)
            }
            Self::CubicSkewed => {
                if average_ns <= MIN_GAP_NS {
                    return average_ns;
                }
                let f: f64 = rand::rng().random();
                (MIN_GAP_NS as f64 + 4.0 * (average_ns - MIN_GAP_NS) as f64 * f * f * f) as u64
            }
            Self::Custom(f) => f(average_ns),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Identity => "NORMAL",
            Self::UniformRandom => "RANDOM",
            Self::CubicSkewed => "RANDOM2",
            Self::Custom(_) => "CUSTOM",
        }
    }
}

impl fmt::Debug for LatencyDistributor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl fmt::Display for LatencyDistributor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
