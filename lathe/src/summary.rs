//! Cross-run percentile aggregation.
//!
//! Runs can resolve different numbers of percentile levels: a run (or a probe)
//! with fewer samples produces a shorter percentile array. The summary lines the
//! arrays up against a common list of levels, leaves the cells a run could not
//! resolve empty, and computes a spread figure per level.

use crate::histogram::WORST;

/// Values are reported in microseconds; percentile arrays hold nanoseconds.
const NANOS_PER_MICRO: f64 = 1e3;

/// One rendered row: a level, a cell per run and the spread across runs.
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryRow {
    pub level: f64,
    /// Microseconds, `None` where the run's array did not reach this level.
    pub values: Vec<Option<f64>>,
    /// Percentage spread; see [`PercentileSummary::variance`].
    pub variance: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct PercentileSummary<'a> {
    skip_first: bool,
    runs: &'a [Vec<f64>],
    levels: &'a [f64],
}

impl<'a> PercentileSummary<'a> {
    /// `levels` must end with the worst level; `runs` holds one nanosecond
    /// percentile array per run. With `skip_first` the first run still gets a
    /// column but does not count towards the variance.
    pub fn new(skip_first: bool, runs: &'a [Vec<f64>], levels: &'a [f64]) -> Self {
        Self {
            skip_first,
            runs,
            levels,
        }
    }

    /// The cell for `level` in `run`, in microseconds.
    ///
    /// The last level always reads the last element of the run's array. Any other
    /// level needs an element at its index that is not the array's final (worst)
    /// slot.
    pub fn cell(&self, level: usize, run: usize) -> Option<f64> {
        let values = self.runs.get(run)?;
        let last = values.len().checked_sub(1)?;
        if level + 1 == self.levels.len() {
            return Some(values[last] / NANOS_PER_MICRO);
        }
        if last <= level {
            return None;
        }
        Some(values[level] / NANOS_PER_MICRO)
    }

    /// `100 * (max - min) / (max + min / 2)` over the present cells of a level.
    ///
    /// Returns 0 when no cell contributes.
    pub fn variance(&self, level: usize) -> f64 {
        let (min, max) = (0..self.runs.len())
            .filter(|&run| !(self.skip_first && run == 0))
            .filter_map(|run| self.cell(level, run))
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        let denominator = max + min / 2.0;
        if max < min || denominator == 0.0 {
            return 0.0;
        }
        100.0 * (max - min) / denominator
    }

    /// Rows for every level at least one run has a value for, in level order.
    pub fn rows(&self) -> impl Iterator<Item = SummaryRow> + '_ {
        (0..self.levels.len()).filter_map(move |level| {
            let values: Vec<_> = (0..self.runs.len())
                .map(|run| self.cell(level, run))
                .collect();
            values.iter().any(Option::is_some).then(|| SummaryRow {
                level: self.levels[level],
                values,
                variance: self.variance(level),
            })
        })
    }
}

/// Row label for a level: `50.0`, `99.7`, `worst`.
pub fn level_label(level: f64) -> String {
    if level >= WORST {
        "worst".to_string()
    } else {
        decimal((level * 1e6).round() / 1e4)
    }
}

/// Shortest decimal form that always keeps a fractional digit: `1.0`, `0.5`,
/// `12.56`.
pub fn decimal(value: f64) -> String {
    let text = value.to_string();
    if value.is_finite() && !text.contains('.') {
        format!("{text}.0")
    } else {
        text
    }
}
