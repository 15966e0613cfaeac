//! Text rendering of runs and summaries, and reports built from a finished
//! [`BenchResult`].
//!
//! A [`Report`] is a pure transform of a result into some shape worth keeping; a
//! [`Reporter`] sends a report somewhere. Both are open for extension: the
//! built-ins cover a JSON summary and CI build statistics.

use std::{collections::BTreeMap, fmt::Debug};

use serde::Serialize;
use tokio::io::AsyncWriteExt;

use crate::{
    error::Error,
    histogram::percentile_levels,
    result::BenchResult,
    sink::OutputSink,
    summary::{PercentileSummary, decimal, level_label},
};

/// Width banners are padded to.
const BANNER_WIDTH: usize = 100;
/// Width of the `name (count)` column of a probe line.
const PROBE_COLUMN: usize = 48;
const LABEL_WIDTH: usize = 9;

/// Probe name used for the end-to-end figures in machine-readable reports.
pub const END_TO_END: &str = "end-to-end";

pub(crate) fn pad_until(text: &str, width: usize, fill: char) -> String {
    let mut padded = text.to_string();
    while padded.chars().count() < width {
        padded.push(fill);
    }
    padded
}

/// `1234567` as `1,234,567`.
pub fn with_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

fn micros(nanos: f64) -> String {
    let us = nanos / 1e3;
    if us < 1.0 {
        format!("{us:.3}")
    } else {
        format!("{us:.2}")
    }
}

/// One-line rendering of a nanosecond percentile array in microseconds, e.g.
/// `50/90/99 - worst was 8.08 / 11.68 / 12.45 - 12.58`.
pub fn micros_format(percentiles: &[f64]) -> String {
    let Some((worst, rest)) = percentiles.split_last() else {
        return "no samples".to_string();
    };
    // The array of a histogram with n samples follows the levels for n, so the
    // labels are the leading levels of the longest table.
    let labels: Vec<String> = percentile_levels(u64::MAX)
        .into_iter()
        .take(rest.len())
        .map(|level| format!("{}", (level * 1e6).round() / 1e4))
        .collect();
    let values: Vec<String> = rest.iter().map(|v| micros(*v)).collect();
    format!(
        "{} - worst was {} - {}",
        labels.join("/"),
        values.join(" / "),
        micros(*worst)
    )
}

pub(crate) fn run_banner(run: u32) -> String {
    pad_until(
        &format!("-------------------------------- BENCHMARK RESULTS (RUN {run}) us ----"),
        BANNER_WIDTH,
        '-',
    )
}

pub(crate) fn closing_rule() -> String {
    pad_until("----", BANNER_WIDTH, '-')
}

pub(crate) fn probe_line(name: &str, count: u64, percentiles: &[f64]) -> String {
    let column = format!("{name} ({})", with_thousands(count));
    format!(
        "{column:<width$}{}",
        micros_format(percentiles),
        width = PROBE_COLUMN
    )
}

/// Cross-run table for one probe, header and closing rule included.
pub fn summary_table(label: &str, runs: &[Vec<f64>], levels: &[f64], skip_first: bool) -> String {
    let mut out = pad_until(
        &format!("-------------------------------- SUMMARY ({label}) us ----"),
        BANNER_WIDTH,
        '-',
    );
    out.push('\n');
    out.push_str("Percentile");
    for run in 1..=runs.len() {
        if run == 1 {
            out.push_str(&format!("   run{run}"));
        } else {
            out.push_str(&format!("         run{run}"));
        }
    }
    out.push_str("      % Variation\n");

    for row in PercentileSummary::new(skip_first, runs, levels).rows() {
        let label = format!("{}:", level_label(row.level));
        out.push_str(&format!("{label:<LABEL_WIDTH$}"));
        for value in &row.values {
            match value {
                Some(v) => out.push_str(&format!("{v:12.2} ")),
                None => out.push_str(&format!("{:>12} ", "-")),
            }
        }
        out.push_str(&format!("{:12.2}\n", row.variance));
    }
    out.push_str(&closing_rule());
    out.push('\n');
    out
}

/// A shape a [`BenchResult`] can be turned into.
pub trait Report
where
    Self: Send + Sync + Debug + Serialize,
{
    /// Text form handed to reporters.
    fn render(&self) -> Result<String, Error>;
}

/// Sends a [`Report`] somewhere.
pub trait Reporter<R: Report> {
    fn report(&self, report: &R) -> impl Future<Output = Result<(), Error>> + Send;
}

/// Benchmark name, percentile levels and the last run's percentile array for
/// every probe.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonSummary {
    pub benchmark_name: String,
    pub percentiles: Vec<f64>,
    pub percentile_runs: BTreeMap<String, Vec<f64>>,
}

impl JsonSummary {
    /// `iterations` selects the percentile levels listed, as for the summary
    /// tables.
    pub fn new(benchmark_name: impl Into<String>, result: &BenchResult, iterations: u64) -> Self {
        let mut percentile_runs = BTreeMap::new();
        let probes = std::iter::once((END_TO_END, result.end_to_end()))
            .chain(result.probes().iter().map(|(n, p)| (n.as_str(), p)));
        for (name, probe) in probes {
            match probe.percentile_runs().last() {
                Some(last) => {
                    percentile_runs.insert(name.to_string(), last.clone());
                }
                None => tracing::warn!("No percentile runs for {name}, skipping"),
            }
        }
        Self {
            benchmark_name: benchmark_name.into(),
            percentiles: percentile_levels(iterations),
            percentile_runs,
        }
    }
}

impl Report for JsonSummary {
    fn render(&self) -> Result<String, Error> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BuildStatistic {
    pub key: String,
    /// Microseconds.
    pub value: f64,
}

/// Last-run percentiles of every probe as TeamCity build statistics.
#[derive(Debug, Clone, Serialize)]
pub struct CiStatistics {
    pub statistics: Vec<BuildStatistic>,
}

impl CiStatistics {
    /// Keys are `<prefix>.<probe>.<level>`, with the end-to-end probe named
    /// [`END_TO_END`].
    pub fn new(prefix: &str, result: &BenchResult, iterations: u64) -> Self {
        let levels = percentile_levels(iterations);
        let probes = std::iter::once((END_TO_END, result.end_to_end()))
            .chain(result.probes().iter().map(|(n, p)| (n.as_str(), p)));
        let mut statistics = Vec::new();
        for (name, probe) in probes {
            let Some(last) = probe.percentile_runs().last() else {
                continue;
            };
            let runs = std::slice::from_ref(last);
            for row in PercentileSummary::new(false, runs, &levels).rows() {
                if let Some(value) = row.values[0] {
                    statistics.push(BuildStatistic {
                        key: format!("{prefix}.{name}.{}", decimal(row.level)),
                        value,
                    });
                }
            }
        }
        Self { statistics }
    }
}

impl Report for CiStatistics {
    fn render(&self) -> Result<String, Error> {
        Ok(self
            .statistics
            .iter()
            .map(|s| {
                format!(
                    "##teamcity[buildStatisticValue key='{}' value='{}']\n",
                    s.key,
                    decimal(s.value)
                )
            })
            .collect())
    }
}

pub struct StdoutReporter;

impl<R: Report> Reporter<R> for StdoutReporter {
    async fn report(&self, report: &R) -> Result<(), Error> {
        let text = report.render()?;
        let mut stdout = tokio::io::stdout();
        stdout.write_all(text.as_bytes()).await?;
        stdout.flush().await?;
        Ok(())
    }
}

/// Writes reports to an [`OutputSink`], e.g. the one a harness printed to.
pub struct SinkReporter(pub OutputSink);

impl<R: Report> Reporter<R> for SinkReporter {
    async fn report(&self, report: &R) -> Result<(), Error> {
        let text = report.render()?;
        self.0.write_str(&text);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        result::ProbeResult,
        sink::{OutputSink, SharedBuffer},
    };

    fn result() -> BenchResult {
        let mut probes = BTreeMap::new();
        probes.insert(
            "B".to_string(),
            ProbeResult::new(vec![vec![100.0; 4], vec![100.0; 4]]),
        );
        BenchResult::new(
            ProbeResult::new(vec![
                vec![1_000.0, 2_000.0, 3_000.0, 4_000.0],
                vec![2_000.0, 3_000.0, 4_000.0, 5_000.0],
            ]),
            probes,
            None,
        )
    }

    mod formatting {
        use super::*;

        #[test]
        fn thousands() {
            assert_eq!(with_thousands(0), "0");
            assert_eq!(with_thousands(999), "999");
            assert_eq!(with_thousands(9_000), "9,000");
            assert_eq!(with_thousands(1_234_567), "1,234,567");
        }

        #[test]
        fn banners_are_padded() {
            let banner = run_banner(2);
            assert_eq!(banner.len(), 100);
            assert!(banner.starts_with("-------------------------------- BENCHMARK RESULTS (RUN 2) us ----"));
            assert_eq!(closing_rule(), "-".repeat(100));
        }

        #[test]
        fn micros_line() {
            assert_eq!(
                micros_format(&[8_080.0, 11_680.0, 12_450.0, 12_580.0]),
                "50/90/99 - worst was 8.08 / 11.68 / 12.45 - 12.58"
            );
            assert_eq!(
                micros_format(&[100.0; 4]),
                "50/90/99 - worst was 0.100 / 0.100 / 0.100 - 0.100"
            );
            assert_eq!(micros_format(&[]), "no samples");
        }

        #[test]
        fn probe_line_aligns_values() {
            let line = probe_line("End to End:", 9_000, &[1_000.0; 4]);
            assert!(line.starts_with("End to End: (9,000)   "));
            assert_eq!(&line[48..50], "50");
        }
    }

    mod summary {
        use super::*;

        #[test]
        fn table_layout() {
            let runs = vec![vec![2_000.0; 4], vec![3_000.0; 4], vec![3_000.0; 4]];
            let table = summary_table("end to end", &runs, &[0.5, 0.9, 0.99, 1.0], false);
            let lines: Vec<_> = table.lines().collect();
            assert!(lines[0].starts_with("-------------------------------- SUMMARY (end to end) us ----"));
            assert_eq!(
                lines[1],
                "Percentile   run1         run2         run3      % Variation"
            );
            assert_eq!(
                lines[2],
                "50.0:            2.00         3.00         3.00        25.00"
            );
            assert!(lines[5].starts_with("worst:   "));
            assert_eq!(lines.len(), 7);
        }

        #[test]
        fn absent_cells_render_as_dash() {
            let runs = vec![vec![2_000.0; 2], vec![3_000.0; 3]];
            let table = summary_table("A", &runs, &[0.5, 0.9, 0.97, 1.0], false);
            let row = table.lines().find(|l| l.starts_with("90:")).unwrap();
            assert_eq!(row, "90:                 -         3.00         0.00");
        }
    }

    mod reports {
        use super::*;

        #[test]
        fn json_summary_takes_the_last_run() {
            let json = JsonSummary::new("bench \"one\"", &result(), 9_000)
                .render()
                .unwrap();
            let value: serde_json::Value = serde_json::from_str(&json).unwrap();
            assert_eq!(value["benchmarkName"], "bench \"one\"");
            assert_eq!(value["percentiles"].as_array().unwrap().len(), 4);
            assert_eq!(value["percentileRuns"]["end-to-end"][0], 2_000.0);
            assert_eq!(value["percentileRuns"]["B"][3], 100.0);
        }

        #[test]
        fn ci_statistics_lines() {
            let text = CiStatistics::new("bench", &result(), 9_000).render().unwrap();
            let lines: Vec<_> = text.lines().collect();
            assert_eq!(lines.len(), 8);
            assert_eq!(
                lines[0],
                "##teamcity[buildStatisticValue key='bench.end-to-end.0.5' value='2.0']"
            );
            assert_eq!(
                lines[3],
                "##teamcity[buildStatisticValue key='bench.end-to-end.1.0' value='5.0']"
            );
            assert_eq!(
                lines[7],
                "##teamcity[buildStatisticValue key='bench.B.1.0' value='0.1']"
            );
        }

        #[tokio::test]
        async fn sink_reporter_writes_rendered_text() {
            let buffer = SharedBuffer::new();
            let reporter = SinkReporter(OutputSink::new(buffer.clone()));
            reporter
                .report(&CiStatistics::new("x", &result(), 9_000))
                .await
                .unwrap();
            assert!(buffer.contents().starts_with("##teamcity[buildStatisticValue key='x.end-to-end.0.5'"));
        }
    }
}
