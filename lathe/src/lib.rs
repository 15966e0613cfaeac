//! Lathe: a latency benchmark harness that paces a task at a fixed throughput.
//!
//! Lathe calls your [`Task`] at precisely spaced target times, collects the
//! latencies the task reports into HDR histograms, and prints per-run percentile
//! blocks followed by a cross-run summary with a variation figure per percentile.
//! It is built for measuring message-passing and request/response paths where the
//! response may complete on a different thread than the one that issued it.
//!
//! # Architecture
//!
//! - [`Task`]: the code under test. It receives the time at which it *should*
//!   have started and reports latencies through the [`Collector`].
//! - [`Collector`] and [`Probe`]: the end-to-end histogram plus any number of
//!   named intermediate probes. Both can be sampled from any thread.
//! - [`Harness`]: owns the run lifecycle (warmup, paced runs, draining, summaries)
//!   and publishes a [`BenchResult`].
//! - [`pacer`]: the timing loop. It either owns a thread ([`Harness::start`]) or
//!   runs as step handlers on a cooperative loop ([`Harness::into_event_handlers`]).
//! - [`Report`] / [`Reporter`]: turn a [`BenchResult`] into JSON or CI statistics
//!   and send it somewhere.
//!
//! # Coordinated omission
//!
//! If the system under test stalls, a naive load generator stalls with it and the
//! requests it *would* have sent during the stall are never measured. With
//! correction enabled (the default), invocation times follow an ideal timeline
//! that never resets to "now", and each task is handed its ideal start time, so
//! a stall shows up as latency on every invocation it delayed.
//!
//! # Example
//!
//! ```rust
//! use lathe::{Collector, Config, Harness, Task, Throughput, nano_time};
//!
//! struct Noop {
//!     collector: Option<Collector>,
//! }
//!
//! impl Task for Noop {
//!     fn init(&mut self, collector: &Collector) {
//!         self.collector = Some(collector.clone());
//!     }
//!
//!     fn run(&mut self, start_time_ns: u64) {
//!         // The work being measured goes here.
//!         if let Some(c) = &self.collector {
//!             c.sample(nano_time().saturating_sub(start_time_ns));
//!         }
//!     }
//! }
//!
//! let config = Config::builder()
//!     .iterations(5_000)
//!     .warmup_iterations(500)
//!     .runs(3)
//!     .throughput(Throughput::per_second(50_000))
//!     .build();
//!
//! let result = Harness::builder(config)
//!     .task(Noop { collector: None })
//!     .sink(std::io::sink())
//!     .build()
//!     .unwrap()
//!     .start()
//!     .unwrap();
//!
//! let last = result.end_to_end().summary_of_last_run().unwrap();
//! assert!(last.p50().is_some());
//! ```
//!
//! # Feature flags
//!
//! - `internals`: exposes the pacer's `Schedule` for custom drivers.
//!
//! # Where to start
//!
//! - Read the docs for [`Task`], [`Config`] and [`Harness`].
//! - See `examples/handoff.rs` for a task that completes on a worker thread.

pub mod clock;
/// End-to-end and probe sampling
pub mod collector;
pub mod config;
mod control;
/// Inter-invocation gap distributions
pub mod distributor;
mod error;
/// Cooperative event loop contract
pub mod event_loop;
mod harness;
pub mod histogram;
mod jitter;
/// Timing loops
pub mod pacer;
/// Reports and Reporters
pub mod report;
/// Published results
pub mod result;
mod sink;
/// Cross-run aggregation
pub mod summary;
mod task;
mod watchdog;

pub use clock::nano_time;
pub use collector::{Collector, NanoSampler, Probe};
pub use config::{Config, SkipFirstRun, Throughput, TimeUnit};
pub use control::{AbortHandle, Phase};
pub use distributor::LatencyDistributor;
pub use error::Error;
pub use event_loop::{Action, EventHandler, drive_handlers};
pub use harness::{Harness, HarnessBuilder, ResultConsumer};
pub use histogram::{Histogram, LatencyHistogram};
pub use report::{Report, Reporter};
pub use result::{BenchResult, Percentile, ProbeResult, RunResult};
pub use sink::{OutputSink, SharedBuffer};
pub use task::Task;
