use std::{
    collections::BTreeMap,
    io::Write,
    sync::Arc,
    thread,
    time::{Duration, Instant},
};

use parking_lot::Mutex;

use crate::{
    clock,
    collector::Collector,
    config::Config,
    control::{AbortHandle, Control, Phase},
    error::Error,
    event_loop::{EventHandler, drive_handlers},
    histogram::{Histogram, LatencyHistogram},
    jitter::JitterMonitor,
    pacer::{MeasureHandler, WarmupHandler, blocking},
    report::{closing_rule, probe_line, run_banner, summary_table, with_thousands},
    result::{BenchResult, ProbeResult},
    sink::OutputSink,
    task::Task,
    watchdog::Watchdog,
};

/// Receives the result once all runs are done.
pub type ResultConsumer = Box<dyn FnOnce(&BenchResult) + Send>;

/// How often "Complete: n" is printed while waiting for warmup samples.
pub(crate) const WARMUP_REPORT_INTERVAL: Duration = Duration::from_millis(500);

/// Drives one [`Task`] through warmup and a series of measured runs.
///
/// A harness is built once, started once and consumed by starting it. It can be
/// driven two ways:
///
/// - [`Harness::start`] runs everything on the calling thread and returns the
///   result.
/// - [`Harness::into_event_handlers`] (or [`Harness::run_cooperative`]) turns it
///   into non-blocking step handlers for a cooperative event loop.
///
/// # Example
/// ```rust
/// use lathe::{Collector, Config, Harness, Task, Throughput, nano_time};
///
/// struct Spin {
///     collector: Option<Collector>,
/// }
///
/// impl Task for Spin {
///     fn init(&mut self, collector: &Collector) {
///         self.collector = Some(collector.clone());
///     }
///
///     fn run(&mut self, start_time_ns: u64) {
///         if let Some(c) = &self.collector {
///             c.sample(nano_time().saturating_sub(start_time_ns));
///         }
///     }
/// }
///
/// let config = Config::builder()
///     .iterations(1_000)
///     .warmup_iterations(100)
///     .runs(2)
///     .throughput(Throughput::per_second(100_000))
///     .record_os_jitter(false)
///     .build();
/// let result = Harness::builder(config)
///     .task(Spin { collector: None })
///     .sink(std::io::sink())
///     .build()
///     .unwrap()
///     .start()
///     .unwrap();
/// assert_eq!(result.end_to_end().each_run_summary().len(), 2);
/// ```
pub struct Harness<H: Histogram = LatencyHistogram> {
    engine: Engine<H>,
    task: Box<dyn Task<H>>,
}

impl Harness {
    pub fn builder(config: Config) -> HarnessBuilder {
        HarnessBuilder::new(config)
    }
}

impl<H: Histogram> Harness<H> {
    /// A handle that stops the benchmark from any thread.
    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle {
            control: Arc::clone(&self.engine.control),
        }
    }

    pub fn collector(&self) -> &Collector<H> {
        &self.engine.collector
    }

    /// Run warmup and every measured run on the calling thread.
    ///
    /// Returns once all runs are done or the benchmark was aborted; an abort is
    /// not an error and shows up as fewer runs in the result.
    pub fn start(mut self) -> Result<BenchResult, Error> {
        let _pacer = PacerGuard::attach(Arc::clone(&self.engine.control));
        self.engine.start_background(self.task.as_mut())?;
        blocking::run(&mut self.engine, self.task.as_mut());
        Ok(self.engine.end_of_all_runs(self.task.as_mut()))
    }

    /// Split into step handlers for a cooperative event loop.
    ///
    /// The warmup handler issues the warmup invocations and then reports
    /// [`crate::Action::Done`]; the measure handler idles until warmup is
    /// complete, paces the measured runs and reports `Done` after publishing the
    /// result. Needs coordinated-omission correction.
    pub fn into_event_handlers(self) -> Result<(WarmupHandler<H>, MeasureHandler<H>), Error> {
        if !self.engine.config.account_for_coordinated_omission {
            return Err(Error::CoordinatedOmissionRequired);
        }
        let Harness {
            mut engine,
            mut task,
        } = self;
        engine.start_background(task.as_mut())?;
        let warmup_iterations = engine.config.warmup_iterations;
        let control = Arc::clone(&engine.control);
        let task = Arc::new(Mutex::new(task));
        Ok((
            WarmupHandler::new(Arc::clone(&task), warmup_iterations, control),
            MeasureHandler::new(engine, task),
        ))
    }

    /// Drive both handlers on the current tokio task until the benchmark is done.
    pub async fn run_cooperative(mut self) -> Result<BenchResult, Error> {
        let slot = Arc::new(Mutex::new(None));
        let published = Arc::clone(&slot);
        let user = self.engine.consumer.take();
        self.engine.consumer = Some(Box::new(move |result: &BenchResult| {
            *published.lock() = Some(result.clone());
            if let Some(user) = user {
                user(result);
            }
        }));

        let (warmup, measure) = self.into_event_handlers()?;
        let handlers: Vec<Box<dyn EventHandler>> = vec![Box::new(warmup), Box::new(measure)];
        drive_handlers(handlers).await;
        let result = slot.lock().take();
        result.ok_or(Error::NoResult)
    }
}

/// Assembles a [`Harness`]. A task is mandatory.
pub struct HarnessBuilder<H: Histogram = LatencyHistogram> {
    config: Config,
    task: Option<Box<dyn Task<H>>>,
    sink: OutputSink,
    consumer: Option<ResultConsumer>,
}

impl<H: Histogram> HarnessBuilder<H> {
    pub fn new(config: Config) -> Self {
        Self {
            config,
            task: None,
            sink: OutputSink::stdout(),
            consumer: None,
        }
    }

    pub fn task(mut self, task: impl Task<H> + 'static) -> Self {
        self.task = Some(Box::new(task));
        self
    }

    /// Where progress, run results and summaries are written. Defaults to stdout.
    pub fn sink(mut self, writer: impl Write + Send + 'static) -> Self {
        self.sink = OutputSink::new(writer);
        self
    }

    pub fn output(mut self, sink: OutputSink) -> Self {
        self.sink = sink;
        self
    }

    /// Called exactly once with the result, before [`Task::complete`].
    pub fn on_result(mut self, consumer: impl FnOnce(&BenchResult) + Send + 'static) -> Self {
        self.consumer = Some(Box::new(consumer));
        self
    }

    pub fn build(self) -> Result<Harness<H>, Error> {
        let task = self.task.ok_or(Error::MissingTask)?;
        self.config.validate()?;
        let initial = if self.config.warmup_iterations == 0 {
            Phase::Measuring
        } else {
            Phase::Warmup
        };
        let control = Arc::new(Control::new(initial));
        let collector = Collector::new(self.config.warmup_iterations, Arc::clone(&control));
        Ok(Harness {
            engine: Engine::new(self.config, collector, control, self.sink, self.consumer),
            task,
        })
    }
}

/// Registers the current thread as the one an abort wakes, and leaves it clean
/// on the way out whatever happened in between.
struct PacerGuard(Arc<Control>);

impl PacerGuard {
    fn attach(control: Arc<Control>) -> Self {
        control.attach_pacer(thread::current());
        Self(control)
    }
}

impl Drop for PacerGuard {
    fn drop(&mut self) {
        self.0.detach_pacer();
        // Swallow a wakeup that arrived after the last wait.
        thread::park_timeout(Duration::ZERO);
    }
}

/// Run bookkeeping shared by the blocking and cooperative drivers: background
/// threads, per-run snapshots, output and result publication.
pub(crate) struct Engine<H: Histogram> {
    config: Config,
    gap_ns: u64,
    control: Arc<Control>,
    collector: Collector<H>,
    sink: OutputSink,
    consumer: Option<ResultConsumer>,
    jitter: Option<JitterMonitor<H>>,
    watchdog: Option<Watchdog>,
    end_to_end_runs: Vec<Vec<f64>>,
    probe_runs: BTreeMap<String, Vec<Vec<f64>>>,
    jitter_runs: Vec<Vec<f64>>,
}

impl<H: Histogram> Engine<H> {
    fn new(
        config: Config,
        collector: Collector<H>,
        control: Arc<Control>,
        sink: OutputSink,
        consumer: Option<ResultConsumer>,
    ) -> Self {
        Self {
            gap_ns: config.gap_ns(),
            config,
            control,
            collector,
            sink,
            consumer,
            jitter: None,
            watchdog: None,
            end_to_end_runs: Vec::new(),
            probe_runs: BTreeMap::new(),
            jitter_runs: Vec::new(),
        }
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn control(&self) -> &Arc<Control> {
        &self.control
    }

    pub(crate) fn collector(&self) -> &Collector<H> {
        &self.collector
    }

    pub(crate) fn sink(&self) -> &OutputSink {
        &self.sink
    }

    /// Gap before the next invocation, after the latency distributor.
    pub(crate) fn next_gap(&self) -> u64 {
        self.config.latency_distributor.apply(self.gap_ns)
    }

    /// Watchdog, `Task::init` and the jitter monitor, in that order.
    fn start_background(&mut self, task: &mut dyn Task<H>) -> Result<(), Error> {
        if let Some(timeout) = self.config.sample_timeout.filter(|t| !t.is_zero()) {
            self.watchdog = Some(Watchdog::spawn(
                timeout,
                self.collector.clone(),
                Arc::clone(&self.control),
                self.sink.clone(),
            )?);
        }
        task.init(&self.collector);
        if self.config.record_os_jitter {
            self.jitter = Some(JitterMonitor::spawn(
                self.config.jitter_threshold_ns,
                self.config.jitter_affinity,
            )?);
        }
        tracing::info!(
            "Starting benchmark: {} runs of {} iterations at {}",
            self.config.runs,
            self.config.iterations,
            self.config.throughput
        );
        Ok(())
    }

    pub(crate) fn report_warmup_progress(&self) {
        self.sink
            .line(format!("Complete: {}", self.collector.samples_received()));
    }

    pub(crate) fn announce_warmup(&self, started: Instant) {
        let secs = started.elapsed().as_millis() as f64 / 1000.0;
        self.sink.line(format!(
            "Warm up complete ({} iterations took {secs} s)",
            self.config.warmup_iterations
        ));
        tracing::info!("Warmup complete after {secs}s");
        if !self.config.pause_after_warmup.is_zero() {
            self.sink.line(format!(
                "Pausing after warmup for {} ms",
                self.config.pause_after_warmup.as_millis()
            ));
        }
    }

    /// Block until the warmup latch is set, then pause and call
    /// [`Task::warmed_up`]. Returns false if aborted first.
    pub(crate) fn wait_for_warmup(&self, started: Instant, task: &mut dyn Task<H>) -> bool {
        while !self.collector.is_warmed_up() {
            clock::pause(WARMUP_REPORT_INTERVAL);
            if self.control.is_aborted() {
                return false;
            }
            self.report_warmup_progress();
        }
        self.announce_warmup(started);
        clock::pause_for(self.config.pause_after_warmup, || self.control.is_aborted());
        if self.control.is_aborted() {
            return false;
        }
        task.warmed_up();
        true
    }

    pub(crate) fn is_drained(&self) -> bool {
        self.collector.end_to_end_count() >= self.config.iterations
    }

    /// Yield until every sample of the run has arrived. Returns false if aborted
    /// first.
    pub(crate) fn drain(&self) -> bool {
        while !self.is_drained() {
            if self.control.is_aborted() {
                return false;
            }
            thread::yield_now();
        }
        !self.control.is_aborted()
    }

    /// Snapshot and print every probe, reset the histograms for the next run and
    /// call [`Task::run_complete`]. `run` counts from zero.
    pub(crate) fn end_of_run(&mut self, run: u32, started: Instant, task: &mut dyn Task<H>) {
        let elapsed = started.elapsed();
        let end_to_end = self.collector.end_to_end();
        let values = end_to_end.percentiles();

        let mut out = Vec::new();
        out.push(run_banner(run + 1));
        out.push(format!(
            "Run time: {} s, distribution: {}",
            elapsed.as_millis() as f64 / 1000.0,
            self.config.latency_distributor
        ));
        out.push(format!(
            "Correcting for co-ordinated:{}",
            self.config.account_for_coordinated_omission
        ));
        out.push(format!(
            "Target throughput:{} = 1 message every {}us",
            self.config.throughput,
            self.gap_ns / 1_000
        ));
        out.push(probe_line("End to End:", end_to_end.count(), &values));
        self.end_to_end_runs.push(values);

        for (name, probe) in self.collector.probes() {
            let values = probe.percentiles();
            out.push(probe_line(&name, probe.count(), &values));
            self.probe_runs.entry(name).or_default().push(values);
        }
        if let Some(jitter) = &self.jitter {
            let values = jitter.percentiles();
            out.push(probe_line("OS Jitter", jitter.total_count(), &values));
            self.jitter_runs.push(values);
        }
        out.push(closing_rule());
        out.push(String::new());
        self.sink.write_str(&out.join("\n"));

        self.collector.reset_all();
        if let Some(jitter) = &self.jitter {
            jitter.reset();
        }
        tracing::info!("Run {} complete in {elapsed:?}", run + 1);
        task.run_complete();
    }

    /// Print the summaries, publish the result and call [`Task::complete`].
    pub(crate) fn end_of_all_runs(&mut self, task: &mut dyn Task<H>) -> BenchResult {
        if self.control.is_aborted() {
            tracing::info!(
                "Benchmark aborted after {} of {} runs",
                self.end_to_end_runs.len(),
                self.config.runs
            );
        }
        let levels = self.config.summary_levels();
        let skip_first = self.config.skips_first_run();
        let mut out = summary_table("end to end", &self.end_to_end_runs, &levels, skip_first);
        for (name, runs) in &self.probe_runs {
            out.push_str(&summary_table(name, runs, &levels, skip_first));
        }
        self.sink.write_str(&out);

        let probes = self
            .probe_runs
            .iter()
            .map(|(name, runs)| (name.clone(), ProbeResult::new(runs.clone())))
            .collect();
        let os_jitter = self
            .config
            .record_os_jitter
            .then(|| ProbeResult::new(self.jitter_runs.clone()));
        let result = BenchResult::new(
            ProbeResult::new(self.end_to_end_runs.clone()),
            probes,
            os_jitter,
        );
        if let Some(consumer) = self.consumer.take() {
            consumer(&result);
        }
        task.complete();
        self.shutdown();
        result
    }

    fn shutdown(&mut self) {
        self.control.set_phase(Phase::Complete);
        if let Some(mut watchdog) = self.watchdog.take() {
            watchdog.stop();
        }
        if let Some(mut jitter) = self.jitter.take() {
            jitter.stop();
        }
    }

    pub(crate) fn progress_line(&self, iteration: u64) {
        self.sink.line(format!(
            "... run {} out of {}",
            with_thousands(iteration),
            with_thousands(self.config.iterations)
        ));
    }
}

impl<H: Histogram> Drop for Engine<H> {
    fn drop(&mut self) {
        self.shutdown();
    }
}
