//! Non-blocking step handlers for a cooperative event loop.
//!
//! Neither handler sleeps or spins: each call to [`EventHandler::action`] does
//! at most one invocation (or one poll) and returns. Register both with
//! [`crate::drive_handlers`] or any loop that honours the [`Action`] contract.

use std::{
    sync::Arc,
    time::Instant,
};

use parking_lot::Mutex;

use super::{ProgressThrottle, Schedule};
use crate::{
    clock::nano_time,
    control::{Control, Phase},
    event_loop::{Action, EventHandler},
    harness::{Engine, WARMUP_REPORT_INTERVAL},
    histogram::Histogram,
    task::Task,
};

pub(crate) type SharedTask<H> = Arc<Mutex<Box<dyn Task<H>>>>;

/// Issues the warmup invocations back to back, one per call.
pub struct WarmupHandler<H: Histogram> {
    task: SharedTask<H>,
    iterations: u64,
    done: u64,
    control: Arc<Control>,
}

impl<H: Histogram> WarmupHandler<H> {
    pub(crate) fn new(task: SharedTask<H>, iterations: u64, control: Arc<Control>) -> Self {
        Self {
            task,
            iterations,
            done: 0,
            control,
        }
    }
}

impl<H: Histogram> EventHandler for WarmupHandler<H> {
    fn action(&mut self) -> Action {
        if self.done >= self.iterations || self.control.is_aborted() {
            return Action::Done;
        }
        self.task.lock().run(nano_time());
        self.done += 1;
        Action::Busy
    }
}

#[derive(Debug, Clone, Copy)]
enum Stage {
    /// Warmup samples are still arriving.
    AwaitingWarmup { last_report: Instant },
    Pausing { until: Instant },
    Measuring,
    /// Every invocation of the run is issued; waiting for the samples.
    Draining,
    Finished,
}

/// Paces the measured runs and publishes the result when the last one drains.
///
/// Invocations are issued only once due and always receive the ideal start
/// time, so this handler needs coordinated-omission correction.
pub struct MeasureHandler<H: Histogram> {
    engine: Engine<H>,
    task: SharedTask<H>,
    stage: Stage,
    schedule: Schedule,
    progress: ProgressThrottle,
    iteration: u64,
    run: u32,
    run_started: Instant,
    warmup_started: Instant,
}

impl<H: Histogram> MeasureHandler<H> {
    pub(crate) fn new(engine: Engine<H>, task: SharedTask<H>) -> Self {
        let now = Instant::now();
        let start = nano_time();
        let iterations = engine.config().iterations;
        Self {
            engine,
            task,
            stage: Stage::AwaitingWarmup { last_report: now },
            schedule: Schedule::new(start, true),
            progress: ProgressThrottle::new(iterations, start),
            iteration: 0,
            run: 0,
            run_started: now,
            warmup_started: now,
        }
    }

    fn await_warmup(&mut self, last_report: Instant) -> Action {
        if !self.engine.collector().is_warmed_up() {
            if last_report.elapsed() >= WARMUP_REPORT_INTERVAL {
                self.engine.report_warmup_progress();
                self.stage = Stage::AwaitingWarmup {
                    last_report: Instant::now(),
                };
            }
            return Action::Idle;
        }
        self.engine.announce_warmup(self.warmup_started);
        self.stage = Stage::Pausing {
            until: Instant::now() + self.engine.config().pause_after_warmup,
        };
        Action::Busy
    }

    fn begin_measuring(&mut self) {
        self.task.lock().warmed_up();
        self.restart_schedule();
        self.stage = Stage::Measuring;
    }

    /// The first invocation of a run is due one gap from now.
    fn restart_schedule(&mut self) {
        let now = nano_time();
        self.run_started = Instant::now();
        self.schedule = Schedule::new(now, true);
        self.schedule.advance(self.engine.next_gap(), now);
        self.progress = ProgressThrottle::new(self.engine.config().iterations, self.schedule.next());
        self.iteration = 0;
    }

    fn step(&mut self) -> Action {
        let start_time_ns = self.schedule.next();
        if !self.schedule.is_due(nano_time()) {
            return Action::Idle;
        }
        self.task.lock().run(start_time_ns);
        self.schedule.advance(self.engine.next_gap(), start_time_ns);
        self.iteration += 1;

        if self.iteration >= self.engine.config().iterations {
            self.engine
                .control()
                .transition(Phase::Measuring, Phase::Draining);
            self.stage = Stage::Draining;
        } else if self
            .progress
            .should_print(self.iteration, self.schedule.next())
        {
            self.engine.progress_line(self.iteration);
        }
        Action::Busy
    }

    fn poll_drain(&mut self) -> Action {
        if !self.engine.is_drained() {
            return Action::Idle;
        }
        {
            let mut task = self.task.lock();
            self.engine
                .end_of_run(self.run, self.run_started, task.as_mut());
        }
        self.run += 1;
        if self.run >= self.engine.config().runs {
            return self.finish();
        }
        self.engine
            .control()
            .transition(Phase::Draining, Phase::Measuring);
        self.restart_schedule();
        self.stage = Stage::Measuring;
        Action::Busy
    }

    fn finish(&mut self) -> Action {
        let mut task = self.task.lock();
        self.engine.end_of_all_runs(task.as_mut());
        self.stage = Stage::Finished;
        Action::Done
    }
}

impl<H: Histogram> EventHandler for MeasureHandler<H> {
    fn action(&mut self) -> Action {
        if matches!(self.stage, Stage::Finished) {
            return Action::Done;
        }
        if self.engine.control().is_aborted() {
            return self.finish();
        }
        match self.stage {
            Stage::AwaitingWarmup { last_report } => self.await_warmup(last_report),
            Stage::Pausing { until } => {
                if Instant::now() < until {
                    return Action::Idle;
                }
                self.begin_measuring();
                Action::Busy
            }
            Stage::Measuring => self.step(),
            Stage::Draining => self.poll_drain(),
            Stage::Finished => Action::Done,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Collector, Config, Harness, Throughput};

    struct Echo {
        collector: Option<Collector>,
        invoked: Arc<Mutex<Vec<u64>>>,
    }

    impl Task for Echo {
        fn init(&mut self, collector: &Collector) {
            self.collector = Some(collector.clone());
        }

        fn run(&mut self, start_time_ns: u64) {
            self.invoked.lock().push(start_time_ns);
            if let Some(c) = &self.collector {
                c.sample(nano_time().saturating_sub(start_time_ns));
            }
        }
    }

    fn handlers(
        config: Config,
    ) -> (
        WarmupHandler<crate::LatencyHistogram>,
        MeasureHandler<crate::LatencyHistogram>,
        Arc<Mutex<Vec<u64>>>,
    ) {
        let invoked = Arc::new(Mutex::new(Vec::new()));
        let (warmup, measure) = Harness::builder(config)
            .task(Echo {
                collector: None,
                invoked: Arc::clone(&invoked),
            })
            .sink(std::io::sink())
            .build()
            .unwrap()
            .into_event_handlers()
            .unwrap();
        (warmup, measure, invoked)
    }

    fn config(warmup: u64) -> Config {
        Config::builder()
            .iterations(1_000)
            .warmup_iterations(warmup)
            .runs(2)
            .throughput(Throughput::per_second(1_000_000))
            .record_os_jitter(false)
            .build()
    }

    mod warmup_handler {
        use super::*;

        #[test]
        fn done_after_the_warmup_count() {
            let (mut warmup, _measure, invoked) = handlers(config(5));
            for _ in 0..5 {
                assert_eq!(warmup.action(), Action::Busy);
            }
            assert_eq!(warmup.action(), Action::Done);
            assert_eq!(invoked.lock().len(), 5);
        }

        #[test]
        fn zero_warmup_is_done_immediately() {
            let (mut warmup, _measure, invoked) = handlers(config(0));
            assert_eq!(warmup.action(), Action::Done);
            assert!(invoked.lock().is_empty());
        }
    }

    mod measure_handler {
        use super::*;

        #[test]
        fn idles_until_warmup_completes() {
            let (_warmup, mut measure, invoked) = handlers(config(5));
            assert_eq!(measure.action(), Action::Idle);
            assert!(invoked.lock().is_empty());
        }

        #[test]
        fn paces_on_the_ideal_timeline() {
            let (_warmup, mut measure, invoked) = handlers(config(0));
            while measure.action() != Action::Done {}
            let invoked = invoked.lock();
            assert_eq!(invoked.len(), 2_000);
            // Within a run every start time is exactly one gap after the last.
            for pair in invoked[..1_000].windows(2) {
                assert_eq!(pair[1] - pair[0], 1_000);
            }
            for pair in invoked[1_000..].windows(2) {
                assert_eq!(pair[1] - pair[0], 1_000);
            }
        }

        #[test]
        fn abort_finishes_the_handler() {
            let config = config(5);
            let harness = Harness::builder(config)
                .task(Echo {
                    collector: None,
                    invoked: Arc::default(),
                })
                .sink(std::io::sink())
                .build()
                .unwrap();
            let abort = harness.abort_handle();
            let (_warmup, mut measure) = harness.into_event_handlers().unwrap();
            abort.abort();
            assert_eq!(measure.action(), Action::Done);
            assert_eq!(measure.action(), Action::Done);
            assert_eq!(abort.phase(), Phase::Complete);
        }
    }
}
