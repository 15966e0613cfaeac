use std::time::Instant;

use super::{ABORT_CHECK_MASK, ProgressThrottle, Schedule};
use crate::{
    clock::{self, nano_time},
    control::Phase,
    harness::Engine,
    histogram::Histogram,
    task::Task,
};

/// Drive warmup and every measured run on the calling thread.
///
/// Returns when all runs are complete or the benchmark was aborted. A run cut
/// short by an abort is not recorded.
pub(crate) fn run<H: Histogram>(engine: &mut Engine<H>, task: &mut dyn Task<H>) {
    let warmup_started = Instant::now();
    if !warm_up(engine, task) {
        return;
    }

    let iterations = engine.config().iterations;
    let runs = engine.config().runs;
    let correct = engine.config().account_for_coordinated_omission;

    for run in 0..runs {
        let mut run_started = Instant::now();
        let mut schedule = Schedule::new(nano_time(), correct);
        let mut progress = ProgressThrottle::new(iterations, schedule.next());

        for i in 0..iterations {
            if progress.should_print(i, schedule.next()) {
                engine.progress_line(i);
            }

            let start_time_ns = if run == 0 && i == 0 {
                if !engine.wait_for_warmup(warmup_started, task) {
                    break;
                }
                run_started = Instant::now();
                schedule = Schedule::new(nano_time(), correct);
                schedule.next()
            } else {
                let target = schedule.advance(engine.next_gap(), nano_time());
                let control = engine.control();
                clock::wait_until(target, || control.is_aborted());
                if correct { target } else { nano_time() }
            };

            if (i as u32) & ABORT_CHECK_MASK == 0 && engine.control().is_aborted() {
                break;
            }
            task.run(start_time_ns);
        }

        let control = engine.control();
        control.transition(Phase::Measuring, Phase::Draining);
        if !engine.drain() {
            break;
        }
        engine.end_of_run(run, run_started, task);
        engine.control().transition(Phase::Draining, Phase::Measuring);
    }
}

/// Warmup invocations back to back with the current time. Returns false if
/// aborted.
fn warm_up<H: Histogram>(engine: &Engine<H>, task: &mut dyn Task<H>) -> bool {
    let warmup_iterations = engine.config().warmup_iterations;
    tracing::debug!("Warming up with {warmup_iterations} iterations");
    for i in 0..warmup_iterations {
        if (i as u32) & ABORT_CHECK_MASK == 0 && engine.control().is_aborted() {
            return false;
        }
        task.run(nano_time());
    }
    true
}
