use crate::{
    collector::Collector,
    histogram::{Histogram, LatencyHistogram},
};

/// The unit of work a harness drives.
///
/// `run` is called once per scheduled invocation with the time (from
/// [`crate::nano_time`]) at which the invocation was *meant* to start. With
/// coordinated-omission correction enabled that is the ideal schedule slot, which
/// may be in the past if the pacer fell behind; measuring from it captures the
/// queueing delay a slow invocation imposes on its successors.
///
/// The task reports latency through the [`Collector`] handed to [`Task::init`]:
/// `collector.sample(..)` for the end-to-end figure and probes from
/// `collector.add_probe(..)` for narrower spans. Samples may be recorded from any
/// thread, so completion can be timed on a worker.
///
/// Every hook other than `run` defaults to a no-op. Hook order is `init` once,
/// `warmed_up` once, `run_complete` after each run, `complete` once at the end.
///
/// # Example
/// ```rust
/// use lathe::{Collector, Task, nano_time};
///
/// struct Noop {
///     collector: Option<Collector>,
/// }
///
/// impl Task for Noop {
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
/// ```
pub trait Task<H: Histogram = LatencyHistogram>: Send {
    fn init(&mut self, _collector: &Collector<H>) {}

    fn run(&mut self, start_time_ns: u64);

    fn warmed_up(&mut self) {}

    fn run_complete(&mut self) {}

    fn complete(&mut self) {}
}

impl<H: Histogram, T: Task<H> + ?Sized> Task<H> for Box<T> {
    fn init(&mut self, collector: &Collector<H>) {
        (**self).init(collector)
    }

    fn run(&mut self, start_time_ns: u64) {
        (**self).run(start_time_ns)
    }

    fn warmed_up(&mut self) {
        (**self).warmed_up()
    }

    fn run_complete(&mut self) {
        (**self).run_complete()
    }

    fn complete(&mut self) {
        (**self).complete()
    }
}
