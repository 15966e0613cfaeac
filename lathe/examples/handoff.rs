use std::thread;

use lathe::{
    Collector, Config, Harness, Probe, Reporter, Task, Throughput, nano_time,
    report::{JsonSummary, StdoutReporter},
};
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};

/// Hands every invocation to a worker thread, which records the latency once
/// the message arrives. The "send" probe times only the pacing-side handoff.
struct Handoff {
    tx: Option<UnboundedSender<u64>>,
    send: Option<Probe>,
}

impl Task for Handoff {
    fn init(&mut self, collector: &Collector) {
        let (tx, mut rx) = unbounded_channel::<u64>();
        let end_to_end = collector.clone();
        // Never spawn the worker inside `run`; it sits on the measured path.
        thread::Builder::new()
            .name("handoff-worker".into())
            .spawn(move || {
                while let Some(start_time_ns) = rx.blocking_recv() {
                    end_to_end.sample(nano_time().saturating_sub(start_time_ns));
                }
            })
            .expect("failed to spawn worker");
        self.tx = Some(tx);
        self.send = Some(collector.add_probe("send"));
    }

    fn run(&mut self, start_time_ns: u64) {
        let before = nano_time();
        if let Some(tx) = &self.tx {
            // The worker only stops once we drop the sender.
            let _ = tx.send(start_time_ns);
        }
        if let Some(send) = &self.send {
            send.sample(nano_time() - before);
        }
    }

    fn complete(&mut self) {
        self.tx = None;
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt().init();

    let config = Config::builder()
        .iterations(200_000)
        .warmup_iterations(50_000)
        .runs(3)
        .throughput(Throughput::per_second(100_000))
        .build();
    let iterations = config.iterations;

    // The blocking driver owns its thread for the whole benchmark.
    let result = tokio::task::spawn_blocking(move || {
        Harness::builder(config)
            .task(Handoff {
                tx: None,
                send: None,
            })
            .build()?
            .start()
    })
    .await
    .unwrap()
    .unwrap();

    let report = JsonSummary::new("handoff", &result, iterations);
    StdoutReporter.report(&report).await.unwrap();
}
