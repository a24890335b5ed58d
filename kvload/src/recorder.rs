use crate::measurement::Measurement;
use kvload_core::RequestOutcome;
use metrics_util::AtomicBucket;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// Lock-free sink for iteration outcomes, shared by every task of a scenario and drained by
/// the scenario loop once per interval.
#[derive(Default)]
pub(crate) struct Recorder {
    requests: [AtomicU64; 2],
    failed: [AtomicU64; 2],
    passes: [AtomicU64; 3],
    fails: [AtomicU64; 3],
    bytes_sent: AtomicU64,
    bytes_received: AtomicU64,
    latency: AtomicBucket<Duration>,
    statuses: AtomicBucket<u16>,
    errors: AtomicBucket<String>,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, outcome: &RequestOutcome) {
        let op = outcome.operation.index();
        self.requests[op].fetch_add(1, Ordering::Relaxed);
        if outcome.failed() {
            self.failed[op].fetch_add(1, Ordering::Relaxed);
        }

        for result in &outcome.checks {
            let counter = if result.passed {
                &self.passes
            } else {
                &self.fails
            };
            counter[result.check.index()].fetch_add(1, Ordering::Relaxed);
        }

        self.bytes_sent
            .fetch_add(outcome.bytes_sent, Ordering::Relaxed);
        self.bytes_received
            .fetch_add(outcome.bytes_received, Ordering::Relaxed);

        self.latency.push(outcome.latency);
        self.statuses.push(outcome.status.unwrap_or(0));
        if let Some(error) = &outcome.error {
            self.errors.push(error.clone());
        }
    }

    /// Take everything recorded since the previous collection.
    pub fn collect(&self, elapsed: Duration) -> Measurement {
        let mut measurement = Measurement::new(elapsed);
        measurement.requests = take(&self.requests);
        measurement.failed = take(&self.failed);
        measurement.passes = take(&self.passes);
        measurement.fails = take(&self.fails);
        measurement.bytes_sent = self.bytes_sent.swap(0, Ordering::Relaxed);
        measurement.bytes_received = self.bytes_received.swap(0, Ordering::Relaxed);

        self.latency
            .clear_with(|dur| measurement.populate_latencies(dur));
        self.statuses
            .clear_with(|statuses| measurement.statuses.extend_from_slice(statuses));
        self.errors
            .clear_with(|errors| measurement.errors.extend_from_slice(errors));

        measurement
    }
}

fn take<const N: usize>(counters: &[AtomicU64; N]) -> [u64; N] {
    std::array::from_fn(|i| counters[i].swap(0, Ordering::Relaxed))
}
