use kvload_core::{Check, Operation};
use pdatastructs::tdigest::{TDigest, K1};
use std::fmt;
use std::time::Duration;
use tracing::error;

const TDIGEST_BACKLOG_SIZE: usize = 100;

/// Everything recorded during one sampling interval.
#[derive(Debug, Clone)]
pub(crate) struct Measurement {
    pub elapsed: Duration,
    /// Indexed by [`Operation::index`].
    pub requests: [u64; 2],
    pub failed: [u64; 2],
    /// Indexed by [`Check::index`].
    pub passes: [u64; 3],
    pub fails: [u64; 3],
    pub latencies: Vec<Duration>,
    /// `0` for requests without a response.
    pub statuses: Vec<u16>,
    pub errors: Vec<String>,
    /// Arrivals dropped for lack of a free VU.
    pub dropped: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    latency: TDigest<K1>,
}

impl Measurement {
    pub fn new(elapsed: Duration) -> Self {
        Self {
            elapsed,
            requests: [0; 2],
            failed: [0; 2],
            passes: [0; 3],
            fails: [0; 3],
            latencies: vec![],
            statuses: vec![],
            errors: vec![],
            dropped: 0,
            bytes_sent: 0,
            bytes_received: 0,
            latency: default_tdigest(),
        }
    }

    pub fn populate_latencies(&mut self, dur: &[Duration]) {
        for latency in dur {
            self.latency.insert(latency.as_secs_f64());
        }
        self.latencies.extend_from_slice(dur);
    }

    pub fn total(&self) -> u64 {
        self.requests.iter().sum()
    }

    pub fn requests(&self, op: Operation) -> u64 {
        self.requests[op.index()]
    }

    pub fn rate(&self) -> f64 {
        self.total() as f64 / self.elapsed.as_secs_f64()
    }

    pub fn failed_rate(&self) -> f64 {
        let failed: u64 = self.failed.iter().sum();
        failed as f64 / self.total() as f64
    }

    pub fn check_rate(&self, check: Check) -> Option<f64> {
        let passes = self.passes[check.index()];
        let total = passes + self.fails[check.index()];
        (total > 0).then(|| passes as f64 / total as f64)
    }

    pub fn latency(&self, quantile: f64) -> Duration {
        if self.latencies.is_empty() {
            return Duration::ZERO;
        }

        let secs = self.latency.quantile(quantile);

        // TODO: TDigest sometimes returns NaN which we need to filter for.
        let secs = if secs.is_finite() {
            secs
        } else {
            error!("NaN Latency Calculation.");
            0.
        };

        Duration::from_secs_f64(secs)
    }
}

impl fmt::Display for Measurement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.total() == 0 {
            return write!(f, "RPS=0.00, Dropped={}", self.dropped);
        }

        write!(
            f,
            "RPS={:.2}, Failed={:.2}%, no_5xx={:.2}%, Dropped={}, p50={:?}, p95={:?}",
            self.rate(),
            self.failed_rate() * 100.,
            self.check_rate(Check::No5xx).unwrap_or(1.) * 100.,
            self.dropped,
            self.latency(0.5),
            self.latency(0.95),
        )
    }
}

pub(crate) fn default_tdigest() -> TDigest<K1> {
    // TODO: Double-check these values against larger runs
    TDigest::new(K1::new(10.), TDIGEST_BACKLOG_SIZE)
}
