use crate::measurement::{default_tdigest, Measurement};
use kvload_core::{
    Check, CheckStats, LatencySummary, Operation, RequestStats, RunStatistics, Threshold,
};
use pdatastructs::tdigest::{TDigest, K1};
use std::collections::{BTreeMap, BTreeSet};
use std::num::NonZeroU32;
use std::time::Duration;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Distinct transport errors kept for the summary.
const MAX_DISTINCT_ERRORS: usize = 32;

/// Run-wide totals, fed with every interval [`Measurement`].
pub(crate) struct RunAggregate {
    requests: [u64; 2],
    failed: [u64; 2],
    passes: [u64; 3],
    fails: [u64; 3],
    dropped: u64,
    bytes_sent: u64,
    bytes_received: u64,
    latency: TDigest<K1>,
    latency_count: u64,
    latency_sum: Duration,
    latency_max: Duration,
    statuses: BTreeMap<u16, u64>,
    errors: BTreeSet<String>,
}

/// Run facts the measurements don't carry.
pub(crate) struct RunContext<'a> {
    pub name: &'a str,
    pub goal_rate: NonZeroU32,
    pub elapsed: Duration,
    /// Part of `elapsed` during which iterations were started.
    pub arrival_window: Duration,
    pub interrupted: u64,
    pub max_vus: usize,
    /// Latency thresholds may ask for quantiles beyond the summarized ones.
    pub thresholds: &'a [Threshold],
}

impl RunAggregate {
    pub fn new() -> Self {
        Self {
            requests: [0; 2],
            failed: [0; 2],
            passes: [0; 3],
            fails: [0; 3],
            dropped: 0,
            bytes_sent: 0,
            bytes_received: 0,
            latency: default_tdigest(),
            latency_count: 0,
            latency_sum: Duration::ZERO,
            latency_max: Duration::ZERO,
            statuses: BTreeMap::new(),
            errors: BTreeSet::new(),
        }
    }

    pub fn push(&mut self, measurement: &Measurement) {
        add(&mut self.requests, &measurement.requests);
        add(&mut self.failed, &measurement.failed);
        add(&mut self.passes, &measurement.passes);
        add(&mut self.fails, &measurement.fails);
        self.dropped += measurement.dropped;
        self.bytes_sent += measurement.bytes_sent;
        self.bytes_received += measurement.bytes_received;

        for latency in &measurement.latencies {
            self.latency.insert(latency.as_secs_f64());
            self.latency_sum += *latency;
            self.latency_max = self.latency_max.max(*latency);
        }
        self.latency_count += measurement.latencies.len() as u64;

        for status in &measurement.statuses {
            *self.statuses.entry(*status).or_default() += 1;
        }

        for error in &measurement.errors {
            if self.errors.len() >= MAX_DISTINCT_ERRORS {
                break;
            }
            self.errors.insert(error.clone());
        }
    }

    pub fn iterations(&self) -> u64 {
        self.requests.iter().sum()
    }

    pub fn latency(&self, quantile: f64) -> Duration {
        if self.latency_count == 0 || !(0. ..=1.).contains(&quantile) {
            return Duration::ZERO;
        }

        let secs = self.latency.quantile(quantile);
        if !secs.is_finite() {
            error!("NaN Latency Calculation.");
            return Duration::ZERO;
        }

        // NOTE: The digest interpolates, never report past the observed maximum
        Duration::from_secs_f64(secs.max(0.)).min(self.latency_max)
    }

    fn latency_summary(&self, thresholds: &[Threshold]) -> LatencySummary {
        if self.latency_count == 0 {
            return LatencySummary::default();
        }

        let extra = thresholds
            .iter()
            .filter_map(Threshold::latency_quantile)
            .filter(|q| (0. ..=1.).contains(q) && !LatencySummary::is_summarized(*q))
            .map(|q| (LatencySummary::label(q), self.latency(q)))
            .collect();

        let [p50, p90, p95, p99] = LatencySummary::QUANTILES.map(|q| self.latency(q));
        LatencySummary {
            count: self.latency_count,
            mean: mean(self.latency_sum, self.latency_count),
            p50,
            p90,
            p95,
            p99,
            max: self.latency_max,
            extra,
        }
    }

    pub fn finish(self, context: RunContext<'_>) -> RunStatistics {
        let iterations = self.iterations();
        let failed: u64 = self.failed.iter().sum();

        let requests = Operation::ALL
            .iter()
            .map(|op| {
                let stats = RequestStats {
                    requests: self.requests[op.index()],
                    failed: self.failed[op.index()],
                };
                (op.tags().name.to_string(), stats)
            })
            .collect();

        let checks = Check::ALL
            .iter()
            .map(|check| {
                let stats = CheckStats {
                    passes: self.passes[check.index()],
                    fails: self.fails[check.index()],
                };
                (check.name().to_string(), stats)
            })
            .collect();

        let status_codes = self
            .statuses
            .iter()
            .map(|(status, count)| (status.to_string(), *count))
            .collect();

        let bytes = self.bytes_sent + self.bytes_received;
        RunStatistics {
            name: context.name.to_string(),
            goal_rate: context.goal_rate,
            elapsed: context.elapsed,
            arrival_window: context.arrival_window,
            iterations,
            dropped_iterations: self.dropped,
            interrupted_iterations: context.interrupted,
            max_vus: context.max_vus,
            actual_rate: per_sec(iterations, context.arrival_window),
            bytes_sent: self.bytes_sent,
            bytes_received: self.bytes_received,
            throughput_bytes_per_sec: per_sec(bytes, context.elapsed),
            success_ratio: if iterations > 0 {
                (iterations - failed) as f64 / iterations as f64
            } else {
                0.
            },
            latency: self.latency_summary(context.thresholds),
            requests,
            checks,
            status_codes,
            errors: self.errors.into_iter().collect(),
            thresholds: vec![],
        }
    }
}

fn per_sec(count: u64, window: Duration) -> f64 {
    let secs = window.as_secs_f64();
    if secs > 0. {
        count as f64 / secs
    } else {
        0.
    }
}

fn mean(sum: Duration, count: u64) -> Duration {
    if count == 0 {
        return Duration::ZERO;
    }
    let nanos = sum.as_nanos() / u128::from(count);
    Duration::from_nanos(u64::try_from(nanos).unwrap_or(u64::MAX))
}

fn add<const N: usize>(total: &mut [u64; N], interval: &[u64; N]) {
    for (t, i) in total.iter_mut().zip(interval) {
        *t += i;
    }
}
