use crate::thresholds::ThresholdResult;
use serde::Serialize;
use serde_with::{serde_as, DurationMilliSecondsWithFrac, DurationSecondsWithFrac};
use std::collections::BTreeMap;
use std::num::NonZeroU32;
use std::time::Duration;

/// Run Statistics for a finished Scenario
///
/// Holds the figures the thresholds are evaluated against, along with the threshold results.
#[serde_as]
#[derive(Clone, Debug, Serialize)]
pub struct RunStatistics {
    pub name: String,
    pub goal_rate: NonZeroU32,
    /// Wall time of the whole run, graceful stop included.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub elapsed: Duration,
    /// Time during which new iterations were started.
    #[serde_as(as = "DurationSecondsWithFrac<f64>")]
    pub arrival_window: Duration,
    /// Completed iterations, i.e. requests issued.
    pub iterations: u64,
    /// Arrivals which found every VU busy.
    pub dropped_iterations: u64,
    /// Iterations still in flight at the end of the graceful stop window.
    pub interrupted_iterations: u64,
    /// Largest number of simultaneously active VUs.
    pub max_vus: usize,
    /// Completed iterations per second of the arrival window.
    pub actual_rate: f64,
    /// Request bodies sent and response bodies received.
    pub bytes_sent: u64,
    pub bytes_received: u64,
    /// Bytes sent and received per second of wall time.
    pub throughput_bytes_per_sec: f64,
    /// Fraction of requests with a status in `[200, 400)`.
    pub success_ratio: f64,
    pub latency: LatencySummary,
    /// Keyed by request name tag.
    pub requests: BTreeMap<String, RequestStats>,
    /// Keyed by check name.
    pub checks: BTreeMap<String, CheckStats>,
    /// Keyed by status code, `"0"` for requests without a response.
    pub status_codes: BTreeMap<String, u64>,
    /// Distinct transport errors.
    pub errors: Vec<String>,
    pub thresholds: Vec<ThresholdResult>,
}

impl RunStatistics {
    pub fn passed(&self) -> bool {
        self.thresholds.iter().all(|t| t.ok)
    }
}

#[serde_as]
#[derive(Clone, Debug, Default, Serialize)]
pub struct LatencySummary {
    pub count: u64,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub mean: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub p50: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub p90: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub p95: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub p99: Duration,
    #[serde_as(as = "DurationMilliSecondsWithFrac<f64>")]
    pub max: Duration,
    /// Further quantiles asked for by thresholds, keyed by [`LatencySummary::label`].
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    #[serde_as(as = "BTreeMap<_, DurationMilliSecondsWithFrac<f64>>")]
    pub extra: BTreeMap<String, Duration>,
}

impl LatencySummary {
    pub const QUANTILES: [f64; 4] = [0.5, 0.9, 0.95, 0.99];

    /// `p(<percent>)`, e.g. `p(99.9)`.
    pub fn label(quantile: f64) -> String {
        format!("p({})", quantile * 100.)
    }

    /// Whether `quantile` is one of the fields every summary carries.
    pub fn is_summarized(quantile: f64) -> bool {
        quantile == 1. || Self::QUANTILES.contains(&quantile)
    }

    /// The given quantile, if the summary holds it. `None` without samples.
    pub fn quantile(&self, quantile: f64) -> Option<Duration> {
        if self.count == 0 {
            return None;
        }

        let [p50, p90, p95, p99] = Self::QUANTILES;
        match quantile {
            q if q == p50 => Some(self.p50),
            q if q == p90 => Some(self.p90),
            q if q == p95 => Some(self.p95),
            q if q == p99 => Some(self.p99),
            q if q == 1. => Some(self.max),
            q => self.extra.get(&Self::label(q)).copied(),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct RequestStats {
    pub requests: u64,
    pub failed: u64,
}

impl RequestStats {
    pub fn failed_rate(&self) -> Option<f64> {
        (self.requests > 0).then(|| self.failed as f64 / self.requests as f64)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub struct CheckStats {
    pub passes: u64,
    pub fails: u64,
}

impl CheckStats {
    pub fn total(&self) -> u64 {
        self.passes + self.fails
    }

    pub fn rate(&self) -> Option<f64> {
        (self.total() > 0).then(|| self.passes as f64 / self.total() as f64)
    }
}
