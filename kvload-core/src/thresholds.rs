//! Pass/fail criteria for a finished run.
use crate::outcome::{Check, Operation};
use crate::stats::{LatencySummary, RunStatistics};
use serde::Serialize;
use std::fmt;
use std::time::Duration;
use tracing::warn;

/// An acceptance criterion evaluated once the run is over.
///
/// A threshold without any samples to look at passes. A latency threshold whose quantile the
/// statistics don't hold fails.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Threshold {
    /// Pass rate of a check must be at least `min`.
    CheckRate { check: Check, min: f64 },
    /// Failed request rate for a request name must stay below `max`.
    FailedRate { name: &'static str, max: f64 },
    /// Request duration quantile, in `[0, 1]`, must stay below `max`.
    Latency { quantile: f64, max: Duration },
}

/// The thresholds a mixed workload run is judged by.
pub fn default_thresholds() -> Vec<Threshold> {
    vec![
        Threshold::CheckRate {
            check: Check::No5xx,
            min: 1.,
        },
        Threshold::FailedRate {
            name: Operation::Write.tags().name,
            max: 0.01,
        },
        Threshold::Latency {
            quantile: 0.95,
            max: Duration::from_millis(50),
        },
    ]
}

impl Threshold {
    /// Quantile the statistics must hold for this threshold to be evaluated.
    pub fn latency_quantile(&self) -> Option<f64> {
        match *self {
            Threshold::Latency { quantile, .. } => Some(quantile),
            _ => None,
        }
    }

    pub fn evaluate(&self, stats: &RunStatistics) -> ThresholdResult {
        let (ok, observed) = match *self {
            Threshold::CheckRate { check, min } => {
                let rate = stats.checks.get(check.name()).and_then(|c| c.rate());
                (rate.map_or(true, |r| r >= min), rate)
            }
            Threshold::FailedRate { name, max } => {
                let rate = stats.requests.get(name).and_then(|r| r.failed_rate());
                (rate.map_or(true, |r| r < max), rate)
            }
            Threshold::Latency { quantile, max } => {
                if stats.latency.count == 0 {
                    (true, None)
                } else if let Some(latency) = stats.latency.quantile(quantile) {
                    (latency < max, Some(latency.as_secs_f64() * 1e3))
                } else {
                    warn!("No {} latency recorded for {self}", LatencySummary::label(quantile));
                    (false, None)
                }
            }
        };

        ThresholdResult {
            threshold: self.to_string(),
            ok,
            observed,
        }
    }
}

impl fmt::Display for Threshold {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Threshold::CheckRate { check, min } if *min >= 1. => {
                write!(f, "checks{{check:{check}}} rate==1.0")
            }
            Threshold::CheckRate { check, min } => write!(f, "checks{{check:{check}}} rate>={min}"),
            Threshold::FailedRate { name, max } => {
                write!(f, "http_req_failed{{name:{name}}} rate<{max}")
            }
            Threshold::Latency { quantile, max } => write!(
                f,
                "http_req_duration p({})<{}",
                quantile * 100.,
                max.as_millis()
            ),
        }
    }
}

/// Outcome of a single threshold. Latencies are observed in milliseconds.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ThresholdResult {
    pub threshold: String,
    pub ok: bool,
    pub observed: Option<f64>,
}

/// Evaluate every threshold and store the results on `stats`. Returns whether all passed.
pub fn evaluate_all(thresholds: &[Threshold], stats: &mut RunStatistics) -> bool {
    stats.thresholds = thresholds.iter().map(|t| t.evaluate(stats)).collect();
    stats.passed()
}
