//! JSON run summary.
use crate::error::SummaryError;
use kvload_core::RunStatistics;
use std::path::Path;
use tracing::info;

pub fn to_json(stats: &RunStatistics) -> Result<String, SummaryError> {
    Ok(serde_json::to_string_pretty(stats)?)
}

/// Write the summary to `path`, replacing any existing file.
pub fn write_summary(stats: &RunStatistics, path: &Path) -> Result<(), SummaryError> {
    let json = to_json(stats)?;
    std::fs::write(path, json).map_err(|source| SummaryError::Write {
        path: path.to_path_buf(),
        source,
    })?;

    info!("Summary written to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use kvload_core::{thresholds::evaluate_all, LatencySummary};
    use std::collections::BTreeMap;
    use std::num::NonZeroU32;
    use std::time::Duration;

    fn stats() -> RunStatistics {
        let mut stats = RunStatistics {
            name: "mixed".to_string(),
            goal_rate: NonZeroU32::new(200).unwrap(),
            elapsed: Duration::from_millis(1_500),
            arrival_window: Duration::from_millis(1_500),
            iterations: 300,
            dropped_iterations: 0,
            interrupted_iterations: 0,
            max_vus: 3,
            actual_rate: 200.,
            bytes_sent: 1_000,
            bytes_received: 2_000,
            throughput_bytes_per_sec: 2_000.,
            success_ratio: 1.,
            latency: LatencySummary::default(),
            requests: BTreeMap::new(),
            checks: BTreeMap::new(),
            status_codes: BTreeMap::from([("200".to_string(), 300)]),
            errors: vec![],
            thresholds: vec![],
        };
        evaluate_all(&kvload_core::default_thresholds(), &mut stats);
        stats
    }

    #[test]
    fn json_shape() {
        let json: serde_json::Value = serde_json::from_str(&to_json(&stats()).unwrap()).unwrap();
        assert_eq!(json["name"], "mixed");
        assert_eq!(json["elapsed"], 1.5);
        assert_eq!(json["arrival_window"], 1.5);
        assert_eq!(json["throughput_bytes_per_sec"], 2_000.);
        assert_eq!(json["status_codes"]["200"], 300);
        assert_eq!(json["thresholds"].as_array().unwrap().len(), 3);
    }

    #[test]
    fn writes_file() {
        let path = std::env::temp_dir().join(format!("kvload-summary-{}.json", std::process::id()));
        write_summary(&stats(), &path).unwrap();

        let written: serde_json::Value =
            serde_json::from_slice(&std::fs::read(&path).unwrap()).unwrap();
        assert_eq!(written["iterations"], 300);
        assert_eq!(written["thresholds"][0]["ok"], true);
        std::fs::remove_file(&path).unwrap();
    }

    #[test]
    fn unwritable_path() {
        let path = Path::new("/nonexistent-dir/summary.json");
        let err = write_summary(&stats(), path).unwrap_err();
        assert!(matches!(err, SummaryError::Write { .. }));
        assert!(err.to_string().contains("/nonexistent-dir/summary.json"));
    }
}
