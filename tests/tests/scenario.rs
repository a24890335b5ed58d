mod utils;
use utils::*;

use kvload::prelude::*;
use ntest::timeout;
use std::sync::Arc;
#[allow(unused)]
use std::time::Duration;

async fn run(config: Arc<Config>) -> RunStatistics {
    let driver = Arc::new(Driver::from_config(config.clone()).unwrap());
    Scenario::with_config(ScenarioConfig::from_config(&config), move || {
        let driver = driver.clone();
        async move { driver.iterate().await }
    })
    .await
}

#[tokio::test]
#[timeout(20_000)]
async fn short_mixed_run() {
    let (addr, state) = mock().await;
    let config = config_for(
        addr,
        &[
            ("RATE", "100"),
            ("DURATION", "1s"),
            ("VUS", "5"),
            ("KEYS", "100"),
            ("READ_RATIO", "0.5"),
        ],
    );
    let stats = run(config).await;

    assert!(
        (80..=120).contains(&stats.iterations),
        "iterations: {}",
        stats.iterations
    );
    assert_eq!(state.requests(), stats.iterations);
    assert_eq!(stats.dropped_iterations, 0);
    assert_eq!(stats.checks["no_5xx"].fails, 0);
    assert_eq!(stats.checks["200/404"].fails, 0);
    assert_eq!(stats.checks["2xx"].fails, 0);
    assert!(stats.requests["PUT /kvs/:key"].requests > 0);
    assert_eq!(stats.requests["PUT /kvs/:key"].failed, 0);
    assert_eq!(
        stats.status_codes.values().sum::<u64>(),
        stats.iterations
    );
    assert!(!state.is_empty());
}

#[tokio::test]
#[timeout(20_000)]
async fn read_only_never_writes() {
    let (addr, state) = mock().await;
    let config = config_for(
        addr,
        &[("RATE", "50"), ("DURATION", "500ms"), ("READ_ONLY", "true")],
    );
    let stats = run(config).await;

    assert!(stats.iterations > 0);
    assert_eq!(stats.requests["PUT /kvs/:key"].requests, 0);
    assert_eq!(stats.status_codes.keys().collect::<Vec<_>>(), vec!["404"]);
    assert!(state.is_empty());
    assert!(stats.passed());
}

#[cfg(feature = "integration")]
mod integration {
    use super::*;

    #[tokio::test]
    #[timeout(60_000)]
    async fn sustained_rate() {
        let (addr, _state) = mock().await;
        let config = config_for(
            addr,
            &[("RATE", "1000"), ("DURATION", "10s"), ("KEYS", "1000")],
        );
        let stats = run(config).await;

        assert!(
            stats.actual_rate > 900.,
            "actual rate: {}",
            stats.actual_rate
        );
        assert_eq!(stats.dropped_iterations, 0);
        assert!(stats.passed(), "{:?}", stats.thresholds);
    }

    #[tokio::test]
    #[timeout(60_000)]
    async fn overloaded_service_fails() {
        let (addr, _state) = mock().await;
        let config = config_for(
            addr,
            &[
                ("RATE", "300"),
                ("DURATION", "3s"),
                ("PATH_PATTERN", "/max/100/kvs/%s"),
            ],
        );
        let stats = run(config).await;

        assert!(!stats.passed());
        assert!(stats.status_codes.contains_key("503"));
        let no_5xx = &stats.thresholds[0];
        assert_eq!(no_5xx.threshold, "checks{check:no_5xx} rate==1.0");
        assert!(!no_5xx.ok);
    }

    #[tokio::test]
    #[timeout(60_000)]
    async fn slow_service_fails_latency() {
        let (addr, _state) = mock().await;
        let config = config_for(
            addr,
            &[
                ("RATE", "50"),
                ("DURATION", "2s"),
                ("PATH_PATTERN", "/delay/ms/80/kvs/%s"),
                ("GRACEFUL_STOP", "5s"),
            ],
        );

        let stats = run(config).await;

        assert!(stats.latency.p95 >= Duration::from_millis(80));
        let failed: Vec<_> = stats.thresholds.iter().filter(|t| !t.ok).collect();
        assert_eq!(failed.len(), 1);
        assert_eq!(failed[0].threshold, "http_req_duration p(95)<50");
    }
}
