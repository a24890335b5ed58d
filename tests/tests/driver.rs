mod utils;
use utils::*;

use kvload::core::{Check, Operation};
use kvload::Driver;
use rand::rngs::SmallRng;
use rand::SeedableRng;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;

#[tokio::test]
async fn read_miss_passes() {
    let (addr, _state) = mock().await;
    let driver = Driver::from_config(config_for(addr, &[("READ_RATIO", "1")])).unwrap();

    let outcome = driver.iterate().await;
    assert_eq!(outcome.operation, Operation::Read);
    assert_eq!(outcome.status, Some(404));
    assert!(outcome.checks.iter().all(|c| c.passed));
    assert!(outcome.error.is_none());
}

#[tokio::test]
async fn write_then_read() {
    let (addr, state) = mock().await;

    let writer = Driver::from_config(config_for(
        addr,
        &[("READ_RATIO", "0"), ("KEYS", "1"), ("VALUE_SIZE", "16")],
    ))
    .unwrap();
    let outcome = writer.iterate().await;
    assert_eq!(outcome.operation, Operation::Write);
    assert_eq!(outcome.status, Some(201));
    assert_eq!(outcome.check(Check::Success), Some(true));
    assert_eq!(state.get("k000000"), Some("x".repeat(16)));

    // Overwrites are still a success
    let outcome = writer.iterate().await;
    assert_eq!(outcome.check(Check::Success), Some(true));

    let reader =
        Driver::from_config(config_for(addr, &[("READ_RATIO", "1"), ("KEYS", "1")])).unwrap();
    let outcome = reader.iterate().await;
    assert_eq!(outcome.status, Some(200));
    assert_eq!(outcome.check(Check::ReadStatus), Some(true));
    assert_eq!(
        outcome.bytes_received,
        format!(r#"{{"value":"{}"}}"#, "x".repeat(16)).len() as u64
    );
}

#[tokio::test]
async fn ttl_writes_expire() {
    let (addr, state) = mock().await;
    let driver = Driver::from_config(config_for(
        addr,
        &[
            ("KEYS", "1"),
            ("TTL_RATIO", "1"),
            ("TTL_MS", "100"),
            ("READ_RATIO", "0"),
        ],
    ))
    .unwrap();

    let mut rng = SmallRng::seed_from_u64(7);
    let plan = driver.plan(&mut rng);
    let outcome = driver.execute(&plan).await;
    assert_eq!(outcome.status, Some(201));
    assert!(state.get("k000000").is_some());

    tokio::time::sleep(Duration::from_millis(250)).await;
    assert_eq!(state.get("k000000"), None);
}

#[tokio::test]
async fn unavailable_fails_both_checks() {
    let (addr, state) = mock().await;
    let driver = Driver::from_config(config_for(
        addr,
        &[("PATH_PATTERN", "/unavailable/kvs/%s")],
    ))
    .unwrap();

    for _ in 0..10 {
        let outcome = driver.iterate().await;
        assert_eq!(outcome.status, Some(503));
        assert!(outcome.checks.iter().all(|c| !c.passed));
        assert_eq!(outcome.check(Check::No5xx), Some(false));
    }
    assert_eq!(state.requests(), 10);
}

#[tokio::test]
async fn connection_refused() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let driver = Driver::from_config(config_for(addr, &[])).unwrap();
    let outcome = driver.iterate().await;
    assert_eq!(outcome.status, None);
    assert!(outcome.error.is_some());
    assert!(outcome.checks.iter().all(|c| !c.passed));
    assert!(outcome.failed());
}

#[tokio::test]
async fn request_timeout() {
    let (addr, _state) = mock().await;
    let driver = Driver::from_config(config_for(
        addr,
        &[
            ("PATH_PATTERN", "/delay/ms/1000/kvs/%s"),
            ("READ_RATIO", "1"),
            ("TIMEOUT", "100ms"),
        ],
    ))
    .unwrap();

    let outcome = driver.iterate().await;
    assert_eq!(outcome.status, None);
    assert!(outcome.error.is_some());
    assert!(outcome.latency < Duration::from_millis(900));
}

#[tokio::test]
async fn broken_body_keeps_the_status_in_the_error() {
    init();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();

    tokio::spawn(async move {
        let (mut stream, _) = listener.accept().await.unwrap();
        let mut buf = [0; 1024];
        let _ = stream.read(&mut buf).await;
        stream
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 100\r\n\r\nabc")
            .await
            .unwrap();
    });

    let driver = Driver::from_config(config_for(addr, &[("READ_RATIO", "1")])).unwrap();
    let outcome = driver.iterate().await;
    assert_eq!(outcome.status, None);
    assert!(outcome.failed());

    let error = outcome.error.unwrap();
    assert!(error.starts_with("200 response body failed"), "{error}");
    assert!(!error.contains(&addr.to_string()), "{error}");
}
