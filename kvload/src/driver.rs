//! The per-iteration workload: pick a key, read or write it, check the response.
use crate::error::DriverError;
use crate::transport::{HttpTransport, Transport};
use bytes::Bytes;
use kvload_core::{Config, KeyUniverse, Operation, RequestOutcome};
use rand::Rng;
use reqwest::Method;
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};

/// Filler byte of written values.
const VALUE_FILL: char = 'x';

/// A request decided on but not yet sent.
#[derive(Clone, Debug)]
pub struct RequestPlan {
    pub operation: Operation,
    pub url: String,
    /// JSON body; only writes carry one.
    pub body: Option<Bytes>,
}

impl RequestPlan {
    pub fn method(&self) -> Method {
        match self.operation {
            Operation::Read => Method::GET,
            Operation::Write => Method::PUT,
        }
    }
}

#[derive(Serialize)]
struct WriteBody<'a> {
    value: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ttl: Option<u64>,
}

/// Encoded once; every write sends one of these two.
#[derive(Debug)]
struct WriteBodies {
    plain: Bytes,
    with_ttl: Bytes,
}

/// Workload Driver
///
/// Holds only read-only state, so a single instance behind an `Arc` serves every worker. Use
/// [`Driver::iterate`] as the iteration function of a [`Scenario`](crate::Scenario) or any
/// other executor.
#[derive(Debug)]
pub struct Driver<T = HttpTransport> {
    config: Arc<Config>,
    keys: KeyUniverse,
    transport: T,
    bodies: WriteBodies,
}

impl Driver<HttpTransport> {
    /// Driver over HTTP, with the request timeout taken from the configuration.
    pub fn from_config(config: Arc<Config>) -> Result<Self, DriverError> {
        let transport = HttpTransport::new(config.timeout)?;
        Self::new(config, transport)
    }
}

impl<T: Transport> Driver<T> {
    pub fn new(config: Arc<Config>, transport: T) -> Result<Self, DriverError> {
        let keys = KeyUniverse::build(config.keys);
        Self::with_keys(config, keys, transport)
    }

    pub fn with_keys(
        config: Arc<Config>,
        keys: KeyUniverse,
        transport: T,
    ) -> Result<Self, DriverError> {
        if keys.is_empty() {
            return Err(DriverError::EmptyKeyUniverse);
        }

        let value: String = std::iter::repeat(VALUE_FILL)
            .take(config.value_size)
            .collect();
        let plain = serde_json::to_vec(&WriteBody {
            value: &value,
            ttl: None,
        })?;
        let with_ttl = serde_json::to_vec(&WriteBody {
            value: &value,
            ttl: Some(config.ttl_ms),
        })?;

        Ok(Self {
            config,
            keys,
            transport,
            bodies: WriteBodies {
                plain: plain.into(),
                with_ttl: with_ttl.into(),
            },
        })
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn keys(&self) -> &KeyUniverse {
        &self.keys
    }

    /// Run one iteration. Never fails; problems show up as failed checks on the outcome.
    pub async fn iterate(&self) -> RequestOutcome {
        let plan = self.plan(&mut rand::thread_rng());
        self.execute(&plan).await
    }

    /// Pick a key and decide what to do with it.
    pub fn plan<R: Rng + ?Sized>(&self, rng: &mut R) -> RequestPlan {
        // NOTE: The universe is checked to be non-empty on construction
        let key = self.keys.choose(rng).unwrap_or_default();
        self.plan_for(key, rng)
    }

    /// Decide between the read and write path for `key`.
    pub fn plan_for<R: Rng + ?Sized>(&self, key: &str, rng: &mut R) -> RequestPlan {
        let url = self.config.url_for(key);

        let read = self.config.read_only || rng.gen::<f64>() < self.config.read_ratio;
        if read {
            return RequestPlan {
                operation: Operation::Read,
                url,
                body: None,
            };
        }

        let attach_ttl = self.config.ttl_ratio > 0. && rng.gen::<f64>() < self.config.ttl_ratio;
        let body = if attach_ttl {
            self.bodies.with_ttl.clone()
        } else {
            self.bodies.plain.clone()
        };

        RequestPlan {
            operation: Operation::Write,
            url,
            body: Some(body),
        }
    }

    /// Send a planned request and evaluate its checks.
    pub async fn execute(&self, plan: &RequestPlan) -> RequestOutcome {
        let start = Instant::now();
        let res = self.transport.send(plan).await;
        let latency = start.elapsed();

        let sent = plan.body.as_ref().map_or(0, |body| body.len() as u64);
        match res {
            Ok(res) => {
                trace!("{} {} -> {} in {latency:?}", plan.method(), plan.url, res.status);
                RequestOutcome::new(plan.operation, Some(res.status), latency)
                    .with_bytes(sent, res.body_len)
            }
            Err(err) => {
                trace!("{} {} failed: {err}", plan.method(), plan.url);
                RequestOutcome::transport_error(plan.operation, latency, err.to_string())
                    .with_bytes(sent, 0)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{Response, TransportError};
    use kvload_core::Check;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::collections::HashMap;
    use std::sync::Mutex;

    struct Status(u16);

    impl Transport for Status {
        async fn send(&self, _plan: &RequestPlan) -> Result<Response, TransportError> {
            Ok(Response {
                status: self.0,
                body_len: 7,
            })
        }
    }

    struct Refused;

    impl Transport for Refused {
        async fn send(&self, _plan: &RequestPlan) -> Result<Response, TransportError> {
            Err(TransportError::Other("connection refused".to_string()))
        }
    }

    #[derive(Default)]
    struct Recording(Mutex<Vec<RequestPlan>>);

    impl Transport for Recording {
        async fn send(&self, plan: &RequestPlan) -> Result<Response, TransportError> {
            self.0.lock().unwrap().push(plan.clone());
            Ok(Response::from(200))
        }
    }

    fn config(pairs: &[(&str, &str)]) -> Arc<Config> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Arc::new(Config::from_lookup(|var| map.get(var).cloned()))
    }

    fn driver<T: Transport>(pairs: &[(&str, &str)], transport: T) -> Driver<T> {
        Driver::new(config(pairs), transport).unwrap()
    }

    fn body_json(plan: &RequestPlan) -> serde_json::Value {
        serde_json::from_slice(plan.body.as_ref().unwrap()).unwrap()
    }

    #[test]
    fn default_read_request() {
        let driver = driver(&[("READ_RATIO", "1"), ("KEYS", "100")], Status(200));
        let mut rng = SmallRng::seed_from_u64(1);

        let plan = driver.plan_for("k000042", &mut rng);
        assert_eq!(plan.method(), Method::GET);
        assert_eq!(plan.url, "http://localhost:8080/kvs/k000042");
        assert!(plan.body.is_none());
    }

    #[test]
    fn write_request_with_ttl() {
        let driver = driver(
            &[
                ("READ_RATIO", "0"),
                ("VALUE_SIZE", "4"),
                ("TTL_RATIO", "1"),
                ("TTL_MS", "5000"),
            ],
            Status(200),
        );
        let mut rng = SmallRng::seed_from_u64(1);

        let plan = driver.plan_for("k000001", &mut rng);
        assert_eq!(plan.method(), Method::PUT);
        assert_eq!(plan.url, "http://localhost:8080/kvs/k000001");
        assert_eq!(
            plan.body.as_deref(),
            Some(&br#"{"value":"xxxx","ttl":5000}"#[..])
        );
    }

    #[test]
    fn write_request_without_ttl() {
        let driver = driver(&[("READ_RATIO", "0"), ("VALUE_SIZE", "3")], Status(200));
        let mut rng = SmallRng::seed_from_u64(1);

        let plan = driver.plan_for("k000001", &mut rng);
        assert_eq!(plan.body.as_deref(), Some(&br#"{"value":"xxx"}"#[..]));
    }

    #[test]
    fn read_ratio_converges() {
        for ratio in [0., 0.1, 0.5, 0.9, 1.] {
            let driver = driver(&[("READ_RATIO", &ratio.to_string())], Status(200));
            let mut rng = SmallRng::seed_from_u64(42);

            let n = 20_000;
            let reads = (0..n)
                .filter(|_| driver.plan(&mut rng).operation == Operation::Read)
                .count();
            let observed = reads as f64 / n as f64;
            assert!(
                (observed - ratio).abs() < 0.02,
                "ratio {ratio}, observed {observed}"
            );
        }
    }

    #[test]
    fn reads_never_carry_a_body_and_writes_always_do() {
        let driver = driver(&[("READ_RATIO", "0.5"), ("VALUE_SIZE", "17")], Status(200));
        let mut rng = SmallRng::seed_from_u64(3);

        for _ in 0..1_000 {
            let plan = driver.plan(&mut rng);
            match plan.operation {
                Operation::Read => assert!(plan.body.is_none()),
                Operation::Write => {
                    let body = body_json(&plan);
                    assert_eq!(body["value"].as_str().unwrap().len(), 17);
                }
            }
        }
    }

    #[test]
    fn ttl_ratio_zero_never_attaches_ttl() {
        let driver = driver(
            &[("READ_RATIO", "0"), ("TTL_RATIO", "0"), ("TTL_MS", "5000")],
            Status(200),
        );
        let mut rng = SmallRng::seed_from_u64(5);

        for _ in 0..1_000 {
            let body = body_json(&driver.plan(&mut rng));
            assert!(body.get("ttl").is_none());
        }
    }

    #[test]
    fn ttl_ratio_one_always_attaches_ttl() {
        let driver = driver(
            &[("READ_RATIO", "0"), ("TTL_RATIO", "1"), ("TTL_MS", "750")],
            Status(200),
        );
        let mut rng = SmallRng::seed_from_u64(5);

        for _ in 0..1_000 {
            let body = body_json(&driver.plan(&mut rng));
            assert_eq!(body["ttl"], 750);
        }
    }

    #[test]
    fn read_only_ignores_ratio() {
        let driver = driver(&[("READ_RATIO", "0"), ("READ_ONLY", "1")], Status(200));
        let mut rng = SmallRng::seed_from_u64(9);
        assert!((0..500).all(|_| driver.plan(&mut rng).operation == Operation::Read));
    }

    #[test]
    fn keys_stay_in_the_universe() {
        let driver = driver(&[("KEYS", "3"), ("PATH_PATTERN", "/%s")], Status(200));
        let mut rng = SmallRng::seed_from_u64(11);

        for _ in 0..300 {
            let plan = driver.plan(&mut rng);
            let key = plan.url.rsplit('/').next().unwrap();
            assert!(["k000000", "k000001", "k000002"].contains(&key), "{key}");
        }
    }

    #[test]
    fn empty_universe_is_rejected() {
        let res = Driver::with_keys(Arc::new(Config::default()), KeyUniverse::build(0), Status(200));
        assert!(matches!(res, Err(DriverError::EmptyKeyUniverse)));
    }

    #[tokio::test]
    async fn read_miss_passes() {
        let driver = driver(&[("READ_RATIO", "1")], Status(404));
        let outcome = driver.iterate().await;

        assert_eq!(outcome.operation, Operation::Read);
        assert_eq!(outcome.status, Some(404));
        assert_eq!(outcome.check(Check::ReadStatus), Some(true));
        assert_eq!(outcome.check(Check::No5xx), Some(true));
        assert_eq!((outcome.bytes_sent, outcome.bytes_received), (0, 7));
    }

    #[tokio::test]
    async fn write_counts_body_bytes() {
        let driver = driver(&[("READ_RATIO", "0"), ("VALUE_SIZE", "3")], Status(204));
        let outcome = driver.iterate().await;

        assert_eq!(outcome.bytes_sent, br#"{"value":"xxx"}"#.len() as u64);
        assert_eq!(outcome.bytes_received, 7);
    }

    #[tokio::test]
    async fn write_unavailable_fails() {
        let driver = driver(&[("READ_RATIO", "0")], Status(503));
        let outcome = driver.iterate().await;

        assert_eq!(outcome.operation, Operation::Write);
        assert_eq!(outcome.tags.op, Some("set"));
        assert_eq!(outcome.check(Check::Success), Some(false));
        assert_eq!(outcome.check(Check::No5xx), Some(false));
    }

    #[tokio::test]
    async fn transport_errors_become_failed_checks() {
        let driver = driver(&[], Refused);

        for _ in 0..20 {
            let outcome = driver.iterate().await;
            assert_eq!(outcome.status, None);
            assert_eq!(outcome.error.as_deref(), Some("connection refused"));
            assert!(outcome.checks.iter().all(|c| !c.passed));
        }
    }

    #[tokio::test]
    async fn iterate_sends_the_plan() {
        let driver = driver(&[("READ_RATIO", "0"), ("VALUE_SIZE", "2")], Recording::default());
        driver.iterate().await;
        driver.iterate().await;

        let sent = driver.transport.0.lock().unwrap();
        assert_eq!(sent.len(), 2);
        assert!(sent.iter().all(|p| p.method() == Method::PUT));
        assert!(sent
            .iter()
            .all(|p| p.body.as_deref() == Some(&br#"{"value":"xx"}"#[..])));
    }
}
