//! Constant-arrival-rate executor
use crate::aggregate::{RunAggregate, RunContext};
use crate::recorder::Recorder;
use crate::timer::Timer;
use crate::transaction::{transaction_hook, TransactionData, TRANSACTION_HOOK};
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use kvload_core::{
    default_thresholds, thresholds::evaluate_all, Config, RequestOutcome, RunStatistics,
    Threshold, BASE_INTERVAL, DEFAULT_DURATION, DEFAULT_GRACEFUL_STOP, DEFAULT_RATE,
    DEFAULT_VUS, MAX_VUS_FACTOR,
};
use std::{
    future::Future,
    num::NonZeroU32,
    pin::Pin,
    sync::Arc,
    task::{Context, Poll},
    time::{Duration, Instant},
};
use tokio::task::{JoinError, JoinSet};
#[allow(unused_imports)]
use tracing::{debug, error, info, instrument, trace, warn};

mod vu_pool;

use vu_pool::VuPool;

/// Settings of a single scenario run.
#[derive(Clone, Debug)]
pub struct ScenarioConfig {
    pub name: String,
    /// Iterations started per second, regardless of how long they take.
    pub rate: NonZeroU32,
    pub duration: Duration,
    /// VUs expected to suffice. Growing past this is allowed up to `max_vus`, with a warning.
    pub vus: usize,
    pub max_vus: usize,
    pub graceful_stop: Duration,
    pub thresholds: Vec<Threshold>,
}

impl ScenarioConfig {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            rate: NonZeroU32::new(DEFAULT_RATE).unwrap_or(NonZeroU32::MIN),
            duration: DEFAULT_DURATION,
            vus: DEFAULT_VUS,
            max_vus: DEFAULT_VUS * MAX_VUS_FACTOR,
            graceful_stop: DEFAULT_GRACEFUL_STOP,
            thresholds: default_thresholds(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            name: config.name.clone(),
            rate: config.rate,
            duration: config.duration,
            vus: config.vus,
            max_vus: config.max_vus(),
            graceful_stop: config.graceful_stop,
            thresholds: default_thresholds(),
        }
    }
}

/// Load test scenario structure
///
/// Runs `func` at a constant arrival rate once awaited, and resolves to the [`RunStatistics`]
/// of the run. `func` is called once per iteration; each call runs in its own task.
///
/// # Example
/// ```no_run
/// use kvload::prelude::*;
/// use std::num::NonZeroU32;
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// #[tokio::main]
/// async fn main() {
///     let config = Arc::new(Config::from_env());
///     let driver = Arc::new(Driver::from_config(config).unwrap());
///
///     let stats = Scenario::new("mixed", move || {
///         let driver = driver.clone();
///         async move { driver.iterate().await }
///     })
///     .rate(NonZeroU32::new(500).unwrap())
///     .duration(Duration::from_secs(30))
///     .await;
///
///     assert!(stats.passed());
/// }
/// ```
#[pin_project::pin_project]
pub struct Scenario<T> {
    func: T,
    runner_fut: Option<Pin<Box<dyn Future<Output = RunStatistics> + Send>>>,
    config: ScenarioConfig,
}

impl<T> Scenario<T> {
    pub fn new(name: &str, func: T) -> Self {
        Self::with_config(ScenarioConfig::new(name), func)
    }

    pub fn with_config(config: ScenarioConfig, func: T) -> Self {
        Self {
            func,
            runner_fut: None,
            config,
        }
    }

    pub fn config(&self) -> &ScenarioConfig {
        &self.config
    }
}

impl<T, F> Future for Scenario<T>
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = RequestOutcome> + Send + 'static,
{
    type Output = RunStatistics;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.project();
        let runner = this.runner_fut.get_or_insert_with(|| {
            let func = this.func.clone();
            let config = this.config.clone();
            Box::pin(async move { run_scenario(func, config).await })
        });

        runner.as_mut().poll(cx)
    }
}

pub trait ConfigurableScenario<T: Send>: Future<Output = T> + Sized + Send {
    fn rate(self, rate: NonZeroU32) -> Self;
    fn duration(self, duration: Duration) -> Self;
    fn vus(self, preallocated: usize, max: usize) -> Self;
    fn graceful_stop(self, graceful_stop: Duration) -> Self;
    fn thresholds(self, thresholds: Vec<Threshold>) -> Self;
}

impl<T, F> ConfigurableScenario<RunStatistics> for Scenario<T>
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = RequestOutcome> + Send + 'static,
{
    /// Start this many iterations per second.
    fn rate(mut self, rate: NonZeroU32) -> Self {
        self.config.rate = rate;
        self
    }

    /// Stop starting iterations after the given duration.
    fn duration(mut self, duration: Duration) -> Self {
        self.config.duration = duration;
        self
    }

    /// Size the VU pool. Arrivals finding all `max` VUs busy are dropped.
    fn vus(mut self, preallocated: usize, max: usize) -> Self {
        self.config.vus = preallocated;
        self.config.max_vus = max;
        self
    }

    /// Time in-flight iterations are given to finish once the duration elapsed.
    fn graceful_stop(mut self, graceful_stop: Duration) -> Self {
        self.config.graceful_stop = graceful_stop;
        self
    }

    /// Replace the default thresholds the run is judged by.
    ///
    /// # Example
    /// ```no_run
    /// use kvload::prelude::*;
    /// use std::time::Duration;
    ///
    /// # async fn run(driver: std::sync::Arc<Driver>) {
    /// let stats = Scenario::new("latency-only", move || {
    ///     let driver = driver.clone();
    ///     async move { driver.iterate().await }
    /// })
    /// .thresholds(vec![Threshold::Latency {
    ///     quantile: 0.99,
    ///     max: Duration::from_millis(100),
    /// }])
    /// .await;
    /// # }
    /// ```
    fn thresholds(mut self, thresholds: Vec<Threshold>) -> Self {
        self.config.thresholds = thresholds;
        self
    }
}

#[instrument(name="scenario", skip_all, fields(name=config.name))]
pub(crate) async fn run_scenario<T, F>(func: T, config: ScenarioConfig) -> RunStatistics
where
    T: Fn() -> F + Send + Sync + 'static + Clone,
    F: Future<Output = RequestOutcome> + Send + 'static,
{
    info!("Running {} with config {:?}", config.name, &config);

    let recorder = Arc::new(Recorder::new());
    let limiter = rate_limiter(config.rate);
    let mut pool = VuPool::new(config.vus, config.max_vus);
    let mut tasks = JoinSet::new();
    let mut aggregate = RunAggregate::new();
    let mut dropped = 0u64;

    let start = Instant::now();
    let deadline = tokio::time::sleep(config.duration);
    tokio::pin!(deadline);
    let mut timer = Timer::new(BASE_INTERVAL).await;
    debug!("Reporting progress every {timer}");

    // NOTE: This loop is time-sensitive. Any long awaits or blocking will throw off the arrival
    // rate.
    loop {
        tokio::select! {
            biased;

            _ = &mut deadline => break,
            elapsed = timer.tick() => {
                let mut measurement = recorder.collect(elapsed);
                measurement.dropped = std::mem::take(&mut dropped);
                if measurement.dropped > 0 {
                    warn!(
                        "Dropped {} iterations, all {} VUs busy",
                        measurement.dropped,
                        pool.active()
                    );
                }
                info!("{measurement}");
                aggregate.push(&measurement);
            }
            Some(res) = tasks.join_next(), if !tasks.is_empty() => log_join(res),
            _ = limiter.until_ready() => {
                let Some(vu) = pool.try_acquire() else {
                    dropped += 1;
                    #[cfg(feature = "metrics")]
                    metrics::counter!("kvload_dropped_iterations").increment(1);
                    continue;
                };

                let func = func.clone();
                let data = TransactionData {
                    recorder: recorder.clone(),
                };
                tasks.spawn(TRANSACTION_HOOK.scope(data, async move {
                    let _vu = vu;
                    transaction_hook(func()).await;
                }));
            }
        }
    }

    let arrival_window = start.elapsed();
    let interrupted = drain(&mut tasks, config.graceful_stop).await;

    let mut measurement = recorder.collect(timer.since_last_tick());
    measurement.dropped = dropped;
    aggregate.push(&measurement);

    let mut stats = aggregate.finish(RunContext {
        name: &config.name,
        goal_rate: config.rate,
        elapsed: start.elapsed(),
        arrival_window,
        interrupted,
        max_vus: pool.peak(),
        thresholds: &config.thresholds,
    });

    let passed = evaluate_all(&config.thresholds, &mut stats);
    for result in &stats.thresholds {
        if result.ok {
            info!("Threshold passed: {} (observed {:?})", result.threshold, result.observed);
        } else {
            warn!("Threshold failed: {} (observed {:?})", result.threshold, result.observed);
        }
    }

    info!(
        "Scenario complete: {} iterations at {:.2}/s, {} dropped, {} interrupted, thresholds {}",
        stats.iterations,
        stats.actual_rate,
        stats.dropped_iterations,
        stats.interrupted_iterations,
        if passed { "passed" } else { "failed" }
    );

    stats
}

/// Wait up to `graceful_stop` for in-flight iterations, then abort the rest. Returns the
/// number of aborted iterations.
async fn drain(tasks: &mut JoinSet<()>, graceful_stop: Duration) -> u64 {
    if tasks.is_empty() {
        return 0;
    }

    info!(
        "Waiting up to {} for {} in-flight iterations",
        humantime::format_duration(graceful_stop),
        tasks.len()
    );

    let finished = tokio::time::timeout(graceful_stop, async {
        while let Some(res) = tasks.join_next().await {
            log_join(res);
        }
    })
    .await;

    if finished.is_ok() {
        return 0;
    }

    tasks.abort_all();
    let mut interrupted = 0;
    while let Some(res) = tasks.join_next().await {
        match res {
            Err(err) if err.is_cancelled() => interrupted += 1,
            res => log_join(res),
        }
    }

    warn!("Graceful stop elapsed, interrupted {interrupted} iterations");
    interrupted
}

fn log_join(res: Result<(), JoinError>) {
    if let Err(err) = res {
        if err.is_panic() {
            error!("Iteration panicked: {err}");
        }
    }
}

fn rate_limiter(rate: NonZeroU32) -> DefaultDirectRateLimiter {
    // NOTE: Sleeps are only millisecond accurate, so above 100/s several arrivals must be
    // allowed to start together for the rate to hold.
    let burst = NonZeroU32::new(rate.get() / 100).unwrap_or(NonZeroU32::MIN);
    RateLimiter::direct(Quota::per_second(rate).allow_burst(burst))
}
