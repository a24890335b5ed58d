use anyhow::Context;
use clap::Parser;
use kvload::core::{vars, Config};
use kvload::{summary, Driver, Scenario, ScenarioConfig};
use std::net::SocketAddr;
use std::process::ExitCode;
use std::sync::Arc;
#[allow(unused)]
use tracing::{debug, error, info, trace, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_LOG_FILTER: &str = "kvload=info";

/// Exit code of a run which completed but failed one or more thresholds.
const THRESHOLDS_FAILED: u8 = 99;

/// Constant-arrival-rate mixed read/write load generator for key-value HTTP services.
// NOTE: Settings are kept as strings so malformed values fall back to their defaults
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    #[arg(long, env = vars::BASE_URL)]
    base_url: Option<String>,

    #[arg(long, env = vars::PATH_PATTERN)]
    path_pattern: Option<String>,

    #[arg(long, env = vars::DURATION)]
    duration: Option<String>,

    #[arg(long, env = vars::RATE)]
    rate: Option<String>,

    #[arg(long, env = vars::VUS)]
    vus: Option<String>,

    #[arg(long, env = vars::READ_RATIO)]
    read_ratio: Option<String>,

    #[arg(long, env = vars::KEYS)]
    keys: Option<String>,

    #[arg(long, env = vars::VALUE_SIZE)]
    value_size: Option<String>,

    #[arg(long, env = vars::TTL_RATIO)]
    ttl_ratio: Option<String>,

    #[arg(long, env = vars::TTL_MS)]
    ttl_ms: Option<String>,

    #[arg(long, env = vars::TIMEOUT)]
    timeout: Option<String>,

    #[arg(long, env = vars::GRACEFUL_STOP)]
    graceful_stop: Option<String>,

    /// Scenario name used in logs and the summary.
    #[arg(long, env = vars::SCENARIO)]
    name: Option<String>,

    /// Only ever read. `--read-only` alone means true.
    #[arg(long, env = vars::READ_ONLY, num_args = 0..=1, default_missing_value = "true")]
    read_only: Option<String>,

    /// Also write the JSON summary to this file.
    #[arg(long, env = vars::OUTPUT)]
    output: Option<String>,

    /// Serve Prometheus metrics on this address.
    #[arg(long, env = "METRICS_ADDR")]
    metrics_addr: Option<String>,
}

impl Cli {
    fn lookup(&self, var: &str) -> Option<String> {
        let value = match var {
            vars::BASE_URL => &self.base_url,
            vars::PATH_PATTERN => &self.path_pattern,
            vars::DURATION => &self.duration,
            vars::RATE => &self.rate,
            vars::VUS => &self.vus,
            vars::READ_RATIO => &self.read_ratio,
            vars::KEYS => &self.keys,
            vars::VALUE_SIZE => &self.value_size,
            vars::TTL_RATIO => &self.ttl_ratio,
            vars::TTL_MS => &self.ttl_ms,
            vars::TIMEOUT => &self.timeout,
            vars::GRACEFUL_STOP => &self.graceful_stop,
            vars::SCENARIO => &self.name,
            vars::READ_ONLY => &self.read_only,
            vars::OUTPUT => &self.output,
            _ => return None,
        };
        value.clone()
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    // NOTE: stdout carries the summary only
    FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match run(cli).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(THRESHOLDS_FAILED),
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Returns whether every threshold passed.
async fn run(cli: Cli) -> anyhow::Result<bool> {
    if let Some(addr) = cli.metrics_addr.as_deref().filter(|a| !a.trim().is_empty()) {
        let addr: SocketAddr = addr
            .trim()
            .parse()
            .with_context(|| format!("Invalid metrics address {addr:?}"))?;
        install_exporter(addr)?;
    }

    let config = Arc::new(Config::from_lookup(|var| cli.lookup(var)));
    info!("Effective configuration: {config:?}");

    let driver = Driver::from_config(config.clone()).context("Failed to set up the driver")?;
    let driver = Arc::new(driver);

    let stats = Scenario::with_config(ScenarioConfig::from_config(&config), move || {
        let driver = driver.clone();
        async move { driver.iterate().await }
    })
    .await;

    println!("{}", summary::to_json(&stats)?);
    if let Some(path) = &config.output {
        summary::write_summary(&stats, path)?;
    }

    Ok(stats.passed())
}

#[cfg(feature = "metrics")]
fn install_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(addr)
        .install()
        .context("Failed to install the Prometheus exporter")?;
    info!("Serving metrics on {addr}");
    Ok(())
}

#[cfg(not(feature = "metrics"))]
fn install_exporter(addr: SocketAddr) -> anyhow::Result<()> {
    warn!("Built without the metrics feature, not serving metrics on {addr}");
    Ok(())
}
