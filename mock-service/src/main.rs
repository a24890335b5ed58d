use anyhow::Context;
use std::net::SocketAddr;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

const DEFAULT_ADDR: &str = "0.0.0.0:8080";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("mock_service=info,tower_http=warn"));
    FmtSubscriber::builder().with_env_filter(filter).init();

    let addr = std::env::var("MOCK_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let addr: SocketAddr = addr
        .parse()
        .with_context(|| format!("Invalid listen address {addr:?}"))?;

    mock_service::run(addr)
        .await
        .context("Mock service failed")
}
