use kvload::core::Config;
use mock_service::MockState;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use tracing::error;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[allow(unused)]
pub fn init() {
    static ONCE_LOCK: OnceLock<()> = OnceLock::new();

    ONCE_LOCK.get_or_init(|| {
        let default_panic = std::panic::take_hook();
        std::panic::set_hook(Box::new(move |info| {
            default_panic(info);
            error!("Panic occurred: {info:?}");
        }));

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("kvload=debug,mock_service=debug"));
        let _ = FmtSubscriber::builder()
            .with_env_filter(filter)
            .with_test_writer()
            .try_init();
    });
}

/// A fresh mock service on its own port.
#[allow(unused)]
pub async fn mock() -> (SocketAddr, MockState) {
    init();
    mock_service::spawn()
        .await
        .expect("Failed to start the mock service")
}

/// Configuration pointed at `addr`, with the given variables set.
#[allow(unused)]
pub fn config_for(addr: SocketAddr, pairs: &[(&str, &str)]) -> Arc<Config> {
    let mut vars: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    vars.insert("BASE_URL".to_string(), format!("http://{addr}"));

    Arc::new(Config::from_lookup(|var| vars.get(var).cloned()))
}
