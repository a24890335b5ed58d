use std::time::Duration;

pub const DEFAULT_BASE_URL: &str = "http://localhost:8080";
pub const DEFAULT_PATH_PATTERN: &str = "/kvs/%s";
pub const DEFAULT_DURATION: Duration = Duration::from_secs(60);
pub const DEFAULT_RATE: u32 = 200;
pub const DEFAULT_VUS: usize = 50;
pub const DEFAULT_READ_RATIO: f64 = 0.9;
pub const DEFAULT_KEYS: usize = 50_000;
pub const DEFAULT_VALUE_SIZE: usize = 128;
pub const DEFAULT_TTL_RATIO: f64 = 0.;
pub const DEFAULT_TTL_MS: u64 = 0;
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const DEFAULT_GRACEFUL_STOP: Duration = Duration::from_secs(30);
pub const DEFAULT_SCENARIO_NAME: &str = "mixed";

/// Placeholder in the path pattern which is replaced by the selected key.
pub const KEY_PLACEHOLDER: &str = "%s";

/// Minimum number of digits in a generated key index.
pub const KEY_INDEX_WIDTH: usize = 6;

/// The max worker pool is this multiple of the preallocated pool.
pub const MAX_VUS_FACTOR: usize = 2;

/// Largest accepted preallocated pool size. Larger values fall back to the default.
pub const MAX_VUS: usize = 1_000_000;

/// Interval at which the executor collects and reports progress.
pub const BASE_INTERVAL: Duration = Duration::from_secs(1);
