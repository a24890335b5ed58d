use crate::constants::*;
use std::fmt::Display;
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::debug;

/// Names of the environment-style inputs read by [`Config::from_lookup`].
pub mod vars {
    pub const BASE_URL: &str = "BASE_URL";
    pub const PATH_PATTERN: &str = "PATH_PATTERN";
    pub const DURATION: &str = "DURATION";
    pub const RATE: &str = "RATE";
    pub const VUS: &str = "VUS";
    pub const READ_RATIO: &str = "READ_RATIO";
    pub const KEYS: &str = "KEYS";
    pub const VALUE_SIZE: &str = "VALUE_SIZE";
    pub const TTL_RATIO: &str = "TTL_RATIO";
    pub const TTL_MS: &str = "TTL_MS";
    pub const TIMEOUT: &str = "TIMEOUT";
    pub const GRACEFUL_STOP: &str = "GRACEFUL_STOP";
    pub const SCENARIO: &str = "SCENARIO";
    pub const READ_ONLY: &str = "READ_ONLY";
    pub const OUTPUT: &str = "OUTPUT";
}

/// Workload configuration.
///
/// Read once at startup and shared read-only by every worker for the lifetime of the run.
/// Loading never fails: absent or malformed inputs fall back to their defaults.
#[derive(Clone, Debug)]
pub struct Config {
    pub base_url: String,
    /// Request path, `%s` is replaced by the selected key.
    pub path_pattern: String,
    pub duration: Duration,
    /// Target aggregate arrival rate, in iterations per second.
    pub rate: NonZeroU32,
    /// Preallocated worker pool size. The pool may grow to [`Config::max_vus`].
    pub vus: usize,
    /// Probability in `[0, 1]` that an iteration takes the read path.
    pub read_ratio: f64,
    /// Size of the key universe.
    pub keys: usize,
    /// Length in bytes of the value written by the write path.
    pub value_size: usize,
    /// Probability in `[0, 1]` that a write carries a TTL.
    pub ttl_ratio: f64,
    pub ttl_ms: u64,
    /// Per-request timeout handed to the HTTP client.
    pub timeout: Duration,
    /// How long in-flight iterations may keep running once the duration elapsed.
    pub graceful_stop: Duration,
    pub name: String,
    /// Force every iteration onto the read path.
    pub read_only: bool,
    /// Where to write the JSON run summary, if anywhere.
    pub output: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::from_lookup(|_| None)
    }
}

impl Config {
    /// Load the configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|var| std::env::var(var).ok())
    }

    /// Load the configuration from an arbitrary key/value source.
    ///
    /// Empty values count as absent. Integers which fail to parse, or fall below the field's
    /// minimum, are replaced with the default. Ratios which fail to parse are replaced with the
    /// default; finite ratios outside of `[0, 1]` are clamped.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let source = Source(lookup);

        Self {
            base_url: source.string(vars::BASE_URL, DEFAULT_BASE_URL),
            path_pattern: source.string(vars::PATH_PATTERN, DEFAULT_PATH_PATTERN),
            duration: source.duration(vars::DURATION, DEFAULT_DURATION),
            rate: source.number(vars::RATE, nonzero(DEFAULT_RATE), |_| true),
            vus: source.number(vars::VUS, DEFAULT_VUS, |v| (1..=MAX_VUS).contains(v)),
            read_ratio: source.ratio(vars::READ_RATIO, DEFAULT_READ_RATIO),
            keys: source.number(vars::KEYS, DEFAULT_KEYS, |v| *v >= 1),
            value_size: source.number(vars::VALUE_SIZE, DEFAULT_VALUE_SIZE, |_| true),
            ttl_ratio: source.ratio(vars::TTL_RATIO, DEFAULT_TTL_RATIO),
            ttl_ms: source.number(vars::TTL_MS, DEFAULT_TTL_MS, |_| true),
            timeout: source.duration(vars::TIMEOUT, DEFAULT_TIMEOUT),
            graceful_stop: source.duration(vars::GRACEFUL_STOP, DEFAULT_GRACEFUL_STOP),
            name: source.string(vars::SCENARIO, DEFAULT_SCENARIO_NAME),
            read_only: source.flag(vars::READ_ONLY),
            output: source.value(vars::OUTPUT).map(PathBuf::from),
        }
    }

    /// Upper bound of the worker pool.
    pub fn max_vus(&self) -> usize {
        self.vus.saturating_mul(MAX_VUS_FACTOR)
    }

    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    /// Request path for `key`. Only the first placeholder is substituted.
    pub fn path_for(&self, key: &str) -> String {
        self.path_pattern.replacen(KEY_PLACEHOLDER, key, 1)
    }

    pub fn url_for(&self, key: &str) -> String {
        format!("{}{}", self.base_url, self.path_for(key))
    }
}

fn nonzero(value: u32) -> NonZeroU32 {
    NonZeroU32::new(value).unwrap_or(NonZeroU32::MIN)
}

struct Source<F>(F);

impl<F> Source<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn value(&self, var: &str) -> Option<String> {
        (self.0)(var)
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
    }

    fn string(&self, var: &str, default: &str) -> String {
        self.value(var).unwrap_or_else(|| default.to_string())
    }

    fn number<T>(&self, var: &str, default: T, accept: impl Fn(&T) -> bool) -> T
    where
        T: FromStr + Display,
    {
        let Some(raw) = self.value(var) else {
            return default;
        };

        match raw.parse::<T>() {
            Ok(v) if accept(&v) => v,
            _ => {
                debug!("{var}={raw:?} is not usable, falling back to {default}");
                default
            }
        }
    }

    fn ratio(&self, var: &str, default: f64) -> f64 {
        let Some(raw) = self.value(var) else {
            return default;
        };

        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => v.clamp(0., 1.),
            _ => {
                debug!("{var}={raw:?} is not a ratio, falling back to {default}");
                default
            }
        }
    }

    fn duration(&self, var: &str, default: Duration) -> Duration {
        let Some(raw) = self.value(var) else {
            return default;
        };

        if let Ok(dur) = humantime::parse_duration(&raw) {
            return dur;
        }

        // NOTE: A bare number is taken as seconds
        match raw.parse::<u64>() {
            Ok(secs) => Duration::from_secs(secs),
            Err(_) => {
                debug!(
                    "{var}={raw:?} is not a duration, falling back to {}",
                    humantime::format_duration(default)
                );
                default
            }
        }
    }

    fn flag(&self, var: &str) -> bool {
        self.value(var)
            .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(false)
    }
}
