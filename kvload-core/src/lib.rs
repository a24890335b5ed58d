mod config;
mod constants;
mod keys;
mod outcome;
mod stats;
pub mod thresholds;

pub use config::*;
pub use constants::*;
pub use keys::*;
pub use outcome::*;
pub use stats::*;
pub use thresholds::{default_thresholds, Threshold, ThresholdResult};
