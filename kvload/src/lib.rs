#![cfg_attr(docsrs, feature(doc_cfg))]
#![doc = include_str!("../README.md")]

pub mod driver;
pub mod error;
pub mod scenario;
pub mod summary;
#[doc(hidden)]
pub mod transaction;
pub mod transport;

pub(crate) mod aggregate;
pub(crate) mod measurement;
pub(crate) mod recorder;
pub(crate) mod timer;

pub use driver::{Driver, RequestPlan};
pub use error::{DriverError, SummaryError};
pub use kvload_core as core;
pub use scenario::{Scenario, ScenarioConfig};
pub use transport::{HttpTransport, LocalTransport, Response, Transport, TransportError};

pub mod prelude {
    pub use crate::driver::Driver;
    pub use crate::scenario::{ConfigurableScenario, Scenario, ScenarioConfig};

    pub use kvload_core::{Config, RequestOutcome, RunStatistics, Threshold};
}
