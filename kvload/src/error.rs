use crate::transport::TransportError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Key universe is empty.")]
    EmptyKeyUniverse,

    #[error("Failed to encode the write body: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to set up the HTTP transport: {0}")]
    Transport(#[from] TransportError),
}

#[derive(Debug, Error)]
pub enum SummaryError {
    #[error("Failed to encode the run summary: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("Failed to write the run summary to {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
