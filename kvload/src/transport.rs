//! The HTTP seam of the driver.
use crate::driver::RequestPlan;
use reqwest::header::CONTENT_TYPE;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The status arrived but the body did not. Recorded like any failure to get a response.
    #[error("{status} response body failed: {source}")]
    Body {
        status: u16,
        #[source]
        source: reqwest::Error,
    },

    #[error("{0}")]
    Other(String),
}

/// A fully received response.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Response {
    pub status: u16,
    pub body_len: u64,
}

impl From<u16> for Response {
    fn from(status: u16) -> Self {
        Self {
            status,
            body_len: 0,
        }
    }
}

/// Sends a planned request and reports the response.
///
/// Anything which keeps a response from arriving (connect errors, timeouts, a broken body) is an
/// `Err`; every status code, 5xx included, is an `Ok`.
#[trait_variant::make(Transport: Send)]
pub trait LocalTransport: Sync {
    async fn send(&self, plan: &RequestPlan) -> Result<Response, TransportError>;
}

/// [`Transport`] over a shared `reqwest` client.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for HttpTransport {
    async fn send(&self, plan: &RequestPlan) -> Result<Response, TransportError> {
        let mut request = self.client.request(plan.method(), &plan.url);
        if let Some(body) = &plan.body {
            request = request
                .header(CONTENT_TYPE, "application/json")
                .body(body.clone());
        }

        // NOTE: Errors drop the URL, otherwise every key yields a distinct error message
        let res = request.send().await.map_err(reqwest::Error::without_url)?;
        let status = res.status().as_u16();

        // NOTE: Read the body so the latency covers the whole exchange and the connection can
        // go back to the pool.
        let body = res
            .bytes()
            .await
            .map_err(|source| TransportError::Body {
                status,
                source: source.without_url(),
            })?;

        Ok(Response {
            status,
            body_len: body.len() as u64,
        })
    }
}
