//! `PURGE` requests over HTTP.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Method, Url, redirect::Policy};
use tracing::debug;

use crate::cache::{PurgeClient, PurgeError, classify_status};

use super::error::InfraError;

/// [`PurgeClient`] backed by `reqwest`.
///
/// Redirects are never followed: the proxy's answer to the purge itself is
/// what counts.
#[derive(Clone, Debug)]
pub struct HttpPurgeClient {
    client: Client,
    method: Method,
}

impl HttpPurgeClient {
    pub fn new(timeout: Duration) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .redirect(Policy::none())
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        let method = Method::from_bytes(b"PURGE")
            .map_err(|err| InfraError::http_client(err.to_string()))?;
        Ok(Self { client, method })
    }

    pub fn user_agent() -> &'static str {
        concat!("purgelink/", env!("CARGO_PKG_VERSION"))
    }
}

#[async_trait]
impl PurgeClient for HttpPurgeClient {
    async fn purge(&self, url: &str) -> Result<(), PurgeError> {
        let target = Url::parse(url).map_err(|err| PurgeError::invalid_url(url, err.to_string()))?;

        let response = self
            .client
            .request(self.method.clone(), target)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    PurgeError::Timeout
                } else {
                    PurgeError::transport(err.to_string())
                }
            })?;

        let status = response.status().as_u16();
        debug!(url, status, "Proxy answered purge");
        classify_status(status)
    }
}
