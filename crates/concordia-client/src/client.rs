//! Shared HTTP client for all remote concordia services.

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use tracing::info;

use concordia_core::{Error, Result};

use crate::config::ClientConfig;
use crate::error::{from_status, from_transport};

/// HTTP client implementing every remote collaborator trait.
///
/// One instance serves the operation store, history API, frequency service
/// and task feed; clone it (cheaply) to hand it to several components.
#[derive(Clone)]
pub struct ConcordiaClient {
    client: Client,
    config: ClientConfig,
}

impl ConcordiaClient {
    pub fn new(config: ClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            base_url = %config.base_url,
            timeout_secs = config.timeout_secs,
            authenticated = config.session_token.is_some(),
            "Initializing concordia client"
        );
        Ok(Self { client, config })
    }

    /// Create from environment variables.
    pub fn from_env() -> Result<Self> {
        Self::new(ClientConfig::from_env())
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Request builder with authentication applied.
    pub(crate) fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let mut req = self.client.request(method, self.config.url(path));
        if let Some(ref token) = self.config.session_token {
            req = req.bearer_auth(token);
        }
        req.header("Accept", "application/json")
    }

    pub(crate) async fn send(&self, req: RequestBuilder, context: &str) -> Result<Response> {
        let response = req.send().await.map_err(|e| from_transport(&e, context))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(from_status(status, context, &body));
        }
        Ok(response)
    }

    pub(crate) async fn send_json<T: DeserializeOwned>(
        &self,
        req: RequestBuilder,
        context: &str,
    ) -> Result<T> {
        let response = self.send(req, context).await?;
        response.json::<T>().await.map_err(|e| {
            Error::Serialization(format!("Failed to parse {} response: {}", context, e))
        })
    }

    pub(crate) async fn send_empty(&self, req: RequestBuilder, context: &str) -> Result<()> {
        self.send(req, context).await.map(|_| ())
    }
}

/// Percent-encode one path segment.
pub(crate) fn segment(raw: &str) -> String {
    urlencoding::encode(raw).into_owned()
}
