//! HTTP transport backed by reqwest

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::Parser;
use reqwest::{header::CONTENT_TYPE, Client};
use tracing::debug;

use crate::domain::communication::transport::{HttpResponse, HttpTransport};

/// Configuration for the outgoing HTTP client
#[derive(Debug, Clone, PartialEq, Eq, Parser)]
pub struct HttpClientConfig {
    /// Request timeout, in seconds
    #[arg(long = "http-timeout", env = "EGO_HTTP_TIMEOUT", default_value = "30")]
    pub timeout: u64,

    /// User agent sent with every request
    #[arg(
        long = "http-user-agent",
        env = "EGO_HTTP_USER_AGENT",
        default_value = concat!("ego/", env!("CARGO_PKG_VERSION"))
    )]
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout: 30,
            user_agent: concat!("ego/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// [`HttpTransport`] implementation using a shared [`reqwest::Client`]
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Builds a transport from `config`
    pub fn new(config: &HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout))
            .user_agent(config.user_agent.as_str())
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self { client })
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> Result<HttpResponse> {
        debug!(url, content_type, size = body.len(), "POST");

        let response = self
            .client
            .post(url)
            .header(CONTENT_TYPE, content_type)
            .body(body)
            .send()
            .await
            .with_context(|| format!("POST {url}"))?;

        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("failed to read response body from {url}"))?;

        debug!(url, status, "response received");

        Ok(HttpResponse::new(status, body.to_vec()))
    }
}
