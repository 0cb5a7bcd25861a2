//! HTTP transport port used by the provider backends

use anyhow::Result;
use async_trait::async_trait;

#[cfg(test)]
use mockall::mock;

/// Content type of JSON request bodies
pub const JSON_CONTENT_TYPE: &str = "application/json";

/// Content type of form-encoded request bodies
pub const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";

/// A fully read HTTP response
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,

    /// Response body
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Creates a response from a status code and body
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Performs a single HTTP POST
#[async_trait]
pub trait HttpTransport: Send + Sync + 'static {
    /// Posts `body` to `url` and reads the whole response.
    ///
    /// Any status code is a successful transport; only connection level
    /// failures are errors.
    async fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> Result<HttpResponse>;
}

#[cfg(test)]
mock! {
    pub HttpTransport {}

    #[async_trait]
    impl HttpTransport for HttpTransport {
        async fn post(&self, url: &str, content_type: &str, body: Vec<u8>) -> Result<HttpResponse>;
    }
}
