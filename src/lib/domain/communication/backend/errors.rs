//! Delivery errors

use std::io;

use thiserror::Error;

/// The email could not be mapped onto the provider's request schema.
/// Nothing has been sent when this is returned.
#[derive(Debug, Error)]
pub enum TranslationError {
    /// The template variables do not follow the provider's convention
    #[error("invalid template context for {provider}: {reason}")]
    TemplateContext {
        /// Provider name
        provider: &'static str,

        /// What is wrong with the context
        reason: String,
    },

    /// An attachment's data source could not be read
    #[error("failed to read {name} attachment: {source}")]
    AttachmentRead {
        /// Attachment file name
        name: String,

        /// The underlying I/O error
        source: io::Error,
    },
}

/// An error decoded from a provider's non-200 response
#[derive(Clone, Debug, Error, PartialEq, Eq)]
#[error("{} - {}", headline(.status, .code, .name), .message)]
pub struct ProviderError {
    /// Provider name
    pub provider: &'static str,

    /// HTTP status code of the response
    pub http_status: u16,

    /// Provider status, e.g. `error`
    pub status: String,

    /// Provider error code or message identifier
    pub code: Option<String>,

    /// Provider error name
    pub name: Option<String>,

    /// Human readable message
    pub message: String,
}

/// `<code> <name>`, falling back to the status when there is no code
fn headline(status: &str, code: &Option<String>, name: &Option<String>) -> String {
    let code = code
        .as_deref()
        .filter(|code| !code.is_empty())
        .unwrap_or(status);

    match name.as_deref().filter(|name| !name.is_empty()) {
        Some(name) => format!("{code} {name}"),
        None => code.to_string(),
    }
}

/// Errors returned by [`Backend::send`](super::Backend::send)
#[derive(Debug, Error)]
pub enum BackendError {
    /// The email could not be translated into a provider request
    #[error(transparent)]
    Translation(#[from] TranslationError),

    /// The provider request could not be encoded
    #[error("failed to encode payload: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The HTTP call itself failed
    #[error("failed to post to {provider}: {source:#}")]
    Transport {
        /// Provider name
        provider: &'static str,

        /// The transport failure
        source: anyhow::Error,
    },

    /// The provider answered with an error
    #[error(transparent)]
    Rejected(ProviderError),

    /// The provider answered with a non-200 status and an unreadable body
    #[error("received {status} from {provider} and couldn't decode error payload: {source}")]
    UndecodableErrorBody {
        /// Provider name
        provider: &'static str,

        /// HTTP status code of the response
        status: u16,

        /// The decoding failure
        source: serde_json::Error,
    },
}

impl From<ProviderError> for BackendError {
    fn from(err: ProviderError) -> Self {
        BackendError::Rejected(err)
    }
}
