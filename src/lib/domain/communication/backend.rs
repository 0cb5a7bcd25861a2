//! Delivery backend contract

use async_trait::async_trait;

#[cfg(test)]
use mockall::mock;

use crate::domain::communication::email::Email;

mod errors;

pub use errors::{BackendError, ProviderError, TranslationError};

/// Delivers emails through one provider
#[async_trait]
pub trait Backend: Send + Sync {
    /// Attempts to deliver `email` exactly once.
    ///
    /// The email is left untouched except for its attachment data sources,
    /// which are read to the end while the provider request is built.
    ///
    /// # Arguments
    /// * `email` - The [`Email`] to deliver.
    ///
    /// # Returns
    /// - [`Ok`] once the provider accepted the email.
    /// - [`Err`] containing a [`BackendError`] describing the first failure.
    async fn send(&self, email: &mut Email) -> Result<(), BackendError>;

    /// Name of the provider, used in logs and errors
    fn name(&self) -> &'static str;
}

#[cfg(test)]
mock! {
    pub Backend {}

    #[async_trait]
    impl Backend for Backend {
        async fn send(&self, email: &mut Email) -> Result<(), BackendError>;
        fn name(&self) -> &'static str;
    }
}
