//! Platform public-key credential capability: the presence probe and the
//! credential-creation ceremony itself.

pub mod options;
pub mod software;

use async_trait::async_trait;
use thiserror::Error;
use crate::common::error::AuthError;

pub use options::CredentialCreationOptions;
pub use software::{SoftwareAuthenticator, UnavailableAuthenticator};

/// Boolean probe for a platform credential capability, injected so that no
/// code consults host globals directly.
pub trait CapabilityQuery: Send + Sync {
    fn public_key_credential_available(&self) -> bool;
}

/// Opaque outcome of a successful creation. Only its presence is inspected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialHandle {
    pub raw_id: Vec<u8>,
}

/// Error raised by the platform, named the way WebAuthn names DOMExceptions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct PlatformError {
    pub name: String,
    pub message: String,
}

impl PlatformError {
    pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self { name: name.into(), message: message.into() }
    }

    /// Bare error carrying only a message, with the generic `Error` name.
    pub fn message(message: impl Into<String>) -> Self {
        Self::new("Error", message)
    }

    pub fn not_allowed(message: impl Into<String>) -> Self {
        Self::new("NotAllowedError", message)
    }

    pub fn not_supported(message: impl Into<String>) -> Self {
        Self::new("NotSupportedError", message)
    }

    pub fn timed_out() -> Self {
        Self::not_allowed("The operation either timed out or was not allowed.")
    }

    pub fn aborted() -> Self {
        Self::new("AbortError", "The operation was aborted.")
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self.name.as_str(), "NotAllowedError" | "AbortError" | "TimeoutError")
    }
}

impl From<PlatformError> for AuthError {
    fn from(err: PlatformError) -> Self {
        if err.is_cancellation() {
            AuthError::CeremonyCancelledOrTimedOut(err.message)
        } else {
            AuthError::CeremonyRejected(err.message)
        }
    }
}

#[async_trait]
pub trait CredentialApi: Send + Sync {
    /// Runs the creation ceremony. `Ok(None)` is the null outcome. The
    /// options are consumed so their challenge cannot be replayed.
    async fn create(
        &self,
        options: CredentialCreationOptions,
    ) -> std::result::Result<Option<CredentialHandle>, PlatformError>;
}
