//! Local authenticators for hosts without a platform credential stack.

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::sync::atomic::{AtomicBool, Ordering};

use super::options::{CredentialCreationOptions, COSE_ALG_ES256};
use super::{CapabilityQuery, CredentialApi, CredentialHandle, PlatformError};

type HmacSha256 = Hmac<Sha256>;

/// Development stand-in for a platform authenticator. Honours the request
/// policy and derives a credential id from the challenge; there is no key
/// pair and no attestation.
pub struct SoftwareAuthenticator {
    secret: Vec<u8>,
    user_present: AtomicBool,
}

impl SoftwareAuthenticator {
    pub fn new(secret: Vec<u8>) -> Self {
        Self { secret, user_present: AtomicBool::new(true) }
    }

    /// Simulate the user refusing (or failing) verification.
    pub fn set_user_present(&self, present: bool) {
        self.user_present.store(present, Ordering::SeqCst);
    }

    fn credential_id(&self, options: &CredentialCreationOptions) -> Result<Vec<u8>, PlatformError> {
        let mut mac = HmacSha256::new_from_slice(&self.secret)
            .map_err(|e| PlatformError::new("UnknownError", e.to_string()))?;
        mac.update(options.challenge.as_bytes());
        mac.update(options.user.name.as_bytes());
        Ok(mac.finalize().into_bytes().to_vec())
    }
}

impl CapabilityQuery for SoftwareAuthenticator {
    fn public_key_credential_available(&self) -> bool {
        true
    }
}

#[async_trait]
impl CredentialApi for SoftwareAuthenticator {
    async fn create(
        &self,
        options: CredentialCreationOptions,
    ) -> Result<Option<CredentialHandle>, PlatformError> {
        if !options.pub_key_cred_params.iter().any(|p| p.alg == COSE_ALG_ES256) {
            return Err(PlatformError::not_supported(
                "None of the requested algorithms are supported.",
            ));
        }

        if !options.is_platform_attachment() {
            return Err(PlatformError::not_supported("Only platform attachment is available."));
        }

        if !self.user_present.load(Ordering::SeqCst) {
            tracing::debug!("Software authenticator: user verification refused");
            return Err(PlatformError::not_allowed(
                "The operation either timed out or was not allowed.",
            ));
        }

        let raw_id = self.credential_id(&options)?;
        tracing::debug!("Software authenticator created credential ({} byte id)", raw_id.len());
        Ok(Some(CredentialHandle { raw_id }))
    }
}

/// Host without any platform credential support.
pub struct UnavailableAuthenticator;

impl CapabilityQuery for UnavailableAuthenticator {
    fn public_key_credential_available(&self) -> bool {
        false
    }
}

#[async_trait]
impl CredentialApi for UnavailableAuthenticator {
    async fn create(
        &self,
        _options: CredentialCreationOptions,
    ) -> Result<Option<CredentialHandle>, PlatformError> {
        Err(PlatformError::not_supported("No platform authenticator is available."))
    }
}
