//! Creation options for the platform credential ceremony, serialized as a
//! WebAuthn `PublicKeyCredentialCreationOptions` object.
//!
//! The leaf structures come from `webauthn-rs-proto`. The top level stays
//! local: the proto `RelyingParty` always carries an `id`, and this request
//! leaves the id to the environment default.

use base64urlsafedata::Base64UrlSafeData;
use serde::Serialize;
use webauthn_rs_proto::{
    AttestationConveyancePreference, AuthenticatorAttachment, AuthenticatorSelectionCriteria,
    PubKeyCredParams, ResidentKeyRequirement, User, UserVerificationPolicy,
};

use crate::common::config::Config;
use crate::core::ceremony::CEREMONY_TIMEOUT;
use crate::core::challenge::Challenge;

/// COSE algorithm identifier for ECDSA w/ SHA-256 on P-256.
pub const COSE_ALG_ES256: i64 = -7;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialCreationOptions {
    /// Encoded as base64url on the wire.
    pub challenge: Challenge,
    pub rp: RelyingParty,
    pub user: User,
    pub pub_key_cred_params: Vec<PubKeyCredParams>,
    pub authenticator_selection: AuthenticatorSelectionCriteria,
    /// Milliseconds.
    pub timeout: u64,
    pub attestation: AttestationConveyancePreference,
}

/// Display name only.
#[derive(Debug, Clone, Serialize)]
pub struct RelyingParty {
    pub name: String,
}

/// Static placeholder identity: zeroed handle of the configured length.
pub fn placeholder_user(config: &Config) -> User {
    User {
        id: Base64UrlSafeData::from(vec![0u8; config.user.handle_len]),
        name: config.user.name.clone(),
        display_name: config.user.display_name.clone(),
    }
}

pub fn es256() -> PubKeyCredParams {
    PubKeyCredParams { type_: "public-key".to_string(), alg: COSE_ALG_ES256 }
}

impl CredentialCreationOptions {
    /// Builds the fixed ceremony request around a freshly drawn challenge.
    pub fn new(challenge: Challenge, config: &Config) -> Self {
        Self {
            challenge,
            rp: RelyingParty { name: config.relying_party.name.clone() },
            user: placeholder_user(config),
            pub_key_cred_params: vec![es256()],
            authenticator_selection: AuthenticatorSelectionCriteria {
                authenticator_attachment: Some(AuthenticatorAttachment::Platform),
                resident_key: Some(ResidentKeyRequirement::Discouraged),
                require_resident_key: false,
                user_verification: UserVerificationPolicy::Required,
            },
            timeout: CEREMONY_TIMEOUT.as_millis() as u64,
            attestation: AttestationConveyancePreference::None,
        }
    }

    pub fn is_platform_attachment(&self) -> bool {
        matches!(
            self.authenticator_selection.authenticator_attachment,
            Some(AuthenticatorAttachment::Platform)
        )
    }
}
