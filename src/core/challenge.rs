use base64urlsafedata::Base64UrlSafeData;
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Serialize, Serializer};

pub const CHALLENGE_LEN: usize = 32;

/// Source of cryptographically strong bytes. Synchronous and infallible.
pub trait SecureRandom: Send + Sync {
    fn fill(&self, dest: &mut [u8]);
}

/// Operating-system CSPRNG.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsRandom;

impl SecureRandom for OsRandom {
    fn fill(&self, dest: &mut [u8]) {
        OsRng.fill_bytes(dest);
    }
}

/// One-time ceremony challenge. Deliberately not `Clone`: it is drawn per
/// invocation, moved into the request and dropped with it.
#[derive(PartialEq, Eq)]
pub struct Challenge([u8; CHALLENGE_LEN]);

impl Challenge {
    pub fn generate(rng: &dyn SecureRandom) -> Self {
        let mut bytes = [0u8; CHALLENGE_LEN];
        rng.fill(&mut bytes);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    #[cfg(test)]
    pub(crate) fn from_bytes(bytes: [u8; CHALLENGE_LEN]) -> Self {
        Self(bytes)
    }
}

impl Serialize for Challenge {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        Base64UrlSafeData::from(self.0.to_vec()).serialize(serializer)
    }
}

impl std::fmt::Debug for Challenge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Challenge([{} bytes])", CHALLENGE_LEN)
    }
}
