use std::sync::{Arc, OnceLock};
use crate::core::status::{AuthStatus, Flow, StatusChannel};
use crate::platform::CapabilityQuery;

/// Startup check for the platform credential capability. The answer is
/// computed once and cached for the rest of the session.
pub struct CapabilityProbe {
    query: Arc<dyn CapabilityQuery>,
    result: OnceLock<bool>,
}

impl CapabilityProbe {
    pub fn new(query: Arc<dyn CapabilityQuery>) -> Self {
        Self { query, result: OnceLock::new() }
    }

    /// Returns whether the capability is present. Only the first call
    /// queries the host and may write `Unsupported`; later calls are no-ops.
    pub fn run(&self, status: &StatusChannel) -> bool {
        let mut first = false;
        let available = *self.result.get_or_init(|| {
            first = true;
            self.query.public_key_credential_available()
        });

        if first {
            if available {
                tracing::info!("Platform credential capability present");
            } else {
                tracing::warn!("Platform credential capability absent");
                status.publish(Flow::Credential, AuthStatus::Unsupported);
            }
        }

        available
    }

    /// Cached result, `None` before the probe has run.
    pub fn cached(&self) -> Option<bool> {
        self.result.get().copied()
    }
}
