//! Platform credential ceremony.
//!
//! Each invocation walks `Idle -> CapabilityCheck -> ChallengeGenerated ->
//! CeremonyInFlight -> {Succeeded | Failed}` from scratch. Nothing survives
//! between invocations: the challenge is moved into the request, the
//! returned credential is dropped after its presence is checked.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::common::cancel::CancelToken;
use crate::common::config::Config;
use crate::common::error::{AuthError, Result};
use crate::core::challenge::{Challenge, SecureRandom};
use crate::core::status::{AuthStatus, FailureReason, Flow, StatusChannel};
use crate::platform::{CapabilityQuery, CredentialApi, CredentialCreationOptions, PlatformError};

/// Sent in the request and enforced locally. Not configurable.
pub const CEREMONY_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CeremonyState {
    Idle,
    CapabilityCheck,
    ChallengeGenerated,
    CeremonyInFlight,
    Succeeded,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CeremonyOutcome {
    Succeeded,
    Unsupported,
    NoCredential,
    Error(String),
}

/// Outcome of one invocation plus the states it passed through.
#[derive(Debug, Clone)]
pub struct CeremonyReport {
    pub outcome: CeremonyOutcome,
    pub trace: Vec<CeremonyState>,
}

pub struct CredentialCeremony {
    config: Arc<Config>,
    capability: Arc<dyn CapabilityQuery>,
    api: Arc<dyn CredentialApi>,
    rng: Arc<dyn SecureRandom>,
    in_flight: AtomicBool,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl CredentialCeremony {
    pub fn new(
        config: Arc<Config>,
        capability: Arc<dyn CapabilityQuery>,
        api: Arc<dyn CredentialApi>,
        rng: Arc<dyn SecureRandom>,
    ) -> Self {
        Self { config, capability, api, rng, in_flight: AtomicBool::new(false) }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// Runs one ceremony. Every platform failure is converted into a status
    /// write here; the only error returned is `Busy` when a ceremony is
    /// already in flight, in which case no status is written.
    pub async fn run(&self, status: &StatusChannel, cancel: &CancelToken) -> Result<CeremonyReport> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(AuthError::Busy("credential"));
        }
        let _guard = InFlightGuard(&self.in_flight);

        let mut trace = vec![CeremonyState::Idle];

        trace.push(CeremonyState::CapabilityCheck);
        if !self.capability.public_key_credential_available() {
            tracing::warn!("Ceremony requested without platform capability");
            trace.push(CeremonyState::Failed);
            status.publish(Flow::Credential, AuthStatus::Failed(FailureReason::Unsupported));
            return Ok(CeremonyReport { outcome: CeremonyOutcome::Unsupported, trace });
        }

        let challenge = Challenge::generate(self.rng.as_ref());
        trace.push(CeremonyState::ChallengeGenerated);
        let options = CredentialCreationOptions::new(challenge, &self.config);

        trace.push(CeremonyState::CeremonyInFlight);
        tracing::info!(
            rp = %options.rp.name,
            timeout_ms = options.timeout,
            "Starting platform credential ceremony"
        );
        let result = self.create_bounded(options, cancel).await;

        let outcome = match result {
            Ok(Some(_credential)) => {
                tracing::info!("Platform ceremony returned a credential");
                status.publish(Flow::Credential, AuthStatus::Success);
                CeremonyOutcome::Succeeded
            }
            Ok(None) => {
                tracing::warn!("Platform ceremony returned no credential");
                status.publish(Flow::Credential, AuthStatus::Failed(FailureReason::NoCredential));
                CeremonyOutcome::NoCredential
            }
            Err(platform_err) => {
                let name = platform_err.name.clone();
                let err = AuthError::from(platform_err);
                tracing::warn!(error_name = %name, "Platform ceremony failed: {:?}", err);
                let message = err.user_message();
                status.publish(
                    Flow::Credential,
                    AuthStatus::Failed(FailureReason::CeremonyError(message.clone())),
                );
                CeremonyOutcome::Error(message)
            }
        };

        trace.push(match outcome {
            CeremonyOutcome::Succeeded => CeremonyState::Succeeded,
            _ => CeremonyState::Failed,
        });

        Ok(CeremonyReport { outcome, trace })
    }

    /// The platform call, bounded by the request timeout and by cancellation.
    async fn create_bounded(
        &self,
        options: CredentialCreationOptions,
        cancel: &CancelToken,
    ) -> std::result::Result<Option<crate::platform::CredentialHandle>, PlatformError> {
        tokio::select! {
            result = tokio::time::timeout(CEREMONY_TIMEOUT, self.api.create(options)) => {
                result.unwrap_or_else(|_| Err(PlatformError::timed_out()))
            }
            _ = cancel.cancelled() => Err(PlatformError::aborted()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::challenge::CHALLENGE_LEN;
    use crate::core::testing::{CountingRandom, StubCapability, StubCredentialApi};
    use std::time::Duration;

    fn ceremony(
        available: bool,
        api: Arc<StubCredentialApi>,
        rng: Arc<CountingRandom>,
        config: Config,
    ) -> CredentialCeremony {
        CredentialCeremony::new(Arc::new(config), Arc::new(StubCapability::new(available)), api, rng)
    }

    #[tokio::test]
    async fn unsupported_short_circuits_without_challenge() {
        let rng = Arc::new(CountingRandom::new());
        let api = Arc::new(StubCredentialApi::returning_credential());
        let c = ceremony(false, api.clone(), rng.clone(), Config::default());
        let status = StatusChannel::new();

        let report = c.run(&status, &CancelToken::new()).await.unwrap();

        assert_eq!(report.outcome, CeremonyOutcome::Unsupported);
        assert_eq!(
            report.trace,
            vec![CeremonyState::Idle, CeremonyState::CapabilityCheck, CeremonyState::Failed]
        );
        assert_eq!(rng.draws(), 0);
        assert_eq!(api.calls(), 0);
        assert_eq!(status.message(), "WebAuthn is not supported on this device.");
    }

    #[tokio::test]
    async fn success_path_has_no_failed_state() {
        let rng = Arc::new(CountingRandom::new());
        let api = Arc::new(StubCredentialApi::returning_credential());
        let c = ceremony(true, api.clone(), rng.clone(), Config::default());
        let status = StatusChannel::new();
        let mut rx = status.subscribe();

        let report = c.run(&status, &CancelToken::new()).await.unwrap();

        assert_eq!(report.outcome, CeremonyOutcome::Succeeded);
        assert_eq!(
            report.trace,
            vec![
                CeremonyState::Idle,
                CeremonyState::CapabilityCheck,
                CeremonyState::ChallengeGenerated,
                CeremonyState::CeremonyInFlight,
                CeremonyState::Succeeded,
            ]
        );
        assert!(!report.trace.contains(&CeremonyState::Failed));
        assert_eq!(status.current(), AuthStatus::Success);
        // Exactly one write: Idle straight to Success.
        assert_eq!(rx.borrow_and_update().latest.seq, 1);
    }

    #[tokio::test]
    async fn request_carries_fixed_policy() {
        let rng = Arc::new(CountingRandom::new());
        let api = Arc::new(StubCredentialApi::returning_credential());
        let c = ceremony(true, api.clone(), rng, Config::default());

        c.run(&StatusChannel::new(), &CancelToken::new()).await.unwrap();

        let request = api.last_request().unwrap();
        // 32 bytes as unpadded base64url.
        let challenge = request["challenge"].as_str().unwrap();
        assert_eq!(challenge.len(), (CHALLENGE_LEN * 4 + 2) / 3);
        assert!(challenge.chars().all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
        assert_eq!(request["user"]["id"].as_str().unwrap().len(), 22);
        assert_eq!(request["pubKeyCredParams"][0]["alg"], -7);
        assert_eq!(request["authenticatorSelection"]["authenticatorAttachment"], "platform");
        assert_eq!(request["authenticatorSelection"]["requireResidentKey"], false);
        assert_eq!(request["authenticatorSelection"]["userVerification"], "required");
        assert_eq!(request["timeout"], 60000);
        assert_eq!(request["attestation"], "none");
        assert!(request["rp"].get("id").is_none());
    }

    #[tokio::test]
    async fn null_credential_is_authentication_failed() {
        let api = Arc::new(StubCredentialApi::returning_none());
        let c = ceremony(true, api, Arc::new(CountingRandom::new()), Config::default());
        let status = StatusChannel::new();

        let report = c.run(&status, &CancelToken::new()).await.unwrap();

        assert_eq!(report.outcome, CeremonyOutcome::NoCredential);
        assert_eq!(status.message(), "Authentication failed.");
    }

    #[tokio::test]
    async fn thrown_error_is_prefixed() {
        let api = Arc::new(StubCredentialApi::failing(PlatformError::message("NotAllowedError")));
        let c = ceremony(true, api, Arc::new(CountingRandom::new()), Config::default());
        let status = StatusChannel::new();

        c.run(&status, &CancelToken::new()).await.unwrap();

        let message = status.message();
        assert!(message.starts_with("Authentication error: "));
        assert!(message.contains("NotAllowedError"));
    }

    #[tokio::test]
    async fn fresh_challenge_each_invocation_and_no_accumulation() {
        let rng = Arc::new(CountingRandom::new());
        let api = Arc::new(StubCredentialApi::returning_credential());
        let c = ceremony(true, api.clone(), rng.clone(), Config::default());
        let status = StatusChannel::new();

        let mut challenges = Vec::new();
        for _ in 0..5 {
            let report = c.run(&status, &CancelToken::new()).await.unwrap();
            assert_eq!(report.trace.first(), Some(&CeremonyState::Idle));
            assert_eq!(report.trace.len(), 5);
            challenges.push(api.last_challenge().unwrap());
        }

        assert_eq!(rng.draws(), 5);
        for (i, a) in challenges.iter().enumerate() {
            for b in &challenges[i + 1..] {
                assert_ne!(a, b);
            }
        }
        assert!(!c.is_in_flight());
    }

    #[tokio::test]
    async fn rearms_after_failure() {
        let api = Arc::new(StubCredentialApi::failing(PlatformError::timed_out()));
        let c = ceremony(true, api.clone(), Arc::new(CountingRandom::new()), Config::default());
        let status = StatusChannel::new();

        c.run(&status, &CancelToken::new()).await.unwrap();
        assert!(status.current().is_failed());

        api.set_response(Ok(true));
        let report = c.run(&status, &CancelToken::new()).await.unwrap();
        assert_eq!(report.outcome, CeremonyOutcome::Succeeded);
        assert_eq!(status.current(), AuthStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_after_sixty_seconds() {
        let api = Arc::new(StubCredentialApi::hanging());
        let c = ceremony(true, api, Arc::new(CountingRandom::new()), Config::default());
        let status = StatusChannel::new();

        let started = tokio::time::Instant::now();
        let report = c.run(&status, &CancelToken::new()).await.unwrap();
        let elapsed = started.elapsed();

        assert!(elapsed >= CEREMONY_TIMEOUT && elapsed < CEREMONY_TIMEOUT + Duration::from_secs(1));
        assert_eq!(
            report.outcome,
            CeremonyOutcome::Error("The operation either timed out or was not allowed.".into())
        );
        assert!(status.message().starts_with("Authentication error: "));
    }

    #[tokio::test]
    async fn cancellation_aborts_in_flight_ceremony() {
        let api = Arc::new(StubCredentialApi::hanging());
        let c = Arc::new(ceremony(true, api, Arc::new(CountingRandom::new()), Config::default()));
        let status = Arc::new(StatusChannel::new());
        let cancel = CancelToken::new();

        let task = {
            let (c, status, cancel) = (c.clone(), status.clone(), cancel.clone());
            tokio::spawn(async move { c.run(&status, &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        cancel.cancel();

        let report = task.await.unwrap().unwrap();
        assert_eq!(report.outcome, CeremonyOutcome::Error("The operation was aborted.".into()));
    }

    #[tokio::test]
    async fn overlapping_trigger_is_busy() {
        let api = Arc::new(StubCredentialApi::hanging());
        let c = Arc::new(ceremony(true, api, Arc::new(CountingRandom::new()), Config::default()));
        let status = Arc::new(StatusChannel::new());
        let cancel = CancelToken::new();

        let first = {
            let (c, status, cancel) = (c.clone(), status.clone(), cancel.clone());
            tokio::spawn(async move { c.run(&status, &cancel).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        let second = c.run(&status, &cancel).await;
        assert!(matches!(second, Err(AuthError::Busy(_))));
        assert_eq!(status.snapshot().latest.seq, 0);

        cancel.cancel();
        first.await.unwrap().unwrap();
        assert!(!c.is_in_flight());
    }
}
