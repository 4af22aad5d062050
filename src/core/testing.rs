//! Stub capabilities for unit tests.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

use crate::assets::{ModelAssetService, ModelBundle};
use crate::camera::{CameraAccess, Frame, MediaStream, StreamConstraints, VideoTrack};
use crate::common::error::{AuthError, Result};
use crate::core::challenge::{OsRandom, SecureRandom};
use crate::platform::{
    CapabilityQuery, CredentialApi, CredentialCreationOptions, CredentialHandle, PlatformError,
};

pub struct StubCapability {
    available: bool,
    calls: AtomicUsize,
}

impl StubCapability {
    pub fn new(available: bool) -> Self {
        Self { available, calls: AtomicUsize::new(0) }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl CapabilityQuery for StubCapability {
    fn public_key_credential_available(&self) -> bool {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.available
    }
}

pub struct CountingRandom {
    draws: AtomicUsize,
}

impl CountingRandom {
    pub fn new() -> Self {
        Self { draws: AtomicUsize::new(0) }
    }

    pub fn draws(&self) -> usize {
        self.draws.load(Ordering::SeqCst)
    }
}

impl SecureRandom for CountingRandom {
    fn fill(&self, dest: &mut [u8]) {
        self.draws.fetch_add(1, Ordering::SeqCst);
        OsRandom.fill(dest);
    }
}

enum StubResponse {
    Credential,
    Nothing,
    Error(PlatformError),
    Hang,
}

pub struct StubCredentialApi {
    response: Mutex<StubResponse>,
    calls: AtomicUsize,
    last_request: Mutex<Option<serde_json::Value>>,
    delay: Duration,
}

impl StubCredentialApi {
    fn with(response: StubResponse) -> Self {
        Self {
            response: Mutex::new(response),
            calls: AtomicUsize::new(0),
            last_request: Mutex::new(None),
            delay: Duration::ZERO,
        }
    }

    pub fn returning_credential() -> Self {
        Self::with(StubResponse::Credential)
    }

    pub fn returning_none() -> Self {
        Self::with(StubResponse::Nothing)
    }

    pub fn failing(err: PlatformError) -> Self {
        Self::with(StubResponse::Error(err))
    }

    pub fn hanging() -> Self {
        Self::with(StubResponse::Hang)
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// `Ok(true)` returns a credential, `Ok(false)` returns none.
    pub fn set_response(&self, response: std::result::Result<bool, PlatformError>) {
        *self.response.lock().unwrap() = match response {
            Ok(true) => StubResponse::Credential,
            Ok(false) => StubResponse::Nothing,
            Err(e) => StubResponse::Error(e),
        };
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_request(&self) -> Option<serde_json::Value> {
        self.last_request.lock().unwrap().clone()
    }

    /// The base64url challenge of the most recent request.
    pub fn last_challenge(&self) -> Option<String> {
        let request = self.last_request()?;
        request["challenge"].as_str().map(str::to_string)
    }
}

#[async_trait]
impl CredentialApi for StubCredentialApi {
    async fn create(
        &self,
        options: CredentialCreationOptions,
    ) -> std::result::Result<Option<CredentialHandle>, PlatformError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_request.lock().unwrap() = serde_json::to_value(&options).ok();

        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        let outcome = match &*self.response.lock().unwrap() {
            StubResponse::Credential => Some(Ok(Some(CredentialHandle { raw_id: vec![1, 2, 3] }))),
            StubResponse::Nothing => Some(Ok(None)),
            StubResponse::Error(e) => Some(Err(e.clone())),
            StubResponse::Hang => None,
        };

        match outcome {
            Some(result) => result,
            None => std::future::pending().await,
        }
    }
}

pub struct StubTrack {
    stopped: Arc<AtomicBool>,
}

impl StubTrack {
    pub fn new() -> (Self, Arc<AtomicBool>) {
        let stopped = Arc::new(AtomicBool::new(false));
        (Self { stopped: stopped.clone() }, stopped)
    }
}

impl VideoTrack for StubTrack {
    fn label(&self) -> &str {
        "stub camera"
    }

    fn capture(&mut self) -> Result<Frame> {
        Ok(Frame { width: 4, height: 1, fourcc: "GREY".into(), data: vec![0, 64, 128, 255] })
    }

    fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
    }
}

pub struct StubCamera {
    failure: Mutex<Option<AuthError>>,
    gate: Mutex<Option<oneshot::Receiver<()>>>,
    delay: Duration,
    requests: AtomicUsize,
    requested: Notify,
    released: Mutex<Vec<Arc<AtomicBool>>>,
}

impl StubCamera {
    fn build(failure: Option<AuthError>, gate: Option<oneshot::Receiver<()>>) -> Self {
        Self {
            failure: Mutex::new(failure),
            gate: Mutex::new(gate),
            delay: Duration::ZERO,
            requests: AtomicUsize::new(0),
            requested: Notify::new(),
            released: Mutex::new(Vec::new()),
        }
    }

    pub fn succeeding() -> Self {
        Self::build(None, None)
    }

    pub fn failing(err: AuthError) -> Self {
        Self::build(Some(err), None)
    }

    /// Camera whose permission prompt stays open until the sender fires.
    pub fn gated() -> (Self, oneshot::Sender<()>) {
        let (tx, rx) = oneshot::channel();
        (Self::build(None, Some(rx)), tx)
    }

    pub fn delayed(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    pub async fn wait_for_request(&self) {
        if self.requests() == 0 {
            self.requested.notified().await;
        }
    }

    pub fn all_released(&self) -> bool {
        let released = self.released.lock().unwrap();
        !released.is_empty() && released.iter().all(|f| f.load(Ordering::SeqCst))
    }
}

#[async_trait]
impl CameraAccess for StubCamera {
    async fn request_stream(&self, _constraints: &StreamConstraints) -> Result<MediaStream> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.requested.notify_one();

        let gate = self.gate.lock().unwrap().take();
        if let Some(gate) = gate {
            let _ = gate.await;
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }

        if let Some(err) = self.failure.lock().unwrap().take() {
            return Err(err);
        }

        let (track, stopped) = StubTrack::new();
        self.released.lock().unwrap().push(stopped);
        Ok(MediaStream::new(Box::new(track)))
    }
}

pub struct StubModelService {
    fail: Option<ModelBundle>,
    delay: Duration,
    loaded: Mutex<Vec<ModelBundle>>,
    bases: Mutex<Vec<PathBuf>>,
}

impl StubModelService {
    pub fn new() -> Self {
        Self { fail: None, delay: Duration::ZERO, loaded: Mutex::new(Vec::new()), bases: Mutex::new(Vec::new()) }
    }

    pub fn failing(bundle: ModelBundle) -> Self {
        Self { fail: Some(bundle), ..Self::new() }
    }

    pub fn with_delay(delay: Duration) -> Self {
        Self { delay, ..Self::new() }
    }

    pub fn loaded(&self) -> Vec<ModelBundle> {
        self.loaded.lock().unwrap().clone()
    }

    pub fn bases(&self) -> Vec<PathBuf> {
        self.bases.lock().unwrap().clone()
    }
}

#[async_trait]
impl ModelAssetService for StubModelService {
    async fn load_from_location(&self, bundle: ModelBundle, base: &Path) -> Result<()> {
        self.bases.lock().unwrap().push(base.to_path_buf());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.fail == Some(bundle) {
            return Err(AuthError::ModelLoadFailure {
                bundle: bundle.to_string(),
                reason: "model not found".into(),
            });
        }
        self.loaded.lock().unwrap().push(bundle);
        Ok(())
    }
}
