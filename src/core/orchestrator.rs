//! Wires the capability probe, model loader, credential ceremony and camera
//! session around one [`StatusChannel`].
//!
//! The two user flows never wait on each other. Each has its own slot on
//! the status board; the single `latest` field is last-write-wins, so a
//! camera start that lands after a ceremony result replaces it there (and
//! vice versa) while both slots keep their own outcome.

use std::sync::Arc;

use crate::assets::ModelAssetService;
use crate::camera::{CameraAccess, DisplaySink, StreamConstraints};
use crate::common::cancel::CancelToken;
use crate::common::config::Config;
use crate::common::error::{AuthError, Result};
use crate::core::camera_session::{CameraOutcome, CameraSession};
use crate::core::capability::CapabilityProbe;
use crate::core::ceremony::{CeremonyReport, CredentialCeremony};
use crate::core::challenge::{OsRandom, SecureRandom};
use crate::core::models::{ModelLoader, ModelReadiness};
use crate::core::status::StatusChannel;
use crate::platform::{CapabilityQuery, CredentialApi};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MountReport {
    pub credential_supported: bool,
    pub models: ModelReadiness,
}

pub struct AuthOrchestrator {
    status: StatusChannel,
    probe: CapabilityProbe,
    models: Arc<ModelLoader>,
    ceremony: CredentialCeremony,
    camera: CameraSession,
    shutdown: CancelToken,
}

impl AuthOrchestrator {
    pub fn builder(config: Config) -> AuthOrchestratorBuilder {
        AuthOrchestratorBuilder::new(config)
    }

    pub fn status(&self) -> &StatusChannel {
        &self.status
    }

    pub fn models(&self) -> ModelReadiness {
        self.models.readiness()
    }

    /// Startup: capability probe and model load run concurrently. Both are
    /// once-per-session; a second mount returns the settled results.
    pub async fn mount(&self) -> MountReport {
        let probe = async { self.probe.run(&self.status) };
        let models = self.models.load(&self.status, &self.shutdown);
        let (credential_supported, models) = tokio::join!(probe, models);
        MountReport { credential_supported, models }
    }

    /// Fingerprint/face via the platform authenticator.
    pub async fn authenticate_fingerprint(&self) -> Result<CeremonyReport> {
        self.ensure_mounted()?;
        self.ceremony.run(&self.status, &self.shutdown).await
    }

    /// Camera-based face session.
    pub async fn start_face_recognition(&self) -> Result<CameraOutcome> {
        self.ensure_mounted()?;
        self.camera.start(&self.status, &self.shutdown).await
    }

    pub fn stop_face_recognition(&self) -> bool {
        self.camera.stop()
    }

    /// Teardown: aborts anything in flight and releases the camera.
    pub fn unmount(&self) {
        tracing::info!("Unmounting authentication surface");
        self.shutdown.cancel();
        self.camera.stop();
    }

    fn ensure_mounted(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(AuthError::Cancelled);
        }
        Ok(())
    }
}

impl Drop for AuthOrchestrator {
    fn drop(&mut self) {
        self.shutdown.cancel();
        self.camera.stop();
    }
}

pub struct AuthOrchestratorBuilder {
    config: Config,
    capability: Option<Arc<dyn CapabilityQuery>>,
    credentials: Option<Arc<dyn CredentialApi>>,
    rng: Arc<dyn SecureRandom>,
    camera: Option<Arc<dyn CameraAccess>>,
    sink: Option<Arc<dyn DisplaySink>>,
    models: Option<Arc<dyn ModelAssetService>>,
}

impl AuthOrchestratorBuilder {
    fn new(config: Config) -> Self {
        Self {
            config,
            capability: None,
            credentials: None,
            rng: Arc::new(OsRandom),
            camera: None,
            sink: None,
            models: None,
        }
    }

    pub fn capability(mut self, query: Arc<dyn CapabilityQuery>) -> Self {
        self.capability = Some(query);
        self
    }

    pub fn credentials(mut self, api: Arc<dyn CredentialApi>) -> Self {
        self.credentials = Some(api);
        self
    }

    pub fn random(mut self, rng: Arc<dyn SecureRandom>) -> Self {
        self.rng = rng;
        self
    }

    pub fn camera(mut self, camera: Arc<dyn CameraAccess>) -> Self {
        self.camera = Some(camera);
        self
    }

    pub fn sink(mut self, sink: Arc<dyn DisplaySink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn models(mut self, service: Arc<dyn ModelAssetService>) -> Self {
        self.models = Some(service);
        self
    }

    pub fn build(self) -> Result<AuthOrchestrator> {
        let missing = |what: &str| AuthError::Config(format!("orchestrator needs a {}", what));

        self.config.validate()?;
        let capability = self.capability.ok_or_else(|| missing("capability query"))?;
        let credentials = self.credentials.ok_or_else(|| missing("credential api"))?;
        let camera = self.camera.ok_or_else(|| missing("camera"))?;
        let sink = self.sink.ok_or_else(|| missing("display sink"))?;
        let service = self.models.ok_or_else(|| missing("model service"))?;

        let config = Arc::new(self.config);
        let models = Arc::new(ModelLoader::new(service, config.models.base_location.clone()));

        let constraints = StreamConstraints {
            device_index: Some(config.camera.device_index),
            width: config.camera.width,
            height: config.camera.height,
        };
        let mut camera = CameraSession::new(camera, sink, constraints);
        if config.face.require_models {
            camera = camera.gated_on(models.clone());
        }

        Ok(AuthOrchestrator {
            status: StatusChannel::new(),
            probe: CapabilityProbe::new(capability.clone()),
            models,
            ceremony: CredentialCeremony::new(config.clone(), capability, credentials, self.rng),
            camera,
            shutdown: CancelToken::new(),
        })
    }
}
