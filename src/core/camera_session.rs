use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

use crate::camera::{CameraAccess, DisplaySink, StreamConstraints};
use crate::common::cancel::CancelToken;
use crate::common::error::{AuthError, Result};
use crate::core::models::{ModelLoader, ModelReadiness};
use crate::core::status::{AuthStatus, FailureReason, Flow, StatusChannel};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraOutcome {
    /// The sink now owns the stream.
    Attached { stream_id: u64 },
    /// No sink to show the stream on; nothing is held.
    SinkMissing,
    /// `stop` ran before the stream reached the sink; any stream that
    /// arrived was released.
    Stopped,
    Failed(String),
}

pub struct CameraSession {
    camera: Arc<dyn CameraAccess>,
    sink: Arc<dyn DisplaySink>,
    constraints: StreamConstraints,
    models: Option<Arc<ModelLoader>>,
    in_flight: AtomicBool,
    /// Bumped by every `stop`; a start that sees it move is abandoned.
    generation: watch::Sender<u64>,
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl CameraSession {
    pub fn new(
        camera: Arc<dyn CameraAccess>,
        sink: Arc<dyn DisplaySink>,
        constraints: StreamConstraints,
    ) -> Self {
        let (generation, _) = watch::channel(0);
        Self { camera, sink, constraints, models: None, in_flight: AtomicBool::new(false), generation }
    }

    /// Hold the camera request until the face models have loaded.
    pub fn gated_on(mut self, models: Arc<ModelLoader>) -> Self {
        self.models = Some(models);
        self
    }

    pub async fn start(&self, status: &StatusChannel, cancel: &CancelToken) -> Result<CameraOutcome> {
        if self.in_flight.swap(true, Ordering::SeqCst) {
            return Err(AuthError::Busy("face"));
        }
        let _guard = InFlightGuard(&self.in_flight);
        let mut stops = self.generation.subscribe();
        let generation = *stops.borrow_and_update();

        status.publish(Flow::Face, AuthStatus::Starting);

        if !self.sink.is_mounted() {
            tracing::debug!("No display sink mounted, not requesting the camera");
            return Ok(CameraOutcome::SinkMissing);
        }

        if let Some(models) = &self.models {
            if let ModelReadiness::Failed(reason) = models.load(status, cancel).await {
                let reason = FailureReason::ModelLoad(reason);
                status.publish(Flow::Face, AuthStatus::Failed(reason.clone()));
                return Ok(CameraOutcome::Failed(AuthStatus::Failed(reason).to_string()));
            }
        }

        if *self.generation.borrow() != generation {
            tracing::debug!("Face session stopped before the camera was requested");
            return Ok(CameraOutcome::Stopped);
        }

        let requested = tokio::select! {
            result = self.camera.request_stream(&self.constraints) => result,
            _ = cancel.cancelled() => Err(AuthError::Cancelled),
            _ = stops.changed() => {
                tracing::debug!("Face session stopped during the camera prompt");
                return Ok(CameraOutcome::Stopped);
            }
        };

        let stream = match requested {
            Ok(stream) => stream,
            Err(err) => {
                tracing::warn!("Camera request failed: {}", err);
                let message = err.user_message();
                status.publish(Flow::Face, AuthStatus::Failed(FailureReason::Camera(message.clone())));
                return Ok(CameraOutcome::Failed(message));
            }
        };

        let stream_id = stream.id();
        if *self.generation.borrow() != generation {
            tracing::info!(stream = stream_id, "Face session stopped during the prompt, releasing camera stream");
            let mut stream = stream;
            stream.stop();
            return Ok(CameraOutcome::Stopped);
        }

        match self.sink.attach(stream) {
            Ok(()) => {
                tracing::info!(stream = stream_id, "Camera stream attached to display sink");
                Ok(CameraOutcome::Attached { stream_id })
            }
            Err(mut orphan) => {
                tracing::warn!(stream = stream_id, "Display sink went away, releasing camera stream");
                orphan.stop();
                Ok(CameraOutcome::SinkMissing)
            }
        }
    }

    /// Releases the attached stream and abandons a start that is still
    /// waiting on the camera. `false` when there was nothing to stop.
    pub fn stop(&self) -> bool {
        let pending = self.in_flight.load(Ordering::SeqCst);
        self.generation.send_modify(|g| *g += 1);

        match self.sink.detach() {
            Some(mut stream) => {
                stream.stop();
                tracing::info!(stream = stream.id(), "Face session stopped");
                true
            }
            None => pending,
        }
    }
}
