//! Camera capability: stream acquisition and the display sink the stream is
//! handed to.

pub mod sink;
pub mod v4l2;

use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use crate::common::error::Result;

pub use sink::PreviewSink;
pub use v4l2::V4l2Camera;

/// Video-only constraints. Audio is never requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StreamConstraints {
    pub device_index: Option<u32>,
    pub width: Option<u32>,
    pub height: Option<u32>,
}

#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub fourcc: String,
    pub data: Vec<u8>,
}

impl Frame {
    /// Mean byte value, a cheap liveness check for a preview.
    pub fn mean_level(&self) -> f32 {
        if self.data.is_empty() {
            return 0.0;
        }
        self.data.iter().map(|&b| b as u64).sum::<u64>() as f32 / self.data.len() as f32
    }
}

/// One live video source behind a [`MediaStream`].
pub trait VideoTrack: Send {
    fn label(&self) -> &str;
    fn capture(&mut self) -> Result<Frame>;
    fn stop(&mut self);
}

static NEXT_STREAM_ID: AtomicU64 = AtomicU64::new(1);

/// Scoped camera stream. Ownership moves from the camera to the sink; the
/// device is released on `stop()` or when the stream is dropped.
pub struct MediaStream {
    id: u64,
    track: Option<Box<dyn VideoTrack>>,
}

impl MediaStream {
    pub fn new(track: Box<dyn VideoTrack>) -> Self {
        Self { id: NEXT_STREAM_ID.fetch_add(1, Ordering::Relaxed), track: Some(track) }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn label(&self) -> Option<&str> {
        self.track.as_deref().map(|t| t.label())
    }

    pub fn is_active(&self) -> bool {
        self.track.is_some()
    }

    pub fn capture_frame(&mut self) -> Result<Frame> {
        match self.track.as_mut() {
            Some(track) => track.capture(),
            None => Err(crate::common::AuthError::CameraUnavailable(
                "stream has been stopped".into(),
            )),
        }
    }

    pub fn stop(&mut self) {
        if let Some(mut track) = self.track.take() {
            track.stop();
            tracing::debug!(stream = self.id, "Released camera stream");
        }
    }
}

impl Drop for MediaStream {
    fn drop(&mut self) {
        self.stop();
    }
}

impl std::fmt::Debug for MediaStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MediaStream")
            .field("id", &self.id)
            .field("label", &self.label())
            .finish()
    }
}

#[async_trait]
pub trait CameraAccess: Send + Sync {
    /// May suspend on a permission prompt. Fails with
    /// `CameraPermissionDenied` or `CameraUnavailable`.
    async fn request_stream(&self, constraints: &StreamConstraints) -> Result<MediaStream>;
}

/// Where a live stream is shown.
pub trait DisplaySink: Send + Sync {
    fn is_mounted(&self) -> bool;

    /// Takes the stream, replacing (and releasing) any previous one. An
    /// unmounted sink hands the stream back.
    fn attach(&self, stream: MediaStream) -> std::result::Result<(), MediaStream>;

    fn detach(&self) -> Option<MediaStream>;
}
