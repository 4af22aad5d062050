use async_trait::async_trait;
use std::fs;
use std::io;
use std::time::Duration;
use v4l::buffer::Type;
use v4l::io::mmap::Stream;
use v4l::io::traits::CaptureStream;
use v4l::video::Capture;
use v4l::{Device, Format};

use super::{CameraAccess, Frame, MediaStream, StreamConstraints, VideoTrack};
use crate::common::config::CameraConfig;
use crate::common::error::{AuthError, Result};

/// Special device index meaning "pick the best camera".
pub const AUTO_DETECT_INDEX: u32 = 999;

const EBUSY: i32 = 16;

const STREAM_BUFFERS: u32 = 8;

/// Video4Linux camera.
pub struct V4l2Camera {
    config: CameraConfig,
}

impl V4l2Camera {
    pub fn new(config: CameraConfig) -> Self {
        Self { config }
    }

    /// Auto-detect an IR camera by looking for devices with a grayscale
    /// format. Falls back to device 0.
    pub fn detect_ir_camera() -> Result<u32> {
        let mut candidates = Vec::new();

        for entry in fs::read_dir("/dev")? {
            let path = entry?.path();
            let index = match path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(|n| n.strip_prefix("video"))
                .and_then(|n| n.parse::<u32>().ok())
            {
                Some(index) => index,
                None => continue,
            };

            let device = match Device::new(index as usize) {
                Ok(device) => device,
                Err(_) => continue,
            };
            let caps = match device.query_caps() {
                Ok(caps) => caps,
                Err(_) => continue,
            };
            if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
                continue;
            }

            let has_grayscale = device.enum_formats().unwrap_or_default().iter().any(|fmt| {
                let fourcc = fmt.fourcc.repr;
                fourcc == *b"GREY" || fourcc == *b"Y8  " || fourcc == *b"Y16 "
            });

            if has_grayscale {
                candidates.push((index, caps.card.clone(), 100));
            } else if caps.card.contains("IR") || caps.card.contains("BRIO") {
                candidates.push((index, caps.card.clone(), 50));
            }
        }

        candidates.sort_by(|a, b| b.2.cmp(&a.2));

        match candidates.first() {
            Some((index, name, _)) => {
                tracing::info!("Selected camera: /dev/video{} ({})", index, name);
                Ok(*index)
            }
            None => {
                tracing::info!("No IR camera detected, falling back to /dev/video0");
                Ok(0)
            }
        }
    }

    fn open(index: u32, width: Option<u32>, height: Option<u32>, warmup: Warmup) -> Result<V4l2Track> {
        let device = Device::new(index as usize).map_err(|e| map_open_error(index, e))?;

        let caps = device
            .query_caps()
            .map_err(|e| AuthError::CameraUnavailable(format!("Failed to query capabilities: {}", e)))?;
        if !caps.capabilities.contains(v4l::capability::Flags::VIDEO_CAPTURE) {
            return Err(AuthError::CameraUnavailable(format!(
                "/dev/video{} does not support video capture", index
            )));
        }

        if width.is_some() || height.is_some() {
            let mut fmt = device
                .format()
                .map_err(|e| AuthError::CameraUnavailable(format!("Failed to get format: {}", e)))?;
            fmt.width = width.unwrap_or(fmt.width);
            fmt.height = height.unwrap_or(fmt.height);
            if let Err(e) = device.set_format(&fmt) {
                tracing::warn!("Could not set requested format: {}. Using device defaults.", e);
            }
        }

        tracing::info!("Opened camera /dev/video{} ({})", index, caps.card);
        Ok(V4l2Track { device: Some(device), session: None, label: caps.card, warmup })
    }
}

fn map_open_error(index: u32, err: io::Error) -> AuthError {
    let detail = format!("/dev/video{}: {}", index, err);
    match err.kind() {
        io::ErrorKind::PermissionDenied => AuthError::CameraPermissionDenied(detail),
        io::ErrorKind::NotFound => AuthError::CameraUnavailable(format!("no camera at {}", detail)),
        _ if err.raw_os_error() == Some(EBUSY) => {
            AuthError::CameraUnavailable(format!("camera busy ({})", detail))
        }
        _ => AuthError::CameraUnavailable(detail),
    }
}

#[async_trait]
impl CameraAccess for V4l2Camera {
    async fn request_stream(&self, constraints: &StreamConstraints) -> Result<MediaStream> {
        let configured = constraints.device_index.unwrap_or(self.config.device_index);
        let width = constraints.width.or(self.config.width);
        let height = constraints.height.or(self.config.height);
        let warmup = Warmup {
            frames: self.config.warmup_frames,
            delay: Duration::from_millis(self.config.warmup_delay_ms),
        };

        let track = tokio::task::spawn_blocking(move || {
            let index = if configured == AUTO_DETECT_INDEX {
                V4l2Camera::detect_ir_camera()?
            } else {
                configured
            };
            V4l2Camera::open(index, width, height, warmup)
        })
        .await
        .map_err(|e| AuthError::Other(anyhow::anyhow!("camera task failed: {}", e)))??;

        Ok(MediaStream::new(Box::new(track)))
    }
}

#[derive(Debug, Clone, Copy)]
struct Warmup {
    frames: u32,
    delay: Duration,
}

/// Pulls and drops `warmup.frames` frames, pausing between them.
fn discard_warmup<F>(warmup: Warmup, mut next: F) -> Result<()>
where
    F: FnMut() -> io::Result<()>,
{
    for i in 0..warmup.frames {
        next().map_err(|e| {
            AuthError::CameraUnavailable(format!("Failed to capture warmup frame {}: {}", i, e))
        })?;
        std::thread::sleep(warmup.delay);
    }
    Ok(())
}

/// Live mmap stream. The buffers are owned through the device handle, not
/// borrowed from `Device`, so the stream can sit next to it in the track.
struct StreamSession {
    stream: Stream<'static>,
    format: Format,
}

struct V4l2Track {
    device: Option<Device>,
    session: Option<StreamSession>,
    label: String,
    warmup: Warmup,
}

impl V4l2Track {
    /// Stream-on happens on the first capture; the warmup frames are
    /// discarded once per session.
    fn session(&mut self) -> Result<&mut StreamSession> {
        if self.session.is_none() {
            let device = self
                .device
                .as_ref()
                .ok_or_else(|| AuthError::CameraUnavailable("camera released".into()))?;

            let format = device
                .format()
                .map_err(|e| AuthError::CameraUnavailable(format!("Failed to get format: {}", e)))?;
            let mut stream = Stream::with_buffers(device, Type::VideoCapture, STREAM_BUFFERS)
                .map_err(|e| AuthError::CameraUnavailable(format!("Failed to create stream: {}", e)))?;

            tracing::debug!("Warming up camera ({} frames)", self.warmup.frames);
            discard_warmup(self.warmup, || stream.next().map(|_| ()))?;
            tracing::debug!("Camera ready ({})", self.label);

            self.session = Some(StreamSession { stream, format });
        }

        self.session
            .as_mut()
            .ok_or_else(|| AuthError::CameraUnavailable("camera released".into()))
    }
}

impl VideoTrack for V4l2Track {
    fn label(&self) -> &str {
        &self.label
    }

    fn capture(&mut self) -> Result<Frame> {
        let session = self.session()?;
        let (buf, _meta) = session
            .stream
            .next()
            .map_err(|e| AuthError::CameraUnavailable(format!("Failed to capture: {}", e)))?;

        Ok(Frame {
            width: session.format.width,
            height: session.format.height,
            fourcc: session.format.fourcc.str().unwrap_or("UNKNOWN").to_string(),
            data: buf.to_vec(),
        })
    }

    fn stop(&mut self) {
        // Stream-off before the device handle is closed.
        self.session = None;
        if self.device.take().is_some() {
            tracing::debug!("Closed camera device ({})", self.label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn permission_errors_map_to_denied() {
        let err = map_open_error(0, io::Error::from(io::ErrorKind::PermissionDenied));
        assert!(matches!(err, AuthError::CameraPermissionDenied(_)));
    }

    #[test]
    fn busy_device_is_unavailable() {
        let err = map_open_error(2, io::Error::from_raw_os_error(EBUSY));
        assert!(matches!(err, AuthError::CameraUnavailable(ref m) if m.contains("busy")));
    }

    #[test]
    fn warmup_discards_configured_frames() {
        let mut pulled = 0;
        let warmup = Warmup { frames: 3, delay: Duration::ZERO };
        discard_warmup(warmup, || {
            pulled += 1;
            Ok(())
        })
        .unwrap();
        assert_eq!(pulled, 3);
    }

    #[test]
    fn warmup_failure_names_the_frame() {
        let warmup = Warmup { frames: 3, delay: Duration::ZERO };
        let mut pulled = 0;
        let err = discard_warmup(warmup, || {
            pulled += 1;
            if pulled == 2 {
                Err(io::Error::from(io::ErrorKind::TimedOut))
            } else {
                Ok(())
            }
        })
        .unwrap_err();
        assert!(err.user_message().contains("warmup frame 1"));
        assert_eq!(pulled, 2);
    }

    #[test]
    fn released_track_refuses_capture() {
        let mut track = V4l2Track {
            device: None,
            session: None,
            label: "test".into(),
            warmup: Warmup { frames: 0, delay: Duration::ZERO },
        };
        assert!(matches!(track.capture(), Err(AuthError::CameraUnavailable(_))));
    }

    #[test]
    fn missing_device_is_unavailable() {
        let err = map_open_error(7, io::Error::from(io::ErrorKind::NotFound));
        assert!(err.user_message().contains("/dev/video7"));
    }
}
