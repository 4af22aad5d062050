use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{DisplaySink, MediaStream};

/// In-process sink: holds the live stream so a preview loop can pull
/// frames from it.
#[derive(Default)]
pub struct PreviewSink {
    mounted: AtomicBool,
    attach_count: AtomicUsize,
    slot: Mutex<Option<MediaStream>>,
}

impl PreviewSink {
    pub fn mounted() -> Self {
        Self { mounted: AtomicBool::new(true), ..Default::default() }
    }

    /// Unmounting releases whatever stream is attached.
    pub fn set_mounted(&self, mounted: bool) {
        self.mounted.store(mounted, Ordering::SeqCst);
        if !mounted {
            if let Some(mut stream) = self.lock().take() {
                stream.stop();
            }
        }
    }

    pub fn attach_count(&self) -> usize {
        self.attach_count.load(Ordering::SeqCst)
    }

    pub fn has_stream(&self) -> bool {
        self.lock().as_ref().map(|s| s.is_active()).unwrap_or(false)
    }

    pub fn with_stream<R>(&self, f: impl FnOnce(&mut MediaStream) -> R) -> Option<R> {
        self.lock().as_mut().map(f)
    }

    fn lock(&self) -> MutexGuard<'_, Option<MediaStream>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl DisplaySink for PreviewSink {
    fn is_mounted(&self) -> bool {
        self.mounted.load(Ordering::SeqCst)
    }

    fn attach(&self, stream: MediaStream) -> Result<(), MediaStream> {
        if !self.is_mounted() {
            return Err(stream);
        }
        let previous = self.lock().replace(stream);
        self.attach_count.fetch_add(1, Ordering::SeqCst);
        if let Some(old) = previous {
            tracing::debug!(stream = old.id(), "Replacing attached stream");
        }
        Ok(())
    }

    fn detach(&self) -> Option<MediaStream> {
        self.lock().take()
    }
}
