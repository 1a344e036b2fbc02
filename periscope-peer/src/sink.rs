use bytes::Bytes;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// Consumes inbound frames. Each data-channel message is one complete
/// frame; there is no buffering across messages.
pub trait FrameSink: Send + Sync {
    fn on_frame(&self, frame: Bytes);
}

/// Hands each frame to a display callback.
pub struct CallbackSink {
    callback: Box<dyn Fn(Bytes) + Send + Sync>,
}

impl CallbackSink {
    pub fn new(callback: impl Fn(Bytes) + Send + Sync + 'static) -> Self {
        Self {
            callback: Box::new(callback),
        }
    }
}

impl FrameSink for CallbackSink {
    fn on_frame(&self, frame: Bytes) {
        (self.callback)(frame);
    }
}

/// Writes each frame to a numbered `.jpg` in a directory. Headless stand-in
/// for a viewer window.
pub struct DirSink {
    dir: PathBuf,
    counter: AtomicU64,
}

impl DirSink {
    pub fn new(dir: impl Into<PathBuf>) -> std::io::Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            counter: AtomicU64::new(0),
        })
    }
}

impl FrameSink for DirSink {
    fn on_frame(&self, frame: Bytes) {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let path = self.dir.join(format!("frame_{n:06}.jpg"));
        match std::fs::write(&path, &frame) {
            Ok(()) => debug!("wrote {} ({} bytes)", path.display(), frame.len()),
            Err(e) => warn!("failed to write {}: {e}", path.display()),
        }
    }
}
