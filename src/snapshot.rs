//! Buffer snapshots for thumbnails and screen capture
//!
//! Reading a buffer may have to wait for the GPU or display to finish with
//! it, so each request runs on its own worker thread and reports back through
//! a one-shot callback.

use crate::buffer::{Buffer, BufferAccess, PixelFormat};
use crate::error::BufferError;
use crate::geometry::Size;
use log::{debug, warn};
use parking_lot::Mutex;
use std::io;
use std::sync::Arc;
use std::thread;

/// A CPU copy of a buffer's pixels
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub pixels: Vec<u8>,
    pub size: Size,
    /// Bytes per row of `pixels`
    pub stride: u32,
    pub format: PixelFormat,
}

pub type SnapshotCallback = Box<dyn FnOnce(Result<Snapshot, BufferError>) + Send>;

pub trait SnapshotStrategy: Send + Sync {
    /// Captures `buffer` without blocking the caller. `callback` runs
    /// exactly once, on whichever thread did the capture.
    fn take_snapshot_of(&self, buffer: Arc<dyn Buffer>, callback: SnapshotCallback);
}

#[derive(Debug, Default)]
pub struct ThreadedSnapshotStrategy;

impl ThreadedSnapshotStrategy {
    pub fn new() -> Self {
        Self
    }
}

fn capture(buffer: &dyn Buffer) -> Result<Snapshot, BufferError> {
    buffer
        .native_buffer()
        .ensure_available_for(BufferAccess::Read)?;
    let mut pixels = Vec::new();
    buffer.read_pixels(&mut |data| pixels.extend_from_slice(data))?;
    Ok(Snapshot {
        pixels,
        size: buffer.size(),
        stride: buffer.stride(),
        format: buffer.pixel_format(),
    })
}

impl SnapshotStrategy for ThreadedSnapshotStrategy {
    fn take_snapshot_of(&self, buffer: Arc<dyn Buffer>, callback: SnapshotCallback) {
        // The callback moves into the worker; if spawning fails we get it
        // back through the shared slot and report on this thread instead.
        let slot = Arc::new(Mutex::new(Some(callback)));
        let worker_slot = Arc::clone(&slot);
        let worker_buffer = Arc::clone(&buffer);

        let spawned: io::Result<_> = thread::Builder::new()
            .name("strata-snapshot".into())
            .spawn(move || {
                let result = capture(worker_buffer.as_ref());
                debug!("📸 Snapshot of buffer {} done", worker_buffer.id());
                if let Some(callback) = worker_slot.lock().take() {
                    callback(result);
                }
            });

        if let Err(e) = spawned {
            warn!("⚠️ Could not start snapshot worker, capturing inline: {}", e);
            if let Some(callback) = slot.lock().take() {
                callback(capture(buffer.as_ref()));
            }
        }
    }
}
