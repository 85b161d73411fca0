//! Framebuffer target buffers
//!
//! The GPU composites into one buffer of a small ring while the hardware
//! scans out another. A buffer is only handed out for rendering once the
//! hardware's release fence (and any retirement fence) on it has signaled.

use crate::buffer::{Buffer, BufferAccess, BufferAllocator, PixelFormat};
use crate::error::{BufferError, FenceError};
use crate::geometry::Size;
use log::{debug, info};
use std::sync::Arc;

pub const DEFAULT_REFRESH_RATE_HZ: f64 = 60.0;

pub trait FramebufferBundle: Send {
    fn fb_format(&self) -> PixelFormat;

    fn fb_size(&self) -> Size;

    fn fb_refresh_rate(&self) -> f64;

    /// Next buffer to render into, once nothing reads it any more
    fn buffer_for_render(&mut self) -> Result<Arc<dyn Buffer>, FenceError>;

    /// The buffer most recently handed out for rendering
    fn last_rendered(&self) -> Arc<dyn Buffer>;
}

pub struct SwappingFramebuffers {
    buffers: Vec<Arc<dyn Buffer>>,
    last: usize,
    size: Size,
    format: PixelFormat,
    refresh_rate: f64,
}

impl SwappingFramebuffers {
    /// Allocates `count` framebuffers (at least two)
    pub fn new(
        allocator: &dyn BufferAllocator,
        size: Size,
        format: PixelFormat,
        count: usize,
    ) -> Result<Self, BufferError> {
        let count = count.max(2);
        let buffers = (0..count)
            .map(|_| allocator.alloc_buffer(size, format))
            .collect::<Result<Vec<_>, _>>()?;
        info!(
            "🖼️ {} framebuffers of {}x{} {:?}",
            count, size.width, size.height, format
        );

        Ok(Self {
            buffers,
            last: 0,
            size,
            format,
            refresh_rate: DEFAULT_REFRESH_RATE_HZ,
        })
    }

    pub fn with_refresh_rate(mut self, hz: f64) -> Self {
        self.refresh_rate = hz;
        self
    }

    pub fn len(&self) -> usize {
        self.buffers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffers.is_empty()
    }
}

impl FramebufferBundle for SwappingFramebuffers {
    fn fb_format(&self) -> PixelFormat {
        self.format
    }

    fn fb_size(&self) -> Size {
        self.size
    }

    fn fb_refresh_rate(&self) -> f64 {
        self.refresh_rate
    }

    fn buffer_for_render(&mut self) -> Result<Arc<dyn Buffer>, FenceError> {
        let next = (self.last + 1) % self.buffers.len();
        let buffer = &self.buffers[next];
        buffer
            .native_buffer()
            .ensure_available_for(BufferAccess::Write)?;
        debug!("🖼️ Rendering into framebuffer {}", buffer.id());
        self.last = next;
        Ok(Arc::clone(buffer))
    }

    fn last_rendered(&self) -> Arc<dyn Buffer> {
        Arc::clone(&self.buffers[self.last])
    }
}
