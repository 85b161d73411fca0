//! Graphics buffers and their synchronization state
//!
//! A buffer is shared between a producer (a client, or the GPU compositor
//! writing the framebuffer target) and consumers (the GPU compositor sampling
//! it, the display hardware scanning it out). The buffer's fence is the only
//! coordination between them: every handoff goes through
//! [`NativeBuffer::ensure_available_for`] on one side and
//! [`NativeBuffer::update_usage`] on the other.

use crate::error::{BufferError, FenceError};
use crate::fence::{Fence, DEFAULT_WAIT_CEILING};
use crate::geometry::Size;
use log::debug;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Stable identity of a buffer's storage
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BufferId(pub u64);

impl BufferId {
    /// Allocates a process-unique id
    pub fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for BufferId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Pixel layouts, named by component order from most to least significant bit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PixelFormat {
    Abgr8888,
    Xbgr8888,
    Argb8888,
    Xrgb8888,
    Bgr888,
    Rgb565,
    Invalid,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> u32 {
        match self {
            PixelFormat::Abgr8888
            | PixelFormat::Xbgr8888
            | PixelFormat::Argb8888
            | PixelFormat::Xrgb8888 => 4,
            PixelFormat::Bgr888 => 3,
            PixelFormat::Rgb565 => 2,
            PixelFormat::Invalid => 0,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(self, PixelFormat::Abgr8888 | PixelFormat::Argb8888)
    }
}

/// Opaque handle the display hardware uses to address a buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeHandle(pub u64);

impl fmt::Display for NativeHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:x}", self.0)
    }
}

/// What the outstanding fence on a buffer protects
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BufferAccess {
    /// Outstanding work reads the buffer (sampling, scanout)
    Read,
    /// Outstanding work writes the buffer (rendering)
    Write,
}

#[derive(Debug)]
struct FenceState {
    fence: Fence,
    access: BufferAccess,
}

/// Hardware-addressable side of a buffer: its handle and its fence
#[derive(Debug)]
pub struct NativeBuffer {
    handle: NativeHandle,
    state: Mutex<FenceState>,
    wait_ceiling: Duration,
}

impl NativeBuffer {
    pub fn new(handle: NativeHandle) -> Self {
        Self::with_wait_ceiling(handle, DEFAULT_WAIT_CEILING)
    }

    pub fn with_wait_ceiling(handle: NativeHandle, wait_ceiling: Duration) -> Self {
        Self {
            handle,
            state: Mutex::new(FenceState {
                fence: Fence::signaled(),
                access: BufferAccess::Read,
            }),
            wait_ceiling,
        }
    }

    pub fn handle(&self) -> NativeHandle {
        self.handle
    }

    /// Duplicates the outstanding fence for handoff to another party
    pub fn copy_fence(&self) -> Fence {
        self.state.lock().fence.copy()
    }

    /// Records new outstanding work. The stored fence becomes satisfied only
    /// once both the previous and the new work complete.
    pub fn update_usage(&self, fence: Fence, access: BufferAccess) {
        let mut state = self.state.lock();
        state.fence.merge(fence);
        state.access = access;
    }

    /// Blocks until the buffer may be used for `intent`.
    ///
    /// Concurrent reads do not exclude each other, so a read following
    /// outstanding reads does not wait. Anything involving a write waits for
    /// all outstanding work, bounded by the wait ceiling.
    pub fn ensure_available_for(&self, intent: BufferAccess) -> Result<(), FenceError> {
        let fence = {
            let state = self.state.lock();
            if state.access == BufferAccess::Read && intent == BufferAccess::Read {
                return Ok(());
            }
            state.fence.copy()
        };
        fence.wait(self.wait_ceiling)?;

        let mut state = self.state.lock();
        if state.fence.is_signaled() {
            state.fence = Fence::signaled();
        }
        Ok(())
    }

    /// Whether any recorded work is still outstanding
    pub fn has_pending_work(&self) -> bool {
        !self.state.lock().fence.is_signaled()
    }

    pub fn outstanding_access(&self) -> BufferAccess {
        self.state.lock().access
    }
}

/// A pixel buffer as seen by the compositor
pub trait Buffer: Send + Sync + fmt::Debug {
    fn id(&self) -> BufferId;

    fn size(&self) -> Size;

    /// Bytes per row
    fn stride(&self) -> u32;

    fn pixel_format(&self) -> PixelFormat;

    fn native_buffer(&self) -> &NativeBuffer;

    /// Uploads (or attaches) the buffer content to the currently bound
    /// `GL_TEXTURE_2D`. Requires a current GL context.
    fn bind_to_texture(&self) -> Result<(), BufferError>;

    /// Gives `reader` the raw pixel rows while holding the content lock
    fn read_pixels(&self, reader: &mut dyn FnMut(&[u8])) -> Result<(), BufferError>;

    fn native_buffer_handle(&self) -> NativeHandle {
        self.native_buffer().handle()
    }
}

/// CPU-memory buffer, the software allocator's buffer type
pub struct ShmBuffer {
    id: BufferId,
    size: Size,
    stride: u32,
    format: PixelFormat,
    native: NativeBuffer,
    pixels: Mutex<Vec<u8>>,
}

impl ShmBuffer {
    pub fn new(
        handle: NativeHandle,
        size: Size,
        format: PixelFormat,
        wait_ceiling: Duration,
    ) -> Result<Self, BufferError> {
        let bpp = format.bytes_per_pixel();
        if size.is_empty() || bpp == 0 {
            return Err(BufferError::InvalidGeometry {
                width: size.width,
                height: size.height,
                stride: 0,
            });
        }
        let stride = size.width as u32 * bpp;
        let len = stride as usize * size.height as usize;
        Ok(Self {
            id: BufferId::next(),
            size,
            stride,
            format,
            native: NativeBuffer::with_wait_ceiling(handle, wait_ceiling),
            pixels: Mutex::new(vec![0; len]),
        })
    }

    /// Producer access: waits for outstanding readers, then lets `writer`
    /// fill the pixel rows.
    pub fn write_pixels(&self, writer: impl FnOnce(&mut [u8])) -> Result<(), BufferError> {
        self.native.ensure_available_for(BufferAccess::Write)?;
        let mut pixels = self.pixels.lock();
        writer(&mut pixels);
        Ok(())
    }

    /// Fills every pixel with `rgba`, laid out in the buffer's byte order
    pub fn fill(&self, rgba: [u8; 4]) -> Result<(), BufferError> {
        let bpp = self.format.bytes_per_pixel() as usize;
        let px: Vec<u8> = match self.format {
            PixelFormat::Abgr8888 | PixelFormat::Xbgr8888 => rgba.to_vec(),
            PixelFormat::Argb8888 | PixelFormat::Xrgb8888 => {
                vec![rgba[2], rgba[1], rgba[0], rgba[3]]
            }
            PixelFormat::Bgr888 => vec![rgba[0], rgba[1], rgba[2]],
            PixelFormat::Rgb565 => {
                let v = ((rgba[0] as u16 >> 3) << 11)
                    | ((rgba[1] as u16 >> 2) << 5)
                    | (rgba[2] as u16 >> 3);
                v.to_le_bytes().to_vec()
            }
            PixelFormat::Invalid => return Err(BufferError::NotMappable(self.id.0)),
        };
        self.write_pixels(|pixels| {
            for chunk in pixels.chunks_exact_mut(bpp) {
                chunk.copy_from_slice(&px);
            }
        })
    }

    fn gl_format(&self) -> Option<(gl::types::GLenum, gl::types::GLenum)> {
        match self.format {
            PixelFormat::Abgr8888 | PixelFormat::Xbgr8888 => Some((gl::RGBA, gl::UNSIGNED_BYTE)),
            PixelFormat::Argb8888 | PixelFormat::Xrgb8888 => Some((gl::BGRA, gl::UNSIGNED_BYTE)),
            PixelFormat::Bgr888 => Some((gl::RGB, gl::UNSIGNED_BYTE)),
            PixelFormat::Rgb565 => Some((gl::RGB, gl::UNSIGNED_SHORT_5_6_5)),
            PixelFormat::Invalid => None,
        }
    }
}

impl fmt::Debug for ShmBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShmBuffer")
            .field("id", &self.id)
            .field("size", &self.size)
            .field("stride", &self.stride)
            .field("format", &self.format)
            .field("handle", &self.native.handle())
            .finish()
    }
}

impl Buffer for ShmBuffer {
    fn id(&self) -> BufferId {
        self.id
    }

    fn size(&self) -> Size {
        self.size
    }

    fn stride(&self) -> u32 {
        self.stride
    }

    fn pixel_format(&self) -> PixelFormat {
        self.format
    }

    fn native_buffer(&self) -> &NativeBuffer {
        &self.native
    }

    fn bind_to_texture(&self) -> Result<(), BufferError> {
        let (format, ty) = self
            .gl_format()
            .ok_or(BufferError::NotMappable(self.id.0))?;
        self.native.ensure_available_for(BufferAccess::Read)?;

        let pixels = self.pixels.lock();
        // SAFETY: the caller guarantees a current GL context with a texture
        // bound to GL_TEXTURE_2D; `pixels` holds stride * height bytes.
        unsafe {
            gl::PixelStorei(gl::UNPACK_ALIGNMENT, 1);
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                format as gl::types::GLint,
                self.size.width,
                self.size.height,
                0,
                format,
                ty,
                pixels.as_ptr() as *const std::ffi::c_void,
            );
            let err = gl::GetError();
            if err != gl::NO_ERROR {
                return Err(BufferError::Upload(format!("glTexImage2D: 0x{:04x}", err)));
            }
        }
        Ok(())
    }

    fn read_pixels(&self, reader: &mut dyn FnMut(&[u8])) -> Result<(), BufferError> {
        let pixels = self.pixels.lock();
        reader(&pixels);
        Ok(())
    }
}

/// Source of graphics buffers
pub trait BufferAllocator: Send + Sync {
    fn alloc_buffer(&self, size: Size, format: PixelFormat) -> Result<Arc<dyn Buffer>, BufferError>;
}

/// Software allocator handing out [`ShmBuffer`]s with unique native handles
#[derive(Debug)]
pub struct ShmAllocator {
    next_handle: AtomicU64,
    wait_ceiling: Duration,
}

impl ShmAllocator {
    pub fn new(wait_ceiling: Duration) -> Self {
        Self {
            next_handle: AtomicU64::new(0x1000),
            wait_ceiling,
        }
    }

    pub fn allocate(&self, size: Size, format: PixelFormat) -> Result<Arc<ShmBuffer>, BufferError> {
        let handle = NativeHandle(self.next_handle.fetch_add(1, Ordering::Relaxed));
        let buffer = ShmBuffer::new(handle, size, format, self.wait_ceiling)?;
        debug!(
            "🧱 Allocated buffer {} ({}x{} {:?}, handle {})",
            buffer.id(),
            size.width,
            size.height,
            format,
            handle
        );
        Ok(Arc::new(buffer))
    }
}

impl BufferAllocator for ShmAllocator {
    fn alloc_buffer(&self, size: Size, format: PixelFormat) -> Result<Arc<dyn Buffer>, BufferError> {
        let buffer: Arc<dyn Buffer> = self.allocate(size, format)?;
        Ok(buffer)
    }
}

impl Default for ShmAllocator {
    fn default() -> Self {
        Self::new(DEFAULT_WAIT_CEILING)
    }
}
