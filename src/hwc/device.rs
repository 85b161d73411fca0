//! Hardware composer HAL contract
//!
//! The device takes a fixed-size array of layer records through two calls:
//! [`HwcDevice::prepare`] lets the hardware decide which layers it will
//! composite itself (it rewrites `composition_type` to `Overlay` for those),
//! and [`HwcDevice::set`] commits the frame, filling in release fences and a
//! retirement fence.

use crate::buffer::NativeHandle;
use crate::error::HwcError;
use crate::fence::Fence;
use crate::geometry::{Orientation, Rectangle};
use std::fmt;
use std::sync::Arc;

/// Display index of the built-in panel
pub const PRIMARY_DISPLAY: i32 = 0;

/// Who composites a layer, as negotiated during `prepare`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CompositionType {
    /// Composited by the GPU into the framebuffer target
    Framebuffer,
    /// Scanned out directly by a hardware plane
    Overlay,
    /// Holds the GPU-composited result
    FramebufferTarget,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Blending {
    None,
    Premultiplied,
    Coverage,
}

/// Edge-based rectangle as the HAL expects it (`right`/`bottom` exclusive)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct HwcRect {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl HwcRect {
    pub const fn new(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self { left, top, right, bottom }
    }
}

impl From<Rectangle> for HwcRect {
    fn from(rect: Rectangle) -> Self {
        let br = rect.bottom_right();
        Self::new(rect.top_left.x, rect.top_left.y, br.x, br.y)
    }
}

/// One slot of the hardware layer array
pub struct HwcLayer {
    pub composition_type: CompositionType,
    /// Forces the hardware to leave this layer to the GPU
    pub skip: bool,
    pub handle: Option<NativeHandle>,
    pub transform: Orientation,
    pub blending: Blending,
    pub source_crop: HwcRect,
    pub display_frame: HwcRect,
    /// Signaled when the producer has finished writing `handle`
    pub acquire_fence: Fence,
    /// Filled in by `set`: signaled when the hardware stops reading `handle`
    pub release_fence: Fence,
}

impl Default for HwcLayer {
    fn default() -> Self {
        Self {
            composition_type: CompositionType::Framebuffer,
            skip: false,
            handle: None,
            transform: Orientation::Normal,
            blending: Blending::None,
            source_crop: HwcRect::default(),
            display_frame: HwcRect::default(),
            acquire_fence: Fence::signaled(),
            release_fence: Fence::signaled(),
        }
    }
}

impl fmt::Debug for HwcLayer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HwcLayer")
            .field("type", &self.composition_type)
            .field("skip", &self.skip)
            .field("handle", &self.handle)
            .field("blending", &self.blending)
            .field("display_frame", &self.display_frame)
            .finish()
    }
}

/// The layer array handed to `prepare` and `set`
#[derive(Debug, Default)]
pub struct DisplayContents {
    pub layers: Vec<HwcLayer>,
    /// Filled in by `set`: signaled once the previous frame is off screen
    pub retire_fence: Fence,
}

impl DisplayContents {
    pub fn len(&self) -> usize {
        self.layers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.layers.is_empty()
    }
}

/// Asynchronous notifications from the hardware.
///
/// Called on a hardware-owned thread. Implementations must only record or
/// enqueue the notification and return.
pub trait HwcCallbacks: Send + Sync {
    fn vsync(&self, display: i32, timestamp_ns: i64);

    fn hotplug(&self, display: i32, connected: bool);

    fn invalidate(&self);
}

/// The hardware composer device
#[cfg_attr(test, mockall::automock)]
pub trait HwcDevice: Send + Sync {
    /// Lets the hardware claim layers. A whole-call failure is a device failure.
    fn prepare(&self, contents: &mut DisplayContents) -> Result<(), HwcError>;

    /// Commits the prepared frame
    fn set(&self, contents: &mut DisplayContents) -> Result<(), HwcError>;

    fn blank(&self, blank: bool) -> Result<(), HwcError>;

    fn event_control(&self, vsync_enabled: bool) -> Result<(), HwcError>;

    fn register_callbacks(&self, callbacks: Arc<dyn HwcCallbacks>);

    /// Largest layer array the hardware accepts, reserved layers included
    fn max_layers(&self) -> usize;

    /// Asks the hardware to rotate the whole output. Returns `false` when
    /// the rotation has to be done by the GPU instead.
    fn apply_orientation(&self, orientation: Orientation) -> bool;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_conversion_uses_exclusive_edges() {
        let rect = HwcRect::from(Rectangle::from_xywh(9, 8, 333, 444));
        assert_eq!(rect, HwcRect::new(9, 8, 342, 452));
    }

    #[test]
    fn test_default_layer_has_no_pending_fences() {
        let layer = HwcLayer::default();
        assert_eq!(layer.composition_type, CompositionType::Framebuffer);
        assert!(layer.acquire_fence.is_signaled());
        assert!(layer.release_fence.is_signaled());
        assert!(layer.handle.is_none());
    }
}
