//! Per-layer state and the acquire/release fence handoff
//!
//! A [`Layer`] is a mutable view over one [`HwcLayer`] record plus the
//! compositor-side bookkeeping for that slot. Records persist across frames
//! while the list keeps its size, so the record's handle is the previous
//! frame's handle when a layer is set up again.

use crate::buffer::{Buffer, BufferAccess, NativeHandle};
use crate::error::LayerError;
use crate::fence::Fence;
use crate::geometry::Rectangle;
use crate::hwc::device::{Blending, CompositionType, HwcLayer, HwcRect};
use log::trace;
use std::fmt;
use std::sync::Arc;

/// What the compositor asks of a layer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LayerType {
    /// GPU-rendered, and the hardware is told not to consider it
    Skip,
    /// GPU-rendered unless the hardware claims it during `prepare`
    GlRendered,
    /// Claimed by the hardware. Only `prepare` may assign this.
    Overlay,
    FramebufferTarget,
}

impl LayerType {
    pub fn as_str(self) -> &'static str {
        match self {
            LayerType::Skip => "skip",
            LayerType::GlRendered => "gl_rendered",
            LayerType::Overlay => "overlay",
            LayerType::FramebufferTarget => "framebuffer_target",
        }
    }
}

impl fmt::Display for LayerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Compositor-side state of one slot
#[derive(Debug, Default)]
pub struct LayerSlot {
    needs_commit: bool,
    /// Handle whose acquire fence was already given to the hardware
    fence_sent_for: Option<NativeHandle>,
    buffer: Option<Arc<dyn Buffer>>,
}

impl LayerSlot {
    pub fn needs_commit(&self) -> bool {
        self.needs_commit
    }

    pub fn buffer(&self) -> Option<&Arc<dyn Buffer>> {
        self.buffer.as_ref()
    }
}

pub struct Layer<'a> {
    record: &'a mut HwcLayer,
    slot: &'a mut LayerSlot,
}

impl<'a> Layer<'a> {
    pub fn new(record: &'a mut HwcLayer, slot: &'a mut LayerSlot) -> Self {
        Self { record, slot }
    }

    /// Configures the layer for this frame and returns whether it needs a
    /// hardware commit: its last composition needed the GPU, or it now shows
    /// a different buffer than in the previous frame.
    pub fn setup_layer(
        &mut self,
        layer_type: LayerType,
        position: Rectangle,
        blend: bool,
        buffer: &Arc<dyn Buffer>,
    ) -> Result<bool, LayerError> {
        let rendered_by_gpu = self.needs_gl_render();
        self.set_layer_type(layer_type)?;
        self.set_render_parameters(position, blend);
        let buffer_changed = self.set_buffer(buffer);

        self.slot.needs_commit = rendered_by_gpu || buffer_changed;
        Ok(self.slot.needs_commit)
    }

    pub fn set_layer_type(&mut self, layer_type: LayerType) -> Result<(), LayerError> {
        let (composition_type, skip) = match layer_type {
            LayerType::Skip => (CompositionType::Framebuffer, true),
            LayerType::GlRendered => (CompositionType::Framebuffer, false),
            LayerType::FramebufferTarget => (CompositionType::FramebufferTarget, false),
            LayerType::Overlay => return Err(LayerError::InvalidLayerType(layer_type.as_str())),
        };
        self.record.composition_type = composition_type;
        self.record.skip = skip;
        Ok(())
    }

    pub fn layer_type(&self) -> LayerType {
        match self.record.composition_type {
            CompositionType::Overlay => LayerType::Overlay,
            CompositionType::FramebufferTarget => LayerType::FramebufferTarget,
            CompositionType::Framebuffer if self.record.skip => LayerType::Skip,
            CompositionType::Framebuffer => LayerType::GlRendered,
        }
    }

    pub fn set_render_parameters(&mut self, position: Rectangle, blend: bool) {
        self.record.display_frame = HwcRect::from(position);
        self.record.blending = if blend {
            Blending::Coverage
        } else {
            Blending::None
        };
    }

    /// Attaches `buffer`. Returns whether the handle differs from the one the
    /// layer held before.
    pub fn set_buffer(&mut self, buffer: &Arc<dyn Buffer>) -> bool {
        let handle = buffer.native_buffer_handle();
        let size = buffer.size();
        let changed = self.record.handle != Some(handle);

        if changed {
            self.slot.fence_sent_for = None;
        }
        self.record.handle = Some(handle);
        self.record.source_crop = HwcRect::new(0, 0, size.width, size.height);
        self.slot.buffer = Some(Arc::clone(buffer));
        changed
    }

    /// Whether the GPU has to draw this layer's content
    pub fn needs_gl_render(&self) -> bool {
        self.record.composition_type == CompositionType::Framebuffer
    }

    pub fn needs_commit(&self) -> bool {
        self.slot.needs_commit
    }

    /// Marks the layer dirty after the hardware rejected it during `prepare`
    pub fn mark_needs_commit(&mut self) {
        self.slot.needs_commit = true;
    }

    /// Whether the hardware reads the buffer directly
    pub fn is_consumed_by_hardware(&self) -> bool {
        matches!(
            self.record.composition_type,
            CompositionType::Overlay | CompositionType::FramebufferTarget
        )
    }

    /// Hands the producer's fence to the hardware.
    ///
    /// Only layers the hardware will read receive a fence, and only on the
    /// first commit that reads the current buffer. A frame in which the GPU
    /// draws the layer ends that run, so the next hardware read fences
    /// again. Any release fence left over from a previous commit is dropped.
    pub fn set_acquirefence_from(&mut self, buffer: &dyn Buffer) {
        self.record.release_fence = Fence::signaled();
        self.record.acquire_fence = Fence::signaled();

        if !self.is_consumed_by_hardware() {
            self.slot.fence_sent_for = None;
            return;
        }
        let handle = buffer.native_buffer_handle();
        if self.slot.fence_sent_for == Some(handle) {
            return;
        }
        self.record.acquire_fence = buffer.native_buffer().copy_fence();
        self.slot.fence_sent_for = Some(handle);
        trace!("Acquire fence for handle {}: {:?}", handle, self.record.acquire_fence);
    }

    /// Gives the hardware's release fence back to `buffer` and clears both
    /// fence fields
    pub fn update_from_releasefence(&mut self, buffer: &dyn Buffer) {
        let release = self.record.release_fence.take();
        if self.is_consumed_by_hardware() {
            buffer
                .native_buffer()
                .update_usage(release, BufferAccess::Read);
        }
        self.record.acquire_fence = Fence::signaled();
    }

    pub fn buffer(&self) -> Option<&Arc<dyn Buffer>> {
        self.slot.buffer.as_ref()
    }

    pub fn record(&self) -> &HwcLayer {
        self.record
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{PixelFormat, ShmAllocator};
    use crate::fence::Timeline;
    use crate::geometry::Size;
    use proptest::prelude::*;

    fn buffer(allocator: &ShmAllocator) -> Arc<dyn Buffer> {
        allocator
            .allocate(Size::new(333, 444), PixelFormat::Abgr8888)
            .unwrap()
    }

    fn position() -> Rectangle {
        Rectangle::from_xywh(9, 8, 333, 444)
    }

    #[test]
    fn test_needs_gl_render_by_composition_type() {
        let mut record = HwcLayer::default();
        let mut slot = LayerSlot::default();

        record.composition_type = CompositionType::Overlay;
        assert!(!Layer::new(&mut record, &mut slot).needs_gl_render());

        record.composition_type = CompositionType::Framebuffer;
        record.skip = true;
        assert!(Layer::new(&mut record, &mut slot).needs_gl_render());

        record.skip = false;
        assert!(Layer::new(&mut record, &mut slot).needs_gl_render());

        record.composition_type = CompositionType::FramebufferTarget;
        assert!(!Layer::new(&mut record, &mut slot).needs_gl_render());
    }

    #[test]
    fn test_layer_type_transitions() {
        let mut record = HwcLayer::default();
        let mut slot = LayerSlot::default();
        let mut layer = Layer::new(&mut record, &mut slot);

        layer.set_layer_type(LayerType::FramebufferTarget).unwrap();
        assert_eq!(layer.record().composition_type, CompositionType::FramebufferTarget);

        assert_eq!(
            layer.set_layer_type(LayerType::Overlay),
            Err(LayerError::InvalidLayerType("overlay"))
        );
        assert_eq!(layer.layer_type(), LayerType::FramebufferTarget);

        layer.set_layer_type(LayerType::Skip).unwrap();
        assert_eq!(layer.record().composition_type, CompositionType::Framebuffer);
        assert!(layer.record().skip);
        assert_eq!(layer.layer_type(), LayerType::Skip);

        layer.set_layer_type(LayerType::GlRendered).unwrap();
        assert!(!layer.record().skip);
        assert_eq!(layer.layer_type(), LayerType::GlRendered);
    }

    #[test]
    fn test_render_parameters_and_crop() {
        let allocator = ShmAllocator::default();
        let buf = buffer(&allocator);
        let mut record = HwcLayer::default();
        let mut slot = LayerSlot::default();
        let mut layer = Layer::new(&mut record, &mut slot);

        layer.setup_layer(LayerType::GlRendered, position(), true, &buf).unwrap();
        assert_eq!(layer.record().blending, Blending::Coverage);
        assert_eq!(layer.record().display_frame, HwcRect::new(9, 8, 342, 452));
        assert_eq!(layer.record().source_crop, HwcRect::new(0, 0, 333, 444));
        assert_eq!(layer.record().handle, Some(buf.native_buffer_handle()));

        layer.set_render_parameters(position(), false);
        assert_eq!(layer.record().blending, Blending::None);
    }

    #[test]
    fn test_gl_rendered_layer_gets_no_acquire_fence() {
        let allocator = ShmAllocator::default();
        let buf = buffer(&allocator);
        let timeline = Timeline::new("producer");
        let (fence, _point) = timeline.create_fence();
        buf.native_buffer().update_usage(fence, BufferAccess::Write);

        let mut record = HwcLayer::default();
        let mut slot = LayerSlot::default();
        let mut layer = Layer::new(&mut record, &mut slot);
        layer.setup_layer(LayerType::GlRendered, position(), false, &buf).unwrap();
        layer.set_acquirefence_from(buf.as_ref());

        assert!(layer.record().acquire_fence.is_signaled());
    }

    #[test]
    fn test_overlay_acquire_fence_only_on_first_use() {
        let allocator = ShmAllocator::default();
        let buf = buffer(&allocator);
        let timeline = Timeline::new("producer");
        let (fence, _point) = timeline.create_fence();
        buf.native_buffer().update_usage(fence, BufferAccess::Write);

        let mut record = HwcLayer::default();
        let mut slot = LayerSlot::default();
        {
            let mut layer = Layer::new(&mut record, &mut slot);
            layer.setup_layer(LayerType::GlRendered, position(), false, &buf).unwrap();
        }
        // the hardware claims the layer
        record.composition_type = CompositionType::Overlay;
        record.release_fence = timeline.create_fence().0;

        let mut layer = Layer::new(&mut record, &mut slot);
        layer.set_acquirefence_from(buf.as_ref());
        assert!(!layer.record().acquire_fence.is_signaled());
        assert!(layer.record().release_fence.is_signaled());

        layer.set_buffer(&buf);
        layer.set_acquirefence_from(buf.as_ref());
        assert!(layer.record().acquire_fence.is_signaled());
    }

    fn commit_as(
        record: &mut HwcLayer,
        slot: &mut LayerSlot,
        buf: &Arc<dyn Buffer>,
        composition_type: CompositionType,
    ) -> Fence {
        {
            let mut layer = Layer::new(record, slot);
            layer.setup_layer(LayerType::GlRendered, position(), false, buf).unwrap();
        }
        record.composition_type = composition_type;
        let mut layer = Layer::new(record, slot);
        layer.set_acquirefence_from(buf.as_ref());
        let fence = layer.record().acquire_fence.copy();
        layer.update_from_releasefence(buf.as_ref());
        fence
    }

    #[test]
    fn test_buffer_back_on_overlay_after_gpu_frame_is_fenced_again() {
        let allocator = ShmAllocator::default();
        let a = buffer(&allocator);
        let b = buffer(&allocator);
        let timeline = Timeline::new("producer");
        let mut record = HwcLayer::default();
        let mut slot = LayerSlot::default();

        commit_as(&mut record, &mut slot, &a, CompositionType::Overlay);
        commit_as(&mut record, &mut slot, &b, CompositionType::Framebuffer);

        // the client draws into A again before resubmitting it
        let (write, _point) = timeline.create_fence();
        a.native_buffer().update_usage(write, BufferAccess::Write);

        let acquire = commit_as(&mut record, &mut slot, &a, CompositionType::Overlay);
        assert!(!acquire.is_signaled());
    }

    #[test]
    fn test_gpu_frame_with_same_buffer_resets_acquire_tracking() {
        let allocator = ShmAllocator::default();
        let a = buffer(&allocator);
        let timeline = Timeline::new("producer");
        let mut record = HwcLayer::default();
        let mut slot = LayerSlot::default();

        commit_as(&mut record, &mut slot, &a, CompositionType::Overlay);
        commit_as(&mut record, &mut slot, &a, CompositionType::Framebuffer);

        let (write, _point) = timeline.create_fence();
        a.native_buffer().update_usage(write, BufferAccess::Write);

        let acquire = commit_as(&mut record, &mut slot, &a, CompositionType::Overlay);
        assert!(!acquire.is_signaled());
    }

    #[test]
    fn test_release_fence_round_trip() {
        let allocator = ShmAllocator::default();
        let buf = buffer(&allocator);
        let producer = Timeline::new("producer");
        let display = Timeline::new("display");
        let (write_fence, write_point) = producer.create_fence();
        buf.native_buffer().update_usage(write_fence, BufferAccess::Write);

        let mut record = HwcLayer::default();
        let mut slot = LayerSlot::default();
        let mut layer = Layer::new(&mut record, &mut slot);
        layer
            .setup_layer(LayerType::FramebufferTarget, position(), false, &buf)
            .unwrap();
        layer.set_acquirefence_from(buf.as_ref());

        let (release, release_point) = display.create_fence();
        layer.record.release_fence = release;
        layer.update_from_releasefence(buf.as_ref());

        assert!(layer.record().acquire_fence.is_signaled());
        assert!(layer.record().release_fence.is_signaled());

        let merged = buf.native_buffer().copy_fence();
        write_point.signal();
        assert!(!merged.is_signaled());
        release_point.signal();
        assert!(merged.is_signaled());
    }

    #[test]
    fn test_new_buffer_needs_commit() {
        let allocator = ShmAllocator::default();
        let a = buffer(&allocator);
        let b = buffer(&allocator);
        let mut record = HwcLayer::default();
        let mut slot = LayerSlot::default();
        let mut layer = Layer::new(&mut record, &mut slot);

        layer.setup_layer(LayerType::FramebufferTarget, position(), false, &a).unwrap();
        assert!(!layer
            .setup_layer(LayerType::FramebufferTarget, position(), false, &a)
            .unwrap());
        assert!(layer
            .setup_layer(LayerType::FramebufferTarget, position(), false, &b)
            .unwrap());
    }

    fn any_setup_type() -> impl Strategy<Value = LayerType> {
        prop_oneof![
            Just(LayerType::Skip),
            Just(LayerType::GlRendered),
            Just(LayerType::FramebufferTarget),
        ]
    }

    proptest! {
        #[test]
        fn prop_same_buffer_and_type_commits_only_for_gpu(
            layer_type in any_setup_type(),
            blend in any::<bool>(),
        ) {
            let allocator = ShmAllocator::default();
            let buf = buffer(&allocator);
            let mut record = HwcLayer::default();
            let mut slot = LayerSlot::default();
            let mut layer = Layer::new(&mut record, &mut slot);

            layer.setup_layer(layer_type, position(), blend, &buf).unwrap();
            let again = layer.setup_layer(layer_type, position(), blend, &buf).unwrap();
            prop_assert_eq!(again, layer.needs_gl_render());
        }

        #[test]
        fn prop_different_buffer_always_commits(
            first in any_setup_type(),
            second in any_setup_type(),
        ) {
            let allocator = ShmAllocator::default();
            let a = buffer(&allocator);
            let b = buffer(&allocator);
            let mut record = HwcLayer::default();
            let mut slot = LayerSlot::default();
            let mut layer = Layer::new(&mut record, &mut slot);

            layer.setup_layer(first, position(), false, &a).unwrap();
            prop_assert!(layer.setup_layer(second, position(), false, &b).unwrap());
        }
    }
}
