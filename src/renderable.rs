//! The compositor's read-only view of on-screen surfaces

use crate::buffer::Buffer;
use crate::geometry::Rectangle;
use cgmath::{Matrix4, SquareMatrix};
use parking_lot::RwLock;
use std::fmt;
use std::sync::Arc;

/// Stable identity of a surface, used as the texture cache key
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RenderableId(pub u64);

impl fmt::Display for RenderableId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A drawable view of one surface for one frame
pub trait Renderable: Send + Sync {
    fn id(&self) -> RenderableId;

    /// The buffer to show this frame. May differ between frames.
    fn buffer(&self) -> Arc<dyn Buffer>;

    fn screen_position(&self) -> Rectangle;

    /// Opacity in `[0, 1]`
    fn alpha(&self) -> f32;

    /// Whether the content has per-pixel transparency
    fn shaped(&self) -> bool;

    /// Transform applied around the centre of the screen rectangle
    fn transformation(&self) -> Matrix4<f32>;

    fn visible(&self) -> bool;

    /// Copies the current state into a value that cannot change while a
    /// composition pass reads it
    fn freeze(&self) -> FrozenRenderable {
        FrozenRenderable {
            id: self.id(),
            state: SurfaceState {
                buffer: self.buffer(),
                position: self.screen_position(),
                alpha: self.alpha(),
                shaped: self.shaped(),
                transformation: self.transformation(),
                visible: self.visible(),
            },
        }
    }
}

/// Paint-ordered (back to front) renderables for one frame
pub type RenderableList = Vec<Arc<dyn Renderable>>;

/// Mutable state behind a [`SurfaceRenderable`]
#[derive(Debug, Clone)]
pub struct SurfaceState {
    pub buffer: Arc<dyn Buffer>,
    pub position: Rectangle,
    pub alpha: f32,
    pub shaped: bool,
    pub transformation: Matrix4<f32>,
    pub visible: bool,
}

/// Renderable backed by scene-owned surface state.
///
/// The scene updates the state between frames (new buffer submitted, window
/// moved); the compositor only ever reads it.
pub struct SurfaceRenderable {
    id: RenderableId,
    state: RwLock<SurfaceState>,
}

impl SurfaceRenderable {
    /// An opaque, visible, untransformed surface
    pub fn new(id: RenderableId, buffer: Arc<dyn Buffer>, position: Rectangle) -> Self {
        Self {
            id,
            state: RwLock::new(SurfaceState {
                buffer,
                position,
                alpha: 1.0,
                shaped: false,
                transformation: Matrix4::identity(),
                visible: true,
            }),
        }
    }

    pub fn with_alpha(self, alpha: f32) -> Self {
        self.state.write().alpha = alpha.clamp(0.0, 1.0);
        self
    }

    pub fn with_shaped(self, shaped: bool) -> Self {
        self.state.write().shaped = shaped;
        self
    }

    pub fn with_transformation(self, transformation: Matrix4<f32>) -> Self {
        self.state.write().transformation = transformation;
        self
    }

    /// Attaches a newly submitted buffer
    pub fn submit_buffer(&self, buffer: Arc<dyn Buffer>) {
        self.state.write().buffer = buffer;
    }

    pub fn move_to(&self, position: Rectangle) {
        self.state.write().position = position;
    }

    pub fn set_alpha(&self, alpha: f32) {
        self.state.write().alpha = alpha.clamp(0.0, 1.0);
    }

    pub fn set_visible(&self, visible: bool) {
        self.state.write().visible = visible;
    }

    pub fn snapshot(&self) -> SurfaceState {
        self.state.read().clone()
    }
}

impl Renderable for SurfaceRenderable {
    fn id(&self) -> RenderableId {
        self.id
    }

    // one read lock, so a concurrent submit lands entirely before or after
    fn freeze(&self) -> FrozenRenderable {
        FrozenRenderable {
            id: self.id,
            state: self.snapshot(),
        }
    }

    fn buffer(&self) -> Arc<dyn Buffer> {
        Arc::clone(&self.state.read().buffer)
    }

    fn screen_position(&self) -> Rectangle {
        self.state.read().position
    }

    fn alpha(&self) -> f32 {
        self.state.read().alpha
    }

    fn shaped(&self) -> bool {
        self.state.read().shaped
    }

    fn transformation(&self) -> Matrix4<f32> {
        self.state.read().transformation
    }

    fn visible(&self) -> bool {
        self.state.read().visible
    }
}

impl fmt::Debug for SurfaceRenderable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.read();
        f.debug_struct("SurfaceRenderable")
            .field("id", &self.id)
            .field("buffer", &state.buffer.id())
            .field("position", &state.position)
            .field("alpha", &state.alpha)
            .field("visible", &state.visible)
            .finish()
    }
}

/// A renderable's state as of one composition pass
#[derive(Debug, Clone)]
pub struct FrozenRenderable {
    id: RenderableId,
    state: SurfaceState,
}

impl Renderable for FrozenRenderable {
    fn id(&self) -> RenderableId {
        self.id
    }

    fn buffer(&self) -> Arc<dyn Buffer> {
        Arc::clone(&self.state.buffer)
    }

    fn screen_position(&self) -> Rectangle {
        self.state.position
    }

    fn alpha(&self) -> f32 {
        self.state.alpha
    }

    fn shaped(&self) -> bool {
        self.state.shaped
    }

    fn transformation(&self) -> Matrix4<f32> {
        self.state.transformation
    }

    fn visible(&self) -> bool {
        self.state.visible
    }

    fn freeze(&self) -> FrozenRenderable {
        self.clone()
    }
}

/// Frozen copies of every renderable, in the original order
pub fn freeze_all(list: &RenderableList) -> RenderableList {
    list.iter()
        .map(|r| Arc::new(r.freeze()) as Arc<dyn Renderable>)
        .collect()
}

/// Frozen copies of the renderables worth drawing: visible, and at least
/// partly inside `view_area`. Keeps the original order.
pub fn renderables_in_view(list: &RenderableList, view_area: &Rectangle) -> RenderableList {
    list.iter()
        .map(|r| r.freeze())
        .filter(|r| r.visible() && r.screen_position().overlaps(view_area))
        .map(|r| Arc::new(r) as Arc<dyn Renderable>)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::{PixelFormat, ShmAllocator};
    use crate::geometry::Size;

    fn surface(id: u64) -> Arc<SurfaceRenderable> {
        let allocator = ShmAllocator::default();
        let buffer = allocator.allocate(Size::new(8, 8), PixelFormat::Abgr8888).unwrap();
        Arc::new(SurfaceRenderable::new(
            RenderableId(id),
            buffer,
            Rectangle::from_xywh(0, 0, 8, 8),
        ))
    }

    #[test]
    fn test_defaults_are_opaque_identity() {
        let s = surface(1);
        assert_eq!(s.alpha(), 1.0);
        assert!(!s.shaped());
        assert!(s.visible());
        assert_eq!(s.transformation(), Matrix4::identity());
    }

    #[test]
    fn test_alpha_is_clamped() {
        let s = surface(1);
        s.set_alpha(1.5);
        assert_eq!(s.alpha(), 1.0);
        s.set_alpha(-0.2);
        assert_eq!(s.alpha(), 0.0);
    }

    fn screen() -> Rectangle {
        Rectangle::from_xywh(0, 0, 64, 48)
    }

    #[test]
    fn test_in_view_drops_hidden_and_keeps_order() {
        let a = surface(1);
        let b = surface(2);
        let c = surface(3);
        b.set_visible(false);

        let list: RenderableList = vec![a, b, c];
        let ids: Vec<_> = renderables_in_view(&list, &screen())
            .iter()
            .map(|r| r.id())
            .collect();
        assert_eq!(ids, vec![RenderableId(1), RenderableId(3)]);
    }

    #[test]
    fn test_in_view_drops_offscreen() {
        let on = surface(1);
        let edge = surface(2);
        let off = surface(3);
        edge.move_to(Rectangle::from_xywh(60, 44, 8, 8));
        off.move_to(Rectangle::from_xywh(64, 0, 8, 8));

        let list: RenderableList = vec![on, edge, off];
        let ids: Vec<_> = renderables_in_view(&list, &screen())
            .iter()
            .map(|r| r.id())
            .collect();
        assert_eq!(ids, vec![RenderableId(1), RenderableId(2)]);
    }

    #[test]
    fn test_frozen_state_ignores_later_updates() {
        let s = surface(1);
        let first = s.buffer().id();
        let list: RenderableList = vec![s.clone()];
        let frozen = freeze_all(&list);

        let allocator = ShmAllocator::default();
        s.submit_buffer(allocator.allocate(Size::new(8, 8), PixelFormat::Abgr8888).unwrap());
        s.set_alpha(0.25);
        s.move_to(Rectangle::from_xywh(5, 5, 8, 8));

        assert_eq!(frozen[0].buffer().id(), first);
        assert_eq!(frozen[0].alpha(), 1.0);
        assert_eq!(frozen[0].screen_position(), Rectangle::from_xywh(0, 0, 8, 8));
        assert_ne!(s.buffer().id(), first);
    }

    #[test]
    fn test_submit_buffer_changes_identity() {
        let s = surface(1);
        let first = s.buffer().id();
        let allocator = ShmAllocator::default();
        s.submit_buffer(allocator.allocate(Size::new(8, 8), PixelFormat::Abgr8888).unwrap());
        assert_ne!(first, s.buffer().id());
    }
}
