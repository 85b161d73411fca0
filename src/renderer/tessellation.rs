//! Turning renderables into drawable primitives

use crate::geometry::Size;
use crate::renderable::Renderable;
use crate::renderer::backend::TextureId;

/// Vertex data as laid out for the GL attribute pointers
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Vertex {
    pub position: [f32; 3],
    pub texcoord: [f32; 2],
}

/// How a primitive's vertices are assembled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrawMode {
    TriangleStrip,
    Triangles,
}

/// One draw call's worth of geometry
#[derive(Debug, Clone, PartialEq)]
pub struct Primitive {
    /// `None` samples the renderable's own surface texture. Decorations may
    /// point at other textures.
    pub texture: Option<TextureId>,
    pub mode: DrawMode,
    pub vertices: Vec<Vertex>,
}

/// Pluggable geometry generation (rotation, deformation effects)
pub trait Tessellator: Send {
    /// Replaces the contents of `out` with the primitives for `renderable`
    fn tessellate(&self, renderable: &dyn Renderable, buffer_size: Size, out: &mut Vec<Primitive>);
}

/// Default tessellation: one textured two-triangle strip covering the
/// renderable's screen rectangle
#[derive(Debug, Default, Clone, Copy)]
pub struct RectangleTessellator;

impl Tessellator for RectangleTessellator {
    fn tessellate(&self, renderable: &dyn Renderable, buffer_size: Size, out: &mut Vec<Primitive>) {
        let rect = renderable.screen_position();
        let left = rect.left() as f32;
        let right = left + rect.size.width as f32;
        let top = rect.top() as f32;
        let bottom = top + rect.size.height as f32;

        // Surfaces larger than their buffer would otherwise divide by zero
        let tex_right = if buffer_size.width > 0 {
            rect.size.width as f32 / buffer_size.width as f32
        } else {
            1.0
        };
        let tex_bottom = if buffer_size.height > 0 {
            rect.size.height as f32 / buffer_size.height as f32
        } else {
            1.0
        };

        out.clear();
        out.push(Primitive {
            texture: None,
            mode: DrawMode::TriangleStrip,
            vertices: vec![
                Vertex { position: [left, top, 0.0], texcoord: [0.0, 0.0] },
                Vertex { position: [left, bottom, 0.0], texcoord: [0.0, tex_bottom] },
                Vertex { position: [right, top, 0.0], texcoord: [tex_right, 0.0] },
                Vertex { position: [right, bottom, 0.0], texcoord: [tex_right, tex_bottom] },
            ],
        });
    }
}
