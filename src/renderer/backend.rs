//! GL command seam used by the renderer
//!
//! [`GlRenderer`](super::GlRenderer) issues every GPU command through this
//! trait so the same composition logic drives a real GLES context
//! ([`GlesBackend`](super::gles::GlesBackend)) or a recording stand-in
//! ([`RecordingBackend`](super::recording::RecordingBackend)).

use crate::buffer::Buffer;
use crate::error::RenderError;
use crate::fence::Fence;
use crate::renderer::tessellation::Primitive;
use cgmath::Matrix4;

/// GL texture name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureId(pub u32);

/// GL program name
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProgramId(pub u32);

/// Subset of GL the compositor needs
pub trait GlBackend: Send {
    /// Compiles and links a program. Failure is fatal for the renderer.
    fn create_program(&mut self, vertex_src: &str, fragment_src: &str) -> Result<ProgramId, RenderError>;

    fn delete_program(&mut self, program: ProgramId);

    fn use_program(&mut self, program: Option<ProgramId>);

    fn set_uniform_mat4(&mut self, program: ProgramId, name: &'static str, value: &Matrix4<f32>);

    fn set_uniform_vec2(&mut self, program: ProgramId, name: &'static str, x: f32, y: f32);

    fn set_uniform_f32(&mut self, program: ProgramId, name: &'static str, value: f32);

    fn set_uniform_i32(&mut self, program: ProgramId, name: &'static str, value: i32);

    /// Source-over alpha blending on or off
    fn set_blending(&mut self, enabled: bool);

    fn clear(&mut self);

    /// Creates a texture with clamp-to-edge wrapping and linear filtering,
    /// leaving it bound
    fn create_texture(&mut self) -> TextureId;

    fn bind_texture(&mut self, texture: TextureId);

    /// Uploads `buffer` into `texture`, which must already be bound
    fn upload_texture(&mut self, texture: TextureId, buffer: &dyn Buffer) -> Result<(), RenderError>;

    fn delete_texture(&mut self, texture: TextureId);

    /// Draws one primitive with the bound program and texture
    fn draw(&mut self, program: ProgramId, primitive: &Primitive);

    /// Flushes queued commands and returns a fence for their completion
    fn finish(&mut self) -> Fence;
}
