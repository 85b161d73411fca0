//! GL backend that records commands instead of executing them
//!
//! Used for headless runs and for inspecting what the renderer asked of the
//! GPU. Buffers are never touched, so no GL context is needed.

use crate::buffer::{Buffer, BufferId};
use crate::error::RenderError;
use crate::fence::Fence;
use crate::renderer::backend::{GlBackend, ProgramId, TextureId};
use crate::renderer::tessellation::Primitive;
use cgmath::Matrix4;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;

/// One recorded draw call with the state it was issued under
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub program: ProgramId,
    pub texture: Option<TextureId>,
    pub blending: bool,
    pub alpha: f32,
    pub primitive: Primitive,
}

/// Everything the renderer asked for, in order
#[derive(Debug, Default, Clone)]
pub struct GlCallLog {
    pub programs_created: usize,
    pub programs_deleted: usize,
    pub clears: usize,
    pub created_textures: Vec<TextureId>,
    pub uploads: Vec<(TextureId, BufferId)>,
    pub deleted_textures: Vec<TextureId>,
    pub draws: Vec<DrawCall>,
    /// `(uniform name, program)` for every matrix uniform update
    pub matrix_updates: Vec<(&'static str, ProgramId)>,
    pub finishes: usize,
}

impl GlCallLog {
    pub fn matrix_updates_of(&self, name: &str) -> usize {
        self.matrix_updates.iter().filter(|(n, _)| *n == name).count()
    }

    /// Textures created and not yet deleted
    pub fn live_textures(&self) -> usize {
        self.created_textures.len() - self.deleted_textures.len()
    }
}

#[derive(Debug, Default)]
pub struct RecordingBackend {
    log: Arc<Mutex<GlCallLog>>,
    next_name: u32,
    bound_texture: Option<TextureId>,
    blending: bool,
    floats: HashMap<&'static str, f32>,
    fail_compile: bool,
    fail_next_upload: bool,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// A backend whose program compilation always fails
    pub fn failing_compile() -> Self {
        Self {
            fail_compile: true,
            ..Self::default()
        }
    }

    pub fn fail_next_upload(&mut self) {
        self.fail_next_upload = true;
    }

    /// Shared handle on the call log, usable after the backend moved into a renderer
    pub fn log(&self) -> Arc<Mutex<GlCallLog>> {
        Arc::clone(&self.log)
    }

    fn next_name(&mut self) -> u32 {
        self.next_name += 1;
        self.next_name
    }
}

impl GlBackend for RecordingBackend {
    fn create_program(&mut self, _vertex_src: &str, _fragment_src: &str) -> Result<ProgramId, RenderError> {
        if self.fail_compile {
            return Err(RenderError::ShaderCompile("recording backend: forced failure".into()));
        }
        self.log.lock().programs_created += 1;
        Ok(ProgramId(self.next_name()))
    }

    fn delete_program(&mut self, _program: ProgramId) {
        self.log.lock().programs_deleted += 1;
    }

    fn use_program(&mut self, _program: Option<ProgramId>) {}

    fn set_uniform_mat4(&mut self, program: ProgramId, name: &'static str, _value: &Matrix4<f32>) {
        self.log.lock().matrix_updates.push((name, program));
    }

    fn set_uniform_vec2(&mut self, _program: ProgramId, _name: &'static str, _x: f32, _y: f32) {}

    fn set_uniform_f32(&mut self, _program: ProgramId, name: &'static str, value: f32) {
        self.floats.insert(name, value);
    }

    fn set_uniform_i32(&mut self, _program: ProgramId, _name: &'static str, _value: i32) {}

    fn set_blending(&mut self, enabled: bool) {
        self.blending = enabled;
    }

    fn clear(&mut self) {
        self.log.lock().clears += 1;
    }

    fn create_texture(&mut self) -> TextureId {
        let texture = TextureId(self.next_name());
        self.bound_texture = Some(texture);
        self.log.lock().created_textures.push(texture);
        texture
    }

    fn bind_texture(&mut self, texture: TextureId) {
        self.bound_texture = Some(texture);
    }

    fn upload_texture(&mut self, texture: TextureId, buffer: &dyn Buffer) -> Result<(), RenderError> {
        if std::mem::take(&mut self.fail_next_upload) {
            return Err(RenderError::Gl(0x0505));
        }
        self.log.lock().uploads.push((texture, buffer.id()));
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        if self.bound_texture == Some(texture) {
            self.bound_texture = None;
        }
        self.log.lock().deleted_textures.push(texture);
    }

    fn draw(&mut self, program: ProgramId, primitive: &Primitive) {
        let call = DrawCall {
            program,
            texture: self.bound_texture,
            blending: self.blending,
            alpha: self.floats.get("alpha").copied().unwrap_or(1.0),
            primitive: primitive.clone(),
        };
        self.log.lock().draws.push(call);
    }

    fn finish(&mut self) -> Fence {
        self.log.lock().finishes += 1;
        Fence::signaled()
    }
}
