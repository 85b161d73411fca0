//! GPU compositor
//!
//! [`GlRenderer`] draws a [`RenderableList`] into whatever target is bound
//! on the GL context: the screen on the full-GPU path, or the framebuffer
//! target buffer when the hardware composer rejected some layers.
//!
//! A frame is bracketed by [`GlRenderer::begin`] and [`GlRenderer::end`].
//! `end` returns the fence for the frame's GPU work, records it as read
//! usage on every buffer that was sampled, and evicts textures of
//! renderables that were not drawn.

pub mod backend;
pub mod gles;
pub mod recording;
pub mod shaders;
pub mod tessellation;
pub mod texture_cache;
pub mod transform;

use crate::buffer::{Buffer, BufferAccess, BufferId};
use crate::error::RenderError;
use crate::fence::Fence;
use crate::geometry::Rectangle;
use crate::renderable::{Renderable, RenderableList};
use backend::{GlBackend, ProgramId};
use log::{debug, info, warn};
use shaders::{
    FRAGMENT_SHADER, UNIFORM_ALPHA, UNIFORM_CENTRE, UNIFORM_DISPLAY_TRANSFORM,
    UNIFORM_SCREEN_TO_GL, UNIFORM_TEX, UNIFORM_TRANSFORM, VERTEX_SHADER,
};
use std::sync::Arc;
use tessellation::{Primitive, RectangleTessellator, Tessellator};
use texture_cache::{CacheStats, TextureCache};

/// Alpha values at or above this are treated as fully opaque
const OPAQUE_ALPHA: f32 = 1.0;

pub struct GlRenderer<B: GlBackend> {
    backend: B,
    program: ProgramId,
    tessellator: Box<dyn Tessellator>,
    texture_cache: TextureCache,
    viewport: Option<Rectangle>,
    rotation: Option<f32>,
    /// Scratch space reused across renderables
    primitives: Vec<Primitive>,
    /// Buffers sampled during the frame in progress
    sampled: Vec<Arc<dyn Buffer>>,
    frames: u64,
}

impl<B: GlBackend> GlRenderer<B> {
    /// Builds the composition program and sets up the initial viewport.
    /// Fails if the program does not compile or link.
    pub fn new(mut backend: B, display_area: Rectangle) -> Result<Self, RenderError> {
        let program = backend
            .create_program(VERTEX_SHADER, FRAGMENT_SHADER)
            .map_err(|e| {
                log::error!("❌ Failed to build composition program: {}", e);
                e
            })?;

        backend.use_program(Some(program));
        backend.set_uniform_i32(program, UNIFORM_TEX, 0);
        backend.use_program(None);

        let mut renderer = Self {
            backend,
            program,
            tessellator: Box::new(RectangleTessellator),
            texture_cache: TextureCache::new(),
            viewport: None,
            rotation: None,
            primitives: Vec::new(),
            sampled: Vec::new(),
            frames: 0,
        };
        renderer.set_viewport(display_area);
        renderer.set_rotation(0.0);

        info!(
            "🎨 GL renderer ready ({}x{})",
            display_area.size.width, display_area.size.height
        );
        Ok(renderer)
    }

    /// Replaces the geometry generator (rotation or deformation effects)
    pub fn set_tessellator(&mut self, tessellator: Box<dyn Tessellator>) {
        self.tessellator = tessellator;
    }

    /// Updates the screen-to-GL transform. Returns `false` when the viewport
    /// is unchanged and nothing was recomputed.
    pub fn set_viewport(&mut self, rect: Rectangle) -> bool {
        if self.viewport == Some(rect) {
            return false;
        }
        let matrix = transform::screen_to_gl_coords(&rect);
        self.backend.use_program(Some(self.program));
        self.backend
            .set_uniform_mat4(self.program, UNIFORM_SCREEN_TO_GL, &matrix);
        self.backend.use_program(None);
        self.viewport = Some(rect);
        debug!(
            "📐 Viewport {}x{}+{}+{}",
            rect.size.width, rect.size.height, rect.top_left.x, rect.top_left.y
        );
        true
    }

    /// Updates the display rotation. Returns `false` when the angle is unchanged.
    pub fn set_rotation(&mut self, degrees: f32) -> bool {
        if self.rotation == Some(degrees) {
            return false;
        }
        let matrix = transform::display_rotation(degrees);
        self.backend.use_program(Some(self.program));
        self.backend
            .set_uniform_mat4(self.program, UNIFORM_DISPLAY_TRANSFORM, &matrix);
        self.backend.use_program(None);
        self.rotation = Some(degrees);
        true
    }

    /// Starts a frame by clearing the bound target
    pub fn begin(&mut self) {
        self.sampled.clear();
        self.backend.clear();
    }

    /// Draws every visible renderable, back to front
    pub fn render(&mut self, renderables: &RenderableList) -> Result<(), RenderError> {
        self.backend.use_program(Some(self.program));
        let result = renderables
            .iter()
            .filter(|r| r.visible())
            .try_for_each(|r| self.render_one(r.as_ref()));
        self.backend.use_program(None);
        result
    }

    fn render_one(&mut self, renderable: &dyn Renderable) -> Result<(), RenderError> {
        let program = self.program;
        let buffer = renderable.buffer();
        let rect = renderable.screen_position();

        self.backend
            .set_blending(renderable.shaped() || renderable.alpha() < OPAQUE_ALPHA);

        let (cx, cy) = rect.center();
        self.backend.set_uniform_vec2(program, UNIFORM_CENTRE, cx, cy);
        self.backend
            .set_uniform_mat4(program, UNIFORM_TRANSFORM, &renderable.transformation());
        self.backend
            .set_uniform_f32(program, UNIFORM_ALPHA, renderable.alpha());

        let surface_texture =
            self.texture_cache
                .load(&mut self.backend, renderable.id(), buffer.as_ref())?;

        self.tessellator
            .tessellate(renderable, buffer.size(), &mut self.primitives);
        for primitive in &self.primitives {
            let texture = primitive.texture.unwrap_or(surface_texture);
            self.backend.bind_texture(texture);
            self.backend.draw(program, primitive);
        }

        if !self.sampled.iter().any(|b| b.id() == buffer.id()) {
            self.sampled.push(buffer);
        }
        Ok(())
    }

    /// Finishes the frame.
    ///
    /// The returned fence covers the frame's GPU work. A copy of it is
    /// recorded as read usage on every sampled buffer so producers do not
    /// overwrite content the GPU is still reading.
    pub fn end(&mut self) -> Fence {
        let fence = self.backend.finish();
        for buffer in self.sampled.drain(..) {
            buffer
                .native_buffer()
                .update_usage(fence.copy(), BufferAccess::Read);
        }

        let evicted = self.texture_cache.end_frame(&mut self.backend);
        if evicted > 0 {
            debug!("🗑️ Evicted {} textures", evicted);
        }
        self.frames += 1;
        fence
    }

    /// Forces every texture to be re-uploaded on the next frame, for when
    /// the GL context may have lost its contents (display blanked)
    pub fn suspend(&mut self) {
        debug!("💤 Renderer suspended, textures will be re-uploaded");
        self.texture_cache.suspend();
    }

    pub fn viewport(&self) -> Option<Rectangle> {
        self.viewport
    }

    pub fn rotation(&self) -> Option<f32> {
        self.rotation
    }

    pub fn frames_rendered(&self) -> u64 {
        self.frames
    }

    pub fn texture_cache(&self) -> &TextureCache {
        &self.texture_cache
    }

    pub fn cache_stats(&self) -> &CacheStats {
        self.texture_cache.last_frame_stats()
    }

    /// Buffers sampled so far in the frame in progress
    pub fn sampled_buffers(&self) -> Vec<BufferId> {
        self.sampled.iter().map(|b| b.id()).collect()
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }
}

impl<B: GlBackend> Drop for GlRenderer<B> {
    fn drop(&mut self) {
        if !self.sampled.is_empty() {
            warn!(
                "⚠️ Renderer dropped mid-frame with {} sampled buffers",
                self.sampled.len()
            );
        }
        self.texture_cache.release_all(&mut self.backend);
        self.backend.delete_program(self.program);
    }
}
