//! OpenGL ES 2 backend on top of the `gl` bindings
//!
//! The embedder owns the EGL display/context and makes it current on the
//! compositor thread before any call; this backend only issues GL commands.

use crate::buffer::Buffer;
use crate::error::RenderError;
use crate::fence::Fence;
use crate::renderer::backend::{GlBackend, ProgramId, TextureId};
use crate::renderer::shaders::{ATTRIB_POSITION, ATTRIB_TEXCOORD};
use crate::renderer::tessellation::{DrawMode, Primitive, Vertex};
use cgmath::Matrix4;
use gl::types::{GLchar, GLenum, GLint, GLsizei, GLuint};
use log::{debug, error};
use std::collections::HashMap;
use std::ffi::{c_void, CString};
use std::ptr;

#[derive(Debug, Default)]
pub struct GlesBackend {
    uniforms: HashMap<(GLuint, &'static str), GLint>,
    attributes: HashMap<(GLuint, &'static str), GLint>,
}

impl GlesBackend {
    /// Resolves GL entry points through `loader` (typically `eglGetProcAddress`)
    pub fn load_with<F>(loader: F) -> Self
    where
        F: FnMut(&'static str) -> *const c_void,
    {
        gl::load_with(loader);
        Self::default()
    }

    fn uniform_location(&mut self, program: ProgramId, name: &'static str) -> GLint {
        *self.uniforms.entry((program.0, name)).or_insert_with(|| {
            let cname = CString::new(name).unwrap_or_default();
            // SAFETY: `cname` is NUL terminated and outlives the call
            unsafe { gl::GetUniformLocation(program.0, cname.as_ptr()) }
        })
    }

    fn attribute_location(&mut self, program: ProgramId, name: &'static str) -> GLint {
        *self.attributes.entry((program.0, name)).or_insert_with(|| {
            let cname = CString::new(name).unwrap_or_default();
            // SAFETY: as above
            unsafe { gl::GetAttribLocation(program.0, cname.as_ptr()) }
        })
    }

    fn compile_shader(kind: GLenum, src: &str) -> Result<GLuint, RenderError> {
        let csrc = CString::new(src)
            .map_err(|e| RenderError::ShaderCompile(format!("shader source contains NUL: {}", e)))?;
        // SAFETY: plain GL calls on a current context; pointers are valid for the call
        unsafe {
            let shader = gl::CreateShader(kind);
            gl::ShaderSource(shader, 1, &csrc.as_ptr(), ptr::null());
            gl::CompileShader(shader);

            let mut status = GLint::from(gl::FALSE);
            gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut status);
            if status != GLint::from(gl::TRUE) {
                let mut len: GLint = 0;
                gl::GetShaderiv(shader, gl::INFO_LOG_LENGTH, &mut len);
                let mut log = vec![0u8; len.max(1) as usize];
                gl::GetShaderInfoLog(
                    shader,
                    len,
                    ptr::null_mut(),
                    log.as_mut_ptr() as *mut GLchar,
                );
                gl::DeleteShader(shader);
                let msg = String::from_utf8_lossy(&log).trim_end_matches('\0').to_string();
                return Err(RenderError::ShaderCompile(msg));
            }
            Ok(shader)
        }
    }
}

impl GlBackend for GlesBackend {
    fn create_program(&mut self, vertex_src: &str, fragment_src: &str) -> Result<ProgramId, RenderError> {
        let vertex = Self::compile_shader(gl::VERTEX_SHADER, vertex_src)?;
        let fragment = match Self::compile_shader(gl::FRAGMENT_SHADER, fragment_src) {
            Ok(fragment) => fragment,
            Err(e) => {
                // SAFETY: `vertex` is a shader name created above
                unsafe { gl::DeleteShader(vertex) };
                return Err(e);
            }
        };

        // SAFETY: plain GL calls on a current context
        unsafe {
            let program = gl::CreateProgram();
            gl::AttachShader(program, vertex);
            gl::AttachShader(program, fragment);
            gl::LinkProgram(program);
            gl::DeleteShader(vertex);
            gl::DeleteShader(fragment);

            let mut status = GLint::from(gl::FALSE);
            gl::GetProgramiv(program, gl::LINK_STATUS, &mut status);
            if status != GLint::from(gl::TRUE) {
                let mut len: GLint = 0;
                gl::GetProgramiv(program, gl::INFO_LOG_LENGTH, &mut len);
                let mut log = vec![0u8; len.max(1) as usize];
                gl::GetProgramInfoLog(
                    program,
                    len,
                    ptr::null_mut(),
                    log.as_mut_ptr() as *mut GLchar,
                );
                gl::DeleteProgram(program);
                let msg = String::from_utf8_lossy(&log).trim_end_matches('\0').to_string();
                error!("❌ GL program link failed: {}", msg);
                return Err(RenderError::ProgramLink(msg));
            }
            debug!("🎨 Linked GL program {}", program);
            Ok(ProgramId(program))
        }
    }

    fn delete_program(&mut self, program: ProgramId) {
        self.uniforms.retain(|(p, _), _| *p != program.0);
        self.attributes.retain(|(p, _), _| *p != program.0);
        // SAFETY: deleting an unknown name is a GL no-op
        unsafe { gl::DeleteProgram(program.0) };
    }

    fn use_program(&mut self, program: Option<ProgramId>) {
        // SAFETY: plain GL call
        unsafe { gl::UseProgram(program.map_or(0, |p| p.0)) };
    }

    fn set_uniform_mat4(&mut self, program: ProgramId, name: &'static str, value: &Matrix4<f32>) {
        let loc = self.uniform_location(program, name);
        let columns: &[f32; 16] = value.as_ref();
        // SAFETY: `columns` holds 16 floats in column-major order
        unsafe { gl::UniformMatrix4fv(loc, 1, gl::FALSE, columns.as_ptr()) };
    }

    fn set_uniform_vec2(&mut self, program: ProgramId, name: &'static str, x: f32, y: f32) {
        let loc = self.uniform_location(program, name);
        // SAFETY: plain GL call
        unsafe { gl::Uniform2f(loc, x, y) };
    }

    fn set_uniform_f32(&mut self, program: ProgramId, name: &'static str, value: f32) {
        let loc = self.uniform_location(program, name);
        // SAFETY: plain GL call
        unsafe { gl::Uniform1f(loc, value) };
    }

    fn set_uniform_i32(&mut self, program: ProgramId, name: &'static str, value: i32) {
        let loc = self.uniform_location(program, name);
        // SAFETY: plain GL call
        unsafe { gl::Uniform1i(loc, value) };
    }

    fn set_blending(&mut self, enabled: bool) {
        // SAFETY: plain GL calls
        unsafe {
            if enabled {
                gl::Enable(gl::BLEND);
                gl::BlendFunc(gl::SRC_ALPHA, gl::ONE_MINUS_SRC_ALPHA);
            } else {
                gl::Disable(gl::BLEND);
            }
        }
    }

    fn clear(&mut self) {
        // SAFETY: plain GL call
        unsafe { gl::Clear(gl::COLOR_BUFFER_BIT) };
    }

    fn create_texture(&mut self) -> TextureId {
        let mut name: GLuint = 0;
        // SAFETY: `name` receives exactly one texture name
        unsafe {
            gl::GenTextures(1, &mut name);
            gl::BindTexture(gl::TEXTURE_2D, name);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::LINEAR as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::LINEAR as GLint);
        }
        TextureId(name)
    }

    fn bind_texture(&mut self, texture: TextureId) {
        // SAFETY: plain GL call
        unsafe { gl::BindTexture(gl::TEXTURE_2D, texture.0) };
    }

    fn upload_texture(&mut self, _texture: TextureId, buffer: &dyn Buffer) -> Result<(), RenderError> {
        buffer.bind_to_texture()?;
        Ok(())
    }

    fn delete_texture(&mut self, texture: TextureId) {
        // SAFETY: `texture.0` is a single texture name
        unsafe { gl::DeleteTextures(1, &texture.0) };
    }

    fn draw(&mut self, program: ProgramId, primitive: &Primitive) {
        if primitive.vertices.is_empty() {
            return;
        }
        let position = self.attribute_location(program, ATTRIB_POSITION);
        let texcoord = self.attribute_location(program, ATTRIB_TEXCOORD);
        if position < 0 || texcoord < 0 {
            error!("❌ GL program {} lacks vertex attributes", program.0);
            return;
        }
        let floats: &[f32] = bytemuck::cast_slice(&primitive.vertices);
        let stride = std::mem::size_of::<Vertex>() as GLsizei;
        let mode = match primitive.mode {
            DrawMode::TriangleStrip => gl::TRIANGLE_STRIP,
            DrawMode::Triangles => gl::TRIANGLES,
        };

        // SAFETY: client-side vertex arrays point into `floats`, which lives
        // until DrawArrays returns; offsets match the `Vertex` layout.
        unsafe {
            gl::BindBuffer(gl::ARRAY_BUFFER, 0);
            gl::EnableVertexAttribArray(position as GLuint);
            gl::EnableVertexAttribArray(texcoord as GLuint);
            gl::VertexAttribPointer(
                position as GLuint,
                3,
                gl::FLOAT,
                gl::FALSE,
                stride,
                floats.as_ptr() as *const c_void,
            );
            gl::VertexAttribPointer(
                texcoord as GLuint,
                2,
                gl::FLOAT,
                gl::FALSE,
                stride,
                floats.as_ptr().add(3) as *const c_void,
            );
            gl::DrawArrays(mode, 0, primitive.vertices.len() as GLsizei);
            gl::DisableVertexAttribArray(texcoord as GLuint);
            gl::DisableVertexAttribArray(position as GLuint);
        }
    }

    fn finish(&mut self) -> Fence {
        // Without native fence sync the frame is complete once glFinish returns
        // SAFETY: plain GL call
        unsafe { gl::Finish() };
        Fence::signaled()
    }
}
