// GlPixel
// a 2d compositor core for the opengl family of contexts

//! Shader draw path: vertex/texcoord/blend-color attribute streams
//! through one dynamic buffer, a constant color replicated per vertex

use crate::framebuffer::Framebuffer;
use crate::pipeline::{tex_coords, PipelineBase};
use crate::shader::GlShader;
use crate::texture::GlTexture;
use glow::HasContext;

pub const DEFAULT_VERTEX_SHADER: &str = r#"
attribute vec2 VertexCoord;
attribute vec2 TexCoord;
attribute vec4 Color;
uniform mat4 MVPMatrix;
varying vec2 texCoord;
varying vec4 blendColor;
void main() {
    texCoord = TexCoord;
    blendColor = Color;
    gl_Position = MVPMatrix * vec4(VertexCoord, 0.0, 1.0);
}
"#;

pub const DEFAULT_FRAGMENT_SHADER: &str = r#"
varying vec2 texCoord;
varying vec4 blendColor;
uniform sampler2D Texture;
void main() {
    gl_FragColor = blendColor * texture2D(Texture, texCoord);
}
"#;

// interleaved layout: 2 position + 2 texcoord + 4 color floats
const FLOATS_PER_VERTEX: usize = 8;
const VERTEX_STRIDE: i32 = (FLOATS_PER_VERTEX * 4) as i32;

pub struct ShaderPipeline {
    pub base: PipelineBase,
    shader: GlShader,
    vao: Option<glow::VertexArray>,
    vbo: Option<glow::Buffer>,
    vertices: [f32; FLOATS_PER_VERTEX * 4],
    projection: [f32; 16],
}

impl ShaderPipeline {
    pub fn new(gl: &glow::Context, ver: &str) -> Result<Self, String> {
        Self::with_sources(gl, ver, DEFAULT_VERTEX_SHADER, DEFAULT_FRAGMENT_SHADER)
    }

    pub fn with_sources(
        gl: &glow::Context,
        ver: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, String> {
        let shader = GlShader::new(gl, ver, vertex_source, fragment_source)?;
        Self::with_shader(gl, shader)
    }

    /// wrap an already-linked program; it must use the crate's
    /// standard attribute names
    pub fn with_shader(gl: &glow::Context, shader: GlShader) -> Result<Self, String> {
        // the three attributes are bound at fixed locations pre-link,
        // with VertexCoord forced onto 0; some desktop drivers cull
        // draws whose attribute 0 is unused
        debug_assert_eq!(shader.attrib_location(gl, "VertexCoord"), Some(0));

        // VAOs are core in GL3/ES3 and absent in ES2, where attribute
        // state is global anyway
        let vao = unsafe { gl.create_vertex_array().ok() };
        let vbo = unsafe { gl.create_buffer()? };
        unsafe {
            if let Some(vao) = vao {
                gl.bind_vertex_array(Some(vao));
            }
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vbo));
            gl.buffer_data_size(
                glow::ARRAY_BUFFER,
                (FLOATS_PER_VERTEX * 4 * 4) as i32,
                glow::DYNAMIC_DRAW,
            );
            gl.enable_vertex_attrib_array(0);
            gl.enable_vertex_attrib_array(1);
            gl.enable_vertex_attrib_array(2);
            gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, VERTEX_STRIDE, 0);
            gl.vertex_attrib_pointer_f32(1, 2, glow::FLOAT, false, VERTEX_STRIDE, 8);
            gl.vertex_attrib_pointer_f32(2, 4, glow::FLOAT, false, VERTEX_STRIDE, 16);
            if let Some(_vao) = vao {
                gl.bind_vertex_array(None);
            }
        }

        let mut vertices = [0.0f32; FLOATS_PER_VERTEX * 4];
        for v in 0..4 {
            for c in 0..4 {
                vertices[v * FLOATS_PER_VERTEX + 4 + c] = 1.0;
            }
        }

        Ok(ShaderPipeline {
            base: PipelineBase::new(),
            shader,
            vao,
            vbo: Some(vbo),
            vertices,
            projection: crate::framebuffer::ortho(1.0, 1.0, false),
        })
    }

    pub fn shader(&self) -> &GlShader {
        &self.shader
    }

    pub fn activate(&mut self, gl: &glow::Context) {
        self.base.active = true;
        self.shader.bind(gl);
        self.shader.set_uniform_1i(gl, "Texture", 0);
        unsafe {
            gl.active_texture(glow::TEXTURE0);
            if let Some(vao) = self.vao {
                gl.bind_vertex_array(Some(vao));
            } else {
                gl.bind_buffer(glow::ARRAY_BUFFER, self.vbo);
                gl.enable_vertex_attrib_array(0);
                gl.enable_vertex_attrib_array(1);
                gl.enable_vertex_attrib_array(2);
                gl.vertex_attrib_pointer_f32(0, 2, glow::FLOAT, false, VERTEX_STRIDE, 0);
                gl.vertex_attrib_pointer_f32(1, 2, glow::FLOAT, false, VERTEX_STRIDE, 8);
                gl.vertex_attrib_pointer_f32(2, 4, glow::FLOAT, false, VERTEX_STRIDE, 16);
            }
        }
        if let Some(fb) = self.base.framebuffer.as_mut() {
            let proj = fb.activate_begin(gl);
            self.projection = proj;
            self.shader.set_uniform_mat4(gl, "MVPMatrix", &proj);
            fb.activate_finish(gl);
        }
    }

    pub fn deactivate(&mut self, gl: &glow::Context) {
        if let Some(fb) = self.base.framebuffer.as_mut() {
            fb.deactivate(gl);
        }
        unsafe {
            if let Some(_vao) = self.vao {
                gl.bind_vertex_array(None);
            } else {
                gl.disable_vertex_attrib_array(0);
                gl.disable_vertex_attrib_array(1);
                gl.disable_vertex_attrib_array(2);
            }
            gl.use_program(None);
        }
        self.base.active = false;
    }

    pub fn set_framebuffer(
        &mut self,
        gl: &glow::Context,
        fb: Option<Framebuffer>,
    ) -> Option<Framebuffer> {
        let mut old = self.base.framebuffer.take();
        if self.base.active {
            if let Some(fb) = old.as_mut() {
                fb.deactivate(gl);
            }
        }
        self.base.framebuffer = fb;
        if self.base.active {
            if let Some(fb) = self.base.framebuffer.as_mut() {
                let proj = fb.activate_begin(gl);
                self.projection = proj;
                self.shader.set_uniform_mat4(gl, "MVPMatrix", &proj);
                fb.activate_finish(gl);
            }
        }
        old
    }

    /// same rgba into all four vertex slots; the programmable model
    /// has no constant-color call
    pub fn set_color(&mut self, rgba: [f32; 4]) {
        for v in 0..4 {
            self.vertices[v * FLOATS_PER_VERTEX + 4..v * FLOATS_PER_VERTEX + 8]
                .copy_from_slice(&rgba);
        }
    }

    pub fn set_projection(&mut self, gl: &glow::Context, m: &[f32; 16]) {
        self.projection = *m;
        if self.base.active {
            self.shader.set_uniform_mat4(gl, "MVPMatrix", m);
        }
    }

    pub fn draw_texture_coords(&mut self, gl: &glow::Context, tex: &GlTexture, coords: [f32; 8]) {
        let uv = tex_coords(tex);
        for v in 0..4 {
            self.vertices[v * FLOATS_PER_VERTEX] = coords[v * 2];
            self.vertices[v * FLOATS_PER_VERTEX + 1] = coords[v * 2 + 1];
            self.vertices[v * FLOATS_PER_VERTEX + 2] = uv[v * 2];
            self.vertices[v * FLOATS_PER_VERTEX + 3] = uv[v * 2 + 1];
        }
        tex.bind(gl);
        unsafe {
            let bytes = std::slice::from_raw_parts(
                self.vertices.as_ptr() as *const u8,
                self.vertices.len() * 4,
            );
            gl.bind_buffer(glow::ARRAY_BUFFER, self.vbo);
            gl.buffer_sub_data_u8_slice(glow::ARRAY_BUFFER, 0, bytes);
            gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4);
        }
    }

    pub fn free(&mut self, gl: &glow::Context) {
        self.shader.free(gl);
        unsafe {
            if let Some(vbo) = self.vbo.take() {
                gl.delete_buffer(vbo);
            }
            if let Some(vao) = self.vao.take() {
                gl.delete_vertex_array(vao);
            }
        }
    }
}
