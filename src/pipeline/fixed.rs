// GlPixel
// a 2d compositor core for the opengl family of contexts

//! Fixed-function draw path: immediate-mode state plus client arrays,
//! for desktop GL without usable shaders and for GLES1-class contexts

use crate::context::fns::{
    FnVertexPointer, LegacyFns, GL_FASTEST, GL_FLAT, GL_FOG, GL_LIGHTING, GL_MODELVIEW,
    GL_PERSPECTIVE_CORRECTION_HINT, GL_PROJECTION, GL_TEXTURE_COORD_ARRAY, GL_VERTEX_ARRAY,
};
use crate::context::GlCaps;
use crate::framebuffer::Framebuffer;
use crate::pipeline::{tex_coords, PipelineBase};
use crate::texture::GlTexture;
use glow::HasContext;

pub struct FixedFunctionPipeline {
    pub base: PipelineBase,
    color: [f32; 4],
    // captured from the legacy table so draws need no table access
    vertex_pointer: Option<FnVertexPointer>,
    tex_coord_pointer: Option<FnVertexPointer>,
}

impl FixedFunctionPipeline {
    pub fn new(legacy: &LegacyFns) -> Self {
        FixedFunctionPipeline {
            base: PipelineBase::new(),
            color: [1.0, 1.0, 1.0, 1.0],
            vertex_pointer: legacy.vertex_pointer,
            tex_coord_pointer: legacy.tex_coord_pointer,
        }
    }

    pub fn activate(&mut self, gl: &glow::Context, legacy: &LegacyFns, caps: GlCaps) {
        self.base.active = true;
        unsafe {
            gl.disable(GL_LIGHTING);
            gl.disable(GL_FOG);
            if let Some(shade_model) = legacy.shade_model {
                shade_model(GL_FLAT);
            }
            if let Some(hint) = legacy.hint {
                hint(GL_PERSPECTIVE_CORRECTION_HINT, GL_FASTEST);
            }
            if let Some(enable_client_state) = legacy.enable_client_state {
                enable_client_state(GL_VERTEX_ARRAY);
                enable_client_state(GL_TEXTURE_COORD_ARRAY);
            }
            if caps.contains(GlCaps::MULTITEXTURE_SUPPORTED) {
                gl.active_texture(glow::TEXTURE0);
            }
            gl.enable(glow::TEXTURE_2D);
            if let Some(color4f) = legacy.color4f {
                color4f(self.color[0], self.color[1], self.color[2], self.color[3]);
            }
        }
        if let Some(fb) = self.base.framebuffer.as_mut() {
            let proj = fb.activate_begin(gl);
            apply_projection(legacy, &proj);
            fb.activate_finish(gl);
        }
    }

    pub fn deactivate(&mut self, gl: &glow::Context, legacy: &LegacyFns) {
        if let Some(fb) = self.base.framebuffer.as_mut() {
            fb.deactivate(gl);
        }
        unsafe {
            if let Some(disable_client_state) = legacy.disable_client_state {
                disable_client_state(GL_VERTEX_ARRAY);
                disable_client_state(GL_TEXTURE_COORD_ARRAY);
            }
            gl.disable(glow::TEXTURE_2D);
        }
        self.base.active = false;
    }

    pub fn set_framebuffer(
        &mut self,
        gl: &glow::Context,
        legacy: &LegacyFns,
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
                apply_projection(legacy, &proj);
                fb.activate_finish(gl);
            }
        }
        old
    }

    pub fn set_color(&mut self, _gl: &glow::Context, legacy: &LegacyFns, rgba: [f32; 4]) {
        self.color = rgba;
        if self.base.active {
            if let Some(color4f) = legacy.color4f {
                unsafe {
                    color4f(rgba[0], rgba[1], rgba[2], rgba[3]);
                }
            }
        }
    }

    /// no-op while inactive so setup code cannot thrash matrix modes
    pub fn set_projection(&mut self, _gl: &glow::Context, legacy: &LegacyFns, m: &[f32; 16]) {
        if self.base.active {
            apply_projection(legacy, m);
        }
    }

    pub fn draw_texture_coords(&mut self, gl: &glow::Context, tex: &GlTexture, coords: [f32; 8]) {
        let uv = tex_coords(tex);
        tex.bind(gl);
        unsafe {
            if let (Some(vertex_pointer), Some(tex_coord_pointer)) =
                (self.vertex_pointer, self.tex_coord_pointer)
            {
                vertex_pointer(2, glow::FLOAT, 0, coords.as_ptr() as *const _);
                tex_coord_pointer(2, glow::FLOAT, 0, uv.as_ptr() as *const _);
                gl.draw_arrays(glow::TRIANGLE_STRIP, 0, 4);
            }
        }
    }
}

fn apply_projection(legacy: &LegacyFns, m: &[f32; 16]) {
    if let (Some(matrix_mode), Some(load_matrixf)) = (legacy.matrix_mode, legacy.load_matrixf) {
        unsafe {
            matrix_mode(GL_PROJECTION);
            load_matrixf(m.as_ptr());
            matrix_mode(GL_MODELVIEW);
        }
    }
}
