// GlPixel
// a 2d compositor core for the opengl family of contexts

//! Pipeline abstraction: how a textured quad becomes pixels
//!
//! A closed set of variants, one active at a time: fixed-function
//! (legacy state + client arrays), shader (attribute streams through a
//! dynamic buffer), palette lookup (shader plus a second sampler) and
//! multi-pass (externally authored preset chain). Activating a
//! pipeline activates its associated framebuffer; deactivation runs in
//! the opposite order.

use crate::context::{GlCaps, LegacyFns};
use crate::framebuffer::Framebuffer;
use crate::texture::GlTexture;

pub mod clut;
pub mod fixed;
pub mod multipass;
pub mod shader;

pub use clut::ClutLookupPipeline;
pub use fixed::FixedFunctionPipeline;
pub use multipass::MultiPassPipeline;
pub use shader::ShaderPipeline;

/// state every pipeline variant carries
pub struct PipelineBase {
    pub framebuffer: Option<Framebuffer>,
    pub active: bool,
}

impl PipelineBase {
    pub fn new() -> Self {
        PipelineBase {
            framebuffer: None,
            active: false,
        }
    }
}

impl Default for PipelineBase {
    fn default() -> Self {
        PipelineBase::new()
    }
}

/// expand a destination rect and a texture's coordinate rect into the
/// triangle-strip layout every variant draws: TL, TR, BL, BR
pub fn quad_coords(x: f32, y: f32, w: f32, h: f32) -> [f32; 8] {
    [x, y, x + w, y, x, y + h, x + w, y + h]
}

pub fn tex_coords(tex: &GlTexture) -> [f32; 8] {
    let (u, v) = tex.coords();
    [0.0, 0.0, u, 0.0, 0.0, v, u, v]
}

pub enum Pipeline {
    FixedFunction(FixedFunctionPipeline),
    Shader(ShaderPipeline),
    ClutLookup(ClutLookupPipeline),
    MultiPass(MultiPassPipeline),
}

impl Pipeline {
    fn base(&self) -> &PipelineBase {
        match self {
            Pipeline::FixedFunction(p) => &p.base,
            Pipeline::Shader(p) => &p.base,
            Pipeline::ClutLookup(p) => &p.inner.base,
            Pipeline::MultiPass(p) => p.base(),
        }
    }

    pub fn is_active(&self) -> bool {
        self.base().active
    }

    pub fn framebuffer(&self) -> Option<&Framebuffer> {
        self.base().framebuffer.as_ref()
    }

    pub fn framebuffer_mut(&mut self) -> Option<&mut Framebuffer> {
        match self {
            Pipeline::FixedFunction(p) => p.base.framebuffer.as_mut(),
            Pipeline::Shader(p) => p.base.framebuffer.as_mut(),
            Pipeline::ClutLookup(p) => p.inner.base.framebuffer.as_mut(),
            Pipeline::MultiPass(p) => p.framebuffer_mut(),
        }
    }

    pub fn activate(&mut self, gl: &glow::Context, legacy: &LegacyFns, caps: GlCaps) {
        match self {
            Pipeline::FixedFunction(p) => p.activate(gl, legacy, caps),
            Pipeline::Shader(p) => p.activate(gl),
            Pipeline::ClutLookup(p) => p.activate(gl),
            Pipeline::MultiPass(p) => p.activate(gl),
        }
    }

    pub fn deactivate(&mut self, gl: &glow::Context, legacy: &LegacyFns) {
        match self {
            Pipeline::FixedFunction(p) => p.deactivate(gl, legacy),
            Pipeline::Shader(p) => p.deactivate(gl),
            Pipeline::ClutLookup(p) => p.deactivate(gl),
            Pipeline::MultiPass(p) => p.deactivate(gl),
        }
    }

    /// install a framebuffer, returning the previous one
    ///
    /// An active pipeline tears the outgoing target down before
    /// bringing the incoming one up.
    pub fn set_framebuffer(
        &mut self,
        gl: &glow::Context,
        legacy: &LegacyFns,
        fb: Option<Framebuffer>,
    ) -> Option<Framebuffer> {
        match self {
            Pipeline::FixedFunction(p) => p.set_framebuffer(gl, legacy, fb),
            Pipeline::Shader(p) => p.set_framebuffer(gl, fb),
            Pipeline::ClutLookup(p) => p.inner.set_framebuffer(gl, fb),
            Pipeline::MultiPass(p) => p.set_framebuffer(gl, fb),
        }
    }

    pub fn set_color(&mut self, gl: &glow::Context, legacy: &LegacyFns, rgba: [f32; 4]) {
        match self {
            Pipeline::FixedFunction(p) => p.set_color(gl, legacy, rgba),
            Pipeline::Shader(p) => p.set_color(rgba),
            Pipeline::ClutLookup(p) => p.inner.set_color(rgba),
            Pipeline::MultiPass(p) => p.set_color(rgba),
        }
    }

    /// applied by framebuffer activation, not by client code
    pub fn set_projection(&mut self, gl: &glow::Context, legacy: &LegacyFns, m: &[f32; 16]) {
        match self {
            Pipeline::FixedFunction(p) => p.set_projection(gl, legacy, m),
            Pipeline::Shader(p) => p.set_projection(gl, m),
            Pipeline::ClutLookup(p) => p.inner.set_projection(gl, m),
            Pipeline::MultiPass(p) => p.set_projection(gl, m),
        }
    }

    /// start a presented frame; advances the multi-pass frame counter
    pub fn begin_frame(&mut self) {
        if let Pipeline::MultiPass(p) = self {
            p.begin_frame();
        }
    }

    pub fn draw_texture_coords(&mut self, gl: &glow::Context, tex: &GlTexture, coords: [f32; 8]) {
        match self {
            Pipeline::FixedFunction(p) => p.draw_texture_coords(gl, tex, coords),
            Pipeline::Shader(p) => p.draw_texture_coords(gl, tex, coords),
            Pipeline::ClutLookup(p) => p.draw_texture_coords(gl, tex, coords),
            Pipeline::MultiPass(p) => p.draw_texture_coords(gl, tex, coords),
        }
    }

    /// quad convenience over [`Pipeline::draw_texture_coords`]
    pub fn draw_texture(
        &mut self,
        gl: &glow::Context,
        tex: &GlTexture,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    ) {
        self.draw_texture_coords(gl, tex, quad_coords(x, y, w, h));
    }

    /// draw through the preset chain when one is loaded; only the
    /// content layer opts in, every other layer draws plainly
    pub fn draw_texture_processed(
        &mut self,
        gl: &glow::Context,
        tex: &GlTexture,
        x: f32,
        y: f32,
        w: f32,
        h: f32,
    ) {
        let coords = quad_coords(x, y, w, h);
        match self {
            Pipeline::MultiPass(p) => p.draw_texture_coords_processed(gl, tex, coords),
            _ => self.draw_texture_coords(gl, tex, coords),
        }
    }

    pub fn free(&mut self, gl: &glow::Context) {
        match self {
            Pipeline::FixedFunction(_) => {}
            Pipeline::Shader(p) => p.free(gl),
            Pipeline::ClutLookup(p) => p.inner.free(gl),
            Pipeline::MultiPass(p) => p.free(gl),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_winding() {
        // TL, TR, BL, BR triangle strip order
        let q = quad_coords(10.0, 20.0, 100.0, 50.0);
        assert_eq!(q, [10.0, 20.0, 110.0, 20.0, 10.0, 70.0, 110.0, 70.0]);
    }
}
