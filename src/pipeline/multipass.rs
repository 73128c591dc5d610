// GlPixel
// a 2d compositor core for the opengl family of contexts

//! Multi-pass post-processing: a preset-described chain of shader
//! passes, each rendering into a private texture target that feeds the
//! next pass, with the last output composited into the caller's
//! framebuffer
//!
//! Every pass shader is a single source file compiled twice, once with
//! VERTEX defined and once with FRAGMENT. The Prev samplers are bound
//! to the chain input of the current frame, not to true frame history.

use std::fs;

use log::warn;

use crate::framebuffer::{Framebuffer, TextureTarget};
use crate::pipeline::shader::ShaderPipeline;
use crate::pipeline::{quad_coords, PipelineBase};
use crate::preset::{AxisScale, DecoderRegistry, Pass, ShaderPreset};
use crate::shader::GlShader;
use crate::texture::{FilterMode, GlTexture};
use crate::util::Rect;
use glow::HasContext;

/// size one axis of a pass target
fn resolve_axis(scale: AxisScale, input: u32, viewport: u32) -> u32 {
    match scale {
        AxisScale::Source(f) => ((input as f32 * f) as u32).max(1),
        AxisScale::Viewport(f) => ((viewport as f32 * f) as u32).max(1),
        AxisScale::Absolute(px) => px.max(1),
        AxisScale::Full => viewport.max(1),
    }
}

struct PassRuntime {
    /// owns the pass shader and its texture target framebuffer
    pipeline: ShaderPipeline,
    config: Pass,
}

impl PassRuntime {
    fn output(&self) -> Option<&GlTexture> {
        match self.pipeline.base.framebuffer.as_ref() {
            Some(Framebuffer::Target(t)) => Some(t.texture()),
            _ => None,
        }
    }

    fn set_output_size(&mut self, gl: &glow::Context, npot_supported: bool, w: u32, h: u32) {
        if let Some(Framebuffer::Target(t)) = self.pipeline.base.framebuffer.as_mut() {
            t.set_size(gl, npot_supported, w, h);
        }
    }

    fn set_output_filter(&mut self, gl: &glow::Context, filter: FilterMode) {
        if let Some(Framebuffer::Target(t)) = self.pipeline.base.framebuffer.as_mut() {
            t.set_filter(gl, filter);
        }
    }
}

struct LutTexture {
    id: String,
    texture: GlTexture,
}

pub struct MultiPassPipeline {
    /// final composite path, also carries the caller's framebuffer
    inner: ShaderPipeline,
    passes: Vec<PassRuntime>,
    luts: Vec<LutTexture>,
    npot_supported: bool,
    frame_count: u32,
    cached_input: (u32, u32),
    cached_viewport: (u32, u32),
}

impl MultiPassPipeline {
    /// build the pass chain for a parsed preset
    ///
    /// `rich_targets` allows float and sRGB pass framebuffers; dialects
    /// without those storage formats fall back to plain RGBA with a
    /// warning.
    pub fn new(
        gl: &glow::Context,
        ver: &str,
        preset: &ShaderPreset,
        decoders: &DecoderRegistry,
        npot_supported: bool,
        rich_targets: bool,
        generation: u64,
    ) -> Result<Self, String> {
        let inner = ShaderPipeline::new(gl, ver)?;

        let mut passes = Vec::with_capacity(preset.passes.len());
        for config in &preset.passes {
            let source = fs::read_to_string(&config.shader_path).map_err(|e| {
                format!("cannot read shader {}: {}", config.shader_path.display(), e)
            })?;
            let vertex = format!("#define VERTEX\n{}", source);
            let fragment = format!("#define FRAGMENT\n{}", source);
            let shader = GlShader::new(gl, ver, &vertex, &fragment)?;
            let mut pipeline = ShaderPipeline::with_shader(gl, shader)?;

            let mut target = TextureTarget::with_texture(target_texture(config, rich_targets));
            target.create(gl, generation)?;
            pipeline.base.framebuffer = Some(Framebuffer::Target(target));
            passes.push(PassRuntime {
                pipeline,
                config: config.clone(),
            });
        }

        let mut luts = Vec::with_capacity(preset.textures.len());
        for entry in &preset.textures {
            let image = decoders.decode(&entry.path)?;
            let mut texture =
                GlTexture::new(glow::RGBA as i32, glow::RGBA, glow::UNSIGNED_BYTE, 4);
            texture.create(gl, generation)?;
            texture.set_size(gl, npot_supported, image.width, image.height);
            if entry.linear {
                texture.set_filter(gl, FilterMode::Linear);
            }
            texture.update_area(
                gl,
                Rect::new(0, 0, image.width, image.height),
                &image.rgba,
                image.width as usize * 4,
            );
            luts.push(LutTexture {
                id: entry.id.clone(),
                texture,
            });
        }

        Ok(MultiPassPipeline {
            inner,
            passes,
            luts,
            npot_supported,
            frame_count: 0,
            cached_input: (0, 0),
            cached_viewport: (0, 0),
        })
    }

    pub fn base(&self) -> &PipelineBase {
        &self.inner.base
    }

    pub fn framebuffer_mut(&mut self) -> Option<&mut Framebuffer> {
        self.inner.base.framebuffer.as_mut()
    }

    pub fn activate(&mut self, gl: &glow::Context) {
        self.inner.activate(gl);
    }

    pub fn deactivate(&mut self, gl: &glow::Context) {
        self.inner.deactivate(gl);
    }

    pub fn set_framebuffer(
        &mut self,
        gl: &glow::Context,
        fb: Option<Framebuffer>,
    ) -> Option<Framebuffer> {
        self.inner.set_framebuffer(gl, fb)
    }

    pub fn set_color(&mut self, rgba: [f32; 4]) {
        self.inner.set_color(rgba);
    }

    pub fn set_projection(&mut self, gl: &glow::Context, m: &[f32; 16]) {
        self.inner.set_projection(gl, m);
    }

    /// advance the pass-chain frame counter; once per presented frame,
    /// not per draw
    pub fn begin_frame(&mut self) {
        self.frame_count = self.frame_count.wrapping_add(1);
    }

    /// plain draw through the composite path, bypassing the chain;
    /// used for every layer the preset was not authored for
    pub fn draw_texture_coords(&mut self, gl: &glow::Context, tex: &GlTexture, coords: [f32; 8]) {
        self.inner.draw_texture_coords(gl, tex, coords);
    }

    /// run the chain on `tex` and composite the last pass's output at
    /// the caller's coordinates
    pub fn draw_texture_coords_processed(
        &mut self,
        gl: &glow::Context,
        tex: &GlTexture,
        coords: [f32; 8],
    ) {
        if self.passes.is_empty() {
            self.inner.draw_texture_coords(gl, tex, coords);
            return;
        }

        let viewport = match self.inner.base.framebuffer.as_ref() {
            Some(fb) => {
                let v = fb.viewport();
                (v[2].max(1) as u32, v[3].max(1) as u32)
            }
            None => (1, 1),
        };
        let input = (tex.logical_width(), tex.logical_height());
        if input != self.cached_input || viewport != self.cached_viewport {
            self.recompute_sizes(gl, input, viewport);
        }

        // run the chain with the caller's framebuffer parked on the
        // deactivated composite pipeline
        self.inner.deactivate(gl);
        for p in 0..self.passes.len() {
            self.render_pass(gl, p, tex, viewport);
        }
        self.inner.activate(gl);

        let last = &self.passes[self.passes.len() - 1];
        if let Some(output) = last.output() {
            self.inner.draw_texture_coords(gl, output, coords);
        }
    }

    pub fn free(&mut self, gl: &glow::Context) {
        for pass in &mut self.passes {
            if let Some(Framebuffer::Target(mut t)) = pass.pipeline.base.framebuffer.take() {
                t.destroy(gl);
            }
            pass.pipeline.free(gl);
        }
        self.passes.clear();
        for lut in &mut self.luts {
            lut.texture.destroy(gl);
        }
        self.luts.clear();
        self.inner.free(gl);
    }

    fn recompute_sizes(&mut self, gl: &glow::Context, input: (u32, u32), viewport: (u32, u32)) {
        self.cached_input = input;
        self.cached_viewport = viewport;
        let (mut src_w, mut src_h) = input;
        for pass in &mut self.passes {
            let w = resolve_axis(pass.config.scale_x, src_w, viewport.0);
            let h = resolve_axis(pass.config.scale_y, src_h, viewport.1);
            pass.set_output_size(gl, self.npot_supported, w, h);
            src_w = w;
            src_h = h;
        }
        // a pass's linear-filter request applies to its input, which
        // is the previous pass's output
        for p in 1..self.passes.len() {
            if let Some(linear) = self.passes[p].config.filter_linear {
                let filter = if linear {
                    FilterMode::Linear
                } else {
                    FilterMode::Nearest
                };
                self.passes[p - 1].set_output_filter(gl, filter);
            }
        }
    }

    fn render_pass(&mut self, gl: &glow::Context, p: usize, chain_input: &GlTexture, viewport: (u32, u32)) {
        let (before, rest) = self.passes.split_at_mut(p);
        let pass = &mut rest[0];
        let input: &GlTexture = if p == 0 {
            chain_input
        } else {
            match before[p - 1].output() {
                Some(t) => t,
                None => return,
            }
        };
        if pass.config.mipmap_input {
            input.generate_mipmap(gl);
        }
        let (out_w, out_h) = match pass.output() {
            Some(t) => (t.logical_width(), t.logical_height()),
            None => return,
        };

        pass.pipeline.activate(gl);
        let shader = pass.pipeline.shader();
        shader.set_uniform_2f(gl, "OutputSize", viewport.0 as f32, viewport.1 as f32);
        let frame = effective_frame(self.frame_count, pass.config.frame_count_mod);
        shader.set_uniform_1i(gl, "FrameCount", frame as i32);
        set_input_uniforms(gl, shader, "", input);

        // auxiliary samplers on units 1 and up
        let mut unit = 1u32;
        let mut bind_aux = |gl: &glow::Context, tex: &GlTexture, names: &[&str]| {
            unsafe {
                gl.active_texture(glow::TEXTURE0 + unit);
                gl.bind_texture(glow::TEXTURE_2D, tex.handle());
            }
            for name in names {
                shader.set_uniform_1i(gl, &format!("{}Texture", name), unit as i32);
                set_input_uniforms(gl, shader, name, tex);
            }
            unit += 1;
        };

        // the chain input of the current frame stands in for history
        bind_aux(gl, chain_input, &["Prev", "Prev1", "Prev2", "Prev3", "Prev4", "Prev5", "Prev6"]);
        if p > 0 {
            if let Some(orig) = before[0].output() {
                bind_aux(gl, orig, &["Orig"]);
            }
            for (k, earlier) in before.iter().enumerate().skip(1) {
                if let Some(out) = earlier.output() {
                    let name = format!("Pass{}", k);
                    bind_aux(gl, out, &[name.as_str()]);
                }
            }
        }
        for lut in &self.luts {
            unsafe {
                gl.active_texture(glow::TEXTURE0 + unit);
                gl.bind_texture(glow::TEXTURE_2D, lut.texture.handle());
            }
            shader.set_uniform_1i(gl, &lut.id, unit as i32);
            unit += 1;
        }
        unsafe {
            gl.active_texture(glow::TEXTURE0);
        }

        pass.pipeline
            .draw_texture_coords(gl, input, quad_coords(0.0, 0.0, out_w as f32, out_h as f32));
        pass.pipeline.deactivate(gl);
    }
}

/// frame counter as a pass sees it; 0 disables the modulus
fn effective_frame(count: u32, modulus: u32) -> u32 {
    if modulus != 0 {
        count % modulus
    } else {
        count
    }
}

fn set_input_uniforms(gl: &glow::Context, shader: &GlShader, prefix: &str, tex: &GlTexture) {
    shader.set_uniform_2f(
        gl,
        &format!("{}InputSize", prefix),
        tex.logical_width() as f32,
        tex.logical_height() as f32,
    );
    shader.set_uniform_2f(
        gl,
        &format!("{}TextureSize", prefix),
        tex.actual_width() as f32,
        tex.actual_height() as f32,
    );
}

/// backing texture for a pass target, honoring float/sRGB requests
/// where the storage formats exist
fn target_texture(config: &Pass, rich_targets: bool) -> GlTexture {
    if config.float_framebuffer {
        if rich_targets {
            return GlTexture::new(glow::RGBA32F as i32, glow::RGBA, glow::FLOAT, 16);
        }
        warn!("float framebuffer requested but not supported, using RGBA");
    }
    if config.srgb_framebuffer {
        if rich_targets {
            return GlTexture::new(
                glow::SRGB8_ALPHA8 as i32,
                glow::RGBA,
                glow::UNSIGNED_BYTE,
                4,
            );
        }
        warn!("sRGB framebuffer requested but not supported, using RGBA");
    }
    GlTexture::new(glow::RGBA as i32, glow::RGBA, glow::UNSIGNED_BYTE, 4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_axis() {
        assert_eq!(resolve_axis(AxisScale::Source(2.0), 320, 1280), 640);
        assert_eq!(resolve_axis(AxisScale::Viewport(0.5), 320, 1280), 640);
        assert_eq!(resolve_axis(AxisScale::Absolute(512), 320, 1280), 512);
        assert_eq!(resolve_axis(AxisScale::Full, 320, 1280), 1280);
        // degenerate sizes clamp to one texel
        assert_eq!(resolve_axis(AxisScale::Source(0.1), 4, 1280), 1);
    }

    #[test]
    fn test_effective_frame_honors_modulus() {
        assert_eq!(effective_frame(7, 0), 7);
        assert_eq!(effective_frame(7, 4), 3);
        assert_eq!(effective_frame(8, 4), 0);
    }
}
