// GlPixel
// a 2d compositor core for the opengl family of contexts

//! Capability context: which GL dialect is live, what it can do, and
//! the single active pipeline

use crate::pipeline::Pipeline;
use bitflags::bitflags;
use glow::HasContext;
use log::info;
use std::ffi::c_void;

pub mod fns;
pub use fns::LegacyFns;

/// which member of the GL family the window glue created
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GlDialect {
    /// desktop GL, fixed-function plus optional shaders
    Gl,
    /// GLES1-class, fixed-function only
    Gles,
    /// GLES2-class, programmable only
    Gles2,
}

bitflags! {
    /// discovered capability set
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct GlCaps: u32 {
        const NPOT_SUPPORTED          = 1 << 0;
        const SHADERS_SUPPORTED       = 1 << 1;
        const MULTITEXTURE_SUPPORTED  = 1 << 2;
        const FRAMEBUFFER_OBJECTS     = 1 << 3;
    }
}

/// debug-build GL error sweep, logged with the call site
pub fn check_gl_error(gl: &glow::Context, site: &str) {
    if cfg!(debug_assertions) {
        loop {
            let err = unsafe { gl.get_error() };
            if err == glow::NO_ERROR {
                break;
            }
            log::debug!("GL error 0x{:04x} at {}", err, site);
        }
    }
}

/// the globally-bound rendering context description
///
/// Exactly one exists per context epoch. It owns the glow context, the
/// resolved legacy entry points, the capability set and the single
/// active pipeline. Dropping it (or `Compositor::notify_context_destroy`)
/// ends the epoch; every GPU handle created within becomes invalid.
pub struct GlContext {
    pub gl: glow::Context,
    pub legacy: LegacyFns,
    pub dialect: GlDialect,
    pub caps: GlCaps,
    pub max_texture_size: i32,
    /// bumped once per context creation, carried by GPU resources
    pub generation: u64,
    active: Option<Pipeline>,
}

impl GlContext {
    /// build the context from the platform's proc-address loader and
    /// run capability discovery
    pub fn new(
        dialect: GlDialect,
        generation: u64,
        loader: &mut dyn FnMut(&str) -> *const c_void,
    ) -> GlContext {
        let gl = unsafe { glow::Context::from_loader_function(|s| loader(s)) };
        let legacy = match dialect {
            GlDialect::Gles2 => LegacyFns::empty(),
            _ => LegacyFns::load(loader),
        };
        let mut ctx = GlContext {
            gl,
            legacy,
            dialect,
            caps: GlCaps::empty(),
            max_texture_size: 0,
            generation,
            active: None,
        };
        ctx.initialize();
        ctx
    }

    /// reset and repopulate the capability set
    ///
    /// Optional entry points may stay unresolved without raising an
    /// error; every use site guards for that.
    fn initialize(&mut self) {
        self.caps = GlCaps::empty();
        self.max_texture_size = unsafe { self.gl.get_parameter_i32(glow::MAX_TEXTURE_SIZE) };

        let extensions = unsafe { self.gl.get_parameter_string(glow::EXTENSIONS) };
        let mut shader_objects = false;
        let mut shading_language = false;
        let mut vertex_shader = false;
        let mut fragment_shader = false;
        for token in extensions.split_whitespace() {
            match token {
                "GL_ARB_texture_non_power_of_two" | "GL_OES_texture_npot" => {
                    self.caps |= GlCaps::NPOT_SUPPORTED;
                }
                "GL_ARB_multitexture" => {
                    self.caps |= GlCaps::MULTITEXTURE_SUPPORTED;
                }
                "GL_EXT_framebuffer_object"
                | "GL_ARB_framebuffer_object"
                | "GL_OES_framebuffer_object" => {
                    self.caps |= GlCaps::FRAMEBUFFER_OBJECTS;
                }
                "GL_ARB_shader_objects" => shader_objects = true,
                "GL_ARB_shading_language_100" => shading_language = true,
                "GL_ARB_vertex_shader" => vertex_shader = true,
                "GL_ARB_fragment_shader" => fragment_shader = true,
                _ => {}
            }
        }

        // the desktop shader path needs the full ARB quartet
        if shader_objects && shading_language && vertex_shader && fragment_shader {
            self.caps |= GlCaps::SHADERS_SUPPORTED;
        }

        match self.dialect {
            // GLES2 guarantees all of this in core
            GlDialect::Gles2 => {
                self.caps |= GlCaps::NPOT_SUPPORTED
                    | GlCaps::SHADERS_SUPPORTED
                    | GlCaps::MULTITEXTURE_SUPPORTED
                    | GlCaps::FRAMEBUFFER_OBJECTS;
            }
            // multitexture is core since GLES 1.0
            GlDialect::Gles => {
                self.caps |= GlCaps::MULTITEXTURE_SUPPORTED;
                self.caps -= GlCaps::SHADERS_SUPPORTED;
            }
            GlDialect::Gl => {}
        }

        info!(
            "opengl context: dialect {:?} max_texture_size {} caps {:?}",
            self.dialect, self.max_texture_size, self.caps
        );
    }

    pub fn npot_supported(&self) -> bool {
        self.caps.contains(GlCaps::NPOT_SUPPORTED)
    }

    /// true when the GPU palette-lookup path can run
    pub fn clut8_gpu_supported(&self) -> bool {
        self.caps.contains(
            GlCaps::SHADERS_SUPPORTED
                | GlCaps::MULTITEXTURE_SUPPORTED
                | GlCaps::FRAMEBUFFER_OBJECTS,
        )
    }

    /// glsl prelude matching the dialect, prepended to every shader
    pub fn shader_version_prefix(&self) -> &'static str {
        match self.dialect {
            GlDialect::Gles2 => "#version 100\nprecision mediump float;\n",
            _ => "#version 110\n",
        }
    }

    /// swap the active pipeline
    ///
    /// Deactivates the old one, stores and activates the new one, and
    /// hands the old one back so the caller can restore it later. The
    /// GPU palette-lookup pass relies on that restore.
    pub fn set_pipeline(&mut self, new: Option<Pipeline>) -> Option<Pipeline> {
        let mut old = self.active.take();
        if let Some(p) = old.as_mut() {
            p.deactivate(&self.gl, &self.legacy);
        }
        self.active = new;
        if let Some(p) = self.active.as_mut() {
            p.activate(&self.gl, &self.legacy, self.caps);
        }
        old
    }

    pub fn pipeline(&self) -> Option<&Pipeline> {
        self.active.as_ref()
    }

    pub fn pipeline_mut(&mut self) -> Option<&mut Pipeline> {
        self.active.as_mut()
    }

    /// split borrow for callers that need the GL handle and the active
    /// pipeline at the same time
    pub fn gl_and_pipeline(&mut self) -> (&glow::Context, &LegacyFns, Option<&mut Pipeline>) {
        (&self.gl, &self.legacy, self.active.as_mut())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_caps_bits_distinct() {
        let all = GlCaps::NPOT_SUPPORTED
            | GlCaps::SHADERS_SUPPORTED
            | GlCaps::MULTITEXTURE_SUPPORTED
            | GlCaps::FRAMEBUFFER_OBJECTS;
        assert_eq!(all.bits().count_ones(), 4);
    }

    #[test]
    fn test_clut8_gpu_needs_all_three() {
        let caps = GlCaps::SHADERS_SUPPORTED | GlCaps::MULTITEXTURE_SUPPORTED;
        assert!(!caps.contains(
            GlCaps::SHADERS_SUPPORTED
                | GlCaps::MULTITEXTURE_SUPPORTED
                | GlCaps::FRAMEBUFFER_OBJECTS
        ));
    }
}
