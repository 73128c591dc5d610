// GlPixel
// a 2d compositor core for the opengl family of contexts

//! Shader program wrapper: compile with a dialect prelude, link with
//! fixed attribute locations, set uniforms by name

use glow::HasContext;
use log::info;

/// attribute names every draw-path shader exposes, bound in this order
/// so that VertexCoord always lands on location 0 (some desktop GL
/// drivers refuse to draw when location 0 has no enabled array)
pub const ATTRIB_NAMES: [&str; 3] = ["VertexCoord", "TexCoord", "Color"];

pub struct GlShader {
    pub program: glow::Program,
}

impl GlShader {
    /// compile and link with the crate's standard attribute bindings
    pub fn new(
        gl: &glow::Context,
        ver: &str,
        vertex_source: &str,
        fragment_source: &str,
    ) -> Result<Self, String> {
        Self::with_attributes(gl, ver, vertex_source, fragment_source, &ATTRIB_NAMES)
    }

    /// compile and link, binding `attributes[i]` to location i
    pub fn with_attributes(
        gl: &glow::Context,
        ver: &str,
        vertex_source: &str,
        fragment_source: &str,
        attributes: &[&str],
    ) -> Result<Self, String> {
        assert!(!attributes.is_empty());
        unsafe {
            let vertex_shader = compile(gl, glow::VERTEX_SHADER, ver, vertex_source)?;
            let fragment_shader = compile(gl, glow::FRAGMENT_SHADER, ver, fragment_source)?;

            let program = gl.create_program()?;
            gl.attach_shader(program, vertex_shader);
            gl.attach_shader(program, fragment_shader);
            for (i, name) in attributes.iter().enumerate() {
                gl.bind_attrib_location(program, i as u32, name);
            }
            gl.link_program(program);
            let linked = gl.get_program_link_status(program);
            gl.detach_shader(program, vertex_shader);
            gl.detach_shader(program, fragment_shader);
            gl.delete_shader(vertex_shader);
            gl.delete_shader(fragment_shader);
            if !linked {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(format!("program linking error: {}", log));
            }

            Ok(Self { program })
        }
    }

    pub fn bind(&self, gl: &glow::Context) {
        unsafe {
            gl.use_program(Some(self.program));
        }
    }

    pub fn free(&self, gl: &glow::Context) {
        unsafe {
            gl.delete_program(self.program);
        }
    }

    pub fn attrib_location(&self, gl: &glow::Context, name: &str) -> Option<u32> {
        unsafe { gl.get_attrib_location(self.program, name) }
    }

    pub fn set_uniform_1i(&self, gl: &glow::Context, name: &str, v: i32) {
        unsafe {
            let loc = gl.get_uniform_location(self.program, name);
            gl.uniform_1_i32(loc.as_ref(), v);
        }
    }

    pub fn set_uniform_1f(&self, gl: &glow::Context, name: &str, v: f32) {
        unsafe {
            let loc = gl.get_uniform_location(self.program, name);
            gl.uniform_1_f32(loc.as_ref(), v);
        }
    }

    pub fn set_uniform_2f(&self, gl: &glow::Context, name: &str, x: f32, y: f32) {
        unsafe {
            let loc = gl.get_uniform_location(self.program, name);
            gl.uniform_2_f32(loc.as_ref(), x, y);
        }
    }

    pub fn set_uniform_mat4(&self, gl: &glow::Context, name: &str, m: &[f32; 16]) {
        unsafe {
            let loc = gl.get_uniform_location(self.program, name);
            gl.uniform_matrix_4_f32_slice(loc.as_ref(), false, m);
        }
    }
}

unsafe fn compile(
    gl: &glow::Context,
    stage: u32,
    ver: &str,
    source: &str,
) -> Result<glow::Shader, String> {
    let shader = gl.create_shader(stage)?;
    gl.shader_source(shader, &format!("{}\n{}", ver, source));
    gl.compile_shader(shader);
    if !gl.get_shader_compile_status(shader) {
        let log = gl.get_shader_info_log(shader);
        info!("shader compilation error: {}", log);
        gl.delete_shader(shader);
        return Err(format!("shader compilation error: {}", log));
    }
    Ok(shader)
}
