// GlPixel
// a 2d compositor core for the opengl family of contexts

//! Palette lookup on the GPU: the index texture is sampled on unit 0,
//! a 256x1 palette texture on unit 1, and the fragment shader turns
//! the index into a color

use crate::pipeline::shader::{ShaderPipeline, DEFAULT_VERTEX_SHADER};
use crate::texture::GlTexture;
use glow::HasContext;

const LOOKUP_FRAGMENT_SHADER: &str = r#"
varying vec2 texCoord;
varying vec4 blendColor;
uniform sampler2D Texture;
uniform sampler2D Palette;
void main() {
    // the index arrives replicated across rgb of a luminance texel;
    // center the sample inside the palette entry
    float index = texture2D(Texture, texCoord).r;
    gl_FragColor =
        blendColor * texture2D(Palette, vec2(index * 255.0 / 256.0 + 0.5 / 256.0, 0.5));
}
"#;

pub struct ClutLookupPipeline {
    pub(crate) inner: ShaderPipeline,
    palette: Option<glow::Texture>,
}

impl ClutLookupPipeline {
    pub fn new(gl: &glow::Context, ver: &str) -> Result<Self, String> {
        let inner = ShaderPipeline::with_sources(gl, ver, DEFAULT_VERTEX_SHADER, LOOKUP_FRAGMENT_SHADER)?;
        Ok(ClutLookupPipeline {
            inner,
            palette: None,
        })
    }

    /// handle of the 256x1 RGBA palette texture sampled on unit 1
    pub fn set_palette_texture(&mut self, palette: Option<glow::Texture>) {
        self.palette = palette;
    }

    pub fn activate(&mut self, gl: &glow::Context) {
        self.inner.activate(gl);
        self.inner.shader().set_uniform_1i(gl, "Palette", 1);
    }

    pub fn deactivate(&mut self, gl: &glow::Context) {
        self.inner.deactivate(gl);
    }

    pub fn draw_texture_coords(&mut self, gl: &glow::Context, tex: &GlTexture, coords: [f32; 8]) {
        unsafe {
            gl.active_texture(glow::TEXTURE1);
            gl.bind_texture(glow::TEXTURE_2D, self.palette);
            gl.active_texture(glow::TEXTURE0);
        }
        self.inner.draw_texture_coords(gl, tex, coords);
    }
}
