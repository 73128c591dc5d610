// GlPixel
// a 2d compositor core for the opengl family of contexts

//! Render targets: the on-screen backbuffer and off-screen texture
//! targets, each with its own viewport, projection, clear color,
//! blend mode and scissor state
//!
//! Exactly one target is active at a time. Setters mutate state
//! unconditionally and re-issue the GL call only while the target is
//! active; inactive targets pick the new value up on activation.

use crate::texture::{FilterMode, GlTexture};
use crate::util::Rect;
use glow::HasContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// blending off, source overwrites destination
    Disabled,
    /// src*srcAlpha + dst*(1-srcAlpha)
    Traditional,
    /// src*1 + dst*(1-srcAlpha), source already premultiplied
    Premultiplied,
}

/// column-major orthographic projection over a w x h pixel space
///
/// The backbuffer flips Y so that window coordinates grow downward;
/// texture targets do not, they are sampled rather than displayed.
pub fn ortho(w: f32, h: f32, flip_y: bool) -> [f32; 16] {
    let (sy, ty) = if flip_y { (-2.0 / h, 1.0) } else { (2.0 / h, -1.0) };
    [
        2.0 / w, 0.0, 0.0, 0.0, //
        0.0, sy, 0.0, 0.0, //
        0.0, 0.0, 1.0, 0.0, //
        -1.0, ty, 0.0, 1.0,
    ]
}

/// state shared by both target shapes
pub struct FramebufferState {
    viewport: [i32; 4],
    projection: [f32; 16],
    clear_color: [f32; 4],
    blend_mode: BlendMode,
    scissor_test: bool,
    scissor_box: Rect,
    active: bool,
}

impl Default for FramebufferState {
    fn default() -> Self {
        FramebufferState {
            viewport: [0; 4],
            projection: ortho(1.0, 1.0, false),
            clear_color: [0.0, 0.0, 0.0, 1.0],
            blend_mode: BlendMode::Disabled,
            scissor_test: false,
            scissor_box: Rect::default(),
            active: false,
        }
    }
}

impl FramebufferState {
    fn apply_viewport(&self, gl: &glow::Context) {
        unsafe {
            gl.viewport(
                self.viewport[0],
                self.viewport[1],
                self.viewport[2],
                self.viewport[3],
            );
        }
    }

    fn apply_clear_color(&self, gl: &glow::Context) {
        unsafe {
            gl.clear_color(
                self.clear_color[0],
                self.clear_color[1],
                self.clear_color[2],
                self.clear_color[3],
            );
        }
    }

    fn apply_blend_mode(&self, gl: &glow::Context) {
        unsafe {
            match self.blend_mode {
                BlendMode::Disabled => gl.disable(glow::BLEND),
                BlendMode::Traditional => {
                    gl.enable(glow::BLEND);
                    gl.blend_func(glow::SRC_ALPHA, glow::ONE_MINUS_SRC_ALPHA);
                }
                BlendMode::Premultiplied => {
                    gl.enable(glow::BLEND);
                    gl.blend_func(glow::ONE, glow::ONE_MINUS_SRC_ALPHA);
                }
            }
        }
    }

    fn apply_scissor_test(&self, gl: &glow::Context) {
        unsafe {
            if self.scissor_test {
                gl.enable(glow::SCISSOR_TEST);
            } else {
                gl.disable(glow::SCISSOR_TEST);
            }
        }
    }

    fn apply_scissor_box(&self, gl: &glow::Context) {
        unsafe {
            gl.scissor(
                self.scissor_box.x,
                self.scissor_box.y,
                self.scissor_box.w as i32,
                self.scissor_box.h as i32,
            );
        }
    }
}

/// the window's default framebuffer
pub struct Backbuffer {
    state: FramebufferState,
    width: u32,
    height: u32,
}

impl Backbuffer {
    pub fn new() -> Self {
        Backbuffer {
            state: FramebufferState::default(),
            width: 0,
            height: 0,
        }
    }

    pub fn set_dimensions(&mut self, w: u32, h: u32) {
        self.width = w;
        self.height = h;
        self.state.viewport = [0, 0, w as i32, h as i32];
        self.state.projection = ortho(w as f32, h as f32, true);
        self.state.scissor_box = Rect::new(0, 0, w, h);
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }
}

impl Default for Backbuffer {
    fn default() -> Self {
        Backbuffer::new()
    }
}

/// an off-screen texture the GPU renders into through an FBO
pub struct TextureTarget {
    state: FramebufferState,
    texture: GlTexture,
    fbo: Option<glow::Framebuffer>,
    /// texture currently attached to the FBO; re-attached lazily when
    /// the backing texture storage changes
    attached: Option<glow::Texture>,
}

impl TextureTarget {
    pub fn new() -> Self {
        TextureTarget {
            state: FramebufferState::default(),
            texture: GlTexture::new(glow::RGBA as i32, glow::RGBA, glow::UNSIGNED_BYTE, 4),
            fbo: None,
            attached: None,
        }
    }

    pub fn with_texture(texture: GlTexture) -> Self {
        TextureTarget {
            state: FramebufferState::default(),
            texture,
            fbo: None,
            attached: None,
        }
    }

    pub fn create(&mut self, gl: &glow::Context, generation: u64) -> Result<(), String> {
        self.texture.create(gl, generation)?;
        if self.fbo.is_none() {
            self.fbo = Some(unsafe { gl.create_framebuffer()? });
            self.attached = None;
        }
        Ok(())
    }

    pub fn destroy(&mut self, gl: &glow::Context) {
        if let Some(fbo) = self.fbo.take() {
            unsafe {
                gl.delete_framebuffer(fbo);
            }
        }
        self.attached = None;
        self.texture.destroy(gl);
    }

    pub fn texture(&self) -> &GlTexture {
        &self.texture
    }

    pub fn set_filter(&mut self, gl: &glow::Context, filter: FilterMode) {
        self.texture.set_filter(gl, filter);
    }

    /// resize the backing texture and derive viewport and an
    /// unflipped projection from the logical size
    pub fn set_size(&mut self, gl: &glow::Context, npot_supported: bool, w: u32, h: u32) {
        self.texture.set_size(gl, npot_supported, w, h);
        self.state.viewport = [0, 0, w as i32, h as i32];
        self.state.projection = ortho(w as f32, h as f32, false);
        self.state.scissor_box = Rect::new(0, 0, w, h);
    }

    fn bind(&mut self, gl: &glow::Context) {
        let fbo = match self.fbo {
            Some(f) => f,
            None => return,
        };
        unsafe {
            gl.bind_framebuffer(glow::FRAMEBUFFER, Some(fbo));
            if self.attached != self.texture.handle() {
                gl.framebuffer_texture_2d(
                    glow::FRAMEBUFFER,
                    glow::COLOR_ATTACHMENT0,
                    glow::TEXTURE_2D,
                    self.texture.handle(),
                    0,
                );
                if gl.check_framebuffer_status(glow::FRAMEBUFFER) != glow::FRAMEBUFFER_COMPLETE {
                    log::warn!("texture target framebuffer is not complete");
                }
                self.attached = self.texture.handle();
            }
        }
    }
}

impl Default for TextureTarget {
    fn default() -> Self {
        TextureTarget::new()
    }
}

/// destination surface: backbuffer or texture target
pub enum Framebuffer {
    Backbuffer(Backbuffer),
    Target(TextureTarget),
}

impl Framebuffer {
    fn state(&self) -> &FramebufferState {
        match self {
            Framebuffer::Backbuffer(b) => &b.state,
            Framebuffer::Target(t) => &t.state,
        }
    }

    fn state_mut(&mut self) -> &mut FramebufferState {
        match self {
            Framebuffer::Backbuffer(b) => &mut b.state,
            Framebuffer::Target(t) => &mut t.state,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state().active
    }

    pub fn projection(&self) -> [f32; 16] {
        self.state().projection
    }

    pub fn viewport(&self) -> [i32; 4] {
        self.state().viewport
    }

    /// first half of activation: mark active and apply the viewport;
    /// the caller applies the projection through the active pipeline
    /// before calling [`Framebuffer::activate_finish`]
    pub fn activate_begin(&mut self, gl: &glow::Context) -> [f32; 16] {
        let state = self.state_mut();
        state.active = true;
        state.apply_viewport(gl);
        state.projection
    }

    /// second half of activation: clear color, blend, scissor, then
    /// the target-specific bind
    pub fn activate_finish(&mut self, gl: &glow::Context) {
        {
            let state = self.state();
            state.apply_clear_color(gl);
            state.apply_blend_mode(gl);
            state.apply_scissor_test(gl);
            state.apply_scissor_box(gl);
        }
        match self {
            Framebuffer::Backbuffer(_) => unsafe {
                gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            },
            Framebuffer::Target(t) => t.bind(gl),
        }
    }

    pub fn deactivate(&mut self, gl: &glow::Context) {
        if let Framebuffer::Target(_) = self {
            unsafe {
                gl.bind_framebuffer(glow::FRAMEBUFFER, None);
            }
        }
        self.state_mut().active = false;
    }

    pub fn set_clear_color(&mut self, gl: &glow::Context, r: f32, g: f32, b: f32, a: f32) {
        let state = self.state_mut();
        state.clear_color = [r, g, b, a];
        if state.active {
            state.apply_clear_color(gl);
        }
    }

    pub fn enable_blend(&mut self, gl: &glow::Context, mode: BlendMode) {
        let state = self.state_mut();
        state.blend_mode = mode;
        if state.active {
            state.apply_blend_mode(gl);
        }
    }

    pub fn blend_mode(&self) -> BlendMode {
        self.state().blend_mode
    }

    pub fn enable_scissor_test(&mut self, gl: &glow::Context, enable: bool) {
        let state = self.state_mut();
        state.scissor_test = enable;
        if state.active {
            state.apply_scissor_test(gl);
        }
    }

    pub fn set_scissor_box(&mut self, gl: &glow::Context, rect: Rect) {
        let state = self.state_mut();
        state.scissor_box = rect;
        if state.active {
            state.apply_scissor_box(gl);
        }
    }
}

/// read the active target's color buffer back, flipped to top-down
/// row order
pub fn read_rgba_flipped(gl: &glow::Context, w: u32, h: u32) -> Vec<u8> {
    let mut pixels = vec![0u8; w as usize * h as usize * 4];
    unsafe {
        gl.pixel_store_i32(glow::PACK_ALIGNMENT, 1);
        gl.read_pixels(
            0,
            0,
            w as i32,
            h as i32,
            glow::RGBA,
            glow::UNSIGNED_BYTE,
            glow::PixelPackData::Slice(&mut pixels),
        );
    }
    let row = w as usize * 4;
    for y in 0..(h as usize / 2) {
        let (top, bottom) = pixels.split_at_mut((h as usize - y - 1) * row);
        top[y * row..y * row + row].swap_with_slice(&mut bottom[..row]);
    }
    pixels
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ortho_flip() {
        let m = ortho(640.0, 480.0, true);
        // y axis points down: +h maps to clip -1
        assert!((m[5] - (-2.0 / 480.0)).abs() < 1e-6);
        assert!((m[13] - 1.0).abs() < 1e-6);
        let m = ortho(640.0, 480.0, false);
        assert!((m[5] - 2.0 / 480.0).abs() < 1e-6);
        assert!((m[13] + 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_backbuffer_dimensions() {
        let mut b = Backbuffer::new();
        b.set_dimensions(800, 600);
        let fb = Framebuffer::Backbuffer(b);
        assert_eq!(fb.viewport(), [0, 0, 800, 600]);
        assert!(!fb.is_active());
    }
}
