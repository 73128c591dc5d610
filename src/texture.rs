// GlPixel
// a 2d compositor core for the opengl family of contexts

//! Thin GPU texture wrapper: logical vs padded size, filtering,
//! normalized coordinate rect, strided sub-image upload

use crate::format::PixelFormat;
use crate::util::{next_power_of_two, Rect};
use glow::HasContext;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterMode {
    Nearest,
    Linear,
}

impl FilterMode {
    fn gl_value(self) -> i32 {
        match self {
            FilterMode::Nearest => glow::NEAREST as i32,
            FilterMode::Linear => glow::LINEAR as i32,
        }
    }
}

/// (internal format, format, type) triple for a sampleable layout
pub fn gl_format_for(format: PixelFormat) -> Option<(i32, u32, u32)> {
    match format {
        PixelFormat::Rgba8888 => Some((glow::RGBA as i32, glow::RGBA, glow::UNSIGNED_BYTE)),
        PixelFormat::Rgb565 => Some((glow::RGB as i32, glow::RGB, glow::UNSIGNED_SHORT_5_6_5)),
        PixelFormat::Rgba5551 => Some((
            glow::RGBA as i32,
            glow::RGBA,
            glow::UNSIGNED_SHORT_5_5_5_1,
        )),
        PixelFormat::Rgba4444 => Some((
            glow::RGBA as i32,
            glow::RGBA,
            glow::UNSIGNED_SHORT_4_4_4_4,
        )),
        PixelFormat::Rgb555 | PixelFormat::Clut8 => None,
    }
}

/// storage size actually allocated for a logical size
pub fn padded_size(npot_supported: bool, w: u32, h: u32) -> (u32, u32) {
    if npot_supported {
        (w, h)
    } else {
        (next_power_of_two(w), next_power_of_two(h))
    }
}

pub struct GlTexture {
    handle: Option<glow::Texture>,
    internal_format: i32,
    gl_format: u32,
    gl_type: u32,
    bytes_per_pixel: usize,
    logical_width: u32,
    logical_height: u32,
    actual_width: u32,
    actual_height: u32,
    filter: FilterMode,
    /// normalized coordinate rect, always logical/actual on both axes
    max_u: f32,
    max_v: f32,
    generation: u64,
}

impl GlTexture {
    pub fn new(internal_format: i32, gl_format: u32, gl_type: u32, bytes_per_pixel: usize) -> Self {
        GlTexture {
            handle: None,
            internal_format,
            gl_format,
            gl_type,
            bytes_per_pixel,
            logical_width: 0,
            logical_height: 0,
            actual_width: 0,
            actual_height: 0,
            filter: FilterMode::Nearest,
            max_u: 0.0,
            max_v: 0.0,
            generation: 0,
        }
    }

    pub fn for_format(format: PixelFormat) -> Option<Self> {
        let (internal, fmt, ty) = gl_format_for(format)?;
        Some(GlTexture::new(internal, fmt, ty, format.bytes_per_pixel()))
    }

    /// allocate the GPU handle for the current context epoch
    pub fn create(&mut self, gl: &glow::Context, generation: u64) -> Result<(), String> {
        if self.handle.is_some() {
            return Ok(());
        }
        let tex = unsafe { gl.create_texture()? };
        self.handle = Some(tex);
        self.generation = generation;
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(tex));
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MIN_FILTER,
                self.filter.gl_value(),
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_MAG_FILTER,
                self.filter.gl_value(),
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_S,
                glow::CLAMP_TO_EDGE as i32,
            );
            gl.tex_parameter_i32(
                glow::TEXTURE_2D,
                glow::TEXTURE_WRAP_T,
                glow::CLAMP_TO_EDGE as i32,
            );
        }
        // storage follows the remembered size across an epoch change
        if self.actual_width != 0 && self.actual_height != 0 {
            self.allocate_storage(gl);
        }
        Ok(())
    }

    pub fn destroy(&mut self, gl: &glow::Context) {
        if let Some(tex) = self.handle.take() {
            unsafe {
                gl.delete_texture(tex);
            }
        }
    }

    pub fn handle(&self) -> Option<glow::Texture> {
        self.handle
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn logical_width(&self) -> u32 {
        self.logical_width
    }

    pub fn logical_height(&self) -> u32 {
        self.logical_height
    }

    pub fn actual_width(&self) -> u32 {
        self.actual_width
    }

    pub fn actual_height(&self) -> u32 {
        self.actual_height
    }

    pub fn filter(&self) -> FilterMode {
        self.filter
    }

    /// top-left-origin texture coordinate rect: [0, logical/actual]
    pub fn coords(&self) -> (f32, f32) {
        (self.max_u, self.max_v)
    }

    pub fn set_filter(&mut self, gl: &glow::Context, filter: FilterMode) {
        if self.filter == filter {
            return;
        }
        self.filter = filter;
        if let Some(tex) = self.handle {
            unsafe {
                gl.bind_texture(glow::TEXTURE_2D, Some(tex));
                gl.tex_parameter_i32(
                    glow::TEXTURE_2D,
                    glow::TEXTURE_MIN_FILTER,
                    filter.gl_value(),
                );
                gl.tex_parameter_i32(
                    glow::TEXTURE_2D,
                    glow::TEXTURE_MAG_FILTER,
                    filter.gl_value(),
                );
            }
        }
    }

    /// set the logical size; storage is only reallocated when the
    /// padded size actually changes
    pub fn set_size(&mut self, gl: &glow::Context, npot_supported: bool, w: u32, h: u32) {
        let (aw, ah) = padded_size(npot_supported, w, h);
        self.logical_width = w;
        self.logical_height = h;
        self.max_u = if aw == 0 { 0.0 } else { w as f32 / aw as f32 };
        self.max_v = if ah == 0 { 0.0 } else { h as f32 / ah as f32 };
        if aw != self.actual_width || ah != self.actual_height {
            self.actual_width = aw;
            self.actual_height = ah;
            if self.handle.is_some() {
                self.allocate_storage(gl);
            }
        }
    }

    fn allocate_storage(&self, gl: &glow::Context) {
        let tex = match self.handle {
            Some(t) => t,
            None => return,
        };
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(tex));
            gl.tex_image_2d(
                glow::TEXTURE_2D,
                0,
                self.internal_format,
                self.actual_width as i32,
                self.actual_height as i32,
                0,
                self.gl_format,
                self.gl_type,
                None,
            );
        }
    }

    pub fn bind(&self, gl: &glow::Context) {
        debug_assert!(self.handle.is_some(), "bind of texture without GPU handle");
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, self.handle);
        }
    }

    /// upload `rect` from a `pitch`-strided source buffer
    ///
    /// `data` starts at the first byte of the rect's top-left pixel.
    /// Rows are repacked when the stride does not match the rect width.
    pub fn update_area(&self, gl: &glow::Context, rect: Rect, data: &[u8], pitch: usize) {
        let tex = match self.handle {
            Some(t) => t,
            None => return,
        };
        let row_bytes = rect.w as usize * self.bytes_per_pixel;
        let packed;
        let upload: &[u8] = if pitch == row_bytes {
            &data[..row_bytes * rect.h as usize]
        } else {
            let mut buf = Vec::with_capacity(row_bytes * rect.h as usize);
            for y in 0..rect.h as usize {
                buf.extend_from_slice(&data[y * pitch..y * pitch + row_bytes]);
            }
            packed = buf;
            &packed
        };
        unsafe {
            gl.bind_texture(glow::TEXTURE_2D, Some(tex));
            gl.pixel_store_i32(glow::UNPACK_ALIGNMENT, 1);
            gl.tex_sub_image_2d(
                glow::TEXTURE_2D,
                0,
                rect.x,
                rect.y,
                rect.w as i32,
                rect.h as i32,
                self.gl_format,
                self.gl_type,
                glow::PixelUnpackData::Slice(upload),
            );
        }
    }

    pub fn generate_mipmap(&self, gl: &glow::Context) {
        if let Some(tex) = self.handle {
            unsafe {
                gl.bind_texture(glow::TEXTURE_2D, Some(tex));
                gl.generate_mipmap(glow::TEXTURE_2D);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_padded_size() {
        assert_eq!(padded_size(true, 320, 200), (320, 200));
        assert_eq!(padded_size(false, 320, 200), (512, 256));
        assert_eq!(padded_size(false, 256, 256), (256, 256));
    }

    #[test]
    fn test_coords_follow_padding() {
        let mut t = GlTexture::new(glow::RGBA as i32, glow::RGBA, glow::UNSIGNED_BYTE, 4);
        // no GPU handle: the size math still runs
        t.logical_width = 320;
        t.logical_height = 200;
        let (aw, ah) = padded_size(false, 320, 200);
        t.max_u = 320.0 / aw as f32;
        t.max_v = 200.0 / ah as f32;
        assert!(aw >= t.logical_width && ah >= t.logical_height);
        assert_eq!(t.coords(), (320.0 / 512.0, 200.0 / 256.0));
    }
}
