// GlPixel
// a 2d compositor core for the opengl family of contexts

//! CPU-backed surfaces with dirty-region tracking
//!
//! A surface accumulates writes into a CPU buffer and a dirty
//! rectangle; `flush` uploads exactly the dirty region and clears it.
//! Four shapes cover the format landscape: direct upload, 555-to-565
//! conversion, CPU palette lookup and GPU palette lookup.

use crate::context::fns::GL_LUMINANCE;
use crate::context::GlContext;
use crate::format::{clut8_lookup, convert_rgb555_to_rgb565, Palette, PixelFormat};
use crate::framebuffer::{Framebuffer, TextureTarget};
use crate::pipeline::{ClutLookupPipeline, Pipeline};
use crate::texture::{FilterMode, GlTexture};
use crate::util::Rect;
use log::warn;

/// running dirty region, cleared only after a successful upload
#[derive(Debug, Default, Clone, Copy)]
pub struct DirtyTracker {
    rect: Option<Rect>,
    all: bool,
}

impl DirtyTracker {
    /// union a written rectangle in; the first write sets the region
    /// directly rather than unioning with an empty rectangle
    pub fn add(&mut self, rect: Rect) {
        if self.all || rect.is_empty() {
            return;
        }
        self.rect = Some(match self.rect {
            Some(r) => r.union(rect),
            None => rect,
        });
    }

    pub fn mark_all(&mut self) {
        self.all = true;
        self.rect = None;
    }

    pub fn is_dirty(&self) -> bool {
        self.all || self.rect.is_some()
    }

    /// resolve against the full surface rect and reset
    pub fn take(&mut self, full: Rect) -> Option<Rect> {
        let out = if self.all {
            Some(full)
        } else {
            self.rect.map(|r| r.intersect(full))
        };
        self.all = false;
        self.rect = None;
        out.filter(|r| !r.is_empty())
    }
}

/// pitch-strided CPU pixel store shared by every surface shape
struct CpuBuffer {
    data: Vec<u8>,
    width: u32,
    height: u32,
    bpp: usize,
    dirty: DirtyTracker,
}

impl CpuBuffer {
    fn new(bpp: usize) -> Self {
        CpuBuffer {
            data: Vec::new(),
            width: 0,
            height: 0,
            bpp,
            dirty: DirtyTracker::default(),
        }
    }

    fn full_rect(&self) -> Rect {
        Rect::new(0, 0, self.width, self.height)
    }

    fn pitch(&self) -> usize {
        self.width as usize * self.bpp
    }

    fn allocate(&mut self, w: u32, h: u32) {
        self.width = w;
        self.height = h;
        self.data = vec![0; w as usize * h as usize * self.bpp];
        self.dirty.mark_all();
    }

    /// copy `data` (starting at the rect's top-left, `pitch`-strided)
    /// into the buffer, clipped to the surface bounds
    fn copy_rect(&mut self, rect: Rect, data: &[u8], pitch: usize) {
        let clipped = rect.intersect(self.full_rect());
        if clipped.is_empty() {
            return;
        }
        let row = clipped.w as usize * self.bpp;
        let dst_pitch = self.pitch();
        // offset into the caller's buffer if clipping moved the origin
        let sx = (clipped.x - rect.x) as usize * self.bpp;
        let sy = (clipped.y - rect.y) as usize;
        for y in 0..clipped.h as usize {
            let s = (sy + y) * pitch + sx;
            let d = (clipped.y as usize + y) * dst_pitch + clipped.x as usize * self.bpp;
            self.data[d..d + row].copy_from_slice(&data[s..s + row]);
        }
        self.dirty.add(clipped);
    }

    fn fill(&mut self, format: PixelFormat, v: u32) {
        let bpp = self.bpp;
        for i in 0..(self.data.len() / bpp) {
            format.write_raw(&mut self.data, i * bpp, v);
        }
        self.dirty.mark_all();
    }

    /// slice starting at a rect's top-left pixel
    fn rect_slice(&self, rect: Rect) -> &[u8] {
        let start = rect.y as usize * self.pitch() + rect.x as usize * self.bpp;
        &self.data[start..]
    }
}

/// a drawable pixel store the compositor writes into
pub trait Surface {
    fn format(&self) -> PixelFormat;
    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// (re)allocate for a logical size; contents become undefined and
    /// the whole surface is marked dirty
    fn allocate(&mut self, ctx: &mut GlContext, w: u32, h: u32);

    fn is_dirty(&self) -> bool;
    fn copy_rect(&mut self, rect: Rect, data: &[u8], pitch: usize);
    fn fill(&mut self, value: u32);

    /// upload the dirty region; a no-op when nothing is dirty
    fn flush(&mut self, ctx: &mut GlContext);

    /// the texture a pipeline samples when drawing this surface
    fn gl_texture(&self) -> &GlTexture;

    fn set_filter(&mut self, ctx: &mut GlContext, filter: FilterMode);

    /// recreate GPU resources after a context epoch change
    fn recreate(&mut self, ctx: &mut GlContext) -> Result<(), String>;
    fn destroy(&mut self, ctx: &mut GlContext);

    /// indexed surfaces only; ignored elsewhere
    fn set_palette(&mut self, _start: usize, _num: usize, _colors: &[u8]) {}
    fn grab_palette(&self, _start: usize, _num: usize, _out: &mut [u8]) {}
    fn set_color_key(&mut self, _index: u8) {}

    /// CPU-side pixels, for readback-free inspection
    fn pixels(&self) -> &[u8];
}

/// pick the right surface shape for a format on the live context
///
/// Unsampleable formats fall back to CPU conversion. Indexed data with
/// no alpha requirement prefers the GPU lookup when shaders,
/// multitexture and FBOs are all present.
pub fn create_surface(
    ctx: &mut GlContext,
    format: PixelFormat,
    want_alpha: bool,
) -> Result<Box<dyn Surface>, String> {
    let surface: Box<dyn Surface> = match format {
        PixelFormat::Clut8 => {
            if !want_alpha && ctx.clut8_gpu_supported() {
                Box::new(TextureClut8Gpu::new(ctx)?)
            } else {
                Box::new(TextureClut8::new(ctx, PixelFormat::Rgba8888)?)
            }
        }
        PixelFormat::Rgb555 => Box::new(TextureRgb555::new(ctx)?),
        f => Box::new(Texture::new(ctx, f)?),
    };
    Ok(surface)
}

/// CPU buffer matching the GPU format, uploaded verbatim
pub struct Texture {
    buf: CpuBuffer,
    format: PixelFormat,
    texture: GlTexture,
}

impl Texture {
    pub fn new(ctx: &mut GlContext, format: PixelFormat) -> Result<Self, String> {
        let mut texture = GlTexture::for_format(format)
            .ok_or_else(|| format!("{:?} is not gl sampleable", format))?;
        texture.create(&ctx.gl, ctx.generation)?;
        Ok(Texture {
            buf: CpuBuffer::new(format.bytes_per_pixel()),
            format,
            texture,
        })
    }
}

impl Surface for Texture {
    fn format(&self) -> PixelFormat {
        self.format
    }

    fn width(&self) -> u32 {
        self.buf.width
    }

    fn height(&self) -> u32 {
        self.buf.height
    }

    fn allocate(&mut self, ctx: &mut GlContext, w: u32, h: u32) {
        self.buf.allocate(w, h);
        self.texture.set_size(&ctx.gl, ctx.npot_supported(), w, h);
    }

    fn is_dirty(&self) -> bool {
        self.buf.dirty.is_dirty()
    }

    fn copy_rect(&mut self, rect: Rect, data: &[u8], pitch: usize) {
        self.buf.copy_rect(rect, data, pitch);
    }

    fn fill(&mut self, value: u32) {
        self.buf.fill(self.format, value);
    }

    fn flush(&mut self, ctx: &mut GlContext) {
        let rect = match self.buf.dirty.take(self.buf.full_rect()) {
            Some(r) => r,
            None => return,
        };
        upload_with_edge_duplication(&ctx.gl, &self.texture, &self.buf, rect);
    }

    fn gl_texture(&self) -> &GlTexture {
        &self.texture
    }

    fn set_filter(&mut self, ctx: &mut GlContext, filter: FilterMode) {
        self.texture.set_filter(&ctx.gl, filter);
        // linear filtering samples into the padding; refresh the edge
        self.buf.dirty.mark_all();
    }

    fn recreate(&mut self, ctx: &mut GlContext) -> Result<(), String> {
        self.texture.create(&ctx.gl, ctx.generation)?;
        self.buf.dirty.mark_all();
        Ok(())
    }

    fn destroy(&mut self, ctx: &mut GlContext) {
        self.texture.destroy(&ctx.gl);
    }

    fn pixels(&self) -> &[u8] {
        &self.buf.data
    }
}

/// upload a dirty rect, duplicating one extra row/column of pixels
/// when linear filtering could otherwise sample uninitialized padding
fn upload_with_edge_duplication(
    gl: &glow::Context,
    texture: &GlTexture,
    buf: &CpuBuffer,
    rect: Rect,
) {
    let bpp = buf.bpp;
    let dup_x = texture.filter() == FilterMode::Linear
        && rect.right() as u32 == texture.logical_width()
        && texture.logical_width() < texture.actual_width();
    let dup_y = texture.filter() == FilterMode::Linear
        && rect.bottom() as u32 == texture.logical_height()
        && texture.logical_height() < texture.actual_height();

    if !dup_x && !dup_y {
        texture.update_area(gl, rect, buf.rect_slice(rect), buf.pitch());
        return;
    }

    let out_w = rect.w as usize + dup_x as usize;
    let out_h = rect.h as usize + dup_y as usize;
    let out_row = out_w * bpp;
    let mut scratch = vec![0u8; out_row * out_h];
    let src = buf.rect_slice(rect);
    let src_row = rect.w as usize * bpp;
    for y in 0..rect.h as usize {
        let s = y * buf.pitch();
        let d = y * out_row;
        scratch[d..d + src_row].copy_from_slice(&src[s..s + src_row]);
        if dup_x {
            scratch[d + src_row..d + src_row + bpp]
                .copy_from_slice(&src[s + src_row - bpp..s + src_row]);
        }
    }
    if dup_y {
        let (body, tail) = scratch.split_at_mut((out_h - 1) * out_row);
        tail.copy_from_slice(&body[(out_h - 2) * out_row..]);
    }
    let upload = Rect::new(rect.x, rect.y, out_w as u32, out_h as u32);
    texture.update_area(gl, upload, &scratch, out_row);
}

/// CPU buffer in Rgb555, converted to Rgb565 during upload
pub struct TextureRgb555 {
    buf: CpuBuffer,
    texture: GlTexture,
}

impl TextureRgb555 {
    pub fn new(ctx: &mut GlContext) -> Result<Self, String> {
        let mut texture = GlTexture::for_format(PixelFormat::Rgb565)
            .ok_or_else(|| "Rgb565 is not gl sampleable".to_string())?;
        texture.create(&ctx.gl, ctx.generation)?;
        Ok(TextureRgb555 {
            buf: CpuBuffer::new(2),
            texture,
        })
    }
}

impl Surface for TextureRgb555 {
    fn format(&self) -> PixelFormat {
        PixelFormat::Rgb555
    }

    fn width(&self) -> u32 {
        self.buf.width
    }

    fn height(&self) -> u32 {
        self.buf.height
    }

    fn allocate(&mut self, ctx: &mut GlContext, w: u32, h: u32) {
        self.buf.allocate(w, h);
        self.texture.set_size(&ctx.gl, ctx.npot_supported(), w, h);
    }

    fn is_dirty(&self) -> bool {
        self.buf.dirty.is_dirty()
    }

    fn copy_rect(&mut self, rect: Rect, data: &[u8], pitch: usize) {
        self.buf.copy_rect(rect, data, pitch);
    }

    fn fill(&mut self, value: u32) {
        self.buf.fill(PixelFormat::Rgb555, value);
    }

    fn flush(&mut self, ctx: &mut GlContext) {
        let rect = match self.buf.dirty.take(self.buf.full_rect()) {
            Some(r) => r,
            None => return,
        };
        let row = rect.w as usize * 2;
        let mut converted = vec![0u8; row * rect.h as usize];
        convert_rgb555_to_rgb565(
            self.buf.rect_slice(rect),
            self.buf.pitch(),
            &mut converted,
            row,
            rect.w as usize,
            rect.h as usize,
        );
        self.texture.update_area(&ctx.gl, rect, &converted, row);
    }

    fn gl_texture(&self) -> &GlTexture {
        &self.texture
    }

    fn set_filter(&mut self, ctx: &mut GlContext, filter: FilterMode) {
        self.texture.set_filter(&ctx.gl, filter);
        self.buf.dirty.mark_all();
    }

    fn recreate(&mut self, ctx: &mut GlContext) -> Result<(), String> {
        self.texture.create(&ctx.gl, ctx.generation)?;
        self.buf.dirty.mark_all();
        Ok(())
    }

    fn destroy(&mut self, ctx: &mut GlContext) {
        self.texture.destroy(&ctx.gl);
    }

    fn pixels(&self) -> &[u8] {
        &self.buf.data
    }
}

/// 8-bit indices resolved through the palette on the CPU during upload
pub struct TextureClut8 {
    buf: CpuBuffer,
    palette: Palette,
    dest_format: PixelFormat,
    texture: GlTexture,
}

impl TextureClut8 {
    pub fn new(ctx: &mut GlContext, dest_format: PixelFormat) -> Result<Self, String> {
        let mut texture = GlTexture::for_format(dest_format)
            .ok_or_else(|| format!("{:?} is not gl sampleable", dest_format))?;
        texture.create(&ctx.gl, ctx.generation)?;
        Ok(TextureClut8 {
            buf: CpuBuffer::new(1),
            palette: Palette::default(),
            dest_format,
            texture,
        })
    }
}

impl Surface for TextureClut8 {
    fn format(&self) -> PixelFormat {
        PixelFormat::Clut8
    }

    fn width(&self) -> u32 {
        self.buf.width
    }

    fn height(&self) -> u32 {
        self.buf.height
    }

    fn allocate(&mut self, ctx: &mut GlContext, w: u32, h: u32) {
        self.buf.allocate(w, h);
        self.texture.set_size(&ctx.gl, ctx.npot_supported(), w, h);
    }

    fn is_dirty(&self) -> bool {
        self.buf.dirty.is_dirty()
    }

    fn copy_rect(&mut self, rect: Rect, data: &[u8], pitch: usize) {
        self.buf.copy_rect(rect, data, pitch);
    }

    fn fill(&mut self, value: u32) {
        self.buf.fill(PixelFormat::Clut8, value);
    }

    fn flush(&mut self, ctx: &mut GlContext) {
        let rect = match self.buf.dirty.take(self.buf.full_rect()) {
            Some(r) => r,
            None => return,
        };
        let bpp = self.dest_format.bytes_per_pixel();
        let flat = self.palette.to_format(self.dest_format);
        let row = rect.w as usize * bpp;
        let mut looked_up = vec![0u8; row * rect.h as usize];
        clut8_lookup(
            self.buf.rect_slice(rect),
            self.buf.pitch(),
            &mut looked_up,
            row,
            &flat,
            bpp,
            rect.w as usize,
            rect.h as usize,
        );
        self.texture.update_area(&ctx.gl, rect, &looked_up, row);
    }

    fn gl_texture(&self) -> &GlTexture {
        &self.texture
    }

    fn set_filter(&mut self, ctx: &mut GlContext, filter: FilterMode) {
        self.texture.set_filter(&ctx.gl, filter);
        self.buf.dirty.mark_all();
    }

    fn recreate(&mut self, ctx: &mut GlContext) -> Result<(), String> {
        self.texture.create(&ctx.gl, ctx.generation)?;
        self.buf.dirty.mark_all();
        Ok(())
    }

    fn destroy(&mut self, ctx: &mut GlContext) {
        self.texture.destroy(&ctx.gl);
    }

    // every pixel's color depends on the palette, so palette and
    // color-key changes dirty the whole surface

    fn set_palette(&mut self, start: usize, num: usize, colors: &[u8]) {
        self.palette.set_colors(start, num, colors);
        self.buf.dirty.mark_all();
    }

    fn grab_palette(&self, start: usize, num: usize, out: &mut [u8]) {
        self.palette.grab_colors(start, num, out);
    }

    fn set_color_key(&mut self, index: u8) {
        self.palette.set_color_key(index);
        self.buf.dirty.mark_all();
    }

    fn pixels(&self) -> &[u8] {
        &self.buf.data
    }
}

/// 8-bit indices resolved by a GPU draw pass
///
/// Indices upload to a luminance texture, the palette to a 256x1 RGBA
/// texture; a full-surface quad through the lookup pipeline renders
/// the result into a private texture target, which is what gets
/// sampled when the surface is drawn. Index and palette dirtiness are
/// tracked independently, either one schedules a lookup pass.
pub struct TextureClut8Gpu {
    buf: CpuBuffer,
    palette: Palette,
    palette_dirty: bool,
    index_texture: GlTexture,
    palette_texture: GlTexture,
    target: Option<TextureTarget>,
    lookup: Option<ClutLookupPipeline>,
}

impl TextureClut8Gpu {
    pub fn new(ctx: &mut GlContext) -> Result<Self, String> {
        let mut index_texture = GlTexture::new(
            GL_LUMINANCE as i32,
            GL_LUMINANCE,
            glow::UNSIGNED_BYTE,
            1,
        );
        index_texture.create(&ctx.gl, ctx.generation)?;
        let mut palette_texture =
            GlTexture::new(glow::RGBA as i32, glow::RGBA, glow::UNSIGNED_BYTE, 4);
        palette_texture.create(&ctx.gl, ctx.generation)?;
        palette_texture.set_size(&ctx.gl, ctx.npot_supported(), 256, 1);
        let mut target = TextureTarget::new();
        target.create(&ctx.gl, ctx.generation)?;
        let lookup = ClutLookupPipeline::new(&ctx.gl, ctx.shader_version_prefix())?;
        Ok(TextureClut8Gpu {
            buf: CpuBuffer::new(1),
            palette: Palette::default(),
            palette_dirty: true,
            index_texture,
            palette_texture,
            target: Some(target),
            lookup: Some(lookup),
        })
    }

    /// draw the full-surface lookup quad into the private target,
    /// temporarily swapping the context's active pipeline
    fn run_lookup(&mut self, ctx: &mut GlContext) {
        let (mut lookup, target) = match (self.lookup.take(), self.target.take()) {
            (Some(l), Some(t)) => (l, t),
            (l, t) => {
                self.lookup = l;
                self.target = t;
                return;
            }
        };
        lookup.set_palette_texture(self.palette_texture.handle());
        lookup
            .inner
            .set_framebuffer(&ctx.gl, Some(Framebuffer::Target(target)));

        let previous = ctx.set_pipeline(Some(Pipeline::ClutLookup(lookup)));
        let (w, h) = (self.buf.width as f32, self.buf.height as f32);
        {
            let (gl, _, pipeline) = ctx.gl_and_pipeline();
            if let Some(p) = pipeline {
                p.draw_texture(gl, &self.index_texture, 0.0, 0.0, w, h);
            }
        }
        let mine = ctx.set_pipeline(previous);

        match mine {
            Some(Pipeline::ClutLookup(mut lookup)) => {
                if let Some(Framebuffer::Target(t)) = lookup.inner.set_framebuffer(&ctx.gl, None) {
                    self.target = Some(t);
                }
                self.lookup = Some(lookup);
            }
            _ => warn!("palette lookup pipeline was not returned from the swap"),
        }
    }
}

impl Surface for TextureClut8Gpu {
    fn format(&self) -> PixelFormat {
        PixelFormat::Clut8
    }

    fn width(&self) -> u32 {
        self.buf.width
    }

    fn height(&self) -> u32 {
        self.buf.height
    }

    fn allocate(&mut self, ctx: &mut GlContext, w: u32, h: u32) {
        self.buf.allocate(w, h);
        let npot = ctx.npot_supported();
        self.index_texture.set_size(&ctx.gl, npot, w, h);
        if let Some(target) = self.target.as_mut() {
            target.set_size(&ctx.gl, npot, w, h);
        }
        self.palette_dirty = true;
    }

    fn is_dirty(&self) -> bool {
        self.buf.dirty.is_dirty() || self.palette_dirty
    }

    fn copy_rect(&mut self, rect: Rect, data: &[u8], pitch: usize) {
        self.buf.copy_rect(rect, data, pitch);
    }

    fn fill(&mut self, value: u32) {
        self.buf.fill(PixelFormat::Clut8, value);
    }

    fn flush(&mut self, ctx: &mut GlContext) {
        if !self.is_dirty() {
            return;
        }
        if let Some(rect) = self.buf.dirty.take(self.buf.full_rect()) {
            self.index_texture
                .update_area(&ctx.gl, rect, self.buf.rect_slice(rect), self.buf.pitch());
        }
        if self.palette_dirty {
            self.palette_texture.update_area(
                &ctx.gl,
                Rect::new(0, 0, 256, 1),
                self.palette.rgba_bytes(),
                256 * 4,
            );
            self.palette_dirty = false;
        }
        self.run_lookup(ctx);
    }

    fn gl_texture(&self) -> &GlTexture {
        // the sampled texture is the lookup result, never the indices
        self.target
            .as_ref()
            .map(|t| t.texture())
            .unwrap_or(&self.index_texture)
    }

    fn set_filter(&mut self, ctx: &mut GlContext, filter: FilterMode) {
        if let Some(target) = self.target.as_mut() {
            target.set_filter(&ctx.gl, filter);
        }
    }

    fn recreate(&mut self, ctx: &mut GlContext) -> Result<(), String> {
        self.index_texture.create(&ctx.gl, ctx.generation)?;
        self.palette_texture.create(&ctx.gl, ctx.generation)?;
        self.palette_texture
            .set_size(&ctx.gl, ctx.npot_supported(), 256, 1);
        if let Some(target) = self.target.as_mut() {
            target.create(&ctx.gl, ctx.generation)?;
        }
        if self.lookup.is_none() {
            self.lookup = Some(ClutLookupPipeline::new(&ctx.gl, ctx.shader_version_prefix())?);
        }
        self.buf.dirty.mark_all();
        self.palette_dirty = true;
        Ok(())
    }

    fn destroy(&mut self, ctx: &mut GlContext) {
        self.index_texture.destroy(&ctx.gl);
        self.palette_texture.destroy(&ctx.gl);
        if let Some(target) = self.target.as_mut() {
            target.destroy(&ctx.gl);
        }
        if let Some(mut lookup) = self.lookup.take() {
            lookup.inner.free(&ctx.gl);
        }
    }

    fn set_palette(&mut self, start: usize, num: usize, colors: &[u8]) {
        self.palette.set_colors(start, num, colors);
        self.palette_dirty = true;
    }

    fn grab_palette(&self, start: usize, num: usize, out: &mut [u8]) {
        self.palette.grab_colors(start, num, out);
    }

    fn set_color_key(&mut self, index: u8) {
        self.palette.set_color_key(index);
        self.palette_dirty = true;
    }

    fn pixels(&self) -> &[u8] {
        &self.buf.data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dirty_union_is_idempotent() {
        let mut d = DirtyTracker::default();
        let r = Rect::new(10, 10, 20, 20);
        d.add(r);
        d.add(r);
        assert_eq!(d.take(Rect::new(0, 0, 100, 100)), Some(r));
        assert!(!d.is_dirty());
    }

    #[test]
    fn test_dirty_disjoint_rects_bound() {
        let mut d = DirtyTracker::default();
        d.add(Rect::new(0, 0, 10, 10));
        d.add(Rect::new(50, 50, 10, 10));
        assert_eq!(
            d.take(Rect::new(0, 0, 100, 100)),
            Some(Rect::new(0, 0, 60, 60))
        );
    }

    #[test]
    fn test_dirty_mark_all_resolves_to_full() {
        let mut d = DirtyTracker::default();
        d.add(Rect::new(5, 5, 1, 1));
        d.mark_all();
        // later partial writes cannot shrink a fully-dirty surface
        d.add(Rect::new(0, 0, 2, 2));
        assert_eq!(
            d.take(Rect::new(0, 0, 320, 200)),
            Some(Rect::new(0, 0, 320, 200))
        );
    }

    #[test]
    fn test_take_clips_to_surface() {
        let mut d = DirtyTracker::default();
        d.add(Rect::new(300, 190, 40, 40));
        assert_eq!(
            d.take(Rect::new(0, 0, 320, 200)),
            Some(Rect::new(300, 190, 20, 10))
        );
    }

    #[test]
    fn test_cpu_buffer_copy_rect_clips() {
        let mut buf = CpuBuffer::new(1);
        buf.allocate(4, 4);
        buf.dirty.take(buf.full_rect());
        // source rect hangs off the right edge
        let data = [1u8, 2, 3, 4];
        buf.copy_rect(Rect::new(3, 0, 2, 2), &data, 2);
        assert_eq!(buf.data[3], 1);
        assert_eq!(buf.data[7], 3);
        assert_eq!(buf.dirty.take(buf.full_rect()), Some(Rect::new(3, 0, 1, 2)));
    }

    #[test]
    fn test_cpu_buffer_fill_marks_all() {
        let mut buf = CpuBuffer::new(2);
        buf.allocate(2, 2);
        buf.dirty.take(buf.full_rect());
        buf.fill(PixelFormat::Rgb565, 0xf81f);
        assert!(buf.dirty.is_dirty());
        assert_eq!(buf.data[0..2], 0xf81fu16.to_ne_bytes());
        assert_eq!(buf.dirty.take(buf.full_rect()), Some(Rect::new(0, 0, 2, 2)));
    }
}
