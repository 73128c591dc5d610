// GlPixel
// a 2d compositor core for the opengl family of contexts

//! Frame compositor: owns the backbuffer, the game screen, overlay,
//! cursor and on-screen-display surfaces, runs the video-mode
//! transaction state machine and issues the per-frame draw sequence

use std::ffi::c_void;
use std::time::Instant;

use bitflags::bitflags;
use glow::HasContext;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};

use crate::context::{GlCaps, GlContext, GlDialect};
use crate::format::{Palette, PixelFormat};
use crate::framebuffer::{read_rgba_flipped, Backbuffer, BlendMode, Framebuffer};
use crate::pipeline::{FixedFunctionPipeline, MultiPassPipeline, Pipeline, ShaderPipeline};
use crate::preset::{DecoderRegistry, ShaderPreset};
use crate::surface::{create_surface, Surface};
use crate::texture::FilterMode;
use crate::util::Rect;

/// how long an OSD message stays fully opaque, then how long it fades
const OSD_DISPLAY_MS: u64 = 2000;
const OSD_FADE_MS: u64 = 500;

/// requested video mode, the unit the transaction machine works on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoState {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub aspect_ratio_correction: bool,
    pub graphics_mode: i32,
    pub filtering: bool,
    pub valid: bool,
}

impl VideoState {
    fn invalid() -> Self {
        VideoState {
            width: 0,
            height: 0,
            format: PixelFormat::Clut8,
            aspect_ratio_correction: false,
            graphics_mode: 0,
            filtering: false,
            valid: false,
        }
    }

    /// value comparison of the requested properties; the valid flag is
    /// bookkeeping, not part of the request
    pub fn differs_from(&self, other: &VideoState) -> bool {
        self.width != other.width
            || self.height != other.height
            || self.format != other.format
            || self.aspect_ratio_correction != other.aspect_ratio_correction
            || self.graphics_mode != other.graphics_mode
            || self.filtering != other.filtering
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TransactionMode {
    None,
    Active,
    Rollback,
}

bitflags! {
    /// which requested properties could not be realized
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct TransactionError: u32 {
        const SIZE_CHANGE_FAILED   = 1 << 0;
        const FORMAT_NOT_SUPPORTED = 1 << 1;
        const ASPECT_RATIO_FAILED  = 1 << 2;
        const MODE_SWITCH_FAILED   = 1 << 3;
        const FILTERING_FAILED     = 1 << 4;
    }
}

/// what the compositor needs from the windowing glue
pub trait WindowBackend {
    /// realize the requested mode; false when the platform refuses
    fn load_video_mode(&mut self, state: &VideoState) -> bool;
    /// present the finished backbuffer
    fn refresh_screen(&mut self);
}

/// straight-alpha RGBA bitmap handed to the OSD layer
pub struct OsdBitmap {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

/// pluggable text rasterizer for OSD messages
pub trait OsdRenderer {
    fn render(&mut self, message: &str, max_width: u32) -> Option<OsdBitmap>;
}

/// compositing layers in back-to-front draw order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Layer {
    GameScreen,
    Overlay,
    Cursor,
    Osd,
}

/// blend policy per layer, independent of call order
fn layer_blend(layer: Layer) -> BlendMode {
    match layer {
        Layer::GameScreen => BlendMode::Disabled,
        Layer::Overlay | Layer::Osd => BlendMode::Traditional,
        Layer::Cursor => BlendMode::Premultiplied,
    }
}

/// classic low-res modes assume non-square pixels; stretch them to 4:3
fn corrected_height(w: u32, h: u32) -> u32 {
    if (w == 320 && h == 200) || (w == 640 && h == 400) {
        h * 6 / 5
    } else {
        h
    }
}

/// largest centered rect inside the window preserving gw:gh
fn fit_centered(win_w: u32, win_h: u32, gw: u32, gh: u32) -> Rect {
    if gw == 0 || gh == 0 || win_w == 0 || win_h == 0 {
        return Rect::default();
    }
    let scale_w = win_w as f32 / gw as f32;
    let scale_h = win_h as f32 / gh as f32;
    let scale = scale_w.min(scale_h);
    let w = ((gw as f32 * scale) as u32).max(1);
    let h = ((gh as f32 * scale) as u32).max(1);
    Rect::new(
        ((win_w - w) / 2) as i32,
        ((win_h - h) / 2) as i32,
        w,
        h,
    )
}

/// render raw cursor pixels to premultiplied RGBA, keying one value out
fn premultiply_cursor(
    data: &[u8],
    pitch: usize,
    w: u32,
    h: u32,
    format: PixelFormat,
    key: Option<u32>,
    palette: Option<&Palette>,
) -> Vec<u8> {
    let bpp = format.bytes_per_pixel();
    let mut out = vec![0u8; w as usize * h as usize * 4];
    for y in 0..h as usize {
        for x in 0..w as usize {
            let raw = format.read_raw(data, y * pitch + x * bpp);
            if key == Some(raw) {
                continue;
            }
            let (r, g, b, a) = match (format, palette) {
                (PixelFormat::Clut8, Some(pal)) => pal.entry(raw as u8),
                _ => format.unpack(raw),
            };
            if a == 0 {
                continue;
            }
            let d = (y * w as usize + x) * 4;
            out[d] = (r as u32 * a as u32 / 255) as u8;
            out[d + 1] = (g as u32 * a as u32 / 255) as u8;
            out[d + 2] = (b as u32 * a as u32 / 255) as u8;
            out[d + 3] = a;
        }
    }
    out
}

struct CursorState {
    surface: Option<Box<dyn Surface>>,
    /// raw pixels kept for re-rendering on palette or key changes
    data: Vec<u8>,
    format: PixelFormat,
    width: u32,
    height: u32,
    hotspot_x: i32,
    hotspot_y: i32,
    key: Option<u32>,
    palette: Palette,
    use_own_palette: bool,
    visible: bool,
    x: i32,
    y: i32,
    needs_render: bool,
}

impl CursorState {
    fn new() -> Self {
        CursorState {
            surface: None,
            data: Vec::new(),
            format: PixelFormat::Clut8,
            width: 0,
            height: 0,
            hotspot_x: 0,
            hotspot_y: 0,
            key: None,
            palette: Palette::default(),
            use_own_palette: false,
            visible: false,
            x: 0,
            y: 0,
            needs_render: false,
        }
    }
}

struct OsdState {
    message: Option<Box<dyn Surface>>,
    message_shown: Option<Instant>,
    icon: Option<Box<dyn Surface>>,
    renderer: Option<Box<dyn OsdRenderer>>,
}

impl OsdState {
    fn new() -> Self {
        OsdState {
            message: None,
            message_shown: None,
            icon: None,
            renderer: None,
        }
    }

    /// current message alpha, None once the fade has finished
    fn message_alpha(&self) -> Option<f32> {
        let shown = self.message_shown?;
        let elapsed = shown.elapsed().as_millis() as u64;
        if elapsed < OSD_DISPLAY_MS {
            Some(1.0)
        } else if elapsed < OSD_DISPLAY_MS + OSD_FADE_MS {
            Some(1.0 - (elapsed - OSD_DISPLAY_MS) as f32 / OSD_FADE_MS as f32)
        } else {
            None
        }
    }
}

pub struct Compositor {
    backend: Box<dyn WindowBackend>,
    ctx: Option<GlContext>,
    generation: u64,

    transaction_mode: TransactionMode,
    current_state: VideoState,
    old_state: VideoState,
    screen_change_id: i32,

    window_width: u32,
    window_height: u32,
    dpi_scale: f32,
    game_draw_rect: Rect,

    game_screen: Option<Box<dyn Surface>>,
    game_palette: [u8; 768],
    game_color_key: Option<u8>,

    overlay: Option<Box<dyn Surface>>,
    overlay_visible: bool,

    cursor: CursorState,
    osd: OsdState,

    preset: Option<ShaderPreset>,
    decoders: DecoderRegistry,

    forced_redraw: bool,
}

impl Compositor {
    pub fn new(backend: Box<dyn WindowBackend>) -> Self {
        Compositor {
            backend,
            ctx: None,
            generation: 0,
            transaction_mode: TransactionMode::None,
            current_state: VideoState::invalid(),
            old_state: VideoState::invalid(),
            screen_change_id: 0,
            window_width: 0,
            window_height: 0,
            dpi_scale: 1.0,
            game_draw_rect: Rect::default(),
            game_screen: None,
            game_palette: [0; 768],
            game_color_key: None,
            overlay: None,
            overlay_visible: false,
            cursor: CursorState::new(),
            osd: OsdState::new(),
            preset: None,
            decoders: DecoderRegistry::with_defaults(),
            forced_redraw: false,
        }
    }

    /// formats the compositor accepts regardless of dialect; the
    /// unsampleable ones go through the CPU conversion fallback
    pub fn supported_formats(&self) -> Vec<PixelFormat> {
        vec![
            PixelFormat::Rgba8888,
            PixelFormat::Rgb565,
            PixelFormat::Rgba5551,
            PixelFormat::Rgba4444,
            PixelFormat::Rgb555,
            PixelFormat::Clut8,
        ]
    }

    // --- transaction state machine ---

    pub fn begin_gfx_transaction(&mut self) {
        if self.transaction_mode != TransactionMode::None {
            warn!("graphics transaction already active");
            return;
        }
        self.old_state = self.current_state;
        self.transaction_mode = TransactionMode::Active;
    }

    pub fn init_size(&mut self, width: u32, height: u32, format: PixelFormat) {
        debug_assert!(self.transaction_mode != TransactionMode::None);
        self.current_state.width = width;
        self.current_state.height = height;
        self.current_state.format = format;
    }

    pub fn set_graphics_mode(&mut self, mode: i32) {
        self.current_state.graphics_mode = mode;
    }

    pub fn set_aspect_ratio_correction(&mut self, enable: bool) {
        self.current_state.aspect_ratio_correction = enable;
    }

    pub fn set_filtering(&mut self, enable: bool) {
        self.current_state.filtering = enable;
    }

    /// try to realize the requested mode, rolling back to the last
    /// valid state on failure
    ///
    /// Accumulates a flag per property that could not be realized. If
    /// even the rolled-back state cannot be loaded there is no
    /// renderable surface left and the process terminates.
    pub fn end_gfx_transaction(&mut self) -> TransactionError {
        let mut errors = TransactionError::empty();
        if self.transaction_mode == TransactionMode::None {
            warn!("ending a graphics transaction that never began");
            return errors;
        }

        // identical request against a valid snapshot: nothing to
        // reload, but the change counter still ticks on every
        // successful transaction
        if self.old_state.valid && !self.current_state.differs_from(&self.old_state) {
            self.current_state.valid = true;
            self.transaction_mode = TransactionMode::None;
            self.screen_change_id += 1;
            return errors;
        }

        loop {
            if self.try_apply_state() {
                break;
            }
            if self.transaction_mode == TransactionMode::Rollback || !self.old_state.valid {
                error!("unable to restore any renderable video mode");
                std::process::exit(1);
            }
            // blame every property the request changed
            if self.current_state.width != self.old_state.width
                || self.current_state.height != self.old_state.height
            {
                errors |= TransactionError::SIZE_CHANGE_FAILED;
            }
            if self.current_state.format != self.old_state.format {
                errors |= TransactionError::FORMAT_NOT_SUPPORTED;
            }
            if self.current_state.aspect_ratio_correction != self.old_state.aspect_ratio_correction
            {
                errors |= TransactionError::ASPECT_RATIO_FAILED;
            }
            if self.current_state.graphics_mode != self.old_state.graphics_mode {
                errors |= TransactionError::MODE_SWITCH_FAILED;
            }
            if self.current_state.filtering != self.old_state.filtering {
                errors |= TransactionError::FILTERING_FAILED;
            }
            info!("video mode rejected, rolling back: {:?}", errors);
            self.current_state = self.old_state;
            self.transaction_mode = TransactionMode::Rollback;
        }

        let size_changed = self.current_state.width != self.old_state.width
            || self.current_state.height != self.old_state.height
            || self.current_state.format != self.old_state.format
            || self.game_screen.is_none();
        self.current_state.valid = true;
        self.transaction_mode = TransactionMode::None;
        if size_changed {
            self.setup_game_screen();
        }
        self.recalculate_display_area();
        // callers re-query layout whenever this moves
        self.screen_change_id += 1;
        self.forced_redraw = true;
        errors
    }

    fn try_apply_state(&mut self) -> bool {
        if let Some(ctx) = &self.ctx {
            let max = ctx.max_texture_size as u32;
            if max > 0 && (self.current_state.width > max || self.current_state.height > max) {
                return false;
            }
        }
        if !self.supported_formats().contains(&self.current_state.format) {
            return false;
        }
        self.backend.load_video_mode(&self.current_state)
    }

    fn setup_game_screen(&mut self) {
        let ctx = match self.ctx.as_mut() {
            Some(c) => c,
            None => return,
        };
        if let Some(mut old) = self.game_screen.take() {
            old.destroy(ctx);
        }
        match create_surface(ctx, self.current_state.format, false) {
            Ok(mut surface) => {
                surface.allocate(ctx, self.current_state.width, self.current_state.height);
                surface.set_filter(
                    ctx,
                    if self.current_state.filtering {
                        FilterMode::Linear
                    } else {
                        FilterMode::Nearest
                    },
                );
                if self.current_state.format == PixelFormat::Clut8 {
                    surface.set_palette(0, 256, &self.game_palette);
                    if let Some(key) = self.game_color_key {
                        surface.set_color_key(key);
                    }
                }
                self.game_screen = Some(surface);
            }
            Err(e) => error!("cannot create game screen surface: {}", e),
        }
    }

    fn recalculate_display_area(&mut self) {
        let (gw, gh) = (self.current_state.width, self.current_state.height);
        let gh = if self.current_state.aspect_ratio_correction {
            corrected_height(gw, gh)
        } else {
            gh
        };
        self.game_draw_rect = fit_centered(self.window_width, self.window_height, gw, gh);
    }

    pub fn screen_change_id(&self) -> i32 {
        self.screen_change_id
    }

    pub fn width(&self) -> u32 {
        self.current_state.width
    }

    pub fn height(&self) -> u32 {
        self.current_state.height
    }

    pub fn game_draw_rect(&self) -> Rect {
        self.game_draw_rect
    }

    pub fn dpi_scale(&self) -> f32 {
        self.dpi_scale
    }

    // --- game screen ---

    pub fn copy_rect_to_screen(
        &mut self,
        data: &[u8],
        pitch: usize,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
    ) {
        if let Some(screen) = self.game_screen.as_mut() {
            screen.copy_rect(Rect::new(x, y, w, h), data, pitch);
        }
    }

    pub fn fill_screen(&mut self, value: u32) {
        if let Some(screen) = self.game_screen.as_mut() {
            screen.fill(value);
        }
    }

    pub fn set_palette(&mut self, start: usize, num: usize, colors: &[u8]) {
        self.game_palette[start * 3..(start + num) * 3].copy_from_slice(&colors[..num * 3]);
        if let Some(screen) = self.game_screen.as_mut() {
            screen.set_palette(start, num, colors);
        }
        if !self.cursor.use_own_palette {
            self.cursor.palette.set_colors(start, num, colors);
            self.cursor.needs_render = true;
        }
    }

    pub fn grab_palette(&self, start: usize, num: usize, out: &mut [u8]) {
        out[..num * 3].copy_from_slice(&self.game_palette[start * 3..(start + num) * 3]);
    }

    pub fn set_screen_color_key(&mut self, index: u8) {
        self.game_color_key = Some(index);
        if let Some(screen) = self.game_screen.as_mut() {
            screen.set_color_key(index);
        }
    }

    // --- overlay ---

    pub fn show_overlay(&mut self) {
        self.overlay_visible = true;
        self.forced_redraw = true;
    }

    pub fn hide_overlay(&mut self) {
        self.overlay_visible = false;
        self.forced_redraw = true;
    }

    pub fn is_overlay_visible(&self) -> bool {
        self.overlay_visible
    }

    pub fn overlay_size(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    pub fn clear_overlay(&mut self) {
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.fill(0);
        }
    }

    pub fn copy_rect_to_overlay(
        &mut self,
        data: &[u8],
        pitch: usize,
        x: i32,
        y: i32,
        w: u32,
        h: u32,
    ) {
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.copy_rect(Rect::new(x, y, w, h), data, pitch);
        }
    }

    // --- cursor ---

    #[allow(clippy::too_many_arguments)]
    pub fn set_mouse_cursor(
        &mut self,
        data: &[u8],
        pitch: usize,
        w: u32,
        h: u32,
        hotspot_x: i32,
        hotspot_y: i32,
        key: Option<u32>,
        format: PixelFormat,
    ) {
        let bpp = format.bytes_per_pixel();
        let row = w as usize * bpp;
        let mut copy = Vec::with_capacity(row * h as usize);
        for y in 0..h as usize {
            copy.extend_from_slice(&data[y * pitch..y * pitch + row]);
        }
        self.cursor.data = copy;
        self.cursor.format = format;
        self.cursor.width = w;
        self.cursor.height = h;
        self.cursor.hotspot_x = hotspot_x;
        self.cursor.hotspot_y = hotspot_y;
        self.cursor.key = key;
        self.cursor.needs_render = true;
    }

    pub fn set_cursor_palette(&mut self, start: usize, num: usize, colors: &[u8]) {
        self.cursor.palette.set_colors(start, num, colors);
        self.cursor.use_own_palette = true;
        self.cursor.needs_render = true;
    }

    pub fn disable_cursor_palette(&mut self) {
        if !self.cursor.use_own_palette {
            return;
        }
        self.cursor.use_own_palette = false;
        // fall back to the game palette
        let palette = self.game_palette;
        self.cursor.palette.set_colors(0, 256, &palette);
        self.cursor.needs_render = true;
    }

    pub fn show_mouse(&mut self, visible: bool) {
        if self.cursor.visible != visible {
            self.cursor.visible = visible;
            self.forced_redraw = true;
        }
    }

    pub fn set_mouse_position(&mut self, x: i32, y: i32) {
        self.cursor.x = x;
        self.cursor.y = y;
    }

    /// re-render the raw cursor into its premultiplied RGBA surface
    fn render_cursor(&mut self) {
        let ctx = match self.ctx.as_mut() {
            Some(c) => c,
            None => return,
        };
        if self.cursor.width == 0 || self.cursor.height == 0 {
            return;
        }
        let rgba = premultiply_cursor(
            &self.cursor.data,
            self.cursor.width as usize * self.cursor.format.bytes_per_pixel(),
            self.cursor.width,
            self.cursor.height,
            self.cursor.format,
            self.cursor.key,
            Some(&self.cursor.palette),
        );
        if self.cursor.surface.is_none() {
            match create_surface(ctx, PixelFormat::Rgba8888, true) {
                Ok(s) => self.cursor.surface = Some(s),
                Err(e) => {
                    error!("cannot create cursor surface: {}", e);
                    return;
                }
            }
        }
        let surface = self.cursor.surface.as_mut().unwrap();
        if surface.width() != self.cursor.width || surface.height() != self.cursor.height {
            surface.allocate(ctx, self.cursor.width, self.cursor.height);
        }
        surface.copy_rect(
            Rect::new(0, 0, self.cursor.width, self.cursor.height),
            &rgba,
            self.cursor.width as usize * 4,
        );
        self.cursor.needs_render = false;
    }

    // --- on-screen display ---

    pub fn set_osd_renderer(&mut self, renderer: Box<dyn OsdRenderer>) {
        self.osd.renderer = Some(renderer);
    }

    pub fn display_message(&mut self, message: &str) {
        let ctx = match self.ctx.as_mut() {
            Some(c) => c,
            None => return,
        };
        let mut renderer = match self.osd.renderer.take() {
            Some(r) => r,
            None => return,
        };
        if let Some(bitmap) = renderer.render(message, self.window_width) {
            if self.osd.message.is_none() {
                match create_surface(ctx, PixelFormat::Rgba8888, true) {
                    Ok(s) => self.osd.message = Some(s),
                    Err(e) => {
                        error!("cannot create osd surface: {}", e);
                        self.osd.renderer = Some(renderer);
                        return;
                    }
                }
            }
            let surface = self.osd.message.as_mut().unwrap();
            if surface.width() != bitmap.width || surface.height() != bitmap.height {
                surface.allocate(ctx, bitmap.width, bitmap.height);
            }
            surface.copy_rect(
                Rect::new(0, 0, bitmap.width, bitmap.height),
                &bitmap.rgba,
                bitmap.width as usize * 4,
            );
            self.osd.message_shown = Some(Instant::now());
        }
        self.osd.renderer = Some(renderer);
    }

    /// static icon in the window corner, straight-alpha blended
    pub fn display_icon(&mut self, bitmap: Option<OsdBitmap>) {
        let ctx = match self.ctx.as_mut() {
            Some(c) => c,
            None => return,
        };
        match bitmap {
            None => {
                if let Some(mut icon) = self.osd.icon.take() {
                    icon.destroy(ctx);
                }
            }
            Some(bitmap) => {
                if self.osd.icon.is_none() {
                    match create_surface(ctx, PixelFormat::Rgba8888, true) {
                        Ok(s) => self.osd.icon = Some(s),
                        Err(e) => {
                            error!("cannot create osd icon surface: {}", e);
                            return;
                        }
                    }
                }
                let icon = self.osd.icon.as_mut().unwrap();
                if icon.width() != bitmap.width || icon.height() != bitmap.height {
                    icon.allocate(ctx, bitmap.width, bitmap.height);
                }
                icon.copy_rect(
                    Rect::new(0, 0, bitmap.width, bitmap.height),
                    &bitmap.rgba,
                    bitmap.width as usize * 4,
                );
            }
        }
        self.forced_redraw = true;
    }

    // --- per-frame draw ---

    /// compose one frame; skipped entirely when nothing changed
    pub fn update_screen(&mut self) {
        if self.ctx.is_none() || self.game_screen.is_none() {
            return;
        }
        if self.cursor.needs_render {
            self.render_cursor();
        }

        let message_alpha = self.osd.message_alpha();
        if message_alpha.is_none() && self.osd.message_shown.is_some() {
            // fade finished, draw once more without the message
            self.osd.message_shown = None;
            self.forced_redraw = true;
        }

        let dirty = self.forced_redraw
            || self.game_screen.as_ref().map_or(false, |s| s.is_dirty())
            || (self.overlay_visible && self.overlay.as_ref().map_or(false, |s| s.is_dirty()))
            || (self.cursor.visible
                && self.cursor.surface.as_ref().map_or(false, |s| s.is_dirty()))
            || self.osd.message_shown.is_some()
            || self.osd.icon.as_ref().map_or(false, |s| s.is_dirty());
        if !dirty {
            return;
        }
        self.forced_redraw = false;

        let ctx = self.ctx.as_mut().unwrap();
        if let Some(screen) = self.game_screen.as_mut() {
            screen.flush(ctx);
        }
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.flush(ctx);
        }
        if let Some(cursor) = self.cursor.surface.as_mut() {
            cursor.flush(ctx);
        }
        if let Some(message) = self.osd.message.as_mut() {
            message.flush(ctx);
        }
        if let Some(icon) = self.osd.icon.as_mut() {
            icon.flush(ctx);
        }

        let game_rect = self.game_draw_rect;
        let overlay_visible = self.overlay_visible;
        let (win_w, win_h) = (self.window_width, self.window_height);

        {
            let (gl, legacy, pipeline) = ctx.gl_and_pipeline();
            let pipeline = match pipeline {
                Some(p) => p,
                None => return,
            };
            pipeline.begin_frame();

            unsafe {
                gl.clear(glow::COLOR_BUFFER_BIT);
            }

            // with the overlay hidden only the game area is written,
            // clip everything else out
            if let Some(fb) = pipeline.framebuffer_mut() {
                if overlay_visible {
                    fb.enable_scissor_test(gl, false);
                } else {
                    fb.set_scissor_box(gl, game_rect);
                    fb.enable_scissor_test(gl, true);
                }
            }

            if let Some(screen) = self.game_screen.as_ref() {
                if let Some(fb) = pipeline.framebuffer_mut() {
                    fb.enable_blend(gl, layer_blend(Layer::GameScreen));
                }
                // only the game screen goes through the preset chain;
                // overlay, cursor and OSD draw plainly on top
                pipeline.draw_texture_processed(
                    gl,
                    screen.gl_texture(),
                    game_rect.x as f32,
                    game_rect.y as f32,
                    game_rect.w as f32,
                    game_rect.h as f32,
                );
            }

            if overlay_visible {
                if let Some(overlay) = self.overlay.as_ref() {
                    if let Some(fb) = pipeline.framebuffer_mut() {
                        fb.enable_blend(gl, layer_blend(Layer::Overlay));
                    }
                    pipeline.draw_texture(
                        gl,
                        overlay.gl_texture(),
                        0.0,
                        0.0,
                        win_w as f32,
                        win_h as f32,
                    );
                }
            }

            if self.cursor.visible {
                if let Some(cursor) = self.cursor.surface.as_ref() {
                    if let Some(fb) = pipeline.framebuffer_mut() {
                        fb.enable_blend(gl, layer_blend(Layer::Cursor));
                    }
                    pipeline.draw_texture(
                        gl,
                        cursor.gl_texture(),
                        (self.cursor.x - self.cursor.hotspot_x) as f32,
                        (self.cursor.y - self.cursor.hotspot_y) as f32,
                        cursor.width() as f32,
                        cursor.height() as f32,
                    );
                }
            }

            if let (Some(alpha), Some(message)) = (message_alpha, self.osd.message.as_ref()) {
                if let Some(fb) = pipeline.framebuffer_mut() {
                    fb.enable_blend(gl, layer_blend(Layer::Osd));
                }
                pipeline.set_color(gl, legacy, [alpha, alpha, alpha, alpha]);
                let x = (win_w.saturating_sub(message.width())) / 2;
                let y = (win_h.saturating_sub(message.height())) / 2;
                pipeline.draw_texture(
                    gl,
                    message.gl_texture(),
                    x as f32,
                    y as f32,
                    message.width() as f32,
                    message.height() as f32,
                );
                pipeline.set_color(gl, legacy, [1.0, 1.0, 1.0, 1.0]);
            }

            if let Some(icon) = self.osd.icon.as_ref() {
                if let Some(fb) = pipeline.framebuffer_mut() {
                    fb.enable_blend(gl, layer_blend(Layer::Osd));
                }
                let x = win_w.saturating_sub(icon.width() + 10);
                pipeline.draw_texture(
                    gl,
                    icon.gl_texture(),
                    x as f32,
                    10.0,
                    icon.width() as f32,
                    icon.height() as f32,
                );
            }

            crate::context::check_gl_error(gl, "update_screen");
        }

        self.backend.refresh_screen();
    }

    /// read the backbuffer back as top-down RGBA rows
    pub fn screenshot(&self) -> Option<(u32, u32, Vec<u8>)> {
        let ctx = self.ctx.as_ref()?;
        if self.window_width == 0 || self.window_height == 0 {
            return None;
        }
        Some((
            self.window_width,
            self.window_height,
            read_rgba_flipped(&ctx.gl, self.window_width, self.window_height),
        ))
    }

    // --- window / context lifecycle ---

    pub fn notify_resize(&mut self, width: u32, height: u32, dpi_scale: f32) {
        self.window_width = width;
        self.window_height = height;
        self.dpi_scale = dpi_scale;
        self.recalculate_display_area();
        if let Some(ctx) = self.ctx.as_mut() {
            let (gl, legacy, pipeline) = ctx.gl_and_pipeline();
            if let Some(pipeline) = pipeline {
                // reinstalling the backbuffer re-applies viewport,
                // projection and scissor for the new size
                if let Some(Framebuffer::Backbuffer(mut bb)) =
                    pipeline.set_framebuffer(gl, legacy, None)
                {
                    bb.set_dimensions(width, height);
                    pipeline.set_framebuffer(gl, legacy, Some(Framebuffer::Backbuffer(bb)));
                }
            }
        }
        self.setup_overlay();
        self.forced_redraw = true;
        self.screen_change_id += 1;
    }

    fn setup_overlay(&mut self) {
        let ctx = match self.ctx.as_mut() {
            Some(c) => c,
            None => return,
        };
        if self.window_width == 0 || self.window_height == 0 {
            return;
        }
        if self.overlay.is_none() {
            match create_surface(ctx, PixelFormat::Rgba8888, true) {
                Ok(s) => self.overlay = Some(s),
                Err(e) => {
                    error!("cannot create overlay surface: {}", e);
                    return;
                }
            }
        }
        let overlay = self.overlay.as_mut().unwrap();
        if overlay.width() != self.window_width || overlay.height() != self.window_height {
            overlay.allocate(ctx, self.window_width, self.window_height);
            overlay.fill(0);
        }
    }

    /// start a GPU resource epoch on a freshly created context
    pub fn notify_context_create(
        &mut self,
        dialect: GlDialect,
        loader: &mut dyn FnMut(&str) -> *const c_void,
    ) -> Result<(), String> {
        self.generation += 1;
        let mut ctx = GlContext::new(dialect, self.generation, loader);

        let pipeline = self.build_pipeline(&ctx)?;
        ctx.set_pipeline(Some(pipeline));

        let mut backbuffer = Backbuffer::new();
        backbuffer.set_dimensions(self.window_width, self.window_height);
        {
            let (gl, legacy, pipeline) = ctx.gl_and_pipeline();
            if let Some(pipeline) = pipeline {
                pipeline.set_framebuffer(gl, legacy, Some(Framebuffer::Backbuffer(backbuffer)));
            }
        }
        self.ctx = Some(ctx);

        // surfaces outlive the context; recreate their GPU halves
        let ctx = self.ctx.as_mut().unwrap();
        if let Some(screen) = self.game_screen.as_mut() {
            screen.recreate(ctx)?;
        } else if self.current_state.valid {
            self.setup_game_screen();
        }
        let ctx = self.ctx.as_mut().unwrap();
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.recreate(ctx)?;
        }
        if let Some(cursor) = self.cursor.surface.as_mut() {
            cursor.recreate(ctx)?;
        }
        if let Some(message) = self.osd.message.as_mut() {
            message.recreate(ctx)?;
        }
        if let Some(icon) = self.osd.icon.as_mut() {
            icon.recreate(ctx)?;
        }
        self.setup_overlay();
        self.forced_redraw = true;
        Ok(())
    }

    fn build_pipeline(&self, ctx: &GlContext) -> Result<Pipeline, String> {
        if !ctx.caps.contains(GlCaps::SHADERS_SUPPORTED) {
            if self.preset.is_some() {
                warn!("shader preset loaded but shaders are unavailable");
            }
            if !ctx.legacy.fixed_function_complete() {
                warn!("fixed-function entry points are incomplete, draws will be dropped");
            }
            return Ok(Pipeline::FixedFunction(FixedFunctionPipeline::new(
                &ctx.legacy,
            )));
        }
        if let Some(preset) = &self.preset {
            match MultiPassPipeline::new(
                &ctx.gl,
                ctx.shader_version_prefix(),
                preset,
                &self.decoders,
                ctx.npot_supported(),
                ctx.dialect == GlDialect::Gl,
                ctx.generation,
            ) {
                Ok(p) => return Ok(Pipeline::MultiPass(p)),
                // a broken preset degrades to the plain shader path
                Err(e) => error!("cannot build shader preset pipeline: {}", e),
            }
        }
        Ok(Pipeline::Shader(ShaderPipeline::new(
            &ctx.gl,
            ctx.shader_version_prefix(),
        )?))
    }

    /// end the GPU resource epoch; every handle created within it is
    /// invalid the moment this returns
    pub fn notify_context_destroy(&mut self) {
        let mut ctx = match self.ctx.take() {
            Some(c) => c,
            None => return,
        };
        if let Some(screen) = self.game_screen.as_mut() {
            screen.destroy(&mut ctx);
        }
        if let Some(overlay) = self.overlay.as_mut() {
            overlay.destroy(&mut ctx);
        }
        if let Some(cursor) = self.cursor.surface.as_mut() {
            cursor.destroy(&mut ctx);
        }
        if let Some(message) = self.osd.message.as_mut() {
            message.destroy(&mut ctx);
        }
        if let Some(icon) = self.osd.icon.as_mut() {
            icon.destroy(&mut ctx);
        }
        if let Some(mut pipeline) = ctx.set_pipeline(None) {
            pipeline.free(&ctx.gl);
        }
    }

    // --- shader presets ---

    /// parse and remember a preset; it takes effect on the next
    /// context creation
    pub fn load_shader_preset<P: AsRef<std::path::Path>>(
        &mut self,
        path: P,
    ) -> Result<(), String> {
        self.preset = Some(ShaderPreset::load(path)?);
        Ok(())
    }

    pub fn clear_shader_preset(&mut self) {
        self.preset = None;
    }

    pub fn decoder_registry_mut(&mut self) -> &mut DecoderRegistry {
        &mut self.decoders
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    struct MockBackend {
        /// how many load attempts to reject before accepting
        fail_next: Rc<RefCell<u32>>,
        loads: Rc<RefCell<Vec<VideoState>>>,
    }

    impl WindowBackend for MockBackend {
        fn load_video_mode(&mut self, state: &VideoState) -> bool {
            self.loads.borrow_mut().push(*state);
            let mut fails = self.fail_next.borrow_mut();
            if *fails > 0 {
                *fails -= 1;
                false
            } else {
                true
            }
        }

        fn refresh_screen(&mut self) {}
    }

    fn compositor_with_mock() -> (Compositor, Rc<RefCell<u32>>, Rc<RefCell<Vec<VideoState>>>) {
        let fail_next = Rc::new(RefCell::new(0));
        let loads = Rc::new(RefCell::new(Vec::new()));
        let backend = MockBackend {
            fail_next: fail_next.clone(),
            loads: loads.clone(),
        };
        (Compositor::new(Box::new(backend)), fail_next, loads)
    }

    #[test]
    fn test_transaction_success() {
        let (mut c, _, loads) = compositor_with_mock();
        c.begin_gfx_transaction();
        c.init_size(320, 200, PixelFormat::Clut8);
        let errors = c.end_gfx_transaction();
        assert!(errors.is_empty());
        assert_eq!(loads.borrow().len(), 1);
        assert_eq!(c.screen_change_id(), 1);
    }

    #[test]
    fn test_transaction_rollback_accumulates_flags() {
        let (mut c, fail_next, loads) = compositor_with_mock();
        c.begin_gfx_transaction();
        c.init_size(320, 200, PixelFormat::Clut8);
        assert!(c.end_gfx_transaction().is_empty());

        // ask for a different size and mode, reject the first attempt
        *fail_next.borrow_mut() = 1;
        c.begin_gfx_transaction();
        c.init_size(640, 480, PixelFormat::Rgb565);
        c.set_graphics_mode(3);
        let errors = c.end_gfx_transaction();
        assert!(errors.contains(TransactionError::SIZE_CHANGE_FAILED));
        assert!(errors.contains(TransactionError::FORMAT_NOT_SUPPORTED));
        assert!(errors.contains(TransactionError::MODE_SWITCH_FAILED));
        assert!(!errors.contains(TransactionError::ASPECT_RATIO_FAILED));
        // rolled back to the previous request
        assert_eq!(c.width(), 320);
        assert_eq!(c.height(), 200);
        // the rollback load came from the restored snapshot
        let loads = loads.borrow();
        let last = loads.last().unwrap();
        assert_eq!(last.width, 320);
        assert_eq!(last.graphics_mode, 0);
    }

    #[test]
    fn test_identical_request_reloads_nothing() {
        let (mut c, _, loads) = compositor_with_mock();
        c.begin_gfx_transaction();
        c.init_size(320, 200, PixelFormat::Clut8);
        c.end_gfx_transaction();
        let count = loads.borrow().len();
        let id = c.screen_change_id();

        c.begin_gfx_transaction();
        c.init_size(320, 200, PixelFormat::Clut8);
        let errors = c.end_gfx_transaction();
        assert!(errors.is_empty());
        assert_eq!(loads.borrow().len(), count);
        // no reload, but every successful transaction ticks the counter
        assert_eq!(c.screen_change_id(), id + 1);
    }

    #[test]
    fn test_layer_blend_policy() {
        assert_eq!(layer_blend(Layer::GameScreen), BlendMode::Disabled);
        assert_eq!(layer_blend(Layer::Overlay), BlendMode::Traditional);
        assert_eq!(layer_blend(Layer::Osd), BlendMode::Traditional);
        assert_eq!(layer_blend(Layer::Cursor), BlendMode::Premultiplied);
    }

    #[test]
    fn test_aspect_correction_applies_to_classic_modes() {
        assert_eq!(corrected_height(320, 200), 240);
        assert_eq!(corrected_height(640, 400), 480);
        assert_eq!(corrected_height(640, 480), 480);
        assert_eq!(corrected_height(800, 600), 600);
    }

    #[test]
    fn test_fit_centered() {
        // 4:3 content in a 16:9 window pillarboxes
        let r = fit_centered(1920, 1080, 320, 240);
        assert_eq!(r.h, 1080);
        assert_eq!(r.w, 1440);
        assert_eq!(r.x, 240);
        assert_eq!(r.y, 0);
        // degenerate input yields an empty rect
        assert!(fit_centered(0, 0, 320, 240).is_empty());
    }

    #[test]
    fn test_premultiply_cursor_keys_and_scales() {
        // 2x1 565 cursor, first pixel keyed out
        let key = PixelFormat::Rgb565.pack(255, 0, 255, 255);
        let white = PixelFormat::Rgb565.pack(255, 255, 255, 255);
        let mut data = [0u8; 4];
        PixelFormat::Rgb565.write_raw(&mut data, 0, key);
        PixelFormat::Rgb565.write_raw(&mut data, 2, white);
        let out = premultiply_cursor(&data, 4, 2, 1, PixelFormat::Rgb565, Some(key), None);
        assert_eq!(&out[0..4], &[0, 0, 0, 0]);
        assert_eq!(&out[4..8], &[255, 255, 255, 255]);
    }

    #[test]
    fn test_premultiply_cursor_indexed_with_palette() {
        let mut pal = Palette::default();
        let mut colors = [0u8; 768];
        colors[3] = 200; // index 1
        colors[4] = 100;
        colors[5] = 50;
        pal.set_colors(0, 256, &colors);
        pal.set_color_key(2);
        let data = [1u8, 2];
        let out = premultiply_cursor(&data, 2, 2, 1, PixelFormat::Clut8, None, Some(&pal));
        assert_eq!(&out[0..4], &[200, 100, 50, 255]);
        // index 2 is the color key, alpha 0 drops the pixel
        assert_eq!(&out[4..8], &[0, 0, 0, 0]);
    }

    #[test]
    fn test_video_state_valid_flag_is_not_a_difference() {
        let mut a = VideoState::invalid();
        a.width = 320;
        let mut b = a;
        b.valid = true;
        assert!(!a.differs_from(&b));
        b.filtering = true;
        assert!(a.differs_from(&b));
    }
}
