// GlPixel
// a 2d compositor core for the opengl family of contexts

//! Pixel formats, palettes and the CPU-side conversions backing the
//! indexed and fallback upload paths

use serde::{Deserialize, Serialize};

/// fixed enumeration of supported pixel layouts
///
/// Rgba8888, Rgb565, Rgba5551 and Rgba4444 can be sampled directly by
/// every dialect. Rgb555 only exists on the CPU side and is converted
/// to Rgb565 during upload. Clut8 is 8-bit indexed and resolved through
/// a palette, either on the CPU or by a GPU lookup pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PixelFormat {
    Rgba8888,
    Rgb565,
    Rgb555,
    Rgba5551,
    Rgba4444,
    Clut8,
}

impl PixelFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgba8888 => 4,
            PixelFormat::Rgb565
            | PixelFormat::Rgb555
            | PixelFormat::Rgba5551
            | PixelFormat::Rgba4444 => 2,
            PixelFormat::Clut8 => 1,
        }
    }

    pub fn has_alpha(self) -> bool {
        matches!(
            self,
            PixelFormat::Rgba8888 | PixelFormat::Rgba5551 | PixelFormat::Rgba4444
        )
    }

    /// true when the layout can be handed to glTexImage2D as-is
    pub fn gl_sampleable(self) -> bool {
        !matches!(self, PixelFormat::Rgb555 | PixelFormat::Clut8)
    }

    /// pack an 8-bit rgba quad into the raw pixel value of this format
    pub fn pack(self, r: u8, g: u8, b: u8, a: u8) -> u32 {
        match self {
            // raw value chosen so a native-endian write lands the
            // bytes in r,g,b,a memory order, which is what
            // glTexImage2D(RGBA, UNSIGNED_BYTE) samples
            PixelFormat::Rgba8888 => u32::from_ne_bytes([r, g, b, a]),
            PixelFormat::Rgb565 => {
                (((r as u32) >> 3) << 11) | (((g as u32) >> 2) << 5) | ((b as u32) >> 3)
            }
            PixelFormat::Rgb555 => {
                (((r as u32) >> 3) << 10) | (((g as u32) >> 3) << 5) | ((b as u32) >> 3)
            }
            PixelFormat::Rgba5551 => {
                (((r as u32) >> 3) << 11)
                    | (((g as u32) >> 3) << 6)
                    | (((b as u32) >> 3) << 1)
                    | ((a as u32) >> 7)
            }
            PixelFormat::Rgba4444 => {
                (((r as u32) >> 4) << 12)
                    | (((g as u32) >> 4) << 8)
                    | (((b as u32) >> 4) << 4)
                    | ((a as u32) >> 4)
            }
            PixelFormat::Clut8 => r as u32,
        }
    }

    /// expand a raw pixel value of this format back to an 8-bit quad
    /// (bit replication on the low bits, same as the GPU does)
    pub fn unpack(self, v: u32) -> (u8, u8, u8, u8) {
        fn expand(v: u32, bits: u32) -> u8 {
            if bits == 0 {
                return 255;
            }
            let max = (1u32 << bits) - 1;
            ((v * 255 + max / 2) / max) as u8
        }
        match self {
            PixelFormat::Rgba8888 => {
                let [r, g, b, a] = v.to_ne_bytes();
                (r, g, b, a)
            }
            PixelFormat::Rgb565 => (
                expand((v >> 11) & 0x1f, 5),
                expand((v >> 5) & 0x3f, 6),
                expand(v & 0x1f, 5),
                255,
            ),
            PixelFormat::Rgb555 => (
                expand((v >> 10) & 0x1f, 5),
                expand((v >> 5) & 0x1f, 5),
                expand(v & 0x1f, 5),
                255,
            ),
            PixelFormat::Rgba5551 => (
                expand((v >> 11) & 0x1f, 5),
                expand((v >> 6) & 0x1f, 5),
                expand((v >> 1) & 0x1f, 5),
                expand(v & 1, 1),
            ),
            PixelFormat::Rgba4444 => (
                expand((v >> 12) & 0xf, 4),
                expand((v >> 8) & 0xf, 4),
                expand((v >> 4) & 0xf, 4),
                expand(v & 0xf, 4),
            ),
            PixelFormat::Clut8 => (v as u8, v as u8, v as u8, 255),
        }
    }

    /// write a raw pixel value into a byte buffer at offset
    pub fn write_raw(self, out: &mut [u8], offset: usize, v: u32) {
        match self.bytes_per_pixel() {
            1 => out[offset] = v as u8,
            2 => out[offset..offset + 2].copy_from_slice(&(v as u16).to_ne_bytes()),
            _ => out[offset..offset + 4].copy_from_slice(&v.to_ne_bytes()),
        }
    }

    pub fn read_raw(self, buf: &[u8], offset: usize) -> u32 {
        match self.bytes_per_pixel() {
            1 => buf[offset] as u32,
            2 => u16::from_ne_bytes([buf[offset], buf[offset + 1]]) as u32,
            _ => u32::from_ne_bytes([
                buf[offset],
                buf[offset + 1],
                buf[offset + 2],
                buf[offset + 3],
            ]),
        }
    }
}

/// 256-entry rgba palette with an optional color key
#[derive(Clone)]
pub struct Palette {
    data: [u8; 256 * 4],
    color_key: Option<u8>,
}

impl Default for Palette {
    fn default() -> Self {
        Palette {
            data: [0; 256 * 4],
            color_key: None,
        }
    }
}

impl Palette {
    /// set `num` entries starting at `start` from rgb triplets
    pub fn set_colors(&mut self, start: usize, num: usize, colors: &[u8]) {
        assert!(start + num <= 256);
        assert!(colors.len() >= num * 3);
        for i in 0..num {
            let d = (start + i) * 4;
            self.data[d] = colors[i * 3];
            self.data[d + 1] = colors[i * 3 + 1];
            self.data[d + 2] = colors[i * 3 + 2];
            self.data[d + 3] = 255;
        }
        if let Some(key) = self.color_key {
            self.data[key as usize * 4 + 3] = 0;
        }
    }

    /// read `num` entries starting at `start` as rgb triplets
    pub fn grab_colors(&self, start: usize, num: usize, out: &mut [u8]) {
        assert!(start + num <= 256);
        for i in 0..num {
            let s = (start + i) * 4;
            out[i * 3] = self.data[s];
            out[i * 3 + 1] = self.data[s + 1];
            out[i * 3 + 2] = self.data[s + 2];
        }
    }

    /// make one index fully transparent, clearing any previous key
    pub fn set_color_key(&mut self, index: u8) {
        if let Some(old) = self.color_key.take() {
            self.data[old as usize * 4 + 3] = 255;
        }
        self.data[index as usize * 4 + 3] = 0;
        self.color_key = Some(index);
    }

    pub fn entry(&self, index: u8) -> (u8, u8, u8, u8) {
        let s = index as usize * 4;
        (
            self.data[s],
            self.data[s + 1],
            self.data[s + 2],
            self.data[s + 3],
        )
    }

    pub fn rgba_bytes(&self) -> &[u8; 256 * 4] {
        &self.data
    }

    /// palette rendered into raw pixels of the destination format,
    /// one entry per index, used by the CPU lookup path
    pub fn to_format(&self, format: PixelFormat) -> Vec<u8> {
        let bpp = format.bytes_per_pixel();
        let mut out = vec![0u8; 256 * bpp];
        for i in 0..256 {
            let (r, g, b, a) = self.entry(i as u8);
            format.write_raw(&mut out, i * bpp, format.pack(r, g, b, a));
        }
        out
    }
}

/// look dirty-region indices up through a pre-rendered palette
///
/// `src` walks `src_pitch`-strided index rows, `dst` receives packed
/// destination pixels with `dst_pitch` stride.
pub fn clut8_lookup(
    src: &[u8],
    src_pitch: usize,
    dst: &mut [u8],
    dst_pitch: usize,
    palette: &[u8],
    bpp: usize,
    w: usize,
    h: usize,
) {
    for y in 0..h {
        let srow = y * src_pitch;
        let drow = y * dst_pitch;
        for x in 0..w {
            let idx = src[srow + x] as usize;
            dst[drow + x * bpp..drow + (x + 1) * bpp]
                .copy_from_slice(&palette[idx * bpp..(idx + 1) * bpp]);
        }
    }
}

/// rgb555 to rgb565 in place-of-copy, the conversion fallback for
/// dialects that cannot sample 555 directly
pub fn convert_rgb555_to_rgb565(
    src: &[u8],
    src_pitch: usize,
    dst: &mut [u8],
    dst_pitch: usize,
    w: usize,
    h: usize,
) {
    for y in 0..h {
        let srow = y * src_pitch;
        let drow = y * dst_pitch;
        for x in 0..w {
            let v = u16::from_ne_bytes([src[srow + x * 2], src[srow + x * 2 + 1]]);
            // widen green from 5 to 6 bits, replicating the msb
            let c = ((v & 0x7c00) << 1) | ((v & 0x03e0) << 1) | ((v & 0x0200) >> 4) | (v & 0x1f);
            dst[drow + x * 2..drow + x * 2 + 2].copy_from_slice(&c.to_ne_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pack_unpack_565() {
        let v = PixelFormat::Rgb565.pack(255, 0, 255, 255);
        assert_eq!(v, 0xf81f);
        let (r, g, b, a) = PixelFormat::Rgb565.unpack(v);
        assert_eq!((r, g, b, a), (255, 0, 255, 255));
    }

    #[test]
    fn test_pack_unpack_5551() {
        let v = PixelFormat::Rgba5551.pack(255, 255, 255, 255);
        assert_eq!(v, 0xffff);
        let v = PixelFormat::Rgba5551.pack(0, 0, 0, 0);
        assert_eq!(v, 0);
    }

    #[test]
    fn test_palette_color_key() {
        let mut pal = Palette::default();
        pal.set_colors(0, 2, &[10, 20, 30, 40, 50, 60]);
        assert_eq!(pal.entry(1), (40, 50, 60, 255));
        pal.set_color_key(1);
        assert_eq!(pal.entry(1), (40, 50, 60, 0));
        // moving the key restores the old entry's alpha
        pal.set_color_key(0);
        assert_eq!(pal.entry(1), (40, 50, 60, 255));
        assert_eq!(pal.entry(0).3, 0);
    }

    #[test]
    fn test_palette_to_format_survives_set_colors() {
        let mut pal = Palette::default();
        pal.set_color_key(5);
        pal.set_colors(0, 256, &[128u8; 256 * 3]);
        // key alpha is reapplied after a palette write
        assert_eq!(pal.entry(5).3, 0);
        let flat = pal.to_format(PixelFormat::Rgba8888);
        assert_eq!(flat.len(), 1024);
        assert_eq!(flat[5 * 4 + 3], 0);
    }

    #[test]
    fn test_clut8_lookup() {
        let mut pal = Palette::default();
        let mut colors = vec![0u8; 256 * 3];
        colors[3] = 11; // index 1 -> r
        colors[4] = 22;
        colors[5] = 33;
        pal.set_colors(0, 256, &colors);
        let flat = pal.to_format(PixelFormat::Rgba8888);
        let src = [1u8, 0, 1, 0];
        let mut dst = [0u8; 16];
        clut8_lookup(&src, 2, &mut dst, 8, &flat, 4, 2, 2);
        assert_eq!(&dst[0..4], &[11, 22, 33, 255]);
        assert_eq!(&dst[4..8], &[0, 0, 0, 255]);
    }

    #[test]
    fn test_rgb555_to_565() {
        // white stays white
        let w555 = (PixelFormat::Rgb555.pack(255, 255, 255, 255) as u16).to_ne_bytes();
        let mut dst = [0u8; 2];
        convert_rgb555_to_rgb565(&w555, 2, &mut dst, 2, 1, 1);
        let v = u16::from_ne_bytes(dst);
        assert_eq!(v, 0xffff);
        // pure red keeps its channel position
        let r555 = (PixelFormat::Rgb555.pack(255, 0, 0, 255) as u16).to_ne_bytes();
        convert_rgb555_to_rgb565(&r555, 2, &mut dst, 2, 1, 1);
        assert_eq!(u16::from_ne_bytes(dst), 0xf800);
    }
}
