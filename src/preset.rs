// GlPixel
// a 2d compositor core for the opengl family of contexts

//! Shader preset files: a flat key=value description of an ordered
//! pass chain plus named auxiliary textures
//!
//! Paths inside a preset resolve relative to the preset's directory.
//! Auxiliary textures load through a decoder registry keyed by file
//! extension so callers can plug in their own formats.

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use log::info;
use serde::{Deserialize, Serialize};

/// how one axis of a pass's render target is sized
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum AxisScale {
    /// input size times a float factor
    Source(f32),
    /// output viewport size times a float factor
    Viewport(f32),
    /// explicit pixel count
    Absolute(u32),
    /// unscaled, sized to the final output viewport
    Full,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pass {
    pub shader_path: PathBuf,
    /// None means inherit the caller's filtering
    pub filter_linear: Option<bool>,
    pub mipmap_input: bool,
    pub float_framebuffer: bool,
    pub srgb_framebuffer: bool,
    /// 0 means the frame counter is not wrapped
    pub frame_count_mod: u32,
    pub scale_x: AxisScale,
    pub scale_y: AxisScale,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PresetTexture {
    pub id: String,
    pub path: PathBuf,
    pub linear: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShaderPreset {
    pub base_path: PathBuf,
    pub passes: Vec<Pass>,
    pub textures: Vec<PresetTexture>,
}

impl ShaderPreset {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let path = path.as_ref();
        let source = fs::read_to_string(path)
            .map_err(|e| format!("cannot read preset {}: {}", path.display(), e))?;
        let base = path.parent().unwrap_or_else(|| Path::new(".")).to_path_buf();
        let preset = Self::parse(&source, &base)?;
        info!(
            "loaded shader preset {} with {} passes",
            path.display(),
            preset.passes.len()
        );
        Ok(preset)
    }

    /// parse preset text; `base_path` anchors relative file references
    pub fn parse(source: &str, base_path: &Path) -> Result<Self, String> {
        let values = parse_key_values(source)?;

        let pass_count: usize = values
            .get("shaders")
            .ok_or("preset is missing the shaders key")?
            .parse()
            .map_err(|_| "shaders is not a number".to_string())?;
        if pass_count == 0 {
            return Err("preset declares zero passes".into());
        }

        let mut passes = Vec::with_capacity(pass_count);
        for i in 0..pass_count {
            passes.push(parse_pass(&values, base_path, i, i + 1 == pass_count)?);
        }

        let mut textures = Vec::new();
        if let Some(ids) = values.get("textures") {
            for id in ids.split(';').map(str::trim).filter(|s| !s.is_empty()) {
                let path = values
                    .get(id)
                    .ok_or_else(|| format!("texture {} has no path", id))?;
                let linear = match values.get(&format!("{}_linear", id)) {
                    Some(v) => parse_bool(v)?,
                    None => false,
                };
                textures.push(PresetTexture {
                    id: id.to_string(),
                    path: base_path.join(path),
                    linear,
                });
            }
        }

        Ok(ShaderPreset {
            base_path: base_path.to_path_buf(),
            passes,
            textures,
        })
    }
}

fn parse_pass(
    values: &HashMap<String, String>,
    base_path: &Path,
    i: usize,
    is_last: bool,
) -> Result<Pass, String> {
    let shader = values
        .get(&format!("shader{}", i))
        .ok_or_else(|| format!("pass {} has no shader path", i))?;

    let filter_linear = match values.get(&format!("filter_linear{}", i)) {
        Some(v) => Some(parse_bool(v)?),
        None => None,
    };
    let get_bool = |key: &str| -> Result<bool, String> {
        match values.get(&format!("{}{}", key, i)) {
            Some(v) => parse_bool(v),
            None => Ok(false),
        }
    };
    let frame_count_mod = match values.get(&format!("frame_count_mod{}", i)) {
        Some(v) => v
            .parse()
            .map_err(|_| format!("frame_count_mod{} is not a number", i))?,
        None => 0,
    };

    let (scale_x, scale_y) = parse_scale(values, i, is_last)?;

    Ok(Pass {
        shader_path: base_path.join(shader),
        filter_linear,
        mipmap_input: get_bool("mipmap_input")?,
        float_framebuffer: get_bool("float_framebuffer")?,
        srgb_framebuffer: get_bool("srgb_framebuffer")?,
        frame_count_mod,
        scale_x,
        scale_y,
    })
}

#[derive(Clone, Copy, PartialEq)]
enum ScaleKind {
    Source,
    Viewport,
    Absolute,
}

fn parse_scale(
    values: &HashMap<String, String>,
    i: usize,
    is_last: bool,
) -> Result<(AxisScale, AxisScale), String> {
    let kind = |key: &str| -> Result<Option<ScaleKind>, String> {
        match values.get(&format!("{}{}", key, i)).map(String::as_str) {
            None => Ok(None),
            Some("source") => Ok(Some(ScaleKind::Source)),
            Some("viewport") => Ok(Some(ScaleKind::Viewport)),
            Some("absolute") => Ok(Some(ScaleKind::Absolute)),
            Some(other) => Err(format!("unknown scale type {} on pass {}", other, i)),
        }
    };

    let mut kind_x = kind("scale_type_x")?;
    let mut kind_y = kind("scale_type_y")?;
    // a combined type overrides the per-axis keys
    if let Some(k) = kind("scale_type")? {
        kind_x = Some(k);
        kind_y = Some(k);
    }

    let combined = values.get(&format!("scale{}", i));
    if combined.is_some() && kind_x != kind_y {
        return Err(format!(
            "pass {} combines a single scale with differing per-axis scale types",
            i
        ));
    }

    let value_x = combined.or_else(|| values.get(&format!("scale_x{}", i)));
    let value_y = combined.or_else(|| values.get(&format!("scale_y{}", i)));

    let resolve = |kind: Option<ScaleKind>, value: Option<&String>| -> Result<AxisScale, String> {
        let kind = match kind {
            Some(k) => k,
            // scale types default to source-relative except on the
            // last pass, which fills the output viewport
            None if is_last && value.is_none() => return Ok(AxisScale::Full),
            None => ScaleKind::Source,
        };
        match kind {
            ScaleKind::Absolute => {
                let v = value
                    .ok_or_else(|| format!("pass {} absolute scale has no pixel count", i))?;
                let px = v
                    .parse()
                    .map_err(|_| format!("pass {} absolute scale {} is not an integer", i, v))?;
                Ok(AxisScale::Absolute(px))
            }
            kind => {
                let factor = match value {
                    Some(v) => v
                        .parse()
                        .map_err(|_| format!("pass {} scale {} is not a number", i, v))?,
                    None => 1.0,
                };
                match kind {
                    ScaleKind::Source => Ok(AxisScale::Source(factor)),
                    ScaleKind::Viewport => Ok(AxisScale::Viewport(factor)),
                    ScaleKind::Absolute => unreachable!(),
                }
            }
        }
    };

    Ok((resolve(kind_x, value_x)?, resolve(kind_y, value_y)?))
}

/// split preset text into trimmed key=value pairs; `#` starts a
/// comment line, double quotes protect values containing spaces
fn parse_key_values(source: &str) -> Result<HashMap<String, String>, String> {
    let mut values = HashMap::new();
    for (n, line) in source.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (key, value) = line
            .split_once('=')
            .ok_or_else(|| format!("line {} is not a key=value pair", n + 1))?;
        let key = key.trim();
        let mut value = value.trim();
        if value.len() >= 2 && value.starts_with('"') && value.ends_with('"') {
            value = &value[1..value.len() - 1];
        }
        if key.is_empty() {
            return Err(format!("line {} has an empty key", n + 1));
        }
        values.insert(key.to_string(), value.to_string());
    }
    Ok(values)
}

fn parse_bool(v: &str) -> Result<bool, String> {
    match v {
        "true" | "1" => Ok(true),
        "false" | "0" => Ok(false),
        other => Err(format!("{} is not a boolean", other)),
    }
}

/// a decoded auxiliary texture, always expanded to RGBA8888
pub struct DecodedImage {
    pub width: u32,
    pub height: u32,
    pub rgba: Vec<u8>,
}

pub type ImageDecoder = fn(&Path) -> Result<DecodedImage, String>;

/// maps lowercase file extensions to decoders
pub struct DecoderRegistry {
    decoders: HashMap<String, ImageDecoder>,
}

impl DecoderRegistry {
    pub fn new() -> Self {
        DecoderRegistry {
            decoders: HashMap::new(),
        }
    }

    /// registry preloaded with the common raster formats
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        #[cfg(feature = "image")]
        for ext in ["png", "bmp", "tga", "jpg", "jpeg"] {
            registry.register(ext, decode_with_image);
        }
        registry
    }

    pub fn register(&mut self, extension: &str, decoder: ImageDecoder) {
        self.decoders.insert(extension.to_lowercase(), decoder);
    }

    pub fn decode(&self, path: &Path) -> Result<DecodedImage, String> {
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .ok_or_else(|| format!("{} has no file extension", path.display()))?;
        let decoder = self
            .decoders
            .get(&ext)
            .ok_or_else(|| format!("no decoder registered for .{}", ext))?;
        decoder(path)
    }
}

impl Default for DecoderRegistry {
    fn default() -> Self {
        DecoderRegistry::with_defaults()
    }
}

#[cfg(feature = "image")]
fn decode_with_image(path: &Path) -> Result<DecodedImage, String> {
    let img = image::open(path)
        .map_err(|e| format!("cannot decode {}: {}", path.display(), e))?
        .to_rgba8();
    let (width, height) = img.dimensions();
    Ok(DecodedImage {
        width,
        height,
        rgba: img.into_raw(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_two_pass_round_trip() {
        let src = "shaders=2\nshader0=a.glsl\nshader1=b.glsl\nscale_type1=source\nscale0=2.0\n";
        let preset = ShaderPreset::parse(src, Path::new("presets")).unwrap();
        assert_eq!(preset.passes.len(), 2);
        assert_eq!(preset.passes[0].shader_path, Path::new("presets/a.glsl"));
        assert_eq!(preset.passes[0].scale_x, AxisScale::Source(2.0));
        assert_eq!(preset.passes[0].scale_y, AxisScale::Source(2.0));
        assert_eq!(preset.passes[1].scale_x, AxisScale::Source(1.0));
        assert_eq!(preset.passes[1].scale_y, AxisScale::Source(1.0));
    }

    #[test]
    fn test_last_pass_defaults_to_full() {
        let src = "shaders=1\nshader0=only.glsl\n";
        let preset = ShaderPreset::parse(src, Path::new(".")).unwrap();
        assert_eq!(preset.passes[0].scale_x, AxisScale::Full);
        assert_eq!(preset.passes[0].scale_y, AxisScale::Full);
    }

    #[test]
    fn test_combined_type_overrides_per_axis() {
        let src = "shaders=1\nshader0=s.glsl\nscale_type_x0=viewport\nscale_type0=absolute\n\
                   scale0=512\n";
        let preset = ShaderPreset::parse(src, Path::new(".")).unwrap();
        assert_eq!(preset.passes[0].scale_x, AxisScale::Absolute(512));
        assert_eq!(preset.passes[0].scale_y, AxisScale::Absolute(512));
    }

    #[test]
    fn test_combined_scale_with_differing_types_is_an_error() {
        let src = "shaders=1\nshader0=s.glsl\nscale_type_x0=source\nscale_type_y0=viewport\n\
                   scale0=2.0\n";
        assert!(ShaderPreset::parse(src, Path::new(".")).is_err());
    }

    #[test]
    fn test_absolute_requires_integer() {
        let src = "shaders=1\nshader0=s.glsl\nscale_type0=absolute\n";
        assert!(ShaderPreset::parse(src, Path::new(".")).is_err());
        let src = "shaders=1\nshader0=s.glsl\nscale_type0=absolute\nscale0=2.5\n";
        assert!(ShaderPreset::parse(src, Path::new(".")).is_err());
    }

    #[test]
    fn test_textures_and_quoted_values() {
        let src = "shaders=1\nshader0=\"dir with space/s.glsl\"\ntextures=\"lut;grain\"\n\
                   lut=lut.png\nlut_linear=true\ngrain=grain.png\n";
        let preset = ShaderPreset::parse(src, Path::new("base")).unwrap();
        assert_eq!(
            preset.passes[0].shader_path,
            Path::new("base/dir with space/s.glsl")
        );
        assert_eq!(preset.textures.len(), 2);
        assert_eq!(preset.textures[0].id, "lut");
        assert!(preset.textures[0].linear);
        assert_eq!(preset.textures[1].id, "grain");
        assert!(!preset.textures[1].linear);
    }

    #[test]
    fn test_comments_and_missing_keys() {
        let src = "# a preset\nshaders=1\nshader0=s.glsl\n";
        assert!(ShaderPreset::parse(src, Path::new(".")).is_ok());
        assert!(ShaderPreset::parse("shader0=s.glsl\n", Path::new(".")).is_err());
        assert!(ShaderPreset::parse("shaders=1\n", Path::new(".")).is_err());
    }
}
