// GlPixel
// a 2d compositor core for the opengl family of contexts

//! GlPixel turns "draw this pixel buffer into this rectangle, with this
//! blend mode, through this optional effect chain" into the correct
//! sequence of GPU state changes for whichever GL dialect is active:
//! desktop GL, fixed-function GLES1 or programmable GLES2.
//!
//! The crate is organized bottom up:
//! context discovers the dialect and capability set and owns the active
//! pipeline, framebuffer models the destination surface (backbuffer or
//! texture target), texture and surface cover the CPU to GPU upload path
//! with incremental dirty tracking and format-conversion fallbacks,
//! pipeline encapsulates how a textured quad becomes pixels, preset and
//! the multipass pipeline run externally authored post-processing
//! chains, and compositor orchestrates the per-frame draw sequence and
//! the video-mode transaction state machine.
//!
//! Nothing here decides what to draw. The windowing glue supplies a GL
//! context plus a proc-address loader and realizes video modes through
//! the [`compositor::WindowBackend`] trait; the engine above supplies
//! raw pixel buffers.

/// common tools and data structures:
/// rect with dirty-union algebra, power-of-two rounding
pub mod util;

/// pixel formats, palettes and CPU-side format conversion
pub mod format;

/// dialect and capability discovery, legacy entry-point table,
/// the single active pipeline slot
pub mod context;

/// shader program compile/link and uniform plumbing
pub mod shader;

/// thin GPU texture wrapper with power-of-two padding
pub mod texture;

/// render targets: backbuffer and texture target, blend modes
pub mod framebuffer;

/// CPU-backed surfaces with dirty tracking and palette paths
pub mod surface;

/// fixed-function, shader, palette-lookup and multi-pass pipelines
pub mod pipeline;

/// shader-preset parsing (pass list, scale policies, aux textures)
pub mod preset;

/// frame compositor: transactions, per-frame draw sequence, osd
pub mod compositor;

/// log
pub mod log;
