// GlPixel
// a 2d compositor core for the opengl family of contexts

//! Fixed-function entry points resolved by name
//!
//! glow only wraps the programmable-profile surface, so the handful of
//! calls the fixed-function pipeline needs are resolved here through
//! the same proc-address loader the glow context is built from. Every
//! entry is optional; callers guard each use. Legacy enums glow does
//! not export are declared as plain consts.

use std::ffi::c_void;

pub const GL_LIGHTING: u32 = 0x0B50;
pub const GL_FOG: u32 = 0x0B60;
pub const GL_FLAT: u32 = 0x1D00;
pub const GL_PERSPECTIVE_CORRECTION_HINT: u32 = 0x0C50;
pub const GL_FASTEST: u32 = 0x1101;
pub const GL_MODELVIEW: u32 = 0x1700;
pub const GL_PROJECTION: u32 = 0x1701;
pub const GL_VERTEX_ARRAY: u32 = 0x8074;
pub const GL_TEXTURE_COORD_ARRAY: u32 = 0x8078;
pub const GL_LUMINANCE: u32 = 0x1909;

pub type FnColor4f = unsafe extern "system" fn(f32, f32, f32, f32);
pub type FnMatrixMode = unsafe extern "system" fn(u32);
pub type FnLoadMatrixf = unsafe extern "system" fn(*const f32);
pub type FnClientState = unsafe extern "system" fn(u32);
pub type FnVertexPointer = unsafe extern "system" fn(i32, u32, i32, *const c_void);
pub type FnShadeModel = unsafe extern "system" fn(u32);
pub type FnHint = unsafe extern "system" fn(u32, u32);

/// resolved fixed-function entry points, all optional
pub struct LegacyFns {
    pub color4f: Option<FnColor4f>,
    pub matrix_mode: Option<FnMatrixMode>,
    pub load_matrixf: Option<FnLoadMatrixf>,
    pub enable_client_state: Option<FnClientState>,
    pub disable_client_state: Option<FnClientState>,
    pub vertex_pointer: Option<FnVertexPointer>,
    pub tex_coord_pointer: Option<FnVertexPointer>,
    pub shade_model: Option<FnShadeModel>,
    pub hint: Option<FnHint>,
}

unsafe fn resolve<T: Copy>(
    loader: &mut dyn FnMut(&str) -> *const c_void,
    name: &str,
) -> Option<T> {
    assert_eq!(std::mem::size_of::<T>(), std::mem::size_of::<*const c_void>());
    let ptr = loader(name);
    if ptr.is_null() {
        None
    } else {
        Some(std::mem::transmute_copy(&ptr))
    }
}

impl LegacyFns {
    pub fn load(loader: &mut dyn FnMut(&str) -> *const c_void) -> Self {
        unsafe {
            LegacyFns {
                color4f: resolve(loader, "glColor4f"),
                matrix_mode: resolve(loader, "glMatrixMode"),
                load_matrixf: resolve(loader, "glLoadMatrixf"),
                enable_client_state: resolve(loader, "glEnableClientState"),
                disable_client_state: resolve(loader, "glDisableClientState"),
                vertex_pointer: resolve(loader, "glVertexPointer"),
                tex_coord_pointer: resolve(loader, "glTexCoordPointer"),
                shade_model: resolve(loader, "glShadeModel"),
                hint: resolve(loader, "glHint"),
            }
        }
    }

    /// nothing resolved, for contexts without a fixed-function profile
    pub fn empty() -> Self {
        LegacyFns {
            color4f: None,
            matrix_mode: None,
            load_matrixf: None,
            enable_client_state: None,
            disable_client_state: None,
            vertex_pointer: None,
            tex_coord_pointer: None,
            shade_model: None,
            hint: None,
        }
    }

    /// true when every call the fixed-function draw path issues is there
    pub fn fixed_function_complete(&self) -> bool {
        self.color4f.is_some()
            && self.matrix_mode.is_some()
            && self.load_matrixf.is_some()
            && self.enable_client_state.is_some()
            && self.disable_client_state.is_some()
            && self.vertex_pointer.is_some()
            && self.tex_coord_pointer.is_some()
    }
}
