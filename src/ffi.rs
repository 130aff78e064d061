//! C FFI layer for glove-hid.
//!
//! Provides an opaque registry handle and the orientation math for C/C++
//! consumers. The host application registers sessions from Rust; C code
//! reads the latest glove data through this API.
//! The generated C header is written to `include/glove_hid.h` by cbindgen.

use crate::error::LastError;
use crate::math;
use crate::registry::GloveRegistry;
use crate::types::{GloveData, Handedness, Quaternion, Vector3};
use std::ffi::{c_char, c_int};

/// Last error message for C consumers.
static LAST_ERROR: LastError = LastError::new();

/// Opaque registry handle for C consumers.
pub struct GlRegistry(GloveRegistry);

impl GlRegistry {
    /// Registry wrapped by this handle, for the Rust side of the host.
    pub fn registry(&self) -> &GloveRegistry {
        &self.0
    }
}

/// Create an empty glove registry.
#[no_mangle]
pub extern "C" fn gl_registry_new() -> *mut GlRegistry {
    Box::into_raw(Box::new(GlRegistry(GloveRegistry::new())))
}

/// Close all gloves and free the registry.
///
/// # Safety
/// `reg` must be a pointer returned by `gl_registry_new`, or null.
#[no_mangle]
pub unsafe extern "C" fn gl_registry_free(reg: *mut GlRegistry) {
    if !reg.is_null() {
        let reg = Box::from_raw(reg);
        reg.0.close_all();
    }
}

/// Number of sessions in the registry, or -1 for a null handle.
///
/// # Safety
/// `reg` must be a valid registry pointer, or null.
#[no_mangle]
pub unsafe extern "C" fn gl_registry_len(reg: *const GlRegistry) -> c_int {
    if reg.is_null() {
        return -1;
    }
    let reg = &*reg;
    reg.0.len() as c_int
}

/// Copy the latest data of the glove worn on `hand` (0 = left, 1 = right).
/// Returns 0 on success, -1 on error (check gl_last_error()).
///
/// # Safety
/// `reg` and `out` must be valid pointers, or null.
#[no_mangle]
pub unsafe extern "C" fn gl_get_data(
    reg: *const GlRegistry,
    hand: c_int,
    out: *mut GloveData,
) -> c_int {
    if reg.is_null() || out.is_null() {
        return -1;
    }
    let reg = &*reg;
    let hand = match hand {
        0 => Handedness::Left,
        1 => Handedness::Right,
        _ => return -1,
    };

    match reg.0.data(hand) {
        Ok(data) => {
            out.write(data);
            0
        }
        Err(e) => {
            LAST_ERROR.set(&e);
            -1
        }
    }
}

/// Euler angles [roll, pitch, yaw] in radians of a quaternion.
#[no_mangle]
pub extern "C" fn gl_euler(q: Quaternion) -> Vector3 {
    math::to_euler(q)
}

/// Gravity direction in the sensor frame implied by a quaternion.
#[no_mangle]
pub extern "C" fn gl_gravity(q: Quaternion) -> Vector3 {
    math::gravity(q)
}

/// Acceleration with gravity removed.
#[no_mangle]
pub extern "C" fn gl_linear_acceleration(raw: Vector3, gravity: Vector3) -> Vector3 {
    math::linear_acceleration(raw, gravity)
}

/// Get the last error message. Returns NULL if no error.
/// The returned pointer is valid until the next glove-hid API call.
#[no_mangle]
pub extern "C" fn gl_last_error() -> *const c_char {
    LAST_ERROR.as_ptr()
}
