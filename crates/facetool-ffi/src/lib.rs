//! facetool C ABI.
//!
//! Exposes the lifecycle-guarded face engine to a managed runtime through
//! plain C calls and flat `float` records.
//!
//! # Memory Ownership Rules
//!
//! - `facetool_new()` allocates on the Rust heap; the caller owns the handle
//!   and must release it with `facetool_free()`.
//! - `FaceRecordsC` and its error string are owned by the caller after return
//!   and must be released with `facetool_free_records()`.
//! - `facetool_version()` returns a static string; do not free it.
//!
//! # Thread Safety
//!
//! A handle is not thread-safe. The caller serializes calls on one handle.
//!
//! # Safety
//!
//! Every entry point runs inside `catch_unwind`: a panic unwinding across the
//! `extern "C"` boundary is undefined behavior. Null pointers yield error
//! results, never crashes.

#![warn(unsafe_op_in_unsafe_fn)]

use facetool_core::{BindingError, FaceTool, ImageBuffer, RecordLayout};
use facetool_engine::{OnnxEngine, NO_FACE_SCORE};
use std::ffi::{c_char, c_float, CStr, CString};
use std::panic::{self, AssertUnwindSafe};
use std::ptr;
use std::slice;

/// Refuse pixel buffers above this size (256 MiB).
const MAX_PIXEL_BYTES: usize = 256 * 1024 * 1024;

const VERSION: &CStr = match CStr::from_bytes_with_nul(concat!(env!("CARGO_PKG_VERSION"), "\0").as_bytes()) {
    Ok(s) => s,
    Err(_) => c"unknown",
};

/// Opaque engine handle.
pub struct FaceToolHandle {
    tool: FaceTool<OnnxEngine>,
}

/// Flat face records returned by detect and extract.
///
/// `count` records of `stride` floats each are packed back to back in
/// `data` (`len == count * stride`). Each record starts with the 15-float
/// base layout; extract records carry the embedding after it.
#[repr(C)]
pub struct FaceRecordsC {
    /// True if the operation succeeded
    pub success: bool,
    /// Error message if success is false (owned, must be freed)
    pub error_msg: *mut c_char,
    pub data: *mut c_float,
    /// Total number of floats in `data`
    pub len: usize,
    /// Number of faces
    pub count: usize,
    /// Floats per face
    pub stride: usize,
}

impl FaceRecordsC {
    fn from_records(records: Vec<Vec<f32>>) -> Self {
        let count = records.len();
        let stride = records.first().map_or(RecordLayout::BASE_LEN, Vec::len);
        if let Some(bad) = records.iter().position(|r| r.len() != stride) {
            return Self::error(&format!(
                "record {bad} has {} floats, expected {stride}",
                records[bad].len()
            ));
        }

        let (data, len) = vec_into_raw(records.into_iter().flatten().collect());
        Self {
            success: true,
            error_msg: ptr::null_mut(),
            data,
            len,
            count,
            stride,
        }
    }

    fn error(msg: &str) -> Self {
        Self {
            success: false,
            error_msg: cstring_or_fallback(msg),
            data: ptr::null_mut(),
            len: 0,
            count: 0,
            stride: 0,
        }
    }

    fn from_result(result: Result<Vec<Vec<f32>>, BindingError>) -> Self {
        match result {
            Ok(records) => Self::from_records(records),
            Err(e) => {
                tracing::warn!(error = %e, "facetool call failed");
                Self::error(&e.to_string())
            }
        }
    }
}

fn cstring_or_fallback(s: &str) -> *mut c_char {
    CString::new(s)
        .unwrap_or_else(|_| CString::from(c"error message contained a NUL byte"))
        .into_raw()
}

/// Returns a null pointer and 0 length for empty vectors.
fn vec_into_raw<T>(vec: Vec<T>) -> (*mut T, usize) {
    let len = vec.len();
    if len == 0 {
        (ptr::null_mut(), 0)
    } else {
        (Box::into_raw(vec.into_boxed_slice()) as *mut T, len)
    }
}

/// Copy a caller-owned BGR8 buffer into an [`ImageBuffer`].
///
/// # Safety
/// `pixels` must point to `len` readable bytes, or be null.
unsafe fn image_from_raw(pixels: *const u8, len: usize, width: u32, height: u32) -> Result<ImageBuffer, String> {
    if pixels.is_null() {
        return Err("pixel pointer is null".into());
    }
    if len > MAX_PIXEL_BYTES {
        return Err(format!("pixel buffer of {len} bytes exceeds the {MAX_PIXEL_BYTES} byte limit"));
    }
    // SAFETY: caller guarantees `pixels` is valid for `len` bytes.
    let bytes = unsafe { slice::from_raw_parts(pixels, len) };
    let image = ImageBuffer::new(bytes.to_vec(), width, height);
    image.validate().map_err(|e| e.to_string())?;
    Ok(image)
}

/// Run `f` with a panic guard, mapping a panic to `fallback`.
fn guarded<T>(name: &str, fallback: impl FnOnce() -> T, f: impl FnOnce() -> T) -> T {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(_) => {
            tracing::error!(entry = name, "panic caught at the C boundary");
            fallback()
        }
    }
}

// ============================================================================
// Lifecycle
// ============================================================================

/// Create an uninitialized engine handle.
///
/// Returns NULL only if construction panicked.
#[no_mangle]
pub extern "C" fn facetool_new() -> *mut FaceToolHandle {
    guarded("facetool_new", ptr::null_mut, || {
        Box::into_raw(Box::new(FaceToolHandle {
            tool: FaceTool::new(OnnxEngine::new()),
        }))
    })
}

/// Release a handle. NULL is a no-op.
///
/// # Safety
/// `handle` must come from `facetool_new` and not have been freed already.
#[no_mangle]
pub unsafe extern "C" fn facetool_free(handle: *mut FaceToolHandle) {
    if handle.is_null() {
        return;
    }
    guarded("facetool_free", || (), || {
        // SAFETY: handle was created by Box::into_raw in facetool_new.
        drop(unsafe { Box::from_raw(handle) });
    });
}

/// Load the engine configuration and models.
///
/// Returns false on any failure, including a NULL handle or path. May be
/// retried after a failure; once successful further calls return true.
///
/// # Safety
/// `handle` must be a live handle; `config_path` a NUL-terminated string.
#[no_mangle]
pub unsafe extern "C" fn facetool_init(handle: *mut FaceToolHandle, config_path: *const c_char) -> bool {
    if handle.is_null() || config_path.is_null() {
        return false;
    }
    guarded("facetool_init", || false, || {
        // SAFETY: non-null, NUL-terminated per the contract above.
        let Ok(path) = unsafe { CStr::from_ptr(config_path) }.to_str() else {
            tracing::error!("config path is not valid UTF-8");
            return false;
        };
        // SAFETY: handle is live and not aliased for the duration of the call.
        let handle = unsafe { &mut *handle };
        match handle.tool.init(path) {
            Ok(ready) => ready,
            Err(e) => {
                tracing::error!(error = %e, "facetool_init failed");
                false
            }
        }
    })
}

// ============================================================================
// Operations
// ============================================================================

/// Detect faces in a BGR8 image. Records are 15 floats each.
///
/// # Safety
/// `handle` must be a live handle; `pixels` must point to `len` bytes.
#[no_mangle]
pub unsafe extern "C" fn facetool_detect(
    handle: *mut FaceToolHandle,
    pixels: *const u8,
    len: usize,
    width: u32,
    height: u32,
) -> FaceRecordsC {
    if handle.is_null() {
        return FaceRecordsC::error("handle is null");
    }
    guarded("facetool_detect", || FaceRecordsC::error("panic in facetool_detect"), || {
        // SAFETY: forwarded caller contract.
        let image = match unsafe { image_from_raw(pixels, len, width, height) } {
            Ok(image) => image,
            Err(e) => return FaceRecordsC::error(&e),
        };
        // SAFETY: handle is live and not aliased for the duration of the call.
        let handle = unsafe { &mut *handle };
        FaceRecordsC::from_result(handle.tool.detect_records(&image))
    })
}

/// Detect faces and extract an embedding for each.
///
/// # Safety
/// Same contract as `facetool_detect`.
#[no_mangle]
pub unsafe extern "C" fn facetool_extract(
    handle: *mut FaceToolHandle,
    pixels: *const u8,
    len: usize,
    width: u32,
    height: u32,
) -> FaceRecordsC {
    if handle.is_null() {
        return FaceRecordsC::error("handle is null");
    }
    guarded("facetool_extract", || FaceRecordsC::error("panic in facetool_extract"), || {
        // SAFETY: forwarded caller contract.
        let image = match unsafe { image_from_raw(pixels, len, width, height) } {
            Ok(image) => image,
            Err(e) => return FaceRecordsC::error(&e),
        };
        // SAFETY: handle is live and not aliased for the duration of the call.
        let handle = unsafe { &mut *handle };
        FaceRecordsC::from_result(handle.tool.extract_records(&image))
    })
}

/// Similarity in `[0, 1]` between the best face of two BGR8 images.
///
/// Returns -1 when either image has no face or the call fails.
///
/// # Safety
/// `handle` must be a live handle; each pixel pointer must cover its length.
#[no_mangle]
#[allow(clippy::too_many_arguments)]
pub unsafe extern "C" fn facetool_verify(
    handle: *mut FaceToolHandle,
    pixels1: *const u8,
    len1: usize,
    width1: u32,
    height1: u32,
    pixels2: *const u8,
    len2: usize,
    width2: u32,
    height2: u32,
) -> c_float {
    if handle.is_null() {
        return NO_FACE_SCORE;
    }
    guarded("facetool_verify", || NO_FACE_SCORE, || {
        // SAFETY: forwarded caller contract.
        let images = unsafe {
            (
                image_from_raw(pixels1, len1, width1, height1),
                image_from_raw(pixels2, len2, width2, height2),
            )
        };
        let (first, second) = match images {
            (Ok(first), Ok(second)) => (first, second),
            (Err(e), _) | (_, Err(e)) => {
                tracing::warn!(error = %e, "facetool_verify: invalid image");
                return NO_FACE_SCORE;
            }
        };
        // SAFETY: handle is live and not aliased for the duration of the call.
        let handle = unsafe { &mut *handle };
        match handle.tool.verify(&first, &second) {
            Ok(score) => score,
            Err(e) => {
                tracing::warn!(error = %e, "facetool_verify failed");
                NO_FACE_SCORE
            }
        }
    })
}

// ============================================================================
// Memory
// ============================================================================

/// Release a `FaceRecordsC` returned by detect or extract.
///
/// # Safety
/// `records` must be returned by this library and freed at most once.
#[no_mangle]
pub unsafe extern "C" fn facetool_free_records(records: FaceRecordsC) {
    // SAFETY: both pointers were produced by this library or are null.
    unsafe {
        facetool_free_string(records.error_msg);
        if !records.data.is_null() && records.len > 0 {
            drop(Box::from_raw(ptr::slice_from_raw_parts_mut(records.data, records.len)));
        }
    }
}

/// Release a string allocated by this library. NULL is a no-op.
///
/// # Safety
/// `s` must come from this library and be freed at most once.
#[no_mangle]
pub unsafe extern "C" fn facetool_free_string(s: *mut c_char) {
    if !s.is_null() {
        // SAFETY: s was created by CString::into_raw.
        drop(unsafe { CString::from_raw(s) });
    }
}

/// Library version as a static NUL-terminated string.
#[no_mangle]
pub extern "C" fn facetool_version() -> *const c_char {
    VERSION.as_ptr()
}
