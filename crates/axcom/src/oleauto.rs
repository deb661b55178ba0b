//! Portable OLE Automation runtime
//!
//! `BSTR`, `SAFEARRAY` and `VARIANT` management with the memory layout the
//! system `oleaut32` uses:
//!
//! - a BSTR points at UTF-16 data preceded by a 4-byte byte-length prefix and
//!   followed by a 2-byte NUL
//! - a SAFEARRAY header is preceded by its element `VARTYPE`
//!   (`FADF_HAVEVARTYPE`), stores its bounds rightmost dimension first, and
//!   lays elements out with the leftmost index varying fastest
//!
//! Every allocation is recorded in a process-wide ledger so that frees of
//! foreign or already-freed pointers are refused and logged instead of
//! corrupting the heap. Tests use [`bstr_is_live`] and [`safe_array_is_live`]
//! to assert exact ownership.

use std::alloc::{Layout, alloc_zeroed, dealloc};
use std::collections::BTreeMap;
use std::ffi::c_void;
use std::mem::{align_of, size_of};

use parking_lot::Mutex;

use crate::com::{
    DISP_E_ARRAYISLOCKED, DISP_E_BADINDEX, DISP_E_BADVARTYPE, E_INVALIDARG, E_OUTOFMEMORY, HRESULT,
    IUnknown, S_OK,
};
use crate::types::*;

/// Live BSTR data pointers and their allocation size
static LIVE_BSTRS: Mutex<BTreeMap<usize, usize>> = Mutex::new(BTreeMap::new());
/// Live SAFEARRAY headers and their allocation size
static LIVE_ARRAYS: Mutex<BTreeMap<usize, usize>> = Mutex::new(BTreeMap::new());

const BSTR_PREFIX: usize = size_of::<u32>();
const ARRAY_PREFIX: usize = 16;
const ARRAY_ALIGN: usize = 8;

// =============================================================================
// BSTR
// =============================================================================

/// Allocate a BSTR holding `s`.
#[must_use]
pub fn sys_alloc_string(s: &str) -> BSTR {
    let wide: Vec<u16> = s.encode_utf16().collect();
    sys_alloc_string_len(&wide)
}

/// Allocate a BSTR holding a copy of `chars`.
#[must_use]
pub fn sys_alloc_string_len(chars: &[u16]) -> BSTR {
    let byte_len = chars.len() * size_of::<u16>();
    let total = BSTR_PREFIX + byte_len + size_of::<u16>();
    let Ok(layout) = Layout::from_size_align(total, align_of::<u32>()) else {
        return std::ptr::null_mut();
    };

    unsafe {
        let base = alloc_zeroed(layout);
        if base.is_null() {
            return std::ptr::null_mut();
        }
        (base as *mut u32).write(byte_len as u32);
        let data = base.add(BSTR_PREFIX) as *mut u16;
        std::ptr::copy_nonoverlapping(chars.as_ptr(), data, chars.len());
        LIVE_BSTRS.lock().insert(data as usize, total);
        data
    }
}

/// Free a BSTR. Null is a no-op; unknown pointers are refused.
pub fn sys_free_string(bstr: BSTR) {
    if bstr.is_null() {
        return;
    }
    let Some(total) = LIVE_BSTRS.lock().remove(&(bstr as usize)) else {
        log::error!("sys_free_string: {:p} is not a live BSTR", bstr);
        return;
    };
    unsafe {
        let base = (bstr as *mut u8).sub(BSTR_PREFIX);
        dealloc(base, Layout::from_size_align_unchecked(total, align_of::<u32>()));
    }
}

/// Length in UTF-16 code units; 0 for null.
#[must_use]
pub fn sys_string_len(bstr: BSTR) -> u32 {
    if bstr.is_null() {
        return 0;
    }
    unsafe { ((bstr as *const u8).sub(BSTR_PREFIX) as *const u32).read() / 2 }
}

/// Copy a BSTR into a `String`; null is the empty string.
#[must_use]
pub fn bstr_to_string(bstr: BSTR) -> String {
    if bstr.is_null() {
        return String::new();
    }
    let len = sys_string_len(bstr) as usize;
    let chars = unsafe { std::slice::from_raw_parts(bstr as *const u16, len) };
    String::from_utf16_lossy(chars)
}

/// Copy a NUL-terminated UTF-16 string into a `String`.
///
/// # Safety
/// `ptr` must be null or point to a NUL-terminated UTF-16 string.
#[must_use]
pub unsafe fn wide_to_string(ptr: *const u16) -> String {
    if ptr.is_null() {
        return String::new();
    }
    unsafe {
        let mut len = 0;
        while *ptr.add(len) != 0 {
            len += 1;
        }
        String::from_utf16_lossy(std::slice::from_raw_parts(ptr, len))
    }
}

/// Whether `bstr` was allocated here and not yet freed.
#[must_use]
pub fn bstr_is_live(bstr: BSTR) -> bool {
    LIVE_BSTRS.lock().contains_key(&(bstr as usize))
}

// =============================================================================
// SAFEARRAY
// =============================================================================

/// Size of one element of `vt`, or `None` if arrays of it are unsupported
fn element_size(vt: VARTYPE) -> Option<u32> {
    let size = match vt {
        VT_I1 | VT_UI1 => 1,
        VT_I2 | VT_UI2 | VT_BOOL => 2,
        VT_I4 | VT_UI4 | VT_INT | VT_UINT | VT_R4 | VT_ERROR => 4,
        VT_I8 | VT_UI8 | VT_R8 | VT_CY | VT_DATE => 8,
        VT_BSTR | VT_DISPATCH | VT_UNKNOWN => size_of::<*mut c_void>(),
        VT_VARIANT => size_of::<VARIANT>(),
        _ => return None,
    };
    Some(size as u32)
}

fn feature_flags(vt: VARTYPE) -> u16 {
    FADF_HAVEVARTYPE
        | match vt {
            VT_BSTR => FADF_BSTR,
            VT_UNKNOWN => FADF_UNKNOWN,
            VT_DISPATCH => FADF_DISPATCH,
            VT_VARIANT => FADF_VARIANT,
            _ => 0,
        }
}

fn header_size(dims: usize) -> usize {
    ARRAY_PREFIX + size_of::<SAFEARRAY>() + dims.saturating_sub(1) * size_of::<SAFEARRAYBOUND>()
}

/// Bounds in declaration order (dimension 1 first)
///
/// # Safety
/// `psa` must be a live array.
unsafe fn bounds_of(psa: *const SAFEARRAY) -> Vec<SAFEARRAYBOUND> {
    unsafe {
        let dims = (*psa).c_dims as usize;
        let stored = std::slice::from_raw_parts((*psa).rgsabound.as_ptr(), dims);
        stored.iter().rev().copied().collect()
    }
}

fn element_count(bounds: &[SAFEARRAYBOUND]) -> usize {
    bounds.iter().map(|b| b.c_elements as usize).product()
}

fn data_layout(cb_elements: u32, count: usize) -> Option<Layout> {
    let size = (cb_elements as usize).checked_mul(count)?.max(1);
    Layout::from_size_align(size, ARRAY_ALIGN).ok()
}

/// Create an array of `vt` with `bounds` given in declaration order.
///
/// Returns null for unsupported element types or zero dimensions.
#[must_use]
pub fn safe_array_create(vt: VARTYPE, bounds: &[SAFEARRAYBOUND]) -> *mut SAFEARRAY {
    let Some(cb_elements) = element_size(vt) else {
        log::warn!("safe_array_create: unsupported element type {}", vt);
        return std::ptr::null_mut();
    };
    if bounds.is_empty() || bounds.len() > u16::MAX as usize {
        return std::ptr::null_mut();
    }

    let total = header_size(bounds.len());
    let (Ok(header_layout), Some(data_layout)) = (
        Layout::from_size_align(total, ARRAY_ALIGN),
        data_layout(cb_elements, element_count(bounds)),
    ) else {
        return std::ptr::null_mut();
    };

    unsafe {
        let base = alloc_zeroed(header_layout);
        if base.is_null() {
            return std::ptr::null_mut();
        }
        let data = alloc_zeroed(data_layout);
        if data.is_null() {
            dealloc(base, header_layout);
            return std::ptr::null_mut();
        }

        (base.add(ARRAY_PREFIX - size_of::<u32>()) as *mut u32).write(u32::from(vt));
        let psa = base.add(ARRAY_PREFIX) as *mut SAFEARRAY;
        (*psa).c_dims = bounds.len() as u16;
        (*psa).f_features = feature_flags(vt);
        (*psa).cb_elements = cb_elements;
        (*psa).c_locks = 0;
        (*psa).pv_data = data as *mut c_void;
        let stored = (*psa).rgsabound.as_mut_ptr();
        for (i, bound) in bounds.iter().rev().enumerate() {
            stored.add(i).write(*bound);
        }

        LIVE_ARRAYS.lock().insert(psa as usize, total);
        psa
    }
}

/// Create a one-dimensional array.
#[must_use]
pub fn safe_array_create_vector(vt: VARTYPE, lower_bound: i32, count: u32) -> *mut SAFEARRAY {
    safe_array_create(vt, &[SAFEARRAYBOUND::new(count, lower_bound)])
}

/// Whether `psa` was created here and not yet destroyed.
#[must_use]
pub fn safe_array_is_live(psa: *const SAFEARRAY) -> bool {
    LIVE_ARRAYS.lock().contains_key(&(psa as usize))
}

/// Element type stored with the array
#[must_use]
pub fn safe_array_get_vartype(psa: *const SAFEARRAY) -> Option<VARTYPE> {
    if psa.is_null() {
        return None;
    }
    unsafe {
        if (*psa).f_features & FADF_HAVEVARTYPE != 0 {
            let tag = ((psa as *const u8).sub(size_of::<u32>()) as *const u32).read();
            return Some(tag as VARTYPE);
        }
        let features = (*psa).f_features;
        if features & FADF_BSTR != 0 {
            Some(VT_BSTR)
        } else if features & FADF_VARIANT != 0 {
            Some(VT_VARIANT)
        } else if features & FADF_DISPATCH != 0 {
            Some(VT_DISPATCH)
        } else if features & FADF_UNKNOWN != 0 {
            Some(VT_UNKNOWN)
        } else {
            None
        }
    }
}

/// Number of dimensions; 0 for null.
#[must_use]
pub fn safe_array_get_dim(psa: *const SAFEARRAY) -> u32 {
    if psa.is_null() {
        0
    } else {
        u32::from(unsafe { (*psa).c_dims })
    }
}

/// Bound of dimension `dim` (1-based, declaration order)
fn bound(psa: *const SAFEARRAY, dim: u32) -> Option<SAFEARRAYBOUND> {
    let dims = safe_array_get_dim(psa);
    if dim == 0 || dim > dims {
        return None;
    }
    unsafe { Some(*(*psa).rgsabound.as_ptr().add((dims - dim) as usize)) }
}

/// Lower bound of dimension `dim` (1-based)
#[must_use]
pub fn safe_array_get_lbound(psa: *const SAFEARRAY, dim: u32) -> Option<i32> {
    bound(psa, dim).map(|b| b.l_lbound)
}

/// Upper bound (inclusive) of dimension `dim` (1-based)
#[must_use]
pub fn safe_array_get_ubound(psa: *const SAFEARRAY, dim: u32) -> Option<i32> {
    bound(psa, dim).map(|b| b.l_lbound + b.c_elements as i32 - 1)
}

/// Address of the element at `indices` (declaration order)
///
/// # Safety
/// `psa` must be a live array.
unsafe fn element_ptr(psa: *const SAFEARRAY, indices: &[i32]) -> Result<*mut u8, HRESULT> {
    unsafe {
        let bounds = bounds_of(psa);
        if indices.len() != bounds.len() {
            return Err(DISP_E_BADINDEX);
        }
        let mut offset = 0usize;
        let mut stride = 1usize;
        for (index, b) in indices.iter().zip(&bounds) {
            let relative = i64::from(*index) - i64::from(b.l_lbound);
            if relative < 0 || relative >= i64::from(b.c_elements) {
                return Err(DISP_E_BADINDEX);
            }
            offset += relative as usize * stride;
            stride *= b.c_elements as usize;
        }
        Ok(((*psa).pv_data as *mut u8).add(offset * (*psa).cb_elements as usize))
    }
}

/// Release whatever one element owns
///
/// # Safety
/// `element` must point to an element of type `vt`.
unsafe fn clear_element(vt: VARTYPE, element: *mut u8) {
    unsafe {
        match vt {
            VT_BSTR => {
                let slot = element as *mut BSTR;
                sys_free_string(*slot);
                *slot = std::ptr::null_mut();
            }
            VT_VARIANT => {
                variant_clear(&mut *(element as *mut VARIANT));
            }
            VT_DISPATCH | VT_UNKNOWN => {
                let slot = element as *mut *mut IUnknown;
                if !(*slot).is_null() {
                    (**slot).release();
                }
                *slot = std::ptr::null_mut();
            }
            _ => {}
        }
    }
}

/// Copy `src` into `dst` taking new ownership (string copy, AddRef, deep variant copy)
///
/// # Safety
/// Both must point to elements of type `vt`; `dst` must hold nothing owned.
unsafe fn copy_element(vt: VARTYPE, dst: *mut u8, src: *const u8, size: usize) -> HRESULT {
    unsafe {
        match vt {
            VT_BSTR => {
                let source = *(src as *const BSTR);
                let copy = if source.is_null() {
                    std::ptr::null_mut()
                } else {
                    let len = sys_string_len(source) as usize;
                    sys_alloc_string_len(std::slice::from_raw_parts(source, len))
                };
                *(dst as *mut BSTR) = copy;
                S_OK
            }
            VT_VARIANT => {
                let target = &mut *(dst as *mut VARIANT);
                *target = VARIANT::new();
                variant_copy(target, &*(src as *const VARIANT))
            }
            VT_DISPATCH | VT_UNKNOWN => {
                let source = *(src as *const *mut IUnknown);
                if !source.is_null() {
                    (*source).add_ref();
                }
                *(dst as *mut *mut IUnknown) = source;
                S_OK
            }
            _ => {
                std::ptr::copy_nonoverlapping(src, dst, size);
                S_OK
            }
        }
    }
}

/// Store a copy of `*value` at `indices`, releasing the previous element.
///
/// `value` points to an element of the array's type: a `BSTR`, a `VARIANT`,
/// an interface pointer or a scalar.
///
/// # Safety
/// `psa` must be a live array and `value` a valid element pointer.
pub unsafe fn safe_array_put_element(
    psa: *mut SAFEARRAY,
    indices: &[i32],
    value: *const c_void,
) -> HRESULT {
    if psa.is_null() || value.is_null() {
        return E_INVALIDARG;
    }
    let Some(vt) = safe_array_get_vartype(psa) else {
        return DISP_E_BADVARTYPE;
    };
    unsafe {
        let element = match element_ptr(psa, indices) {
            Ok(ptr) => ptr,
            Err(hr) => return hr,
        };
        clear_element(vt, element);
        copy_element(vt, element, value as *const u8, (*psa).cb_elements as usize)
    }
}

/// Copy the element at `indices` into `*out`; the caller owns the copy.
///
/// # Safety
/// `psa` must be a live array and `out` must have room for one element.
pub unsafe fn safe_array_get_element(
    psa: *const SAFEARRAY,
    indices: &[i32],
    out: *mut c_void,
) -> HRESULT {
    if psa.is_null() || out.is_null() {
        return E_INVALIDARG;
    }
    let Some(vt) = safe_array_get_vartype(psa) else {
        return DISP_E_BADVARTYPE;
    };
    unsafe {
        let element = match element_ptr(psa, indices) {
            Ok(ptr) => ptr,
            Err(hr) => return hr,
        };
        copy_element(vt, out as *mut u8, element, (*psa).cb_elements as usize)
    }
}

/// Deep copy of an array.
///
/// # Safety
/// `psa` must be null or a live array.
#[must_use]
pub unsafe fn safe_array_copy(psa: *const SAFEARRAY) -> *mut SAFEARRAY {
    if psa.is_null() {
        return std::ptr::null_mut();
    }
    let Some(vt) = safe_array_get_vartype(psa) else {
        return std::ptr::null_mut();
    };
    unsafe {
        let bounds = bounds_of(psa);
        let copy = safe_array_create(vt, &bounds);
        if copy.is_null() {
            return copy;
        }
        let size = (*psa).cb_elements as usize;
        for i in 0..element_count(&bounds) {
            let src = ((*psa).pv_data as *const u8).add(i * size);
            let dst = ((*copy).pv_data as *mut u8).add(i * size);
            copy_element(vt, dst, src, size);
        }
        copy
    }
}

/// Destroy an array and everything its elements own.
///
/// Null is a no-op; unknown or already destroyed pointers are refused.
///
/// # Safety
/// `psa` must not be used after a successful call.
pub unsafe fn safe_array_destroy(psa: *mut SAFEARRAY) -> HRESULT {
    if psa.is_null() {
        return S_OK;
    }
    let Some(total) = LIVE_ARRAYS.lock().get(&(psa as usize)).copied() else {
        log::error!("safe_array_destroy: {:p} is not a live SAFEARRAY", psa);
        return E_INVALIDARG;
    };

    unsafe {
        if (*psa).c_locks > 0 {
            return DISP_E_ARRAYISLOCKED;
        }
        LIVE_ARRAYS.lock().remove(&(psa as usize));

        let bounds = bounds_of(psa);
        let count = element_count(&bounds);
        let size = (*psa).cb_elements as usize;
        if let Some(vt) = safe_array_get_vartype(psa) {
            for i in 0..count {
                clear_element(vt, ((*psa).pv_data as *mut u8).add(i * size));
            }
        }
        if let Some(layout) = data_layout((*psa).cb_elements, count) {
            dealloc((*psa).pv_data as *mut u8, layout);
        }
        let base = (psa as *mut u8).sub(ARRAY_PREFIX);
        dealloc(base, Layout::from_size_align_unchecked(total, ARRAY_ALIGN));
    }
    S_OK
}

// =============================================================================
// VARIANT
// =============================================================================

/// Reset to `VT_EMPTY` without releasing anything.
pub fn variant_init(var: &mut VARIANT) {
    *var = VARIANT::new();
}

/// Release what a by-value variant owns and reset it to `VT_EMPTY`.
///
/// By-reference variants do not own their target; only the tag is reset.
pub fn variant_clear(var: &mut VARIANT) -> HRESULT {
    if !var.is_byref() {
        unsafe {
            if var.is_array() {
                let hr = safe_array_destroy(var.data.parray);
                if hr != S_OK {
                    return hr;
                }
            } else {
                match var.vt {
                    VT_BSTR => sys_free_string(var.data.bstr_val),
                    VT_DISPATCH | VT_UNKNOWN => {
                        let punk = var.data.punk_val;
                        if !punk.is_null() {
                            (*punk).release();
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    variant_init(var);
    S_OK
}

/// Deep copy `src` into `dst`, clearing `dst` first.
///
/// Strings and arrays are duplicated and interfaces AddRef'd; by-reference
/// variants are copied as pointers.
pub fn variant_copy(dst: &mut VARIANT, src: &VARIANT) -> HRESULT {
    let hr = variant_clear(dst);
    if hr != S_OK {
        return hr;
    }
    let mut copy = *src;
    if !src.is_byref() {
        unsafe {
            if src.is_array() {
                copy.data.parray = safe_array_copy(src.data.parray);
                if copy.data.parray.is_null() && !src.data.parray.is_null() {
                    return E_OUTOFMEMORY;
                }
            } else {
                match src.vt {
                    VT_BSTR => {
                        let source = src.data.bstr_val;
                        if !source.is_null() {
                            let len = sys_string_len(source) as usize;
                            copy.data.bstr_val =
                                sys_alloc_string_len(std::slice::from_raw_parts(source, len));
                        }
                    }
                    VT_DISPATCH | VT_UNKNOWN => {
                        let punk = src.data.punk_val;
                        if !punk.is_null() {
                            (*punk).add_ref();
                        }
                    }
                    _ => {}
                }
            }
        }
    }
    *dst = copy;
    S_OK
}
