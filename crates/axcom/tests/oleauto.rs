//! Tests for the BSTR / SAFEARRAY / VARIANT runtime

use axcom::oleauto::*;
use axcom::{
    DISP_E_BADINDEX, S_OK, SAFEARRAYBOUND, VARIANT, VT_ARRAY, VT_BSTR, VT_I4, VT_R8, VT_VARIANT,
};
use std::ffi::c_void;

// =============================================================================
// Test: BSTR
// =============================================================================

#[test]
fn test_bstr_layout() {
    let bstr = sys_alloc_string("héllo");
    assert!(bstr_is_live(bstr));
    assert_eq!(sys_string_len(bstr), 5);

    // 4-byte byte-length prefix and trailing NUL
    let prefix = unsafe { *((bstr as *const u8).sub(4) as *const u32) };
    assert_eq!(prefix, 10);
    assert_eq!(unsafe { *bstr.add(5) }, 0);

    assert_eq!(bstr_to_string(bstr), "héllo");
    sys_free_string(bstr);
    assert!(!bstr_is_live(bstr));
}

#[test]
fn test_bstr_null_and_empty() {
    assert_eq!(bstr_to_string(std::ptr::null_mut()), "");
    assert_eq!(sys_string_len(std::ptr::null_mut()), 0);
    sys_free_string(std::ptr::null_mut());

    let empty = sys_alloc_string("");
    assert!(!empty.is_null());
    assert_eq!(sys_string_len(empty), 0);
    sys_free_string(empty);
}

#[test]
fn test_bstr_double_free_is_refused() {
    let bstr = sys_alloc_string("once");
    sys_free_string(bstr);
    // Logged and ignored
    sys_free_string(bstr);
    assert!(!bstr_is_live(bstr));
}

// =============================================================================
// Test: SAFEARRAY
// =============================================================================

#[test]
fn test_vector_put_get() {
    let psa = safe_array_create_vector(VT_I4, 0, 3);
    assert!(safe_array_is_live(psa));
    assert_eq!(safe_array_get_dim(psa), 1);
    assert_eq!(safe_array_get_vartype(psa), Some(VT_I4));
    assert_eq!(safe_array_get_lbound(psa, 1), Some(0));
    assert_eq!(safe_array_get_ubound(psa, 1), Some(2));

    unsafe {
        for i in 0..3 {
            let value = (i + 1) * 10;
            assert_eq!(safe_array_put_element(psa, &[i], &value as *const i32 as *const c_void), S_OK);
        }
        let mut out = 0i32;
        assert_eq!(safe_array_get_element(psa, &[2], &mut out as *mut i32 as *mut c_void), S_OK);
        assert_eq!(out, 30);
        assert_eq!(
            safe_array_get_element(psa, &[3], &mut out as *mut i32 as *mut c_void),
            DISP_E_BADINDEX
        );
        assert_eq!(safe_array_destroy(psa), S_OK);
    }
    assert!(!safe_array_is_live(psa));
}

#[test]
fn test_two_dimensional_bounds_and_order() {
    // 2 rows x 3 columns, leftmost index varies fastest in memory
    let bounds = [SAFEARRAYBOUND::new(2, 0), SAFEARRAYBOUND::new(3, 1)];
    let psa = safe_array_create(VT_R8, &bounds);
    assert_eq!(safe_array_get_dim(psa), 2);
    assert_eq!(safe_array_get_ubound(psa, 1), Some(1));
    assert_eq!(safe_array_get_lbound(psa, 2), Some(1));
    assert_eq!(safe_array_get_ubound(psa, 2), Some(3));

    unsafe {
        // Stored bounds are reversed
        assert_eq!((*psa).rgsabound[0].c_elements, 3);

        let value = 4.5f64;
        assert_eq!(safe_array_put_element(psa, &[1, 1], &value as *const f64 as *const c_void), S_OK);
        let data = (*psa).pv_data as *const f64;
        assert_eq!(*data.add(1), 4.5);
        safe_array_destroy(psa);
    }
}

#[test]
fn test_bstr_array_owns_elements() {
    let psa = safe_array_create_vector(VT_BSTR, 0, 2);
    let source = sys_alloc_string("copied");
    unsafe {
        safe_array_put_element(psa, &[0], &source as *const _ as *const c_void);
        let stored = *((*psa).pv_data as *const axcom::BSTR);
        assert_ne!(stored, source);
        assert!(bstr_is_live(stored));

        safe_array_destroy(psa);
        assert!(!bstr_is_live(stored));
    }
    assert!(bstr_is_live(source));
    sys_free_string(source);
}

#[test]
fn test_array_copy_is_deep() {
    let psa = safe_array_create_vector(VT_VARIANT, 0, 1);
    let mut element = VARIANT::from_bstr(sys_alloc_string("deep"));
    unsafe {
        safe_array_put_element(psa, &[0], &element as *const VARIANT as *const c_void);
        let copy = safe_array_copy(psa);
        assert!(safe_array_is_live(copy));

        let mut out = VARIANT::new();
        safe_array_get_element(copy, &[0], &mut out as *mut VARIANT as *mut c_void);
        assert_eq!(out.as_string().as_deref(), Some("deep"));
        variant_clear(&mut out);

        safe_array_destroy(psa);
        safe_array_destroy(copy);
    }
    variant_clear(&mut element);
}

#[test]
fn test_destroy_foreign_pointer_is_refused() {
    let psa = safe_array_create_vector(VT_I4, 0, 1);
    unsafe {
        assert_eq!(safe_array_destroy(psa), S_OK);
        assert_ne!(safe_array_destroy(psa), S_OK);
    }
}

// =============================================================================
// Test: VARIANT
// =============================================================================

#[test]
fn test_variant_size() {
    let expected = if cfg!(target_pointer_width = "64") { 24 } else { 16 };
    assert_eq!(std::mem::size_of::<VARIANT>(), expected);
}

#[test]
fn test_variant_clear_frees_string() {
    let bstr = sys_alloc_string("text");
    let mut var = VARIANT::from_bstr(bstr);
    assert_eq!(variant_clear(&mut var), S_OK);
    assert!(!bstr_is_live(bstr));
    assert_eq!(var.vt, 0);
}

#[test]
fn test_variant_clear_frees_array() {
    let psa = safe_array_create_vector(VT_I4, 0, 4);
    let mut var = VARIANT::new();
    var.vt = VT_ARRAY | VT_I4;
    var.data.parray = psa;
    variant_clear(&mut var);
    assert!(!safe_array_is_live(psa));
}

#[test]
fn test_variant_copy_duplicates_string() {
    let src = VARIANT::from_bstr(sys_alloc_string("original"));
    let mut dst = VARIANT::from_i32(5);
    assert_eq!(variant_copy(&mut dst, &src), S_OK);

    let (a, b) = unsafe { (src.data.bstr_val, dst.data.bstr_val) };
    assert_ne!(a, b);
    assert_eq!(dst.as_string().as_deref(), Some("original"));

    let mut src = src;
    variant_clear(&mut src);
    assert!(bstr_is_live(b));
    variant_clear(&mut dst);
    assert!(!bstr_is_live(b));
}
