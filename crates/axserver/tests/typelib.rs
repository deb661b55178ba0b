//! Tests for the ITypeLib / ITypeInfo views of a library model

use std::ptr;

use axcom::oleauto::{bstr_to_string, sys_free_string};
use axcom::*;
use axserver::calculator::{self, *};
use axserver::model::{HREF_INVALID, LIBID_STDOLE};
use axserver::{TypeInfoObject, TypeLibBuilder, TypeLibObject, TypeSpec};

fn type_info(name: &str) -> ComPtr<ITypeInfo> {
    let lib = calculator::library();
    let index = lib.find(name).expect("type");
    TypeInfoObject::create(lib, index).expect("type info")
}

fn names_of(info: &ComPtr<ITypeInfo>, memid: MEMBERID) -> Result<Vec<String>, HRESULT> {
    let mut names = [ptr::null_mut(); 8];
    let mut count = 0;
    let hr = unsafe { info.get_names(memid, names.as_mut_ptr(), 8, &mut count) };
    if failed(hr) {
        return Err(hr);
    }
    Ok(names[..count as usize]
        .iter()
        .map(|&name| {
            let text = bstr_to_string(name);
            sys_free_string(name);
            text
        })
        .collect())
}

fn documentation(info: &ComPtr<ITypeInfo>, memid: MEMBERID) -> Option<(String, String)> {
    let (mut name, mut doc) = (ptr::null_mut(), ptr::null_mut());
    let hr = unsafe { info.get_documentation(memid, &mut name, &mut doc, ptr::null_mut(), ptr::null_mut()) };
    if failed(hr) {
        return None;
    }
    let result = (bstr_to_string(name), bstr_to_string(doc));
    sys_free_string(name);
    sys_free_string(doc);
    Some(result)
}

// =============================================================================
// Test: ITypeLib
// =============================================================================

#[test]
fn test_library_attributes_and_names() {
    let lib = TypeLibObject::create(calculator::library()).expect("type lib");
    assert_eq!(unsafe { lib.get_type_info_count() }, 8);

    let mut attr = ptr::null_mut();
    assert_eq!(unsafe { lib.get_lib_attr(&mut attr) }, S_OK);
    assert_eq!(unsafe { (*attr).guid }, LIBID_CALCLIB);
    assert_eq!(unsafe { ((*attr).w_major_ver_num, (*attr).w_minor_ver_num) }, (1, 0));
    unsafe { lib.release_t_lib_attr(attr) };

    let mut name = ptr::null_mut();
    assert_eq!(
        unsafe { lib.get_documentation(-1, &mut name, ptr::null_mut(), ptr::null_mut(), ptr::null_mut()) },
        S_OK
    );
    assert_eq!(bstr_to_string(name), "CalcLib");
    sys_free_string(name);

    let mut kind = 0;
    unsafe { lib.get_type_info_type(0, &mut kind) };
    assert_eq!(kind, TKIND_ENUM);

    let mut info = ptr::null_mut();
    assert_eq!(unsafe { lib.get_type_info_of_guid(&IID_ICALC, &mut info) }, S_OK);
    let info = unsafe { ComPtr::from_raw(info) }.expect("ICalc");
    assert_eq!(documentation(&info, MEMBERID_NIL).map(|d| d.0).as_deref(), Some("ICalc"));
}

#[test]
fn test_anonymous_type_has_no_name() {
    let lib = TypeLibObject::create(calculator::library()).expect("type lib");
    let mut name = ptr::null_mut();
    let hr = unsafe { lib.get_documentation(3, &mut name, ptr::null_mut(), ptr::null_mut(), ptr::null_mut()) };
    assert_eq!(hr, TYPE_E_ELEMENTNOTFOUND);
}

// =============================================================================
// Test: ITypeInfo descriptors
// =============================================================================

#[test]
fn test_dispinterface_attributes() {
    let info = type_info("ICalc");
    let mut attr = ptr::null_mut();
    assert_eq!(unsafe { info.get_type_attr(&mut attr) }, S_OK);
    let a = unsafe { &*attr };
    assert_eq!(a.typekind, TKIND_DISPATCH);
    assert_eq!(a.guid, IID_ICALC);
    assert_eq!(a.c_impl_types, 1);
    assert_ne!(a.w_type_flags & TYPEFLAG_FDISPATCHABLE, 0);
    // Name and Mode are get + put, Color too
    assert_eq!(a.c_funcs, 15);
    assert_eq!(a.c_vars, 1);
    unsafe { info.release_type_attr(attr) };

    assert_eq!(documentation(&info, MEMBERID_NIL), Some(("ICalc".into(), "Arithmetic with a name".into())));
}

#[test]
fn test_retval_and_optional_parameters() {
    let info = type_info("ICalc");
    // Funcs: Name get, Name put, Add, Scale
    let mut desc = ptr::null_mut();
    assert_eq!(unsafe { info.get_func_desc(3, &mut desc) }, S_OK);
    let d = unsafe { &*desc };
    assert_eq!(d.memid, DISPID_SCALE);
    assert_eq!(d.invkind, INVOKE_FUNC);
    assert_eq!(d.funckind, FUNC_DISPATCH);
    assert_eq!(d.c_params, 3);
    // The retval parameter follows the optional one, so no trailing optionals
    assert_eq!(d.c_params_opt, 0);
    assert_eq!(d.elemdesc_func.tdesc.vt, VT_HRESULT);

    let params = unsafe { std::slice::from_raw_parts(d.lprgelemdesc_param, 3) };
    assert_eq!(params[0].tdesc.vt, VT_R8);
    assert_ne!(params[1].paramdesc.w_param_flags & PARAMFLAG_FOPT, 0);
    assert_eq!(params[2].paramdesc.w_param_flags, PARAMFLAG_FOUT | PARAMFLAG_FRETVAL);
    assert_eq!(params[2].tdesc.vt, VT_PTR);
    assert_eq!(unsafe { (*params[2].tdesc.u.lptdesc).vt }, VT_R8);
    unsafe { info.release_func_desc(desc) };

    assert_eq!(names_of(&info, DISPID_SCALE).unwrap(), ["Scale", "value", "factor", "retval"]);
}

#[test]
fn test_property_put_value_is_unnamed() {
    let info = type_info("ICalc");
    assert_eq!(names_of(&info, DISPID_NAME).unwrap(), ["Name"]);

    let mut desc = ptr::null_mut();
    unsafe { info.get_func_desc(1, &mut desc) };
    let d = unsafe { &*desc };
    assert_eq!(d.invkind, INVOKE_PROPERTYPUT);
    assert_eq!(d.c_params, 1);
    unsafe { info.release_func_desc(desc) };
}

#[test]
fn test_user_type_resolves_into_stdole() {
    let info = type_info("ICalc");
    // Color get is the 7th function
    let mut desc = ptr::null_mut();
    unsafe { info.get_func_desc(6, &mut desc) };
    let d = unsafe { &*desc };
    assert_eq!(d.memid, DISPID_COLOR);
    assert_ne!(d.w_func_flags & FUNCFLAG_FBINDABLE, 0);
    assert_eq!(d.elemdesc_func.tdesc.vt, VT_USERDEFINED);
    let href = unsafe { d.elemdesc_func.tdesc.u.hreftype };
    unsafe { info.release_func_desc(desc) };

    let mut raw = ptr::null_mut();
    assert_eq!(unsafe { info.get_ref_type_info(href, &mut raw) }, S_OK);
    let color = unsafe { ComPtr::from_raw(raw) }.expect("OLE_COLOR");
    assert_eq!(documentation(&color, MEMBERID_NIL).map(|d| d.0).as_deref(), Some("OLE_COLOR"));

    let mut attr = ptr::null_mut();
    unsafe { color.get_type_attr(&mut attr) };
    assert_eq!(unsafe { (*attr).typekind }, TKIND_ALIAS);
    assert_eq!(unsafe { (*attr).tdesc_alias.vt }, VT_UI4);
    unsafe { color.release_type_attr(attr) };

    let mut lib = ptr::null_mut();
    let mut index = 0;
    unsafe { color.get_containing_type_lib(&mut lib, &mut index) };
    let lib = unsafe { ComPtr::from_raw(lib) }.expect("stdole");
    let mut attr = ptr::null_mut();
    unsafe { lib.get_lib_attr(&mut attr) };
    assert_eq!(unsafe { (*attr).guid }, LIBID_STDOLE);
    unsafe { lib.release_t_lib_attr(attr) };
}

#[test]
fn test_dangling_reference() {
    let lib = TypeLibBuilder::new("Broken", GUID::new(7, 7, 7, [7; 8]))
        .dispinterface("IBroken", GUID::new(8, 8, 8, [8; 8]), |i| {
            i.readonly_property(1, "Missing", TypeSpec::user("Nowhere"))
        })
        .build();
    let info = TypeInfoObject::create(lib, 0).expect("type info");
    let mut desc = ptr::null_mut();
    unsafe { info.get_func_desc(0, &mut desc) };
    let href = unsafe { (*desc).elemdesc_func.tdesc.u.hreftype };
    unsafe { info.release_func_desc(desc) };
    assert_eq!(href, HREF_INVALID);

    let mut raw = ptr::null_mut();
    assert_eq!(unsafe { info.get_ref_type_info(href, &mut raw) }, TYPE_E_ELEMENTNOTFOUND);
    assert!(raw.is_null());
}

#[test]
fn test_inheritance_chain() {
    let info = type_info("ICalc");
    let mut href = 0;
    assert_eq!(unsafe { info.get_ref_type_of_impl_type(0, &mut href) }, S_OK);
    let mut raw = ptr::null_mut();
    unsafe { info.get_ref_type_info(href, &mut raw) };
    let base = unsafe { ComPtr::from_raw(raw) }.expect("ICalcBase");
    assert_eq!(documentation(&base, MEMBERID_NIL).map(|d| d.0).as_deref(), Some("ICalcBase"));

    // ICalcBase derives from IDispatch in stdole
    unsafe { base.get_ref_type_of_impl_type(0, &mut href) };
    let mut raw = ptr::null_mut();
    unsafe { base.get_ref_type_info(href, &mut raw) };
    let dispatch = unsafe { ComPtr::from_raw(raw) }.expect("IDispatch");
    let mut attr = ptr::null_mut();
    unsafe { dispatch.get_type_attr(&mut attr) };
    assert_eq!(unsafe { (*attr).guid }, IID_IDISPATCH);
    unsafe { dispatch.release_type_attr(attr) };

    assert_eq!(
        unsafe { info.get_ref_type_of_impl_type(1, &mut href) },
        TYPE_E_ELEMENTNOTFOUND
    );
}

#[test]
fn test_enum_constants() {
    let info = type_info("Alignment");
    let mut desc = ptr::null_mut();
    assert_eq!(unsafe { info.get_var_desc(2, &mut desc) }, S_OK);
    let d = unsafe { &*desc };
    assert_eq!(d.varkind, VAR_CONST);
    assert_eq!(unsafe { (*d.u.lpvar_value).as_i32() }, Some(4));
    let memid = d.memid;
    unsafe { info.release_var_desc(desc) };
    assert_eq!(names_of(&info, memid).unwrap(), ["Center"]);

    let mut desc = ptr::null_mut();
    assert_eq!(unsafe { info.get_var_desc(3, &mut desc) }, TYPE_E_ELEMENTNOTFOUND);
}

#[test]
fn test_unnamed_enum_constant() {
    let lib = calculator::library();
    let index = lib
        .types
        .iter()
        .position(|t| t.name.is_none())
        .expect("anonymous enum");
    let info = TypeInfoObject::create(lib, index).expect("type info");
    assert_eq!(documentation(&info, MEMBERID_NIL), None);

    let mut desc = ptr::null_mut();
    unsafe { info.get_var_desc(1, &mut desc) };
    let memid = unsafe { (*desc).memid };
    unsafe { info.release_var_desc(desc) };
    assert_eq!(names_of(&info, memid), Err(TYPE_E_ELEMENTNOTFOUND));
}

#[test]
fn test_coclass_impl_types() {
    let info = type_info("Calculator");
    let mut attr = ptr::null_mut();
    unsafe { info.get_type_attr(&mut attr) };
    let a = unsafe { &*attr };
    assert_eq!(a.typekind, TKIND_COCLASS);
    assert_eq!((a.w_major_ver_num, a.w_minor_ver_num), (1, 2));
    assert_eq!(a.c_impl_types, 2);
    unsafe { info.release_type_attr(attr) };

    let mut flags = 0;
    unsafe { info.get_impl_type_flags(1, &mut flags) };
    assert_eq!(flags, IMPLTYPEFLAG_FSOURCE | IMPLTYPEFLAG_FDEFAULT);
}

#[test]
fn test_type_info_ids_of_names() {
    let info = type_info("ICalc");
    let name: Vec<u16> = "tag".encode_utf16().chain(std::iter::once(0)).collect();
    let names = [name.as_ptr()];
    let mut memid = 0;
    assert_eq!(unsafe { info.get_ids_of_names(names.as_ptr(), 1, &mut memid) }, S_OK);
    assert_eq!(memid, DISPID_TAG);
}
