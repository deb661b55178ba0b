//! Automation interfaces consumed and implemented by the bridge
//!
//! Slot order matches `oaidl.h` / `ocidl.h` exactly; each trait expands to an
//! `I*VTable` struct, an interface struct with `unsafe` call wrappers and an
//! `IID_*` constant.

use std::ffi::c_void;

use crate::com::{GUID, HRESULT, IUnknown};
use crate::proc::com_interface;
use crate::types::{
    BSTR, DISPID, DISPPARAMS, EXCEPINFO, FUNCDESC, HREFTYPE, LCID, MEMBERID, TLIBATTR, TYPEATTR,
    TYPEKIND, VARDESC, VARIANT,
};

// =============================================================================
// IDispatch
// =============================================================================

/// Late-bound member access by name and DISPID.
#[com_interface("00020400-0000-0000-C000-000000000046", internal)]
pub trait IDispatch {
    /// Number of type infos the object provides (0 or 1).
    fn get_type_info_count(&self, pctinfo: *mut u32) -> HRESULT;

    /// The object's type info.
    fn get_type_info(&self, itinfo: u32, lcid: LCID, pptinfo: *mut *mut ITypeInfo) -> HRESULT;

    /// Map member (and parameter) names to DISPIDs.
    fn get_ids_of_names(
        &self,
        riid: *const GUID,
        names: *const *const u16,
        cnames: u32,
        lcid: LCID,
        dispids: *mut DISPID,
    ) -> HRESULT;

    /// Call a member.
    fn invoke(
        &self,
        dispid: DISPID,
        riid: *const GUID,
        lcid: LCID,
        flags: u16,
        params: *mut DISPPARAMS,
        result: *mut VARIANT,
        excepinfo: *mut EXCEPINFO,
        argerr: *mut u32,
    ) -> HRESULT;
}

// =============================================================================
// ITypeInfo
// =============================================================================

/// Description of one type in a type library.
#[com_interface("00020401-0000-0000-C000-000000000046", internal)]
pub trait ITypeInfo {
    fn get_type_attr(&self, ppattr: *mut *mut TYPEATTR) -> HRESULT;
    fn get_type_comp(&self, pptcomp: *mut *mut c_void) -> HRESULT;
    fn get_func_desc(&self, index: u32, ppfuncdesc: *mut *mut FUNCDESC) -> HRESULT;
    fn get_var_desc(&self, index: u32, ppvardesc: *mut *mut VARDESC) -> HRESULT;
    /// Member name followed by parameter names.
    fn get_names(&self, memid: MEMBERID, names: *mut BSTR, max_names: u32, count: *mut u32) -> HRESULT;
    fn get_ref_type_of_impl_type(&self, index: u32, href: *mut HREFTYPE) -> HRESULT;
    fn get_impl_type_flags(&self, index: u32, flags: *mut i32) -> HRESULT;
    fn get_ids_of_names(&self, names: *const *const u16, cnames: u32, memids: *mut MEMBERID) -> HRESULT;
    fn invoke(
        &self,
        instance: *mut c_void,
        memid: MEMBERID,
        flags: u16,
        params: *mut DISPPARAMS,
        result: *mut VARIANT,
        excepinfo: *mut EXCEPINFO,
        argerr: *mut u32,
    ) -> HRESULT;
    /// Name and documentation of a member, or of the type itself for `MEMBERID_NIL`.
    fn get_documentation(
        &self,
        memid: MEMBERID,
        name: *mut BSTR,
        doc_string: *mut BSTR,
        help_context: *mut u32,
        help_file: *mut BSTR,
    ) -> HRESULT;
    fn get_dll_entry(
        &self,
        memid: MEMBERID,
        invkind: i32,
        dll_name: *mut BSTR,
        name: *mut BSTR,
        ordinal: *mut u16,
    ) -> HRESULT;
    fn get_ref_type_info(&self, href: HREFTYPE, pptinfo: *mut *mut ITypeInfo) -> HRESULT;
    fn address_of_member(&self, memid: MEMBERID, invkind: i32, ppv: *mut *mut c_void) -> HRESULT;
    fn create_instance(&self, outer: *mut IUnknown, riid: *const GUID, ppv: *mut *mut c_void) -> HRESULT;
    fn get_mops(&self, memid: MEMBERID, mops: *mut BSTR) -> HRESULT;
    fn get_containing_type_lib(&self, pptlib: *mut *mut ITypeLib, index: *mut u32) -> HRESULT;
    fn release_type_attr(&self, pattr: *mut TYPEATTR);
    fn release_func_desc(&self, pfuncdesc: *mut FUNCDESC);
    fn release_var_desc(&self, pvardesc: *mut VARDESC);
}

// =============================================================================
// ITypeLib
// =============================================================================

/// A type library: an indexed set of type infos.
#[com_interface("00020402-0000-0000-C000-000000000046", internal)]
pub trait ITypeLib {
    fn get_type_info_count(&self) -> u32;
    fn get_type_info(&self, index: u32, pptinfo: *mut *mut ITypeInfo) -> HRESULT;
    fn get_type_info_type(&self, index: u32, kind: *mut TYPEKIND) -> HRESULT;
    fn get_type_info_of_guid(&self, guid: *const GUID, pptinfo: *mut *mut ITypeInfo) -> HRESULT;
    fn get_lib_attr(&self, ppattr: *mut *mut TLIBATTR) -> HRESULT;
    fn get_type_comp(&self, pptcomp: *mut *mut c_void) -> HRESULT;
    /// Name and documentation of a type, or of the library itself for index -1.
    fn get_documentation(
        &self,
        index: i32,
        name: *mut BSTR,
        doc_string: *mut BSTR,
        help_context: *mut u32,
        help_file: *mut BSTR,
    ) -> HRESULT;
    fn is_name(&self, name: *mut u16, hash: u32, found: *mut i32) -> HRESULT;
    fn find_name(
        &self,
        name: *mut u16,
        hash: u32,
        pptinfo: *mut *mut ITypeInfo,
        memids: *mut MEMBERID,
        found: *mut u16,
    ) -> HRESULT;
    fn release_t_lib_attr(&self, pattr: *mut TLIBATTR);
}

// =============================================================================
// Connection points
// =============================================================================

/// Enumerates outgoing interfaces of a connectable object.
#[com_interface("B196B284-BAB4-101A-B69C-00AA00341D07", internal)]
pub trait IConnectionPointContainer {
    fn enum_connection_points(&self, ppenum: *mut *mut IEnumConnectionPoints) -> HRESULT;
    fn find_connection_point(&self, riid: *const GUID, ppcp: *mut *mut IConnectionPoint) -> HRESULT;
}

/// Iterator over connection points.
#[com_interface("B196B285-BAB4-101A-B69C-00AA00341D07", internal)]
pub trait IEnumConnectionPoints {
    fn next(&self, count: u32, ppcp: *mut *mut IConnectionPoint, fetched: *mut u32) -> HRESULT;
    fn skip(&self, count: u32) -> HRESULT;
    fn reset(&self) -> HRESULT;
    fn clone(&self, ppenum: *mut *mut IEnumConnectionPoints) -> HRESULT;
}

/// One outgoing interface of a connectable object.
#[com_interface("B196B286-BAB4-101A-B69C-00AA00341D07", internal)]
pub trait IConnectionPoint {
    fn get_connection_interface(&self, iid: *mut GUID) -> HRESULT;
    fn get_connection_point_container(&self, ppcpc: *mut *mut IConnectionPointContainer) -> HRESULT;
    /// Subscribe `sink`; the returned cookie identifies the connection.
    fn advise(&self, sink: *mut IUnknown, cookie: *mut u32) -> HRESULT;
    fn unadvise(&self, cookie: u32) -> HRESULT;
    fn enum_connections(&self, ppenum: *mut *mut c_void) -> HRESULT;
}

/// Change notifications for bindable properties.
#[com_interface("9BFBBC02-EFF1-101A-84ED-00AA00341D07", internal)]
pub trait IPropertyNotifySink {
    fn on_changed(&self, dispid: DISPID) -> HRESULT;
    /// `S_OK` allows the change, `S_FALSE` vetoes it.
    fn on_request_edit(&self, dispid: DISPID) -> HRESULT;
}

/// Access to the coclass type info of an object.
#[com_interface("B196B283-BAB4-101A-B69C-00AA00341D07", internal)]
pub trait IProvideClassInfo {
    fn get_class_info(&self, pptinfo: *mut *mut ITypeInfo) -> HRESULT;
}

// =============================================================================
// Stock dispinterfaces
// =============================================================================

/// IID of the stock font dispinterface (`IFontDisp`)
pub const IID_IFONTDISP: GUID = GUID::new(
    0xBEF6E003,
    0xA874,
    0x101A,
    [0x8B, 0xBA, 0x00, 0xAA, 0x00, 0x30, 0x0C, 0xAB],
);

/// IID of the stock picture dispinterface (`IPictureDisp`)
pub const IID_IPICTUREDISP: GUID = GUID::new(
    0x7BF80981,
    0xBF32,
    0x101A,
    [0x8B, 0xBB, 0x00, 0xAA, 0x00, 0x30, 0x0C, 0xAB],
);
