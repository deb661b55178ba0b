//! OLE Automation data structures
//!
//! Bit-exact `#[repr(C)]` layouts of the structures exchanged with automation
//! servers: `VARIANT`, `SAFEARRAY`, `DISPPARAMS`, `EXCEPINFO` and the type
//! library descriptors (`TYPEATTR`, `FUNCDESC`, `VARDESC`, `TYPEDESC`,
//! `ELEMDESC`, `TLIBATTR`). Field names follow Rust conventions; order, size
//! and alignment follow the Windows SDK headers.

use std::ffi::c_void;
use std::fmt;

use crate::com::{GUID, HRESULT, IUnknown};
use crate::interfaces::IDispatch;

// =============================================================================
// VARTYPE
// =============================================================================

/// Variant type tag
pub type VARTYPE = u16;

pub const VT_EMPTY: VARTYPE = 0;
pub const VT_NULL: VARTYPE = 1;
pub const VT_I2: VARTYPE = 2;
pub const VT_I4: VARTYPE = 3;
pub const VT_R4: VARTYPE = 4;
pub const VT_R8: VARTYPE = 5;
pub const VT_CY: VARTYPE = 6;
pub const VT_DATE: VARTYPE = 7;
pub const VT_BSTR: VARTYPE = 8;
pub const VT_DISPATCH: VARTYPE = 9;
pub const VT_ERROR: VARTYPE = 10;
pub const VT_BOOL: VARTYPE = 11;
pub const VT_VARIANT: VARTYPE = 12;
pub const VT_UNKNOWN: VARTYPE = 13;
pub const VT_DECIMAL: VARTYPE = 14;
pub const VT_I1: VARTYPE = 16;
pub const VT_UI1: VARTYPE = 17;
pub const VT_UI2: VARTYPE = 18;
pub const VT_UI4: VARTYPE = 19;
pub const VT_I8: VARTYPE = 20;
pub const VT_UI8: VARTYPE = 21;
pub const VT_INT: VARTYPE = 22;
pub const VT_UINT: VARTYPE = 23;
pub const VT_VOID: VARTYPE = 24;
pub const VT_HRESULT: VARTYPE = 25;
pub const VT_PTR: VARTYPE = 26;
pub const VT_SAFEARRAY: VARTYPE = 27;
pub const VT_CARRAY: VARTYPE = 28;
pub const VT_USERDEFINED: VARTYPE = 29;
pub const VT_LPSTR: VARTYPE = 30;
pub const VT_LPWSTR: VARTYPE = 31;
pub const VT_RECORD: VARTYPE = 36;
pub const VT_INT_PTR: VARTYPE = 37;
pub const VT_UINT_PTR: VARTYPE = 38;
pub const VT_FILETIME: VARTYPE = 64;
pub const VT_BLOB: VARTYPE = 65;
pub const VT_STREAM: VARTYPE = 66;
pub const VT_STORAGE: VARTYPE = 67;
pub const VT_STREAMED_OBJECT: VARTYPE = 68;
pub const VT_STORED_OBJECT: VARTYPE = 69;
pub const VT_BLOB_OBJECT: VARTYPE = 70;
pub const VT_CF: VARTYPE = 71;
pub const VT_CLSID: VARTYPE = 72;
pub const VT_VECTOR: VARTYPE = 0x1000;
pub const VT_ARRAY: VARTYPE = 0x2000;
pub const VT_BYREF: VARTYPE = 0x4000;
pub const VT_TYPEMASK: VARTYPE = 0x0FFF;

/// `VARIANT_BOOL` true
pub const VARIANT_TRUE: i16 = -1;
/// `VARIANT_BOOL` false
pub const VARIANT_FALSE: i16 = 0;

/// Automation string: pointer to UTF-16 data preceded by a byte length
pub type BSTR = *mut u16;
/// OLE automation date: days since 1899-12-30
pub type DATE = f64;
/// Dispatch member ID
pub type DISPID = i32;
/// Type member ID
pub type MEMBERID = i32;
/// Handle to a referenced type description
pub type HREFTYPE = u32;
/// Locale ID
pub type LCID = u32;

pub const LOCALE_USER_DEFAULT: LCID = 0x0400;
pub const LOCALE_SYSTEM_DEFAULT: LCID = 0x0800;

// =============================================================================
// DISPIDs and invoke flags
// =============================================================================

pub const DISPID_UNKNOWN: DISPID = -1;
pub const DISPID_VALUE: DISPID = 0;
pub const DISPID_PROPERTYPUT: DISPID = -3;
pub const DISPID_NEWENUM: DISPID = -4;
pub const MEMBERID_NIL: MEMBERID = -1;

pub const DISPATCH_METHOD: u16 = 0x1;
pub const DISPATCH_PROPERTYGET: u16 = 0x2;
pub const DISPATCH_PROPERTYPUT: u16 = 0x4;
pub const DISPATCH_PROPERTYPUTREF: u16 = 0x8;

// =============================================================================
// Type library enumerations and flags
// =============================================================================

/// `TYPEKIND`
pub type TYPEKIND = i32;
pub const TKIND_ENUM: TYPEKIND = 0;
pub const TKIND_RECORD: TYPEKIND = 1;
pub const TKIND_MODULE: TYPEKIND = 2;
pub const TKIND_INTERFACE: TYPEKIND = 3;
pub const TKIND_DISPATCH: TYPEKIND = 4;
pub const TKIND_COCLASS: TYPEKIND = 5;
pub const TKIND_ALIAS: TYPEKIND = 6;
pub const TKIND_UNION: TYPEKIND = 7;

/// `INVOKEKIND`
pub type INVOKEKIND = i32;
pub const INVOKE_FUNC: INVOKEKIND = 1;
pub const INVOKE_PROPERTYGET: INVOKEKIND = 2;
pub const INVOKE_PROPERTYPUT: INVOKEKIND = 4;
pub const INVOKE_PROPERTYPUTREF: INVOKEKIND = 8;

/// `FUNCKIND`
pub type FUNCKIND = i32;
pub const FUNC_VIRTUAL: FUNCKIND = 0;
pub const FUNC_PUREVIRTUAL: FUNCKIND = 1;
pub const FUNC_NONVIRTUAL: FUNCKIND = 2;
pub const FUNC_STATIC: FUNCKIND = 3;
pub const FUNC_DISPATCH: FUNCKIND = 4;

/// `VARKIND`
pub type VARKIND = i32;
pub const VAR_PERINSTANCE: VARKIND = 0;
pub const VAR_STATIC: VARKIND = 1;
pub const VAR_CONST: VARKIND = 2;
pub const VAR_DISPATCH: VARKIND = 3;

/// `CALLCONV`
pub type CALLCONV = i32;
pub const CC_STDCALL: CALLCONV = 4;

/// `SYSKIND`
pub type SYSKIND = i32;
pub const SYS_WIN32: SYSKIND = 1;
pub const SYS_WIN64: SYSKIND = 3;

pub const TYPEFLAG_FAPPOBJECT: u16 = 0x1;
pub const TYPEFLAG_FCANCREATE: u16 = 0x2;
pub const TYPEFLAG_FHIDDEN: u16 = 0x10;
pub const TYPEFLAG_FCONTROL: u16 = 0x20;
pub const TYPEFLAG_FDUAL: u16 = 0x40;
pub const TYPEFLAG_FNONEXTENSIBLE: u16 = 0x80;
pub const TYPEFLAG_FOLEAUTOMATION: u16 = 0x100;
pub const TYPEFLAG_FDISPATCHABLE: u16 = 0x1000;

pub const IMPLTYPEFLAG_FDEFAULT: i32 = 0x1;
pub const IMPLTYPEFLAG_FSOURCE: i32 = 0x2;
pub const IMPLTYPEFLAG_FRESTRICTED: i32 = 0x4;
pub const IMPLTYPEFLAG_FDEFAULTVTABLE: i32 = 0x8;

pub const FUNCFLAG_FRESTRICTED: u16 = 0x1;
pub const FUNCFLAG_FSOURCE: u16 = 0x2;
pub const FUNCFLAG_FBINDABLE: u16 = 0x4;
pub const FUNCFLAG_FREQUESTEDIT: u16 = 0x8;
pub const FUNCFLAG_FDISPLAYBIND: u16 = 0x10;
pub const FUNCFLAG_FDEFAULTBIND: u16 = 0x20;
pub const FUNCFLAG_FHIDDEN: u16 = 0x40;
pub const FUNCFLAG_FUSESGETLASTERROR: u16 = 0x80;
pub const FUNCFLAG_FDEFAULTCOLLELEM: u16 = 0x100;
pub const FUNCFLAG_FUIDEFAULT: u16 = 0x200;
pub const FUNCFLAG_FNONBROWSABLE: u16 = 0x400;
pub const FUNCFLAG_FREPLACEABLE: u16 = 0x800;
pub const FUNCFLAG_FIMMEDIATEBIND: u16 = 0x1000;

pub const VARFLAG_FREADONLY: u16 = 0x1;
pub const VARFLAG_FSOURCE: u16 = 0x2;
pub const VARFLAG_FBINDABLE: u16 = 0x4;
pub const VARFLAG_FREQUESTEDIT: u16 = 0x8;
pub const VARFLAG_FDISPLAYBIND: u16 = 0x10;
pub const VARFLAG_FDEFAULTBIND: u16 = 0x20;
pub const VARFLAG_FHIDDEN: u16 = 0x40;
pub const VARFLAG_FRESTRICTED: u16 = 0x80;
pub const VARFLAG_FDEFAULTCOLLELEM: u16 = 0x100;
pub const VARFLAG_FUIDEFAULT: u16 = 0x200;
pub const VARFLAG_FNONBROWSABLE: u16 = 0x400;
pub const VARFLAG_FREPLACEABLE: u16 = 0x800;
pub const VARFLAG_FIMMEDIATEBIND: u16 = 0x1000;

pub const PARAMFLAG_NONE: u16 = 0x0;
pub const PARAMFLAG_FIN: u16 = 0x1;
pub const PARAMFLAG_FOUT: u16 = 0x2;
pub const PARAMFLAG_FLCID: u16 = 0x4;
pub const PARAMFLAG_FRETVAL: u16 = 0x8;
pub const PARAMFLAG_FOPT: u16 = 0x10;
pub const PARAMFLAG_FHASDEFAULT: u16 = 0x20;
pub const PARAMFLAG_FHASCUSTDATA: u16 = 0x40;

// =============================================================================
// CY
// =============================================================================

/// Currency: a 64-bit integer scaled by 10 000
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CY {
    pub int64: i64,
}

// =============================================================================
// VARIANT
// =============================================================================

/// Record payload (`VT_RECORD`); determines the union size on 64-bit targets
#[repr(C)]
#[derive(Clone, Copy)]
pub struct BRecord {
    pub pv_record: *mut c_void,
    pub rec_info: *mut c_void,
}

/// Payload union of [`VARIANT`]
#[repr(C)]
#[derive(Clone, Copy)]
pub union VariantData {
    pub ll_val: i64,
    pub l_val: i32,
    pub b_val: u8,
    pub i_val: i16,
    pub flt_val: f32,
    pub dbl_val: f64,
    pub bool_val: i16,
    pub scode: HRESULT,
    pub cy_val: CY,
    pub date: DATE,
    pub bstr_val: BSTR,
    pub punk_val: *mut IUnknown,
    pub pdisp_val: *mut IDispatch,
    pub parray: *mut SAFEARRAY,
    pub c_val: i8,
    pub ui_val: u16,
    pub ul_val: u32,
    pub ull_val: u64,
    pub int_val: i32,
    pub uint_val: u32,
    pub pb_val: *mut u8,
    pub pi_val: *mut i16,
    pub pl_val: *mut i32,
    pub pll_val: *mut i64,
    pub pflt_val: *mut f32,
    pub pdbl_val: *mut f64,
    pub pbool_val: *mut i16,
    pub pscode: *mut HRESULT,
    pub pcy_val: *mut CY,
    pub pdate: *mut DATE,
    pub pbstr_val: *mut BSTR,
    pub ppunk_val: *mut *mut IUnknown,
    pub ppdisp_val: *mut *mut IDispatch,
    pub pparray: *mut *mut SAFEARRAY,
    pub pvar_val: *mut VARIANT,
    pub byref: *mut c_void,
    pub pc_val: *mut i8,
    pub pui_val: *mut u16,
    pub pul_val: *mut u32,
    pub pull_val: *mut u64,
    pub pint_val: *mut i32,
    pub puint_val: *mut u32,
    pub record: BRecord,
}

/// Tagged automation value. 16 bytes on 32-bit targets, 24 on 64-bit.
#[repr(C)]
#[derive(Clone, Copy)]
pub struct VARIANT {
    pub vt: VARTYPE,
    pub w_reserved1: u16,
    pub w_reserved2: u16,
    pub w_reserved3: u16,
    pub data: VariantData,
}

impl VARIANT {
    /// A `VT_EMPTY` variant with a zeroed payload
    #[must_use]
    pub const fn new() -> Self {
        Self {
            vt: VT_EMPTY,
            w_reserved1: 0,
            w_reserved2: 0,
            w_reserved3: 0,
            data: VariantData {
                record: BRecord {
                    pv_record: std::ptr::null_mut(),
                    rec_info: std::ptr::null_mut(),
                },
            },
        }
    }

    /// Type tag without modifier bits
    #[inline]
    #[must_use]
    pub fn base_type(&self) -> VARTYPE {
        self.vt & VT_TYPEMASK
    }

    /// Whether the payload is a pointer to the value
    #[inline]
    #[must_use]
    pub fn is_byref(&self) -> bool {
        self.vt & VT_BYREF != 0
    }

    /// Whether the payload is a `SAFEARRAY`
    #[inline]
    #[must_use]
    pub fn is_array(&self) -> bool {
        self.vt & VT_ARRAY != 0
    }

    pub fn from_i32(value: i32) -> Self {
        let mut var = Self::new();
        var.vt = VT_I4;
        var.data.l_val = value;
        var
    }

    pub fn from_f64(value: f64) -> Self {
        let mut var = Self::new();
        var.vt = VT_R8;
        var.data.dbl_val = value;
        var
    }

    pub fn from_bool(value: bool) -> Self {
        let mut var = Self::new();
        var.vt = VT_BOOL;
        var.data.bool_val = if value { VARIANT_TRUE } else { VARIANT_FALSE };
        var
    }

    /// Takes ownership of `bstr`
    pub fn from_bstr(bstr: BSTR) -> Self {
        let mut var = Self::new();
        var.vt = VT_BSTR;
        var.data.bstr_val = bstr;
        var
    }

    /// `VT_ERROR` carrying `scode`
    pub fn error(scode: HRESULT) -> Self {
        let mut var = Self::new();
        var.vt = VT_ERROR;
        var.data.scode = scode;
        var
    }

    /// Value of a `VT_I4`/`VT_I2`/`VT_INT` variant
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        unsafe {
            match self.vt {
                VT_I4 | VT_INT => Some(self.data.l_val),
                VT_I2 => Some(i32::from(self.data.i_val)),
                VT_UI1 => Some(i32::from(self.data.b_val)),
                _ => None,
            }
        }
    }

    /// Value of a `VT_BOOL` variant
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        (self.vt == VT_BOOL).then(|| unsafe { self.data.bool_val } != VARIANT_FALSE)
    }

    /// Value of a `VT_R8`/`VT_R4` variant
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        unsafe {
            match self.vt {
                VT_R8 => Some(self.data.dbl_val),
                VT_R4 => Some(f64::from(self.data.flt_val)),
                _ => None,
            }
        }
    }

    /// Copy of a `VT_BSTR` variant's text
    #[must_use]
    pub fn as_string(&self) -> Option<String> {
        (self.vt == VT_BSTR).then(|| crate::oleauto::bstr_to_string(unsafe { self.data.bstr_val }))
    }

    /// `scode` of a `VT_ERROR` variant
    #[must_use]
    pub fn as_error(&self) -> Option<HRESULT> {
        (self.vt == VT_ERROR).then(|| unsafe { self.data.scode })
    }
}

impl Default for VARIANT {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for VARIANT {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "VARIANT(vt={:#06x}, bits={:#018x})", self.vt, unsafe {
            self.data.ull_val
        })
    }
}

// =============================================================================
// SAFEARRAY
// =============================================================================

/// One dimension of a [`SAFEARRAY`]
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct SAFEARRAYBOUND {
    pub c_elements: u32,
    pub l_lbound: i32,
}

impl SAFEARRAYBOUND {
    #[must_use]
    pub const fn new(c_elements: u32, l_lbound: i32) -> Self {
        Self {
            c_elements,
            l_lbound,
        }
    }
}

/// Self-describing array. `rgsabound` extends past its declared length for
/// multi-dimensional arrays and is stored rightmost dimension first.
#[repr(C)]
pub struct SAFEARRAY {
    pub c_dims: u16,
    pub f_features: u16,
    pub cb_elements: u32,
    pub c_locks: u32,
    pub pv_data: *mut c_void,
    pub rgsabound: [SAFEARRAYBOUND; 1],
}

pub const FADF_AUTO: u16 = 0x1;
pub const FADF_STATIC: u16 = 0x2;
pub const FADF_EMBEDDED: u16 = 0x4;
pub const FADF_FIXEDSIZE: u16 = 0x10;
pub const FADF_RECORD: u16 = 0x20;
pub const FADF_HAVEIID: u16 = 0x40;
pub const FADF_HAVEVARTYPE: u16 = 0x80;
pub const FADF_BSTR: u16 = 0x100;
pub const FADF_UNKNOWN: u16 = 0x200;
pub const FADF_DISPATCH: u16 = 0x400;
pub const FADF_VARIANT: u16 = 0x800;

// =============================================================================
// DISPPARAMS / EXCEPINFO
// =============================================================================

/// Arguments of `IDispatch::Invoke`; `rgvarg` is in reverse declaration order.
#[repr(C)]
#[derive(Debug)]
pub struct DISPPARAMS {
    pub rgvarg: *mut VARIANT,
    pub rgdispid_named_args: *mut DISPID,
    pub c_args: u32,
    pub c_named_args: u32,
}

impl Default for DISPPARAMS {
    fn default() -> Self {
        Self {
            rgvarg: std::ptr::null_mut(),
            rgdispid_named_args: std::ptr::null_mut(),
            c_args: 0,
            c_named_args: 0,
        }
    }
}

/// Structured server-side exception filled by `IDispatch::Invoke`
#[repr(C)]
pub struct EXCEPINFO {
    pub w_code: u16,
    pub w_reserved: u16,
    pub bstr_source: BSTR,
    pub bstr_description: BSTR,
    pub bstr_help_file: BSTR,
    pub dw_help_context: u32,
    pub pv_reserved: *mut c_void,
    pub pfn_deferred_fill_in: Option<unsafe extern "system" fn(*mut EXCEPINFO) -> HRESULT>,
    pub scode: HRESULT,
}

impl Default for EXCEPINFO {
    fn default() -> Self {
        Self {
            w_code: 0,
            w_reserved: 0,
            bstr_source: std::ptr::null_mut(),
            bstr_description: std::ptr::null_mut(),
            bstr_help_file: std::ptr::null_mut(),
            dw_help_context: 0,
            pv_reserved: std::ptr::null_mut(),
            pfn_deferred_fill_in: None,
            scode: 0,
        }
    }
}

// =============================================================================
// Type descriptions
// =============================================================================

/// Payload of [`TYPEDESC`], selected by its `vt`
#[repr(C)]
#[derive(Clone, Copy)]
pub union TypeDescData {
    /// `VT_PTR` / `VT_SAFEARRAY`: the element type
    pub lptdesc: *mut TYPEDESC,
    /// `VT_CARRAY`: array description
    pub lpadesc: *mut ARRAYDESC,
    /// `VT_USERDEFINED`: referenced type
    pub hreftype: HREFTYPE,
}

/// Recursive type description
#[repr(C)]
#[derive(Clone, Copy)]
pub struct TYPEDESC {
    pub u: TypeDescData,
    pub vt: VARTYPE,
}

impl TYPEDESC {
    /// Leaf description of a scalar type
    #[must_use]
    pub const fn scalar(vt: VARTYPE) -> Self {
        Self {
            u: TypeDescData {
                lptdesc: std::ptr::null_mut(),
            },
            vt,
        }
    }
}

impl fmt::Debug for TYPEDESC {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TYPEDESC(vt={})", self.vt)
    }
}

/// Fixed-size C array type description
#[repr(C)]
pub struct ARRAYDESC {
    pub tdesc_elem: TYPEDESC,
    pub c_dims: u16,
    pub rgbounds: [SAFEARRAYBOUND; 1],
}

/// Default value of an optional parameter
#[repr(C)]
pub struct PARAMDESCEX {
    pub cb_bytes: u32,
    pub var_default_value: VARIANT,
}

/// Parameter flags. Shares its layout with `IDLDESC` inside [`ELEMDESC`].
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct PARAMDESC {
    pub pparamdescex: *mut PARAMDESCEX,
    pub w_param_flags: u16,
}

/// Type and flags of a parameter, return value or variable
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct ELEMDESC {
    pub tdesc: TYPEDESC,
    pub paramdesc: PARAMDESC,
}

impl ELEMDESC {
    #[must_use]
    pub const fn new(tdesc: TYPEDESC, flags: u16) -> Self {
        Self {
            tdesc,
            paramdesc: PARAMDESC {
                pparamdescex: std::ptr::null_mut(),
                w_param_flags: flags,
            },
        }
    }
}

/// IDL attributes of a type
#[repr(C)]
#[derive(Clone, Copy, Debug, Default)]
pub struct IDLDESC {
    pub dw_reserved: usize,
    pub w_idl_flags: u16,
}

/// Attributes of a type description
#[repr(C)]
pub struct TYPEATTR {
    pub guid: GUID,
    pub lcid: LCID,
    pub dw_reserved: u32,
    pub memid_constructor: MEMBERID,
    pub memid_destructor: MEMBERID,
    pub lpstr_schema: *mut u16,
    pub cb_size_instance: u32,
    pub typekind: TYPEKIND,
    pub c_funcs: u16,
    pub c_vars: u16,
    pub c_impl_types: u16,
    pub cb_size_vft: u16,
    pub cb_alignment: u16,
    pub w_type_flags: u16,
    pub w_major_ver_num: u16,
    pub w_minor_ver_num: u16,
    pub tdesc_alias: TYPEDESC,
    pub idldesc_type: IDLDESC,
}

/// Description of one function of a type
#[repr(C)]
pub struct FUNCDESC {
    pub memid: MEMBERID,
    pub lprgscode: *mut HRESULT,
    pub lprgelemdesc_param: *mut ELEMDESC,
    pub funckind: FUNCKIND,
    pub invkind: INVOKEKIND,
    pub callconv: CALLCONV,
    pub c_params: i16,
    pub c_params_opt: i16,
    pub o_vft: i16,
    pub c_scodes: i16,
    pub elemdesc_func: ELEMDESC,
    pub w_func_flags: u16,
}

/// Payload of [`VARDESC`], selected by its `varkind`
#[repr(C)]
#[derive(Clone, Copy)]
pub union VarDescData {
    pub o_inst: u32,
    pub lpvar_value: *mut VARIANT,
}

/// Description of one variable of a type
#[repr(C)]
pub struct VARDESC {
    pub memid: MEMBERID,
    pub lpstr_schema: *mut u16,
    pub u: VarDescData,
    pub elemdesc_var: ELEMDESC,
    pub w_var_flags: u16,
    pub varkind: VARKIND,
}

/// Attributes of a type library
#[repr(C)]
#[derive(Clone, Copy, Debug)]
pub struct TLIBATTR {
    pub guid: GUID,
    pub lcid: LCID,
    pub syskind: SYSKIND,
    pub w_major_ver_num: u16,
    pub w_minor_ver_num: u16,
    pub w_lib_flags: u16,
}
