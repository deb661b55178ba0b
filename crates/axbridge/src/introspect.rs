//! Type library reflection
//!
//! Reads enums, functions, variables and event interfaces from `ITypeLib` /
//! `ITypeInfo` into a [`MetaBuilder`]. Nothing here calls into the object
//! itself.
//!
//! Type libraries in the wild are frequently malformed, so every failed call
//! skips the one member it concerns and the walk continues.

use std::collections::HashSet;
use std::ops::Deref;
use std::ptr::null_mut;

use axcom::oleauto::{bstr_to_string, sys_free_string};
use axcom::*;

use crate::meta::{
    InvokeKind, MetaBuilder, MetaEnum, MetaMethod, MetaObject, MethodKind, PropertyFlags,
    is_reference, normalize_signature, setter_name, split_top_level,
};
use crate::services::{ClassRegistry, GenerationOptions};

// =============================================================================
// Descriptor guards
// =============================================================================

/// `TYPEATTR` released on drop
pub(crate) struct TypeAttr<'a> {
    info: &'a ITypeInfo,
    ptr: *mut TYPEATTR,
}

impl<'a> TypeAttr<'a> {
    pub(crate) fn get(info: &'a ITypeInfo) -> Option<Self> {
        let mut ptr = null_mut();
        let hr = unsafe { info.get_type_attr(&mut ptr) };
        if failed(hr) || ptr.is_null() {
            log::debug!("GetTypeAttr failed: {hr:#010x}");
            return None;
        }
        Some(Self { info, ptr })
    }
}

impl Deref for TypeAttr<'_> {
    type Target = TYPEATTR;

    fn deref(&self) -> &TYPEATTR {
        unsafe { &*self.ptr }
    }
}

impl Drop for TypeAttr<'_> {
    fn drop(&mut self) {
        unsafe { self.info.release_type_attr(self.ptr) };
    }
}

/// `FUNCDESC` released on drop
struct FuncDesc<'a> {
    info: &'a ITypeInfo,
    ptr: *mut FUNCDESC,
}

impl<'a> FuncDesc<'a> {
    fn get(info: &'a ITypeInfo, index: u32) -> Option<Self> {
        let mut ptr = null_mut();
        let hr = unsafe { info.get_func_desc(index, &mut ptr) };
        if failed(hr) || ptr.is_null() {
            log::debug!("GetFuncDesc({index}) failed: {hr:#010x}");
            return None;
        }
        Some(Self { info, ptr })
    }

    /// Parameter `index`; callers stay below `c_params`.
    fn param(&self, index: usize) -> Option<&ELEMDESC> {
        if index >= self.param_count() || self.lprgelemdesc_param.is_null() {
            return None;
        }
        Some(unsafe { &*self.lprgelemdesc_param.add(index) })
    }

    fn param_count(&self) -> usize {
        usize::try_from(self.c_params).unwrap_or(0)
    }
}

impl Deref for FuncDesc<'_> {
    type Target = FUNCDESC;

    fn deref(&self) -> &FUNCDESC {
        unsafe { &*self.ptr }
    }
}

impl Drop for FuncDesc<'_> {
    fn drop(&mut self) {
        unsafe { self.info.release_func_desc(self.ptr) };
    }
}

/// `VARDESC` released on drop
struct VarDesc<'a> {
    info: &'a ITypeInfo,
    ptr: *mut VARDESC,
}

impl<'a> VarDesc<'a> {
    fn get(info: &'a ITypeInfo, index: u32) -> Option<Self> {
        let mut ptr = null_mut();
        let hr = unsafe { info.get_var_desc(index, &mut ptr) };
        if failed(hr) || ptr.is_null() {
            log::debug!("GetVarDesc({index}) failed: {hr:#010x}");
            return None;
        }
        Some(Self { info, ptr })
    }
}

impl Deref for VarDesc<'_> {
    type Target = VARDESC;

    fn deref(&self) -> &VARDESC {
        unsafe { &*self.ptr }
    }
}

impl Drop for VarDesc<'_> {
    fn drop(&mut self) {
        unsafe { self.info.release_var_desc(self.ptr) };
    }
}

// =============================================================================
// Lookups
// =============================================================================

/// Take ownership of a returned BSTR.
fn take_bstr(bstr: BSTR) -> String {
    let text = bstr_to_string(bstr);
    sys_free_string(bstr);
    text
}

/// Member name followed by its parameter names.
pub(crate) fn member_names(info: &ITypeInfo, memid: MEMBERID, max: u32) -> Option<Vec<String>> {
    let mut raw: Vec<BSTR> = vec![null_mut(); max as usize];
    let mut count = 0u32;
    let hr = unsafe { info.get_names(memid, raw.as_mut_ptr(), max, &mut count) };
    let names: Vec<String> = raw
        .into_iter()
        .take(count as usize)
        .map(take_bstr)
        .collect();
    if failed(hr) {
        log::debug!("GetNames({memid}) failed: {hr:#010x}");
        return None;
    }
    Some(names)
}

/// Name of the type described by `info`
pub(crate) fn type_name(info: &ITypeInfo) -> Option<String> {
    let mut name: BSTR = null_mut();
    let hr = unsafe {
        info.get_documentation(MEMBERID_NIL, &mut name, null_mut(), null_mut(), null_mut())
    };
    succeeded(hr).then(|| take_bstr(name))
}

/// Name of type `index` in `lib`, or of the library itself for -1
pub(crate) fn library_documentation(lib: &ITypeLib, index: i32) -> Option<String> {
    let mut name: BSTR = null_mut();
    let hr = unsafe { lib.get_documentation(index, &mut name, null_mut(), null_mut(), null_mut()) };
    succeeded(hr).then(|| take_bstr(name))
}

pub(crate) fn library_guid(lib: &ITypeLib) -> Option<GUID> {
    let mut attr = null_mut();
    let hr = unsafe { lib.get_lib_attr(&mut attr) };
    if failed(hr) || attr.is_null() {
        return None;
    }
    let guid = unsafe { (*attr).guid };
    unsafe { lib.release_t_lib_attr(attr) };
    Some(guid)
}

pub(crate) fn containing_library(info: &ITypeInfo) -> Option<(ComPtr<ITypeLib>, u32)> {
    let mut lib = null_mut();
    let mut index = 0u32;
    let hr = unsafe { info.get_containing_type_lib(&mut lib, &mut index) };
    if failed(hr) {
        log::debug!("GetContainingTypeLib failed: {hr:#010x}");
        return None;
    }
    let lib = unsafe { ComPtr::from_raw(lib) }?;
    Some((lib, index))
}

pub(crate) fn referenced_type(info: &ITypeInfo, href: HREFTYPE) -> Option<ComPtr<ITypeInfo>> {
    let mut referenced = null_mut();
    let hr = unsafe { info.get_ref_type_info(href, &mut referenced) };
    if failed(hr) {
        log::debug!("GetRefTypeInfo({href}) failed: {hr:#010x}");
        return None;
    }
    unsafe { ComPtr::from_raw(referenced) }
}

/// Implemented interface `index` with its `IMPLTYPEFLAG_*`
pub(crate) fn implemented_type(info: &ITypeInfo, index: u32) -> Option<(ComPtr<ITypeInfo>, i32)> {
    let mut flags = 0;
    if failed(unsafe { info.get_impl_type_flags(index, &mut flags) }) {
        return None;
    }
    let mut href = 0;
    let hr = unsafe { info.get_ref_type_of_impl_type(index, &mut href) };
    if failed(hr) {
        log::debug!("GetRefTypeOfImplType({index}) failed: {hr:#010x}");
        return None;
    }
    Some((referenced_type(info, href)?, flags))
}

pub(crate) fn type_guid(info: &ITypeInfo) -> Option<GUID> {
    TypeAttr::get(info).map(|attr| attr.guid)
}

pub(crate) fn type_info_of_guid(lib: &ITypeLib, guid: &GUID) -> Option<ComPtr<ITypeInfo>> {
    let mut info = null_mut();
    if failed(unsafe { lib.get_type_info_of_guid(guid, &mut info) }) {
        return None;
    }
    unsafe { ComPtr::from_raw(info) }
}

// =============================================================================
// Enums
// =============================================================================

/// Every enum of `lib`, in library order.
///
/// Key names are unique across the whole library: a repeated name gets the
/// next value of a library-wide counter appended (`Left`, then `Left1`).
/// Constants without a name become `value<N>`, enums without a name
/// `enum<N>`.
pub fn read_enums(lib: &ITypeLib) -> Vec<MetaEnum> {
    let mut enums = Vec::new();
    let mut used_keys = HashSet::new();
    let mut clash_index = 0;
    let mut value_index = 0;
    let mut enum_serial = 0;

    let count = unsafe { lib.get_type_info_count() };
    for index in 0..count {
        let mut kind = 0;
        if failed(unsafe { lib.get_type_info_type(index, &mut kind) }) || kind != TKIND_ENUM {
            continue;
        }
        let mut raw = null_mut();
        if failed(unsafe { lib.get_type_info(index, &mut raw) }) {
            log::debug!("enum {index} has no type info");
            continue;
        }
        let Some(info) = (unsafe { ComPtr::from_raw(raw) }) else {
            continue;
        };
        let name = library_documentation(lib, index as i32).unwrap_or_else(|| {
            enum_serial += 1;
            format!("enum{enum_serial}")
        });
        let Some(attr) = TypeAttr::get(&info) else {
            continue;
        };

        let mut keys = Vec::new();
        for var in 0..u32::from(attr.c_vars) {
            let Some(desc) = VarDesc::get(&info, var) else {
                continue;
            };
            if desc.varkind != VAR_CONST {
                continue;
            }
            let value = unsafe { desc.u.lpvar_value.as_ref() }
                .and_then(VARIANT::as_i32)
                .unwrap_or_default();
            let mut key = member_names(&info, desc.memid, 1)
                .and_then(|names| names.into_iter().next())
                .unwrap_or_else(|| {
                    let synthesized = format!("value{value_index}");
                    value_index += 1;
                    synthesized
                });
            while used_keys.contains(&key) {
                clash_index += 1;
                key = format!("{key}{clash_index}");
            }
            used_keys.insert(key.clone());
            keys.push((key, value));
        }
        enums.push(MetaEnum { name, keys });
    }
    enums
}

// =============================================================================
// Members
// =============================================================================

/// A function description rendered in host types
#[derive(Debug, Clone, PartialEq)]
struct Prototype {
    name: String,
    /// `Name(type,type)` with declared (not normalized) types
    signature: String,
    return_type: String,
    /// Parameter names; optional ones end in `=0`
    params: Vec<String>,
}

impl Prototype {
    fn parameter_types(&self) -> Vec<String> {
        parameter_types(&self.signature)
    }

    fn parameter_names(&self) -> Vec<String> {
        self.params
            .iter()
            .map(|name| name.trim_end_matches("=0").to_string())
            .collect()
    }
}

fn parameter_types(signature: &str) -> Vec<String> {
    let inner = signature
        .split_once('(')
        .and_then(|(_, rest)| rest.rsplit_once(')'))
        .map_or("", |(inner, _)| inner);
    if inner.trim().is_empty() {
        return Vec::new();
    }
    split_top_level(inner)
        .into_iter()
        .map(|ty| ty.trim().to_string())
        .collect()
}

/// IUnknown and IDispatch methods as they appear in dual interfaces,
/// recognized by name and name count.
fn is_boilerplate(name: &str, names: usize) -> bool {
    matches!(
        (name, names),
        ("QueryInterface", 3)
            | ("AddRef", 1)
            | ("Release", 1)
            | ("Invoke", 9)
            | ("GetIDsOfNames", 6)
            | ("GetTypeInfoCount", 2)
            | ("GetTypeInfo", 4)
    )
}

/// An outgoing (event) interface
#[derive(Debug, Clone, PartialEq)]
pub struct EventInterface {
    pub iid: GUID,
    /// Event DISPID and the signal it is emitted as
    pub events: Vec<(DISPID, MetaMethod)>,
}

/// Walks type infos into a [`MetaBuilder`].
///
/// Enums must be added before functions are read: parameter types that name
/// a known enum are kept as the enum name.
pub struct Introspector<'a> {
    options: GenerationOptions,
    registry: &'a dyn ClassRegistry,
    /// Name of the library being read; types from other libraries are
    /// qualified with their library name
    library: String,
    builder: MetaBuilder,
    interface_serial: u32,
}

impl<'a> Introspector<'a> {
    pub fn new(options: GenerationOptions, registry: &'a dyn ClassRegistry) -> Self {
        Self {
            options,
            registry,
            library: String::new(),
            builder: MetaBuilder::new("AxObject"),
            interface_serial: 0,
        }
    }

    pub fn set_library(&mut self, name: &str) {
        self.library = name.to_string();
    }

    pub fn add_enums(&mut self, enums: &[MetaEnum]) {
        for meta_enum in enums {
            self.builder.add_enum(meta_enum.clone());
        }
    }

    #[must_use]
    pub fn builder(&self) -> &MetaBuilder {
        &self.builder
    }

    pub fn builder_mut(&mut self) -> &mut MetaBuilder {
        &mut self.builder
    }

    #[must_use]
    pub fn into_builder(self) -> MetaBuilder {
        self.builder
    }

    #[must_use]
    pub fn finish(self) -> MetaObject {
        self.builder.build()
    }

    /// `{GUID}` of an interface or class, or its registered name with
    /// [`GenerationOptions::UUID_NAMES`]. `kind` is `Interface` or `CLSID`.
    pub(crate) fn uuid_name(&self, kind: &str, guid: &GUID) -> String {
        let braced = guid.to_braced_string();
        if !self.options.contains(GenerationOptions::UUID_NAMES) {
            return braced;
        }
        self.registry
            .lookup(&format!("{kind}/{braced}/Default"))
            .filter(|name| !name.is_empty())
            .unwrap_or(braced)
    }

    fn has_enum(&self, type_name: &str) -> bool {
        self.builder.has_enum(type_name)
    }

    // -------------------------------------------------------------------------
    // Type names
    // -------------------------------------------------------------------------

    /// Host type name of a type description; empty when there is none.
    pub fn guess_type(&self, tdesc: &TYPEDESC, info: &ITypeInfo) -> String {
        let mut name = match tdesc.vt & VT_TYPEMASK {
            VT_EMPTY | VT_VOID => String::new(),
            VT_BOOL => "bool".to_string(),
            VT_I1 => "char".to_string(),
            VT_UI1 => "uchar".to_string(),
            VT_I2 => "short".to_string(),
            VT_UI2 => "ushort".to_string(),
            VT_I4 | VT_INT => "int".to_string(),
            VT_UI4 | VT_UINT => "uint".to_string(),
            VT_I8 | VT_CY => "int64".to_string(),
            VT_UI8 => "uint64".to_string(),
            VT_R4 => "float".to_string(),
            VT_R8 => "double".to_string(),
            VT_BSTR => "string".to_string(),
            VT_DATE => "datetime".to_string(),
            VT_VARIANT => "variant".to_string(),
            VT_DISPATCH => "IDispatch*".to_string(),
            VT_UNKNOWN => "IUnknown*".to_string(),
            VT_HRESULT => "HRESULT".to_string(),
            VT_PTR => self.pointer_type(tdesc, info),
            VT_SAFEARRAY => self.safe_array_type(tdesc, info),
            VT_CARRAY => self.c_array_type(tdesc, info),
            VT_USERDEFINED => self.user_type(tdesc, info),
            other => {
                log::debug!("no host type for VARTYPE {other}");
                String::new()
            }
        };
        if tdesc.vt & VT_BYREF != 0 {
            name.push('&');
        }
        name.replace("&*", "**")
    }

    fn pointer_type(&self, tdesc: &TYPEDESC, info: &ITypeInfo) -> String {
        let Some(pointee) = (unsafe { tdesc.u.lptdesc.as_ref() }) else {
            return String::new();
        };
        let name = self.guess_type(pointee, info);
        match pointee.vt {
            VT_VOID => "void*".to_string(),
            VT_VARIANT | VT_BSTR | VT_I1 | VT_I2 | VT_I4 | VT_I8 | VT_UI1 | VT_UI2 | VT_UI4
            | VT_UI8 | VT_BOOL | VT_R4 | VT_R8 | VT_INT | VT_UINT | VT_CY => name + "&",
            VT_PTR if name == "font" || name == "pixmap" => name + "*",
            VT_PTR if name == "void*" => "void **".to_string(),
            _ => self.reference_marker(name),
        }
    }

    /// Out-parameter marker for a pointer to a non-primitive type
    fn reference_marker(&self, name: String) -> String {
        let by_value = matches!(
            name.as_str(),
            "color" | "datetime" | "list" | "bytes" | "stringlist"
        );
        if by_value || (!name.is_empty() && self.has_enum(&name)) {
            name + "&"
        } else if !name.is_empty() && !matches!(name.as_str(), "font" | "pixmap" | "variant") {
            name + "*"
        } else {
            name
        }
    }

    fn safe_array_type(&self, tdesc: &TYPEDESC, info: &ITypeInfo) -> String {
        let Some(element) = (unsafe { tdesc.u.lptdesc.as_ref() }) else {
            return String::new();
        };
        match element.vt {
            VT_EMPTY | VT_VOID => String::new(),
            VT_UI1 => "bytes".to_string(),
            VT_BSTR => "stringlist".to_string(),
            VT_VARIANT => "list".to_string(),
            _ => {
                let name = self.guess_type(element, info);
                if name.is_empty() {
                    name
                } else {
                    format!("List<{name}>")
                }
            }
        }
    }

    fn c_array_type(&self, tdesc: &TYPEDESC, info: &ITypeInfo) -> String {
        let Some(array) = (unsafe { tdesc.u.lpadesc.as_ref() }) else {
            return String::new();
        };
        let mut name = self.guess_type(&array.tdesc_elem, info);
        if !name.is_empty() {
            let bounds = unsafe {
                std::slice::from_raw_parts(array.rgbounds.as_ptr(), usize::from(array.c_dims))
            };
            for bound in bounds {
                name.push_str(&format!("[{}]", bound.c_elements));
            }
        }
        name
    }

    fn user_type(&self, tdesc: &TYPEDESC, info: &ITypeInfo) -> String {
        let href = unsafe { tdesc.u.hreftype };
        let Some(user) = referenced_type(info, href) else {
            return String::new();
        };
        let Some((lib, index)) = containing_library(&user) else {
            return String::new();
        };
        let lib_name = library_documentation(&lib, -1).unwrap_or_default();
        let name = library_documentation(&lib, index as i32).unwrap_or_default();

        if self.has_enum(&name) {
            return name;
        }
        match name.as_str() {
            "OLE_COLOR" | "VB_OLE_COLOR" => return "color".to_string(),
            "IFontDisp" | "IFont" => return "font".to_string(),
            "Picture" => return "pixmap".to_string(),
            _ => {}
        }

        let Some(attr) = TypeAttr::get(&user) else {
            return name;
        };
        let qualified = || {
            if lib_name != self.library {
                format!("{lib_name}::{name}")
            } else {
                name.clone()
            }
        };
        match attr.typekind {
            TKIND_ALIAS => self.guess_type(&attr.tdesc_alias, &user),
            TKIND_DISPATCH | TKIND_COCLASS => {
                if self.options.contains(GenerationOptions::QUALIFIED_USER_TYPES) {
                    qualified()
                } else {
                    "IDispatch".to_string()
                }
            }
            TKIND_ENUM | TKIND_INTERFACE => qualified(),
            _ => name.clone(),
        }
    }

    // -------------------------------------------------------------------------
    // Functions
    // -------------------------------------------------------------------------

    fn create_prototype(&self, desc: &FuncDesc<'_>, info: &ITypeInfo, names: &[String]) -> Prototype {
        let function = names.first().cloned().unwrap_or_default();
        let mut return_type = self.guess_type(&desc.elemdesc_func.tdesc, info);
        if desc.invkind == INVOKE_PROPERTYPUT && (return_type.is_empty() || return_type == "HRESULT") {
            if let Some(value) = desc.param(0) {
                return_type = self.guess_type(&value.tdesc, info);
            }
        }
        if desc.invkind == INVOKE_FUNC && return_type == "HRESULT" {
            return_type.clear();
        }

        let param_count = desc.param_count();
        let required = i32::from(desc.c_params) - i32::from(desc.c_params_opt);
        let mut signature = format!("{function}(");
        let mut params = Vec::new();
        let end = names.len().min(param_count + 1);
        let mut p = 1;
        while p < end {
            let Some(elem) = desc.param(p - 1) else {
                break;
            };
            let flags = elem.paramdesc.w_param_flags;
            let mut ptype = self.guess_type(&elem.tdesc, info);
            let retval = flags & PARAMFLAG_FRETVAL != 0;
            if retval {
                if is_reference(&ptype) {
                    ptype.pop();
                }
                return_type = ptype;
            } else {
                signature.push_str(&ptype);
                if flags & PARAMFLAG_FOUT != 0 && !is_reference(&ptype) {
                    signature.push('&');
                }
                let optional = p as i32 > required
                    || flags & (PARAMFLAG_FOPT | PARAMFLAG_FHASDEFAULT) != 0;
                let mut name = names[p].clone();
                if optional {
                    name.push_str("=0");
                }
                params.push(name);
            }
            if p < param_count && !retval {
                signature.push(',');
            }
            p += 1;
        }

        if signature.ends_with(',') {
            let value = if desc.invkind == INVOKE_PROPERTYPUT && p == param_count {
                desc.param(p - 1)
            } else {
                None
            };
            match value {
                Some(value) => {
                    signature.push_str(&self.guess_type(&value.tdesc, info));
                    signature.push(')');
                    params.push("rhs".to_string());
                }
                None => {
                    signature.pop();
                    signature.push(')');
                }
            }
        } else {
            signature.push(')');
        }

        Prototype {
            name: function,
            signature,
            return_type,
            params,
        }
    }

    /// Read every function of `info` into properties, setters and slots.
    ///
    /// A property get/put with at most one required parameter becomes a
    /// property; a put also gets a `setName(type)` slot. Puts with more
    /// parameters turn into `setName(...)` methods. Trailing optional
    /// parameters produce cloned overloads without them.
    pub fn read_functions(&mut self, info: &ITypeInfo) {
        let Some(count) = TypeAttr::get(info).map(|attr| attr.c_funcs) else {
            return;
        };
        for index in 0..u32::from(count) {
            let Some(desc) = FuncDesc::get(info, index) else {
                continue;
            };
            let max = u32::try_from(desc.c_params).map_or(255, |n| n + 1);
            let Some(names) = member_names(info, desc.memid, max) else {
                continue;
            };
            let Some(name) = names.first() else {
                continue;
            };
            if is_boilerplate(name, names.len()) {
                continue;
            }
            let prototype = self.create_prototype(&desc, info, &names);
            self.add_function(&desc, prototype);
        }
    }

    fn add_function(&mut self, desc: &FuncDesc<'_>, mut prototype: Prototype) {
        let invkind = desc.invkind;
        let put = invkind == INVOKE_PROPERTYPUT || invkind == INVOKE_PROPERTYPUTREF;
        let get = invkind == INVOKE_PROPERTYGET;
        let required = i32::from(desc.c_params) - i32::from(desc.c_params_opt);
        let name = prototype.name.clone();

        if (get || put) && required <= 1 {
            let mut as_method = false;
            if get && !prototype.params.is_empty() && required > 0 {
                as_method = true;
            } else {
                let func_flags = desc.w_func_flags;
                let mut flags = PropertyFlags::READABLE;
                if put {
                    flags |= PropertyFlags::WRITABLE | PropertyFlags::STORED;
                }
                if func_flags & (FUNCFLAG_FNONBROWSABLE | FUNCFLAG_FHIDDEN) == 0 {
                    flags |= PropertyFlags::DESIGNABLE;
                }
                if func_flags & FUNCFLAG_FRESTRICTED == 0 {
                    flags |= PropertyFlags::SCRIPTABLE;
                }
                if func_flags & FUNCFLAG_FREQUESTEDIT != 0 {
                    flags |= PropertyFlags::REQUESTING_EDIT;
                }
                if self.has_enum(&prototype.return_type) {
                    flags |= PropertyFlags::ENUM_OR_FLAG;
                }
                if get && func_flags & FUNCFLAG_FBINDABLE != 0 {
                    self.builder
                        .add_changed_signal(&name, &prototype.return_type, desc.memid);
                    flags |= PropertyFlags::BINDABLE;
                }
                if !prototype.return_type.is_empty() {
                    self.builder
                        .add_property(&prototype.return_type, &name, flags);
                }
                if get && desc.c_params > 0 {
                    as_method = true;
                }
            }

            if desc.c_params == 0 {
                if put && !prototype.return_type.is_empty() && self.builder.has_property(&name) {
                    self.builder.add_setter_slot(&name);
                }
                return;
            }
            if put && self.builder.has_property(&name) {
                self.builder.add_setter_slot(&name);
                if desc.c_params > 1 {
                    as_method = true;
                }
            }
            if !as_method {
                return;
            }
        }

        let invoke = match invkind {
            INVOKE_PROPERTYGET => InvokeKind::PropertyGet,
            INVOKE_PROPERTYPUT => InvokeKind::PropertyPut,
            INVOKE_PROPERTYPUTREF => InvokeKind::PropertyPutRef,
            _ => InvokeKind::Method,
        };
        if put {
            if required > 1 {
                prototype.return_type.clear();
            }
            prototype.signature = setter_name(&prototype.signature);
        }
        self.add_overloads(prototype, invoke);
    }

    /// The slot, then one clone per trailing optional parameter dropped.
    fn add_overloads(&mut self, prototype: Prototype, invoke: InvokeKind) {
        let mut signature = prototype.signature.clone();
        let mut types = prototype.parameter_types();
        let mut params = prototype.params.clone();
        let mut cloned = false;
        loop {
            let has_defaults = params.iter().any(|p| p.contains("=0"));
            self.builder.add_slot(MetaMethod {
                signature: signature.clone(),
                return_type: prototype.return_type.clone(),
                parameter_types: types.clone(),
                parameter_names: params
                    .iter()
                    .map(|p| p.trim_end_matches("=0").to_string())
                    .collect(),
                kind: MethodKind::Slot,
                invoke,
                cloned,
            });
            cloned |= has_defaults;
            if !has_defaults {
                break;
            }
            params.pop();
            types.pop();
            let cut = signature
                .rfind(',')
                .or_else(|| signature.find('(').map(|open| open + 1))
                .unwrap_or(signature.len());
            signature.truncate(cut);
            signature.push(')');
        }
    }

    /// Read the dispatch variables of `info` as properties.
    pub fn read_vars(&mut self, info: &ITypeInfo) {
        let Some(count) = TypeAttr::get(info).map(|attr| attr.c_vars) else {
            return;
        };
        for index in 0..u32::from(count) {
            let Some(desc) = VarDesc::get(info, index) else {
                continue;
            };
            if desc.varkind != VAR_DISPATCH {
                continue;
            }
            let Some(name) = member_names(info, desc.memid, 1)
                .filter(|names| names.len() == 1)
                .and_then(|names| names.into_iter().next())
            else {
                continue;
            };
            let type_name = self.guess_type(&desc.elemdesc_var.tdesc, info);
            let var_flags = desc.w_var_flags;
            let readonly = var_flags & VARFLAG_FREADONLY != 0;

            if !self.builder.has_property(&name) {
                let mut flags = PropertyFlags::READABLE;
                if !readonly {
                    flags |= PropertyFlags::WRITABLE | PropertyFlags::STORED;
                }
                if var_flags & (VARFLAG_FNONBROWSABLE | VARFLAG_FHIDDEN) == 0 {
                    flags |= PropertyFlags::DESIGNABLE;
                }
                if var_flags & VARFLAG_FRESTRICTED == 0 {
                    flags |= PropertyFlags::SCRIPTABLE;
                }
                if var_flags & VARFLAG_FREQUESTEDIT != 0 {
                    flags |= PropertyFlags::REQUESTING_EDIT;
                }
                if self.has_enum(&type_name) {
                    flags |= PropertyFlags::ENUM_OR_FLAG;
                }
                if var_flags & VARFLAG_FBINDABLE != 0 {
                    self.builder.add_changed_signal(&name, &type_name, desc.memid);
                    flags |= PropertyFlags::BINDABLE;
                }
                self.builder.add_property(&type_name, &name, flags);
            }
            if !readonly {
                self.builder.add_setter_slot(&name);
            }
        }
    }

    /// Read `info` and its base interfaces, stopping at IDispatch / IUnknown.
    ///
    /// Each interface read is recorded as class information
    /// `Interface <N>` when [`GenerationOptions::CLASS_INFO`] is set.
    pub fn read_interface_chain(&mut self, info: &ITypeInfo) {
        let mut visited = HashSet::new();
        let mut base: Option<ComPtr<ITypeInfo>> = None;
        loop {
            let current: &ITypeInfo = match &base {
                Some(base) => &**base,
                None => info,
            };
            let Some((guid, typekind, impl_types)) =
                TypeAttr::get(current).map(|attr| (attr.guid, attr.typekind, attr.c_impl_types))
            else {
                break;
            };
            if !visited.insert(guid) {
                break;
            }
            let interesting = matches!(typekind, TKIND_DISPATCH | TKIND_INTERFACE)
                && guid != IID_IDISPATCH
                && guid != IID_IUNKNOWN;
            if interesting {
                if self.options.contains(GenerationOptions::CLASS_INFO) {
                    self.interface_serial += 1;
                    let key = format!("Interface {}", self.interface_serial);
                    let value = self.uuid_name("Interface", &guid);
                    self.builder.add_class_info(&key, &value);
                }
                self.read_functions(current);
                self.read_vars(current);
            }
            if impl_types == 0 {
                break;
            }
            let Some((next, _)) = implemented_type(current, 0) else {
                break;
            };
            base = Some(next);
        }
    }

    // -------------------------------------------------------------------------
    // Events
    // -------------------------------------------------------------------------

    /// Read a dispatch event interface, adding one signal per event method.
    ///
    /// Returns `None` unless `info` describes a dispinterface.
    pub fn read_event_interface(&mut self, info: &ITypeInfo) -> Option<EventInterface> {
        let (iid, count) = {
            let attr = TypeAttr::get(info)?;
            if attr.typekind != TKIND_DISPATCH {
                log::debug!("event interface {} is not a dispinterface", attr.guid);
                return None;
            }
            (attr.guid, attr.c_funcs)
        };

        let mut events = Vec::new();
        for index in 0..u32::from(count) {
            let Some(desc) = FuncDesc::get(info, index) else {
                continue;
            };
            if desc.invkind != INVOKE_FUNC || desc.funckind != FUNC_DISPATCH {
                continue;
            }
            let max = u32::try_from(desc.c_params).map_or(255, |n| n + 1);
            let Some(names) = member_names(info, desc.memid, max) else {
                continue;
            };
            let prototype = self.create_prototype(&desc, info, &names);
            let types = prototype.parameter_types();
            let param_names = prototype.parameter_names();
            self.builder
                .add_signal(&prototype.signature, types.clone(), param_names.clone());
            events.push((
                desc.memid,
                MetaMethod {
                    signature: normalize_signature(&prototype.signature),
                    return_type: String::new(),
                    parameter_types: types,
                    parameter_names: param_names,
                    kind: MethodKind::Signal,
                    invoke: InvokeKind::Method,
                    cloned: false,
                },
            ));
        }
        Some(EventInterface { iid, events })
    }

    /// Read every source interface a coclass declares.
    pub fn read_event_interfaces(&mut self, class_info: &ITypeInfo) -> Vec<EventInterface> {
        let Some(count) = TypeAttr::get(class_info).map(|attr| attr.c_impl_types) else {
            return Vec::new();
        };
        (0..u32::from(count))
            .filter_map(|index| implemented_type(class_info, index))
            .filter(|(_, flags)| flags & IMPLTYPEFLAG_FSOURCE != 0)
            .filter_map(|(info, _)| self.read_event_interface(&info))
            .collect()
    }
}
