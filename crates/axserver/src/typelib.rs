//! `ITypeLib` / `ITypeInfo` over a [`LibraryModel`]
//!
//! Descriptors handed out by `GetTypeAttr`, `GetFuncDesc`, `GetVarDesc` and
//! `GetLibAttr` are heap blocks whose first field is the ABI structure; the
//! rest of the block owns the nested `TYPEDESC`/`ARRAYDESC`/`ELEMDESC` nodes.
//! The matching `Release*` call frees the whole block.

use std::ffi::c_void;
use std::rc::Rc;

use axcom::oleauto::{sys_alloc_string, wide_to_string};
use axcom::proc::com_implement;
use axcom::*;

use crate::model::{FuncSpec, LibraryModel, TypeBody, TypeModel, TypeSpec, VarSpec};

/// Store `value` through `out` unless it is null
///
/// # Safety
/// `out` must be null or valid for writes.
pub(crate) unsafe fn write_out<T>(out: *mut T, value: T) {
    if !out.is_null() {
        unsafe { out.write(value) };
    }
}

/// Store a new BSTR through `out` unless it is null
///
/// # Safety
/// `out` must be null or valid for writes.
unsafe fn write_bstr(out: *mut BSTR, text: &str) {
    if !out.is_null() {
        unsafe { out.write(sys_alloc_string(text)) };
    }
}

// =============================================================================
// Descriptor blocks
// =============================================================================

/// Owns the nested type description nodes behind one descriptor
#[derive(Default)]
struct DescArena {
    typedescs: Vec<Box<TYPEDESC>>,
    arraydescs: Vec<Box<ARRAYDESC>>,
}

impl DescArena {
    fn typedesc(&mut self, lib: &LibraryModel, spec: &TypeSpec) -> TYPEDESC {
        match spec {
            TypeSpec::Ptr(inner) | TypeSpec::SafeArray(inner) => {
                let mut node = Box::new(self.typedesc(lib, inner));
                let lptdesc: *mut TYPEDESC = &mut *node;
                self.typedescs.push(node);
                TYPEDESC {
                    u: TypeDescData { lptdesc },
                    vt: spec.vt(),
                }
            }
            TypeSpec::CArray(inner, count) => {
                let mut node = Box::new(ARRAYDESC {
                    tdesc_elem: self.typedesc(lib, inner),
                    c_dims: 1,
                    rgbounds: [SAFEARRAYBOUND::new(*count, 0)],
                });
                let lpadesc: *mut ARRAYDESC = &mut *node;
                self.arraydescs.push(node);
                TYPEDESC {
                    u: TypeDescData { lpadesc },
                    vt: VT_CARRAY,
                }
            }
            TypeSpec::User(name) => TYPEDESC {
                u: TypeDescData {
                    hreftype: lib.href_of(name),
                },
                vt: VT_USERDEFINED,
            },
            other => TYPEDESC::scalar(other.vt()),
        }
    }
}

#[repr(C)]
struct TypeAttrBlock {
    attr: TYPEATTR,
    _arena: DescArena,
}

#[repr(C)]
struct FuncDescBlock {
    desc: FUNCDESC,
    _params: Vec<ELEMDESC>,
    _arena: DescArena,
}

#[repr(C)]
struct VarDescBlock {
    desc: VARDESC,
    _value: Box<VARIANT>,
    _arena: DescArena,
}

fn type_attr_block(lib: &LibraryModel, model: &TypeModel) -> Box<TypeAttrBlock> {
    let mut arena = DescArena::default();
    let tdesc_alias = match &model.body {
        TypeBody::Alias(target) => arena.typedesc(lib, target),
        _ => TYPEDESC::scalar(VT_EMPTY),
    };
    let ptr_size = std::mem::size_of::<*const c_void>();
    let vft_slots = match model.body {
        TypeBody::Dispatch => 7,
        TypeBody::Interface => 3 + model.funcs.len(),
        _ => 0,
    };
    Box::new(TypeAttrBlock {
        attr: TYPEATTR {
            guid: model.guid,
            lcid: 0,
            dw_reserved: 0,
            memid_constructor: MEMBERID_NIL,
            memid_destructor: MEMBERID_NIL,
            lpstr_schema: std::ptr::null_mut(),
            cb_size_instance: ptr_size as u32,
            typekind: model.typekind(),
            c_funcs: model.funcs.len() as u16,
            c_vars: model.vars.len() as u16,
            c_impl_types: model.impl_types.len() as u16,
            cb_size_vft: (vft_slots * ptr_size) as u16,
            cb_alignment: ptr_size as u16,
            w_type_flags: model.flags,
            w_major_ver_num: model.version.0,
            w_minor_ver_num: model.version.1,
            tdesc_alias,
            idldesc_type: IDLDESC::default(),
        },
        _arena: arena,
    })
}

fn func_desc_block(lib: &LibraryModel, func: &FuncSpec, slot: usize) -> Box<FuncDescBlock> {
    let mut arena = DescArena::default();
    let mut params: Vec<ELEMDESC> = func
        .params
        .iter()
        .map(|p| ELEMDESC::new(arena.typedesc(lib, &p.ty), p.flags))
        .collect();
    let ret = arena.typedesc(lib, &func.ret);
    let lprgelemdesc_param = if params.is_empty() {
        std::ptr::null_mut()
    } else {
        params.as_mut_ptr()
    };
    Box::new(FuncDescBlock {
        desc: FUNCDESC {
            memid: func.memid,
            lprgscode: std::ptr::null_mut(),
            lprgelemdesc_param,
            funckind: func.funckind,
            invkind: func.invkind,
            callconv: CC_STDCALL,
            c_params: func.params.len() as i16,
            c_params_opt: func.optional_count() as i16,
            o_vft: (slot * std::mem::size_of::<*const c_void>()) as i16,
            c_scodes: 0,
            elemdesc_func: ELEMDESC::new(ret, PARAMFLAG_NONE),
            w_func_flags: func.flags,
        },
        _params: params,
        _arena: arena,
    })
}

fn var_desc_block(lib: &LibraryModel, var: &VarSpec) -> Box<VarDescBlock> {
    let mut arena = DescArena::default();
    let mut value = Box::new(VARIANT::from_i32(var.value.unwrap_or(0)));
    let u = if var.varkind == VAR_CONST {
        VarDescData {
            lpvar_value: &mut *value,
        }
    } else {
        VarDescData { o_inst: 0 }
    };
    Box::new(VarDescBlock {
        desc: VARDESC {
            memid: var.memid,
            lpstr_schema: std::ptr::null_mut(),
            u,
            elemdesc_var: ELEMDESC::new(arena.typedesc(lib, &var.ty), PARAMFLAG_NONE),
            w_var_flags: var.flags,
            varkind: var.varkind,
        },
        _value: value,
        _arena: arena,
    })
}

// =============================================================================
// ITypeInfo
// =============================================================================

/// One type of a [`LibraryModel`] as `ITypeInfo`
#[repr(C)]
pub struct TypeInfoObject {
    vtable_i_type_info: *const ITypeInfoVTable,
    ref_count: ComRefCount,
    lib: Rc<LibraryModel>,
    index: usize,
}

impl TypeInfoObject {
    /// A new `ITypeInfo` reference for type `index` of `lib`.
    pub fn create(lib: Rc<LibraryModel>, index: usize) -> Option<ComPtr<ITypeInfo>> {
        if index >= lib.types.len() {
            return None;
        }
        ComBox::new(TypeInfoObject {
            vtable_i_type_info: Self::VTABLE_I_TYPE_INFO,
            ref_count: ComRefCount::new(),
            lib,
            index,
        })
        .query()
    }

    fn model(&self) -> &TypeModel {
        &self.lib.types[self.index]
    }

    /// Names reported by `GetNames`: the member, then its named parameters
    fn member_names(&self, memid: MEMBERID) -> Option<Vec<String>> {
        let model = self.model();
        if let Some(func) = model.funcs.iter().find(|f| f.memid == memid) {
            let mut names = vec![func.name.clone()];
            names.extend(
                func.params
                    .iter()
                    .map(|p| p.name.clone())
                    .take_while(|name| !name.is_empty()),
            );
            return Some(names);
        }
        model
            .vars
            .iter()
            .find(|v| v.memid == memid)
            .and_then(|v| v.name.clone())
            .map(|name| vec![name])
    }

    fn member_by_name(&self, name: &str) -> Option<(MEMBERID, Vec<String>)> {
        let model = self.model();
        if let Some(func) = model.funcs.iter().find(|f| f.name.eq_ignore_ascii_case(name)) {
            let params = func.params.iter().map(|p| p.name.clone()).collect();
            return Some((func.memid, params));
        }
        model
            .vars
            .iter()
            .find(|v| v.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
            .map(|v| (v.memid, Vec::new()))
    }
}

unsafe impl ComObject for TypeInfoObject {
    fn ref_count(&self) -> &ComRefCount {
        &self.ref_count
    }

    fn interface(&self, riid: &GUID) -> Option<*mut c_void> {
        (*riid == IID_IUNKNOWN || *riid == IID_ITYPEINFO)
            .then(|| interface_ptr(&self.vtable_i_type_info))
    }
}

#[com_implement(ITypeInfo)]
impl TypeInfoObject {
    fn get_type_attr(&self, ppattr: *mut *mut TYPEATTR) -> HRESULT {
        if ppattr.is_null() {
            return E_POINTER;
        }
        let block = type_attr_block(&self.lib, self.model());
        unsafe { *ppattr = Box::into_raw(block) as *mut TYPEATTR };
        S_OK
    }

    fn get_type_comp(&self, pptcomp: *mut *mut c_void) -> HRESULT {
        unsafe { write_out(pptcomp, std::ptr::null_mut()) };
        E_NOTIMPL
    }

    fn get_func_desc(&self, index: u32, ppfuncdesc: *mut *mut FUNCDESC) -> HRESULT {
        if ppfuncdesc.is_null() {
            return E_POINTER;
        }
        unsafe { *ppfuncdesc = std::ptr::null_mut() };
        let slot_base = match self.model().body {
            TypeBody::Dispatch => 7,
            _ => 3,
        };
        let Some(func) = self.model().funcs.get(index as usize) else {
            return TYPE_E_ELEMENTNOTFOUND;
        };
        let block = func_desc_block(&self.lib, func, slot_base + index as usize);
        unsafe { *ppfuncdesc = Box::into_raw(block) as *mut FUNCDESC };
        S_OK
    }

    fn get_var_desc(&self, index: u32, ppvardesc: *mut *mut VARDESC) -> HRESULT {
        if ppvardesc.is_null() {
            return E_POINTER;
        }
        unsafe { *ppvardesc = std::ptr::null_mut() };
        let Some(var) = self.model().vars.get(index as usize) else {
            return TYPE_E_ELEMENTNOTFOUND;
        };
        let block = var_desc_block(&self.lib, var);
        unsafe { *ppvardesc = Box::into_raw(block) as *mut VARDESC };
        S_OK
    }

    fn get_names(&self, memid: MEMBERID, names: *mut BSTR, max_names: u32, count: *mut u32) -> HRESULT {
        unsafe { write_out(count, 0) };
        if names.is_null() {
            return E_POINTER;
        }
        let Some(found) = self.member_names(memid) else {
            return TYPE_E_ELEMENTNOTFOUND;
        };
        let written = found.len().min(max_names as usize);
        for (i, name) in found.iter().take(written).enumerate() {
            unsafe { *names.add(i) = sys_alloc_string(name) };
        }
        unsafe { write_out(count, written as u32) };
        S_OK
    }

    fn get_ref_type_of_impl_type(&self, index: u32, href: *mut HREFTYPE) -> HRESULT {
        let Some((name, _)) = self.model().impl_types.get(index as usize) else {
            return TYPE_E_ELEMENTNOTFOUND;
        };
        unsafe { write_out(href, self.lib.href_of(name)) };
        S_OK
    }

    fn get_impl_type_flags(&self, index: u32, flags: *mut i32) -> HRESULT {
        let Some((_, impl_flags)) = self.model().impl_types.get(index as usize) else {
            return TYPE_E_ELEMENTNOTFOUND;
        };
        unsafe { write_out(flags, *impl_flags) };
        S_OK
    }

    fn get_ids_of_names(&self, names: *const *const u16, cnames: u32, memids: *mut MEMBERID) -> HRESULT {
        if names.is_null() || memids.is_null() || cnames == 0 {
            return E_INVALIDARG;
        }
        let requested: Vec<String> = (0..cnames as usize)
            .map(|i| unsafe { wide_to_string(*names.add(i)) })
            .collect();
        for i in 0..cnames as usize {
            unsafe { *memids.add(i) = DISPID_UNKNOWN };
        }
        let Some((memid, params)) = self.member_by_name(&requested[0]) else {
            return DISP_E_UNKNOWNNAME;
        };
        unsafe { *memids = memid };
        let mut result = S_OK;
        for (i, wanted) in requested.iter().enumerate().skip(1) {
            match params.iter().position(|p| p.eq_ignore_ascii_case(wanted)) {
                Some(position) => unsafe { *memids.add(i) = position as MEMBERID },
                None => result = DISP_E_UNKNOWNNAME,
            }
        }
        result
    }

    fn invoke(
        &self,
        instance: *mut c_void,
        memid: MEMBERID,
        flags: u16,
        params: *mut DISPPARAMS,
        result: *mut VARIANT,
        excepinfo: *mut EXCEPINFO,
        argerr: *mut u32,
    ) -> HRESULT {
        let _ = (instance, memid, flags, params, result, excepinfo, argerr);
        E_NOTIMPL
    }

    fn get_documentation(
        &self,
        memid: MEMBERID,
        name: *mut BSTR,
        doc_string: *mut BSTR,
        help_context: *mut u32,
        help_file: *mut BSTR,
    ) -> HRESULT {
        let model = self.model();
        let (member, doc) = if memid == MEMBERID_NIL {
            match &model.name {
                Some(type_name) => (type_name.clone(), model.doc.clone()),
                None => return TYPE_E_ELEMENTNOTFOUND,
            }
        } else {
            match self.member_names(memid) {
                Some(names) => (names[0].clone(), String::new()),
                None => return TYPE_E_ELEMENTNOTFOUND,
            }
        };
        unsafe {
            write_bstr(name, &member);
            write_bstr(doc_string, &doc);
            write_out(help_context, 0);
            write_out(help_file, std::ptr::null_mut());
        }
        S_OK
    }

    fn get_dll_entry(
        &self,
        memid: MEMBERID,
        invkind: i32,
        dll_name: *mut BSTR,
        name: *mut BSTR,
        ordinal: *mut u16,
    ) -> HRESULT {
        let _ = (memid, invkind, dll_name, name, ordinal);
        TYPE_E_ELEMENTNOTFOUND
    }

    fn get_ref_type_info(&self, href: HREFTYPE, pptinfo: *mut *mut ITypeInfo) -> HRESULT {
        if pptinfo.is_null() {
            return E_POINTER;
        }
        unsafe { *pptinfo = std::ptr::null_mut() };
        let Some((lib, index)) = self.lib.resolve(href) else {
            return TYPE_E_ELEMENTNOTFOUND;
        };
        match TypeInfoObject::create(lib, index) {
            Some(info) => {
                unsafe { *pptinfo = info.into_raw() };
                S_OK
            }
            None => E_OUTOFMEMORY,
        }
    }

    fn address_of_member(&self, memid: MEMBERID, invkind: i32, ppv: *mut *mut c_void) -> HRESULT {
        let _ = (memid, invkind);
        unsafe { write_out(ppv, std::ptr::null_mut()) };
        E_NOTIMPL
    }

    fn create_instance(&self, outer: *mut IUnknown, riid: *const GUID, ppv: *mut *mut c_void) -> HRESULT {
        let _ = (outer, riid);
        unsafe { write_out(ppv, std::ptr::null_mut()) };
        E_NOTIMPL
    }

    fn get_mops(&self, memid: MEMBERID, mops: *mut BSTR) -> HRESULT {
        let _ = memid;
        unsafe { write_out(mops, std::ptr::null_mut()) };
        S_OK
    }

    fn get_containing_type_lib(&self, pptlib: *mut *mut ITypeLib, index: *mut u32) -> HRESULT {
        if pptlib.is_null() {
            return E_POINTER;
        }
        match TypeLibObject::create(self.lib.clone()) {
            Some(lib) => unsafe {
                *pptlib = lib.into_raw();
                write_out(index, self.index as u32);
                S_OK
            },
            None => E_OUTOFMEMORY,
        }
    }

    fn release_type_attr(&self, pattr: *mut TYPEATTR) {
        if !pattr.is_null() {
            drop(unsafe { Box::from_raw(pattr as *mut TypeAttrBlock) });
        }
    }

    fn release_func_desc(&self, pfuncdesc: *mut FUNCDESC) {
        if !pfuncdesc.is_null() {
            drop(unsafe { Box::from_raw(pfuncdesc as *mut FuncDescBlock) });
        }
    }

    fn release_var_desc(&self, pvardesc: *mut VARDESC) {
        if !pvardesc.is_null() {
            drop(unsafe { Box::from_raw(pvardesc as *mut VarDescBlock) });
        }
    }
}

// =============================================================================
// ITypeLib
// =============================================================================

/// A [`LibraryModel`] as `ITypeLib`
#[repr(C)]
pub struct TypeLibObject {
    vtable_i_type_lib: *const ITypeLibVTable,
    ref_count: ComRefCount,
    lib: Rc<LibraryModel>,
}

impl TypeLibObject {
    /// A new `ITypeLib` reference for `lib`.
    pub fn create(lib: Rc<LibraryModel>) -> Option<ComPtr<ITypeLib>> {
        ComBox::new(TypeLibObject {
            vtable_i_type_lib: Self::VTABLE_I_TYPE_LIB,
            ref_count: ComRefCount::new(),
            lib,
        })
        .query()
    }

    fn type_has_name(model: &TypeModel, name: &str) -> bool {
        model.name_or_empty().eq_ignore_ascii_case(name)
            || model.funcs.iter().any(|f| f.name.eq_ignore_ascii_case(name))
            || model
                .vars
                .iter()
                .any(|v| v.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
    }
}

unsafe impl ComObject for TypeLibObject {
    fn ref_count(&self) -> &ComRefCount {
        &self.ref_count
    }

    fn interface(&self, riid: &GUID) -> Option<*mut c_void> {
        (*riid == IID_IUNKNOWN || *riid == IID_ITYPELIB)
            .then(|| interface_ptr(&self.vtable_i_type_lib))
    }
}

#[com_implement(ITypeLib)]
impl TypeLibObject {
    fn get_type_info_count(&self) -> u32 {
        self.lib.types.len() as u32
    }

    fn get_type_info(&self, index: u32, pptinfo: *mut *mut ITypeInfo) -> HRESULT {
        if pptinfo.is_null() {
            return E_POINTER;
        }
        unsafe { *pptinfo = std::ptr::null_mut() };
        match TypeInfoObject::create(self.lib.clone(), index as usize) {
            Some(info) => {
                unsafe { *pptinfo = info.into_raw() };
                S_OK
            }
            None => TYPE_E_ELEMENTNOTFOUND,
        }
    }

    fn get_type_info_type(&self, index: u32, kind: *mut TYPEKIND) -> HRESULT {
        match self.lib.types.get(index as usize) {
            Some(model) => {
                unsafe { write_out(kind, model.typekind()) };
                S_OK
            }
            None => TYPE_E_ELEMENTNOTFOUND,
        }
    }

    fn get_type_info_of_guid(&self, guid: *const GUID, pptinfo: *mut *mut ITypeInfo) -> HRESULT {
        if guid.is_null() || pptinfo.is_null() {
            return E_POINTER;
        }
        unsafe { *pptinfo = std::ptr::null_mut() };
        let Some(index) = self.lib.find_guid(unsafe { &*guid }) else {
            return TYPE_E_ELEMENTNOTFOUND;
        };
        self.get_type_info(index as u32, pptinfo)
    }

    fn get_lib_attr(&self, ppattr: *mut *mut TLIBATTR) -> HRESULT {
        if ppattr.is_null() {
            return E_POINTER;
        }
        let syskind = if cfg!(target_pointer_width = "64") {
            SYS_WIN64
        } else {
            SYS_WIN32
        };
        let attr = Box::new(TLIBATTR {
            guid: self.lib.guid,
            lcid: 0,
            syskind,
            w_major_ver_num: self.lib.version.0,
            w_minor_ver_num: self.lib.version.1,
            w_lib_flags: 0,
        });
        unsafe { *ppattr = Box::into_raw(attr) };
        S_OK
    }

    fn get_type_comp(&self, pptcomp: *mut *mut c_void) -> HRESULT {
        unsafe { write_out(pptcomp, std::ptr::null_mut()) };
        E_NOTIMPL
    }

    fn get_documentation(
        &self,
        index: i32,
        name: *mut BSTR,
        doc_string: *mut BSTR,
        help_context: *mut u32,
        help_file: *mut BSTR,
    ) -> HRESULT {
        let (type_name, doc) = if index == -1 {
            (self.lib.name.as_str(), self.lib.doc.as_str())
        } else {
            match self.lib.types.get(index as usize) {
                Some(TypeModel {
                    name: Some(type_name),
                    doc,
                    ..
                }) => (type_name.as_str(), doc.as_str()),
                _ => return TYPE_E_ELEMENTNOTFOUND,
            }
        };
        unsafe {
            write_bstr(name, type_name);
            write_bstr(doc_string, doc);
            write_out(help_context, 0);
            write_out(help_file, std::ptr::null_mut());
        }
        S_OK
    }

    fn is_name(&self, name: *mut u16, hash: u32, found: *mut i32) -> HRESULT {
        let _ = hash;
        if name.is_null() || found.is_null() {
            return E_POINTER;
        }
        let wanted = unsafe { wide_to_string(name) };
        let hit = self
            .lib
            .types
            .iter()
            .any(|model| Self::type_has_name(model, &wanted));
        unsafe { *found = i32::from(hit) };
        S_OK
    }

    fn find_name(
        &self,
        name: *mut u16,
        hash: u32,
        pptinfo: *mut *mut ITypeInfo,
        memids: *mut MEMBERID,
        found: *mut u16,
    ) -> HRESULT {
        let _ = hash;
        if name.is_null() || pptinfo.is_null() || memids.is_null() || found.is_null() {
            return E_POINTER;
        }
        let wanted = unsafe { wide_to_string(name) };
        let capacity = unsafe { *found } as usize;
        let mut count = 0;
        for (index, model) in self.lib.types.iter().enumerate() {
            if count == capacity {
                break;
            }
            if !model.name_or_empty().eq_ignore_ascii_case(&wanted) {
                continue;
            }
            if let Some(info) = TypeInfoObject::create(self.lib.clone(), index) {
                unsafe {
                    *pptinfo.add(count) = info.into_raw();
                    *memids.add(count) = MEMBERID_NIL;
                }
                count += 1;
            }
        }
        unsafe { *found = count as u16 };
        S_OK
    }

    fn release_t_lib_attr(&self, pattr: *mut TLIBATTR) {
        if !pattr.is_null() {
            drop(unsafe { Box::from_raw(pattr) });
        }
    }
}
