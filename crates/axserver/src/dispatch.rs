//! Rust-implemented automation objects
//!
//! An [`AutomationObject`] exposes one coclass of a [`LibraryModel`]:
//! `IDispatch` for its default interface, `IProvideClassInfo` for the coclass
//! and `IConnectionPointContainer` for its source interfaces plus
//! `IPropertyNotifySink`. Member lookup, argument counting and named-argument
//! rules are handled here; what a member *does* is up to a
//! [`DispatchHandler`].

use std::cell::Cell;
use std::ffi::c_void;
use std::rc::Rc;

use axcom::oleauto::{sys_alloc_string, sys_free_string, variant_clear, variant_copy, wide_to_string};
use axcom::proc::com_implement;
use axcom::*;

use crate::connection::{ConnectionPoint, ConnectionPointEnum, EventHub};
use crate::model::{FuncSpec, LibraryModel, TypeBody, TypeSpec};
use crate::typelib::{TypeInfoObject, write_out};

/// Behaviour behind an [`AutomationObject`]
pub trait DispatchHandler {
    /// Execute one call. `Err` is returned to the client as the `HRESULT`.
    fn invoke(&self, call: &mut DispatchCall<'_>) -> Result<(), HRESULT>;
}

impl<F> DispatchHandler for F
where
    F: Fn(&mut DispatchCall<'_>) -> Result<(), HRESULT>,
{
    fn invoke(&self, call: &mut DispatchCall<'_>) -> Result<(), HRESULT> {
        self(call)
    }
}

/// How a member is being accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    Method,
    Get,
    Put,
}

/// A member resolved from a DISPID
#[derive(Debug, Clone)]
struct Member {
    name: String,
    params: Vec<TypeSpec>,
    optional: usize,
    kind: CallKind,
}

// =============================================================================
// DispatchCall
// =============================================================================

/// One `IDispatch::Invoke`, with arguments in declared order
pub struct DispatchCall<'a> {
    member: &'a str,
    kind: CallKind,
    dispid: DISPID,
    params: &'a [TypeSpec],
    /// Null for arguments the client did not supply
    args: Vec<*mut VARIANT>,
    supplied: usize,
    result: *mut VARIANT,
    excepinfo: *mut EXCEPINFO,
    argerr: *mut u32,
    events: &'a EventHub,
}

impl DispatchCall<'_> {
    pub fn member(&self) -> &str {
        self.member
    }

    pub fn kind(&self) -> CallKind {
        self.kind
    }

    pub fn dispid(&self) -> DISPID {
        self.dispid
    }

    /// Declared parameter types
    pub fn params(&self) -> &[TypeSpec] {
        self.params
    }

    /// Number of declared parameters
    pub fn arg_count(&self) -> usize {
        self.args.len()
    }

    /// Whether argument `i` was omitted or passed as "parameter not found"
    pub fn is_missing(&self, i: usize) -> bool {
        match self.args.get(i) {
            Some(ptr) if !ptr.is_null() => {
                let var = unsafe { &**ptr };
                var.as_error() == Some(DISP_E_PARAMNOTFOUND)
            }
            _ => true,
        }
    }

    /// The events of the object being called
    pub fn events(&self) -> &EventHub {
        self.events
    }

    fn mismatch(&self, i: usize) -> HRESULT {
        // rgvarg holds the arguments in reverse order
        let position = self.supplied.saturating_sub(i + 1);
        unsafe { write_out(self.argerr, position as u32) };
        DISP_E_TYPEMISMATCH
    }

    /// Argument `i` with one level of `VT_BYREF` removed; borrowed, not owned.
    pub fn value(&self, i: usize) -> Result<VARIANT, HRESULT> {
        if self.is_missing(i) {
            return Err(DISP_E_PARAMNOTFOUND);
        }
        let var = unsafe { *self.args[i] };
        if !var.is_byref() {
            return Ok(var);
        }
        let mut out = VARIANT::new();
        out.vt = var.vt & !VT_BYREF;
        unsafe {
            match out.vt {
                VT_VARIANT => return Ok(*var.data.pvar_val),
                VT_I1 | VT_UI1 => out.data.b_val = *var.data.pb_val,
                VT_I2 | VT_UI2 | VT_BOOL => out.data.i_val = *var.data.pi_val,
                VT_I4 | VT_UI4 | VT_INT | VT_UINT | VT_ERROR => out.data.l_val = *var.data.pl_val,
                VT_R4 => out.data.flt_val = *var.data.pflt_val,
                VT_I8 | VT_UI8 | VT_R8 | VT_DATE | VT_CY => out.data.ll_val = *var.data.pll_val,
                VT_BSTR => out.data.bstr_val = *var.data.pbstr_val,
                VT_DISPATCH | VT_UNKNOWN => out.data.punk_val = *var.data.ppunk_val,
                vt if vt & VT_ARRAY != 0 => out.data.parray = *var.data.pparray,
                _ => return Err(self.mismatch(i)),
            }
        }
        Ok(out)
    }

    pub fn arg_i32(&self, i: usize) -> Result<i32, HRESULT> {
        let var = self.value(i)?;
        let value = unsafe {
            match var.vt {
                VT_I4 | VT_INT => Some(var.data.l_val),
                VT_UI4 | VT_UINT => i32::try_from(var.data.ul_val).ok(),
                VT_I2 => Some(i32::from(var.data.i_val)),
                VT_UI2 => Some(i32::from(var.data.ui_val)),
                VT_I1 => Some(i32::from(var.data.c_val)),
                VT_UI1 => Some(i32::from(var.data.b_val)),
                VT_I8 => i32::try_from(var.data.ll_val).ok(),
                VT_BOOL => Some(i32::from(var.data.bool_val)),
                VT_R8 => Some(var.data.dbl_val.round() as i32),
                VT_R4 => Some(var.data.flt_val.round() as i32),
                VT_BSTR => var.as_string().and_then(|s| s.trim().parse().ok()),
                _ => None,
            }
        };
        value.ok_or_else(|| self.mismatch(i))
    }

    /// Unsigned argument `i`; `VT_UI4` values above `i32::MAX` pass unchanged.
    pub fn arg_u32(&self, i: usize) -> Result<u32, HRESULT> {
        let var = self.value(i)?;
        if matches!(var.vt, VT_UI4 | VT_UINT) {
            return Ok(unsafe { var.data.ul_val });
        }
        self.arg_i32(i).map(|v| v as u32)
    }

    pub fn arg_f64(&self, i: usize) -> Result<f64, HRESULT> {
        let var = self.value(i)?;
        if let Some(value) = var.as_f64() {
            return Ok(value);
        }
        if var.vt == VT_BSTR {
            return var
                .as_string()
                .and_then(|s| s.trim().parse().ok())
                .ok_or_else(|| self.mismatch(i));
        }
        self.arg_i32(i).map(f64::from)
    }

    pub fn arg_bool(&self, i: usize) -> Result<bool, HRESULT> {
        let var = self.value(i)?;
        match var.as_bool() {
            Some(value) => Ok(value),
            None => self.arg_i32(i).map(|v| v != 0),
        }
    }

    pub fn arg_string(&self, i: usize) -> Result<String, HRESULT> {
        let var = self.value(i)?;
        if let Some(text) = var.as_string() {
            return Ok(text);
        }
        if let Some(value) = var.as_f64() {
            return Ok(value.to_string());
        }
        self.arg_i32(i).map(|v| v.to_string())
    }

    /// An owned deep copy of argument `i`.
    pub fn arg_variant(&self, i: usize) -> Result<VARIANT, HRESULT> {
        let var = self.value(i)?;
        let mut copy = VARIANT::new();
        let hr = variant_copy(&mut copy, &var);
        if failed(hr) { Err(hr) } else { Ok(copy) }
    }

    /// Write `value` through by-reference argument `i`, taking ownership of it.
    pub fn set_out(&mut self, i: usize, mut value: VARIANT) -> Result<(), HRESULT> {
        let target = match self.args.get(i) {
            Some(ptr) if !ptr.is_null() => unsafe { **ptr },
            _ => {
                variant_clear(&mut value);
                return Err(DISP_E_PARAMNOTFOUND);
            }
        };
        if !target.is_byref() {
            variant_clear(&mut value);
            return Err(self.mismatch(i));
        }
        let base = target.vt & !VT_BYREF;
        unsafe {
            match base {
                VT_VARIANT => {
                    let slot = &mut *target.data.pvar_val;
                    variant_clear(slot);
                    *slot = value;
                    return Ok(());
                }
                VT_BSTR if value.vt == VT_BSTR => {
                    sys_free_string(*target.data.pbstr_val);
                    *target.data.pbstr_val = value.data.bstr_val;
                    return Ok(());
                }
                VT_I4 | VT_INT if value.vt == VT_I4 => *target.data.pl_val = value.data.l_val,
                VT_I2 if value.vt == VT_I2 => *target.data.pi_val = value.data.i_val,
                VT_BOOL if value.vt == VT_BOOL => *target.data.pbool_val = value.data.bool_val,
                VT_R8 if value.vt == VT_R8 => *target.data.pdbl_val = value.data.dbl_val,
                VT_R4 if value.vt == VT_R4 => *target.data.pflt_val = value.data.flt_val,
                VT_DATE if value.vt == VT_DATE => *target.data.pdate = value.data.date,
                // An unset out slot: any 32-bit value fits its cell
                VT_ERROR if matches!(value.vt, VT_I4 | VT_UI4 | VT_INT | VT_UINT | VT_R4 | VT_ERROR) => {
                    *target.data.pul_val = value.data.ul_val;
                    (*self.args[i]).vt = value.vt | VT_BYREF;
                }
                _ => {
                    variant_clear(&mut value);
                    return Err(self.mismatch(i));
                }
            }
        }
        Ok(())
    }

    /// Hand `value` to the caller as the return value.
    pub fn set_result(&mut self, mut value: VARIANT) {
        if self.result.is_null() {
            variant_clear(&mut value);
            return;
        }
        unsafe {
            variant_clear(&mut *self.result);
            *self.result = value;
        }
    }

    pub fn set_result_i32(&mut self, value: i32) {
        self.set_result(VARIANT::from_i32(value));
    }

    pub fn set_result_f64(&mut self, value: f64) {
        self.set_result(VARIANT::from_f64(value));
    }

    pub fn set_result_bool(&mut self, value: bool) {
        self.set_result(VARIANT::from_bool(value));
    }

    pub fn set_result_string(&mut self, value: &str) {
        self.set_result(VARIANT::from_bstr(sys_alloc_string(value)));
    }

    /// Fill the exception info and return `DISP_E_EXCEPTION`.
    pub fn raise(&mut self, code: u16, source: &str, description: &str) -> HRESULT {
        if let Some(info) = unsafe { self.excepinfo.as_mut() } {
            *info = EXCEPINFO::default();
            info.w_code = code;
            info.bstr_source = sys_alloc_string(source);
            info.bstr_description = sys_alloc_string(description);
        }
        DISP_E_EXCEPTION
    }

    /// Like [`Self::raise`], but the text is only filled in when the client
    /// runs the deferred fill-in callback.
    pub fn raise_deferred(&mut self, scode: HRESULT, source: &str, description: &str) -> HRESULT {
        if let Some(info) = unsafe { self.excepinfo.as_mut() } {
            *info = EXCEPINFO::default();
            info.scode = scode;
            let pending = Box::new(PendingException {
                source: sys_alloc_string(source),
                description: sys_alloc_string(description),
            });
            info.pv_reserved = Box::into_raw(pending) as *mut c_void;
            info.pfn_deferred_fill_in = Some(fill_in_exception);
        }
        DISP_E_EXCEPTION
    }
}

/// Text of a deferred exception, parked in `EXCEPINFO::pv_reserved`
struct PendingException {
    source: BSTR,
    description: BSTR,
}

unsafe extern "system" fn fill_in_exception(info: *mut EXCEPINFO) -> HRESULT {
    let Some(info) = (unsafe { info.as_mut() }) else {
        return E_POINTER;
    };
    if info.pv_reserved.is_null() {
        return S_OK;
    }
    let pending = unsafe { Box::from_raw(info.pv_reserved as *mut PendingException) };
    info.pv_reserved = std::ptr::null_mut();
    info.bstr_source = pending.source;
    info.bstr_description = pending.description;
    info.pfn_deferred_fill_in = None;
    S_OK
}

// =============================================================================
// AutomationObject
// =============================================================================

/// A coclass instance implemented in Rust
#[repr(C)]
pub struct AutomationObject {
    vtable_i_dispatch: *const IDispatchVTable,
    vtable_i_provide_class_info: *const IProvideClassInfoVTable,
    vtable_i_connection_point_container: *const IConnectionPointContainerVTable,
    ref_count: ComRefCount,
    lib: Rc<LibraryModel>,
    class_index: usize,
    interface_index: usize,
    funcs: Vec<FuncSpec>,
    vars: Vec<crate::model::VarSpec>,
    hub: Rc<EventHub>,
    handler: Box<dyn DispatchHandler>,
    class_info_enabled: Cell<bool>,
    connectable: Cell<bool>,
}

impl AutomationObject {
    /// Instantiate coclass `class` of `lib`.
    ///
    /// Returns `None` if the class or its default interface is not in `lib`.
    pub fn new(
        lib: &Rc<LibraryModel>,
        class: &str,
        handler: impl DispatchHandler + 'static,
    ) -> Option<ComBox<AutomationObject>> {
        let class_index = lib
            .find(class)
            .filter(|&i| lib.types[i].body == TypeBody::CoClass)?;
        let impl_types = &lib.types[class_index].impl_types;

        let incoming: Vec<&(String, i32)> = impl_types
            .iter()
            .filter(|(_, flags)| flags & IMPLTYPEFLAG_FSOURCE == 0)
            .collect();
        let default_name = incoming
            .iter()
            .find(|(_, flags)| flags & IMPLTYPEFLAG_FDEFAULT != 0)
            .or_else(|| incoming.first())
            .map(|(name, _)| name.as_str())?;
        let interface_index = lib.find(default_name)?;

        let mut points: Vec<(GUID, Option<usize>)> = impl_types
            .iter()
            .filter(|(_, flags)| flags & IMPLTYPEFLAG_FSOURCE != 0)
            .filter_map(|(name, _)| lib.find(name))
            .map(|index| (lib.types[index].guid, Some(index)))
            .collect();
        points.push((IID_IPROPERTYNOTIFYSINK, None));

        // Flatten the inheritance chain inside this library
        let mut funcs = Vec::new();
        let mut vars = Vec::new();
        let mut current = Some(interface_index);
        while let Some(index) = current {
            let model = &lib.types[index];
            funcs.extend(model.funcs.iter().cloned());
            vars.extend(model.vars.iter().cloned());
            current = model
                .impl_types
                .first()
                .and_then(|(base, _)| lib.find(base))
                .filter(|&base| base != index);
        }

        let hub = Rc::new(EventHub::new(lib.clone(), points));
        let object = ComBox::new(AutomationObject {
            vtable_i_dispatch: Self::VTABLE_I_DISPATCH,
            vtable_i_provide_class_info: Self::VTABLE_I_PROVIDE_CLASS_INFO,
            vtable_i_connection_point_container: Self::VTABLE_I_CONNECTION_POINT_CONTAINER,
            ref_count: ComRefCount::new(),
            lib: lib.clone(),
            class_index,
            interface_index,
            funcs,
            vars,
            hub,
            handler: Box::new(handler),
            class_info_enabled: Cell::new(true),
            connectable: Cell::new(true),
        });
        object.hub.set_container(
            interface_ptr(&object.vtable_i_connection_point_container) as *mut IConnectionPointContainer,
        );
        Some(object)
    }

    /// The CLSID of the instantiated coclass
    pub fn clsid(&self) -> GUID {
        self.lib.types[self.class_index].guid
    }

    /// Events and property notifications of this object
    pub fn events(&self) -> &EventHub {
        &self.hub
    }

    /// Stop answering `IProvideClassInfo`.
    pub fn set_class_info_enabled(&self, enabled: bool) {
        self.class_info_enabled.set(enabled);
    }

    /// Stop answering `IConnectionPointContainer`.
    pub fn set_connectable(&self, enabled: bool) {
        self.connectable.set(enabled);
    }

    /// DISPID of the function or variable called `name`
    pub fn dispid_of(&self, name: &str) -> Option<DISPID> {
        self.funcs
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(name))
            .map(|f| f.memid)
            .or_else(|| {
                self.vars
                    .iter()
                    .find(|v| v.name.as_deref().is_some_and(|n| n.eq_ignore_ascii_case(name)))
                    .map(|v| v.memid)
            })
    }

    fn resolve(&self, dispid: DISPID, flags: u16) -> Option<Member> {
        let put = flags & (DISPATCH_PROPERTYPUT | DISPATCH_PROPERTYPUTREF) != 0;
        let func = self.funcs.iter().find(|f| {
            f.memid == dispid
                && match f.invkind {
                    INVOKE_PROPERTYPUT | INVOKE_PROPERTYPUTREF => put,
                    INVOKE_PROPERTYGET => !put && flags & DISPATCH_PROPERTYGET != 0,
                    _ => !put && flags & DISPATCH_METHOD != 0,
                }
        });
        if let Some(func) = func {
            let kind = match func.invkind {
                INVOKE_FUNC => CallKind::Method,
                INVOKE_PROPERTYGET => CallKind::Get,
                _ => CallKind::Put,
            };
            return Some(Member {
                name: func.name.clone(),
                params: func.visible_params().map(|p| p.ty.clone()).collect(),
                optional: func.optional_count(),
                kind,
            });
        }

        let var = self.vars.iter().find(|v| v.memid == dispid)?;
        let name = var.name.clone()?;
        if put {
            (var.flags & VARFLAG_FREADONLY == 0).then(|| Member {
                name,
                params: vec![var.ty.clone()],
                optional: 0,
                kind: CallKind::Put,
            })
        } else {
            Some(Member {
                name,
                params: Vec::new(),
                optional: 0,
                kind: CallKind::Get,
            })
        }
    }

    fn param_names(&self, member: &str) -> Vec<String> {
        self.funcs
            .iter()
            .find(|f| f.name.eq_ignore_ascii_case(member))
            .map(|f| f.visible_params().map(|p| p.name.clone()).collect())
            .unwrap_or_default()
    }
}

impl Drop for AutomationObject {
    fn drop(&mut self) {
        self.hub.set_container(std::ptr::null_mut());
    }
}

unsafe impl ComObject for AutomationObject {
    fn ref_count(&self) -> &ComRefCount {
        &self.ref_count
    }

    fn interface(&self, riid: &GUID) -> Option<*mut c_void> {
        if *riid == IID_IUNKNOWN || *riid == IID_IDISPATCH {
            return Some(interface_ptr(&self.vtable_i_dispatch));
        }
        if *riid == self.lib.types[self.interface_index].guid {
            return Some(interface_ptr(&self.vtable_i_dispatch));
        }
        if *riid == IID_IPROVIDECLASSINFO && self.class_info_enabled.get() {
            return Some(interface_ptr(&self.vtable_i_provide_class_info));
        }
        if *riid == IID_ICONNECTIONPOINTCONTAINER && self.connectable.get() {
            return Some(interface_ptr(&self.vtable_i_connection_point_container));
        }
        None
    }
}

#[com_implement(IDispatch)]
impl AutomationObject {
    fn get_type_info_count(&self, pctinfo: *mut u32) -> HRESULT {
        if pctinfo.is_null() {
            return E_POINTER;
        }
        unsafe { *pctinfo = 1 };
        S_OK
    }

    fn get_type_info(&self, itinfo: u32, lcid: LCID, pptinfo: *mut *mut ITypeInfo) -> HRESULT {
        let _ = lcid;
        if pptinfo.is_null() {
            return E_POINTER;
        }
        unsafe { *pptinfo = std::ptr::null_mut() };
        if itinfo != 0 {
            return DISP_E_BADINDEX;
        }
        match TypeInfoObject::create(self.lib.clone(), self.interface_index) {
            Some(info) => {
                unsafe { *pptinfo = info.into_raw() };
                S_OK
            }
            None => E_OUTOFMEMORY,
        }
    }

    fn get_ids_of_names(
        &self,
        riid: *const GUID,
        names: *const *const u16,
        cnames: u32,
        lcid: LCID,
        dispids: *mut DISPID,
    ) -> HRESULT {
        let _ = lcid;
        if !riid.is_null() && unsafe { *riid } != IID_NULL {
            return DISP_E_UNKNOWNINTERFACE;
        }
        if names.is_null() || dispids.is_null() || cnames == 0 {
            return E_INVALIDARG;
        }
        let requested: Vec<String> = (0..cnames as usize)
            .map(|i| unsafe { wide_to_string(*names.add(i)) })
            .collect();
        for i in 0..cnames as usize {
            unsafe { *dispids.add(i) = DISPID_UNKNOWN };
        }
        let Some(dispid) = self.dispid_of(&requested[0]) else {
            return DISP_E_UNKNOWNNAME;
        };
        unsafe { *dispids = dispid };

        let params = self.param_names(&requested[0]);
        let mut result = S_OK;
        for (i, wanted) in requested.iter().enumerate().skip(1) {
            match params.iter().position(|p| p.eq_ignore_ascii_case(wanted)) {
                Some(position) => unsafe { *dispids.add(i) = position as DISPID },
                None => result = DISP_E_UNKNOWNNAME,
            }
        }
        result
    }

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
    ) -> HRESULT {
        let _ = lcid;
        if !riid.is_null() && unsafe { *riid } != IID_NULL {
            return DISP_E_UNKNOWNINTERFACE;
        }
        let Some(params) = (unsafe { params.as_ref() }) else {
            return E_POINTER;
        };
        let Some(member) = self.resolve(dispid, flags) else {
            return DISP_E_MEMBERNOTFOUND;
        };

        if member.kind == CallKind::Put {
            let named_put = params.c_named_args == 1
                && !params.rgdispid_named_args.is_null()
                && unsafe { *params.rgdispid_named_args } == DISPID_PROPERTYPUT;
            if !named_put {
                return DISP_E_PARAMNOTOPTIONAL;
            }
        } else if params.c_named_args > 0 {
            return DISP_E_NONAMEDARGS;
        }

        let supplied = params.c_args as usize;
        let declared = member.params.len();
        if supplied > declared || supplied < declared - member.optional {
            return DISP_E_BADPARAMCOUNT;
        }
        if supplied > 0 && params.rgvarg.is_null() {
            return E_POINTER;
        }

        let args: Vec<*mut VARIANT> = (0..declared)
            .map(|i| {
                if i < supplied {
                    unsafe { params.rgvarg.add(supplied - 1 - i) }
                } else {
                    std::ptr::null_mut()
                }
            })
            .collect();

        let mut call = DispatchCall {
            member: &member.name,
            kind: member.kind,
            dispid,
            params: &member.params,
            args,
            supplied,
            result,
            excepinfo,
            argerr,
            events: &self.hub,
        };

        let required = declared - member.optional;
        if let Some(missing) = (0..required).find(|&i| call.is_missing(i)) {
            unsafe { write_out(argerr, (supplied - 1 - missing) as u32) };
            return DISP_E_PARAMNOTOPTIONAL;
        }

        match self.handler.invoke(&mut call) {
            Ok(()) => S_OK,
            Err(hr) => hr,
        }
    }
}

#[com_implement(IProvideClassInfo)]
impl AutomationObject {
    fn get_class_info(&self, pptinfo: *mut *mut ITypeInfo) -> HRESULT {
        if pptinfo.is_null() {
            return E_POINTER;
        }
        unsafe { *pptinfo = std::ptr::null_mut() };
        match TypeInfoObject::create(self.lib.clone(), self.class_index) {
            Some(info) => {
                unsafe { *pptinfo = info.into_raw() };
                S_OK
            }
            None => E_OUTOFMEMORY,
        }
    }
}

#[com_implement(IConnectionPointContainer)]
impl AutomationObject {
    fn enum_connection_points(&self, ppenum: *mut *mut IEnumConnectionPoints) -> HRESULT {
        if ppenum.is_null() {
            return E_POINTER;
        }
        match ConnectionPointEnum::create(self.hub.clone(), 0) {
            Some(points) => {
                unsafe { *ppenum = points.into_raw() };
                S_OK
            }
            None => E_OUTOFMEMORY,
        }
    }

    fn find_connection_point(&self, riid: *const GUID, ppcp: *mut *mut IConnectionPoint) -> HRESULT {
        if riid.is_null() || ppcp.is_null() {
            return E_POINTER;
        }
        unsafe { *ppcp = std::ptr::null_mut() };
        let iid = unsafe { *riid };
        if !self.hub.offers(&iid) {
            return CONNECT_E_NOCONNECTION;
        }
        match ConnectionPoint::create(self.hub.clone(), iid) {
            Some(point) => {
                unsafe { *ppcp = point.into_raw() };
                S_OK
            }
            None => E_OUTOFMEMORY,
        }
    }
}
