//! Event sink
//!
//! One [`EventSink`] is advised per outgoing interface of a wrapped object.
//! Event calls arrive through `IDispatch::Invoke` and property notifications
//! through `IPropertyNotifySink`; both are re-emitted as the wrapper's
//! signals.
//!
//! The sink holds the wrapper weakly. A sink is advised until
//! [`EventSink::unadvise`], which the wrapper calls before it lets go of the
//! object.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::ffi::c_void;
use std::rc::Weak;
use std::sync::Arc;

use axcom::proc::com_implement;
use axcom::*;

use crate::codec::{from_com_variant, write_com_variant};
use crate::meta::{ConnectionInfo, GENERIC_SIGNAL, MetaObject, PROPERTY_CHANGED_SIGNAL};
use crate::signals::RawEvent;
use crate::value::Value;

/// The wrapper side of an event sink
pub trait EventTarget {
    fn has_listeners(&self, signature: &str) -> bool;
    fn emit(&self, signature: &str, args: &mut [Value]);
    fn emit_raw(&self, event: &RawEvent<'_>);
    /// Current value of property `name`, for change signals
    fn read_property(&self, name: &str) -> Value;
    /// Whether property `name` may currently change
    fn is_writable(&self, name: &str) -> bool;
    /// Name of a member not known when the sink was created
    fn member_name(&self, dispid: DISPID) -> Option<String>;
}

struct Advised {
    point: ComPtr<IConnectionPoint>,
    cookie: u32,
}

#[repr(C)]
pub struct EventSink {
    vtable_i_dispatch: *const IDispatchVTable,
    vtable_i_property_notify_sink: *const IPropertyNotifySinkVTable,
    ref_count: ComRefCount,
    iid: GUID,
    meta: Arc<MetaObject>,
    /// Event DISPID to signal signature
    signals: BTreeMap<DISPID, String>,
    /// Bindable property DISPID to change signal
    prop_signals: BTreeMap<DISPID, String>,
    /// Property names, completed from the object as notifications arrive
    props: RefCell<BTreeMap<DISPID, String>>,
    target: Weak<dyn EventTarget>,
    advised: RefCell<Option<Advised>>,
}

impl EventSink {
    /// Create a sink for `info` and advise it on `point`.
    pub fn connect(
        target: Weak<dyn EventTarget>,
        meta: Arc<MetaObject>,
        info: &ConnectionInfo,
        point: ComPtr<IConnectionPoint>,
    ) -> Result<ComBox<EventSink>, HRESULT> {
        let sink = ComBox::new(EventSink {
            vtable_i_dispatch: Self::VTABLE_I_DISPATCH,
            vtable_i_property_notify_sink: Self::VTABLE_I_PROPERTY_NOTIFY_SINK,
            ref_count: ComRefCount::new(),
            iid: info.iid,
            meta,
            signals: info.signals.clone(),
            prop_signals: info.prop_signals.clone(),
            props: RefCell::new(info.props.clone()),
            target,
            advised: RefCell::new(None),
        });
        let unknown = sink.query::<IUnknown>().ok_or(E_NOINTERFACE)?;
        let mut cookie = 0;
        let hr = unsafe { point.advise(unknown.as_raw(), &mut cookie) };
        if failed(hr) {
            log::debug!("advise on {} failed: {hr:#010x}", info.iid);
            return Err(hr);
        }
        *sink.advised.borrow_mut() = Some(Advised { point, cookie });
        Ok(sink)
    }

    /// The outgoing interface this sink is advised on
    pub fn iid(&self) -> GUID {
        self.iid
    }

    pub fn is_advised(&self) -> bool {
        self.advised.borrow().is_some()
    }

    /// Cookie of the current connection
    pub fn cookie(&self) -> Option<u32> {
        self.advised.borrow().as_ref().map(|advised| advised.cookie)
    }

    /// Disconnect from the connection point. Calling it again does nothing.
    pub fn unadvise(&self) {
        let Some(advised) = self.advised.borrow_mut().take() else {
            return;
        };
        let hr = unsafe { advised.point.unadvise(advised.cookie) };
        if failed(hr) {
            log::warn!("unadvise of {} failed: {hr:#010x}", self.iid);
        }
    }

    fn property_name(&self, dispid: DISPID, target: &dyn EventTarget) -> Option<String> {
        if let Some(name) = self.props.borrow().get(&dispid) {
            return Some(name.clone());
        }
        let name = target.member_name(dispid)?;
        self.props.borrow_mut().insert(dispid, name.clone());
        Some(name)
    }

    fn dispatch_event(&self, target: &dyn EventTarget, dispid: DISPID, args: &[VARIANT]) -> HRESULT {
        let Some(signature) = self.signals.get(&dispid) else {
            return DISP_E_MEMBERNOTFOUND;
        };
        let name = signature
            .split_once('(')
            .map_or(signature.as_str(), |(name, _)| name);

        if target.has_listeners(GENERIC_SIGNAL) {
            target.emit_raw(&RawEvent { name, dispid, args });
        }
        if !target.has_listeners(signature) {
            return S_OK;
        }
        let Some(method) = self.meta.signal(signature) else {
            return S_OK;
        };

        // rgvarg holds the last declared argument first
        let position = |i: usize| args.len().checked_sub(i + 1);
        let types = &method.parameter_types;
        let mut values: Vec<Value> = (0..types.len())
            .map(|i| match position(i) {
                Some(j) => from_com_variant(&args[j], &types[i], None),
                None => Value::Invalid,
            })
            .collect();
        target.emit(signature, &mut values);

        for (i, value) in values.iter().enumerate() {
            let Some(j) = position(i) else {
                break;
            };
            if !method.is_output(i) || !args[j].is_byref() {
                continue;
            }
            if let Err(err) = write_com_variant(value, &args[j], &types[i]) {
                log::warn!("{signature}: argument {i} not written back: {err}");
            }
        }
        S_OK
    }
}

unsafe impl ComObject for EventSink {
    fn ref_count(&self) -> &ComRefCount {
        &self.ref_count
    }

    fn interface(&self, riid: &GUID) -> Option<*mut c_void> {
        if *riid == IID_IPROPERTYNOTIFYSINK {
            return Some(interface_ptr(&self.vtable_i_property_notify_sink));
        }
        if *riid == IID_IUNKNOWN || *riid == IID_IDISPATCH || *riid == self.iid {
            return Some(interface_ptr(&self.vtable_i_dispatch));
        }
        None
    }
}

#[com_implement(IDispatch)]
impl EventSink {
    fn get_type_info_count(&self, pctinfo: *mut u32) -> HRESULT {
        if pctinfo.is_null() {
            return E_POINTER;
        }
        unsafe { *pctinfo = 0 };
        S_OK
    }

    fn get_type_info(&self, itinfo: u32, lcid: LCID, pptinfo: *mut *mut ITypeInfo) -> HRESULT {
        let _ = (itinfo, lcid);
        if !pptinfo.is_null() {
            unsafe { *pptinfo = std::ptr::null_mut() };
        }
        E_NOTIMPL
    }

    fn get_ids_of_names(
        &self,
        riid: *const GUID,
        names: *const *const u16,
        cnames: u32,
        lcid: LCID,
        dispids: *mut DISPID,
    ) -> HRESULT {
        let _ = (riid, names, cnames, lcid, dispids);
        E_NOTIMPL
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
        let _ = (lcid, flags, result, excepinfo, argerr);
        if !riid.is_null() && unsafe { *riid } != IID_NULL {
            return DISP_E_UNKNOWNINTERFACE;
        }
        let Some(target) = self.target.upgrade() else {
            return S_OK;
        };
        let args: &[VARIANT] = match unsafe { params.as_ref() } {
            Some(params) if !params.rgvarg.is_null() && params.c_args > 0 => unsafe {
                std::slice::from_raw_parts(params.rgvarg, params.c_args as usize)
            },
            _ => &[],
        };
        self.dispatch_event(target.as_ref(), dispid, args)
    }
}

#[com_implement(IPropertyNotifySink)]
impl EventSink {
    fn on_changed(&self, dispid: DISPID) -> HRESULT {
        let Some(target) = self.target.upgrade() else {
            return S_OK;
        };
        let Some(name) = self.property_name(dispid, target.as_ref()) else {
            log::debug!("change notification for unknown DISPID {dispid}");
            return S_OK;
        };
        target.emit(PROPERTY_CHANGED_SIGNAL, &mut [Value::String(name.clone())]);
        if let Some(signal) = self.prop_signals.get(&dispid) {
            if target.has_listeners(signal) {
                let value = target.read_property(&name);
                target.emit(signal, &mut [value]);
            }
        }
        S_OK
    }

    fn on_request_edit(&self, dispid: DISPID) -> HRESULT {
        let Some(target) = self.target.upgrade() else {
            return S_OK;
        };
        match self.property_name(dispid, target.as_ref()) {
            Some(name) if !target.is_writable(&name) => S_FALSE,
            _ => S_OK,
        }
    }
}
