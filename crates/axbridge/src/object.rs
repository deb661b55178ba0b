//! The host wrapper
//!
//! An [`AxObject`] owns one automation object. It generates (or fetches)
//! the object's metadata, advises an [`EventSink`] on each outgoing
//! interface and turns property access, slot calls and events into
//! [`Value`]s.
//!
//! Sinks are unadvised before the object reference is released, both in
//! [`AxObject::clear`] and when the last handle to the wrapper is dropped.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};
use std::str::FromStr;
use std::sync::Arc;

use axcom::*;

use crate::docs;
use crate::error::{AxError, ExceptionInfo, Result};
use crate::generator::{GenerationSource, base_meta_object, find_connection_point, generate};
use crate::introspect::member_names;
use crate::invoke::{DispidCache, invoke, prepare_call};
use crate::meta::{CONTROL_PROPERTY, EXCEPTION_SIGNAL, GENERIC_SIGNAL, MetaObject, normalize_signature};
use crate::services::{AxServices, GenerationOptions};
use crate::signals::{ConnectionId, RawEvent, SignalHub};
use crate::sink::{EventSink, EventTarget};
use crate::value::{Handle, Value};

#[derive(Default)]
struct State {
    control: String,
    unknown: Option<ComPtr<IUnknown>>,
    dispatch: Option<ComPtr<IDispatch>>,
    meta: Option<Arc<MetaObject>>,
    sinks: Vec<ComBox<EventSink>>,
}

struct AxShared {
    services: AxServices,
    hub: SignalHub,
    dispids: DispidCache,
    writable: RefCell<HashMap<String, bool>>,
    no_meta_object: Cell<bool>,
    no_event_sink: Cell<bool>,
    no_class_info: Cell<bool>,
    state: RefCell<State>,
}

impl AxShared {
    fn options(&self) -> GenerationOptions {
        let mut options = self.services.options;
        if self.no_event_sink.get() {
            options.remove(GenerationOptions::EVENT_SINK);
        }
        if self.no_class_info.get() {
            options.remove(GenerationOptions::CLASS_INFO);
        }
        options
    }

    fn dispatch(&self) -> Result<ComPtr<IDispatch>> {
        let state = self.state.borrow();
        if state.unknown.is_none() {
            return Err(AxError::NotInitialized);
        }
        state.dispatch.clone().ok_or(AxError::NoAutomation)
    }

    fn meta_object(&self) -> Arc<MetaObject> {
        if let Some(meta) = &self.state.borrow().meta {
            return meta.clone();
        }
        Arc::new(base_meta_object())
    }

    fn control(&self) -> String {
        self.state.borrow().control.clone()
    }

    /// Unadvise every sink, then let go of the object.
    fn release(&self) {
        let sinks = std::mem::take(&mut self.state.borrow_mut().sinks);
        for sink in &sinks {
            sink.unadvise();
        }
        drop(sinks);
        let old = std::mem::take(&mut *self.state.borrow_mut());
        self.dispids.clear();
        drop(old);
    }

    fn report_exception(&self, member: &str, info: &ExceptionInfo) {
        if self.hub.has_listeners(EXCEPTION_SIGNAL) {
            let mut args = [
                Value::Int(info.code),
                Value::String(info.source.clone()),
                Value::String(info.description.clone()),
                Value::String(info.help.clone()),
            ];
            self.hub.emit(EXCEPTION_SIGNAL, &mut args);
        } else {
            log::warn!(
                "{member}: unhandled exception, code {} from '{}': {}",
                info.code,
                info.source,
                info.description
            );
        }
    }

    fn dynamic_call(&self, function: &str, args: &mut Vec<Value>) -> Result<Value> {
        if function == CONTROL_PROPERTY {
            return Ok(Value::String(self.control()));
        }
        let dispatch = self.dispatch()?;
        let meta = self.meta_object();
        let request = prepare_call(&meta, function, args);
        let result = invoke(&dispatch, &self.dispids, &request, args);
        if let Err(AxError::Exception { member, info }) = &result {
            self.report_exception(member, info);
        }
        result
    }

    fn property(&self, name: &str) -> Result<Value> {
        self.dynamic_call(name, &mut Vec::new())
            .map_err(|err| match err {
                AxError::MemberNotFound { .. } => AxError::NoSuchProperty {
                    name: name.to_string(),
                },
                other => other,
            })
    }

    fn property_writable(&self, name: &str) -> bool {
        if let Some(writable) = self.writable.borrow().get(name) {
            return *writable;
        }
        self.meta_object()
            .property(name)
            .is_none_or(|property| property.is_writable())
    }
}

impl EventTarget for AxShared {
    fn has_listeners(&self, signature: &str) -> bool {
        self.hub.has_listeners(signature)
    }

    fn emit(&self, signature: &str, args: &mut [Value]) {
        self.hub.emit(signature, args);
    }

    fn emit_raw(&self, event: &RawEvent<'_>) {
        self.hub.emit_raw(event);
    }

    fn read_property(&self, name: &str) -> Value {
        match self.property(name) {
            Ok(value) => value,
            Err(err) => {
                log::warn!("reading changed property: {err}");
                Value::Invalid
            }
        }
    }

    fn is_writable(&self, name: &str) -> bool {
        self.property_writable(name)
    }

    fn member_name(&self, dispid: DISPID) -> Option<String> {
        let dispatch = self.state.borrow().dispatch.clone()?;
        let mut info = std::ptr::null_mut();
        let hr = unsafe { dispatch.get_type_info(0, LOCALE_USER_DEFAULT, &mut info) };
        if failed(hr) {
            return None;
        }
        let info = unsafe { ComPtr::from_raw(info) }?;
        member_names(&info, dispid, 1)?.into_iter().next()
    }
}

impl Drop for AxShared {
    fn drop(&mut self) {
        self.release();
    }
}

/// A late-bound automation object.
///
/// Cloning gives another handle to the same wrapper. Wrappers belong to the
/// thread that created them.
#[derive(Clone)]
pub struct AxObject {
    shared: Rc<AxShared>,
}

impl AxObject {
    /// An empty wrapper; give it an object with [`AxObject::set_control`].
    #[must_use]
    pub fn new(services: AxServices) -> Self {
        Self {
            shared: Rc::new(AxShared {
                services,
                hub: SignalHub::new(),
                dispids: DispidCache::new(),
                writable: RefCell::new(HashMap::new()),
                no_meta_object: Cell::new(false),
                no_event_sink: Cell::new(false),
                no_class_info: Cell::new(false),
                state: RefCell::new(State::default()),
            }),
        }
    }

    /// Wrap an existing object.
    #[must_use]
    pub fn from_unknown(unknown: ComPtr<IUnknown>, services: AxServices) -> Self {
        let object = Self::new(services);
        object.attach(unknown, String::new(), None);
        object
    }

    #[must_use]
    pub fn from_dispatch(dispatch: ComPtr<IDispatch>, services: AxServices) -> Self {
        match dispatch.cast::<IUnknown>() {
            Ok(unknown) => Self::from_unknown(unknown, services),
            Err(hr) => {
                log::warn!("IDispatch without IUnknown: {hr:#010x}");
                Self::new(services)
            }
        }
    }

    /// Create the object named by `control` and wrap it, releasing the
    /// current one.
    ///
    /// `control` is a class id, with or without braces, or a program id
    /// registered in the services' registry. The class id becomes the
    /// wrapper's control string. Setting the current control again, by any
    /// of its names, does nothing.
    pub fn set_control(&self, control: &str) -> Result<()> {
        let control = control.trim();
        let clsid = self.resolve_class(control)?;
        let braced = clsid.to_braced_string();
        {
            let state = self.shared.state.borrow();
            if state.unknown.is_some() && state.control.eq_ignore_ascii_case(&braced) {
                return Ok(());
            }
        }
        self.clear();
        let unknown = self
            .shared
            .services
            .factory
            .create(&clsid)
            .map_err(|hr| AxError::CreateFailed {
                control: control.to_string(),
                hr,
            })?;
        self.attach(unknown, braced, Some(clsid));
        Ok(())
    }

    fn resolve_class(&self, control: &str) -> Result<GUID> {
        if let Ok(clsid) = GUID::from_str(control) {
            return Ok(clsid);
        }
        self.shared
            .services
            .registry
            .lookup(&format!("{control}/CLSID/Default"))
            .and_then(|clsid| GUID::from_str(&clsid).ok())
            .ok_or_else(|| AxError::InvalidControl {
                control: control.to_string(),
            })
    }

    fn attach(&self, unknown: ComPtr<IUnknown>, control: String, clsid: Option<GUID>) {
        let dispatch = unknown.cast::<IDispatch>().ok();
        let meta = if self.shared.no_meta_object.get() {
            Arc::new(base_meta_object())
        } else {
            let source = GenerationSource {
                object: &unknown,
                dispatch: dispatch.as_ref(),
                control: clsid,
            };
            generate(&source, &self.shared.services, self.shared.options())
        };

        {
            let mut state = self.shared.state.borrow_mut();
            state.control = control;
            state.unknown = Some(unknown.clone());
            state.dispatch = dispatch;
            state.meta = Some(meta.clone());
        }
        if !self.shared.no_event_sink.get() {
            self.advise_sinks(&unknown, &meta);
        }
    }

    fn advise_sinks(&self, unknown: &ComPtr<IUnknown>, meta: &Arc<MetaObject>) {
        if meta.connections.is_empty() {
            return;
        }
        let Ok(container) = unknown.cast::<IConnectionPointContainer>() else {
            log::debug!("{} has connections but no connection points", meta.class_name);
            return;
        };
        let target: Weak<dyn EventTarget> = Rc::downgrade(&self.shared) as Weak<dyn EventTarget>;
        let mut sinks = Vec::new();
        for info in &meta.connections {
            let Some(point) = find_connection_point(&container, &info.iid) else {
                continue;
            };
            match EventSink::connect(target.clone(), meta.clone(), info, point) {
                Ok(sink) => sinks.push(sink),
                Err(hr) => log::warn!("{}: cannot advise {}: {hr:#010x}", meta.class_name, info.iid),
            }
        }
        self.shared.state.borrow_mut().sinks = sinks;
    }

    /// Disconnect every event sink and release the object. Signal
    /// connections stay.
    pub fn clear(&self) {
        self.shared.release();
    }

    #[must_use]
    pub fn is_null(&self) -> bool {
        self.shared.state.borrow().unknown.is_none()
    }

    /// The class id the object was created from, braced; empty for wrapped
    /// objects.
    #[must_use]
    pub fn control(&self) -> String {
        self.shared.control()
    }

    /// Skip metadata generation; only the synthetic members are known.
    /// Takes effect with the next object.
    pub fn disable_meta_object(&self, disable: bool) {
        self.shared.no_meta_object.set(disable);
    }

    /// Do not advise event sinks. Takes effect with the next object.
    pub fn disable_event_sink(&self, disable: bool) {
        self.shared.no_event_sink.set(disable);
    }

    /// Skip class information. Takes effect with the next object.
    pub fn disable_class_info(&self, disable: bool) {
        self.shared.no_class_info.set(disable);
    }

    /// Event interfaces with an advised sink
    #[must_use]
    pub fn connected_interfaces(&self) -> Vec<GUID> {
        self.shared
            .state
            .borrow()
            .sinks
            .iter()
            .filter(|sink| sink.is_advised())
            .map(|sink| sink.iid())
            .collect()
    }

    #[must_use]
    pub fn meta_object(&self) -> Arc<MetaObject> {
        self.shared.meta_object()
    }

    /// Call a method or access a property by name.
    ///
    /// `function` with parentheses calls a method, `Name(type, ...)` or
    /// `Name(1, "text")` with the arguments written inline. Without
    /// parentheses it reads a property, or writes it when one argument is
    /// given. By-reference arguments are updated in `args`.
    pub fn dynamic_call(&self, function: &str, args: &mut Vec<Value>) -> Result<Value> {
        self.shared.dynamic_call(function, args)
    }

    /// Read property `name`.
    pub fn property(&self, name: &str) -> Result<Value> {
        self.shared.property(name)
    }

    /// Write property `name`, unless it is read-only or marked not writable.
    pub fn set_property(&self, name: &str, value: Value) -> Result<()> {
        if name == CONTROL_PROPERTY {
            let control = value.as_str().map(str::to_string).unwrap_or_default();
            return self.set_control(&control);
        }
        if !self.shared.property_writable(name) {
            return Err(AxError::PropertyNotWritable {
                name: name.to_string(),
            });
        }
        self.shared
            .dynamic_call(name, &mut vec![value])
            .map(|_| ())
            .map_err(|err| match err {
                AxError::MemberNotFound { .. } => AxError::NoSuchProperty {
                    name: name.to_string(),
                },
                other => other,
            })
    }

    /// Call slot `signature`, which must be one of the generated slots.
    pub fn invoke_slot(&self, signature: &str, args: &mut Vec<Value>) -> Result<Value> {
        let meta = self.meta_object();
        let Some(slot) = meta.slot(signature) else {
            return Err(AxError::MemberNotFound {
                member: normalize_signature(signature),
            });
        };
        let signature = slot.signature.clone();
        self.shared.dynamic_call(&signature, args)
    }

    /// Call `function` and wrap the object it returns.
    ///
    /// `Ok(None)` when the result is not an object.
    pub fn query_sub_object(&self, function: &str, args: &mut Vec<Value>) -> Result<Option<AxObject>> {
        let result = self.shared.dynamic_call(function, args)?;
        let Value::UserType { handle, .. } = result else {
            log::debug!("{function} returned {}, not an object", result.type_name());
            return Ok(None);
        };
        let services = self.shared.services.clone();
        let object = match handle {
            Handle::Dispatch(dispatch) => AxObject::from_dispatch(dispatch, services),
            Handle::Unknown(unknown) => AxObject::from_unknown(unknown, services),
        };
        Ok(Some(object))
    }

    /// Query the wrapped object for interface `I`.
    pub fn query_interface<I: ComInterface>(&self) -> Result<ComPtr<I>> {
        let unknown = self
            .shared
            .state
            .borrow()
            .unknown
            .clone()
            .ok_or(AxError::NotInitialized)?;
        unknown.cast::<I>().map_err(|hr| AxError::Com {
            member: "QueryInterface".to_string(),
            hr,
        })
    }

    /// Listen to signal `signature`. The listener may assign by-reference
    /// arguments. The generic event signal is only available through
    /// [`connect_generic`](Self::connect_generic).
    pub fn connect<F>(&self, signature: &str, slot: F) -> Result<ConnectionId>
    where
        F: Fn(&mut [Value]) + 'static,
    {
        let signature = normalize_signature(signature);
        if signature == GENERIC_SIGNAL {
            return Err(AxError::RawSignal { signature });
        }
        if self.meta_object().signal(&signature).is_none() {
            return Err(AxError::NoSuchSignal { signature });
        }
        Ok(self.shared.hub.connect(&signature, Rc::new(slot)))
    }

    /// Listen to every event, undecoded.
    pub fn connect_generic<F>(&self, slot: F) -> ConnectionId
    where
        F: Fn(&RawEvent<'_>) + 'static,
    {
        self.shared.hub.connect_raw(Rc::new(slot))
    }

    pub fn disconnect(&self, id: ConnectionId) -> bool {
        self.shared.hub.disconnect(id)
    }

    /// Whether `name` may change: the override if one is set, otherwise the
    /// property's own flag.
    #[must_use]
    pub fn property_writable(&self, name: &str) -> bool {
        self.shared.property_writable(name)
    }

    /// Override whether `name` may change. Edit requests from the object
    /// are refused while it is `false`.
    pub fn set_property_writable(&self, name: &str, writable: bool) {
        self.shared
            .writable
            .borrow_mut()
            .insert(name.to_string(), writable);
    }

    /// HTML reference of the wrapped object's members.
    #[must_use]
    pub fn generate_documentation(&self) -> String {
        docs::render(&self.meta_object(), &self.control())
    }
}

impl fmt::Debug for AxObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.shared.state.borrow();
        f.debug_struct("AxObject")
            .field("control", &state.control)
            .field("null", &state.unknown.is_none())
            .field("sinks", &state.sinks.len())
            .field("signals", &self.shared.hub)
            .finish()
    }
}
