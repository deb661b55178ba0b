//! Metadata generation
//!
//! [`generate`] reads class information, enums, the interface chain and the
//! outgoing interfaces of a live object into a [`MetaObject`], and shares it
//! through the [`MetaObjectCache`](crate::MetaObjectCache) under the class id
//! (or, lacking class information, the dispatch interface id) plus the
//! generation options.
//!
//! Metadata is shared, connections are not: the wrapper advises its own
//! sinks on every [`ConnectionInfo`](crate::meta::ConnectionInfo) whether
//! the metadata was generated or came from the cache.

use std::ptr::null_mut;
use std::sync::Arc;

use axcom::*;

use crate::cache::CacheKey;
use crate::introspect::{
    EventInterface, Introspector, TypeAttr, containing_library, implemented_type,
    library_documentation, library_guid, read_enums, type_guid, type_info_of_guid, type_name,
};
use crate::meta::{
    CONTROL_PROPERTY, EXCEPTION_SIGNAL, GENERIC_SIGNAL, MetaBuilder, MetaObject,
    PROPERTY_CHANGED_SIGNAL, PropertyFlags,
};
use crate::services::{AxServices, GenerationOptions};

const DEFAULT_CLASS_NAME: &str = "AxObject";

/// What the generator reads from a live object
pub struct GenerationSource<'a> {
    pub object: &'a ComPtr<IUnknown>,
    pub dispatch: Option<&'a ComPtr<IDispatch>>,
    /// The class id the object was created from, if any
    pub control: Option<GUID>,
}

/// Members every wrapper has, whatever the object
pub fn add_synthetic_members(builder: &mut MetaBuilder) {
    builder.add_signal(
        GENERIC_SIGNAL,
        vec!["string".into(), "int".into(), "void*".into()],
        vec!["name".into(), "argc".into(), "argv".into()],
    );
    builder.add_signal(
        EXCEPTION_SIGNAL,
        vec!["int".into(), "string".into(), "string".into(), "string".into()],
        vec!["code".into(), "source".into(), "desc".into(), "help".into()],
    );
    builder.add_signal(
        PROPERTY_CHANGED_SIGNAL,
        vec!["string".into()],
        vec!["name".into()],
    );
    builder.add_property(
        "string",
        CONTROL_PROPERTY,
        PropertyFlags::READABLE
            | PropertyFlags::WRITABLE
            | PropertyFlags::DESIGNABLE
            | PropertyFlags::SCRIPTABLE
            | PropertyFlags::STORED,
    );
}

/// Metadata of a wrapper without type information: the synthetic members.
#[must_use]
pub fn base_meta_object() -> MetaObject {
    let mut builder = MetaBuilder::new(DEFAULT_CLASS_NAME);
    add_synthetic_members(&mut builder);
    builder.build()
}

/// The type information found for an object
struct ClassTypes {
    class_info: Option<ComPtr<ITypeInfo>>,
    disp_info: Option<ComPtr<ITypeInfo>>,
    library: Option<ComPtr<ITypeLib>>,
}

fn provided_class_info(object: &ComPtr<IUnknown>) -> Option<ComPtr<ITypeInfo>> {
    let provider = object.cast::<IProvideClassInfo>().ok()?;
    let mut info = null_mut();
    let hr = unsafe { provider.get_class_info(&mut info) };
    if failed(hr) {
        log::debug!("GetClassInfo failed: {hr:#010x}");
        return None;
    }
    unsafe { ComPtr::from_raw(info) }
}

fn dispatch_type_info(dispatch: &IDispatch) -> Option<ComPtr<ITypeInfo>> {
    let mut info = null_mut();
    let hr = unsafe { dispatch.get_type_info(0, LOCALE_USER_DEFAULT, &mut info) };
    if failed(hr) {
        log::debug!("GetTypeInfo failed: {hr:#010x}");
        return None;
    }
    unsafe { ComPtr::from_raw(info) }
}

/// First incoming dispinterface of a coclass
fn default_dispinterface(class_info: &ITypeInfo) -> Option<ComPtr<ITypeInfo>> {
    let count = TypeAttr::get(class_info)?.c_impl_types;
    (0..u32::from(count))
        .filter_map(|index| implemented_type(class_info, index))
        .filter(|(_, flags)| flags & IMPLTYPEFLAG_FSOURCE == 0)
        .map(|(info, _)| info)
        .find(|info| TypeAttr::get(info).is_some_and(|attr| attr.typekind == TKIND_DISPATCH))
}

fn find_class_types(source: &GenerationSource<'_>) -> ClassTypes {
    let mut class_info = provided_class_info(source.object);
    let mut disp_info = source.dispatch.and_then(|dispatch| dispatch_type_info(dispatch));
    let library = disp_info
        .as_ref()
        .or(class_info.as_ref())
        .and_then(|info| containing_library(info))
        .map(|(lib, _)| lib);

    if class_info.is_none() {
        if let (Some(lib), Some(control)) = (&library, &source.control) {
            class_info = type_info_of_guid(lib, control)
                .filter(|info| TypeAttr::get(info).is_some_and(|attr| attr.typekind == TKIND_COCLASS));
        }
    }
    if disp_info.is_none() {
        disp_info = class_info.as_deref().and_then(default_dispinterface);
    }
    ClassTypes {
        class_info,
        disp_info,
        library,
    }
}

/// Outgoing interfaces a connection point container offers, in enumeration
/// order. Enumeration stops at the first repeated interface.
fn enumerate_connection_interfaces(container: &IConnectionPointContainer) -> Option<Vec<GUID>> {
    let mut raw = null_mut();
    if failed(unsafe { container.enum_connection_points(&mut raw) }) {
        return None;
    }
    let enumerator = unsafe { ComPtr::from_raw(raw) }?;
    unsafe { enumerator.reset() };

    let mut iids = Vec::new();
    loop {
        let mut point = null_mut();
        let mut fetched = 0;
        let hr = unsafe { enumerator.next(1, &mut point, &mut fetched) };
        if hr != S_OK || fetched == 0 {
            break;
        }
        let Some(point) = (unsafe { ComPtr::from_raw(point) }) else {
            break;
        };
        let mut iid = GUID::ZERO;
        if failed(unsafe { point.get_connection_interface(&mut iid) }) {
            continue;
        }
        if iids.contains(&iid) {
            log::debug!("connection point enumeration repeats {iid}");
            break;
        }
        iids.push(iid);
    }
    Some(iids)
}

pub(crate) fn find_connection_point(
    container: &IConnectionPointContainer,
    iid: &GUID,
) -> Option<ComPtr<IConnectionPoint>> {
    let mut point = null_mut();
    let hr = unsafe { container.find_connection_point(iid, &mut point) };
    if failed(hr) {
        log::debug!("no connection point for {iid}: {hr:#010x}");
        return None;
    }
    unsafe { ComPtr::from_raw(point) }
}

fn register_events(introspector: &mut Introspector<'_>, events: EventInterface) {
    let connection = introspector.builder_mut().connection_mut(events.iid);
    for (dispid, method) in events.events {
        connection.signals.insert(dispid, method.signature);
    }
}

fn read_event_info(
    introspector: &mut Introspector<'_>,
    options: GenerationOptions,
    object: &ComPtr<IUnknown>,
    types: &ClassTypes,
) {
    let Ok(container) = object.cast::<IConnectionPointContainer>() else {
        return;
    };
    match enumerate_connection_interfaces(&container) {
        Some(iids) => {
            for (serial, iid) in iids.iter().enumerate() {
                if options.contains(GenerationOptions::CLASS_INFO) {
                    let value = introspector.uuid_name("Interface", iid);
                    introspector
                        .builder_mut()
                        .add_class_info(&format!("Event Interface {}", serial + 1), &value);
                }
                if *iid == IID_IPROPERTYNOTIFYSINK {
                    continue;
                }
                let Some(info) = types
                    .library
                    .as_ref()
                    .and_then(|lib| type_info_of_guid(lib, iid))
                else {
                    log::debug!("no type information for event interface {iid}");
                    continue;
                };
                if let Some(events) = introspector.read_event_interface(&info) {
                    register_events(introspector, events);
                }
            }
        }
        None => {
            let Some(class_info) = &types.class_info else {
                return;
            };
            for events in introspector.read_event_interfaces(class_info) {
                if find_connection_point(&container, &events.iid).is_some() {
                    register_events(introspector, events);
                }
            }
        }
    }
}

/// Property notification connection for the bindable properties found
fn register_property_notifications(introspector: &mut Introspector<'_>) {
    let notifications = introspector.builder().notifications().clone();
    if notifications.is_empty() {
        return;
    }
    let connection = introspector
        .builder_mut()
        .connection_mut(IID_IPROPERTYNOTIFYSINK);
    for (dispid, (property, signal)) in notifications {
        connection.props.insert(dispid, property);
        connection.prop_signals.insert(dispid, signal);
    }
}

/// Generate (or fetch from the cache) the metadata of `source`.
///
/// Holds the cache's generation lock throughout. Failures while reading
/// type information only leave the affected members out.
pub fn generate(
    source: &GenerationSource<'_>,
    services: &AxServices,
    options: GenerationOptions,
) -> Arc<MetaObject> {
    let cache = &services.cache;
    let _generation = cache.generation_lock();

    let types = find_class_types(source);
    let key = types
        .class_info
        .as_deref()
        .and_then(type_guid)
        .or_else(|| types.disp_info.as_deref().and_then(type_guid))
        .map(|guid| CacheKey::new(guid, options));
    if let Some(meta) = key.as_ref().and_then(|key| cache.get(key)) {
        log::debug!("metadata of {} from cache", meta.class_name);
        return meta;
    }

    let mut introspector = Introspector::new(options, services.registry.as_ref());
    add_synthetic_members(introspector.builder_mut());

    let class_name = types
        .class_info
        .as_deref()
        .and_then(type_name)
        .or_else(|| types.disp_info.as_deref().and_then(type_name))
        .unwrap_or_else(|| DEFAULT_CLASS_NAME.to_string());
    introspector.builder_mut().set_class_name(&class_name);

    if options.contains(GenerationOptions::CLASS_INFO) {
        if let Some(class_info) = &types.class_info {
            if let Some((clsid, major, minor)) = TypeAttr::get(class_info)
                .map(|attr| (attr.guid, attr.w_major_ver_num, attr.w_minor_ver_num))
            {
                let value = introspector.uuid_name("CLSID", &clsid);
                introspector.builder_mut().add_class_info("CoClass", &value);
                if (major, minor) != (0, 0) {
                    introspector
                        .builder_mut()
                        .add_class_info("Version", &format!("{major}.{minor}"));
                }
            }
        }
    }

    if let Some(lib) = &types.library {
        introspector.set_library(&library_documentation(lib, -1).unwrap_or_default());
        let enums = match library_guid(lib) {
            Some(libid) => match cache.enums(&libid) {
                Some(enums) => enums,
                None => cache.insert_enums(libid, read_enums(lib)),
            },
            None => Arc::new(read_enums(lib)),
        };
        introspector.add_enums(&enums);
    }

    if let Some(disp_info) = &types.disp_info {
        introspector.read_interface_chain(disp_info);
    } else {
        log::debug!("{class_name} has no dispatch type information");
    }

    if options.contains(GenerationOptions::EVENT_SINK) {
        read_event_info(&mut introspector, options, source.object, &types);
        register_property_notifications(&mut introspector);
    }

    let meta = introspector.finish();
    match key {
        Some(key) => cache.insert(key, meta),
        None => Arc::new(meta),
    }
}
