//! End-to-end tests: wrappers around in-process automation servers

use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::sync::Arc;

use axbridge::meta::{EXCEPTION_SIGNAL, GENERIC_SIGNAL, PROPERTY_CHANGED_SIGNAL};
use axbridge::{AxError, AxObject, AxServices, Color, FactoryMap, MapRegistry, MetaObjectCache, Value};
use axcom::oleauto::{sys_alloc_string, variant_clear};
use axcom::*;
use axserver::calculator::{self, *};
use axserver::{AutomationObject, DispatchCall, TypeLibBuilder, TypeSpec};

fn services() -> AxServices {
    AxServices::standalone().with_cache(Arc::new(MetaObjectCache::new()))
}

fn wrap(object: &ComBox<AutomationObject>) -> AxObject {
    let unknown = object.query::<IUnknown>().expect("IUnknown");
    AxObject::from_unknown(unknown, services())
}

fn calc() -> (ComBox<AutomationObject>, Rc<CalculatorState>, AxObject) {
    let lib = calculator::library();
    let (object, state) = calculator::create(&lib).expect("calculator");
    let wrapper = wrap(&object);
    (object, state, wrapper)
}

/// Collects the arguments of every emission
fn recorder() -> (Rc<RefCell<Vec<Vec<Value>>>>, impl Fn(&mut [Value]) + 'static) {
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    (seen, move |args: &mut [Value]| sink.borrow_mut().push(args.to_vec()))
}

// =============================================================================
// Test: Methods
// =============================================================================

#[test]
fn test_method_call() {
    let (_object, state, calc) = calc();
    let sum = calc
        .dynamic_call("Add(int,int)", &mut vec![Value::Int(2), Value::Int(3)])
        .unwrap();
    assert_eq!(sum, Value::Int(5));
    assert_eq!(state.calls.get(), 1);

    let about = calc.dynamic_call("About()", &mut Vec::new()).unwrap();
    assert_eq!(about, Value::String("CalcLib sample calculator".into()));
}

#[test]
fn test_inline_arguments() {
    let (_object, _state, calc) = calc();
    let sum = calc.dynamic_call("Add(2, 3)", &mut Vec::new()).unwrap();
    assert_eq!(sum, Value::Int(5));
}

#[test]
fn test_optional_argument_may_be_left_out() {
    let (_object, _state, calc) = calc();
    assert_eq!(
        calc.dynamic_call("Scale(double)", &mut vec![Value::Double(2.5)]).unwrap(),
        Value::Double(2.5)
    );
    assert_eq!(
        calc.dynamic_call("Scale(double,variant)", &mut vec![Value::Double(2.0), Value::Int(3)])
            .unwrap(),
        Value::Double(6.0)
    );
    // Invalid stands for a parameter not supplied
    assert_eq!(
        calc.dynamic_call("Scale(double,variant)", &mut vec![Value::Double(2.0), Value::Invalid])
            .unwrap(),
        Value::Double(2.0)
    );
}

#[test]
fn test_wrong_argument_count() {
    let (_object, _state, calc) = calc();
    let err = calc
        .dynamic_call("Add(int)", &mut vec![Value::Int(1)])
        .unwrap_err();
    assert_eq!(err, AxError::BadParamCount { member: "Add".into() });
}

#[test]
fn test_reference_arguments_are_written_back() {
    let (_object, _state, calc) = calc();
    let mut args = vec![Value::Int(1), Value::Int(2)];
    calc.dynamic_call("Swap(int&,int&)", &mut args).unwrap();
    assert_eq!(args, vec![Value::Int(2), Value::Int(1)]);
}

#[test]
fn test_unset_out_parameter_is_filled_by_the_server() {
    let libid: GUID = "3a9b6c10-5e2d-4f7a-b8c1-9d0e1f2a3b01".parse().unwrap();
    let iid: GUID = "3a9b6c10-5e2d-4f7a-b8c1-9d0e1f2a3b02".parse().unwrap();
    let clsid: GUID = "3a9b6c10-5e2d-4f7a-b8c1-9d0e1f2a3b03".parse().unwrap();
    let lib = TypeLibBuilder::new("GaugeLib", libid)
        .dispinterface("IGauge", iid, |i| i.method(1, "Measure", |f| f.out("reading", TypeSpec::I4)))
        .coclass("Gauge", clsid, |c| c.default_interface("IGauge"))
        .build();
    let gauge = AutomationObject::new(&lib, "Gauge", |call: &mut DispatchCall<'_>| -> Result<(), HRESULT> {
        if call.is_missing(0) {
            return Err(DISP_E_PARAMNOTFOUND);
        }
        call.set_out(0, VARIANT::from_i32(42))
    })
    .expect("gauge");

    let wrapper = wrap(&gauge);
    let mut args = vec![Value::Invalid];
    wrapper.dynamic_call("Measure(int&)", &mut args).unwrap();
    assert_eq!(args, vec![Value::Int(42)]);
}

#[test]
fn test_unset_in_out_argument_is_a_type_mismatch() {
    let (_object, _state, calc) = calc();
    let mut args = vec![Value::Invalid, Value::Int(2)];
    assert_eq!(
        calc.dynamic_call("Swap(int&,int&)", &mut args),
        Err(AxError::TypeMismatch { member: "Swap".into(), arg: 0 })
    );
}

#[test]
fn test_arrays_in_and_out() {
    let (_object, _state, calc) = calc();
    let total = calc
        .dynamic_call(
            "Sum(list)",
            &mut vec![Value::List(vec![Value::Int(1), Value::Int(2), Value::Double(3.5)])],
        )
        .unwrap();
    assert_eq!(total, Value::Double(6.5));

    assert_eq!(
        calc.property("Items").unwrap(),
        Value::StringList(vec!["alpha".into(), "beta".into()])
    );
}

#[test]
fn test_unknown_members() {
    let (_object, _state, calc) = calc();
    assert!(matches!(
        calc.dynamic_call("Nope()", &mut Vec::new()),
        Err(AxError::MemberNotFound { .. })
    ));
    assert_eq!(
        calc.property("Nope"),
        Err(AxError::NoSuchProperty { name: "Nope".into() })
    );
    assert!(matches!(
        calc.invoke_slot("Nope()", &mut Vec::new()),
        Err(AxError::MemberNotFound { .. })
    ));
}

// =============================================================================
// Test: Exceptions
// =============================================================================

#[test]
fn test_server_exception_is_reported() {
    let (_object, _state, calc) = calc();
    let (seen, listener) = recorder();
    calc.connect(EXCEPTION_SIGNAL, listener).unwrap();

    let err = calc
        .dynamic_call("Divide(double,double)", &mut vec![Value::Double(1.0), Value::Double(0.0)])
        .unwrap_err();
    let AxError::Exception { member, info } = err else {
        panic!("expected an exception, got {err:?}");
    };
    assert_eq!(member, "Divide");
    assert_eq!(info.code, 11);
    assert_eq!(info.source, "Calculator");
    assert_eq!(info.description, "Division by zero");

    assert_eq!(
        *seen.borrow(),
        vec![vec![
            Value::Int(11),
            Value::String("Calculator".into()),
            Value::String("Division by zero".into()),
            Value::String(String::new()),
        ]]
    );
}

#[test]
fn test_deferred_exception_is_filled_in() {
    let (_object, _state, calc) = calc();
    let err = calc.dynamic_call("Fail()", &mut Vec::new()).unwrap_err();
    let AxError::Exception { info, .. } = err else {
        panic!("expected an exception, got {err:?}");
    };
    assert_eq!(info.code, E_FAIL);
    assert_eq!(info.description, "Requested failure");
}

// =============================================================================
// Test: Properties
// =============================================================================

#[test]
fn test_property_round_trip() {
    let (_object, state, calc) = calc();
    calc.set_property("Name", Value::String("hello".into())).unwrap();
    assert_eq!(*state.name.borrow(), "hello");
    assert_eq!(calc.property("Name").unwrap(), Value::String("hello".into()));

    calc.set_property("Tag", Value::String("t".into())).unwrap();
    assert_eq!(*state.tag.borrow(), "t");
}

#[test]
fn test_setter_slot() {
    let (_object, state, calc) = calc();
    calc.invoke_slot("setName(string)", &mut vec![Value::String("via slot".into())])
        .unwrap();
    assert_eq!(*state.name.borrow(), "via slot");
}

#[test]
fn test_read_only_property_is_not_written() {
    let (_object, state, calc) = calc();
    assert!(!calc.property_writable("Count"));
    assert_eq!(
        calc.set_property("Count", Value::Int(1)),
        Err(AxError::PropertyNotWritable { name: "Count".into() })
    );
    assert_eq!(state.calls.get(), 0);
}

#[test]
fn test_enum_property_takes_keys() {
    let (_object, state, calc) = calc();
    calc.set_property("Mode", Value::String("Precise".into())).unwrap();
    assert_eq!(state.mode.get(), 1);
    assert_eq!(calc.property("Mode").unwrap(), Value::Int(1));
}

#[test]
fn test_bindable_property_notifies() {
    let (_object, state, calc) = calc();
    let (changed, on_changed) = recorder();
    let (names, on_name) = recorder();
    calc.connect("ColorChanged(color)", on_changed).unwrap();
    calc.connect(PROPERTY_CHANGED_SIGNAL, on_name).unwrap();

    calc.set_property("Color", Value::Color(Color::rgb(1, 2, 3))).unwrap();
    assert_eq!(state.color.get(), 0x0003_0201);
    assert_eq!(*changed.borrow(), vec![vec![Value::Color(Color::rgb(1, 2, 3))]]);
    assert_eq!(*names.borrow(), vec![vec![Value::String("Color".into())]]);
    assert_eq!(calc.property("Color").unwrap(), Value::Color(Color::rgb(1, 2, 3)));
}

#[test]
fn test_edit_request_is_refused_for_locked_property() {
    let (_object, state, calc) = calc();
    calc.set_property_writable("Color", false);
    assert!(!calc.property_writable("Color"));
    assert_eq!(
        calc.set_property("Color", Value::Color(Color::rgb(9, 9, 9))),
        Err(AxError::PropertyNotWritable { name: "Color".into() })
    );

    // Going around the check reaches the server, which asks the sink first
    calc.dynamic_call("Color", &mut vec![Value::Color(Color::rgb(9, 9, 9))])
        .unwrap();
    assert_eq!(state.color.get(), 0);

    calc.set_property_writable("Color", true);
    calc.set_property("Color", Value::Color(Color::rgb(9, 9, 9))).unwrap();
    assert_eq!(state.color.get(), 0x0009_0909);
}

// =============================================================================
// Test: Events
// =============================================================================

#[test]
fn test_events_become_signals() {
    let (_object, _state, calc) = calc();
    let (computed, on_computed) = recorder();
    let (renamed, on_renamed) = recorder();
    calc.connect("Computed(double)", on_computed).unwrap();
    calc.connect("Renamed(string)", on_renamed).unwrap();

    calc.dynamic_call("Add(int,int)", &mut vec![Value::Int(4), Value::Int(5)])
        .unwrap();
    calc.set_property("Name", Value::String("calc".into())).unwrap();

    assert_eq!(*computed.borrow(), vec![vec![Value::Double(9.0)]]);
    assert_eq!(*renamed.borrow(), vec![vec![Value::String("calc".into())]]);
}

#[test]
fn test_generic_signal_sees_raw_events() {
    let (_object, _state, calc) = calc();
    let seen = Rc::new(RefCell::new(Vec::new()));
    let sink = seen.clone();
    calc.connect_generic(move |event| {
        sink.borrow_mut()
            .push((event.name.to_string(), event.dispid, event.args.len()));
    });

    calc.dynamic_call("Add(int,int)", &mut vec![Value::Int(1), Value::Int(1)])
        .unwrap();
    assert_eq!(*seen.borrow(), vec![("Computed".to_string(), 1, 1)]);
}

#[test]
fn test_listener_can_cancel_through_reference_argument() {
    let (_object, state, calc) = calc();
    calc.set_property("Name", Value::String("keep".into())).unwrap();

    let id = calc
        .connect("BeforeReset(bool&)", |args| args[0] = Value::Bool(true))
        .unwrap();
    assert_eq!(calc.dynamic_call("Reset()", &mut Vec::new()).unwrap(), Value::Bool(false));
    assert_eq!(*state.name.borrow(), "keep");

    assert!(calc.disconnect(id));
    assert_eq!(calc.dynamic_call("Reset()", &mut Vec::new()).unwrap(), Value::Bool(true));
    assert_eq!(*state.name.borrow(), "");
}

#[test]
fn test_disconnected_listener_is_not_called() {
    let (_object, _state, calc) = calc();
    let (seen, listener) = recorder();
    let id = calc.connect("Computed(double)", listener).unwrap();
    assert!(calc.disconnect(id));
    assert!(!calc.disconnect(id));

    calc.dynamic_call("Add(int,int)", &mut vec![Value::Int(1), Value::Int(2)])
        .unwrap();
    assert!(seen.borrow().is_empty());
}

#[test]
fn test_unknown_signal_is_refused() {
    let (_object, _state, calc) = calc();
    assert_eq!(
        calc.connect("Nope(int)", |_| {}).unwrap_err(),
        AxError::NoSuchSignal { signature: "Nope(int)".into() }
    );
}

#[test]
fn test_generic_signal_is_only_for_connect_generic() {
    let (_object, _state, calc) = calc();
    assert_eq!(
        calc.connect(GENERIC_SIGNAL, |_| {}).unwrap_err(),
        AxError::RawSignal { signature: GENERIC_SIGNAL.into() }
    );
}

#[test]
fn test_event_arguments_arrive_in_declared_order() {
    let libid: GUID = "5d2e7a90-4c1b-4e8f-a3d2-6b7c8d9e0f01".parse().unwrap();
    let iid: GUID = "5d2e7a90-4c1b-4e8f-a3d2-6b7c8d9e0f02".parse().unwrap();
    let events_iid: GUID = "5d2e7a90-4c1b-4e8f-a3d2-6b7c8d9e0f03".parse().unwrap();
    let clsid: GUID = "5d2e7a90-4c1b-4e8f-a3d2-6b7c8d9e0f04".parse().unwrap();
    let lib = TypeLibBuilder::new("NotifyLib", libid)
        .dispinterface("INotifier", iid, |i| i.method(1, "Ping", |f| f))
        .dispinterface("INotifierEvents", events_iid, |i| {
            i.method(1, "Notify", |f| f.param("a", TypeSpec::I4).param("b", TypeSpec::Bstr))
        })
        .coclass("Notifier", clsid, |c| c.default_interface("INotifier").source("INotifierEvents"))
        .build();
    let object = AutomationObject::new(&lib, "Notifier", |_call: &mut DispatchCall<'_>| -> Result<(), HRESULT> {
        Ok(())
    })
    .expect("notifier");
    let notifier = wrap(&object);

    let (seen, listener) = recorder();
    notifier.connect("Notify(int,string)", listener).unwrap();
    let raw = Rc::new(Cell::new(0));
    let raw_vt = raw.clone();
    notifier.connect_generic(move |event| raw_vt.set(event.args[0].vt));

    let mut args = [VARIANT::from_i32(7), VARIANT::from_bstr(sys_alloc_string("seven"))];
    assert_eq!(object.events().fire("Notify", &mut args), Ok(1));
    variant_clear(&mut args[1]);

    assert_eq!(
        *seen.borrow(),
        vec![vec![Value::Int(7), Value::String("seven".into())]]
    );
    // COM order: last declared argument first
    assert_eq!(raw.get(), VT_BSTR);
}

// =============================================================================
// Test: Lifetime
// =============================================================================

#[test]
fn test_null_wrapper() {
    let calc = AxObject::new(services());
    assert!(calc.is_null());
    assert_eq!(
        calc.dynamic_call("Add(int,int)", &mut vec![Value::Int(1), Value::Int(2)]),
        Err(AxError::NotInitialized)
    );
    assert_eq!(calc.property("control").unwrap(), Value::String(String::new()));
    assert_eq!(calc.meta_object().class_name, "AxObject");
    assert!(calc.query_interface::<IDispatch>().is_err());
}

#[test]
fn test_sinks_are_unadvised_on_clear_and_drop() {
    let (object, _state, calc) = calc();
    assert_eq!(object.events().sink_count(&IID_ICALCEVENTS), 1);
    assert_eq!(object.events().sink_count(&IID_IPROPERTYNOTIFYSINK), 1);
    let mut connected = calc.connected_interfaces();
    connected.sort_by_key(|iid| iid.to_braced_string());
    let mut expected = vec![IID_ICALCEVENTS, IID_IPROPERTYNOTIFYSINK];
    expected.sort_by_key(|iid| iid.to_braced_string());
    assert_eq!(connected, expected);

    calc.clear();
    assert!(calc.is_null());
    assert_eq!(object.events().sink_count(&IID_ICALCEVENTS), 0);
    assert_eq!(object.events().sink_count(&IID_IPROPERTYNOTIFYSINK), 0);

    let again = wrap(&object);
    assert_eq!(object.events().sink_count(&IID_ICALCEVENTS), 1);
    drop(again);
    assert_eq!(object.events().sink_count(&IID_ICALCEVENTS), 0);
}

#[test]
fn test_disabled_event_sink_advises_nothing() {
    let lib = calculator::library();
    let (object, _state) = calculator::create(&lib).expect("calculator");
    let mut factory = FactoryMap::new();
    let unknown = object.query::<IUnknown>().expect("IUnknown");
    factory.register(CLSID_CALCULATOR, move || Some(unknown.clone()));
    let services = AxServices::new(Rc::new(MapRegistry::new()), Rc::new(factory))
        .with_cache(Arc::new(MetaObjectCache::new()));

    let calc = AxObject::new(services);
    calc.disable_event_sink(true);
    calc.set_control(&CLSID_CALCULATOR.to_braced_string()).unwrap();
    assert!(calc.connected_interfaces().is_empty());
    assert_eq!(object.events().sink_count(&IID_ICALCEVENTS), 0);
    assert!(calc.meta_object().connections.is_empty());
}

#[test]
fn test_disabled_metadata_still_calls() {
    let lib = calculator::library();
    let (object, _state) = calculator::create(&lib).expect("calculator");
    let mut factory = FactoryMap::new();
    let unknown = object.query::<IUnknown>().expect("IUnknown");
    factory.register(CLSID_CALCULATOR, move || Some(unknown.clone()));
    let services = AxServices::new(Rc::new(MapRegistry::new()), Rc::new(factory))
        .with_cache(Arc::new(MetaObjectCache::new()));

    let calc = AxObject::new(services);
    calc.disable_meta_object(true);
    calc.set_control(&CLSID_CALCULATOR.to_braced_string()).unwrap();
    assert_eq!(calc.meta_object().class_name, "AxObject");
    assert!(calc.meta_object().slot("Add(int,int)").is_none());
    assert_eq!(calc.dynamic_call("Add(2, 3)", &mut Vec::new()).unwrap(), Value::Int(5));
}

#[test]
fn test_disabled_class_info() {
    let calc = AxObject::new(calc_services(Rc::new(Cell::new(0))));
    calc.disable_class_info(true);
    calc.set_control("CalcLib.Calculator").unwrap();

    let meta = calc.meta_object();
    assert!(meta.class_info("CoClass").is_none());
    assert!(meta.class_info("Interface 1").is_none());
    assert!(meta.class_info("Event Interface 1").is_none());
    assert!(meta.slot("Add(int,int)").is_some());
    assert!(meta.signal("Computed(double)").is_some());
}

// =============================================================================
// Test: Controls
// =============================================================================

fn calc_services(created: Rc<Cell<u32>>) -> AxServices {
    let lib = calculator::library();
    let mut registry = MapRegistry::new();
    registry.register_class("CalcLib.Calculator", &CLSID_CALCULATOR);
    let mut factory = FactoryMap::new();
    factory.register(CLSID_CALCULATOR, move || {
        created.set(created.get() + 1);
        calculator::create(&lib).and_then(|(object, _)| object.query::<IUnknown>())
    });
    AxServices::new(Rc::new(registry), Rc::new(factory)).with_cache(Arc::new(MetaObjectCache::new()))
}

#[test]
fn test_control_by_program_id() {
    let created = Rc::new(Cell::new(0));
    let calc = AxObject::new(calc_services(created.clone()));
    calc.set_property("control", Value::String("CalcLib.Calculator".into()))
        .unwrap();
    assert!(!calc.is_null());
    assert_eq!(calc.control(), CLSID_CALCULATOR.to_braced_string());
    assert_eq!(
        calc.property("control").unwrap(),
        Value::String(CLSID_CALCULATOR.to_braced_string())
    );
    assert_eq!(calc.meta_object().class_name, "Calculator");
    assert_eq!(
        calc.dynamic_call("Add(int,int)", &mut vec![Value::Int(20), Value::Int(22)])
            .unwrap(),
        Value::Int(42)
    );

    // The same control again keeps the object
    calc.set_control(&CLSID_CALCULATOR.to_braced_string()).unwrap();
    assert_eq!(created.get(), 1);
}

#[test]
fn test_control_by_class_id_without_braces() {
    let created = Rc::new(Cell::new(0));
    let calc = AxObject::new(calc_services(created.clone()));
    let bare = CLSID_CALCULATOR.to_braced_string();
    calc.set_control(bare.trim_start_matches('{').trim_end_matches('}'))
        .unwrap();
    assert_eq!(created.get(), 1);
    assert_eq!(calc.control(), bare);
}

#[test]
fn test_same_control_under_another_name_keeps_the_object() {
    let created = Rc::new(Cell::new(0));
    let calc = AxObject::new(calc_services(created.clone()));
    calc.set_control("CalcLib.Calculator").unwrap();
    calc.set_control(" CalcLib.Calculator ").unwrap();
    calc.set_control(&CLSID_CALCULATOR.to_braced_string().to_uppercase()).unwrap();
    assert_eq!(created.get(), 1);
    assert_eq!(calc.control(), CLSID_CALCULATOR.to_braced_string());
}

#[test]
fn test_bad_controls() {
    let calc = AxObject::new(calc_services(Rc::new(Cell::new(0))));
    assert_eq!(
        calc.set_control("Nobody.Home"),
        Err(AxError::InvalidControl { control: "Nobody.Home".into() })
    );

    let unregistered = "{0b7c3f58-1111-4a2b-8c3d-4e5f60718293}";
    assert_eq!(
        calc.set_control(unregistered),
        Err(AxError::CreateFailed {
            control: unregistered.into(),
            hr: REGDB_E_CLASSNOTREG,
        })
    );
    assert!(calc.is_null());
}

#[test]
fn test_sub_object() {
    let libid: GUID = "7e4a1c22-9b3d-4f10-8e21-3c4d5e6f7a01".parse().unwrap();
    let iid: GUID = "7e4a1c22-9b3d-4f10-8e21-3c4d5e6f7a02".parse().unwrap();
    let clsid: GUID = "7e4a1c22-9b3d-4f10-8e21-3c4d5e6f7a03".parse().unwrap();
    let lib = TypeLibBuilder::new("ParentLib", libid)
        .dispinterface("IParent", iid, |i| {
            i.readonly_property(1, "Child", TypeSpec::Dispatch)
                .readonly_property(2, "Label", TypeSpec::Bstr)
        })
        .coclass("Parent", clsid, |c| c.default_interface("IParent"))
        .build();

    let calc_lib = calculator::library();
    let (child, child_state) = calculator::create(&calc_lib).expect("calculator");
    let child_dispatch = child.query::<IDispatch>().expect("IDispatch");
    let parent = AutomationObject::new(&lib, "Parent", move |call: &mut DispatchCall<'_>| -> Result<(), HRESULT> {
        match call.dispid() {
            1 => {
                let mut value = VARIANT::new();
                value.vt = VT_DISPATCH;
                value.data.pdisp_val = child_dispatch.clone().into_raw();
                call.set_result(value);
            }
            _ => call.set_result_string("parent"),
        }
        Ok(())
    })
    .expect("parent");

    let wrapper = wrap(&parent);
    let sub = wrapper
        .query_sub_object("Child", &mut Vec::new())
        .unwrap()
        .expect("sub-object");
    assert_eq!(sub.meta_object().class_name, "Calculator");
    sub.set_property("Name", Value::String("child".into())).unwrap();
    assert_eq!(*child_state.name.borrow(), "child");

    assert!(wrapper.query_sub_object("Label", &mut Vec::new()).unwrap().is_none());
}

#[test]
fn test_query_interface_and_documentation() {
    let (_object, _state, calc) = calc();
    assert!(calc.query_interface::<IProvideClassInfo>().is_ok());

    let html = calc.generate_documentation();
    assert!(html.contains("Calculator Reference"));
    assert!(html.contains("Add(int a, int b)"));
    assert!(html.contains("ColorChanged"));
}
