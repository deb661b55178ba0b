//! Tests for automation objects and their connection points

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::ptr;

use axcom::oleauto::{bstr_to_string, sys_alloc_string, sys_free_string, variant_clear};
use axcom::proc::com_implement;
use axcom::*;
use axserver::calculator::{self, *};
use axserver::{AutomationObject, TypeLibBuilder, TypeSpec};

fn calc_dispatch() -> (
    ComBox<AutomationObject>,
    ComPtr<IDispatch>,
    std::rc::Rc<calculator::CalculatorState>,
) {
    let lib = calculator::library();
    let (object, state) = calculator::create(&lib).expect("calculator");
    let dispatch = object.query::<IDispatch>().expect("IDispatch");
    (object, dispatch, state)
}

struct Outcome {
    hr: HRESULT,
    result: VARIANT,
    excepinfo: EXCEPINFO,
    argerr: u32,
}

/// `args` in declared order
fn call(dispatch: &ComPtr<IDispatch>, dispid: DISPID, flags: u16, args: &mut [VARIANT]) -> Outcome {
    args.reverse();
    let mut named = DISPID_PROPERTYPUT;
    let put = flags & DISPATCH_PROPERTYPUT != 0;
    let mut params = DISPPARAMS {
        rgvarg: if args.is_empty() { ptr::null_mut() } else { args.as_mut_ptr() },
        rgdispid_named_args: if put { &mut named } else { ptr::null_mut() },
        c_args: args.len() as u32,
        c_named_args: u32::from(put),
    };
    let mut outcome = Outcome {
        hr: S_OK,
        result: VARIANT::new(),
        excepinfo: EXCEPINFO::default(),
        argerr: u32::MAX,
    };
    outcome.hr = unsafe {
        dispatch.invoke(
            dispid,
            &IID_NULL,
            LOCALE_USER_DEFAULT,
            flags,
            &mut params,
            &mut outcome.result,
            &mut outcome.excepinfo,
            &mut outcome.argerr,
        )
    };
    args.reverse();
    outcome
}

fn wide(text: &str) -> Vec<u16> {
    text.encode_utf16().chain(std::iter::once(0)).collect()
}

// =============================================================================
// Test: Invoke
// =============================================================================

#[test]
fn test_method_call_returns_value() {
    let (_object, dispatch, state) = calc_dispatch();
    let mut outcome = call(
        &dispatch,
        DISPID_ADD,
        DISPATCH_METHOD,
        &mut [VARIANT::from_i32(2), VARIANT::from_i32(3)],
    );
    assert_eq!(outcome.hr, S_OK);
    assert_eq!(outcome.result.as_i32(), Some(5));
    assert_eq!(state.calls.get(), 1);
    variant_clear(&mut outcome.result);
}

#[test]
fn test_property_put_then_get() {
    let (_object, dispatch, state) = calc_dispatch();
    let mut value = [VARIANT::from_bstr(sys_alloc_string("Ada"))];
    let outcome = call(&dispatch, DISPID_NAME, DISPATCH_PROPERTYPUT, &mut value);
    assert_eq!(outcome.hr, S_OK);
    assert_eq!(*state.name.borrow(), "Ada");
    variant_clear(&mut value[0]);

    let mut outcome = call(&dispatch, DISPID_NAME, DISPATCH_PROPERTYGET, &mut []);
    assert_eq!(outcome.hr, S_OK);
    assert_eq!(outcome.result.as_string().as_deref(), Some("Ada"));
    variant_clear(&mut outcome.result);
}

#[test]
fn test_put_without_named_argument_is_rejected() {
    let (_object, dispatch, _state) = calc_dispatch();
    let mut params = DISPPARAMS::default();
    let mut value = VARIANT::from_i32(1);
    params.rgvarg = &mut value;
    params.c_args = 1;
    let hr = unsafe {
        dispatch.invoke(
            DISPID_MODE,
            &IID_NULL,
            LOCALE_USER_DEFAULT,
            DISPATCH_PROPERTYPUT,
            &mut params,
            ptr::null_mut(),
            ptr::null_mut(),
            ptr::null_mut(),
        )
    };
    assert_eq!(hr, DISP_E_PARAMNOTOPTIONAL);
}

#[test]
fn test_bad_param_count() {
    let (_object, dispatch, state) = calc_dispatch();
    let outcome = call(&dispatch, DISPID_ADD, DISPATCH_METHOD, &mut [VARIANT::from_i32(2)]);
    assert_eq!(outcome.hr, DISP_E_BADPARAMCOUNT);
    // The handler never ran
    assert_eq!(state.calls.get(), 0);
}

#[test]
fn test_optional_parameter_may_be_omitted() {
    let (_object, dispatch, _state) = calc_dispatch();
    let outcome = call(&dispatch, DISPID_SCALE, DISPATCH_METHOD, &mut [VARIANT::from_f64(2.5)]);
    assert_eq!(outcome.hr, S_OK);
    assert_eq!(outcome.result.as_f64(), Some(2.5));

    let outcome = call(
        &dispatch,
        DISPID_SCALE,
        DISPATCH_METHOD,
        &mut [VARIANT::from_f64(2.5), VARIANT::error(DISP_E_PARAMNOTFOUND)],
    );
    assert_eq!(outcome.result.as_f64(), Some(2.5));

    let outcome = call(
        &dispatch,
        DISPID_SCALE,
        DISPATCH_METHOD,
        &mut [VARIANT::from_f64(2.5), VARIANT::from_i32(4)],
    );
    assert_eq!(outcome.result.as_f64(), Some(10.0));
}

#[test]
fn test_required_parameter_marked_missing() {
    let (_object, dispatch, _state) = calc_dispatch();
    let outcome = call(
        &dispatch,
        DISPID_ADD,
        DISPATCH_METHOD,
        &mut [VARIANT::error(DISP_E_PARAMNOTFOUND), VARIANT::from_i32(1)],
    );
    assert_eq!(outcome.hr, DISP_E_PARAMNOTOPTIONAL);
    // First declared argument is the last element of rgvarg
    assert_eq!(outcome.argerr, 1);
}

#[test]
fn test_type_mismatch_reports_position() {
    let (_object, dispatch, _state) = calc_dispatch();
    let mut args = [VARIANT::from_i32(1), VARIANT::from_bstr(sys_alloc_string("two"))];
    let outcome = call(&dispatch, DISPID_ADD, DISPATCH_METHOD, &mut args);
    assert_eq!(outcome.hr, DISP_E_TYPEMISMATCH);
    assert_eq!(outcome.argerr, 0);
    variant_clear(&mut args[1]);
}

#[test]
fn test_unknown_member_and_interface() {
    let (_object, dispatch, _state) = calc_dispatch();
    let outcome = call(&dispatch, 999, DISPATCH_METHOD, &mut []);
    assert_eq!(outcome.hr, DISP_E_MEMBERNOTFOUND);

    // Read-only property
    let outcome = call(&dispatch, DISPID_COUNT, DISPATCH_PROPERTYPUT, &mut [VARIANT::from_i32(1)]);
    assert_eq!(outcome.hr, DISP_E_MEMBERNOTFOUND);

    let other = IID_ICALC;
    let hr = unsafe {
        dispatch.invoke(
            DISPID_ADD,
            &other,
            LOCALE_USER_DEFAULT,
            DISPATCH_METHOD,
            &mut DISPPARAMS::default(),
            ptr::null_mut(),
            ptr::null_mut(),
            ptr::null_mut(),
        )
    };
    assert_eq!(hr, DISP_E_UNKNOWNINTERFACE);
}

#[test]
fn test_named_arguments_on_methods_are_rejected() {
    let (_object, dispatch, _state) = calc_dispatch();
    let mut args = [VARIANT::from_i32(1), VARIANT::from_i32(2)];
    let mut named = [0, 1];
    let mut params = DISPPARAMS {
        rgvarg: args.as_mut_ptr(),
        rgdispid_named_args: named.as_mut_ptr(),
        c_args: 2,
        c_named_args: 2,
    };
    let hr = unsafe {
        dispatch.invoke(
            DISPID_ADD,
            &IID_NULL,
            LOCALE_USER_DEFAULT,
            DISPATCH_METHOD,
            &mut params,
            ptr::null_mut(),
            ptr::null_mut(),
            ptr::null_mut(),
        )
    };
    assert_eq!(hr, DISP_E_NONAMEDARGS);
}

#[test]
fn test_inherited_member_is_callable() {
    let (_object, dispatch, _state) = calc_dispatch();
    let mut outcome = call(&dispatch, DISPID_ABOUT, DISPATCH_METHOD, &mut []);
    assert_eq!(outcome.hr, S_OK);
    assert_eq!(outcome.result.as_string().as_deref(), Some("CalcLib sample calculator"));
    variant_clear(&mut outcome.result);
}

#[test]
fn test_dispatch_variable() {
    let (_object, dispatch, state) = calc_dispatch();
    let mut value = [VARIANT::from_bstr(sys_alloc_string("tagged"))];
    assert_eq!(call(&dispatch, DISPID_TAG, DISPATCH_PROPERTYPUT, &mut value).hr, S_OK);
    variant_clear(&mut value[0]);
    assert_eq!(*state.tag.borrow(), "tagged");
}

#[test]
fn test_by_reference_arguments_are_written_back() {
    let (_object, dispatch, _state) = calc_dispatch();
    let (mut a, mut b) = (1i32, 2i32);
    let mut args = [VARIANT::new(), VARIANT::new()];
    args[0].vt = VT_I4 | VT_BYREF;
    args[0].data.pl_val = &mut a;
    args[1].vt = VT_I4 | VT_BYREF;
    args[1].data.pl_val = &mut b;
    let outcome = call(&dispatch, DISPID_SWAP, DISPATCH_METHOD, &mut args);
    assert_eq!(outcome.hr, S_OK);
    assert_eq!((a, b), (2, 1));
}

#[test]
fn test_array_argument_and_result() {
    let (_object, dispatch, _state) = calc_dispatch();
    let psa = axcom::oleauto::safe_array_create_vector(VT_VARIANT, 0, 3);
    for (i, value) in [VARIANT::from_i32(1), VARIANT::from_f64(2.5), VARIANT::from_i32(3)]
        .iter()
        .enumerate()
    {
        unsafe {
            axcom::oleauto::safe_array_put_element(psa, &[i as i32], value as *const VARIANT as *const c_void)
        };
    }
    let mut array = VARIANT::new();
    array.vt = VT_ARRAY | VT_VARIANT;
    array.data.parray = psa;
    let mut args = [array];
    let outcome = call(&dispatch, DISPID_SUM, DISPATCH_METHOD, &mut args);
    assert_eq!(outcome.hr, S_OK);
    assert_eq!(outcome.result.as_f64(), Some(6.5));
    variant_clear(&mut args[0]);

    let mut outcome = call(&dispatch, DISPID_ITEMS, DISPATCH_PROPERTYGET, &mut []);
    assert_eq!(outcome.result.vt, VT_ARRAY | VT_BSTR);
    variant_clear(&mut outcome.result);
}

// =============================================================================
// Test: Exceptions
// =============================================================================

#[test]
fn test_exception_fills_excepinfo() {
    let (_object, dispatch, _state) = calc_dispatch();
    let outcome = call(
        &dispatch,
        DISPID_DIVIDE,
        DISPATCH_METHOD,
        &mut [VARIANT::from_f64(1.0), VARIANT::from_f64(0.0)],
    );
    assert_eq!(outcome.hr, DISP_E_EXCEPTION);
    assert_eq!(outcome.excepinfo.w_code, 11);
    assert_eq!(bstr_to_string(outcome.excepinfo.bstr_source), "Calculator");
    assert_eq!(bstr_to_string(outcome.excepinfo.bstr_description), "Division by zero");
    sys_free_string(outcome.excepinfo.bstr_source);
    sys_free_string(outcome.excepinfo.bstr_description);
}

#[test]
fn test_deferred_exception_fill_in() {
    let (_object, dispatch, _state) = calc_dispatch();
    let mut outcome = call(&dispatch, DISPID_FAIL, DISPATCH_METHOD, &mut []);
    assert_eq!(outcome.hr, DISP_E_EXCEPTION);
    assert!(outcome.excepinfo.bstr_description.is_null());

    let fill_in = outcome.excepinfo.pfn_deferred_fill_in.expect("deferred fill-in");
    assert_eq!(unsafe { fill_in(&mut outcome.excepinfo) }, S_OK);
    assert_eq!(outcome.excepinfo.scode, E_FAIL);
    assert_eq!(bstr_to_string(outcome.excepinfo.bstr_description), "Requested failure");
    sys_free_string(outcome.excepinfo.bstr_source);
    sys_free_string(outcome.excepinfo.bstr_description);
}

// =============================================================================
// Test: GetIDsOfNames / type info
// =============================================================================

#[test]
fn test_ids_of_names_is_case_insensitive() {
    let (_object, dispatch, _state) = calc_dispatch();
    let (member, param) = (wide("aDD"), wide("B"));
    let names = [member.as_ptr(), param.as_ptr()];
    let mut ids = [0; 2];
    let hr = unsafe { dispatch.get_ids_of_names(&IID_NULL, names.as_ptr(), 2, 0, ids.as_mut_ptr()) };
    assert_eq!(hr, S_OK);
    assert_eq!(ids, [DISPID_ADD, 1]);

    let missing = wide("Subtract");
    let names = [missing.as_ptr()];
    let hr = unsafe { dispatch.get_ids_of_names(&IID_NULL, names.as_ptr(), 1, 0, ids.as_mut_ptr()) };
    assert_eq!(hr, DISP_E_UNKNOWNNAME);
    assert_eq!(ids[0], DISPID_UNKNOWN);
}

#[test]
fn test_type_info_and_class_info() {
    let (object, dispatch, _state) = calc_dispatch();
    let mut count = 0;
    assert_eq!(unsafe { dispatch.get_type_info_count(&mut count) }, S_OK);
    assert_eq!(count, 1);

    let mut raw = ptr::null_mut();
    assert_eq!(unsafe { dispatch.get_type_info(0, 0, &mut raw) }, S_OK);
    let info = unsafe { ComPtr::from_raw(raw) }.expect("type info");
    let mut attr = ptr::null_mut();
    unsafe { info.get_type_attr(&mut attr) };
    assert_eq!(unsafe { (*attr).guid }, IID_ICALC);
    unsafe { info.release_type_attr(attr) };

    let provide = object.query::<IProvideClassInfo>().expect("IProvideClassInfo");
    let mut raw = ptr::null_mut();
    assert_eq!(unsafe { provide.get_class_info(&mut raw) }, S_OK);
    let class = unsafe { ComPtr::from_raw(raw) }.expect("class info");
    let mut attr = ptr::null_mut();
    unsafe { class.get_type_attr(&mut attr) };
    assert_eq!(unsafe { (*attr).typekind }, TKIND_COCLASS);
    assert_eq!(unsafe { (*attr).guid }, CLSID_CALCULATOR);
    unsafe { class.release_type_attr(attr) };

    object.set_class_info_enabled(false);
    assert!(object.query::<IProvideClassInfo>().is_none());
}

#[test]
fn test_missing_class_is_refused() {
    let lib = TypeLibBuilder::new("Empty", GUID::ZERO)
        .dispinterface("IThing", GUID::new(1, 2, 3, [0; 8]), |i| {
            i.readonly_property(1, "Value", TypeSpec::I4)
        })
        .build();
    let handler = |_: &mut axserver::DispatchCall<'_>| -> Result<(), HRESULT> { Ok(()) };
    assert!(AutomationObject::new(&lib, "Thing", handler).is_none());
    // Not a coclass
    assert!(AutomationObject::new(&lib, "IThing", handler).is_none());
}

// =============================================================================
// Test: Connection points
// =============================================================================

#[repr(C)]
struct EventLog {
    vtable_i_dispatch: *const IDispatchVTable,
    vtable_i_property_notify_sink: *const IPropertyNotifySinkVTable,
    ref_count: ComRefCount,
    received: RefCell<Vec<(DISPID, Vec<String>)>>,
    changed: RefCell<Vec<DISPID>>,
    veto: Cell<bool>,
    cancel_reset: Cell<bool>,
}

impl EventLog {
    fn new() -> ComBox<EventLog> {
        ComBox::new(EventLog {
            vtable_i_dispatch: Self::VTABLE_I_DISPATCH,
            vtable_i_property_notify_sink: Self::VTABLE_I_PROPERTY_NOTIFY_SINK,
            ref_count: ComRefCount::new(),
            received: RefCell::new(Vec::new()),
            changed: RefCell::new(Vec::new()),
            veto: Cell::new(false),
            cancel_reset: Cell::new(false),
        })
    }
}

unsafe impl ComObject for EventLog {
    fn ref_count(&self) -> &ComRefCount {
        &self.ref_count
    }

    fn interface(&self, riid: &GUID) -> Option<*mut c_void> {
        if *riid == IID_IUNKNOWN || *riid == IID_IDISPATCH || *riid == IID_ICALCEVENTS {
            Some(interface_ptr(&self.vtable_i_dispatch))
        } else if *riid == IID_IPROPERTYNOTIFYSINK {
            Some(interface_ptr(&self.vtable_i_property_notify_sink))
        } else {
            None
        }
    }
}

#[com_implement(IDispatch)]
impl EventLog {
    fn get_type_info_count(&self, pctinfo: *mut u32) -> HRESULT {
        unsafe { *pctinfo = 0 };
        S_OK
    }

    fn get_type_info(&self, itinfo: u32, lcid: LCID, pptinfo: *mut *mut ITypeInfo) -> HRESULT {
        let _ = (itinfo, lcid, pptinfo);
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
        let _ = (riid, lcid, flags, result, excepinfo, argerr);
        let params = unsafe { &*params };
        let mut args = Vec::new();
        for i in (0..params.c_args as usize).rev() {
            let var = unsafe { &*params.rgvarg.add(i) };
            if var.vt == VT_BOOL | VT_BYREF {
                if self.cancel_reset.get() {
                    unsafe { *var.data.pbool_val = VARIANT_TRUE };
                }
                args.push("byref".to_string());
            } else if let Some(text) = var.as_string() {
                args.push(text);
            } else if let Some(value) = var.as_f64() {
                args.push(value.to_string());
            }
        }
        self.received.borrow_mut().push((dispid, args));
        S_OK
    }
}

#[com_implement(IPropertyNotifySink)]
impl EventLog {
    fn on_changed(&self, dispid: DISPID) -> HRESULT {
        self.changed.borrow_mut().push(dispid);
        S_OK
    }

    fn on_request_edit(&self, dispid: DISPID) -> HRESULT {
        let _ = dispid;
        if self.veto.get() { S_FALSE } else { S_OK }
    }
}

fn connect(
    object: &ComBox<AutomationObject>,
    iid: &GUID,
    sink: &ComBox<EventLog>,
) -> (ComPtr<IConnectionPoint>, u32) {
    let container = object
        .query::<IConnectionPointContainer>()
        .expect("IConnectionPointContainer");
    let mut raw = ptr::null_mut();
    assert_eq!(unsafe { container.find_connection_point(iid, &mut raw) }, S_OK);
    let point = unsafe { ComPtr::from_raw(raw) }.expect("connection point");
    let unknown = sink.query::<IUnknown>().expect("IUnknown");
    let mut cookie = 0;
    assert_eq!(unsafe { point.advise(unknown.as_raw(), &mut cookie) }, S_OK);
    assert_ne!(cookie, 0);
    (point, cookie)
}

#[test]
fn test_events_reach_advised_sink() {
    let (object, dispatch, _state) = calc_dispatch();
    let sink = EventLog::new();
    let (point, cookie) = connect(&object, &IID_ICALCEVENTS, &sink);
    assert_eq!(object.events().sink_count(&IID_ICALCEVENTS), 1);

    call(&dispatch, DISPID_ADD, DISPATCH_METHOD, &mut [VARIANT::from_i32(2), VARIANT::from_i32(3)]);
    let mut name = [VARIANT::from_bstr(sys_alloc_string("Grace"))];
    call(&dispatch, DISPID_NAME, DISPATCH_PROPERTYPUT, &mut name);
    variant_clear(&mut name[0]);

    assert_eq!(
        *sink.received.borrow(),
        vec![(1, vec!["5".to_string()]), (3, vec!["Grace".to_string()])]
    );

    assert_eq!(unsafe { point.unadvise(cookie) }, S_OK);
    assert_eq!(unsafe { point.unadvise(cookie) }, CONNECT_E_NOCONNECTION);
    call(&dispatch, DISPID_ADD, DISPATCH_METHOD, &mut [VARIANT::from_i32(1), VARIANT::from_i32(1)]);
    assert_eq!(sink.received.borrow().len(), 2);
}

#[test]
fn test_sink_writes_back_event_argument() {
    let (object, dispatch, state) = calc_dispatch();
    let sink = EventLog::new();
    let (_point, _cookie) = connect(&object, &IID_ICALCEVENTS, &sink);
    *state.name.borrow_mut() = "kept".to_string();

    sink.cancel_reset.set(true);
    let outcome = call(&dispatch, DISPID_RESET, DISPATCH_METHOD, &mut []);
    assert_eq!(outcome.result.as_bool(), Some(false));
    assert_eq!(*state.name.borrow(), "kept");

    sink.cancel_reset.set(false);
    let outcome = call(&dispatch, DISPID_RESET, DISPATCH_METHOD, &mut []);
    assert_eq!(outcome.result.as_bool(), Some(true));
    assert_eq!(*state.name.borrow(), "");
}

#[test]
fn test_property_notifications_and_veto() {
    let (object, dispatch, state) = calc_dispatch();
    let sink = EventLog::new();
    let (_point, _cookie) = connect(&object, &IID_IPROPERTYNOTIFYSINK, &sink);

    call(&dispatch, DISPID_COLOR, DISPATCH_PROPERTYPUT, &mut [VARIANT::from_i32(0xFF)]);
    assert_eq!(state.color.get(), 0xFF);
    assert_eq!(*sink.changed.borrow(), vec![DISPID_COLOR]);

    sink.veto.set(true);
    call(&dispatch, DISPID_COLOR, DISPATCH_PROPERTYPUT, &mut [VARIANT::from_i32(0x00)]);
    assert_eq!(state.color.get(), 0xFF);
    assert_eq!(sink.changed.borrow().len(), 1);
}

#[test]
fn test_connection_point_enumeration() {
    let (object, _dispatch, _state) = calc_dispatch();
    let container = object.query::<IConnectionPointContainer>().expect("container");
    let mut raw = ptr::null_mut();
    assert_eq!(unsafe { container.enum_connection_points(&mut raw) }, S_OK);
    let points = unsafe { ComPtr::from_raw(raw) }.expect("enumerator");

    let mut found = Vec::new();
    loop {
        let mut point = ptr::null_mut();
        let mut fetched = 0;
        if unsafe { points.next(1, &mut point, &mut fetched) } != S_OK {
            assert_eq!(fetched, 0);
            break;
        }
        let point = unsafe { ComPtr::from_raw(point) }.expect("point");
        let mut iid = GUID::ZERO;
        unsafe { point.get_connection_interface(&mut iid) };
        found.push(iid);

        let mut back = ptr::null_mut();
        assert_eq!(unsafe { point.get_connection_point_container(&mut back) }, S_OK);
        let back = unsafe { ComPtr::from_raw(back) }.expect("container");
        assert!(back.identity() == container.identity());
    }
    assert_eq!(found, vec![IID_ICALCEVENTS, IID_IPROPERTYNOTIFYSINK]);

    let unknown_iid = GUID::new(9, 9, 9, [9; 8]);
    let mut raw = ptr::null_mut();
    assert_eq!(
        unsafe { container.find_connection_point(&unknown_iid, &mut raw) },
        CONNECT_E_NOCONNECTION
    );
}
