//! Tests for call preparation and failure mapping

use axbridge::invoke::{CallKind, DispidCache, check_hresult, exception_info, parse_inline_args, prepare_call};
use axbridge::meta::MetaBuilder;
use axbridge::{AxError, InvokeKind, MetaEnum, MetaMethod, MetaObject, MethodKind, PropertyFlags, Value};
use axcom::oleauto::{bstr_is_live, sys_alloc_string};
use axcom::*;

fn slot(signature: &str, return_type: &str, types: &[&str], invoke: InvokeKind) -> MetaMethod {
    MetaMethod {
        signature: signature.to_string(),
        return_type: return_type.to_string(),
        parameter_types: types.iter().map(|t| t.to_string()).collect(),
        parameter_names: types.iter().enumerate().map(|(i, _)| format!("p{i}")).collect(),
        kind: MethodKind::Slot,
        invoke,
        cloned: false,
    }
}

fn meta() -> MetaObject {
    let mut builder = MetaBuilder::new("Sample");
    builder.add_enum(MetaEnum {
        name: "CalcMode".into(),
        keys: vec![("Fast".into(), 0), ("Precise".into(), 1)],
    });
    builder.add_slot(slot("Add(int,int)", "int", &["int", "int"], InvokeKind::Method));
    builder.add_slot(slot("Swap(int&,int&)", "", &["int&", "int&"], InvokeKind::Method));
    builder.add_slot(slot("Item(int)", "string", &["int"], InvokeKind::PropertyGet));
    builder.add_slot(slot(
        "Style(IDispatch**,font*,IDispatch*)",
        "",
        &["IDispatch**", "font*", "IDispatch*"],
        InvokeKind::Method,
    ));
    builder.add_slot(slot("Configure(CalcMode)", "", &["CalcMode"], InvokeKind::Method));
    builder.add_property(
        "CalcMode",
        "Mode",
        PropertyFlags::READABLE | PropertyFlags::WRITABLE | PropertyFlags::ENUM_OR_FLAG,
    );
    builder.add_property("string", "Name", PropertyFlags::READABLE | PropertyFlags::WRITABLE);
    builder.build()
}

// =============================================================================
// Test: Inline arguments
// =============================================================================

#[test]
fn test_inline_arguments_are_typed_by_their_spelling() {
    let meta = meta();
    let args = parse_inline_args(r#"2, 2.5, "a, b", true, Precise, plain"#, &meta);
    assert_eq!(
        args,
        vec![
            Value::Int(2),
            Value::Double(2.5),
            Value::String("a, b".into()),
            Value::Bool(true),
            Value::Int(1),
            Value::String("plain".into()),
        ]
    );
    assert!(parse_inline_args("  ", &meta).is_empty());
}

#[test]
fn test_call_string_without_slot_supplies_the_arguments() {
    let meta = meta();
    let mut args = Vec::new();
    let request = prepare_call(&meta, "Multiply(6, 7)", &mut args);
    assert_eq!(request.member, "Multiply");
    assert_eq!(request.kind, CallKind::Method);
    assert_eq!(args, vec![Value::Int(6), Value::Int(7)]);
    assert_eq!(request.hints.len(), 2);
    assert!(request.hints.iter().all(|hint| hint.type_name.is_empty() && !hint.by_ref));
}

// =============================================================================
// Test: Request preparation
// =============================================================================

#[test]
fn test_slot_call_uses_declared_types() {
    let meta = meta();
    let mut args = vec![Value::Int(1), Value::Int(2), Value::Int(3)];
    let request = prepare_call(&meta, "Add(int, int)", &mut args);
    assert_eq!(request.member, "Add");
    assert_eq!(request.return_type, "int");
    // Surplus arguments are dropped
    assert_eq!(args.len(), 2);
    assert_eq!(request.hints[0].type_name, "int");
}

#[test]
fn test_reference_parameters_are_sent_by_reference() {
    let meta = meta();
    let mut args = vec![Value::Int(1), Value::Int(2)];
    let request = prepare_call(&meta, "Swap(int&,int&)", &mut args);
    assert!(request.hints.iter().all(|hint| hint.by_ref));
}

#[test]
fn test_interface_out_parameters_are_sent_by_reference() {
    let meta = meta();
    let mut args = vec![Value::Invalid, Value::Invalid, Value::Invalid];
    let request = prepare_call(&meta, "Style(IDispatch**,font*,IDispatch*)", &mut args);
    let by_ref: Vec<bool> = request.hints.iter().map(|hint| hint.by_ref).collect();
    assert_eq!(by_ref, [true, true, false]);
}

#[test]
fn test_indexed_property_slot_is_a_get() {
    let meta = meta();
    let mut args = vec![Value::Int(0)];
    let request = prepare_call(&meta, "Item(int)", &mut args);
    assert_eq!(request.kind, CallKind::Get);
    assert_eq!(request.return_type, "string");
}

#[test]
fn test_property_access_without_parentheses() {
    let meta = meta();

    let mut none = Vec::new();
    let get = prepare_call(&meta, "Name", &mut none);
    assert_eq!(get.kind, CallKind::Get);
    assert_eq!(get.return_type, "string");
    assert!(get.hints.is_empty());

    let mut one = vec![Value::String("x".into()), Value::Int(9)];
    let put = prepare_call(&meta, "Name", &mut one);
    assert_eq!(put.kind, CallKind::Put);
    assert_eq!(one, vec![Value::String("x".into())]);
    assert_eq!(put.hints[0].type_name, "string");
}

#[test]
fn test_enum_keys_become_values() {
    let meta = meta();

    let mut args = vec![Value::String("Precise".into())];
    prepare_call(&meta, "Mode", &mut args);
    assert_eq!(args, vec![Value::Int(1)]);

    let mut args = vec![Value::String("Fast".into())];
    prepare_call(&meta, "Configure(CalcMode)", &mut args);
    assert_eq!(args, vec![Value::Int(0)]);

    // Not a key: left for the server to reject
    let mut args = vec![Value::String("Slow".into())];
    prepare_call(&meta, "Configure(CalcMode)", &mut args);
    assert_eq!(args, vec![Value::String("Slow".into())]);
}

// =============================================================================
// Test: DISPID cache
// =============================================================================

#[test]
fn test_dispid_cache() {
    let cache = DispidCache::new();
    assert!(cache.is_empty());
    cache.insert("Add", 2);
    cache.insert("Name", 1);
    assert_eq!(cache.get("Add"), Some(2));
    assert_eq!(cache.get("Sub"), None);
    assert_eq!(cache.len(), 2);
    cache.clear();
    assert_eq!(cache.get("Add"), None);
}

// =============================================================================
// Test: Failure mapping
// =============================================================================

#[test]
fn test_hresults_map_to_errors() {
    assert!(check_hresult(S_OK, "Add", None, 0, 2).is_ok());
    assert_eq!(
        check_hresult(DISP_E_BADPARAMCOUNT, "Add", None, 0, 2),
        Err(AxError::BadParamCount { member: "Add".into() })
    );
    assert_eq!(
        check_hresult(DISP_E_UNKNOWNNAME, "Nope", None, 0, 0),
        Err(AxError::MemberNotFound { member: "Nope".into() })
    );
    assert_eq!(
        check_hresult(E_INVALIDARG, "Add", None, 0, 2),
        Err(AxError::InvalidArguments { member: "Add".into() })
    );
    assert_eq!(
        check_hresult(E_FAIL, "Add", None, 0, 2),
        Err(AxError::Com { member: "Add".into(), hr: E_FAIL })
    );
}

#[test]
fn test_argument_position_is_reported_in_declared_order() {
    // argerr counts from the last argument
    assert_eq!(
        check_hresult(DISP_E_TYPEMISMATCH, "Add", None, 0, 3),
        Err(AxError::TypeMismatch { member: "Add".into(), arg: 2 })
    );
    assert_eq!(
        check_hresult(DISP_E_PARAMNOTFOUND, "Add", None, 2, 3),
        Err(AxError::ParamNotFound { member: "Add".into(), arg: 0 })
    );
}

#[test]
fn test_exception_info_is_read_and_freed() {
    let mut excepinfo = EXCEPINFO::default();
    excepinfo.scode = E_FAIL;
    excepinfo.bstr_source = sys_alloc_string("Server");
    excepinfo.bstr_description = sys_alloc_string("Broken");
    excepinfo.bstr_help_file = sys_alloc_string("server.hlp");
    excepinfo.dw_help_context = 12;
    let source = excepinfo.bstr_source;

    let info = exception_info(&mut excepinfo);
    assert_eq!(info.code, E_FAIL);
    assert_eq!(info.source, "Server");
    assert_eq!(info.description, "Broken");
    assert_eq!(info.help, "server.hlp [12]");
    assert!(!bstr_is_live(source));
    assert!(excepinfo.bstr_source.is_null());
}

#[test]
fn test_exception_code_prefers_wcode() {
    let mut excepinfo = EXCEPINFO::default();
    excepinfo.w_code = 11;
    excepinfo.scode = E_FAIL;
    let err = check_hresult(DISP_E_EXCEPTION, "Divide", Some(&mut excepinfo), 0, 2).unwrap_err();
    let AxError::Exception { member, info } = err else {
        panic!("expected an exception, got {err:?}");
    };
    assert_eq!(member, "Divide");
    assert_eq!(info.code, 11);
    assert!(info.help.is_empty());
}
