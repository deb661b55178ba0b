//! Tests for VARIANT encoding and decoding

use axbridge::codec::{cell_is_live, from_com_variant, release_com_variant, to_com_variant, write_com_variant};
use axbridge::{Color, Font, Value, ValueType};
use axcom::oleauto::{bstr_is_live, safe_array_get_dim, safe_array_is_live, sys_alloc_string, variant_clear};
use axcom::*;
use chrono::NaiveDate;

fn round_trip(value: &Value, type_name: &str) -> Value {
    let mut var = to_com_variant(value, type_name, false).expect("encode");
    let decoded = from_com_variant(&var, type_name, None);
    release_com_variant(&mut var);
    decoded
}

// =============================================================================
// Test: Scalars
// =============================================================================

#[test]
fn test_string_goes_through_bstr() {
    let mut var = to_com_variant(&Value::String("hello".into()), "string", false).unwrap();
    assert_eq!(var.vt, VT_BSTR);
    let bstr = unsafe { var.data.bstr_val };
    assert!(bstr_is_live(bstr));
    assert_eq!(from_com_variant(&var, "string", None), Value::String("hello".into()));

    release_com_variant(&mut var);
    assert!(!bstr_is_live(bstr));
    assert_eq!(var.vt, VT_EMPTY);

    // Releasing again leaves the empty variant alone
    release_com_variant(&mut var);
    assert_eq!(var.vt, VT_EMPTY);
}

#[test]
fn test_narrow_integer_types_follow_the_parameter() {
    let mut short = to_com_variant(&Value::Int(-7), "short", false).unwrap();
    assert_eq!(short.vt, VT_I2);
    assert_eq!(from_com_variant(&short, "short", None), Value::Int(-7));
    release_com_variant(&mut short);

    // Out of range for a short: sent as a plain int
    let mut wide = to_com_variant(&Value::Int(100_000), "short", false).unwrap();
    assert_eq!(wide.vt, VT_I4);
    release_com_variant(&mut wide);
}

#[test]
fn test_value_is_coerced_toward_the_parameter_type() {
    let mut var = to_com_variant(&Value::String("42".into()), "int", false).unwrap();
    assert_eq!(var.vt, VT_I4);
    assert_eq!(var.as_i32(), Some(42));
    release_com_variant(&mut var);

    let mut var = to_com_variant(&Value::Int(1), "bool", false).unwrap();
    assert_eq!(var.vt, VT_BOOL);
    release_com_variant(&mut var);
}

#[test]
fn test_invalid_value_means_parameter_not_supplied() {
    let var = to_com_variant(&Value::Invalid, "int", false).unwrap();
    assert_eq!(var.vt, VT_ERROR);
    assert_eq!(var.as_error(), Some(DISP_E_PARAMNOTFOUND));
    assert_eq!(from_com_variant(&var, "variant", None), Value::Invalid);
}

#[test]
fn test_integer_is_a_colour_only_when_the_type_says_so() {
    let var = VARIANT::from_i32(0x0000_FF00);
    assert_eq!(from_com_variant(&var, "int", None), Value::Int(0x0000_FF00));
    assert_eq!(
        from_com_variant(&var, "color", None),
        Value::Color(Color::rgb(0x00, 0xFF, 0x00))
    );
    assert_eq!(from_com_variant(&var, "cursor", None), Value::Cursor(0x0000_FF00));
}

#[test]
fn test_colour_encodes_as_ole_color() {
    assert_eq!(round_trip(&Value::Color(Color::rgb(1, 2, 3)), "color"), Value::Color(Color::rgb(1, 2, 3)));
    let mut var = to_com_variant(&Value::Color(Color::rgb(0x11, 0x22, 0x33)), "color", false).unwrap();
    assert_eq!(var.as_i32(), Some(0x0033_2211));
    release_com_variant(&mut var);
}

#[test]
fn test_failed_coercion_to_hint_is_invalid() {
    let mut var = VARIANT::from_bstr(sys_alloc_string("not a number"));
    assert_eq!(from_com_variant(&var, "", Some(ValueType::Int)), Value::Invalid);
    assert_eq!(
        from_com_variant(&var, "", None),
        Value::String("not a number".into())
    );
    variant_clear(&mut var);
}

// =============================================================================
// Test: Dates
// =============================================================================

#[test]
fn test_datetime_round_trip() {
    let noon = NaiveDate::from_ymd_opt(2024, 2, 29)
        .unwrap()
        .and_hms_opt(12, 0, 0)
        .unwrap();
    let mut var = to_com_variant(&Value::DateTime(noon), "datetime", false).unwrap();
    assert_eq!(var.vt, VT_DATE);
    assert_eq!(from_com_variant(&var, "datetime", None), Value::DateTime(noon));
    release_com_variant(&mut var);
}

#[test]
fn test_date_sentinel_decodes_to_invalid() {
    let mut var = VARIANT::new();
    var.vt = VT_DATE;
    var.data.date = 949_998.0;
    assert_eq!(from_com_variant(&var, "datetime", None), Value::Invalid);
}

// =============================================================================
// Test: Arrays
// =============================================================================

#[test]
fn test_typed_list_uses_a_typed_array() {
    let list = Value::List(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
    let mut var = to_com_variant(&list, "List<int>", false).unwrap();
    assert_eq!(var.vt, VT_ARRAY | VT_I4);
    let psa = unsafe { var.data.parray };
    assert!(safe_array_is_live(psa));
    assert_eq!(from_com_variant(&var, "List<int>", None), list);
    release_com_variant(&mut var);
    assert!(!safe_array_is_live(psa));
}

#[test]
fn test_list_of_lists_becomes_a_table() {
    let table = Value::List(vec![
        Value::List(vec![Value::Int(1), Value::String("a".into())]),
        Value::List(vec![Value::Int(2), Value::String("b".into())]),
    ]);
    let mut var = to_com_variant(&table, "list", false).unwrap();
    assert_eq!(var.vt, VT_ARRAY | VT_VARIANT);
    assert_eq!(safe_array_get_dim(unsafe { var.data.parray }), 2);
    assert_eq!(from_com_variant(&var, "list", None), table);
    release_com_variant(&mut var);
}

#[test]
fn test_scalar_first_keeps_later_lists_nested() {
    let mixed = Value::List(vec![
        Value::Int(1),
        Value::List(vec![Value::Int(2), Value::Int(3)]),
    ]);
    let mut var = to_com_variant(&mixed, "list", false).unwrap();
    assert_eq!(safe_array_get_dim(unsafe { var.data.parray }), 1);
    assert_eq!(from_com_variant(&var, "list", None), mixed);
    release_com_variant(&mut var);
}

#[test]
fn test_typed_list_refuses_a_foreign_element() {
    let list = Value::List(vec![Value::Int(1), Value::String("abc".into()), Value::Int(3)]);
    assert!(to_com_variant(&list, "List<int>", false).is_err());

    // Untyped lists take anything
    let mut var = to_com_variant(&list, "list", false).unwrap();
    assert_eq!(var.vt, VT_ARRAY | VT_VARIANT);
    release_com_variant(&mut var);
}

#[test]
fn test_string_list_and_bytes() {
    let strings = Value::StringList(vec!["x".into(), "y".into()]);
    assert_eq!(round_trip(&strings, "stringlist"), strings);
    let bytes = Value::ByteArray(vec![0, 1, 254, 255]);
    assert_eq!(round_trip(&bytes, "bytes"), bytes);
}

// =============================================================================
// Test: By-reference arguments
// =============================================================================

#[test]
fn test_byref_cell_is_released_once() {
    let mut var = to_com_variant(&Value::Int(5), "int&", true).unwrap();
    assert!(var.is_byref());
    assert_eq!(var.base_type(), VT_I4);
    let cell = unsafe { var.data.byref };
    assert!(cell_is_live(cell));
    assert_eq!(from_com_variant(&var, "int&", None), Value::Int(5));

    write_com_variant(&Value::Int(9), &var, "int&").unwrap();
    assert_eq!(from_com_variant(&var, "int&", None), Value::Int(9));

    release_com_variant(&mut var);
    assert!(!cell_is_live(cell));
    release_com_variant(&mut var);
    assert_eq!(var.vt, VT_EMPTY);
}

#[test]
fn test_byref_string_frees_its_bstr() {
    let mut var = to_com_variant(&Value::String("in".into()), "string&", true).unwrap();
    write_com_variant(&Value::String("out".into()), &var, "string&").unwrap();
    let bstr = unsafe { *var.data.pbstr_val };
    assert!(bstr_is_live(bstr));
    assert_eq!(from_com_variant(&var, "string", None), Value::String("out".into()));
    release_com_variant(&mut var);
    assert!(!bstr_is_live(bstr));
}

#[test]
fn test_write_back_follows_the_target_type() {
    let mut flag: i16 = VARIANT_FALSE;
    let mut target = VARIANT::new();
    target.vt = VT_BOOL | VT_BYREF;
    target.data.pbool_val = &mut flag;
    write_com_variant(&Value::Bool(true), &target, "bool&").unwrap();
    assert_eq!(flag, VARIANT_TRUE);

    // Not a by-reference variant: nothing to write through
    let plain = VARIANT::from_i32(0);
    assert!(write_com_variant(&Value::Int(1), &plain, "int").is_err());
}

#[test]
fn test_unset_out_parameter_is_an_error_cell() {
    let mut var = to_com_variant(&Value::Invalid, "int&", true).unwrap();
    assert!(var.is_byref());
    assert_eq!(var.base_type(), VT_ERROR);
    let cell = unsafe { var.data.byref };
    assert!(cell_is_live(cell));
    assert_eq!(unsafe { *var.data.pscode }, DISP_E_PARAMNOTFOUND);
    assert_eq!(from_com_variant(&var, "int&", None), Value::Invalid);

    release_com_variant(&mut var);
    assert!(!cell_is_live(cell));
}

#[test]
fn test_byref_font_holds_an_interface_cell() {
    let mut var = to_com_variant(&Value::Font(Font::new("Arial", 10.0)), "font*", true).unwrap();
    assert!(var.is_byref());
    assert_eq!(var.base_type(), VT_DISPATCH);
    let cell = unsafe { var.data.byref };
    assert!(cell_is_live(cell));
    match from_com_variant(&var, "font*", None) {
        Value::Font(font) => assert_eq!(font.family, "Arial"),
        other => panic!("expected a font, got {:?}", other),
    }

    write_com_variant(&Value::Font(Font::new("Courier", 12.0)), &var, "font*").unwrap();
    match from_com_variant(&var, "font*", None) {
        Value::Font(font) => assert_eq!(font.family, "Courier"),
        other => panic!("expected a font, got {:?}", other),
    }
    assert!(write_com_variant(&Value::Int(1), &var, "font*").is_err());

    release_com_variant(&mut var);
    assert!(!cell_is_live(cell));
}

#[test]
fn test_byref_typed_list() {
    let list = Value::List(vec![Value::Int(4), Value::Int(5), Value::Int(6)]);
    let mut var = to_com_variant(&list, "List<int>&", true).unwrap();
    assert!(var.is_byref());
    assert_eq!(var.vt, VT_ARRAY | VT_I4 | VT_BYREF);
    let cell = unsafe { var.data.byref };
    let psa = unsafe { *var.data.pparray };
    assert!(cell_is_live(cell));
    assert!(safe_array_is_live(psa));
    assert_eq!(from_com_variant(&var, "List<int>&", None), list);

    release_com_variant(&mut var);
    assert!(!cell_is_live(cell));
    assert!(!safe_array_is_live(psa));
}

#[test]
fn test_byref_table() {
    let table = Value::List(vec![
        Value::List(vec![Value::Int(1), Value::Double(1.5)]),
        Value::List(vec![Value::Int(2), Value::Double(2.5)]),
        Value::List(vec![Value::Int(3), Value::Double(3.5)]),
    ]);
    let mut var = to_com_variant(&table, "list&", true).unwrap();
    assert_eq!(var.vt, VT_ARRAY | VT_VARIANT | VT_BYREF);
    let psa = unsafe { *var.data.pparray };
    assert_eq!(safe_array_get_dim(psa), 2);
    assert_eq!(from_com_variant(&var, "list&", None), table);

    release_com_variant(&mut var);
    assert!(!safe_array_is_live(psa));
}
