//! Conversion between [`Value`] and `VARIANT`
//!
//! Every conversion takes the host type name the value is expected to have,
//! as generated from the type library ("int", "short", "color",
//! "List<double>", "variant", ...). The name disambiguates encodings that are
//! identical on the wire: an `I4` is a colour only if the parameter says so.
//!
//! Ownership: [`to_com_variant`] returns a variant the caller owns, including
//! any by-reference cell; [`release_com_variant`] frees exactly that.
//! [`from_com_variant`] never takes ownership of its input.

pub(crate) mod cells;
pub mod color;
pub mod date;
pub mod stock;

use std::ffi::c_void;

use axcom::oleauto::{
    bstr_to_string, safe_array_create, safe_array_create_vector, safe_array_destroy,
    safe_array_get_dim, safe_array_get_element, safe_array_get_lbound, safe_array_get_ubound,
    safe_array_put_element, sys_alloc_string, sys_free_string, variant_clear, variant_init,
};
use axcom::*;

use crate::error::{AxError, Result};
use crate::meta::reference_target;
use crate::value::{Handle, Value, ValueType};

pub use cells::cell_is_live;
use cells::{CellKind, alloc_cell, free_cell};
use color::{color_to_ole, ole_to_color};
use date::{date_only_to_date, date_to_datetime, datetime_to_date, time_only_to_date};
use stock::{StockFont, StockPicture, read_font, read_pixmap};

/// Host type name without the reference marker
fn base_name(type_name: &str) -> &str {
    reference_target(type_name).unwrap_or_else(|| type_name.trim())
}

/// Element type name of `List<T>`
fn list_element(type_name: &str) -> Option<&str> {
    type_name.strip_prefix("List<")?.strip_suffix('>')
}

/// Array element `VARTYPE` for a `List<T>` element name
fn element_vartype(name: &str) -> VARTYPE {
    match name {
        "int" => VT_I4,
        "uint" => VT_UI4,
        "short" => VT_I2,
        "ushort" => VT_UI2,
        "char" => VT_I1,
        "uchar" => VT_UI1,
        "int64" => VT_I8,
        "uint64" => VT_UI8,
        "double" => VT_R8,
        "float" => VT_R4,
        "bool" => VT_BOOL,
        "datetime" | "date" | "time" => VT_DATE,
        "string" => VT_BSTR,
        _ => VT_VARIANT,
    }
}

// =============================================================================
// Encoding
// =============================================================================

/// Encode `value` for a parameter of host type `type_name`.
///
/// The value is first coerced toward `type_name`. With `by_ref` the payload
/// is moved into an indirection cell and the variant is `VT_BYREF`.
/// [`Value::Invalid`] always encodes as `VT_ERROR` / `DISP_E_PARAMNOTFOUND`,
/// the "not supplied" marker; by reference it is a `VT_ERROR | VT_BYREF`
/// cell the server may fill.
pub fn to_com_variant(value: &Value, type_name: &str, by_ref: bool) -> Result<VARIANT> {
    if !value.is_valid() {
        let var = VARIANT::error(DISP_E_PARAMNOTFOUND);
        return if by_ref { into_byref(var, "") } else { Ok(var) };
    }
    let name = base_name(type_name);

    let coerced;
    let value = match ValueType::from_name(name) {
        Some(target) if value.value_type() != Some(target) => match value.convert(target) {
            Some(converted) => {
                coerced = converted;
                &coerced
            }
            None => {
                log::debug!("cannot coerce {} to '{}'", value.type_name(), name);
                value
            }
        },
        _ => value,
    };

    let var = encode(value, name)?;
    if by_ref { into_byref(var, name) } else { Ok(var) }
}

fn encode(value: &Value, name: &str) -> Result<VARIANT> {
    let mut var = VARIANT::new();
    match value {
        Value::Invalid => return Ok(VARIANT::error(DISP_E_PARAMNOTFOUND)),
        Value::Bool(v) => var = VARIANT::from_bool(*v),
        Value::Int(v) => match name {
            "short" if i16::try_from(*v).is_ok() => {
                var.vt = VT_I2;
                var.data.i_val = *v as i16;
            }
            "char" if i8::try_from(*v).is_ok() => {
                var.vt = VT_I1;
                var.data.c_val = *v as i8;
            }
            _ => var = VARIANT::from_i32(*v),
        },
        Value::UInt(v) => match name {
            "ushort" if u16::try_from(*v).is_ok() => {
                var.vt = VT_UI2;
                var.data.ui_val = *v as u16;
            }
            "uchar" if u8::try_from(*v).is_ok() => {
                var.vt = VT_UI1;
                var.data.b_val = *v as u8;
            }
            _ => {
                var.vt = VT_UI4;
                var.data.ul_val = *v;
            }
        },
        Value::Int64(v) => {
            var.vt = VT_I8;
            var.data.ll_val = *v;
        }
        Value::UInt64(v) => {
            var.vt = VT_UI8;
            var.data.ull_val = *v;
        }
        Value::Double(v) => {
            if name == "float" {
                var.vt = VT_R4;
                var.data.flt_val = *v as f32;
            } else {
                var = VARIANT::from_f64(*v);
            }
        }
        Value::String(s) => var = VARIANT::from_bstr(sys_alloc_string(s)),
        Value::Date(d) => var = date_variant(date_only_to_date(*d)),
        Value::Time(t) => var = date_variant(time_only_to_date(*t)),
        Value::DateTime(dt) => var = date_variant(datetime_to_date(Some(*dt))),
        Value::Color(c) => var = VARIANT::from_i32(color_to_ole(*c) as i32),
        Value::Cursor(shape) => var = VARIANT::from_i32(*shape),
        Value::Font(font) => {
            let object = StockFont::create(font).ok_or_else(|| unsupported("font"))?;
            var.vt = VT_DISPATCH;
            var.data.pdisp_val = object.into_raw();
        }
        Value::Pixmap(pixmap) => {
            let object = StockPicture::create(pixmap).ok_or_else(|| unsupported("pixmap"))?;
            var.vt = VT_DISPATCH;
            var.data.pdisp_val = object.into_raw();
        }
        Value::ByteArray(bytes) => {
            let psa = create_vector(VT_UI1, bytes.len())?;
            for (i, byte) in bytes.iter().enumerate() {
                unsafe { safe_array_put_element(psa, &[i as i32], byte as *const u8 as *const c_void) };
            }
            var.vt = VT_ARRAY | VT_UI1;
            var.data.parray = psa;
        }
        Value::StringList(items) => {
            let psa = create_vector(VT_BSTR, items.len())?;
            for (i, item) in items.iter().enumerate() {
                let bstr = sys_alloc_string(item);
                unsafe {
                    safe_array_put_element(psa, &[i as i32], &bstr as *const BSTR as *const c_void)
                };
                sys_free_string(bstr);
            }
            var.vt = VT_ARRAY | VT_BSTR;
            var.data.parray = psa;
        }
        Value::List(items) => var = encode_list(items, name)?,
        Value::UserType { handle, .. } => match handle {
            Handle::Dispatch(dispatch) => {
                var.vt = VT_DISPATCH;
                var.data.pdisp_val = dispatch.clone().into_raw();
            }
            Handle::Unknown(unknown) => {
                var.vt = VT_UNKNOWN;
                var.data.punk_val = unknown.clone().into_raw();
            }
        },
    }
    Ok(var)
}

fn unsupported(type_name: &str) -> AxError {
    AxError::UnsupportedType {
        type_name: type_name.to_string(),
    }
}

fn date_variant(date: DATE) -> VARIANT {
    let mut var = VARIANT::new();
    var.vt = VT_DATE;
    var.data.date = date;
    var
}

fn create_vector(vt: VARTYPE, len: usize) -> Result<*mut SAFEARRAY> {
    let count = u32::try_from(len).map_err(|_| unsupported("list"))?;
    let psa = safe_array_create_vector(vt, 0, count);
    if psa.is_null() {
        return Err(unsupported("list"));
    }
    Ok(psa)
}

/// Store `element` (already encoded as `vt`) at `indices`, then release it.
fn put_encoded(psa: *mut SAFEARRAY, indices: &[i32], mut element: VARIANT, vt: VARTYPE) {
    let hr = unsafe {
        if vt == VT_VARIANT {
            safe_array_put_element(psa, indices, &element as *const VARIANT as *const c_void)
        } else {
            safe_array_put_element(psa, indices, &element.data as *const VariantData as *const c_void)
        }
    };
    if failed(hr) {
        log::warn!("cannot store array element {:?}: {:#010x}", indices, hr);
    }
    variant_clear(&mut element);
}

fn encode_list(items: &[Value], name: &str) -> Result<VARIANT> {
    let mut var = VARIANT::new();

    // A list whose first element is a list is a table
    if let Some(Value::List(first)) = items.first() {
        if !first.is_empty() {
            return encode_table(items, first.len());
        }
    }
    if items.iter().skip(1).any(|item| matches!(item, Value::List(_))) {
        log::debug!("list with a scalar first element holds nested lists; encoding them as nested arrays");
    }

    let element_name = list_element(name).unwrap_or("");
    let vt = element_vartype(element_name);
    let psa = create_vector(vt, items.len())?;
    for (i, item) in items.iter().enumerate() {
        let item_name = if vt == VT_VARIANT { item.type_name() } else { element_name };
        let element = match to_com_variant(item, item_name, false) {
            Ok(element) => element,
            Err(err) => {
                unsafe { safe_array_destroy(psa) };
                return Err(err);
            }
        };
        if vt != VT_VARIANT && element.vt != vt {
            log::warn!("list element {} does not fit {}", item, element_name);
            let mut element = element;
            variant_clear(&mut element);
            unsafe { safe_array_destroy(psa) };
            return Err(unsupported(name));
        }
        put_encoded(psa, &[i as i32], element, vt);
    }
    var.vt = VT_ARRAY | vt;
    var.data.parray = psa;
    Ok(var)
}

/// Two-dimensional array of variants: one row per outer element, as many
/// columns as the first row. Longer rows are cut, shorter ones left empty.
fn encode_table(rows: &[Value], columns: usize) -> Result<VARIANT> {
    let (Ok(row_count), Ok(column_count)) = (u32::try_from(rows.len()), u32::try_from(columns))
    else {
        return Err(unsupported("list"));
    };
    let psa = safe_array_create(
        VT_VARIANT,
        &[SAFEARRAYBOUND::new(row_count, 0), SAFEARRAYBOUND::new(column_count, 0)],
    );
    if psa.is_null() {
        return Err(unsupported("list"));
    }
    for (i, row) in rows.iter().enumerate() {
        let Value::List(cells) = row else {
            log::debug!("row {} of a table is not a list", i);
            continue;
        };
        for (j, cell) in cells.iter().take(columns).enumerate() {
            match to_com_variant(cell, cell.type_name(), false) {
                Ok(element) => put_encoded(psa, &[i as i32, j as i32], element, VT_VARIANT),
                Err(err) => {
                    unsafe { safe_array_destroy(psa) };
                    return Err(err);
                }
            }
        }
    }
    let mut var = VARIANT::new();
    var.vt = VT_ARRAY | VT_VARIANT;
    var.data.parray = psa;
    Ok(var)
}

/// Move the payload of `var` into a by-reference cell.
fn into_byref(mut var: VARIANT, name: &str) -> Result<VARIANT> {
    let mut out = VARIANT::new();
    if name == "variant" {
        out.vt = VT_VARIANT | VT_BYREF;
        out.data.pvar_val = alloc_cell(CellKind::Variant, var);
        return Ok(out);
    }
    let cell: *mut c_void = unsafe {
        if var.is_array() {
            alloc_cell(CellKind::Array, var.data.parray) as *mut c_void
        } else {
            match var.vt {
                VT_I1 | VT_UI1 => alloc_cell(CellKind::Bits8, var.data.b_val) as *mut c_void,
                VT_I2 | VT_UI2 | VT_BOOL => {
                    alloc_cell(CellKind::Bits16, var.data.ui_val) as *mut c_void
                }
                VT_I4 | VT_UI4 | VT_INT | VT_UINT | VT_R4 | VT_ERROR => {
                    alloc_cell(CellKind::Bits32, var.data.ul_val) as *mut c_void
                }
                VT_I8 | VT_UI8 | VT_R8 | VT_DATE | VT_CY => {
                    alloc_cell(CellKind::Bits64, var.data.ull_val) as *mut c_void
                }
                VT_BSTR => alloc_cell(CellKind::Bstr, var.data.bstr_val) as *mut c_void,
                // The reference the variant held moves into the cell
                VT_DISPATCH | VT_UNKNOWN => {
                    alloc_cell(CellKind::Interface, var.data.punk_val) as *mut c_void
                }
                _ => {
                    variant_clear(&mut var);
                    log::warn!("by-reference '{}' parameters are not supported", name);
                    return Err(unsupported(name));
                }
            }
        }
    };
    out.vt = var.vt | VT_BYREF;
    out.data.byref = cell;
    Ok(out)
}

/// Write `value` through the by-reference variant `target`.
///
/// The value is converted to the target's own type, so a server-supplied
/// `VT_BOOL | VT_BYREF` receives a boolean whatever `type_name` says.
pub fn write_com_variant(value: &Value, target: &VARIANT, type_name: &str) -> Result<()> {
    if !target.is_byref() {
        return Err(unsupported(type_name));
    }
    let vt = target.vt & !VT_BYREF;
    let mismatch = || unsupported(type_name);
    unsafe {
        if vt == VT_VARIANT {
            let slot = target.data.pvar_val;
            if slot.is_null() {
                return Err(mismatch());
            }
            let encoded = to_com_variant(value, type_name, false)?;
            variant_clear(&mut *slot);
            *slot = encoded;
            return Ok(());
        }
        if target.data.byref.is_null() {
            return Err(mismatch());
        }
        if vt & VT_ARRAY != 0 {
            let element = element_name_of(vt & VT_TYPEMASK);
            let mut encoded = to_com_variant(value, &element, false)?;
            if !encoded.is_array() {
                variant_clear(&mut encoded);
                return Err(mismatch());
            }
            safe_array_destroy(*target.data.pparray);
            *target.data.pparray = encoded.data.parray;
            return Ok(());
        }
        match vt {
            VT_BOOL => {
                let flag = value.to_bool().ok_or_else(mismatch)?;
                *target.data.pbool_val = if flag { VARIANT_TRUE } else { VARIANT_FALSE };
            }
            VT_I1 => *target.data.pc_val = int_of::<i8>(value).ok_or_else(mismatch)?,
            VT_UI1 => *target.data.pb_val = int_of::<u8>(value).ok_or_else(mismatch)?,
            VT_I2 => *target.data.pi_val = int_of::<i16>(value).ok_or_else(mismatch)?,
            VT_UI2 => *target.data.pui_val = int_of::<u16>(value).ok_or_else(mismatch)?,
            VT_I4 | VT_INT => {
                *target.data.pl_val = match value {
                    Value::Color(c) => color_to_ole(*c) as i32,
                    other => int_of::<i32>(other).ok_or_else(mismatch)?,
                }
            }
            VT_UI4 | VT_UINT => {
                *target.data.pul_val = match value {
                    Value::Color(c) => color_to_ole(*c),
                    other => int_of::<u32>(other).ok_or_else(mismatch)?,
                }
            }
            VT_I8 => *target.data.pll_val = value.to_i64().ok_or_else(mismatch)?,
            VT_UI8 => match value.convert(ValueType::UInt64) {
                Some(Value::UInt64(v)) => *target.data.pull_val = v,
                _ => return Err(mismatch()),
            },
            VT_CY => (*target.data.pcy_val).int64 = value.to_i64().ok_or_else(mismatch)?,
            VT_R4 => *target.data.pflt_val = value.to_f64().ok_or_else(mismatch)? as f32,
            VT_R8 => *target.data.pdbl_val = value.to_f64().ok_or_else(mismatch)?,
            VT_DATE => {
                let date = match value.convert(ValueType::DateTime) {
                    Some(Value::DateTime(dt)) => datetime_to_date(Some(dt)),
                    _ => return Err(mismatch()),
                };
                *target.data.pdate = date;
            }
            VT_BSTR => {
                let text = match value.convert(ValueType::String) {
                    Some(Value::String(s)) => s,
                    _ => return Err(mismatch()),
                };
                sys_free_string(*target.data.pbstr_val);
                *target.data.pbstr_val = sys_alloc_string(&text);
            }
            VT_DISPATCH | VT_UNKNOWN => {
                let object = match value {
                    Value::UserType { handle, .. } => handle.to_raw_ref(),
                    Value::Font(font) => StockFont::create(font)
                        .ok_or_else(mismatch)?
                        .into_raw() as *mut IUnknown,
                    Value::Pixmap(pixmap) => StockPicture::create(pixmap)
                        .ok_or_else(mismatch)?
                        .into_raw() as *mut IUnknown,
                    _ => return Err(mismatch()),
                };
                let slot = target.data.ppunk_val;
                let previous = *slot;
                *slot = object;
                if !previous.is_null() {
                    (*previous).release();
                }
            }
            _ => return Err(mismatch()),
        }
    }
    Ok(())
}

fn int_of<T: TryFrom<i64>>(value: &Value) -> Option<T> {
    value.to_i64().and_then(|v| T::try_from(v).ok())
}

/// Host type name of an array with elements of `vt`
fn element_name_of(vt: VARTYPE) -> String {
    match vt {
        VT_UI1 => "bytes".to_string(),
        VT_BSTR => "stringlist".to_string(),
        VT_VARIANT => "list".to_string(),
        other => {
            let element = match other {
                VT_I4 | VT_INT => "int",
                VT_UI4 | VT_UINT => "uint",
                VT_I2 => "short",
                VT_UI2 => "ushort",
                VT_I1 => "char",
                VT_I8 => "int64",
                VT_UI8 => "uint64",
                VT_R4 => "float",
                VT_R8 => "double",
                VT_BOOL => "bool",
                VT_DATE => "datetime",
                _ => return "list".to_string(),
            };
            format!("List<{element}>")
        }
    }
}

/// Release what `to_com_variant` allocated for `var` and reset it to `VT_EMPTY`.
///
/// By-reference variants free their cell; pointers that are not codec cells
/// are left alone. Releasing an empty variant does nothing.
pub fn release_com_variant(var: &mut VARIANT) {
    if var.is_byref() {
        unsafe { free_cell(var.data.byref) };
        variant_init(var);
    } else {
        let hr = variant_clear(var);
        if failed(hr) {
            log::warn!("variant not released: {:#010x}", hr);
            variant_init(var);
        }
    }
}

// =============================================================================
// Decoding
// =============================================================================

/// One level of `VT_BYREF` removed; the result borrows from `var`.
fn deref(var: &VARIANT) -> Option<VARIANT> {
    if !var.is_byref() {
        return Some(*var);
    }
    let mut out = VARIANT::new();
    out.vt = var.vt & !VT_BYREF;
    unsafe {
        if var.data.byref.is_null() {
            return None;
        }
        if out.vt == VT_VARIANT {
            return Some(*var.data.pvar_val);
        }
        if out.vt & VT_ARRAY != 0 {
            out.data.parray = *var.data.pparray;
            return Some(out);
        }
        match out.vt {
            VT_I1 | VT_UI1 => out.data.b_val = *var.data.pb_val,
            VT_I2 | VT_UI2 | VT_BOOL => out.data.ui_val = *var.data.pui_val,
            VT_I4 | VT_UI4 | VT_INT | VT_UINT | VT_R4 | VT_ERROR | VT_HRESULT => {
                out.data.ul_val = *var.data.pul_val
            }
            VT_I8 | VT_UI8 | VT_R8 | VT_DATE | VT_CY => out.data.ull_val = *var.data.pull_val,
            VT_BSTR => out.data.bstr_val = *var.data.pbstr_val,
            VT_DISPATCH | VT_UNKNOWN => out.data.punk_val = *var.data.ppunk_val,
            _ => return None,
        }
    }
    Some(out)
}

/// Decode `var`, expected to be of host type `type_name`.
///
/// Integers become colours or cursors only when `type_name` says so.
/// Interface pointers are AddRef'd into a [`Handle`]. Afterwards the value
/// is coerced to `hint` (or the tag `type_name` names); a failed coercion
/// yields [`Value::Invalid`].
#[must_use]
pub fn from_com_variant(var: &VARIANT, type_name: &str, hint: Option<ValueType>) -> Value {
    let name = base_name(type_name);
    let Some(var) = deref(var) else {
        log::warn!("cannot dereference variant of type {:#06x}", var.vt);
        return Value::Invalid;
    };
    let value = decode(&var, name);

    match hint.or_else(|| ValueType::from_name(name)) {
        Some(target) if value.is_valid() => value.coerce(target),
        _ => value,
    }
}

fn decode(var: &VARIANT, name: &str) -> Value {
    if var.is_array() {
        return decode_array(unsafe { var.data.parray }, var.vt & VT_TYPEMASK);
    }
    unsafe {
        match var.vt {
            VT_EMPTY | VT_NULL => Value::Invalid,
            VT_BSTR => Value::String(bstr_to_string(var.data.bstr_val)),
            VT_BOOL => Value::Bool(var.data.bool_val != VARIANT_FALSE),
            VT_I1 => Value::Int(i32::from(var.data.c_val)),
            VT_UI1 => Value::Int(i32::from(var.data.b_val)),
            VT_I2 => Value::Int(i32::from(var.data.i_val)),
            VT_UI2 => Value::Int(i32::from(var.data.ui_val)),
            VT_I4 | VT_INT | VT_HRESULT => match name {
                "color" => Value::Color(ole_to_color(var.data.ul_val)),
                "cursor" => Value::Cursor(var.data.l_val),
                _ => Value::Int(var.data.l_val),
            },
            VT_UI4 | VT_UINT => match name {
                "color" => Value::Color(ole_to_color(var.data.ul_val)),
                "cursor" => Value::Cursor(var.data.l_val),
                _ => Value::UInt(var.data.ul_val),
            },
            VT_I8 => Value::Int64(var.data.ll_val),
            VT_CY => Value::Int64(var.data.cy_val.int64),
            VT_UI8 => Value::UInt64(var.data.ull_val),
            VT_R4 => Value::Double(f64::from(var.data.flt_val)),
            VT_R8 => Value::Double(var.data.dbl_val),
            VT_DATE => match date_to_datetime(var.data.date) {
                Some(dt) => Value::DateTime(dt),
                None => Value::Invalid,
            },
            VT_ERROR if var.data.scode == DISP_E_PARAMNOTFOUND => Value::Invalid,
            VT_ERROR => Value::Int(var.data.scode),
            VT_DISPATCH => decode_dispatch(var.data.pdisp_val, name),
            VT_UNKNOWN => decode_unknown(var.data.punk_val, name),
            other => {
                log::warn!("unsupported variant type {:#06x}", other);
                Value::Invalid
            }
        }
    }
}

fn decode_dispatch(pdisp: *mut IDispatch, name: &str) -> Value {
    let Some(dispatch) = (unsafe { ComPtr::from_borrowed(pdisp) }) else {
        return Value::Invalid;
    };
    match name {
        "font" => {
            if let Some(font) = read_font(&dispatch) {
                return Value::Font(font);
            }
        }
        "pixmap" => {
            if let Some(pixmap) = read_pixmap(&dispatch) {
                return Value::Pixmap(pixmap);
            }
        }
        _ => {}
    }
    Value::UserType {
        name: "IDispatch*".to_string(),
        handle: Handle::Dispatch(dispatch),
    }
}

fn decode_unknown(punk: *mut IUnknown, name: &str) -> Value {
    let Some(unknown) = (unsafe { ComPtr::from_borrowed(punk) }) else {
        return Value::Invalid;
    };
    if name == "IDispatch*" {
        if let Ok(dispatch) = unknown.cast::<IDispatch>() {
            return Value::UserType {
                name: "IDispatch*".to_string(),
                handle: Handle::Dispatch(dispatch),
            };
        }
    }
    Value::UserType {
        name: "IUnknown*".to_string(),
        handle: Handle::Unknown(unknown),
    }
}

/// Element at `indices`, as an owned variant
fn get_element(psa: *mut SAFEARRAY, indices: &[i32], vt: VARTYPE) -> Option<VARIANT> {
    let mut element = VARIANT::new();
    let hr = unsafe {
        if vt == VT_VARIANT {
            safe_array_get_element(psa, indices, &mut element as *mut VARIANT as *mut c_void)
        } else {
            element.vt = vt;
            safe_array_get_element(psa, indices, &mut element.data as *mut VariantData as *mut c_void)
        }
    };
    if failed(hr) {
        log::warn!("cannot read array element {:?}: {:#010x}", indices, hr);
        return None;
    }
    Some(element)
}

fn decode_element(psa: *mut SAFEARRAY, indices: &[i32], vt: VARTYPE) -> Value {
    match get_element(psa, indices, vt) {
        Some(mut element) => {
            let value = from_com_variant(&element, "", None);
            variant_clear(&mut element);
            value
        }
        None => Value::Invalid,
    }
}

fn bounds(psa: *mut SAFEARRAY, dim: u32) -> std::ops::RangeInclusive<i32> {
    match (safe_array_get_lbound(psa, dim), safe_array_get_ubound(psa, dim)) {
        (Some(lower), Some(upper)) => lower..=upper,
        _ => 1..=0,
    }
}

fn decode_array(psa: *mut SAFEARRAY, vt: VARTYPE) -> Value {
    if psa.is_null() {
        return Value::Invalid;
    }
    let dims = safe_array_get_dim(psa);
    match vt {
        VT_BSTR => {
            let items = bounds(psa, 1)
                .map(|i| match decode_element(psa, &[i], vt) {
                    Value::String(s) => s,
                    _ => String::new(),
                })
                .collect();
            Value::StringList(items)
        }
        VT_UI1 => {
            let bytes = bounds(psa, 1)
                .map(|i| {
                    let mut byte = 0u8;
                    unsafe { safe_array_get_element(psa, &[i], &mut byte as *mut u8 as *mut c_void) };
                    byte
                })
                .collect();
            Value::ByteArray(bytes)
        }
        _ if dims == 1 => Value::List(bounds(psa, 1).map(|i| decode_element(psa, &[i], vt)).collect()),
        VT_VARIANT if dims == 2 => {
            let rows = bounds(psa, 1)
                .map(|i| {
                    Value::List(
                        bounds(psa, 2)
                            .map(|j| decode_element(psa, &[i, j], vt))
                            .collect(),
                    )
                })
                .collect();
            Value::List(rows)
        }
        _ => {
            log::warn!("arrays with {} dimensions are not supported", dims);
            Value::List(Vec::new())
        }
    }
}
