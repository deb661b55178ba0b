//! A sample control: `CalcLib.Calculator`
//!
//! Small, but it covers the shapes a bridge has to cope with: a get/put
//! property, a bindable property of a user type, a dispatch variable,
//! optional and by-reference parameters, `[retval]` returns, arrays, enums
//! whose constant names clash, an inherited interface and an event interface
//! with a by-reference argument.

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::rc::Rc;

use axcom::oleauto::{
    safe_array_create_vector, safe_array_get_element, safe_array_get_lbound, safe_array_get_ubound,
    safe_array_get_vartype, safe_array_put_element, sys_alloc_string, sys_free_string,
    variant_clear,
};
use axcom::*;

use crate::dispatch::{AutomationObject, CallKind, DispatchCall};
use crate::model::{LibraryModel, TypeLibBuilder, TypeSpec};

pub const LIBID_CALCLIB: GUID = GUID::new(
    0x6A1C0A52,
    0x5D0E,
    0x4D3B,
    [0x9F, 0x43, 0x2F, 0x4F, 0x1E, 0x2D, 0x3C, 0x01],
);
pub const IID_ICALCBASE: GUID = GUID::new(
    0x6A1C0A52,
    0x5D0E,
    0x4D3B,
    [0x9F, 0x43, 0x2F, 0x4F, 0x1E, 0x2D, 0x3C, 0x02],
);
pub const IID_ICALC: GUID = GUID::new(
    0x6A1C0A52,
    0x5D0E,
    0x4D3B,
    [0x9F, 0x43, 0x2F, 0x4F, 0x1E, 0x2D, 0x3C, 0x03],
);
pub const IID_ICALCEVENTS: GUID = GUID::new(
    0x6A1C0A52,
    0x5D0E,
    0x4D3B,
    [0x9F, 0x43, 0x2F, 0x4F, 0x1E, 0x2D, 0x3C, 0x04],
);
pub const CLSID_CALCULATOR: GUID = GUID::new(
    0x6A1C0A52,
    0x5D0E,
    0x4D3B,
    [0x9F, 0x43, 0x2F, 0x4F, 0x1E, 0x2D, 0x3C, 0x10],
);

pub const DISPID_NAME: DISPID = 1;
pub const DISPID_ADD: DISPID = 2;
pub const DISPID_SCALE: DISPID = 3;
pub const DISPID_DIVIDE: DISPID = 4;
pub const DISPID_COUNT: DISPID = 5;
pub const DISPID_COLOR: DISPID = 6;
pub const DISPID_TAG: DISPID = 7;
pub const DISPID_SWAP: DISPID = 8;
pub const DISPID_MODE: DISPID = 9;
pub const DISPID_FAIL: DISPID = 10;
pub const DISPID_SUM: DISPID = 11;
pub const DISPID_ITEMS: DISPID = 12;
pub const DISPID_RESET: DISPID = 13;
pub const DISPID_ABOUT: DISPID = 0x60;

/// The `CalcLib` type library
#[must_use]
pub fn library() -> Rc<LibraryModel> {
    TypeLibBuilder::new("CalcLib", LIBID_CALCLIB)
        .doc("Calculator sample library")
        .enumeration("CalcMode", |e| e.value("Fast", 0).value("Precise", 1))
        .enumeration("Alignment", |e| e.value("Left", 1).value("Right", 2).value("Center", 4))
        .enumeration("Direction", |e| e.value("Left", 0).value("Right", 1))
        .anonymous_enumeration(|e| e.value("Ready", 0).unnamed(1))
        .dispinterface("ICalcBase", IID_ICALCBASE, |i| {
            i.method(DISPID_ABOUT, "About", |f| f.retval(TypeSpec::Bstr))
        })
        .dispinterface("ICalc", IID_ICALC, |i| {
            i.inherits("ICalcBase")
                .doc("Arithmetic with a name")
                .property(DISPID_NAME, "Name", TypeSpec::Bstr)
                .method(DISPID_ADD, "Add", |f| {
                    f.param("a", TypeSpec::I4)
                        .param("b", TypeSpec::I4)
                        .returns(TypeSpec::I4)
                })
                .method(DISPID_SCALE, "Scale", |f| {
                    f.param("value", TypeSpec::R8)
                        .optional("factor", TypeSpec::Variant)
                        .retval(TypeSpec::R8)
                })
                .method(DISPID_DIVIDE, "Divide", |f| {
                    f.param("a", TypeSpec::R8)
                        .param("b", TypeSpec::R8)
                        .retval(TypeSpec::R8)
                })
                .readonly_property(DISPID_COUNT, "Count", TypeSpec::I4)
                .bindable_property(DISPID_COLOR, "Color", TypeSpec::user("OLE_COLOR"))
                .variable(DISPID_TAG, "Tag", TypeSpec::Bstr, 0)
                .method(DISPID_SWAP, "Swap", |f| {
                    f.in_out("a", TypeSpec::I4).in_out("b", TypeSpec::I4)
                })
                .property(DISPID_MODE, "Mode", TypeSpec::user("CalcMode"))
                .method(DISPID_FAIL, "Fail", |f| f)
                .method(DISPID_SUM, "Sum", |f| {
                    f.param("values", TypeSpec::safe_array(TypeSpec::Variant))
                        .retval(TypeSpec::R8)
                })
                .readonly_property(DISPID_ITEMS, "Items", TypeSpec::safe_array(TypeSpec::Bstr))
                .method(DISPID_RESET, "Reset", |f| f.retval(TypeSpec::Bool))
        })
        .dispinterface("ICalcEvents", IID_ICALCEVENTS, |i| {
            i.method(1, "Computed", |f| f.param("result", TypeSpec::R8))
                .method(2, "BeforeReset", |f| f.in_out("cancel", TypeSpec::Bool))
                .method(3, "Renamed", |f| f.param("name", TypeSpec::Bstr))
        })
        .coclass("Calculator", CLSID_CALCULATOR, |c| {
            c.default_interface("ICalc")
                .source("ICalcEvents")
                .version(1, 2)
                .doc("Calculator control")
        })
        .build()
}

/// Observable state of one calculator
#[derive(Debug, Default)]
pub struct CalculatorState {
    pub name: RefCell<String>,
    pub tag: RefCell<String>,
    pub calls: Cell<i32>,
    pub color: Cell<u32>,
    pub mode: Cell<i32>,
}

/// A new calculator over `lib` together with its state.
pub fn create(lib: &Rc<LibraryModel>) -> Option<(ComBox<AutomationObject>, Rc<CalculatorState>)> {
    let state = Rc::new(CalculatorState::default());
    let shared = state.clone();
    let object = AutomationObject::new(lib, "Calculator", move |call: &mut DispatchCall<'_>| {
        shared.calls.set(shared.calls.get() + 1);
        handle(&shared, call)
    })?;
    Some((object, state))
}

fn handle(state: &CalculatorState, call: &mut DispatchCall<'_>) -> Result<(), HRESULT> {
    match (call.dispid(), call.kind()) {
        (DISPID_ABOUT, _) => call.set_result_string("CalcLib sample calculator"),
        (DISPID_NAME, CallKind::Get) => {
            let name = state.name.borrow().clone();
            call.set_result_string(&name);
        }
        (DISPID_NAME, CallKind::Put) => {
            let name = call.arg_string(0)?;
            *state.name.borrow_mut() = name.clone();
            let mut args = [VARIANT::from_bstr(sys_alloc_string(&name))];
            let fired = call.events().fire("Renamed", &mut args);
            variant_clear(&mut args[0]);
            fired?;
        }
        (DISPID_ADD, _) => {
            let sum = call
                .arg_i32(0)?
                .checked_add(call.arg_i32(1)?)
                .ok_or(DISP_E_OVERFLOW)?;
            call.set_result_i32(sum);
            call.events()
                .fire("Computed", &mut [VARIANT::from_f64(f64::from(sum))])?;
        }
        (DISPID_SCALE, _) => {
            let factor = if call.is_missing(1) { 1.0 } else { call.arg_f64(1)? };
            call.set_result_f64(call.arg_f64(0)? * factor);
        }
        (DISPID_DIVIDE, _) => {
            let divisor = call.arg_f64(1)?;
            if divisor == 0.0 {
                return Err(call.raise(11, "Calculator", "Division by zero"));
            }
            call.set_result_f64(call.arg_f64(0)? / divisor);
        }
        (DISPID_COUNT, _) => call.set_result_i32(state.calls.get()),
        (DISPID_COLOR, CallKind::Get) => {
            let mut value = VARIANT::new();
            value.vt = VT_UI4;
            value.data.ul_val = state.color.get();
            call.set_result(value);
        }
        (DISPID_COLOR, CallKind::Put) => {
            if !call.events().request_edit(DISPID_COLOR) {
                return Ok(());
            }
            state.color.set(call.arg_u32(0)?);
            call.events().property_changed(DISPID_COLOR);
        }
        (DISPID_TAG, CallKind::Get) => {
            let tag = state.tag.borrow().clone();
            call.set_result_string(&tag);
        }
        (DISPID_TAG, CallKind::Put) => *state.tag.borrow_mut() = call.arg_string(0)?,
        (DISPID_SWAP, _) => {
            let (a, b) = (call.arg_i32(0)?, call.arg_i32(1)?);
            call.set_out(0, VARIANT::from_i32(b))?;
            call.set_out(1, VARIANT::from_i32(a))?;
        }
        (DISPID_MODE, CallKind::Get) => call.set_result_i32(state.mode.get()),
        (DISPID_MODE, CallKind::Put) => state.mode.set(call.arg_i32(0)?),
        (DISPID_FAIL, _) => {
            return Err(call.raise_deferred(E_FAIL, "Calculator", "Requested failure"));
        }
        (DISPID_SUM, _) => {
            let total = sum_array(call)?;
            call.set_result_f64(total);
        }
        (DISPID_ITEMS, _) => {
            let items = ["alpha", "beta"];
            let psa = safe_array_create_vector(VT_BSTR, 0, items.len() as u32);
            for (i, item) in items.iter().enumerate() {
                let bstr = sys_alloc_string(item);
                unsafe {
                    safe_array_put_element(psa, &[i as i32], &bstr as *const BSTR as *const c_void);
                }
                sys_free_string(bstr);
            }
            let mut value = VARIANT::new();
            value.vt = VT_ARRAY | VT_BSTR;
            value.data.parray = psa;
            call.set_result(value);
        }
        (DISPID_RESET, _) => {
            let mut cancel = VARIANT_FALSE;
            let mut args = [VARIANT::new()];
            args[0].vt = VT_BOOL | VT_BYREF;
            args[0].data.pbool_val = &mut cancel;
            call.events().fire("BeforeReset", &mut args)?;
            let cancelled = cancel != VARIANT_FALSE;
            if !cancelled {
                state.name.borrow_mut().clear();
                state.tag.borrow_mut().clear();
            }
            call.set_result_bool(!cancelled);
        }
        _ => return Err(DISP_E_MEMBERNOTFOUND),
    }
    Ok(())
}

fn sum_array(call: &DispatchCall<'_>) -> Result<f64, HRESULT> {
    let mut value = call.arg_variant(0)?;
    if value.vt & VT_ARRAY == 0 {
        variant_clear(&mut value);
        return Err(DISP_E_TYPEMISMATCH);
    }
    let psa = unsafe { value.data.parray };
    let (Some(lower), Some(upper)) = (safe_array_get_lbound(psa, 1), safe_array_get_ubound(psa, 1))
    else {
        variant_clear(&mut value);
        return Err(DISP_E_BADINDEX);
    };
    let vartype = safe_array_get_vartype(psa);
    let mut total = 0.0;
    for index in lower..=upper {
        let element = match vartype {
            Some(VT_VARIANT) => {
                let mut element = VARIANT::new();
                let hr = unsafe {
                    safe_array_get_element(psa, &[index], &mut element as *mut VARIANT as *mut c_void)
                };
                if failed(hr) {
                    variant_clear(&mut value);
                    return Err(hr);
                }
                let number = element.as_f64().or_else(|| element.as_i32().map(f64::from));
                variant_clear(&mut element);
                number
            }
            Some(VT_I4) => {
                let mut element = 0i32;
                unsafe {
                    safe_array_get_element(psa, &[index], &mut element as *mut i32 as *mut c_void)
                };
                Some(f64::from(element))
            }
            Some(VT_R8) => {
                let mut element = 0f64;
                unsafe {
                    safe_array_get_element(psa, &[index], &mut element as *mut f64 as *mut c_void)
                };
                Some(element)
            }
            _ => None,
        };
        total += element.unwrap_or(0.0);
    }
    variant_clear(&mut value);
    Ok(total)
}
