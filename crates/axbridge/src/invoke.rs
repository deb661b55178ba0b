//! Dynamic invocation through `IDispatch`
//!
//! A call goes through explicit stages: the member name is resolved to a
//! DISPID (retrying a `set` name as a property put), the arguments are
//! encoded and `Invoke` is called, then the result and by-reference
//! arguments are decoded. `HRESULT`s become [`AxError`]s in
//! [`check_hresult`] and nowhere else.

use std::cell::RefCell;
use std::collections::HashMap;
use std::ptr::null_mut;

use axcom::oleauto::{bstr_to_string, sys_free_string, variant_clear};
use axcom::*;

use crate::codec::{from_com_variant, release_com_variant, to_com_variant};
use crate::error::{AxError, ExceptionInfo, Result};
use crate::meta::{InvokeKind, MetaObject, is_reference, normalize_signature, split_top_level};
use crate::value::Value;

// =============================================================================
// DISPID cache
// =============================================================================

/// Member name to DISPID, per wrapped object
#[derive(Debug, Default)]
pub struct DispidCache {
    ids: RefCell<HashMap<String, DISPID>>,
}

impl DispidCache {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<DISPID> {
        self.ids.borrow().get(name).copied()
    }

    pub fn insert(&self, name: &str, dispid: DISPID) {
        self.ids.borrow_mut().insert(name.to_string(), dispid);
    }

    pub fn clear(&self) {
        self.ids.borrow_mut().clear();
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.borrow().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

// =============================================================================
// Requests
// =============================================================================

/// How a member is accessed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallKind {
    /// A method, or a property read with arguments
    Method,
    Get,
    Put,
    PutRef,
}

impl CallKind {
    fn flags(self) -> u16 {
        match self {
            CallKind::Method => DISPATCH_METHOD | DISPATCH_PROPERTYGET,
            CallKind::Get => DISPATCH_PROPERTYGET,
            CallKind::Put => DISPATCH_PROPERTYPUT,
            CallKind::PutRef => DISPATCH_PROPERTYPUTREF,
        }
    }

    fn is_put(self) -> bool {
        matches!(self, CallKind::Put | CallKind::PutRef)
    }
}

/// Encoding of one argument
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ArgHint {
    pub type_name: String,
    pub by_ref: bool,
}

impl ArgHint {
    fn of(type_name: &str) -> Self {
        Self {
            type_name: type_name.to_string(),
            by_ref: is_reference(type_name),
        }
    }
}

/// A call ready to be sent
#[derive(Debug, Clone, PartialEq)]
pub struct CallRequest {
    /// Member name without parameters
    pub member: String,
    pub kind: CallKind,
    pub return_type: String,
    /// One per argument that is sent
    pub hints: Vec<ArgHint>,
}

/// Split inline arguments at commas outside double quotes.
fn split_inline(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut quoted = false;
    let mut start = 0;
    for (i, c) in text.char_indices() {
        match c {
            '"' => quoted = !quoted,
            ',' if !quoted => {
                parts.push(text[start..i].trim());
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(text[start..].trim());
    parts
}

/// Values written in a call string: `Add(2, 3)`, `SetText("a, b")`.
///
/// Quoted text is a string, `true`/`false` a bool, numbers are int or
/// double, enum keys of `meta` their value; anything else is a string.
pub fn parse_inline_args(text: &str, meta: &MetaObject) -> Vec<Value> {
    if text.trim().is_empty() {
        return Vec::new();
    }
    split_inline(text)
        .into_iter()
        .map(|arg| {
            if arg.len() >= 2 && arg.starts_with('"') && arg.ends_with('"') {
                return Value::String(arg[1..arg.len() - 1].to_string());
            }
            match arg {
                "true" => return Value::Bool(true),
                "false" => return Value::Bool(false),
                _ => {}
            }
            if let Ok(int) = arg.parse::<i32>() {
                return Value::Int(int);
            }
            if let Ok(double) = arg.parse::<f64>() {
                return Value::Double(double);
            }
            match meta.enum_value(arg) {
                Some(value) => Value::Int(value),
                None => Value::String(arg.to_string()),
            }
        })
        .collect()
}

/// Replace a key of enum `type_name` by its value.
fn enum_key_to_value(meta: &MetaObject, type_name: &str, arg: &mut Value) {
    let Value::String(key) = arg else {
        return;
    };
    let value = meta
        .enumerator(type_name.trim_end_matches('&'))
        .and_then(|meta_enum| meta_enum.value_of(key));
    if let Some(value) = value {
        *arg = Value::Int(value);
    }
}

/// Work out what `function` means for `meta` and build the request.
///
/// `function` with parentheses is a method, looked up among the slots by
/// its normalized signature; without, it is a property, written when one
/// argument is given and read otherwise. A method call without arguments
/// takes its arguments from the call string. Arguments beyond the method's
/// parameters are dropped; string arguments to enum parameters become the
/// key's value.
pub fn prepare_call(meta: &MetaObject, function: &str, args: &mut Vec<Value>) -> CallRequest {
    let Some(open) = function.find('(') else {
        let name = function.trim().to_string();
        let type_name = meta
            .property(&name)
            .map(|p| p.type_name.clone())
            .unwrap_or_default();
        args.truncate(1);
        if let Some(arg) = args.first_mut() {
            enum_key_to_value(meta, &type_name, arg);
        }
        return if args.len() == 1 {
            CallRequest {
                member: name,
                kind: CallKind::Put,
                return_type: String::new(),
                hints: vec![ArgHint {
                    type_name,
                    by_ref: false,
                }],
            }
        } else {
            CallRequest {
                member: name,
                kind: CallKind::Get,
                return_type: type_name,
                hints: Vec::new(),
            }
        };
    };

    let normalized = normalize_signature(function);
    let member = function[..open].trim().to_string();
    let slot = meta.slot(&normalized);
    let inner = function[open + 1..]
        .rsplit_once(')')
        .map_or("", |(inner, _)| inner);

    let parsed = slot.is_none() && args.is_empty() && !inner.trim().is_empty();
    if parsed {
        *args = parse_inline_args(inner, meta);
    }

    let (return_type, types) = match slot {
        Some(slot) => (slot.return_type.clone(), slot.parameter_types.clone()),
        None if parsed => (String::new(), vec![String::new(); args.len()]),
        None if inner.trim().is_empty() => (String::new(), Vec::new()),
        None => (
            String::new(),
            split_top_level(inner)
                .into_iter()
                .map(|ty| ty.trim().to_string())
                .collect(),
        ),
    };
    args.truncate(types.len());

    if !parsed {
        for (arg, type_name) in args.iter_mut().zip(&types) {
            enum_key_to_value(meta, type_name, arg);
        }
    }

    let hints = if parsed {
        vec![ArgHint::default(); args.len()]
    } else {
        types.iter().take(args.len()).map(|t| ArgHint::of(t)).collect()
    };
    let kind = match slot.map(|slot| slot.invoke) {
        Some(InvokeKind::PropertyGet) => CallKind::Get,
        _ => CallKind::Method,
    };
    CallRequest {
        member,
        kind,
        return_type,
        hints,
    }
}

// =============================================================================
// Failure mapping
// =============================================================================

fn take_bstr(bstr: &mut BSTR) -> String {
    let text = bstr_to_string(*bstr);
    sys_free_string(*bstr);
    *bstr = null_mut();
    text
}

/// Read and free the exception a server reported, running its deferred
/// fill-in first.
pub fn exception_info(excepinfo: &mut EXCEPINFO) -> ExceptionInfo {
    if let Some(fill_in) = excepinfo.pfn_deferred_fill_in.take() {
        let hr = unsafe { fill_in(excepinfo) };
        if failed(hr) {
            log::warn!("deferred exception fill-in failed: {hr:#010x}");
        }
    }
    let source = take_bstr(&mut excepinfo.bstr_source);
    let description = take_bstr(&mut excepinfo.bstr_description);
    let help_file = take_bstr(&mut excepinfo.bstr_help_file);
    let help = if help_file.is_empty() {
        help_file
    } else {
        format!("{help_file} [{}]", excepinfo.dw_help_context)
    };
    let code = if excepinfo.w_code != 0 {
        i32::from(excepinfo.w_code)
    } else {
        excepinfo.scode
    };
    ExceptionInfo {
        code,
        source,
        description,
        help,
    }
}

/// Map the `HRESULT` of a call to `member` into the failure taxonomy.
///
/// `argerr` is the reversed argument position the server reported and is
/// translated into a declared position among `arg_count` arguments.
pub fn check_hresult(
    hr: HRESULT,
    member: &str,
    excepinfo: Option<&mut EXCEPINFO>,
    argerr: u32,
    arg_count: usize,
) -> Result<()> {
    if succeeded(hr) {
        return Ok(());
    }
    let member = member.to_string();
    let arg = (arg_count as u32).saturating_sub(argerr.saturating_add(1));
    let err = match hr {
        DISP_E_BADPARAMCOUNT => AxError::BadParamCount { member },
        DISP_E_BADVARTYPE => AxError::BadVarType { member },
        DISP_E_EXCEPTION => AxError::Exception {
            member,
            info: excepinfo.map(exception_info).unwrap_or_default(),
        },
        DISP_E_MEMBERNOTFOUND | DISP_E_UNKNOWNNAME => AxError::MemberNotFound { member },
        DISP_E_NONAMEDARGS => AxError::NoNamedArgs { member },
        DISP_E_OVERFLOW => AxError::Overflow { member },
        DISP_E_PARAMNOTFOUND => AxError::ParamNotFound { member, arg },
        DISP_E_TYPEMISMATCH => AxError::TypeMismatch { member, arg },
        DISP_E_UNKNOWNINTERFACE => AxError::UnknownInterface { member },
        DISP_E_UNKNOWNLCID => AxError::UnknownLcid { member },
        DISP_E_PARAMNOTOPTIONAL => AxError::ParamNotOptional { member },
        E_INVALIDARG => AxError::InvalidArguments { member },
        _ => AxError::Com { member, hr },
    };
    Err(err)
}

// =============================================================================
// Invocation
// =============================================================================

/// Encoded arguments in COM order, released on drop
struct DispArgs {
    vars: Vec<VARIANT>,
}

impl DispArgs {
    fn encode(args: &[Value], hints: &[ArgHint]) -> Result<Self> {
        let mut encoded = DispArgs { vars: Vec::with_capacity(args.len()) };
        for (i, arg) in args.iter().enumerate().rev() {
            let hint = hints.get(i).cloned().unwrap_or_default();
            encoded
                .vars
                .push(to_com_variant(arg, &hint.type_name, hint.by_ref)?);
        }
        Ok(encoded)
    }

    /// Argument `i` in declared order
    fn declared(&self, i: usize) -> Option<&VARIANT> {
        let len = self.vars.len();
        len.checked_sub(i + 1).map(|j| &self.vars[j])
    }
}

impl Drop for DispArgs {
    fn drop(&mut self) {
        for var in &mut self.vars {
            release_com_variant(var);
        }
    }
}

/// What `Invoke` reported
struct Outcome {
    hr: HRESULT,
    value: Value,
    excepinfo: EXCEPINFO,
    argerr: u32,
    arg_count: usize,
}

enum Stage {
    Unresolved {
        name: String,
        put: bool,
        retried: bool,
    },
    Resolved {
        dispid: DISPID,
        put: bool,
    },
    Invoked(Outcome),
    Succeeded(Value),
    Failed(AxError),
}

fn resolve(dispatch: &IDispatch, cache: &DispidCache, name: &str) -> std::result::Result<DISPID, HRESULT> {
    if let Some(dispid) = cache.get(name) {
        return Ok(dispid);
    }
    let wide: Vec<u16> = name.encode_utf16().chain(std::iter::once(0)).collect();
    let names = [wide.as_ptr()];
    let mut dispid = DISPID_UNKNOWN;
    let hr = unsafe {
        dispatch.get_ids_of_names(&IID_NULL, names.as_ptr(), 1, LOCALE_USER_DEFAULT, &mut dispid)
    };
    if failed(hr) {
        return Err(hr);
    }
    if dispid == DISPID_UNKNOWN {
        return Err(DISP_E_UNKNOWNNAME);
    }
    cache.insert(name, dispid);
    Ok(dispid)
}

/// `Name` for `setName`, any case of the prefix
fn strip_set_prefix(name: &str) -> Option<&str> {
    let prefix = name.get(..3)?;
    let rest = &name[3..];
    (prefix.eq_ignore_ascii_case("set") && !rest.is_empty()).then_some(rest)
}

fn call(
    dispatch: &IDispatch,
    dispid: DISPID,
    kind: CallKind,
    request: &CallRequest,
    args: &mut [Value],
) -> Result<Outcome> {
    let mut encoded = DispArgs::encode(args, &request.hints)?;
    let mut named = DISPID_PROPERTYPUT;
    let mut params = DISPPARAMS {
        rgvarg: if encoded.vars.is_empty() {
            null_mut()
        } else {
            encoded.vars.as_mut_ptr()
        },
        rgdispid_named_args: null_mut(),
        c_args: encoded.vars.len() as u32,
        c_named_args: 0,
    };
    if kind.is_put() {
        params.rgdispid_named_args = &mut named;
        params.c_named_args = 1;
    }

    let mut result = VARIANT::new();
    let mut excepinfo = EXCEPINFO::default();
    let mut argerr = 0u32;
    let hr = unsafe {
        dispatch.invoke(
            dispid,
            &IID_NULL,
            LOCALE_USER_DEFAULT,
            kind.flags(),
            &mut params,
            if kind.is_put() { null_mut() } else { &mut result },
            &mut excepinfo,
            &mut argerr,
        )
    };

    let mut value = Value::Invalid;
    if succeeded(hr) && !kind.is_put() {
        for (i, arg) in args.iter_mut().enumerate() {
            let Some(var) = encoded.declared(i) else {
                break;
            };
            if var.is_byref() {
                let hint = request.hints.get(i).map_or("", |h| h.type_name.as_str());
                *arg = from_com_variant(var, hint, None);
            }
        }
        value = from_com_variant(&result, &request.return_type, None);
    }
    variant_clear(&mut result);
    drop(encoded);

    Ok(Outcome {
        hr,
        value,
        excepinfo,
        argerr,
        arg_count: args.len(),
    })
}

/// Send `request` to `dispatch`; `args` receive by-reference results.
pub fn invoke(
    dispatch: &IDispatch,
    cache: &DispidCache,
    request: &CallRequest,
    args: &mut [Value],
) -> Result<Value> {
    let keep = request.hints.len().min(args.len());
    let args = &mut args[..keep];
    let mut stage = Stage::Unresolved {
        name: request.member.clone(),
        put: request.kind.is_put(),
        retried: false,
    };
    loop {
        stage = match stage {
            Stage::Unresolved { name, put, retried } => match resolve(dispatch, cache, &name) {
                Ok(dispid) => Stage::Resolved { dispid, put },
                Err(hr) => match strip_set_prefix(&name) {
                    Some(property) if !retried && !put => Stage::Unresolved {
                        name: property.to_string(),
                        put: true,
                        retried: true,
                    },
                    _ => {
                        log::debug!("{}: cannot resolve '{name}': {hr:#010x}", request.member);
                        Stage::Failed(AxError::MemberNotFound {
                            member: request.member.clone(),
                        })
                    }
                },
            },
            Stage::Resolved { dispid, put } => {
                let kind = match (put, request.kind) {
                    (true, CallKind::PutRef) => CallKind::PutRef,
                    (true, _) => CallKind::Put,
                    (false, kind) => kind,
                };
                match call(dispatch, dispid, kind, request, args) {
                    Ok(outcome) => Stage::Invoked(outcome),
                    Err(err) => Stage::Failed(err),
                }
            }
            Stage::Invoked(mut outcome) => match check_hresult(
                outcome.hr,
                &request.member,
                Some(&mut outcome.excepinfo),
                outcome.argerr,
                outcome.arg_count,
            ) {
                Ok(()) => Stage::Succeeded(outcome.value),
                Err(err) => Stage::Failed(err),
            },
            Stage::Succeeded(value) => return Ok(value),
            Stage::Failed(err) => return Err(err),
        };
    }
}
