//! The host's dynamic value
//!
//! [`Value`] is what callers pass to and get back from an automation object.
//! [`Value::convert`] is the single coercion between tags; the codec uses it
//! to honour type hints and callers use it to read values in the shape they
//! want.

use std::fmt;

use axcom::{ComPtr, IDispatch, IUnknown};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::codec::color::{color_to_ole, ole_to_color};

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";
const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// An RGB colour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    #[must_use]
    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// `#rrggbb`
    #[must_use]
    pub fn name(&self) -> String {
        format!("#{:02x}{:02x}{:02x}", self.r, self.g, self.b)
    }

    /// Parse `#rrggbb`.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let hex = name.trim().strip_prefix('#')?;
        if hex.len() != 6 || !hex.is_ascii() {
            return None;
        }
        let channel = |i: usize| u8::from_str_radix(&hex[i..i + 2], 16).ok();
        Some(Self::rgb(channel(0)?, channel(2)?, channel(4)?))
    }
}

/// A font description, carried across the boundary as a stock font object
#[derive(Debug, Clone, PartialEq)]
pub struct Font {
    pub family: String,
    pub point_size: f64,
    /// 400 is normal, 700 bold
    pub weight: i16,
    pub italic: bool,
    pub underline: bool,
    pub strike_out: bool,
    pub charset: i16,
}

impl Default for Font {
    fn default() -> Self {
        Self {
            family: String::new(),
            point_size: 0.0,
            weight: 400,
            italic: false,
            underline: false,
            strike_out: false,
            charset: 0,
        }
    }
}

impl Font {
    #[must_use]
    pub fn new(family: &str, point_size: f64) -> Self {
        Self {
            family: family.to_string(),
            point_size,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn bold(&self) -> bool {
        self.weight >= 700
    }
}

/// A bitmap handle with its size in HIMETRIC units
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Pixmap {
    pub handle: u32,
    pub width: i32,
    pub height: i32,
}

impl Pixmap {
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.handle == 0
    }
}

/// An interface pointer held by a [`Value::UserType`]
#[derive(Debug, Clone, PartialEq)]
pub enum Handle {
    Dispatch(ComPtr<IDispatch>),
    Unknown(ComPtr<IUnknown>),
}

impl Handle {
    /// The object's `IDispatch`, querying for it if needed.
    #[must_use]
    pub fn dispatch(&self) -> Option<ComPtr<IDispatch>> {
        match self {
            Handle::Dispatch(dispatch) => Some(dispatch.clone()),
            Handle::Unknown(unknown) => unknown.cast::<IDispatch>().ok(),
        }
    }

    /// The interface pointer, borrowed.
    #[must_use]
    pub fn as_raw(&self) -> *mut IUnknown {
        match self {
            Handle::Dispatch(dispatch) => dispatch.as_raw() as *mut IUnknown,
            Handle::Unknown(unknown) => unknown.as_raw(),
        }
    }

    /// A new reference to the interface pointer, owned by the caller.
    #[must_use]
    pub fn to_raw_ref(&self) -> *mut IUnknown {
        match self {
            Handle::Dispatch(dispatch) => dispatch.clone().into_raw() as *mut IUnknown,
            Handle::Unknown(unknown) => unknown.clone().into_raw(),
        }
    }
}

/// Tag of a [`Value`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueType {
    Bool,
    Int,
    UInt,
    Int64,
    UInt64,
    Double,
    String,
    Date,
    Time,
    DateTime,
    Color,
    Cursor,
    Font,
    Pixmap,
    ByteArray,
    List,
    StringList,
    UserType,
}

impl ValueType {
    /// The tag a host type name decodes to.
    ///
    /// `None` for "variant", enum names and anything unknown: those keep the
    /// natural decode result.
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        let name = name.trim().trim_end_matches('&');
        let ty = match name {
            "bool" => ValueType::Bool,
            "int" | "short" | "char" | "long" => ValueType::Int,
            "uint" | "ushort" | "uchar" | "ulong" => ValueType::UInt,
            "int64" => ValueType::Int64,
            "uint64" => ValueType::UInt64,
            "double" | "float" => ValueType::Double,
            "string" => ValueType::String,
            "date" => ValueType::Date,
            "time" => ValueType::Time,
            "datetime" => ValueType::DateTime,
            "color" => ValueType::Color,
            "cursor" => ValueType::Cursor,
            "font" => ValueType::Font,
            "pixmap" => ValueType::Pixmap,
            "bytes" => ValueType::ByteArray,
            "list" => ValueType::List,
            "stringlist" => ValueType::StringList,
            "IDispatch*" | "IUnknown*" => ValueType::UserType,
            other if other.starts_with("List<") => ValueType::List,
            _ => return None,
        };
        Some(ty)
    }

    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            ValueType::Bool => "bool",
            ValueType::Int => "int",
            ValueType::UInt => "uint",
            ValueType::Int64 => "int64",
            ValueType::UInt64 => "uint64",
            ValueType::Double => "double",
            ValueType::String => "string",
            ValueType::Date => "date",
            ValueType::Time => "time",
            ValueType::DateTime => "datetime",
            ValueType::Color => "color",
            ValueType::Cursor => "cursor",
            ValueType::Font => "font",
            ValueType::Pixmap => "pixmap",
            ValueType::ByteArray => "bytes",
            ValueType::List => "list",
            ValueType::StringList => "stringlist",
            ValueType::UserType => "IDispatch*",
        }
    }
}

/// A dynamically typed value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// No value; crosses the boundary as "parameter not supplied"
    #[default]
    Invalid,
    Bool(bool),
    Int(i32),
    UInt(u32),
    Int64(i64),
    UInt64(u64),
    Double(f64),
    String(String),
    Date(NaiveDate),
    Time(NaiveTime),
    DateTime(NaiveDateTime),
    Color(Color),
    /// A cursor shape code
    Cursor(i32),
    Font(Font),
    Pixmap(Pixmap),
    ByteArray(Vec<u8>),
    List(Vec<Value>),
    StringList(Vec<String>),
    /// An automation object, `name` being "IDispatch*" or "IUnknown*"
    UserType { name: String, handle: Handle },
}

impl Value {
    #[must_use]
    pub fn is_valid(&self) -> bool {
        !matches!(self, Value::Invalid)
    }

    /// The tag of this value; `None` for [`Value::Invalid`].
    #[must_use]
    pub fn value_type(&self) -> Option<ValueType> {
        let ty = match self {
            Value::Invalid => return None,
            Value::Bool(_) => ValueType::Bool,
            Value::Int(_) => ValueType::Int,
            Value::UInt(_) => ValueType::UInt,
            Value::Int64(_) => ValueType::Int64,
            Value::UInt64(_) => ValueType::UInt64,
            Value::Double(_) => ValueType::Double,
            Value::String(_) => ValueType::String,
            Value::Date(_) => ValueType::Date,
            Value::Time(_) => ValueType::Time,
            Value::DateTime(_) => ValueType::DateTime,
            Value::Color(_) => ValueType::Color,
            Value::Cursor(_) => ValueType::Cursor,
            Value::Font(_) => ValueType::Font,
            Value::Pixmap(_) => ValueType::Pixmap,
            Value::ByteArray(_) => ValueType::ByteArray,
            Value::List(_) => ValueType::List,
            Value::StringList(_) => ValueType::StringList,
            Value::UserType { .. } => ValueType::UserType,
        };
        Some(ty)
    }

    /// Host type name of this value
    #[must_use]
    pub fn type_name(&self) -> &str {
        match self {
            Value::Invalid => "",
            Value::UserType { name, .. } => name,
            other => other.value_type().map_or("", ValueType::name),
        }
    }

    /// Coerce to `target`, or `None` if the value has no such representation.
    ///
    /// Converting to the value's own tag returns it unchanged.
    #[must_use]
    pub fn convert(&self, target: ValueType) -> Option<Value> {
        if self.value_type() == Some(target) {
            return Some(self.clone());
        }
        match target {
            ValueType::Bool => self.to_bool().map(Value::Bool),
            ValueType::Int => self.to_i64().and_then(|v| i32::try_from(v).ok()).map(Value::Int),
            ValueType::UInt => self.to_i64().and_then(|v| u32::try_from(v).ok()).map(Value::UInt),
            ValueType::Int64 => self.to_i64().map(Value::Int64),
            ValueType::UInt64 => match self {
                Value::UInt64(v) => Some(Value::UInt64(*v)),
                Value::String(s) => s.trim().parse().ok().map(Value::UInt64),
                _ => self.to_i64().and_then(|v| u64::try_from(v).ok()).map(Value::UInt64),
            },
            ValueType::Double => self.to_f64().map(Value::Double),
            ValueType::String => self.to_text().map(Value::String),
            ValueType::Date => match self {
                Value::DateTime(dt) => Some(Value::Date(dt.date())),
                Value::String(s) => NaiveDate::parse_from_str(s.trim(), DATE_FORMAT)
                    .ok()
                    .map(Value::Date),
                _ => None,
            },
            ValueType::Time => match self {
                Value::DateTime(dt) => Some(Value::Time(dt.time())),
                Value::String(s) => NaiveTime::parse_from_str(s.trim(), TIME_FORMAT)
                    .ok()
                    .map(Value::Time),
                _ => None,
            },
            ValueType::DateTime => match self {
                Value::Date(d) => d.and_hms_opt(0, 0, 0).map(Value::DateTime),
                Value::String(s) => {
                    let s = s.trim();
                    NaiveDateTime::parse_from_str(s, DATETIME_FORMAT)
                        .ok()
                        .or_else(|| {
                            NaiveDate::parse_from_str(s, DATE_FORMAT)
                                .ok()
                                .and_then(|d| d.and_hms_opt(0, 0, 0))
                        })
                        .map(Value::DateTime)
                }
                _ => None,
            },
            ValueType::Color => match self {
                Value::String(s) => Color::from_name(s).map(Value::Color),
                Value::Int(v) => Some(Value::Color(ole_to_color(*v as u32))),
                Value::UInt(v) => Some(Value::Color(ole_to_color(*v))),
                _ => None,
            },
            ValueType::Cursor => match self {
                Value::Int(v) => Some(Value::Cursor(*v)),
                Value::UInt(v) => i32::try_from(*v).ok().map(Value::Cursor),
                _ => None,
            },
            ValueType::ByteArray => match self {
                Value::String(s) => Some(Value::ByteArray(s.as_bytes().to_vec())),
                _ => None,
            },
            ValueType::List => match self {
                Value::StringList(items) => Some(Value::List(
                    items.iter().cloned().map(Value::String).collect(),
                )),
                _ => None,
            },
            ValueType::StringList => match self {
                Value::List(items) => items
                    .iter()
                    .map(|item| match item {
                        Value::String(s) => Some(s.clone()),
                        _ => None,
                    })
                    .collect::<Option<Vec<_>>>()
                    .map(Value::StringList),
                Value::String(s) => Some(Value::StringList(vec![s.clone()])),
                _ => None,
            },
            ValueType::Font | ValueType::Pixmap | ValueType::UserType => None,
        }
    }

    /// [`Self::convert`], with [`Value::Invalid`] on failure.
    #[must_use]
    pub fn coerce(&self, target: ValueType) -> Value {
        self.convert(target).unwrap_or_default()
    }

    #[must_use]
    pub fn to_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            Value::Int(v) | Value::Cursor(v) => Some(*v != 0),
            Value::UInt(v) => Some(*v != 0),
            Value::Int64(v) => Some(*v != 0),
            Value::UInt64(v) => Some(*v != 0),
            Value::Double(v) => Some(*v != 0.0),
            Value::String(s) => {
                let s = s.trim();
                Some(!(s.is_empty() || s == "0" || s.eq_ignore_ascii_case("false")))
            }
            _ => None,
        }
    }

    #[must_use]
    pub fn to_i32(&self) -> Option<i32> {
        self.to_i64().and_then(|v| i32::try_from(v).ok())
    }

    #[must_use]
    pub fn to_i64(&self) -> Option<i64> {
        match self {
            Value::Bool(v) => Some(i64::from(*v)),
            Value::Int(v) | Value::Cursor(v) => Some(i64::from(*v)),
            Value::UInt(v) => Some(i64::from(*v)),
            Value::Int64(v) => Some(*v),
            Value::UInt64(v) => i64::try_from(*v).ok(),
            Value::Double(v) => {
                let rounded = v.round();
                (rounded >= i64::MIN as f64 && rounded <= i64::MAX as f64).then_some(rounded as i64)
            }
            Value::String(s) => s.trim().parse().ok(),
            Value::Color(c) => Some(i64::from(color_to_ole(*c))),
            _ => None,
        }
    }

    #[must_use]
    pub fn to_f64(&self) -> Option<f64> {
        match self {
            Value::Double(v) => Some(*v),
            Value::UInt64(v) => Some(*v as f64),
            Value::String(s) => s.trim().parse().ok(),
            Value::Color(_) => None,
            other => other.to_i64().map(|v| v as f64),
        }
    }

    fn to_text(&self) -> Option<String> {
        let text = match self {
            Value::Bool(v) => v.to_string(),
            Value::Int(v) | Value::Cursor(v) => v.to_string(),
            Value::UInt(v) => v.to_string(),
            Value::Int64(v) => v.to_string(),
            Value::UInt64(v) => v.to_string(),
            Value::Double(v) => v.to_string(),
            Value::String(s) => s.clone(),
            Value::Date(d) => d.format(DATE_FORMAT).to_string(),
            Value::Time(t) => t.format(TIME_FORMAT).to_string(),
            Value::DateTime(dt) => dt.format(DATETIME_FORMAT).to_string(),
            Value::Color(c) => c.name(),
            Value::ByteArray(bytes) => String::from_utf8_lossy(bytes).into_owned(),
            _ => return None,
        };
        Some(text)
    }

    /// The string content, without conversion.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Invalid => f.write_str("<invalid>"),
            Value::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Value::StringList(items) => write!(f, "{items:?}"),
            Value::Font(font) => write!(f, "{} {}pt", font.family, font.point_size),
            Value::Pixmap(pixmap) => {
                write!(f, "pixmap {:#x} {}x{}", pixmap.handle, pixmap.width, pixmap.height)
            }
            Value::UserType { name, handle } => write!(f, "{name} {:p}", handle.as_raw()),
            other => match other.to_text() {
                Some(text) => f.write_str(&text),
                None => write!(f, "{other:?}"),
            },
        }
    }
}

macro_rules! value_from {
    ($($ty:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$ty> for Value {
                fn from(value: $ty) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

value_from! {
    bool => Bool,
    i32 => Int,
    u32 => UInt,
    i64 => Int64,
    u64 => UInt64,
    f64 => Double,
    String => String,
    NaiveDate => Date,
    NaiveTime => Time,
    NaiveDateTime => DateTime,
    Color => Color,
    Font => Font,
    Pixmap => Pixmap,
    Vec<u8> => ByteArray,
    Vec<Value> => List,
    Vec<String> => StringList,
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<ComPtr<IDispatch>> for Value {
    fn from(dispatch: ComPtr<IDispatch>) -> Self {
        Value::UserType {
            name: "IDispatch*".to_string(),
            handle: Handle::Dispatch(dispatch),
        }
    }
}
