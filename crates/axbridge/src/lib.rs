//! Late-bound automation objects as dynamic values, signals and properties
//!
//! The bridge sits between a host that speaks [`Value`]s and objects that
//! speak OLE automation:
//!
//! - [`codec`]: `VARIANT` and `SAFEARRAY` conversion in both directions
//! - [`introspect`]: reading `ITypeInfo`/`ITypeLib` into members
//! - [`generator`] and [`cache`]: per-class [`MetaObject`]s, generated once
//!   and shared
//! - [`sink`]: event and property notification sinks
//! - [`invoke`]: calls through `IDispatch::Invoke`
//! - [`object`]: [`AxObject`], which ties them together
//!
//! ```ignore
//! use axbridge::{AxObject, AxServices, Value};
//!
//! let calc = AxObject::new(services);
//! calc.set_control("CalcLib.Calculator")?;
//! calc.connect("Computed(double)", |args| println!("= {:?}", args[0]))?;
//! let sum = calc.dynamic_call("Add(int,int)", &mut vec![Value::Int(2), Value::Int(3)])?;
//! calc.set_property("Name", Value::String("main".into()))?;
//! ```

pub mod cache;
pub mod codec;
pub mod docs;
pub mod error;
pub mod generator;
pub mod introspect;
pub mod invoke;
pub mod meta;
pub mod object;
pub mod services;
pub mod signals;
pub mod sink;
pub mod value;

pub use cache::{CacheKey, MetaObjectCache};
pub use error::{AxError, ExceptionInfo, Result};
pub use meta::{
    ConnectionInfo, InvokeKind, MetaEnum, MetaMethod, MetaObject, MetaProperty, MethodKind,
    PropertyFlags,
};
pub use object::AxObject;
pub use services::{
    AxServices, ClassRegistry, FactoryMap, GenerationOptions, MapRegistry, ObjectFactory,
};
pub use signals::{ConnectionId, RawEvent};
pub use value::{Color, Font, Handle, Pixmap, Value, ValueType};
