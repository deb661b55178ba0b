//! In-process automation servers
//!
//! Describe a type library with [`TypeLibBuilder`], then instantiate its
//! coclasses as [`AutomationObject`]s. Every object answers `IDispatch`,
//! `IProvideClassInfo` and `IConnectionPointContainer`, and its `ITypeInfo`
//! and `ITypeLib` views are generated from the same model, so a client sees
//! exactly what a registered control would report.
//!
//! ```ignore
//! use axserver::*;
//! use axcom::*;
//!
//! let lib = TypeLibBuilder::new("Calc", "6a1c0a52-5d0e-4d3b-9f43-2f4f1e2d3c01".parse()?)
//!     .dispinterface("ICalc", iid, |i| {
//!         i.method(1, "Add", |f| f.param("a", TypeSpec::I4).param("b", TypeSpec::I4).returns(TypeSpec::I4))
//!     })
//!     .coclass("Calc", clsid, |c| c.default_interface("ICalc"))
//!     .build();
//!
//! let calc = AutomationObject::new(&lib, "Calc", |call: &mut DispatchCall<'_>| {
//!     let sum = call.arg_i32(0)? + call.arg_i32(1)?;
//!     call.set_result_i32(sum);
//!     Ok(())
//! });
//! ```

pub mod calculator;
pub mod connection;
pub mod dispatch;
pub mod model;
pub mod typelib;

pub use connection::EventHub;
pub use dispatch::{AutomationObject, CallKind, DispatchCall, DispatchHandler};
pub use model::{
    CoClassBuilder, EnumBuilder, FuncSpec, dispinterface_model, InterfaceBuilder, LibraryModel, ParamSpec, TypeBody,
    TypeLibBuilder, TypeModel, TypeSpec, VarSpec,
};
pub use typelib::{TypeInfoObject, TypeLibObject};
