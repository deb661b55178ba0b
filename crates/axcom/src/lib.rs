//! COM interop for Rust (MSVC ABI)
//!
//! This crate provides the binary layer an automation bridge needs:
//!
//! - [`com`]: `GUID`, `HRESULT`, IUnknown and the object model behind
//!   `#[com_implement]`
//! - [`ptr`]: owning interface handles ([`ComPtr`], [`ComBox`])
//! - [`types`]: `VARIANT`, `SAFEARRAY`, `DISPPARAMS`, `EXCEPINFO` and the type
//!   library descriptors
//! - [`interfaces`]: IDispatch, ITypeInfo, ITypeLib, connection points and
//!   related automation interfaces
//! - [`oleauto`]: a portable BSTR / SAFEARRAY / VARIANT runtime
//!
//! ## Defining and implementing interfaces
//! ```ignore
//! use axcom::*;
//! use axcom::proc::{com_implement, com_interface};
//!
//! #[com_interface("12345678-1234-1234-1234-123456789abc")]
//! pub trait ICounter {
//!     fn next(&self, value: *mut i32) -> HRESULT;
//! }
//!
//! #[repr(C)]
//! pub struct Counter {
//!     vtable_i_counter: *const ICounterVTable,
//!     ref_count: ComRefCount,
//!     value: std::cell::Cell<i32>,
//! }
//!
//! #[com_implement(ICounter)]
//! impl Counter {
//!     fn next(&self, value: *mut i32) -> HRESULT {
//!         self.value.set(self.value.get() + 1);
//!         unsafe { *value = self.value.get() };
//!         S_OK
//!     }
//! }
//! ```

pub mod com;
pub mod interfaces;
pub mod oleauto;
pub mod ptr;
pub mod types;

/// Proc-macro approach - re-exports from axcom-macro crate
pub mod proc {
    pub use axcom_macro::{com_implement, com_interface};
}

// Re-export common types for macro use
pub use com::*;
pub use interfaces::*;
pub use ptr::{ComBox, ComPtr};
pub use types::*;

#[doc(hidden)]
pub use std::ffi::c_void;
