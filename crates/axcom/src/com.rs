//! COM (Component Object Model) support types
//!
//! This module provides core COM types for use with `#[com_interface]` and `#[com_implement]`.
//!
//! ## Key Types
//! - [`GUID`] - 128-bit globally unique identifier for interfaces and classes
//! - [`HRESULT`] - COM return type for error handling
//! - [`IUnknown`] / [`IUnknownVTable`] - Base interface of every COM interface
//! - [`ComObject`] - Object-level identity and reference counting behind `#[com_implement]`
//!
//! ## Example
//! ```ignore
//! use axcom::*;
//! use axcom::proc::{com_implement, com_interface};
//!
//! #[com_interface("12345678-1234-1234-1234-123456789abc")]
//! pub trait IMyInterface {
//!     fn do_something(&self, x: i32) -> HRESULT;
//! }
//! ```

use std::ffi::c_void;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering, fence};

// =============================================================================
// GUID - Globally Unique Identifier
// =============================================================================

/// 128-bit globally unique identifier (GUID/UUID/IID/CLSID).
///
/// `Debug` prints the registry form `{XXXXXXXX-XXXX-XXXX-XXXX-XXXXXXXXXXXX}`,
/// `Display` prints the bare lowercase form.
#[repr(C)]
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct GUID {
    pub data1: u32,
    pub data2: u16,
    pub data3: u16,
    pub data4: [u8; 8],
}

impl GUID {
    /// Create a new GUID from components
    #[must_use]
    pub const fn new(data1: u32, data2: u16, data3: u16, data4: [u8; 8]) -> Self {
        Self {
            data1,
            data2,
            data3,
            data4,
        }
    }

    /// The nil/zero GUID
    pub const ZERO: GUID = GUID::new(0, 0, 0, [0; 8]);

    /// Whether this is the nil GUID
    #[must_use]
    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }

    /// Registry form with braces and uppercase hex digits
    #[must_use]
    pub fn to_braced_string(&self) -> String {
        format!("{:?}", self)
    }
}

impl std::fmt::Debug for GUID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{{{:08X}-{:04X}-{:04X}-{:02X}{:02X}-{:02X}{:02X}{:02X}{:02X}{:02X}{:02X}}}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7]
        )
    }
}

impl std::fmt::Display for GUID {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:08x}-{:04x}-{:04x}-{:02x}{:02x}-{:02x}{:02x}{:02x}{:02x}{:02x}{:02x}",
            self.data1,
            self.data2,
            self.data3,
            self.data4[0],
            self.data4[1],
            self.data4[2],
            self.data4[3],
            self.data4[4],
            self.data4[5],
            self.data4[6],
            self.data4[7]
        )
    }
}

/// Error returned when a string is not a GUID
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid GUID string '{0}'")]
pub struct ParseGuidError(pub String);

impl FromStr for GUID {
    type Err = ParseGuidError;

    /// Accepts `xxxxxxxx-xxxx-xxxx-xxxx-xxxxxxxxxxxx`, with or without braces.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let err = || ParseGuidError(s.to_string());
        let trimmed = s.trim();
        let body = match (trimmed.strip_prefix('{'), trimmed.strip_suffix('}')) {
            (Some(_), Some(_)) => &trimmed[1..trimmed.len() - 1],
            (None, None) => trimmed,
            _ => return Err(err()),
        };

        let parts: Vec<&str> = body.split('-').collect();
        let lengths = [8, 4, 4, 4, 12];
        if parts.len() != 5 || parts.iter().zip(lengths).any(|(p, len)| p.len() != len) {
            return Err(err());
        }
        if !parts.iter().all(|p| p.chars().all(|c| c.is_ascii_hexdigit())) {
            return Err(err());
        }

        let data1 = u32::from_str_radix(parts[0], 16).map_err(|_| err())?;
        let data2 = u16::from_str_radix(parts[1], 16).map_err(|_| err())?;
        let data3 = u16::from_str_radix(parts[2], 16).map_err(|_| err())?;
        let tail = format!("{}{}", parts[3], parts[4]);
        let mut data4 = [0u8; 8];
        for (i, byte) in data4.iter_mut().enumerate() {
            *byte = u8::from_str_radix(&tail[i * 2..i * 2 + 2], 16).map_err(|_| err())?;
        }
        Ok(GUID::new(data1, data2, data3, data4))
    }
}

/// The null interface ID passed as `riid` to `IDispatch::Invoke`
pub const IID_NULL: GUID = GUID::ZERO;

// =============================================================================
// HRESULT - COM error codes
// =============================================================================

/// COM result type. 0 (S_OK) indicates success, negative values indicate errors.
pub type HRESULT = i32;

/// Success
pub const S_OK: HRESULT = 0;
/// Success, but returned false
pub const S_FALSE: HRESULT = 1;
/// Not implemented
pub const E_NOTIMPL: HRESULT = 0x8000_4001_u32 as i32;
/// No such interface supported
pub const E_NOINTERFACE: HRESULT = 0x8000_4002_u32 as i32;
/// Invalid pointer
pub const E_POINTER: HRESULT = 0x8000_4003_u32 as i32;
/// Unspecified failure
pub const E_FAIL: HRESULT = 0x8000_4005_u32 as i32;
/// Catastrophic failure
pub const E_UNEXPECTED: HRESULT = 0x8000_FFFF_u32 as i32;
/// Out of memory
pub const E_OUTOFMEMORY: HRESULT = 0x8007_000E_u32 as i32;
/// Invalid argument
pub const E_INVALIDARG: HRESULT = 0x8007_0057_u32 as i32;

/// Unknown interface
pub const DISP_E_UNKNOWNINTERFACE: HRESULT = 0x8002_0001_u32 as i32;
/// Member not found
pub const DISP_E_MEMBERNOTFOUND: HRESULT = 0x8002_0003_u32 as i32;
/// Parameter not found / not supplied
pub const DISP_E_PARAMNOTFOUND: HRESULT = 0x8002_0004_u32 as i32;
/// Type mismatch
pub const DISP_E_TYPEMISMATCH: HRESULT = 0x8002_0005_u32 as i32;
/// Unknown name
pub const DISP_E_UNKNOWNNAME: HRESULT = 0x8002_0006_u32 as i32;
/// Does not support named arguments
pub const DISP_E_NONAMEDARGS: HRESULT = 0x8002_0007_u32 as i32;
/// Bad variable type
pub const DISP_E_BADVARTYPE: HRESULT = 0x8002_0008_u32 as i32;
/// Exception occurred
pub const DISP_E_EXCEPTION: HRESULT = 0x8002_0009_u32 as i32;
/// Out of present range
pub const DISP_E_OVERFLOW: HRESULT = 0x8002_000A_u32 as i32;
/// Invalid index
pub const DISP_E_BADINDEX: HRESULT = 0x8002_000B_u32 as i32;
/// Unknown language
pub const DISP_E_UNKNOWNLCID: HRESULT = 0x8002_000C_u32 as i32;
/// Memory is locked
pub const DISP_E_ARRAYISLOCKED: HRESULT = 0x8002_000D_u32 as i32;
/// Invalid number of parameters
pub const DISP_E_BADPARAMCOUNT: HRESULT = 0x8002_000E_u32 as i32;
/// Parameter not optional
pub const DISP_E_PARAMNOTOPTIONAL: HRESULT = 0x8002_000F_u32 as i32;
/// Element not found in a type library
pub const TYPE_E_ELEMENTNOTFOUND: HRESULT = 0x8002_802B_u32 as i32;
/// The connection point has no advised connection for the cookie
pub const CONNECT_E_NOCONNECTION: HRESULT = 0x8004_0200_u32 as i32;
/// The sink does not support the outgoing interface
pub const CONNECT_E_CANNOTCONNECT: HRESULT = 0x8004_0202_u32 as i32;
/// The class is not registered
pub const REGDB_E_CLASSNOTREG: HRESULT = 0x8004_0154_u32 as i32;

/// Check if an HRESULT indicates success (non-negative)
#[inline]
#[must_use]
pub const fn succeeded(hr: HRESULT) -> bool {
    hr >= 0
}

/// Check if an HRESULT indicates failure (negative)
#[inline]
#[must_use]
pub const fn failed(hr: HRESULT) -> bool {
    hr < 0
}

// =============================================================================
// VTableLayout / ComInterface
// =============================================================================

/// Compile-time vtable layout information of an interface.
///
/// Automatically implemented by `#[com_interface]`.
pub trait VTableLayout {
    /// Number of function-pointer slots including inherited ones
    const SLOT_COUNT: usize;
    /// The `#[repr(C)]` vtable struct
    type VTable;
}

/// Trait for interface structs that have a COM interface ID (IID).
///
/// Automatically implemented by `#[com_interface]`.
///
/// # Safety
/// Implementors must be `#[repr(C)]` structs holding exactly one vtable pointer
/// whose vtable starts with [`IUnknownVTable`].
pub unsafe trait ComInterface {
    /// The interface ID (IID) for this interface.
    const IID: GUID;
}

// =============================================================================
// IUnknown - Base COM interface
// =============================================================================

/// IUnknown interface ID
pub const IID_IUNKNOWN: GUID = GUID::new(
    0x00000000,
    0x0000,
    0x0000,
    [0xC0, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x46],
);

/// VTable of IUnknown. Every COM vtable starts with these three slots.
#[repr(C)]
pub struct IUnknownVTable {
    /// Query for another interface by GUID.
    pub query_interface: unsafe extern "system" fn(
        this: *mut c_void,
        riid: *const GUID,
        ppv: *mut *mut c_void,
    ) -> HRESULT,
    /// Increment reference count. Returns new count.
    pub add_ref: unsafe extern "system" fn(this: *mut c_void) -> u32,
    /// Decrement reference count. Returns new count.
    pub release: unsafe extern "system" fn(this: *mut c_void) -> u32,
}

/// IUnknown - base of all COM interfaces.
#[repr(C)]
pub struct IUnknown {
    vtable: *const IUnknownVTable,
}

impl IUnknown {
    /// Get the interface ID (GUID) for IUnknown
    #[inline]
    #[must_use]
    pub const fn iid() -> &'static GUID {
        &IID_IUNKNOWN
    }

    /// Query for another interface by GUID.
    ///
    /// # Safety
    /// - `self` must be a live interface pointer
    /// - `riid` must point to a valid GUID
    /// - `ppv` must point to a valid, writable pointer location
    #[inline]
    pub unsafe fn query_interface(&self, riid: *const GUID, ppv: *mut *mut c_void) -> HRESULT {
        unsafe { ((*self.vtable).query_interface)(self as *const Self as *mut c_void, riid, ppv) }
    }

    /// Increment reference count.
    ///
    /// # Safety
    /// `self` must be a live interface pointer.
    #[inline]
    pub unsafe fn add_ref(&self) -> u32 {
        unsafe { ((*self.vtable).add_ref)(self as *const Self as *mut c_void) }
    }

    /// Decrement reference count.
    ///
    /// # Safety
    /// `self` must be a live interface pointer holding a reference owned by the caller.
    #[inline]
    pub unsafe fn release(&self) -> u32 {
        unsafe { ((*self.vtable).release)(self as *const Self as *mut c_void) }
    }
}

unsafe impl ComInterface for IUnknown {
    const IID: GUID = IID_IUNKNOWN;
}

impl VTableLayout for IUnknown {
    const SLOT_COUNT: usize = 3;
    type VTable = IUnknownVTable;
}

// =============================================================================
// ComRefCount - Atomic reference counter for COM objects
// =============================================================================

/// Atomic reference counter for COM objects.
///
/// Embed this in your COM object struct and return it from
/// [`ComObject::ref_count`].
#[repr(transparent)]
pub struct ComRefCount(AtomicU32);

impl ComRefCount {
    /// Create a new reference counter with count = 1
    #[must_use]
    pub const fn new() -> Self {
        Self(AtomicU32::new(1))
    }

    /// Increment the reference count. Returns the new count.
    #[inline]
    pub fn add_ref(&self) -> u32 {
        self.0.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Decrement the reference count. Returns the new count.
    ///
    /// When count reaches 0, the caller should destroy the object.
    #[inline]
    pub fn release(&self) -> u32 {
        let previous = self.0.fetch_sub(1, Ordering::Release);
        if previous == 1 {
            fence(Ordering::Acquire);
        }
        previous.wrapping_sub(1)
    }

    /// Get the current reference count.
    #[inline]
    #[must_use]
    pub fn count(&self) -> u32 {
        self.0.load(Ordering::Relaxed)
    }
}

impl Default for ComRefCount {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// ComObject - object identity behind #[com_implement]
// =============================================================================

/// Identity and lifetime of a Rust-implemented COM object.
///
/// Every IUnknown slot generated by `#[com_implement]` forwards here, so an
/// object implementing several interfaces has one reference count and one
/// `QueryInterface` table.
///
/// # Safety
/// - `interface` must only return pointers to vtable fields of `self`
/// - objects must be allocated with [`crate::ComBox::new`]; the final
///   `Release` frees the box
pub unsafe trait ComObject: Sized + 'static {
    /// The embedded reference counter
    fn ref_count(&self) -> &ComRefCount;

    /// The interface pointer answering `riid`, if supported.
    ///
    /// Use [`interface_ptr`] to turn a vtable field into the returned pointer.
    fn interface(&self, riid: &GUID) -> Option<*mut c_void>;
}

/// Address of a vtable field, usable as an interface pointer.
#[inline]
#[must_use]
pub fn interface_ptr<V>(field: &*const V) -> *mut c_void {
    field as *const *const V as *mut c_void
}

/// `QueryInterface` body shared by every interface of `T`.
///
/// # Safety
/// `this` must point to a live `T`; `riid` and `ppv` follow the COM contract.
pub unsafe fn com_query_interface<T: ComObject>(
    this: *mut T,
    riid: *const GUID,
    ppv: *mut *mut c_void,
) -> HRESULT {
    unsafe {
        if ppv.is_null() {
            return E_POINTER;
        }
        *ppv = std::ptr::null_mut();
        if riid.is_null() {
            return E_INVALIDARG;
        }

        let obj = &*this;
        match obj.interface(&*riid) {
            Some(ptr) => {
                obj.ref_count().add_ref();
                *ppv = ptr;
                S_OK
            }
            None => E_NOINTERFACE,
        }
    }
}

/// `AddRef` body shared by every interface of `T`.
///
/// # Safety
/// `this` must point to a live `T`.
pub unsafe fn com_add_ref<T: ComObject>(this: *mut T) -> u32 {
    unsafe { (*this).ref_count().add_ref() }
}

/// `Release` body shared by every interface of `T`. Frees the object at zero.
///
/// # Safety
/// `this` must point to a live, box-allocated `T` and the caller must own the
/// reference being released.
pub unsafe fn com_release<T: ComObject>(this: *mut T) -> u32 {
    unsafe {
        let remaining = (*this).ref_count().release();
        if remaining == 0 {
            drop(Box::from_raw(this));
        }
        remaining
    }
}
