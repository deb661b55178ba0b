//! Scoped ownership handles for COM interface pointers
//!
//! [`ComPtr`] owns exactly one reference to a foreign (or local) interface
//! pointer: cloning calls `AddRef`, dropping calls `Release`. [`ComBox`] is the
//! same for Rust-implemented objects and additionally gives typed access to the
//! object behind the vtables.
//!
//! Borrowing a pointer for the duration of a call never touches the count:
//! pass `&ComPtr<I>` or the raw pointer from [`ComPtr::as_raw`].

use std::ffi::c_void;
use std::fmt;
use std::ops::Deref;
use std::ptr::NonNull;

use crate::com::{ComInterface, ComObject, GUID, HRESULT, IUnknown, E_POINTER, com_release, failed};

// =============================================================================
// ComPtr
// =============================================================================

/// Reference-counted smart handle for a COM interface pointer.
pub struct ComPtr<I: ComInterface> {
    ptr: NonNull<I>,
}

impl<I: ComInterface> ComPtr<I> {
    /// Adopt a reference the caller already owns (an out-parameter filled by COM).
    ///
    /// Returns `None` for null.
    ///
    /// # Safety
    /// `ptr` must be null or a live interface pointer whose reference is transferred.
    #[must_use]
    pub unsafe fn from_raw(ptr: *mut I) -> Option<Self> {
        NonNull::new(ptr).map(|ptr| Self { ptr })
    }

    /// Take a new reference to a borrowed pointer.
    ///
    /// # Safety
    /// `ptr` must be null or a live interface pointer.
    #[must_use]
    pub unsafe fn from_borrowed(ptr: *mut I) -> Option<Self> {
        let handle = NonNull::new(ptr).map(|ptr| Self { ptr })?;
        unsafe { handle.unknown().add_ref() };
        Some(handle)
    }

    /// The raw pointer; the reference stays owned by `self`.
    #[inline]
    #[must_use]
    pub fn as_raw(&self) -> *mut I {
        self.ptr.as_ptr()
    }

    /// Give up ownership of the reference.
    #[must_use]
    pub fn into_raw(self) -> *mut I {
        let ptr = self.ptr.as_ptr();
        std::mem::forget(self);
        ptr
    }

    /// View as IUnknown; valid for every interface.
    #[inline]
    #[must_use]
    pub fn unknown(&self) -> &IUnknown {
        unsafe { &*(self.ptr.as_ptr() as *const IUnknown) }
    }

    /// `QueryInterface` for another interface.
    pub fn cast<J: ComInterface>(&self) -> Result<ComPtr<J>, HRESULT> {
        let mut out: *mut c_void = std::ptr::null_mut();
        let hr = unsafe { self.unknown().query_interface(&J::IID, &mut out) };
        if failed(hr) {
            return Err(hr);
        }
        unsafe { ComPtr::from_raw(out as *mut J) }.ok_or(E_POINTER)
    }

    /// `QueryInterface` by runtime IID, returned as IUnknown.
    pub fn query(&self, iid: &GUID) -> Result<ComPtr<IUnknown>, HRESULT> {
        let mut out: *mut c_void = std::ptr::null_mut();
        let hr = unsafe { self.unknown().query_interface(iid, &mut out) };
        if failed(hr) {
            return Err(hr);
        }
        unsafe { ComPtr::from_raw(out as *mut IUnknown) }.ok_or(E_POINTER)
    }

    /// Same underlying pointer
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        self.ptr == other.ptr
    }

    /// Pointer identity of the COM object (the IUnknown returned by `QueryInterface`).
    #[must_use]
    pub fn identity(&self) -> Option<ComPtr<IUnknown>> {
        self.cast::<IUnknown>().ok()
    }
}

impl<I: ComInterface> Deref for ComPtr<I> {
    type Target = I;

    fn deref(&self) -> &I {
        unsafe { self.ptr.as_ref() }
    }
}

impl<I: ComInterface> Clone for ComPtr<I> {
    fn clone(&self) -> Self {
        unsafe { self.unknown().add_ref() };
        Self { ptr: self.ptr }
    }
}

impl<I: ComInterface> Drop for ComPtr<I> {
    fn drop(&mut self) {
        unsafe { self.unknown().release() };
    }
}

impl<I: ComInterface> PartialEq for ComPtr<I> {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl<I: ComInterface> fmt::Debug for ComPtr<I> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComPtr({:?} @ {:p})", I::IID, self.ptr.as_ptr())
    }
}

// =============================================================================
// ComBox
// =============================================================================

/// Owning handle for a Rust-implemented COM object.
///
/// The object starts with one reference, owned by the first `ComBox`.
pub struct ComBox<T: ComObject> {
    ptr: NonNull<T>,
}

impl<T: ComObject> ComBox<T> {
    /// Move `value` to the heap. Its [`crate::ComRefCount`] must start at 1.
    #[must_use]
    pub fn new(value: T) -> Self {
        let ptr = NonNull::from(Box::leak(Box::new(value)));
        Self { ptr }
    }

    /// Raw pointer to the object
    #[must_use]
    pub fn as_ptr(&self) -> *mut T {
        self.ptr.as_ptr()
    }

    /// A new interface reference for `I`, if the object exposes it.
    #[must_use]
    pub fn query<I: ComInterface>(&self) -> Option<ComPtr<I>> {
        let raw = self.interface(&I::IID)?;
        self.ref_count().add_ref();
        unsafe { ComPtr::from_raw(raw as *mut I) }
    }

    /// Current reference count, including references handed to COM clients
    #[must_use]
    pub fn ref_count_value(&self) -> u32 {
        self.ref_count().count()
    }
}

impl<T: ComObject> Deref for ComBox<T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { self.ptr.as_ref() }
    }
}

impl<T: ComObject> Clone for ComBox<T> {
    fn clone(&self) -> Self {
        self.ref_count().add_ref();
        Self { ptr: self.ptr }
    }
}

impl<T: ComObject> Drop for ComBox<T> {
    fn drop(&mut self) {
        unsafe { com_release(self.ptr.as_ptr()) };
    }
}

impl<T: ComObject> fmt::Debug for ComBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ComBox({:p}, refs={})", self.ptr.as_ptr(), self.ref_count().count())
    }
}
