//! Tests for COM interface support and the object model

use axcom::proc::{com_implement, com_interface};
use axcom::{
    ComBox, ComInterface, ComObject, ComPtr, ComRefCount, E_NOINTERFACE, GUID, HRESULT, IID_IUNKNOWN,
    IUnknown, IUnknownVTable, S_OK, VTableLayout, interface_ptr,
};
use std::cell::Cell;
use std::ffi::c_void;
use std::rc::Rc;

// =============================================================================
// Test: GUID parsing and formatting
// =============================================================================

#[test]
fn test_guid_parse_braced_and_bare() {
    let bare: GUID = "00020400-0000-0000-c000-000000000046".parse().unwrap();
    let braced: GUID = "{00020400-0000-0000-C000-000000000046}".parse().unwrap();
    assert_eq!(bare, braced);
    assert_eq!(bare, axcom::IID_IDISPATCH);
}

#[test]
fn test_guid_formats() {
    let guid = GUID::new(0x12345678, 0x9abc, 0xdef0, [1, 2, 3, 4, 5, 6, 7, 8]);
    assert_eq!(guid.to_braced_string(), "{12345678-9ABC-DEF0-0102-030405060708}");
    assert_eq!(guid.to_string(), "12345678-9abc-def0-0102-030405060708");
}

#[test]
fn test_guid_rejects_malformed() {
    assert!("{00020400-0000-0000-C000-000000000046".parse::<GUID>().is_err());
    assert!("00020400-0000-0000-C000".parse::<GUID>().is_err());
    assert!("0002040G-0000-0000-C000-000000000046".parse::<GUID>().is_err());
}

// =============================================================================
// Test: Interface definition
// =============================================================================

#[com_interface("12345678-1234-5678-9abc-def012345678")]
pub trait ICounter {
    fn next(&self, value: *mut i32) -> HRESULT;
    fn reset(&self) -> HRESULT;
}

#[com_interface("87654321-4321-8765-cba9-876543210fed")]
pub trait INamed {
    fn name_len(&self) -> u32;
}

#[test]
fn test_interface_iid() {
    let iid = ICounter::iid();
    assert_eq!(iid.data1, 0x12345678);
    assert_eq!(iid.data4, [0x9a, 0xbc, 0xde, 0xf0, 0x12, 0x34, 0x56, 0x78]);
    assert_eq!(<ICounter as ComInterface>::IID, IID_ICOUNTER);
}

#[test]
fn test_interface_vtable_layout() {
    let ptr_size = std::mem::size_of::<*const c_void>();
    assert_eq!(<ICounter as VTableLayout>::SLOT_COUNT, 5);
    assert_eq!(std::mem::size_of::<ICounterVTable>(), 5 * ptr_size);
    assert_eq!(std::mem::offset_of!(ICounterVTable, base), 0);
    assert_eq!(std::mem::size_of::<IUnknownVTable>(), 3 * ptr_size);
}

#[test]
fn test_automation_interface_slot_counts() {
    assert_eq!(<axcom::IDispatch as VTableLayout>::SLOT_COUNT, 7);
    assert_eq!(<axcom::ITypeInfo as VTableLayout>::SLOT_COUNT, 22);
    assert_eq!(<axcom::ITypeLib as VTableLayout>::SLOT_COUNT, 13);
    assert_eq!(<axcom::IConnectionPoint as VTableLayout>::SLOT_COUNT, 8);
    assert_eq!(<axcom::IPropertyNotifySink as VTableLayout>::SLOT_COUNT, 5);
}

// =============================================================================
// Test: Object with two interfaces
// =============================================================================

#[repr(C)]
pub struct Counter {
    vtable_i_counter: *const ICounterVTable,
    vtable_i_named: *const INamedVTable,
    ref_count: ComRefCount,
    value: Cell<i32>,
    dropped: Rc<Cell<bool>>,
}

impl Counter {
    fn new(dropped: Rc<Cell<bool>>) -> Self {
        Self {
            vtable_i_counter: Self::VTABLE_I_COUNTER,
            vtable_i_named: Self::VTABLE_I_NAMED,
            ref_count: ComRefCount::new(),
            value: Cell::new(0),
            dropped,
        }
    }
}

impl Drop for Counter {
    fn drop(&mut self) {
        self.dropped.set(true);
    }
}

#[com_implement(ICounter)]
impl Counter {
    fn next(&self, value: *mut i32) -> HRESULT {
        self.value.set(self.value.get() + 1);
        unsafe { *value = self.value.get() };
        S_OK
    }

    fn reset(&self) -> HRESULT {
        self.value.set(0);
        S_OK
    }
}

#[com_implement(INamed)]
impl Counter {
    fn name_len(&self) -> u32 {
        7
    }
}

unsafe impl ComObject for Counter {
    fn ref_count(&self) -> &ComRefCount {
        &self.ref_count
    }

    fn interface(&self, riid: &GUID) -> Option<*mut c_void> {
        if *riid == IID_IUNKNOWN || *riid == IID_ICOUNTER {
            Some(interface_ptr(&self.vtable_i_counter))
        } else if *riid == IID_INAMED {
            Some(interface_ptr(&self.vtable_i_named))
        } else {
            None
        }
    }
}

#[test]
fn test_call_through_vtable() {
    let dropped = Rc::new(Cell::new(false));
    let object = ComBox::new(Counter::new(dropped));
    let counter: ComPtr<ICounter> = object.query().unwrap();

    let mut value = 0;
    unsafe {
        assert_eq!(counter.next(&mut value), S_OK);
        assert_eq!(counter.next(&mut value), S_OK);
    }
    assert_eq!(value, 2);
    assert_eq!(object.value.get(), 2);
}

#[test]
fn test_query_interface_adjusts_this() {
    let dropped = Rc::new(Cell::new(false));
    let object = ComBox::new(Counter::new(dropped));
    let counter: ComPtr<ICounter> = object.query().unwrap();
    let named: ComPtr<INamed> = counter.cast().unwrap();

    assert_eq!(unsafe { named.name_len() }, 7);
    assert_ne!(counter.as_raw() as usize, named.as_raw() as usize);

    // Both interfaces report the same identity
    let a = counter.identity().unwrap();
    let b = named.identity().unwrap();
    assert!(a.ptr_eq(&b));
}

#[test]
fn test_query_unknown_interface_fails() {
    let dropped = Rc::new(Cell::new(false));
    let object = ComBox::new(Counter::new(dropped));
    let counter: ComPtr<ICounter> = object.query().unwrap();
    let missing = GUID::new(1, 2, 3, [4; 8]);
    assert_eq!(counter.query(&missing).unwrap_err(), E_NOINTERFACE);
}

#[test]
fn test_shared_reference_count() {
    let dropped = Rc::new(Cell::new(false));
    let object = ComBox::new(Counter::new(dropped.clone()));
    assert_eq!(object.ref_count_value(), 1);

    let counter: ComPtr<ICounter> = object.query().unwrap();
    let named: ComPtr<INamed> = counter.cast().unwrap();
    assert_eq!(object.ref_count_value(), 3);

    let named_copy = named.clone();
    assert_eq!(object.ref_count_value(), 4);

    drop(named_copy);
    drop(named);
    drop(counter);
    assert_eq!(object.ref_count_value(), 1);
    assert!(!dropped.get());

    drop(object);
    assert!(dropped.get());
}

#[test]
fn test_com_ptr_into_raw_and_back() {
    let dropped = Rc::new(Cell::new(false));
    let object = ComBox::new(Counter::new(dropped));
    let counter: ComPtr<ICounter> = object.query().unwrap();

    let raw = counter.into_raw();
    assert_eq!(object.ref_count_value(), 2);

    let borrowed = unsafe { ComPtr::from_borrowed(raw) }.unwrap();
    assert_eq!(object.ref_count_value(), 3);
    drop(borrowed);

    let adopted = unsafe { ComPtr::from_raw(raw) }.unwrap();
    drop(adopted);
    assert_eq!(object.ref_count_value(), 1);
}

#[test]
fn test_unknown_view_releases() {
    let dropped = Rc::new(Cell::new(false));
    let object = ComBox::new(Counter::new(dropped));
    let counter: ComPtr<ICounter> = object.query().unwrap();
    let unknown: ComPtr<IUnknown> = counter.cast().unwrap();
    assert_eq!(object.ref_count_value(), 3);
    drop(unknown);
    drop(counter);
    assert_eq!(object.ref_count_value(), 1);
}
