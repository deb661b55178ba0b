//! By-reference indirection cells
//!
//! A `VT_BYREF` argument points at a cell holding the value. Cells are only
//! allocated by the codec and only freed by [`free_cell`]; the ledger lets a
//! second free of the same cell be refused instead of corrupting the heap.

use std::collections::BTreeMap;
use std::ffi::c_void;

use axcom::oleauto::{safe_array_destroy, sys_free_string, variant_clear};
use axcom::{BSTR, IUnknown, SAFEARRAY, VARIANT};
use parking_lot::Mutex;

/// What a cell holds and therefore how it is freed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CellKind {
    Bits8,
    Bits16,
    Bits32,
    Bits64,
    Bstr,
    Interface,
    Array,
    Variant,
}

static LIVE_CELLS: Mutex<BTreeMap<usize, CellKind>> = Mutex::new(BTreeMap::new());

/// Box `value` and record the cell.
pub(crate) fn alloc_cell<T>(kind: CellKind, value: T) -> *mut T {
    let ptr = Box::into_raw(Box::new(value));
    LIVE_CELLS.lock().insert(ptr as usize, kind);
    ptr
}

/// Free a cell together with what it owns.
///
/// Returns `false` (and does nothing) for pointers that are not live cells,
/// such as targets supplied by an automation server.
///
/// # Safety
/// A live cell must not be in use elsewhere.
pub(crate) unsafe fn free_cell(ptr: *mut c_void) -> bool {
    let Some(kind) = LIVE_CELLS.lock().remove(&(ptr as usize)) else {
        log::debug!("{:p} is not a by-reference cell", ptr);
        return false;
    };
    unsafe {
        match kind {
            CellKind::Bits8 => drop(Box::from_raw(ptr as *mut u8)),
            CellKind::Bits16 => drop(Box::from_raw(ptr as *mut u16)),
            CellKind::Bits32 => drop(Box::from_raw(ptr as *mut u32)),
            CellKind::Bits64 => drop(Box::from_raw(ptr as *mut u64)),
            CellKind::Bstr => sys_free_string(*Box::from_raw(ptr as *mut BSTR)),
            CellKind::Interface => {
                let punk = *Box::from_raw(ptr as *mut *mut IUnknown);
                if !punk.is_null() {
                    (*punk).release();
                }
            }
            CellKind::Array => {
                let psa = *Box::from_raw(ptr as *mut *mut SAFEARRAY);
                safe_array_destroy(psa);
            }
            CellKind::Variant => {
                let mut var = *Box::from_raw(ptr as *mut VARIANT);
                variant_clear(&mut var);
            }
        }
    }
    true
}

/// Whether `ptr` is a cell allocated by the codec and not yet released.
#[must_use]
pub fn cell_is_live(ptr: *const c_void) -> bool {
    LIVE_CELLS.lock().contains_key(&(ptr as usize))
}
