//! Signal connections of a wrapper
//!
//! Listeners subscribe to a normalized signal signature. Generic listeners
//! receive every event undecoded, as the event name and the raw arguments.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use axcom::{DISPID, VARIANT};

use crate::meta::{GENERIC_SIGNAL, normalize_signature};
use crate::value::Value;

/// A listener for one signal. By-reference arguments may be assigned.
pub type Slot = Rc<dyn Fn(&mut [Value])>;

/// A listener for every event, before decoding
pub type RawSlot = Rc<dyn Fn(&RawEvent<'_>)>;

/// An event as it arrived from the server
#[derive(Debug)]
pub struct RawEvent<'a> {
    /// Event name, without parameters
    pub name: &'a str,
    pub dispid: DISPID,
    /// Arguments in COM order: last declared parameter first
    pub args: &'a [VARIANT],
}

/// Handle returned by `connect`, for `disconnect`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ConnectionId(u64);

#[derive(Default)]
pub struct SignalHub {
    next_id: Cell<u64>,
    slots: RefCell<Vec<(ConnectionId, String, Slot)>>,
    raw_slots: RefCell<Vec<(ConnectionId, RawSlot)>>,
}

impl SignalHub {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn next_id(&self) -> ConnectionId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        ConnectionId(id)
    }

    pub fn connect(&self, signature: &str, slot: Slot) -> ConnectionId {
        let id = self.next_id();
        self.slots
            .borrow_mut()
            .push((id, normalize_signature(signature), slot));
        id
    }

    pub fn connect_raw(&self, slot: RawSlot) -> ConnectionId {
        let id = self.next_id();
        self.raw_slots.borrow_mut().push((id, slot));
        id
    }

    /// Returns whether `id` was connected.
    pub fn disconnect(&self, id: ConnectionId) -> bool {
        let mut slots = self.slots.borrow_mut();
        let before = slots.len();
        slots.retain(|(slot_id, _, _)| *slot_id != id);
        if slots.len() != before {
            return true;
        }
        let mut raw = self.raw_slots.borrow_mut();
        let before = raw.len();
        raw.retain(|(slot_id, _)| *slot_id != id);
        raw.len() != before
    }

    pub fn disconnect_all(&self) {
        self.slots.borrow_mut().clear();
        self.raw_slots.borrow_mut().clear();
    }

    #[must_use]
    pub fn has_listeners(&self, signature: &str) -> bool {
        let signature = normalize_signature(signature);
        if signature == GENERIC_SIGNAL {
            return !self.raw_slots.borrow().is_empty();
        }
        self.slots
            .borrow()
            .iter()
            .any(|(_, connected, _)| *connected == signature)
    }

    /// Call every listener of `signature`; returns how many were called.
    ///
    /// Listeners may connect or disconnect while being called.
    pub fn emit(&self, signature: &str, args: &mut [Value]) -> usize {
        let signature = normalize_signature(signature);
        let listeners: Vec<Slot> = self
            .slots
            .borrow()
            .iter()
            .filter(|(_, connected, _)| *connected == signature)
            .map(|(_, _, slot)| slot.clone())
            .collect();
        for slot in &listeners {
            slot(args);
        }
        listeners.len()
    }

    pub fn emit_raw(&self, event: &RawEvent<'_>) -> usize {
        let listeners: Vec<RawSlot> = self
            .raw_slots
            .borrow()
            .iter()
            .map(|(_, slot)| slot.clone())
            .collect();
        for slot in &listeners {
            slot(event);
        }
        listeners.len()
    }
}

impl fmt::Debug for SignalHub {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let slots = self.slots.borrow();
        f.debug_struct("SignalHub")
            .field(
                "signals",
                &slots.iter().map(|(_, sig, _)| sig.as_str()).collect::<Vec<_>>(),
            )
            .field("generic", &self.raw_slots.borrow().len())
            .finish()
    }
}
