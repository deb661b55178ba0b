//! Outgoing interfaces: connection points and event firing
//!
//! [`EventHub`] holds the advised sinks of one automation object. It is
//! shared by the object and every `IConnectionPoint` / `IEnumConnectionPoints`
//! it hands out, so those may outlive a particular lookup without keeping the
//! object itself alive.

use std::cell::{Cell, RefCell};
use std::ffi::c_void;
use std::rc::Rc;

use axcom::proc::com_implement;
use axcom::*;

use crate::model::{FuncSpec, LibraryModel};
use crate::typelib::write_out;

/// One `Advise` registration
struct Connection {
    cookie: u32,
    iid: GUID,
    sink: ComPtr<IUnknown>,
}

/// Advised sinks of one object, keyed by outgoing interface
pub struct EventHub {
    lib: Rc<LibraryModel>,
    /// Offered outgoing interfaces and, for dispinterfaces, their type index
    points: Vec<(GUID, Option<usize>)>,
    connections: RefCell<Vec<Connection>>,
    next_cookie: Cell<u32>,
    container: Cell<*mut IConnectionPointContainer>,
}

impl EventHub {
    pub(crate) fn new(lib: Rc<LibraryModel>, points: Vec<(GUID, Option<usize>)>) -> Self {
        Self {
            lib,
            points,
            connections: RefCell::new(Vec::new()),
            next_cookie: Cell::new(1),
            container: Cell::new(std::ptr::null_mut()),
        }
    }

    pub(crate) fn set_container(&self, container: *mut IConnectionPointContainer) {
        self.container.set(container);
    }

    /// Interfaces offered through `FindConnectionPoint` / `EnumConnectionPoints`
    pub fn offered(&self) -> Vec<GUID> {
        self.points.iter().map(|(iid, _)| *iid).collect()
    }

    pub fn offers(&self, iid: &GUID) -> bool {
        self.points.iter().any(|(offered, _)| offered == iid)
    }

    /// Number of sinks advised on `iid`
    pub fn sink_count(&self, iid: &GUID) -> usize {
        self.connections
            .borrow()
            .iter()
            .filter(|c| c.iid == *iid)
            .count()
    }

    fn sinks(&self, iid: &GUID) -> Vec<ComPtr<IUnknown>> {
        self.connections
            .borrow()
            .iter()
            .filter(|c| c.iid == *iid)
            .map(|c| c.sink.clone())
            .collect()
    }

    fn advise(&self, iid: GUID, sink: *mut IUnknown) -> Result<u32, HRESULT> {
        let sink = unsafe { ComPtr::from_borrowed(sink) }.ok_or(E_POINTER)?;
        let typed = sink
            .query(&iid)
            .or_else(|_| {
                if iid == IID_IPROPERTYNOTIFYSINK {
                    Err(CONNECT_E_CANNOTCONNECT)
                } else {
                    sink.query(&IID_IDISPATCH)
                }
            })
            .map_err(|_| CONNECT_E_CANNOTCONNECT)?;

        let cookie = self.next_cookie.get();
        self.next_cookie.set(cookie + 1);
        self.connections.borrow_mut().push(Connection {
            cookie,
            iid,
            sink: typed,
        });
        log::debug!("advised sink {} on {:?}", cookie, iid);
        Ok(cookie)
    }

    fn unadvise(&self, iid: GUID, cookie: u32) -> HRESULT {
        let removed = {
            let mut connections = self.connections.borrow_mut();
            let position = connections
                .iter()
                .position(|c| c.cookie == cookie && c.iid == iid);
            position.map(|p| connections.remove(p))
        };
        // The sink reference is released outside the borrow
        match removed {
            Some(_) => S_OK,
            None => CONNECT_E_NOCONNECTION,
        }
    }

    fn find_event(&self, name: &str) -> Option<(GUID, &FuncSpec)> {
        self.points.iter().find_map(|(iid, index)| {
            let model = &self.lib.types[(*index)?];
            model
                .funcs
                .iter()
                .find(|f| f.name == name)
                .map(|f| (*iid, f))
        })
    }

    /// Call event `name` on every advised sink.
    ///
    /// `args` are in declared order; by-reference arguments receive whatever
    /// the sinks write back. Returns the number of sinks called.
    pub fn fire(&self, name: &str, args: &mut [VARIANT]) -> Result<usize, HRESULT> {
        let (iid, memid) = self
            .find_event(name)
            .map(|(iid, f)| (iid, f.memid))
            .ok_or(DISP_E_MEMBERNOTFOUND)?;

        let mut reversed: Vec<VARIANT> = args.iter().rev().copied().collect();
        let mut delivered = 0;
        for sink in self.sinks(&iid) {
            let Ok(dispatch) = sink.cast::<IDispatch>() else {
                continue;
            };
            let mut params = DISPPARAMS {
                rgvarg: if reversed.is_empty() {
                    std::ptr::null_mut()
                } else {
                    reversed.as_mut_ptr()
                },
                rgdispid_named_args: std::ptr::null_mut(),
                c_args: reversed.len() as u32,
                c_named_args: 0,
            };
            let hr = unsafe {
                dispatch.invoke(
                    memid,
                    &IID_NULL,
                    LOCALE_USER_DEFAULT,
                    DISPATCH_METHOD,
                    &mut params,
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                    std::ptr::null_mut(),
                )
            };
            if failed(hr) {
                log::warn!("event {} rejected by sink: {:#010x}", name, hr);
            }
            delivered += 1;
        }
        Ok(delivered)
    }

    /// Tell property-notify sinks that `dispid` changed.
    pub fn property_changed(&self, dispid: DISPID) {
        for sink in self.sinks(&IID_IPROPERTYNOTIFYSINK) {
            if let Ok(notify) = sink.cast::<IPropertyNotifySink>() {
                unsafe { notify.on_changed(dispid) };
            }
        }
    }

    /// Ask property-notify sinks whether `dispid` may change; any veto wins.
    pub fn request_edit(&self, dispid: DISPID) -> bool {
        self.sinks(&IID_IPROPERTYNOTIFYSINK).iter().all(|sink| {
            sink.cast::<IPropertyNotifySink>()
                .map(|notify| unsafe { notify.on_request_edit(dispid) } == S_OK)
                .unwrap_or(true)
        })
    }
}

// =============================================================================
// IConnectionPoint
// =============================================================================

#[repr(C)]
pub struct ConnectionPoint {
    vtable_i_connection_point: *const IConnectionPointVTable,
    ref_count: ComRefCount,
    hub: Rc<EventHub>,
    iid: GUID,
}

impl ConnectionPoint {
    pub(crate) fn create(hub: Rc<EventHub>, iid: GUID) -> Option<ComPtr<IConnectionPoint>> {
        ComBox::new(ConnectionPoint {
            vtable_i_connection_point: Self::VTABLE_I_CONNECTION_POINT,
            ref_count: ComRefCount::new(),
            hub,
            iid,
        })
        .query()
    }
}

unsafe impl ComObject for ConnectionPoint {
    fn ref_count(&self) -> &ComRefCount {
        &self.ref_count
    }

    fn interface(&self, riid: &GUID) -> Option<*mut c_void> {
        (*riid == IID_IUNKNOWN || *riid == IID_ICONNECTIONPOINT)
            .then(|| interface_ptr(&self.vtable_i_connection_point))
    }
}

#[com_implement(IConnectionPoint)]
impl ConnectionPoint {
    fn get_connection_interface(&self, iid: *mut GUID) -> HRESULT {
        if iid.is_null() {
            return E_POINTER;
        }
        unsafe { *iid = self.iid };
        S_OK
    }

    fn get_connection_point_container(&self, ppcpc: *mut *mut IConnectionPointContainer) -> HRESULT {
        if ppcpc.is_null() {
            return E_POINTER;
        }
        let container = self.hub.container.get();
        if container.is_null() {
            unsafe { *ppcpc = std::ptr::null_mut() };
            return E_UNEXPECTED;
        }
        unsafe {
            (*container).add_ref();
            *ppcpc = container;
        }
        S_OK
    }

    fn advise(&self, sink: *mut IUnknown, cookie: *mut u32) -> HRESULT {
        if cookie.is_null() {
            return E_POINTER;
        }
        unsafe { *cookie = 0 };
        match self.hub.advise(self.iid, sink) {
            Ok(value) => {
                unsafe { *cookie = value };
                S_OK
            }
            Err(hr) => hr,
        }
    }

    fn unadvise(&self, cookie: u32) -> HRESULT {
        self.hub.unadvise(self.iid, cookie)
    }

    fn enum_connections(&self, ppenum: *mut *mut c_void) -> HRESULT {
        unsafe { write_out(ppenum, std::ptr::null_mut()) };
        E_NOTIMPL
    }
}

// =============================================================================
// IEnumConnectionPoints
// =============================================================================

#[repr(C)]
pub struct ConnectionPointEnum {
    vtable_i_enum_connection_points: *const IEnumConnectionPointsVTable,
    ref_count: ComRefCount,
    hub: Rc<EventHub>,
    position: Cell<usize>,
}

impl ConnectionPointEnum {
    pub(crate) fn create(hub: Rc<EventHub>, position: usize) -> Option<ComPtr<IEnumConnectionPoints>> {
        ComBox::new(ConnectionPointEnum {
            vtable_i_enum_connection_points: Self::VTABLE_I_ENUM_CONNECTION_POINTS,
            ref_count: ComRefCount::new(),
            hub,
            position: Cell::new(position),
        })
        .query()
    }
}

unsafe impl ComObject for ConnectionPointEnum {
    fn ref_count(&self) -> &ComRefCount {
        &self.ref_count
    }

    fn interface(&self, riid: &GUID) -> Option<*mut c_void> {
        (*riid == IID_IUNKNOWN || *riid == IID_IENUMCONNECTIONPOINTS)
            .then(|| interface_ptr(&self.vtable_i_enum_connection_points))
    }
}

#[com_implement(IEnumConnectionPoints)]
impl ConnectionPointEnum {
    fn next(&self, count: u32, ppcp: *mut *mut IConnectionPoint, fetched: *mut u32) -> HRESULT {
        if ppcp.is_null() {
            return E_POINTER;
        }
        let offered = self.hub.offered();
        let mut produced = 0usize;
        while produced < count as usize && self.position.get() < offered.len() {
            let iid = offered[self.position.get()];
            self.position.set(self.position.get() + 1);
            let Some(point) = ConnectionPoint::create(self.hub.clone(), iid) else {
                break;
            };
            unsafe { *ppcp.add(produced) = point.into_raw() };
            produced += 1;
        }
        unsafe { write_out(fetched, produced as u32) };
        if produced == count as usize { S_OK } else { S_FALSE }
    }

    fn skip(&self, count: u32) -> HRESULT {
        let total = self.hub.offered().len();
        let target = self.position.get() + count as usize;
        self.position.set(target.min(total));
        if target <= total { S_OK } else { S_FALSE }
    }

    fn reset(&self) -> HRESULT {
        self.position.set(0);
        S_OK
    }

    fn clone(&self, ppenum: *mut *mut IEnumConnectionPoints) -> HRESULT {
        if ppenum.is_null() {
            return E_POINTER;
        }
        match ConnectionPointEnum::create(self.hub.clone(), self.position.get()) {
            Some(copy) => {
                unsafe { *ppenum = copy.into_raw() };
                S_OK
            }
            None => E_OUTOFMEMORY,
        }
    }
}
