//! Stock font and picture objects
//!
//! Fonts and pixmaps cross the boundary as automation objects with the stock
//! `IFontDisp` / `IPictureDisp` properties. The objects here are what the
//! bridge hands out; [`read_font`] and [`read_pixmap`] read any object that
//! answers the same DISPIDs.

use std::cell::RefCell;
use std::ffi::c_void;

use axcom::oleauto::{sys_alloc_string, variant_clear, wide_to_string};
use axcom::proc::com_implement;
use axcom::*;

use crate::value::{Font, Pixmap};

pub const DISPID_FONT_NAME: DISPID = 0;
pub const DISPID_FONT_SIZE: DISPID = 2;
pub const DISPID_FONT_BOLD: DISPID = 3;
pub const DISPID_FONT_ITALIC: DISPID = 4;
pub const DISPID_FONT_UNDER: DISPID = 5;
pub const DISPID_FONT_STRIKE: DISPID = 6;
pub const DISPID_FONT_WEIGHT: DISPID = 7;
pub const DISPID_FONT_CHARSET: DISPID = 8;

pub const DISPID_PICT_HANDLE: DISPID = 0;
pub const DISPID_PICT_TYPE: DISPID = 3;
pub const DISPID_PICT_WIDTH: DISPID = 4;
pub const DISPID_PICT_HEIGHT: DISPID = 5;

pub const PICTYPE_NONE: i16 = 0;
pub const PICTYPE_BITMAP: i16 = 1;

const FONT_NAMES: [(&str, DISPID); 8] = [
    ("Name", DISPID_FONT_NAME),
    ("Size", DISPID_FONT_SIZE),
    ("Bold", DISPID_FONT_BOLD),
    ("Italic", DISPID_FONT_ITALIC),
    ("Underline", DISPID_FONT_UNDER),
    ("Strikethrough", DISPID_FONT_STRIKE),
    ("Weight", DISPID_FONT_WEIGHT),
    ("Charset", DISPID_FONT_CHARSET),
];

const PICTURE_NAMES: [(&str, DISPID); 4] = [
    ("Handle", DISPID_PICT_HANDLE),
    ("Type", DISPID_PICT_TYPE),
    ("Width", DISPID_PICT_WIDTH),
    ("Height", DISPID_PICT_HEIGHT),
];

const CY_SCALE: f64 = 10_000.0;

// =============================================================================
// Shared IDispatch plumbing
// =============================================================================

/// `GetIDsOfNames` over a fixed name table
///
/// # Safety
/// `names` must hold `cnames` wide strings and `dispids` room for as many ids.
unsafe fn ids_of_names(
    table: &[(&str, DISPID)],
    names: *const *const u16,
    cnames: u32,
    dispids: *mut DISPID,
) -> HRESULT {
    if names.is_null() || dispids.is_null() || cnames == 0 {
        return E_INVALIDARG;
    }
    let mut hr = S_OK;
    for i in 0..cnames as usize {
        let name = unsafe { wide_to_string(*names.add(i)) };
        let found = (i == 0)
            .then(|| table.iter().find(|(n, _)| n.eq_ignore_ascii_case(&name)))
            .flatten();
        let dispid = match found {
            Some((_, dispid)) => *dispid,
            None => {
                hr = DISP_E_UNKNOWNNAME;
                DISPID_UNKNOWN
            }
        };
        unsafe { *dispids.add(i) = dispid };
    }
    hr
}

/// The single value of a property put, by value
///
/// # Safety
/// `params` must be null or a valid `DISPPARAMS`.
unsafe fn put_value(params: *const DISPPARAMS) -> Option<VARIANT> {
    let params = unsafe { params.as_ref() }?;
    if params.c_args != 1 || params.rgvarg.is_null() {
        return None;
    }
    let var = unsafe { *params.rgvarg };
    if var.vt == VT_VARIANT | VT_BYREF {
        return Some(unsafe { *var.data.pvar_val });
    }
    Some(var)
}

fn store_result(result: *mut VARIANT, mut value: VARIANT) {
    match unsafe { result.as_mut() } {
        Some(slot) => {
            variant_clear(slot);
            *slot = value;
        }
        None => {
            variant_clear(&mut value);
        }
    }
}

fn i2(value: i16) -> VARIANT {
    let mut var = VARIANT::new();
    var.vt = VT_I2;
    var.data.i_val = value;
    var
}

fn cy(points: f64) -> VARIANT {
    let mut var = VARIANT::new();
    var.vt = VT_CY;
    var.data.cy_val = CY {
        int64: (points * CY_SCALE).round() as i64,
    };
    var
}

fn number(var: &VARIANT) -> Option<f64> {
    match var.vt {
        VT_CY => Some(unsafe { var.data.cy_val.int64 } as f64 / CY_SCALE),
        VT_I2 => Some(f64::from(unsafe { var.data.i_val })),
        _ => var.as_f64().or_else(|| var.as_i32().map(f64::from)),
    }
}

// =============================================================================
// StockFont
// =============================================================================

/// A font object answering the stock font DISPIDs
#[repr(C)]
pub struct StockFont {
    vtable_i_dispatch: *const IDispatchVTable,
    ref_count: ComRefCount,
    font: RefCell<Font>,
}

impl StockFont {
    #[must_use]
    pub fn create(font: &Font) -> Option<ComPtr<IDispatch>> {
        ComBox::new(StockFont {
            vtable_i_dispatch: Self::VTABLE_I_DISPATCH,
            ref_count: ComRefCount::new(),
            font: RefCell::new(font.clone()),
        })
        .query()
    }

    fn get(&self, dispid: DISPID) -> Option<VARIANT> {
        let font = self.font.borrow();
        let var = match dispid {
            DISPID_FONT_NAME => VARIANT::from_bstr(sys_alloc_string(&font.family)),
            DISPID_FONT_SIZE => cy(font.point_size),
            DISPID_FONT_BOLD => VARIANT::from_bool(font.bold()),
            DISPID_FONT_ITALIC => VARIANT::from_bool(font.italic),
            DISPID_FONT_UNDER => VARIANT::from_bool(font.underline),
            DISPID_FONT_STRIKE => VARIANT::from_bool(font.strike_out),
            DISPID_FONT_WEIGHT => i2(font.weight),
            DISPID_FONT_CHARSET => i2(font.charset),
            _ => return None,
        };
        Some(var)
    }

    fn put(&self, dispid: DISPID, value: &VARIANT) -> HRESULT {
        let mut font = self.font.borrow_mut();
        let flag = || value.as_bool().or_else(|| value.as_i32().map(|v| v != 0));
        let applied = match dispid {
            DISPID_FONT_NAME => value.as_string().map(|name| font.family = name),
            DISPID_FONT_SIZE => number(value).map(|size| font.point_size = size),
            DISPID_FONT_BOLD => flag().map(|bold| font.weight = if bold { 700 } else { 400 }),
            DISPID_FONT_ITALIC => flag().map(|v| font.italic = v),
            DISPID_FONT_UNDER => flag().map(|v| font.underline = v),
            DISPID_FONT_STRIKE => flag().map(|v| font.strike_out = v),
            DISPID_FONT_WEIGHT => number(value).map(|w| font.weight = w as i16),
            DISPID_FONT_CHARSET => number(value).map(|c| font.charset = c as i16),
            _ => return DISP_E_MEMBERNOTFOUND,
        };
        if applied.is_some() { S_OK } else { DISP_E_TYPEMISMATCH }
    }
}

unsafe impl ComObject for StockFont {
    fn ref_count(&self) -> &ComRefCount {
        &self.ref_count
    }

    fn interface(&self, riid: &GUID) -> Option<*mut c_void> {
        (*riid == IID_IUNKNOWN || *riid == IID_IDISPATCH || *riid == IID_IFONTDISP)
            .then(|| interface_ptr(&self.vtable_i_dispatch))
    }
}

#[com_implement(IDispatch)]
impl StockFont {
    fn get_type_info_count(&self, pctinfo: *mut u32) -> HRESULT {
        if pctinfo.is_null() {
            return E_POINTER;
        }
        unsafe { *pctinfo = 0 };
        S_OK
    }

    fn get_type_info(&self, itinfo: u32, lcid: LCID, pptinfo: *mut *mut ITypeInfo) -> HRESULT {
        let _ = (itinfo, lcid);
        if !pptinfo.is_null() {
            unsafe { *pptinfo = std::ptr::null_mut() };
        }
        DISP_E_BADINDEX
    }

    fn get_ids_of_names(
        &self,
        riid: *const GUID,
        names: *const *const u16,
        cnames: u32,
        lcid: LCID,
        dispids: *mut DISPID,
    ) -> HRESULT {
        let _ = (riid, lcid);
        unsafe { ids_of_names(&FONT_NAMES, names, cnames, dispids) }
    }

    fn invoke(
        &self,
        dispid: DISPID,
        riid: *const GUID,
        lcid: LCID,
        flags: u16,
        params: *mut DISPPARAMS,
        result: *mut VARIANT,
        excepinfo: *mut EXCEPINFO,
        argerr: *mut u32,
    ) -> HRESULT {
        let _ = (riid, lcid, excepinfo, argerr);
        if flags & (DISPATCH_PROPERTYPUT | DISPATCH_PROPERTYPUTREF) != 0 {
            return match unsafe { put_value(params) } {
                Some(value) => self.put(dispid, &value),
                None => DISP_E_BADPARAMCOUNT,
            };
        }
        match self.get(dispid) {
            Some(value) => {
                store_result(result, value);
                S_OK
            }
            None => DISP_E_MEMBERNOTFOUND,
        }
    }
}

// =============================================================================
// StockPicture
// =============================================================================

/// A picture object answering the stock picture DISPIDs
#[repr(C)]
pub struct StockPicture {
    vtable_i_dispatch: *const IDispatchVTable,
    ref_count: ComRefCount,
    pixmap: Pixmap,
}

impl StockPicture {
    #[must_use]
    pub fn create(pixmap: &Pixmap) -> Option<ComPtr<IDispatch>> {
        ComBox::new(StockPicture {
            vtable_i_dispatch: Self::VTABLE_I_DISPATCH,
            ref_count: ComRefCount::new(),
            pixmap: *pixmap,
        })
        .query()
    }

    fn get(&self, dispid: DISPID) -> Option<VARIANT> {
        let var = match dispid {
            DISPID_PICT_HANDLE => VARIANT::from_i32(self.pixmap.handle as i32),
            DISPID_PICT_TYPE => i2(if self.pixmap.is_null() {
                PICTYPE_NONE
            } else {
                PICTYPE_BITMAP
            }),
            DISPID_PICT_WIDTH => VARIANT::from_i32(self.pixmap.width),
            DISPID_PICT_HEIGHT => VARIANT::from_i32(self.pixmap.height),
            _ => return None,
        };
        Some(var)
    }
}

unsafe impl ComObject for StockPicture {
    fn ref_count(&self) -> &ComRefCount {
        &self.ref_count
    }

    fn interface(&self, riid: &GUID) -> Option<*mut c_void> {
        (*riid == IID_IUNKNOWN || *riid == IID_IDISPATCH || *riid == IID_IPICTUREDISP)
            .then(|| interface_ptr(&self.vtable_i_dispatch))
    }
}

#[com_implement(IDispatch)]
impl StockPicture {
    fn get_type_info_count(&self, pctinfo: *mut u32) -> HRESULT {
        if pctinfo.is_null() {
            return E_POINTER;
        }
        unsafe { *pctinfo = 0 };
        S_OK
    }

    fn get_type_info(&self, itinfo: u32, lcid: LCID, pptinfo: *mut *mut ITypeInfo) -> HRESULT {
        let _ = (itinfo, lcid);
        if !pptinfo.is_null() {
            unsafe { *pptinfo = std::ptr::null_mut() };
        }
        DISP_E_BADINDEX
    }

    fn get_ids_of_names(
        &self,
        riid: *const GUID,
        names: *const *const u16,
        cnames: u32,
        lcid: LCID,
        dispids: *mut DISPID,
    ) -> HRESULT {
        let _ = (riid, lcid);
        unsafe { ids_of_names(&PICTURE_NAMES, names, cnames, dispids) }
    }

    fn invoke(
        &self,
        dispid: DISPID,
        riid: *const GUID,
        lcid: LCID,
        flags: u16,
        params: *mut DISPPARAMS,
        result: *mut VARIANT,
        excepinfo: *mut EXCEPINFO,
        argerr: *mut u32,
    ) -> HRESULT {
        let _ = (riid, lcid, params, excepinfo, argerr);
        if flags & DISPATCH_PROPERTYGET == 0 {
            return DISP_E_MEMBERNOTFOUND;
        }
        match self.get(dispid) {
            Some(value) => {
                store_result(result, value);
                S_OK
            }
            None => DISP_E_MEMBERNOTFOUND,
        }
    }
}

// =============================================================================
// Reading stock properties
// =============================================================================

/// Read one property and hand it to `read`; the value is released afterwards.
fn with_property<T>(
    dispatch: &IDispatch,
    dispid: DISPID,
    read: impl FnOnce(&VARIANT) -> Option<T>,
) -> Option<T> {
    let mut params = DISPPARAMS::default();
    let mut result = VARIANT::new();
    let hr = unsafe {
        dispatch.invoke(
            dispid,
            &IID_NULL,
            LOCALE_USER_DEFAULT,
            DISPATCH_PROPERTYGET,
            &mut params,
            &mut result,
            std::ptr::null_mut(),
            std::ptr::null_mut(),
        )
    };
    let value = if succeeded(hr) { read(&result) } else { None };
    variant_clear(&mut result);
    value
}

/// Read a font through the stock font properties; `None` if `dispatch` has no `Name`.
pub fn read_font(dispatch: &IDispatch) -> Option<Font> {
    let family = with_property(dispatch, DISPID_FONT_NAME, VARIANT::as_string)?;
    let flag = |dispid| with_property(dispatch, dispid, VARIANT::as_bool).unwrap_or(false);
    let mut font = Font {
        family,
        point_size: with_property(dispatch, DISPID_FONT_SIZE, number).unwrap_or(0.0),
        italic: flag(DISPID_FONT_ITALIC),
        underline: flag(DISPID_FONT_UNDER),
        strike_out: flag(DISPID_FONT_STRIKE),
        charset: with_property(dispatch, DISPID_FONT_CHARSET, number).map_or(0, |c| c as i16),
        ..Font::default()
    };
    font.weight = match with_property(dispatch, DISPID_FONT_WEIGHT, number) {
        Some(weight) => weight as i16,
        None if flag(DISPID_FONT_BOLD) => 700,
        None => 400,
    };
    Some(font)
}

/// Read a picture through the stock picture properties.
///
/// `None` if `dispatch` is not a picture; pictures that are not bitmaps read
/// as a null pixmap.
pub fn read_pixmap(dispatch: &IDispatch) -> Option<Pixmap> {
    let kind = with_property(dispatch, DISPID_PICT_TYPE, VARIANT::as_i32)?;
    if kind != i32::from(PICTYPE_BITMAP) {
        return Some(Pixmap::default());
    }
    Some(Pixmap {
        handle: with_property(dispatch, DISPID_PICT_HANDLE, VARIANT::as_i32).map_or(0, |h| h as u32),
        width: with_property(dispatch, DISPID_PICT_WIDTH, VARIANT::as_i32).unwrap_or(0),
        height: with_property(dispatch, DISPID_PICT_HEIGHT, VARIANT::as_i32).unwrap_or(0),
    })
}
