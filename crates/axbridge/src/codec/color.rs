//! `OLE_COLOR` conversion

use crate::value::Color;

/// High byte marking a system colour index
const SYSTEM_COLOR: u32 = 0x8000_0000;

/// Default system colours by `COLOR_*` index, as `0xRRGGBB`
const SYSTEM_COLORS: [u32; 31] = [
    0xC8C8C8, // scrollbar
    0x000000, // background
    0x99B4D1, // active caption
    0xBFCDDB, // inactive caption
    0xF0F0F0, // menu
    0xFFFFFF, // window
    0x646464, // window frame
    0x000000, // menu text
    0x000000, // window text
    0x000000, // caption text
    0xB4B4B4, // active border
    0xF4F7FC, // inactive border
    0xABABAB, // app workspace
    0x3399FF, // highlight
    0xFFFFFF, // highlight text
    0xF0F0F0, // button face
    0xA0A0A0, // button shadow
    0x6D6D6D, // gray text
    0x000000, // button text
    0x434E54, // inactive caption text
    0xFFFFFF, // button highlight
    0x696969, // 3D dark shadow
    0xE3E3E3, // 3D light
    0x000000, // info text
    0xFFFFE1, // info background
    0x000000,
    0x0066CC, // hot light
    0xB9D1EA, // gradient active caption
    0xD7E4F2, // gradient inactive caption
    0x3399FF, // menu highlight
    0xF0F0F0, // menu bar
];

/// Translate an `OLE_COLOR` (`0x00BBGGRR`, a palette reference, or a system
/// colour index) to RGB.
#[must_use]
pub fn ole_to_color(ole: u32) -> Color {
    if ole & SYSTEM_COLOR != 0 {
        let index = (ole & 0xFFFF) as usize;
        let Some(rgb) = SYSTEM_COLORS.get(index) else {
            log::warn!("unknown system colour index {}", index);
            return Color::default();
        };
        return Color::rgb((rgb >> 16) as u8, (rgb >> 8) as u8, *rgb as u8);
    }
    // Palette-relative (0x02) and palette-index (0x01) forms keep their RGB bits
    Color::rgb(ole as u8, (ole >> 8) as u8, (ole >> 16) as u8)
}

/// `0x00BBGGRR`
#[must_use]
pub fn color_to_ole(color: Color) -> u32 {
    u32::from(color.r) | u32::from(color.g) << 8 | u32::from(color.b) << 16
}
