//! Style decoding for text spans
//!
//! Spans carry their colour packed as `0xRRGGBB` and their weight/slant as a
//! bit field. The bit assignment follows the span flag layout of the document
//! model (MuPDF's): bit 0 superscript, bit 1 italic, bit 2 serif, bit 3
//! monospaced, bit 4 bold.

use serde::{Deserialize, Serialize};

pub const FLAG_SUPERSCRIPT: u32 = 1 << 0;
pub const FLAG_ITALIC: u32 = 1 << 1;
pub const FLAG_SERIF: u32 = 1 << 2;
pub const FLAG_MONOSPACED: u32 = 1 << 3;
pub const FLAG_BOLD: u32 = 1 << 4;

/// Renderer-neutral colour, each component in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rgb {
    pub r: f32,
    pub g: f32,
    pub b: f32,
}

impl Rgb {
    pub const BLACK: Rgb = Rgb {
        r: 0.0,
        g: 0.0,
        b: 0.0,
    };
    pub const WHITE: Rgb = Rgb {
        r: 1.0,
        g: 1.0,
        b: 1.0,
    };

    pub fn new(r: f32, g: f32, b: f32) -> Self {
        Self {
            r: r.clamp(0.0, 1.0),
            g: g.clamp(0.0, 1.0),
            b: b.clamp(0.0, 1.0),
        }
    }

    /// Pack back into `0xRRGGBB`
    pub fn to_packed(self) -> u32 {
        let channel = |v: f32| (v.clamp(0.0, 1.0) * 255.0).round() as u32;
        (channel(self.r) << 16) | (channel(self.g) << 8) | channel(self.b)
    }
}

/// Decode a packed `0xRRGGBB` colour. Bits above the low 24 are ignored.
pub fn decode_color(packed: u32) -> Rgb {
    if packed == 0 {
        return Rgb::BLACK;
    }
    let r = (packed >> 16) & 0xFF;
    let g = (packed >> 8) & 0xFF;
    let b = packed & 0xFF;
    Rgb {
        r: r as f32 / 255.0,
        g: g as f32 / 255.0,
        b: b as f32 / 255.0,
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StyleFlags {
    pub bold: bool,
    pub italic: bool,
}

pub fn decode_flags(flags: u32) -> StyleFlags {
    StyleFlags {
        bold: flags & FLAG_BOLD != 0,
        italic: flags & FLAG_ITALIC != 0,
    }
}
