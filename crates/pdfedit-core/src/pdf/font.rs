//! Fonts found in page resources: decoding, widths, metrics, re-encoding

use std::collections::BTreeMap;

use lopdf::{Dictionary, Document, Object};

use super::cmap::ToUnicode;
use super::encoding::{glyph_name_to_char, win_ansi_decode};
use super::objects::{as_dict, get, name, name_string, number, resolve, stream_bytes};
use crate::fonts::{style_from_name, FontStyle};
use crate::style::{FLAG_BOLD, FLAG_ITALIC, FLAG_MONOSPACED, FLAG_SERIF};

const DEFAULT_ASCENT: f32 = 0.8;
const DEFAULT_DESCENT: f32 = -0.2;

// Font descriptor flag bits
const DESC_FIXED_PITCH: i64 = 1 << 0;
const DESC_SERIF: i64 = 1 << 1;
const DESC_ITALIC: i64 = 1 << 6;
const DESC_FORCE_BOLD: i64 = 1 << 18;

#[derive(Debug, Clone)]
enum Widths {
    Simple {
        first_char: u32,
        widths: Vec<f32>,
        missing: f32,
    },
    Composite {
        widths: BTreeMap<u32, f32>,
        default: f32,
    },
    /// No width table; a per-font estimate
    Estimated(f32),
}

/// One decoded character code
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Glyph {
    pub text: String,
    /// Advance in thousandths of an em
    pub width: f32,
    /// Single-byte code 32, which word spacing applies to
    pub is_word_space: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct PageFont {
    pub base_name: String,
    pub composite: bool,
    pub embedded: bool,
    /// Fractions of an em; descent is negative
    pub ascent: f32,
    pub descent: f32,
    /// Span style bits derived from the descriptor and the name
    pub span_flags: u32,
    to_unicode: Option<ToUnicode>,
    encoding: Vec<Option<char>>,
    widths: Widths,
}

impl PageFont {
    pub fn load(doc: &Document, font: &Dictionary) -> Self {
        let base_name = get(doc, font, b"BaseFont")
            .and_then(name_string)
            .unwrap_or_default();
        let subtype = get(doc, font, b"Subtype").and_then(name_string);
        let composite = subtype.as_deref() == Some("Type0");

        let descendant = if composite {
            get(doc, font, b"DescendantFonts").and_then(|obj| match obj {
                Object::Array(items) => items.first().and_then(|d| as_dict(doc, d)),
                _ => None,
            })
        } else {
            None
        };
        let metrics_source = descendant.unwrap_or(font);
        let descriptor = get(doc, metrics_source, b"FontDescriptor").and_then(|d| as_dict(doc, d));

        let embedded = descriptor.is_some_and(|d| {
            d.has(b"FontFile") || d.has(b"FontFile2") || d.has(b"FontFile3")
        });

        let (mut ascent, mut descent) = (DEFAULT_ASCENT, DEFAULT_DESCENT);
        if let Some(d) = descriptor {
            if let Some(a) = get(doc, d, b"Ascent").and_then(number).filter(|a| *a > 0.0) {
                ascent = a / 1000.0;
            }
            if let Some(v) = get(doc, d, b"Descent").and_then(number).filter(|v| *v != 0.0) {
                descent = -(v.abs() / 1000.0);
            }
        }

        let to_unicode = get(doc, font, b"ToUnicode")
            .and_then(|obj| stream_bytes(doc, obj))
            .map(|data| ToUnicode::parse(&data))
            .filter(|cmap| !cmap.is_empty());

        let encoding = if composite {
            Vec::new()
        } else {
            simple_encoding(doc, font)
        };

        let widths = if let Some(cid_font) = descendant {
            composite_widths(doc, cid_font)
        } else {
            simple_widths(doc, font, descriptor, &base_name)
        };

        let span_flags = span_flags(doc, descriptor, &base_name);

        Self {
            base_name,
            composite,
            embedded,
            ascent,
            descent,
            span_flags,
            to_unicode,
            encoding,
            widths,
        }
    }

    fn width_of(&self, code: u32) -> f32 {
        match &self.widths {
            Widths::Simple {
                first_char,
                widths,
                missing,
            } => code
                .checked_sub(*first_char)
                .and_then(|i| widths.get(i as usize))
                .copied()
                .unwrap_or(*missing),
            Widths::Composite { widths, default } => {
                widths.get(&code).copied().unwrap_or(*default)
            }
            Widths::Estimated(w) => *w,
        }
    }

    fn text_of(&self, code: u32) -> Option<String> {
        if let Some(text) = self.to_unicode.as_ref().and_then(|m| m.get(code)) {
            return Some(text.to_string());
        }
        if self.composite {
            return None;
        }
        self.encoding
            .get(code as usize)
            .copied()
            .flatten()
            .map(String::from)
    }

    pub fn decode(&self, bytes: &[u8]) -> Vec<Glyph> {
        let codes: Vec<u32> = if self.composite {
            bytes
                .chunks(2)
                .map(|pair| ((pair[0] as u32) << 8) | pair.get(1).copied().unwrap_or(0) as u32)
                .collect()
        } else {
            bytes.iter().map(|&b| b as u32).collect()
        };

        codes
            .into_iter()
            .map(|code| Glyph {
                text: self.text_of(code).unwrap_or_default(),
                width: self.width_of(code),
                is_word_space: !self.composite && code == 32,
            })
            .collect()
    }

    fn code_for(&self, ch: char) -> Option<u32> {
        if let Some(code) = self.to_unicode.as_ref().and_then(|m| m.code_for(ch)) {
            return Some(code);
        }
        if self.composite {
            return None;
        }
        self.encoding
            .iter()
            .position(|c| *c == Some(ch))
            .map(|i| i as u32)
    }

    /// Whether a code is backed by a glyph in an embedded simple font
    fn has_glyph(&self, code: u32) -> bool {
        if !self.embedded {
            return true;
        }
        match &self.widths {
            Widths::Simple {
                first_char, widths, ..
            } => code
                .checked_sub(*first_char)
                .and_then(|i| widths.get(i as usize))
                .is_some_and(|w| *w > 0.0),
            _ => true,
        }
    }

    /// Encode text for a show operator using this font's own encoding.
    ///
    /// Returns the characters the font cannot render on failure.
    pub fn encode(&self, text: &str) -> Result<Vec<u8>, Vec<char>> {
        let mut bytes = Vec::with_capacity(text.len() * 2);
        let mut missing = Vec::new();
        for ch in text.chars() {
            match self.code_for(ch).filter(|code| self.has_glyph(*code)) {
                Some(code) if self.composite && code <= 0xFFFF => {
                    bytes.extend_from_slice(&(code as u16).to_be_bytes());
                }
                Some(code) if !self.composite && code <= 0xFF => bytes.push(code as u8),
                _ => {
                    if !missing.contains(&ch) {
                        missing.push(ch);
                    }
                }
            }
        }
        if missing.is_empty() {
            Ok(bytes)
        } else {
            Err(missing)
        }
    }
}

fn simple_encoding(doc: &Document, font: &Dictionary) -> Vec<Option<char>> {
    let mut table: Vec<Option<char>> = (0..=255u8).map(win_ansi_decode).collect();

    let Some(Object::Dictionary(encoding)) = get(doc, font, b"Encoding") else {
        return table;
    };
    let Some(Object::Array(differences)) = get(doc, encoding, b"Differences") else {
        return table;
    };

    let mut code = 0usize;
    for item in differences {
        match resolve(doc, item) {
            Object::Integer(start) => code = (*start).clamp(0, 255) as usize,
            Object::Name(glyph) => {
                if code < table.len() {
                    let glyph = String::from_utf8_lossy(glyph);
                    table[code] = glyph_name_to_char(&glyph);
                }
                code += 1;
            }
            _ => {}
        }
    }
    table
}

fn simple_widths(
    doc: &Document,
    font: &Dictionary,
    descriptor: Option<&Dictionary>,
    base_name: &str,
) -> Widths {
    let missing = descriptor
        .and_then(|d| get(doc, d, b"MissingWidth"))
        .and_then(number)
        .unwrap_or(0.0);

    match (
        get(doc, font, b"FirstChar").and_then(number),
        get(doc, font, b"Widths"),
    ) {
        (Some(first), Some(Object::Array(values))) => Widths::Simple {
            first_char: first.max(0.0) as u32,
            widths: values
                .iter()
                .map(|v| number(resolve(doc, v)).unwrap_or(0.0))
                .collect(),
            missing,
        },
        _ => Widths::Estimated(estimated_width(base_name)),
    }
}

/// Average advance for fonts without a width table, typically the
/// standard 14 fonts
fn estimated_width(base_name: &str) -> f32 {
    let lower = base_name.to_lowercase();
    if lower.contains("courier") || lower.contains("mono") {
        600.0
    } else if lower.contains("times") {
        500.0
    } else {
        556.0
    }
}

fn composite_widths(doc: &Document, cid_font: &Dictionary) -> Widths {
    let default = get(doc, cid_font, b"DW")
        .and_then(number)
        .unwrap_or(1000.0);
    let mut widths = BTreeMap::new();

    if let Some(Object::Array(items)) = get(doc, cid_font, b"W") {
        let items: Vec<&Object> = items.iter().map(|i| resolve(doc, i)).collect();
        let mut i = 0;
        while i < items.len() {
            let Some(first) = number(items[i]) else {
                break;
            };
            let first = first.max(0.0) as u32;
            match items.get(i + 1) {
                Some(Object::Array(list)) => {
                    for (offset, w) in list.iter().enumerate() {
                        if let Some(w) = number(resolve(doc, w)) {
                            widths.insert(first + offset as u32, w);
                        }
                    }
                    i += 2;
                }
                Some(last) => {
                    let (Some(last), Some(w)) =
                        (number(last), items.get(i + 2).and_then(|o| number(o)))
                    else {
                        break;
                    };
                    let last = (last.max(0.0) as u32).min(first.saturating_add(0xFFFF));
                    for code in first..=last {
                        widths.insert(code, w);
                    }
                    i += 3;
                }
                None => break,
            }
        }
    }

    Widths::Composite { widths, default }
}

fn span_flags(doc: &Document, descriptor: Option<&Dictionary>, base_name: &str) -> u32 {
    let desc_flags = descriptor
        .and_then(|d| get(doc, d, b"Flags"))
        .and_then(|f| match f {
            Object::Integer(i) => Some(*i),
            _ => None,
        })
        .unwrap_or(0);
    let weight = descriptor
        .and_then(|d| get(doc, d, b"FontWeight"))
        .and_then(number)
        .unwrap_or(0.0);
    let italic_angle = descriptor
        .and_then(|d| get(doc, d, b"ItalicAngle"))
        .and_then(number)
        .unwrap_or(0.0);

    let name_style = style_from_name(base_name);
    let lower = base_name.to_lowercase();

    let mut flags = 0;
    if desc_flags & DESC_FIXED_PITCH != 0 || lower.contains("courier") {
        flags |= FLAG_MONOSPACED;
    }
    if desc_flags & DESC_SERIF != 0 || lower.contains("times") {
        flags |= FLAG_SERIF;
    }
    if desc_flags & DESC_ITALIC != 0
        || italic_angle != 0.0
        || matches!(name_style, Some(FontStyle::Italic | FontStyle::BoldItalic))
    {
        flags |= FLAG_ITALIC;
    }
    if desc_flags & DESC_FORCE_BOLD != 0
        || weight >= 600.0
        || matches!(name_style, Some(FontStyle::Bold | FontStyle::BoldItalic))
    {
        flags |= FLAG_BOLD;
    }
    flags
}

/// Whether an object is a font dictionary (as opposed to junk in `/Font`)
pub(crate) fn is_font_dict(dict: &Dictionary) -> bool {
    dict.get(b"Type")
        .ok()
        .and_then(name)
        .map_or(true, |t| t == b"Font")
}
