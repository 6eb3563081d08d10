//! Embedding a TrueType/OpenType program as a composite font
//!
//! Text is shown with two-byte glyph ids (Identity-H). Widths and the
//! ToUnicode map are written for the glyphs actually used, so inserted text
//! stays measurable and extractable.

use std::collections::BTreeMap;
use std::sync::Arc;

use lopdf::{dictionary, Document, Object, ObjectId, Stream};

use super::cmap::ToUnicode;
use crate::error::RenderError;

#[derive(Debug, Clone)]
pub(crate) struct EmbeddedFont {
    /// PDF-safe base font name
    pub name: String,
    data: Arc<[u8]>,
    units_per_em: f32,
    ascent: f32,
    descent: f32,
    bbox: [f32; 4],
    cff: bool,
    /// Glyph id -> (character, advance in 1/1000 em)
    used: BTreeMap<u16, (char, f32)>,
}

fn pdf_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '+'))
        .collect();
    if cleaned.is_empty() {
        "EmbeddedFont".to_string()
    } else {
        cleaned
    }
}

impl EmbeddedFont {
    pub fn parse(name: &str, data: &[u8]) -> Result<Self, RenderError> {
        let face = ttf_parser::Face::parse(data, 0)
            .map_err(|e| RenderError::InvalidFontData(format!("{name}: {e}")))?;
        let units_per_em = face.units_per_em() as f32;
        if units_per_em <= 0.0 {
            return Err(RenderError::InvalidFontData(format!(
                "{name}: zero units per em"
            )));
        }
        let scale = 1000.0 / units_per_em;
        let rect = face.global_bounding_box();
        let cff = face
            .raw_face()
            .table(ttf_parser::Tag::from_bytes(b"CFF "))
            .is_some();

        Ok(Self {
            name: pdf_name(name),
            data: Arc::from(data),
            units_per_em,
            ascent: face.ascender() as f32 * scale,
            descent: face.descender() as f32 * scale,
            bbox: [
                rect.x_min as f32 * scale,
                rect.y_min as f32 * scale,
                rect.x_max as f32 * scale,
                rect.y_max as f32 * scale,
            ],
            cff,
            used: BTreeMap::new(),
        })
    }

    /// Encode text as big-endian glyph ids, recording the glyphs used.
    ///
    /// Nothing is recorded when any character lacks a glyph.
    pub fn encode(&mut self, text: &str) -> Result<Vec<u8>, RenderError> {
        let face = ttf_parser::Face::parse(&self.data, 0)
            .map_err(|e| RenderError::InvalidFontData(format!("{}: {e}", self.name)))?;
        let scale = 1000.0 / self.units_per_em;

        let mut glyphs = Vec::with_capacity(text.len());
        let mut missing = Vec::new();
        for ch in text.chars() {
            match face.glyph_index(ch) {
                Some(gid) if gid.0 != 0 => {
                    let advance = face.glyph_hor_advance(gid).unwrap_or(0) as f32 * scale;
                    glyphs.push((gid.0, ch, advance));
                }
                _ => {
                    if !missing.contains(&ch) {
                        missing.push(ch);
                    }
                }
            }
        }
        if !missing.is_empty() {
            return Err(RenderError::MissingGlyphs {
                font: self.name.clone(),
                chars: missing,
            });
        }

        let mut bytes = Vec::with_capacity(glyphs.len() * 2);
        for (gid, ch, advance) in glyphs {
            bytes.extend_from_slice(&gid.to_be_bytes());
            self.used.entry(gid).or_insert((ch, advance));
        }
        Ok(bytes)
    }

    /// Write the font objects into `doc`, returning the Type0 font id
    pub fn write(&self, doc: &mut Document) -> ObjectId {
        let font_file = if self.cff {
            Stream::new(dictionary! { "Subtype" => "OpenType" }, self.data.to_vec())
        } else {
            Stream::new(
                dictionary! { "Length1" => self.data.len() as i64 },
                self.data.to_vec(),
            )
        };
        let font_file_id = doc.add_object(font_file);

        let mut descriptor = dictionary! {
            "Type" => "FontDescriptor",
            "FontName" => Object::Name(self.name.clone().into_bytes()),
            "Flags" => 32,
            "FontBBox" => self.bbox.iter().map(|v| Object::Real(*v)).collect::<Vec<_>>(),
            "ItalicAngle" => 0,
            "Ascent" => Object::Real(self.ascent),
            "Descent" => Object::Real(self.descent),
            "CapHeight" => Object::Real(self.ascent),
            "StemV" => 80,
        };
        let file_key = if self.cff { "FontFile3" } else { "FontFile2" };
        descriptor.set(file_key, font_file_id);
        let descriptor_id = doc.add_object(descriptor);

        let mut widths = Vec::with_capacity(self.used.len() * 2);
        for (gid, (_, advance)) in &self.used {
            widths.push(Object::Integer(*gid as i64));
            widths.push(Object::Array(vec![Object::Real(*advance)]));
        }

        let mut cid_font = dictionary! {
            "Type" => "Font",
            "Subtype" => if self.cff { "CIDFontType0" } else { "CIDFontType2" },
            "BaseFont" => Object::Name(self.name.clone().into_bytes()),
            "CIDSystemInfo" => dictionary! {
                "Registry" => Object::string_literal("Adobe"),
                "Ordering" => Object::string_literal("Identity"),
                "Supplement" => 0,
            },
            "FontDescriptor" => descriptor_id,
            "DW" => 1000,
            "W" => widths,
        };
        if !self.cff {
            cid_font.set("CIDToGIDMap", "Identity");
        }
        let cid_font_id = doc.add_object(cid_font);

        let mut to_unicode = ToUnicode::default();
        for (gid, (ch, _)) in &self.used {
            to_unicode.insert(*gid as u32, ch.to_string());
        }
        let to_unicode_id = doc.add_object(Stream::new(
            dictionary! {},
            to_unicode.to_cmap_program(),
        ));

        doc.add_object(dictionary! {
            "Type" => "Font",
            "Subtype" => "Type0",
            "BaseFont" => Object::Name(self.name.clone().into_bytes()),
            "Encoding" => "Identity-H",
            "DescendantFonts" => vec![Object::Reference(cid_font_id)],
            "ToUnicode" => to_unicode_id,
        })
    }
}
