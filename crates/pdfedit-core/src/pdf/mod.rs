//! lopdf-backed document collaborator
//!
//! Reads pages into the block/line/span model and stages overlay drawing
//! (clearing rectangles, replacement text) that is written out on save. The
//! original page content is left untouched and wrapped in `q … Q` so the
//! overlay starts from a clean graphics state.

mod cmap;
mod embed;
mod encoding;
mod extract;
mod font;
mod objects;

use std::collections::{BTreeMap, BTreeSet};

use lopdf::content::{Content, Operation};
use lopdf::{dictionary, Dictionary, Document, Object, ObjectId, Stream, StringFormat};
use tracing::debug;

use crate::error::{EditError, RenderError};
use crate::fonts::{is_standard_font, strip_subset_prefix, UNIVERSAL_DEFAULT};
use crate::model::{EditMark, EditableDocument, FontRequest, Rect, TextInsert, TextPage};
use crate::style::Rgb;

use embed::EmbeddedFont;
use encoding::win_ansi_encode;
use extract::{extract_page, load_page_fonts};
use objects::{inherited, media_box, resolve};

/// Prefix of the resource names given to overlay fonts
const OVERLAY_FONT_PREFIX: &str = "PdfEditF";

/// Standard fonts with a built-in symbol encoding, unusable for text
const SYMBOLIC_STANDARD_FONTS: [&str; 2] = ["Symbol", "ZapfDingbats"];

#[derive(Debug, Clone)]
enum OverlayFont {
    Standard(String),
    /// Font resource already present on a page, referenced as-is
    PageResource(Object),
    Embedded(EmbeddedFont),
}

#[derive(Debug, Clone)]
struct OverlayFontEntry {
    key: String,
    font: OverlayFont,
}

#[derive(Debug, Clone)]
enum Overlay {
    Fill {
        rect: Rect,
        color: Rgb,
    },
    Text {
        font: usize,
        x: f32,
        y: f32,
        size: f32,
        color: Rgb,
        bytes: Vec<u8>,
    },
}

/// A PDF opened for span-level editing
pub struct PdfDocument {
    doc: Document,
    pages: Vec<ObjectId>,
    fonts: Vec<OverlayFontEntry>,
    journal: Vec<(usize, Overlay)>,
}

impl PdfDocument {
    pub fn load(bytes: &[u8]) -> Result<Self, EditError> {
        let doc = Document::load_mem(bytes).map_err(|e| EditError::ParseError(e.to_string()))?;
        Ok(Self::from_document(doc))
    }

    pub fn from_document(doc: Document) -> Self {
        let pages = doc.get_pages().into_values().collect();
        Self {
            doc,
            pages,
            fonts: Vec::new(),
            journal: Vec::new(),
        }
    }

    /// Number of staged drawing operations not yet saved
    pub fn pending_operations(&self) -> usize {
        self.journal.len()
    }

    fn page_id(&self, page: usize) -> Option<ObjectId> {
        self.pages.get(page).copied()
    }

    fn font_slot(&mut self, key: String, make: impl FnOnce() -> OverlayFont) -> usize {
        if let Some(slot) = self.fonts.iter().position(|f| f.key == key) {
            return slot;
        }
        self.fonts.push(OverlayFontEntry { key, font: make() });
        self.fonts.len() - 1
    }

    fn standard_font(
        &mut self,
        name: &str,
        text: &str,
        lossy: bool,
    ) -> Result<(usize, Vec<u8>), RenderError> {
        let mut bytes = Vec::with_capacity(text.len());
        let mut missing = Vec::new();
        for ch in text.chars() {
            match win_ansi_encode(ch) {
                Some(code) => bytes.push(code),
                None if lossy => bytes.push(b'?'),
                None => {
                    if !missing.contains(&ch) {
                        missing.push(ch);
                    }
                }
            }
        }
        if !missing.is_empty() {
            return Err(RenderError::MissingGlyphs {
                font: name.to_string(),
                chars: missing,
            });
        }
        let slot = self.font_slot(format!("standard:{name}"), || {
            OverlayFont::Standard(name.to_string())
        });
        Ok((slot, bytes))
    }

    /// Reuse a font resource of the page whose base name matches `name`
    fn page_font(
        &mut self,
        page: usize,
        name: &str,
        text: &str,
    ) -> Result<(usize, Vec<u8>), RenderError> {
        let page_id = self.page_id(page).ok_or(RenderError::PageOutOfRange(page))?;
        let wanted = strip_subset_prefix(name);

        let resources = inherited(&self.doc, page_id, b"Resources").and_then(|r| match r {
            Object::Dictionary(dict) => Some(dict),
            _ => None,
        });
        let candidate = load_page_fonts(&self.doc, resources)
            .into_iter()
            .find(|(_, (_, font))| strip_subset_prefix(&font.base_name) == wanted);
        let Some((resource, (object, font))) = candidate else {
            return Err(RenderError::UnknownFont(name.to_string()));
        };

        let bytes = font.encode(text).map_err(|chars| RenderError::MissingGlyphs {
            font: font.base_name.clone(),
            chars,
        })?;
        let key = match &object {
            Object::Reference(id) => format!("object:{} {}", id.0, id.1),
            _ => format!("page:{page}:{}", String::from_utf8_lossy(&resource)),
        };
        let slot = self.font_slot(key, || OverlayFont::PageResource(object));
        Ok((slot, bytes))
    }

    fn embedded_font(
        &mut self,
        name: &str,
        data: &[u8],
        text: &str,
    ) -> Result<(usize, Vec<u8>), RenderError> {
        let key = format!("embedded:{name}");
        let slot = match self.fonts.iter().position(|f| f.key == key) {
            Some(slot) => slot,
            None => {
                let font = EmbeddedFont::parse(name, data)?;
                self.font_slot(key, || OverlayFont::Embedded(font))
            }
        };
        match &mut self.fonts[slot].font {
            OverlayFont::Embedded(font) => Ok((slot, font.encode(text)?)),
            _ => Err(RenderError::InvalidFontData(name.to_string())),
        }
    }

    fn resolve_font(
        &mut self,
        insert: &TextInsert<'_>,
    ) -> Result<(usize, Vec<u8>), RenderError> {
        match insert.font {
            FontRequest::Embedded { name, data } => self.embedded_font(name, data, insert.text),
            FontRequest::Named(name) => {
                if SYMBOLIC_STANDARD_FONTS.contains(&name) {
                    Err(RenderError::UnknownFont(name.to_string()))
                } else if is_standard_font(name) {
                    self.standard_font(name, insert.text, false)
                } else {
                    self.page_font(insert.page, name, insert.text)
                }
            }
            FontRequest::RendererDefault => {
                self.standard_font(UNIVERSAL_DEFAULT, insert.text, true)
            }
        }
    }

    /// Top-down point to PDF user space
    fn to_pdf(&self, page_id: ObjectId, x: f32, y: f32) -> (f32, f32) {
        let media = media_box(&self.doc, page_id);
        (media[0] + x, media[3] - y)
    }

    fn overlay_operations(
        &self,
        page_id: ObjectId,
        overlays: &[&Overlay],
        font_names: &BTreeMap<usize, String>,
    ) -> Vec<Operation> {
        let mut ops = vec![Operation::new("Q", vec![]), Operation::new("q", vec![])];
        for overlay in overlays {
            match overlay {
                Overlay::Fill { rect, color } => {
                    let (x, y) = self.to_pdf(page_id, rect.x0, rect.y1);
                    ops.push(Operation::new("rg", rgb_operands(*color)));
                    ops.push(Operation::new(
                        "re",
                        vec![
                            Object::Real(x),
                            Object::Real(y),
                            Object::Real(rect.width()),
                            Object::Real(rect.height()),
                        ],
                    ));
                    ops.push(Operation::new("f", vec![]));
                }
                Overlay::Text {
                    font,
                    x,
                    y,
                    size,
                    color,
                    bytes,
                } => {
                    let Some(name) = font_names.get(font) else {
                        continue;
                    };
                    let (px, py) = self.to_pdf(page_id, *x, *y);
                    ops.push(Operation::new("BT", vec![]));
                    ops.push(Operation::new(
                        "Tf",
                        vec![Object::Name(name.clone().into_bytes()), Object::Real(*size)],
                    ));
                    ops.push(Operation::new("rg", rgb_operands(*color)));
                    ops.push(Operation::new(
                        "Tm",
                        vec![
                            Object::Integer(1),
                            Object::Integer(0),
                            Object::Integer(0),
                            Object::Integer(1),
                            Object::Real(px),
                            Object::Real(py),
                        ],
                    ));
                    ops.push(Operation::new(
                        "Tj",
                        vec![Object::String(bytes.clone(), StringFormat::Hexadecimal)],
                    ));
                    ops.push(Operation::new("ET", vec![]));
                }
            }
        }
        ops.push(Operation::new("Q", vec![]));
        ops
    }
}

/// Resource names for the overlay fonts used on one page, skipping names the
/// page already has (earlier edits leave their own overlay fonts behind)
fn overlay_font_names(page_fonts: &Dictionary, slots: &BTreeSet<usize>) -> BTreeMap<usize, String> {
    let mut names = BTreeMap::new();
    let mut counter = 0;
    for slot in slots {
        let name = loop {
            counter += 1;
            let candidate = format!("{OVERLAY_FONT_PREFIX}{counter}");
            if !page_fonts.has(candidate.as_bytes()) {
                break candidate;
            }
        };
        names.insert(*slot, name);
    }
    names
}

fn rgb_operands(color: Rgb) -> Vec<Object> {
    vec![
        Object::Real(color.r),
        Object::Real(color.g),
        Object::Real(color.b),
    ]
}

fn encode_content(ops: Vec<Operation>) -> Result<Vec<u8>, EditError> {
    Content { operations: ops }
        .encode()
        .map_err(|e| EditError::OperationError(e.to_string()))
}

/// Pad an encoded stream with newlines on both sides.
///
/// Readers concatenate a page's content streams byte for byte, so an
/// operator at a stream edge would otherwise fuse with its neighbour.
fn delimited(encoded: Vec<u8>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(encoded.len() + 2);
    bytes.push(b'\n');
    bytes.extend(encoded);
    bytes.push(b'\n');
    bytes
}

fn operation_error(e: lopdf::Error) -> EditError {
    EditError::OperationError(e.to_string())
}

/// Current content stream references of a page
fn content_refs(doc: &Document, page: &Dictionary) -> Vec<Object> {
    match page.get(b"Contents") {
        Ok(Object::Reference(id)) => match doc.get_object(*id) {
            Ok(Object::Array(items)) => items.clone(),
            _ => vec![Object::Reference(*id)],
        },
        Ok(Object::Array(items)) => items.clone(),
        _ => Vec::new(),
    }
}

/// Effective resources of a page as a direct dictionary, with the font
/// subdictionary resolved so entries can be added
fn owned_resources(doc: &Document, page_id: ObjectId) -> (Dictionary, Dictionary) {
    let resources = inherited(doc, page_id, b"Resources")
        .and_then(|r| match r {
            Object::Dictionary(dict) => Some(dict.clone()),
            _ => None,
        })
        .unwrap_or_default();
    let fonts = resources
        .get(b"Font")
        .ok()
        .map(|f| resolve(doc, f))
        .and_then(|f| match f {
            Object::Dictionary(dict) => Some(dict.clone()),
            _ => None,
        })
        .unwrap_or_default();
    (resources, fonts)
}

impl EditableDocument for PdfDocument {
    fn page_count(&self) -> usize {
        self.pages.len()
    }

    fn text_page(&self, index: usize) -> Result<TextPage, EditError> {
        let page_id = self.page_id(index).ok_or(EditError::PageOutOfRange(index))?;
        extract_page(&self.doc, page_id, index)
    }

    fn fill_rect(&mut self, page: usize, rect: Rect, color: Rgb) -> Result<(), RenderError> {
        if page >= self.pages.len() {
            return Err(RenderError::PageOutOfRange(page));
        }
        self.journal.push((page, Overlay::Fill { rect, color }));
        Ok(())
    }

    fn insert_text(&mut self, insert: &TextInsert<'_>) -> Result<(), RenderError> {
        if insert.page >= self.pages.len() {
            return Err(RenderError::PageOutOfRange(insert.page));
        }
        let (font, bytes) = self.resolve_font(insert)?;
        self.journal.push((
            insert.page,
            Overlay::Text {
                font,
                x: insert.origin.x,
                y: insert.origin.y,
                size: insert.size,
                color: insert.color,
                bytes,
            },
        ));
        Ok(())
    }

    fn mark(&self) -> EditMark {
        EditMark(self.journal.len())
    }

    fn rollback(&mut self, mark: EditMark) {
        self.journal.truncate(mark.0);
    }

    fn save(&mut self) -> Result<Vec<u8>, EditError> {
        let mut doc = self.doc.clone();

        let used: BTreeSet<usize> = self
            .journal
            .iter()
            .filter_map(|(_, overlay)| match overlay {
                Overlay::Text { font, .. } => Some(*font),
                Overlay::Fill { .. } => None,
            })
            .collect();
        let mut font_objects: BTreeMap<usize, Object> = BTreeMap::new();
        for slot in &used {
            let object = match &self.fonts[*slot].font {
                OverlayFont::Standard(name) => Object::Reference(doc.add_object(dictionary! {
                    "Type" => "Font",
                    "Subtype" => "Type1",
                    "BaseFont" => Object::Name(name.clone().into_bytes()),
                    "Encoding" => "WinAnsiEncoding",
                })),
                OverlayFont::PageResource(object) => object.clone(),
                OverlayFont::Embedded(font) => Object::Reference(font.write(&mut doc)),
            };
            font_objects.insert(*slot, object);
        }

        let mut by_page: BTreeMap<usize, Vec<&Overlay>> = BTreeMap::new();
        for (page, overlay) in &self.journal {
            by_page.entry(*page).or_default().push(overlay);
        }

        for (page, overlays) in by_page {
            let page_id = self.page_id(page).ok_or(EditError::PageOutOfRange(page))?;

            let (mut resources, mut page_fonts) = owned_resources(&doc, page_id);
            let slots: BTreeSet<usize> = overlays
                .iter()
                .filter_map(|overlay| match overlay {
                    Overlay::Text { font, .. } => Some(*font),
                    Overlay::Fill { .. } => None,
                })
                .collect();
            let font_names = overlay_font_names(&page_fonts, &slots);
            for (slot, name) in &font_names {
                if let Some(object) = font_objects.get(slot) {
                    page_fonts.set(name.clone(), object.clone());
                }
            }
            resources.set("Font", Object::Dictionary(page_fonts));

            let prefix = delimited(encode_content(vec![Operation::new("q", vec![])])?);
            let overlay = delimited(encode_content(
                self.overlay_operations(page_id, &overlays, &font_names),
            )?);
            let prefix_id = doc.add_object(Stream::new(dictionary! {}, prefix));
            let overlay_id = doc.add_object(Stream::new(dictionary! {}, overlay));

            let page_dict = doc.get_dictionary(page_id).map_err(operation_error)?;
            let mut contents = vec![Object::Reference(prefix_id)];
            contents.extend(content_refs(&doc, page_dict));
            contents.push(Object::Reference(overlay_id));

            let page_dict = doc
                .get_object_mut(page_id)
                .and_then(Object::as_dict_mut)
                .map_err(operation_error)?;
            page_dict.set("Contents", Object::Array(contents));
            page_dict.set("Resources", Object::Dictionary(resources));
            debug!("Wrote {} overlay operations on page {}", overlays.len(), page);
        }

        let mut buffer = Vec::new();
        doc.save_to(&mut buffer)
            .map_err(|e| EditError::OperationError(e.to_string()))?;
        Ok(buffer)
    }
}
