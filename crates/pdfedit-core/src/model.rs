//! Document model shared by the locator, the mutation engine and the PDF backend
//!
//! Geometry is expressed in top-down page coordinates: the origin is the
//! top-left corner of the page, `y` grows downwards, so `y1` is the bottom
//! edge of a box.

use serde::{Deserialize, Serialize};

use crate::error::{EditError, RenderError};
use crate::style::Rgb;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    pub fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    /// Smallest rectangle containing both
    pub fn union(&self, other: &Rect) -> Rect {
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

/// One contiguous run of identically styled text.
///
/// A snapshot: spans are produced fresh on every page read and are never
/// edited in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextSpan {
    pub text: String,
    pub font: String,
    pub size: f32,
    /// Packed `0xRRGGBB`, 0 is black
    pub color: u32,
    /// Style bit field, see [`crate::style`]
    pub flags: u32,
    pub bbox: Rect,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextLine {
    pub bbox: Rect,
    pub spans: Vec<TextSpan>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Block {
    Text { bbox: Rect, lines: Vec<TextLine> },
    Image { bbox: Rect },
}

/// Block/line/span decomposition of one page
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextPage {
    pub index: usize,
    pub width: f32,
    pub height: f32,
    pub blocks: Vec<Block>,
}

impl TextPage {
    /// All text spans in reading order
    pub fn spans(&self) -> impl Iterator<Item = &TextSpan> + '_ {
        self.blocks
            .iter()
            .filter_map(|block| match block {
                Block::Text { lines, .. } => Some(lines),
                Block::Image { .. } => None,
            })
            .flatten()
            .flat_map(|line| line.spans.iter())
    }

    /// Plain text, one output line per text line
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for block in &self.blocks {
            if let Block::Text { lines, .. } = block {
                for line in lines {
                    for span in &line.spans {
                        out.push_str(&span.text);
                    }
                    out.push('\n');
                }
            }
        }
        out
    }
}

/// How a text insertion should pick its font
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FontRequest<'a> {
    /// Embed the given font program under `name`
    Embedded { name: &'a str, data: &'a [u8] },
    /// Use a font the renderer or the page already knows by this name
    Named(&'a str),
    /// Let the renderer choose; characters it cannot encode are replaced
    RendererDefault,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextInsert<'a> {
    pub page: usize,
    /// Baseline start
    pub origin: Point,
    pub text: &'a str,
    pub font: FontRequest<'a>,
    pub size: f32,
    pub color: Rgb,
}

/// Position in a document's pending drawing, see [`EditableDocument::mark`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct EditMark(pub usize);

/// The document-rendering collaborator used by the mutation engine.
///
/// Drawing primitives stage their output; nothing is committed until
/// [`save`](EditableDocument::save). Staged drawing after a mark can be
/// discarded with [`rollback`](EditableDocument::rollback).
pub trait EditableDocument {
    fn page_count(&self) -> usize;

    fn text_page(&self, index: usize) -> Result<TextPage, EditError>;

    /// Paint an opaque rectangle over `rect`
    fn fill_rect(&mut self, page: usize, rect: Rect, color: Rgb) -> Result<(), RenderError>;

    fn insert_text(&mut self, insert: &TextInsert<'_>) -> Result<(), RenderError>;

    fn mark(&self) -> EditMark;

    fn rollback(&mut self, mark: EditMark);

    /// Serialize the document with all staged drawing applied
    fn save(&mut self) -> Result<Vec<u8>, EditError>;
}

/// Plain text of every page, pages separated by a blank line
pub fn document_text(doc: &dyn EditableDocument) -> Result<String, EditError> {
    let mut out = String::new();
    for index in 0..doc.page_count() {
        if index > 0 {
            out.push('\n');
        }
        out.push_str(&doc.text_page(index)?.plain_text());
    }
    Ok(out)
}
