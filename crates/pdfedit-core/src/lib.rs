//! Span-level PDF text replacement
//!
//! This crate finds a literal piece of text in a PDF and redraws it with new
//! content that keeps the original look: font family and weight, size,
//! colour and baseline.
//!
//! - [`locate`]: span locator over the block/line/span page model
//! - [`fonts`] / [`cascade`]: font resolution table and fallback cascade
//! - [`mutate`]: the mutation engine
//! - [`pdf`]: lopdf-backed document implementation

pub mod cascade;
pub mod error;
pub mod fonts;
pub mod library;
pub mod locate;
pub mod model;
pub mod mutate;
pub mod outcome;
pub mod pdf;
pub mod style;

pub use cascade::{FontCandidate, FontTier};
pub use error::{EditError, RenderError};
pub use library::FontLibrary;
pub use locate::{find_in_document, find_matches, SpanMatch};
pub use model::{
    document_text, Block, EditMark, EditableDocument, FontRequest, Point, Rect, TextInsert,
    TextLine, TextPage, TextSpan,
};
pub use mutate::{MutationEngine, MutationReport, SpanChange, SpanFailure};
pub use outcome::{artifact_name, describe_change, EditOutcome};
pub use pdf::PdfDocument;
pub use style::{decode_color, decode_flags, Rgb, StyleFlags};

/// Parse PDF bytes and return page count
pub fn get_page_count(bytes: &[u8]) -> Result<usize, EditError> {
    Ok(PdfDocument::load(bytes)?.page_count())
}

/// Plain text of a PDF, as the span model reads it
pub fn extract_text(bytes: &[u8]) -> Result<String, EditError> {
    let doc = PdfDocument::load(bytes)?;
    document_text(&doc)
}

/// Replace `target` with `replacement` throughout a PDF.
///
/// Returns the rewritten document and what was changed. Nothing is
/// serialized when no span matched.
pub fn replace_text(
    bytes: &[u8],
    target: &str,
    replacement: &str,
    library: &FontLibrary,
) -> Result<(Vec<u8>, MutationReport), EditError> {
    let mut doc = PdfDocument::load(bytes)?;
    let report = MutationEngine::new(library).mutate(&mut doc, target, replacement)?;
    let output = doc.save()?;
    Ok((output, report))
}
