//! Span locator
//!
//! Matching is literal, case-sensitive substring containment within a single
//! span. Text split across two font runs is not found.

use serde::Serialize;

use crate::error::EditError;
use crate::model::{EditableDocument, TextPage, TextSpan};

/// Spans on `page` whose text contains `target`.
///
/// The iterator borrows the page and holds no other state, so it can be
/// recreated for the same page at any time. An empty target matches nothing.
pub fn find_matches<'a>(
    page: &'a TextPage,
    target: &'a str,
) -> impl Iterator<Item = &'a TextSpan> + 'a {
    page.spans()
        .filter(move |span| !target.is_empty() && span.text.contains(target))
}

/// A matched span together with the page it was found on
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanMatch {
    pub page: usize,
    pub span: TextSpan,
}

/// Every matching span in the document, in page order
pub fn find_in_document(
    doc: &dyn EditableDocument,
    target: &str,
) -> Result<Vec<SpanMatch>, EditError> {
    let mut matches = Vec::new();
    for index in 0..doc.page_count() {
        let page = doc.text_page(index)?;
        matches.extend(find_matches(&page, target).map(|span| SpanMatch {
            page: index,
            span: span.clone(),
        }));
    }
    Ok(matches)
}
