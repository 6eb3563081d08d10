//! Mutation engine: in-place replacement of matched spans
//!
//! For each matching span the region is cleared with an opaque rectangle and
//! the span's text, with the target replaced, is drawn back at the span's
//! baseline through the font cascade. The clearing rectangle and the text
//! are staged together; when no font in the cascade can render the text the
//! rectangle is rolled back so no span is left blank.

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::cascade::{candidates, first_success, FontCandidate, FontTier};
use crate::error::{EditError, RenderError};
use crate::library::FontLibrary;
use crate::locate::find_matches;
use crate::model::{EditableDocument, Point, Rect, TextInsert, TextSpan};
use crate::style::{decode_color, decode_flags, Rgb};

/// Baseline offset from the bottom of a span's box, as a fraction of the
/// font size
pub const BASELINE_DESCENT_RATIO: f32 = 0.2;

/// Baseline anchor for text redrawn over a span's box
pub fn baseline_anchor(bbox: &Rect, size: f32) -> Point {
    Point {
        x: bbox.x0,
        y: bbox.y1 - size * BASELINE_DESCENT_RATIO,
    }
}

/// One span that was redrawn
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpanChange {
    pub page: usize,
    pub original_text: String,
    pub new_text: String,
    pub original_font: String,
    pub size: f32,
    pub tier: FontTier,
    pub font_used: String,
}

/// One matched span no font could render; the span was left as it was
#[derive(Debug, Clone, PartialEq)]
pub struct SpanFailure {
    pub page: usize,
    pub text: String,
    pub original_font: String,
    pub attempts: Vec<(FontTier, RenderError)>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MutationReport {
    pub changes: Vec<SpanChange>,
    pub failures: Vec<SpanFailure>,
}

impl MutationReport {
    pub fn spans_changed(&self) -> usize {
        self.changes.len()
    }

    /// Number of changes drawn with a font other than the original
    pub fn substitutions(&self) -> usize {
        self.changes
            .iter()
            .filter(|c| !matches!(c.tier, FontTier::EmbeddedOriginal | FontTier::OriginalByName))
            .count()
    }
}

pub struct MutationEngine<'a> {
    library: &'a FontLibrary,
    background: Rgb,
}

impl<'a> MutationEngine<'a> {
    pub fn new(library: &'a FontLibrary) -> Self {
        Self {
            library,
            background: Rgb::WHITE,
        }
    }

    /// Colour painted over a span before it is redrawn
    pub fn with_background(mut self, background: Rgb) -> Self {
        self.background = background;
        self
    }

    /// Replace `target` with `replacement` in every span that contains it.
    ///
    /// Fails with [`EditError::NoMatchFound`] when no span was changed; the
    /// document then has nothing staged.
    pub fn mutate(
        &self,
        doc: &mut dyn EditableDocument,
        target: &str,
        replacement: &str,
    ) -> Result<MutationReport, EditError> {
        let mut report = MutationReport::default();

        for index in 0..doc.page_count() {
            let page = doc.text_page(index)?;
            for span in find_matches(&page, target) {
                debug!(
                    "Match on page {}: '{}' font={} size={}",
                    index, span.text, span.font, span.size
                );
                match self.redraw_span(doc, index, span, target, replacement) {
                    Ok(change) => report.changes.push(change),
                    Err(failure) => {
                        warn!(
                            "No font could render '{}' on page {} (font {}, {} attempts)",
                            failure.text,
                            failure.page,
                            failure.original_font,
                            failure.attempts.len()
                        );
                        report.failures.push(failure);
                    }
                }
            }
        }

        if report.spans_changed() == 0 {
            return Err(EditError::NoMatchFound {
                target: target.to_string(),
            });
        }

        info!(
            "Replaced '{}' in {} spans ({} with substitute fonts, {} failed)",
            target,
            report.spans_changed(),
            report.substitutions(),
            report.failures.len()
        );
        Ok(report)
    }

    fn redraw_span(
        &self,
        doc: &mut dyn EditableDocument,
        page: usize,
        span: &TextSpan,
        target: &str,
        replacement: &str,
    ) -> Result<SpanChange, SpanFailure> {
        let color = decode_color(span.color);
        let flags = decode_flags(span.flags);
        let new_text = span.text.replace(target, replacement);
        let origin = baseline_anchor(&span.bbox, span.size);

        let failure = |attempts| SpanFailure {
            page,
            text: span.text.clone(),
            original_font: span.font.clone(),
            attempts,
        };

        let mark = doc.mark();
        if let Err(e) = doc.fill_rect(page, span.bbox, self.background) {
            warn!("Could not clear span '{}' on page {}: {}", span.text, page, e);
            doc.rollback(mark);
            return Err(failure(Vec::new()));
        }

        let font_data = self.library.font_data(&span.font);
        let outcome = first_success(
            candidates(&span.font, flags, font_data),
            |candidate: &FontCandidate<'_>| {
                let result = doc.insert_text(&TextInsert {
                    page,
                    origin,
                    text: &new_text,
                    font: candidate.request,
                    size: span.size,
                    color,
                });
                if let Err(e) = &result {
                    debug!(
                        "Font tier {} ({}) failed: {}",
                        candidate.tier,
                        candidate.font_name(),
                        e
                    );
                }
                result
            },
        );

        match outcome {
            Ok((candidate, ())) => {
                debug!(
                    "Rendered '{}' with tier {} ({})",
                    new_text,
                    candidate.tier,
                    candidate.font_name()
                );
                Ok(SpanChange {
                    page,
                    original_text: span.text.clone(),
                    new_text,
                    original_font: span.font.clone(),
                    size: span.size,
                    tier: candidate.tier,
                    font_used: candidate.font_name().to_string(),
                })
            }
            Err(attempts) => {
                doc.rollback(mark);
                Err(failure(
                    attempts
                        .into_iter()
                        .map(|(candidate, err)| (candidate.tier, err))
                        .collect(),
                ))
            }
        }
    }
}
