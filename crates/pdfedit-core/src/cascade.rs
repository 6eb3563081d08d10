//! Font fallback cascade
//!
//! The cascade is an ordered list of candidate fonts. [`first_success`] walks
//! any ordered list of strategies and stops at the first one that works; a
//! failing attempt is expected and only reported in aggregate.

use serde::{Deserialize, Serialize};

use crate::fonts::{self, UNIVERSAL_DEFAULT};
use crate::model::FontRequest;
use crate::style::StyleFlags;

/// Which rung of the cascade produced the inserted text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FontTier {
    /// (a) original font, program embedded from the local font library
    EmbeddedOriginal,
    /// (b) original font by name only
    OriginalByName,
    /// (c) resolution table substitute
    Substitute,
    /// (d) hard-coded universal default
    UniversalDefault,
    /// (e) renderer default, no explicit font
    RendererDefault,
}

impl FontTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            FontTier::EmbeddedOriginal => "embedded-original",
            FontTier::OriginalByName => "original-by-name",
            FontTier::Substitute => "substitute",
            FontTier::UniversalDefault => "universal-default",
            FontTier::RendererDefault => "renderer-default",
        }
    }
}

impl std::fmt::Display for FontTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FontCandidate<'a> {
    pub tier: FontTier,
    pub request: FontRequest<'a>,
}

impl FontCandidate<'_> {
    /// Font name as it would appear in diagnostics
    pub fn font_name(&self) -> &str {
        match self.request {
            FontRequest::Embedded { name, .. } | FontRequest::Named(name) => name,
            FontRequest::RendererDefault => "(renderer default)",
        }
    }
}

/// Build the ordered candidate list for a span's font.
///
/// Tier (a) is present only when font data for the original is available.
/// Named candidates that repeat an earlier name are skipped, so a span
/// already set in Helvetica does not try Helvetica three times.
pub fn candidates<'a>(
    original_font: &'a str,
    flags: StyleFlags,
    embedded: Option<&'a [u8]>,
) -> Vec<FontCandidate<'a>> {
    let mut list = Vec::with_capacity(5);
    if let Some(data) = embedded {
        list.push(FontCandidate {
            tier: FontTier::EmbeddedOriginal,
            request: FontRequest::Embedded {
                name: original_font,
                data,
            },
        });
    }

    let named = [
        (FontTier::OriginalByName, original_font),
        (
            FontTier::Substitute,
            fonts::resolve_styled(original_font, flags),
        ),
        (FontTier::UniversalDefault, UNIVERSAL_DEFAULT),
    ];
    let mut seen: Vec<&str> = Vec::with_capacity(named.len());
    for (tier, name) in named {
        if name.is_empty() || seen.contains(&name) {
            continue;
        }
        seen.push(name);
        list.push(FontCandidate {
            tier,
            request: FontRequest::Named(name),
        });
    }

    list.push(FontCandidate {
        tier: FontTier::RendererDefault,
        request: FontRequest::RendererDefault,
    });
    list
}

/// Try each strategy in order, stopping at the first success.
///
/// On success returns the winning strategy with its value; when every
/// strategy fails returns each strategy paired with its error, in order.
pub fn first_success<S, T, E, F>(
    strategies: impl IntoIterator<Item = S>,
    mut attempt: F,
) -> Result<(S, T), Vec<(S, E)>>
where
    F: FnMut(&S) -> Result<T, E>,
{
    let mut failures = Vec::new();
    for strategy in strategies {
        match attempt(&strategy) {
            Ok(value) => return Ok((strategy, value)),
            Err(err) => failures.push((strategy, err)),
        }
    }
    Err(failures)
}
