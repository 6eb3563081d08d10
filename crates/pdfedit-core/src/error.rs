use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum EditError {
    #[error("Text '{target}' not found in document")]
    NoMatchFound { target: String },

    #[error("Failed to parse PDF: {0}")]
    ParseError(String),

    #[error("Page index {0} out of range")]
    PageOutOfRange(usize),

    #[error("PDF operation failed: {0}")]
    OperationError(String),
}

/// Failure of a single text insertion attempt.
///
/// The font cascade treats these as expected and moves on to the next tier.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RenderError {
    #[error("Font '{0}' is not available to the renderer")]
    UnknownFont(String),

    #[error("Font '{font}' has no glyphs for {chars:?}")]
    MissingGlyphs { font: String, chars: Vec<char> },

    #[error("Invalid font data: {0}")]
    InvalidFontData(String),

    #[error("Page index {0} out of range")]
    PageOutOfRange(usize),
}
