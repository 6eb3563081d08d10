//! Edit-or-question routing
//!
//! Classification runs in stages:
//!
//! 1. A fixed, ordered set of verb-anchored patterns ("change X to Y",
//!    "replace X with Y", ...). A hit decides the intent; the captured text is
//!    never used as the literal replacement pair.
//! 2. Otherwise the delegate is asked to answer `EDIT` or `QUESTION`.
//! 3. For edits, the delegate extracts the literal `(original, replacement)`
//!    pair from the instruction, grounded in a prefix of the document text.

use lazy_static::lazy_static;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::context::ConversationContext;
use crate::delegate::TextDelegate;
use crate::error::AssistError;

/// Characters of document text given to the extraction prompt
pub const DOCUMENT_PREFIX_CHARS: usize = 2000;

lazy_static! {
    /// Edit verbs in evaluation order
    static ref EDIT_PATTERNS: Vec<(&'static str, Regex)> = vec![
        ("change", Regex::new(r"(?i)\bchange\s+(.+?)\s+to\s+(.+)").unwrap()),
        ("edit", Regex::new(r"(?i)\bedit\s+(.+?)\s+to\s+(.+)").unwrap()),
        ("replace", Regex::new(r"(?i)\breplace\s+(.+?)\s+with\s+(.+)").unwrap()),
        ("update", Regex::new(r"(?i)\bupdate\s+(.+?)\s+to\s+(.+)").unwrap()),
        ("modify", Regex::new(r"(?i)\bmodify\s+(.+?)\s+to\s+(.+)").unwrap()),
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Intent {
    Edit,
    Question,
}

/// What the intent decision was based on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Basis {
    /// Matched the named edit verb pattern
    Pattern(&'static str),
    Delegate,
    /// Delegate failed; defaulted to a question
    Fallback,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub intent: Intent,
    pub basis: Basis,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacementPair {
    pub original: String,
    pub replacement: String,
}

/// Verb of the first edit pattern the instruction matches
pub fn match_edit_pattern(instruction: &str) -> Option<&'static str> {
    EDIT_PATTERNS
        .iter()
        .find(|(_, pattern)| pattern.is_match(instruction))
        .map(|(verb, _)| *verb)
}

pub fn intent_prompt(instruction: &str, context: &ConversationContext) -> String {
    let mut prompt = String::from(
        "Decide whether the user wants to change the text of their PDF document \
         or is asking a question about it.\n\
         Answer with exactly one word: EDIT or QUESTION.\n",
    );
    if !context.is_empty() {
        prompt.push_str("\nRecent conversation:\n");
        prompt.push_str(&context.render());
        prompt.push('\n');
    }
    prompt.push_str("\nUser input: ");
    prompt.push_str(instruction);
    prompt
}

/// Decide whether `instruction` asks for an edit or a question.
///
/// Fails with [`AssistError::ClassificationFailed`] only when the delegate
/// had to be consulted and errored.
pub async fn classify(
    instruction: &str,
    context: &ConversationContext,
    delegate: &dyn TextDelegate,
) -> Result<Classification, AssistError> {
    if let Some(verb) = match_edit_pattern(instruction) {
        info!("Classified as edit (pattern '{}')", verb);
        return Ok(Classification {
            intent: Intent::Edit,
            basis: Basis::Pattern(verb),
        });
    }

    let response = delegate
        .complete(&intent_prompt(instruction, context))
        .await
        .map_err(|e| AssistError::ClassificationFailed(e.to_string()))?;
    let intent = if response.contains("EDIT") {
        Intent::Edit
    } else {
        Intent::Question
    };
    info!("Classified as {:?} (delegate)", intent);
    Ok(Classification {
        intent,
        basis: Basis::Delegate,
    })
}

/// [`classify`], treating a failed classification as a question
pub async fn classify_or_question(
    instruction: &str,
    context: &ConversationContext,
    delegate: &dyn TextDelegate,
) -> Classification {
    match classify(instruction, context, delegate).await {
        Ok(classification) => classification,
        Err(e) => {
            warn!("{}; answering as a question", e);
            Classification {
                intent: Intent::Question,
                basis: Basis::Fallback,
            }
        }
    }
}

fn document_prefix(text: &str) -> &str {
    match text.char_indices().nth(DOCUMENT_PREFIX_CHARS) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

pub fn extraction_prompt(instruction: &str, document_text: &str) -> String {
    format!(
        "The user wants to change text in a PDF document.\n\
         Identify the exact text currently in the document that should be replaced, \
         and the new text to put in its place. Copy the original text exactly as it \
         appears in the document.\n\n\
         Document text:\n{}\n\n\
         User request: {}\n\n\
         Respond with exactly two lines and nothing else:\n\
         Original: <text currently in the document>\n\
         New: <replacement text>",
        document_prefix(document_text),
        instruction
    )
}

/// Parse a strict `Original: ...` / `New: ...` response.
///
/// The `Original:` line must come first and be non-empty; an empty `New:`
/// value is a deletion and is accepted.
pub fn parse_pair(response: &str) -> Result<ReplacementPair, AssistError> {
    let mut lines = response.lines().map(str::trim).filter(|l| !l.is_empty());

    let original = lines
        .next()
        .and_then(|l| l.strip_prefix("Original:"))
        .map(str::trim)
        .ok_or_else(|| AssistError::ExtractionFailed("missing 'Original:' line".to_string()))?;
    let replacement = lines
        .next()
        .and_then(|l| l.strip_prefix("New:"))
        .map(str::trim)
        .ok_or_else(|| AssistError::ExtractionFailed("missing 'New:' line".to_string()))?;

    if original.is_empty() {
        return Err(AssistError::ExtractionFailed(
            "empty original text".to_string(),
        ));
    }

    Ok(ReplacementPair {
        original: original.to_string(),
        replacement: replacement.to_string(),
    })
}

/// Ask the delegate which literal text to replace, and with what
pub async fn extract_pair(
    instruction: &str,
    document_text: &str,
    delegate: &dyn TextDelegate,
) -> Result<ReplacementPair, AssistError> {
    let response = delegate
        .complete(&extraction_prompt(instruction, document_text))
        .await
        .map_err(|e| AssistError::ExtractionFailed(e.to_string()))?;
    let pair = parse_pair(&response)?;
    info!(
        "Extracted replacement '{}' -> '{}'",
        pair.original, pair.replacement
    );
    Ok(pair)
}
