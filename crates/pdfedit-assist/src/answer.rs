//! Question answering over a document's text

use tracing::debug;

use crate::context::ConversationContext;
use crate::delegate::TextDelegate;
use crate::error::AssistError;

/// Characters of document text included in an answering prompt
pub const ANSWER_CONTEXT_CHARS: usize = 12_000;

pub fn answer_prompt(question: &str, context: &ConversationContext, document_text: &str) -> String {
    let excerpt = match document_text.char_indices().nth(ANSWER_CONTEXT_CHARS) {
        Some((end, _)) => &document_text[..end],
        None => document_text,
    };
    let mut prompt = format!(
        "Answer the question using only the document below. \
         If the document does not contain the answer, say so.\n\n\
         Document text:\n{}\n",
        excerpt
    );
    if !context.is_empty() {
        prompt.push_str("\nRecent conversation:\n");
        prompt.push_str(&context.render());
        prompt.push('\n');
    }
    prompt.push_str("\nQuestion: ");
    prompt.push_str(question);
    prompt
}

pub async fn answer(
    question: &str,
    context: &ConversationContext,
    document_text: &str,
    delegate: &dyn TextDelegate,
) -> Result<String, AssistError> {
    let prompt = answer_prompt(question, context, document_text);
    debug!("Answering with {} chars of document text", document_text.len());
    let response = delegate.complete(&prompt).await?;
    Ok(response.trim().to_string())
}
