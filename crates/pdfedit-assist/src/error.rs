use thiserror::Error;

/// Failure of a call to the text-understanding delegate
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DelegateError {
    #[error("Delegate request failed: {0}")]
    Request(String),

    #[error("Delegate returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Delegate returned no content")]
    EmptyResponse,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum AssistError {
    /// Intent could not be decided; callers fall back to treating the input as a question
    #[error("Could not classify instruction: {0}")]
    ClassificationFailed(String),

    #[error("Could not extract the text to replace: {0}")]
    ExtractionFailed(String),

    #[error(transparent)]
    Delegate(#[from] DelegateError),
}
