//! Instruction routing for the PDF editor
//!
//! - [`classify`]: decides edit vs question, extracts the replacement pair
//! - [`answer`]: question answering over document text
//! - [`context`]: bounded conversation window shared by both
//! - [`delegate`] / [`openai`]: the text-understanding collaborator

pub mod answer;
pub mod classify;
pub mod context;
pub mod delegate;
pub mod error;
pub mod openai;

pub use answer::answer;
pub use classify::{
    classify, classify_or_question, extract_pair, Basis, Classification, Intent, ReplacementPair,
};
pub use context::{ConversationContext, ConversationTurn, Role};
pub use delegate::{TextDelegate, UnavailableDelegate};
pub use error::{AssistError, DelegateError};
pub use openai::OpenAiDelegate;
