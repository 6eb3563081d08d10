//! Text-understanding delegate
//!
//! The classifier and the answering path only need "prompt in, free text out".
//! Anything that can do that (a hosted model, a local one, a scripted fake)
//! implements [`TextDelegate`].

use async_trait::async_trait;

use crate::error::DelegateError;

#[async_trait]
pub trait TextDelegate: Send + Sync {
    /// Send one prompt and return the raw response text
    async fn complete(&self, prompt: &str) -> Result<String, DelegateError>;
}

/// Stand-in when no delegate is configured; every call fails with the reason
#[derive(Debug, Clone)]
pub struct UnavailableDelegate {
    reason: String,
}

impl UnavailableDelegate {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl TextDelegate for UnavailableDelegate {
    async fn complete(&self, _prompt: &str) -> Result<String, DelegateError> {
        Err(DelegateError::Request(self.reason.clone()))
    }
}

#[cfg(test)]
pub(crate) mod fake {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays canned responses in order and records every prompt it saw
    #[derive(Default)]
    pub struct ScriptedDelegate {
        responses: Mutex<VecDeque<Result<String, DelegateError>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedDelegate {
        pub fn new<I, S>(responses: I) -> Self
        where
            I: IntoIterator<Item = S>,
            S: Into<String>,
        {
            Self {
                responses: Mutex::new(responses.into_iter().map(|r| Ok(r.into())).collect()),
                prompts: Mutex::default(),
            }
        }

        pub fn failing(error: DelegateError) -> Self {
            Self {
                responses: Mutex::new(VecDeque::from([Err(error)])),
                prompts: Mutex::default(),
            }
        }

        pub fn prompts(&self) -> Vec<String> {
            self.prompts.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TextDelegate for ScriptedDelegate {
        async fn complete(&self, prompt: &str) -> Result<String, DelegateError> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(DelegateError::EmptyResponse))
        }
    }
}
