//! Edit orchestration
//!
//! Instruction → classifier → either the question path or the edit path.
//! The edit path resolves the current version, runs the mutation engine,
//! stores the new artifact and advances the version pointer, all while
//! holding the document's lock. For instructions the lock is taken before
//! the replacement pair is extracted from the document text.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use pdfedit_assist::{
    answer, classify_or_question, extract_pair, ConversationContext, Intent, Role, TextDelegate,
};
use pdfedit_core::{artifact_name, extract_text, replace_text, EditOutcome, FontLibrary};
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::{Result, ServiceError};
use crate::locks::DocumentLocks;
use crate::storage::ArtifactStore;
use crate::versions::{DocumentRecord, DocumentStore, VersionChain};

/// What an instruction turned into
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Reply {
    Edited(EditOutcome),
    Answer { text: String },
}

pub struct EditService {
    artifacts: Arc<dyn ArtifactStore>,
    documents: Arc<dyn DocumentStore>,
    versions: VersionChain,
    delegate: Arc<dyn TextDelegate>,
    fonts: Arc<FontLibrary>,
    locks: DocumentLocks,
    contexts: Mutex<HashMap<String, ConversationContext>>,
    history_turns: usize,
}

impl EditService {
    pub fn new(
        artifacts: Arc<dyn ArtifactStore>,
        documents: Arc<dyn DocumentStore>,
        delegate: Arc<dyn TextDelegate>,
        fonts: Arc<FontLibrary>,
    ) -> Self {
        Self {
            versions: VersionChain::new(documents.clone()),
            artifacts,
            documents,
            delegate,
            fonts,
            locks: DocumentLocks::new(),
            contexts: Mutex::default(),
            history_turns: pdfedit_assist::context::DEFAULT_HISTORY_TURNS,
        }
    }

    pub fn with_history_turns(mut self, turns: usize) -> Self {
        self.history_turns = turns;
        self
    }

    pub fn fonts(&self) -> &FontLibrary {
        &self.fonts
    }

    /// Register a new PDF and store the original bytes
    pub async fn upload(&self, filename: &str, bytes: Vec<u8>) -> Result<DocumentRecord> {
        let filename = filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(filename)
            .to_string();
        if !filename.to_lowercase().ends_with(".pdf") {
            return Err(ServiceError::InvalidUpload(format!(
                "only PDF files are allowed: {}",
                filename
            )));
        }

        let (bytes, pages) = tokio::task::spawn_blocking(move || {
            let pages = pdfedit_core::get_page_count(&bytes);
            (bytes, pages)
        })
        .await?;
        let pages = pages?;

        let id = Uuid::new_v4().simple().to_string();
        let key = format!("uploads/{}_{}", id, filename);
        let original_location = self.artifacts.put(&key, bytes).await?;

        let record = DocumentRecord {
            id,
            filename,
            original_location,
            edited_location: None,
            uploaded_at: Utc::now(),
        };
        self.documents.insert(record.clone()).await?;
        info!(
            "Uploaded {} as {} ({} pages)",
            record.filename, record.id, pages
        );
        Ok(record)
    }

    pub async fn document(&self, id: &str) -> Result<DocumentRecord> {
        self.documents
            .get(id)
            .await?
            .ok_or_else(|| ServiceError::DocumentNotFound(id.to_string()))
    }

    pub async fn documents(&self) -> Result<Vec<DocumentRecord>> {
        Ok(self.documents.list().await?)
    }

    /// Bytes of the version edits and questions currently operate on
    pub async fn current_bytes(&self, id: &str) -> Result<Vec<u8>> {
        let source = self.versions.resolve_source(id).await?;
        Ok(self.artifacts.get(&source).await?)
    }

    /// Plain text of the current version
    pub async fn current_text(&self, id: &str) -> Result<String> {
        let bytes = self.current_bytes(id).await?;
        Ok(tokio::task::spawn_blocking(move || extract_text(&bytes)).await??)
    }

    /// Replace `original` with `replacement` in the latest version of a document.
    ///
    /// Nothing is stored and the version pointer does not move when no span
    /// matched.
    #[instrument(skip(self))]
    pub async fn edit(&self, id: &str, original: &str, replacement: &str) -> Result<EditOutcome> {
        let _guard = self.locks.lock(id).await;
        self.edit_locked(id, original, replacement).await
    }

    /// Edit path body; the caller holds the document's lock
    async fn edit_locked(&self, id: &str, original: &str, replacement: &str) -> Result<EditOutcome> {
        let record = self.document(id).await?;
        let source = self.versions.resolve_source(id).await?;
        let bytes = self.artifacts.get(&source).await?;

        let fonts = self.fonts.clone();
        let target = original.to_string();
        let new_text = replacement.to_string();
        let (output, report) = tokio::task::spawn_blocking(move || {
            replace_text(&bytes, &target, &new_text, &fonts)
        })
        .await??;

        let name = artifact_name(&record.filename, Utc::now());
        let location = self.artifacts.put(&name, output).await?;
        self.versions.record_new_version(id, &location).await?;

        Ok(EditOutcome::new(
            original,
            replacement,
            report.spans_changed(),
            location,
        ))
    }

    async fn context(&self, id: &str) -> ConversationContext {
        self.contexts
            .lock()
            .await
            .get(id)
            .cloned()
            .unwrap_or_else(|| ConversationContext::new(self.history_turns))
    }

    async fn remember(&self, id: &str, instruction: &str, reply: &str) {
        let mut contexts = self.contexts.lock().await;
        let context = contexts
            .entry(id.to_string())
            .or_insert_with(|| ConversationContext::new(self.history_turns));
        context.push(Role::User, instruction);
        context.push(Role::Assistant, reply);
    }

    /// Drop the conversation window kept for a document
    pub async fn forget_conversation(&self, id: &str) {
        if self.contexts.lock().await.remove(id).is_some() {
            debug!("Dropped conversation context of {}", id);
        }
    }

    /// Answer a question about the latest version of a document
    pub async fn ask(&self, id: &str, question: &str) -> Result<String> {
        let context = self.context(id).await;
        let text = self.current_text(id).await?;
        let reply = answer(question, &context, &text, self.delegate.as_ref()).await?;
        self.remember(id, question, &reply).await;
        Ok(reply)
    }

    /// Route a free-form instruction to the edit or the question path
    pub async fn handle_instruction(&self, id: &str, instruction: &str) -> Result<Reply> {
        self.document(id).await?;
        let context = self.context(id).await;
        let classification =
            classify_or_question(instruction, &context, self.delegate.as_ref()).await;

        match classification.intent {
            Intent::Question => Ok(Reply::Answer {
                text: self.ask(id, instruction).await?,
            }),
            Intent::Edit => {
                // The pair must be grounded on the version it is applied to
                let _guard = self.locks.lock(id).await;
                let text = self.current_text(id).await?;
                let pair = extract_pair(instruction, &text, self.delegate.as_ref()).await?;
                let outcome = self
                    .edit_locked(id, &pair.original, &pair.replacement)
                    .await?;
                self.remember(id, instruction, &outcome.change).await;
                Ok(Reply::Edited(outcome))
            }
        }
    }
}
