//! Document registry and version chain
//!
//! A document keeps its original upload location plus a single pointer to the
//! most recent edited artifact. Edits always read from [`VersionChain::resolve_source`],
//! so consecutive edits build on each other. There is no history beyond that
//! one pointer.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::error::PersistenceError;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRecord {
    pub id: String,
    /// Name the document was uploaded under
    pub filename: String,
    pub original_location: String,
    #[serde(default)]
    pub edited_location: Option<String>,
    pub uploaded_at: DateTime<Utc>,
}

impl DocumentRecord {
    /// Location edits and questions should read from
    pub fn current_location(&self) -> &str {
        self.edited_location
            .as_deref()
            .unwrap_or(&self.original_location)
    }
}

/// Persistence collaborator for document records
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn insert(&self, record: DocumentRecord) -> Result<(), PersistenceError>;

    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>, PersistenceError>;

    /// All records, oldest upload first
    async fn list(&self) -> Result<Vec<DocumentRecord>, PersistenceError>;

    /// Overwrite the latest-edit pointer of an existing record
    async fn set_edited_location(&self, id: &str, location: &str)
        -> Result<(), PersistenceError>;
}

fn sorted(records: &BTreeMap<String, DocumentRecord>) -> Vec<DocumentRecord> {
    let mut list: Vec<DocumentRecord> = records.values().cloned().collect();
    list.sort_by(|a, b| a.uploaded_at.cmp(&b.uploaded_at).then(a.id.cmp(&b.id)));
    list
}

#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    records: RwLock<BTreeMap<String, DocumentRecord>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn insert(&self, record: DocumentRecord) -> Result<(), PersistenceError> {
        self.records.write().await.insert(record.id.clone(), record);
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>, PersistenceError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<DocumentRecord>, PersistenceError> {
        Ok(sorted(&*self.records.read().await))
    }

    async fn set_edited_location(
        &self,
        id: &str,
        location: &str,
    ) -> Result<(), PersistenceError> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| PersistenceError::UnknownDocument(id.to_string()))?;
        record.edited_location = Some(location.to_string());
        Ok(())
    }
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct StateFile {
    documents: BTreeMap<String, DocumentRecord>,
}

/// Records kept in a JSON file, rewritten in full on every change
#[derive(Debug)]
pub struct JsonDocumentStore {
    path: PathBuf,
    records: RwLock<BTreeMap<String, DocumentRecord>>,
}

impl JsonDocumentStore {
    /// Open the state file, starting empty when it does not exist yet
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self, PersistenceError> {
        let path = path.into();
        let state = match tokio::fs::read(&path).await {
            Ok(bytes) => serde_json::from_slice::<StateFile>(&bytes)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No state file at {}, starting empty", path.display());
                StateFile::default()
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path,
            records: RwLock::new(state.documents),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Write `records` out; the in-memory map is replaced only after this succeeds
    async fn persist(&self, records: &BTreeMap<String, DocumentRecord>) -> Result<(), PersistenceError> {
        let state = StateFile {
            documents: records.clone(),
        };
        let json = serde_json::to_vec_pretty(&state)?;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl DocumentStore for JsonDocumentStore {
    async fn insert(&self, record: DocumentRecord) -> Result<(), PersistenceError> {
        let mut records = self.records.write().await;
        let mut next = records.clone();
        next.insert(record.id.clone(), record);
        self.persist(&next).await?;
        *records = next;
        Ok(())
    }

    async fn get(&self, id: &str) -> Result<Option<DocumentRecord>, PersistenceError> {
        Ok(self.records.read().await.get(id).cloned())
    }

    async fn list(&self) -> Result<Vec<DocumentRecord>, PersistenceError> {
        Ok(sorted(&*self.records.read().await))
    }

    async fn set_edited_location(
        &self,
        id: &str,
        location: &str,
    ) -> Result<(), PersistenceError> {
        let mut records = self.records.write().await;
        let mut next = records.clone();
        let record = next
            .get_mut(id)
            .ok_or_else(|| PersistenceError::UnknownDocument(id.to_string()))?;
        record.edited_location = Some(location.to_string());
        self.persist(&next).await?;
        *records = next;
        Ok(())
    }
}

/// Reads and advances the latest-edit pointer of documents
#[derive(Clone)]
pub struct VersionChain {
    store: Arc<dyn DocumentStore>,
}

impl VersionChain {
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        Self { store }
    }

    /// Latest edited artifact if there is one, else the original upload
    pub async fn resolve_source(&self, id: &str) -> Result<String, PersistenceError> {
        let record = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| PersistenceError::UnknownDocument(id.to_string()))?;
        Ok(record.current_location().to_string())
    }

    pub async fn record_new_version(&self, id: &str, location: &str) -> Result<(), PersistenceError> {
        self.store.set_edited_location(id, location).await?;
        info!("Document {} now points at {}", id, location);
        Ok(())
    }
}
