//! Artifact storage collaborator
//!
//! The service saves uploads and edited PDFs through [`ArtifactStore`] and only
//! ever sees the returned location string. Which backend sits behind it is
//! decided once, from configuration.

use std::sync::Arc;

use async_trait::async_trait;
use object_store::{path::Path, ObjectStore, PutPayload};
use tracing::debug;

use crate::error::StorageError;

#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Save `bytes` under `key` and return an addressable location
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, StorageError>;

    /// Read back an artifact by a location previously returned from `put`
    async fn get(&self, location: &str) -> Result<Vec<u8>, StorageError>;
}

/// [`ArtifactStore`] over any `object_store` backend
pub struct ObjectArtifactStore {
    store: Arc<dyn ObjectStore>,
    /// Prepended to keys to form locations (public URL or local directory)
    location_prefix: Option<String>,
}

impl ObjectArtifactStore {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self {
            store,
            location_prefix: None,
        }
    }

    pub fn with_location_prefix(mut self, prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        self.location_prefix = Some(prefix.trim_end_matches('/').to_string());
        self
    }

    /// In-memory backend, for tests and throwaway sessions
    pub fn in_memory() -> Self {
        Self::new(Arc::new(object_store::memory::InMemory::new()))
    }

    fn location(&self, key: &str) -> String {
        match &self.location_prefix {
            Some(prefix) => format!("{}/{}", prefix, key),
            None => key.to_string(),
        }
    }

    fn key<'a>(&self, location: &'a str) -> Result<&'a str, StorageError> {
        match &self.location_prefix {
            Some(prefix) => location
                .strip_prefix(prefix.as_str())
                .and_then(|rest| rest.strip_prefix('/'))
                .ok_or_else(|| StorageError::InvalidLocation(location.to_string())),
            None => Ok(location),
        }
    }
}

#[async_trait]
impl ArtifactStore for ObjectArtifactStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> Result<String, StorageError> {
        let size = bytes.len();
        self.store
            .put(&Path::from(key), PutPayload::from(bytes))
            .await?;
        let location = self.location(key);
        debug!("Stored {} bytes at {}", size, location);
        Ok(location)
    }

    async fn get(&self, location: &str) -> Result<Vec<u8>, StorageError> {
        let key = self.key(location)?;
        let result = match self.store.get(&Path::from(key)).await {
            Ok(result) => result,
            Err(object_store::Error::NotFound { .. }) => {
                return Err(StorageError::NotFound(location.to_string()))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(result.bytes().await?.to_vec())
    }
}
