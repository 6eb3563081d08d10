//! Document registry, version chain and edit orchestration
//!
//! [`EditService`] ties the pieces together: uploads go to an
//! [`ArtifactStore`], records to a [`DocumentStore`], and every edit reads the
//! version [`VersionChain`] points at before writing the next one.

pub mod config;
pub mod error;
pub mod locks;
pub mod service;
pub mod storage;
pub mod versions;

pub use config::{LlmConfig, ServiceConfig, StorageConfig, StorageProvider};
pub use error::{PersistenceError, ServiceError, StorageError};
pub use locks::DocumentLocks;
pub use service::{EditService, Reply};
pub use storage::{ArtifactStore, ObjectArtifactStore};
pub use versions::{
    DocumentRecord, DocumentStore, JsonDocumentStore, MemoryDocumentStore, VersionChain,
};
