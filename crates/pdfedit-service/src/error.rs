use pdfedit_assist::AssistError;
use pdfedit_core::EditError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Artifact storage failed: {0}")]
    ObjectStore(#[from] object_store::Error),

    #[error("Artifact not found: {0}")]
    NotFound(String),

    #[error("Location '{0}' does not belong to this store")]
    InvalidLocation(String),
}

#[derive(Error, Debug)]
pub enum PersistenceError {
    #[error("Unknown document: {0}")]
    UnknownDocument(String),

    #[error("State file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("State file is malformed: {0}")]
    Format(#[from] serde_json::Error),
}

#[derive(Error, Debug)]
pub enum ServiceError {
    #[error("Document not found: {0}")]
    DocumentNotFound(String),

    #[error("Invalid upload: {0}")]
    InvalidUpload(String),

    #[error(transparent)]
    Edit(#[from] EditError),

    #[error(transparent)]
    Assist(#[from] AssistError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("Persistence failed: {0}")]
    Persistence(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Background task failed: {0}")]
    Task(String),
}

impl From<PersistenceError> for ServiceError {
    fn from(err: PersistenceError) -> Self {
        match err {
            PersistenceError::UnknownDocument(id) => ServiceError::DocumentNotFound(id),
            other => ServiceError::Persistence(other.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ServiceError {
    fn from(err: tokio::task::JoinError) -> Self {
        ServiceError::Task(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;
