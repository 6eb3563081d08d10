//! Service configuration
//!
//! Everything is read from environment variables once at startup. The storage
//! backend is picked here and nowhere else.

use std::path::PathBuf;
use std::sync::Arc;

use object_store::aws::AmazonS3Builder;
use object_store::local::LocalFileSystem;
use object_store::memory::InMemory;
use object_store::ObjectStore;
use pdfedit_assist::openai::{DEFAULT_BASE_URL, DEFAULT_MODEL};

use crate::error::ServiceError;
use crate::storage::ObjectArtifactStore;

/// Storage provider options
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageProvider {
    CloudflareR2,
    AwsS3,
    MinIO,
    /// Local filesystem (for development)
    Local,
    /// Process memory; nothing survives exit
    Memory,
}

/// Storage configuration
#[derive(Debug, Clone)]
pub struct StorageConfig {
    pub provider: StorageProvider,
    /// Bucket name (or directory for the Local provider)
    pub bucket: String,
    /// AWS region (use "auto" for R2)
    pub region: String,
    /// Custom endpoint URL (required for R2 and MinIO)
    pub endpoint: Option<String>,
    pub access_key_id: Option<String>,
    pub secret_access_key: Option<String>,
    /// Base URL prepended to keys in returned locations
    pub public_url: Option<String>,
}

impl StorageConfig {
    pub fn local(path: &str) -> Self {
        Self {
            provider: StorageProvider::Local,
            bucket: path.to_string(),
            region: String::new(),
            endpoint: None,
            access_key_id: None,
            secret_access_key: None,
            public_url: None,
        }
    }

    pub fn memory() -> Self {
        Self {
            provider: StorageProvider::Memory,
            ..Self::local("")
        }
    }

    pub fn s3(bucket: &str, region: &str) -> Self {
        Self {
            provider: StorageProvider::AwsS3,
            bucket: bucket.to_string(),
            region: region.to_string(),
            ..Self::local("")
        }
    }

    /// Build an ObjectStore instance from this configuration
    pub fn build_object_store(&self) -> Result<Arc<dyn ObjectStore>, ServiceError> {
        let config_err = |e: object_store::Error| ServiceError::Config(e.to_string());
        match &self.provider {
            StorageProvider::CloudflareR2 | StorageProvider::MinIO => {
                let endpoint = self.endpoint.as_ref().ok_or_else(|| {
                    ServiceError::Config(format!("Endpoint required for {:?}", self.provider))
                })?;

                let mut builder = AmazonS3Builder::new()
                    .with_bucket_name(&self.bucket)
                    .with_region(&self.region)
                    .with_endpoint(endpoint)
                    .with_virtual_hosted_style_request(false);

                if let (Some(key), Some(secret)) = (&self.access_key_id, &self.secret_access_key) {
                    builder = builder
                        .with_access_key_id(key)
                        .with_secret_access_key(secret);
                }

                Ok(Arc::new(builder.build().map_err(config_err)?))
            }

            StorageProvider::AwsS3 => {
                let mut builder = AmazonS3Builder::new()
                    .with_bucket_name(&self.bucket)
                    .with_region(&self.region);

                if let (Some(key), Some(secret)) = (&self.access_key_id, &self.secret_access_key) {
                    builder = builder
                        .with_access_key_id(key)
                        .with_secret_access_key(secret);
                }

                Ok(Arc::new(builder.build().map_err(config_err)?))
            }

            StorageProvider::Local => {
                std::fs::create_dir_all(&self.bucket).map_err(|e| {
                    ServiceError::Config(format!("cannot create {}: {}", self.bucket, e))
                })?;
                Ok(Arc::new(
                    LocalFileSystem::new_with_prefix(&self.bucket).map_err(config_err)?,
                ))
            }

            StorageProvider::Memory => Ok(Arc::new(InMemory::new())),
        }
    }

    /// Prefix for artifact locations: the public URL, or the directory for local storage
    pub fn location_prefix(&self) -> Option<String> {
        match (&self.public_url, &self.provider) {
            (Some(url), _) => Some(url.clone()),
            (None, StorageProvider::Local) => Some(self.bucket.clone()),
            _ => None,
        }
    }

    pub fn build_artifact_store(&self) -> Result<ObjectArtifactStore, ServiceError> {
        let store = ObjectArtifactStore::new(self.build_object_store()?);
        Ok(match self.location_prefix() {
            Some(prefix) => store.with_location_prefix(prefix),
            None => store,
        })
    }
}

/// Text-understanding delegate settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LlmConfig {
    pub api_key: Option<String>,
    pub model: String,
    pub base_url: String,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub storage: StorageConfig,
    pub fonts_dir: PathBuf,
    pub state_file: PathBuf,
    pub llm: LlmConfig,
    /// Conversation turns kept per document
    pub history_turns: usize,
}

impl ServiceConfig {
    /// Load configuration from environment variables
    ///
    /// Expected variables:
    /// - PDFEDIT_STORAGE_PROVIDER: "local" (default), "s3", "r2", "minio" or "memory"
    /// - PDFEDIT_BUCKET: Bucket name or local directory (default "./artifacts")
    /// - PDFEDIT_REGION: AWS region (default "auto")
    /// - PDFEDIT_ENDPOINT: Custom endpoint URL
    /// - AWS_ACCESS_KEY_ID / AWS_SECRET_ACCESS_KEY
    /// - PDFEDIT_PUBLIC_URL: Base URL for returned artifact locations
    /// - PDFEDIT_FONTS_DIR (default "./fonts"), PDFEDIT_STATE_FILE (default "./pdfedit-state.json")
    /// - OPENAI_API_KEY, PDFEDIT_LLM_MODEL, PDFEDIT_LLM_BASE_URL
    /// - PDFEDIT_HISTORY_TURNS (default 3)
    pub fn from_env() -> Result<Self, ServiceError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ServiceError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |key: &str, default: &str| lookup(key).unwrap_or_else(|| default.to_string());

        let provider_str = var("PDFEDIT_STORAGE_PROVIDER", "local");
        let provider = match provider_str.to_lowercase().as_str() {
            "cloudflare_r2" | "r2" => StorageProvider::CloudflareR2,
            "aws_s3" | "s3" => StorageProvider::AwsS3,
            "minio" => StorageProvider::MinIO,
            "local" => StorageProvider::Local,
            "memory" => StorageProvider::Memory,
            _ => {
                return Err(ServiceError::Config(format!(
                    "Unknown storage provider: {}",
                    provider_str
                )))
            }
        };

        let history_turns = match lookup("PDFEDIT_HISTORY_TURNS") {
            Some(raw) => raw.trim().parse().map_err(|_| {
                ServiceError::Config(format!("PDFEDIT_HISTORY_TURNS is not a number: {}", raw))
            })?,
            None => pdfedit_assist::context::DEFAULT_HISTORY_TURNS,
        };

        Ok(Self {
            storage: StorageConfig {
                provider,
                bucket: var("PDFEDIT_BUCKET", "./artifacts"),
                region: var("PDFEDIT_REGION", "auto"),
                endpoint: lookup("PDFEDIT_ENDPOINT"),
                access_key_id: lookup("AWS_ACCESS_KEY_ID"),
                secret_access_key: lookup("AWS_SECRET_ACCESS_KEY"),
                public_url: lookup("PDFEDIT_PUBLIC_URL"),
            },
            fonts_dir: PathBuf::from(var("PDFEDIT_FONTS_DIR", "./fonts")),
            state_file: PathBuf::from(var("PDFEDIT_STATE_FILE", "./pdfedit-state.json")),
            llm: LlmConfig {
                api_key: lookup("OPENAI_API_KEY").filter(|k| !k.is_empty()),
                model: var("PDFEDIT_LLM_MODEL", DEFAULT_MODEL),
                base_url: var("PDFEDIT_LLM_BASE_URL", DEFAULT_BASE_URL),
            },
            history_turns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| vars.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.storage.provider, StorageProvider::Local);
        assert_eq!(config.storage.bucket, "./artifacts");
        assert_eq!(config.storage.region, "auto");
        assert_eq!(config.fonts_dir, PathBuf::from("./fonts"));
        assert_eq!(config.state_file, PathBuf::from("./pdfedit-state.json"));
        assert_eq!(config.llm.model, "gpt-4o-mini");
        assert_eq!(config.llm.base_url, "https://api.openai.com/v1");
        assert_eq!(config.llm.api_key, None);
        assert_eq!(config.history_turns, 3);
        assert_eq!(config.storage.location_prefix(), Some("./artifacts".to_string()));
    }

    #[test]
    fn test_r2_from_env() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("PDFEDIT_STORAGE_PROVIDER", "R2"),
            ("PDFEDIT_BUCKET", "edits"),
            ("PDFEDIT_ENDPOINT", "https://abc123.r2.cloudflarestorage.com"),
            ("PDFEDIT_PUBLIC_URL", "https://files.example.com"),
            ("PDFEDIT_HISTORY_TURNS", "5"),
            ("OPENAI_API_KEY", "sk-test"),
        ]))
        .unwrap();
        assert_eq!(config.storage.provider, StorageProvider::CloudflareR2);
        assert_eq!(config.storage.bucket, "edits");
        assert_eq!(
            config.storage.location_prefix(),
            Some("https://files.example.com".to_string())
        );
        assert_eq!(config.history_turns, 5);
        assert_eq!(config.llm.api_key.as_deref(), Some("sk-test"));
    }

    #[test]
    fn test_invalid_values() {
        assert!(matches!(
            ServiceConfig::from_lookup(lookup(&[("PDFEDIT_STORAGE_PROVIDER", "ftp")])),
            Err(ServiceError::Config(_))
        ));
        assert!(matches!(
            ServiceConfig::from_lookup(lookup(&[("PDFEDIT_HISTORY_TURNS", "lots")])),
            Err(ServiceError::Config(_))
        ));
    }

    #[test]
    fn test_minio_requires_endpoint() {
        let config = StorageConfig {
            provider: StorageProvider::MinIO,
            ..StorageConfig::s3("bucket", "us-east-1")
        };
        assert!(matches!(
            config.build_object_store(),
            Err(ServiceError::Config(_))
        ));
    }

    #[test]
    fn test_memory_store_has_no_prefix() {
        let config = StorageConfig::memory();
        assert!(config.build_object_store().is_ok());
        assert_eq!(config.location_prefix(), None);
    }
}
