#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::fs;
use std::io::{BufWriter, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::embeddings::{Embedder, chunk_text};
use crate::{Result, StudyError};

/// Persisted chunks and embeddings for one document.
///
/// `embeddings[i]` is the embedding of `chunks[i]`. A store is never modified
/// after it is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStore {
    identity: String,
    model: String,
    created_at: DateTime<Utc>,
    chunks: Vec<String>,
    embeddings: Vec<Vec<f32>>,
}

impl VectorStore {
    #[inline]
    pub fn new(
        identity: impl Into<String>,
        model: impl Into<String>,
        chunks: Vec<String>,
        embeddings: Vec<Vec<f32>>,
    ) -> Result<Self> {
        let store = Self {
            identity: identity.into(),
            model: model.into(),
            created_at: Utc::now(),
            chunks,
            embeddings,
        };
        store.validate()?;
        Ok(store)
    }

    /// Check that chunks and embeddings are still paired one-to-one
    #[inline]
    pub fn validate(&self) -> Result<()> {
        if self.chunks.len() != self.embeddings.len() {
            return Err(StudyError::Storage(format!(
                "store for '{}' has {} chunks but {} embeddings",
                self.identity,
                self.chunks.len(),
                self.embeddings.len()
            )));
        }

        if let Some(dimension) = self.embeddings.first().map(Vec::len) {
            if self.embeddings.iter().any(|e| e.len() != dimension) {
                return Err(StudyError::Storage(format!(
                    "store for '{}' mixes embedding dimensions",
                    self.identity
                )));
            }
        }

        Ok(())
    }

    #[inline]
    pub fn identity(&self) -> &str {
        &self.identity
    }

    /// Embedding model the store was built with
    #[inline]
    pub fn model(&self) -> &str {
        &self.model
    }

    #[inline]
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    #[inline]
    pub fn chunks(&self) -> &[String] {
        &self.chunks
    }

    #[inline]
    pub fn embeddings(&self) -> &[Vec<f32>] {
        &self.embeddings
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Derive the cache key for a document identity (hex SHA-256 of the identity string)
#[inline]
pub fn storage_key(identity: &str) -> Result<String> {
    if identity.trim().is_empty() {
        return Err(StudyError::InvalidArgument(
            "document identity cannot be empty".to_string(),
        ));
    }

    Ok(hex::encode(Sha256::digest(identity.as_bytes())))
}

/// On-disk cache of vector stores, one JSON record per document identity
#[derive(Debug)]
pub struct StoreCache {
    store_dir: PathBuf,
    chunk_size: usize,
    build_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl StoreCache {
    /// Create a cache rooted at `store_dir`, creating the directory if needed
    #[inline]
    pub fn new(store_dir: impl Into<PathBuf>, chunk_size: usize) -> Result<Self> {
        if chunk_size == 0 {
            return Err(StudyError::InvalidArgument(
                "chunk size must be at least 1".to_string(),
            ));
        }

        let store_dir = store_dir.into();
        fs::create_dir_all(&store_dir).map_err(|e| {
            StudyError::Storage(format!(
                "Failed to create vector store directory {}: {e}",
                store_dir.display()
            ))
        })?;

        debug!("Vector store cache at {}", store_dir.display());

        Ok(Self {
            store_dir,
            chunk_size,
            build_locks: Mutex::new(HashMap::new()),
        })
    }

    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        Self::new(config.vector_store_path(), config.rag.chunk_size)
    }

    #[inline]
    pub fn store_dir(&self) -> &Path {
        &self.store_dir
    }

    /// Path of the persisted record for `identity`, whether or not it exists
    #[inline]
    pub fn record_path(&self, identity: &str) -> Result<PathBuf> {
        let key = storage_key(identity)?;
        Ok(self.store_dir.join(format!("{key}.json")))
    }

    #[inline]
    pub fn contains(&self, identity: &str) -> Result<bool> {
        Ok(self.record_path(identity)?.is_file())
    }

    /// Read the persisted store for `identity`.
    ///
    /// `Ok(None)` means the store was never built; an unreadable or corrupt
    /// record is a `StorageError`.
    #[inline]
    pub fn load(&self, identity: &str) -> Result<Option<VectorStore>> {
        let path = self.record_path(identity)?;
        read_record(&path)
    }

    /// Return the cached store for `identity`, building and persisting it on first use.
    ///
    /// A cached record is returned as-is, even if `text` has changed since it
    /// was built.
    #[inline]
    pub fn load_or_build(
        &self,
        identity: &str,
        text: &str,
        embedder: &dyn Embedder,
    ) -> Result<VectorStore> {
        let key = storage_key(identity)?;
        let path = self.store_dir.join(format!("{key}.json"));

        if let Some(store) = read_record(&path)? {
            debug!("Vector store cache hit for '{}' ({})", identity, key);
            warn_on_model_mismatch(&store, embedder);
            return Ok(store);
        }

        let lock = self.build_lock(&key);
        let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);

        // Another builder may have finished while we waited for the lock
        if let Some(store) = read_record(&path)? {
            debug!("Vector store for '{}' built concurrently", identity);
            warn_on_model_mismatch(&store, embedder);
            return Ok(store);
        }

        info!("Vector store cache miss for '{}', building", identity);
        let store = self.build(identity, text, embedder)?;
        self.persist(&path, &store)?;

        Ok(store)
    }

    /// Every persisted record in the store directory, each read independently
    #[inline]
    pub fn records(&self) -> Result<Vec<(PathBuf, Result<VectorStore>)>> {
        let entries = fs::read_dir(&self.store_dir).map_err(|e| {
            StudyError::Storage(format!(
                "Failed to list {}: {e}",
                self.store_dir.display()
            ))
        })?;

        let mut paths = entries
            .filter_map(|entry| entry.ok().map(|entry| entry.path()))
            .filter(|path| path.extension().is_some_and(|ext| ext == "json"))
            .collect::<Vec<_>>();
        paths.sort();

        Ok(paths
            .into_iter()
            .filter_map(|path| match read_record(&path) {
                Ok(Some(store)) => Some((path, Ok(store))),
                Ok(None) => None,
                Err(e) => Some((path, Err(e))),
            })
            .collect())
    }

    fn build(&self, identity: &str, text: &str, embedder: &dyn Embedder) -> Result<VectorStore> {
        let started = Instant::now();
        let chunks = chunk_text(text, self.chunk_size)?;

        let embeddings = if chunks.is_empty() {
            Vec::new()
        } else {
            embedder.embed_batch(&chunks)?
        };

        if embeddings.len() != chunks.len() {
            return Err(StudyError::Service(format!(
                "embedding service returned {} vectors for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let store = VectorStore::new(identity, embedder.model_name(), chunks, embeddings)?;

        info!(
            "Built vector store for '{}': {} chunks in {:?}",
            identity,
            store.len(),
            started.elapsed()
        );

        Ok(store)
    }

    /// Write to a temporary file in the store directory, then move it into place
    fn persist(&self, path: &Path, store: &VectorStore) -> Result<()> {
        store.validate()?;

        fs::create_dir_all(&self.store_dir).map_err(|e| {
            StudyError::Storage(format!(
                "Failed to create vector store directory {}: {e}",
                self.store_dir.display()
            ))
        })?;

        let temp_file = NamedTempFile::new_in(&self.store_dir)
            .map_err(|e| StudyError::Storage(format!("Failed to create temporary record: {e}")))?;

        {
            let mut writer = BufWriter::new(temp_file.as_file());
            serde_json::to_writer(&mut writer, store)
                .map_err(|e| StudyError::Storage(format!("Failed to serialize store: {e}")))?;
            writer
                .flush()
                .map_err(|e| StudyError::Storage(format!("Failed to write store: {e}")))?;
        }

        temp_file.persist(path).map_err(|e| {
            StudyError::Storage(format!(
                "Failed to persist store to {}: {}",
                path.display(),
                e.error
            ))
        })?;

        debug!("Persisted vector store to {}", path.display());
        Ok(())
    }

    fn build_lock(&self, key: &str) -> Arc<Mutex<()>> {
        let mut locks = self
            .build_locks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        Arc::clone(locks.entry(key.to_string()).or_default())
    }
}

fn read_record(path: &Path) -> Result<Option<VectorStore>> {
    let content = match fs::read(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
        Err(e) => {
            return Err(StudyError::Storage(format!(
                "Failed to read {}: {e}",
                path.display()
            )));
        }
    };

    let store: VectorStore = serde_json::from_slice(&content).map_err(|e| {
        StudyError::Storage(format!("Corrupt vector store {}: {e}", path.display()))
    })?;
    store.validate()?;

    Ok(Some(store))
}

fn warn_on_model_mismatch(store: &VectorStore, embedder: &dyn Embedder) {
    if store.model() != embedder.model_name() {
        warn!(
            "Vector store for '{}' was built with '{}' but queries will use '{}'",
            store.identity(),
            store.model(),
            embedder.model_name()
        );
    }
}
