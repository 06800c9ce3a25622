use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use sha2::{Digest, Sha256};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Atomic write failed: {0}")]
    Persist(#[from] tempfile::PersistError),
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Storage key used when sanitization strips a user id down to nothing.
pub const DEFAULT_USER_KEY: &str = "default";

/// Result of a conditional fetch.
#[derive(Debug)]
pub enum Fetch {
    /// Stored hash matches the caller's; no body transferred.
    Unchanged,
    Document { bytes: Vec<u8>, etag: String },
}

/// Durable storage of one JSON blob per user key.
///
/// Writes go through a temp file and a single rename, so a concurrent
/// reader sees either the old document or the new one, never a mix.
pub struct DocumentStore {
    data_dir: PathBuf,
}

impl DocumentStore {
    pub fn new(data_dir: PathBuf) -> Result<Self> {
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    /// Restrict a user id to `[A-Za-z0-9_-]` before it becomes a file name,
    /// so it can never traverse out of the data directory.
    pub fn sanitize_user_key(user: &str) -> String {
        let safe: String = user
            .chars()
            .filter(|c| c.is_ascii_alphanumeric() || *c == '-' || *c == '_')
            .collect();
        if safe.is_empty() {
            DEFAULT_USER_KEY.to_string()
        } else {
            safe
        }
    }

    /// Content hash used as the cache validator (ETag).
    pub fn content_hash(bytes: &[u8]) -> String {
        hex::encode(Sha256::digest(bytes))
    }

    fn document_path(&self, user: &str) -> PathBuf {
        self.data_dir
            .join(format!("{}.json", Self::sanitize_user_key(user)))
    }

    /// Stored document and its validator, or `None` when this user has
    /// nothing stored yet.
    pub fn get(&self, user: &str) -> Result<Option<(Vec<u8>, String)>> {
        let path = self.document_path(user);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        let etag = Self::content_hash(&bytes);
        Ok(Some((bytes, etag)))
    }

    /// Conditional fetch: skip the body when the stored hash matches
    /// `known_hash`.
    pub fn get_if_changed(&self, user: &str, known_hash: &str) -> Result<Option<Fetch>> {
        match self.get(user)? {
            None => Ok(None),
            Some((bytes, etag)) => {
                if etag == known_hash {
                    Ok(Some(Fetch::Unchanged))
                } else {
                    Ok(Some(Fetch::Document { bytes, etag }))
                }
            }
        }
    }

    /// Store a document atomically and return its validator.
    pub fn put(&self, user: &str, bytes: &[u8]) -> Result<String> {
        let path = self.document_path(user);
        let etag = Self::content_hash(bytes);

        let mut tmp = tempfile::Builder::new()
            .prefix("ticklist_")
            .suffix(".json")
            .tempfile_in(&self.data_dir)?;
        tmp.write_all(bytes)?;
        tmp.as_file().sync_all()?;
        tmp.persist(&path)?;

        Ok(etag)
    }
}
