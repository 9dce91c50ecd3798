use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncRead;

use crate::error::Result;
use crate::storage::Fingerprint;

/// Logical area an object can live in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageArea {
    /// Content-addressed objects served to downloads
    Active,
    /// Objects of soft-deleted posts
    Quarantine,
}

impl StorageArea {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageArea::Active => "active",
            StorageArea::Quarantine => "quarantine",
        }
    }
}

/// Outcome of moving an object between areas
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Relocation {
    Moved(String),
    /// Nothing at the source path; it was moved or removed by someone else
    SourceMissing,
}

/// Bounds enforced while staging a stream
#[derive(Debug, Clone, Copy, Default)]
pub struct StageLimits {
    /// Exact length the caller promised, if known
    pub declared_size: Option<u64>,
    pub max_size: Option<u64>,
}

/// Temporary file removed on drop unless it has been published
#[derive(Debug)]
pub struct StagingFile {
    path: PathBuf,
    armed: bool,
}

impl StagingFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path, armed: true }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Hand ownership of the file on disk to the caller
    pub fn disarm(mut self) -> PathBuf {
        self.armed = false;
        std::mem::take(&mut self.path)
    }

    /// Remove the staged file without blocking the runtime
    pub async fn discard(self) {
        let path = self.disarm();
        if let Err(e) = tokio::fs::remove_file(&path).await {
            if e.kind() != std::io::ErrorKind::NotFound {
                tracing::warn!("Failed to discard staged upload {:?}: {}", path, e);
            }
        }
    }
}

impl Drop for StagingFile {
    // Only reached when the owner was dropped mid-flight (a cancelled upload);
    // Drop cannot await, so this is a single blocking unlink.
    fn drop(&mut self) {
        if self.armed {
            if let Err(e) = std::fs::remove_file(&self.path) {
                if e.kind() != std::io::ErrorKind::NotFound {
                    tracing::warn!("Failed to discard staged upload {:?}: {}", self.path, e);
                }
            }
        }
    }
}

/// Fully written, fingerprinted upload that is not yet visible
#[derive(Debug)]
pub struct StagedBlob {
    pub fingerprint: Fingerprint,
    pub size: u64,
    pub file: StagingFile,
}

/// Content-addressed blob storage
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Copy a stream into a private staging file while fingerprinting it
    async fn stage(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        limits: StageLimits,
    ) -> Result<StagedBlob>;

    /// Atomically make a staged blob visible at its canonical path.
    /// If an object already exists there the staged copy is discarded.
    async fn publish(&self, staged: StagedBlob) -> Result<String>;

    /// Idempotent fingerprint-addressed write
    async fn put(
        &self,
        fingerprint: &Fingerprint,
        reader: &mut (dyn AsyncRead + Unpin + Send),
    ) -> Result<String> {
        let canonical = self.path_for(fingerprint);
        if self.exists(&canonical).await? {
            return Ok(canonical);
        }

        let staged = self.stage(reader, StageLimits::default()).await?;
        if &staged.fingerprint != fingerprint {
            return Err(crate::error::AppError::Validation(format!(
                "Content hashes to {} but was addressed as {}",
                staged.fingerprint, fingerprint
            )));
        }
        self.publish(staged).await
    }

    /// Move an object into `area` under `name`
    async fn relocate(&self, path: &str, area: StorageArea, name: &str) -> Result<Relocation> {
        let target = self.area_path(area, name);
        self.relocate_to(path, &target).await
    }

    /// Move an object to an explicit path
    async fn relocate_to(&self, from: &str, to: &str) -> Result<Relocation>;

    /// Delete an object. Returns false if there was nothing to delete.
    async fn remove(&self, path: &str) -> Result<bool>;

    /// Check if an object exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Open an object for reading
    async fn open(&self, path: &str) -> Result<tokio::fs::File>;

    /// Canonical location of the object with this fingerprint
    fn path_for(&self, fingerprint: &Fingerprint) -> String;

    /// Location of `name` inside `area`
    fn area_path(&self, area: StorageArea, name: &str) -> String;

    /// Get the storage type name
    fn storage_type(&self) -> &'static str;
}
