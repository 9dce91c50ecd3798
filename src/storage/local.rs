use async_trait::async_trait;
use std::path::PathBuf;
use tokio::fs;
use tokio::io::{AsyncRead, AsyncWriteExt};
use uuid::Uuid;

use crate::config::StorageConfig;
use crate::error::{AppError, Result};
use crate::storage::hasher::{ContentHasher, CHUNK_SIZE};
use crate::storage::{
    BlobStore, Fingerprint, Relocation, StageLimits, StagedBlob, StagingFile, StorageArea,
};

/// Local file system blob store
pub struct LocalBlobStore {
    active_path: PathBuf,
    quarantine_path: PathBuf,
    staging_path: PathBuf,
}

impl LocalBlobStore {
    pub fn new(config: &StorageConfig) -> Self {
        Self {
            active_path: PathBuf::from(&config.uploads_dir),
            quarantine_path: PathBuf::from(&config.deleted_dir),
            staging_path: config.staging_dir(),
        }
    }

    fn area_dir(&self, area: StorageArea) -> &PathBuf {
        match area {
            StorageArea::Active => &self.active_path,
            StorageArea::Quarantine => &self.quarantine_path,
        }
    }

    /// Copy the stream into `staging`, hashing as it goes
    async fn copy_into(
        reader: &mut (dyn AsyncRead + Unpin + Send),
        staging: &StagingFile,
        limits: StageLimits,
    ) -> Result<(Fingerprint, u64)> {
        let mut file = fs::File::create(staging.path()).await?;
        let mut hasher = ContentHasher::new();
        let mut buf = vec![0u8; CHUNK_SIZE];

        loop {
            let n = hasher.read_chunk(reader, &mut buf).await?;
            if n == 0 {
                break;
            }

            let total = hasher.bytes_hashed();
            if let Some(declared) = limits.declared_size {
                if total > declared {
                    return Err(AppError::Validation(format!(
                        "Upload is larger than its declared size of {} bytes",
                        declared
                    )));
                }
            }
            if let Some(max) = limits.max_size {
                if total > max {
                    return Err(AppError::Validation(format!(
                        "Upload exceeds the maximum size of {} bytes",
                        max
                    )));
                }
            }

            file.write_all(&buf[..n]).await?;
        }

        let size = hasher.bytes_hashed();
        if let Some(declared) = limits.declared_size {
            if size < declared {
                return Err(AppError::Transport(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    format!("stream ended after {} of {} declared bytes", size, declared),
                )));
            }
        }

        file.flush().await?;
        file.sync_all().await?;

        Ok((hasher.finalize(), size))
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn stage(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        limits: StageLimits,
    ) -> Result<StagedBlob> {
        fs::create_dir_all(&self.staging_path).await?;

        let staging = StagingFile::new(self.staging_path.join(format!("{}.part", Uuid::new_v4())));

        // On cancellation `staging` is dropped and the partial file removed
        let (fingerprint, size) = match Self::copy_into(reader, &staging, limits).await {
            Ok(done) => done,
            Err(e) => {
                staging.discard().await;
                return Err(e);
            }
        };

        tracing::debug!("Staged {} bytes as {:?} ({})", size, staging.path(), fingerprint);
        Ok(StagedBlob {
            fingerprint,
            size,
            file: staging,
        })
    }

    async fn publish(&self, staged: StagedBlob) -> Result<String> {
        let canonical = self.path_for(&staged.fingerprint);

        if fs::try_exists(&canonical).await? {
            tracing::debug!("Object {} already stored, discarding staged copy", staged.fingerprint);
            staged.file.discard().await;
            return Ok(canonical);
        }

        fs::create_dir_all(&self.active_path).await?;

        // Identical bytes under the same name, so a racing publisher overwriting us is harmless
        fs::rename(staged.file.path(), &canonical).await?;
        staged.file.disarm();

        tracing::debug!("Published object {} at {}", staged.fingerprint, canonical);
        Ok(canonical)
    }

    async fn relocate_to(&self, from: &str, to: &str) -> Result<Relocation> {
        if !fs::try_exists(from).await? {
            tracing::debug!("Relocation source {} does not exist", from);
            return Ok(Relocation::SourceMissing);
        }

        if let Some(parent) = std::path::Path::new(to).parent() {
            fs::create_dir_all(parent).await?;
        }

        match fs::rename(from, to).await {
            Ok(()) => {
                tracing::debug!("Moved object {} -> {}", from, to);
                Ok(Relocation::Moved(to.to_string()))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                // Lost a race with another mover
                if fs::try_exists(from).await? {
                    Err(e.into())
                } else {
                    tracing::debug!("Relocation source {} vanished during move", from);
                    Ok(Relocation::SourceMissing)
                }
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn remove(&self, path: &str) -> Result<bool> {
        match fs::remove_file(path).await {
            Ok(()) => {
                tracing::debug!("Removed object {}", path);
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        Ok(fs::try_exists(path).await?)
    }

    async fn open(&self, path: &str) -> Result<fs::File> {
        fs::File::open(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                AppError::NotFound(format!("Object not found: {}", path))
            } else {
                e.into()
            }
        })
    }

    fn path_for(&self, fingerprint: &Fingerprint) -> String {
        self.area_path(StorageArea::Active, fingerprint.as_str())
    }

    fn area_path(&self, area: StorageArea, name: &str) -> String {
        self.area_dir(area).join(name).display().to_string()
    }

    fn storage_type(&self) -> &'static str {
        "local"
    }
}
