#![allow(dead_code)]

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tempfile::TempDir;
use tokio::io::AsyncRead;

use file_board::config::{Config, DatabaseConfig, StorageConfig};
use file_board::error::{AppError, Result, StorageErrorKind};
use file_board::models::{FileUpload, Post};
use file_board::services::UploadService;
use file_board::storage::{
    BlobStore, Fingerprint, LocalBlobStore, Relocation, StageLimits, StagedBlob, StorageArea,
};
use file_board::AppState;

/// Local store whose moves can be made to fail
pub struct FaultyStore {
    inner: LocalBlobStore,
    /// Moves still allowed before every further one fails; `None` is unlimited
    moves_left: Mutex<Option<usize>>,
}

impl FaultyStore {
    pub fn fail_relocations(&self, fail: bool) {
        *self.moves_left.lock().unwrap() = if fail { Some(0) } else { None };
    }

    /// Let `n` moves through, then fail the rest
    pub fn fail_relocations_after(&self, n: usize) {
        *self.moves_left.lock().unwrap() = Some(n);
    }
}

#[async_trait]
impl BlobStore for FaultyStore {
    async fn stage(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        limits: StageLimits,
    ) -> Result<StagedBlob> {
        self.inner.stage(reader, limits).await
    }

    async fn publish(&self, staged: StagedBlob) -> Result<String> {
        self.inner.publish(staged).await
    }

    async fn relocate_to(&self, from: &str, to: &str) -> Result<Relocation> {
        {
            let mut left = self.moves_left.lock().unwrap();
            match *left {
                Some(0) => {
                    return Err(AppError::storage(
                        StorageErrorKind::PermissionDenied,
                        format!("refusing to move {}", from),
                    ))
                }
                Some(n) => *left = Some(n - 1),
                None => {}
            }
        }
        self.inner.relocate_to(from, to).await
    }

    async fn remove(&self, path: &str) -> Result<bool> {
        self.inner.remove(path).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        self.inner.exists(path).await
    }

    async fn open(&self, path: &str) -> Result<tokio::fs::File> {
        self.inner.open(path).await
    }

    fn path_for(&self, fingerprint: &Fingerprint) -> String {
        self.inner.path_for(fingerprint)
    }

    fn area_path(&self, area: StorageArea, name: &str) -> String {
        self.inner.area_path(area, name)
    }

    fn storage_type(&self) -> &'static str {
        "faulty"
    }
}

/// A board over a temporary directory
pub struct TestBoard {
    pub dir: TempDir,
    pub state: AppState,
    pub store: Arc<FaultyStore>,
}

impl TestBoard {
    pub async fn new() -> Self {
        Self::with_storage(|_| {}).await
    }

    pub async fn with_storage(tweak: impl FnOnce(&mut StorageConfig)) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config {
            database: DatabaseConfig {
                path: dir.path().join("board.db").display().to_string(),
                max_connections: 1,
            },
            storage: StorageConfig {
                uploads_dir: dir.path().join("uploads").display().to_string(),
                deleted_dir: dir.path().join("deleted").display().to_string(),
                ..StorageConfig::default()
            },
        };
        tweak(&mut config.storage);

        let store = Arc::new(FaultyStore {
            inner: LocalBlobStore::new(&config.storage),
            moves_left: Mutex::new(None),
        });
        let state = AppState::init(config)
            .await
            .unwrap()
            .with_blob_store(store.clone());

        Self { dir, state, store }
    }

    pub fn blobs(&self) -> &dyn BlobStore {
        self.state.blobs.as_ref()
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.dir.path().join("uploads")
    }

    pub fn deleted_dir(&self) -> PathBuf {
        self.dir.path().join("deleted")
    }

    /// Make every write of a post's storage path abort
    pub async fn fail_path_updates(&self) {
        sqlx::query(
            r#"
            CREATE TRIGGER fail_path_update BEFORE UPDATE OF storage_path ON posts
            BEGIN
                SELECT RAISE(ABORT, 'storage_path writes disabled');
            END
            "#,
        )
        .execute(self.state.db.pool())
        .await
        .unwrap();
    }

    /// Let storage path writes succeed but make the enclosing commit fail,
    /// through a deferred foreign key that can never be satisfied
    pub async fn fail_commits_after_path_updates(&self) {
        let pool = self.state.db.pool();
        sqlx::query(
            r#"
            CREATE TABLE dangling (
                file_id INTEGER REFERENCES files(id) DEFERRABLE INITIALLY DEFERRED
            )
            "#,
        )
        .execute(pool)
        .await
        .unwrap();
        sqlx::query(
            r#"
            CREATE TRIGGER dangling_on_path_update AFTER UPDATE OF storage_path ON posts
            BEGIN
                INSERT INTO dangling (file_id) VALUES (-1);
            END
            "#,
        )
        .execute(pool)
        .await
        .unwrap();
    }

    pub async fn clear_db_faults(&self) {
        let pool = self.state.db.pool();
        for sql in [
            "DROP TRIGGER IF EXISTS fail_path_update",
            "DROP TRIGGER IF EXISTS dangling_on_path_update",
            "DROP TABLE IF EXISTS dangling",
        ] {
            sqlx::query(sql).execute(pool).await.unwrap();
        }
    }

    pub async fn try_upload(&self, name: &str, content: &[u8]) -> Result<Post> {
        let mut reader = content;
        UploadService::upload_file(
            &self.state.db,
            self.blobs(),
            &self.state.config.storage,
            upload_meta(name, content.len() as u64),
            &mut reader,
        )
        .await
    }

    pub async fn upload(&self, name: &str, content: &[u8]) -> Post {
        self.try_upload(name, content).await.unwrap()
    }
}

pub fn upload_meta(name: &str, declared_size: u64) -> FileUpload {
    FileUpload {
        declared_size,
        display_name: Some(name.to_string()),
        title: None,
        media_type: None,
        submitter_address: "127.0.0.1".to_string(),
    }
}

/// Regular files directly inside `dir`
pub fn objects_in(dir: &Path) -> usize {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries
                .filter_map(|e| e.ok())
                .filter(|e| e.file_type().map(|t| t.is_file()).unwrap_or(false))
                .count()
        })
        .unwrap_or(0)
}
