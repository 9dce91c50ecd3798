use sqlx::{Executor, Sqlite, SqliteConnection};

use crate::db::timestamp;
use crate::error::{AppError, Result};
use crate::models::File;
use crate::storage::Fingerprint;

/// File registry: one row per distinct blob
pub struct FileService;

impl FileService {
    /// Find a file by content fingerprint
    pub async fn find_by_fingerprint<'e, E>(
        executor: E,
        fingerprint: &Fingerprint,
    ) -> Result<Option<File>>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let file: Option<File> = sqlx::query_as("SELECT * FROM files WHERE fingerprint = ?")
            .bind(fingerprint.as_str())
            .fetch_optional(executor)
            .await?;

        Ok(file)
    }

    /// Get a file by ID
    pub async fn get<'e, E>(executor: E, file_id: i64) -> Result<File>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let file: File = sqlx::query_as("SELECT * FROM files WHERE id = ?")
            .bind(file_id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("File {} not found", file_id)))?;

        Ok(file)
    }

    /// Register a stored blob. Must only be called once the bytes are durable.
    pub async fn create(
        conn: &mut SqliteConnection,
        fingerprint: &Fingerprint,
        storage_path: &str,
        size_bytes: u64,
        media_type: &str,
    ) -> Result<File> {
        let now = timestamp();
        let size = i64::try_from(size_bytes)
            .map_err(|_| AppError::Validation(format!("File size {} is too large", size_bytes)))?;

        let result = sqlx::query(
            r#"
            INSERT INTO files (fingerprint, storage_path, size_bytes, media_type, created_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(fingerprint.as_str())
        .bind(storage_path)
        .bind(size)
        .bind(media_type)
        .bind(&now)
        .execute(&mut *conn)
        .await;

        match result {
            Ok(done) => Self::get(&mut *conn, done.last_insert_rowid()).await,
            Err(sqlx::Error::Database(db_err)) if db_err.is_unique_violation() => Err(
                AppError::Conflict(format!("File {} is already registered", fingerprint)),
            ),
            Err(e) => Err(e.into()),
        }
    }

    /// Fetch the row for `fingerprint`, creating it if absent.
    /// A creation race is resolved by reading the winner's row.
    pub async fn find_or_create(
        conn: &mut SqliteConnection,
        fingerprint: &Fingerprint,
        storage_path: &str,
        size_bytes: u64,
        media_type: &str,
    ) -> Result<File> {
        if let Some(file) = Self::find_by_fingerprint(&mut *conn, fingerprint).await? {
            return Ok(file);
        }

        match Self::create(conn, fingerprint, storage_path, size_bytes, media_type).await {
            Err(AppError::Conflict(_)) => {
                tracing::debug!("File {} was registered concurrently", fingerprint);
                Self::find_by_fingerprint(&mut *conn, fingerprint)
                    .await?
                    .ok_or_else(|| {
                        AppError::Internal(format!(
                            "File {} conflicted but cannot be read back",
                            fingerprint
                        ))
                    })
            }
            other => other,
        }
    }

    /// Count distinct files
    pub async fn count<'e, E>(executor: E) -> Result<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let count: (i64,) = sqlx::query_as("SELECT COUNT(*) FROM files")
            .fetch_one(executor)
            .await?;
        Ok(count.0)
    }
}
