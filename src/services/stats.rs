use crate::db::Database;
use crate::error::Result;
use crate::models::Stats;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Read-only aggregates over posts and files
pub struct StatsService;

impl StatsService {
    pub async fn collect(db: &Database) -> Result<Stats> {
        let (total_posts, active_posts, deleted_posts, file_posts, message_posts): (
            i64,
            i64,
            i64,
            i64,
            i64,
        ) = sqlx::query_as(
            r#"
            SELECT
                COUNT(*),
                COALESCE(SUM(CASE WHEN deleted_at IS NULL THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN deleted_at IS NOT NULL THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN kind = 'file' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(CASE WHEN kind = 'message' THEN 1 ELSE 0 END), 0)
            FROM posts
            "#,
        )
        .fetch_one(db.pool())
        .await?;

        let (unique_files, total_storage_bytes): (i64, i64) =
            sqlx::query_as("SELECT COUNT(*), COALESCE(SUM(size_bytes), 0) FROM files")
                .fetch_one(db.pool())
                .await?;

        Ok(Stats {
            total_posts,
            active_posts,
            deleted_posts,
            file_posts,
            message_posts,
            unique_files,
            total_storage_bytes,
            total_storage_mb: total_storage_bytes as f64 / BYTES_PER_MB,
        })
    }
}
