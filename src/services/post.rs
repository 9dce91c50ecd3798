use sqlx::{Executor, Sqlite, SqliteConnection};

use crate::db::{timestamp, Database};
use crate::error::{AppError, Result};
use crate::models::{DownloadTarget, NewPost, NewPostBody, Post, PostBody, PostKind, PostRow};

const POST_SELECT: &str = r#"
    SELECT p.id, p.kind, p.title, p.content, p.display_name, p.file_id, p.storage_path,
           p.submitter_address, p.created_at, p.deleted_at,
           f.fingerprint AS file_fingerprint, f.storage_path AS file_storage_path,
           f.size_bytes AS file_size_bytes, f.media_type AS file_media_type,
           f.created_at AS file_created_at
    FROM posts p
    LEFT JOIN files f ON p.file_id = f.id
"#;

/// Post registry
pub struct PostService;

impl PostService {
    /// Insert a post and return it with its id and creation time
    pub async fn create(conn: &mut SqliteConnection, new_post: NewPost<'_>) -> Result<Post> {
        let title = new_post.title.trim();
        let now = timestamp();

        let result = match new_post.body {
            NewPostBody::Message { content } => {
                if title.is_empty() {
                    return Err(AppError::Validation("Title is required".to_string()));
                }

                sqlx::query(
                    r#"
                    INSERT INTO posts (kind, title, content, submitter_address, created_at)
                    VALUES (?, ?, ?, ?, ?)
                    "#,
                )
                .bind(PostKind::Message.as_str())
                .bind(title)
                .bind(content)
                .bind(new_post.submitter_address)
                .bind(&now)
                .execute(&mut *conn)
                .await?
            }
            NewPostBody::File {
                display_name,
                storage_path,
                file,
            } => {
                if display_name.is_empty() {
                    return Err(AppError::Validation("Display name is required".to_string()));
                }

                sqlx::query(
                    r#"
                    INSERT INTO posts (kind, title, content, display_name, file_id, storage_path, submitter_address, created_at)
                    VALUES (?, ?, '', ?, ?, ?, ?, ?)
                    "#,
                )
                .bind(PostKind::File.as_str())
                .bind(title)
                .bind(display_name)
                .bind(file.id)
                .bind(storage_path)
                .bind(new_post.submitter_address)
                .bind(&now)
                .execute(&mut *conn)
                .await?
            }
        };

        Self::get(&mut *conn, result.last_insert_rowid()).await
    }

    /// Get a post by ID, with its file resolved
    pub async fn get<'e, E>(executor: E, post_id: i64) -> Result<Post>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let sql = format!("{} WHERE p.id = ?", POST_SELECT);
        let row: PostRow = sqlx::query_as(&sql)
            .bind(post_id)
            .fetch_optional(executor)
            .await?
            .ok_or_else(|| AppError::NotFound(format!("Post {} not found", post_id)))?;

        Post::try_from(row)
    }

    /// List posts newest first, optionally including soft-deleted ones
    pub async fn list(db: &Database, include_deleted: bool) -> Result<Vec<Post>> {
        let where_clause = if include_deleted {
            ""
        } else {
            "WHERE p.deleted_at IS NULL"
        };
        let sql = format!(
            "{} {} ORDER BY p.created_at DESC, p.id DESC",
            POST_SELECT, where_clause
        );

        let rows: Vec<PostRow> = sqlx::query_as(&sql).fetch_all(db.pool()).await?;

        let mut posts = Vec::with_capacity(rows.len());
        for row in rows {
            let id = row.id;
            match Post::try_from(row) {
                Ok(post) => posts.push(post),
                Err(e) => tracing::warn!("Skipping post {}: {}", id, e),
            }
        }

        Ok(posts)
    }

    /// Active posts, newest first
    pub async fn list_active(db: &Database) -> Result<Vec<Post>> {
        Self::list(db, false).await
    }

    /// All posts including soft-deleted ones, newest first
    pub async fn list_all(db: &Database) -> Result<Vec<Post>> {
        Self::list(db, true).await
    }

    /// Soft-delete a post. The guarded UPDATE runs first so that of two racing
    /// callers only one observes the post as active.
    pub async fn mark_deleted(conn: &mut SqliteConnection, post_id: i64) -> Result<Post> {
        let now = timestamp();
        let result = sqlx::query(
            "UPDATE posts SET deleted_at = MAX(?, created_at) WHERE id = ? AND deleted_at IS NULL",
        )
        .bind(&now)
        .bind(post_id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::transition_error(conn, post_id, "already deleted").await);
        }

        Self::get(&mut *conn, post_id).await
    }

    /// Restore a soft-deleted post
    pub async fn mark_restored(conn: &mut SqliteConnection, post_id: i64) -> Result<Post> {
        let result = sqlx::query(
            "UPDATE posts SET deleted_at = NULL WHERE id = ? AND deleted_at IS NOT NULL",
        )
        .bind(post_id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Self::transition_error(conn, post_id, "not deleted").await);
        }

        Self::get(&mut *conn, post_id).await
    }

    /// Classify a guarded UPDATE that matched nothing
    async fn transition_error(conn: &mut SqliteConnection, post_id: i64, state: &str) -> AppError {
        let exists: std::result::Result<Option<(i64,)>, sqlx::Error> =
            sqlx::query_as("SELECT id FROM posts WHERE id = ?")
                .bind(post_id)
                .fetch_optional(&mut *conn)
                .await;

        match exists {
            Ok(Some(_)) => AppError::InvalidState(format!("Post {} is {}", post_id, state)),
            Ok(None) => AppError::NotFound(format!("Post {} not found", post_id)),
            Err(e) => e.into(),
        }
    }

    /// Point a file post at a new object location
    pub async fn update_file_reference(
        conn: &mut SqliteConnection,
        post_id: i64,
        storage_path: &str,
        display_name: &str,
    ) -> Result<()> {
        let result = sqlx::query(
            "UPDATE posts SET storage_path = ?, display_name = ? WHERE id = ? AND kind = 'file'",
        )
        .bind(storage_path)
        .bind(display_name)
        .bind(post_id)
        .execute(&mut *conn)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!("File post {} not found", post_id)));
        }

        Ok(())
    }

    /// Number of posts other than `post_id` recording the same object path
    pub async fn count_other_references<'e, E>(
        executor: E,
        post_id: i64,
        storage_path: &str,
    ) -> Result<i64>
    where
        E: Executor<'e, Database = Sqlite>,
    {
        let count: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM posts WHERE storage_path = ? AND id != ?")
                .bind(storage_path)
                .bind(post_id)
                .fetch_one(executor)
                .await?;
        Ok(count.0)
    }

    /// Resolve what a download of `post_id` should serve.
    /// Message posts, unknown ids and soft-deleted posts are all `NotFound`.
    pub async fn download_target(db: &Database, post_id: i64) -> Result<DownloadTarget> {
        let post = Self::get(db.pool(), post_id).await?;

        if post.is_deleted() {
            return Err(AppError::NotFound(format!("Post {} not found", post_id)));
        }

        match post.body {
            PostBody::File {
                display_name,
                storage_path,
                file,
            } => Ok(DownloadTarget {
                post_id: post.id,
                display_name,
                storage_path,
                media_type: file.media_type,
                size_bytes: file.size_bytes,
            }),
            PostBody::Message { .. } => Err(AppError::NotFound(format!(
                "Post {} has no file",
                post_id
            ))),
        }
    }
}
