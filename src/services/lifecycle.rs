use chrono::Utc;
use sqlx::{Sqlite, SqliteConnection, Transaction};

use crate::db::Database;
use crate::error::{AppError, Result, StorageErrorKind};
use crate::models::{Post, PostBody};
use crate::services::PostService;
use crate::storage::{BlobStore, Fingerprint, Relocation, StorageArea};

/// Soft-delete and restore, keeping post rows and stored objects in step
pub struct LifecycleService;

/// The file part of a post that a transition may have to move
struct FileRef {
    fingerprint: Fingerprint,
    storage_path: String,
    display_name: String,
}

impl FileRef {
    fn of(post: &Post) -> Result<Option<Self>> {
        match &post.body {
            PostBody::File {
                display_name,
                storage_path,
                file,
            } => Ok(Some(FileRef {
                fingerprint: Fingerprint::parse(&file.fingerprint)?,
                storage_path: storage_path.clone(),
                display_name: display_name.clone(),
            })),
            PostBody::Message { .. } => Ok(None),
        }
    }
}

impl LifecycleService {
    /// Soft-delete a post, moving its object into quarantine when no other post uses it
    pub async fn delete(db: &Database, blobs: &dyn BlobStore, post_id: i64) -> Result<Post> {
        let mut tx = db.pool().begin().await?;

        let post = PostService::mark_deleted(&mut tx, post_id).await?;
        let Some(file) = FileRef::of(&post)? else {
            tx.commit().await?;
            tracing::info!("Deleted message post {}", post_id);
            return Ok(post);
        };

        let others = PostService::count_other_references(&mut *tx, post_id, &file.storage_path).await?;
        if others > 0 {
            tx.commit().await?;
            tracing::info!(
                "Deleted post {}; object {} is shared with {} other post(s) and stays in place",
                post_id,
                file.fingerprint.short(),
                others
            );
            return Ok(post);
        }

        let name = Self::quarantine_name(post_id, &file.fingerprint);
        match blobs
            .relocate(&file.storage_path, StorageArea::Quarantine, &name)
            .await?
        {
            Relocation::Moved(quarantined) => {
                let post = Self::finish(tx, blobs, post_id, &file, &quarantined).await?;
                tracing::info!("Deleted post {}, object quarantined at {}", post_id, quarantined);
                Ok(post)
            }
            Relocation::SourceMissing => {
                tx.commit().await?;
                tracing::warn!(
                    "Deleted post {} but its object {} was already gone",
                    post_id,
                    file.storage_path
                );
                Ok(post)
            }
        }
    }

    /// Restore a soft-deleted post, moving its object back to the active area
    pub async fn restore(db: &Database, blobs: &dyn BlobStore, post_id: i64) -> Result<Post> {
        let mut tx = db.pool().begin().await?;

        let post = PostService::mark_restored(&mut tx, post_id).await?;
        let Some(file) = FileRef::of(&post)? else {
            tx.commit().await?;
            tracing::info!("Restored message post {}", post_id);
            return Ok(post);
        };

        let canonical = blobs.path_for(&file.fingerprint);
        if file.storage_path == canonical {
            // Never moved, e.g. shared with another post at delete time
            tx.commit().await?;
            tracing::info!("Restored post {}", post_id);
            return Ok(post);
        }

        if blobs.exists(&canonical).await? {
            return Self::restore_onto_existing(tx, blobs, post_id, &file, &canonical).await;
        }

        match blobs.relocate_to(&file.storage_path, &canonical).await? {
            Relocation::Moved(active) => {
                let post = Self::finish(tx, blobs, post_id, &file, &active).await?;
                tracing::info!("Restored post {}, object returned to {}", post_id, active);
                Ok(post)
            }
            Relocation::SourceMissing => {
                tx.rollback().await?;
                Err(AppError::storage(
                    StorageErrorKind::NotFound,
                    format!(
                        "Cannot restore post {}: neither {} nor {} exists",
                        post_id, file.storage_path, canonical
                    ),
                ))
            }
        }
    }

    /// The content is already back in the active area (uploaded again while this post
    /// was deleted). Point the post at that object and never move it; the quarantined
    /// copy is removed only once the new pointer is committed.
    async fn restore_onto_existing(
        mut tx: Transaction<'static, Sqlite>,
        blobs: &dyn BlobStore,
        post_id: i64,
        file: &FileRef,
        canonical: &str,
    ) -> Result<Post> {
        let post = Self::record_location(&mut tx, post_id, canonical, &file.display_name).await?;
        let others = PostService::count_other_references(&mut *tx, post_id, &file.storage_path).await?;
        tx.commit().await?;

        if others == 0 {
            match blobs.remove(&file.storage_path).await {
                Ok(true) => tracing::debug!("Dropped quarantined copy {}", file.storage_path),
                Ok(false) => tracing::warn!(
                    "Quarantined object {} for post {} was already gone",
                    file.storage_path,
                    post_id
                ),
                Err(e) => tracing::warn!(
                    "Failed to drop quarantined copy {} for post {}: {}",
                    file.storage_path,
                    post_id,
                    e
                ),
            }
        }

        tracing::info!("Restored post {} onto existing object {}", post_id, canonical);
        Ok(post)
    }

    /// Record the new location and commit after a successful move.
    /// A database failure moves the object back once; anything left half-done is `PartialFailure`.
    async fn finish(
        mut tx: Transaction<'static, Sqlite>,
        blobs: &dyn BlobStore,
        post_id: i64,
        file: &FileRef,
        moved_to: &str,
    ) -> Result<Post> {
        let post = match Self::record_location(&mut tx, post_id, moved_to, &file.display_name).await {
            Ok(post) => post,
            Err(e) => {
                drop(tx);
                return Err(Self::compensate(blobs, post_id, &file.storage_path, moved_to, e).await);
            }
        };

        if let Err(e) = tx.commit().await {
            tracing::error!(
                "Post {}: object moved {} -> {} but commit failed: {}; needs reconciliation",
                post_id,
                file.storage_path,
                moved_to,
                e
            );
            return Err(AppError::PartialFailure {
                post_id,
                detail: format!(
                    "object moved from {} to {} but the database was not updated: {}",
                    file.storage_path, moved_to, e
                ),
            });
        }

        Ok(post)
    }

    async fn record_location(
        conn: &mut SqliteConnection,
        post_id: i64,
        storage_path: &str,
        display_name: &str,
    ) -> Result<Post> {
        PostService::update_file_reference(conn, post_id, storage_path, display_name).await?;
        PostService::get(&mut *conn, post_id).await
    }

    /// Undo a move after the transaction was abandoned
    async fn compensate(
        blobs: &dyn BlobStore,
        post_id: i64,
        original: &str,
        moved_to: &str,
        cause: AppError,
    ) -> AppError {
        // Something already sits at the original path again; never move over it
        if let Ok(true) = blobs.exists(original).await {
            tracing::error!(
                "Post {}: {} is occupied again, leaving moved object at {}",
                post_id,
                original,
                moved_to
            );
            return AppError::PartialFailure {
                post_id,
                detail: format!("{}; object left at {}", cause, moved_to),
            };
        }

        match blobs.relocate_to(moved_to, original).await {
            Ok(Relocation::Moved(_)) => {
                tracing::warn!("Post {}: moved object back to {} after: {}", post_id, original, cause);
                cause
            }
            Ok(Relocation::SourceMissing) => {
                tracing::error!(
                    "Post {}: object vanished from {} before it could be moved back",
                    post_id,
                    moved_to
                );
                AppError::PartialFailure {
                    post_id,
                    detail: format!("{}; object missing from {}", cause, moved_to),
                }
            }
            Err(e) => {
                tracing::error!(
                    "Post {}: failed to move object back from {} to {}: {}",
                    post_id,
                    moved_to,
                    original,
                    e
                );
                AppError::PartialFailure {
                    post_id,
                    detail: format!("{}; object left at {}: {}", cause, moved_to, e),
                }
            }
        }
    }

    /// `<post id>_<UTC timestamp>_<fingerprint>`, unique per post and deletion
    pub fn quarantine_name(post_id: i64, fingerprint: &Fingerprint) -> String {
        format!(
            "{}_{}_{}",
            post_id,
            Utc::now().format("%Y%m%d%H%M%S%6f"),
            fingerprint
        )
    }
}
