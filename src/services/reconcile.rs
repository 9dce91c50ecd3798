use crate::db::Database;
use crate::error::Result;
use crate::models::{PathMismatch, PostBody};
use crate::services::PostService;
use crate::storage::{BlobStore, Fingerprint};

/// Finds file posts whose recorded object is missing. Never repairs anything.
pub struct ReconcileService;

impl ReconcileService {
    pub async fn scan(db: &Database, blobs: &dyn BlobStore) -> Result<Vec<PathMismatch>> {
        let posts = PostService::list_all(db).await?;
        let mut mismatches = Vec::new();

        for post in posts {
            let deleted = post.is_deleted();
            let PostBody::File {
                storage_path, file, ..
            } = post.body
            else {
                continue;
            };

            if blobs.exists(&storage_path).await? {
                continue;
            }

            let canonical_path = blobs.path_for(&Fingerprint::parse(&file.fingerprint)?);
            let canonical_exists = blobs.exists(&canonical_path).await?;

            tracing::warn!(
                "Post {} records {} but no object is there (canonical {} exists: {})",
                post.id,
                storage_path,
                canonical_path,
                canonical_exists
            );
            mismatches.push(PathMismatch {
                post_id: post.id,
                deleted,
                recorded_path: storage_path,
                canonical_path,
                canonical_exists,
            });
        }

        Ok(mismatches)
    }
}
