use tokio::io::AsyncRead;

use crate::config::StorageConfig;
use crate::db::Database;
use crate::error::{AppError, Result};
use crate::models::{FileUpload, MessagePost, NewPost, NewPostBody, Post};
use crate::services::{FileService, PostService};
use crate::storage::{BlobStore, Fingerprint, StageLimits};

const DEFAULT_MEDIA_TYPE: &str = "application/octet-stream";

/// Upload intake: turns streams and messages into posts
pub struct UploadService;

impl UploadService {
    /// Store an uploaded stream and create a file post for it.
    /// Identical content is stored once and shared by every post that uploads it.
    pub async fn upload_file<R>(
        db: &Database,
        blobs: &dyn BlobStore,
        storage: &StorageConfig,
        upload: FileUpload,
        reader: &mut R,
    ) -> Result<Post>
    where
        R: AsyncRead + Unpin + Send,
    {
        Self::validate_upload(storage, &upload)?;

        let staged = blobs
            .stage(
                reader,
                StageLimits {
                    declared_size: Some(upload.declared_size),
                    max_size: Some(storage.max_file_size_bytes()),
                },
            )
            .await?;

        let fingerprint = staged.fingerprint.clone();
        let size = staged.size;
        let display_name = Self::display_name(upload.display_name.as_deref(), &fingerprint);
        let title = match upload.title.as_deref().map(str::trim) {
            Some(t) if !t.is_empty() => t.to_string(),
            _ => display_name.clone(),
        };
        let media_type = Self::media_type(upload.media_type.as_deref(), &display_name);

        let mut tx = db.pool().begin().await?;

        // Publishing inside the transaction orders it against lifecycle moves of the same object
        let existing = FileService::find_by_fingerprint(&mut *tx, &fingerprint).await?;
        let storage_path = blobs.publish(staged).await?;
        let file = match existing {
            Some(file) => {
                tracing::debug!("Upload {} deduplicated onto file {}", fingerprint, file.id);
                file
            }
            None => {
                FileService::find_or_create(&mut tx, &fingerprint, &storage_path, size, &media_type)
                    .await?
            }
        };

        let post = PostService::create(
            &mut tx,
            NewPost {
                title: &title,
                submitter_address: &upload.submitter_address,
                body: NewPostBody::File {
                    display_name: &display_name,
                    storage_path: &storage_path,
                    file: &file,
                },
            },
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            "Created file post {} ({} bytes, file {})",
            post.id,
            size,
            file.id
        );
        Ok(post)
    }

    /// Create a message post
    pub async fn post_message(db: &Database, message: MessagePost) -> Result<Post> {
        let content = message.content.unwrap_or_default();

        let mut conn = db.pool().acquire().await?;
        let post = PostService::create(
            &mut conn,
            NewPost {
                title: &message.title,
                submitter_address: &message.submitter_address,
                body: NewPostBody::Message { content: &content },
            },
        )
        .await?;

        tracing::info!("Created message post {}", post.id);
        Ok(post)
    }

    /// Checks that need no bytes read
    fn validate_upload(storage: &StorageConfig, upload: &FileUpload) -> Result<()> {
        if upload.declared_size > storage.max_file_size_bytes() {
            return Err(AppError::Validation(format!(
                "File size cannot exceed {}",
                storage.max_file_size_text()
            )));
        }
        if upload.declared_size == 0 && !storage.allow_empty_uploads {
            return Err(AppError::Validation("Empty files are not accepted".to_string()));
        }
        Ok(())
    }

    /// Client filename without any directory part, or a name derived from the content
    fn display_name(client_name: Option<&str>, fingerprint: &Fingerprint) -> String {
        let name = client_name
            .map(|n| n.rsplit(['/', '\\']).next().unwrap_or("").trim())
            .unwrap_or("");

        if name.is_empty() || name == "." || name == ".." {
            format!("upload-{}", fingerprint.short())
        } else {
            name.to_string()
        }
    }

    fn media_type(declared: Option<&str>, display_name: &str) -> String {
        match declared.map(str::trim) {
            Some(m) if !m.is_empty() => m.to_string(),
            _ => mime_guess::from_path(display_name)
                .first_raw()
                .unwrap_or(DEFAULT_MEDIA_TYPE)
                .to_string(),
        }
    }
}
