use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::error::AppError;
use crate::models::File;

/// Post variant as stored in the `kind` column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PostKind {
    Message,
    File,
}

impl PostKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostKind::Message => "message",
            PostKind::File => "file",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "message" => Some(PostKind::Message),
            "file" => Some(PostKind::File),
            _ => None,
        }
    }
}

/// Lifecycle state of a post
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PostState {
    Active,
    Deleted,
}

impl PostState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PostState::Active => "active",
            PostState::Deleted => "deleted",
        }
    }
}

/// Raw post row joined with its file, if any
#[derive(Debug, Clone, FromRow)]
pub struct PostRow {
    pub id: i64,
    pub kind: String,
    pub title: String,
    pub content: Option<String>,
    pub display_name: Option<String>,
    pub file_id: Option<i64>,
    pub storage_path: Option<String>,
    pub submitter_address: String,
    pub created_at: String,
    pub deleted_at: Option<String>,
    pub file_fingerprint: Option<String>,
    pub file_storage_path: Option<String>,
    pub file_size_bytes: Option<i64>,
    pub file_media_type: Option<String>,
    pub file_created_at: Option<String>,
}

/// Variant-specific part of a post
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "post_type", rename_all = "lowercase")]
pub enum PostBody {
    Message {
        content: String,
    },
    File {
        /// Name the uploader gave the file; never used as a storage location
        display_name: String,
        /// Where this post's bytes currently live (active area or quarantine)
        storage_path: String,
        file: File,
    },
}

/// A post with its file reference resolved
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Post {
    pub id: i64,
    pub title: String,
    pub submitter_address: String,
    pub created_at: String,
    pub deleted_at: Option<String>,
    #[serde(flatten)]
    pub body: PostBody,
}

impl Post {
    pub fn kind(&self) -> PostKind {
        match self.body {
            PostBody::Message { .. } => PostKind::Message,
            PostBody::File { .. } => PostKind::File,
        }
    }

    pub fn state(&self) -> PostState {
        if self.deleted_at.is_some() {
            PostState::Deleted
        } else {
            PostState::Active
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.state() == PostState::Deleted
    }

    pub fn file(&self) -> Option<&File> {
        match &self.body {
            PostBody::File { file, .. } => Some(file),
            PostBody::Message { .. } => None,
        }
    }

    pub fn display_name(&self) -> Option<&str> {
        match &self.body {
            PostBody::File { display_name, .. } => Some(display_name),
            PostBody::Message { .. } => None,
        }
    }

    pub fn storage_path(&self) -> Option<&str> {
        match &self.body {
            PostBody::File { storage_path, .. } => Some(storage_path),
            PostBody::Message { .. } => None,
        }
    }
}

impl TryFrom<PostRow> for Post {
    type Error = AppError;

    fn try_from(row: PostRow) -> Result<Self, Self::Error> {
        let kind = PostKind::from_str(&row.kind).ok_or_else(|| {
            AppError::Internal(format!("Post {} has unknown kind '{}'", row.id, row.kind))
        })?;

        let body = match kind {
            PostKind::Message => PostBody::Message {
                content: row.content.unwrap_or_default(),
            },
            PostKind::File => {
                let missing =
                    || AppError::Internal(format!("File post {} has no resolvable file", row.id));
                let file = File {
                    id: row.file_id.ok_or_else(missing)?,
                    fingerprint: row.file_fingerprint.ok_or_else(missing)?,
                    storage_path: row.file_storage_path.ok_or_else(missing)?,
                    size_bytes: row.file_size_bytes.ok_or_else(missing)?,
                    media_type: row.file_media_type.ok_or_else(missing)?,
                    created_at: row.file_created_at.ok_or_else(missing)?,
                };
                PostBody::File {
                    display_name: row.display_name.unwrap_or_default(),
                    storage_path: row
                        .storage_path
                        .unwrap_or_else(|| file.storage_path.clone()),
                    file,
                }
            }
        };

        Ok(Post {
            id: row.id,
            title: row.title,
            submitter_address: row.submitter_address,
            created_at: row.created_at,
            deleted_at: row.deleted_at,
            body,
        })
    }
}

/// Variant data for a post about to be inserted
#[derive(Debug, Clone)]
pub enum NewPostBody<'a> {
    Message {
        content: &'a str,
    },
    File {
        display_name: &'a str,
        storage_path: &'a str,
        file: &'a File,
    },
}

/// Post about to be inserted
#[derive(Debug, Clone)]
pub struct NewPost<'a> {
    pub title: &'a str,
    pub submitter_address: &'a str,
    pub body: NewPostBody<'a>,
}

/// Metadata accompanying an uploaded byte stream
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileUpload {
    pub declared_size: u64,
    pub display_name: Option<String>,
    pub title: Option<String>,
    pub media_type: Option<String>,
    #[serde(default)]
    pub submitter_address: String,
}

/// Message post request
#[derive(Debug, Clone, Default, Deserialize)]
pub struct MessagePost {
    pub title: String,
    #[serde(default)]
    pub content: Option<String>,
    #[serde(default)]
    pub submitter_address: String,
}

/// What a download collaborator needs to stream a file post
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DownloadTarget {
    pub post_id: i64,
    pub display_name: String,
    pub storage_path: String,
    pub media_type: String,
    pub size_bytes: i64,
}
