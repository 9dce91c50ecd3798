use serde::Serialize;

/// Aggregate counts over posts and files
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Stats {
    pub total_posts: i64,
    pub active_posts: i64,
    pub deleted_posts: i64,
    pub file_posts: i64,
    pub message_posts: i64,
    pub unique_files: i64,
    pub total_storage_bytes: i64,
    pub total_storage_mb: f64,
}

/// A file post whose recorded storage path has no object behind it
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PathMismatch {
    pub post_id: i64,
    pub deleted: bool,
    pub recorded_path: String,
    pub canonical_path: String,
    pub canonical_exists: bool,
}
