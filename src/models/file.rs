use serde::Serialize;
use sqlx::FromRow;

/// File model - one row per distinct content fingerprint
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize)]
pub struct File {
    pub id: i64,
    pub fingerprint: String,
    pub storage_path: String,
    pub size_bytes: i64,
    pub media_type: String,
    pub created_at: String,
}
