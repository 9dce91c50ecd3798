use serde::Serialize;

/// Coarse classification of filesystem failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageErrorKind {
    InsufficientSpace,
    PermissionDenied,
    NotFound,
    Other,
}

impl std::fmt::Display for StorageErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl StorageErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StorageErrorKind::InsufficientSpace => "insufficient space",
            StorageErrorKind::PermissionDenied => "permission denied",
            StorageErrorKind::NotFound => "path not found",
            StorageErrorKind::Other => "storage failure",
        }
    }

    pub fn classify(err: &std::io::Error) -> Self {
        match err.kind() {
            std::io::ErrorKind::StorageFull => StorageErrorKind::InsufficientSpace,
            std::io::ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
            std::io::ErrorKind::NotFound => StorageErrorKind::NotFound,
            _ => StorageErrorKind::Other,
        }
    }
}

/// Application error type
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Storage error ({kind}): {message}")]
    Storage {
        kind: StorageErrorKind,
        message: String,
    },

    /// The source stream failed while it was being read
    #[error("Transport error: {0}")]
    Transport(std::io::Error),

    /// The filesystem and the database disagree and need out-of-band reconciliation
    #[error("Partial failure on post {post_id}: {detail}")]
    PartialFailure { post_id: i64, detail: String },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    pub fn storage(kind: StorageErrorKind, message: impl Into<String>) -> Self {
        AppError::Storage {
            kind,
            message: message.into(),
        }
    }

    /// Numeric status family for an outer transport layer
    pub fn code(&self) -> i32 {
        match self {
            AppError::Validation(_) => 400,
            AppError::NotFound(_) => 404,
            AppError::InvalidState(_) | AppError::Conflict(_) => 409,
            AppError::Storage {
                kind: StorageErrorKind::InsufficientSpace,
                ..
            } => 507,
            AppError::Transport(_) => 400,
            AppError::Database(_)
            | AppError::Storage { .. }
            | AppError::PartialFailure { .. }
            | AppError::Internal(_) => 500,
        }
    }

    /// Whether the error left state that only a reconciliation sweep can fix
    pub fn needs_reconciliation(&self) -> bool {
        matches!(self, AppError::PartialFailure { .. })
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        AppError::Storage {
            kind: StorageErrorKind::classify(&err),
            message: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, AppError>;
