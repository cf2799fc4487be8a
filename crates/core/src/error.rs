use thiserror::Error;

pub type RosterResult<T> = Result<T, RosterError>;

#[derive(Error, Debug)]
pub enum RosterError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Spreadsheet error: {0}")]
    Spreadsheet(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The upload was purged from the cache or already consumed.
    #[error("Upload {0} expired, re-upload required")]
    UploadExpired(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Email provider error: {0}")]
    EmailProvider(String),

    #[error("Document storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl RosterError {
    /// Short machine-readable code used in JSON error bodies.
    pub fn code(&self) -> &'static str {
        match self {
            RosterError::Config(_) => "config_error",
            RosterError::Validation(_) => "validation_failed",
            RosterError::Spreadsheet(_) => "invalid_spreadsheet",
            RosterError::NotFound(_) => "not_found",
            RosterError::UploadExpired(_) => "upload_expired",
            RosterError::Conflict(_) => "conflict",
            RosterError::Unauthorized(_) => "unauthorized",
            RosterError::EmailProvider(_) => "email_provider_error",
            RosterError::Storage(_) => "storage_error",
            RosterError::Serialization(_) => "serialization_error",
            RosterError::Io(_) => "io_error",
            RosterError::Internal(_) => "internal_error",
        }
    }
}
