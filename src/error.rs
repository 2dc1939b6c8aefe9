use thiserror::Error;

/// Closed error taxonomy for the data layer. Errors are terminal for the
/// operation that raised them; there are no retries anywhere in this crate.
#[derive(Debug, Error)]
pub enum RepoError {
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    #[error("constraint violation: {0}")]
    ConstraintViolation(String),
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),
    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, RepoError>;

impl RepoError {
    pub fn not_found(entity: &'static str, id: impl Into<String>) -> Self {
        RepoError::NotFound {
            entity,
            id: id.into(),
        }
    }
}

impl From<sqlx::Error> for RepoError {
    fn from(error: sqlx::Error) -> Self {
        match error {
            sqlx::Error::RowNotFound => RepoError::not_found("row", "?"),
            sqlx::Error::Database(db) => {
                // FOREIGN KEY / UNIQUE / CHECK failures surface as
                // constraint violations, everything else as storage trouble.
                let message = db.message().to_string();
                if db.constraint().is_some() || message.contains("constraint") {
                    RepoError::ConstraintViolation(message)
                } else {
                    RepoError::StorageUnavailable(message)
                }
            }
            sqlx::Error::ColumnDecode { index, source } => {
                RepoError::Serialization(format!("column {index}: {source}"))
            }
            sqlx::Error::Decode(err) => RepoError::Serialization(err.to_string()),
            other => RepoError::StorageUnavailable(other.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(error: serde_json::Error) -> Self {
        RepoError::Serialization(error.to_string())
    }
}

impl From<std::io::Error> for RepoError {
    fn from(error: std::io::Error) -> Self {
        RepoError::StorageUnavailable(error.to_string())
    }
}
