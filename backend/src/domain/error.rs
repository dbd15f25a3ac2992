use thiserror::Error;

/// Error taxonomy at the service boundary.
///
/// Validation and not-found map to client errors at the REST layer; store
/// errors surface as 500. Publish failures never appear here; publication
/// is best-effort and only logged.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{0}")]
    Validation(String),

    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: i64 },

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl ServiceError {
    pub fn validation(message: impl Into<String>) -> Self {
        ServiceError::Validation(message.into())
    }

    pub fn not_found(entity: &'static str, id: i64) -> Self {
        ServiceError::NotFound { entity, id }
    }
}

pub type ServiceResult<T> = Result<T, ServiceError>;
