use crate::resilience::BackendError;

#[derive(thiserror::Error, Debug)]
pub enum AppError {
    #[error("semantic search is disabled")]
    SemanticDisabled,

    #[error("{0}")]
    Backend(#[from] BackendError),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("unexpected error: {0:?}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// True when retrying later may succeed.
    pub fn is_unavailable(&self) -> bool {
        match self {
            AppError::SemanticDisabled => true,
            AppError::Backend(err) => err.is_unavailable(),
            _ => false,
        }
    }
}
