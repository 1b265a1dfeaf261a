use crate::domain::ProductKind;
use thiserror::Error;

pub type DomainResult<T> = Result<T, DomainError>;

#[derive(Error, Debug)]
pub enum DomainError {
    #[error("Invalid product ID: {0}")]
    InvalidProductId(u32),

    #[error("Invalid player ID: {0}")]
    InvalidPlayerId(String),

    #[error("Invalid update request: {0}")]
    InvalidUpdateRequest(String),

    #[error("Invalid payload: {0}")]
    InvalidPayload(String),

    #[error("Product not found: {0} {1}")]
    ProductNotFound(ProductKind, u32),

    #[error("Duplicate record: {0}")]
    DuplicateRecord(String),

    #[error("Publish error: {0}")]
    PublishError(String),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] anyhow::Error),
}

impl DomainError {
    /// Whether retrying the same message later can succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::RepositoryError(_) | Self::PublishError(_))
    }
}
