use thiserror::Error;

#[derive(Debug, Error)]
pub enum KeyValueError {
    #[error("malformed key/value tree: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("expected a branch node for {0}, found a scalar")]
    ExpectedBranch(String),
}

pub type Result<T> = std::result::Result<T, KeyValueError>;
