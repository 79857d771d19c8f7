use thiserror::Error;

pub type TenantResult<T> = Result<T, TenantError>;

#[derive(Error, Debug)]
pub enum TenantError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Wizard storage error: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}
