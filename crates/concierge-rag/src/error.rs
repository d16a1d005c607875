use thiserror::Error;

#[derive(Debug, Error)]
pub enum RagError {
    #[error("storage error: {0}")]
    Store(#[from] concierge_store::StoreError),

    #[error("index I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("embedding error: {0}")]
    Embedding(String),
}

pub type Result<T> = std::result::Result<T, RagError>;
