use thiserror::Error;

use seis_types::SessionId;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("session not found: {0}")]
    SessionNotFound(SessionId),

    #[error("cache error: {0}")]
    Cache(#[from] seis_cache::CacheError),

    #[error("store error: {0}")]
    Store(#[from] seis_store::StoreError),

    #[error("type error: {0}")]
    Type(#[from] seis_types::TypeError),

    #[error("invalid config: {0}")]
    Config(#[from] toml::de::Error),
}

pub type SdkResult<T> = Result<T, SdkError>;
