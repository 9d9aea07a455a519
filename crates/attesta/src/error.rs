use thiserror::Error;

use attesta_core::ApiError;

/// Error type for the attesta server binary, aggregating protocol errors
/// with configuration and I/O failures.
#[derive(Debug, Error)]
pub enum ServerError {
    #[error("api error: {0}")]
    Api(#[from] ApiError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<toml::de::Error> for ServerError {
    fn from(e: toml::de::Error) -> Self {
        ServerError::Config(format!("TOML parse error: {}", e))
    }
}

pub type ServerResult<T> = Result<T, ServerError>;
