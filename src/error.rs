use thiserror::Error;

pub type Result<T> = std::result::Result<T, UniqueError>;

#[derive(Error, Debug)]
pub enum UniqueError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Storage operation failed: {0}")]
    Storage(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Failed to parse environment variable {var_name}: value '{value}' - {error}")]
    EnvParse {
        var_name: String,
        value: String,
        error: String,
    },

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

impl From<serde_json::Error> for UniqueError {
    fn from(err: serde_json::Error) -> Self {
        UniqueError::Serialization(err.to_string())
    }
}
