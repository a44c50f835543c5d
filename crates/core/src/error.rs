use thiserror::Error;

pub type RegistrationResult<T> = Result<T, RegistrationError>;

#[derive(Error, Debug)]
pub enum RegistrationError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("NATS messaging error: {0}")]
    Nats(String),

    #[error("Queue transport error: {0}")]
    Transport(String),

    #[error("Provider client error: {0}")]
    Provider(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Internal error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl From<config::ConfigError> for RegistrationError {
    fn from(err: config::ConfigError) -> Self {
        RegistrationError::Config(err.to_string())
    }
}
