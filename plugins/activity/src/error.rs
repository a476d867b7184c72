use sentinel_engine::EngineError;
use serde::{Serialize, Serializer};

#[derive(Debug, thiserror::Error)]
pub enum ActivityError {
    #[error("Invalid tracking config: {0}")]
    InvalidConfig(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Foreground service refused: {0}")]
    Foreground(String),

    #[error("Recognition service error: {0}")]
    Subscription(String),
}

impl Serialize for ActivityError {
    fn serialize<S>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl From<EngineError> for ActivityError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::InvalidConfig(e) => ActivityError::InvalidConfig(e.to_string()),
            EngineError::Storage(e) => ActivityError::Storage(e.to_string()),
            EngineError::Foreground(e) => ActivityError::Foreground(e.to_string()),
            EngineError::Subscription(e) => ActivityError::Subscription(e.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, ActivityError>;
