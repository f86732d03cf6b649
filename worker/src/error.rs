use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Missing record for {key}: {reason}")]
    MissingRecord { key: String, reason: String },

    #[error("Empty or missing {0}")]
    EmptyModelOutput(&'static str),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Cycle error: {0}")]
    Cycle(String),

    #[error("Panicked: {0}")]
    Panic(String),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl WorkerError {
    pub fn missing_record(key: &str, reason: &str) -> Self {
        Self::MissingRecord {
            key: key.to_owned(),
            reason: reason.to_owned(),
        }
    }

    pub fn transport(message: impl std::fmt::Display) -> Self {
        Self::Transport(message.to_string())
    }
}

impl From<redis::RedisError> for WorkerError {
    fn from(err: redis::RedisError) -> Self {
        Self::Transport(format!("redis: {}", err))
    }
}

impl From<reqwest::Error> for WorkerError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(format!("http: {}", err))
    }
}
