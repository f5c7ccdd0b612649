use thiserror::Error;

/// Main error type for the chat core
///
/// Decode problems are recovered inside the decoders and persistence problems
/// are only logged, so in practice the variants a caller sees through a
/// stream's error hook are `Configuration`, `Transport` and `Simulated`.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ChatError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Failure produced on purpose by the local responder
    #[error("{0}")]
    Simulated(String),
}

pub type ChatResult<T> = std::result::Result<T, ChatError>;

impl ChatError {
    /// The message without its category prefix, for showing to the user
    pub fn detail(&self) -> &str {
        match self {
            ChatError::Configuration(msg)
            | ChatError::Transport(msg)
            | ChatError::Decode(msg)
            | ChatError::Persistence(msg)
            | ChatError::Simulated(msg) => msg,
        }
    }
}

impl From<reqwest::Error> for ChatError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() || err.is_timeout() {
            ChatError::Transport(format!("Network error: {}", err))
        } else {
            ChatError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(err: serde_json::Error) -> Self {
        ChatError::Decode(err.to_string())
    }
}

impl From<std::io::Error> for ChatError {
    fn from(err: std::io::Error) -> Self {
        ChatError::Persistence(err.to_string())
    }
}
