//! Error types for the assistant

use thiserror::Error;

/// Result type alias for assistant operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while running the assistant
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// A collaborator or device could not be acquired at startup
    #[error("initialization failed: {0}")]
    FatalInit(String),

    /// Audio input failed while capturing (device loss)
    #[error("capture error: {0}")]
    Capture(String),

    /// Audio device error outside of capture
    #[error("audio error: {0}")]
    Audio(String),

    /// Speech-to-text error
    #[error("transcription error: {0}")]
    Transcription(String),

    /// Reasoning service call failed (network, auth, bad response)
    #[error("reasoning service error: {0}")]
    ReasoningService(String),

    /// Speech synthesis or playback failed
    #[error("playback error: {0}")]
    Playback(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Whether the session must terminate after this error
    ///
    /// Startup failures and loss of the input device end the session; every
    /// other failure is reported to the user and the conversation continues.
    #[must_use]
    pub const fn is_session_fatal(&self) -> bool {
        matches!(self, Self::FatalInit(_) | Self::Capture(_))
    }
}
