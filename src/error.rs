use thiserror::Error;

#[derive(Error, Debug)]
pub enum HonyakuError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parsing error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("No translation engine available")]
    NoEngine,

    #[error("Unknown translation engine: {0}")]
    UnknownEngine(String),

    #[error("Chapter not found: {0}")]
    ChapterNotFound(i64),

    #[error("Chapter {0} has no text content")]
    EmptyContent(i64),

    #[error("Engine {engine} failed: {message}")]
    Engine { engine: String, message: String },

    #[error("Content error: {0}")]
    Content(String),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Queue store error: {0}")]
    Store(String),

    #[error("Translation cancelled")]
    Cancelled,
}

impl HonyakuError {
    pub fn engine(engine: &str, message: impl Into<String>) -> Self {
        Self::Engine {
            engine: engine.to_string(),
            message: message.into(),
        }
    }

    /// Whether a task failing with this error may succeed on a later attempt.
    ///
    /// Missing engines, missing chapters and empty chapters will not fix
    /// themselves between attempts, so they drop the task immediately.
    /// Cancellation is not a failure at all and is never retried.
    pub fn is_retryable(&self) -> bool {
        !matches!(
            self,
            Self::NoEngine
                | Self::UnknownEngine(_)
                | Self::ChapterNotFound(_)
                | Self::EmptyContent(_)
                | Self::Config(_)
                | Self::Cancelled
        )
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

pub type Result<T> = std::result::Result<T, HonyakuError>;
