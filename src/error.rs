//! Error handling for the thermolog crate.

/// A specialized `Result` type for thermolog operations.
pub type Result<T> = std::result::Result<T, StreamError>;

/// The main error type for the sensor stream pipeline.
///
/// Parse-level variants are recovered inside the pipeline; transport-level
/// variants end the session and surface to whoever owns it.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// A line from the device did not parse as a decimal number
    #[error("Malformed line: {0:?}")]
    MalformedLine(String),

    /// Unrecognized unit tag
    #[error("Invalid unit: {0:?} (expected °C or °F)")]
    InvalidUnit(String),

    /// The byte source failed while reading
    #[error("Source read failure: {0}")]
    SourceRead(#[source] std::io::Error),

    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Session task failed to complete
    #[error("Session error: {0}")]
    Session(String),

    /// Web server error
    #[error("Web server error: {0}")]
    WebServer(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

impl StreamError {
    /// Create a new malformed line error
    pub fn malformed_line(line: impl Into<String>) -> Self {
        Self::MalformedLine(line.into())
    }

    /// Create a new invalid unit error
    pub fn invalid_unit(tag: impl Into<String>) -> Self {
        Self::InvalidUnit(tag.into())
    }

    /// Create a new session error
    pub fn session_error(msg: impl Into<String>) -> Self {
        Self::Session(msg.into())
    }

    /// Create a new web server error
    pub fn web_server_error(msg: impl Into<String>) -> Self {
        Self::WebServer(msg.into())
    }

    /// Create a new configuration error
    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the pipeline recovers from this error and keeps reading.
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::MalformedLine(_))
    }
}
