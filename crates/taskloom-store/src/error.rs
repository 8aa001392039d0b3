use std::fmt;

/// Result type for taskloom-store operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types that can occur in the store layer
#[derive(Debug)]
pub enum Error {
    /// External store rejected the call with an HTTP-like status.
    /// 400-class statuses are terminal and never retried.
    Store { status: Option<u16>, message: String },

    /// Embedding provider failed or returned an unusable vector.
    Embedding(String),

    /// The circuit breaker is open; no call was attempted.
    CircuitOpen,

    /// Payload/vector failed local validation before any network call.
    Validation(String),

    /// HTTP transport failure (connect, timeout, decode).
    Transport(reqwest::Error),

    /// JSON (de)serialisation failed.
    Json(serde_json::Error),
}

impl Error {
    pub fn store(status: Option<u16>, message: impl Into<String>) -> Self {
        Error::Store {
            status,
            message: message.into(),
        }
    }

    /// Terminal failures must never be retried: bad requests will stay
    /// bad, and local validation failures cannot heal on their own.
    pub fn is_terminal(&self) -> bool {
        match self {
            Error::Store { status, .. } => {
                matches!(status, Some(code) if (400..500).contains(code))
            }
            Error::Validation(_) => true,
            Error::Embedding(_)
            | Error::CircuitOpen
            | Error::Transport(_)
            | Error::Json(_) => false,
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Store { status, message } => match status {
                Some(code) => write!(f, "store error (status {}): {}", code, message),
                None => write!(f, "store error: {}", message),
            },
            Error::Embedding(msg) => write!(f, "embedding error: {}", msg),
            Error::CircuitOpen => write!(f, "circuit breaker open"),
            Error::Validation(msg) => write!(f, "validation error: {}", msg),
            Error::Transport(err) => write!(f, "transport error: {}", err),
            Error::Json(err) => write!(f, "JSON error: {}", err),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Transport(err) => Some(err),
            Error::Json(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err)
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::Json(err)
    }
}
