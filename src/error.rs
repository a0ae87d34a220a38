use thiserror::Error;

/// Status code recorded for payloads that cannot be parsed into a lineage fact.
pub const PARSE_STATUS: u16 = 400;

#[derive(Error, Debug)]
pub enum LineageError {
    #[error("Parse error: {0}")]
    Parse(String),

    #[error("Catalog rejected relationship ({status}): {message}")]
    Sink { status: u16, message: String },

    #[error("Catalog transport error: {0}")]
    Catalog(String),

    #[error("Token exchange error: {0}")]
    Auth(String),

    #[error("Metadata store error: {0}")]
    Store(String),

    #[error("Blob storage error: {0}")]
    Blob(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl LineageError {
    /// True for errors caused by the event payload itself.
    pub fn is_parse(&self) -> bool {
        matches!(self, LineageError::Parse(_) | LineageError::Json(_))
    }

    /// Status code to persist alongside a failure message, if the error carries one.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            LineageError::Sink { status, .. } => Some(*status),
            LineageError::Parse(_) | LineageError::Json(_) => Some(PARSE_STATUS),
            _ => None,
        }
    }

    /// Message persisted on the event metadata record: `[<code>] <text>`.
    pub fn status_message(&self) -> String {
        match self {
            LineageError::Sink { status, message } => format!("[{}] {}", status, message),
            LineageError::Parse(msg) => format!("[{}] {}", PARSE_STATUS, msg),
            LineageError::Json(e) => format!("[{}] {}", PARSE_STATUS, e),
            other => format!("[error] {}", other),
        }
    }
}

pub type Result<T> = std::result::Result<T, LineageError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sink_message_keeps_status_and_body() {
        let err = LineageError::Sink {
            status: 500,
            message: "boom".to_string(),
        };
        assert_eq!(err.status_code(), Some(500));
        assert_eq!(err.status_message(), "[500] boom");
    }

    #[test]
    fn test_parse_errors_map_to_bad_request() {
        let err = LineageError::Parse("malformed dataset URI".to_string());
        assert!(err.is_parse());
        assert_eq!(err.status_message(), "[400] malformed dataset URI");
    }
}
