use thiserror::Error;

#[derive(Error, Debug)]
pub enum TransitError {
    #[error("API request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("CSV processing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Zip operation failed: {0}")]
    Zip(#[from] zip::result::ZipError),

    #[error("Timestamp parse error: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("Upstream error {code}: {message}")]
    Api { code: String, message: String },

    #[error("Unknown identifier '{id}': {context}")]
    UnknownId { id: String, context: String },

    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Validation error for {field}: {reason}")]
    Validation { field: String, reason: String },
}

impl TransitError {
    pub fn api(code: impl Into<String>, message: impl Into<String>) -> Self {
        TransitError::Api {
            code: code.into(),
            message: message.into(),
        }
    }

    pub fn unknown_id(id: impl ToString, context: impl Into<String>) -> Self {
        TransitError::UnknownId {
            id: id.to_string(),
            context: context.into(),
        }
    }

    pub fn config(message: impl Into<String>) -> Self {
        TransitError::Config {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, TransitError>;
