use thiserror::Error;

#[derive(Error, Debug)]
pub enum ImportError {
    #[error("Document does not look like a bank statement: {reason}")]
    NotAStatement { reason: String },

    #[error("The PDF is password protected; supply the password and try again")]
    PasswordRequired,

    #[error("Text extraction failed: {0}")]
    ExtractionFailed(String),

    #[error("Invalid import configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid confidence {0}: must be between 0.0 and 1.0")]
    InvalidConfidence(f64),

    #[cfg(feature = "gemini")]
    #[error("Structuring service returned status {status}: {body}")]
    ServiceError { status: u16, body: String },

    #[cfg(feature = "gemini")]
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, ImportError>;
