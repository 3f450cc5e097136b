use thiserror::Error;

/// A fetched body that could not be turned into an RSS document.
#[derive(Debug, Error)]
pub enum DocumentError {
    #[error("document validation failed: {message}")]
    Validation { message: String },
    #[error("document is not well-formed XML: {message}")]
    Parse { message: String },
}

impl DocumentError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn parse(message: impl Into<String>) -> Self {
        Self::Parse {
            message: message.into(),
        }
    }
}
