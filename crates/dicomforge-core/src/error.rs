use thiserror::Error;

/// Core error type shared across dicomforge crates.
#[derive(Debug, Error)]
pub enum Error {
    /// A quota expression does not follow `<number><KB|MB|GB>`.
    #[error("invalid format: '{input}': {reason}. Use a format like '100MB' or '4.5GB'")]
    InvalidFormat { input: String, reason: String },
    /// A directory or file name does not follow the hierarchy grammar.
    #[error("invalid entry name: {0}")]
    InvalidEntryName(String),
    /// Catch-all error for unexpected failures.
    #[error("other error: {0}")]
    Other(String),
}

impl Error {
    pub(crate) fn invalid_format(input: &str, reason: impl Into<String>) -> Self {
        Error::InvalidFormat {
            input: input.to_string(),
            reason: reason.into(),
        }
    }
}

/// Convenience alias for results returned by dicomforge crates.
pub type Result<T> = std::result::Result<T, Error>;
