//! Error types for the karma ledger.

use thiserror::Error;

/// Errors produced by the store and the orchestration layer.
///
/// A missing entry is not an error: lookups return `Option` and clearing an
/// unknown name does nothing.
#[derive(Debug, Error)]
pub enum KarmaError {
    /// Caller supplied something the operation cannot accept.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// A row of an import file could not be read.
    #[error("Parse error on line {line}: {message}")]
    Parse {
        /// 1-based line number in the import file
        line: u64,
        /// What is wrong with the row
        message: String,
    },

    /// The storage unit for a channel could not be opened or created.
    #[error("Storage unavailable for {channel}: {source}")]
    StorageUnavailable {
        /// Channel whose storage failed to open
        channel: String,
        /// Underlying sled error
        #[source]
        source: sled::Error,
    },

    /// Read or write against an open storage unit failed.
    #[error("Storage error: {0}")]
    Storage(#[from] sled::Error),

    /// A stored record could not be encoded or decoded.
    #[error("Encoding error: {0}")]
    Encoding(#[from] bincode::Error),

    /// Filesystem error during dump or load.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV reader or writer error.
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Configuration file could not be read.
    #[error("Configuration error: {0}")]
    Config(String),

    /// The channel holds no entries at all.
    #[error("I have no karma for this channel.")]
    EmptyChannel,
}

impl KarmaError {
    /// Create an InvalidArgument error.
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Create a Parse error for the given import line.
    pub fn parse(line: u64, message: impl Into<String>) -> Self {
        Self::Parse {
            line,
            message: message.into(),
        }
    }

    /// Whether the error stems from caller input rather than storage.
    pub const fn is_invalid_input(&self) -> bool {
        matches!(self, Self::InvalidArgument(_) | Self::Parse { .. })
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, KarmaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        assert_eq!(
            KarmaError::parse(3, "expected 3 columns, found 2").to_string(),
            "Parse error on line 3: expected 3 columns, found 2"
        );
        assert_eq!(
            KarmaError::EmptyChannel.to_string(),
            "I have no karma for this channel."
        );
        assert!(KarmaError::invalid_argument("bad kind").is_invalid_input());
        assert!(!KarmaError::EmptyChannel.is_invalid_input());
    }
}
