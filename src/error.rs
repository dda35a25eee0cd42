use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the subtitle server
#[derive(Error, Debug)]
pub enum SubtitleError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unsupported subtitle format: {0}")]
    UnsupportedFormat(String),

    #[error("Media source not found: item={item_id}, source={source_id}")]
    SourceNotFound { item_id: String, source_id: String },

    #[error("Subtitle stream not found: source={source_id}, index={index}")]
    StreamNotFound { source_id: String, index: u32 },

    #[error("Failed to launch {program}: {source}")]
    ProcessLaunch {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{operation} failed for {}: {reason}", .output.display())]
    ProcessFailed {
        operation: String,
        output: PathBuf,
        reason: String,
    },

    #[error("Parse error ({format}): {message}")]
    Parse { format: String, message: String },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl SubtitleError {
    /// Construct a parse error for the given format tag.
    pub fn parse(format: &str, message: impl Into<String>) -> Self {
        Self::Parse {
            format: format.to_string(),
            message: message.into(),
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, SubtitleError>;
