//! Error types for scriptplay

use std::io;
use thiserror::Error;

/// Result type for scriptplay operations
pub type Result<T> = std::result::Result<T, ScriptError>;

/// Errors that can occur while recording or replaying a script
#[derive(Debug, Error)]
pub enum ScriptError {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// Script text is not in the expected markdown layout
    #[error("{0}")]
    Format(String),

    /// Playback could not serve the request
    #[error(transparent)]
    Playback(#[from] PlaybackError),

    /// The live call to the real service failed
    #[error("Upstream call failed: {0}")]
    Upstream(String),

    /// A manipulation hook or consistency check rejected the interaction
    #[error("Assertion failed: {0}")]
    Assertion(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Request/response too large
    #[error("Data too large: {size} bytes exceeds limit of {limit} bytes")]
    DataTooLarge {
        /// Actual size
        size: usize,
        /// Size limit
        limit: usize,
    },

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

/// Errors raised by the playback interactor
#[derive(Debug, Error)]
pub enum PlaybackError {
    /// The script parsed but held no interactions
    #[error("No Interaction found in script '{script}'. Wrong/empty script file?")]
    NoInteractions {
        /// The script text as given
        script: String,
    },

    /// More requests arrived than the script recorded
    #[error("Interaction {index} requested but the script only has {len} interaction(s)")]
    OutOfRange {
        /// Requested position
        index: usize,
        /// Number of recorded interactions
        len: usize,
    },
}

impl ScriptError {
    /// Whether the session should answer with an error response and carry on
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        matches!(self, Self::Upstream(_) | Self::Assertion(_))
    }
}
