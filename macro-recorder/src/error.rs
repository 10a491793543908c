use thiserror::Error;

/// Error types for macro recording and playback
#[derive(Debug, Error)]
pub enum MacroError {
    /// The global input hook could not be installed (missing permissions, no display, ...)
    #[error("Failed to subscribe to global input: {0}")]
    CaptureUnavailable(String),

    /// The input hook went away while a recording was in progress
    #[error("Input capture stopped unexpectedly: {0}")]
    CaptureLost(String),

    /// A synthetic input event could not be injected
    #[error("Failed to dispatch input event: {0}")]
    DispatchFailed(String),

    /// A macro file was readable but its content is not a valid macro log
    #[error("Malformed macro log at record {index}: {reason}")]
    MalformedLog { index: usize, reason: String },

    /// Playback speed must be a finite, strictly positive multiplier
    #[error("Invalid playback speed {0}: must be a finite number greater than zero")]
    InvalidSpeed(f64),

    /// Error when serializing or deserializing JSON
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl MacroError {
    pub(crate) fn malformed(index: usize, reason: impl Into<String>) -> Self {
        MacroError::MalformedLog {
            index,
            reason: reason.into(),
        }
    }
}

/// Result type for macro recorder operations
pub type Result<T> = std::result::Result<T, MacroError>;
