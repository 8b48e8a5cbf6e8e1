//! Error types for surfsync
//!
//! Only failures the caller can act on are represented here. Backpressure
//! (full ring, exhausted pool) and clock discontinuities are counted and
//! logged instead, and releasing a surface that is not held is a panic.

use thiserror::Error;

/// Main error type for surfsync
#[derive(Error, Debug)]
pub enum SyncError {
    /// Decode backend errors
    #[error("Decoder error: {0}")]
    Decoder(String),

    /// A surface, import or GPU context could not be created at stream open
    #[error("Resource creation failed: {0}")]
    ResourceCreation(String),

    /// Audio subsystem errors
    #[error("Audio error: {0}")]
    Audio(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File I/O errors
    #[error("File error: {0}")]
    FileIO(#[from] std::io::Error),

    /// Invalid input errors
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Generic error for unexpected situations
    #[error("Internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// Create a decoder error from string
    pub fn decoder_error<S: Into<String>>(msg: S) -> Self {
        SyncError::Decoder(msg.into())
    }

    /// Create a resource creation error from string
    pub fn resource_error<S: Into<String>>(msg: S) -> Self {
        SyncError::ResourceCreation(msg.into())
    }
}

/// Convenience type alias for Results in surfsync
pub type Result<T> = std::result::Result<T, SyncError>;

/// Extension trait for converting other errors to SyncError
pub trait IntoSyncError<T> {
    /// Convert this error into a SyncError with the given context
    fn decoder_err(self, context: &str) -> Result<T>;
    fn resource_err(self, context: &str) -> Result<T>;
    fn audio_err(self, context: &str) -> Result<T>;
    fn config_err(self, context: &str) -> Result<T>;
}

impl<T, E: std::fmt::Display> IntoSyncError<T> for std::result::Result<T, E> {
    fn decoder_err(self, context: &str) -> Result<T> {
        self.map_err(|e| SyncError::Decoder(format!("{}: {}", context, e)))
    }

    fn resource_err(self, context: &str) -> Result<T> {
        self.map_err(|e| SyncError::ResourceCreation(format!("{}: {}", context, e)))
    }

    fn audio_err(self, context: &str) -> Result<T> {
        self.map_err(|e| SyncError::Audio(format!("{}: {}", context, e)))
    }

    fn config_err(self, context: &str) -> Result<T> {
        self.map_err(|e| SyncError::Config(format!("{}: {}", context, e)))
    }
}

/// Helper macro for creating internal errors with file and line information
#[macro_export]
macro_rules! internal_error {
    ($msg:expr) => {
        $crate::utils::error::SyncError::Internal(
            format!("{} at {}:{}", $msg, file!(), line!())
        )
    };
    ($fmt:expr, $($arg:tt)*) => {
        $crate::utils::error::SyncError::Internal(
            format!("{} at {}:{}", format!($fmt, $($arg)*), file!(), line!())
        )
    };
}
