//! Application-wide error types.
//!
//! Library modules return specific variants via `thiserror`; CLI/main uses
//! `anyhow` for convenient propagation. Errors raised inside the stream
//! worker or the audio callback are never propagated across the thread
//! boundary; they are logged and resolved into a stopped session (the
//! caller observes `playing()` turning false).

use std::path::PathBuf;

/// Application-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Top-level application error.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Malformed or unsupported WAV container. Unrecoverable for that file.
    #[error("Invalid WAV file {path}: {message}")]
    Format { path: PathBuf, message: String },

    /// Audio subsystem enumeration failure. Typically transient; the device
    /// watcher treats it as "no change" rather than an error.
    #[error("Device enumeration failed: {0}")]
    DeviceEnumeration(String),

    /// Hardware stream open/run failure. Aborts the playback session but
    /// never the process.
    #[error("Audio stream error: {0}")]
    Stream(String),
}

impl Error {
    /// Create a WAV format error.
    pub fn format(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::Format {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a device enumeration error.
    pub fn device(message: impl Into<String>) -> Self {
        Self::DeviceEnumeration(message.into())
    }

    /// Create a hardware stream error.
    pub fn stream(message: impl Into<String>) -> Self {
        Self::Stream(message.into())
    }
}
