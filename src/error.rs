//! Error types for camera, configuration, capture and storage operations.

use std::path::PathBuf;

use crate::traits::Format;

/// Device acquisition and control failures. Always fatal for the invocation.
#[derive(Debug, thiserror::Error)]
pub enum HardwareError {
    /// Device with given index was not found.
    #[error("Device {0} not found")]
    DeviceNotFound(u32),
    /// Device exists but another process holds it.
    #[error("Device {0} is busy")]
    DeviceBusy(u32),
    /// Failed to open device.
    #[error("Failed to open device: {0}")]
    DeviceOpenFailed(String),
    /// Requested format is not supported.
    #[error("Format not supported: {0:?}")]
    FormatNotSupported(Format),
    /// Reading or writing a device control failed.
    #[error("Control `{name}` failed: {reason}")]
    Control {
        /// Human readable control name.
        name: &'static str,
        /// Driver message.
        reason: String,
    },
    /// Fixed-parameter open was requested without calibration results.
    #[error("Fixed parameters requested but camera was not calibrated")]
    Uncalibrated,
}

/// Missing or malformed configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    /// The configuration file could not be read or parsed.
    #[error("Could not load {}: {source}", path.display())]
    Load {
        /// Path of the configuration file.
        path: PathBuf,
        /// Parser error.
        #[source]
        source: ini::Error,
    },
    /// The `[camera_parameters]` section is absent.
    #[error("Missing section [{0}]")]
    MissingSection(&'static str),
    /// A required key is absent.
    #[error("Missing parameter `{0}`")]
    MissingKey(&'static str),
    /// A key is present but its value does not parse.
    #[error("Parameter `{key}` has invalid value `{value}`")]
    Malformed {
        /// Parameter name.
        key: &'static str,
        /// Raw value found in the source.
        value: String,
    },
}

/// Single-frame read failures.
#[derive(Debug, thiserror::Error)]
pub enum CaptureError {
    /// The device produced no data within its timeout.
    #[error("Capture timed out")]
    Timeout,
    /// Error during streaming operation.
    #[error("Stream error: {0}")]
    Stream(String),
    /// The driver returned fewer bytes than the format requires.
    #[error("Short frame: expected {expected} bytes, got {actual}")]
    ShortFrame {
        /// Bytes required by the negotiated format.
        expected: usize,
        /// Bytes delivered.
        actual: usize,
    },
}

/// Encode or write failures. Never abort the owning loop.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// The target folder could not be created.
    #[error("Could not create {}: {source}", path.display())]
    CreateDir {
        /// Folder path.
        path: PathBuf,
        /// I/O error.
        #[source]
        source: std::io::Error,
    },
    /// Frame buffer does not match its declared dimensions.
    #[error("Frame buffer does not match {width}x{height}")]
    InvalidFrame {
        /// Declared width.
        width: u32,
        /// Declared height.
        height: u32,
    },
    /// PNG encoding or file write failed.
    #[error("Could not write {}: {source}", path.display())]
    Encode {
        /// Target file.
        path: PathBuf,
        /// Codec error.
        #[source]
        source: image::ImageError,
    },
}

/// Preview surface failures.
#[derive(Debug, thiserror::Error)]
#[error("Display error: {0}")]
pub struct DisplayError(pub String);

/// Errors that terminate a session.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// Device acquisition or control failed.
    #[error(transparent)]
    Hardware(#[from] HardwareError),
    /// Parameters are missing or malformed.
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),
    /// A frame could not be read in a still mode.
    #[error(transparent)]
    Capture(#[from] CaptureError),
    /// The preview surface failed.
    #[error(transparent)]
    Display(#[from] DisplayError),
}
