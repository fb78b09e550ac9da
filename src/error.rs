use std::fmt::Display;
use std::io;
use std::str::Utf8Error;

use msgbox::IconType;
use thiserror::Error;

use crate::scan::capability::Capability;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to determine path to config file")]
    NoConfigPath,

    #[error("Failed to acquire file lock on config file: {source}")]
    CanNotLock { source: io::Error },

    #[error("Failed to encode/decode config as utf-8: {source}")]
    Utf8Error { #[from] source: Utf8Error },

    #[error("Failed to read/write config file: {source}")]
    IOError { #[from] source: io::Error },

    #[error("Failed to parse/build config file: {source}")]
    JsonError { #[from] source: serde_json::Error },
}

#[derive(Error, Debug)]
pub enum AppRunError {
    #[error("Failed to start application (iced): {source}")]
    Iced { #[from] source: iced::Error },

    #[error("Failed to start application (config): {source}")]
    ConfigError { #[from] source: ConfigError },
}

/// Failures internal to the btleplug worker.
#[derive(Error, Debug)]
pub enum DeviceError {
    #[error("Error communicating with the bluetooth stack (btleplug): {source}")]
    Btle { #[from] source: btleplug::Error },

    #[error("No bluetooth adapter is available")]
    NoAdapter,
}

impl DeviceError {
    /// Classify into the user-facing taxonomy. `capability` names the
    /// capability the failing operation needed.
    pub fn as_scan_error(&self, capability: Capability) -> ScanError {
        match self {
            DeviceError::Btle { source: btleplug::Error::PermissionDenied } => {
                ScanError::PermissionDenied(capability)
            },
            DeviceError::NoAdapter => ScanError::AdapterDisabled,
            DeviceError::Btle { source } => ScanError::Backend(source.to_string()),
        }
    }
}

/// User-facing error taxonomy. Every variant degrades to one transient
/// notice; nothing is retried and nothing is fatal.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScanError {
    #[error("Permission denied: {0}")]
    PermissionDenied(Capability),

    #[error("Bluetooth is not enabled")]
    AdapterDisabled,

    #[error("No device is listed at position {index}")]
    InvalidSelection { index: usize },

    #[error("Bluetooth failure: {0}")]
    Backend(String),
}

pub fn error_msgbox<T: Display>(message: &'static str, error: &T) {
    let message = format!("{}: {}", message, error);
    eprintln!("{}", &message);
    if let Err(err) = msgbox::create(concat!("FastRec Scan ", env!("CARGO_PKG_VERSION")), &message, IconType::Error) {
        eprintln!("Failed to create msgbox: {:?}", err);
    }
}
