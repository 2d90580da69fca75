use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum WalletError {
    // Network errors
    NetworkError(String),
    ConnectionTimeout,
    InvalidResponse(String),

    // Backend errors
    Unauthorized(String),
    ApiError { status: u16, message: String },

    // Storage errors
    StorageError(String),
    FileNotFound(String),

    // Validation errors
    ValidationError(String),
    InvalidAmount(String),
    InvalidQrPayload(String),

    // Workflow errors
    InvalidState(String),

    // Application errors
    NotInitialized,
    AlreadyExists(String),
    NotFound(String),

    // Generic errors
    Unknown(String),
}

impl fmt::Display for WalletError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            WalletError::NetworkError(msg) => write!(f, "Network error: {}", msg),
            WalletError::ConnectionTimeout => write!(f, "Connection timeout"),
            WalletError::InvalidResponse(msg) => write!(f, "Invalid response: {}", msg),

            WalletError::Unauthorized(msg) => write!(f, "Unauthorized: {}", msg),
            WalletError::ApiError { status, message } => {
                write!(f, "API error {}: {}", status, message)
            }

            WalletError::StorageError(msg) => write!(f, "Storage error: {}", msg),
            WalletError::FileNotFound(msg) => write!(f, "File not found: {}", msg),

            WalletError::ValidationError(msg) => write!(f, "Validation error: {}", msg),
            WalletError::InvalidAmount(msg) => write!(f, "Invalid amount: {}", msg),
            WalletError::InvalidQrPayload(msg) => write!(f, "Invalid QR payload: {}", msg),

            WalletError::InvalidState(msg) => write!(f, "Invalid state: {}", msg),

            WalletError::NotInitialized => write!(f, "Session not initialized"),
            WalletError::AlreadyExists(msg) => write!(f, "Already exists: {}", msg),
            WalletError::NotFound(msg) => write!(f, "Not found: {}", msg),

            WalletError::Unknown(msg) => write!(f, "Unknown error: {}", msg),
        }
    }
}

impl std::error::Error for WalletError {}

pub type WalletResult<T> = Result<T, WalletError>;

// Conversion helpers
impl From<std::io::Error> for WalletError {
    fn from(error: std::io::Error) -> Self {
        match error.kind() {
            std::io::ErrorKind::NotFound => WalletError::FileNotFound(error.to_string()),
            _ => WalletError::StorageError(error.to_string()),
        }
    }
}

impl From<serde_json::Error> for WalletError {
    fn from(error: serde_json::Error) -> Self {
        WalletError::ValidationError(format!("JSON error: {}", error))
    }
}

impl From<reqwest::Error> for WalletError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            WalletError::ConnectionTimeout
        } else {
            WalletError::NetworkError(error.to_string())
        }
    }
}
