//! Error types for nxmkey

use std::path::PathBuf;

use thiserror::Error;

/// Result type for nxmkey operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for nxmkey
#[derive(Debug, Error)]
pub enum Error {
    /// Cookies file does not exist
    #[error("Cookies file not found: {}", path.display())]
    CookiesNotFound { path: PathBuf },

    /// Cookies file is not valid JSON
    #[error("Failed to parse cookies JSON ({}): {source}", path.display())]
    CookiesParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// Nothing survived normalization and expiry filtering
    #[error("No usable cookies found in {}", path.display())]
    NoUsableCookies { path: PathBuf },

    /// No surviving cookie belongs to the target site
    #[error("Cookies file does not contain {domain} cookies: {}", path.display())]
    DomainMismatch { domain: String, path: PathBuf },

    /// Failed to launch Chrome
    #[error("Failed to launch Chrome: {0}")]
    Launch(String),

    /// Chrome not found
    #[error("Chrome not found")]
    ChromeNotFound,

    /// Transport error
    #[error("Transport error: {context}")]
    Transport {
        context: String,
        #[source]
        source: Option<std::io::Error>,
    },

    /// CDP protocol error
    #[error("CDP error in {method}: {message} (code {code})")]
    Cdp {
        method: String,
        code: i64,
        message: String,
    },

    /// CDP error without method context (for simple cases)
    #[error("CDP error: {0}")]
    CdpSimple(String),

    /// Navigation error
    #[error("Navigation error: {0}")]
    Navigation(String),

    /// Element not found in DOM
    #[error("Element not found: {0}")]
    ElementNotFound(String),

    /// Timeout
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Anti-bot challenge interstitial reached instead of the target page.
    /// Requires manual intervention; never retried automatically.
    #[error("Challenge page detected (title: {title:?}). Complete the challenge manually and retry.")]
    ChallengeDetected { title: String },

    /// Target element survived the wait but is gone at extraction time
    #[error("Expected {field} element is missing from the page")]
    FieldMissing { field: String },

    /// Target element is present but carries no value
    #[error("Extracted {field} is empty. Confirm account access and key generation status.")]
    FieldEmpty { field: String },

    /// Extracted value failed a format sanity check
    #[error("Format error: {reason}")]
    Format { reason: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Decode error (e.g., base64)
    #[error("Decode error: {0}")]
    Decode(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Create a transport error with context
    pub fn transport(context: impl Into<String>) -> Self {
        Self::Transport {
            context: context.into(),
            source: None,
        }
    }

    /// Create a transport error with IO source
    pub fn transport_io(context: impl Into<String>, source: std::io::Error) -> Self {
        Self::Transport {
            context: context.into(),
            source: Some(source),
        }
    }

    /// Create a CDP error with full context
    pub fn cdp(method: impl Into<String>, code: i64, message: impl Into<String>) -> Self {
        Self::Cdp {
            method: method.into(),
            code,
            message: message.into(),
        }
    }

    /// Create a missing-field error
    pub fn field_missing(field: impl Into<String>) -> Self {
        Self::FieldMissing {
            field: field.into(),
        }
    }

    /// Create an empty-field error
    pub fn field_empty(field: impl Into<String>) -> Self {
        Self::FieldEmpty {
            field: field.into(),
        }
    }

    /// Whether this failure means a human has to clear a challenge first
    pub fn is_challenge(&self) -> bool {
        matches!(self, Error::ChallengeDetected { .. })
    }

    /// Whether this failure is a bounded-wait expiry rather than a hard fault
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}
