//! Error taxonomy for the pipeline.
//!
//! Classified by recoverability:
//! - Acquisition failures degrade to a fallback reading, never outward
//! - Bus failures are logged and retried on the next cycle
//! - Configuration failures are the only startup-fatal class

use std::path::PathBuf;

use thiserror::Error;

/// A single poll of an upstream source failed.
///
/// Every variant is recovered locally by the owning adapter; none escapes
/// a `poll()` call.
#[derive(Debug, Error)]
pub enum AcquisitionError {
    #[error("request timed out")]
    Timeout,

    #[error("HTTP transport: {0}")]
    Transport(reqwest::Error),

    #[error("upstream rejected credentials (status {0})")]
    AuthRejected(u16),

    #[error("upstream error {status}: {message}")]
    UpstreamStatus { status: u16, message: String },

    #[error("malformed upstream payload: {0}")]
    Malformed(String),

    #[error("no API credential configured")]
    MissingCredential,
}

impl AcquisitionError {
    /// Classify a reqwest transport error. Timeouts and body-decode
    /// failures get their own variants so logs name the real problem.
    pub fn from_transport(err: reqwest::Error) -> AcquisitionError {
        if err.is_timeout() {
            AcquisitionError::Timeout
        } else if err.is_decode() {
            AcquisitionError::Malformed(err.to_string())
        } else {
            AcquisitionError::Transport(err)
        }
    }

    /// Credential failures will not self-heal on retry; callers log them
    /// distinctly from transient ones.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            AcquisitionError::AuthRejected(_) | AcquisitionError::MissingCredential
        )
    }
}

/// Bus transport failure. Publishers log these and let the next cycle
/// retry; the session driver reconnects on its own.
#[derive(Debug, Error)]
pub enum BusError {
    #[error("publish failed: {0}")]
    Publish(String),

    #[error("subscribe failed: {0}")]
    Subscribe(String),

    #[error("bus session closed")]
    Closed,
}

/// Configuration file problems detected at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("cannot parse {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },
}
