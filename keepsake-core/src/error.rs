/*!
Error types for the Keepsake core engine.
*/

use std::fmt::Write;
use thiserror::Error;

/// Result type used throughout the Keepsake core.
pub type Result<T> = std::result::Result<T, KeepsakeError>;

/// Errors that can occur while registering participants or processing slot requests.
#[derive(Error, Debug)]
pub enum KeepsakeError {
    /// Participant rejected at registration (empty id or slot)
    #[error("Invalid participant: {0}")]
    InvalidParticipant(String),

    /// A participant failed to produce its state during a save
    #[error("Capture failed for participant '{participant}' in slot '{slot}': {reason}")]
    CaptureFailed {
        slot: String,
        participant: String,
        reason: String,
    },

    /// A slot could not be decrypted, decoded or applied during a load
    #[error("Load failed for slot '{slot}': {source}")]
    LoadFailed {
        slot: String,
        #[source]
        source: Box<KeepsakeError>,
    },

    /// Persisted bytes are not a valid slot record
    #[error("Malformed record: {0}")]
    MalformedRecord(String),

    /// The storage backend could not complete an I/O call
    #[error("Storage backend unavailable for slot '{slot}': {source}")]
    BackendUnavailable {
        slot: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration or argument validation errors
    #[error("Validation error: {0}")]
    Validation(String),

    /// A slot task panicked or the worker pool went away
    #[error("Worker error: {0}")]
    Worker(String),

    /// I/O errors outside of a slot operation
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// One or more slots of a request failed
    #[error("{}", describe_failures(.0))]
    SlotFailures(Vec<SlotFailure>),
}

/// A failed slot and the error that stopped it
#[derive(Debug)]
pub struct SlotFailure {
    pub slot: String,
    pub error: KeepsakeError,
}

fn describe_failures(failures: &[SlotFailure]) -> String {
    let mut out = format!("{} slot(s) failed: ", failures.len());
    for (i, failure) in failures.iter().enumerate() {
        if i > 0 {
            out.push_str("; ");
        }
        let _ = write!(out, "{}: {}", failure.slot, failure.error);
    }
    out
}

impl KeepsakeError {
    /// Create a new invalid participant error
    pub fn invalid_participant<S: Into<String>>(msg: S) -> Self {
        Self::InvalidParticipant(msg.into())
    }

    /// Create a new malformed record error
    pub fn malformed<S: Into<String>>(msg: S) -> Self {
        Self::MalformedRecord(msg.into())
    }

    /// Create a new validation error
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a new worker error
    pub fn worker<S: Into<String>>(msg: S) -> Self {
        Self::Worker(msg.into())
    }

    /// Wrap a failure that happened while loading `slot`
    pub fn load_failed(slot: impl Into<String>, source: KeepsakeError) -> Self {
        Self::LoadFailed {
            slot: slot.into(),
            source: Box::new(source),
        }
    }

    /// Wrap an I/O failure raised by the storage backend for `slot`
    pub fn backend(slot: impl Into<String>, source: std::io::Error) -> Self {
        Self::BackendUnavailable {
            slot: slot.into(),
            source,
        }
    }

    /// True if this error (or the load failure it wraps) is a malformed record
    pub fn is_malformed(&self) -> bool {
        match self {
            Self::MalformedRecord(_) | Self::Json(_) => true,
            Self::LoadFailed { source, .. } => source.is_malformed(),
            _ => false,
        }
    }
}

/// Error returned by a participant's `capture` implementation
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct CaptureError(pub String);

impl CaptureError {
    pub fn new<S: Into<String>>(msg: S) -> Self {
        Self(msg.into())
    }
}
