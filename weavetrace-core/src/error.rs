//! Error types for weavetrace operations
//!
//! Every fallible operation in the crate returns [`TraceError`]. Each
//! variant carries:
//! - A human-readable message describing what failed and what to do
//! - A stable error code for programmatic handling
//! - A category for grouping and filtering
//!
//! Errors raised while the traced program is running are never allowed to
//! propagate into it; sinks report them through a
//! [`MessageSink`](crate::message::MessageSink) and disable themselves.
//! The reader-side errors, by contrast, are surfaced to the caller: a
//! corrupted trace or a protocol violation is something replay tooling
//! must see.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias for weavetrace operations
pub type Result<T> = std::result::Result<T, TraceError>;

/// Error category for grouping related errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Metadata table persistence or loading failed
    Metadata,
    /// Binary event stream could not be written or decoded
    Stream,
    /// Replayed event sequence violates the nesting protocol
    Protocol,
    /// Caller-supplied input was invalid
    Validation,
    /// Internal invariant broken (a bug)
    Internal,
}

/// Errors that can occur while recording or replaying a trace
#[derive(Error, Debug)]
pub enum TraceError {
    // ═══════════════════════════════════════════════════════════════════════
    // Metadata registry errors
    // ═══════════════════════════════════════════════════════════════════════

    /// A metadata table file could not be opened or written. The table is
    /// disabled for the remainder of the run; id counters still advance.
    #[error("Failed to persist {table} table: {reason}. The table is disabled for the rest of this run.")]
    TableWriteFailed { table: String, reason: String },

    /// A persisted metadata table failed validation on load
    #[error("Corrupt {table} table: {reason}. The trace directory may be incomplete or from a mismatched run.")]
    CorruptMetadata { table: String, reason: String },

    // ═══════════════════════════════════════════════════════════════════════
    // Binary stream errors
    // ═══════════════════════════════════════════════════════════════════════

    /// An event file ended in the middle of a 16-byte record
    #[error("Truncated event record at byte offset {offset}. The trace was not closed cleanly.")]
    TruncatedRecord { offset: u64 },

    /// seek() was asked for an event past the end of the trace
    #[error("Event id {event_id} is out of range: the trace holds {total} events.")]
    SeekOutOfRange { event_id: u64, total: u64 },

    // ═══════════════════════════════════════════════════════════════════════
    // Replay protocol errors
    // ═══════════════════════════════════════════════════════════════════════

    /// A stack mismatch during replay that is not the tolerated dangling
    /// constructor-frame case. Indicates a producer bug or a corrupted trace.
    #[error("Call-stack protocol violation on thread {thread_id} at event {event_id}: {reason}")]
    ProtocolViolation {
        thread_id: i32,
        event_id: u64,
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════════
    // Validation errors
    // ═══════════════════════════════════════════════════════════════════════

    /// A filter location pattern failed to compile
    #[error("Invalid filter pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },

    /// A persisted descriptor code was not one of the known kinds
    #[error("Unknown descriptor code '{code}'")]
    InvalidDescriptor { code: char },

    /// A persisted event type name was not recognized
    #[error("Unknown event type: '{name}'")]
    InvalidEventType { name: String },

    // ═══════════════════════════════════════════════════════════════════════
    // Infrastructure errors
    // ═══════════════════════════════════════════════════════════════════════

    /// JSON serialization or deserialization failed
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// I/O operation failed
    #[error("IO error: {message}")]
    IoError { message: String },

    /// A lock was poisoned (panic occurred while holding it)
    #[error("Internal lock poisoned. This is a bug; please report it.")]
    LockPoisoned,

    /// Internal error that shouldn't happen
    #[error("Internal error: {reason}. This is a bug; please report it.")]
    InternalError { reason: String },
}

impl TraceError {
    /// Wrap an I/O error with context
    pub fn io(err: std::io::Error) -> Self {
        TraceError::IoError {
            message: err.to_string(),
        }
    }

    /// Returns true if the run can continue after this error
    ///
    /// A dead metadata table or a failed stream write degrades the trace
    /// but does not stop the traced program. Protocol violations and
    /// corrupt metadata are terminal for replay.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            TraceError::TableWriteFailed { .. } | TraceError::IoError { .. }
        )
    }

    /// Returns the error category for grouping
    pub fn category(&self) -> ErrorCategory {
        match self {
            TraceError::TableWriteFailed { .. } | TraceError::CorruptMetadata { .. } => {
                ErrorCategory::Metadata
            }
            TraceError::TruncatedRecord { .. } | TraceError::SeekOutOfRange { .. } => {
                ErrorCategory::Stream
            }
            TraceError::ProtocolViolation { .. } => ErrorCategory::Protocol,
            TraceError::InvalidPattern { .. }
            | TraceError::InvalidDescriptor { .. }
            | TraceError::InvalidEventType { .. } => ErrorCategory::Validation,
            TraceError::JsonError(_) | TraceError::IoError { .. } => ErrorCategory::Stream,
            TraceError::LockPoisoned | TraceError::InternalError { .. } => ErrorCategory::Internal,
        }
    }

    /// Returns the stable error code for this error
    ///
    /// Error codes are uppercase, underscore-separated identifiers that
    /// remain stable across versions. Use these for logging and alerting.
    pub fn error_code(&self) -> &'static str {
        match self {
            TraceError::TableWriteFailed { .. } => "TABLE_WRITE_FAILED",
            TraceError::CorruptMetadata { .. } => "CORRUPT_METADATA",
            TraceError::TruncatedRecord { .. } => "TRUNCATED_RECORD",
            TraceError::SeekOutOfRange { .. } => "SEEK_OUT_OF_RANGE",
            TraceError::ProtocolViolation { .. } => "PROTOCOL_VIOLATION",
            TraceError::InvalidPattern { .. } => "INVALID_PATTERN",
            TraceError::InvalidDescriptor { .. } => "INVALID_DESCRIPTOR",
            TraceError::InvalidEventType { .. } => "INVALID_EVENT_TYPE",
            TraceError::JsonError(_) => "JSON_ERROR",
            TraceError::IoError { .. } => "IO_ERROR",
            TraceError::LockPoisoned => "LOCK_POISONED",
            TraceError::InternalError { .. } => "INTERNAL_ERROR",
        }
    }
}

impl From<std::io::Error> for TraceError {
    fn from(err: std::io::Error) -> Self {
        TraceError::io(err)
    }
}
