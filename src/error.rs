use std::fmt;

use crate::types::{DestinationId, StreamId};

/// Errors returned when enlisting work fails *before* any delivery begins.
#[derive(Debug, PartialEq, Eq)]
pub enum DispatchError {
    /// Dispatcher has been shut down.
    Shutdown,

    /// No snapshot exists for the stream; a record referencing it would
    /// violate the referential invariant.
    UnknownStream { stream_id: StreamId },
}

impl fmt::Display for DispatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DispatchError::Shutdown =>
                write!(f, "dispatcher is shut down"),
            DispatchError::UnknownStream { stream_id } =>
                write!(f, "no snapshot for stream: {:?}", stream_id),
        }
    }
}

impl std::error::Error for DispatchError {}

/// Error reported by the messaging transport for a send or edit attempt.
///
/// API errors carry the transport's machine-readable status code and its
/// free-text description; the failure classifier pattern-matches the
/// description against known phrases.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    Api { code: i64, description: String },
    Network { detail: String },
    Timeout,
}

impl TransportError {
    pub fn api(code: i64, description: impl Into<String>) -> Self {
        TransportError::Api {
            code,
            description: description.into(),
        }
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Api { code, description } =>
                write!(f, "transport api error {}: {}", code, description),
            TransportError::Network { detail } =>
                write!(f, "network error: {}", detail),
            TransportError::Timeout =>
                write!(f, "request timed out"),
        }
    }
}

impl std::error::Error for TransportError {}

/// Classification of a failed transport operation. Transient, not persisted;
/// carries the original error detail for logging.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureClass {
    /// Retry with backoff; the record survives.
    TransientTransport { detail: String },

    /// The destination can no longer be written to; deregister it and drop
    /// all of its tracking.
    PermanentDestination { detail: String },

    /// The tracked message is gone but the destination is still valid; drop
    /// only this record.
    PermanentMessage { detail: String },

    /// Not classifiable; scheduled like a transient failure but logged
    /// distinctly.
    Unknown { detail: String },
}

impl FailureClass {
    /// The original transport error detail.
    pub fn detail(&self) -> &str {
        match self {
            FailureClass::TransientTransport { detail }
            | FailureClass::PermanentDestination { detail }
            | FailureClass::PermanentMessage { detail }
            | FailureClass::Unknown { detail } => detail,
        }
    }

    /// Short stable label for logs and metrics.
    pub fn as_label(&self) -> &'static str {
        match self {
            FailureClass::TransientTransport { .. } => "transient_transport",
            FailureClass::PermanentDestination { .. } => "permanent_destination",
            FailureClass::PermanentMessage { .. } => "permanent_message",
            FailureClass::Unknown { .. } => "unknown",
        }
    }
}

/// Errors surfaced by the delivery ledger.
///
/// `SnapshotMissing` indicates ledger corruption (a record referencing a
/// nonexistent snapshot, which the cascade invariant forbids) and is treated
/// as a defect, not a transport condition.
#[derive(Debug, PartialEq, Eq)]
pub enum LedgerError {
    SnapshotMissing {
        destination_id: DestinationId,
        stream_id: StreamId,
    },
    Backend { detail: String },
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::SnapshotMissing { destination_id, stream_id } =>
                write!(
                    f,
                    "record {:?}/{:?} references a missing snapshot",
                    destination_id, stream_id
                ),
            LedgerError::Backend { detail } =>
                write!(f, "ledger backend error: {}", detail),
        }
    }
}

impl std::error::Error for LedgerError {}
