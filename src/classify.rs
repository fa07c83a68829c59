//! Failure classification for transport errors.
//!
//! The transport reports API failures as a status code plus a free-text
//! description, so classification pattern-matches the description against
//! known phrases. The phrase tables live only in this module; when the
//! upstream service rewords an error, this is the one place to update.

use crate::error::{FailureClass, TransportError};

/// Descriptions that mean the destination can never be written to again
/// without external reconfiguration.
const DESTINATION_GONE: &[&str] = &[
    "group chat is deactivated",
    "chat not found",
    "channel not found",
    "USER_DEACTIVATED",
    "not enough rights to send photos to the chat",
    "have no rights to send a message",
    "need administrator rights in the channel chat",
    "CHAT_WRITE_FORBIDDEN",
    "CHAT_SEND_MEDIA_FORBIDDEN",
];

const MESSAGE_GONE: &[&str] = &["message to edit not found"];

const NOT_MODIFIED: &[&str] = &["message is not modified"];

const INVALID_TARGET: &[&str] = &["PEER_ID_INVALID"];

/// Map a transport error to its failure classification.
///
/// Deterministic: the same error always classifies the same way.
pub fn classify(err: &TransportError) -> FailureClass {
    match err {
        TransportError::Network { detail } => FailureClass::TransientTransport {
            detail: detail.clone(),
        },
        TransportError::Timeout => FailureClass::TransientTransport {
            detail: "request timed out".to_string(),
        },
        TransportError::Api { code, description } => {
            if *code == 403 || matches_any(description, DESTINATION_GONE) {
                FailureClass::PermanentDestination {
                    detail: description.clone(),
                }
            } else if matches_any(description, MESSAGE_GONE) {
                FailureClass::PermanentMessage {
                    detail: description.clone(),
                }
            } else if *code == 429 {
                // Rate limited: plain transient, the backoff covers it.
                FailureClass::TransientTransport {
                    detail: description.clone(),
                }
            } else {
                FailureClass::Unknown {
                    detail: description.clone(),
                }
            }
        }
    }
}

/// An edit that changed nothing. Success, not a failure.
pub fn is_not_modified(err: &TransportError) -> bool {
    matches!(err, TransportError::Api { description, .. } if matches_any(description, NOT_MODIFIED))
}

/// An invalid routing target that is not cleanly destination-permanent.
/// Scheduled with the escalated backoff rather than removed outright.
pub fn is_invalid_target(err: &TransportError) -> bool {
    matches!(err, TransportError::Api { description, .. } if matches_any(description, INVALID_TARGET))
}

fn matches_any(description: &str, phrases: &[&str]) -> bool {
    phrases.iter().any(|phrase| description.contains(phrase))
}
