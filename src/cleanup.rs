//! Auto-clean registration.
//!
//! Destinations with `auto_clean` set want notification messages deleted
//! once the stream ends. The engine only *registers* sent messages here;
//! the surrounding system owns the deletion schedule. Fire-and-forget: the
//! registration must never fail into the delivery path.

use async_trait::async_trait;

use crate::types::{DestinationId, StreamId, SubChatId};

#[async_trait]
pub trait CleanupQueue: Send + Sync {
    async fn schedule_delete(
        &self,
        destination_id: &DestinationId,
        stream_id: &StreamId,
        chat: &SubChatId,
        message_id: &str,
    );
}

/// Discards registrations. The default when no cleanup system is wired in.
#[derive(Debug, Default, Clone)]
pub struct NoopCleanup;

#[async_trait]
impl CleanupQueue for NoopCleanup {
    async fn schedule_delete(
        &self,
        _destination_id: &DestinationId,
        _stream_id: &StreamId,
        _chat: &SubChatId,
        _message_id: &str,
    ) {
    }
}
