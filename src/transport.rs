//! The messaging transport seam.
//!
//! The engine never talks to a concrete messaging service; embedders
//! implement [`Transport`] over their client of choice. The transport
//! decides the message form: media when the content carries an image
//! handle, text otherwise, and reports which form it used so the engine
//! can edit the message later.

use async_trait::async_trait;

use crate::error::TransportError;
use crate::types::{MessageContent, MessageRef, SentMessage, SubChatId};

#[async_trait]
pub trait Transport: Send + Sync {
    /// Deliver a new message into one sub-chat.
    async fn send(
        &self,
        chat: &SubChatId,
        content: &MessageContent,
    ) -> Result<SentMessage, TransportError>;

    /// Edit a previously sent message in place.
    async fn edit(
        &self,
        message: &MessageRef,
        content: &MessageContent,
    ) -> Result<(), TransportError>;
}
