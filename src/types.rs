use serde::{Deserialize, Serialize};

/// Unique identifier for a delivery destination (a chat and its configuration).
///
/// This is a strongly-typed wrapper to avoid accidental mixing
/// of destination ids with other string identifiers.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DestinationId(pub String);

/// Unique identifier for a tracked live stream.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamId(pub String);

/// Identifier of the source channel a stream belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChannelId(pub String);

/// Transport-level address of a single chat or channel a message is sent into.
///
/// A destination resolves to one or two of these (the direct chat and an
/// optional mirrored channel).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubChatId(pub String);

/// Where to deliver live-stream notifications.
///
/// A `Destination` describes one subscribed chat plus its delivery flags.
/// It is a pure configuration object owned by the chat-configuration
/// subsystem; the core reads it and never mutates it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Destination {
    /// Logical identifier; doubles as the direct chat's address.
    pub id: DestinationId,

    /// Mirrored channel, if the chat has one linked.
    pub channel: Option<SubChatId>,

    /// Deliver only to the linked channel, skipping the direct chat.
    /// Has no effect when no channel is configured.
    pub mute: bool,

    /// Send notifications without the media preview caption.
    pub hide_preview: bool,

    /// Register sent messages for later deletion.
    pub auto_clean: bool,

    /// Also notify for video-on-demand (record) streams.
    pub allow_records: bool,
}

impl Destination {
    /// Create a destination with default flags (everything off).
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: DestinationId(id.into()),
            channel: None,
            mute: false,
            hide_preview: false,
            auto_clean: false,
            allow_records: false,
        }
    }

    /// Link a mirrored channel.
    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(SubChatId(channel.into()));
        self
    }

    /// Skip the direct chat and deliver only to the linked channel.
    pub fn with_mute(mut self, mute: bool) -> Self {
        self.mute = mute;
        self
    }

    /// Hide the media preview caption.
    pub fn with_hide_preview(mut self, hide: bool) -> Self {
        self.hide_preview = hide;
        self
    }

    /// Register sent messages for later deletion.
    pub fn with_auto_clean(mut self, clean: bool) -> Self {
        self.auto_clean = clean;
        self
    }

    /// Also notify for video-on-demand streams.
    pub fn with_allow_records(mut self, allow: bool) -> Self {
        self.allow_records = allow;
        self
    }

    /// Sub-chats a Send fans out to, in priority order: the direct chat
    /// first, then the mirrored channel. The chat is dropped when `mute` is
    /// set and a channel exists.
    pub fn delivery_targets(&self) -> Vec<DeliveryTarget> {
        let mut targets = vec![DeliveryTarget {
            chat: SubChatId(self.id.0.clone()),
            kind: TargetKind::Chat,
        }];
        if let Some(channel) = &self.channel {
            targets.push(DeliveryTarget {
                chat: channel.clone(),
                kind: TargetKind::Channel,
            });
            if self.mute {
                targets.remove(0);
            }
        }
        targets
    }
}

/// One sub-chat a Send operation addresses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeliveryTarget {
    pub chat: SubChatId,
    pub kind: TargetKind,
}

/// Whether a delivery target is the direct chat or the mirrored channel.
///
/// Failure handling differs: a permanently failed channel is detached, a
/// permanently failed chat deregisters the whole destination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Chat,
    Channel,
}

/// Latest known facts about one live stream.
///
/// Written by the upstream poller, read-only to the dispatch engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StreamSnapshot {
    pub stream_id: StreamId,
    pub channel_id: ChannelId,

    /// Stream has gone offline but is still within the removal grace window.
    pub is_offline: bool,
    /// Stream state could not be confirmed on the last poll.
    pub is_timeout: bool,
    /// Stream is a video-on-demand recording, not a live broadcast.
    pub is_record: bool,

    pub title: String,
    pub game: String,
    pub channel_name: String,
    pub url: String,
    pub viewers: Option<u64>,

    /// Transport media handle for the preview image, once uploaded.
    pub image_id: Option<String>,
}

impl StreamSnapshot {
    pub fn new(stream_id: impl Into<String>, channel_id: impl Into<String>) -> Self {
        Self {
            stream_id: StreamId(stream_id.into()),
            channel_id: ChannelId(channel_id.into()),
            is_offline: false,
            is_timeout: false,
            is_record: false,
            title: String::new(),
            game: String::new(),
            channel_name: String::new(),
            url: String::new(),
            viewers: None,
            image_id: None,
        }
    }
}

/// Form a previously sent message took.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessageKind {
    Text,
    Media,
}

/// Opaque reference to a sent message, enough to edit it later.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageRef {
    pub message_id: String,
    /// The sub-chat the message was sent into (chat or channel).
    pub chat: SubChatId,
    pub kind: MessageKind,
}

/// Rendered message content handed to the transport.
///
/// The transport sends a media message when `image_id` is present and falls
/// back to text otherwise; the caption accompanies the media form.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageContent {
    pub text: String,
    pub caption: String,
    pub image_id: Option<String>,
}

/// What the transport reports back after a successful send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub message_id: String,
    pub kind: MessageKind,
}

/// The durable obligation to deliver and maintain one message for one
/// (destination, stream) pair. Exactly one exists per pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub destination_id: DestinationId,
    pub stream_id: StreamId,

    /// Absent until the first successful send.
    pub message_ref: Option<MessageRef>,

    /// Earliest unix timestamp (seconds) at which the record may be
    /// processed again.
    pub eligible_at: u64,
}

impl DeliveryRecord {
    /// A fresh obligation: nothing sent yet, eligible at `eligible_at`.
    pub fn new(destination_id: DestinationId, stream_id: StreamId, eligible_at: u64) -> Self {
        Self {
            destination_id,
            stream_id,
            message_ref: None,
            eligible_at,
        }
    }
}

/// A due record joined with its stream snapshot, as returned by the ledger.
#[derive(Debug, Clone)]
pub struct DueRecord {
    pub record: DeliveryRecord,
    pub snapshot: StreamSnapshot,
}

/// A due record fully joined for the executor: record, snapshot and the
/// destination's current configuration.
#[derive(Debug, Clone)]
pub struct DueDelivery {
    pub record: DeliveryRecord,
    pub snapshot: StreamSnapshot,
    pub destination: Destination,
}

/// Current unix time in whole seconds.
pub fn unix_now() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
