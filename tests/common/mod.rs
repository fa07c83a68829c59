#![allow(dead_code)]

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;

use stream_notify::{
    AnalyticsSink, CleanupQueue, DestinationId, MessageContent, MessageKind, MessageRef,
    SentMessage, StreamId, StreamSnapshot, SubChatId, Transport, TransportError,
};

/// Scripted transport double. Succeeds unless a failure was queued; records
/// every attempt and watches for concurrency violations.
#[derive(Default)]
pub struct FakeTransport {
    send_results: Mutex<VecDeque<Result<(), TransportError>>>,
    send_results_by_chat: Mutex<HashMap<String, VecDeque<Result<(), TransportError>>>>,
    edit_results: Mutex<VecDeque<Result<(), TransportError>>>,
    pub sends: Mutex<Vec<(SubChatId, MessageContent)>>,
    pub edits: Mutex<Vec<(MessageRef, MessageContent)>>,
    next_id: AtomicUsize,
    delay_ms: u64,

    current: AtomicUsize,
    max_seen: AtomicUsize,
    active_chats: Mutex<HashSet<String>>,
    overlap: AtomicBool,
}

impl FakeTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every operation take `delay_ms` so tests can observe in-flight
    /// state.
    pub fn with_delay_ms(mut self, delay_ms: u64) -> Self {
        self.delay_ms = delay_ms;
        self
    }

    pub async fn fail_next_send(&self, err: TransportError) {
        self.send_results.lock().await.push_back(Err(err));
    }

    /// Queue a failure for the next send into one specific chat, leaving
    /// sends to other chats untouched.
    pub async fn fail_next_send_to(&self, chat: &str, err: TransportError) {
        self.send_results_by_chat
            .lock()
            .await
            .entry(chat.to_string())
            .or_default()
            .push_back(Err(err));
    }

    pub async fn fail_next_edit(&self, err: TransportError) {
        self.edit_results.lock().await.push_back(Err(err));
    }

    pub async fn send_count(&self) -> usize {
        self.sends.lock().await.len()
    }

    pub async fn edit_count(&self) -> usize {
        self.edits.lock().await.len()
    }

    /// Highest number of concurrently running operations observed.
    pub fn max_concurrency_seen(&self) -> usize {
        self.max_seen.load(Ordering::SeqCst)
    }

    /// Whether two operations ever ran concurrently against the same chat.
    pub fn saw_chat_overlap(&self) -> bool {
        self.overlap.load(Ordering::SeqCst)
    }

    async fn enter(&self, chat: &SubChatId) {
        let current = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_seen.fetch_max(current, Ordering::SeqCst);
        if !self.active_chats.lock().await.insert(chat.0.clone()) {
            self.overlap.store(true, Ordering::SeqCst);
        }
    }

    async fn exit(&self, chat: &SubChatId) {
        self.active_chats.lock().await.remove(&chat.0);
        self.current.fetch_sub(1, Ordering::SeqCst);
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn send(
        &self,
        chat: &SubChatId,
        content: &MessageContent,
    ) -> Result<SentMessage, TransportError> {
        self.enter(chat).await;
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        self.sends.lock().await.push((chat.clone(), content.clone()));
        let scripted = {
            let mut by_chat = self.send_results_by_chat.lock().await;
            match by_chat.get_mut(&chat.0).and_then(|queue| queue.pop_front()) {
                Some(result) => Some(result),
                None => self.send_results.lock().await.pop_front(),
            }
        };
        self.exit(chat).await;

        match scripted {
            Some(Err(err)) => Err(err),
            _ => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
                let kind = if content.image_id.is_some() {
                    MessageKind::Media
                } else {
                    MessageKind::Text
                };
                Ok(SentMessage {
                    message_id: format!("m{}", id),
                    kind,
                })
            }
        }
    }

    async fn edit(
        &self,
        message: &MessageRef,
        content: &MessageContent,
    ) -> Result<(), TransportError> {
        self.enter(&message.chat).await;
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        self.edits
            .lock()
            .await
            .push((message.clone(), content.clone()));
        let scripted = self.edit_results.lock().await.pop_front();
        self.exit(&message.chat).await;

        match scripted {
            Some(Err(err)) => Err(err),
            _ => Ok(()),
        }
    }
}

/// Cleanup queue double that remembers every registration.
#[derive(Default)]
pub struct RecordingCleanup {
    pub entries: Mutex<Vec<(DestinationId, StreamId, SubChatId, String)>>,
}

#[async_trait]
impl CleanupQueue for RecordingCleanup {
    async fn schedule_delete(
        &self,
        destination_id: &DestinationId,
        stream_id: &StreamId,
        chat: &SubChatId,
        message_id: &str,
    ) {
        self.entries.lock().await.push((
            destination_id.clone(),
            stream_id.clone(),
            chat.clone(),
            message_id.to_string(),
        ));
    }
}

/// Analytics double that remembers every event.
#[derive(Default)]
pub struct RecordingAnalytics {
    pub events: Mutex<Vec<(SubChatId, String, String, String)>>,
}

#[async_trait]
impl AnalyticsSink for RecordingAnalytics {
    async fn record(&self, chat: &SubChatId, category: &str, action: &str, label: &str) {
        self.events.lock().await.push((
            chat.clone(),
            category.to_string(),
            action.to_string(),
            label.to_string(),
        ));
    }
}

pub fn snapshot(stream: &str, channel: &str) -> StreamSnapshot {
    let mut s = StreamSnapshot::new(stream, channel);
    s.title = format!("{} is live", channel);
    s.channel_name = channel.to_string();
    s.url = format!("https://example.com/{}", channel);
    s
}
