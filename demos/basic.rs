use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use stream_notify::{
    DefaultFormatter, DeliveryExecutor, Destination, Dispatcher, DispatcherConfig,
    InMemoryDirectory, InMemoryLedger, Ledger, MessageContent, MessageKind, MessageRef,
    SentMessage, StreamSnapshot, SubChatId, Transport, TransportError,
};

/// Transport that prints instead of talking to a messaging service.
struct StdoutTransport;

#[async_trait]
impl Transport for StdoutTransport {
    async fn send(
        &self,
        chat: &SubChatId,
        content: &MessageContent,
    ) -> Result<SentMessage, TransportError> {
        println!("send to {}:\n{}\n", chat.0, content.text);
        Ok(SentMessage {
            message_id: "m1".to_string(),
            kind: MessageKind::Text,
        })
    }

    async fn edit(
        &self,
        message: &MessageRef,
        content: &MessageContent,
    ) -> Result<(), TransportError> {
        println!("edit {} in {}:\n{}\n", message.message_id, message.chat.0, content.text);
        Ok(())
    }
}

#[tokio::main]
async fn main() {
    let ledger = Arc::new(InMemoryLedger::new());
    let directory = Arc::new(InMemoryDirectory::new());

    directory.insert(Destination::new("chat_42")).await;

    let mut snapshot = StreamSnapshot::new("stream_1", "channel_1");
    snapshot.title = "Marathon run".to_string();
    snapshot.game = "Tetris".to_string();
    snapshot.channel_name = "runner".to_string();
    snapshot.url = "https://example.com/runner".to_string();
    ledger.upsert_snapshot(&snapshot).await;

    let executor = DeliveryExecutor::new(
        ledger.clone(),
        directory.clone(),
        Arc::new(StdoutTransport),
        Arc::new(DefaultFormatter),
    );
    let mut dispatcher = Dispatcher::new(
        DispatcherConfig::default(),
        ledger.clone(),
        directory,
        executor,
    );

    dispatcher
        .enqueue(&snapshot.stream_id, &[Destination::new("chat_42").id])
        .await
        .expect("enqueue");

    tokio::time::sleep(Duration::from_millis(200)).await;
    dispatcher.shutdown().await;
}
