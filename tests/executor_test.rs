mod common;

use std::sync::Arc;

use common::{snapshot, FakeTransport, RecordingAnalytics, RecordingCleanup};
use stream_notify::{
    unix_now, ChatDirectory, DefaultFormatter, DeliveryExecutor, Destination, DestinationId,
    DueDelivery, InMemoryDirectory, InMemoryLedger, Ledger, MessageKind, MessageRef, StreamId,
    SubChatId, TransportError,
};

struct Harness {
    ledger: Arc<InMemoryLedger>,
    directory: Arc<InMemoryDirectory>,
    transport: Arc<FakeTransport>,
    executor: DeliveryExecutor,
}

fn harness(transport: FakeTransport) -> Harness {
    let ledger = Arc::new(InMemoryLedger::new());
    let directory = Arc::new(InMemoryDirectory::new());
    let transport = Arc::new(transport);
    let executor = DeliveryExecutor::new(
        ledger.clone(),
        directory.clone(),
        transport.clone(),
        Arc::new(DefaultFormatter),
    );
    Harness {
        ledger,
        directory,
        transport,
        executor,
    }
}

fn dest_id(id: &str) -> DestinationId {
    DestinationId(id.to_string())
}

fn stream_id(id: &str) -> StreamId {
    StreamId(id.to_string())
}

/// Seed one snapshot, one destination and one fresh record; return the due
/// delivery ready to hand to the executor.
async fn seed(h: &Harness, destination: Destination, stream: &str) -> DueDelivery {
    let snap = snapshot(stream, "chan-src");
    h.ledger.upsert_snapshot(&snap).await;
    h.directory.insert(destination.clone()).await;
    h.ledger
        .create_record_if_absent(&destination.id, &snap.stream_id, unix_now())
        .await;
    let record = h
        .ledger
        .record(&destination.id, &snap.stream_id)
        .await
        .unwrap();
    DueDelivery {
        record,
        snapshot: snap,
        destination,
    }
}

#[tokio::test]
async fn send_ok_tracks_message_and_resets_eligibility() {
    let h = harness(FakeTransport::new());
    let due = seed(&h, Destination::new("chat1"), "s1").await;

    let before = unix_now();
    h.executor.process(due).await;
    let after = unix_now();

    let record = h.ledger.record(&dest_id("chat1"), &stream_id("s1")).await.unwrap();
    let message_ref = record.message_ref.expect("message tracked after send");
    assert_eq!(message_ref.chat, SubChatId("chat1".into()));
    assert_eq!(message_ref.kind, MessageKind::Text);
    assert!(record.eligible_at >= before + 300);
    assert!(record.eligible_at <= after + 300);
    assert_eq!(h.transport.send_count().await, 1);
}

#[tokio::test]
async fn send_transient_failure_keeps_new_record_with_backoff() {
    let h = harness(FakeTransport::new());
    h.transport
        .fail_next_send(TransportError::Timeout)
        .await;
    let due = seed(&h, Destination::new("chat1"), "s1").await;
    let old_eligible = due.record.eligible_at;

    let before = unix_now();
    h.executor.process(due).await;
    let after = unix_now();

    let record = h.ledger.record(&dest_id("chat1"), &stream_id("s1")).await.unwrap();
    assert!(record.message_ref.is_none(), "record stays untracked");
    assert!(record.eligible_at >= old_eligible + 300);
    assert!(record.eligible_at >= before + 300);
    assert!(record.eligible_at <= after + 300);
    assert!(h.directory.destination(&dest_id("chat1")).await.is_some());
}

#[tokio::test]
async fn send_blocked_deregisters_destination() {
    let h = harness(FakeTransport::new());
    h.transport
        .fail_next_send(TransportError::api(403, "Forbidden: bot was blocked by the user"))
        .await;
    let due = seed(&h, Destination::new("chat1"), "s1").await;
    // A second obligation for the same destination must go away with it.
    h.ledger.upsert_snapshot(&snapshot("s2", "other")).await;
    h.ledger
        .create_record_if_absent(&dest_id("chat1"), &stream_id("s2"), 0)
        .await;

    h.executor.process(due).await;

    assert!(h.ledger.record(&dest_id("chat1"), &stream_id("s1")).await.is_none());
    assert!(h.ledger.record(&dest_id("chat1"), &stream_id("s2")).await.is_none());
    assert!(h.directory.destination(&dest_id("chat1")).await.is_none());
    let removed = h.directory.removed().await;
    assert_eq!(removed.len(), 1);
    assert_eq!(removed[0].0, dest_id("chat1"));
}

#[tokio::test]
async fn update_ok_resets_eligibility() {
    let h = harness(FakeTransport::new());
    let mut due = seed(&h, Destination::new("chat1"), "s1").await;
    due.record.message_ref = Some(MessageRef {
        message_id: "m1".into(),
        chat: SubChatId("chat1".into()),
        kind: MessageKind::Text,
    });
    h.ledger.upsert_record(&due.record).await;

    let before = unix_now();
    h.executor.process(due).await;

    let record = h.ledger.record(&dest_id("chat1"), &stream_id("s1")).await.unwrap();
    assert!(record.message_ref.is_some());
    assert!(record.eligible_at >= before + 300);
    assert_eq!(h.transport.edit_count().await, 1);
    assert_eq!(h.transport.send_count().await, 0);
}

#[tokio::test]
async fn update_blocked_deregisters_destination() {
    let h = harness(FakeTransport::new());
    h.transport
        .fail_next_edit(TransportError::api(403, "Forbidden: bot was blocked by the user"))
        .await;
    let mut due = seed(&h, Destination::new("chat1"), "s1").await;
    due.record.message_ref = Some(MessageRef {
        message_id: "m1".into(),
        chat: SubChatId("chat1".into()),
        kind: MessageKind::Text,
    });
    h.ledger.upsert_record(&due.record).await;

    h.executor.process(due).await;

    assert!(h.ledger.record(&dest_id("chat1"), &stream_id("s1")).await.is_none());
    assert!(h.directory.destination(&dest_id("chat1")).await.is_none());
}

#[tokio::test]
async fn update_message_gone_drops_record_but_keeps_destination() {
    let h = harness(FakeTransport::new());
    h.transport
        .fail_next_edit(TransportError::api(400, "Bad Request: message to edit not found"))
        .await;
    let mut due = seed(&h, Destination::new("chat1"), "s1").await;
    due.record.message_ref = Some(MessageRef {
        message_id: "m1".into(),
        chat: SubChatId("chat1".into()),
        kind: MessageKind::Text,
    });
    h.ledger.upsert_record(&due.record).await;

    h.executor.process(due).await;

    assert!(h.ledger.record(&dest_id("chat1"), &stream_id("s1")).await.is_none());
    assert!(h.directory.destination(&dest_id("chat1")).await.is_some());
    assert!(h.directory.removed().await.is_empty());

    // A later stream obligates the same destination again from scratch.
    h.ledger.upsert_snapshot(&snapshot("s2", "other")).await;
    assert!(
        h.ledger
            .create_record_if_absent(&dest_id("chat1"), &stream_id("s2"), unix_now())
            .await
    );
}

#[tokio::test]
async fn update_not_modified_is_success() {
    let h = harness(FakeTransport::new());
    h.transport
        .fail_next_edit(TransportError::api(400, "Bad Request: message is not modified"))
        .await;
    let mut due = seed(&h, Destination::new("chat1"), "s1").await;
    due.record.message_ref = Some(MessageRef {
        message_id: "m1".into(),
        chat: SubChatId("chat1".into()),
        kind: MessageKind::Text,
    });
    h.ledger.upsert_record(&due.record).await;

    let before = unix_now();
    h.executor.process(due).await;

    let record = h.ledger.record(&dest_id("chat1"), &stream_id("s1")).await.unwrap();
    assert!(record.message_ref.is_some(), "record still tracked");
    assert!(record.eligible_at >= before + 300);
    assert!(h.directory.destination(&dest_id("chat1")).await.is_some());
}

#[tokio::test]
async fn invalid_target_uses_escalated_backoff() {
    let h = harness(FakeTransport::new());
    h.transport
        .fail_next_send(TransportError::api(400, "Bad Request: PEER_ID_INVALID"))
        .await;
    let due = seed(&h, Destination::new("chat1"), "s1").await;

    let before = unix_now();
    h.executor.process(due).await;

    let record = h.ledger.record(&dest_id("chat1"), &stream_id("s1")).await.unwrap();
    assert!(record.eligible_at >= before + 6 * 60 * 60);
    assert!(h.directory.destination(&dest_id("chat1")).await.is_some());
}

#[tokio::test]
async fn record_stream_skipped_unless_allowed() {
    let h = harness(FakeTransport::new());
    let mut due = seed(&h, Destination::new("chat1"), "s1").await;
    due.snapshot.is_record = true;

    h.executor.process(due).await;

    assert!(h.ledger.record(&dest_id("chat1"), &stream_id("s1")).await.is_none());
    assert_eq!(h.transport.send_count().await, 0);
}

#[tokio::test]
async fn record_stream_sent_when_allowed() {
    let h = harness(FakeTransport::new());
    let mut due = seed(
        &h,
        Destination::new("chat1").with_allow_records(true),
        "s1",
    )
    .await;
    due.snapshot.is_record = true;

    h.executor.process(due).await;

    assert_eq!(h.transport.send_count().await, 1);
    assert!(h.ledger.record(&dest_id("chat1"), &stream_id("s1")).await.is_some());
}

#[tokio::test]
async fn channel_receives_copy_after_chat() {
    let h = harness(FakeTransport::new());
    let due = seed(
        &h,
        Destination::new("chat1").with_channel("chan1"),
        "s1",
    )
    .await;

    h.executor.process(due).await;

    let sends = h.transport.sends.lock().await;
    assert_eq!(sends.len(), 2);
    assert_eq!(sends[0].0, SubChatId("chat1".into()));
    assert_eq!(sends[1].0, SubChatId("chan1".into()));
    drop(sends);

    // The chat's message is the one tracked for future edits.
    let record = h.ledger.record(&dest_id("chat1"), &stream_id("s1")).await.unwrap();
    assert_eq!(record.message_ref.unwrap().chat, SubChatId("chat1".into()));
}

#[tokio::test]
async fn muted_chat_delivers_only_to_channel() {
    let h = harness(FakeTransport::new());
    let due = seed(
        &h,
        Destination::new("chat1").with_channel("chan1").with_mute(true),
        "s1",
    )
    .await;

    h.executor.process(due).await;

    let sends = h.transport.sends.lock().await;
    assert_eq!(sends.len(), 1);
    assert_eq!(sends[0].0, SubChatId("chan1".into()));
    drop(sends);

    let record = h.ledger.record(&dest_id("chat1"), &stream_id("s1")).await.unwrap();
    assert_eq!(record.message_ref.unwrap().chat, SubChatId("chan1".into()));
}

#[tokio::test]
async fn dead_channel_detached_chat_message_kept() {
    let h = harness(FakeTransport::new());
    let due = seed(
        &h,
        Destination::new("chat1").with_channel("chan1"),
        "s1",
    )
    .await;
    h.transport
        .fail_next_send_to("chan1", TransportError::api(400, "Bad Request: channel not found"))
        .await;

    h.executor.process(due).await;

    // Chat message committed and tracked; the dead channel is unlinked but
    // the destination itself survives.
    let record = h.ledger.record(&dest_id("chat1"), &stream_id("s1")).await.unwrap();
    assert_eq!(record.message_ref.unwrap().chat, SubChatId("chat1".into()));
    let destination = h.directory.destination(&dest_id("chat1")).await.unwrap();
    assert!(destination.channel.is_none());
    assert!(h.directory.removed().await.is_empty());
}

#[tokio::test]
async fn dead_channel_with_muted_chat_resolves_record() {
    let h = harness(FakeTransport::new());
    let due = seed(
        &h,
        Destination::new("chat1").with_channel("chan1").with_mute(true),
        "s1",
    )
    .await;
    h.transport
        .fail_next_send_to("chan1", TransportError::api(400, "Bad Request: channel not found"))
        .await;

    h.executor.process(due).await;

    // Nothing was sent and nothing will be: the channel is gone and the
    // chat is muted. The obligation resolves without deregistration.
    assert!(h.ledger.record(&dest_id("chat1"), &stream_id("s1")).await.is_none());
    let destination = h.directory.destination(&dest_id("chat1")).await.unwrap();
    assert!(destination.channel.is_none());
    assert!(h.directory.removed().await.is_empty());
}

#[tokio::test]
async fn auto_clean_registers_sent_messages() {
    let ledger = Arc::new(InMemoryLedger::new());
    let directory = Arc::new(InMemoryDirectory::new());
    let transport = Arc::new(FakeTransport::new());
    let cleanup = Arc::new(RecordingCleanup::default());
    let analytics = Arc::new(RecordingAnalytics::default());
    let executor = DeliveryExecutor::new(
        ledger.clone(),
        directory.clone(),
        transport.clone(),
        Arc::new(DefaultFormatter),
    )
    .with_cleanup(cleanup.clone())
    .with_analytics(analytics.clone());

    let destination = Destination::new("chat1").with_auto_clean(true);
    let snap = snapshot("s1", "chan-src");
    ledger.upsert_snapshot(&snap).await;
    directory.insert(destination.clone()).await;
    ledger
        .create_record_if_absent(&destination.id, &snap.stream_id, unix_now())
        .await;
    let record = ledger.record(&destination.id, &snap.stream_id).await.unwrap();

    executor
        .process(DueDelivery {
            record,
            snapshot: snap,
            destination,
        })
        .await;

    let entries = cleanup.entries.lock().await;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].0, dest_id("chat1"));

    let events = analytics.events.lock().await;
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].1, "bot");
    assert_eq!(events[0].2, "sendMsg");
    assert_eq!(events[0].3, "chan-src");
}

#[tokio::test]
async fn snapshot_deletion_cascades_without_transport_calls() {
    let h = harness(FakeTransport::new());
    let due = seed(&h, Destination::new("chat1"), "s1").await;
    drop(due);

    h.ledger.remove_snapshot(&stream_id("s1")).await;

    assert!(h.ledger.record(&dest_id("chat1"), &stream_id("s1")).await.is_none());
    assert!(h.ledger.due_records(unix_now() + 10, 10).await.unwrap().is_empty());
    assert_eq!(h.transport.send_count().await, 0);
    assert_eq!(h.transport.edit_count().await, 0);
}
