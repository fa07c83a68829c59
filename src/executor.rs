//! The delivery executor: one Send or Update per invocation.
//!
//! Every failure is resolved here, into one of four next ledger states:
//! keep and track, resolve (delete), deregister the destination, or retry
//! after a backoff. Nothing propagates to the dispatcher; it only ever
//! observes that the operation completed.

use std::sync::Arc;
use std::time::Duration;

use crate::analytics::{AnalyticsSink, NoopAnalytics};
use crate::backoff::RetryPolicy;
use crate::classify::{classify, is_invalid_target, is_not_modified};
use crate::cleanup::{CleanupQueue, NoopCleanup};
use crate::directory::ChatDirectory;
use crate::error::FailureClass;
use crate::format::Formatter;
use crate::ledger::Ledger;
use crate::transport::Transport;
use crate::types::{
    unix_now, DeliveryRecord, Destination, DueDelivery, MessageContent, MessageKind, MessageRef,
    StreamSnapshot, TargetKind,
};

#[cfg(feature = "metrics")]
fn metric_inc(name: &'static str) {
    metrics::increment_counter!(name);
}

#[cfg(not(feature = "metrics"))]
fn metric_inc(_name: &'static str) {}

#[cfg(feature = "tracing")]
fn trace_failure(stage: &'static str, class: &'static str, detail: &str) {
    tracing::warn!(stage, class, detail, "delivery attempt failed");
}

#[cfg(not(feature = "tracing"))]
fn trace_failure(_stage: &'static str, _class: &'static str, _detail: &str) {}

#[cfg(feature = "tracing")]
fn trace_unclassified(detail: &str) {
    tracing::error!(detail, "unclassified transport failure");
}

#[cfg(not(feature = "tracing"))]
fn trace_unclassified(_detail: &str) {}

/// Next ledger state computed from one delivery attempt.
enum Outcome {
    /// Keep the record, tracking this message; eligibility resets to the
    /// update cadence.
    Tracked(MessageRef),
    /// The obligation is fully resolved; delete the record.
    Resolved,
    /// The destination is permanently unwritable; deregister it and drop
    /// all of its tracking.
    DestinationGone(String),
    /// Transient or unclassified failure; keep the record and retry later.
    RetryAfter(Duration, FailureClass),
}

pub struct DeliveryExecutor {
    ledger: Arc<dyn Ledger>,
    directory: Arc<dyn ChatDirectory>,
    transport: Arc<dyn Transport>,
    formatter: Arc<dyn Formatter>,
    analytics: Arc<dyn AnalyticsSink>,
    cleanup: Arc<dyn CleanupQueue>,
    policy: RetryPolicy,
}

impl DeliveryExecutor {
    pub fn new(
        ledger: Arc<dyn Ledger>,
        directory: Arc<dyn ChatDirectory>,
        transport: Arc<dyn Transport>,
        formatter: Arc<dyn Formatter>,
    ) -> Self {
        Self {
            ledger,
            directory,
            transport,
            formatter,
            analytics: Arc::new(NoopAnalytics),
            cleanup: Arc::new(NoopCleanup),
            policy: RetryPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_analytics(mut self, analytics: Arc<dyn AnalyticsSink>) -> Self {
        self.analytics = analytics;
        self
    }

    pub fn with_cleanup(mut self, cleanup: Arc<dyn CleanupQueue>) -> Self {
        self.cleanup = cleanup;
        self
    }

    /// Perform one Send or Update for a due record and write the resulting
    /// ledger state. Never fails from the caller's perspective.
    pub async fn process(&self, due: DueDelivery) {
        let now = unix_now();

        // The scheduler's copy may be stale: the pair can complete between
        // the due scan and this dispatch. Re-read the authoritative record
        // and drop the dispatch if it is gone or no longer due.
        let Some(mut record) = self
            .ledger
            .record(&due.record.destination_id, &due.record.stream_id)
            .await
        else {
            return;
        };
        if record.eligible_at > now {
            return;
        }

        // Advance eligibility before attempting, so a process crash
        // mid-attempt self-heals once this timestamp passes.
        record.eligible_at = now + self.policy.update_interval.as_secs();
        self.ledger.upsert_record(&record).await;

        let outcome = match record.message_ref.clone() {
            Some(message_ref) => self.update(&due, &message_ref).await,
            None => self.send(&due).await,
        };
        self.apply(record, outcome).await;
    }

    /// First delivery for a record: fan out to the destination's targets.
    ///
    /// The retained message reference is the first successful send in
    /// target order, so future edits go to the chat's message, or the
    /// channel's when the chat was skipped.
    async fn send(&self, due: &DueDelivery) -> Outcome {
        let snapshot = &due.snapshot;
        let destination = &due.destination;

        if snapshot.is_record && !destination.allow_records {
            return Outcome::Resolved;
        }

        let content = self.render(snapshot, destination);
        let mut primary: Option<MessageRef> = None;

        for target in destination.delivery_targets() {
            match self.transport.send(&target.chat, &content).await {
                Ok(sent) => {
                    let action = match sent.kind {
                        MessageKind::Media => "sendPhoto",
                        MessageKind::Text => "sendMsg",
                    };
                    self.analytics
                        .record(&target.chat, "bot", action, &snapshot.channel_id.0)
                        .await;
                    if destination.auto_clean {
                        self.cleanup
                            .schedule_delete(
                                &destination.id,
                                &snapshot.stream_id,
                                &target.chat,
                                &sent.message_id,
                            )
                            .await;
                    }
                    if primary.is_none() {
                        primary = Some(MessageRef {
                            message_id: sent.message_id,
                            chat: target.chat.clone(),
                            kind: sent.kind,
                        });
                    }
                    metric_inc("notify.send.ok");
                }
                Err(err) => {
                    metric_inc("notify.send.failed");
                    match classify(&err) {
                        FailureClass::PermanentDestination { detail } => {
                            if target.kind == TargetKind::Channel {
                                // Only the mirrored channel is gone; unlink it
                                // and keep the chat delivery.
                                self.directory
                                    .detach_channel(&destination.id, &detail)
                                    .await;
                            } else {
                                return Outcome::DestinationGone(detail);
                            }
                        }
                        FailureClass::PermanentMessage { .. } => {
                            if primary.is_none() {
                                return Outcome::Resolved;
                            }
                        }
                        class @ (FailureClass::TransientTransport { .. }
                        | FailureClass::Unknown { .. }) => {
                            if primary.is_none() {
                                let delay = self.policy.backoff(&class, is_invalid_target(&err));
                                return Outcome::RetryAfter(delay, class);
                            }
                            // The chat message is committed; re-dispatching the
                            // record would duplicate it. The channel misses
                            // this stream.
                            trace_failure("send", class.as_label(), class.detail());
                        }
                    }
                }
            }
        }

        match primary {
            Some(message_ref) => Outcome::Tracked(message_ref),
            None => Outcome::Resolved,
        }
    }

    /// Re-render and edit the tracked message in place.
    async fn update(&self, due: &DueDelivery, message_ref: &MessageRef) -> Outcome {
        let snapshot = &due.snapshot;
        let content = self.render(snapshot, &due.destination);

        match self.transport.edit(message_ref, &content).await {
            Ok(()) => {
                let action = match message_ref.kind {
                    MessageKind::Media => "updatePhoto",
                    MessageKind::Text => "updateText",
                };
                self.analytics
                    .record(&message_ref.chat, "bot", action, &snapshot.channel_id.0)
                    .await;
                metric_inc("notify.update.ok");
                Outcome::Tracked(message_ref.clone())
            }
            Err(err) => {
                if is_not_modified(&err) {
                    return Outcome::Tracked(message_ref.clone());
                }
                metric_inc("notify.update.failed");
                match classify(&err) {
                    FailureClass::PermanentMessage { .. } => Outcome::Resolved,
                    FailureClass::PermanentDestination { detail } => {
                        Outcome::DestinationGone(detail)
                    }
                    class @ (FailureClass::TransientTransport { .. }
                    | FailureClass::Unknown { .. }) => {
                        let delay = self.policy.backoff(&class, is_invalid_target(&err));
                        Outcome::RetryAfter(delay, class)
                    }
                }
            }
        }
    }

    fn render(&self, snapshot: &StreamSnapshot, destination: &Destination) -> MessageContent {
        let caption = if destination.hide_preview {
            String::new()
        } else {
            self.formatter.render_short(snapshot)
        };
        MessageContent {
            text: self.formatter.render_long(snapshot),
            caption,
            image_id: snapshot.image_id.clone(),
        }
    }

    async fn apply(&self, mut record: DeliveryRecord, outcome: Outcome) {
        let now = unix_now();
        match outcome {
            Outcome::Tracked(message_ref) => {
                record.message_ref = Some(message_ref);
                record.eligible_at = now + self.policy.update_interval.as_secs();
                self.ledger.upsert_record(&record).await;
            }
            Outcome::Resolved => {
                self.ledger
                    .remove_record(&record.destination_id, &record.stream_id)
                    .await;
                metric_inc("notify.record.resolved");
            }
            Outcome::DestinationGone(reason) => {
                self.directory
                    .deregister(&record.destination_id, &reason)
                    .await;
                self.ledger
                    .remove_destination_records(&record.destination_id)
                    .await;
                metric_inc("notify.destination.deregistered");
                trace_failure("deliver", "permanent_destination", &reason);
            }
            Outcome::RetryAfter(delay, class) => {
                record.eligible_at = now + delay.as_secs();
                self.ledger.upsert_record(&record).await;
                metric_inc("notify.retry.scheduled");
                match class {
                    FailureClass::Unknown { detail } => trace_unclassified(&detail),
                    other => trace_failure("deliver", other.as_label(), other.detail()),
                }
            }
        }
    }
}
