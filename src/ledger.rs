//! The delivery ledger: durable repository of delivery obligations and the
//! stream snapshots they reference.
//!
//! The ledger is the single source of truth. It enforces two invariants:
//! exactly one record per (destination, stream) pair, and no record may
//! outlive its snapshot (removing a snapshot cascades to its records). A due
//! record whose snapshot is nonetheless missing is corruption and is
//! surfaced as [`LedgerError::SnapshotMissing`] instead of being skipped.
//!
//! Writes must be safe under concurrent access from in-flight operations for
//! *different* destinations; per-destination serialization is the
//! dispatcher's job, not the ledger's.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::LedgerError;
use crate::types::{DeliveryRecord, DestinationId, DueRecord, StreamId, StreamSnapshot};

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Insert or replace the record for its (destination, stream) pair.
    async fn upsert_record(&self, record: &DeliveryRecord);

    /// Create a fresh record unless one already exists for the pair.
    /// Returns whether a record was created. Never clobbers an existing
    /// record's message reference or eligibility.
    async fn create_record_if_absent(
        &self,
        destination_id: &DestinationId,
        stream_id: &StreamId,
        eligible_at: u64,
    ) -> bool;

    /// Remove one record. Removing an absent record is a no-op.
    async fn remove_record(&self, destination_id: &DestinationId, stream_id: &StreamId);

    /// Remove every record for a destination (deregistration cleanup).
    async fn remove_destination_records(&self, destination_id: &DestinationId);

    /// Records with `eligible_at <= now`, oldest eligibility first, capped
    /// at `limit`, each joined with its stream snapshot.
    async fn due_records(&self, now: u64, limit: usize) -> Result<Vec<DueRecord>, LedgerError>;

    /// Fetch one record, if present.
    async fn record(
        &self,
        destination_id: &DestinationId,
        stream_id: &StreamId,
    ) -> Option<DeliveryRecord>;

    /// Insert or replace a stream snapshot.
    async fn upsert_snapshot(&self, snapshot: &StreamSnapshot);

    /// Remove a snapshot and, by cascade, every record referencing it.
    async fn remove_snapshot(&self, stream_id: &StreamId);

    /// Fetch a snapshot, if present.
    async fn snapshot(&self, stream_id: &StreamId) -> Option<StreamSnapshot>;
}

/// In-memory ledger for tests and lightweight deployments.
#[derive(Default)]
pub struct InMemoryLedger {
    state: Mutex<LedgerState>,
}

#[derive(Default)]
struct LedgerState {
    snapshots: HashMap<StreamId, StreamSnapshot>,
    records: HashMap<(DestinationId, StreamId), DeliveryRecord>,
}

impl InMemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Ledger for InMemoryLedger {
    async fn upsert_record(&self, record: &DeliveryRecord) {
        let mut state = self.state.lock().await;
        state.records.insert(
            (record.destination_id.clone(), record.stream_id.clone()),
            record.clone(),
        );
    }

    async fn create_record_if_absent(
        &self,
        destination_id: &DestinationId,
        stream_id: &StreamId,
        eligible_at: u64,
    ) -> bool {
        let mut state = self.state.lock().await;
        let key = (destination_id.clone(), stream_id.clone());
        if state.records.contains_key(&key) {
            return false;
        }
        state.records.insert(
            key,
            DeliveryRecord::new(destination_id.clone(), stream_id.clone(), eligible_at),
        );
        true
    }

    async fn remove_record(&self, destination_id: &DestinationId, stream_id: &StreamId) {
        let mut state = self.state.lock().await;
        state
            .records
            .remove(&(destination_id.clone(), stream_id.clone()));
    }

    async fn remove_destination_records(&self, destination_id: &DestinationId) {
        let mut state = self.state.lock().await;
        state.records.retain(|(dest, _), _| dest != destination_id);
    }

    async fn due_records(&self, now: u64, limit: usize) -> Result<Vec<DueRecord>, LedgerError> {
        let state = self.state.lock().await;

        let mut due: Vec<&DeliveryRecord> = state
            .records
            .values()
            .filter(|record| record.eligible_at <= now)
            .collect();
        due.sort_by(|a, b| {
            (a.eligible_at, &a.destination_id.0, &a.stream_id.0)
                .cmp(&(b.eligible_at, &b.destination_id.0, &b.stream_id.0))
        });

        let mut joined = Vec::new();
        for record in due.into_iter().take(limit) {
            let snapshot = state.snapshots.get(&record.stream_id).ok_or_else(|| {
                LedgerError::SnapshotMissing {
                    destination_id: record.destination_id.clone(),
                    stream_id: record.stream_id.clone(),
                }
            })?;
            joined.push(DueRecord {
                record: record.clone(),
                snapshot: snapshot.clone(),
            });
        }
        Ok(joined)
    }

    async fn record(
        &self,
        destination_id: &DestinationId,
        stream_id: &StreamId,
    ) -> Option<DeliveryRecord> {
        let state = self.state.lock().await;
        state
            .records
            .get(&(destination_id.clone(), stream_id.clone()))
            .cloned()
    }

    async fn upsert_snapshot(&self, snapshot: &StreamSnapshot) {
        let mut state = self.state.lock().await;
        state
            .snapshots
            .insert(snapshot.stream_id.clone(), snapshot.clone());
    }

    async fn remove_snapshot(&self, stream_id: &StreamId) {
        let mut state = self.state.lock().await;
        state.snapshots.remove(stream_id);
        state.records.retain(|(_, stream), _| stream != stream_id);
    }

    async fn snapshot(&self, stream_id: &StreamId) -> Option<StreamSnapshot> {
        let state = self.state.lock().await;
        state.snapshots.get(stream_id).cloned()
    }
}
