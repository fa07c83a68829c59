#[cfg(feature = "postgres")]
use async_trait::async_trait;
#[cfg(feature = "postgres")]
use tokio_postgres::Client;

#[cfg(feature = "postgres")]
use crate::error::LedgerError;
#[cfg(feature = "postgres")]
use crate::ledger::Ledger;
#[cfg(feature = "postgres")]
use crate::types::{DeliveryRecord, DestinationId, DueRecord, MessageRef, StreamId, StreamSnapshot};

/// Ledger over Postgres.
///
/// Two tables: snapshots keyed by stream id, records keyed by
/// (destination, stream). The foreign key's `ON DELETE CASCADE` enforces
/// the referential invariant, so removing a snapshot atomically removes the
/// records referencing it.
#[cfg(feature = "postgres")]
pub struct PostgresLedger {
    client: Client,
}

#[cfg(feature = "postgres")]
impl PostgresLedger {
    pub async fn new(client: Client) -> Result<Self, tokio_postgres::Error> {
        client
            .execute(
                "CREATE TABLE IF NOT EXISTS stream_snapshots (
                    stream_id TEXT PRIMARY KEY,
                    payload JSONB NOT NULL
                )",
                &[],
            )
            .await?;

        client
            .execute(
                "CREATE TABLE IF NOT EXISTS delivery_records (
                    destination_id TEXT NOT NULL,
                    stream_id TEXT NOT NULL
                        REFERENCES stream_snapshots (stream_id)
                        ON DELETE CASCADE,
                    message_ref JSONB,
                    eligible_at BIGINT NOT NULL,
                    PRIMARY KEY (destination_id, stream_id)
                )",
                &[],
            )
            .await?;

        client
            .execute(
                "CREATE INDEX IF NOT EXISTS delivery_records_eligible_at_idx
                 ON delivery_records (eligible_at)",
                &[],
            )
            .await?;

        Ok(Self { client })
    }
}

#[cfg(feature = "postgres")]
#[async_trait]
impl Ledger for PostgresLedger {
    async fn upsert_record(&self, record: &DeliveryRecord) {
        let message_ref = record
            .message_ref
            .as_ref()
            .and_then(|m| serde_json::to_value(m).ok());
        let _ = self
            .client
            .execute(
                "INSERT INTO delivery_records (destination_id, stream_id, message_ref, eligible_at)
                 VALUES ($1, $2, $3, $4)
                 ON CONFLICT (destination_id, stream_id)
                 DO UPDATE SET message_ref = EXCLUDED.message_ref,
                               eligible_at = EXCLUDED.eligible_at",
                &[
                    &record.destination_id.0,
                    &record.stream_id.0,
                    &message_ref,
                    &(record.eligible_at as i64),
                ],
            )
            .await;
    }

    async fn create_record_if_absent(
        &self,
        destination_id: &DestinationId,
        stream_id: &StreamId,
        eligible_at: u64,
    ) -> bool {
        self.client
            .execute(
                "INSERT INTO delivery_records (destination_id, stream_id, message_ref, eligible_at)
                 VALUES ($1, $2, NULL, $3)
                 ON CONFLICT (destination_id, stream_id) DO NOTHING",
                &[&destination_id.0, &stream_id.0, &(eligible_at as i64)],
            )
            .await
            .map(|rows| rows > 0)
            .unwrap_or(false)
    }

    async fn remove_record(&self, destination_id: &DestinationId, stream_id: &StreamId) {
        let _ = self
            .client
            .execute(
                "DELETE FROM delivery_records WHERE destination_id = $1 AND stream_id = $2",
                &[&destination_id.0, &stream_id.0],
            )
            .await;
    }

    async fn remove_destination_records(&self, destination_id: &DestinationId) {
        let _ = self
            .client
            .execute(
                "DELETE FROM delivery_records WHERE destination_id = $1",
                &[&destination_id.0],
            )
            .await;
    }

    async fn due_records(&self, now: u64, limit: usize) -> Result<Vec<DueRecord>, LedgerError> {
        let rows = self
            .client
            .query(
                "SELECT r.destination_id, r.stream_id, r.message_ref, r.eligible_at, s.payload
                 FROM delivery_records r
                 JOIN stream_snapshots s ON r.stream_id = s.stream_id
                 WHERE r.eligible_at <= $1
                 ORDER BY r.eligible_at ASC, r.destination_id ASC, r.stream_id ASC
                 LIMIT $2",
                &[&(now as i64), &(limit as i64)],
            )
            .await
            .map_err(|err| LedgerError::Backend {
                detail: err.to_string(),
            })?;

        let mut due = Vec::with_capacity(rows.len());
        for row in rows {
            let destination_id: String = row.get(0);
            let stream_id: String = row.get(1);
            let message_ref: Option<serde_json::Value> = row.get(2);
            let eligible_at: i64 = row.get(3);
            let payload: serde_json::Value = row.get(4);

            let snapshot: StreamSnapshot =
                serde_json::from_value(payload).map_err(|err| LedgerError::Backend {
                    detail: err.to_string(),
                })?;
            let message_ref = message_ref
                .map(serde_json::from_value::<MessageRef>)
                .transpose()
                .map_err(|err| LedgerError::Backend {
                    detail: err.to_string(),
                })?;

            due.push(DueRecord {
                record: DeliveryRecord {
                    destination_id: DestinationId(destination_id),
                    stream_id: StreamId(stream_id),
                    message_ref,
                    eligible_at: eligible_at as u64,
                },
                snapshot,
            });
        }
        Ok(due)
    }

    async fn record(
        &self,
        destination_id: &DestinationId,
        stream_id: &StreamId,
    ) -> Option<DeliveryRecord> {
        let row = self
            .client
            .query_opt(
                "SELECT message_ref, eligible_at FROM delivery_records
                 WHERE destination_id = $1 AND stream_id = $2",
                &[&destination_id.0, &stream_id.0],
            )
            .await
            .ok()??;

        let message_ref: Option<serde_json::Value> = row.get(0);
        let eligible_at: i64 = row.get(1);
        Some(DeliveryRecord {
            destination_id: destination_id.clone(),
            stream_id: stream_id.clone(),
            message_ref: message_ref.and_then(|v| serde_json::from_value(v).ok()),
            eligible_at: eligible_at as u64,
        })
    }

    async fn upsert_snapshot(&self, snapshot: &StreamSnapshot) {
        let payload = serde_json::to_value(snapshot).unwrap_or_default();
        let _ = self
            .client
            .execute(
                "INSERT INTO stream_snapshots (stream_id, payload)
                 VALUES ($1, $2)
                 ON CONFLICT (stream_id) DO UPDATE SET payload = EXCLUDED.payload",
                &[&snapshot.stream_id.0, &payload],
            )
            .await;
    }

    async fn remove_snapshot(&self, stream_id: &StreamId) {
        let _ = self
            .client
            .execute(
                "DELETE FROM stream_snapshots WHERE stream_id = $1",
                &[&stream_id.0],
            )
            .await;
    }

    async fn snapshot(&self, stream_id: &StreamId) -> Option<StreamSnapshot> {
        let row = self
            .client
            .query_opt(
                "SELECT payload FROM stream_snapshots WHERE stream_id = $1",
                &[&stream_id.0],
            )
            .await
            .ok()??;
        let payload: serde_json::Value = row.get(0);
        serde_json::from_value(payload).ok()
    }
}
