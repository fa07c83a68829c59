//! A single-process live-stream notification delivery engine.
//!
//! This crate maintains **at most one tracked message per (destination,
//! stream) pair**: a durable ledger of delivery obligations, a
//! concurrency-limited dispatcher that drains it, and a delivery executor
//! that sends new notifications, edits live ones in place, and classifies
//! transport failures into "retry later" or "stop trying forever".
//!
//! ## Guarantees
//! - At most one outstanding or tracked message per (destination, stream)
//! - Per-destination ordering: never two concurrent operations for one destination
//! - Bounded global concurrency
//! - Crash-safe: in-flight state is advisory, the ledger is the source of truth
//!
//! ## Non-Guarantees
//! - Exactly-once delivery
//! - Distributed coordination
//! - A concrete messaging client, formatter contract, or poller
//!
//! Embedders supply the transport, the chat-configuration directory and the
//! upstream poller; the engine supplies everything between "this stream is
//! live" and "this chat's message is current".

mod analytics;
mod backoff;
mod classify;
mod cleanup;
mod directory;
mod dispatcher;
mod error;
mod executor;
mod format;
mod ledger;
mod transport;
mod types;

#[cfg(feature = "postgres")]
mod ledger_postgres;

pub use analytics::{AnalyticsSink, NoopAnalytics};
pub use backoff::RetryPolicy;
pub use classify::{classify, is_invalid_target, is_not_modified};
pub use cleanup::{CleanupQueue, NoopCleanup};
pub use directory::{ChatDirectory, InMemoryDirectory};
pub use dispatcher::{Dispatcher, DispatcherConfig};
pub use error::{DispatchError, FailureClass, LedgerError, TransportError};
pub use executor::DeliveryExecutor;
pub use format::{DefaultFormatter, Formatter};
pub use ledger::{InMemoryLedger, Ledger};
pub use transport::Transport;
pub use types::{
    unix_now, ChannelId, DeliveryRecord, DeliveryTarget, Destination, DestinationId, DueDelivery,
    DueRecord, MessageContent, MessageKind, MessageRef, SentMessage, StreamId, StreamSnapshot,
    SubChatId, TargetKind,
};

#[cfg(feature = "http")]
pub use analytics::HttpAnalyticsSink;

#[cfg(feature = "postgres")]
pub use ledger_postgres::PostgresLedger;
