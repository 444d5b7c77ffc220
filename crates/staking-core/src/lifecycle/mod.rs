//! Drivers that move transactions through their lifecycle.
//!
//! The transaction store delegates progression to a `LifecycleDriver`. The
//! default `TimedLifecycle` replays the fixed delay schedule; a production
//! deployment can plug in a driver that polls receipts or subscribes to chain
//! events without touching the state machine.

pub mod clock;
pub mod timed;

pub use clock::{Clock, ManualClock, TokioClock};
pub use timed::TimedLifecycle;

use crate::transactions::TransactionStore;
use async_trait::async_trait;

/// Moves one transaction through its lifecycle.
///
/// `drive` runs in its own task. It returns when the transaction reaches a
/// terminal status, disappears from the store, or the store rejects an update.
/// The store aborts the task when the transaction fails or the store shuts down.
#[async_trait]
pub trait LifecycleDriver: Send + Sync {
	async fn drive(&self, transaction_id: &str, store: &TransactionStore);
}
