//! Event types for store-to-subscriber communication.
//!
//! This module defines the events the stores publish after every committed
//! mutation. Events flow through an event bus so that the notification layer
//! and any presentation layer react to state changes without the stores
//! calling into them.

use crate::{ChainKey, Transaction, TransactionStatus};
use serde::{Deserialize, Serialize};

/// Main event type encompassing all store events.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum StakingEvent {
	/// Events from the transaction store.
	Transaction(TransactionEvent),
	/// Events from the balance store.
	Balance(BalanceEvent),
}

/// Events related to the transaction lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TransactionEvent {
	/// A transaction has been created in `Pending`.
	Created { transaction: Transaction },
	/// A transaction moved to a new status.
	StatusChanged {
		transaction: Transaction,
		previous: TransactionStatus,
	},
	/// The placeholder hash has been replaced by the chain hash.
	HashUpdated { transaction_id: String, hash: String },
	/// A failed transaction has been reset to `Pending` for another run.
	Retried { transaction: Transaction },
	/// Terminal transactions have been removed from the store.
	Cleared { removed: usize },
}

/// Events related to balance tracking.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum BalanceEvent {
	/// Balances changed; totals are the recomputed aggregates.
	Updated {
		chain: Option<ChainKey>,
		total_eth_pool_balance: String,
		user_total_balance: String,
	},
	/// The loading flag changed.
	LoadingChanged { is_loading: bool },
	/// A bulk refresh failed.
	RefreshFailed { error: String },
}
