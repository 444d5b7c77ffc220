//! Transaction store for staking actions.
//!
//! Owns the authoritative, newest-first list of the user's transactions and
//! drives each one through its lifecycle with a pluggable `LifecycleDriver`.
//! Every committed change is published on the event bus.

use crate::engine::event_bus::EventBus;
use crate::lifecycle::{Clock, LifecycleDriver};
use crate::state::{validate_transition, TransactionStateError};
use staking_types::{
	estimated_completion_time, progress_percent, truncate_id, LifecycleSchedule, NewTransaction,
	StakingEvent, Transaction, TransactionEvent, TransactionStatus, PENDING_HASH,
};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio::task::AbortHandle;
use tracing::instrument;
use uuid::Uuid;

/// A running lifecycle task. `run` tells apart successive runs of a retried
/// transaction.
struct Progression {
	run: u64,
	handle: AbortHandle,
}

#[derive(Default)]
struct TransactionState {
	/// Newest first.
	transactions: Vec<Transaction>,
	progressions: HashMap<String, Progression>,
	next_run: u64,
}

struct Inner {
	state: RwLock<TransactionState>,
	event_bus: EventBus,
	clock: Arc<dyn Clock>,
	driver: Arc<dyn LifecycleDriver>,
	schedule: LifecycleSchedule,
}

/// Shared handle to the transaction store.
///
/// Cloning is cheap; all clones observe the same state.
#[derive(Clone)]
pub struct TransactionStore {
	inner: Arc<Inner>,
}

impl TransactionStore {
	pub fn new(
		event_bus: EventBus,
		clock: Arc<dyn Clock>,
		driver: Arc<dyn LifecycleDriver>,
		schedule: LifecycleSchedule,
	) -> Self {
		Self {
			inner: Arc::new(Inner {
				state: RwLock::new(TransactionState::default()),
				event_bus,
				clock,
				driver,
				schedule,
			}),
		}
	}

	/// Records a new transaction and starts its lifecycle.
	///
	/// The transaction always starts in `Pending`; a caller-supplied status is
	/// informational only. Returns the generated id.
	#[instrument(skip_all, fields(tx_type = %data.tx_type, chain_id = data.chain_id))]
	pub async fn add_transaction(&self, data: NewTransaction) -> String {
		let now = self.inner.clock.now_millis();
		let id = generate_transaction_id(now);

		if let Some(status) = data
			.status
			.filter(|status| *status != TransactionStatus::Pending)
		{
			tracing::debug!(requested = %status, "Ignoring initial status, starting in pending");
		}

		let transaction = Transaction {
			id: id.clone(),
			hash: data.hash.unwrap_or_else(|| PENDING_HASH.to_string()),
			tx_type: data.tx_type,
			chain_id: data.chain_id,
			chain_name: data.chain_name,
			amount: data.amount,
			amount_formatted: data.amount_formatted,
			apy: data.apy,
			status: TransactionStatus::Pending,
			timestamp: now,
			confirmation_time: None,
			compose_completion_time: None,
			completion_time: None,
			error: None,
		};

		self.inner
			.state
			.write()
			.await
			.transactions
			.insert(0, transaction.clone());

		tracing::info!(
			tx_id = %truncate_id(&id),
			amount = %transaction.amount_formatted,
			"Transaction created"
		);
		self.inner
			.event_bus
			.publish(StakingEvent::Transaction(TransactionEvent::Created {
				transaction,
			}))
			.ok();

		self.start_progression(&id).await;
		id
	}

	/// Moves a transaction to `status`.
	///
	/// Entering `Confirmed`, `ComposeComplete` or `Completed` stamps the
	/// matching timestamp the first time only. Entering `Failed` records
	/// `error` when one is given and stops the running lifecycle. Re-entering
	/// a terminal status returns the record unchanged.
	///
	/// Returns the updated transaction, or `None` when the id is unknown or the
	/// transition is not allowed. Neither case is an error for the caller.
	pub async fn update_transaction_status(
		&self,
		transaction_id: &str,
		status: TransactionStatus,
		error: Option<String>,
	) -> Option<Transaction> {
		let now = self.inner.clock.now_millis();

		let (updated, previous) = {
			let mut guard = self.inner.state.write().await;
			let state = &mut *guard;

			let transaction = state
				.transactions
				.iter_mut()
				.find(|t| t.id == transaction_id)?;
			let previous = transaction.status;

			if let Err(e) = validate_transition(previous, status) {
				tracing::warn!(
					tx_id = %truncate_id(transaction_id),
					error = %e,
					"Rejected status update"
				);
				return None;
			}
			if previous.is_terminal() {
				return Some(transaction.clone());
			}

			apply_status(transaction, status, error, now);
			let updated = transaction.clone();

			if status == TransactionStatus::Failed {
				if let Some(progression) = state.progressions.remove(transaction_id) {
					progression.handle.abort();
				}
			}

			(updated, previous)
		};

		if previous != status {
			tracing::info!(
				tx_id = %truncate_id(transaction_id),
				from = %previous,
				to = %status,
				"Transaction status updated"
			);
			self.inner
				.event_bus
				.publish(StakingEvent::Transaction(TransactionEvent::StatusChanged {
					transaction: updated.clone(),
					previous,
				}))
				.ok();
		}

		Some(updated)
	}

	/// Replaces the placeholder hash once the chain hash is known.
	///
	/// Returns false when the id is unknown.
	pub async fn update_transaction_hash(&self, transaction_id: &str, hash: &str) -> bool {
		{
			let mut state = self.inner.state.write().await;
			let Some(transaction) = state
				.transactions
				.iter_mut()
				.find(|t| t.id == transaction_id)
			else {
				return false;
			};
			transaction.hash = hash.to_string();
		}

		tracing::debug!(
			tx_id = %truncate_id(transaction_id),
			hash = %truncate_id(hash),
			"Transaction hash updated"
		);
		self.inner
			.event_bus
			.publish(StakingEvent::Transaction(TransactionEvent::HashUpdated {
				transaction_id: transaction_id.to_string(),
				hash: hash.to_string(),
			}))
			.ok();
		true
	}

	/// Resets a failed transaction to `Pending` and restarts its lifecycle
	/// from scratch, as if it had just been created.
	///
	/// Returns false when the id is unknown or the transaction is not failed.
	pub async fn retry_transaction(&self, transaction_id: &str) -> bool {
		let now = self.inner.clock.now_millis();

		let transaction = {
			let mut state = self.inner.state.write().await;
			let Some(transaction) = state
				.transactions
				.iter_mut()
				.find(|t| t.id == transaction_id)
			else {
				return false;
			};

			if transaction.status != TransactionStatus::Failed {
				tracing::warn!(
					tx_id = %truncate_id(transaction_id),
					error = %TransactionStateError::NotRetryable(transaction.status),
					"Rejected retry"
				);
				return false;
			}

			transaction.status = TransactionStatus::Pending;
			transaction.timestamp = now;
			transaction.confirmation_time = None;
			transaction.compose_completion_time = None;
			transaction.completion_time = None;
			transaction.error = None;
			transaction.clone()
		};

		tracing::info!(tx_id = %truncate_id(transaction_id), "Retrying transaction");
		self.inner
			.event_bus
			.publish(StakingEvent::Transaction(TransactionEvent::Retried {
				transaction,
			}))
			.ok();

		self.start_progression(transaction_id).await;
		true
	}

	/// Removes every `Completed` and `Failed` transaction.
	///
	/// Returns the number of transactions removed.
	pub async fn clear_completed_transactions(&self) -> usize {
		let removed = {
			let mut guard = self.inner.state.write().await;
			let state = &mut *guard;
			let before = state.transactions.len();
			state.transactions.retain(|t| !t.is_terminal());

			let transactions = &state.transactions;
			state
				.progressions
				.retain(|id, _| transactions.iter().any(|t| &t.id == id));

			before - state.transactions.len()
		};

		if removed > 0 {
			tracing::info!(removed, "Cleared finished transactions");
			self.inner
				.event_bus
				.publish(StakingEvent::Transaction(TransactionEvent::Cleared {
					removed,
				}))
				.ok();
		}
		removed
	}

	/// All transactions, newest first.
	pub async fn transactions(&self) -> Vec<Transaction> {
		self.inner.state.read().await.transactions.clone()
	}

	/// Transaction with the given id.
	pub async fn get_transaction(&self, transaction_id: &str) -> Option<Transaction> {
		self.inner
			.state
			.read()
			.await
			.transactions
			.iter()
			.find(|t| t.id == transaction_id)
			.cloned()
	}

	/// Transactions not yet in a terminal status, in list order.
	pub async fn active_transactions(&self) -> Vec<Transaction> {
		self.filtered(|t| !t.is_terminal()).await
	}

	/// Transactions in a terminal status, in list order.
	pub async fn completed_transactions(&self) -> Vec<Transaction> {
		self.filtered(Transaction::is_terminal).await
	}

	/// Human-readable completion estimate for a transaction at the current time.
	pub fn estimated_completion_time(&self, transaction: &Transaction) -> String {
		estimated_completion_time(
			transaction,
			self.inner.clock.now_millis(),
			&self.inner.schedule,
		)
	}

	/// Progress-bar percentage for a transaction at the current time.
	pub fn progress_percent(&self, transaction: &Transaction) -> u8 {
		progress_percent(
			transaction,
			self.inner.clock.now_millis(),
			&self.inner.schedule,
		)
	}

	/// Lifecycle schedule the store reports estimates against.
	pub fn schedule(&self) -> &LifecycleSchedule {
		&self.inner.schedule
	}

	/// Returns true while a lifecycle task is running for the transaction.
	pub async fn is_progressing(&self, transaction_id: &str) -> bool {
		self.inner
			.state
			.read()
			.await
			.progressions
			.contains_key(transaction_id)
	}

	/// Stops every running lifecycle. Transactions keep their current status.
	pub async fn shutdown(&self) {
		let mut state = self.inner.state.write().await;
		let count = state.progressions.len();
		for (_, progression) in state.progressions.drain() {
			progression.handle.abort();
		}
		tracing::info!(stopped = count, "Transaction store shut down");
	}

	async fn filtered<F>(&self, predicate: F) -> Vec<Transaction>
	where
		F: Fn(&Transaction) -> bool,
	{
		self.inner
			.state
			.read()
			.await
			.transactions
			.iter()
			.filter(|t| predicate(t))
			.cloned()
			.collect()
	}

	/// Spawns the lifecycle task for a transaction, replacing any earlier run.
	async fn start_progression(&self, transaction_id: &str) {
		// The lock is held across the spawn so the task cannot finish and
		// deregister before it is registered.
		let mut guard = self.inner.state.write().await;
		let state = &mut *guard;
		state.next_run += 1;
		let run = state.next_run;

		let store = self.clone();
		let driver = self.inner.driver.clone();
		let id = transaction_id.to_string();
		let handle = tokio::spawn(async move {
			driver.drive(&id, &store).await;
			store.finish_progression(&id, run).await;
		});

		if let Some(previous) = state.progressions.insert(
			transaction_id.to_string(),
			Progression {
				run,
				handle: handle.abort_handle(),
			},
		) {
			previous.handle.abort();
		}
	}

	async fn finish_progression(&self, transaction_id: &str, run: u64) {
		let mut state = self.inner.state.write().await;
		if state
			.progressions
			.get(transaction_id)
			.is_some_and(|p| p.run == run)
		{
			state.progressions.remove(transaction_id);
		}
	}
}

/// Applies a validated status change and its timestamp side effects.
fn apply_status(
	transaction: &mut Transaction,
	status: TransactionStatus,
	error: Option<String>,
	now: u64,
) {
	// Stage timestamps never precede creation or an earlier stage.
	let floor = [
		transaction.confirmation_time,
		transaction.compose_completion_time,
		transaction.completion_time,
	]
	.into_iter()
	.flatten()
	.fold(transaction.timestamp, u64::max);
	let stamp = now.max(floor);

	transaction.status = status;
	match status {
		TransactionStatus::Confirmed => {
			transaction.confirmation_time.get_or_insert(stamp);
		},
		TransactionStatus::ComposeComplete => {
			transaction.compose_completion_time.get_or_insert(stamp);
		},
		TransactionStatus::Completed => {
			transaction.completion_time.get_or_insert(stamp);
		},
		TransactionStatus::Failed => {
			if let Some(error) = error {
				transaction.error = Some(error);
			}
		},
		TransactionStatus::Pending | TransactionStatus::WaitingCompose => {},
	}
}

/// Generates `tx-<creation ms>-<8 hex chars>`.
fn generate_transaction_id(now_ms: u64) -> String {
	let suffix = Uuid::new_v4().simple().to_string();
	format!("tx-{}-{}", now_ms, &suffix[..8])
}
