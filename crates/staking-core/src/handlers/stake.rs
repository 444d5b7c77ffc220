//! Stake handler for user deposit and withdrawal actions.
//!
//! Records the transaction, submits it through the wallet layer and, once the
//! cross-chain message has had time to compose, settles the stake into the
//! balance store. Withdrawals reserve their amount until they settle so that
//! concurrent withdrawals cannot oversubscribe the staked balance.

use super::submission::{SubmissionError, SubmissionInterface, SubmissionRequest};
use crate::balances::BalanceStore;
use crate::engine::event_bus::EventBus;
use crate::transactions::TransactionStore;
use rust_decimal::Decimal;
use staking_config::ChainsConfig;
use staking_types::{
	parse_amount, truncate_id, ChainKey, NewTransaction, StakingEvent, TransactionEvent,
	TransactionStatus, TransactionType,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::Mutex;
use tokio::task::AbortHandle;
use tracing::instrument;

/// Errors that can occur while handling a stake action.
#[derive(Debug, Error)]
pub enum StakeError {
	#[error("Invalid amount: {0}")]
	InvalidAmount(String),
	#[error("Chain not configured: {0}")]
	UnknownChain(ChainKey),
	#[error("Insufficient stake on {chain}: requested {requested}, available {available}")]
	InsufficientStake {
		chain: ChainKey,
		requested: Decimal,
		available: Decimal,
	},
	#[error("Transaction cannot be retried: {0}")]
	NotRetryable(String),
	#[error(transparent)]
	Submission(#[from] SubmissionError),
}

/// Withdrawal amounts submitted but not yet settled, per chain.
type Reservations = Arc<Mutex<HashMap<ChainKey, Decimal>>>;

/// Handler for deposit, withdraw and retry actions.
pub struct StakeHandler {
	chains: ChainsConfig,
	transactions: TransactionStore,
	balances: BalanceStore,
	event_bus: EventBus,
	submitter: Arc<dyn SubmissionInterface>,
	/// Time from submission until the stake lands in the balances.
	settlement_delay: Duration,
	/// Pending settlement tasks. Each task removes its own entry when done.
	settlements: Arc<Mutex<HashMap<u64, AbortHandle>>>,
	next_settlement: AtomicU64,
	reserved: Reservations,
}

impl StakeHandler {
	pub fn new(
		chains: ChainsConfig,
		transactions: TransactionStore,
		balances: BalanceStore,
		event_bus: EventBus,
		submitter: Arc<dyn SubmissionInterface>,
		settlement_delay: Duration,
	) -> Self {
		Self {
			chains,
			transactions,
			balances,
			event_bus,
			submitter,
			settlement_delay,
			settlements: Arc::new(Mutex::new(HashMap::new())),
			next_settlement: AtomicU64::new(0),
			reserved: Arc::new(Mutex::new(HashMap::new())),
		}
	}

	/// Stakes `amount` ETH from `chain`. Returns the transaction id.
	pub async fn deposit(&self, chain: ChainKey, amount: &str) -> Result<String, StakeError> {
		self.stake(TransactionType::Deposit, chain, amount).await
	}

	/// Withdraws `amount` ETH back to `chain`. Returns the transaction id.
	pub async fn withdraw(&self, chain: ChainKey, amount: &str) -> Result<String, StakeError> {
		self.stake(TransactionType::Withdraw, chain, amount).await
	}

	/// Resubmits a failed transaction and restarts its lifecycle.
	#[instrument(skip_all, fields(tx_id = %truncate_id(transaction_id)))]
	pub async fn retry(&self, transaction_id: &str) -> Result<(), StakeError> {
		let transaction = self
			.transactions
			.get_transaction(transaction_id)
			.await
			.filter(|t| t.status == TransactionStatus::Failed)
			.ok_or_else(|| StakeError::NotRetryable(transaction_id.to_string()))?;

		let chain = self
			.chains
			.iter()
			.find(|(_, config)| config.chain_id == transaction.chain_id)
			.map(|(key, _)| *key)
			.ok_or_else(|| StakeError::NotRetryable(transaction_id.to_string()))?;
		let value = parse_amount(&transaction.amount)
			.ok_or_else(|| StakeError::InvalidAmount(transaction.amount.clone()))?;
		let delta = delta(transaction.tx_type, value);

		self.reserve(chain, delta).await?;
		if !self.transactions.retry_transaction(transaction_id).await {
			release(&self.reserved, chain, delta).await;
			return Err(StakeError::NotRetryable(transaction_id.to_string()));
		}

		let request = SubmissionRequest {
			tx_type: transaction.tx_type,
			chain,
			chain_id: transaction.chain_id,
			amount: transaction.amount.clone(),
		};
		self.submit_and_settle(transaction_id, request, delta).await
	}

	/// Aborts pending settlements and drops their reservations.
	pub async fn shutdown(&self) {
		for (_, handle) in self.settlements.lock().await.drain() {
			handle.abort();
		}
		self.reserved.lock().await.clear();
	}

	#[instrument(skip_all, fields(tx_type = %tx_type, chain = %chain))]
	async fn stake(
		&self,
		tx_type: TransactionType,
		chain: ChainKey,
		amount: &str,
	) -> Result<String, StakeError> {
		let value = parse_amount(amount)
			.filter(|value| *value > Decimal::ZERO)
			.ok_or_else(|| StakeError::InvalidAmount(amount.to_string()))?;
		let chain_config = self
			.chains
			.get(&chain)
			.ok_or(StakeError::UnknownChain(chain))?;
		let delta = delta(tx_type, value);

		self.reserve(chain, delta).await?;

		let mut data =
			NewTransaction::new(tx_type, chain_config.chain_id, chain_config.name.clone(), amount);
		if let Some(pool) = chain_config.pools.first() {
			data = data.with_apy(pool.apy);
		}
		let transaction_id = self.transactions.add_transaction(data).await;

		let request = SubmissionRequest {
			tx_type,
			chain,
			chain_id: chain_config.chain_id,
			amount: amount.to_string(),
		};
		self.submit_and_settle(&transaction_id, request, delta)
			.await?;
		Ok(transaction_id)
	}

	/// Holds a withdrawal against the staked balance of `chain`.
	///
	/// Deposits (positive deltas) reserve nothing.
	async fn reserve(&self, chain: ChainKey, delta: Decimal) -> Result<(), StakeError> {
		if delta >= Decimal::ZERO {
			return Ok(());
		}
		let requested = -delta;

		let mut reserved = self.reserved.lock().await;
		let staked = self
			.balances
			.chain_balance(chain)
			.await
			.and_then(|balance| parse_amount(&balance.user_staked_balance))
			.unwrap_or(Decimal::ZERO);
		let pending = reserved.get(&chain).copied().unwrap_or(Decimal::ZERO);
		let available = (staked - pending).max(Decimal::ZERO);
		if requested > available {
			return Err(StakeError::InsufficientStake {
				chain,
				requested,
				available,
			});
		}
		*reserved.entry(chain).or_default() += requested;
		Ok(())
	}

	async fn submit_and_settle(
		&self,
		transaction_id: &str,
		request: SubmissionRequest,
		delta: Decimal,
	) -> Result<(), StakeError> {
		let chain = request.chain;
		// Failures published from here on cancel the settlement
		let mut events = self.event_bus.subscribe();
		self.balances.set_loading(true).await;

		let hash = match self.submitter.submit(request).await {
			Ok(hash) => hash,
			Err(e) => {
				tracing::warn!(tx_id = %truncate_id(transaction_id), error = %e, "Submission failed");
				self.transactions
					.update_transaction_status(
						transaction_id,
						TransactionStatus::Failed,
						Some(e.to_string()),
					)
					.await;
				release(&self.reserved, chain, delta).await;
				self.balances.set_loading(false).await;
				return Err(e.into());
			},
		};

		self.transactions
			.update_transaction_hash(transaction_id, &hash)
			.await;

		let transactions = self.transactions.clone();
		let balances = self.balances.clone();
		let reserved = Arc::clone(&self.reserved);
		let settlements = Arc::clone(&self.settlements);
		let delay = self.settlement_delay;
		let id = transaction_id.to_string();
		let key = self.next_settlement.fetch_add(1, Ordering::Relaxed);

		let mut pending = self.settlements.lock().await;
		let handle = tokio::spawn(async move {
			let failed = failed_within(&mut events, &id, delay).await
				|| matches!(
					transactions.get_transaction(&id).await,
					Some(t) if t.status == TransactionStatus::Failed
				);
			if failed {
				tracing::debug!(tx_id = %truncate_id(&id), "Skipping settlement of failed transaction");
			} else {
				balances.apply_stake_delta(chain, delta).await;
			}
			release(&reserved, chain, delta).await;
			balances.set_loading(false).await;
			settlements.lock().await.remove(&key);
		});
		pending.insert(key, handle.abort_handle());
		Ok(())
	}
}

/// Returns a withdrawal reservation once its transaction settles or fails.
async fn release(reserved: &Mutex<HashMap<ChainKey, Decimal>>, chain: ChainKey, delta: Decimal) {
	if delta >= Decimal::ZERO {
		return;
	}
	let mut reserved = reserved.lock().await;
	if let Some(pending) = reserved.get_mut(&chain) {
		*pending += delta;
		if *pending <= Decimal::ZERO {
			reserved.remove(&chain);
		}
	}
}

/// Waits out `delay`. Returns true if the transaction failed in the meantime.
///
/// Watches the bus because the record may be cleared before the delay ends.
async fn failed_within(
	events: &mut broadcast::Receiver<StakingEvent>,
	transaction_id: &str,
	delay: Duration,
) -> bool {
	let deadline = tokio::time::sleep(delay);
	tokio::pin!(deadline);

	loop {
		tokio::select! {
			_ = &mut deadline => return false,
			event = events.recv() => match event {
				Ok(StakingEvent::Transaction(TransactionEvent::StatusChanged { transaction, .. }))
					if transaction.id == transaction_id
						&& transaction.status == TransactionStatus::Failed =>
				{
					return true;
				},
				Ok(_) => {},
				Err(RecvError::Lagged(skipped)) => {
					tracing::debug!(skipped, "Settlement watcher lagged behind the event bus");
				},
				Err(RecvError::Closed) => break,
			},
		}
	}

	deadline.await;
	false
}

fn delta(tx_type: TransactionType, value: Decimal) -> Decimal {
	match tx_type {
		TransactionType::Deposit => value,
		TransactionType::Withdraw => -value,
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::balances::SimulatedBalanceFetcher;
	use crate::engine::event_bus::EventBus;
	use crate::handlers::SimulatedSubmitter;
	use crate::lifecycle::{TimedLifecycle, TokioClock};
	use async_trait::async_trait;
	use staking_config::builders::config::ConfigBuilder;
	use staking_config::{Config, LifecycleConfig};
	use std::sync::atomic::AtomicUsize;

	/// Rejects the first `failures` submissions, then succeeds.
	struct FlakySubmitter {
		failures: usize,
		calls: AtomicUsize,
	}

	#[async_trait]
	impl SubmissionInterface for FlakySubmitter {
		async fn submit(&self, _request: SubmissionRequest) -> Result<String, SubmissionError> {
			if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
				return Err(SubmissionError::Rejected);
			}
			Ok("0xabc123".to_string())
		}
	}

	struct Fixture {
		handler: StakeHandler,
		transactions: TransactionStore,
		balances: BalanceStore,
	}

	fn fixture(submitter: Arc<dyn SubmissionInterface>) -> Fixture {
		fixture_with(ConfigBuilder::new().build(), submitter)
	}

	fn fixture_with(config: Config, submitter: Arc<dyn SubmissionInterface>) -> Fixture {
		let schedule = config.schedule();
		let bus = EventBus::new(64);
		let clock = Arc::new(TokioClock::new());

		let transactions = TransactionStore::new(
			bus.clone(),
			clock.clone(),
			Arc::new(TimedLifecycle::new(schedule)),
			schedule,
		);
		let balances = BalanceStore::new(
			config.initial_balances(),
			bus.clone(),
			clock,
			Arc::new(SimulatedBalanceFetcher::new(Duration::from_millis(10))),
			Duration::from_secs(30),
		);
		let handler = StakeHandler::new(
			config.chains.clone(),
			transactions.clone(),
			balances.clone(),
			bus,
			submitter,
			schedule.time_to_compose_complete(),
		);

		Fixture {
			handler,
			transactions,
			balances,
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_deposit_settles_after_compose() {
		let f = fixture(Arc::new(SimulatedSubmitter::new(Duration::from_millis(2000))));

		let id = f.handler.deposit(ChainKey::Flow, "5").await.unwrap();

		let tx = f.transactions.get_transaction(&id).await.unwrap();
		assert!(tx.hash.starts_with("0x"));
		assert_eq!(tx.apy, Some(4.2));
		assert_eq!(tx.amount_formatted, "5.0000");
		assert!(f.balances.snapshot().await.is_loading);

		// Compose has not finished yet
		tokio::time::sleep(Duration::from_secs(170)).await;
		assert_eq!(
			f.balances.snapshot().await.user_total_balance_formatted,
			"0.00"
		);

		tokio::time::sleep(Duration::from_secs(11)).await;
		let snapshot = f.balances.snapshot().await;
		assert!(!snapshot.is_loading);
		assert_eq!(snapshot.user_total_balance_formatted, "5.0000");
		assert_eq!(snapshot.total_eth_pool_balance_formatted, "5.0000");
		assert_eq!(
			snapshot.chain(ChainKey::Flow).unwrap().pool("p1").unwrap().total_staked,
			"5"
		);

		tokio::time::sleep(Duration::from_secs(10)).await;
		assert_eq!(
			f.transactions.get_transaction(&id).await.unwrap().status,
			TransactionStatus::Completed
		);
	}

	#[tokio::test(start_paused = true)]
	async fn test_rejected_submission_marks_failed() {
		let f = fixture(Arc::new(FlakySubmitter {
			failures: 1,
			calls: AtomicUsize::new(0),
		}));

		let result = f.handler.deposit(ChainKey::Hedera, "1").await;
		assert!(matches!(
			result,
			Err(StakeError::Submission(SubmissionError::Rejected))
		));

		let transactions = f.transactions.transactions().await;
		assert_eq!(transactions.len(), 1);
		assert_eq!(transactions[0].status, TransactionStatus::Failed);
		assert_eq!(
			transactions[0].error.as_deref(),
			Some("User rejected the request")
		);
		assert!(!f.balances.snapshot().await.is_loading);

		tokio::time::sleep(Duration::from_secs(300)).await;
		assert_eq!(
			f.transactions.get_transaction(&transactions[0].id).await.unwrap().status,
			TransactionStatus::Failed
		);
		assert_eq!(
			f.balances.snapshot().await.user_total_balance_formatted,
			"0.00"
		);
	}

	#[tokio::test(start_paused = true)]
	async fn test_retry_resubmits_failed_transaction() {
		let f = fixture(Arc::new(FlakySubmitter {
			failures: 1,
			calls: AtomicUsize::new(0),
		}));

		assert!(f.handler.deposit(ChainKey::Flow, "2.5").await.is_err());
		let id = f.transactions.transactions().await[0].id.clone();

		f.handler.retry(&id).await.unwrap();
		let tx = f.transactions.get_transaction(&id).await.unwrap();
		assert_eq!(tx.status, TransactionStatus::Pending);
		assert_eq!(tx.hash, "0xabc123");

		tokio::time::sleep(Duration::from_secs(186)).await;
		assert_eq!(
			f.transactions.get_transaction(&id).await.unwrap().status,
			TransactionStatus::Completed
		);
		assert_eq!(
			f.balances.snapshot().await.user_total_balance_formatted,
			"2.5000"
		);

		// Only failed transactions can be retried
		assert!(matches!(
			f.handler.retry(&id).await,
			Err(StakeError::NotRetryable(_))
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_withdraw_requires_stake() {
		let f = fixture(Arc::new(SimulatedSubmitter::new(Duration::from_millis(10))));

		let result = f.handler.withdraw(ChainKey::Flow, "1").await;
		assert!(matches!(result, Err(StakeError::InsufficientStake { .. })));
		assert!(f.transactions.transactions().await.is_empty());

		f.balances.set_user_staked_balance(ChainKey::Flow, "3").await;
		f.handler.withdraw(ChainKey::Flow, "1").await.unwrap();

		tokio::time::sleep(Duration::from_secs(181)).await;
		assert_eq!(
			f.balances.chain_balance(ChainKey::Flow).await.unwrap().user_staked_balance,
			"2"
		);
	}

	#[tokio::test]
	async fn test_rejects_bad_input() {
		let f = fixture(Arc::new(SimulatedSubmitter::new(Duration::ZERO)));

		for amount in ["", "abc", "0", "-1"] {
			assert!(matches!(
				f.handler.deposit(ChainKey::Flow, amount).await,
				Err(StakeError::InvalidAmount(_))
			));
		}
		assert!(f.transactions.transactions().await.is_empty());
	}

	#[tokio::test]
	async fn test_rejects_unconfigured_chain() {
		let config = ConfigBuilder::new().build();
		let mut chains = config.chains.clone();
		chains.remove(&ChainKey::Hedera);
		let f = fixture(Arc::new(SimulatedSubmitter::new(Duration::ZERO)));
		let handler = StakeHandler::new(
			chains,
			f.transactions.clone(),
			f.balances.clone(),
			EventBus::new(8),
			Arc::new(SimulatedSubmitter::new(Duration::ZERO)),
			Duration::from_secs(180),
		);

		assert!(matches!(
			handler.deposit(ChainKey::Hedera, "1").await,
			Err(StakeError::UnknownChain(ChainKey::Hedera))
		));
	}

	#[tokio::test(start_paused = true)]
	async fn test_cleared_completed_deposit_still_settles() {
		let config = ConfigBuilder::new()
			.lifecycle(LifecycleConfig {
				completion_delay_seconds: 0,
				..Default::default()
			})
			.build();
		let f = fixture_with(
			config,
			Arc::new(SimulatedSubmitter::new(Duration::from_millis(2000))),
		);

		let id = f.handler.deposit(ChainKey::Flow, "5").await.unwrap();

		// The lifecycle completes before the settlement delay has run out
		tokio::time::sleep(Duration::from_millis(179_500)).await;
		assert_eq!(
			f.transactions.get_transaction(&id).await.unwrap().status,
			TransactionStatus::Completed
		);
		assert_eq!(f.transactions.clear_completed_transactions().await, 1);

		tokio::time::sleep(Duration::from_secs(10)).await;
		let snapshot = f.balances.snapshot().await;
		assert_eq!(snapshot.user_total_balance_formatted, "5.0000");
		assert!(!snapshot.is_loading);
	}

	#[tokio::test(start_paused = true)]
	async fn test_cleared_failed_deposit_is_not_settled() {
		let f = fixture(Arc::new(SimulatedSubmitter::new(Duration::from_millis(2000))));

		let id = f.handler.deposit(ChainKey::Flow, "5").await.unwrap();

		tokio::time::sleep(Duration::from_secs(10)).await;
		f.transactions
			.update_transaction_status(&id, TransactionStatus::Failed, Some("reverted".into()))
			.await
			.unwrap();
		assert_eq!(f.transactions.clear_completed_transactions().await, 1);

		tokio::time::sleep(Duration::from_secs(200)).await;
		let snapshot = f.balances.snapshot().await;
		assert_eq!(snapshot.user_total_balance_formatted, "0.00");
		assert!(!snapshot.is_loading);
	}

	#[tokio::test(start_paused = true)]
	async fn test_finished_settlements_are_released() {
		let f = fixture(Arc::new(SimulatedSubmitter::new(Duration::from_millis(10))));

		for _ in 0..5 {
			f.handler.deposit(ChainKey::Hedera, "1").await.unwrap();
		}
		assert_eq!(f.handler.settlements.lock().await.len(), 5);

		tokio::time::sleep(Duration::from_secs(400)).await;
		assert!(f.handler.settlements.lock().await.is_empty());
		assert_eq!(
			f.balances.snapshot().await.user_total_balance_formatted,
			"5.0000"
		);

		f.handler.deposit(ChainKey::Hedera, "1").await.unwrap();
		assert_eq!(f.handler.settlements.lock().await.len(), 1);
		f.handler.shutdown().await;
		assert!(f.handler.settlements.lock().await.is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_pending_withdrawals_reserve_stake() {
		let f = fixture(Arc::new(SimulatedSubmitter::new(Duration::from_millis(10))));
		f.balances.set_user_staked_balance(ChainKey::Flow, "3").await;

		f.handler.withdraw(ChainKey::Flow, "2").await.unwrap();
		match f.handler.withdraw(ChainKey::Flow, "2").await {
			Err(StakeError::InsufficientStake {
				requested,
				available,
				..
			}) => {
				assert_eq!(requested, Decimal::from(2));
				assert_eq!(available, Decimal::from(1));
			},
			other => panic!("expected insufficient stake, got {other:?}"),
		}
		f.handler.withdraw(ChainKey::Flow, "1").await.unwrap();

		tokio::time::sleep(Duration::from_secs(200)).await;
		assert_eq!(
			f.balances.chain_balance(ChainKey::Flow).await.unwrap().user_staked_balance,
			"0"
		);
		assert!(f.handler.reserved.lock().await.is_empty());
	}

	#[tokio::test(start_paused = true)]
	async fn test_rejected_withdrawal_releases_reservation() {
		let f = fixture(Arc::new(FlakySubmitter {
			failures: 1,
			calls: AtomicUsize::new(0),
		}));
		f.balances.set_user_staked_balance(ChainKey::Flow, "3").await;

		assert!(f.handler.withdraw(ChainKey::Flow, "3").await.is_err());
		assert!(f.handler.reserved.lock().await.is_empty());

		let id = f.handler.withdraw(ChainKey::Flow, "3").await.unwrap();
		assert_eq!(
			f.handler.reserved.lock().await.get(&ChainKey::Flow),
			Some(&Decimal::from(3))
		);

		// The first attempt cannot be retried while the second holds the stake
		let failed = f
			.transactions
			.transactions()
			.await
			.into_iter()
			.find(|t| t.id != id)
			.unwrap();
		assert!(matches!(
			f.handler.retry(&failed.id).await,
			Err(StakeError::InsufficientStake { .. })
		));
		assert_eq!(
			f.transactions.get_transaction(&failed.id).await.unwrap().status,
			TransactionStatus::Failed
		);
	}
}
