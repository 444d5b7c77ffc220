//! Balance store for per-chain staking balances.
//!
//! Keeps one balance record per configured chain together with the
//! cross-chain aggregates. Every mutation recomputes the derived fields and
//! both aggregates under the same write lock, so readers never observe a
//! snapshot whose totals disagree with its chains.

use crate::engine::event_bus::EventBus;
use crate::lifecycle::Clock;
use rust_decimal::Decimal;
use staking_types::utils::amount_to_string;
use staking_types::{
	format_eth_amount, parse_amount, sum_amounts, BalanceEvent, BalanceSnapshot, ChainBalance,
	ChainBalanceUpdate, ChainKey, StakingEvent,
};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::instrument;

mod fetcher;

pub use fetcher::{BalanceFetcher, SimulatedBalanceFetcher};

/// Errors that can occur while refreshing balances.
#[derive(Debug, Error)]
pub enum BalanceError {
	/// The balance source reported an error.
	#[error("Balance fetch failed: {0}")]
	Fetch(String),
	/// The balance source did not answer in time.
	#[error("Balance refresh timed out after {0} seconds")]
	Timeout(u64),
}

struct BalanceState {
	/// One record per chain, in configuration order.
	chains: Vec<ChainBalance>,
	total_eth_pool_balance: String,
	user_total_balance: String,
	is_loading: bool,
	last_updated: Option<u64>,
}

impl BalanceState {
	fn chain_mut(&mut self, chain: ChainKey) -> Option<&mut ChainBalance> {
		self.chains.iter_mut().find(|c| c.chain == chain)
	}

	fn recompute_pool_aggregate(&mut self) {
		let total = sum_amounts(self.chains.iter().map(|c| c.total_pool_balance.as_str()));
		self.total_eth_pool_balance = amount_to_string(total);
	}

	fn recompute_user_aggregate(&mut self) {
		let total = sum_amounts(self.chains.iter().map(|c| c.user_staked_balance.as_str()));
		self.user_total_balance = amount_to_string(total);
	}

	fn recompute_aggregates(&mut self) {
		self.recompute_pool_aggregate();
		self.recompute_user_aggregate();
	}

	fn snapshot(&self) -> BalanceSnapshot {
		BalanceSnapshot {
			chains: self.chains.clone(),
			total_eth_pool_balance: self.total_eth_pool_balance.clone(),
			total_eth_pool_balance_formatted: format_eth_amount(&self.total_eth_pool_balance),
			user_total_balance: self.user_total_balance.clone(),
			user_total_balance_formatted: format_eth_amount(&self.user_total_balance),
			is_loading: self.is_loading,
			last_updated: self.last_updated,
		}
	}

	fn updated_event(&self, chain: Option<ChainKey>) -> StakingEvent {
		StakingEvent::Balance(BalanceEvent::Updated {
			chain,
			total_eth_pool_balance: self.total_eth_pool_balance.clone(),
			user_total_balance: self.user_total_balance.clone(),
		})
	}
}

struct Inner {
	state: RwLock<BalanceState>,
	event_bus: EventBus,
	clock: Arc<dyn Clock>,
	fetcher: Arc<dyn BalanceFetcher>,
	refresh_timeout: Duration,
}

/// Shared handle to the balance store.
#[derive(Clone)]
pub struct BalanceStore {
	inner: Arc<Inner>,
}

impl BalanceStore {
	/// Creates a store tracking exactly the given chains.
	pub fn new(
		chains: Vec<ChainBalance>,
		event_bus: EventBus,
		clock: Arc<dyn Clock>,
		fetcher: Arc<dyn BalanceFetcher>,
		refresh_timeout: Duration,
	) -> Self {
		let mut state = BalanceState {
			chains,
			total_eth_pool_balance: "0".to_string(),
			user_total_balance: "0".to_string(),
			is_loading: false,
			last_updated: None,
		};
		state.recompute_aggregates();

		Self {
			inner: Arc::new(Inner {
				state: RwLock::new(state),
				event_bus,
				clock,
				fetcher,
				refresh_timeout,
			}),
		}
	}

	/// Merges a partial update into a chain and recomputes both aggregates.
	///
	/// Returns false when the chain is not tracked.
	pub async fn set_chain_balance(&self, chain: ChainKey, update: ChainBalanceUpdate) -> bool {
		let now = self.inner.clock.now_millis();
		let event = {
			let mut state = self.inner.state.write().await;
			let Some(record) = state.chain_mut(chain) else {
				tracing::warn!(chain = %chain, "Ignoring balance update for untracked chain");
				return false;
			};
			record.apply(update);
			state.recompute_aggregates();
			state.last_updated = Some(now);
			state.updated_event(Some(chain))
		};

		tracing::debug!(chain = %chain, "Chain balance updated");
		self.inner.event_bus.publish(event).ok();
		true
	}

	/// Sets the user's stake on a chain and recomputes the user aggregate.
	///
	/// Returns false when the chain is not tracked.
	pub async fn set_user_staked_balance(&self, chain: ChainKey, amount: &str) -> bool {
		let now = self.inner.clock.now_millis();
		let event = {
			let mut state = self.inner.state.write().await;
			let Some(record) = state.chain_mut(chain) else {
				return false;
			};
			record.user_staked_balance = amount.to_string();
			record.user_staked_balance_formatted = format_eth_amount(amount);
			state.recompute_user_aggregate();
			state.last_updated = Some(now);
			state.updated_event(Some(chain))
		};

		self.inner.event_bus.publish(event).ok();
		true
	}

	/// Sets one pool's stake, then recomputes the chain total and the pool
	/// aggregate.
	///
	/// Returns false when the chain or pool is unknown.
	pub async fn update_pool_balance(&self, chain: ChainKey, pool_id: &str, amount: &str) -> bool {
		let now = self.inner.clock.now_millis();
		let event = {
			let mut state = self.inner.state.write().await;
			let Some(record) = state.chain_mut(chain) else {
				return false;
			};
			let Some(pool) = record.pools.iter_mut().find(|p| p.id == pool_id) else {
				tracing::debug!(chain = %chain, pool_id, "Ignoring update for unknown pool");
				return false;
			};
			pool.set_total_staked(amount);
			record.recompute_pool_total();
			record.refresh_formatted();
			state.recompute_pool_aggregate();
			state.last_updated = Some(now);
			state.updated_event(Some(chain))
		};

		self.inner.event_bus.publish(event).ok();
		true
	}

	/// Adds `delta` to the user's stake on a chain and to the chain's first
	/// pool. Results are floored at zero; a clipped floor is logged.
	///
	/// Returns false when the chain is not tracked.
	pub async fn apply_stake_delta(&self, chain: ChainKey, delta: Decimal) -> bool {
		let now = self.inner.clock.now_millis();
		let event = {
			let mut state = self.inner.state.write().await;
			let Some(record) = state.chain_mut(chain) else {
				return false;
			};

			record.user_staked_balance =
				shifted(chain, "user stake", &record.user_staked_balance, delta);
			if let Some(pool) = record.pools.first_mut() {
				let total = shifted(chain, "pool", &pool.total_staked, delta);
				pool.set_total_staked(total);
			}
			record.recompute_pool_total();
			record.refresh_formatted();
			state.recompute_aggregates();
			state.last_updated = Some(now);
			state.updated_event(Some(chain))
		};

		tracing::info!(chain = %chain, delta = %delta, "Applied stake to balances");
		self.inner.event_bus.publish(event).ok();
		true
	}

	/// Reloads every tracked chain from the balance fetcher.
	///
	/// The loading flag is set for the duration of the fetch and cleared on
	/// every outcome. On failure no balance is changed.
	#[instrument(skip_all)]
	pub async fn refresh_balances(&self) -> Result<(), BalanceError> {
		self.set_loading(true).await;

		let keys: Vec<ChainKey> = self
			.inner
			.state
			.read()
			.await
			.chains
			.iter()
			.map(|c| c.chain)
			.collect();

		let result = match tokio::time::timeout(
			self.inner.refresh_timeout,
			self.inner.fetcher.fetch_balances(&keys),
		)
		.await
		{
			Ok(result) => result,
			Err(_) => Err(BalanceError::Timeout(self.inner.refresh_timeout.as_secs())),
		};

		let outcome = match result {
			Ok(updates) => {
				let now = self.inner.clock.now_millis();
				let event = {
					let mut state = self.inner.state.write().await;
					for (chain, update) in updates {
						match state.chain_mut(chain) {
							Some(record) => record.apply(update),
							None => {
								tracing::debug!(chain = %chain, "Skipping untracked chain in refresh")
							},
						}
					}
					state.recompute_aggregates();
					state.last_updated = Some(now);
					state.updated_event(None)
				};
				tracing::info!("Balances refreshed");
				self.inner.event_bus.publish(event).ok();
				Ok(())
			},
			Err(e) => {
				tracing::warn!(error = %e, "Balance refresh failed");
				self.inner
					.event_bus
					.publish(StakingEvent::Balance(BalanceEvent::RefreshFailed {
						error: e.to_string(),
					}))
					.ok();
				Err(e)
			},
		};

		self.set_loading(false).await;
		outcome
	}

	/// Sets the loading flag. Publishes only on change.
	pub async fn set_loading(&self, is_loading: bool) {
		let changed = {
			let mut state = self.inner.state.write().await;
			let changed = state.is_loading != is_loading;
			state.is_loading = is_loading;
			changed
		};

		if changed {
			self.inner
				.event_bus
				.publish(StakingEvent::Balance(BalanceEvent::LoadingChanged {
					is_loading,
				}))
				.ok();
		}
	}

	/// Consistent copy of all balances and aggregates.
	pub async fn snapshot(&self) -> BalanceSnapshot {
		self.inner.state.read().await.snapshot()
	}

	pub async fn chain_balance(&self, chain: ChainKey) -> Option<ChainBalance> {
		self.inner
			.state
			.read()
			.await
			.chains
			.iter()
			.find(|c| c.chain == chain)
			.cloned()
	}
}

fn shifted(chain: ChainKey, field: &str, amount: &str, delta: Decimal) -> String {
	let current = parse_amount(amount).unwrap_or(Decimal::ZERO);
	let next = current + delta;
	if next < Decimal::ZERO {
		tracing::warn!(
			chain = %chain,
			current = %current,
			delta = %delta,
			"Stake delta exceeds {field}, flooring at zero"
		);
	}
	amount_to_string(next.max(Decimal::ZERO))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::lifecycle::ManualClock;
	use async_trait::async_trait;
	use staking_types::Pool;
	use std::collections::HashMap;

	struct FailingFetcher;

	#[async_trait]
	impl BalanceFetcher for FailingFetcher {
		async fn fetch_balances(
			&self,
			_chains: &[ChainKey],
		) -> Result<HashMap<ChainKey, ChainBalanceUpdate>, BalanceError> {
			Err(BalanceError::Fetch("rpc unavailable".to_string()))
		}
	}

	struct StalledFetcher;

	#[async_trait]
	impl BalanceFetcher for StalledFetcher {
		async fn fetch_balances(
			&self,
			_chains: &[ChainKey],
		) -> Result<HashMap<ChainKey, ChainBalanceUpdate>, BalanceError> {
			std::future::pending().await
		}
	}

	fn chains() -> Vec<ChainBalance> {
		vec![
			ChainBalance::zeroed(
				ChainKey::Ethereum,
				11155111,
				"Ethereum Sepolia",
				vec![],
			),
			ChainBalance::zeroed(
				ChainKey::Flow,
				545,
				"Flow EVM Testnet",
				vec![Pool::new("p1", "Flow Core", 4.2), Pool::new("p2", "Flow Plus", 5.0)],
			),
			ChainBalance::zeroed(
				ChainKey::Hedera,
				296,
				"Hedera Testnet",
				vec![Pool::new("h1", "Hedera Core", 5.1)],
			),
		]
	}

	fn store_with(fetcher: Arc<dyn BalanceFetcher>) -> (BalanceStore, EventBus) {
		let bus = EventBus::new(64);
		let store = BalanceStore::new(
			chains(),
			bus.clone(),
			Arc::new(ManualClock::new(1_000)),
			fetcher,
			Duration::from_secs(30),
		);
		(store, bus)
	}

	fn simulated() -> Arc<SimulatedBalanceFetcher> {
		Arc::new(SimulatedBalanceFetcher::new(Duration::from_millis(1000)))
	}

	/// Both aggregates equal the sum of their per-chain fields.
	fn assert_consistent(snapshot: &BalanceSnapshot) {
		let pools = sum_amounts(snapshot.chains.iter().map(|c| c.total_pool_balance.as_str()));
		let users = sum_amounts(snapshot.chains.iter().map(|c| c.user_staked_balance.as_str()));
		assert_eq!(parse_amount(&snapshot.total_eth_pool_balance), Some(pools));
		assert_eq!(parse_amount(&snapshot.user_total_balance), Some(users));
		for chain in &snapshot.chains {
			let pool_sum = sum_amounts(chain.pools.iter().map(|p| p.total_staked.as_str()));
			assert_eq!(parse_amount(&chain.total_pool_balance), Some(pool_sum));
		}
	}

	#[tokio::test]
	async fn test_initial_snapshot_is_zeroed() {
		let (store, _bus) = store_with(simulated());
		let snapshot = store.snapshot().await;

		let keys: Vec<ChainKey> = snapshot.chains.iter().map(|c| c.chain).collect();
		assert_eq!(keys, vec![ChainKey::Ethereum, ChainKey::Flow, ChainKey::Hedera]);
		assert_eq!(snapshot.total_eth_pool_balance_formatted, "0.00");
		assert_eq!(snapshot.user_total_balance_formatted, "0.00");
		assert!(!snapshot.is_loading);
		assert_eq!(snapshot.last_updated, None);
	}

	#[tokio::test]
	async fn test_aggregates_across_chains() {
		let (store, _bus) = store_with(simulated());

		assert!(
			store
				.set_chain_balance(
					ChainKey::Flow,
					ChainBalanceUpdate {
						total_pool_balance: Some("10".to_string()),
						user_staked_balance: Some("2".to_string()),
						pools: Some(vec![Pool::with_stake("p1", "Flow Core", 4.2, "10")]),
						..Default::default()
					},
				)
				.await
		);
		assert!(
			store
				.set_chain_balance(
					ChainKey::Hedera,
					ChainBalanceUpdate {
						total_pool_balance: Some("5".to_string()),
						user_staked_balance: Some("1".to_string()),
						pools: Some(vec![Pool::with_stake("h1", "Hedera Core", 5.1, "5")]),
						..Default::default()
					},
				)
				.await
		);

		let snapshot = store.snapshot().await;
		assert_eq!(snapshot.total_eth_pool_balance_formatted, "15.0000");
		assert_eq!(snapshot.user_total_balance_formatted, "3.0000");
		assert_eq!(snapshot.last_updated, Some(1_000));
		assert_consistent(&snapshot);
	}

	#[tokio::test]
	async fn test_pool_update_recomputes_chain_and_aggregate() {
		let (store, _bus) = store_with(simulated());

		assert!(store.update_pool_balance(ChainKey::Flow, "p1", "7.5").await);
		assert!(store.update_pool_balance(ChainKey::Flow, "p2", "2.5").await);
		assert!(store.update_pool_balance(ChainKey::Hedera, "h1", "0.005").await);

		let flow = store.chain_balance(ChainKey::Flow).await.unwrap();
		assert_eq!(flow.total_pool_balance, "10");
		assert_eq!(flow.pool("p1").unwrap().total_staked_formatted, "7.5000");

		let snapshot = store.snapshot().await;
		assert_eq!(snapshot.total_eth_pool_balance, "10.005");
		assert_eq!(snapshot.total_eth_pool_balance_formatted, "10.0050");
		assert_eq!(
			snapshot.chain(ChainKey::Hedera).unwrap().total_pool_balance_formatted,
			"<0.01"
		);
		assert_consistent(&snapshot);
	}

	#[tokio::test]
	async fn test_unknown_pool_is_noop() {
		let (store, _bus) = store_with(simulated());
		let before = store.snapshot().await;

		assert!(!store.update_pool_balance(ChainKey::Flow, "missing", "1").await);
		assert_eq!(store.snapshot().await, before);
	}

	#[tokio::test]
	async fn test_user_stake_updates_only_user_side() {
		let (store, _bus) = store_with(simulated());
		store.update_pool_balance(ChainKey::Flow, "p1", "4").await;

		assert!(store.set_user_staked_balance(ChainKey::Flow, "1.23456").await);

		let snapshot = store.snapshot().await;
		let flow = snapshot.chain(ChainKey::Flow).unwrap();
		assert_eq!(flow.user_staked_balance_formatted, "1.2346");
		assert_eq!(flow.total_pool_balance, "4");
		assert_eq!(snapshot.user_total_balance_formatted, "1.2346");
		assert_consistent(&snapshot);
	}

	#[tokio::test]
	async fn test_stake_delta_moves_user_and_pool() {
		let (store, _bus) = store_with(simulated());

		store.apply_stake_delta(ChainKey::Flow, Decimal::new(5, 0)).await;
		store.apply_stake_delta(ChainKey::Ethereum, Decimal::new(2, 0)).await;
		store.apply_stake_delta(ChainKey::Flow, Decimal::new(-15, 1)).await;

		let snapshot = store.snapshot().await;
		let flow = snapshot.chain(ChainKey::Flow).unwrap();
		assert_eq!(flow.user_staked_balance, "3.5");
		assert_eq!(flow.pool("p1").unwrap().total_staked, "3.5");
		// Without pools only the user side moves
		let ethereum = snapshot.chain(ChainKey::Ethereum).unwrap();
		assert_eq!(ethereum.user_staked_balance, "2");
		assert_eq!(ethereum.total_pool_balance, "0");
		assert_eq!(snapshot.user_total_balance_formatted, "5.5000");
		assert_consistent(&snapshot);

		// Floored at zero
		store.apply_stake_delta(ChainKey::Flow, Decimal::new(-100, 0)).await;
		let flow = store.chain_balance(ChainKey::Flow).await.unwrap();
		assert_eq!(flow.user_staked_balance, "0");
		assert_eq!(flow.pool("p1").unwrap().total_staked, "0");
		assert_consistent(&store.snapshot().await);
	}

	#[tokio::test(start_paused = true)]
	async fn test_refresh_merges_fetched_updates() {
		let fetcher = simulated();
		fetcher
			.seed(
				ChainKey::Hedera,
				ChainBalanceUpdate {
					user_staked_balance: Some("1".to_string()),
					pools: Some(vec![Pool::with_stake("h1", "Hedera Core", 5.1, "5")]),
					..Default::default()
				},
			)
			.await;
		let (store, bus) = store_with(fetcher);
		let mut events = bus.subscribe();

		store.refresh_balances().await.unwrap();

		let snapshot = store.snapshot().await;
		assert!(!snapshot.is_loading);
		assert_eq!(snapshot.total_eth_pool_balance_formatted, "5.0000");
		assert_eq!(snapshot.user_total_balance_formatted, "1.0000");
		assert_consistent(&snapshot);

		let mut loading = Vec::new();
		while let Ok(event) = events.try_recv() {
			if let StakingEvent::Balance(BalanceEvent::LoadingChanged { is_loading }) = event {
				loading.push(is_loading);
			}
		}
		assert_eq!(loading, vec![true, false]);
	}

	#[tokio::test]
	async fn test_refresh_error_clears_loading() {
		let (store, _bus) = store_with(Arc::new(FailingFetcher));
		let before = store.snapshot().await;

		let result = store.refresh_balances().await;

		assert!(matches!(result, Err(BalanceError::Fetch(_))));
		let after = store.snapshot().await;
		assert!(!after.is_loading);
		assert_eq!(after, before);
	}

	#[tokio::test(start_paused = true)]
	async fn test_refresh_times_out() {
		let (store, bus) = store_with(Arc::new(StalledFetcher));
		let mut events = bus.subscribe();

		let result = store.refresh_balances().await;

		assert!(matches!(result, Err(BalanceError::Timeout(30))));
		assert!(!store.snapshot().await.is_loading);

		let failed = std::iter::from_fn(|| events.try_recv().ok()).any(|event| {
			matches!(
				event,
				StakingEvent::Balance(BalanceEvent::RefreshFailed { .. })
			)
		});
		assert!(failed);
	}

	#[tokio::test]
	async fn test_untracked_chain_is_ignored() {
		let bus = EventBus::new(8);
		let store = BalanceStore::new(
			vec![ChainBalance::zeroed(ChainKey::Flow, 545, "Flow EVM Testnet", vec![])],
			bus,
			Arc::new(ManualClock::new(0)),
			simulated(),
			Duration::from_secs(1),
		);

		assert!(
			!store
				.set_chain_balance(ChainKey::Hedera, ChainBalanceUpdate::default())
				.await
		);
		assert!(!store.set_user_staked_balance(ChainKey::Hedera, "1").await);
		assert!(store.chain_balance(ChainKey::Hedera).await.is_none());
	}
}
