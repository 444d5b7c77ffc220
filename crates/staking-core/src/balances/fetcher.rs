//! Balance sources for bulk refreshes.
//!
//! The store depends on the `BalanceFetcher` trait only. Real deployments plug
//! in a contract reader; the simulated fetcher serves seeded values after a
//! configurable delay for development and tests.

use super::BalanceError;
use async_trait::async_trait;
use staking_types::{ChainBalanceUpdate, ChainKey};
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;

/// Source of per-chain balance data.
#[async_trait]
pub trait BalanceFetcher: Send + Sync {
	/// Fetches partial updates for the requested chains.
	///
	/// Chains missing from the result keep their current balances.
	async fn fetch_balances(
		&self,
		chains: &[ChainKey],
	) -> Result<HashMap<ChainKey, ChainBalanceUpdate>, BalanceError>;
}

/// Fetcher returning seeded updates after a fixed delay.
pub struct SimulatedBalanceFetcher {
	delay: Duration,
	seeded: RwLock<HashMap<ChainKey, ChainBalanceUpdate>>,
}

impl SimulatedBalanceFetcher {
	pub fn new(delay: Duration) -> Self {
		Self {
			delay,
			seeded: RwLock::new(HashMap::new()),
		}
	}

	/// Sets the update returned for `chain` on every later fetch.
	pub async fn seed(&self, chain: ChainKey, update: ChainBalanceUpdate) {
		self.seeded.write().await.insert(chain, update);
	}
}

#[async_trait]
impl BalanceFetcher for SimulatedBalanceFetcher {
	async fn fetch_balances(
		&self,
		chains: &[ChainKey],
	) -> Result<HashMap<ChainKey, ChainBalanceUpdate>, BalanceError> {
		tokio::time::sleep(self.delay).await;

		let seeded = self.seeded.read().await;
		let updates = chains
			.iter()
			.filter_map(|chain| seeded.get(chain).map(|update| (*chain, update.clone())))
			.collect::<HashMap<_, _>>();

		tracing::debug!(
			requested = chains.len(),
			returned = updates.len(),
			"Simulated balance fetch finished"
		);
		Ok(updates)
	}
}
