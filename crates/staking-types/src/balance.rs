//! Balance types for pools, chains and cross-chain aggregates.
//!
//! Raw amounts are decimal ETH strings. Every `*_formatted` field is derived
//! from its raw counterpart with `format_eth_amount` and is never written
//! independently.

use crate::chain::ChainKey;
use crate::utils::{amount_to_string, format_eth_amount, sum_amounts};
use serde::{Deserialize, Serialize};

/// A named staking bucket on a chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pool {
	pub id: String,
	pub name: String,
	/// Annual percentage yield, e.g. `3.5` for 3.5%.
	pub apy: f64,
	pub total_staked: String,
	pub total_staked_formatted: String,
}

impl Pool {
	/// Creates an empty pool.
	pub fn new(id: impl Into<String>, name: impl Into<String>, apy: f64) -> Self {
		Self::with_stake(id, name, apy, "0")
	}

	/// Creates a pool holding `total_staked`.
	pub fn with_stake(
		id: impl Into<String>,
		name: impl Into<String>,
		apy: f64,
		total_staked: impl Into<String>,
	) -> Self {
		let total_staked = total_staked.into();
		Self {
			id: id.into(),
			name: name.into(),
			apy,
			total_staked_formatted: format_eth_amount(&total_staked),
			total_staked,
		}
	}

	/// Replaces the staked amount and its display form.
	pub fn set_total_staked(&mut self, amount: impl Into<String>) {
		self.total_staked = amount.into();
		self.total_staked_formatted = format_eth_amount(&self.total_staked);
	}
}

/// Staking balances of one chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainBalance {
	pub chain: ChainKey,
	pub chain_id: u64,
	pub chain_name: String,
	/// Sum of all pool stakes on this chain.
	pub total_pool_balance: String,
	pub total_pool_balance_formatted: String,
	/// The user's stake on this chain.
	pub user_staked_balance: String,
	pub user_staked_balance_formatted: String,
	pub pools: Vec<Pool>,
}

impl ChainBalance {
	/// Creates a zeroed balance record carrying the given (empty) pools.
	pub fn zeroed(
		chain: ChainKey,
		chain_id: u64,
		chain_name: impl Into<String>,
		pools: Vec<Pool>,
	) -> Self {
		let mut balance = Self {
			chain,
			chain_id,
			chain_name: chain_name.into(),
			total_pool_balance: "0".to_string(),
			total_pool_balance_formatted: String::new(),
			user_staked_balance: "0".to_string(),
			user_staked_balance_formatted: String::new(),
			pools,
		};
		balance.recompute_pool_total();
		balance.refresh_formatted();
		balance
	}

	/// Merges a partial update: provided fields overwrite, omitted fields keep
	/// their value. Derived fields are recomputed before returning.
	pub fn apply(&mut self, update: ChainBalanceUpdate) {
		if let Some(chain_name) = update.chain_name {
			self.chain_name = chain_name;
		}
		if let Some(total) = update.total_pool_balance {
			self.total_pool_balance = total;
		}
		if let Some(user) = update.user_staked_balance {
			self.user_staked_balance = user;
		}
		if let Some(pools) = update.pools {
			self.pools = pools;
		}
		self.recompute_pool_total();
		self.refresh_formatted();
	}

	/// Re-derives `total_pool_balance` from the pools. An empty pool list
	/// sums to zero.
	pub fn recompute_pool_total(&mut self) {
		let total = sum_amounts(self.pools.iter().map(|p| p.total_staked.as_str()));
		self.total_pool_balance = amount_to_string(total);
	}

	/// Re-derives every formatted field from its raw counterpart.
	pub fn refresh_formatted(&mut self) {
		self.total_pool_balance_formatted = format_eth_amount(&self.total_pool_balance);
		self.user_staked_balance_formatted = format_eth_amount(&self.user_staked_balance);
		for pool in &mut self.pools {
			pool.total_staked_formatted = format_eth_amount(&pool.total_staked);
		}
	}

	/// Returns the pool with the given id.
	pub fn pool(&self, pool_id: &str) -> Option<&Pool> {
		self.pools.iter().find(|p| p.id == pool_id)
	}
}

/// Partial update for a chain balance.
///
/// `None` fields retain their current value when merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainBalanceUpdate {
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub chain_name: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub total_pool_balance: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub user_staked_balance: Option<String>,
	#[serde(default, skip_serializing_if = "Option::is_none")]
	pub pools: Option<Vec<Pool>>,
}

/// Consistent view of every tracked chain plus the cross-chain aggregates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceSnapshot {
	pub chains: Vec<ChainBalance>,
	/// Sum of `total_pool_balance` across chains.
	pub total_eth_pool_balance: String,
	pub total_eth_pool_balance_formatted: String,
	/// Sum of `user_staked_balance` across chains.
	pub user_total_balance: String,
	pub user_total_balance_formatted: String,
	pub is_loading: bool,
	/// Time of the last mutation in milliseconds since the UNIX epoch.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub last_updated: Option<u64>,
}

impl BalanceSnapshot {
	/// Returns the balance record for a chain.
	pub fn chain(&self, chain: ChainKey) -> Option<&ChainBalance> {
		self.chains.iter().find(|c| c.chain == chain)
	}
}
