//! Configuration builder for creating test and development configurations.
//!
//! This module provides utilities for constructing Config instances with
//! sensible defaults, particularly useful for testing scenarios.

use crate::{
	BalancesConfig, ChainConfig, ChainsConfig, Config, LifecycleConfig, NotificationConfig,
	PoolConfig, ServiceConfig, SubmissionConfig,
};
use staking_types::ChainKey;

/// Builder for creating `Config` instances with a fluent API.
///
/// Starts from the three supported chains with one pool each and the
/// default lifecycle schedule.
#[derive(Debug, Clone)]
pub struct ConfigBuilder {
	service_id: String,
	chains: ChainsConfig,
	lifecycle: LifecycleConfig,
	balances: BalancesConfig,
	notifications: NotificationConfig,
	submission: SubmissionConfig,
}

impl Default for ConfigBuilder {
	fn default() -> Self {
		Self::new()
	}
}

impl ConfigBuilder {
	/// Creates a new `ConfigBuilder` with default values suitable for testing.
	pub fn new() -> Self {
		let mut chains = ChainsConfig::new();
		chains.insert(
			ChainKey::Ethereum,
			chain(11155111, "Ethereum Sepolia", "eth-main", "Ethereum Main Pool", 3.8),
		);
		chains.insert(
			ChainKey::Flow,
			chain(545, "Flow EVM Testnet", "p1", "Flow Core", 4.2),
		);
		chains.insert(
			ChainKey::Hedera,
			chain(296, "Hedera Testnet", "h1", "Hedera Core", 5.1),
		);

		Self {
			service_id: "test-staking".to_string(),
			chains,
			lifecycle: LifecycleConfig::default(),
			balances: BalancesConfig::default(),
			notifications: NotificationConfig::default(),
			submission: SubmissionConfig::default(),
		}
	}

	/// Sets the service ID.
	pub fn service_id(mut self, id: impl Into<String>) -> Self {
		self.service_id = id.into();
		self
	}

	/// Adds or replaces a chain.
	pub fn chain(mut self, key: ChainKey, config: ChainConfig) -> Self {
		self.chains.insert(key, config);
		self
	}

	/// Sets the lifecycle delays.
	pub fn lifecycle(mut self, lifecycle: LifecycleConfig) -> Self {
		self.lifecycle = lifecycle;
		self
	}

	/// Sets the simulated refresh latency in milliseconds.
	pub fn refresh_delay_ms(mut self, delay: u64) -> Self {
		self.balances.refresh_delay_ms = delay;
		self
	}

	/// Sets the refresh timeout in seconds.
	pub fn refresh_timeout_seconds(mut self, timeout: u64) -> Self {
		self.balances.refresh_timeout_seconds = timeout;
		self
	}

	/// Sets the simulated submission latency in milliseconds.
	pub fn submission_delay_ms(mut self, delay: u64) -> Self {
		self.submission.simulated_delay_ms = delay;
		self
	}

	/// Enables or disables notifications.
	pub fn notifications_enabled(mut self, enabled: bool) -> Self {
		self.notifications.enabled = enabled;
		self
	}

	/// Builds the `Config` without validation.
	pub fn build(self) -> Config {
		Config {
			service: ServiceConfig {
				id: self.service_id,
			},
			chains: self.chains,
			lifecycle: self.lifecycle,
			balances: self.balances,
			notifications: self.notifications,
			submission: self.submission,
		}
	}
}

fn chain(chain_id: u64, name: &str, pool_id: &str, pool_name: &str, apy: f64) -> ChainConfig {
	ChainConfig {
		chain_id,
		name: name.to_string(),
		pools: vec![PoolConfig {
			id: pool_id.to_string(),
			name: pool_name.to_string(),
			apy,
		}],
	}
}
