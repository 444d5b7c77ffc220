//! Configuration module for the staking tracker.
//!
//! This module provides structures and utilities for managing tracker
//! configuration. It supports loading configuration from TOML files and
//! provides validation to ensure all required configuration values are
//! properly set.
//!
//! ## Modular Configuration Support
//!
//! Configurations can be split into multiple files for better organization:
//! - Use `include = ["file1.toml", "file2.toml"]` to include other config files
//! - Each top-level section must be unique across all files (no duplicates allowed)

mod loader;

#[cfg(any(test, feature = "testing"))]
pub mod builders;

use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use staking_types::{ChainBalance, ChainKey, LifecycleSchedule, Pool};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// Error that occurs during file I/O operations.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// Error that occurs when parsing TOML configuration.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// Error that occurs when configuration validation fails.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// Extract just the message without the huge input dump
		let message = err.message().to_string();
		ConfigError::Parse(message)
	}
}

/// Main configuration structure for the staking tracker.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
	/// Configuration specific to this tracker instance.
	pub service: ServiceConfig,
	/// Supported source chains and their pools.
	#[serde(deserialize_with = "deserialize_chains")]
	pub chains: ChainsConfig,
	/// Delays of the simulated transaction lifecycle.
	#[serde(default)]
	pub lifecycle: LifecycleConfig,
	/// Balance refresh settings.
	#[serde(default)]
	pub balances: BalancesConfig,
	/// Notification settings.
	#[serde(default)]
	pub notifications: NotificationConfig,
	/// Simulated wallet submission settings.
	#[serde(default)]
	pub submission: SubmissionConfig,
}

/// Configuration specific to this tracker instance.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServiceConfig {
	/// Identifier used in logs.
	pub id: String,
}

/// Configuration of one pool on a chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PoolConfig {
	pub id: String,
	pub name: String,
	#[serde(default)]
	pub apy: f64,
}

/// Configuration of one supported chain.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChainConfig {
	/// EVM chain ID.
	pub chain_id: u64,
	/// Display name.
	pub name: String,
	/// Pools hosted on this chain.
	#[serde(default)]
	pub pools: Vec<PoolConfig>,
}

impl ChainConfig {
	/// Builds the zeroed balance record this chain starts with.
	pub fn zeroed_balance(&self, chain: ChainKey) -> ChainBalance {
		let pools = self
			.pools
			.iter()
			.map(|p| Pool::new(p.id.clone(), p.name.clone(), p.apy))
			.collect();
		ChainBalance::zeroed(chain, self.chain_id, self.name.clone(), pools)
	}
}

/// Chains keyed by chain key, in a stable order.
pub type ChainsConfig = BTreeMap<ChainKey, ChainConfig>;

/// Deserializes chain sections whose TOML keys are chain names.
fn deserialize_chains<'de, D>(deserializer: D) -> Result<ChainsConfig, D::Error>
where
	D: Deserializer<'de>,
{
	let string_map: BTreeMap<String, ChainConfig> = BTreeMap::deserialize(deserializer)?;
	let mut result = BTreeMap::new();

	for (key, value) in string_map {
		let chain = key
			.parse::<ChainKey>()
			.map_err(|e| serde::de::Error::custom(format!("Invalid chain '{}': {}", key, e)))?;
		result.insert(chain, value);
	}

	Ok(result)
}

/// Delays of the simulated transaction lifecycle, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LifecycleConfig {
	#[serde(default = "default_confirm_delay_seconds")]
	pub confirm_delay_seconds: u64,
	#[serde(default = "default_waiting_compose_delay_seconds")]
	pub waiting_compose_delay_seconds: u64,
	/// Cross-chain compose time. Defaults to 145 seconds.
	#[serde(default = "default_compose_duration_seconds")]
	pub compose_duration_seconds: u64,
	#[serde(default = "default_completion_delay_seconds")]
	pub completion_delay_seconds: u64,
}

fn default_confirm_delay_seconds() -> u64 {
	5
}

fn default_waiting_compose_delay_seconds() -> u64 {
	30
}

fn default_compose_duration_seconds() -> u64 {
	145
}

fn default_completion_delay_seconds() -> u64 {
	5
}

impl Default for LifecycleConfig {
	fn default() -> Self {
		Self {
			confirm_delay_seconds: default_confirm_delay_seconds(),
			waiting_compose_delay_seconds: default_waiting_compose_delay_seconds(),
			compose_duration_seconds: default_compose_duration_seconds(),
			completion_delay_seconds: default_completion_delay_seconds(),
		}
	}
}

impl LifecycleConfig {
	/// Converts the configured delays into a lifecycle schedule.
	pub fn schedule(&self) -> LifecycleSchedule {
		LifecycleSchedule {
			confirm_delay: Duration::from_secs(self.confirm_delay_seconds),
			waiting_compose_delay: Duration::from_secs(self.waiting_compose_delay_seconds),
			compose_duration: Duration::from_secs(self.compose_duration_seconds),
			completion_delay: Duration::from_secs(self.completion_delay_seconds),
		}
	}
}

/// Balance refresh settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BalancesConfig {
	/// Simulated fetch latency in milliseconds.
	#[serde(default = "default_refresh_delay_ms")]
	pub refresh_delay_ms: u64,
	/// Upper bound on a bulk refresh, in seconds.
	#[serde(default = "default_refresh_timeout_seconds")]
	pub refresh_timeout_seconds: u64,
}

fn default_refresh_delay_ms() -> u64 {
	1000
}

fn default_refresh_timeout_seconds() -> u64 {
	30
}

impl Default for BalancesConfig {
	fn default() -> Self {
		Self {
			refresh_delay_ms: default_refresh_delay_ms(),
			refresh_timeout_seconds: default_refresh_timeout_seconds(),
		}
	}
}

/// Notification settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct NotificationConfig {
	#[serde(default = "default_true")]
	pub enabled: bool,
	/// Token symbol shown in alerts.
	#[serde(default = "default_token_symbol")]
	pub token_symbol: String,
	/// Chain hosting the staking pool that compose messages are sent to.
	#[serde(default = "default_destination_chain")]
	pub destination_chain: ChainKey,
}

fn default_true() -> bool {
	true
}

fn default_token_symbol() -> String {
	"ETH".to_string()
}

fn default_destination_chain() -> ChainKey {
	ChainKey::Ethereum
}

impl Default for NotificationConfig {
	fn default() -> Self {
		Self {
			enabled: true,
			token_symbol: default_token_symbol(),
			destination_chain: default_destination_chain(),
		}
	}
}

/// Simulated wallet submission settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SubmissionConfig {
	/// Latency before the simulated wallet returns a hash, in milliseconds.
	#[serde(default = "default_submission_delay_ms")]
	pub simulated_delay_ms: u64,
}

fn default_submission_delay_ms() -> u64 {
	2000
}

impl Default for SubmissionConfig {
	fn default() -> Self {
		Self {
			simulated_delay_ms: default_submission_delay_ms(),
		}
	}
}

/// Resolves environment variables in a string.
///
/// Replaces ${VAR_NAME} with the value of the environment variable VAR_NAME.
/// Supports default values with ${VAR_NAME:-default_value}.
///
/// Input strings are limited to 1MB to prevent ReDoS attacks.
pub(crate) fn resolve_env_vars(input: &str) -> Result<String, ConfigError> {
	const MAX_INPUT_SIZE: usize = 1024 * 1024;
	if input.len() > MAX_INPUT_SIZE {
		return Err(ConfigError::Validation(format!(
			"Configuration file too large: {} bytes (max: {} bytes)",
			input.len(),
			MAX_INPUT_SIZE
		)));
	}

	let re = Regex::new(r"\$\{([A-Z_][A-Z0-9_]{0,127})(?::-([^}]{0,256}))?\}")
		.map_err(|e| ConfigError::Parse(format!("Regex error: {}", e)))?;

	let mut replacements = Vec::new();

	for cap in re.captures_iter(input) {
		let (Some(full_match), Some(var_name)) = (cap.get(0), cap.get(1)) else {
			continue;
		};
		let default_value = cap.get(2).map(|m| m.as_str());

		let value = match std::env::var(var_name.as_str()) {
			Ok(v) => v,
			Err(_) => match default_value {
				Some(default) => default.to_string(),
				None => {
					return Err(ConfigError::Validation(format!(
						"Environment variable '{}' not found",
						var_name.as_str()
					)));
				},
			},
		};

		replacements.push((full_match.start(), full_match.end(), value));
	}

	// Apply replacements in reverse order to maintain positions
	let mut result = input.to_string();
	for (start, end, value) in replacements.iter().rev() {
		result.replace_range(start..end, value);
	}

	Ok(result)
}

impl Config {
	/// Loads configuration from a file, following include directives.
	///
	/// Each top-level section must be unique across all configuration files.
	pub async fn from_file(path: &str) -> Result<Self, ConfigError> {
		let path_buf = Path::new(path);
		let base_dir = path_buf.parent().unwrap_or_else(|| Path::new("."));

		let mut loader = loader::ConfigLoader::new(base_dir);
		let file_name = path_buf
			.file_name()
			.ok_or_else(|| ConfigError::Validation(format!("Invalid path: {}", path)))?;
		loader.load_config(file_name).await
	}

	/// Returns the lifecycle schedule described by `[lifecycle]`.
	pub fn schedule(&self) -> LifecycleSchedule {
		self.lifecycle.schedule()
	}

	/// Builds the zeroed balance record of every configured chain.
	pub fn initial_balances(&self) -> Vec<ChainBalance> {
		self.chains
			.iter()
			.map(|(key, chain)| chain.zeroed_balance(*key))
			.collect()
	}

	/// Returns the configuration of a chain.
	pub fn chain(&self, chain: ChainKey) -> Option<&ChainConfig> {
		self.chains.get(&chain)
	}

	/// Validates the configuration to ensure all required fields are properly set.
	///
	/// - Ensures the service ID is not empty
	/// - Requires at least one chain, with unique chain IDs and pool IDs
	/// - Rejects a zero compose duration and a zero refresh timeout
	/// - Requires the notification destination chain to be configured
	fn validate(&self) -> Result<(), ConfigError> {
		if self.service.id.is_empty() {
			return Err(ConfigError::Validation("Service ID cannot be empty".into()));
		}

		if self.chains.is_empty() {
			return Err(ConfigError::Validation(
				"At least one chain must be configured".into(),
			));
		}

		let mut chain_ids = HashSet::new();
		for (key, chain) in &self.chains {
			if chain.name.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Chain {} must have a name",
					key
				)));
			}
			if !chain_ids.insert(chain.chain_id) {
				return Err(ConfigError::Validation(format!(
					"Chain ID {} is configured more than once",
					chain.chain_id
				)));
			}

			if chain.pools.is_empty() {
				return Err(ConfigError::Validation(format!(
					"Chain {} must have at least one pool",
					key
				)));
			}
			let mut pool_ids = HashSet::new();
			for pool in &chain.pools {
				if pool.id.is_empty() {
					return Err(ConfigError::Validation(format!(
						"Pool on chain {} has an empty id",
						key
					)));
				}
				if !pool_ids.insert(pool.id.as_str()) {
					return Err(ConfigError::Validation(format!(
						"Duplicate pool '{}' on chain {}",
						pool.id, key
					)));
				}
			}
		}

		if self.lifecycle.compose_duration_seconds == 0 {
			return Err(ConfigError::Validation(
				"lifecycle.compose_duration_seconds must be greater than zero".into(),
			));
		}

		if self.balances.refresh_timeout_seconds == 0 {
			return Err(ConfigError::Validation(
				"balances.refresh_timeout_seconds must be greater than zero".into(),
			));
		}

		if !self
			.chains
			.contains_key(&self.notifications.destination_chain)
		{
			return Err(ConfigError::Validation(format!(
				"Destination chain {} is not configured",
				self.notifications.destination_chain
			)));
		}

		Ok(())
	}
}

/// Parses configuration from a TOML string.
///
/// Environment variables are resolved and the configuration is validated
/// after parsing.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		tracing::debug!(
			service = %config.service.id,
			chains = config.chains.len(),
			"Parsed configuration"
		);
		Ok(config)
	}
}
