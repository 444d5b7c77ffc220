//! Transaction types for the staking tracker.
//!
//! This module defines the transaction record tracked from submission to
//! completion, its lifecycle states, and the fixed schedule that drives a
//! transaction through those states.

use crate::utils::{format_eth_amount, format_remaining};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Placeholder hash carried until the wallet layer reports the real one.
pub const PENDING_HASH: &str = "pending";

/// Delay between submission and on-chain confirmation.
pub const CONFIRM_DELAY: Duration = Duration::from_secs(5);
/// Delay between confirmation and the start of cross-chain compose.
pub const WAITING_COMPOSE_DELAY: Duration = Duration::from_secs(30);
/// Time the cross-chain message takes to compose on the destination chain.
pub const COMPOSE_DURATION: Duration = Duration::from_secs(145);
/// Delay between compose completion and final completion.
pub const COMPLETION_DELAY: Duration = Duration::from_secs(5);

/// Kind of staking action a transaction represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
	/// ETH moved from the user into the staking pool.
	Deposit,
	/// ETH moved from the staking pool back to the user.
	Withdraw,
}

impl fmt::Display for TransactionType {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			TransactionType::Deposit => write!(f, "deposit"),
			TransactionType::Withdraw => write!(f, "withdraw"),
		}
	}
}

/// Lifecycle state of a transaction.
///
/// Transactions move `Pending -> Confirmed -> WaitingCompose ->
/// ComposeComplete -> Completed`. `Failed` is reachable from every
/// non-terminal state. `Completed` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
	/// Submitted, waiting for the source chain to confirm it.
	Pending,
	/// Confirmed on the source chain.
	Confirmed,
	/// Cross-chain message is being composed on the destination chain.
	WaitingCompose,
	/// Cross-chain message has been composed.
	ComposeComplete,
	/// Stake is settled.
	Completed,
	/// Submission or settlement failed.
	Failed,
}

impl TransactionStatus {
	/// Returns true for `Completed` and `Failed`.
	pub fn is_terminal(&self) -> bool {
		matches!(self, TransactionStatus::Completed | TransactionStatus::Failed)
	}

	/// Returns the wire name of the status.
	pub fn as_str(&self) -> &'static str {
		match self {
			TransactionStatus::Pending => "pending",
			TransactionStatus::Confirmed => "confirmed",
			TransactionStatus::WaitingCompose => "waiting_compose",
			TransactionStatus::ComposeComplete => "compose_complete",
			TransactionStatus::Completed => "completed",
			TransactionStatus::Failed => "failed",
		}
	}
}

impl fmt::Display for TransactionStatus {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(self.as_str())
	}
}

/// A staking transaction tracked by the transaction store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
	/// Unique identifier generated at creation.
	pub id: String,
	/// Chain transaction hash, `PENDING_HASH` until known.
	pub hash: String,
	/// Deposit or withdraw.
	#[serde(rename = "type")]
	pub tx_type: TransactionType,
	/// Chain ID of the source chain.
	pub chain_id: u64,
	/// Display name of the source chain.
	pub chain_name: String,
	/// Raw amount in ETH as a decimal string.
	pub amount: String,
	/// Display form of `amount`.
	pub amount_formatted: String,
	/// APY snapshot at submission time.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub apy: Option<f64>,
	/// Current lifecycle state.
	pub status: TransactionStatus,
	/// Creation time of the current run in milliseconds since the UNIX epoch.
	pub timestamp: u64,
	/// First time the run entered `Confirmed`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub confirmation_time: Option<u64>,
	/// First time the run entered `ComposeComplete`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub compose_completion_time: Option<u64>,
	/// First time the run entered `Completed`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub completion_time: Option<u64>,
	/// Failure message, only set on `Failed`.
	#[serde(skip_serializing_if = "Option::is_none")]
	pub error: Option<String>,
}

impl Transaction {
	/// Returns true if the transaction reached `Completed` or `Failed`.
	pub fn is_terminal(&self) -> bool {
		self.status.is_terminal()
	}
}

/// Caller-supplied data for a new transaction.
///
/// `status` is informational only: every transaction starts in `Pending`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
	#[serde(rename = "type")]
	pub tx_type: TransactionType,
	pub chain_id: u64,
	#[serde(default)]
	pub chain_name: String,
	pub amount: String,
	#[serde(default)]
	pub amount_formatted: String,
	#[serde(default)]
	pub apy: Option<f64>,
	/// Known hash, if the wallet already returned one.
	#[serde(default)]
	pub hash: Option<String>,
	#[serde(default)]
	pub status: Option<TransactionStatus>,
}

impl NewTransaction {
	/// Creates transaction data with the display amount derived from `amount`.
	pub fn new(
		tx_type: TransactionType,
		chain_id: u64,
		chain_name: impl Into<String>,
		amount: impl Into<String>,
	) -> Self {
		let amount = amount.into();
		Self {
			tx_type,
			chain_id,
			chain_name: chain_name.into(),
			amount_formatted: format_eth_amount(&amount),
			amount,
			apy: None,
			hash: None,
			status: None,
		}
	}

	/// Attaches an APY snapshot.
	pub fn with_apy(mut self, apy: f64) -> Self {
		self.apy = Some(apy);
		self
	}
}

/// Fixed delays that move a transaction through its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LifecycleSchedule {
	/// `Pending -> Confirmed`.
	pub confirm_delay: Duration,
	/// `Confirmed -> WaitingCompose`.
	pub waiting_compose_delay: Duration,
	/// `WaitingCompose -> ComposeComplete`.
	pub compose_duration: Duration,
	/// `ComposeComplete -> Completed`.
	pub completion_delay: Duration,
}

impl Default for LifecycleSchedule {
	fn default() -> Self {
		Self {
			confirm_delay: CONFIRM_DELAY,
			waiting_compose_delay: WAITING_COMPOSE_DELAY,
			compose_duration: COMPOSE_DURATION,
			completion_delay: COMPLETION_DELAY,
		}
	}
}

impl LifecycleSchedule {
	/// Delay before each automatic transition, in order.
	pub fn stages(&self) -> [(Duration, TransactionStatus); 4] {
		[
			(self.confirm_delay, TransactionStatus::Confirmed),
			(self.waiting_compose_delay, TransactionStatus::WaitingCompose),
			(self.compose_duration, TransactionStatus::ComposeComplete),
			(self.completion_delay, TransactionStatus::Completed),
		]
	}

	/// Time from creation until the cross-chain message is composed.
	pub fn time_to_compose_complete(&self) -> Duration {
		self.confirm_delay + self.waiting_compose_delay + self.compose_duration
	}

	/// Time from creation until completion.
	pub fn total(&self) -> Duration {
		self.time_to_compose_complete() + self.completion_delay
	}
}

/// Returns the human-readable completion estimate for a transaction.
///
/// While composing, the remaining time is measured against the compose budget
/// from the transaction's creation time and rendered as `M:SS remaining`.
/// Once the budget is spent the estimate falls back to `"Finalizing..."`.
pub fn estimated_completion_time(
	transaction: &Transaction,
	now_ms: u64,
	schedule: &LifecycleSchedule,
) -> String {
	match transaction.status {
		TransactionStatus::Pending => "Waiting for confirmation".to_string(),
		TransactionStatus::Confirmed => "Preparing cross-chain message".to_string(),
		TransactionStatus::WaitingCompose => {
			let elapsed = now_ms.saturating_sub(transaction.timestamp);
			let budget = schedule.compose_duration.as_millis() as u64;
			match budget.checked_sub(elapsed) {
				Some(remaining) if remaining > 0 => format_remaining(remaining),
				_ => "Finalizing...".to_string(),
			}
		}
		TransactionStatus::ComposeComplete => "Almost done".to_string(),
		TransactionStatus::Completed => "Completed".to_string(),
		TransactionStatus::Failed => "Failed".to_string(),
	}
}

/// Returns the progress-bar percentage for a transaction.
///
/// The compose phase fills the bar from 25% to 90% linearly over the compose
/// budget measured from creation.
pub fn progress_percent(transaction: &Transaction, now_ms: u64, schedule: &LifecycleSchedule) -> u8 {
	match transaction.status {
		TransactionStatus::Pending => 10,
		TransactionStatus::Confirmed => 25,
		TransactionStatus::WaitingCompose => {
			let elapsed = now_ms.saturating_sub(transaction.timestamp) as u128;
			let budget = schedule.compose_duration.as_millis().max(1);
			let filled = (elapsed.min(budget) * 65 / budget) as u8;
			25 + filled
		}
		TransactionStatus::ComposeComplete => 95,
		TransactionStatus::Completed => 100,
		TransactionStatus::Failed => 0,
	}
}
