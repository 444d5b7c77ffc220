//! Wallet submission interface.
//!
//! Submitting a deposit or withdrawal is an opaque async action that yields a
//! transaction hash. The simulated submitter derives a unique hash after a
//! fixed delay so the full staking flow can run without a wallet.

use async_trait::async_trait;
use sha3::{Digest, Keccak256};
use staking_types::{ChainKey, TransactionType};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use thiserror::Error;

/// Errors reported by the wallet layer.
#[derive(Debug, Error)]
pub enum SubmissionError {
	/// The user declined to sign.
	#[error("User rejected the request")]
	Rejected,
	/// The wallet or network failed to send the transaction.
	#[error("Submission failed: {0}")]
	Failed(String),
}

/// A deposit or withdrawal to send.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionRequest {
	pub tx_type: TransactionType,
	pub chain: ChainKey,
	pub chain_id: u64,
	/// Raw amount in ETH as a decimal string.
	pub amount: String,
}

/// Wallet and contract layer that sends staking transactions.
#[async_trait]
pub trait SubmissionInterface: Send + Sync {
	/// Sends the transaction and returns its hash.
	async fn submit(&self, request: SubmissionRequest) -> Result<String, SubmissionError>;
}

/// Submitter producing keccak-derived hashes after a delay.
pub struct SimulatedSubmitter {
	delay: Duration,
	nonce: AtomicU64,
}

impl SimulatedSubmitter {
	pub fn new(delay: Duration) -> Self {
		Self {
			delay,
			nonce: AtomicU64::new(0),
		}
	}
}

#[async_trait]
impl SubmissionInterface for SimulatedSubmitter {
	async fn submit(&self, request: SubmissionRequest) -> Result<String, SubmissionError> {
		tokio::time::sleep(self.delay).await;

		let nonce = self.nonce.fetch_add(1, Ordering::SeqCst);
		let mut hasher = Keccak256::new();
		hasher.update(request.tx_type.to_string().as_bytes());
		hasher.update(request.chain_id.to_be_bytes());
		hasher.update(request.amount.as_bytes());
		hasher.update(nonce.to_be_bytes());
		let hash = format!("0x{}", hex::encode(hasher.finalize()));

		tracing::debug!(
			chain = %request.chain,
			nonce,
			hash = %staking_types::truncate_id(&hash),
			"Simulated submission sent"
		);
		Ok(hash)
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn request() -> SubmissionRequest {
		SubmissionRequest {
			tx_type: TransactionType::Deposit,
			chain: ChainKey::Flow,
			chain_id: 545,
			amount: "5".to_string(),
		}
	}

	#[tokio::test(start_paused = true)]
	async fn test_hashes_are_unique_and_well_formed() {
		let submitter = SimulatedSubmitter::new(Duration::from_millis(2000));

		let first = submitter.submit(request()).await.unwrap();
		let second = submitter.submit(request()).await.unwrap();

		assert_ne!(first, second);
		for hash in [&first, &second] {
			assert!(hash.starts_with("0x"));
			assert_eq!(hash.len(), 66);
		}
	}
}
