//! Fixed-schedule lifecycle driver.
//!
//! Sleeps through each stage of the lifecycle schedule and advances the
//! transaction when the stage delay elapses, standing in for source-chain
//! confirmation and cross-chain compose.

use super::LifecycleDriver;
use crate::transactions::TransactionStore;
use async_trait::async_trait;
use staking_types::{truncate_id, LifecycleSchedule};
use tracing::instrument;

/// Drives transactions through `LifecycleSchedule` on timers.
#[derive(Debug, Clone, Default)]
pub struct TimedLifecycle {
	schedule: LifecycleSchedule,
}

impl TimedLifecycle {
	pub fn new(schedule: LifecycleSchedule) -> Self {
		Self { schedule }
	}
}

#[async_trait]
impl LifecycleDriver for TimedLifecycle {
	#[instrument(skip_all, fields(tx_id = %truncate_id(transaction_id)))]
	async fn drive(&self, transaction_id: &str, store: &TransactionStore) {
		let start_time = tokio::time::Instant::now();

		for (delay, status) in self.schedule.stages() {
			tokio::time::sleep(delay).await;

			if store
				.update_transaction_status(transaction_id, status, None)
				.await
				.is_none()
			{
				tracing::debug!(
					status = %status,
					elapsed_secs = start_time.elapsed().as_secs(),
					"Stopping lifecycle, transaction no longer advances"
				);
				return;
			}

			tracing::debug!(
				status = %status,
				elapsed_secs = start_time.elapsed().as_secs(),
				"Lifecycle stage reached"
			);
		}
	}
}
