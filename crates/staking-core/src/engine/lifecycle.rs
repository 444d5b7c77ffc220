//! Lifecycle management for the staking engine.
//!
//! Handles the startup balance refresh and teardown of running timers.

use super::StakingEngine;

impl StakingEngine {
	/// Loads the initial balances. A failed refresh is logged, not fatal.
	pub async fn initialize(&self) -> Result<(), super::EngineError> {
		tracing::info!(service_id = %self.config.service.id, "Initializing staking engine");

		if let Err(e) = self.balances.refresh_balances().await {
			tracing::warn!(error = %e, "Initial balance refresh failed");
		}
		Ok(())
	}

	/// Stops every lifecycle timer and pending settlement.
	pub async fn shutdown(&self) -> Result<(), super::EngineError> {
		tracing::info!("Shutting down staking engine");

		self.transactions.shutdown().await;
		self.stake_handler.shutdown().await;
		Ok(())
	}
}
