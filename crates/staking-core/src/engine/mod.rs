//! Application root for the staking tracker.
//!
//! The `StakingEngine` owns both stores, the stake handler and the
//! notification dispatcher, and runs the dispatcher until shutdown. Nothing
//! here is global: presentation layers receive the stores from the engine.

pub mod event_bus;
pub mod lifecycle;

use crate::balances::BalanceStore;
use crate::handlers::StakeHandler;
use crate::notifications::NotificationDispatcher;
use crate::transactions::TransactionStore;
use staking_config::Config;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;

/// Errors that can occur during engine operations.
#[derive(Debug, Error)]
pub enum EngineError {
	#[error("Service error: {0}")]
	Service(String),
}

/// Main engine that owns and wires the stores.
#[derive(Clone)]
pub struct StakingEngine {
	pub(crate) config: Config,
	pub(crate) event_bus: event_bus::EventBus,
	pub(crate) transactions: TransactionStore,
	pub(crate) balances: BalanceStore,
	pub(crate) stake_handler: Arc<StakeHandler>,
	/// Taken when the engine starts running. `None` when notifications are
	/// disabled.
	pub(crate) dispatcher: Arc<Mutex<Option<NotificationDispatcher>>>,
	running: Arc<AtomicBool>,
}

impl StakingEngine {
	pub fn new(
		config: Config,
		event_bus: event_bus::EventBus,
		transactions: TransactionStore,
		balances: BalanceStore,
		stake_handler: Arc<StakeHandler>,
		dispatcher: Option<NotificationDispatcher>,
	) -> Self {
		Self {
			config,
			event_bus,
			transactions,
			balances,
			stake_handler,
			dispatcher: Arc::new(Mutex::new(dispatcher)),
			running: Arc::new(AtomicBool::new(false)),
		}
	}

	/// Runs until ctrl-c, then shuts down.
	pub async fn run(&self) -> Result<(), EngineError> {
		self.run_until(async {
			if let Err(e) = tokio::signal::ctrl_c().await {
				tracing::error!(error = %e, "Failed to listen for shutdown signal");
			}
		})
		.await
	}

	/// Runs until `shutdown_signal` resolves, then shuts down.
	pub async fn run_until<F>(&self, shutdown_signal: F) -> Result<(), EngineError>
	where
		F: Future<Output = ()>,
	{
		if self.running.swap(true, Ordering::SeqCst) {
			return Err(EngineError::Service("Engine is already running".into()));
		}

		let dispatcher_handle = self
			.dispatcher
			.lock()
			.await
			.take()
			.map(|dispatcher| tokio::spawn(dispatcher.run()));

		self.initialize().await?;

		shutdown_signal.await;

		if let Some(handle) = dispatcher_handle {
			handle.abort();
		}
		self.shutdown().await
	}

	/// Returns a reference to the event bus.
	pub fn event_bus(&self) -> &event_bus::EventBus {
		&self.event_bus
	}

	/// Returns a reference to the configuration.
	pub fn config(&self) -> &Config {
		&self.config
	}

	pub fn transactions(&self) -> &TransactionStore {
		&self.transactions
	}

	pub fn balances(&self) -> &BalanceStore {
		&self.balances
	}

	pub fn stake_handler(&self) -> &Arc<StakeHandler> {
		&self.stake_handler
	}
}
