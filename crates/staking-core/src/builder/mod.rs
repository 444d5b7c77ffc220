//! Builder for constructing staking engines.
//!
//! Wires the event bus, both stores, the stake handler and the notification
//! dispatcher from a `Config`. Every external collaborator (clock, lifecycle
//! driver, balance fetcher, wallet submitter, notification sinks) has a
//! simulated default and can be replaced before building.

use crate::balances::{BalanceFetcher, BalanceStore, SimulatedBalanceFetcher};
use crate::engine::{event_bus::EventBus, StakingEngine};
use crate::handlers::{SimulatedSubmitter, StakeHandler, SubmissionInterface};
use crate::lifecycle::{Clock, LifecycleDriver, TimedLifecycle, TokioClock};
use crate::notifications::{
	LogNotificationSink, NotificationContext, NotificationDispatcher, NotificationSink,
};
use crate::transactions::TransactionStore;
use staking_config::Config;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Capacity of the event bus per subscriber.
const EVENT_BUS_CAPACITY: usize = 1000;

/// Errors that can occur during engine construction.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
}

/// Builder for constructing a `StakingEngine` with pluggable collaborators.
pub struct StakingBuilder {
	config: Config,
	clock: Option<Arc<dyn Clock>>,
	driver: Option<Arc<dyn LifecycleDriver>>,
	fetcher: Option<Arc<dyn BalanceFetcher>>,
	submitter: Option<Arc<dyn SubmissionInterface>>,
	sinks: Vec<Arc<dyn NotificationSink>>,
}

impl StakingBuilder {
	/// Creates a new StakingBuilder with the given configuration.
	pub fn new(config: Config) -> Self {
		Self {
			config,
			clock: None,
			driver: None,
			fetcher: None,
			submitter: None,
			sinks: Vec::new(),
		}
	}

	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = Some(clock);
		self
	}

	/// Replaces the timer-driven lifecycle, e.g. with a receipt poller.
	pub fn with_driver(mut self, driver: Arc<dyn LifecycleDriver>) -> Self {
		self.driver = Some(driver);
		self
	}

	pub fn with_fetcher(mut self, fetcher: Arc<dyn BalanceFetcher>) -> Self {
		self.fetcher = Some(fetcher);
		self
	}

	pub fn with_submitter(mut self, submitter: Arc<dyn SubmissionInterface>) -> Self {
		self.submitter = Some(submitter);
		self
	}

	/// Adds a notification sink. Without any, notifications go to the log.
	pub fn with_sink(mut self, sink: Arc<dyn NotificationSink>) -> Self {
		self.sinks.push(sink);
		self
	}

	/// Builds the StakingEngine.
	pub fn build(self) -> Result<StakingEngine, BuilderError> {
		let config = self.config;
		let schedule = config.schedule();

		let destination = config
			.chain(config.notifications.destination_chain)
			.ok_or_else(|| {
				BuilderError::Config(format!(
					"Destination chain '{}' is not configured",
					config.notifications.destination_chain
				))
			})?;

		let event_bus = EventBus::new(EVENT_BUS_CAPACITY);
		let clock = self.clock.unwrap_or_else(|| Arc::new(TokioClock::new()));
		let driver = self
			.driver
			.unwrap_or_else(|| Arc::new(TimedLifecycle::new(schedule)));
		let fetcher = self.fetcher.unwrap_or_else(|| {
			Arc::new(SimulatedBalanceFetcher::new(Duration::from_millis(
				config.balances.refresh_delay_ms,
			)))
		});
		let submitter = self.submitter.unwrap_or_else(|| {
			Arc::new(SimulatedSubmitter::new(Duration::from_millis(
				config.submission.simulated_delay_ms,
			)))
		});

		let transactions =
			TransactionStore::new(event_bus.clone(), clock.clone(), driver, schedule);
		let balances = BalanceStore::new(
			config.initial_balances(),
			event_bus.clone(),
			clock,
			fetcher,
			Duration::from_secs(config.balances.refresh_timeout_seconds),
		);
		tracing::info!(
			component = "balances",
			chains = config.chains.len(),
			"Loaded"
		);

		let stake_handler = Arc::new(StakeHandler::new(
			config.chains.clone(),
			transactions.clone(),
			balances.clone(),
			event_bus.clone(),
			submitter,
			schedule.time_to_compose_complete(),
		));

		let dispatcher = if config.notifications.enabled {
			let mut sinks = self.sinks;
			if sinks.is_empty() {
				sinks.push(Arc::new(LogNotificationSink));
			}
			tracing::info!(component = "notifications", sinks = sinks.len(), "Loaded");
			Some(NotificationDispatcher::new(
				&event_bus,
				sinks,
				NotificationContext {
					token_symbol: config.notifications.token_symbol.clone(),
					destination_name: destination.name.clone(),
					compose_duration: schedule.compose_duration,
				},
			))
		} else {
			tracing::info!(component = "notifications", "Disabled");
			None
		};

		Ok(StakingEngine::new(
			config,
			event_bus,
			transactions,
			balances,
			stake_handler,
			dispatcher,
		))
	}
}
