//! Main entry point for the staking tracker service.
//!
//! Loads the configuration, builds the staking engine with simulated wallet
//! and balance sources, optionally submits a demo deposit or withdrawal, and
//! runs until interrupted while lifecycle notifications are logged.

use clap::Parser;
use staking_config::Config;
use staking_core::{StakeHandler, StakingBuilder, StakingEngine};
use staking_types::{ChainKey, TransactionType};
use std::path::PathBuf;
use std::sync::Arc;

/// Command-line arguments for the staking service.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config.toml")]
	config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	log_level: String,

	/// Deposit this many ETH on startup
	#[arg(long, value_name = "AMOUNT", conflicts_with = "withdraw")]
	deposit: Option<String>,

	/// Withdraw this many ETH on startup
	#[arg(long, value_name = "AMOUNT")]
	withdraw: Option<String>,

	/// Source chain for the startup action (ethereum, flow, hedera)
	#[arg(long, default_value = "flow")]
	chain: ChainKey,
}

/// A stake submitted on startup.
#[derive(Debug, Clone, PartialEq)]
struct StartupAction {
	tx_type: TransactionType,
	chain: ChainKey,
	amount: String,
}

impl Args {
	fn startup_action(&self) -> Option<StartupAction> {
		let (tx_type, amount) = match (&self.deposit, &self.withdraw) {
			(Some(amount), _) => (TransactionType::Deposit, amount),
			(None, Some(amount)) => (TransactionType::Withdraw, amount),
			(None, None) => return None,
		};
		Some(StartupAction {
			tx_type,
			chain: self.chain,
			amount: amount.clone(),
		})
	}
}

/// Main entry point for the staking service.
///
/// This function:
/// 1. Parses command-line arguments
/// 2. Initializes logging infrastructure
/// 3. Loads configuration from file
/// 4. Builds the staking engine
/// 5. Runs the engine until interrupted
#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = Args::parse();

	// Initialize tracing with env filter
	use tracing_subscriber::{fmt, EnvFilter};

	let default_directive = args.log_level.to_string();
	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started staking tracker");

	let config_path = args
		.config
		.to_str()
		.ok_or("Configuration path is not valid UTF-8")?;
	let config = Config::from_file(config_path).await?;
	tracing::info!("Loaded configuration [{}]", config.service.id);

	let engine = build_engine(config)?;

	if let Some(action) = args.startup_action() {
		let handler = Arc::clone(engine.stake_handler());
		tokio::spawn(async move {
			if let Err(e) = run_action(&handler, &action).await {
				tracing::error!(error = %e, "Startup {} failed", action.tx_type);
			}
		});
	}

	engine.run().await?;

	tracing::info!("Stopped staking tracker");
	Ok(())
}

/// Builds the staking engine with the simulated collaborators.
fn build_engine(config: Config) -> Result<StakingEngine, Box<dyn std::error::Error>> {
	Ok(StakingBuilder::new(config).build()?)
}

/// Submits a startup action and returns the transaction id.
async fn run_action(
	handler: &StakeHandler,
	action: &StartupAction,
) -> Result<String, staking_core::StakeError> {
	let id = match action.tx_type {
		TransactionType::Deposit => handler.deposit(action.chain, &action.amount).await?,
		TransactionType::Withdraw => handler.withdraw(action.chain, &action.amount).await?,
	};
	tracing::info!(
		tx_id = %staking_types::truncate_id(&id),
		chain = %action.chain,
		amount = %action.amount,
		"Submitted startup {}",
		action.tx_type
	);
	Ok(id)
}
