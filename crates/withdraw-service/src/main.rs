//! Main entry point for the withdrawal authorizer.
//!
//! Loads configuration, wires the configured signer and ledger transport into
//! an orchestrator and authorizes the withdrawal described on the command
//! line. The withdraw transaction id is printed on success.

use clap::Parser;
use withdraw_config::Config;
use withdraw_core::{
	AuthorizationOrchestrator, CustodyApproval, OrchestratorBuilder, OrchestratorFactories,
};

mod cli;

use withdraw_account::implementations::local::create_account;
use withdraw_delivery::implementations::memory::create_memory_delivery;
use withdraw_delivery::implementations::rpc::create_rpc_delivery;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
	let args = cli::Args::parse();

	use tracing_subscriber::{fmt, EnvFilter};

	let env_filter =
		EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));

	fmt()
		.with_env_filter(env_filter)
		.with_thread_ids(true)
		.with_target(true)
		.init();

	tracing::info!("Started withdraw");

	let config = Config::from_file(&args.config).await?;
	tracing::info!(
		program_id = %config.authorization.program_id,
		account = %config.account.primary,
		delivery = %config.delivery.primary,
		"Loaded configuration"
	);

	let orchestrator = build_orchestrator(config).await?;
	let outcome = orchestrator
		.authorize_withdrawal(&args.withdraw_params())
		.await?;

	match &outcome.custody_approval {
		CustodyApproval::AlreadyRecorded => tracing::info!("Custody approval was already recorded"),
		CustodyApproval::Submitted(hash) => {
			tracing::info!(tx_hash = %hash, "Custody approval submitted")
		},
		CustodyApproval::DuplicateIgnored { reason } => {
			tracing::info!(reason = %reason, "Custody approval recorded concurrently")
		},
	}
	tracing::info!(
		tx_hash = %outcome.withdraw_signature,
		slot = outcome.receipt.slot,
		approval_record = %outcome.approval_record,
		"Withdrawal confirmed"
	);
	println!("{}", outcome.withdraw_signature);

	Ok(())
}

/// Creates a factory HashMap for one backend interface.
macro_rules! create_factory_map {
    ($interface:path, $error:path, $( $name:literal => $factory:expr ),* $(,)?) => {{
        let mut factories = std::collections::HashMap::new();
        $(
            factories.insert(
                $name.to_string(),
                $factory as fn(&toml::Value) -> Result<Box<dyn $interface>, $error>
            );
        )*
        factories
    }};
}

/// Wires every built-in backend into the orchestrator builder.
async fn build_orchestrator(
	config: Config,
) -> Result<AuthorizationOrchestrator, Box<dyn std::error::Error>> {
	let account_factories = create_factory_map!(
		withdraw_account::AccountInterface,
		withdraw_account::AccountError,
		"local" => create_account,
	);

	let delivery_factories = create_factory_map!(
		withdraw_delivery::DeliveryInterface,
		withdraw_delivery::DeliveryError,
		"rpc" => create_rpc_delivery,
		"memory" => create_memory_delivery,
	);

	let factories = OrchestratorFactories {
		account_factories,
		delivery_factories,
	};

	Ok(OrchestratorBuilder::new(config).build(factories).await?)
}
