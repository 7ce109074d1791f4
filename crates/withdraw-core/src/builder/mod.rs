//! Builder for constructing an orchestrator from configuration.
//!
//! Account and delivery backends are created through factory functions keyed
//! by implementation name, so the binary decides which backends exist and the
//! configuration decides which one is primary.

use crate::orchestrator::{AuthorizationOrchestrator, AuthorizationSettings};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use withdraw_account::{AccountError, AccountInterface, AccountService};
use withdraw_config::Config;
use withdraw_delivery::{ConfirmationPolicy, DeliveryError, DeliveryInterface, DeliveryService};

/// Errors that can occur while building an orchestrator.
#[derive(Debug, Error)]
pub enum BuilderError {
	#[error("Configuration error: {0}")]
	Config(String),
	#[error("Missing required component: {0}")]
	MissingComponent(String),
}

/// Factory functions for every backend type, keyed by implementation name.
pub struct OrchestratorFactories<AF, DF> {
	pub account_factories: HashMap<String, AF>,
	pub delivery_factories: HashMap<String, DF>,
}

/// Picks the primary implementation out of the configured ones.
///
/// Every configured implementation with a known factory is created, so a bad
/// table fails the build even when it is not primary.
fn build_primary<T, E, F>(
	component: &'static str,
	primary: &str,
	configured: &HashMap<String, toml::Value>,
	factories: &HashMap<String, F>,
) -> Result<T, BuilderError>
where
	E: std::fmt::Display,
	F: Fn(&toml::Value) -> Result<T, E>,
{
	let mut loaded = HashMap::new();
	for (name, config) in configured {
		let Some(factory) = factories.get(name) else {
			tracing::warn!(component, implementation = %name, "No factory registered, skipping");
			continue;
		};
		match factory(config) {
			Ok(implementation) => {
				let is_primary = primary == name;
				tracing::info!(component, implementation = %name, enabled = %is_primary, "Loaded");
				loaded.insert(name.clone(), implementation);
			},
			Err(e) => {
				tracing::error!(
					component,
					implementation = %name,
					error = %e,
					"Failed to create implementation"
				);
				return Err(BuilderError::Config(format!(
					"Failed to create {} implementation '{}': {}",
					component, name, e
				)));
			},
		}
	}

	if loaded.is_empty() {
		return Err(BuilderError::MissingComponent(format!(
			"No {} implementations available",
			component
		)));
	}

	loaded.remove(primary).ok_or_else(|| {
		BuilderError::Config(format!(
			"Primary {} '{}' failed to load or has invalid configuration",
			component, primary
		))
	})
}

/// Builds an [`AuthorizationOrchestrator`] with pluggable backends.
pub struct OrchestratorBuilder {
	config: Config,
}

impl OrchestratorBuilder {
	pub fn new(config: Config) -> Self {
		Self { config }
	}

	pub async fn build<AF, DF>(
		self,
		factories: OrchestratorFactories<AF, DF>,
	) -> Result<AuthorizationOrchestrator, BuilderError>
	where
		AF: Fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>,
		DF: Fn(&toml::Value) -> Result<Box<dyn DeliveryInterface>, DeliveryError>,
	{
		let account_backend = build_primary(
			"account",
			&self.config.account.primary,
			&self.config.account.implementations,
			&factories.account_factories,
		)?;
		let account = Arc::new(AccountService::new(account_backend));

		let sender = account.get_address().await.map_err(|e| {
			tracing::error!(component = "account", error = %e, "Failed to get account address");
			BuilderError::Config(format!("Failed to get account address: {}", e))
		})?;
		tracing::info!(component = "account", address = %sender, "Resolved sender");

		let delivery_backend = build_primary(
			"delivery",
			&self.config.delivery.primary,
			&self.config.delivery.implementations,
			&factories.delivery_factories,
		)?;
		let policy = ConfirmationPolicy {
			max_polls: self.config.delivery.max_confirmation_polls,
			poll_interval: Duration::from_millis(self.config.delivery.poll_interval_ms),
		};
		let delivery = Arc::new(DeliveryService::new(delivery_backend, account.clone(), policy));

		let settings = AuthorizationSettings::from(&self.config.authorization);
		tracing::info!(
			program_id = %settings.program_id,
			verify_coordinator_signer = settings.verify_coordinator_signer,
			"Orchestrator ready"
		);
		Ok(AuthorizationOrchestrator::new(settings, account, delivery))
	}
}
