//! Configuration for the withdrawal authorizer.
//!
//! Configuration is read from a TOML file. String values may reference
//! environment variables as `${VAR}` or `${VAR:-default}`; references are
//! resolved before parsing. Backend-specific tables under
//! `[account.implementations.*]` and `[delivery.implementations.*]` are kept
//! as raw TOML and validated by each backend's schema when it is built.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use withdraw_types::{ed25519::MAX_SIGNATURES, Address};

/// Errors that can occur during configuration operations.
#[derive(Debug, Error)]
pub enum ConfigError {
	/// The configuration file could not be read.
	#[error("IO error: {0}")]
	Io(#[from] std::io::Error),
	/// The file is not valid TOML for the configuration layout.
	#[error("Configuration error: {0}")]
	Parse(String),
	/// The configuration parsed but failed validation.
	#[error("Validation error: {0}")]
	Validation(String),
}

impl From<toml::de::Error> for ConfigError {
	fn from(err: toml::de::Error) -> Self {
		// The full error embeds the whole input; keep only the message.
		ConfigError::Parse(err.message().to_string())
	}
}

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
	pub authorization: AuthorizationConfig,
	pub account: AccountConfig,
	pub delivery: DeliveryConfig,
}

/// Settings of the authorization flow itself.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthorizationConfig {
	/// Custody program that owns the collateral, coordinator and approval accounts.
	pub program_id: Address,
	/// Upper bound on entries per signature-verification instruction.
	#[serde(default = "default_max_signatures")]
	pub max_signatures: usize,
	/// Check the supplied coordinator signature against the selected approver
	/// before submitting the withdrawal.
	#[serde(default = "default_true")]
	pub verify_coordinator_signer: bool,
	/// Substrings of a ledger rejection that mean the approval already exists.
	#[serde(default = "default_duplicate_markers")]
	pub duplicate_approval_markers: Vec<String>,
}

fn default_max_signatures() -> usize {
	MAX_SIGNATURES
}

fn default_true() -> bool {
	true
}

fn default_duplicate_markers() -> Vec<String> {
	vec!["already in use".to_string(), "AlreadyApproved".to_string()]
}

/// Signer backends.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AccountConfig {
	/// Which implementation signs transactions and custody digests.
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
}

/// Ledger transport backends.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DeliveryConfig {
	/// Which implementation transactions are sent through.
	pub primary: String,
	pub implementations: HashMap<String, toml::Value>,
	/// Status checks before a submitted transaction is reported as timed out.
	#[serde(default = "default_max_confirmation_polls")]
	pub max_confirmation_polls: u32,
	/// Delay between status checks.
	#[serde(default = "default_poll_interval_ms")]
	pub poll_interval_ms: u64,
}

fn default_max_confirmation_polls() -> u32 {
	30
}

fn default_poll_interval_ms() -> u64 {
	2000
}

/// Resolves `${VAR}` and `${VAR:-default}` references.
///
/// Input is limited to 1MB.
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

	let mut missing = None;
	let resolved = re.replace_all(input, |cap: &regex::Captures<'_>| {
		let name = &cap[1];
		match (std::env::var(name), cap.get(2)) {
			(Ok(value), _) => value,
			(Err(_), Some(default)) => default.as_str().to_string(),
			(Err(_), None) => {
				missing.get_or_insert_with(|| name.to_string());
				String::new()
			},
		}
	});

	match missing {
		Some(name) => Err(ConfigError::Validation(format!(
			"Environment variable '{}' not found",
			name
		))),
		None => Ok(resolved.into_owned()),
	}
}

impl Config {
	/// Reads, resolves and validates a configuration file.
	pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
		let path = path.as_ref();
		let content = tokio::fs::read_to_string(path).await.map_err(|e| {
			ConfigError::Io(std::io::Error::new(
				e.kind(),
				format!("Cannot read {}: {}", path.display(), e),
			))
		})?;
		content.parse()
	}

	/// Checks cross-field constraints that serde cannot express.
	fn validate(&self) -> Result<(), ConfigError> {
		let auth = &self.authorization;
		if auth.max_signatures == 0 || auth.max_signatures > MAX_SIGNATURES {
			return Err(ConfigError::Validation(format!(
				"authorization.max_signatures must be between 1 and {}",
				MAX_SIGNATURES
			)));
		}
		if auth.duplicate_approval_markers.iter().any(|m| m.is_empty()) {
			return Err(ConfigError::Validation(
				"authorization.duplicate_approval_markers cannot contain empty strings".into(),
			));
		}

		check_primary("account", &self.account.primary, &self.account.implementations)?;
		check_primary("delivery", &self.delivery.primary, &self.delivery.implementations)?;

		if self.delivery.max_confirmation_polls == 0 {
			return Err(ConfigError::Validation(
				"delivery.max_confirmation_polls must be at least 1".into(),
			));
		}
		if self.delivery.poll_interval_ms == 0 || self.delivery.poll_interval_ms > 60_000 {
			return Err(ConfigError::Validation(
				"delivery.poll_interval_ms must be between 1 and 60000".into(),
			));
		}
		Ok(())
	}
}

fn check_primary(
	section: &str,
	primary: &str,
	implementations: &HashMap<String, toml::Value>,
) -> Result<(), ConfigError> {
	if implementations.is_empty() {
		return Err(ConfigError::Validation(format!(
			"At least one {} implementation required",
			section
		)));
	}
	if primary.is_empty() {
		return Err(ConfigError::Validation(format!(
			"{} primary implementation cannot be empty",
			section
		)));
	}
	if !implementations.contains_key(primary) {
		return Err(ConfigError::Validation(format!(
			"Primary {} '{}' not found in implementations",
			section, primary
		)));
	}
	Ok(())
}

/// Parses TOML after resolving environment references, then validates.
impl FromStr for Config {
	type Err = ConfigError;

	fn from_str(s: &str) -> Result<Self, Self::Err> {
		let resolved = resolve_env_vars(s)?;
		let config: Config = toml::from_str(&resolved)?;
		config.validate()?;
		Ok(config)
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use std::io::Write;

	const PROGRAM: &str = "Fg6PaFpoGXkYsidMpWTK6W2BeZ7FEfcYkg476zPFsLnS";

	fn base_config(extra_auth: &str, extra_delivery: &str) -> String {
		format!(
			r#"
[authorization]
program_id = "{PROGRAM}"
{extra_auth}

[account]
primary = "local"
[account.implementations.local]
private_key = "0x{key}"

[delivery]
primary = "rpc"
{extra_delivery}
[delivery.implementations.rpc]
rpc_url = "http://localhost:8899"
"#,
			key = "11".repeat(32)
		)
	}

	#[test]
	fn test_env_var_resolution() {
		std::env::set_var("WITHDRAW_TEST_HOST", "localhost");
		std::env::set_var("WITHDRAW_TEST_PORT", "8899");

		let input = "url = \"http://${WITHDRAW_TEST_HOST}:${WITHDRAW_TEST_PORT}\"";
		let result = resolve_env_vars(input).unwrap();
		assert_eq!(result, "url = \"http://localhost:8899\"");

		std::env::remove_var("WITHDRAW_TEST_HOST");
		std::env::remove_var("WITHDRAW_TEST_PORT");
	}

	#[test]
	fn test_env_var_with_default() {
		let result = resolve_env_vars("value = \"${WITHDRAW_MISSING_VAR:-fallback}\"").unwrap();
		assert_eq!(result, "value = \"fallback\"");
	}

	#[test]
	fn test_missing_env_var_error() {
		let err = resolve_env_vars("value = \"${WITHDRAW_MISSING_VAR}\"").unwrap_err();
		assert!(err.to_string().contains("WITHDRAW_MISSING_VAR"));
	}

	#[test]
	fn test_defaults() {
		let config: Config = base_config("", "").parse().unwrap();
		assert_eq!(config.authorization.program_id.to_string(), PROGRAM);
		assert_eq!(config.authorization.max_signatures, 255);
		assert!(config.authorization.verify_coordinator_signer);
		assert_eq!(
			config.authorization.duplicate_approval_markers,
			vec!["already in use", "AlreadyApproved"]
		);
		assert_eq!(config.delivery.max_confirmation_polls, 30);
		assert_eq!(config.delivery.poll_interval_ms, 2000);
	}

	#[test]
	fn test_overrides() {
		let config: Config = base_config(
			"verify_coordinator_signer = false\nduplicate_approval_markers = [\"custom\"]",
			"max_confirmation_polls = 3\npoll_interval_ms = 10",
		)
		.parse()
		.unwrap();
		assert!(!config.authorization.verify_coordinator_signer);
		assert_eq!(config.authorization.duplicate_approval_markers, vec!["custom"]);
		assert_eq!(config.delivery.max_confirmation_polls, 3);
		assert_eq!(config.delivery.poll_interval_ms, 10);
	}

	#[test]
	fn test_validation_failures() {
		let cases = [
			base_config("max_signatures = 0", ""),
			base_config("max_signatures = 256", ""),
			base_config("duplicate_approval_markers = [\"\"]", ""),
			base_config("", "max_confirmation_polls = 0"),
			base_config("", "poll_interval_ms = 0"),
			base_config("", "").replace("primary = \"rpc\"", "primary = \"missing\""),
		];
		for case in cases {
			assert!(
				matches!(Config::from_str(&case), Err(ConfigError::Validation(_))),
				"expected validation error for {case}"
			);
		}
	}

	#[test]
	fn test_invalid_program_id() {
		let config = base_config("", "").replace(PROGRAM, "not-base58-0OIl");
		assert!(matches!(
			Config::from_str(&config),
			Err(ConfigError::Parse(_))
		));
	}

	#[tokio::test]
	async fn test_from_file() {
		let mut file = tempfile::NamedTempFile::new().unwrap();
		file.write_all(base_config("", "").as_bytes()).unwrap();

		let config = Config::from_file(file.path()).await.unwrap();
		assert_eq!(config.account.primary, "local");
		assert!(config.delivery.implementations.contains_key("rpc"));

		let missing = Config::from_file("/nonexistent/withdraw.toml").await;
		assert!(matches!(missing, Err(ConfigError::Io(_))));
	}
}
