//! Command-line arguments of the `withdraw` binary.

use clap::Parser;
use std::path::PathBuf;
use withdraw_types::utils::{parse_hex_array, EncodingError};
use withdraw_types::{Address, Salt, WithdrawParams};

/// Authorizes and submits one collateral withdrawal.
///
/// Withdrawal parameters come from the external signing service; every flag
/// can also be supplied through the environment.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
	/// Path to configuration file
	#[arg(short, long, default_value = "config/withdraw.toml")]
	pub config: PathBuf,

	/// Log level (trace, debug, info, warn, error)
	#[arg(short, long, default_value = "info")]
	pub log_level: String,

	/// Collateral account funds are withdrawn from (base58)
	#[arg(long, env = "WITHDRAW_COLLATERAL_PROXY")]
	pub collateral_proxy: Address,

	/// Token mint being withdrawn (base58)
	#[arg(long, env = "WITHDRAW_ASSET")]
	pub asset: Address,

	/// Amount in the asset's smallest unit
	#[arg(long, env = "WITHDRAW_AMOUNT")]
	pub amount: u64,

	/// Owner of the destination token account (base58)
	#[arg(long, env = "WITHDRAW_RECIPIENT")]
	pub recipient: Address,

	/// Expiry as unix seconds
	#[arg(long, env = "WITHDRAW_EXPIRES_AT")]
	pub expires_at: u64,

	/// Coordinator domain salt (32 bytes, hex)
	#[arg(long, env = "WITHDRAW_SALT")]
	pub salt: Salt,

	/// Coordinator approver's signature (64 bytes, hex)
	#[arg(long, env = "WITHDRAW_COORDINATOR_SIGNATURE", value_parser = parse_signature)]
	pub coordinator_signature: [u8; 64],
}

fn parse_signature(input: &str) -> Result<[u8; 64], EncodingError> {
	parse_hex_array::<64>("coordinator_signature", input)
}

impl Args {
	pub fn withdraw_params(&self) -> WithdrawParams {
		WithdrawParams {
			collateral_proxy: self.collateral_proxy,
			asset: self.asset,
			amount: self.amount,
			recipient: self.recipient,
			expires_at: self.expires_at,
			salt: self.salt,
			coordinator_signature: self.coordinator_signature,
		}
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	fn base_args(signature: &str) -> Vec<String> {
		vec![
			"withdraw".into(),
			"--collateral-proxy".into(),
			Address([1; 32]).to_string(),
			"--asset".into(),
			Address([2; 32]).to_string(),
			"--amount".into(),
			"1000000".into(),
			"--recipient".into(),
			Address([3; 32]).to_string(),
			"--expires-at".into(),
			"1763066371".into(),
			"--salt".into(),
			format!("0x{}", "ab".repeat(32)),
			"--coordinator-signature".into(),
			signature.into(),
		]
	}

	#[test]
	fn test_parse_withdraw_params() {
		let args = Args::try_parse_from(base_args(&"cd".repeat(64))).unwrap();
		assert_eq!(args.config, PathBuf::from("config/withdraw.toml"));
		assert_eq!(args.log_level, "info");

		let params = args.withdraw_params();
		assert_eq!(params.collateral_proxy, Address([1; 32]));
		assert_eq!(params.amount, 1_000_000);
		assert_eq!(params.expires_at, 1_763_066_371);
		assert_eq!(params.salt, Salt([0xab; 32]));
		assert_eq!(params.coordinator_signature, [0xcd; 64]);
	}

	#[test]
	fn test_short_signature_rejected() {
		assert!(Args::try_parse_from(base_args(&"cd".repeat(63))).is_err());
	}

	#[test]
	fn test_bad_address_rejected() {
		let mut args = base_args(&"cd".repeat(64));
		args[2] = "not-base58-0OIl".into();
		assert!(Args::try_parse_from(args).is_err());
	}
}
