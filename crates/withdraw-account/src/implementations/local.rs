//! Local Ed25519 signer backed by a private key from configuration.

use crate::{AccountError, AccountFactory, AccountInterface, AccountRegistry};
use async_trait::async_trait;
use ed25519_dalek::{Signer, SigningKey, SECRET_KEY_LENGTH};
use withdraw_types::{
	Address, ConfigSchema, Field, FieldType, ImplementationRegistry, Schema, SecretString,
	Signature, ValidationError,
};
use zeroize::Zeroizing;

/// Signs with an in-process Ed25519 key.
pub struct LocalAccount {
	signing_key: SigningKey,
}

impl LocalAccount {
	/// Accepts a hex encoded 32-byte secret or a 64-byte secret‖public keypair.
	pub fn new(private_key: &SecretString) -> Result<Self, AccountError> {
		let bytes = private_key
			.decode_hex()
			.map_err(|e| AccountError::InvalidKey(e.to_string()))?;

		let signing_key = match bytes.len() {
			SECRET_KEY_LENGTH => {
				let mut secret = Zeroizing::new([0u8; SECRET_KEY_LENGTH]);
				secret.copy_from_slice(&bytes);
				SigningKey::from_bytes(&secret)
			},
			64 => {
				let mut keypair = Zeroizing::new([0u8; 64]);
				keypair.copy_from_slice(&bytes);
				SigningKey::from_keypair_bytes(&keypair).map_err(|_| {
					AccountError::InvalidKey("public key does not match secret".into())
				})?
			},
			other => {
				return Err(AccountError::InvalidKey(format!(
					"expected 32 or 64 bytes, got {}",
					other
				)))
			},
		};
		Ok(Self { signing_key })
	}

	pub fn from_signing_key(signing_key: SigningKey) -> Self {
		Self { signing_key }
	}
}

#[async_trait]
impl AccountInterface for LocalAccount {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(LocalAccountSchema)
	}

	async fn address(&self) -> Result<Address, AccountError> {
		Ok(Address(self.signing_key.verifying_key().to_bytes()))
	}

	async fn sign_message(&self, message: &[u8]) -> Result<Signature, AccountError> {
		let signature = self
			.signing_key
			.try_sign(message)
			.map_err(|e| AccountError::SigningFailed(e.to_string()))?;
		Ok(Signature(signature.to_bytes()))
	}
}

pub struct LocalAccountSchema;

impl ConfigSchema for LocalAccountSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![Field::new("private_key", FieldType::HexBytes(&[32, 64]))],
			vec![],
		)
		.validate(config)
	}
}

/// Builds a [`LocalAccount`] from its configuration table.
///
/// Required: `private_key` (hex, optional `0x`).
pub fn create_account(config: &toml::Value) -> Result<Box<dyn AccountInterface>, AccountError> {
	LocalAccountSchema
		.validate(config)
		.map_err(|e| AccountError::InvalidKey(e.to_string()))?;

	let private_key = config
		.get("private_key")
		.and_then(|v| v.as_str())
		.map(SecretString::from)
		.ok_or_else(|| AccountError::InvalidKey("private_key is required".into()))?;

	Ok(Box::new(LocalAccount::new(&private_key)?))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "local";
	type Factory = AccountFactory;

	fn factory() -> Self::Factory {
		create_account
	}
}

impl AccountRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use ed25519_dalek::{Verifier, VerifyingKey};

	fn config(key: &str) -> toml::Value {
		toml::from_str(&format!("private_key = \"{key}\"")).unwrap()
	}

	#[tokio::test]
	async fn test_secret_and_keypair_forms_agree() {
		let secret = [7u8; 32];
		let signing_key = SigningKey::from_bytes(&secret);
		let keypair_hex = hex::encode(signing_key.to_keypair_bytes());

		let from_secret = create_account(&config(&format!("0x{}", hex::encode(secret)))).unwrap();
		let from_keypair = create_account(&config(&keypair_hex)).unwrap();

		let address = from_secret.address().await.unwrap();
		assert_eq!(address, from_keypair.address().await.unwrap());
		assert_eq!(address.0, signing_key.verifying_key().to_bytes());
	}

	#[tokio::test]
	async fn test_signatures_verify() {
		let account = LocalAccount::from_signing_key(SigningKey::from_bytes(&[3u8; 32]));
		let digest = [0x42u8; 32];
		let signature = account.sign_message(&digest).await.unwrap();

		let key = VerifyingKey::from_bytes(account.address().await.unwrap().as_bytes()).unwrap();
		key.verify(&digest, &ed25519_dalek::Signature::from_bytes(&signature.0))
			.unwrap();
	}

	#[test]
	fn test_invalid_keys() {
		assert!(create_account(&config("0x1234")).is_err());
		assert!(create_account(&config("zz")).is_err());
		assert!(create_account(&toml::Value::Table(toml::Table::new())).is_err());

		// Keypair whose public half belongs to another secret.
		let mut mismatched = SigningKey::from_bytes(&[1u8; 32]).to_keypair_bytes();
		let other = SigningKey::from_bytes(&[2u8; 32]).verifying_key();
		mismatched[32..].copy_from_slice(other.as_bytes());
		assert!(matches!(
			LocalAccount::new(&SecretString::new(hex::encode(mismatched))),
			Err(AccountError::InvalidKey(_))
		));
	}
}
