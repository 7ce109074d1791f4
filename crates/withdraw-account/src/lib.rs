//! Signer abstraction for the withdrawal authorizer.
//!
//! The account signs two kinds of payloads: serialized transaction messages
//! (as fee payer) and 32-byte custody digests that are later framed into a
//! signature-verification instruction.

use async_trait::async_trait;
use thiserror::Error;
use withdraw_types::{Address, ConfigSchema, ImplementationRegistry, Message, Signature};

pub mod implementations {
	pub mod local;
}

/// Errors that can occur during account operations.
#[derive(Debug, Error)]
pub enum AccountError {
	/// The backend could not produce a signature.
	#[error("Signing failed: {0}")]
	SigningFailed(String),
	/// A configured key is malformed or inconsistent.
	#[error("Invalid key: {0}")]
	InvalidKey(String),
	/// Any other backend failure.
	#[error("Implementation error: {0}")]
	Implementation(String),
}

/// A signing backend.
#[async_trait]
pub trait AccountInterface: Send + Sync {
	/// Schema of the backend's `[account.implementations.<name>]` table.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Public key of the signer. This is the custody sender and fee payer.
	async fn address(&self) -> Result<Address, AccountError>;

	/// Produces an Ed25519 signature over `message`.
	async fn sign_message(&self, message: &[u8]) -> Result<Signature, AccountError>;
}

pub type AccountFactory = fn(&toml::Value) -> Result<Box<dyn AccountInterface>, AccountError>;

pub trait AccountRegistry: ImplementationRegistry<Factory = AccountFactory> {}

/// All built-in account backends as (name, factory) pairs.
pub fn get_all_implementations() -> Vec<(&'static str, AccountFactory)> {
	use implementations::local;

	vec![(local::Registry::NAME, local::Registry::factory())]
}

/// Wraps the configured signing backend.
pub struct AccountService {
	implementation: Box<dyn AccountInterface>,
}

impl AccountService {
	pub fn new(implementation: Box<dyn AccountInterface>) -> Self {
		Self { implementation }
	}

	pub async fn get_address(&self) -> Result<Address, AccountError> {
		self.implementation.address().await
	}

	/// Signs a 32-byte digest or any other raw payload.
	pub async fn sign_message(&self, message: &[u8]) -> Result<Signature, AccountError> {
		self.implementation.sign_message(message).await
	}

	/// Signs the wire encoding of a compiled transaction message.
	pub async fn sign_transaction(&self, message: &Message) -> Result<Signature, AccountError> {
		self.implementation.sign_message(&message.serialize()).await
	}
}
