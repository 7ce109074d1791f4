//! Ledger transport for the withdrawal authorizer.
//!
//! A [`DeliveryInterface`] reads accounts and submits signed transactions.
//! [`DeliveryService`] sits on top of it: it compiles transactions against a
//! fresh blockhash, has the account service sign them as fee payer, submits
//! them and polls for confirmation with a bounded number of status checks.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;
use withdraw_account::AccountService;
use withdraw_types::{
	truncate_id, Address, ConfigSchema, ImplementationRegistry, SignedTransaction, Transaction,
	TransactionHash, TransactionReceipt,
};

pub mod implementations {
	pub mod memory;
	pub mod rpc;
}

/// Errors that can occur during transaction delivery.
#[derive(Debug, Error)]
pub enum DeliveryError {
	/// The ledger could not be reached or answered with something unreadable.
	#[error("Network error: {0}")]
	Network(String),
	/// The ledger rejected or failed to execute the transaction.
	#[error("Transaction failed: {0}")]
	TransactionFailed(String),
	/// Confirmation polling gave up before the transaction was confirmed.
	#[error("Transaction {hash} not confirmed after {polls} status checks")]
	Timeout { hash: String, polls: u32 },
	/// The account service could not sign the transaction.
	#[error("Signing failed: {0}")]
	Signing(String),
}

/// A ledger backend.
#[async_trait]
pub trait DeliveryInterface: Send + Sync {
	/// Schema of the backend's `[delivery.implementations.<name>]` table.
	fn config_schema(&self) -> Box<dyn ConfigSchema>;

	/// Raw data of an account, or `None` if it does not exist.
	async fn get_account(&self, address: &Address) -> Result<Option<Vec<u8>>, DeliveryError>;

	async fn get_latest_blockhash(&self) -> Result<[u8; 32], DeliveryError>;

	/// Sends a signed transaction and returns its id.
	async fn submit(&self, tx: SignedTransaction) -> Result<TransactionHash, DeliveryError>;

	/// Current status of a transaction, or `None` if it is not yet confirmed.
	async fn get_status(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, DeliveryError>;
}

pub type DeliveryFactory = fn(&toml::Value) -> Result<Box<dyn DeliveryInterface>, DeliveryError>;

pub trait DeliveryRegistry: ImplementationRegistry<Factory = DeliveryFactory> {}

/// All built-in delivery backends as (name, factory) pairs.
pub fn get_all_implementations() -> Vec<(&'static str, DeliveryFactory)> {
	use implementations::{memory, rpc};

	vec![
		(rpc::Registry::NAME, rpc::Registry::factory()),
		(memory::Registry::NAME, memory::Registry::factory()),
	]
}

/// Bounds on confirmation polling.
#[derive(Debug, Clone, Copy)]
pub struct ConfirmationPolicy {
	pub max_polls: u32,
	pub poll_interval: Duration,
}

impl Default for ConfirmationPolicy {
	fn default() -> Self {
		Self {
			max_polls: 30,
			poll_interval: Duration::from_millis(2000),
		}
	}
}

/// Signs, submits and confirms transactions through one backend.
pub struct DeliveryService {
	implementation: Box<dyn DeliveryInterface>,
	account: Arc<AccountService>,
	policy: ConfirmationPolicy,
}

impl DeliveryService {
	pub fn new(
		implementation: Box<dyn DeliveryInterface>,
		account: Arc<AccountService>,
		policy: ConfirmationPolicy,
	) -> Self {
		Self {
			implementation,
			account,
			policy,
		}
	}

	pub async fn fetch_account(&self, address: &Address) -> Result<Option<Vec<u8>>, DeliveryError> {
		self.implementation.get_account(address).await
	}

	/// Compiles `tx` against the latest blockhash, signs it and submits it.
	///
	/// The account service must control the fee payer; it is the only signer.
	#[instrument(skip_all, fields(fee_payer = %tx.fee_payer, instructions = tx.instructions.len()))]
	pub async fn deliver(&self, tx: Transaction) -> Result<TransactionHash, DeliveryError> {
		let signer = self
			.account
			.get_address()
			.await
			.map_err(|e| DeliveryError::Signing(e.to_string()))?;
		if signer != tx.fee_payer {
			return Err(DeliveryError::Signing(format!(
				"fee payer {} is not the configured account {}",
				tx.fee_payer, signer
			)));
		}

		let blockhash = self.implementation.get_latest_blockhash().await?;
		let message = tx
			.compile(blockhash)
			.map_err(|e| DeliveryError::TransactionFailed(e.to_string()))?;
		if message.signer_keys() != [signer] {
			return Err(DeliveryError::Signing(
				"transaction requires signers other than the fee payer".into(),
			));
		}

		let signature = self
			.account
			.sign_transaction(&message)
			.await
			.map_err(|e| DeliveryError::Signing(e.to_string()))?;
		let signed = SignedTransaction::new(message, vec![signature])
			.map_err(|e| DeliveryError::Signing(e.to_string()))?;

		let hash = self.implementation.submit(signed).await?;
		tracing::debug!(tx_hash = %truncate_id(&hash.to_string()), "Submitted transaction");
		Ok(hash)
	}

	/// Polls until `hash` is confirmed, fails, or the poll budget runs out.
	#[instrument(skip_all, fields(tx_hash = %truncate_id(&hash.to_string())))]
	pub async fn confirm(
		&self,
		hash: &TransactionHash,
	) -> Result<TransactionReceipt, DeliveryError> {
		for attempt in 1..=self.policy.max_polls {
			match self.implementation.get_status(hash).await? {
				Some(receipt) if receipt.success => {
					tracing::debug!(slot = receipt.slot, attempt, "Transaction confirmed");
					return Ok(receipt);
				},
				Some(receipt) => {
					return Err(DeliveryError::TransactionFailed(
						receipt
							.error
							.unwrap_or_else(|| "transaction failed without a reason".into()),
					));
				},
				None => {
					tracing::trace!(attempt, "Transaction not yet confirmed");
					if attempt < self.policy.max_polls {
						tokio::time::sleep(self.policy.poll_interval).await;
					}
				},
			}
		}
		Err(DeliveryError::Timeout {
			hash: hash.to_string(),
			polls: self.policy.max_polls,
		})
	}

	pub async fn deliver_and_confirm(
		&self,
		tx: Transaction,
	) -> Result<TransactionReceipt, DeliveryError> {
		let hash = self.deliver(tx).await?;
		self.confirm(&hash).await
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::implementations::memory::MemoryLedger;
	use ed25519_dalek::SigningKey;
	use withdraw_account::implementations::local::LocalAccount;
	use withdraw_types::{AccountMeta, Instruction};

	fn service(ledger: &MemoryLedger, max_polls: u32) -> (DeliveryService, Address) {
		let key = SigningKey::from_bytes(&[21u8; 32]);
		let address = Address(key.verifying_key().to_bytes());
		let account = Arc::new(AccountService::new(Box::new(LocalAccount::from_signing_key(
			key,
		))));
		let service = DeliveryService::new(
			Box::new(ledger.clone()),
			account,
			ConfirmationPolicy {
				max_polls,
				poll_interval: Duration::from_millis(1),
			},
		);
		(service, address)
	}

	fn noop(program: Address, signer: Address) -> Instruction {
		Instruction {
			program_id: program,
			accounts: vec![AccountMeta::new(signer, true)],
			data: vec![],
		}
	}

	#[tokio::test]
	async fn test_deliver_and_confirm() {
		let ledger = MemoryLedger::new();
		let program = Address([9; 32]);
		ledger.register_fn(program, |_, _| Ok(())).await;
		let (service, payer) = service(&ledger, 3);

		let receipt = service
			.deliver_and_confirm(Transaction::new(payer, vec![noop(program, payer)]))
			.await
			.unwrap();
		assert!(receipt.success);
		assert_eq!(ledger.submissions().await.len(), 1);
	}

	#[tokio::test]
	async fn test_foreign_fee_payer_rejected() {
		let ledger = MemoryLedger::new();
		let (service, _) = service(&ledger, 3);
		let other = Address([4; 32]);
		let result = service.deliver(Transaction::new(other, vec![])).await;
		assert!(matches!(result, Err(DeliveryError::Signing(_))));
		assert!(ledger.submissions().await.is_empty());
	}

	#[tokio::test]
	async fn test_confirmation_timeout() {
		let ledger = MemoryLedger::new();
		let program = Address([9; 32]);
		ledger.register_fn(program, |_, _| Ok(())).await;
		ledger.set_confirmation_delay(5).await;
		let (service, payer) = service(&ledger, 3);

		let result = service
			.deliver_and_confirm(Transaction::new(payer, vec![noop(program, payer)]))
			.await;
		assert!(matches!(result, Err(DeliveryError::Timeout { polls: 3, .. })));
	}

	#[tokio::test]
	async fn test_confirmation_after_delay() {
		let ledger = MemoryLedger::new();
		let program = Address([9; 32]);
		ledger.register_fn(program, |_, _| Ok(())).await;
		ledger.set_confirmation_delay(2).await;
		let (service, payer) = service(&ledger, 3);

		let receipt = service
			.deliver_and_confirm(Transaction::new(payer, vec![noop(program, payer)]))
			.await
			.unwrap();
		assert!(receipt.success);
	}

	#[tokio::test]
	async fn test_rejection_surfaces_reason() {
		let ledger = MemoryLedger::new();
		let program = Address([9; 32]);
		ledger
			.register_fn(program, |_, _| Err("custom program error: 0x1".to_string()))
			.await;
		let (service, payer) = service(&ledger, 3);

		let err = service
			.deliver(Transaction::new(payer, vec![noop(program, payer)]))
			.await
			.unwrap_err();
		match err {
			DeliveryError::TransactionFailed(reason) => assert!(reason.contains("0x1")),
			other => panic!("unexpected error: {other:?}"),
		}
	}
}
