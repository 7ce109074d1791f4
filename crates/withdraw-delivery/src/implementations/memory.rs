//! In-memory ledger for tests and local dry runs.
//!
//! Transactions are executed synchronously on submit. Each one runs against a
//! staged copy of the account map that is committed only if every instruction
//! succeeds; a failing transaction is rejected the way a ledger preflight
//! check would reject it. The Ed25519 verification program is built in, every
//! other program must be registered as a [`ProgramHandler`].

use crate::{DeliveryError, DeliveryFactory, DeliveryInterface, DeliveryRegistry};
use async_trait::async_trait;
use base64::Engine;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, VecDeque};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::RwLock;
use withdraw_types::{
	verify_ed25519_instruction, Address, ConfigSchema, Field, FieldType, ImplementationRegistry,
	Instruction, Schema, SignedTransaction, TransactionHash, TransactionReceipt, ValidationError,
	ED25519_PROGRAM_ID,
};

pub type Accounts = HashMap<Address, Vec<u8>>;

/// On-ledger behaviour of one program.
pub trait ProgramHandler: Send + Sync {
	/// Executes `instruction`; an `Err` aborts the whole transaction with that reason.
	fn process(&self, instruction: &Instruction, accounts: &mut Accounts) -> Result<(), String>;
}

impl<F> ProgramHandler for F
where
	F: Fn(&Instruction, &mut Accounts) -> Result<(), String> + Send + Sync,
{
	fn process(&self, instruction: &Instruction, accounts: &mut Accounts) -> Result<(), String> {
		self(instruction, accounts)
	}
}

#[derive(Default)]
struct LedgerState {
	accounts: Accounts,
	programs: HashMap<Address, Arc<dyn ProgramHandler>>,
	receipts: HashMap<TransactionHash, TransactionReceipt>,
	/// Remaining `get_status` calls that report "not yet confirmed", per transaction.
	pending: HashMap<TransactionHash, u32>,
	confirmation_delay: u32,
	submissions: Vec<SignedTransaction>,
	scripted_failures: VecDeque<DeliveryError>,
	/// Account writes landing just ahead of the next executed submission.
	interleaved_writes: VecDeque<(Address, Vec<u8>)>,
	slot: u64,
}

/// A cloneable handle to a shared in-memory ledger.
#[derive(Clone, Default)]
pub struct MemoryLedger {
	state: Arc<RwLock<LedgerState>>,
}

impl MemoryLedger {
	pub fn new() -> Self {
		Self::default()
	}

	pub async fn set_account(&self, address: Address, data: Vec<u8>) {
		self.state.write().await.accounts.insert(address, data);
	}

	pub async fn account(&self, address: &Address) -> Option<Vec<u8>> {
		self.state.read().await.accounts.get(address).cloned()
	}

	pub async fn register_program(&self, program_id: Address, handler: Arc<dyn ProgramHandler>) {
		self.state.write().await.programs.insert(program_id, handler);
	}

	pub async fn register_fn<F>(&self, program_id: Address, handler: F)
	where
		F: Fn(&Instruction, &mut Accounts) -> Result<(), String> + Send + Sync + 'static,
	{
		self.register_program(program_id, Arc::new(handler)).await;
	}

	/// Makes the next submission fail with `error` before it is executed.
	pub async fn fail_next_submission(&self, error: DeliveryError) {
		self.state.write().await.scripted_failures.push_back(error);
	}

	/// Writes `data` to `address` right before the next submission executes,
	/// the way a concurrent writer that lands first would.
	pub async fn write_before_next_submission(&self, address: Address, data: Vec<u8>) {
		self.state
			.write()
			.await
			.interleaved_writes
			.push_back((address, data));
	}

	/// Number of status checks that report a new transaction as unconfirmed.
	pub async fn set_confirmation_delay(&self, polls: u32) {
		self.state.write().await.confirmation_delay = polls;
	}

	/// Every transaction submitted so far, including rejected ones.
	pub async fn submissions(&self) -> Vec<SignedTransaction> {
		self.state.read().await.submissions.clone()
	}

	fn execute(state: &LedgerState, tx: &SignedTransaction) -> Result<Accounts, String> {
		if !tx.verify_signatures() {
			return Err("Transaction signature verification failure".into());
		}

		let mut staged = state.accounts.clone();
		for (index, instruction) in tx.message.decompile().iter().enumerate() {
			let result = if instruction.program_id == ED25519_PROGRAM_ID {
				verify_ed25519_instruction(&instruction.data).map_err(|e| e.to_string())
			} else {
				match state.programs.get(&instruction.program_id) {
					Some(handler) => handler.process(instruction, &mut staged),
					None => Err(format!(
						"Attempt to load a program that does not exist: {}",
						instruction.program_id
					)),
				}
			};
			result.map_err(|reason| format!("Error processing Instruction {index}: {reason}"))?;
		}
		Ok(staged)
	}
}

#[async_trait]
impl DeliveryInterface for MemoryLedger {
	fn config_schema(&self) -> Box<dyn ConfigSchema> {
		Box::new(MemoryLedgerSchema)
	}

	async fn get_account(&self, address: &Address) -> Result<Option<Vec<u8>>, DeliveryError> {
		Ok(self.account(address).await)
	}

	async fn get_latest_blockhash(&self) -> Result<[u8; 32], DeliveryError> {
		let slot = self.state.read().await.slot;
		Ok(Sha256::digest(slot.to_le_bytes()).into())
	}

	async fn submit(&self, tx: SignedTransaction) -> Result<TransactionHash, DeliveryError> {
		let mut state = self.state.write().await;
		state.submissions.push(tx.clone());
		if let Some(error) = state.scripted_failures.pop_front() {
			return Err(error);
		}
		if let Some((address, data)) = state.interleaved_writes.pop_front() {
			state.accounts.insert(address, data);
		}

		let hash = tx.id();
		if state.receipts.contains_key(&hash) {
			return Err(DeliveryError::TransactionFailed(
				"This transaction has already been processed".into(),
			));
		}

		let staged = Self::execute(&state, &tx).map_err(DeliveryError::TransactionFailed)?;
		state.accounts = staged;
		state.slot += 1;
		let receipt = TransactionReceipt {
			hash: hash.clone(),
			slot: state.slot,
			success: true,
			error: None,
		};
		state.receipts.insert(hash.clone(), receipt);
		let delay = state.confirmation_delay;
		if delay > 0 {
			state.pending.insert(hash.clone(), delay);
		}
		tracing::debug!(slot = state.slot, %hash, "Executed transaction");
		Ok(hash)
	}

	async fn get_status(
		&self,
		hash: &TransactionHash,
	) -> Result<Option<TransactionReceipt>, DeliveryError> {
		let mut state = self.state.write().await;
		if let Some(remaining) = state.pending.get_mut(hash) {
			*remaining -= 1;
			if *remaining == 0 {
				state.pending.remove(hash);
			}
			return Ok(None);
		}
		Ok(state.receipts.get(hash).cloned())
	}
}

/// Optional `accounts` table: base58 address to base64 account data.
pub struct MemoryLedgerSchema;

impl ConfigSchema for MemoryLedgerSchema {
	fn validate(&self, config: &toml::Value) -> Result<(), ValidationError> {
		Schema::new(
			vec![],
			vec![Field::new("accounts", FieldType::Table(Schema::new(vec![], vec![])))
				.with_validator(|value| {
					let table = value.as_table().ok_or("accounts must be a table")?;
					for (address, data) in table {
						Address::from_str(address).map_err(|e| format!("{address}: {e}"))?;
						let data = data
							.as_str()
							.ok_or_else(|| format!("{address}: data must be a base64 string"))?;
						base64::engine::general_purpose::STANDARD
							.decode(data)
							.map_err(|e| format!("{address}: {e}"))?;
					}
					Ok(())
				})],
		)
		.validate(config)
	}
}

/// Builds an empty ledger, preloaded with the configured accounts.
///
/// Programs cannot be described in configuration; without registered
/// handlers only reads and signature verification succeed.
pub fn create_memory_delivery(
	config: &toml::Value,
) -> Result<Box<dyn DeliveryInterface>, DeliveryError> {
	MemoryLedgerSchema
		.validate(config)
		.map_err(|e| DeliveryError::Network(format!("Invalid memory ledger config: {}", e)))?;

	let mut state = LedgerState::default();
	if let Some(table) = config.get("accounts").and_then(|v| v.as_table()) {
		for (address, data) in table {
			let address = Address::from_str(address)
				.map_err(|e| DeliveryError::Network(e.to_string()))?;
			let data = base64::engine::general_purpose::STANDARD
				.decode(data.as_str().unwrap_or_default())
				.map_err(|e| DeliveryError::Network(e.to_string()))?;
			state.accounts.insert(address, data);
		}
	}
	Ok(Box::new(MemoryLedger {
		state: Arc::new(RwLock::new(state)),
	}))
}

pub struct Registry;

impl ImplementationRegistry for Registry {
	const NAME: &'static str = "memory";
	type Factory = DeliveryFactory;

	fn factory() -> Self::Factory {
		create_memory_delivery
	}
}

impl DeliveryRegistry for Registry {}

#[cfg(test)]
mod tests {
	use super::*;
	use ed25519_dalek::{Signer, SigningKey};
	use withdraw_types::{
		new_ed25519_instruction, AccountMeta, Signature, SignatureEntry, Transaction,
	};

	const PROGRAM: Address = Address([9; 32]);

	fn sign(key: &SigningKey, tx: Transaction) -> SignedTransaction {
		let message = tx.compile([0u8; 32]).unwrap();
		let signature = Signature(key.sign(&message.serialize()).to_bytes());
		SignedTransaction::new(message, vec![signature]).unwrap()
	}

	fn write_ix(target: Address, byte: u8) -> Instruction {
		Instruction {
			program_id: PROGRAM,
			accounts: vec![AccountMeta::new(target, false)],
			data: vec![byte],
		}
	}

	async fn ledger_with_writer() -> MemoryLedger {
		let ledger = MemoryLedger::new();
		ledger
			.register_fn(PROGRAM, |ix, accounts| {
				if ix.data == [0xff] {
					return Err("custom program error: 0x0".into());
				}
				accounts.insert(ix.accounts[0].pubkey, ix.data.clone());
				Ok(())
			})
			.await;
		ledger
	}

	#[tokio::test]
	async fn test_failed_transaction_commits_nothing() {
		let ledger = ledger_with_writer().await;
		let key = SigningKey::from_bytes(&[1u8; 32]);
		let payer = Address(key.verifying_key().to_bytes());
		let target = Address([5; 32]);

		let tx = Transaction::new(payer, vec![write_ix(target, 1), write_ix(target, 0xff)]);
		let err = ledger.submit(sign(&key, tx)).await.unwrap_err();
		assert!(matches!(
			err,
			DeliveryError::TransactionFailed(ref r) if r.contains("Instruction 1")
		));
		assert_eq!(ledger.account(&target).await, None);

		let tx = Transaction::new(payer, vec![write_ix(target, 2)]);
		let hash = ledger.submit(sign(&key, tx)).await.unwrap();
		assert_eq!(ledger.account(&target).await, Some(vec![2]));
		assert!(ledger.get_status(&hash).await.unwrap().unwrap().success);
		assert_eq!(ledger.submissions().await.len(), 2);
	}

	#[tokio::test]
	async fn test_bad_fee_payer_signature_rejected() {
		let ledger = ledger_with_writer().await;
		let key = SigningKey::from_bytes(&[1u8; 32]);
		let other = SigningKey::from_bytes(&[2u8; 32]);
		let payer = Address(key.verifying_key().to_bytes());

		let tx = Transaction::new(payer, vec![write_ix(Address([5; 32]), 1)]);
		let result = ledger.submit(sign(&other, tx)).await;
		assert!(matches!(result, Err(DeliveryError::TransactionFailed(_))));
	}

	#[tokio::test]
	async fn test_builtin_signature_verification() {
		let ledger = MemoryLedger::new();
		let key = SigningKey::from_bytes(&[1u8; 32]);
		let payer = Address(key.verifying_key().to_bytes());
		let message = [7u8; 32];

		let good = SignatureEntry {
			signer: payer,
			signature: key.sign(&message).to_bytes(),
			message,
		};
		let ix = new_ed25519_instruction(&[good], 255).unwrap();
		ledger
			.submit(sign(&key, Transaction::new(payer, vec![ix])))
			.await
			.unwrap();

		let bad = SignatureEntry {
			message: [8u8; 32],
			..good
		};
		let ix = new_ed25519_instruction(&[bad], 255).unwrap();
		let result = ledger
			.submit(sign(&key, Transaction::new(payer, vec![ix])))
			.await;
		assert!(matches!(result, Err(DeliveryError::TransactionFailed(_))));
	}

	#[tokio::test]
	async fn test_unknown_program_and_scripted_failure() {
		let ledger = MemoryLedger::new();
		let key = SigningKey::from_bytes(&[1u8; 32]);
		let payer = Address(key.verifying_key().to_bytes());

		let result = ledger
			.submit(sign(&key, Transaction::new(payer, vec![write_ix(payer, 1)])))
			.await;
		assert!(matches!(
			result,
			Err(DeliveryError::TransactionFailed(ref r)) if r.contains("does not exist")
		));

		ledger
			.fail_next_submission(DeliveryError::Network("connection reset".into()))
			.await;
		let result = ledger.submit(sign(&key, Transaction::new(payer, vec![]))).await;
		assert!(matches!(result, Err(DeliveryError::Network(_))));
		assert_eq!(ledger.submissions().await.len(), 2);
	}

	#[tokio::test]
	async fn test_interleaved_write_lands_before_execution() {
		let ledger = MemoryLedger::new();
		ledger
			.register_fn(PROGRAM, |ix, accounts| {
				let target = ix.accounts[0].pubkey;
				if accounts.contains_key(&target) {
					return Err(format!("account {target} already in use"));
				}
				accounts.insert(target, ix.data.clone());
				Ok(())
			})
			.await;
		let key = SigningKey::from_bytes(&[1u8; 32]);
		let payer = Address(key.verifying_key().to_bytes());
		let target = Address([5; 32]);

		ledger.write_before_next_submission(target, vec![7]).await;
		assert_eq!(ledger.account(&target).await, None);

		let tx = Transaction::new(payer, vec![write_ix(target, 1)]);
		let result = ledger.submit(sign(&key, tx)).await;
		assert!(matches!(
			result,
			Err(DeliveryError::TransactionFailed(ref r)) if r.contains("in use")
		));
		// The interleaved write survives the rejected transaction.
		assert_eq!(ledger.account(&target).await, Some(vec![7]));

		let other = Address([6; 32]);
		let tx = Transaction::new(payer, vec![write_ix(other, 2)]);
		ledger.submit(sign(&key, tx)).await.unwrap();
		assert_eq!(ledger.account(&other).await, Some(vec![2]));
	}

	#[tokio::test]
	async fn test_factory_preloads_accounts() {
		let address = Address([3; 32]);
		let config: toml::Value = toml::from_str(&format!(
			"[accounts]\n\"{}\" = \"AQID\"",
			address
		))
		.unwrap();
		let ledger = create_memory_delivery(&config).unwrap();
		assert_eq!(ledger.get_account(&address).await.unwrap(), Some(vec![1, 2, 3]));

		let bad: toml::Value = toml::from_str("[accounts]\nnot_an_address = \"AQID\"").unwrap();
		assert!(create_memory_delivery(&bad).is_err());
	}
}
