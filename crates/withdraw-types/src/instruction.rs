//! Instructions, messages and the transaction wire format.
//!
//! Transactions are compiled into the legacy message format: a three byte
//! header, the deduplicated account keys (writable signers, read-only
//! signers, writable non-signers, read-only non-signers; fee payer first),
//! the recent blockhash, and instructions that refer to keys by index. Every
//! variable-length array is prefixed with a compact-u16 length.

use crate::address::Address;
use crate::delivery::{Signature, TransactionHash};
use thiserror::Error;

/// Errors raised while compiling or signing a transaction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TransactionError {
	/// More distinct accounts than a compiled message can index.
	#[error("Transaction references {0} accounts, at most 256 are addressable")]
	TooManyAccounts(usize),
	/// The signature list does not match the message's required signers.
	#[error("Expected {expected} signatures, got {actual}")]
	SignatureCountMismatch { expected: usize, actual: usize },
}

/// An account referenced by an instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountMeta {
	pub pubkey: Address,
	pub is_signer: bool,
	pub is_writable: bool,
}

impl AccountMeta {
	pub fn new(pubkey: Address, is_signer: bool) -> Self {
		Self {
			pubkey,
			is_signer,
			is_writable: true,
		}
	}

	pub fn new_readonly(pubkey: Address, is_signer: bool) -> Self {
		Self {
			pubkey,
			is_signer,
			is_writable: false,
		}
	}
}

/// A single program invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Instruction {
	pub program_id: Address,
	pub accounts: Vec<AccountMeta>,
	pub data: Vec<u8>,
}

/// An unsigned transaction: instructions plus the paying signer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
	pub fee_payer: Address,
	pub instructions: Vec<Instruction>,
}

impl Transaction {
	pub fn new(fee_payer: Address, instructions: Vec<Instruction>) -> Self {
		Self {
			fee_payer,
			instructions,
		}
	}

	/// Compiles the transaction into a legacy message.
	pub fn compile(&self, recent_blockhash: [u8; 32]) -> Result<Message, TransactionError> {
		// (key, is_signer, is_writable) in first-seen order, fee payer first.
		let mut keys: Vec<(Address, bool, bool)> = vec![(self.fee_payer, true, true)];
		let mut upsert = |key: Address, signer: bool, writable: bool| {
			if let Some(entry) = keys.iter_mut().find(|(k, _, _)| *k == key) {
				entry.1 |= signer;
				entry.2 |= writable;
			} else {
				keys.push((key, signer, writable));
			}
		};
		for ix in &self.instructions {
			for meta in &ix.accounts {
				upsert(meta.pubkey, meta.is_signer, meta.is_writable);
			}
			upsert(ix.program_id, false, false);
		}

		let mut ordered = Vec::with_capacity(keys.len());
		for (signer, writable) in [(true, true), (true, false), (false, true), (false, false)] {
			ordered.extend(
				keys.iter()
					.filter(|(_, s, w)| *s == signer && *w == writable)
					.copied(),
			);
		}
		if ordered.len() > 256 {
			return Err(TransactionError::TooManyAccounts(ordered.len()));
		}

		let header = MessageHeader {
			num_required_signatures: ordered.iter().filter(|(_, s, _)| *s).count() as u8,
			num_readonly_signed_accounts: ordered.iter().filter(|(_, s, w)| *s && !*w).count()
				as u8,
			num_readonly_unsigned_accounts: ordered.iter().filter(|(_, s, w)| !*s && !*w).count()
				as u8,
		};
		let account_keys: Vec<Address> = ordered.into_iter().map(|(k, _, _)| k).collect();
		let index_of = |key: &Address| -> u8 {
			// Every key was inserted above, and there are at most 256 of them.
			account_keys.iter().position(|k| k == key).unwrap_or_default() as u8
		};

		let instructions = self
			.instructions
			.iter()
			.map(|ix| CompiledInstruction {
				program_id_index: index_of(&ix.program_id),
				accounts: ix.accounts.iter().map(|m| index_of(&m.pubkey)).collect(),
				data: ix.data.clone(),
			})
			.collect();

		Ok(Message {
			header,
			account_keys,
			recent_blockhash,
			instructions,
		})
	}
}

/// Counts that classify the message's account keys.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MessageHeader {
	pub num_required_signatures: u8,
	pub num_readonly_signed_accounts: u8,
	pub num_readonly_unsigned_accounts: u8,
}

/// An instruction with account references replaced by key indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledInstruction {
	pub program_id_index: u8,
	pub accounts: Vec<u8>,
	pub data: Vec<u8>,
}

/// A compiled legacy message, the payload every signer signs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
	pub header: MessageHeader,
	pub account_keys: Vec<Address>,
	pub recent_blockhash: [u8; 32],
	pub instructions: Vec<CompiledInstruction>,
}

impl Message {
	/// Keys that must sign, in signature order.
	pub fn signer_keys(&self) -> &[Address] {
		let n = usize::from(self.header.num_required_signatures).min(self.account_keys.len());
		&self.account_keys[..n]
	}

	pub fn is_signer(&self, index: usize) -> bool {
		index < usize::from(self.header.num_required_signatures)
	}

	pub fn is_writable(&self, index: usize) -> bool {
		let signed = usize::from(self.header.num_required_signatures);
		if index < signed {
			index < signed - usize::from(self.header.num_readonly_signed_accounts)
		} else {
			let readonly = usize::from(self.header.num_readonly_unsigned_accounts);
			index < self.account_keys.len() - readonly
		}
	}

	/// Expands compiled instructions back into address-based instructions.
	pub fn decompile(&self) -> Vec<Instruction> {
		let meta = |index: u8| {
			let i = usize::from(index);
			AccountMeta {
				pubkey: self.account_keys.get(i).copied().unwrap_or_default(),
				is_signer: self.is_signer(i),
				is_writable: self.is_writable(i),
			}
		};
		self.instructions
			.iter()
			.map(|ix| Instruction {
				program_id: self
					.account_keys
					.get(usize::from(ix.program_id_index))
					.copied()
					.unwrap_or_default(),
				accounts: ix.accounts.iter().map(|&i| meta(i)).collect(),
				data: ix.data.clone(),
			})
			.collect()
	}

	/// Serializes the message to its wire format.
	pub fn serialize(&self) -> Vec<u8> {
		let mut out = vec![
			self.header.num_required_signatures,
			self.header.num_readonly_signed_accounts,
			self.header.num_readonly_unsigned_accounts,
		];
		encode_compact_u16(self.account_keys.len() as u16, &mut out);
		for key in &self.account_keys {
			out.extend_from_slice(key.as_bytes());
		}
		out.extend_from_slice(&self.recent_blockhash);
		encode_compact_u16(self.instructions.len() as u16, &mut out);
		for ix in &self.instructions {
			out.push(ix.program_id_index);
			encode_compact_u16(ix.accounts.len() as u16, &mut out);
			out.extend_from_slice(&ix.accounts);
			encode_compact_u16(ix.data.len() as u16, &mut out);
			out.extend_from_slice(&ix.data);
		}
		out
	}
}

/// A message together with its signatures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedTransaction {
	pub signatures: Vec<Signature>,
	pub message: Message,
}

impl SignedTransaction {
	pub fn new(message: Message, signatures: Vec<Signature>) -> Result<Self, TransactionError> {
		let expected = usize::from(message.header.num_required_signatures);
		if signatures.len() != expected {
			return Err(TransactionError::SignatureCountMismatch {
				expected,
				actual: signatures.len(),
			});
		}
		Ok(Self {
			signatures,
			message,
		})
	}

	/// The transaction id: the fee payer's signature.
	pub fn id(&self) -> TransactionHash {
		self.signatures
			.first()
			.copied()
			.unwrap_or_default()
			.into()
	}

	/// Checks every signature against its signer key over the serialized message.
	pub fn verify_signatures(&self) -> bool {
		let payload = self.message.serialize();
		let signers = self.message.signer_keys();
		signers.len() == self.signatures.len()
			&& signers.iter().zip(&self.signatures).all(|(key, sig)| {
				ed25519_dalek::VerifyingKey::from_bytes(key.as_bytes())
					.and_then(|vk| {
						vk.verify_strict(&payload, &ed25519_dalek::Signature::from_bytes(&sig.0))
					})
					.is_ok()
			})
	}

	/// Serializes the transaction to its wire format.
	pub fn serialize(&self) -> Vec<u8> {
		let mut out = Vec::new();
		encode_compact_u16(self.signatures.len() as u16, &mut out);
		for sig in &self.signatures {
			out.extend_from_slice(&sig.0);
		}
		out.extend_from_slice(&self.message.serialize());
		out
	}
}

/// Appends `value` as a compact-u16 (7 bits per byte, little-endian groups).
pub fn encode_compact_u16(mut value: u16, out: &mut Vec<u8>) {
	loop {
		let mut byte = (value & 0x7f) as u8;
		value >>= 7;
		if value == 0 {
			out.push(byte);
			return;
		}
		byte |= 0x80;
		out.push(byte);
	}
}

/// Decodes a compact-u16, returning the value and the number of bytes read.
pub fn decode_compact_u16(bytes: &[u8]) -> Option<(u16, usize)> {
	let mut value: u32 = 0;
	for (i, byte) in bytes.iter().take(3).enumerate() {
		value |= u32::from(byte & 0x7f) << (7 * i);
		if byte & 0x80 == 0 {
			return u16::try_from(value).ok().map(|v| (v, i + 1));
		}
	}
	None
}

#[cfg(test)]
mod tests {
	use super::*;

	fn key(b: u8) -> Address {
		Address([b; 32])
	}

	#[test]
	fn test_compact_u16() {
		for (value, expected) in [
			(0u16, vec![0x00]),
			(0x7f, vec![0x7f]),
			(0x80, vec![0x80, 0x01]),
			(0x3fff, vec![0xff, 0x7f]),
			(0x4000, vec![0x80, 0x80, 0x01]),
			(u16::MAX, vec![0xff, 0xff, 0x03]),
		] {
			let mut out = Vec::new();
			encode_compact_u16(value, &mut out);
			assert_eq!(out, expected, "encoding {value}");
			assert_eq!(decode_compact_u16(&out), Some((value, expected.len())));
		}
		assert_eq!(decode_compact_u16(&[0x80]), None);
	}

	#[test]
	fn test_compile_orders_and_merges_keys() {
		let payer = key(1);
		let tx = Transaction::new(
			payer,
			vec![
				Instruction {
					program_id: key(9),
					accounts: vec![
						AccountMeta::new_readonly(key(3), false),
						AccountMeta::new(key(2), false),
						AccountMeta::new_readonly(payer, true),
					],
					data: vec![1, 2, 3],
				},
				Instruction {
					program_id: key(8),
					accounts: vec![AccountMeta::new(key(3), false)],
					data: vec![],
				},
			],
		);
		let message = tx.compile([7u8; 32]).unwrap();

		// payer | key3 (promoted to writable), key2 | programs
		assert_eq!(
			message.account_keys,
			vec![payer, key(3), key(2), key(9), key(8)]
		);
		assert_eq!(
			message.header,
			MessageHeader {
				num_required_signatures: 1,
				num_readonly_signed_accounts: 0,
				num_readonly_unsigned_accounts: 2,
			}
		);
		assert_eq!(message.instructions[0].program_id_index, 3);
		assert_eq!(message.instructions[0].accounts, vec![1, 2, 0]);
		assert_eq!(message.instructions[1].program_id_index, 4);

		assert!(message.is_writable(0));
		assert!(message.is_writable(2));
		assert!(!message.is_writable(3));
		assert_eq!(message.signer_keys(), &[payer]);
	}

	#[test]
	fn test_decompile_restores_instructions() {
		let payer = key(1);
		let ix = Instruction {
			program_id: key(9),
			accounts: vec![AccountMeta::new(payer, true), AccountMeta::new_readonly(key(4), false)],
			data: vec![42],
		};
		let message = Transaction::new(payer, vec![ix.clone()])
			.compile([0u8; 32])
			.unwrap();
		assert_eq!(message.decompile(), vec![ix]);
	}

	#[test]
	fn test_serialized_layout() {
		let payer = key(1);
		let message = Transaction::new(
			payer,
			vec![Instruction {
				program_id: key(2),
				accounts: vec![],
				data: vec![0xaa],
			}],
		)
		.compile([5u8; 32])
		.unwrap();
		let bytes = message.serialize();
		assert_eq!(&bytes[..4], &[1, 0, 1, 2]);
		assert_eq!(&bytes[4..36], payer.as_bytes());
		assert_eq!(&bytes[68..100], &[5u8; 32]);
		assert_eq!(&bytes[100..], &[1, 1, 0, 1, 0xaa]);
	}

	#[test]
	fn test_signed_transaction_checks_signature_count() {
		let message = Transaction::new(key(1), vec![]).compile([0u8; 32]).unwrap();
		assert_eq!(
			SignedTransaction::new(message.clone(), vec![]),
			Err(TransactionError::SignatureCountMismatch {
				expected: 1,
				actual: 0
			})
		);
		let signed = SignedTransaction::new(message, vec![Signature([3; 64])]).unwrap();
		assert_eq!(signed.id(), TransactionHash(vec![3; 64]));
		assert_eq!(signed.serialize()[0], 1);
	}

	#[test]
	fn test_verify_signatures() {
		use ed25519_dalek::{Signer, SigningKey};

		let signing_key = SigningKey::from_bytes(&[11u8; 32]);
		let payer = Address(signing_key.verifying_key().to_bytes());
		let message = Transaction::new(payer, vec![]).compile([0u8; 32]).unwrap();
		let signature = Signature(signing_key.sign(&message.serialize()).to_bytes());

		let signed = SignedTransaction::new(message.clone(), vec![signature]).unwrap();
		assert!(signed.verify_signatures());

		let forged = SignedTransaction::new(message, vec![Signature([0; 64])]).unwrap();
		assert!(!forged.verify_signatures());
	}
}
