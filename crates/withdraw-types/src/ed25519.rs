//! Ed25519 signature-verification instruction framing.
//!
//! The native verification program reads a single instruction whose data
//! describes a batch of (public key, signature, message) triples:
//!
//! ```text
//! [0]                  number of entries
//! [1]                  padding (zero)
//! [2 + 14*i ..]        descriptor i: seven little-endian u16 values
//!                      signature offset, signature ix index,
//!                      public key offset, public key ix index,
//!                      message offset, message size, message ix index
//! [2 + 14*N ..]        entry i at 128*i: public key, signature, message
//! ```
//!
//! Instruction indices are always `u16::MAX`, meaning "this instruction".

use crate::address::{Address, ED25519_PROGRAM_ID};
use crate::instruction::Instruction;
use thiserror::Error;

pub const SIGNATURE_OFFSETS_START: usize = 2;
pub const SIGNATURE_OFFSETS_SERIALIZED_SIZE: usize = 14;
pub const PUBKEY_SIZE: usize = 32;
pub const SIGNATURE_SIZE: usize = 64;
pub const MESSAGE_SIZE: usize = 32;
pub const CURRENT_INSTRUCTION: u16 = u16::MAX;
pub const MAX_SIGNATURES: usize = 255;

const ENTRY_SIZE: usize = PUBKEY_SIZE + SIGNATURE_SIZE + MESSAGE_SIZE;

/// Errors that can occur while framing or checking a verification instruction.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum SignatureInstructionError {
	/// A public key, signature or message has the wrong length.
	#[error("Invalid {field} size: expected {expected} bytes, got {actual}")]
	InvalidEntrySize {
		field: &'static str,
		expected: usize,
		actual: usize,
	},
	/// The batch exceeds the configured signature limit.
	#[error("Too many signatures: {count} exceeds the maximum of {max}")]
	TooManySignatures { count: usize, max: usize },
	/// No entries were supplied.
	#[error("Signature batch is empty")]
	EmptyBatch,
	/// Instruction data does not follow the verification layout.
	#[error("Malformed verification instruction: {0}")]
	Malformed(String),
	/// An entry's signature does not verify.
	#[error("Signature {index} failed verification")]
	VerificationFailed { index: usize },
}

fn check_len(
	field: &'static str,
	bytes: &[u8],
	expected: usize,
) -> Result<(), SignatureInstructionError> {
	if bytes.len() != expected {
		return Err(SignatureInstructionError::InvalidEntrySize {
			field,
			expected,
			actual: bytes.len(),
		});
	}
	Ok(())
}

/// One (signer, signature, message) triple.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureEntry {
	pub signer: Address,
	pub signature: [u8; SIGNATURE_SIZE],
	pub message: [u8; MESSAGE_SIZE],
}

impl SignatureEntry {
	pub fn new(
		signer: Address,
		signature: &[u8],
		message: &[u8],
	) -> Result<Self, SignatureInstructionError> {
		check_len("signature", signature, SIGNATURE_SIZE)?;
		check_len("message", message, MESSAGE_SIZE)?;
		let mut entry = Self {
			signer,
			signature: [0u8; SIGNATURE_SIZE],
			message: [0u8; MESSAGE_SIZE],
		};
		entry.signature.copy_from_slice(signature);
		entry.message.copy_from_slice(message);
		Ok(entry)
	}

	/// Strict Ed25519 verification of this entry.
	pub fn verify(&self) -> bool {
		ed25519_dalek::VerifyingKey::from_bytes(self.signer.as_bytes())
			.and_then(|key| {
				key.verify_strict(
					&self.message,
					&ed25519_dalek::Signature::from_bytes(&self.signature),
				)
			})
			.is_ok()
	}
}

/// Accumulates signature entries and frames them into one instruction.
#[derive(Debug, Clone)]
pub struct Ed25519InstructionBuilder {
	entries: Vec<SignatureEntry>,
	max_signatures: usize,
}

impl Default for Ed25519InstructionBuilder {
	fn default() -> Self {
		Self::new(MAX_SIGNATURES)
	}
}

impl Ed25519InstructionBuilder {
	/// Creates a builder accepting at most `max_signatures` entries (capped at 255).
	pub fn new(max_signatures: usize) -> Self {
		Self {
			entries: Vec::new(),
			max_signatures: max_signatures.min(MAX_SIGNATURES),
		}
	}

	/// Validates and stages one triple. Nothing is staged on error.
	pub fn push(
		&mut self,
		signer: Address,
		signature: &[u8],
		message: &[u8],
	) -> Result<&mut Self, SignatureInstructionError> {
		let entry = SignatureEntry::new(signer, signature, message)?;
		self.push_entry(entry)
	}

	pub fn push_entry(
		&mut self,
		entry: SignatureEntry,
	) -> Result<&mut Self, SignatureInstructionError> {
		if self.entries.len() >= self.max_signatures {
			return Err(SignatureInstructionError::TooManySignatures {
				count: self.entries.len() + 1,
				max: self.max_signatures,
			});
		}
		self.entries.push(entry);
		Ok(self)
	}

	pub fn len(&self) -> usize {
		self.entries.len()
	}

	pub fn is_empty(&self) -> bool {
		self.entries.is_empty()
	}

	/// Serializes the staged entries into the verification instruction data.
	pub fn build_data(&self) -> Result<Vec<u8>, SignatureInstructionError> {
		let count = self.entries.len();
		if count == 0 {
			return Err(SignatureInstructionError::EmptyBatch);
		}
		if count > self.max_signatures {
			return Err(SignatureInstructionError::TooManySignatures {
				count,
				max: self.max_signatures,
			});
		}

		let data_start = SIGNATURE_OFFSETS_START + count * SIGNATURE_OFFSETS_SERIALIZED_SIZE;
		let mut data = Vec::with_capacity(data_start + count * ENTRY_SIZE);
		data.push(count as u8);
		data.push(0);

		for i in 0..count {
			let pubkey_offset = data_start + i * ENTRY_SIZE;
			let signature_offset = pubkey_offset + PUBKEY_SIZE;
			let message_offset = signature_offset + SIGNATURE_SIZE;
			for value in [
				signature_offset as u16,
				CURRENT_INSTRUCTION,
				pubkey_offset as u16,
				CURRENT_INSTRUCTION,
				message_offset as u16,
				MESSAGE_SIZE as u16,
				CURRENT_INSTRUCTION,
			] {
				data.extend_from_slice(&value.to_le_bytes());
			}
		}

		for entry in &self.entries {
			data.extend_from_slice(entry.signer.as_bytes());
			data.extend_from_slice(&entry.signature);
			data.extend_from_slice(&entry.message);
		}
		Ok(data)
	}

	/// Builds the instruction targeting the Ed25519 verification program.
	pub fn build(&self) -> Result<Instruction, SignatureInstructionError> {
		Ok(Instruction {
			program_id: ED25519_PROGRAM_ID,
			accounts: Vec::new(),
			data: self.build_data()?,
		})
	}
}

/// Frames `entries` into a verification instruction in one call.
pub fn new_ed25519_instruction(
	entries: &[SignatureEntry],
	max_signatures: usize,
) -> Result<Instruction, SignatureInstructionError> {
	let mut builder = Ed25519InstructionBuilder::new(max_signatures);
	if entries.len() > builder.max_signatures {
		return Err(SignatureInstructionError::TooManySignatures {
			count: entries.len(),
			max: builder.max_signatures,
		});
	}
	for entry in entries {
		builder.push_entry(*entry)?;
	}
	builder.build()
}

fn read_u16(data: &[u8], at: usize) -> Result<u16, SignatureInstructionError> {
	data.get(at..at + 2)
		.map(|b| u16::from_le_bytes([b[0], b[1]]))
		.ok_or_else(|| SignatureInstructionError::Malformed(format!("offset {at} out of range")))
}

fn slice_at<'a>(
	data: &'a [u8],
	offset: u16,
	len: usize,
	what: &str,
) -> Result<&'a [u8], SignatureInstructionError> {
	let start = usize::from(offset);
	data.get(start..start + len).ok_or_else(|| {
		SignatureInstructionError::Malformed(format!("{what} at {start} exceeds instruction data"))
	})
}

/// Reads the triples back out of verification instruction data.
pub fn parse_ed25519_instruction(
	data: &[u8],
) -> Result<Vec<SignatureEntry>, SignatureInstructionError> {
	let count = usize::from(
		*data
			.first()
			.ok_or_else(|| SignatureInstructionError::Malformed("empty data".into()))?,
	);
	if count == 0 {
		return Err(SignatureInstructionError::EmptyBatch);
	}

	let mut entries = Vec::with_capacity(count);
	for i in 0..count {
		let base = SIGNATURE_OFFSETS_START + i * SIGNATURE_OFFSETS_SERIALIZED_SIZE;
		let mut fields = [0u16; 7];
		for (j, field) in fields.iter_mut().enumerate() {
			*field = read_u16(data, base + 2 * j)?;
		}
		let [sig_off, sig_ix, pk_off, pk_ix, msg_off, msg_size, msg_ix] = fields;
		if [sig_ix, pk_ix, msg_ix]
			.iter()
			.any(|&ix| ix != CURRENT_INSTRUCTION)
		{
			return Err(SignatureInstructionError::Malformed(format!(
				"entry {i} references another instruction"
			)));
		}
		if usize::from(msg_size) != MESSAGE_SIZE {
			return Err(SignatureInstructionError::InvalidEntrySize {
				field: "message",
				expected: MESSAGE_SIZE,
				actual: usize::from(msg_size),
			});
		}

		let signer = Address::try_from(slice_at(data, pk_off, PUBKEY_SIZE, "public key")?)
			.map_err(|e| SignatureInstructionError::Malformed(e.to_string()))?;
		entries.push(SignatureEntry::new(
			signer,
			slice_at(data, sig_off, SIGNATURE_SIZE, "signature")?,
			slice_at(data, msg_off, MESSAGE_SIZE, "message")?,
		)?);
	}
	Ok(entries)
}

/// Parses verification instruction data and checks every signature strictly.
pub fn verify_ed25519_instruction(data: &[u8]) -> Result<(), SignatureInstructionError> {
	for (index, entry) in parse_ed25519_instruction(data)?.iter().enumerate() {
		if !entry.verify() {
			return Err(SignatureInstructionError::VerificationFailed { index });
		}
	}
	Ok(())
}
