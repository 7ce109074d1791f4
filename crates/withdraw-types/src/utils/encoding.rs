//! Canonical hex encoders and the keccak-256 primitive.
//!
//! Typed-message hashing works on hex strings: every field is rendered as
//! lowercase hex, segments are concatenated as text, and the concatenation is
//! decoded back to bytes before hashing. [`hash_hex`] therefore always hashes
//! the *decoded* bytes of its argument, while [`hash_str`] hashes the UTF-8
//! bytes of a plain string (type signatures, domain names).

use crate::address::{Address, AddressError};
use alloy_primitives::{keccak256, B256};
use thiserror::Error;

/// Errors produced while encoding typed fields.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EncodingError {
	/// A numeric value does not fit in the requested width.
	#[error("Encoding overflow: {value} does not fit in {bits} bits")]
	Overflow { value: u64, bits: u32 },
	/// A field could not be encoded (bad length, bad hex, overflow).
	#[error("Invalid field encoding for '{field}': {reason}")]
	InvalidField { field: &'static str, reason: String },
}

impl EncodingError {
	/// Attaches a field name to an error raised by a primitive encoder.
	pub fn for_field(self, field: &'static str) -> Self {
		match self {
			EncodingError::InvalidField { reason, .. } => {
				EncodingError::InvalidField { field, reason }
			},
			other => EncodingError::InvalidField {
				field,
				reason: other.to_string(),
			},
		}
	}
}

impl From<AddressError> for EncodingError {
	fn from(err: AddressError) -> Self {
		match err {
			AddressError::InvalidBase58(_) | AddressError::InvalidLength(_) => {
				EncodingError::InvalidField {
					field: "address",
					reason: err.to_string(),
				}
			},
			other => EncodingError::InvalidField {
				field: "address derivation",
				reason: other.to_string(),
			},
		}
	}
}

/// Widths supported by [`encode_uint`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UintWidth {
	U32,
	U64,
}

impl UintWidth {
	pub fn bits(self) -> u32 {
		match self {
			UintWidth::U32 => 32,
			UintWidth::U64 => 64,
		}
	}

	/// Number of hex characters an encoded value occupies.
	pub fn hex_len(self) -> usize {
		self.bits() as usize / 4
	}
}

/// Raw 32-byte hex encoding of an address.
pub fn encode_address(address: &Address) -> String {
	hex::encode(address.as_bytes())
}

/// Big-endian hex of `value`, left-padded to `width / 4` characters.
pub fn encode_uint(value: u64, width: UintWidth) -> Result<String, EncodingError> {
	if width == UintWidth::U32 && value > u64::from(u32::MAX) {
		return Err(EncodingError::Overflow {
			value,
			bits: width.bits(),
		});
	}
	Ok(format!("{:0width$x}", value, width = width.hex_len()))
}

/// Byte-for-byte hex encoding.
pub fn encode_bytes(bytes: &[u8]) -> String {
	hex::encode(bytes)
}

/// Decodes `hex_input` and returns keccak-256 over the decoded bytes.
pub fn hash_hex(hex_input: &str) -> Result<B256, EncodingError> {
	let bytes = hex::decode(hex_input).map_err(|e| EncodingError::InvalidField {
		field: "hash input",
		reason: e.to_string(),
	})?;
	Ok(keccak256(bytes))
}

/// keccak-256 over the UTF-8 bytes of `value`.
pub fn hash_str(value: &str) -> B256 {
	keccak256(value.as_bytes())
}

/// Append-only hex accumulator for typed-message segments.
#[derive(Debug, Default, Clone)]
pub struct HexEncoder {
	buf: String,
}

impl HexEncoder {
	pub fn new() -> Self {
		Self { buf: String::new() }
	}

	pub fn push_address(&mut self, address: &Address) -> &mut Self {
		self.buf.push_str(&encode_address(address));
		self
	}

	pub fn push_uint(&mut self, value: u64, width: UintWidth) -> Result<&mut Self, EncodingError> {
		let encoded = encode_uint(value, width)?;
		self.buf.push_str(&encoded);
		Ok(self)
	}

	pub fn push_bytes(&mut self, bytes: &[u8]) -> &mut Self {
		self.buf.push_str(&encode_bytes(bytes));
		self
	}

	pub fn push_hash(&mut self, hash: &B256) -> &mut Self {
		self.buf.push_str(&encode_bytes(hash.as_slice()));
		self
	}

	/// Appends an already-encoded hex segment.
	pub fn push_hex(&mut self, segment: &str) -> &mut Self {
		self.buf.push_str(segment);
		self
	}

	pub fn len(&self) -> usize {
		self.buf.len()
	}

	pub fn is_empty(&self) -> bool {
		self.buf.is_empty()
	}

	/// Hashes the accumulated hex without consuming the encoder.
	pub fn keccak(&self) -> Result<B256, EncodingError> {
		hash_hex(&self.buf)
	}

	pub fn finish(self) -> String {
		self.buf
	}
}

#[cfg(test)]
mod tests {
	use super::*;

	const KECCAK_EMPTY: &str = "c5d2460186f7233c927e7db2dcc703c0e500b653ca82273b7bfad8045d85a470";

	#[test]
	fn test_uint_padding() {
		assert_eq!(encode_uint(1, UintWidth::U32).unwrap(), "00000001");
		assert_eq!(encode_uint(900, UintWidth::U64).unwrap(), "0000000000000384");
		assert_eq!(
			encode_uint(u64::from(u32::MAX), UintWidth::U32).unwrap(),
			"ffffffff"
		);
		assert_eq!(
			encode_uint(u64::MAX, UintWidth::U64).unwrap(),
			"ffffffffffffffff"
		);
	}

	#[test]
	fn test_uint_overflow_is_rejected() {
		let err = encode_uint(u64::from(u32::MAX) + 1, UintWidth::U32).unwrap_err();
		assert_eq!(
			err,
			EncodingError::Overflow {
				value: 4_294_967_296,
				bits: 32
			}
		);
	}

	#[test]
	fn test_address_and_bytes() {
		let address = Address([0xab; 32]);
		assert_eq!(encode_address(&address), "ab".repeat(32));
		assert_eq!(encode_bytes(&[0x19, 0x01]), "1901");
	}

	#[test]
	fn test_hash_operates_on_decoded_bytes() {
		assert_eq!(hex::encode(hash_hex("").unwrap()), KECCAK_EMPTY);
		assert_eq!(hex::encode(hash_str("")), KECCAK_EMPTY);

		// "ab" as text is 0x6162; hashing its hex must equal hashing the string.
		assert_eq!(hash_hex("6162").unwrap(), hash_str("ab"));
		assert_ne!(hash_hex("6162").unwrap(), hash_str("6162"));
	}

	#[test]
	fn test_hash_rejects_malformed_hex() {
		assert!(matches!(
			hash_hex("xyz"),
			Err(EncodingError::InvalidField { .. })
		));
	}

	#[test]
	fn test_encoder_accumulates_in_order() {
		let mut enc = HexEncoder::new();
		enc.push_bytes(&[0x19, 0x01]);
		enc.push_uint(7, UintWidth::U32).unwrap();
		enc.push_address(&Address([1u8; 32]));
		let out = enc.finish();
		assert!(out.starts_with("190100000007"));
		assert_eq!(out.len(), 4 + 8 + 64);
	}

	#[test]
	fn test_for_field_wraps_overflow() {
		let err = EncodingError::Overflow { value: 1, bits: 32 }.for_field("nonce");
		assert!(matches!(err, EncodingError::InvalidField { field: "nonce", .. }));
	}

	#[test]
	fn test_malformed_address_maps_to_field_error() {
		let short = bs58::encode([1u8; 31]).into_string();
		let err: EncodingError = short.parse::<Address>().unwrap_err().into();
		assert!(matches!(
			err,
			EncodingError::InvalidField { field: "address", ref reason } if reason.contains("31")
		));

		let err: EncodingError = Address::try_from(&[0u8; 33][..]).unwrap_err().into();
		assert!(matches!(err, EncodingError::InvalidField { field: "address", .. }));

		let err: EncodingError = "not-base58-0OIl".parse::<Address>().unwrap_err().into();
		assert!(matches!(err, EncodingError::InvalidField { field: "address", .. }));
	}
}
