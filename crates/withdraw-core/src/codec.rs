//! Typed-message hashing for withdrawal approvals.
//!
//! Both withdrawal messages follow the typed-structured-data scheme: a domain
//! separator binds the message to a signing context, a struct hash binds the
//! field values to a type signature, and the final digest is
//! `keccak256(0x1901 ‖ domain ‖ struct)`. Segments are concatenated as hex and
//! decoded again before hashing, see [`withdraw_types::utils::encoding`].
//!
//! The custody and coordinator messages differ only in their type signature,
//! domain name and trailing `expiresAt` field, so one generic
//! [`TypedMessageCodec`] serves both through a [`MessageSchema`].

use alloy_primitives::B256;
use std::marker::PhantomData;
use withdraw_types::utils::{encode_bytes, hash_hex, hash_str, EncodingError, HexEncoder, UintWidth};
use withdraw_types::{Address, Salt};

/// Chain id bound into both domains.
pub const CHAIN_ID: u64 = 900;

pub const DOMAIN_TYPE: &str = concat!(
	"EIP712Domain(string name,string version,uint256 chainId,",
	"address verifyingContract,bytes32 salt)"
);

/// Version string shared by both domains.
pub const DOMAIN_VERSION: &str = "2";

/// Prefix of the final digest preimage.
pub const DIGEST_PREFIX: [u8; 2] = [0x19, 0x01];

/// Field values hashed by both withdrawal messages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WithdrawFields {
	pub sender: Address,
	pub collateral: Address,
	pub asset: Address,
	pub amount: u64,
	pub recipient: Address,
	/// Admin-funds nonce of the collateral account. Encoded as 32 bits.
	pub nonce: u64,
	pub expires_at: u64,
}

/// Signing context of one message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DomainSeparator {
	pub name: &'static str,
	pub version: &'static str,
	pub chain_id: u64,
	pub verifying_entity: Address,
	pub salt: Salt,
}

impl DomainSeparator {
	pub fn hash(&self) -> Result<B256, EncodingError> {
		let mut enc = HexEncoder::new();
		enc.push_hash(&hash_str(DOMAIN_TYPE))
			.push_hash(&hash_str(self.name))
			.push_hash(&hash_str(self.version))
			.push_uint(self.chain_id, UintWidth::U64)
			.map_err(|e| e.for_field("chainId"))?
			.push_address(&self.verifying_entity)
			.push_bytes(self.salt.as_bytes());
		enc.keccak()
	}
}

/// A type hash plus its hex-encoded field segments, in schema order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypedMessage {
	pub type_hash: B256,
	pub fields: Vec<String>,
}

impl TypedMessage {
	/// `keccak256(typeHash ‖ fields…)`.
	pub fn hash(&self) -> Result<B256, EncodingError> {
		let mut enc = HexEncoder::new();
		enc.push_hash(&self.type_hash);
		for field in &self.fields {
			enc.push_hex(field);
		}
		enc.keccak()
	}
}

/// Intermediate and final hashes of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MessageDigest {
	pub domain_hash: B256,
	pub struct_hash: B256,
	/// The 32 bytes a signer signs.
	pub digest: B256,
}

/// Combines a domain hash and a struct hash into the signed digest.
pub fn compute_final_digest(domain_hash: &B256, struct_hash: &B256) -> Result<B256, EncodingError> {
	let mut enc = HexEncoder::new();
	enc.push_bytes(&DIGEST_PREFIX)
		.push_hash(domain_hash)
		.push_hash(struct_hash);
	hash_hex(&enc.finish())
}

/// Field layout and naming of one message kind.
pub trait MessageSchema {
	const TYPE_SIGNATURE: &'static str;
	const DOMAIN_NAME: &'static str;
	const DOMAIN_VERSION: &'static str = DOMAIN_VERSION;

	/// Hex segments of `fields`, in type-signature order.
	fn encode_fields(fields: &WithdrawFields) -> Result<Vec<String>, EncodingError>;
}

fn common_segments(fields: &WithdrawFields) -> Result<Vec<String>, EncodingError> {
	use withdraw_types::utils::{encode_address, encode_uint};

	Ok(vec![
		encode_address(&fields.sender),
		encode_address(&fields.collateral),
		encode_address(&fields.asset),
		encode_uint(fields.amount, UintWidth::U64).map_err(|e| e.for_field("amount"))?,
		encode_address(&fields.recipient),
		encode_uint(fields.nonce, UintWidth::U32).map_err(|e| e.for_field("nonce"))?,
	])
}

/// Approval signed by the custody administrator (the sender).
#[derive(Debug, Clone, Copy)]
pub struct CustodyWithdraw;

impl MessageSchema for CustodyWithdraw {
	const TYPE_SIGNATURE: &'static str = concat!(
		"Withdraw(address user,address asset,uint256 amount,address recipient,",
		"uint256 nonce)"
	);
	const DOMAIN_NAME: &'static str = "Collateral";

	fn encode_fields(fields: &WithdrawFields) -> Result<Vec<String>, EncodingError> {
		common_segments(fields)
	}
}

/// Approval signed by the coordinating authority's approver.
#[derive(Debug, Clone, Copy)]
pub struct CoordinatorWithdraw;

impl MessageSchema for CoordinatorWithdraw {
	const TYPE_SIGNATURE: &'static str = concat!(
		"Withdraw(address user,address asset,uint256 amount,address recipient,",
		"uint256 nonce,uint64 expiresAt)"
	);
	const DOMAIN_NAME: &'static str = "Coordinator";

	fn encode_fields(fields: &WithdrawFields) -> Result<Vec<String>, EncodingError> {
		let mut segments = common_segments(fields)?;
		segments.push(
			withdraw_types::utils::encode_uint(fields.expires_at, UintWidth::U64)
				.map_err(|e| e.for_field("expiresAt"))?,
		);
		Ok(segments)
	}
}

/// Hashes messages of kind `S` under one domain.
#[derive(Debug, Clone, Copy)]
pub struct TypedMessageCodec<S> {
	domain: DomainSeparator,
	_schema: PhantomData<S>,
}

pub type CustodyCodec = TypedMessageCodec<CustodyWithdraw>;
pub type CoordinatorCodec = TypedMessageCodec<CoordinatorWithdraw>;

impl<S: MessageSchema> TypedMessageCodec<S> {
	pub fn new(verifying_entity: Address, salt: Salt) -> Self {
		Self {
			domain: DomainSeparator {
				name: S::DOMAIN_NAME,
				version: S::DOMAIN_VERSION,
				chain_id: CHAIN_ID,
				verifying_entity,
				salt,
			},
			_schema: PhantomData,
		}
	}

	pub fn domain(&self) -> &DomainSeparator {
		&self.domain
	}

	pub fn type_hash() -> B256 {
		hash_str(S::TYPE_SIGNATURE)
	}

	pub fn typed_message(fields: &WithdrawFields) -> Result<TypedMessage, EncodingError> {
		Ok(TypedMessage {
			type_hash: Self::type_hash(),
			fields: S::encode_fields(fields)?,
		})
	}

	/// Struct hash of `fields`; independent of the domain.
	pub fn struct_hash(fields: &WithdrawFields) -> Result<B256, EncodingError> {
		Self::typed_message(fields)?.hash()
	}

	/// Encodes every field first, then hashes.
	pub fn digest(&self, fields: &WithdrawFields) -> Result<MessageDigest, EncodingError> {
		let message = Self::typed_message(fields)?;
		let domain_hash = self.domain.hash()?;
		let struct_hash = message.hash()?;
		Ok(MessageDigest {
			domain_hash,
			struct_hash,
			digest: compute_final_digest(&domain_hash, &struct_hash)?,
		})
	}
}

/// Hex of the final digest preimage, for logging and external signers.
pub fn digest_preimage_hex(digest: &MessageDigest) -> String {
	format!(
		"{}{}{}",
		encode_bytes(&DIGEST_PREFIX),
		encode_bytes(digest.domain_hash.as_slice()),
		encode_bytes(digest.struct_hash.as_slice())
	)
}
