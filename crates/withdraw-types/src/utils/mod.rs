//! Utility functions for hex encoding, hashing and string formatting.

pub mod encoding;
pub mod formatting;

pub use encoding::{
	encode_address, encode_bytes, encode_uint, hash_hex, hash_str, EncodingError, HexEncoder,
	UintWidth,
};
pub use formatting::{parse_hex_array, truncate_id, without_0x_prefix};
