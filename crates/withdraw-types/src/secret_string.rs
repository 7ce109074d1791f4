//! Key material that is zeroed on drop and never printed.

use crate::utils::{without_0x_prefix, EncodingError};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use zeroize::Zeroizing;

const REDACTED: &str = "***REDACTED***";

/// A secret read from configuration, typically a hex encoded private key.
///
/// `Debug`, `Display` and `Serialize` all redact the value.
#[derive(Clone, PartialEq, Eq)]
pub struct SecretString(Zeroizing<String>);

impl SecretString {
	pub fn new(s: impl Into<String>) -> Self {
		Self(Zeroizing::new(s.into()))
	}

	/// Runs `f` with the plain text. Prefer this over [`Self::expose_secret`].
	pub fn with_exposed<F, R>(&self, f: F) -> R
	where
		F: FnOnce(&str) -> R,
	{
		f(&self.0)
	}

	pub fn expose_secret(&self) -> &str {
		&self.0
	}

	/// Decodes the secret as hex (optional `0x` prefix) into zeroizing bytes.
	pub fn decode_hex(&self) -> Result<Zeroizing<Vec<u8>>, EncodingError> {
		hex::decode(without_0x_prefix(self.0.trim()))
			.map(Zeroizing::new)
			.map_err(|e| EncodingError::InvalidField {
				field: "private_key",
				reason: e.to_string(),
			})
	}

	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

impl fmt::Debug for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "SecretString({REDACTED})")
	}
}

impl fmt::Display for SecretString {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(REDACTED)
	}
}

impl From<&str> for SecretString {
	fn from(s: &str) -> Self {
		Self::new(s)
	}
}

impl From<String> for SecretString {
	fn from(s: String) -> Self {
		Self::new(s)
	}
}

impl Serialize for SecretString {
	fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
		serializer.serialize_str(REDACTED)
	}
}

impl<'de> Deserialize<'de> for SecretString {
	fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
		String::deserialize(deserializer).map(Self::new)
	}
}
