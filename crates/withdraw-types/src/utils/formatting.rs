//! String formatting utilities.
//!
//! Provides hex prefix stripping, fixed-length hex parsing, and truncation of
//! long identifiers for log output.

use super::encoding::EncodingError;

/// Truncates an identifier for display: the first 8 characters followed by "..".
pub fn truncate_id(id: &str) -> String {
	if id.len() <= 8 {
		id.to_string()
	} else {
		format!("{}..", &id[..8])
	}
}

/// Removes "0x" or "0X" prefix from a hex string if present.
pub fn without_0x_prefix(hex_str: &str) -> &str {
	hex_str
		.strip_prefix("0x")
		.or_else(|| hex_str.strip_prefix("0X"))
		.unwrap_or(hex_str)
}

/// Parses a hex string (optionally 0x-prefixed) into exactly `N` bytes.
pub fn parse_hex_array<const N: usize>(
	field: &'static str,
	input: &str,
) -> Result<[u8; N], EncodingError> {
	let bytes =
		hex::decode(without_0x_prefix(input.trim())).map_err(|e| EncodingError::InvalidField {
			field,
			reason: e.to_string(),
		})?;
	let len = bytes.len();
	bytes.try_into().map_err(|_| EncodingError::InvalidField {
		field,
		reason: format!("expected {} bytes, got {}", N, len),
	})
}

#[cfg(test)]
mod tests {
	use super::*;

	#[test]
	fn test_prefix_helpers() {
		assert_eq!(without_0x_prefix("0xabcd"), "abcd");
		assert_eq!(without_0x_prefix("0Xabcd"), "abcd");
		assert_eq!(without_0x_prefix("abcd"), "abcd");
	}

	#[test]
	fn test_truncate_id() {
		assert_eq!(truncate_id("short"), "short");
		assert_eq!(truncate_id("5KtP3nWzbD1q"), "5KtP3nWz..");
	}

	#[test]
	fn test_parse_hex_array() {
		let parsed: [u8; 2] = parse_hex_array("salt", "0x1901").unwrap();
		assert_eq!(parsed, [0x19, 0x01]);

		let err = parse_hex_array::<32>("salt", "0x1901").unwrap_err();
		assert!(matches!(err, EncodingError::InvalidField { field: "salt", .. }));
		assert!(parse_hex_array::<2>("salt", "zz").is_err());
	}
}
