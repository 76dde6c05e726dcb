//! Opaque wrapper for the client secret and the bearer tokens exchanged for it.
//!
//! Both travel in query strings (`client_secret`, `ACCESS_TOKEN`), so formatting never
//! prints them. Logs correlate tokens through [`TokenSecret::fingerprint`] instead.

// crates.io
use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::_prelude::*;

/// Client secret or bearer token value.
///
/// Deserialized values are trimmed, so a secret read from an environment variable or a
/// mounted file does not carry its trailing newline onto the wire.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String")]
pub struct TokenSecret(String);
impl TokenSecret {
	/// Wraps `value` as-is.
	pub fn new(value: impl Into<String>) -> Self {
		Self(value.into())
	}

	/// Raw value, for building the outgoing request only.
	pub fn expose(&self) -> &str {
		&self.0
	}

	/// Returns `true` when the value is empty or whitespace.
	pub fn is_blank(&self) -> bool {
		self.0.trim().is_empty()
	}

	/// First 8 characters of the URL-safe SHA-256 digest; stable per value and safe to log.
	pub fn fingerprint(&self) -> String {
		let mut encoded = URL_SAFE_NO_PAD.encode(Sha256::digest(self.0.as_bytes()));

		encoded.truncate(8);

		encoded
	}
}
impl From<String> for TokenSecret {
	fn from(value: String) -> Self {
		match value.trim() {
			trimmed if trimmed.len() == value.len() => Self(value),
			trimmed => Self(trimmed.to_owned()),
		}
	}
}
impl Debug for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_tuple("TokenSecret").field(&"<redacted>").finish()
	}
}
impl Display for TokenSecret {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.write_str("<redacted>")
	}
}
