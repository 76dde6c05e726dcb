//! Strongly typed identifiers for report names and cache keys.

// std
use std::{borrow::Borrow, ops::Deref};
// crates.io
use base64::{Engine, engine::general_purpose::STANDARD_NO_PAD};
use sha2::{Digest, Sha256};
// self
use crate::{_prelude::*, upstream::ReportQuery};

macro_rules! def_id {
	($name:ident, $doc:literal, $kind:literal, $allow_slash:literal) => {
		#[doc = $doc]
		#[derive(Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
		#[serde(try_from = "String", into = "String")]
		pub struct $name(String);
		impl $name {
			/// Creates a new identifier after validation.
			pub fn new(value: impl AsRef<str>) -> Result<Self, IdentifierError> {
				let view = value.as_ref();

				validate_view($kind, view, $allow_slash)?;

				Ok(Self(view.to_owned()))
			}

			#[allow(dead_code)]
			pub(crate) fn from_static(value: &'static str) -> Self {
				debug_assert!(validate_view($kind, value, $allow_slash).is_ok());

				Self(value.to_owned())
			}
		}
		impl Deref for $name {
			type Target = str;

			fn deref(&self) -> &Self::Target {
				&self.0
			}
		}
		impl AsRef<str> for $name {
			fn as_ref(&self) -> &str {
				&self.0
			}
		}
		impl From<$name> for String {
			fn from(value: $name) -> Self {
				value.0
			}
		}
		impl TryFrom<String> for $name {
			type Error = IdentifierError;

			fn try_from(value: String) -> Result<Self, Self::Error> {
				validate_view($kind, &value, $allow_slash)?;

				Ok(Self(value))
			}
		}
		impl Borrow<str> for $name {
			fn borrow(&self) -> &str {
				&self.0
			}
		}
		impl Debug for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				write!(f, concat!($kind, "({})"), self.0)
			}
		}
		impl Display for $name {
			fn fmt(&self, f: &mut Formatter) -> FmtResult {
				f.write_str(&self.0)
			}
		}
		impl FromStr for $name {
			type Err = IdentifierError;

			fn from_str(s: &str) -> Result<Self, Self::Err> {
				Self::new(s)
			}
		}
	};
}

const IDENTIFIER_MAX_LEN: usize = 128;

/// Error returned when identifier validation fails.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, ThisError)]
pub enum IdentifierError {
	/// The identifier was empty.
	#[error("{kind} identifier cannot be empty.")]
	Empty {
		/// Kind of identifier (report, cache key).
		kind: &'static str,
	},
	/// The identifier contains whitespace characters.
	#[error("{kind} identifier contains whitespace.")]
	ContainsWhitespace {
		/// Kind of identifier (report, cache key).
		kind: &'static str,
	},
	/// The identifier contains a path separator.
	#[error("{kind} identifier cannot contain `/`.")]
	ContainsSlash {
		/// Kind of identifier (report, cache key).
		kind: &'static str,
	},
	/// The identifier exceeded the allowed character count.
	#[error("{kind} identifier exceeds {max} characters.")]
	TooLong {
		/// Kind of identifier (report, cache key).
		kind: &'static str,
		/// Maximum permitted character count.
		max: usize,
	},
}

def_id! { ReportName, "Name of an upstream report, used as the last path segment.", "Report", false }
def_id! { CacheKey, "Key under which a report's normalized records are cached.", "CacheKey", true }

impl CacheKey {
	/// Derives the cache key for a report and its query filters.
	///
	/// Unfiltered reports map to `report:<name>`; filtered ones append a base64 (no
	/// padding) SHA-256 fingerprint of the canonical query so distinct date ranges never
	/// share an entry.
	pub fn for_report(name: &ReportName, query: &ReportQuery) -> Self {
		if query.is_empty() {
			return Self(format!("report:{name}"));
		}

		Self(format!("report:{name}:{}", fingerprint(query)))
	}
}

fn fingerprint(query: &ReportQuery) -> String {
	let mut hasher = Sha256::new();

	for (key, value) in query.iter() {
		hasher.update(key.as_bytes());
		hasher.update(b"=");
		hasher.update(value.as_bytes());
		hasher.update(b"&");
	}

	STANDARD_NO_PAD.encode(hasher.finalize())
}

fn validate_view(kind: &'static str, view: &str, allow_slash: bool) -> Result<(), IdentifierError> {
	if view.is_empty() {
		return Err(IdentifierError::Empty { kind });
	}
	if view.chars().any(char::is_whitespace) {
		return Err(IdentifierError::ContainsWhitespace { kind });
	}
	if !allow_slash && view.contains('/') {
		return Err(IdentifierError::ContainsSlash { kind });
	}
	if view.len() > IDENTIFIER_MAX_LEN {
		return Err(IdentifierError::TooLong { kind, max: IDENTIFIER_MAX_LEN });
	}

	Ok(())
}
