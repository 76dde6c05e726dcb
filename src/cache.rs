//! Cache contract for serialized report payloads and the built-in in-memory backend.
//!
//! The repository stores each report's normalized records as one JSON blob under a
//! single key, so backends only need string values with a per-entry TTL.

pub mod memory;

pub use memory::MemoryCache;

// self
use crate::{_prelude::*, id::CacheKey};

/// Boxed future returned by [`CacheStore`] operations.
pub type CacheFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, CacheError>> + 'a + Send>>;

/// Time-bounded key/value store used in front of the reporting API.
///
/// Backends may be in-process maps or remote key/value services; they must treat an
/// entry as absent once its TTL has elapsed whether or not it was physically removed.
pub trait CacheStore
where
	Self: Send + Sync,
{
	/// Returns the live value stored under `key`, if any.
	fn get<'a>(&'a self, key: &'a CacheKey) -> CacheFuture<'a, Option<String>>;

	/// Stores `value` under `key` for `ttl`, replacing any prior entry.
	fn set<'a>(&'a self, key: &'a CacheKey, value: String, ttl: Duration) -> CacheFuture<'a, ()>;

	/// Removes the entry under `key`; returns `true` when one existed.
	fn delete<'a>(&'a self, key: &'a CacheKey) -> CacheFuture<'a, bool>;
}

/// Value stamped with the instant it was stored and how long it stays readable.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CacheEntry<T> {
	/// Cached value.
	pub value: T,
	/// Instant the value was stored.
	pub stored_at: OffsetDateTime,
	/// Time-to-live measured from `stored_at`.
	pub ttl: Duration,
}
impl<T> CacheEntry<T> {
	/// Creates an entry stored at `stored_at`.
	pub fn new(value: T, stored_at: OffsetDateTime, ttl: Duration) -> Self {
		Self { value, stored_at, ttl }
	}

	/// Instant after which the entry is logically absent.
	pub fn expires_at(&self) -> OffsetDateTime {
		self.stored_at + self.ttl
	}

	/// Returns `true` while `now < stored_at + ttl`.
	pub fn is_live_at(&self, now: OffsetDateTime) -> bool {
		now < self.expires_at()
	}
}

/// Error type produced by [`CacheStore`] implementations.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ThisError)]
pub enum CacheError {
	/// Backend-level failure (connection refused, timeout, ...).
	#[error("Cache backend failure: {message}.")]
	Backend {
		/// Human-readable error payload.
		message: String,
	},
	/// A value could not be encoded or decoded.
	#[error("Cache serialization error: {message}.")]
	Serialization {
		/// Human-readable error payload.
		message: String,
	},
}
