//! Thread-safe in-memory [`CacheStore`] for single-process deployments and tests.

// self
use crate::{
	_prelude::*,
	cache::{CacheEntry, CacheFuture, CacheStore},
	clock::{Clock, SystemClock},
	id::CacheKey,
};

type CacheMap = Arc<RwLock<HashMap<CacheKey, CacheEntry<String>>>>;

/// TTL-aware in-process cache. Expired entries are evicted lazily on read or in bulk via
/// [`MemoryCache::purge_expired`].
#[derive(Clone)]
pub struct MemoryCache {
	entries: CacheMap,
	clock: Arc<dyn Clock>,
}
impl MemoryCache {
	/// Creates an empty cache driven by the system clock.
	pub fn new() -> Self {
		Self::with_clock(Arc::new(SystemClock))
	}

	/// Creates an empty cache driven by `clock`.
	pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
		Self { entries: Default::default(), clock }
	}

	/// Removes every elapsed entry and returns how many were dropped.
	pub fn purge_expired(&self) -> usize {
		let now = self.clock.now();
		let mut entries = self.entries.write();
		let before = entries.len();

		entries.retain(|_, entry| entry.is_live_at(now));

		before - entries.len()
	}

	/// Number of physically stored entries, including elapsed ones not yet purged.
	pub fn len(&self) -> usize {
		self.entries.read().len()
	}

	/// Returns `true` when nothing is stored.
	pub fn is_empty(&self) -> bool {
		self.entries.read().is_empty()
	}

	fn get_now(&self, key: &CacheKey) -> Option<String> {
		let now = self.clock.now();

		{
			let entries = self.entries.read();

			match entries.get(key) {
				Some(entry) if entry.is_live_at(now) => return Some(entry.value.clone()),
				Some(_) => (),
				None => return None,
			}
		}

		let mut entries = self.entries.write();

		// Re-check: a writer may have replaced the entry between the two locks.
		if entries.get(key).is_some_and(|entry| !entry.is_live_at(now)) {
			entries.remove(key);
		}

		None
	}

	fn set_now(&self, key: &CacheKey, value: String, ttl: Duration) {
		let mut entries = self.entries.write();

		if !ttl.is_positive() {
			entries.remove(key);

			return;
		}

		entries.insert(key.clone(), CacheEntry::new(value, self.clock.now(), ttl));
	}

	fn delete_now(&self, key: &CacheKey) -> bool {
		self.entries.write().remove(key).is_some()
	}
}
impl Default for MemoryCache {
	fn default() -> Self {
		Self::new()
	}
}
impl Debug for MemoryCache {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("MemoryCache").field("entries", &self.len()).finish()
	}
}
impl CacheStore for MemoryCache {
	fn get<'a>(&'a self, key: &'a CacheKey) -> CacheFuture<'a, Option<String>> {
		Box::pin(async move { Ok(self.get_now(key)) })
	}

	fn set<'a>(&'a self, key: &'a CacheKey, value: String, ttl: Duration) -> CacheFuture<'a, ()> {
		Box::pin(async move {
			self.set_now(key, value, ttl);

			Ok(())
		})
	}

	fn delete<'a>(&'a self, key: &'a CacheKey) -> CacheFuture<'a, bool> {
		Box::pin(async move { Ok(self.delete_now(key)) })
	}
}
