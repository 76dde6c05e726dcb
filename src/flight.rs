//! Single-flight de-duplication of concurrent work.
//!
//! The first caller for a key installs a shared pending future; later callers observe the
//! pending slot and await the same output instead of starting new work. The slot is
//! cleared once the flight resolves, so the next caller after completion starts fresh.
//!
//! [`SingleFlight::forget`] detaches a pending flight early and bumps the key's
//! generation, letting work that started before the call detect that its output is stale.

// crates.io
use futures::future::{BoxFuture, FutureExt, Shared};
// self
use crate::_prelude::*;

/// Shared in-flight computation whose output is cloned to every waiter.
pub type Flight<T> = Shared<BoxFuture<'static, T>>;

/// Wraps `fut` into a [`Flight`].
pub fn flight<F>(fut: F) -> Flight<F::Output>
where
	F: 'static + Send + Future,
	F::Output: Clone,
{
	fut.boxed().shared()
}

struct Slots<K, T>
where
	T: Clone,
{
	pending: HashMap<K, Flight<T>>,
	generations: HashMap<K, u64>,
}

/// Keyed single-flight group.
pub struct SingleFlight<K, T>
where
	T: Clone,
{
	slots: Arc<Mutex<Slots<K, T>>>,
}
impl<K, T> SingleFlight<K, T>
where
	K: Clone + Eq + Hash,
	T: Clone,
{
	/// Creates an empty group.
	pub fn new() -> Self {
		let slots = Slots { pending: HashMap::new(), generations: HashMap::new() };

		Self { slots: Arc::new(Mutex::new(slots)) }
	}

	/// Runs `work` for `key` unless a flight for `key` is already pending, in which case
	/// the caller joins it. Every participant receives a clone of the same output.
	pub async fn run<W, Fut>(&self, key: K, work: W) -> T
	where
		W: FnOnce() -> Fut,
		Fut: 'static + Send + Future<Output = T>,
	{
		let pending = {
			let mut slots = self.slots.lock();

			match slots.pending.get(&key) {
				Some(pending) => {
					tracing::debug!("joining in-flight work");

					pending.clone()
				},
				None => {
					let pending = flight(work());

					slots.pending.insert(key.clone(), pending.clone());

					pending
				},
			}
		};
		let output = pending.clone().await;
		let mut slots = self.slots.lock();

		if slots.pending.get(&key).is_some_and(|current| current.ptr_eq(&pending)) {
			slots.pending.remove(&key);
		}

		output
	}

	/// Detaches any pending flight for `key` and bumps its generation.
	///
	/// Current waiters still receive the detached flight's output; the next caller starts
	/// new work. Returns `true` if a flight was pending.
	pub fn forget(&self, key: &K) -> bool {
		let mut slots = self.slots.lock();

		*slots.generations.entry(key.clone()).or_default() += 1;

		slots.pending.remove(key).is_some()
	}

	/// Number of [`forget`](Self::forget) calls seen for `key`.
	pub fn generation(&self, key: &K) -> u64 {
		self.slots.lock().generations.get(key).copied().unwrap_or_default()
	}

	/// Returns `true` while a flight for `key` is pending.
	pub fn is_in_flight(&self, key: &K) -> bool {
		self.slots.lock().pending.contains_key(key)
	}
}
impl<K, T> Clone for SingleFlight<K, T>
where
	T: Clone,
{
	fn clone(&self) -> Self {
		Self { slots: self.slots.clone() }
	}
}
impl<K, T> Default for SingleFlight<K, T>
where
	K: Clone + Eq + Hash,
	T: Clone,
{
	fn default() -> Self {
		Self::new()
	}
}
impl<K, T> Debug for SingleFlight<K, T>
where
	T: Clone,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("SingleFlight").field("pending", &self.slots.lock().pending.len()).finish()
	}
}
