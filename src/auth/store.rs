//! Process-lifetime holder of the current bearer credential.
//!
//! The store is a small state machine guarded by a synchronous mutex that is never held
//! across an `.await`:
//!
//! ```text
//! Empty ─ensure_valid→ Fetching ─ok→ Valid ─(margin elapsed)→ Expired ─ensure_valid→ Fetching
//!                          │                 └─invalidate→ Invalidated ─ensure_valid→ Fetching
//!                          └─err→ Empty (error handed to every waiter)
//! ```
//!
//! While `Fetching`, the slot holds a shared [`Flight`]; concurrent callers clone and await
//! it instead of starting a second exchange, so all of them observe the same token or
//! the same failure.

// std
use std::sync::atomic::{AtomicU64, Ordering};
// self
use crate::{
	_prelude::*,
	auth::{ClientCredentials, Credential, DEFAULT_SAFETY_MARGIN, TokenFetcher},
	clock::{Clock, SystemClock},
	error::{FetchCause, FetchError},
	flight::{self, Flight},
};

type FetchOutcome = Result<Credential, FetchError>;

/// Observable lifecycle phase of a [`CredentialStore`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CredentialPhase {
	/// No token has been obtained yet, or the last refresh failed.
	Empty,
	/// A refresh is in flight.
	Fetching,
	/// A token is held and fresh by the safety-margin rule.
	Valid,
	/// A token is held but is within the safety margin of its expiry.
	Expired,
	/// The held token was discarded after an upstream rejection.
	Invalidated,
}

/// Thread-safe counters for credential refreshes.
#[derive(Debug, Default)]
pub struct CredentialMetrics {
	refreshes: AtomicU64,
	successes: AtomicU64,
	failures: AtomicU64,
	invalidations: AtomicU64,
}
impl CredentialMetrics {
	/// Number of refreshes started (one per single-flight group, not per waiter).
	pub fn refreshes(&self) -> u64 {
		self.refreshes.load(Ordering::Relaxed)
	}

	/// Number of refreshes that produced a token.
	pub fn successes(&self) -> u64 {
		self.successes.load(Ordering::Relaxed)
	}

	/// Number of refreshes that exhausted their retries.
	pub fn failures(&self) -> u64 {
		self.failures.load(Ordering::Relaxed)
	}

	/// Number of times a held token was discarded.
	pub fn invalidations(&self) -> u64 {
		self.invalidations.load(Ordering::Relaxed)
	}
}

enum CredentialState {
	Empty,
	Fetching(Flight<FetchOutcome>),
	Valid(Credential),
	Invalidated,
}

/// Shares one bearer credential across concurrent callers and renews it on demand.
pub struct CredentialStore<F = dyn TokenFetcher>
where
	F: ?Sized + TokenFetcher,
{
	fetcher: Arc<F>,
	client: ClientCredentials,
	clock: Arc<dyn Clock>,
	safety_margin: Duration,
	state: Mutex<CredentialState>,
	metrics: Arc<CredentialMetrics>,
}
impl<F> CredentialStore<F>
where
	F: ?Sized + TokenFetcher,
{
	/// Creates an empty store that exchanges `client` through `fetcher`.
	pub fn new(fetcher: Arc<F>, client: ClientCredentials) -> Self {
		Self {
			fetcher,
			client,
			clock: Arc::new(SystemClock),
			safety_margin: DEFAULT_SAFETY_MARGIN,
			state: Mutex::new(CredentialState::Empty),
			metrics: Default::default(),
		}
	}

	/// Overrides the clock used for freshness checks.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Overrides the safety margin (defaults to 60 seconds). Negative values become zero.
	pub fn with_safety_margin(mut self, margin: Duration) -> Self {
		self.safety_margin = margin.max(Duration::ZERO);

		self
	}

	/// Shared refresh counters.
	pub fn metrics(&self) -> Arc<CredentialMetrics> {
		self.metrics.clone()
	}

	/// Current lifecycle phase; expiry is observed lazily against the clock.
	pub fn phase(&self) -> CredentialPhase {
		match &*self.state.lock() {
			CredentialState::Empty => CredentialPhase::Empty,
			CredentialState::Fetching(_) => CredentialPhase::Fetching,
			CredentialState::Valid(credential) =>
				if credential.is_fresh_at(self.clock.now(), self.safety_margin) {
					CredentialPhase::Valid
				} else {
					CredentialPhase::Expired
				},
			CredentialState::Invalidated => CredentialPhase::Invalidated,
		}
	}

	/// Returns a credential that is fresh by the safety-margin rule, refreshing first when
	/// none is held.
	///
	/// Concurrent callers that find no fresh credential share exactly one
	/// [`TokenFetcher::fetch`] and all receive its outcome.
	pub async fn ensure_valid(&self) -> Result<Credential, FetchError> {
		let pending = {
			let mut state = self.state.lock();

			match &*state {
				CredentialState::Valid(credential)
					if credential.is_fresh_at(self.clock.now(), self.safety_margin) =>
					return Ok(credential.clone()),
				CredentialState::Fetching(pending) => {
					tracing::debug!("joining in-flight token refresh");

					pending.clone()
				},
				_ => {
					let pending = self.start_refresh();

					*state = CredentialState::Fetching(pending.clone());

					pending
				},
			}
		};
		let outcome = pending.clone().await;

		self.settle(&pending, &outcome);

		outcome
	}

	/// Discards the held token so the next [`ensure_valid`](Self::ensure_valid) refreshes.
	///
	/// An in-flight refresh is left alone: it already yields a new token.
	pub fn invalidate(&self) {
		let mut state = self.state.lock();

		if matches!(&*state, CredentialState::Valid(_)) {
			*state = CredentialState::Invalidated;

			self.metrics.invalidations.fetch_add(1, Ordering::Relaxed);
			tracing::info!("credential invalidated");
		}
	}

	/// Discards the held token only if it is still `rejected`.
	///
	/// Returns `true` when the store was invalidated. A request that was rejected with an
	/// older token must not throw away a newer one another request already obtained.
	pub fn invalidate_rejected(&self, rejected: &Credential) -> bool {
		let mut state = self.state.lock();

		match &*state {
			CredentialState::Valid(current) if current.token == rejected.token => {
				let token = current.token.fingerprint();

				*state = CredentialState::Invalidated;

				self.metrics.invalidations.fetch_add(1, Ordering::Relaxed);
				tracing::info!(%token, "credential rejected upstream; invalidated");

				true
			},
			_ => false,
		}
	}

	fn start_refresh(&self) -> Flight<FetchOutcome> {
		let fetcher = self.fetcher.clone();
		let client = self.client.clone();
		let clock = self.clock.clone();
		let safety_margin = self.safety_margin;

		self.metrics.refreshes.fetch_add(1, Ordering::Relaxed);
		tracing::debug!("starting token refresh");

		flight::flight(async move {
			let credential = fetcher.fetch(&client).await?;
			let now = clock.now();

			if credential.token.is_blank() {
				return Err(FetchError {
					cause: FetchCause::Malformed { reason: "access token is empty".into() },
					attempts: 1,
				});
			}
			// Checked inside the flight so every waiter sees the same failure.
			if !credential.is_fresh_at(now, safety_margin) {
				return Err(FetchError {
					cause: FetchCause::ShortLived { remaining: credential.remaining_at(now), safety_margin },
					attempts: 1,
				});
			}

			Ok(credential)
		})
	}

	fn settle(&self, pending: &Flight<FetchOutcome>, outcome: &FetchOutcome) {
		let mut state = self.state.lock();

		if !matches!(&*state, CredentialState::Fetching(current) if current.ptr_eq(pending)) {
			return;
		}

		*state = match outcome {
			Ok(credential) => {
				self.metrics.successes.fetch_add(1, Ordering::Relaxed);

				CredentialState::Valid(credential.clone())
			},
			Err(err) => {
				self.metrics.failures.fetch_add(1, Ordering::Relaxed);
				tracing::warn!(error = %err, "token refresh failed");

				CredentialState::Empty
			},
		};
	}
}
impl<F> Debug for CredentialStore<F>
where
	F: ?Sized + TokenFetcher,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("CredentialStore")
			.field("client_id", &self.client.client_id)
			.field("phase", &self.phase())
			.field("safety_margin", &self.safety_margin)
			.finish()
	}
}
