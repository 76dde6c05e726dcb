//! Cache-aside access to one report.
//!
//! A read checks the cache first; on a miss it joins (or starts) the single flight for
//! the definition's cache key, so concurrent readers racing on the same miss share one
//! upstream fetch. The cache is an optimization only: read failures fall through to the
//! upstream and write failures are logged and skipped.
//!
//! [`ReportRepository::invalidate`] detaches any pending flight for the key, and a flight
//! that started before the invalidation does not write its result back to the cache.

// self
use crate::{
	_prelude::*,
	auth::TokenFetcher,
	cache::CacheStore,
	flight::SingleFlight,
	id::CacheKey,
	obs::{self, OpKind, OpOutcome, OpSpan},
	report::{ReportDefinition, ReportRecord, normalize_payload},
	upstream::UpstreamClient,
};

/// Field populated by the invoice normalizer with the `MM-YYYY` month.
pub const MONTH_FIELD: &str = "month";

/// Single-flight group shared by repositories reading through the same cache.
pub type ReportFlights = SingleFlight<CacheKey, Result<Vec<ReportRecord>>>;

/// Cache-aside reader for one [`ReportDefinition`].
pub struct ReportRepository<F = dyn TokenFetcher>
where
	F: ?Sized + TokenFetcher,
{
	upstream: Arc<UpstreamClient<F>>,
	cache: Arc<dyn CacheStore>,
	definition: Arc<ReportDefinition>,
	flights: ReportFlights,
}
impl<F> ReportRepository<F>
where
	F: ?Sized + TokenFetcher,
{
	/// Creates a repository with its own single-flight group.
	pub fn new(
		upstream: Arc<UpstreamClient<F>>,
		cache: Arc<dyn CacheStore>,
		definition: ReportDefinition,
	) -> Self {
		Self { upstream, cache, definition: Arc::new(definition), flights: SingleFlight::new() }
	}

	/// Shares `flights` with other repositories over the same cache, so two repositories
	/// for the same cache key never fetch concurrently.
	pub fn with_flights(mut self, flights: ReportFlights) -> Self {
		self.flights = flights;

		self
	}

	/// Report this repository serves.
	pub fn definition(&self) -> &ReportDefinition {
		&self.definition
	}

	/// Returns every record of the report, from cache when a live entry exists.
	pub async fn fetch_all(&self) -> Result<Vec<ReportRecord>> {
		OpSpan::new(OpKind::ReportFetch, "fetch_all").instrument(self.fetch_all_inner()).await
	}

	/// Records whose `month` field equals `month` (`MM-YYYY`).
	pub async fn fetch_month(&self, month: &str) -> Result<Vec<ReportRecord>> {
		let mut records = self.fetch_all().await?;

		records.retain(|record| record.text(MONTH_FIELD) == Some(month));

		Ok(records)
	}

	/// Records grouped by their `month` field; records without one are skipped.
	pub async fn fetch_by_month(&self) -> Result<BTreeMap<String, Vec<ReportRecord>>> {
		self.group_by(MONTH_FIELD).await
	}

	/// Records grouped by the string value of `field`; records without one are skipped.
	pub async fn group_by(&self, field: &str) -> Result<BTreeMap<String, Vec<ReportRecord>>> {
		let mut groups = <BTreeMap<String, Vec<ReportRecord>>>::new();

		for record in self.fetch_all().await? {
			let Some(value) = record.text(field).filter(|value| !value.is_empty()).map(str::to_owned) else {
				continue;
			};

			groups.entry(value).or_default().push(record);
		}

		Ok(groups)
	}

	/// First record whose `field` equals `value`.
	pub async fn find_by(&self, field: &str, value: &str) -> Result<Option<ReportRecord>> {
		Ok(self.fetch_all().await?.into_iter().find(|record| record.text(field) == Some(value)))
	}

	/// Drops the cached records so the next read goes upstream.
	///
	/// A fetch already in flight is detached: its current waiters still receive its
	/// records, but it does not repopulate the cache and later readers start a new fetch.
	/// Unlike reads, a failing cache is reported here: the caller asked for this
	/// specific side effect.
	pub async fn invalidate(&self) -> Result<bool> {
		let detached = self.flights.forget(&self.definition.cache_key);

		if detached {
			tracing::debug!(report = %self.definition.name, "detached in-flight fetch");
		}

		let removed = self.cache.delete(&self.definition.cache_key).await?;

		tracing::info!(report = %self.definition.name, removed, "report cache invalidated");

		Ok(removed)
	}

	async fn fetch_all_inner(&self) -> Result<Vec<ReportRecord>> {
		let definition = &self.definition;

		obs::record_outcome(OpKind::ReportFetch, OpOutcome::Attempt);

		if let Some(records) = read_cached(&*self.cache, definition).await {
			obs::record_outcome(OpKind::ReportFetch, OpOutcome::CacheHit);
			tracing::debug!(report = %definition.name, records = records.len(), "cache hit");

			return Ok(records);
		}

		obs::record_outcome(OpKind::ReportFetch, OpOutcome::CacheMiss);

		let upstream = self.upstream.clone();
		let cache = self.cache.clone();
		let shared = definition.clone();
		let flights = self.flights.clone();
		let generation = self.flights.generation(&definition.cache_key);
		let result = self
			.flights
			.run(definition.cache_key.clone(), move || {
				load(upstream, cache, shared, flights, generation)
			})
			.await;

		match &result {
			Ok(_) => obs::record_outcome(OpKind::ReportFetch, OpOutcome::Success),
			Err(_) => obs::record_outcome(OpKind::ReportFetch, OpOutcome::Failure),
		}

		result
	}
}
impl<F> Debug for ReportRepository<F>
where
	F: ?Sized + TokenFetcher,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ReportRepository")
			.field("definition", &self.definition)
			.field("flights", &self.flights)
			.finish_non_exhaustive()
	}
}

async fn load<F>(
	upstream: Arc<UpstreamClient<F>>,
	cache: Arc<dyn CacheStore>,
	definition: Arc<ReportDefinition>,
	flights: ReportFlights,
	generation: u64,
) -> Result<Vec<ReportRecord>>
where
	F: ?Sized + TokenFetcher,
{
	// A flight that finished between our cache read and joining the group already
	// populated the cache.
	if let Some(records) = read_cached(&*cache, &definition).await {
		tracing::debug!(report = %definition.name, "cache populated by a concurrent fetch");

		return Ok(records);
	}

	tracing::info!(report = %definition.name, "cache miss; fetching from upstream");

	let payload = upstream.get(&definition.endpoint, &definition.query).await?;
	let records = normalize_payload(definition.normalizer.as_ref(), &payload);

	if flights.generation(&definition.cache_key) == generation {
		write_cached(&*cache, &definition, &records).await;
	} else {
		tracing::info!(report = %definition.name, "invalidated while fetching; skipping cache write");
	}

	Ok(records)
}

async fn read_cached(cache: &dyn CacheStore, definition: &ReportDefinition) -> Option<Vec<ReportRecord>> {
	let blob = match cache.get(&definition.cache_key).await {
		Ok(blob) => blob?,
		Err(e) => {
			tracing::warn!(report = %definition.name, error = %e, "cache read failed; falling through to upstream");

			return None;
		},
	};

	match serde_json::from_str(&blob) {
		Ok(records) => Some(records),
		Err(e) => {
			tracing::warn!(report = %definition.name, error = %e, "cached payload is undecodable; ignoring it");

			None
		},
	}
}

async fn write_cached(cache: &dyn CacheStore, definition: &ReportDefinition, records: &[ReportRecord]) {
	let blob = match serde_json::to_string(records) {
		Ok(blob) => blob,
		Err(e) => {
			tracing::warn!(report = %definition.name, error = %e, "records could not be encoded; skipping cache write");

			return;
		},
	};

	match cache.set(&definition.cache_key, blob, definition.ttl).await {
		Ok(()) => tracing::debug!(report = %definition.name, records = records.len(), "records cached"),
		Err(e) => tracing::warn!(report = %definition.name, error = %e, "cache write failed; skipping"),
	}
}
