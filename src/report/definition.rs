//! What to fetch, how to shape it, and where to cache it.

// self
use crate::{
	_prelude::*,
	error::ConfigError,
	id::{CacheKey, ReportName},
	report::{FieldNormalizer, Passthrough, RecordNormalizer},
	upstream::ReportQuery,
};

/// Default time-to-live of cached report data.
pub const DEFAULT_CACHE_TTL: Duration = Duration::hours(1);

/// Describes one cacheable upstream dataset.
#[derive(Clone)]
pub struct ReportDefinition {
	/// Report name, used in logs and to derive the cache key.
	pub name: ReportName,
	/// Endpoint path relative to the API base URL.
	pub endpoint: String,
	/// Filters sent with every request.
	pub query: ReportQuery,
	/// Key the normalized records are cached under.
	pub cache_key: CacheKey,
	/// Lifetime of the cached records.
	pub ttl: Duration,
	/// Row shaping applied before caching.
	pub normalizer: Arc<dyn RecordNormalizer>,
}
impl ReportDefinition {
	/// Creates an unfiltered definition with passthrough rows and the default TTL.
	pub fn new(name: ReportName, endpoint: impl Into<String>) -> Self {
		let query = ReportQuery::new();

		Self {
			cache_key: CacheKey::for_report(&name, &query),
			name,
			endpoint: endpoint.into(),
			query,
			ttl: DEFAULT_CACHE_TTL,
			normalizer: Arc::new(Passthrough),
		}
	}

	/// `reports/ANAFACTURACION` restricted to the calendar `year`.
	pub fn invoices(year: i32) -> Result<Self, ConfigError> {
		let query = ReportQuery::calendar_year(year).ok_or_else(|| ConfigError::InvalidValue {
			field: "year",
			reason: format!("{year} is outside the supported calendar range"),
		})?;

		Ok(Self::new(ReportName::from_static("ANAFACTURACION"), "reports/ANAFACTURACION")
			.with_query(query)
			.with_normalizer(FieldNormalizer::invoices()))
	}

	/// `cliente/list`.
	pub fn customers() -> Self {
		Self::new(ReportName::from_static("cliente"), "cliente/list")
			.with_normalizer(FieldNormalizer::customers())
	}

	/// `producto/list`.
	pub fn products() -> Self {
		Self::new(ReportName::from_static("producto"), "producto/list")
			.with_normalizer(FieldNormalizer::products())
	}

	/// Replaces the filters and re-derives the cache key from them.
	pub fn with_query(mut self, query: ReportQuery) -> Self {
		self.cache_key = CacheKey::for_report(&self.name, &query);
		self.query = query;

		self
	}

	/// Overrides the derived cache key.
	pub fn with_cache_key(mut self, cache_key: CacheKey) -> Self {
		self.cache_key = cache_key;

		self
	}

	/// Overrides the cache TTL.
	pub fn with_ttl(mut self, ttl: Duration) -> Self {
		self.ttl = ttl;

		self
	}

	/// Overrides the row normalizer.
	pub fn with_normalizer(mut self, normalizer: impl 'static + RecordNormalizer) -> Self {
		self.normalizer = Arc::new(normalizer);

		self
	}
}
impl Debug for ReportDefinition {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ReportDefinition")
			.field("name", &self.name)
			.field("endpoint", &self.endpoint)
			.field("query", &self.query)
			.field("cache_key", &self.cache_key)
			.field("ttl", &self.ttl)
			.finish_non_exhaustive()
	}
}
