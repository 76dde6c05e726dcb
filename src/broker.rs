//! Composition root wiring the credential store, upstream client, and cache together.

// self
use crate::{
	_prelude::*,
	auth::{CredentialStore, HttpTokenFetcher, TokenFetcher},
	cache::{CacheStore, MemoryCache},
	clock::{Clock, SystemClock},
	config::BrokerConfig,
	http::HttpClient,
	report::{DEFAULT_CACHE_TTL, ReportDefinition, ReportFlights, ReportRepository},
	upstream::UpstreamClient,
};

/// Owns the shared collaborators and hands out [`ReportRepository`] instances.
///
/// Every repository created by one broker shares its credential store, cache, and
/// single-flight group, so concurrent readers of the same report never fetch twice.
#[derive(Clone)]
pub struct ReportBroker {
	upstream: Arc<UpstreamClient>,
	cache: Arc<dyn CacheStore>,
	flights: ReportFlights,
	clock: Arc<dyn Clock>,
	cache_ttl: Duration,
}
impl ReportBroker {
	/// Builds the full stack from `config` with an in-memory cache and the system clock.
	pub fn from_config(config: &BrokerConfig) -> Result<Self> {
		Self::from_config_with_clock(config, Arc::new(SystemClock))
	}

	/// Same as [`from_config`](Self::from_config) with every freshness check driven by
	/// `clock`.
	pub fn from_config_with_clock(config: &BrokerConfig, clock: Arc<dyn Clock>) -> Result<Self> {
		config.validate()?;

		Self::from_config_with_http(config, HttpClient::new(config.http_timeout())?, clock)
	}

	/// Same as [`from_config_with_clock`](Self::from_config_with_clock) over a prebuilt
	/// transport (custom TLS roots, proxies). `config.http_timeout_ms` is not applied to
	/// `http`; the caller owns its timeout.
	pub fn from_config_with_http(
		config: &BrokerConfig,
		http: HttpClient,
		clock: Arc<dyn Clock>,
	) -> Result<Self> {
		config.validate()?;

		let fetcher = HttpTokenFetcher::new(http.clone(), &config.identity_base()?)?
			.with_policy(config.token_policy())
			.with_fallback_lifetime(config.token_fallback_lifetime())
			.with_clock(clock.clone());
		let fetcher: Arc<dyn TokenFetcher> = Arc::new(fetcher);
		let credentials = CredentialStore::new(fetcher, config.client_credentials())
			.with_clock(clock.clone())
			.with_safety_margin(config.safety_margin());
		let upstream = UpstreamClient::new(http, config.api_base()?, Arc::new(credentials))
			.with_policy(config.upstream_policy());

		tracing::info!(
			client_id = %config.client_id,
			api_url = %config.api_url,
			cache_ttl_secs = config.cache_ttl_secs,
			"report broker configured"
		);

		Ok(Self::new(Arc::new(upstream), Arc::new(MemoryCache::with_clock(clock.clone())))
			.with_clock(clock)
			.with_cache_ttl(config.cache_ttl()))
	}

	/// Assembles a broker from prebuilt collaborators.
	pub fn new(upstream: Arc<UpstreamClient>, cache: Arc<dyn CacheStore>) -> Self {
		Self {
			upstream,
			cache,
			flights: ReportFlights::new(),
			clock: Arc::new(SystemClock),
			cache_ttl: DEFAULT_CACHE_TTL,
		}
	}

	/// Replaces the cache backend (e.g. with a remote key/value service).
	pub fn with_cache(mut self, cache: Arc<dyn CacheStore>) -> Self {
		self.cache = cache;
		self.flights = ReportFlights::new();

		self
	}

	/// Overrides the clock used to pick the current year.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Overrides the TTL applied by the preset repositories.
	pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
		self.cache_ttl = ttl;

		self
	}

	/// Shared reporting client.
	pub fn upstream(&self) -> &Arc<UpstreamClient> {
		&self.upstream
	}

	/// Shared credential store.
	pub fn credentials(&self) -> &Arc<CredentialStore> {
		self.upstream.credentials()
	}

	/// Shared cache backend.
	pub fn cache(&self) -> &Arc<dyn CacheStore> {
		&self.cache
	}

	/// Repository for an arbitrary definition, used as-is.
	pub fn repository(&self, definition: ReportDefinition) -> ReportRepository {
		ReportRepository::new(self.upstream.clone(), self.cache.clone(), definition)
			.with_flights(self.flights.clone())
	}

	/// Invoices of calendar `year`.
	pub fn invoices(&self, year: i32) -> Result<ReportRepository> {
		let definition = ReportDefinition::invoices(year)?.with_ttl(self.cache_ttl);

		Ok(self.repository(definition))
	}

	/// Invoices of the current calendar year.
	pub fn current_invoices(&self) -> Result<ReportRepository> {
		self.invoices(self.clock.now().year())
	}

	/// Customer master data.
	pub fn customers(&self) -> ReportRepository {
		self.repository(ReportDefinition::customers().with_ttl(self.cache_ttl))
	}

	/// Product master data.
	pub fn products(&self) -> ReportRepository {
		self.repository(ReportDefinition::products().with_ttl(self.cache_ttl))
	}
}
impl Debug for ReportBroker {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("ReportBroker")
			.field("upstream", &self.upstream)
			.field("flights", &self.flights)
			.field("cache_ttl", &self.cache_ttl)
			.finish_non_exhaustive()
	}
}
