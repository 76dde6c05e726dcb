//! Broker configuration: programmatic defaults overlaid with `REPORTS_*` environment
//! variables.
//!
//! Precedence, lowest to highest:
//! 1. [`BrokerConfig::default`]
//! 2. Environment variables such as `REPORTS_CLIENT_ID` or `REPORTS_CACHE_TTL_SECS`

// crates.io
use figment::{
	Figment,
	providers::{Env, Serialized},
};
// self
use crate::{
	_prelude::*,
	auth::{ClientCredentials, TokenSecret},
	error::ConfigError,
	retry::{Backoff, MAX_RETRY_AFTER, RetryPolicy},
};

/// Environment variable prefix read by [`BrokerConfig::from_env`].
pub const ENV_PREFIX: &str = "REPORTS_";
/// Default identity and reporting base URL.
pub const DEFAULT_BASE_URL: &str = "https://api.finneg.com/api";

/// Settings consumed by [`ReportBroker::from_config`](crate::ReportBroker::from_config).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
	/// Client id exchanged for bearer tokens.
	pub client_id: String,
	/// Client secret exchanged for bearer tokens.
	pub client_secret: TokenSecret,
	/// Base URL of the identity endpoint (`oauth/token` is appended).
	pub identity_url: String,
	/// Base URL of the reporting API.
	pub api_url: String,
	/// Lifetime of cached report data, in seconds.
	pub cache_ttl_secs: u64,
	/// Per-request timeout, in milliseconds.
	pub http_timeout_ms: u64,
	/// Attempt ceiling for both the token and the reporting retry loops.
	pub max_retries: u32,
	/// Seconds before expiry at which a token is already treated as expired.
	pub safety_margin_secs: u64,
	/// Lifetime assumed for tokens returned without `expires_in`, in seconds.
	pub token_fallback_lifetime_secs: u64,
	/// First token-fetch backoff, doubled after every failure, in milliseconds.
	pub token_backoff_ms: u64,
	/// Fixed reporting API backoff, in milliseconds.
	pub upstream_backoff_ms: u64,
}
impl BrokerConfig {
	/// Defaults merged with `REPORTS_*` environment variables.
	pub fn figment() -> Figment {
		Figment::from(Serialized::defaults(Self::default())).merge(Env::prefixed(ENV_PREFIX))
	}

	/// Loads and validates the configuration from the environment.
	pub fn from_env() -> Result<Self, ConfigError> {
		Self::from_figment(Self::figment())
	}

	/// Extracts and validates the configuration from an arbitrary figment.
	pub fn from_figment(figment: Figment) -> Result<Self, ConfigError> {
		let config: Self = figment.extract()?;

		config.validate()?;

		Ok(config)
	}

	/// Rejects configurations the broker cannot run with.
	pub fn validate(&self) -> Result<(), ConfigError> {
		if self.client_id.trim().is_empty() {
			return Err(ConfigError::Missing { field: "client_id" });
		}
		if self.client_secret.is_blank() {
			return Err(ConfigError::Missing { field: "client_secret" });
		}

		self.identity_base()?;
		self.api_base()?;

		if self.max_retries == 0 {
			return Err(ConfigError::InvalidValue {
				field: "max_retries",
				reason: "at least one attempt is required".into(),
			});
		}
		if self.http_timeout_ms == 0 {
			return Err(ConfigError::InvalidValue {
				field: "http_timeout_ms",
				reason: "timeout must be positive".into(),
			});
		}
		if self.cache_ttl_secs == 0 {
			return Err(ConfigError::InvalidValue {
				field: "cache_ttl_secs",
				reason: "TTL must be positive".into(),
			});
		}
		if self.token_fallback_lifetime_secs <= self.safety_margin_secs {
			return Err(ConfigError::InvalidValue {
				field: "token_fallback_lifetime_secs",
				reason: "fallback lifetime must exceed the safety margin".into(),
			});
		}

		Ok(())
	}

	/// Parsed identity base URL.
	pub fn identity_base(&self) -> Result<Url, ConfigError> {
		parse_base("identity_url", &self.identity_url)
	}

	/// Parsed reporting API base URL.
	pub fn api_base(&self) -> Result<Url, ConfigError> {
		parse_base("api_url", &self.api_url)
	}

	/// Client id/secret pair.
	pub fn client_credentials(&self) -> ClientCredentials {
		ClientCredentials { client_id: self.client_id.clone(), client_secret: self.client_secret.clone() }
	}

	/// Cache TTL as a [`Duration`].
	pub fn cache_ttl(&self) -> Duration {
		seconds(self.cache_ttl_secs)
	}

	/// Request timeout as a [`Duration`].
	pub fn http_timeout(&self) -> Duration {
		milliseconds(self.http_timeout_ms)
	}

	/// Token safety margin as a [`Duration`].
	pub fn safety_margin(&self) -> Duration {
		seconds(self.safety_margin_secs)
	}

	/// Fallback token lifetime as a [`Duration`].
	pub fn token_fallback_lifetime(&self) -> Duration {
		seconds(self.token_fallback_lifetime_secs)
	}

	/// Token exchange retry policy: `max_retries` attempts with doubling backoff.
	pub fn token_policy(&self) -> RetryPolicy {
		RetryPolicy::new(
			self.max_retries,
			Backoff::Exponential { base: milliseconds(self.token_backoff_ms), max: MAX_RETRY_AFTER },
		)
	}

	/// Reporting API retry policy: `max_retries` attempts with fixed backoff.
	pub fn upstream_policy(&self) -> RetryPolicy {
		RetryPolicy::new(self.max_retries, Backoff::Fixed(milliseconds(self.upstream_backoff_ms)))
	}
}
impl Default for BrokerConfig {
	fn default() -> Self {
		Self {
			client_id: String::new(),
			client_secret: TokenSecret::new(""),
			identity_url: DEFAULT_BASE_URL.into(),
			api_url: DEFAULT_BASE_URL.into(),
			cache_ttl_secs: 3_600,
			http_timeout_ms: 10_000,
			max_retries: RetryPolicy::DEFAULT_MAX_ATTEMPTS,
			safety_margin_secs: 60,
			token_fallback_lifetime_secs: 3_000,
			token_backoff_ms: 2_000,
			upstream_backoff_ms: 1_000,
		}
	}
}

fn parse_base(field: &'static str, raw: &str) -> Result<Url, ConfigError> {
	let url = Url::parse(raw.trim()).map_err(|source| ConfigError::InvalidUrl { field, source })?;

	if !matches!(url.scheme(), "http" | "https") || url.cannot_be_a_base() {
		return Err(ConfigError::UnsupportedUrl { field, url: url.into() });
	}

	Ok(url)
}

fn seconds(value: u64) -> Duration {
	Duration::seconds(value.min(u32::MAX.into()) as i64)
}

fn milliseconds(value: u64) -> Duration {
	Duration::milliseconds(value.min(u32::MAX.into()) as i64)
}
