//! Broker-level error types shared across the credential, upstream, and cache layers.
//!
//! Every error is [`Clone`]: single-flight groups hand the same failure to each waiter,
//! so sources that are not clonable themselves are kept behind an [`Arc`].

// self
use crate::_prelude::*;

/// Broker-wide result type alias returning [`Error`] by default.
pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Shared, clonable error source.
pub type SharedSource = Arc<dyn StdError + Send + Sync>;

/// Canonical broker error exposed by public APIs.
#[derive(Clone, Debug, ThisError)]
pub enum Error {
	/// Local configuration problem.
	#[error(transparent)]
	Config(#[from] ConfigError),
	/// Bearer token could not be obtained after exhausting the fetch retries.
	#[error("Credential is unavailable: {0}")]
	CredentialUnavailable(#[from] FetchError),
	/// Reporting endpoint kept failing until the attempt ceiling was reached.
	#[error(transparent)]
	Upstream(#[from] UpstreamError),
	/// Cache backend failure surfaced by an explicit cache operation.
	#[error(transparent)]
	Cache(#[from] crate::cache::CacheError),
}
impl Error {
	/// Classifies the error into the broker's failure taxonomy.
	pub fn kind(&self) -> ErrorKind {
		match self {
			Self::Config(_) => ErrorKind::Config,
			Self::CredentialUnavailable(_) => ErrorKind::CredentialUnavailable,
			Self::Upstream(e) => match e.last_cause {
				UpstreamCause::Transient(_) => ErrorKind::UpstreamTransient,
				UpstreamCause::AuthRejected { .. } => ErrorKind::UpstreamAuthRejected,
				UpstreamCause::Rejected { .. } => ErrorKind::UpstreamRejected,
			},
			Self::Cache(_) => ErrorKind::CacheUnavailable,
		}
	}
}

/// Coarse failure classes reported by [`Error::kind`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
	/// Invalid local configuration.
	Config,
	/// Token fetch retries were exhausted.
	CredentialUnavailable,
	/// Timeout, 5xx, or connection failure outlived the retry budget.
	UpstreamTransient,
	/// The reporting endpoint kept answering 401 after credential renewal.
	UpstreamAuthRejected,
	/// The reporting endpoint refused the request permanently (4xx).
	UpstreamRejected,
	/// The cache backend failed.
	CacheUnavailable,
}

/// Configuration and validation failures raised by the broker.
#[derive(Clone, Debug, ThisError)]
pub enum ConfigError {
	/// HTTP client could not be constructed.
	#[error("HTTP client could not be constructed.")]
	HttpClientBuild {
		/// Underlying transport builder failure.
		#[source]
		source: SharedSource,
	},
	/// Configuration sources could not be merged or deserialized.
	#[error("Configuration could not be extracted.")]
	Extract {
		/// Underlying figment failure.
		#[source]
		source: SharedSource,
	},
	/// A URL setting could not be parsed.
	#[error("The {field} setting is not a valid URL.")]
	InvalidUrl {
		/// Offending setting name.
		field: &'static str,
		/// Underlying parsing failure.
		#[source]
		source: url::ParseError,
	},
	/// A URL setting cannot carry path segments (e.g. `mailto:`).
	#[error("The {field} setting must be a hierarchical http(s) URL: {url}.")]
	UnsupportedUrl {
		/// Offending setting name.
		field: &'static str,
		/// URL that failed validation.
		url: String,
	},
	/// A required setting is empty.
	#[error("The {field} setting is required.")]
	Missing {
		/// Missing setting name.
		field: &'static str,
	},
	/// A setting holds a value outside its supported range.
	#[error("The {field} setting is invalid: {reason}.")]
	InvalidValue {
		/// Offending setting name.
		field: &'static str,
		/// Human-readable reason.
		reason: String,
	},
	/// An identifier failed validation.
	#[error(transparent)]
	Identifier(#[from] crate::id::IdentifierError),
}
impl ConfigError {
	/// Wraps a transport's builder failure inside [`ConfigError`].
	pub fn http_client_build(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::HttpClientBuild { source: Arc::new(src) }
	}
}
impl From<ReqwestError> for ConfigError {
	fn from(e: ReqwestError) -> Self {
		Self::http_client_build(e.without_url())
	}
}
impl From<figment::Error> for ConfigError {
	fn from(e: figment::Error) -> Self {
		Self::Extract { source: Arc::new(e) }
	}
}

/// Temporary failure variants (safe to retry).
#[derive(Clone, Debug, ThisError)]
pub enum TransientError {
	/// The request exceeded the configured timeout.
	#[error("Request timed out.")]
	Timeout,
	/// DNS, TCP, or TLS failure.
	#[error("Network error occurred.")]
	Network {
		/// Transport-specific network error, stripped of its URL.
		#[source]
		source: SharedSource,
	},
	/// Server answered with a retryable status (408, 429, 5xx).
	#[error("Server returned HTTP {status}.")]
	Status {
		/// HTTP status code.
		status: u16,
		/// Retry-After hint from upstream, if supplied.
		retry_after: Option<Duration>,
	},
	/// Response body could not be decoded.
	#[error("Response body could not be decoded.")]
	Decode {
		/// Structured decoding failure.
		#[source]
		source: SharedSource,
	},
}
impl TransientError {
	/// Wraps a transport-specific network error.
	pub fn network(src: impl 'static + Send + Sync + StdError) -> Self {
		Self::Network { source: Arc::new(src) }
	}

	/// Returns the server's Retry-After hint, when one was supplied.
	pub fn retry_after(&self) -> Option<Duration> {
		match self {
			Self::Status { retry_after, .. } => *retry_after,
			_ => None,
		}
	}
}
impl From<ReqwestError> for TransientError {
	fn from(e: ReqwestError) -> Self {
		if e.is_timeout() { Self::Timeout } else { Self::network(e.without_url()) }
	}
}

/// Token exchange failure carrying the number of attempts spent.
#[derive(Clone, Debug, ThisError)]
#[error("Token endpoint failed after {attempts} attempt(s): {cause}")]
pub struct FetchError {
	/// Last observed failure.
	#[source]
	pub cause: FetchCause,
	/// Attempts made before giving up.
	pub attempts: u32,
}

/// Reason a single token exchange attempt failed.
#[derive(Clone, Debug, ThisError)]
pub enum FetchCause {
	/// Retryable failure.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Identity endpoint refused the client credentials; never retried.
	#[error("Identity endpoint rejected the client credentials with HTTP {status}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
	},
	/// Identity endpoint answered 2xx without a usable token; never retried.
	#[error("Identity endpoint returned a malformed token response: {reason}.")]
	Malformed {
		/// What was wrong with the body.
		reason: String,
	},
	/// Token expires within the safety margin, so it is never handed out; never retried.
	#[error("Identity endpoint issued a token valid for {remaining}, within the {safety_margin} safety margin.")]
	ShortLived {
		/// Lifetime left when the token arrived.
		remaining: Duration,
		/// Margin the token had to exceed.
		safety_margin: Duration,
	},
}
impl FetchCause {
	/// Returns `true` when another attempt may succeed.
	pub fn is_transient(&self) -> bool {
		matches!(self, Self::Transient(_))
	}
}

/// Reporting endpoint failure carrying the endpoint and attempt count.
#[derive(Clone, Debug, ThisError)]
#[error("Upstream endpoint `{endpoint}` failed after {attempts} attempt(s): {last_cause}")]
pub struct UpstreamError {
	/// Endpoint path relative to the API base URL.
	pub endpoint: String,
	/// Attempts made before giving up.
	pub attempts: u32,
	/// Last observed failure.
	#[source]
	pub last_cause: UpstreamCause,
}

/// Reason a single reporting request failed.
#[derive(Clone, Debug, ThisError)]
pub enum UpstreamCause {
	/// Retryable failure.
	#[error(transparent)]
	Transient(#[from] TransientError),
	/// Bearer token was rejected (HTTP 401).
	#[error("Reporting endpoint rejected the access token with HTTP {status}.")]
	AuthRejected {
		/// HTTP status code.
		status: u16,
	},
	/// Request was refused permanently; never retried.
	#[error("Reporting endpoint refused the request with HTTP {status}.")]
	Rejected {
		/// HTTP status code.
		status: u16,
	},
}
impl UpstreamCause {
	/// Returns `true` when another attempt may succeed.
	pub fn is_retryable(&self) -> bool {
		!matches!(self, Self::Rejected { .. })
	}
}
