//! Transport primitives shared by the identity and reporting clients.
//!
//! [`HttpClient`] wraps a [`ReqwestClient`] configured with a fixed request timeout so no
//! network call can block indefinitely. It returns the raw status, Retry-After hint, and
//! body; classifying statuses is left to each caller because the identity and reporting
//! endpoints treat 401 differently.

// std
use std::ops::Deref;
// crates.io
use reqwest::{
	header::{HeaderMap, RETRY_AFTER},
	redirect::Policy,
};
use time::format_description::well_known::Rfc2822;
// self
use crate::{
	_prelude::*,
	error::{ConfigError, TransientError},
};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::seconds(10);

/// Metadata and payload captured from a completed HTTP exchange.
#[derive(Clone, Debug)]
pub struct HttpReply {
	/// HTTP status code.
	pub status: u16,
	/// Retry-After hint expressed as a relative duration.
	pub retry_after: Option<Duration>,
	/// Raw response body.
	pub body: Vec<u8>,
}
impl HttpReply {
	/// Returns `true` for 2xx statuses.
	pub fn is_success(&self) -> bool {
		(200..300).contains(&self.status)
	}

	/// Returns `true` for statuses worth retrying (408, 429, 5xx).
	pub fn is_retryable_status(&self) -> bool {
		matches!(self.status, 408 | 429) || (500..600).contains(&self.status)
	}

	/// Converts a retryable status into a [`TransientError`].
	pub fn transient(&self) -> TransientError {
		TransientError::Status { status: self.status, retry_after: self.retry_after }
	}
}

/// Thin wrapper around [`ReqwestClient`] so shared HTTP behavior lives in one place.
///
/// Redirects are never followed: both endpoints answer directly, and following a
/// redirect would forward the access token carried in the query string.
#[derive(Clone, Debug)]
pub struct HttpClient(ReqwestClient);
impl HttpClient {
	/// Builds a client whose every request is bounded by `timeout`.
	pub fn new(timeout: Duration) -> Result<Self, ConfigError> {
		if !timeout.is_positive() {
			return Err(ConfigError::InvalidValue {
				field: "http_timeout_ms",
				reason: "timeout must be positive".into(),
			});
		}

		let client = ReqwestClient::builder()
			.timeout(timeout.unsigned_abs())
			.redirect(Policy::none())
			.user_agent(concat!("report-broker/", env!("CARGO_PKG_VERSION")))
			.build()?;

		Ok(Self(client))
	}

	/// Wraps an existing reqwest [`ReqwestClient`]. The caller is responsible for its
	/// timeout and redirect configuration.
	pub fn with_client(client: ReqwestClient) -> Self {
		Self(client)
	}

	/// Issues a GET and buffers the response.
	pub async fn get(&self, url: Url) -> Result<HttpReply, TransientError> {
		let response = self.0.get(url).send().await?;
		let status = response.status().as_u16();
		let retry_after = parse_retry_after(response.headers());
		let body = response.bytes().await?.to_vec();

		Ok(HttpReply { status, retry_after, body })
	}
}
impl AsRef<ReqwestClient> for HttpClient {
	fn as_ref(&self) -> &ReqwestClient {
		&self.0
	}
}
impl Deref for HttpClient {
	type Target = ReqwestClient;

	fn deref(&self) -> &Self::Target {
		&self.0
	}
}

/// Appends the `/`-separated `path` to `base`, keeping any path `base` already carries.
///
/// `field` names the setting `base` came from, for error reporting.
pub fn endpoint_url(base: &Url, path: &str, field: &'static str) -> Result<Url, ConfigError> {
	let mut url = base.clone();

	url.path_segments_mut()
		.map_err(|_| ConfigError::UnsupportedUrl { field, url: base.to_string() })?
		.pop_if_empty()
		.extend(path.split('/').filter(|segment| !segment.is_empty()));

	Ok(url)
}

fn parse_retry_after(headers: &HeaderMap) -> Option<Duration> {
	let value = headers.get(RETRY_AFTER)?;
	let raw = value.to_str().ok()?.trim();

	if let Ok(secs) = raw.parse::<u32>() {
		return Some(Duration::seconds(secs.into()));
	}
	if let Ok(moment) = OffsetDateTime::parse(raw, &Rfc2822) {
		let delta = moment - OffsetDateTime::now_utc();

		if delta.is_positive() {
			return Some(delta);
		}
	}

	None
}
