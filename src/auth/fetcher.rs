//! Client-credentials exchange against the ERP identity endpoint.
//!
//! [`TokenFetcher`] is the seam between [`CredentialStore`](crate::auth::CredentialStore)
//! and the network. [`HttpTokenFetcher`] issues
//! `GET <identity-base>/oauth/token?grant_type=client_credentials&client_id=…&client_secret=…`
//! and tolerates two response shapes: a JSON object carrying `access_token` (+ optional
//! `expires_in`), or a bare token body. Transient failures are retried with exponential
//! backoff; credential rejections are not.

// self
use crate::{
	_prelude::*,
	auth::{ClientCredentials, Credential},
	clock::{Clock, SystemClock},
	error::{ConfigError, FetchCause, FetchError},
	http::{self, HttpClient, HttpReply},
	obs::{self, OpKind, OpOutcome, OpSpan},
	retry::{self, RetryPolicy},
};

/// Lifetime applied when the identity endpoint omits `expires_in`.
pub const FALLBACK_LIFETIME: Duration = Duration::minutes(50);

/// Boxed future returned by [`TokenFetcher::fetch`].
pub type FetchFuture<'a> = Pin<Box<dyn Future<Output = Result<Credential, FetchError>> + 'a + Send>>;

/// Performs the out-of-band client id/secret to bearer token exchange.
///
/// Implementations own their retry policy: a returned [`FetchError`] means the attempts
/// are exhausted and callers must not retry on their own.
pub trait TokenFetcher
where
	Self: 'static + Send + Sync,
{
	/// Exchanges `client` for a fresh credential.
	fn fetch<'a>(&'a self, client: &'a ClientCredentials) -> FetchFuture<'a>;
}

/// Reqwest-backed [`TokenFetcher`] for the ERP identity endpoint.
#[derive(Clone)]
pub struct HttpTokenFetcher {
	http: HttpClient,
	token_url: Url,
	policy: RetryPolicy,
	clock: Arc<dyn Clock>,
	fallback_lifetime: Duration,
}
impl HttpTokenFetcher {
	/// Creates a fetcher that targets `<identity_base>/oauth/token`.
	pub fn new(http: HttpClient, identity_base: &Url) -> Result<Self, ConfigError> {
		Ok(Self {
			http,
			token_url: http::endpoint_url(identity_base, "oauth/token", "identity_url")?,
			policy: RetryPolicy::token(),
			clock: Arc::new(SystemClock),
			fallback_lifetime: FALLBACK_LIFETIME,
		})
	}

	/// Overrides the retry policy (defaults to [`RetryPolicy::token`]).
	pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Overrides the clock used to stamp `issued_at`.
	pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
		self.clock = clock;

		self
	}

	/// Overrides the lifetime applied to responses without `expires_in`.
	pub fn with_fallback_lifetime(mut self, lifetime: Duration) -> Self {
		self.fallback_lifetime = lifetime;

		self
	}

	/// Fully-qualified token endpoint.
	pub fn token_url(&self) -> &Url {
		&self.token_url
	}

	async fn fetch_with_retry(&self, client: &ClientCredentials) -> Result<Credential, FetchError> {
		let mut budget = self.policy.budget();

		loop {
			let attempt = budget.begin();

			obs::record_outcome(OpKind::TokenFetch, OpOutcome::Attempt);

			let cause = match self.fetch_once(client).await {
				Ok(credential) => {
					obs::record_outcome(OpKind::TokenFetch, OpOutcome::Success);
					tracing::debug!(
						attempt,
						token = %credential.token.fingerprint(),
						expires_at = %credential.expires_at,
						"token obtained"
					);

					return Ok(credential);
				},
				Err(cause) => cause,
			};

			if !cause.is_transient() || budget.exhausted() {
				obs::record_outcome(OpKind::TokenFetch, OpOutcome::Failure);
				tracing::warn!(attempt, error = %cause, "token fetch failed");

				return Err(FetchError { cause, attempts: attempt });
			}

			let hint = match &cause {
				FetchCause::Transient(transient) => transient.retry_after(),
				_ => None,
			};
			let delay = self.policy.delay_for(attempt, hint);

			tracing::warn!(attempt, ?delay, error = %cause, "token fetch failed; retrying");
			retry::pause(delay).await;
		}
	}

	async fn fetch_once(&self, client: &ClientCredentials) -> Result<Credential, FetchCause> {
		let mut url = self.token_url.clone();

		url.query_pairs_mut()
			.append_pair("grant_type", "client_credentials")
			.append_pair("client_id", &client.client_id)
			.append_pair("client_secret", client.client_secret.expose());

		let reply = self.http.get(url).await?;

		classify_reply(&reply)?;

		parse_token_body(&reply.body, self.clock.now(), self.fallback_lifetime)
	}
}
impl TokenFetcher for HttpTokenFetcher {
	fn fetch<'a>(&'a self, client: &'a ClientCredentials) -> FetchFuture<'a> {
		Box::pin(async move {
			OpSpan::new(OpKind::TokenFetch, "fetch").instrument(self.fetch_with_retry(client)).await
		})
	}
}
impl Debug for HttpTokenFetcher {
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("HttpTokenFetcher")
			.field("token_url", &self.token_url.as_str())
			.field("policy", &self.policy)
			.field("fallback_lifetime", &self.fallback_lifetime)
			.finish()
	}
}

#[derive(Deserialize)]
struct TokenResponse {
	access_token: String,
	#[serde(default)]
	expires_in: Option<ExpiresIn>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ExpiresIn {
	Seconds(i64),
	Text(String),
}
impl ExpiresIn {
	fn seconds(&self) -> Option<i64> {
		match self {
			Self::Seconds(secs) => Some(*secs),
			Self::Text(text) => text.trim().parse().ok(),
		}
	}
}

fn classify_reply(reply: &HttpReply) -> Result<(), FetchCause> {
	if reply.is_success() {
		Ok(())
	} else if reply.is_retryable_status() {
		Err(reply.transient().into())
	} else {
		Err(FetchCause::Rejected { status: reply.status })
	}
}

/// Parses an identity endpoint body into a [`Credential`] issued at `issued_at`.
///
/// Accepts `{"access_token": "...", "expires_in": 3600}`, a JSON string, or a bare
/// token; bodies without an expiry get `fallback_lifetime`.
pub fn parse_token_body(
	body: &[u8],
	issued_at: OffsetDateTime,
	fallback_lifetime: Duration,
) -> Result<Credential, FetchCause> {
	let malformed = |reason: String| FetchCause::Malformed { reason };
	let text = std::str::from_utf8(body)
		.map_err(|_| malformed("body is not valid UTF-8".into()))?
		.trim();

	if text.is_empty() {
		return Err(malformed("body is empty".into()));
	}
	if text.starts_with('{') {
		let de = &mut serde_json::Deserializer::from_str(text);
		let response: TokenResponse = serde_path_to_error::deserialize(de).map_err(|e| {
			malformed(format!("token object could not be decoded at `{}`: {}", e.path(), e.inner()))
		})?;

		if response.access_token.trim().is_empty() {
			return Err(malformed("access_token is empty".into()));
		}

		let lifetime = match response.expires_in {
			None => fallback_lifetime,
			Some(raw) => match raw.seconds() {
				Some(secs) if secs > 0 => Duration::seconds(secs),
				Some(_) => return Err(malformed("expires_in must be positive".into())),
				None => return Err(malformed("expires_in is not a number".into())),
			},
		};

		return Ok(Credential::new(response.access_token, issued_at, lifetime));
	}

	let token = if text.starts_with('"') {
		serde_json::from_str::<String>(text)
			.map_err(|_| malformed("token string could not be decoded".into()))?
	} else {
		text.to_owned()
	};

	if token.is_empty() || token.chars().any(char::is_whitespace) {
		return Err(malformed("bare token body is not a single token".into()));
	}

	Ok(Credential::new(token, issued_at, fallback_lifetime))
}
