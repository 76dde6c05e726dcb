//! Authenticated reads against the ERP reporting API.
//!
//! [`UpstreamClient::get`] is one bounded loop: obtain a credential, issue the GET with
//! `ACCESS_TOKEN` in the query string, then classify the reply. A 401 discards the
//! credential and retries immediately; timeouts, 408/429, and 5xx back off; other 4xx
//! statuses fail at once.

// crates.io
use time::{Date, Month};
// self
use crate::{
	_prelude::*,
	auth::{Credential, CredentialStore, TokenFetcher},
	error::{TransientError, UpstreamCause, UpstreamError},
	http::{self, HttpClient, HttpReply},
	obs::{self, OpKind, OpOutcome, OpSpan},
	retry::{self, RetryPolicy},
};

/// Query parameter that carries the bearer token.
pub const ACCESS_TOKEN_PARAM: &str = "ACCESS_TOKEN";
/// Lower date bound understood by web reports.
pub const DATE_FROM_PARAM: &str = "PARAMWEBREPORT_FechaDesde";
/// Upper date bound understood by web reports.
pub const DATE_TO_PARAM: &str = "PARAMWEBREPORT_FechaHasta";

/// Caller-supplied filters merged into a reporting request.
///
/// Parameters are kept sorted by name, so two queries with the same pairs compare equal
/// and fingerprint identically regardless of insertion order.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ReportQuery(BTreeMap<String, String>);
impl ReportQuery {
	/// Creates an empty query.
	pub fn new() -> Self {
		Self::default()
	}

	/// Adds or replaces a parameter.
	pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
		self.insert(key, value);

		self
	}

	/// Adds or replaces a parameter in place.
	pub fn insert(&mut self, key: impl Into<String>, value: impl Into<String>) {
		self.0.insert(key.into(), value.into());
	}

	/// Inclusive date range filter, rendered as `YYYY-MM-DD`.
	pub fn date_range(from: Date, to: Date) -> Self {
		Self::new().with(DATE_FROM_PARAM, from.to_string()).with(DATE_TO_PARAM, to.to_string())
	}

	/// January 1 through December 31 of `year`; `None` for years `time` cannot represent.
	pub fn calendar_year(year: i32) -> Option<Self> {
		let from = Date::from_calendar_date(year, Month::January, 1).ok()?;
		let to = Date::from_calendar_date(year, Month::December, 31).ok()?;

		Some(Self::date_range(from, to))
	}

	/// Value of `key`, if set.
	pub fn get(&self, key: &str) -> Option<&str> {
		self.0.get(key).map(String::as_str)
	}

	/// Parameters in name order.
	pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
		self.0.iter().map(|(key, value)| (key.as_str(), value.as_str()))
	}

	/// Number of parameters.
	pub fn len(&self) -> usize {
		self.0.len()
	}

	/// Returns `true` when no filters are set.
	pub fn is_empty(&self) -> bool {
		self.0.is_empty()
	}
}

/// Reporting API client that attaches and renews the shared bearer credential.
pub struct UpstreamClient<F = dyn TokenFetcher>
where
	F: ?Sized + TokenFetcher,
{
	http: HttpClient,
	api_base: Url,
	credentials: Arc<CredentialStore<F>>,
	policy: RetryPolicy,
}
impl<F> UpstreamClient<F>
where
	F: ?Sized + TokenFetcher,
{
	/// Creates a client rooted at `api_base` that draws tokens from `credentials`.
	pub fn new(http: HttpClient, api_base: Url, credentials: Arc<CredentialStore<F>>) -> Self {
		Self { http, api_base, credentials, policy: RetryPolicy::upstream() }
	}

	/// Overrides the retry policy (defaults to [`RetryPolicy::upstream`]).
	pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
		self.policy = policy;

		self
	}

	/// Credential store shared with this client.
	pub fn credentials(&self) -> &Arc<CredentialStore<F>> {
		&self.credentials
	}

	/// Base URL every endpoint is resolved against.
	pub fn api_base(&self) -> &Url {
		&self.api_base
	}

	/// Fetches `endpoint` (relative to the API base) and returns the decoded JSON payload.
	///
	/// Credential failures surface immediately as [`Error::CredentialUnavailable`](crate::Error::CredentialUnavailable); the
	/// fetcher already retried them. Everything else is retried up to the policy's
	/// attempt ceiling and then reported as [`Error::Upstream`](crate::Error::Upstream).
	pub async fn get(&self, endpoint: &str, query: &ReportQuery) -> Result<JsonValue> {
		OpSpan::new(OpKind::UpstreamGet, "get").instrument(self.get_with_retry(endpoint, query)).await
	}

	async fn get_with_retry(&self, endpoint: &str, query: &ReportQuery) -> Result<JsonValue> {
		let url = http::endpoint_url(&self.api_base, endpoint, "api_url")?;
		let mut budget = self.policy.budget();

		loop {
			let attempt = budget.begin();
			let credential = self.credentials.ensure_valid().await.inspect_err(|_| {
				obs::record_outcome(OpKind::UpstreamGet, OpOutcome::Failure);
			})?;

			obs::record_outcome(OpKind::UpstreamGet, OpOutcome::Attempt);

			let cause = match self.get_once(url.clone(), query, &credential).await {
				Ok(payload) => {
					obs::record_outcome(OpKind::UpstreamGet, OpOutcome::Success);
					tracing::debug!(endpoint, attempt, "upstream request succeeded");

					return Ok(payload);
				},
				Err(cause) => cause,
			};

			if matches!(cause, UpstreamCause::AuthRejected { .. }) {
				self.credentials.invalidate_rejected(&credential);
			}
			if !cause.is_retryable() || budget.exhausted() {
				obs::record_outcome(OpKind::UpstreamGet, OpOutcome::Failure);
				tracing::warn!(endpoint, attempt, error = %cause, "upstream request failed");

				return Err(UpstreamError {
					endpoint: endpoint.to_owned(),
					attempts: attempt,
					last_cause: cause,
				}
				.into());
			}

			let delay = match &cause {
				UpstreamCause::Transient(transient) =>
					self.policy.delay_for(attempt, transient.retry_after()),
				_ => Duration::ZERO,
			};

			tracing::warn!(endpoint, attempt, ?delay, error = %cause, "upstream request failed; retrying");
			retry::pause(delay).await;
		}
	}

	async fn get_once(
		&self,
		mut url: Url,
		query: &ReportQuery,
		credential: &Credential,
	) -> Result<JsonValue, UpstreamCause> {
		{
			let mut pairs = url.query_pairs_mut();

			for (key, value) in query.iter().filter(|(key, _)| !key.eq_ignore_ascii_case(ACCESS_TOKEN_PARAM)) {
				pairs.append_pair(key, value);
			}

			pairs.append_pair(ACCESS_TOKEN_PARAM, credential.token.expose());
		}

		let reply = self.http.get(url).await?;

		classify_reply(&reply)?;

		serde_json::from_slice(&reply.body)
			.map_err(|e| TransientError::Decode { source: Arc::new(e) }.into())
	}
}
impl<F> Debug for UpstreamClient<F>
where
	F: ?Sized + TokenFetcher,
{
	fn fmt(&self, f: &mut Formatter) -> FmtResult {
		f.debug_struct("UpstreamClient")
			.field("api_base", &self.api_base.as_str())
			.field("policy", &self.policy)
			.finish()
	}
}

fn classify_reply(reply: &HttpReply) -> Result<(), UpstreamCause> {
	if reply.is_success() {
		Ok(())
	} else if reply.status == 401 {
		Err(UpstreamCause::AuthRejected { status: reply.status })
	} else if reply.is_retryable_status() {
		Err(reply.transient().into())
	} else {
		Err(UpstreamCause::Rejected { status: reply.status })
	}
}

#[cfg(test)]
mod tests {
	// crates.io
	use time::macros;
	// self
	use super::*;

	#[test]
	fn date_range_renders_iso_dates() {
		let query = ReportQuery::date_range(macros::date!(2026-03-01), macros::date!(2026-03-31));

		assert_eq!(query.get(DATE_FROM_PARAM), Some("2026-03-01"));
		assert_eq!(query.get(DATE_TO_PARAM), Some("2026-03-31"));
		assert_eq!(query.len(), 2);
	}

	#[test]
	fn calendar_year_spans_whole_year() {
		let query = ReportQuery::calendar_year(2025).expect("2025 should be representable.");

		assert_eq!(query.get(DATE_FROM_PARAM), Some("2025-01-01"));
		assert_eq!(query.get(DATE_TO_PARAM), Some("2025-12-31"));
		assert!(ReportQuery::calendar_year(i32::MAX).is_none());
	}

	#[test]
	fn query_is_order_independent() {
		let a = ReportQuery::new().with("b", "2").with("a", "1");
		let b = ReportQuery::new().with("a", "1").with("b", "2");

		assert_eq!(a, b);
		assert_eq!(a.iter().map(|(key, _)| key).collect::<Vec<_>>(), ["a", "b"]);
	}

	#[test]
	fn reporting_statuses_classify() {
		let reply = |status| HttpReply { status, retry_after: None, body: Vec::new() };

		assert!(classify_reply(&reply(204)).is_ok());
		assert!(matches!(classify_reply(&reply(401)), Err(UpstreamCause::AuthRejected { status: 401 })));
		assert!(matches!(classify_reply(&reply(502)), Err(UpstreamCause::Transient(_))));
		assert!(matches!(classify_reply(&reply(429)), Err(UpstreamCause::Transient(_))));
		assert!(matches!(classify_reply(&reply(403)), Err(UpstreamCause::Rejected { status: 403 })));
	}
}
