//! Shared fixtures for the integration tests.

#![allow(dead_code)]

// std
use std::{
	collections::VecDeque,
	sync::{
		Arc,
		atomic::{AtomicU32, Ordering},
	},
};
// crates.io
use httpmock::MockServer;
use parking_lot::Mutex;
use time::{Duration, OffsetDateTime, macros};
// self
use report_broker::{
	auth::{ClientCredentials, Credential, CredentialStore, FetchFuture, TokenFetcher},
	clock::{Clock, ManualClock},
	error::{FetchCause, FetchError},
	http::HttpClient,
	reqwest,
	retry::RetryPolicy,
	upstream::UpstreamClient,
	url::Url,
};

pub const CLIENT_ID: &str = "erp-client";
pub const CLIENT_SECRET: &str = "erp-secret";
pub const START: OffsetDateTime = macros::datetime!(2026-03-15 09:00 UTC);

type Scripted = Result<(String, Duration), FetchCause>;

/// In-process [`TokenFetcher`] that replays a fixed list of outcomes.
pub struct ScriptedFetcher {
	clock: ManualClock,
	script: Mutex<VecDeque<Scripted>>,
	calls: AtomicU32,
	latency: std::time::Duration,
}
impl ScriptedFetcher {
	pub fn new(clock: &ManualClock, script: impl IntoIterator<Item = Scripted>) -> Arc<Self> {
		Arc::new(Self {
			clock: clock.clone(),
			script: Mutex::new(script.into_iter().collect()),
			calls: AtomicU32::new(0),
			latency: std::time::Duration::from_millis(25),
		})
	}

	/// Fetcher that hands out `tokens` in order, each valid for an hour.
	pub fn tokens<'a>(clock: &ManualClock, tokens: impl IntoIterator<Item = &'a str>) -> Arc<Self> {
		Self::new(clock, tokens.into_iter().map(|token| Ok((token.to_owned(), Duration::hours(1)))))
	}

	pub fn calls(&self) -> u32 {
		self.calls.load(Ordering::SeqCst)
	}
}
impl TokenFetcher for ScriptedFetcher {
	fn fetch<'a>(&'a self, client: &'a ClientCredentials) -> FetchFuture<'a> {
		Box::pin(async move {
			assert_eq!(client.client_id, CLIENT_ID);

			self.calls.fetch_add(1, Ordering::SeqCst);
			tokio::time::sleep(self.latency).await;

			let next = self.script.lock().pop_front();

			match next {
				Some(Ok((token, lifetime))) => Ok(Credential::new(token, self.clock.now(), lifetime)),
				Some(Err(cause)) => Err(FetchError { cause, attempts: 1 }),
				None => Err(FetchError {
					cause: FetchCause::Malformed { reason: "script exhausted".into() },
					attempts: 1,
				}),
			}
		})
	}
}

pub fn clock() -> ManualClock {
	ManualClock::new(START)
}

pub fn client() -> ClientCredentials {
	ClientCredentials::new(CLIENT_ID, CLIENT_SECRET)
}

pub fn http() -> HttpClient {
	http_with_timeout(Duration::seconds(5))
}

/// Client that trusts the self-signed certificate `httpmock` serves HTTPS with.
pub fn http_with_timeout(timeout: Duration) -> HttpClient {
	let client = reqwest::Client::builder()
		.danger_accept_invalid_certs(true)
		.danger_accept_invalid_hostnames(true)
		.redirect(reqwest::redirect::Policy::none())
		.timeout(timeout.unsigned_abs())
		.build()
		.expect("Failed to build insecure Reqwest client for tests.");

	HttpClient::with_client(client)
}

pub fn api_base(server: &MockServer) -> Url {
	Url::parse(&server.url("/api")).expect("Mock server base URL should parse.")
}

pub fn credential_store(fetcher: &Arc<ScriptedFetcher>, clock: &ManualClock) -> Arc<CredentialStore> {
	let fetcher: Arc<dyn TokenFetcher> = fetcher.clone();

	Arc::new(CredentialStore::new(fetcher, client()).with_clock(shared_clock(clock)))
}

/// Upstream client that retries without sleeping.
pub fn upstream_client(server: &MockServer, credentials: Arc<CredentialStore>) -> UpstreamClient {
	UpstreamClient::new(http(), api_base(server), credentials).with_policy(RetryPolicy::immediate(3))
}

pub fn shared_clock(clock: &ManualClock) -> Arc<dyn Clock> {
	Arc::new(clock.clone())
}
