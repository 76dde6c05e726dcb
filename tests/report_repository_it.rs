mod support;

// std
use std::sync::Arc;
// crates.io
use figment::{Figment, providers::Serialized};
use httpmock::prelude::*;
use serde_json::json;
use time::Duration;
// self
use report_broker::{
	ErrorKind, ReportBroker,
	cache::{CacheError, CacheFuture, CacheStore, MemoryCache},
	config::BrokerConfig,
	id::{CacheKey, ReportName},
	report::{ReportDefinition, ReportRepository},
	upstream::ACCESS_TOKEN_PARAM,
};
use support::*;

const PATH: &str = "/api/reports/ANAFACTURACION";

struct Fixture {
	server: MockServer,
	clock: report_broker::clock::ManualClock,
	fetcher: Arc<ScriptedFetcher>,
	cache: Arc<MemoryCache>,
}
impl Fixture {
	async fn start() -> Self {
		let server = MockServer::start_async().await;
		let clock = clock();
		let fetcher = ScriptedFetcher::tokens(&clock, ["t1", "t2"]);
		let cache = Arc::new(MemoryCache::with_clock(shared_clock(&clock)));

		Self { server, clock, fetcher, cache }
	}

	fn repository(&self, definition: ReportDefinition) -> ReportRepository {
		self.repository_with_cache(definition, self.cache.clone())
	}

	fn repository_with_cache(
		&self,
		definition: ReportDefinition,
		cache: Arc<dyn CacheStore>,
	) -> ReportRepository {
		let upstream = upstream_client(&self.server, credential_store(&self.fetcher, &self.clock));

		ReportRepository::new(Arc::new(upstream), cache, definition)
	}

	async fn mock_invoices(&self, delay_ms: u64) -> httpmock::Mock<'_> {
		self.server
			.mock_async(|when, then| {
				when.method(GET).path(PATH);
				then.status(200).delay(std::time::Duration::from_millis(delay_ms)).json_body(json!([
					{ "TRANSACCIONID": 1, "FECHA": "03-02-2026", "CLIENTE": "ACME", "TOTAL": "100.5" },
					{ "TRANSACCIONID": 2, "FECHA": "17-03-2026", "CLIENTE": "Globex", "TOTAL": 40 },
					{ "TRANSACCIONID": 3, "FECHA": "28-03-2026", "CLIENTE": "ACME", "TOTAL": "9.5" },
				]));
			})
			.await
	}
}

fn invoices() -> ReportDefinition {
	ReportDefinition::invoices(2026).expect("2026 should be a valid year.")
}

struct FailingCache;
impl CacheStore for FailingCache {
	fn get<'a>(&'a self, _: &'a CacheKey) -> CacheFuture<'a, Option<String>> {
		Box::pin(async { Err(CacheError::Backend { message: "connection refused".into() }) })
	}

	fn set<'a>(&'a self, _: &'a CacheKey, _: String, _: Duration) -> CacheFuture<'a, ()> {
		Box::pin(async { Err(CacheError::Backend { message: "connection refused".into() }) })
	}

	fn delete<'a>(&'a self, _: &'a CacheKey) -> CacheFuture<'a, bool> {
		Box::pin(async { Err(CacheError::Backend { message: "connection refused".into() }) })
	}
}

#[tokio::test]
async fn cache_aside_round_trip_calls_upstream_once() {
	let fixture = Fixture::start().await;
	let mock = fixture.mock_invoices(0).await;
	let repository = fixture.repository(invoices());
	let first = repository.fetch_all().await.expect("First read should go upstream.");
	let second = repository.fetch_all().await.expect("Second read should be served from cache.");

	assert_eq!(first.len(), 3);
	assert_eq!(first, second);
	assert_eq!(first[0].text("month"), Some("02-2026"));
	assert_eq!(first[0].amount("total"), Some(100.5));
	assert_eq!(fixture.cache.len(), 1);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn concurrent_misses_share_one_upstream_fetch() {
	let fixture = Fixture::start().await;
	let mock = fixture.mock_invoices(200).await;
	let repository = fixture.repository(invoices());
	let results = futures::future::join_all((0..16).map(|_| repository.fetch_all())).await;

	for result in &results {
		assert_eq!(result.as_ref().expect("Every reader should receive the records.").len(), 3);
	}

	assert_eq!(fixture.fetcher.calls(), 1);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn repositories_from_one_broker_share_flights() {
	let fixture = Fixture::start().await;
	let mock = fixture.mock_invoices(200).await;
	let upstream = upstream_client(&fixture.server, credential_store(&fixture.fetcher, &fixture.clock));
	let broker = ReportBroker::new(Arc::new(upstream), fixture.cache.clone());
	let (a, b) = (broker.repository(invoices()), broker.repository(invoices()));
	let (left, right) = tokio::join!(a.fetch_all(), b.fetch_all());

	assert_eq!(left.expect("First reader should succeed."), right.expect("Second reader should succeed."));

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn elapsed_ttl_forces_refetch() {
	let fixture = Fixture::start().await;
	let mock = fixture.mock_invoices(0).await;
	let repository = fixture.repository(invoices().with_ttl(Duration::seconds(1)));

	repository.fetch_all().await.expect("First read should succeed.");
	fixture.clock.advance(Duration::seconds(2));
	repository.fetch_all().await.expect("Read after expiry should succeed.");

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn invalidate_bypasses_live_entry() {
	let fixture = Fixture::start().await;
	let mock = fixture.mock_invoices(0).await;
	let repository = fixture.repository(invoices());

	repository.fetch_all().await.expect("First read should succeed.");

	assert!(repository.invalidate().await.expect("Invalidation should succeed."));
	assert!(fixture.cache.is_empty());

	repository.fetch_all().await.expect("Read after invalidation should succeed.");

	mock.assert_calls_async(2).await;
}

#[tokio::test]
async fn invalidate_during_fetch_discards_the_stale_result() {
	let fixture = Fixture::start().await;
	let mut stale = fixture
		.server
		.mock_async(|when, then| {
			when.method(GET).path("/api/cliente/list");
			then.status(200)
				.delay(std::time::Duration::from_millis(400))
				.json_body(json!([{ "Codigo": "OLD", "Nombre": "Antes" }]));
		})
		.await;
	let repository = Arc::new(fixture.repository(ReportDefinition::customers()));
	let in_flight = tokio::spawn({
		let repository = repository.clone();

		async move { repository.fetch_all().await }
	});

	tokio::time::sleep(std::time::Duration::from_millis(150)).await;

	assert!(!repository.invalidate().await.expect("Invalidation should succeed."));

	stale.delete_async().await;

	let fresh = fixture
		.server
		.mock_async(|when, then| {
			when.method(GET).path("/api/cliente/list");
			then.status(200).json_body(json!([{ "Codigo": "NEW", "Nombre": "Despues" }]));
		})
		.await;
	let after = repository.fetch_all().await.expect("Read after invalidation should succeed.");

	assert_eq!(after[0].text("code"), Some("NEW"));

	let detached = in_flight
		.await
		.expect("Detached fetch task should not panic.")
		.expect("Detached fetch should still succeed.");

	assert_eq!(detached[0].text("code"), Some("OLD"));

	let cached = repository.fetch_all().await.expect("Cached read should succeed.");

	assert_eq!(cached[0].text("code"), Some("NEW"), "Stale fetch must not repopulate the cache.");

	fresh.assert_calls_async(1).await;
}

#[tokio::test]
async fn cached_amounts_round_trip_exactly() {
	let fixture = Fixture::start().await;
	let mock = fixture
		.server
		.mock_async(|when, then| {
			when.method(GET).path(PATH);
			then.status(200).json_body(json!([
				{ "TRANSACCIONID": 7, "FECHA": "10-04-2026", "TOTAL": "207020753.33333334" },
				{ "TRANSACCIONID": 8, "FECHA": "11-04-2026", "TOTAL": "0.30000000000000004" },
			]));
		})
		.await;
	let repository = fixture.repository(invoices());
	let first = repository.fetch_all().await.expect("First read should go upstream.");
	let cached = repository.fetch_all().await.expect("Second read should be served from cache.");

	assert_eq!(first[0].amount("total"), Some(207_020_753.333_333_34));
	assert_eq!(first, cached);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn failing_cache_degrades_to_upstream() {
	let fixture = Fixture::start().await;
	let mock = fixture.mock_invoices(0).await;
	let repository = fixture.repository_with_cache(invoices(), Arc::new(FailingCache));

	assert_eq!(repository.fetch_all().await.expect("Read should survive cache failure.").len(), 3);
	assert_eq!(repository.fetch_all().await.expect("Read should survive cache failure.").len(), 3);

	mock.assert_calls_async(2).await;

	let err = repository.invalidate().await.expect_err("Explicit invalidation reports cache failure.");

	assert_eq!(err.kind(), ErrorKind::CacheUnavailable);
}

#[tokio::test]
async fn undecodable_cache_entry_is_ignored() {
	let fixture = Fixture::start().await;
	let mock = fixture.mock_invoices(0).await;
	let definition = invoices();

	fixture
		.cache
		.set(&definition.cache_key, "{not json".into(), Duration::hours(1))
		.await
		.expect("Seeding the cache should succeed.");

	let repository = fixture.repository(definition);

	assert_eq!(repository.fetch_all().await.expect("Corrupt entry should fall through.").len(), 3);
	assert_eq!(repository.fetch_all().await.expect("Rewritten entry should be served.").len(), 3);

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn month_filters_and_grouping_run_over_cached_records() {
	let fixture = Fixture::start().await;
	let mock = fixture.mock_invoices(0).await;
	let repository = fixture.repository(invoices());
	let march = repository.fetch_month("03-2026").await.expect("Month filter should succeed.");
	let by_month = repository.fetch_by_month().await.expect("Grouping should succeed.");
	let by_customer = repository.group_by("customer").await.expect("Grouping should succeed.");

	assert_eq!(march.len(), 2);
	assert_eq!(by_month.keys().map(String::as_str).collect::<Vec<_>>(), ["02-2026", "03-2026"]);
	assert_eq!(by_customer["ACME"].len(), 2);
	assert!(repository.fetch_month("12-2026").await.expect("Empty month should succeed.").is_empty());

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn empty_results_are_cached() {
	let fixture = Fixture::start().await;
	let mock = fixture
		.server
		.mock_async(|when, then| {
			when.method(GET).path("/api/cliente/list");
			then.status(200).json_body(json!([]));
		})
		.await;
	let repository = fixture.repository(ReportDefinition::customers());

	assert!(repository.fetch_all().await.expect("Empty list should succeed.").is_empty());
	assert!(repository.fetch_all().await.expect("Empty list should be cached.").is_empty());

	mock.assert_calls_async(1).await;
}

#[tokio::test]
async fn broker_from_config_drives_the_full_stack() {
	let server = MockServer::start_async().await;
	let token = server
		.mock_async(|when, then| {
			when.method(GET)
				.path("/api/oauth/token")
				.query_param("client_id", CLIENT_ID)
				.query_param("client_secret", CLIENT_SECRET);
			then.status(200)
				.header("content-type", "application/json")
				.body(r#"{"access_token":"live-token","expires_in":3600}"#);
		})
		.await;
	let customers = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/cliente/list").query_param(ACCESS_TOKEN_PARAM, "live-token");
			then.status(200).json_body(json!([
				{ "Codigo": "C1", "Nombre": "Uno", "Activo": true },
				{ "codigo": "C2", "nombre": "Dos", "razonSocial": "Dos SA", "activo": false },
			]));
		})
		.await;
	let config = BrokerConfig::from_figment(
		Figment::from(Serialized::defaults(BrokerConfig::default()))
			.merge(Serialized::default("client_id", CLIENT_ID))
			.merge(Serialized::default("client_secret", CLIENT_SECRET))
			.merge(Serialized::default("identity_url", server.url("/api")))
			.merge(Serialized::default("api_url", server.url("/api"))),
	)
	.expect("Config pointing at the mock server should load.");
	let broker = ReportBroker::from_config_with_http(&config, http(), shared_clock(&clock()))
		.expect("Broker should build from config.");
	let repository = broker.customers();
	let found = repository
		.find_by("code", "C2")
		.await
		.expect("Lookup should succeed.")
		.expect("C2 should exist.");

	assert_eq!(found.text("legal_name"), Some("Dos SA"));
	assert_eq!(found.flag("active"), Some(false));
	assert!(repository.find_by("code", "C9").await.expect("Lookup should succeed.").is_none());
	assert_eq!(
		broker.products().definition().name,
		ReportName::new("producto").expect("Report name fixture should be valid.")
	);

	token.assert_calls_async(1).await;
	customers.assert_calls_async(1).await;
}
