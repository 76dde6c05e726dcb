mod support;

// std
use std::sync::Arc;
// crates.io
use time::Duration;
// self
use report_broker::{
	auth::CredentialPhase,
	error::{FetchCause, FetchError},
};
use support::*;

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_refreshers_across_threads_share_one_fetch() {
	let clock = clock();
	let fetcher = ScriptedFetcher::tokens(&clock, ["only-token"]);
	let store = credential_store(&fetcher, &clock);
	let handles = (0..32)
		.map(|_| {
			let store = store.clone();

			tokio::spawn(async move { store.ensure_valid().await })
		})
		.collect::<Vec<_>>();

	for handle in handles {
		let credential = handle
			.await
			.expect("Refresh task should not panic.")
			.expect("Every caller should receive the shared token.");

		assert_eq!(credential.token.expose(), "only-token");
	}

	assert_eq!(fetcher.calls(), 1);
	assert_eq!(store.metrics().refreshes(), 1);
}

#[tokio::test]
async fn safety_margin_boundaries() {
	let clock = clock();
	let fetcher = ScriptedFetcher::new(
		&clock,
		[Ok(("short".to_owned(), Duration::seconds(120))), Ok(("next".to_owned(), Duration::hours(1)))],
	);
	let store = credential_store(&fetcher, &clock);

	store.ensure_valid().await.expect("Initial fetch should succeed.");

	assert_eq!(store.phase(), CredentialPhase::Valid, "120s left is outside the 60s margin.");
	assert_eq!(store.ensure_valid().await.expect("Token should be reused.").token.expose(), "short");

	clock.advance(Duration::seconds(90));

	assert_eq!(store.phase(), CredentialPhase::Expired, "30s left is inside the 60s margin.");
	assert_eq!(store.ensure_valid().await.expect("Token should be refreshed.").token.expose(), "next");
	assert_eq!(fetcher.calls(), 2);
}

#[tokio::test]
async fn shared_failure_then_independent_retry() {
	let clock = clock();
	let fetcher = ScriptedFetcher::new(
		&clock,
		[Err(FetchCause::Rejected { status: 400 }), Ok(("after-failure".to_owned(), Duration::hours(1)))],
	);
	let store = credential_store(&fetcher, &clock);
	let (a, b, c) = tokio::join!(store.ensure_valid(), store.ensure_valid(), store.ensure_valid());

	for result in [a, b, c] {
		assert!(matches!(result, Err(FetchError { cause: FetchCause::Rejected { status: 400 }, .. })));
	}

	assert_eq!(store.phase(), CredentialPhase::Empty);
	assert_eq!(fetcher.calls(), 1);
	assert_eq!(
		store.ensure_valid().await.expect("Next request retries independently.").token.expose(),
		"after-failure"
	);
	assert_eq!(store.metrics().failures(), 1);
	assert_eq!(store.metrics().successes(), 1);
}

#[tokio::test]
async fn invalidation_cycle_walks_the_state_machine() {
	let clock = clock();
	let fetcher = ScriptedFetcher::tokens(&clock, ["first", "second"]);
	let store = credential_store(&fetcher, &clock);

	assert_eq!(store.phase(), CredentialPhase::Empty);

	let first = store.ensure_valid().await.expect("Initial fetch should succeed.");

	assert_eq!(store.phase(), CredentialPhase::Valid);
	assert!(store.invalidate_rejected(&first));
	assert_eq!(store.phase(), CredentialPhase::Invalidated);

	let waiting = Arc::clone(&store);
	let pending = tokio::spawn(async move { waiting.ensure_valid().await });

	tokio::task::yield_now().await;

	let second = pending
		.await
		.expect("Refresh task should not panic.")
		.expect("Refresh after invalidation should succeed.");

	assert_eq!(second.token.expose(), "second");
	assert_eq!(store.phase(), CredentialPhase::Valid);
	assert_eq!(store.metrics().invalidations(), 1);
	assert_eq!(fetcher.calls(), 2);
}
