//! Serves one report twice through the broker: the first read exchanges credentials and
//! calls the reporting API, the second is answered from the in-memory cache.

// std
use std::sync::Arc;
// crates.io
use color_eyre::Result;
use figment::{Figment, providers::Serialized};
use httpmock::prelude::*;
use serde_json::json;
// self
use report_broker::{
	ReportBroker, clock::SystemClock, config::BrokerConfig, http::HttpClient, reqwest::Client,
};

#[tokio::main]
async fn main() -> Result<()> {
	color_eyre::install()?;

	let server = MockServer::start_async().await;
	let token_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/oauth/token");
			then.status(200).body("demo-access-token");
		})
		.await;
	let report_mock = server
		.mock_async(|when, then| {
			when.method(GET).path("/api/reports/ANAFACTURACION");
			then.status(200).json_body(json!([
				{ "TRANSACCIONID": 1, "FECHA": "05-01-2026", "CLIENTE": "ACME", "TOTAL": "1200.00" },
				{ "TRANSACCIONID": 2, "FECHA": "19-02-2026", "CLIENTE": "Globex", "TOTAL": "310.40" },
			]));
		})
		.await;
	let config = BrokerConfig::from_figment(
		Figment::from(Serialized::defaults(BrokerConfig::default()))
			.merge(Serialized::default("client_id", "demo-client"))
			.merge(Serialized::default("client_secret", "demo-secret"))
			.merge(Serialized::default("identity_url", server.url("/api")))
			.merge(Serialized::default("api_url", server.url("/api"))),
	)?;
	// httpmock serves HTTPS with a self-signed certificate.
	let http = HttpClient::with_client(
		Client::builder()
			.danger_accept_invalid_certs(true)
			.danger_accept_invalid_hostnames(true)
			.timeout(config.http_timeout().unsigned_abs())
			.build()?,
	);
	let broker = ReportBroker::from_config_with_http(&config, http, Arc::new(SystemClock))?;
	let invoices = broker.invoices(2026)?;

	for month in ["01-2026", "02-2026"] {
		let records = invoices.fetch_month(month).await?;
		let total = records.iter().filter_map(|record| record.amount("total")).sum::<f64>();

		println!("{month}: {} invoice(s), {total:.2} total.", records.len());
	}

	token_mock.assert_calls_async(1).await;
	report_mock.assert_calls_async(1).await;

	Ok(())
}
