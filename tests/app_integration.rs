use anyhow::{Result, anyhow};
use async_trait::async_trait;
use ratekeeper::core::{LatestRates, RateInfo, RateProvider};
use ratekeeper::providers::CurrencyApiProvider;
use ratekeeper::worker::{Manager, WorkerConfig};
use std::fs;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::info;

mod test_utils {
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    pub fn latest_body(rates: &[(&str, f64)]) -> String {
        let data: Vec<String> = rates
            .iter()
            .map(|(code, value)| format!(r#""{code}": {{"code": "{code}", "value": {value}}}"#))
            .collect();
        format!(
            r#"{{"meta": {{"last_updated_at": "2024-05-01T23:59:59Z"}}, "data": {{{}}}}}"#,
            data.join(", ")
        )
    }

    pub async fn create_mock_server(status: u16, body: &str) -> MockServer {
        let mock_server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/latest"))
            .respond_with(ResponseTemplate::new(status).set_body_string(body))
            .mount(&mock_server)
            .await;
        mock_server
    }

    pub fn write_config(
        file: &tempfile::NamedTempFile,
        base_url: &str,
        currencies: &str,
    ) -> String {
        let config_content = format!(
            r#"
provider:
  api_key: "integration-key"
  base_url: "{base_url}"
worker:
  currencies: {currencies}
  fetch_interval_secs: 60
  request_timeout_secs: 2
"#
        );
        std::fs::write(file.path(), config_content).expect("Failed to write config file");
        file.path().to_str().unwrap().to_string()
    }
}

/// Serves `{EUR: 0.9}` on the first call, fails every call within the
/// outage window after it, then serves `{EUR: 0.95}`.
struct OutageProvider {
    outage: Duration,
    first_call: parking_lot::Mutex<Option<Instant>>,
    calls: AtomicUsize,
}

impl OutageProvider {
    fn new(outage: Duration) -> Self {
        Self {
            outage,
            first_call: parking_lot::Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }
}

fn rates(value: f64, updated: &str) -> LatestRates {
    LatestRates {
        rates: [("EUR".to_string(), RateInfo::new("EUR", value))]
            .into_iter()
            .collect(),
        last_updated_at: updated.to_string(),
    }
}

#[async_trait]
impl RateProvider for OutageProvider {
    async fn fetch_latest(&self, _base_currency: &str) -> Result<LatestRates> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = Instant::now();
        let first = *self.first_call.lock().get_or_insert(now);
        if now == first {
            Ok(rates(0.9, "first"))
        } else if now.duration_since(first) < self.outage {
            Err(anyhow!("503 Service Unavailable"))
        } else {
            Ok(rates(0.95, "recovered"))
        }
    }
}

#[tokio::test(start_paused = true)]
async fn test_outage_keeps_stale_snapshot_until_recovery() {
    let provider = Arc::new(OutageProvider::new(Duration::from_millis(200)));
    let manager = Manager::builder()
        .provider(provider.clone())
        .config(WorkerConfig {
            currencies: vec!["USD".to_string()],
            fetch_interval: Duration::from_millis(50),
            request_timeout: Duration::from_millis(20),
        })
        .build()
        .unwrap();

    manager.start(CancellationToken::new()).unwrap();

    let started = Instant::now();
    tokio::time::sleep(Duration::from_millis(5)).await;
    while started.elapsed() < Duration::from_millis(190) {
        let snapshot = manager.get_rates("USD").expect("store was cleared");
        assert_eq!(snapshot.rate("EUR"), Some(0.9));
        assert_eq!(snapshot.provider_updated_at, "first");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    tokio::time::sleep_until(started + Duration::from_millis(250)).await;
    let snapshot = manager.get_rates("USD").unwrap();
    assert_eq!(snapshot.rate("EUR"), Some(0.95));
    assert_eq!(snapshot.base_currency, "USD");

    manager.stop().await;
    assert!(!manager.is_running());

    let status = manager.worker_status();
    assert_eq!(status.len(), 1);
    assert_eq!(status[0].failures, 3);
    assert_eq!(status[0].attempts as usize, provider.calls.load(Ordering::SeqCst));
}

#[test_log::test(tokio::test)]
async fn test_manager_with_currencyapi_mock() {
    let body = test_utils::latest_body(&[("EUR", 0.9345), ("GBP", 0.7991), ("USD", 1.0)]);
    let mock_server = test_utils::create_mock_server(200, &body).await;

    let provider = CurrencyApiProvider::new(&mock_server.uri(), "integration-key").unwrap();
    let manager = Manager::new(
        Arc::new(provider),
        WorkerConfig {
            currencies: vec!["USD".to_string(), "EUR".to_string()],
            fetch_interval: Duration::from_secs(60),
            request_timeout: Duration::from_secs(2),
        },
    );

    manager.start(CancellationToken::new()).unwrap();

    let deadline = Instant::now() + Duration::from_secs(5);
    while manager.get_all_rates().len() < 2 && Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    manager.stop().await;

    let all = manager.get_all_rates();
    info!(?all, "Cached rates after warm-up");
    assert_eq!(all.len(), 2);
    assert_eq!(all["USD"].rate("EUR"), Some(0.9345));
    assert_eq!(all["EUR"].provider_updated_at, "2024-05-01T23:59:59Z");

    let err = manager.get_rates("JPY").unwrap_err();
    assert!(err.is_not_found());
    assert_eq!(err.to_string(), "rates not found for currency: JPY");
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_with_mock() {
    let body = test_utils::latest_body(&[("EUR", 0.92), ("GBP", 0.79)]);
    let mock_server = test_utils::create_mock_server(200, &body).await;

    let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    let config_path =
        test_utils::write_config(&config_file, &mock_server.uri(), r#"["USD", "EUR"]"#);

    let result =
        ratekeeper::run_command(ratekeeper::AppCommand::Once, Some(config_path.as_str())).await;
    assert!(
        result.is_ok(),
        "Main function failed with: {:?}",
        result.err()
    );

    let requests = mock_server.received_requests().await.unwrap_or_default();
    assert_eq!(requests.len(), 2);
}

#[test_log::test(tokio::test)]
async fn test_full_app_flow_fails_when_provider_is_down() {
    let mock_server = test_utils::create_mock_server(500, "internal error").await;

    let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    let config_path = test_utils::write_config(&config_file, &mock_server.uri(), r#"["GBP"]"#);

    let result =
        ratekeeper::run_command(ratekeeper::AppCommand::Once, Some(config_path.as_str())).await;
    let err = result.expect_err("run should fail without any rates");
    assert!(err.to_string().contains("No rates could be fetched for GBP"));
}

#[test_log::test(tokio::test)]
async fn test_missing_config_file() {
    let result = ratekeeper::run_command(
        ratekeeper::AppCommand::Once,
        Some("/nonexistent/ratekeeper.yaml"),
    )
    .await;
    assert!(result.is_err());
    assert!(
        result
            .unwrap_err()
            .to_string()
            .contains("Failed to read config file")
    );
}

#[test]
fn test_missing_api_key_is_reported() {
    if std::env::var("CURRENCY_API_KEY").is_ok() {
        return;
    }
    let config_file = tempfile::NamedTempFile::new().expect("Failed to create temp file");
    fs::write(config_file.path(), "worker:\n  currencies: [\"USD\"]\n").unwrap();

    let config = ratekeeper::core::config::AppConfig::load_from_path(config_file.path()).unwrap();
    let err = ratekeeper::build_manager(&config)
        .err()
        .expect("manager built without an API key");
    assert!(err.to_string().contains("No API key configured"));
}
