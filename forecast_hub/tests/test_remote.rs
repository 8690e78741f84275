mod common;

use common::{date, HEADER};
use forecast_hub::config::{PipelineConfig, RemoteSource, RetryPolicy};
use forecast_hub::data::HubReader;
use forecast_hub::remote::{fetch_remote, fetch_with_retry, TextSource};
use forecast_hub::{HubError, Result};
use std::sync::atomic::{AtomicU32, Ordering};

/// Fails a fixed number of times before answering
struct FlakySource {
    failures: u32,
    calls: AtomicU32,
    body: String,
}

impl FlakySource {
    fn new(failures: u32, body: &str) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
            body: body.to_string(),
        }
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl TextSource for FlakySource {
    fn fetch_text(&self, url: &str) -> Result<String> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call <= self.failures {
            Err(HubError::FetchError(format!("{}: connection reset", url)))
        } else {
            Ok(self.body.clone())
        }
    }
}

fn fast_policy(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        initial_backoff_ms: 0,
        max_backoff_ms: 0,
        timeout_secs: 1,
    }
}

#[test]
fn test_retry_until_success() {
    let source = FlakySource::new(2, "ok");
    let body = fetch_with_retry(&source, "https://example.org/a.csv", &fast_policy(3)).unwrap();

    assert_eq!(body, "ok");
    assert_eq!(source.calls(), 3);
}

#[test]
fn test_retry_gives_up() {
    let source = FlakySource::new(10, "ok");
    let result = fetch_with_retry(&source, "https://example.org/a.csv", &fast_policy(3));

    match result {
        Err(HubError::FetchError(msg)) => assert!(msg.contains("3 attempts")),
        other => panic!("expected a fetch error, got {:?}", other),
    }
    assert_eq!(source.calls(), 3);
}

#[test]
fn test_fetch_remote_parses_hub_csv() {
    let body = format!(
        "{}\n2024-01-13,wk inc flu hosp,0,2024-01-13,37,quantile,0.5,100\n",
        HEADER
    );
    let source = FlakySource::new(1, &body);
    let registry = common::registry();
    let config = PipelineConfig::flusight();
    let reader = HubReader::new(&registry, &config);
    let remote = RemoteSource {
        model_id: "FluSight-ensemble".to_string(),
        reference_date: date("2024-01-13"),
        url: "https://example.org/2024-01-13-FluSight-ensemble.csv".to_string(),
    };

    let batch = fetch_remote(&source, &remote, &reader, &fast_policy(2)).unwrap();
    assert_eq!(batch.source.model_id, "FluSight-ensemble");
    assert_eq!(batch.source.origin, remote.url);
    assert_eq!(batch.records.len(), 1);
    assert_eq!(batch.records[0].model_id, "FluSight-ensemble");
}
