//! Hub CSV files fetched over HTTP

use crate::config::{RemoteSource, RetryPolicy};
use crate::data::{FileBatch, HubReader, SourceFile};
use crate::error::{HubError, Result};
use backon::{BlockingRetryable, ExponentialBuilder};
use std::thread;
use std::time::Duration;
use tracing::{debug, info, warn};

const USER_AGENT: &str = concat!("respilens-forecast-hub/", env!("CARGO_PKG_VERSION"));

/// Something that can return the body behind a URL
pub trait TextSource: Sync {
    fn fetch_text(&self, url: &str) -> Result<String>;
}

/// Blocking HTTP transport
pub struct HttpSource {
    client: reqwest::blocking::Client,
}

impl HttpSource {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = reqwest::blocking::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(timeout)
            .build()
            .map_err(|e| HubError::FetchError(e.to_string()))?;
        Ok(Self { client })
    }
}

impl TextSource for HttpSource {
    fn fetch_text(&self, url: &str) -> Result<String> {
        let response = self
            .client
            .get(url)
            .send()
            .map_err(|e| HubError::FetchError(format!("{}: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(HubError::FetchError(format!(
                "{}: HTTP {}",
                url,
                status.as_u16()
            )));
        }

        response
            .text()
            .map_err(|e| HubError::FetchError(format!("{}: {}", url, e)))
    }
}

/// Exponential backoff for `policy`: doubling from the initial delay up to the cap.
pub fn backoff(policy: &RetryPolicy) -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_millis(policy.initial_backoff_ms))
        .with_max_delay(Duration::from_millis(policy.max_backoff_ms))
        .with_factor(2.0)
        .with_max_times(policy.max_attempts.saturating_sub(1) as usize)
}

/// Fetch `url`, retrying with exponential backoff up to `policy.max_attempts` times.
pub fn fetch_with_retry(source: &dyn TextSource, url: &str, policy: &RetryPolicy) -> Result<String> {
    let mut attempts = 0u32;

    let result = (|| {
        attempts += 1;
        source.fetch_text(url)
    })
    .retry(backoff(policy))
    .sleep(thread::sleep)
    .notify(|e: &HubError, delay: Duration| {
        warn!(
            "Fetch of {} failed: {}; retrying in {:?} (max {} attempts)",
            url, e, delay, policy.max_attempts
        );
    })
    .call();

    result.map_err(|e| {
        HubError::FetchError(format!(
            "giving up on {} after {} attempts: {}",
            url, attempts, e
        ))
    })
}

/// Download one configured remote source and parse it like a hub file.
pub fn fetch_remote(
    source: &dyn TextSource,
    remote: &RemoteSource,
    reader: &HubReader<'_>,
    policy: &RetryPolicy,
) -> Result<FileBatch> {
    debug!("Fetching {} for {}", remote.url, remote.model_id);
    let body = fetch_with_retry(source, &remote.url, policy)?;

    let batch = reader.read_csv(
        body.as_bytes(),
        SourceFile {
            model_id: remote.model_id.clone(),
            reference_date: remote.reference_date,
            origin: remote.url.clone(),
        },
    )?;

    info!(
        "Fetched {} rows of {} for {}",
        batch.records.len(),
        remote.model_id,
        remote.reference_date
    );
    Ok(batch)
}
