//! Outbound sync client — upserts one listing per call.
//!
//! `PUT {endpoint}/{scope}/{external_id}` with the flat listing JSON plus
//! `scope`. Retries 5xx with exponential backoff and honors `Retry-After`
//! on 429; any other non-2xx is a soft rejection the caller counts.

use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use marketsweep::Listing;
use serde::Serialize;
use url::Url;

use crate::config::SyncSettings;

/// Result of one upsert that reached the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    Stored { status: u16 },
    Rejected { status: u16 },
}

impl SyncOutcome {
    pub fn is_stored(&self) -> bool {
        matches!(self, SyncOutcome::Stored { .. })
    }
}

/// Where saved listings go.
#[async_trait]
pub trait ListingSink: Send + Sync {
    async fn upsert(&self, scope: &str, listing: &Listing) -> Result<SyncOutcome>;
}

#[derive(Serialize)]
struct UpsertBody<'a> {
    scope: &'a str,
    #[serde(flatten)]
    listing: &'a Listing,
}

/// HTTP client for the persistence endpoint.
#[derive(Clone)]
pub struct SyncClient {
    client: reqwest::Client,
    endpoint: Url,
    token: Option<String>,
    max_retries: u32,
    retry_backoff: Duration,
}

impl SyncClient {
    pub fn new(settings: &SyncSettings) -> Result<Self> {
        let raw = settings
            .endpoint
            .as_deref()
            .context("no sync endpoint configured (sync.endpoint or MARKETSWEEP_SYNC_ENDPOINT)")?;
        let endpoint = Url::parse(raw).with_context(|| format!("invalid sync endpoint: {raw}"))?;
        if endpoint.cannot_be_a_base() {
            anyhow::bail!("sync endpoint cannot take path segments: {raw}");
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(settings.timeout_ms))
            .user_agent(concat!("marketsweep/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("failed to build HTTP client")?;

        Ok(Self {
            client,
            endpoint,
            token: settings.token.clone(),
            max_retries: settings.max_retries,
            retry_backoff: Duration::from_millis(settings.retry_backoff_ms),
        })
    }

    /// `{endpoint}/{scope}/{external_id}`, each segment percent-encoded.
    pub fn upsert_url(&self, scope: &str, external_id: &str) -> Result<Url> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|()| anyhow::anyhow!("sync endpoint cannot take path segments"))?
            .pop_if_empty()
            .push(scope)
            .push(external_id);
        Ok(url)
    }

    pub async fn upsert(&self, scope: &str, listing: &Listing) -> Result<SyncOutcome> {
        let url = self.upsert_url(scope, &listing.external_id)?;
        let body = UpsertBody { scope, listing };
        let mut retries = 0u32;

        loop {
            let mut request = self.client.put(url.clone()).json(&body);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }
            let response = request
                .send()
                .await
                .with_context(|| format!("upsert {} failed", listing.external_id))?;
            let status = response.status().as_u16();

            if status >= 500 && retries < self.max_retries {
                retries += 1;
                tokio::time::sleep(backoff_delay(self.retry_backoff, retries)).await;
                continue;
            }

            if status == 429 && retries < self.max_retries {
                retries += 1;
                let retry_after = response
                    .headers()
                    .get("retry-after")
                    .and_then(|v| v.to_str().ok())
                    .and_then(|s| s.parse::<u64>().ok())
                    .map(Duration::from_secs)
                    .unwrap_or(self.retry_backoff);
                tokio::time::sleep(retry_after.min(Duration::from_secs(10))).await;
                continue;
            }

            return Ok(if response.status().is_success() {
                SyncOutcome::Stored { status }
            } else {
                tracing::warn!(id = %listing.external_id, status, "upsert rejected");
                SyncOutcome::Rejected { status }
            });
        }
    }
}

#[async_trait]
impl ListingSink for SyncClient {
    async fn upsert(&self, scope: &str, listing: &Listing) -> Result<SyncOutcome> {
        SyncClient::upsert(self, scope, listing).await
    }
}

/// Prints each listing as one JSON line on stdout instead of uploading.
#[derive(Debug, Default)]
pub struct StdoutSink;

#[async_trait]
impl ListingSink for StdoutSink {
    async fn upsert(&self, scope: &str, listing: &Listing) -> Result<SyncOutcome> {
        let line = serde_json::to_string(&UpsertBody { scope, listing })?;
        println!("{line}");
        Ok(SyncOutcome::Stored { status: 200 })
    }
}

/// Longest pause between server-error retries.
const MAX_BACKOFF: Duration = Duration::from_secs(30);

/// Exponential backoff for retry `attempt` (1-based), capped at [`MAX_BACKOFF`].
fn backoff_delay(base: Duration, attempt: u32) -> Duration {
    let factor = 2u32
        .checked_pow(attempt.saturating_sub(1))
        .unwrap_or(u32::MAX);
    base.saturating_mul(factor).min(MAX_BACKOFF)
}
