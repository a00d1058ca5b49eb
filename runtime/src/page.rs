//! The host page as the orchestrator sees it.
//!
//! [`HostPage`] isolates every side effect against the third-party
//! application: navigation, hook installation, queue draining, scroll
//! pagination and detail fetches. [`BrowserPage`] drives a real Chromium
//! tab; tests substitute scripted fakes.

use anyhow::{Context, Result};
use async_trait::async_trait;
use marketsweep::InterceptedResponse;
use serde::Deserialize;

use crate::intercept::hook;
use crate::renderer::RenderContext;

/// One drain of the page-side queue.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DrainBatch {
    pub installed: bool,
    #[serde(default)]
    pub items: Vec<InterceptedResponse>,
    /// Page-side hook failure count (cumulative).
    #[serde(default)]
    pub errors: usize,
    /// Bodies dropped by a full page queue (cumulative).
    #[serde(default)]
    pub dropped: usize,
}

#[async_trait]
pub trait HostPage: Send + Sync {
    /// Load `url` in the tab.
    async fn open(&mut self, url: &str) -> Result<()>;
    /// Install the hook for the current and every future document.
    /// `Ok(false)` means it was already present.
    async fn install_hook(&mut self, script: &str) -> Result<bool>;
    async fn hook_installed(&self) -> Result<bool>;
    async fn drain(&self) -> Result<DrainBatch>;
    async fn scroll(&self) -> Result<()>;
    /// Try to provoke the host into loading more data. `Ok(true)` if an
    /// explicit control was activated.
    async fn trigger_more(&self) -> Result<bool>;
    /// Fetch a listing detail view with the page's credentials.
    async fn fetch_detail(&self, url: &str) -> Result<String>;
}

/// [`HostPage`] over a renderer tab.
pub struct BrowserPage {
    ctx: Box<dyn RenderContext>,
    navigation_timeout_ms: u64,
}

impl BrowserPage {
    pub fn new(ctx: Box<dyn RenderContext>, navigation_timeout_ms: u64) -> Self {
        Self {
            ctx,
            navigation_timeout_ms,
        }
    }

    pub async fn close(self) -> Result<()> {
        self.ctx.close().await
    }
}

#[async_trait]
impl HostPage for BrowserPage {
    async fn open(&mut self, url: &str) -> Result<()> {
        let nav = self
            .ctx
            .navigate(url, self.navigation_timeout_ms)
            .await
            .with_context(|| format!("failed to open {url}"))?;
        tracing::info!(url = %nav.final_url, load_ms = nav.load_time_ms, "host page loaded");
        Ok(())
    }

    async fn install_hook(&mut self, script: &str) -> Result<bool> {
        self.ctx.add_init_script(script).await?;
        let installed = self.ctx.execute_js(script).await?;
        Ok(installed.as_bool().unwrap_or(false))
    }

    async fn hook_installed(&self) -> Result<bool> {
        let probe = self.ctx.execute_js(hook::PROBE_SCRIPT).await?;
        Ok(probe.as_bool().unwrap_or(false))
    }

    async fn drain(&self) -> Result<DrainBatch> {
        let raw = self.ctx.execute_js(hook::DRAIN_SCRIPT).await?;
        serde_json::from_value(raw).context("malformed drain batch")
    }

    async fn scroll(&self) -> Result<()> {
        self.ctx.execute_js(hook::SCROLL_SCRIPT).await?;
        Ok(())
    }

    async fn trigger_more(&self) -> Result<bool> {
        let clicked = self.ctx.execute_js(hook::TRIGGER_MORE_SCRIPT).await?;
        Ok(clicked.as_bool().unwrap_or(false))
    }

    async fn fetch_detail(&self, url: &str) -> Result<String> {
        let body = self
            .ctx
            .execute_js(&hook::fetch_text_script(url))
            .await
            .with_context(|| format!("detail fetch failed: {url}"))?;
        match body {
            serde_json::Value::String(text) => Ok(text),
            other => anyhow::bail!("detail fetch returned non-text: {other}"),
        }
    }
}
