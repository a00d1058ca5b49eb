//! Configuration loading and resolution.
//!
//! Lookup order: explicit path → `MARKETSWEEP_CONFIG` →
//! `./.marketsweep/config.json` → `~/.marketsweep/config.json` → defaults.
//! `MARKETSWEEP_SCOPE`, `MARKETSWEEP_SYNC_ENDPOINT` and
//! `MARKETSWEEP_SYNC_TOKEN` are applied on top of whatever was loaded.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use marketsweep::{ExtractOptions, ScanLimits};
use serde::{Deserialize, Serialize};

/// Full harvest configuration. Every field has a default.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarvestConfig {
    /// Persistence scope (tenant / account) listings are upserted under.
    pub scope: String,
    /// Page the scan starts from.
    pub start_url: String,
    pub intercept: InterceptSettings,
    pub extract: ExtractOptions,
    pub scan: ScanLimits,
    pub timing: TimingSettings,
    pub sync: SyncSettings,
    pub browser: BrowserSettings,
    /// Where run summaries are appended. Defaults to `~/.marketsweep/summaries.jsonl`.
    pub summary_path: Option<PathBuf>,
}

impl Default for HarvestConfig {
    fn default() -> Self {
        Self {
            scope: "default".to_string(),
            start_url: "https://www.facebook.com/marketplace/you/selling".to_string(),
            intercept: InterceptSettings::default(),
            extract: ExtractOptions::default(),
            scan: ScanLimits::default(),
            timing: TimingSettings::default(),
            sync: SyncSettings::default(),
            browser: BrowserSettings::default(),
            summary_path: None,
        }
    }
}

/// Which page traffic the hook copies.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InterceptSettings {
    /// Substrings of request URLs whose responses are copied.
    pub endpoint_patterns: Vec<String>,
    /// Substrings marking a request or page location as a listing detail view.
    pub detail_markers: Vec<String>,
    /// Extra classifier allow keywords, appended to the built-in list.
    pub allow_keywords: Vec<String>,
    /// Extra classifier deny keywords, appended to the built-in list.
    pub deny_keywords: Vec<String>,
    /// Page-side queue bound; oldest bodies are dropped past it.
    pub max_queue: usize,
}

impl Default for InterceptSettings {
    fn default() -> Self {
        Self {
            endpoint_patterns: vec!["/api/graphql".to_string(), "/graphql".to_string()],
            detail_markers: vec!["/marketplace/item/".to_string()],
            allow_keywords: Vec::new(),
            deny_keywords: Vec::new(),
            max_queue: 500,
        }
    }
}

/// Fixed delays that keep host traffic under its informal rate limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TimingSettings {
    pub poll_interval_ms: u64,
    pub enrich_delay_ms: u64,
    pub save_delay_ms: u64,
    pub cooldown_ms: u64,
    pub navigation_timeout_ms: u64,
}

impl Default for TimingSettings {
    fn default() -> Self {
        Self {
            poll_interval_ms: 2500,
            enrich_delay_ms: 1500,
            save_delay_ms: 200,
            cooldown_ms: 5000,
            navigation_timeout_ms: 30_000,
        }
    }
}

impl TimingSettings {
    /// All delays zero; for tests and offline replays.
    pub fn immediate() -> Self {
        Self {
            poll_interval_ms: 0,
            enrich_delay_ms: 0,
            save_delay_ms: 0,
            cooldown_ms: 0,
            ..Self::default()
        }
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn enrich_delay(&self) -> Duration {
        Duration::from_millis(self.enrich_delay_ms)
    }

    pub fn save_delay(&self) -> Duration {
        Duration::from_millis(self.save_delay_ms)
    }

    pub fn cooldown(&self) -> Duration {
        Duration::from_millis(self.cooldown_ms)
    }
}

/// Outbound persistence endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncSettings {
    /// Base URL; listings go to `{endpoint}/{scope}/{external_id}`.
    pub endpoint: Option<String>,
    /// Bearer token.
    pub token: Option<String>,
    pub timeout_ms: u64,
    /// Retries on 5xx / 429 before giving up on one listing.
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            endpoint: None,
            token: None,
            timeout_ms: 15_000,
            max_retries: 2,
            retry_backoff_ms: 500,
        }
    }
}

/// Chromium launch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrowserSettings {
    pub chromium_path: Option<String>,
    /// Persistent profile holding the host's login session.
    pub user_data_dir: Option<PathBuf>,
    pub headless: bool,
    pub no_sandbox: bool,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for BrowserSettings {
    fn default() -> Self {
        Self {
            chromium_path: None,
            user_data_dir: dirs::home_dir().map(|h| h.join(".marketsweep").join("profile")),
            headless: false,
            no_sandbox: false,
            window_width: 1280,
            window_height: 900,
        }
    }
}

/// Resolve which config file to load, if any.
pub fn resolve_config_path(explicit: Option<&str>) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(PathBuf::from(path));
    }

    if let Ok(env_path) = std::env::var("MARKETSWEEP_CONFIG") {
        return Some(PathBuf::from(env_path));
    }

    let cwd_config = PathBuf::from(".marketsweep/config.json");
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    dirs::home_dir()
        .map(|home| home.join(".marketsweep").join("config.json"))
        .filter(|p| p.exists())
}

/// Marketsweep's home directory (`~/.marketsweep`).
pub fn data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".marketsweep")
}

impl HarvestConfig {
    /// Parse a config file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config: {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config: {}", path.display()))
    }

    /// Resolve, load and apply environment overrides.
    ///
    /// Returns the file the config came from, if any.
    pub fn load(explicit: Option<&str>) -> Result<(Self, Option<PathBuf>)> {
        let path = resolve_config_path(explicit);
        let mut config = match &path {
            Some(p) => Self::from_file(p)?,
            None => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok());
        Ok((config, path))
    }

    /// Apply `MARKETSWEEP_*` overrides from `lookup`.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(scope) = lookup("MARKETSWEEP_SCOPE") {
            self.scope = scope;
        }
        if let Some(endpoint) = lookup("MARKETSWEEP_SYNC_ENDPOINT") {
            self.sync.endpoint = Some(endpoint);
        }
        if let Some(token) = lookup("MARKETSWEEP_SYNC_TOKEN") {
            self.sync.token = Some(token);
        }
    }

    /// Summary log location.
    pub fn summary_path(&self) -> PathBuf {
        self.summary_path
            .clone()
            .unwrap_or_else(|| data_dir().join("summaries.jsonl"))
    }
}
