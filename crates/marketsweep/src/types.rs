//! Core data types for harvested listings and intercepted traffic.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::session::HarvestPhase;

/// Default cap on image URLs kept per listing.
pub const DEFAULT_MAX_IMAGES: usize = 30;

/// A marketplace listing normalized from an intercepted payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Listing {
    pub external_id: String,
    pub title: Option<String>,
    pub price: Option<f64>,
    pub description: Option<String>,
    pub condition: Option<String>,
    pub category: Option<String>,
    pub location: Option<String>,
    pub images: Vec<String>,
    pub url: String,
    pub status: ListingStatus,
    pub is_enriched: bool,
    pub captured_at: DateTime<Utc>,
}

impl Listing {
    /// A bare listing with only its identity filled in.
    pub fn new(external_id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            external_id: external_id.into(),
            title: None,
            price: None,
            description: None,
            condition: None,
            category: None,
            location: None,
            images: Vec::new(),
            url: url.into(),
            status: ListingStatus::Active,
            is_enriched: false,
            captured_at: Utc::now(),
        }
    }
}

/// Sale status taxonomy. Extraction always yields exactly one of these.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ListingStatus {
    #[default]
    Active,
    Pending,
    Sold,
    Deleted,
}

impl ListingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListingStatus::Active => "active",
            ListingStatus::Pending => "pending",
            ListingStatus::Sold => "sold",
            ListingStatus::Deleted => "deleted",
        }
    }
}

impl std::fmt::Display for ListingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which kind of page produced a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CaptureOrigin {
    /// Summary card seen while scrolling the listing feed.
    Scan,
    /// Full record from a per-listing detail view.
    Detail,
}

/// A response body copied off the host's request primitives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InterceptedResponse {
    pub url: String,
    /// Set when the request came from (or targeted) a listing detail view.
    #[serde(default)]
    pub detail: bool,
    pub body: String,
}

impl InterceptedResponse {
    pub fn new(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            detail: false,
            body: body.into(),
        }
    }

    pub fn detail(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            detail: true,
            body: body.into(),
        }
    }

    pub fn origin(&self) -> CaptureOrigin {
        if self.detail {
            CaptureOrigin::Detail
        } else {
            CaptureOrigin::Scan
        }
    }
}

/// Diagnostic record of which candidate path produced a field value.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldExtractionResult<T> {
    pub value: T,
    /// Dotted candidate path, e.g. `listing_price.amount`.
    pub source: String,
}

/// Knobs shared by the validator, extractors and image locator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    /// Image hosts accepted by the image filter (host or parent domain).
    pub image_hosts: Vec<String>,
    pub max_images: usize,
    /// Canonical URL template; `{id}` is replaced with the external id.
    pub listing_url_template: String,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            image_hosts: vec!["fbcdn.net".to_string()],
            max_images: DEFAULT_MAX_IMAGES,
            listing_url_template: "https://www.facebook.com/marketplace/item/{id}/".to_string(),
        }
    }
}

impl ExtractOptions {
    pub fn listing_url(&self, id: &str) -> String {
        self.listing_url_template.replace("{id}", id)
    }
}

/// Errors that can occur in the harvest core.
#[derive(thiserror::Error, Debug)]
pub enum HarvestError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid phase transition: {from} -> {to}")]
    InvalidTransition { from: HarvestPhase, to: HarvestPhase },

    #[error("Scan finished without capturing any listings")]
    NothingCaptured,

    #[error("Listing not found: {0}")]
    ListingNotFound(String),
}

/// Convenience result type.
pub type HarvestResult<T> = Result<T, HarvestError>;
