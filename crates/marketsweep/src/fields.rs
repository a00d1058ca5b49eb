//! Per-field fallback chains over an untyped listing node.
//!
//! Each semantic field owns an ordered list of candidate paths covering the
//! schema variants seen across query shapes: the direct field first, then
//! the same field under each relation key. A wrapper node therefore reads
//! the same values as the entity it wraps. The first candidate that yields
//! a non-empty, plausible value wins.

use serde::Serialize;
use serde_json::Value;
use url::Url;

use crate::images::locate_images;
use crate::types::{ExtractOptions, FieldExtractionResult, Listing, ListingStatus};
use crate::validate::RELATION_KEYS;
use crate::value::{at, text_of, truncate_chars};

/// Prices at or above this are treated as placeholder junk.
pub const MAX_PLAUSIBLE_PRICE: f64 = 1_000_000.0;

/// Direct paths first, then each of them under every relation key.
pub fn candidates(direct: &'static [&'static str]) -> impl Iterator<Item = String> {
    direct.iter().map(|p| p.to_string()).chain(
        RELATION_KEYS
            .iter()
            .flat_map(move |rel| direct.iter().map(move |p| format!("{rel}.{p}"))),
    )
}

/// A text field: direct candidate paths plus a length bound.
#[derive(Debug)]
pub struct TextField {
    pub name: &'static str,
    pub paths: &'static [&'static str],
    pub max_len: usize,
}

impl TextField {
    /// First non-empty candidate, truncated to `max_len` chars.
    pub fn explain(&self, node: &Value) -> Option<FieldExtractionResult<String>> {
        candidates(self.paths).find_map(|path| {
            let text = at(node, &path).and_then(text_of)?;
            Some(FieldExtractionResult {
                value: truncate_chars(&text, self.max_len),
                source: path,
            })
        })
    }

    pub fn extract(&self, node: &Value) -> Option<String> {
        self.explain(node).map(|r| r.value)
    }
}

pub const TITLE: TextField = TextField {
    name: "title",
    paths: &["marketplace_listing_title", "title", "custom_title", "name"],
    max_len: 255,
};

pub const DESCRIPTION: TextField = TextField {
    name: "description",
    paths: &[
        "redacted_description",
        "description",
        "listing_description",
        "story_description",
    ],
    max_len: 5000,
};

pub const CONDITION: TextField = TextField {
    name: "condition",
    paths: &["condition", "item_condition", "listing_condition"],
    max_len: 100,
};

pub const CATEGORY: TextField = TextField {
    name: "category",
    paths: &[
        "marketplace_listing_category_name",
        "category_name",
        "category",
        "marketplace_listing_category.name",
        "marketplace_listing_category",
    ],
    max_len: 255,
};

pub const LOCATION: TextField = TextField {
    name: "location",
    paths: &[
        "location_text",
        "location.reverse_geocode.city_page.display_name",
        "location.reverse_geocode.city",
        "location",
        "city",
    ],
    max_len: 255,
};

const PRICE_PATHS: &[&str] = &["listing_price", "formatted_price", "price", "price_amount"];

const PRICE_OBJECT_KEYS: &[&str] = &["amount", "formatted_amount", "amount_with_offset", "text"];

const URL_PATHS: &[&str] = &["listing_url", "url", "share_uri", "permalink"];

const SOLD_FLAGS: &[&str] = &["is_sold"];

const STATE_FIELDS: &[&str] = &[
    "listing_state",
    "sale_state",
    "marketplace_listing_state",
    "state",
];

const VISIBILITY_FIELDS: &[&str] = &["visibility", "listing_visibility"];

const DELETED_FLAGS: &[&str] = &["is_deleted", "is_hidden"];

/// Keyword table for state enums. Matched against whole tokens.
const STATE_KEYWORDS: &[(&str, ListingStatus)] = &[
    ("sold", ListingStatus::Sold),
    ("pending", ListingStatus::Pending),
    ("reserved", ListingStatus::Pending),
    ("hold", ListingStatus::Pending),
    ("deleted", ListingStatus::Deleted),
    ("removed", ListingStatus::Deleted),
    ("archived", ListingStatus::Deleted),
    ("expired", ListingStatus::Deleted),
];

/// Parse a price out of a number, string or price object.
///
/// Strings keep only digits and `.` before parsing. Non-finite, negative
/// and implausibly large values yield `None`.
pub fn parse_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => {
            let cleaned: String = s.chars().filter(|c| c.is_ascii_digit() || *c == '.').collect();
            if cleaned.is_empty() {
                return None;
            }
            cleaned.parse::<f64>().ok()?
        }
        Value::Object(map) => {
            return PRICE_OBJECT_KEYS
                .iter()
                .find_map(|k| map.get(*k).and_then(parse_price));
        }
        _ => return None,
    };
    (price.is_finite() && (0.0..MAX_PLAUSIBLE_PRICE).contains(&price)).then_some(price)
}

pub fn explain_price(node: &Value) -> Option<FieldExtractionResult<f64>> {
    candidates(PRICE_PATHS).find_map(|path| {
        let price = at(node, &path).and_then(parse_price)?;
        Some(FieldExtractionResult {
            value: price,
            source: path,
        })
    })
}

pub fn extract_price(node: &Value) -> Option<f64> {
    explain_price(node).map(|r| r.value)
}

/// Status by precedence: sold flag, state enum, visibility, deleted flag.
pub fn explain_status(node: &Value) -> FieldExtractionResult<ListingStatus> {
    let found = |status: ListingStatus, source: &str| FieldExtractionResult {
        value: status,
        source: source.to_string(),
    };

    for path in candidates(SOLD_FLAGS) {
        if at(node, &path).and_then(Value::as_bool) == Some(true) {
            return found(ListingStatus::Sold, &path);
        }
    }
    for path in candidates(STATE_FIELDS) {
        if let Some(status) = at(node, &path).and_then(Value::as_str).and_then(map_state) {
            return found(status, &path);
        }
    }
    for path in candidates(VISIBILITY_FIELDS) {
        if let Some(vis) = at(node, &path).and_then(Value::as_str) {
            let vis = vis.to_ascii_lowercase();
            if vis.contains("hidden") || vis.contains("deleted") {
                return found(ListingStatus::Deleted, &path);
            }
        }
    }
    for path in candidates(DELETED_FLAGS) {
        if at(node, &path).and_then(Value::as_bool) == Some(true) {
            return found(ListingStatus::Deleted, &path);
        }
    }
    found(ListingStatus::Active, "default")
}

pub fn extract_status(node: &Value) -> ListingStatus {
    explain_status(node).value
}

fn map_state(raw: &str) -> Option<ListingStatus> {
    let lower = raw.to_ascii_lowercase();
    let tokens: Vec<&str> = lower
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect();
    STATE_KEYWORDS
        .iter()
        .find(|(keyword, _)| tokens.contains(keyword))
        .map(|(_, status)| *status)
}

/// First absolute http(s) URL among the URL candidates.
pub fn extract_url(node: &Value) -> Option<String> {
    candidates(URL_PATHS).find_map(|path| {
        let raw = at(node, &path)?.as_str()?.trim();
        let parsed = Url::parse(raw).ok()?;
        matches!(parsed.scheme(), "http" | "https").then(|| raw.to_string())
    })
}

/// Build a normalized listing from an accepted node.
pub fn normalize_listing(node: &Value, id: &str, options: &ExtractOptions) -> Listing {
    let url = extract_url(node).unwrap_or_else(|| options.listing_url(id));
    let mut listing = Listing::new(id, url);
    listing.title = TITLE.extract(node);
    listing.price = extract_price(node);
    listing.description = DESCRIPTION.extract(node);
    listing.condition = CONDITION.extract(node);
    listing.category = CATEGORY.extract(node);
    listing.location = LOCATION.extract(node);
    listing.images = locate_images(node, options);
    listing.status = extract_status(node);
    listing
}

/// Which candidate produced each field, for debugging new payload shapes.
#[derive(Debug, Clone, Default, Serialize)]
pub struct FieldReport {
    pub sources: Vec<(String, String)>,
}

pub fn explain_listing(node: &Value) -> FieldReport {
    let mut report = FieldReport::default();
    for field in [&TITLE, &DESCRIPTION, &CONDITION, &CATEGORY, &LOCATION] {
        if let Some(r) = field.explain(node) {
            report.sources.push((field.name.to_string(), r.source));
        }
    }
    if let Some(r) = explain_price(node) {
        report.sources.push(("price".to_string(), r.source));
    }
    report
        .sources
        .push(("status".to_string(), explain_status(node).source));
    report
}
