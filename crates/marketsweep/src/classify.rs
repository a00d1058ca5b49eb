//! Response classifier and payload tokenizer.
//!
//! Classification is a bounded substring scan that runs before any JSON
//! parsing, so most irrelevant traffic (chat, notifications, presence) is
//! dropped for the cost of a few `contains` calls. Accepted bodies are
//! tokenized into JSON values: guard prefixes are stripped, newline
//! delimited documents are parsed line by line, and HTML detail pages are
//! mined for embedded JSON script blocks.

use scraper::{Html, Selector};
use serde_json::Value;

/// Only the head of a body is scanned for keywords.
pub const SCAN_WINDOW: usize = 10 * 1024;

/// Anti-hijacking guards some hosts prepend to JSON responses.
pub const GUARD_PREFIXES: &[&str] = &["for (;;);", "for(;;);", ")]}'", "while(1);"];

const ALLOW_KEYWORDS: &[&str] = &[
    "marketplace_listing_id",
    "MarketplaceListing",
    "marketplace_listing_title",
    "listing_price",
    "primary_listing_photo",
    "GroupCommerceProductItem",
    "marketplace_search",
    "marketplace_feed",
    "for_sale_item",
];

const DENY_KEYWORDS: &[&str] = &[
    "MessengerThread",
    "message_thread",
    "messaging_",
    "notification",
    "typing_indicator",
    "presence_",
    "unread_count",
    "LightspeedRequest",
];

/// Outcome of a keyword scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Classification {
    pub accepted: bool,
    pub allow_hits: usize,
    pub deny_hits: usize,
}

/// Keyword pre-filter for intercepted bodies.
#[derive(Debug, Clone)]
pub struct Classifier {
    allow: Vec<String>,
    deny: Vec<String>,
    window: usize,
}

impl Default for Classifier {
    fn default() -> Self {
        Self {
            allow: ALLOW_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            deny: DENY_KEYWORDS.iter().map(|s| s.to_string()).collect(),
            window: SCAN_WINDOW,
        }
    }
}

impl Classifier {
    /// Extend the built-in keyword sets.
    pub fn with_keywords(mut self, allow: &[String], deny: &[String]) -> Self {
        self.allow.extend(allow.iter().cloned());
        self.deny.extend(deny.iter().cloned());
        self
    }

    /// Scan the head of `body` against both keyword sets.
    ///
    /// Accepts when at least one allow keyword hits and allow hits are not
    /// outnumbered by deny hits.
    pub fn classify(&self, body: &str) -> Classification {
        let head = head_of(body, self.window);
        let allow_hits = self.allow.iter().filter(|k| head.contains(k.as_str())).count();
        let deny_hits = self.deny.iter().filter(|k| head.contains(k.as_str())).count();
        Classification {
            accepted: allow_hits > 0 && allow_hits >= deny_hits,
            allow_hits,
            deny_hits,
        }
    }

    pub fn accepts(&self, body: &str) -> bool {
        self.classify(body).accepted
    }
}

/// Prefix of `body` no longer than `window` bytes, cut on a char boundary.
fn head_of(body: &str, window: usize) -> &str {
    if body.len() <= window {
        return body;
    }
    let mut end = window;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    &body[..end]
}

/// Remove a leading anti-hijacking guard, if any.
pub fn strip_guard(body: &str) -> &str {
    let trimmed = body.trim_start();
    GUARD_PREFIXES
        .iter()
        .find_map(|g| trimmed.strip_prefix(g))
        .unwrap_or(trimmed)
}

/// JSON values recovered from a body, plus how many fragments failed.
#[derive(Debug, Default)]
pub struct TokenizeOutcome {
    pub values: Vec<Value>,
    pub parse_failures: usize,
}

/// Split a body into independently parsed JSON documents.
pub fn tokenize(body: &str) -> TokenizeOutcome {
    let stripped = strip_guard(body);
    if stripped.starts_with('<') {
        return tokenize_html(stripped);
    }
    tokenize_text(stripped)
}

fn tokenize_text(text: &str) -> TokenizeOutcome {
    let mut out = TokenizeOutcome::default();

    // Single pretty-printed document
    if let Ok(value) = serde_json::from_str::<Value>(text) {
        out.values.push(value);
        return out;
    }

    for line in text.lines() {
        let line = strip_guard(line).trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<Value>(line) {
            Ok(value) => out.values.push(value),
            Err(e) => {
                tracing::trace!("skipping unparseable fragment: {e}");
                out.parse_failures += 1;
            }
        }
    }
    out
}

fn tokenize_html(html: &str) -> TokenizeOutcome {
    let mut out = TokenizeOutcome::default();
    let document = Html::parse_document(html);
    let Ok(sel) = Selector::parse(
        r#"script[type="application/json"], script[type="application/ld+json"]"#,
    ) else {
        return out;
    };

    for element in document.select(&sel) {
        let text: String = element.text().collect();
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let inner = tokenize_text(strip_guard(text));
        out.values.extend(inner.values);
        out.parse_failures += inner.parse_failures;
    }
    out
}
