//! Deep image locator.
//!
//! Tier one probes the known gallery and single-photo fields on the entity
//! and up to two relation hops below it. Only when that finds nothing does
//! tier two walk the whole entity subtree looking for URL-ish keys. Every
//! candidate must pass [`is_valid_image_url`].

use std::collections::HashSet;

use serde_json::Value;
use url::Url;

use crate::types::ExtractOptions;
use crate::validate::RELATION_KEYS;

const GALLERY_FIELDS: &[&str] = &[
    "listing_photos",
    "all_listing_photos",
    "photos",
    "images",
    "media",
];

const SINGLE_PHOTO_FIELDS: &[&str] = &[
    "primary_listing_photo",
    "primary_photo",
    "cover_photo",
    "image",
    "photo",
];

const URL_KEYS: &[&str] = &[
    "uri",
    "url",
    "src",
    "image",
    "photo",
    "image_uri",
    "image_url",
    "photo_url",
];

const IMAGE_EXTENSIONS: &[&str] = &[".jpg", ".jpeg", ".png", ".webp"];

/// CDN size suffixes for tiny thumbnails (`..._t.jpg`, `..._s.jpg`).
const THUMBNAIL_SUFFIXES: &[&str] = &["_t", "_s", "_q"];

const MAX_RELATION_HOPS: usize = 2;
const MAX_PHOTO_DEPTH: usize = 3;
const MAX_SCAN_DEPTH: usize = 15;

/// Absolute, approved-host, image-extension, non-thumbnail URL check.
pub fn is_valid_image_url(raw: &str, hosts: &[String]) -> bool {
    let Ok(url) = Url::parse(raw) else {
        return false;
    };
    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }
    let Some(host) = url.host_str() else {
        return false;
    };
    let approved = hosts
        .iter()
        .any(|h| host == h.as_str() || host.ends_with(&format!(".{h}")));
    if !approved {
        return false;
    }

    let path = url.path().to_ascii_lowercase();
    let Some(ext) = IMAGE_EXTENSIONS.iter().find(|ext| path.ends_with(*ext)) else {
        return false;
    };
    let stem = &path[..path.len() - ext.len()];
    !THUMBNAIL_SUFFIXES.iter().any(|s| stem.ends_with(s))
}

/// Deduplicating, capped accumulator for accepted image URLs.
struct ImageCollector<'a> {
    options: &'a ExtractOptions,
    seen: HashSet<String>,
    urls: Vec<String>,
}

impl<'a> ImageCollector<'a> {
    fn new(options: &'a ExtractOptions) -> Self {
        Self {
            options,
            seen: HashSet::new(),
            urls: Vec::new(),
        }
    }

    fn full(&self) -> bool {
        self.urls.len() >= self.options.max_images
    }

    fn offer(&mut self, raw: &str) {
        if self.full() {
            return;
        }
        let raw = raw.trim();
        if is_valid_image_url(raw, &self.options.image_hosts) && self.seen.insert(raw.to_string()) {
            self.urls.push(raw.to_string());
        }
    }
}

/// Collect image URLs for a listing node.
pub fn locate_images(node: &Value, options: &ExtractOptions) -> Vec<String> {
    let mut collector = ImageCollector::new(options);
    scan_entity(node, 0, &mut collector);
    if collector.urls.is_empty() {
        deep_scan(node, 0, &mut collector);
    }
    collector.urls
}

fn scan_entity(node: &Value, hops: usize, out: &mut ImageCollector<'_>) {
    let Some(map) = node.as_object() else {
        return;
    };

    for field in GALLERY_FIELDS {
        match map.get(*field) {
            Some(Value::Array(items)) => {
                for item in items {
                    photo_urls(item, 0, out);
                }
            }
            // Connection shape: {"edges": [{"node": {...}}]} or {"nodes": [...]}
            Some(Value::Object(conn)) => {
                for key in ["edges", "nodes"] {
                    if let Some(Value::Array(items)) = conn.get(key) {
                        for item in items {
                            photo_urls(item.get("node").unwrap_or(item), 0, out);
                        }
                    }
                }
            }
            _ => {}
        }
    }
    for field in SINGLE_PHOTO_FIELDS {
        if let Some(value) = map.get(*field) {
            photo_urls(value, 0, out);
        }
    }

    if hops < MAX_RELATION_HOPS {
        for rel in RELATION_KEYS {
            if let Some(inner) = map.get(*rel) {
                scan_entity(inner, hops + 1, out);
            }
        }
    }
}

/// URLs from a photo value: a bare string or an object holding one a few
/// levels down (`{"image": {"uri": ...}}`).
fn photo_urls(value: &Value, depth: usize, out: &mut ImageCollector<'_>) {
    if depth > MAX_PHOTO_DEPTH || out.full() {
        return;
    }
    match value {
        Value::String(s) => out.offer(s),
        Value::Object(map) => {
            for key in URL_KEYS {
                if let Some(inner) = map.get(*key) {
                    photo_urls(inner, depth + 1, out);
                }
            }
        }
        _ => {}
    }
}

fn deep_scan(value: &Value, depth: usize, out: &mut ImageCollector<'_>) {
    if depth > MAX_SCAN_DEPTH || out.full() {
        return;
    }
    match value {
        Value::Object(map) => {
            for (key, inner) in map {
                if let Value::String(s) = inner {
                    if URL_KEYS.contains(&key.as_str()) {
                        out.offer(s);
                    }
                } else {
                    deep_scan(inner, depth + 1, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                deep_scan(item, depth + 1, out);
            }
        }
        _ => {}
    }
}
