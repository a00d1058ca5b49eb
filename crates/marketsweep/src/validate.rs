//! Heuristic accept/reject gate for candidate listing nodes.
//!
//! The walker calls [`validate`] on every object it visits. Signals are
//! combined in a fixed precedence: an id must exist and look like a
//! listing id, then a type tag can accept outright, and otherwise at least
//! two of {title, price, image} must be present.

use serde::Serialize;
use serde_json::Value;

use crate::value::{at, is_present, scalar_string};

/// Shortest id accepted as a listing id.
pub const MIN_ID_LEN: usize = 5;

/// Direct id fields, in precedence order.
pub const ID_FIELDS: &[&str] = &["marketplace_listing_id", "listing_id", "id"];

/// Keys under which the listing entity is commonly wrapped.
pub const RELATION_KEYS: &[&str] = &[
    "listing",
    "marketplace_listing",
    "target",
    "product_item",
    "for_sale_item",
];

const BLOCKED_ID_PREFIXES: &[&str] = &[
    "msg_",
    "mid.",
    "thread_",
    "notif_",
    "notification_",
    "comment_",
];

const TYPE_TAG_FIELDS: &[&str] = &["__typename", "__isMarketplaceListing", "type", "entity_type"];

const DOMAIN_TYPE_KEYWORDS: &[&str] = &["marketplacelisting", "commerceproductitem", "forsaleitem"];

const TITLE_HINTS: &[&str] = &["marketplace_listing_title", "title", "custom_title", "name"];
const PRICE_HINTS: &[&str] = &["listing_price", "formatted_price", "price", "price_amount"];
const IMAGE_HINTS: &[&str] = &[
    "primary_listing_photo",
    "listing_photos",
    "photos",
    "images",
    "image",
    "photo",
];

/// Why a node was not accepted. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    MissingId,
    ShortId,
    BlockedIdPrefix,
    WeakSignals,
}

/// Validator decision for one node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accept { id: String },
    Reject(RejectReason),
}

impl Verdict {
    pub fn is_accept(&self) -> bool {
        matches!(self, Verdict::Accept { .. })
    }
}

/// Candidate id paths: direct fields first, then each relation key.
pub fn id_candidates() -> impl Iterator<Item = String> {
    ID_FIELDS.iter().map(|f| f.to_string()).chain(
        RELATION_KEYS
            .iter()
            .flat_map(|rel| ID_FIELDS.iter().map(move |f| format!("{rel}.{f}"))),
    )
}

/// First non-empty id candidate on `node`, in precedence order.
pub fn derive_id(node: &Value) -> Option<String> {
    id_candidates().find_map(|path| at(node, &path).and_then(scalar_string))
}

/// Decide whether `node` is a listing and, if so, derive its id.
pub fn validate(node: &Value) -> Verdict {
    if !node.is_object() {
        return Verdict::Reject(RejectReason::MissingId);
    }

    let Some(id) = derive_id(node) else {
        return Verdict::Reject(RejectReason::MissingId);
    };
    if id.chars().count() < MIN_ID_LEN {
        return Verdict::Reject(RejectReason::ShortId);
    }
    if BLOCKED_ID_PREFIXES.iter().any(|p| id.starts_with(p)) {
        return Verdict::Reject(RejectReason::BlockedIdPrefix);
    }

    if has_domain_type_tag(node) {
        return Verdict::Accept { id };
    }

    let signals = [TITLE_HINTS, PRICE_HINTS, IMAGE_HINTS]
        .iter()
        .filter(|hints| has_any(node, hints))
        .count();
    if signals >= 2 {
        Verdict::Accept { id }
    } else {
        Verdict::Reject(RejectReason::WeakSignals)
    }
}

fn has_domain_type_tag(node: &Value) -> bool {
    TYPE_TAG_FIELDS.iter().any(|field| {
        node.get(*field)
            .and_then(Value::as_str)
            .map(|tag| {
                let tag = tag.to_ascii_lowercase();
                DOMAIN_TYPE_KEYWORDS.iter().any(|k| tag.contains(k))
            })
            .unwrap_or(false)
    })
}

/// Whether any hint field is present directly or one relation hop down.
fn has_any(node: &Value, hints: &[&str]) -> bool {
    let direct = hints.iter().any(|h| is_present(node.get(*h)));
    direct
        || RELATION_KEYS.iter().any(|rel| {
            node.get(*rel)
                .map(|inner| hints.iter().any(|h| is_present(inner.get(*h))))
                .unwrap_or(false)
        })
}
