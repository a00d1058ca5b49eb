//! Depth-bounded recursive walk over parsed payloads.
//!
//! The listing entity can sit at any depth depending on which query
//! produced the payload, so the validator runs on every object, not just
//! leaves, and the walk keeps descending below accepted nodes. A node that
//! only wraps a valid listing under a relation key is not emitted itself;
//! the wrapped entity is. Wire JSON is acyclic; depth is the only bound.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::fields::{explain_listing, normalize_listing, FieldReport};
use crate::types::{ExtractOptions, Listing};
use crate::validate::{validate, RejectReason, Verdict, ID_FIELDS, RELATION_KEYS};
use crate::value::scalar_string;

/// Deepest nesting level the walker visits (root is depth 0).
pub const MAX_DEPTH: usize = 15;

/// Subtrees that never hold listings.
const SKIP_KEYS: &[&str] = &["errors", "extensions", "debug_info", "logging", "tracking"];

/// Validator reject tallies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RejectCounts {
    pub missing_id: usize,
    pub short_id: usize,
    pub blocked_id: usize,
    pub weak_signals: usize,
}

impl RejectCounts {
    fn record(&mut self, reason: RejectReason) {
        match reason {
            RejectReason::MissingId => self.missing_id += 1,
            RejectReason::ShortId => self.short_id += 1,
            RejectReason::BlockedIdPrefix => self.blocked_id += 1,
            RejectReason::WeakSignals => self.weak_signals += 1,
        }
    }

    pub fn merge(&mut self, other: &RejectCounts) {
        self.missing_id += other.missing_id;
        self.short_id += other.short_id;
        self.blocked_id += other.blocked_id;
        self.weak_signals += other.weak_signals;
    }
}

/// Counters for one or more walks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalkStats {
    pub nodes_visited: usize,
    pub accepted: usize,
    pub rejected: RejectCounts,
    /// Accepted wrappers skipped in favour of the entity they hold.
    #[serde(default)]
    pub wrappers_skipped: usize,
    /// Containers left unvisited because they sat below `MAX_DEPTH`.
    pub depth_limited: usize,
}

impl WalkStats {
    pub fn merge(&mut self, other: &WalkStats) {
        self.nodes_visited += other.nodes_visited;
        self.accepted += other.accepted;
        self.rejected.merge(&other.rejected);
        self.wrappers_skipped += other.wrappers_skipped;
        self.depth_limited += other.depth_limited;
    }
}

/// Listings found in a payload, in visit order.
#[derive(Debug, Default)]
pub struct WalkOutput {
    pub listings: Vec<Listing>,
    pub stats: WalkStats,
}

/// Which candidate paths produced each field of one accepted node.
#[derive(Debug, Clone, Serialize)]
pub struct ListingSources {
    pub external_id: String,
    #[serde(flatten)]
    pub report: FieldReport,
}

/// Walk one parsed payload and normalize every accepted node.
pub fn walk(root: &Value, options: &ExtractOptions) -> WalkOutput {
    walk_all([root], options)
}

/// Walk several payloads, pooling listings and stats.
pub fn walk_all<'a, I>(values: I, options: &ExtractOptions) -> WalkOutput
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut out = WalkOutput::default();
    let mut listings = Vec::new();
    for value in values {
        visit(value, 0, &mut out.stats, &mut |node: &Value, id: String| {
            listings.push(normalize_listing(node, &id, options));
        });
    }
    out.listings = listings;
    out
}

/// Same walk as [`walk_all`], reporting field sources instead of listings.
pub fn explain_all<'a, I>(values: I) -> Vec<ListingSources>
where
    I: IntoIterator<Item = &'a Value>,
{
    let mut stats = WalkStats::default();
    let mut sources = Vec::new();
    for value in values {
        visit(value, 0, &mut stats, &mut |node: &Value, id: String| {
            sources.push(ListingSources {
                external_id: id,
                report: explain_listing(node),
            });
        });
    }
    sources
}

fn visit<F>(value: &Value, depth: usize, stats: &mut WalkStats, on_accept: &mut F)
where
    F: FnMut(&Value, String),
{
    if depth > MAX_DEPTH {
        stats.depth_limited += 1;
        return;
    }
    match value {
        Value::Object(map) => {
            stats.nodes_visited += 1;
            match validate(value) {
                Verdict::Accept { id } if depth < MAX_DEPTH && wraps_entity(value, &id) => {
                    stats.wrappers_skipped += 1;
                }
                Verdict::Accept { id } => {
                    stats.accepted += 1;
                    on_accept(value, id);
                }
                Verdict::Reject(reason) => stats.rejected.record(reason),
            }
            for (key, child) in map {
                if SKIP_KEYS.contains(&key.as_str()) || !is_container(child) {
                    continue;
                }
                visit(child, depth + 1, stats, on_accept);
            }
        }
        Value::Array(items) => {
            for item in items {
                if is_container(item) {
                    visit(item, depth + 1, stats, on_accept);
                }
            }
        }
        _ => {}
    }
}

/// A node with no id of its own whose relation child is the listing `id`.
/// The child is visited next and carries the full record.
fn wraps_entity(node: &Value, id: &str) -> bool {
    let has_own_id = ID_FIELDS
        .iter()
        .any(|f| node.get(*f).and_then(scalar_string).is_some());
    !has_own_id
        && RELATION_KEYS
            .iter()
            .filter_map(|rel| node.get(*rel))
            .any(|child| matches!(validate(child), Verdict::Accept { id: ref inner } if inner == id))
}

fn is_container(value: &Value) -> bool {
    value.is_object() || value.is_array()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn listing_node(id: &str) -> Value {
        json!({
            "id": id,
            "marketplace_listing_title": "Road bike",
            "listing_price": {"amount": "350"}
        })
    }

    /// Wrap `inner` so that it ends up at exactly `depth`.
    fn nest(inner: Value, depth: usize) -> Value {
        (0..depth).fold(inner, |acc, i| json!({ format!("level{i}"): acc }))
    }

    #[test]
    fn test_finds_node_at_max_depth() {
        let root = nest(listing_node("1234567890"), MAX_DEPTH);
        let out = walk(&root, &ExtractOptions::default());
        assert_eq!(out.listings.len(), 1);
        assert_eq!(out.listings[0].external_id, "1234567890");
    }

    #[test]
    fn test_ignores_node_below_max_depth() {
        let root = nest(listing_node("1234567890"), MAX_DEPTH + 1);
        let out = walk(&root, &ExtractOptions::default());
        assert!(out.listings.is_empty());
        assert_eq!(out.stats.depth_limited, 1);
    }

    #[test]
    fn test_validates_interior_nodes() {
        // The accepted node itself has children; it must not be skipped as a non-leaf.
        let root = json!({
            "data": {"feed": {"edges": [
                {"node": {
                    "id": "5555555555",
                    "__typename": "MarketplaceListing",
                    "seller": {"name": "Sam", "id": "77"},
                    "location": {"reverse_geocode": {"city": "Reno"}}
                }}
            ]}}
        });
        let out = walk(&root, &ExtractOptions::default());
        assert_eq!(out.listings.len(), 1);
        assert_eq!(out.listings[0].location.as_deref(), Some("Reno"));
    }

    #[test]
    fn test_id_follows_candidate_precedence() {
        let root = json!({"data": {"x": {
            "id": "22222222",
            "marketplace_listing_id": "11111111",
            "title": "Desk",
            "price": 20
        }}});
        let out = walk(&root, &ExtractOptions::default());
        assert_eq!(out.listings.len(), 1);
        assert_eq!(out.listings[0].external_id, "11111111");
    }

    #[test]
    fn test_skips_error_subtrees() {
        let root = json!({
            "errors": [listing_node("9999999999")],
            "extensions": {"x": listing_node("8888888888")},
            "data": listing_node("7777777777")
        });
        let out = walk(&root, &ExtractOptions::default());
        let ids: Vec<_> = out.listings.iter().map(|l| l.external_id.as_str()).collect();
        assert_eq!(ids, vec!["7777777777"]);
    }

    #[test]
    fn test_stats_count_rejects() {
        let root = json!({
            "a": {"id": "msg_123456789", "title": "hi", "price": 1},
            "b": {"id": "12"},
            "c": {"foo": "bar"}
        });
        let out = walk(&root, &ExtractOptions::default());
        assert_eq!(out.stats.accepted, 0);
        assert_eq!(out.stats.rejected.blocked_id, 1);
        assert_eq!(out.stats.rejected.short_id, 1);
        // root and "c" have no id
        assert_eq!(out.stats.rejected.missing_id, 2);
        assert_eq!(out.stats.nodes_visited, 4);
    }

    #[test]
    fn test_walk_all_pools_payloads() {
        let a = json!({"n": listing_node("1111111111")});
        let b = json!([listing_node("2222222222")]);
        let out = walk_all([&a, &b], &ExtractOptions::default());
        assert_eq!(out.listings.len(), 2);
        assert_eq!(out.stats.accepted, 2);
    }

    #[test]
    fn test_wrapper_yields_to_wrapped_entity() {
        let root = json!({"edges": [{"node": {"target": {
            "id": "4444444444",
            "__typename": "MarketplaceListing",
            "marketplace_listing_title": "Sofa",
            "listing_price": {"amount": "300"},
            "is_sold": true
        }}}]});
        let out = walk(&root, &ExtractOptions::default());
        assert_eq!(out.listings.len(), 1);
        assert_eq!(out.listings[0].price, Some(300.0));
        assert_eq!(out.stats.wrappers_skipped, 1);
        assert_eq!(out.stats.accepted, 1);
    }

    #[test]
    fn test_wrapper_kept_when_child_is_not_a_listing() {
        // The child alone has one weak signal; only the wrapper sees two.
        let root = json!({
            "primary_listing_photo": {"image": {"uri": "https://scontent.fbcdn.net/a_n.jpg"}},
            "product_item": {"id": "66666666", "title": "Rug"}
        });
        let out = walk(&root, &ExtractOptions::default());
        assert_eq!(out.listings.len(), 1);
        assert_eq!(out.listings[0].external_id, "66666666");
        assert_eq!(out.listings[0].title.as_deref(), Some("Rug"));
        assert_eq!(out.stats.wrappers_skipped, 0);
    }

    #[test]
    fn test_wrapper_at_depth_limit_is_kept() {
        let wrapper = json!({"listing": listing_node("1234567890")});
        let out = walk(&nest(wrapper, MAX_DEPTH), &ExtractOptions::default());
        assert_eq!(out.listings.len(), 1);
        assert_eq!(out.listings[0].price, Some(350.0));
        assert_eq!(out.stats.depth_limited, 1);
    }

    #[test]
    fn test_explain_all_matches_walk() {
        let root = json!({"a": listing_node("1111111111"), "b": {"target": listing_node("2222222222")}});
        let sources = explain_all([&root]);
        let ids: Vec<_> = sources.iter().map(|s| s.external_id.as_str()).collect();
        assert_eq!(ids, vec!["1111111111", "2222222222"]);
        assert!(sources[0]
            .report
            .sources
            .contains(&("price".to_string(), "listing_price".to_string())));
    }
}
