//! Envelopes for the two channels between the intercept layer and the
//! orchestrator.
//!
//! Listing-Found flows intercept → orchestrator; Command flows the other
//! way and is answered with a [`CommandReply`]. Both serialize as
//! internally tagged JSON so they can cross a page/runtime boundary.

use serde::{Deserialize, Serialize};

use crate::types::{CaptureOrigin, Listing};
use crate::walker::WalkStats;

/// A newly discovered listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListingFound {
    pub origin: CaptureOrigin,
    pub listing: Listing,
}

/// Orchestrator → intercept layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Command {
    /// Is the page hook installed?
    Ready,
    /// Report counters.
    Stats,
    /// Forget which listing ids were already emitted.
    ClearSeen,
}

/// Intercept layer → orchestrator, one per [`Command`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CommandReply {
    Ready { installed: bool },
    Stats { stats: InterceptStats },
    Cleared { count: usize },
}

/// Aggregate counters kept by the intercept layer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterceptStats {
    pub responses_seen: usize,
    pub responses_accepted: usize,
    pub responses_rejected: usize,
    pub parse_failures: usize,
    pub listings_emitted: usize,
    pub duplicates_suppressed: usize,
    /// Failures swallowed inside the page hook.
    pub hook_errors: usize,
    /// Failed attempts to drain the page queue.
    pub drain_failures: usize,
    /// Bodies evicted from a full page queue before they were drained.
    #[serde(default)]
    pub queue_dropped: usize,
    #[serde(default)]
    pub walk: WalkStats,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_wire_shape() {
        let json = serde_json::to_string(&Command::ClearSeen).unwrap();
        assert_eq!(json, r#"{"type":"clear_seen"}"#);
        let parsed: Command = serde_json::from_str(r#"{"type":"stats"}"#).unwrap();
        assert_eq!(parsed, Command::Stats);
    }

    #[test]
    fn test_reply_wire_shape() {
        let reply = CommandReply::Ready { installed: true };
        let json = serde_json::to_value(&reply).unwrap();
        assert_eq!(json["type"], "ready");
        assert_eq!(json["installed"], true);
    }

    #[test]
    fn test_listing_found_tags_origin() {
        let found = ListingFound {
            origin: CaptureOrigin::Detail,
            listing: Listing::new("1234567", "https://example.com/1234567"),
        };
        let json = serde_json::to_value(&found).unwrap();
        assert_eq!(json["origin"], "detail");
        assert_eq!(json["listing"]["external_id"], "1234567");
        assert_eq!(json["listing"]["status"], "active");
    }
}
