//! Classify → tokenize → walk, for one intercepted response.

use crate::classify::{tokenize, Classification, Classifier};
use crate::types::{ExtractOptions, InterceptedResponse, Listing};
use crate::walker::{walk_all, WalkStats};

/// Everything learned from one response.
#[derive(Debug)]
pub struct ResponseOutcome {
    pub classification: Classification,
    pub parse_failures: usize,
    pub listings: Vec<Listing>,
    pub walk: WalkStats,
}

/// Run a response through the classifier and, if accepted, the walker.
///
/// Detail-page responses bypass the keyword filter: they were fetched on
/// purpose and their embedded data rarely carries feed keywords early on.
pub fn process_response(
    response: &InterceptedResponse,
    classifier: &Classifier,
    options: &ExtractOptions,
) -> ResponseOutcome {
    let mut classification = classifier.classify(&response.body);
    if response.detail {
        classification.accepted = true;
    }

    if !classification.accepted {
        return ResponseOutcome {
            classification,
            parse_failures: 0,
            listings: Vec::new(),
            walk: WalkStats::default(),
        };
    }

    let tokens = tokenize(&response.body);
    let walked = walk_all(&tokens.values, options);
    tracing::debug!(
        url = %response.url,
        values = tokens.values.len(),
        parse_failures = tokens.parse_failures,
        listings = walked.listings.len(),
        "processed intercepted response"
    );

    ResponseOutcome {
        classification,
        parse_failures: tokens.parse_failures,
        listings: walked.listings,
        walk: walked.stats,
    }
}
