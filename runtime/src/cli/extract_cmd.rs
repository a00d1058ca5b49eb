//! `marketsweep extract <file>` — run a saved payload through the pipeline offline.

use std::path::Path;

use anyhow::{Context, Result};
use marketsweep::{explain_all, process_response, tokenize, Classifier, InterceptedResponse};
use serde_json::{json, Value};

use crate::config::HarvestConfig;

/// Run the extract command.
pub async fn run(config: &HarvestConfig, file: &Path, detail: bool) -> Result<()> {
    let body = std::fs::read_to_string(file)
        .with_context(|| format!("failed to read {}", file.display()))?;
    let report = extract_report(config, &file.display().to_string(), &body, detail);
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

/// Classification, walk counters, listings and per-field sources for one body.
pub fn extract_report(config: &HarvestConfig, source: &str, body: &str, detail: bool) -> Value {
    let classifier = Classifier::default().with_keywords(
        &config.intercept.allow_keywords,
        &config.intercept.deny_keywords,
    );
    let response = if detail {
        InterceptedResponse::detail(source, body)
    } else {
        InterceptedResponse::new(source, body)
    };
    let outcome = process_response(&response, &classifier, &config.extract);
    let sources = if outcome.classification.accepted {
        explain_all(&tokenize(body).values)
    } else {
        Vec::new()
    };

    json!({
        "source": source,
        "classification": {
            "accepted": outcome.classification.accepted,
            "allow_hits": outcome.classification.allow_hits,
            "deny_hits": outcome.classification.deny_hits,
        },
        "parse_failures": outcome.parse_failures,
        "walk": outcome.walk,
        "listings": outcome.listings,
        "sources": sources,
    })
}
