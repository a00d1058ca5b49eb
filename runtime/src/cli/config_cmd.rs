//! `marketsweep config` — print the effective configuration.

use std::path::Path;

use anyhow::Result;
use serde_json::Value;

use crate::config::HarvestConfig;

/// Run the config command.
pub async fn run(config: &HarvestConfig, source: Option<&Path>) -> Result<()> {
    match source {
        Some(path) => eprintln!("  config: {}", path.display()),
        None => eprintln!("  config: built-in defaults"),
    }
    println!("{}", serde_json::to_string_pretty(&redacted(config)?)?);
    Ok(())
}

/// The config as JSON with the sync token masked.
pub fn redacted(config: &HarvestConfig) -> Result<Value> {
    let mut value = serde_json::to_value(config)?;
    if let Some(token) = value.pointer_mut("/sync/token") {
        if !token.is_null() {
            *token = Value::String("********".to_string());
        }
    }
    Ok(value)
}
