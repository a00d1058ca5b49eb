//! `marketsweep history` — show recent harvest summaries.

use anyhow::Result;

use crate::config::HarvestConfig;
use crate::summary::read_recent;

/// Run the history command.
pub async fn run(config: &HarvestConfig, limit: usize, json: bool) -> Result<()> {
    let summaries = read_recent(&config.summary_path(), limit)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&summaries)?);
        return Ok(());
    }
    if summaries.is_empty() {
        println!("  No harvests recorded yet.");
        return Ok(());
    }
    for s in &summaries {
        println!(
            "  {}  {:<8}  {:<12}  found {:>4}  enriched {:>4}  saved {:>4}  failed {:>3}",
            s.finished_at.format("%Y-%m-%d %H:%M"),
            s.phase.as_str(),
            s.scope,
            s.counts.captured,
            s.counts.enriched,
            s.counts.saved,
            s.counts.enrich_failures + s.counts.save_failures,
        );
    }
    Ok(())
}
