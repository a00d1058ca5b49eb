//! `marketsweep harvest` — run one full scan → enrich → save cycle.

use anyhow::{bail, Result};

use crate::cli::progress;
use crate::config::HarvestConfig;
use crate::events::EventBus;
use crate::orchestrator::Harvester;
use crate::page::BrowserPage;
use crate::renderer::chromium::ChromiumRenderer;
use crate::renderer::Renderer;
use crate::summary::{HarvestSummary, SummaryLog};
use crate::sync::{ListingSink, StdoutSink, SyncClient};

/// Run the harvest command.
pub async fn run(config: HarvestConfig, dry_run: bool, quiet: bool) -> Result<()> {
    // Build the sink first so a bad endpoint fails before Chromium launches.
    let summary = if dry_run {
        harvest(&config, StdoutSink, quiet).await?
    } else {
        let sink = SyncClient::new(&config.sync)?;
        harvest(&config, sink, quiet).await?
    };

    let path = config.summary_path();
    match SummaryLog::open(&path).and_then(|mut log| log.append(&summary)) {
        Ok(()) => tracing::debug!(path = %path.display(), "summary recorded"),
        Err(e) => tracing::warn!("could not record summary: {e:#}"),
    }

    print_summary(&summary);
    if !summary.succeeded() {
        bail!(
            "harvest ended in error: {}",
            summary.last_error.as_deref().unwrap_or("unknown failure")
        );
    }
    Ok(())
}

async fn harvest<S: ListingSink>(
    config: &HarvestConfig,
    sink: S,
    quiet: bool,
) -> Result<HarvestSummary> {
    let renderer = ChromiumRenderer::launch(&config.browser).await?;
    let ctx = renderer.new_context().await?;
    let page = BrowserPage::new(ctx, config.timing.navigation_timeout_ms);

    let events = EventBus::default();
    let printer = (!quiet).then(|| tokio::spawn(progress::print_events(events.subscribe())));

    let mut harvester = Harvester::new(config, page, sink, events);
    let result = harvester.run_cycle().await;
    let page = harvester.into_page();
    if let Err(e) = page.close().await {
        tracing::debug!("closing tab: {e:#}");
    }
    renderer.shutdown().await?;

    // The bus is gone with the harvester, so the printer drains and exits.
    if let Some(printer) = printer {
        let _ = printer.await;
    }
    result
}

fn print_summary(summary: &HarvestSummary) {
    let c = &summary.counts;
    eprintln!();
    eprintln!("  Harvest {} ({})", summary.phase, summary.scope);
    eprintln!("  found:    {}", c.captured);
    eprintln!("  enriched: {} ({} failed)", c.enriched, c.enrich_failures);
    eprintln!("  saved:    {} ({} failed)", c.saved, c.save_failures);
    eprintln!(
        "  traffic:  {} responses, {} accepted, {} parse failures",
        summary.intercept.responses_seen,
        summary.intercept.responses_accepted,
        summary.intercept.parse_failures
    );
}
