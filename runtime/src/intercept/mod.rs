//! Runtime side of the network intercept layer.
//!
//! The page hook (see [`hook`]) copies response bodies into a page-side
//! queue. [`InterceptLayer`] drains that queue, runs every body through the
//! classifier and walker, and sends one [`ListingFound`] per listing id it
//! has not emitted before. Failures never propagate: they are counted.

pub mod hook;

use std::collections::HashSet;

use marketsweep::{
    process_response, Classifier, Command, CommandReply, ExtractOptions, InterceptStats,
    InterceptedResponse, ListingFound,
};
use tokio::sync::mpsc;

use crate::config::InterceptSettings;
use crate::page::HostPage;

pub struct InterceptLayer {
    classifier: Classifier,
    options: ExtractOptions,
    script: String,
    seen: HashSet<String>,
    stats: InterceptStats,
    /// Last cumulative (errors, dropped) reported by the page hook.
    page_counters: (usize, usize),
    installed: bool,
    found_tx: mpsc::UnboundedSender<ListingFound>,
}

impl InterceptLayer {
    pub fn new(
        settings: &InterceptSettings,
        options: ExtractOptions,
        found_tx: mpsc::UnboundedSender<ListingFound>,
    ) -> Self {
        let classifier =
            Classifier::default().with_keywords(&settings.allow_keywords, &settings.deny_keywords);
        Self {
            classifier,
            options,
            script: hook::hook_script(settings),
            seen: HashSet::new(),
            stats: InterceptStats::default(),
            page_counters: (0, 0),
            installed: false,
            found_tx,
        }
    }

    /// Build a layer plus the receiving end of its Listing-Found channel.
    pub fn channel(
        settings: &InterceptSettings,
        options: ExtractOptions,
    ) -> (Self, mpsc::UnboundedReceiver<ListingFound>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(settings, options, tx), rx)
    }

    /// Install the page hook. `Ok(false)` when it was already installed.
    pub async fn install<P: HostPage + ?Sized>(&mut self, page: &mut P) -> anyhow::Result<bool> {
        let fresh = page.install_hook(&self.script).await?;
        self.installed = true;
        tracing::debug!(fresh, "intercept hook installed");
        Ok(fresh)
    }

    /// Drain the page queue once. Returns the number of listings emitted.
    pub async fn poll<P: HostPage + ?Sized>(&mut self, page: &P) -> usize {
        let batch = match page.drain().await {
            Ok(batch) => batch,
            Err(e) => {
                self.stats.drain_failures += 1;
                tracing::debug!("drain failed: {e:#}");
                return 0;
            }
        };
        self.installed = batch.installed;
        self.record_page_counters(batch.errors, batch.dropped);
        batch.items.iter().map(|resp| self.ingest(resp)).sum()
    }

    /// Ask the page whether the hook is present. Probe failures read as absent.
    pub async fn probe<P: HostPage + ?Sized>(&mut self, page: &P) -> bool {
        self.installed = match page.hook_installed().await {
            Ok(installed) => installed,
            Err(e) => {
                tracing::debug!("hook probe failed: {e:#}");
                false
            }
        };
        self.installed
    }

    /// Fold the hook's cumulative counters into the per-cycle stats.
    ///
    /// A value lower than the last one means the page reloaded and its
    /// counters restarted from zero.
    pub fn record_page_counters(&mut self, errors: usize, dropped: usize) {
        let (last_errors, last_dropped) = self.page_counters;
        let delta = |now: usize, last: usize| if now >= last { now - last } else { now };
        self.stats.hook_errors += delta(errors, last_errors);
        self.stats.queue_dropped += delta(dropped, last_dropped);
        self.page_counters = (errors, dropped);
    }

    /// Process one response body. Returns the number of listings emitted.
    ///
    /// Scan-origin listings are emitted once per id; detail-origin listings
    /// are always emitted since enrichment asks for them explicitly.
    pub fn ingest(&mut self, response: &InterceptedResponse) -> usize {
        self.stats.responses_seen += 1;
        let outcome = process_response(response, &self.classifier, &self.options);
        if !outcome.classification.accepted {
            self.stats.responses_rejected += 1;
            return 0;
        }
        self.stats.responses_accepted += 1;
        self.stats.parse_failures += outcome.parse_failures;
        self.stats.walk.merge(&outcome.walk);

        let origin = response.origin();
        let mut emitted = 0;
        for listing in outcome.listings {
            let first = self.seen.insert(listing.external_id.clone());
            if !first && !response.detail {
                self.stats.duplicates_suppressed += 1;
                continue;
            }
            if self.found_tx.send(ListingFound { origin, listing }).is_err() {
                tracing::debug!("listing channel closed");
                break;
            }
            emitted += 1;
        }
        self.stats.listings_emitted += emitted;
        emitted
    }

    /// Answer a command envelope.
    pub fn handle(&mut self, command: Command) -> CommandReply {
        match command {
            Command::Ready => CommandReply::Ready {
                installed: self.installed,
            },
            Command::Stats => CommandReply::Stats { stats: self.stats },
            Command::ClearSeen => {
                let count = self.seen.len();
                self.seen.clear();
                CommandReply::Cleared { count }
            }
        }
    }

    /// Zero the counters; the seen set is untouched.
    pub fn reset_stats(&mut self) {
        self.stats = InterceptStats::default();
    }

    pub fn stats(&self) -> InterceptStats {
        self.stats
    }
}
