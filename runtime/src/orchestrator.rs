//! Harvest driver: scan → enrich → save against one host page.
//!
//! [`Harvester`] owns every piece of mutable state for a run (session,
//! stores, intercept layer) and mutates it only from its own task, so no
//! locks are involved. Host-facing calls are serialized and separated by
//! the configured delays.

use anyhow::Result;
use chrono::Utc;
use marketsweep::{
    CaptureOutcome, CaptureStore, Command, CommandReply, ExtractOptions, HarvestError,
    HarvestPhase, HarvestResult, HarvestSession, InterceptedResponse, ListingFound, ScanLimits,
    ScanStep, ScanTracker,
};
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::config::{HarvestConfig, TimingSettings};
use crate::events::{EventBus, HarvestEvent, ProgressStep};
use crate::intercept::InterceptLayer;
use crate::page::HostPage;
use crate::summary::HarvestSummary;
use crate::sync::ListingSink;

pub struct Harvester<P, S> {
    page: P,
    sink: S,
    layer: InterceptLayer,
    found_rx: mpsc::UnboundedReceiver<ListingFound>,
    session: HarvestSession,
    store: CaptureStore,
    options: ExtractOptions,
    limits: ScanLimits,
    timing: TimingSettings,
    scope: String,
    start_url: String,
    events: EventBus,
}

impl<P: HostPage, S: ListingSink> Harvester<P, S> {
    pub fn new(config: &HarvestConfig, page: P, sink: S, events: EventBus) -> Self {
        let (layer, found_rx) = InterceptLayer::channel(&config.intercept, config.extract.clone());
        Self {
            page,
            sink,
            layer,
            found_rx,
            session: HarvestSession::new(),
            store: CaptureStore::new(),
            options: config.extract.clone(),
            limits: config.scan.clone(),
            timing: config.timing.clone(),
            scope: config.scope.clone(),
            start_url: config.start_url.clone(),
            events,
        }
    }

    pub fn session(&self) -> &HarvestSession {
        &self.session
    }

    pub fn store(&self) -> &CaptureStore {
        &self.store
    }

    /// Send a command envelope to the intercept layer.
    pub fn command(&mut self, command: Command) -> CommandReply {
        self.layer.handle(command)
    }

    /// Give the page back (e.g. to close the tab).
    pub fn into_page(self) -> P {
        self.page
    }

    /// Run one full cycle from `idle` and return to `idle`.
    ///
    /// Per-item failures are counted; anything else moves the session to
    /// `error`. Either way the cycle is summarized, the cool-down elapses
    /// and the session resets.
    pub async fn run_cycle(&mut self) -> Result<HarvestSummary> {
        self.transition(HarvestPhase::Scanning)?;
        let run_id = Uuid::new_v4().to_string();
        self.store.clear();
        self.layer.reset_stats();
        self.command(Command::ClearSeen);

        if let Err(e) = self.run_phases().await {
            let message = format!("{e:#}");
            tracing::error!(run_id = %run_id, "harvest failed: {message}");
            self.log_error(message);
            if let Err(t) = self.transition(HarvestPhase::Error) {
                tracing::warn!("{t}");
            }
        }

        let summary = self.summarize(run_id);
        self.events.emit(HarvestEvent::Finished {
            summary: summary.clone(),
        });

        tokio::time::sleep(self.timing.cooldown()).await;
        self.transition(HarvestPhase::Idle)?;
        self.store.clear();
        Ok(summary)
    }

    async fn run_phases(&mut self) -> Result<()> {
        self.scan().await?;
        if self.store.captured_count() == 0 {
            return Err(HarvestError::NothingCaptured.into());
        }

        self.transition(HarvestPhase::Enriching)?;
        self.enrich().await;

        self.transition(HarvestPhase::Saving)?;
        self.save().await;

        self.transition(HarvestPhase::Complete)?;
        Ok(())
    }

    async fn scan(&mut self) -> Result<()> {
        let fresh = self.layer.install(&mut self.page).await?;
        self.page.open(&self.start_url).await?;
        self.log(if fresh {
            "Intercept hook installed".to_string()
        } else {
            "Intercept hook already present".to_string()
        });

        tokio::time::sleep(self.timing.poll_interval()).await;
        self.pump().await;
        self.layer.probe(&self.page).await;
        if let CommandReply::Ready { installed: false } = self.command(Command::Ready) {
            self.log_error("Intercept hook missing from page".to_string());
        }

        let mut tracker = ScanTracker::new(self.limits.clone(), self.store.captured_count());
        loop {
            if let Err(e) = self.page.scroll().await {
                self.log_error(format!("Scroll failed: {e:#}"));
            }
            tokio::time::sleep(self.timing.poll_interval()).await;
            self.pump().await;

            let step = tracker.observe(self.store.captured_count());
            self.progress(ProgressStep::Scan {
                iteration: tracker.iterations(),
                stalls: tracker.stalls(),
            });

            match step {
                ScanStep::Continue => {}
                ScanStep::Recover => {
                    self.log(format!(
                        "No new listings for {} polls, trying to load more",
                        tracker.stalls()
                    ));
                    if let Err(e) = self.page.trigger_more().await {
                        self.log_error(format!("Load-more failed: {e:#}"));
                    }
                }
                ScanStep::Exhausted => {
                    self.log(format!(
                        "Scan finished with {} listings after {} polls",
                        self.store.captured_count(),
                        tracker.iterations()
                    ));
                    break;
                }
                ScanStep::IterationCap => {
                    self.log(format!(
                        "Scan stopped at the {}-poll cap with {} listings",
                        tracker.iterations(),
                        self.store.captured_count()
                    ));
                    break;
                }
            }
        }
        Ok(())
    }

    /// Drain the page once and apply every Listing-Found envelope.
    async fn pump(&mut self) -> usize {
        self.layer.poll(&self.page).await;

        let mut inserted = 0;
        while let Ok(found) = self.found_rx.try_recv() {
            let label = found
                .listing
                .title
                .clone()
                .unwrap_or_else(|| found.listing.external_id.clone());
            if self.store.capture(found.listing) == CaptureOutcome::Inserted {
                inserted += 1;
                self.session.counts.captured = self.store.captured_count();
                self.log(format!("Found: {label}"));
            }
        }
        inserted
    }

    async fn enrich(&mut self) {
        let ids = self.store.captured_ids();
        let total = ids.len();
        for (done, id) in ids.iter().enumerate() {
            if done > 0 {
                tokio::time::sleep(self.timing.enrich_delay()).await;
            }
            let result = self.enrich_one(id).await;
            match result {
                Ok(()) => {
                    self.session.counts.enriched = self.store.enriched_count();
                    tracing::debug!(id = %id, "enriched");
                }
                Err(e) => {
                    self.session.counts.enrich_failures += 1;
                    tracing::warn!(id = %id, "enrichment failed: {e:#}");
                    self.log_error(format!("Enrich {id} failed: {e:#}"));
                }
            }
            self.progress(ProgressStep::Enrich {
                done: done + 1,
                total,
            });
        }
        self.log(format!(
            "Enriched {}/{} listings",
            self.store.enriched_count(),
            total
        ));
    }

    async fn enrich_one(&mut self, id: &str) -> Result<()> {
        let url = self.options.listing_url(id);
        let body = self.page.fetch_detail(&url).await?;
        self.layer.ingest(&InterceptedResponse::detail(url, body));

        // Several nodes (e.g. one per embedded script) can resolve to the id;
        // merge them in walk order.
        let mut matched = 0;
        while let Ok(found) = self.found_rx.try_recv() {
            if found.listing.external_id == id {
                self.store.enrich(found.listing);
                matched += 1;
            }
        }
        if matched == 0 {
            return Err(HarvestError::ListingNotFound(id.to_string()).into());
        }
        Ok(())
    }

    async fn save(&mut self) {
        let ids = self.store.captured_ids();
        let total = ids.len();
        for (done, id) in ids.iter().enumerate() {
            if done > 0 {
                tokio::time::sleep(self.timing.save_delay()).await;
            }
            let Some(listing) = self.store.resolved(id) else {
                continue;
            };
            let result = self.sink.upsert(&self.scope, listing).await;
            match result {
                Ok(outcome) if outcome.is_stored() => {
                    self.session.counts.saved += 1;
                }
                Ok(outcome) => {
                    self.session.counts.save_failures += 1;
                    self.log_error(format!("Save {id} rejected: {outcome:?}"));
                }
                Err(e) => {
                    self.session.counts.save_failures += 1;
                    tracing::warn!(id = %id, "save failed: {e:#}");
                    self.log_error(format!("Save {id} failed: {e:#}"));
                }
            }
            self.progress(ProgressStep::Save {
                done: done + 1,
                total,
            });
        }
        self.log(format!(
            "Saved {}/{} listings ({} failed)",
            self.session.counts.saved, total, self.session.counts.save_failures
        ));
    }

    fn transition(&mut self, next: HarvestPhase) -> HarvestResult<()> {
        let from = self.session.phase();
        self.session.advance(next)?;
        tracing::info!(from = %from, to = %next, "phase changed");
        self.events.emit(HarvestEvent::PhaseChanged {
            from,
            to: next,
            snapshot: self.session.snapshot(),
        });
        Ok(())
    }

    fn log(&mut self, message: String) {
        tracing::debug!("{message}");
        self.session.log(message.clone());
        self.events.emit(HarvestEvent::Log {
            error: false,
            message,
            snapshot: self.session.snapshot(),
        });
    }

    fn log_error(&mut self, message: String) {
        self.session.log_error(message.clone());
        self.events.emit(HarvestEvent::Log {
            error: true,
            message,
            snapshot: self.session.snapshot(),
        });
    }

    fn progress(&self, progress: ProgressStep) {
        self.events.emit(HarvestEvent::Progress {
            progress,
            snapshot: self.session.snapshot(),
        });
    }

    fn summarize(&mut self, run_id: String) -> HarvestSummary {
        let intercept = match self.command(Command::Stats) {
            CommandReply::Stats { stats } => stats,
            _ => self.layer.stats(),
        };
        HarvestSummary {
            run_id,
            scope: self.scope.clone(),
            started_at: self.session.started_at(),
            finished_at: Utc::now(),
            phase: self.session.phase(),
            counts: self.session.counts,
            intercept,
            last_error: self.session.errors().next().map(|e| e.message.clone()),
        }
    }
}
