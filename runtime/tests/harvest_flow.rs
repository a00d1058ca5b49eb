//! End-to-end harvest cycles against a scripted host page.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Mutex;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use marketsweep::{HarvestPhase, InterceptedResponse, Listing, ListingStatus, ScanLimits};
use marketsweep_runtime::config::{HarvestConfig, TimingSettings};
use marketsweep_runtime::events::{EventBus, HarvestEvent};
use marketsweep_runtime::orchestrator::Harvester;
use marketsweep_runtime::page::{DrainBatch, HostPage};
use marketsweep_runtime::sync::{ListingSink, SyncOutcome};
use serde_json::json;

const FEED_URL: &str = "https://www.facebook.com/api/graphql/";

fn feed(items: &[(&str, &str, usize)]) -> String {
    let edges: Vec<_> = items
        .iter()
        .map(|(id, title, photos)| {
            let photos: Vec<_> = (0..*photos)
                .map(|i| json!({"image": {"uri": format!("https://scontent.fbcdn.net/{id}_{i}_n.jpg")}}))
                .collect();
            json!({"node": {"listing": {
                "id": id,
                "__typename": "GroupCommerceProductItem",
                "marketplace_listing_title": title,
                "listing_price": {"amount": "25"},
                "listing_photos": photos
            }}})
        })
        .collect();
    let body = json!({"data": {"marketplace_search": {"feed_units": {"edges": edges}}}});
    format!("for (;;);{body}")
}

fn detail_page(id: &str, description: &str, photos: usize, sold: bool) -> String {
    let photos: Vec<_> = (0..photos)
        .map(|i| json!({"image": {"uri": format!("https://scontent.fbcdn.net/{id}_d{i}_n.jpg")}}))
        .collect();
    let data = json!({"target": {
        "id": id,
        "__typename": "GroupCommerceProductItem",
        "marketplace_listing_title": "Detailed title",
        "redacted_description": {"text": description},
        "listing_photos": photos,
        "is_sold": sold
    }});
    format!(
        "<!DOCTYPE html><html><head></head><body>\
         <script type=\"application/json\">{data}</script></body></html>"
    )
}

fn detail_url(id: &str) -> String {
    format!("https://www.facebook.com/marketplace/item/{id}/")
}

#[derive(Default)]
struct ScriptedPage {
    batches: Mutex<VecDeque<Vec<InterceptedResponse>>>,
    details: HashMap<String, String>,
    /// Emit one new listing on every drain.
    endless: bool,
    fail_open: bool,
    hook_missing: bool,
    drains: Mutex<usize>,
    load_more_calls: Mutex<usize>,
}

impl ScriptedPage {
    fn with_batches(batches: Vec<Vec<String>>) -> Self {
        let batches = batches
            .into_iter()
            .map(|bodies| {
                bodies
                    .into_iter()
                    .map(|b| InterceptedResponse::new(FEED_URL, b))
                    .collect()
            })
            .collect();
        Self {
            batches: Mutex::new(batches),
            ..Self::default()
        }
    }

    fn detail(mut self, id: &str, body: String) -> Self {
        self.details.insert(detail_url(id), body);
        self
    }
}

#[async_trait]
impl HostPage for ScriptedPage {
    async fn open(&mut self, url: &str) -> Result<()> {
        if self.fail_open {
            return Err(anyhow!("net::ERR_NAME_NOT_RESOLVED at {url}"));
        }
        Ok(())
    }

    async fn install_hook(&mut self, script: &str) -> Result<bool> {
        assert!(script.contains("__marketsweepHook"));
        Ok(true)
    }

    async fn hook_installed(&self) -> Result<bool> {
        Ok(!self.hook_missing)
    }

    async fn drain(&self) -> Result<DrainBatch> {
        let mut drains = self.drains.lock().unwrap();
        *drains += 1;
        let items = if self.endless {
            let id = format!("{}", 70_000_000 + *drains);
            vec![InterceptedResponse::new(FEED_URL, feed(&[(id.as_str(), "Endless", 1)]))]
        } else {
            self.batches.lock().unwrap().pop_front().unwrap_or_default()
        };
        Ok(DrainBatch {
            installed: true,
            items,
            errors: 0,
            dropped: 0,
        })
    }

    async fn scroll(&self) -> Result<()> {
        Ok(())
    }

    async fn trigger_more(&self) -> Result<bool> {
        *self.load_more_calls.lock().unwrap() += 1;
        Ok(false)
    }

    async fn fetch_detail(&self, url: &str) -> Result<String> {
        self.details
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("detail fetch failed: {url}"))
    }
}

#[derive(Default)]
struct RecordingSink {
    saved: Mutex<Vec<Listing>>,
    reject: HashSet<String>,
}

#[async_trait]
impl ListingSink for RecordingSink {
    async fn upsert(&self, scope: &str, listing: &Listing) -> Result<SyncOutcome> {
        assert_eq!(scope, "test-scope");
        if self.reject.contains(&listing.external_id) {
            return Ok(SyncOutcome::Rejected { status: 422 });
        }
        self.saved.lock().unwrap().push(listing.clone());
        Ok(SyncOutcome::Stored { status: 200 })
    }
}

fn config() -> HarvestConfig {
    HarvestConfig {
        scope: "test-scope".to_string(),
        timing: TimingSettings::immediate(),
        scan: ScanLimits {
            stall_threshold: 3,
            recovery_milestones: vec![2],
            max_iterations: 20,
        },
        ..HarvestConfig::default()
    }
}

fn phases(rx: &mut tokio::sync::broadcast::Receiver<HarvestEvent>) -> Vec<HarvestPhase> {
    let mut out = Vec::new();
    while let Ok(event) = rx.try_recv() {
        if let HarvestEvent::PhaseChanged { to, .. } = event {
            out.push(to);
        }
    }
    out
}

#[tokio::test]
async fn test_full_cycle_walks_every_phase_in_order() {
    let page = ScriptedPage::with_batches(vec![vec![feed(&[
        ("10000001", "Lamp", 1),
        ("10000002", "Chair", 2),
    ])]])
    .detail("10000001", detail_page("10000001", "Brass lamp, works", 1, true));
    let events = EventBus::new(4096);
    let mut rx = events.subscribe();
    let mut harvester = Harvester::new(&config(), page, RecordingSink::default(), events);

    let summary = harvester.run_cycle().await.unwrap();

    assert_eq!(summary.phase, HarvestPhase::Complete);
    assert_eq!(summary.counts.captured, 2);
    assert_eq!(summary.counts.enriched, 1);
    assert_eq!(summary.counts.enrich_failures, 1);
    assert_eq!(summary.counts.saved, 2);
    assert_eq!(summary.counts.save_failures, 0);
    assert!(summary.last_error.unwrap().contains("10000002"));
    assert_eq!(
        phases(&mut rx),
        vec![
            HarvestPhase::Scanning,
            HarvestPhase::Enriching,
            HarvestPhase::Saving,
            HarvestPhase::Complete,
            HarvestPhase::Idle,
        ]
    );
    assert_eq!(harvester.session().phase(), HarvestPhase::Idle);
    assert_eq!(harvester.store().captured_count(), 0);
}

#[tokio::test]
async fn test_saved_listing_reflects_merge_rules() {
    let sink = std::sync::Arc::new(RecordingSink::default());
    let page = ScriptedPage::with_batches(vec![vec![feed(&[("10000001", "Lamp", 3)])]])
        .detail("10000001", detail_page("10000001", "Brass lamp", 1, true));
    let mut harvester = Harvester::new(&config(), page, SharedSink(sink.clone()), EventBus::new(4096));

    let summary = harvester.run_cycle().await.unwrap();
    assert_eq!(summary.counts.enriched, 1);

    let saved = sink.saved.lock().unwrap();
    assert_eq!(saved.len(), 1);
    let listing = &saved[0];
    assert!(listing.is_enriched);
    assert_eq!(listing.images.len(), 3);
    assert_eq!(listing.title.as_deref(), Some("Detailed title"));
    assert_eq!(listing.description.as_deref(), Some("Brass lamp"));
    assert_eq!(listing.price, Some(25.0));
    assert_eq!(listing.status, ListingStatus::Sold);
}

struct SharedSink(std::sync::Arc<RecordingSink>);

#[async_trait]
impl ListingSink for SharedSink {
    async fn upsert(&self, scope: &str, listing: &Listing) -> Result<SyncOutcome> {
        self.0.upsert(scope, listing).await
    }
}

#[tokio::test]
async fn test_repeated_responses_do_not_grow_capture_count() {
    let body = feed(&[("10000001", "Lamp", 1), ("10000002", "Chair", 1)]);
    let page = ScriptedPage::with_batches(vec![
        vec![body.clone(), body.clone()],
        vec![body.clone()],
        vec![body],
    ]);
    let mut harvester = Harvester::new(&config(), page, RecordingSink::default(), EventBus::new(4096));

    let summary = harvester.run_cycle().await.unwrap();

    assert_eq!(summary.counts.captured, 2);
    assert!(summary.intercept.duplicates_suppressed > 0);
    assert_eq!(summary.intercept.responses_seen, 4);
}

#[tokio::test]
async fn test_nothing_captured_ends_in_error() {
    let page = ScriptedPage::with_batches(Vec::new());
    let events = EventBus::new(4096);
    let mut rx = events.subscribe();
    let mut harvester = Harvester::new(&config(), page, RecordingSink::default(), events);

    let summary = harvester.run_cycle().await.unwrap();

    assert_eq!(summary.phase, HarvestPhase::Error);
    assert!(!summary.succeeded());
    assert!(summary
        .last_error
        .unwrap()
        .contains("without capturing any listings"));
    assert_eq!(
        phases(&mut rx),
        vec![HarvestPhase::Scanning, HarvestPhase::Error, HarvestPhase::Idle]
    );
}

#[tokio::test]
async fn test_stalls_trigger_load_more_at_milestones() {
    let page = ScriptedPage::with_batches(vec![vec![feed(&[("10000001", "Lamp", 1)])]]);
    let mut harvester = Harvester::new(&config(), page, RecordingSink::default(), EventBus::new(4096));

    harvester.run_cycle().await.unwrap();

    let page = harvester.into_page();
    // Initial drain + 3 stalled polls.
    assert_eq!(*page.drains.lock().unwrap(), 4);
    assert_eq!(*page.load_more_calls.lock().unwrap(), 1);
}

#[tokio::test]
async fn test_iteration_cap_stops_an_endless_feed() {
    let page = ScriptedPage {
        endless: true,
        ..ScriptedPage::default()
    };
    let mut cfg = config();
    cfg.scan.max_iterations = 6;
    let mut harvester = Harvester::new(&cfg, page, RecordingSink::default(), EventBus::new(4096));

    let summary = harvester.run_cycle().await.unwrap();

    assert_eq!(summary.phase, HarvestPhase::Complete);
    // Initial drain plus six polls, one new listing each.
    assert_eq!(summary.counts.captured, 7);
    assert_eq!(summary.counts.enrich_failures, 7);
    assert_eq!(summary.counts.saved, 7);
}

#[tokio::test]
async fn test_save_failures_are_counted_not_fatal() {
    let page = ScriptedPage::with_batches(vec![vec![feed(&[
        ("10000001", "Lamp", 1),
        ("10000002", "Chair", 1),
        ("10000003", "Desk", 1),
    ])]]);
    let sink = RecordingSink {
        reject: HashSet::from(["10000002".to_string()]),
        ..RecordingSink::default()
    };
    let mut harvester = Harvester::new(&config(), page, sink, EventBus::new(4096));

    let summary = harvester.run_cycle().await.unwrap();

    assert_eq!(summary.phase, HarvestPhase::Complete);
    assert_eq!(summary.counts.saved, 2);
    assert_eq!(summary.counts.save_failures, 1);
}

#[tokio::test]
async fn test_open_failure_moves_to_error() {
    let page = ScriptedPage {
        fail_open: true,
        ..ScriptedPage::default()
    };
    let mut harvester = Harvester::new(&config(), page, RecordingSink::default(), EventBus::new(4096));

    let summary = harvester.run_cycle().await.unwrap();

    assert_eq!(summary.phase, HarvestPhase::Error);
    assert!(summary.last_error.unwrap().contains("ERR_NAME_NOT_RESOLVED"));
    assert_eq!(harvester.session().phase(), HarvestPhase::Idle);
}

#[tokio::test]
async fn test_cycle_can_run_again_after_reset() {
    let body = feed(&[("10000001", "Lamp", 1)]);
    let page = ScriptedPage::with_batches(vec![vec![body.clone()], vec![], vec![], vec![], vec![body]]);
    let mut harvester = Harvester::new(&config(), page, RecordingSink::default(), EventBus::new(4096));

    let first = harvester.run_cycle().await.unwrap();
    let second = harvester.run_cycle().await.unwrap();

    assert_eq!(first.counts.captured, 1);
    // The seen set was cleared, so the same listing is captured again.
    assert_eq!(second.counts.captured, 1);
    assert_ne!(first.run_id, second.run_id);
}

#[tokio::test]
async fn test_detail_without_requested_id_saves_captured_record() {
    let page = ScriptedPage::with_batches(vec![vec![feed(&[("10000001", "Lamp", 2)])]])
        .detail("10000001", detail_page("10000009", "Someone else's lamp", 4, true));
    let sink = std::sync::Arc::new(RecordingSink::default());
    let events = EventBus::new(4096);
    let mut rx = events.subscribe();
    let mut harvester = Harvester::new(&config(), page, SharedSink(sink.clone()), events);

    let summary = harvester.run_cycle().await.unwrap();

    assert_eq!(summary.phase, HarvestPhase::Complete);
    assert_eq!(summary.counts.enriched, 0);
    assert_eq!(summary.counts.enrich_failures, 1);
    assert_eq!(summary.counts.saved, 1);
    assert!(summary.last_error.unwrap().contains("Listing not found: 10000001"));

    let saved = sink.saved.lock().unwrap();
    let listing = &saved[0];
    assert_eq!(listing.external_id, "10000001");
    assert!(!listing.is_enriched);
    assert_eq!(listing.title.as_deref(), Some("Lamp"));
    assert_eq!(listing.images.len(), 2);
    assert_eq!(listing.status, ListingStatus::Active);
    drop(saved);

    let mismatch_logged = std::iter::from_fn(|| rx.try_recv().ok()).any(|event| {
        matches!(event, HarvestEvent::Log { error: true, ref message, .. }
            if message.starts_with("Enrich 10000001 failed"))
    });
    assert!(mismatch_logged);
}

#[tokio::test]
async fn test_missing_hook_is_logged_as_error() {
    let page = ScriptedPage {
        hook_missing: true,
        ..ScriptedPage::with_batches(vec![vec![feed(&[("10000001", "Lamp", 1)])]])
    };
    let events = EventBus::new(4096);
    let mut rx = events.subscribe();
    let mut harvester = Harvester::new(&config(), page, RecordingSink::default(), events);

    let summary = harvester.run_cycle().await.unwrap();

    assert_eq!(summary.counts.captured, 1);
    let hook_error = std::iter::from_fn(|| rx.try_recv().ok()).any(|event| {
        matches!(event, HarvestEvent::Log { error: true, ref message, .. }
            if message == "Intercept hook missing from page")
    });
    assert!(hook_error);
}
