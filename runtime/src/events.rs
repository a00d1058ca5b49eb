// Copyright 2026 Marketsweep Contributors
// SPDX-License-Identifier: MIT

//! Harvest event bus.
//!
//! The EventBus is a `tokio::sync::broadcast` channel that carries
//! [`HarvestEvent`] values. The presentation layer (the CLI progress
//! printer, a dashboard, a log shipper) subscribes independently. When no
//! subscribers exist, events are silently dropped.

use marketsweep::{HarvestPhase, SessionSnapshot};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::summary::HarvestSummary;

/// Per-step progress within a phase.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum ProgressStep {
    Scan { iteration: u32, stalls: u32 },
    Enrich { done: usize, total: usize },
    Save { done: usize, total: usize },
}

/// Every event a harvest emits.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum HarvestEvent {
    /// The session moved to a new phase.
    PhaseChanged {
        from: HarvestPhase,
        to: HarvestPhase,
        snapshot: SessionSnapshot,
    },
    /// One scan poll, detail fetch or upload finished.
    Progress {
        progress: ProgressStep,
        snapshot: SessionSnapshot,
    },
    /// An activity or error log line was written.
    Log {
        error: bool,
        message: String,
        snapshot: SessionSnapshot,
    },
    /// The cycle ended (complete or error) and was summarized.
    Finished { summary: HarvestSummary },
}

/// The central event bus.
#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<HarvestEvent>,
}

impl EventBus {
    /// Create a new event bus with the given buffer capacity.
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Emit an event to all subscribers. Silently ignores if no subscribers.
    pub fn emit(&self, event: HarvestEvent) {
        let _ = self.sender.send(event);
    }

    /// Subscribe to receive all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<HarvestEvent> {
        self.sender.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
