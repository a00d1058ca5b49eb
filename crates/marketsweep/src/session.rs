//! Harvest session state machine, rolling logs and scan stall tracking.

use std::collections::VecDeque;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{HarvestError, HarvestResult};

/// Activity log capacity.
pub const ACTIVITY_LOG_CAP: usize = 50;
/// Error log capacity.
pub const ERROR_LOG_CAP: usize = 20;

/// Harvest lifecycle phase.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HarvestPhase {
    #[default]
    Idle,
    Scanning,
    Enriching,
    Saving,
    Complete,
    Error,
}

impl HarvestPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            HarvestPhase::Idle => "idle",
            HarvestPhase::Scanning => "scanning",
            HarvestPhase::Enriching => "enriching",
            HarvestPhase::Saving => "saving",
            HarvestPhase::Complete => "complete",
            HarvestPhase::Error => "error",
        }
    }

    /// Whether `self -> next` is a legal transition.
    pub fn can_advance_to(self, next: HarvestPhase) -> bool {
        use HarvestPhase::*;
        matches!(
            (self, next),
            (Idle, Scanning)
                | (Scanning, Enriching)
                | (Enriching, Saving)
                | (Saving, Complete)
                | (Complete, Idle)
                | (Error, Idle)
        ) || (next == Error && !matches!(self, Idle | Complete | Error))
    }
}

impl fmt::Display for HarvestPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One rolling log line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub at: DateTime<Utc>,
    pub message: String,
}

/// Session counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCounts {
    pub captured: usize,
    pub enriched: usize,
    pub enrich_failures: usize,
    pub saved: usize,
    pub save_failures: usize,
}

/// What the presentation layer is told after every step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    pub phase: HarvestPhase,
    pub counts: SessionCounts,
    pub activity: Vec<LogEntry>,
    pub errors: Vec<LogEntry>,
    pub started_at: Option<DateTime<Utc>>,
}

/// Mutable state of one harvest run, owned by the orchestrator.
#[derive(Debug, Default)]
pub struct HarvestSession {
    phase: HarvestPhase,
    pub counts: SessionCounts,
    activity: VecDeque<LogEntry>,
    errors: VecDeque<LogEntry>,
    started_at: Option<DateTime<Utc>>,
}

impl HarvestSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> HarvestPhase {
        self.phase
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    /// Move to `next`, rejecting anything outside the phase ordering.
    ///
    /// Entering `scanning` clears counters and logs; entering `idle` resets
    /// the whole session.
    pub fn advance(&mut self, next: HarvestPhase) -> HarvestResult<()> {
        if !self.phase.can_advance_to(next) {
            return Err(HarvestError::InvalidTransition {
                from: self.phase,
                to: next,
            });
        }
        match next {
            HarvestPhase::Scanning => {
                self.counts = SessionCounts::default();
                self.activity.clear();
                self.errors.clear();
                self.started_at = Some(Utc::now());
            }
            HarvestPhase::Idle => {
                *self = Self::default();
            }
            _ => {}
        }
        self.phase = next;
        Ok(())
    }

    /// Push an activity line, newest first.
    pub fn log(&mut self, message: impl Into<String>) {
        push_bounded(&mut self.activity, message.into(), ACTIVITY_LOG_CAP);
    }

    /// Push an error line, newest first.
    pub fn log_error(&mut self, message: impl Into<String>) {
        push_bounded(&mut self.errors, message.into(), ERROR_LOG_CAP);
    }

    pub fn activity(&self) -> impl Iterator<Item = &LogEntry> {
        self.activity.iter()
    }

    pub fn errors(&self) -> impl Iterator<Item = &LogEntry> {
        self.errors.iter()
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            phase: self.phase,
            counts: self.counts,
            activity: self.activity.iter().cloned().collect(),
            errors: self.errors.iter().cloned().collect(),
            started_at: self.started_at,
        }
    }
}

fn push_bounded(log: &mut VecDeque<LogEntry>, message: String, cap: usize) {
    log.push_front(LogEntry {
        at: Utc::now(),
        message,
    });
    log.truncate(cap);
}

/// Whether the captured count grew since the previous poll.
pub fn grew(previous: usize, current: usize) -> bool {
    current > previous
}

/// Scan loop tuning.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanLimits {
    /// Consecutive no-growth polls that end the scan.
    pub stall_threshold: u32,
    /// Stall counts at which a "load more" recovery is attempted.
    pub recovery_milestones: Vec<u32>,
    /// Hard cap on poll cycles.
    pub max_iterations: u32,
}

impl Default for ScanLimits {
    fn default() -> Self {
        Self {
            stall_threshold: 5,
            recovery_milestones: vec![2, 4],
            max_iterations: 150,
        }
    }
}

/// What the scan loop should do after a poll.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanStep {
    /// Keep scrolling.
    Continue,
    /// No growth for a milestone number of polls; try to provoke more data.
    Recover,
    /// Stall threshold reached.
    Exhausted,
    /// Iteration cap reached.
    IterationCap,
}

impl ScanStep {
    pub fn is_done(self) -> bool {
        matches!(self, ScanStep::Exhausted | ScanStep::IterationCap)
    }
}

/// Pure stall counter for the scan loop.
#[derive(Debug, Clone)]
pub struct ScanTracker {
    limits: ScanLimits,
    last_count: usize,
    stalls: u32,
    iterations: u32,
}

impl ScanTracker {
    /// Start tracking from the count observed after the initial drain.
    pub fn new(limits: ScanLimits, baseline: usize) -> Self {
        Self {
            limits,
            last_count: baseline,
            stalls: 0,
            iterations: 0,
        }
    }

    pub fn stalls(&self) -> u32 {
        self.stalls
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }

    /// Feed the captured count after one poll cycle.
    pub fn observe(&mut self, count: usize) -> ScanStep {
        self.iterations += 1;
        if grew(self.last_count, count) {
            self.stalls = 0;
        } else {
            self.stalls += 1;
        }
        self.last_count = self.last_count.max(count);

        if self.stalls >= self.limits.stall_threshold {
            ScanStep::Exhausted
        } else if self.iterations >= self.limits.max_iterations {
            ScanStep::IterationCap
        } else if self.stalls > 0 && self.limits.recovery_milestones.contains(&self.stalls) {
            ScanStep::Recover
        } else {
            ScanStep::Continue
        }
    }
}
