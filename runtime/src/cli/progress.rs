//! Line-oriented event printer for the terminal.

use tokio::sync::broadcast::{self, error::RecvError};

use crate::events::{HarvestEvent, ProgressStep};

/// Print events to stderr until the bus closes.
pub async fn print_events(mut rx: broadcast::Receiver<HarvestEvent>) {
    loop {
        match rx.recv().await {
            Ok(event) => {
                if let Some(line) = format_event(&event) {
                    eprintln!("{line}");
                }
            }
            Err(RecvError::Lagged(n)) => eprintln!("  ({n} events skipped)"),
            Err(RecvError::Closed) => break,
        }
    }
}

/// One display line per event; `None` for events the printer skips.
pub fn format_event(event: &HarvestEvent) -> Option<String> {
    match event {
        HarvestEvent::PhaseChanged { to, .. } => Some(format!("[{to}]")),
        HarvestEvent::Progress { progress, snapshot } => match progress {
            ProgressStep::Scan { iteration, stalls } => Some(format!(
                "  poll {iteration}: {} found, {stalls} idle",
                snapshot.counts.captured
            )),
            ProgressStep::Enrich { done, total } => Some(format!(
                "  enrich {done}/{total} ({} failed)",
                snapshot.counts.enrich_failures
            )),
            ProgressStep::Save { done, total } => Some(format!(
                "  save {done}/{total} ({} failed)",
                snapshot.counts.save_failures
            )),
        },
        HarvestEvent::Log { error: true, message, .. } => Some(format!("  ! {message}")),
        HarvestEvent::Log { message, .. } if message.starts_with("Found: ") => None,
        HarvestEvent::Log { message, .. } => Some(format!("  {message}")),
        HarvestEvent::Finished { .. } => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use marketsweep::{HarvestPhase, HarvestSession};

    #[test]
    fn test_format_event() {
        let snapshot = HarvestSession::new().snapshot();
        let phase = HarvestEvent::PhaseChanged {
            from: HarvestPhase::Idle,
            to: HarvestPhase::Scanning,
            snapshot: snapshot.clone(),
        };
        assert_eq!(format_event(&phase).as_deref(), Some("[scanning]"));

        let save = HarvestEvent::Progress {
            progress: ProgressStep::Save { done: 2, total: 5 },
            snapshot: snapshot.clone(),
        };
        assert_eq!(format_event(&save).as_deref(), Some("  save 2/5 (0 failed)"));

        let err = HarvestEvent::Log {
            error: true,
            message: "Save 123 failed".into(),
            snapshot: snapshot.clone(),
        };
        assert_eq!(format_event(&err).as_deref(), Some("  ! Save 123 failed"));

        let found = HarvestEvent::Log {
            error: false,
            message: "Found: Lamp".into(),
            snapshot,
        };
        assert!(format_event(&found).is_none());
    }
}
