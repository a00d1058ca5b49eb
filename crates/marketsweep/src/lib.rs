//! Marketsweep — heuristic listing discovery over intercepted JSON traffic.
//!
//! Pure, synchronous building blocks: the response classifier and
//! tokenizer, the recursive walker with its validator and field
//! strategies, the image locator, the capture store and the harvest
//! session state machine. The browser-facing runtime drives them.

pub mod classify;
pub mod fields;
pub mod images;
pub mod messages;
pub mod pipeline;
pub mod session;
pub mod store;
pub mod types;
pub mod validate;
pub mod value;
pub mod walker;

pub use classify::{tokenize, Classification, Classifier};
pub use messages::{Command, CommandReply, InterceptStats, ListingFound};
pub use pipeline::{process_response, ResponseOutcome};
pub use session::{
    HarvestPhase, HarvestSession, ScanLimits, ScanStep, ScanTracker, SessionCounts,
    SessionSnapshot,
};
pub use store::{CaptureOutcome, CaptureStore};
pub use types::*;
pub use validate::{validate, RejectReason, Verdict};
pub use walker::{explain_all, walk, walk_all, ListingSources, WalkOutput, WalkStats};
