//! CLI subcommand implementations for the marketsweep binary.

pub mod config_cmd;
pub mod extract_cmd;
pub mod harvest_cmd;
pub mod history_cmd;
pub mod progress;
