// Copyright 2026 Marketsweep Contributors
// SPDX-License-Identifier: MIT

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;

use marketsweep_runtime::cli;
use marketsweep_runtime::config::HarvestConfig;

#[derive(Parser)]
#[command(
    name = "marketsweep",
    about = "Harvest marketplace listings from intercepted API traffic",
    version
)]
struct Cli {
    /// Path to a config file (default: MARKETSWEEP_CONFIG, ./.marketsweep/config.json, ~/.marketsweep/config.json)
    #[arg(short, long, global = true)]
    config: Option<String>,

    /// Log level (trace, debug, info, warn, error). RUST_LOG takes precedence.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    json_logs: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one full harvest: scan, enrich, save
    Harvest {
        /// Persistence scope to upsert under
        #[arg(long)]
        scope: Option<String>,
        /// Page to start scanning from
        #[arg(long)]
        start_url: Option<String>,
        /// Sync endpoint base URL
        #[arg(long)]
        endpoint: Option<String>,
        /// Run Chromium headless
        #[arg(long)]
        headless: bool,
        /// Print listings as JSON lines instead of uploading them
        #[arg(long)]
        dry_run: bool,
        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },
    /// Run a saved response body through the extraction pipeline
    Extract {
        /// File holding the raw response body
        file: PathBuf,
        /// Treat the body as a listing detail view (skips the keyword filter)
        #[arg(long)]
        detail: bool,
    },
    /// Print the effective configuration
    Config,
    /// Show recent harvest summaries
    History {
        /// Number of runs to show
        #[arg(long, default_value_t = 10)]
        limit: usize,
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },
    /// Generate shell completion scripts
    Completions {
        /// Shell type (bash, zsh, fish, powershell)
        shell: Shell,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&cli.log_level));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    if cli.json_logs {
        builder.json().init();
    } else {
        builder.init();
    }

    // Host-facing work is strictly sequential; one thread is enough.
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to start tokio runtime")?;
    let result = runtime.block_on(dispatch(cli));

    if let Err(e) = &result {
        eprintln!("  Error: {e:#}");
        std::process::exit(1);
    }
    result
}

async fn dispatch(cli: Cli) -> Result<()> {
    if let Commands::Completions { shell } = cli.command {
        let mut cmd = Cli::command();
        clap_complete::generate(shell, &mut cmd, "marketsweep", &mut std::io::stdout());
        return Ok(());
    }

    let (mut config, source) = HarvestConfig::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Harvest {
            scope,
            start_url,
            endpoint,
            headless,
            dry_run,
            quiet,
        } => {
            if let Some(scope) = scope {
                config.scope = scope;
            }
            if let Some(url) = start_url {
                config.start_url = url;
            }
            if let Some(endpoint) = endpoint {
                config.sync.endpoint = Some(endpoint);
            }
            if headless {
                config.browser.headless = true;
            }
            cli::harvest_cmd::run(config, dry_run, quiet).await
        }
        Commands::Extract { file, detail } => cli::extract_cmd::run(&config, &file, detail).await,
        Commands::Config => cli::config_cmd::run(&config, source.as_deref()).await,
        Commands::History { limit, json } => cli::history_cmd::run(&config, limit, json).await,
        Commands::Completions { .. } => Ok(()),
    }
}
