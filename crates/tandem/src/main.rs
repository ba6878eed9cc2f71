// SPDX-FileCopyrightText: 2026 Tandem Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tandem - daily one-on-one pairing with real-time chat.
//!
//! This is the binary entry point for the tandem service.

mod serve;
mod shutdown;

use std::path::PathBuf;

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use tandem_config::TandemConfig;

/// Tandem - daily one-on-one pairing with real-time chat.
#[derive(Parser, Debug)]
#[command(name = "tandem", version, about, long_about = None)]
struct Cli {
    /// Load configuration from this file instead of the standard locations.
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP/WebSocket server, chat hub, and daily scheduler.
    Serve,
    /// Run one batch-matching pass and exit.
    Match,
    /// End today's active sessions, score them, and purge expired markers.
    Cleanup,
    /// Recompute scores for sessions that ended on a given day.
    Score {
        /// Local calendar day (YYYY-MM-DD). Defaults to today.
        #[arg(long)]
        day: Option<NaiveDate>,
    },
    /// Validate the configuration and print the effective values.
    Config,
}

fn load(path: Option<&PathBuf>) -> TandemConfig {
    let loaded = match path {
        Some(path) => tandem_config::load_and_validate_path(path),
        None => tandem_config::load_and_validate(),
    };
    match loaded {
        Ok(config) => config,
        Err(errors) => {
            tandem_config::render_errors(&errors);
            std::process::exit(1);
        }
    }
}

fn fail(command: &str, err: tandem_core::TandemError) -> ! {
    eprintln!("tandem {command}: {err}");
    std::process::exit(1);
}

/// Copy of `config` safe to print.
fn redacted(mut config: TandemConfig) -> TandemConfig {
    if config.server.bearer_token.is_some() {
        config.server.bearer_token = Some("[REDACTED]".into());
    }
    config
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = load(cli.config.as_ref());

    let Some(command) = cli.command else {
        println!("tandem: use --help for available commands");
        return;
    };

    if !matches!(command, Commands::Config) {
        serve::init_tracing(&config.server.log_level);
    }

    match command {
        Commands::Serve => {
            if let Err(e) = serve::run_serve(config).await {
                fail("serve", e);
            }
        }
        Commands::Match => match serve::run_match(config).await {
            Ok(report) => println!(
                "matched {} users into {} sessions ({} lost races, {} failures)",
                report.eligible_users, report.sessions_created, report.lost_races, report.failures
            ),
            Err(e) => fail("match", e),
        },
        Commands::Cleanup => match serve::run_cleanup(config).await {
            Ok(report) => println!(
                "ended {} sessions, purged {} markers",
                report.sessions_ended, report.markers_purged
            ),
            Err(e) => fail("cleanup", e),
        },
        Commands::Score { day } => {
            let day = day.unwrap_or_else(tandem_core::clock::today);
            match serve::run_rescore(config, day).await {
                Ok(count) => println!("rescored {count} sessions ended on {day}"),
                Err(e) => fail("score", e),
            }
        }
        Commands::Config => match toml::to_string_pretty(&redacted(config)) {
            Ok(rendered) => print!("{rendered}"),
            Err(e) => {
                eprintln!("tandem config: {e}");
                std::process::exit(1);
            }
        },
    }
}
