mod app;
mod commands;
mod render;

use anyhow::Result;
use clap::{Parser, Subcommand};
use smartdesk_core::DateRange;

use crate::app::App;

#[derive(Parser)]
#[command(name = "smartdesk")]
#[command(about = "Your combined Smart Desk calendar, and sync for your Smart Desk data")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print local, Google and ICS events for a window
    Events {
        /// Show events from this date (YYYY-MM-DD)
        #[arg(long)]
        from: Option<String>,

        /// Show events until this date, inclusive (YYYY-MM-DD)
        #[arg(long)]
        to: Option<String>,

        /// Only show what is cached on disk, without fetching
        #[arg(long)]
        offline: bool,
    },
    /// Push local changes and pull remote ones for the features of a route
    Sync {
        /// Route whose features should sync (e.g. "/tasks")
        #[arg(short, long, default_value = "/")]
        route: String,

        /// Keep syncing on each feature's interval until Ctrl-C
        #[arg(short, long)]
        watch: bool,
    },
    /// Remove cached provider events from disk
    ClearCache,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("smartdesk=info".parse()?),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let app = App::load()?;

    match cli.command {
        Commands::Events { from, to, offline } => {
            let range = DateRange::from_args(from.as_deref(), to.as_deref())
                .map_err(|e| anyhow::anyhow!(e))?;
            commands::events::run(&app, range, offline).await
        }
        Commands::Sync { route, watch } => commands::sync::run(&app, &route, watch).await,
        Commands::ClearCache => {
            let removed = app.config.persisted_cache()?.clear()?;
            println!("Removed {} cached file(s)", removed);
            Ok(())
        }
    }
}
