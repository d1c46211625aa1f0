use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use owo_colors::OwoColorize;
use smartdesk_core::SmartDeskConfig;
use smartdesk_core::backend::RestBackend;
use smartdesk_core::entity::{Column, EventRecord, FileRecord, IcsCalendar, Location, Note, Tag, Task};
use smartdesk_core::store::{EntityStore, SyncedEntityStore};
use smartdesk_core::sync::{Activation, FeatureEntry, SyncOrchestrator, SyncRegistry, TargetSet};
use tokio::sync::{mpsc, watch};

use crate::app::App;
use crate::render::Render;

/// Every store, keyed by feature.
fn targets(backend: Arc<RestBackend>) -> TargetSet {
    TargetSet::new()
        .with("tasks", Arc::new(SyncedEntityStore::<Task, _>::new(backend.clone())))
        .with("columns", Arc::new(EntityStore::<Column, _>::new(backend.clone())))
        .with("tags", Arc::new(EntityStore::<Tag, _>::new(backend.clone())))
        .with("notes", Arc::new(SyncedEntityStore::<Note, _>::new(backend.clone())))
        .with("locations", Arc::new(EntityStore::<Location, _>::new(backend.clone())))
        .with("ics_calendars", Arc::new(EntityStore::<IcsCalendar, _>::new(backend.clone())))
        .with("events", Arc::new(EntityStore::<EventRecord, _>::new(backend.clone())))
        .with("files", Arc::new(EntityStore::<FileRecord, _>::new(backend)))
}

/// Which features sync on which routes, and how often.
fn features(config: &SmartDeskConfig, targets: Arc<TargetSet>) -> Result<Vec<FeatureEntry>> {
    let table: [(&'static str, Activation, u64); 8] = [
        ("tasks", Activation::routes(&["/", "/tasks"]), 30),
        ("columns", Activation::routes(&["/tasks"]), 120),
        ("tags", Activation::Always, 300),
        ("notes", Activation::routes(&["/notes"]), 60),
        ("locations", Activation::routes(&["/locations"]), 300),
        ("ics_calendars", Activation::routes(&["/calendar", "/settings"]), 300),
        ("events", Activation::routes(&["/", "/calendar"]), 60),
        ("files", Activation::routes(&["/gallery"]), 300),
    ];

    table
        .into_iter()
        .map(|(key, activation, secs)| -> Result<FeatureEntry> {
            let interval = config.sync_interval(key, Duration::from_secs(secs))?;
            Ok(FeatureEntry::from_set(key, activation, interval, targets.clone()))
        })
        .collect()
}

pub async fn run(app: &App, route: &str, keep_running: bool) -> Result<()> {
    let backend = app.require_backend()?;
    let targets = Arc::new(targets(backend));
    let registry = SyncRegistry::build(features(&app.config, targets)?);
    let orchestrator = SyncOrchestrator::new(registry, app.config.sync_settings()?);

    if orchestrator.registry().resolve(route).is_empty() {
        println!("{}", format!("Nothing syncs on {}", route).dimmed());
        return Ok(());
    }

    if !keep_running {
        for report in orchestrator.sync_all(route).await {
            println!("{}", report.render());
        }
        return Ok(());
    }

    println!("Syncing features for {} until Ctrl-C", route.bold());
    let (_route_tx, route_rx) = watch::channel(route.to_string());
    let (_signals_tx, signals_rx) = mpsc::channel(8);
    let shutdown = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::warn!("Could not listen for Ctrl-C: {}", e);
            std::future::pending::<()>().await;
        }
    };
    orchestrator.run(route_rx, signals_rx, shutdown).await;
    Ok(())
}
