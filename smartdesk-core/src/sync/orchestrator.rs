use std::collections::HashMap;
use std::future::Future;
use std::sync::Mutex;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, MissedTickBehavior};

use super::registry::{SyncDescriptor, SyncRegistry};
use crate::store::SyncReport;

/// App lifecycle changes fed to [`SyncOrchestrator::run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleSignal {
    Visible,
    Hidden,
    Online,
    Offline,
    /// Sync everything for the current route right away.
    SyncNow,
}

#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    /// How often due features are checked.
    pub tick_every: Duration,
    /// Coming back after being hidden at least this long triggers a full sync.
    pub stale_after: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            tick_every: Duration::from_secs(15),
            stale_after: Duration::from_secs(5 * 60),
        }
    }
}

/// Scheduler bookkeeping: last run per feature, visibility and connectivity.
#[derive(Debug)]
pub struct SyncContext {
    last_run: HashMap<&'static str, Instant>,
    hidden_since: Option<Instant>,
    online: bool,
}

impl Default for SyncContext {
    fn default() -> Self {
        SyncContext {
            last_run: HashMap::new(),
            hidden_since: None,
            online: true,
        }
    }
}

impl SyncContext {
    pub fn is_due(&self, descriptor: &SyncDescriptor, now: Instant) -> bool {
        match self.last_run.get(descriptor.key) {
            Some(last) => now.duration_since(*last) >= descriptor.interval,
            None => true,
        }
    }

    pub fn mark_ran(&mut self, key: &'static str, now: Instant) {
        self.last_run.insert(key, now);
    }

    pub fn hide(&mut self, now: Instant) {
        self.hidden_since.get_or_insert(now);
    }

    /// How long the app was hidden, if it was.
    pub fn show(&mut self, now: Instant) -> Option<Duration> {
        self.hidden_since.take().map(|since| now.duration_since(since))
    }

    /// Record connectivity. True when this call brought us back online.
    pub fn set_online(&mut self, online: bool) -> bool {
        let regained = online && !self.online;
        self.online = online;
        regained
    }

    pub fn is_online(&self) -> bool {
        self.online
    }
}

pub struct SyncOrchestrator {
    registry: SyncRegistry,
    settings: SyncSettings,
    context: Mutex<SyncContext>,
}

impl SyncOrchestrator {
    pub fn new(registry: SyncRegistry, settings: SyncSettings) -> Self {
        SyncOrchestrator {
            registry,
            settings,
            context: Mutex::new(SyncContext::default()),
        }
    }

    pub fn registry(&self) -> &SyncRegistry {
        &self.registry
    }

    /// Run the features for `pathname` whose interval has elapsed.
    pub async fn tick(&self, pathname: &str) -> Vec<SyncReport> {
        let due: Vec<SyncDescriptor> = {
            let mut ctx = self.context();
            if !ctx.is_online() {
                return Vec::new();
            }
            let now = Instant::now();
            let due: Vec<SyncDescriptor> = self
                .registry
                .resolve(pathname)
                .into_iter()
                .filter(|d| ctx.is_due(d, now))
                .collect();
            for descriptor in &due {
                ctx.mark_ran(descriptor.key, now);
            }
            due
        };
        run_all(due).await
    }

    /// Run every feature for `pathname`, due or not.
    pub async fn sync_all(&self, pathname: &str) -> Vec<SyncReport> {
        let descriptors = self.registry.resolve(pathname);
        {
            let mut ctx = self.context();
            let now = Instant::now();
            for descriptor in &descriptors {
                ctx.mark_ran(descriptor.key, now);
            }
        }
        run_all(descriptors).await
    }

    pub async fn on_visibility(&self, visible: bool, pathname: &str) -> Vec<SyncReport> {
        let hidden_for = {
            let mut ctx = self.context();
            if !visible {
                ctx.hide(Instant::now());
                return Vec::new();
            }
            ctx.show(Instant::now())
        };
        match hidden_for {
            Some(hidden) if hidden >= self.settings.stale_after => {
                tracing::info!("Back after {:?}, resyncing {}", hidden, pathname);
                self.sync_all(pathname).await
            }
            _ => Vec::new(),
        }
    }

    /// Resync once when connectivity comes back.
    pub async fn on_online(&self, pathname: &str) -> Vec<SyncReport> {
        let regained = self.context().set_online(true);
        if !regained {
            return Vec::new();
        }
        tracing::info!("Back online, resyncing {}", pathname);
        self.sync_all(pathname).await
    }

    pub fn on_offline(&self) {
        self.context().set_online(false);
    }

    /// Drive the scheduler until `shutdown` resolves: an interval ticker,
    /// route changes and lifecycle signals.
    pub async fn run(
        &self,
        mut route: watch::Receiver<String>,
        mut signals: mpsc::Receiver<LifecycleSignal>,
        shutdown: impl Future<Output = ()>,
    ) {
        let mut ticker = tokio::time::interval(self.settings.tick_every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        tokio::pin!(shutdown);

        let mut route_open = true;
        let mut signals_open = true;

        loop {
            tokio::select! {
                _ = &mut shutdown => break,
                _ = ticker.tick() => {
                    let path = route.borrow().clone();
                    self.tick(&path).await;
                }
                changed = route.changed(), if route_open => {
                    if changed.is_err() {
                        route_open = false;
                        continue;
                    }
                    let path = route.borrow_and_update().clone();
                    tracing::debug!("Route changed to {}", path);
                    self.tick(&path).await;
                }
                signal = signals.recv(), if signals_open => {
                    let Some(signal) = signal else {
                        signals_open = false;
                        continue;
                    };
                    let path = route.borrow().clone();
                    match signal {
                        LifecycleSignal::Visible => { self.on_visibility(true, &path).await; }
                        LifecycleSignal::Hidden => { self.on_visibility(false, &path).await; }
                        LifecycleSignal::Online => { self.on_online(&path).await; }
                        LifecycleSignal::Offline => self.on_offline(),
                        LifecycleSignal::SyncNow => { self.sync_all(&path).await; }
                    }
                }
            }
        }
    }

    fn context(&self) -> std::sync::MutexGuard<'_, SyncContext> {
        self.context.lock().unwrap_or_else(|e| e.into_inner())
    }
}

/// Push then pull each feature; features run concurrently.
async fn run_all(descriptors: Vec<SyncDescriptor>) -> Vec<SyncReport> {
    let rounds = join_all(descriptors.iter().map(|d| async move {
        let pushed = d.target.sync_pending().await;
        let pulled = d.target.sync_from_server().await;
        [pushed, pulled]
    }))
    .await;

    let reports: Vec<SyncReport> = rounds.into_iter().flatten().collect();
    for report in &reports {
        if report.is_clean() {
            tracing::info!("{}", report);
        } else {
            tracing::warn!("{}", report);
        }
    }
    reports
}
