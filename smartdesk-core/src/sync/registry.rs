use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::SyncTarget;
use crate::error::{SmartDeskError, SmartDeskResult};

/// Which routes a feature syncs on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    Always,
    /// Route prefixes. `/` only matches the root itself.
    Routes(Vec<String>),
}

impl Activation {
    pub fn routes(prefixes: &[&str]) -> Self {
        Activation::Routes(prefixes.iter().map(|p| p.to_string()).collect())
    }

    pub fn matches(&self, pathname: &str) -> bool {
        match self {
            Activation::Always => true,
            Activation::Routes(prefixes) => prefixes.iter().any(|p| route_matches(p, pathname)),
        }
    }
}

fn route_matches(prefix: &str, pathname: &str) -> bool {
    if prefix == "/" {
        return pathname == "/";
    }
    let prefix = prefix.trim_end_matches('/');
    match pathname.strip_prefix(prefix) {
        Some(rest) => rest.is_empty() || rest.starts_with('/'),
        None => false,
    }
}

type TargetFactory = Box<dyn Fn() -> SmartDeskResult<Arc<dyn SyncTarget>> + Send + Sync>;

/// A sync feature as declared, before its store has been looked up.
pub struct FeatureEntry {
    pub key: &'static str,
    pub activation: Activation,
    pub interval: Duration,
    factory: TargetFactory,
}

impl FeatureEntry {
    pub fn new<F>(key: &'static str, activation: Activation, interval: Duration, factory: F) -> Self
    where
        F: Fn() -> SmartDeskResult<Arc<dyn SyncTarget>> + Send + Sync + 'static,
    {
        FeatureEntry {
            key,
            activation,
            interval,
            factory: Box::new(factory),
        }
    }

    /// Feature backed by the target registered under `key` in `targets`.
    pub fn from_set(
        key: &'static str,
        activation: Activation,
        interval: Duration,
        targets: Arc<TargetSet>,
    ) -> Self {
        FeatureEntry::new(key, activation, interval, move || targets.require(key))
    }
}

/// What the orchestrator needs to run one feature.
#[derive(Clone)]
pub struct SyncDescriptor {
    pub key: &'static str,
    pub interval: Duration,
    pub target: Arc<dyn SyncTarget>,
}

impl std::fmt::Debug for SyncDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncDescriptor")
            .field("key", &self.key)
            .field("interval", &self.interval)
            .field("table", &self.target.table())
            .finish()
    }
}

/// Stores available to sync, by feature key.
#[derive(Default)]
pub struct TargetSet {
    targets: HashMap<&'static str, Arc<dyn SyncTarget>>,
}

impl TargetSet {
    pub fn new() -> Self {
        TargetSet::default()
    }

    pub fn with(mut self, key: &'static str, target: Arc<dyn SyncTarget>) -> Self {
        self.targets.insert(key, target);
        self
    }

    pub fn require(&self, key: &str) -> SmartDeskResult<Arc<dyn SyncTarget>> {
        self.targets
            .get(key)
            .cloned()
            .ok_or_else(|| SmartDeskError::FeatureUnavailable {
                key: key.to_string(),
                missing: format!("sync target '{key}'"),
            })
    }
}

pub struct SyncRegistry {
    features: Vec<(Activation, SyncDescriptor)>,
}

impl SyncRegistry {
    /// Resolve every entry up front. An entry whose store cannot be produced
    /// is logged and left out; the rest still sync.
    pub fn build(entries: Vec<FeatureEntry>) -> Self {
        let mut features = Vec::with_capacity(entries.len());
        for entry in entries {
            match (entry.factory)() {
                Ok(target) => features.push((
                    entry.activation,
                    SyncDescriptor {
                        key: entry.key,
                        interval: entry.interval,
                        target,
                    },
                )),
                Err(e) => tracing::error!(feature = entry.key, "{}", e),
            }
        }
        SyncRegistry { features }
    }

    /// Descriptors active on `pathname`, in registration order.
    pub fn resolve(&self, pathname: &str) -> Vec<SyncDescriptor> {
        self.features
            .iter()
            .filter(|(activation, _)| activation.matches(pathname))
            .map(|(_, descriptor)| descriptor.clone())
            .collect()
    }

    pub fn keys(&self) -> Vec<&'static str> {
        self.features.iter().map(|(_, d)| d.key).collect()
    }
}
