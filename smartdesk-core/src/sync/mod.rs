//! Route-aware background sync.
//!
//! The registry decides which stores matter for the current route, the
//! orchestrator decides when they run: on their interval, when the app comes
//! back after being hidden for a while, and once when connectivity returns.

mod orchestrator;
mod registry;

pub use orchestrator::{LifecycleSignal, SyncContext, SyncOrchestrator, SyncSettings};
pub use registry::{Activation, FeatureEntry, SyncDescriptor, SyncRegistry, TargetSet};

use futures::future::BoxFuture;

use crate::backend::TableBackend;
use crate::entity::Entity;
use crate::store::{EntityStore, SyncReport, SyncedEntityStore};

/// A store the orchestrator can push and pull without knowing its record type.
pub trait SyncTarget: Send + Sync {
    fn table(&self) -> &'static str;

    fn sync_pending(&self) -> BoxFuture<'_, SyncReport>;

    fn sync_from_server(&self) -> BoxFuture<'_, SyncReport>;
}

impl<T: Entity, B: TableBackend> SyncTarget for EntityStore<T, B> {
    fn table(&self) -> &'static str {
        EntityStore::table(self)
    }

    fn sync_pending(&self) -> BoxFuture<'_, SyncReport> {
        Box::pin(EntityStore::sync_pending(self))
    }

    fn sync_from_server(&self) -> BoxFuture<'_, SyncReport> {
        Box::pin(EntityStore::sync_from_server(self))
    }
}

impl<T: Entity, B: TableBackend> SyncTarget for SyncedEntityStore<T, B> {
    fn table(&self) -> &'static str {
        self.store().table()
    }

    // Queued deletes go out with the rest of the pending records.
    fn sync_pending(&self) -> BoxFuture<'_, SyncReport> {
        Box::pin(self.flush_queue())
    }

    fn sync_from_server(&self) -> BoxFuture<'_, SyncReport> {
        Box::pin(self.store().sync_from_server())
    }
}
