//! Preview references for locally selected files and their release discipline.

use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, Mutex},
};

use shared::domain::PreviewRef;
use tracing::{debug, warn};
use uuid::Uuid;

/// Allocator of preview references. Every reference handed out by `create`
/// is returned through `release` exactly once by its [`PreviewHandle`].
pub trait PreviewStore: Send + Sync {
    fn create(&self, media_type: &str, bytes: &[u8]) -> PreviewRef;
    fn release(&self, reference: &PreviewRef);
}

/// Owned preview reference. Released when consumed by [`PreviewHandle::release`]
/// or when dropped, whichever comes first; never both.
pub struct PreviewHandle {
    reference: PreviewRef,
    store: Arc<dyn PreviewStore>,
}

impl PreviewHandle {
    pub fn acquire(store: Arc<dyn PreviewStore>, media_type: &str, bytes: &[u8]) -> Self {
        let reference = store.create(media_type, bytes);
        debug!(preview = %reference, "preview acquired");
        Self { reference, store }
    }

    pub fn reference(&self) -> &PreviewRef {
        &self.reference
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for PreviewHandle {
    fn drop(&mut self) {
        debug!(preview = %self.reference, "preview released");
        self.store.release(&self.reference);
    }
}

impl fmt::Debug for PreviewHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("PreviewHandle").field(&self.reference).finish()
    }
}

/// In-process store minting `blob:<uuid>` references.
#[derive(Default)]
pub struct ObjectUrlStore {
    live: Mutex<HashSet<PreviewRef>>,
}

impl ObjectUrlStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn live_count(&self) -> usize {
        self.live.lock().map(|live| live.len()).unwrap_or_default()
    }

    pub fn is_live(&self, reference: &PreviewRef) -> bool {
        self.live
            .lock()
            .map(|live| live.contains(reference))
            .unwrap_or(false)
    }
}

impl PreviewStore for ObjectUrlStore {
    fn create(&self, _media_type: &str, _bytes: &[u8]) -> PreviewRef {
        let reference = PreviewRef(format!("blob:{}", Uuid::new_v4()));
        if let Ok(mut live) = self.live.lock() {
            live.insert(reference.clone());
        }
        reference
    }

    fn release(&self, reference: &PreviewRef) {
        let removed = self
            .live
            .lock()
            .map(|mut live| live.remove(reference))
            .unwrap_or(false);
        if !removed {
            warn!(preview = %reference, "release of unknown preview reference");
        }
    }
}

#[cfg(test)]
#[path = "tests/preview_tests.rs"]
mod tests;
