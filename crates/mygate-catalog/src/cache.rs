//! Publish-once catalog cache

use std::sync::Arc;

use parking_lot::RwLock;

use crate::model::Catalog;

/// Holder for the frozen catalog.
///
/// Readers take an `Arc` snapshot; a reload swaps the pointer. The lock is
/// held only for the duration of the clone or the swap, never across IO.
pub struct CatalogCache {
    inner: RwLock<Arc<Catalog>>,
}

impl CatalogCache {
    pub fn new(catalog: Catalog) -> Self {
        Self {
            inner: RwLock::new(Arc::new(catalog)),
        }
    }

    /// Current catalog snapshot
    pub fn snapshot(&self) -> Arc<Catalog> {
        self.inner.read().clone()
    }

    /// Replace the published catalog wholesale
    pub fn replace(&self, catalog: Catalog) {
        *self.inner.write() = Arc::new(catalog);
    }
}
