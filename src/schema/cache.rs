//! Schema cache with atomic snapshot swaps.
//!
//! The cache owns a [`SchemaProvider`] and is refreshed from the scheduler
//! only. Lookups go through cheap [`SchemaReader`] clones that see either the
//! previous or the new mapping, never a partial one.

use std::sync::{Arc, RwLock};

use crate::schema::provider::Marker;
use crate::schema::{SchemaKey, SchemaMap, SchemaProvider, StorageSchema};

/// Result of a refresh attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    /// Marker unchanged since the last successful load.
    Unchanged,
    /// Mapping rebuilt and swapped in.
    Reloaded { count: usize, generation: u64 },
    /// Source absent; the previous mapping (if any) is still served.
    Unavailable,
    /// Marker or load failed; the previous mapping is still served.
    Failed,
}

#[derive(Debug, Default)]
struct Snapshot {
    schemas: SchemaMap,
    generation: u64,
}

type Shared = Arc<RwLock<Arc<Snapshot>>>;

fn current(shared: &Shared) -> Arc<Snapshot> {
    let guard = shared.read().unwrap_or_else(|poisoned| poisoned.into_inner());
    Arc::clone(&guard)
}

/// Read-only handle to the cache contents.
#[derive(Clone)]
pub struct SchemaReader {
    shared: Shared,
}

impl std::fmt::Debug for SchemaReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaReader")
            .field("generation", &self.generation())
            .finish_non_exhaustive()
    }
}

impl SchemaReader {
    /// Resolve an escaped `(host, datasource)` pair. `None` means not found.
    pub fn lookup(&self, host: &str, datasource: &str) -> Option<Arc<StorageSchema>> {
        current(&self.shared)
            .schemas
            .get(&SchemaKey::new(host, datasource))
            .cloned()
    }

    /// Whether any datasource is configured for `host`.
    pub fn has_host(&self, host: &str) -> bool {
        current(&self.shared).schemas.keys().any(|k| k.host == host)
    }

    /// Number of configured datasources.
    pub fn len(&self) -> usize {
        current(&self.shared).schemas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of mappings swapped in so far.
    pub fn generation(&self) -> u64 {
        current(&self.shared).generation
    }
}

/// Cache of storage schemas keyed by escaped `(host, datasource)`.
pub struct SchemaCache {
    provider: Box<dyn SchemaProvider>,
    shared: Shared,
    marker: Option<Marker>,
    available: bool,
    checked: bool,
}

impl SchemaCache {
    /// Create an empty cache; nothing is loaded until the first refresh.
    pub fn new(provider: Box<dyn SchemaProvider>) -> Self {
        Self {
            provider,
            shared: Arc::new(RwLock::new(Arc::new(Snapshot::default()))),
            marker: None,
            available: false,
            checked: false,
        }
    }

    /// A handle for lookups from other components.
    pub fn reader(&self) -> SchemaReader {
        SchemaReader {
            shared: Arc::clone(&self.shared),
        }
    }

    pub fn lookup(&self, host: &str, datasource: &str) -> Option<Arc<StorageSchema>> {
        self.reader().lookup(host, datasource)
    }

    pub fn generation(&self) -> u64 {
        current(&self.shared).generation
    }

    /// Whether the source existed at the last refresh.
    pub fn is_available(&self) -> bool {
        self.available
    }

    /// Marker of the mapping currently served.
    pub fn marker(&self) -> Option<Marker> {
        self.marker
    }

    /// Reload if the source changed since the last successful load.
    pub async fn refresh(&mut self) -> RefreshOutcome {
        self.reload(false).await
    }

    /// Reload regardless of the marker.
    pub async fn force_refresh(&mut self) -> RefreshOutcome {
        self.reload(true).await
    }

    async fn reload(&mut self, force: bool) -> RefreshOutcome {
        let source = self.provider.describe();

        let marker = match self.provider.marker().await {
            Ok(Some(marker)) => marker,
            Ok(None) => {
                self.mark_unavailable(&source);
                return RefreshOutcome::Unavailable;
            }
            Err(e) => {
                tracing::error!(%source, error = %e, "Failed to check configuration source");
                return RefreshOutcome::Failed;
            }
        };

        if !self.available {
            tracing::debug!(%source, "Configuration source available");
            self.available = true;
        }
        self.checked = true;

        if !force && self.marker == Some(marker) {
            tracing::trace!(%source, "Configuration unchanged");
            return RefreshOutcome::Unchanged;
        }

        let schemas = match self.provider.load().await {
            Ok(schemas) => schemas,
            Err(e) => {
                tracing::error!(%source, error = %e, "Failed to load configuration, keeping the previous one");
                return RefreshOutcome::Failed;
            }
        };

        let count = schemas.len();
        let generation = self.swap(schemas);
        self.marker = Some(marker);

        tracing::info!(%source, count, generation, "Configuration loaded");
        RefreshOutcome::Reloaded { count, generation }
    }

    fn swap(&self, schemas: SchemaMap) -> u64 {
        let mut guard = self
            .shared
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let generation = guard.generation + 1;
        *guard = Arc::new(Snapshot {
            schemas,
            generation,
        });
        generation
    }

    fn mark_unavailable(&mut self, source: &str) {
        if self.available && self.marker.is_some() {
            tracing::warn!(%source, "Configuration source disappeared, serving the last loaded configuration");
        } else if self.available || !self.checked {
            tracing::warn!(%source, "Configuration source not found");
        }
        self.available = false;
        self.checked = true;
    }
}
