//! Time-bound, sorted view of the host's units.
//!
//! The cache holds a single slot. Readers inside the TTL get the same
//! [`Snapshot`] back (pointer-identical). When the slot is empty or expired,
//! the first reader recomputes under the slot lock; concurrent readers wait
//! on that lock and then observe the fresh snapshot, so one expiry window
//! costs exactly one enumeration.

use crate::collab::HostUnits;
use crate::error::EnumerationError;
use serde::{Deserialize, Serialize};
use std::ops::Deref;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time::Instant;

/// How long a snapshot stays valid.
pub const DEFAULT_INVENTORY_TTL: Duration = Duration::from_secs(5 * 60);

/// Expiry used when `now + ttl` is not representable.
const FAR_FUTURE: Duration = Duration::from_secs(86400 * 365 * 30);

/// One host-managed unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InventoryEntry {
    /// Unique key; snapshots are sorted by it.
    pub name: String,
    pub version: String,
    /// Opaque reference for the messenger (e.g. an upstream resource id).
    #[serde(default)]
    pub resource: Option<String>,
}

impl InventoryEntry {
    pub fn new(name: impl Into<String>, version: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            version: version.into(),
            resource: None,
        }
    }

    pub fn with_resource(mut self, resource: impl Into<String>) -> Self {
        self.resource = Some(resource.into());
        self
    }
}

/// Immutable, name-sorted list of units. Clones share the same allocation.
#[derive(Debug, Clone)]
pub struct Snapshot(Arc<[InventoryEntry]>);

impl Snapshot {
    /// Sort `entries` by name (ordinal, stable) and freeze them.
    pub fn from_unsorted(mut entries: Vec<InventoryEntry>) -> Self {
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Self(entries.into())
    }

    /// Whether both handles point at the same computed snapshot.
    pub fn same_as(&self, other: &Snapshot) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|e| e.name.as_str())
    }
}

impl Deref for Snapshot {
    type Target = [InventoryEntry];

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

struct Cached {
    snapshot: Snapshot,
    expires_at: Instant,
}

/// Single-slot inventory cache.
pub struct InventoryCache {
    host: Arc<dyn HostUnits>,
    ttl: Duration,
    slot: Mutex<Option<Cached>>,
}

impl InventoryCache {
    pub fn new(host: Arc<dyn HostUnits>, ttl: Duration) -> Self {
        Self {
            host,
            ttl,
            slot: Mutex::new(None),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Current snapshot, recomputed if missing or expired.
    ///
    /// An enumeration failure is returned to this caller only; the slot is
    /// left as it was.
    pub async fn get(&self) -> Result<Snapshot, EnumerationError> {
        let mut slot = self.slot.lock().await;
        let now = Instant::now();

        if let Some(cached) = slot.as_ref()
            && now < cached.expires_at
        {
            return Ok(cached.snapshot.clone());
        }

        let host = self.host.clone();
        let entries = tokio::task::spawn_blocking(move || host.enumerate_units())
            .await
            .unwrap_or_else(|join| Err(EnumerationError::new(join.to_string())))
            .inspect_err(|e| {
                tracing::warn!(error = %e, "inventory recompute failed");
            })?;
        let snapshot = Snapshot::from_unsorted(entries);
        tracing::debug!(units = snapshot.len(), "inventory recomputed");

        *slot = Some(Cached {
            snapshot: snapshot.clone(),
            expires_at: now
                .checked_add(self.ttl)
                .unwrap_or_else(|| now + FAR_FUTURE),
        });
        Ok(snapshot)
    }

    /// Drop the cached snapshot so the next read recomputes.
    pub async fn invalidate(&self) {
        self.slot.lock().await.take();
    }

    /// Whether a snapshot is currently held (expired or not).
    pub async fn is_populated(&self) -> bool {
        self.slot.lock().await.is_some()
    }
}
