//! In-process reference backend for `RemoteSpaceStore`.
//!
//! DESIGN
//! ======
//! Spaces live in a `tokio::sync::RwLock<HashMap>` keyed by a fresh UUID.
//! Where hashes are SHA-256 over the space key, author, a per-store
//! sequence number and the serialized entry, so two identical placements
//! still get distinct hashes. Every mutation is announced on a broadcast
//! channel; sends with no subscribers are dropped.
//!
//! The store can be switched offline to exercise `BackendUnavailable`
//! paths, and counts list/create calls so callers can assert on traffic.

use std::collections::HashMap;
use std::fmt::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};

use sha2::{Digest, Sha256};
use tokio::sync::{RwLock, broadcast};
use tracing::{debug, info};
use uuid::Uuid;

use super::{RemoteSpaceStore, StoreError, StoreSignal};
use crate::state::{Space, SpaceKey, WhereEntry};

const SIGNAL_CHANNEL_CAPACITY: usize = 256;
const NAME_MIN_CHARS: usize = 3;
const NAME_MAX_CHARS: usize = 64;

pub struct InMemorySpaceStore {
    spaces: RwLock<HashMap<SpaceKey, Space>>,
    signals: broadcast::Sender<StoreSignal>,
    offline: AtomicBool,
    where_seq: AtomicU64,
    list_calls: AtomicUsize,
    create_calls: AtomicUsize,
}

impl InMemorySpaceStore {
    #[must_use]
    pub fn new() -> Self {
        let (signals, _) = broadcast::channel(SIGNAL_CHANNEL_CAPACITY);
        Self {
            spaces: RwLock::new(HashMap::new()),
            signals,
            offline: AtomicBool::new(false),
            where_seq: AtomicU64::new(0),
            list_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
        }
    }

    /// Receive every signal emitted after this call.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<StoreSignal> {
        self.signals.subscribe()
    }

    /// Simulate a transport outage. All calls fail while offline.
    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    #[must_use]
    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn create_calls(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    /// Drop a space as if another participant's replica had lost it.
    pub async fn remove_space(&self, key: &str) -> Option<Space> {
        self.spaces.write().await.remove(key)
    }

    fn ensure_online(&self) -> Result<(), StoreError> {
        if self.offline.load(Ordering::SeqCst) {
            return Err(StoreError::BackendUnavailable("in-memory store is offline".into()));
        }
        Ok(())
    }

    fn stamp(&self, space_key: &str, entry: &mut WhereEntry) {
        if entry.is_persisted() {
            return;
        }
        let seq = self.where_seq.fetch_add(1, Ordering::SeqCst);
        entry.hash = where_hash(space_key, entry, seq);
    }

    fn emit(&self, signal: StoreSignal) {
        let _ = self.signals.send(signal);
    }
}

impl Default for InMemorySpaceStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl RemoteSpaceStore for InMemorySpaceStore {
    async fn list_spaces(&self) -> Result<HashMap<SpaceKey, Space>, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        let spaces = self.spaces.read().await;
        debug!(count = spaces.len(), "listed spaces");
        Ok(spaces.clone())
    }

    async fn create_space(&self, mut spec: Space) -> Result<(SpaceKey, Space), StoreError> {
        self.create_calls.fetch_add(1, Ordering::SeqCst);
        self.ensure_online()?;
        validate_spec(&spec)?;

        let key = Uuid::new_v4().to_string();
        for entry in &mut spec.wheres {
            self.stamp(&key, entry);
        }

        self.spaces.write().await.insert(key.clone(), spec.clone());
        info!(%key, name = %spec.name, wheres = spec.wheres.len(), "space created");

        self.emit(StoreSignal::NewSpace { key: key.clone(), space: spec.clone() });
        Ok((key, spec))
    }

    async fn add_where(&self, space_key: &str, mut entry: WhereEntry) -> Result<String, StoreError> {
        self.ensure_online()?;
        self.stamp(space_key, &mut entry);

        {
            let mut spaces = self.spaces.write().await;
            let Some(space) = spaces.get_mut(space_key) else {
                return Err(StoreError::SpaceNotFound(space_key.to_owned()));
            };
            space.wheres.push(entry.clone());
        }

        let hash = entry.hash.clone();
        debug!(%space_key, %hash, "where added");
        self.emit(StoreSignal::NewWhere { space_key: space_key.to_owned(), entry });
        Ok(hash)
    }

    async fn delete_where(&self, space_key: &str, hash: &str) -> Result<(), StoreError> {
        self.ensure_online()?;

        let removed = {
            let mut spaces = self.spaces.write().await;
            let Some(space) = spaces.get_mut(space_key) else {
                return Err(StoreError::SpaceNotFound(space_key.to_owned()));
            };
            let before = space.wheres.len();
            space.wheres.retain(|w| w.hash != hash);
            space.wheres.len() != before
        };

        // Deleting an unknown hash is a no-op, not an error.
        if removed {
            debug!(%space_key, %hash, "where deleted");
            self.emit(StoreSignal::DeleteWhere { space_key: space_key.to_owned(), hash: hash.to_owned() });
        }
        Ok(())
    }
}

// =============================================================================
// HELPERS
// =============================================================================

fn validate_spec(spec: &Space) -> Result<(), StoreError> {
    let name_len = spec.name.chars().count();
    if !(NAME_MIN_CHARS..=NAME_MAX_CHARS).contains(&name_len) {
        return Err(StoreError::InvalidSpec(format!("name must be {NAME_MIN_CHARS}-{NAME_MAX_CHARS} characters")));
    }
    if !spec.surface.size.is_positive_area() {
        return Err(StoreError::InvalidSpec("surface size must be positive".into()));
    }
    Ok(())
}

fn where_hash(space_key: &str, entry: &WhereEntry, seq: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(space_key.as_bytes());
    hasher.update(entry.author_pub_key.as_bytes());
    hasher.update(seq.to_le_bytes());
    if let Ok(json) = serde_json::to_vec(&entry.entry) {
        hasher.update(&json);
    }
    let bytes = hasher.finalize();
    let mut s = String::with_capacity(bytes.len() * 2);
    for b in bytes.iter() {
        let _ = write!(s, "{b:02x}");
    }
    s
}

#[cfg(test)]
#[path = "memory_test.rs"]
mod tests;
