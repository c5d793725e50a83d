//! Space registry holding known spaces and their zoom.
//!
//! DESIGN
//! ======
//! Pure in-memory data with no I/O. Spaces are kept in a `BTreeMap` so
//! iteration order is the key order; default selection and listing both
//! rely on that. The registry is only fed from store responses and store
//! signals, never from direct user edits.
//!
//! Zoom entries are created with a default factor the first time a key is
//! seen, and dropped together with their space.

use std::collections::{BTreeMap, HashMap};

use crate::error::ErrorCode;
use crate::state::{Space, SpaceKey};
use crate::store::StoreSignal;

pub const DEFAULT_ZOOM: f64 = 1.0;
pub const DEFAULT_ZOOM_FLOOR: f64 = 0.01;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RegistryError {
    #[error("space not found: {0}")]
    NotFound(SpaceKey),
    #[error("invalid zoom factor: {0}")]
    InvalidZoom(f64),
}

impl ErrorCode for RegistryError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::NotFound(_) => "E_SPACE_NOT_FOUND",
            Self::InvalidZoom(_) => "E_INVALID_ZOOM",
        }
    }
}

#[derive(Debug, Clone)]
pub struct SpaceRegistry {
    spaces: BTreeMap<SpaceKey, Space>,
    zooms: HashMap<SpaceKey, f64>,
    default_zoom: f64,
    zoom_floor: f64,
}

impl SpaceRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::with_zoom_policy(DEFAULT_ZOOM, DEFAULT_ZOOM_FLOOR)
    }

    /// Registry whose new keys start at `default_zoom` and whose zoom never
    /// drops below `zoom_floor`.
    #[must_use]
    pub fn with_zoom_policy(default_zoom: f64, zoom_floor: f64) -> Self {
        Self { spaces: BTreeMap::new(), zooms: HashMap::new(), default_zoom, zoom_floor }
    }

    // =========================================================================
    // SPACES
    // =========================================================================

    /// Merge `spaces` in. Existing keys are overwritten wholesale.
    pub fn upsert_all(&mut self, spaces: impl IntoIterator<Item = (SpaceKey, Space)>) {
        for (key, space) in spaces {
            self.zooms.entry(key.clone()).or_insert(self.default_zoom);
            self.spaces.insert(key, space);
        }
    }

    /// Make `spaces` the complete known set. Keys missing from it are dropped
    /// along with their zoom.
    pub fn replace_all(&mut self, spaces: HashMap<SpaceKey, Space>) {
        self.spaces.retain(|key, _| spaces.contains_key(key));
        self.zooms.retain(|key, _| spaces.contains_key(key));
        self.upsert_all(spaces);
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the key is unknown.
    pub fn get(&self, key: &str) -> Result<&Space, RegistryError> {
        self.spaces
            .get(key)
            .ok_or_else(|| RegistryError::NotFound(key.to_owned()))
    }

    #[must_use]
    pub fn contains(&self, key: &str) -> bool {
        self.spaces.contains_key(key)
    }

    /// Known keys in ascending order.
    pub fn keys(&self) -> impl Iterator<Item = &SpaceKey> {
        self.spaces.keys()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SpaceKey, &Space)> {
        self.spaces.iter()
    }

    /// The smallest known key, used as the default selection.
    #[must_use]
    pub fn first_key(&self) -> Option<&SpaceKey> {
        self.spaces.keys().next()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.spaces.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.spaces.is_empty()
    }

    // =========================================================================
    // ZOOM
    // =========================================================================

    /// # Errors
    ///
    /// Returns `NotFound` if the key is unknown.
    pub fn zoom(&self, key: &str) -> Result<f64, RegistryError> {
        self.zooms
            .get(key)
            .copied()
            .ok_or_else(|| RegistryError::NotFound(key.to_owned()))
    }

    /// Set an exact zoom factor. No clamping beyond rejecting non-positive values.
    ///
    /// # Errors
    ///
    /// Returns `InvalidZoom` for non-positive or non-finite factors, and
    /// `NotFound` if the key is unknown.
    pub fn set_zoom(&mut self, key: &str, factor: f64) -> Result<(), RegistryError> {
        if !factor.is_finite() || factor <= 0.0 {
            return Err(RegistryError::InvalidZoom(factor));
        }
        let Some(zoom) = self.zooms.get_mut(key) else {
            return Err(RegistryError::NotFound(key.to_owned()));
        };
        *zoom = factor;
        Ok(())
    }

    /// Add `delta` to the zoom factor, clamped at the floor. Returns the new factor.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the key is unknown, and `InvalidZoom` if
    /// `delta` or the resulting factor is not finite. The factor is left
    /// unchanged on error.
    pub fn adjust_zoom(&mut self, key: &str, delta: f64) -> Result<f64, RegistryError> {
        if !delta.is_finite() {
            return Err(RegistryError::InvalidZoom(delta));
        }
        let floor = self.zoom_floor;
        let Some(zoom) = self.zooms.get_mut(key) else {
            return Err(RegistryError::NotFound(key.to_owned()));
        };
        let next = (*zoom + delta).max(floor);
        if !next.is_finite() {
            return Err(RegistryError::InvalidZoom(next));
        }
        *zoom = next;
        Ok(next)
    }

    // =========================================================================
    // SIGNALS
    // =========================================================================

    /// Fold a store signal into the known set. Returns whether anything changed.
    /// Where signals for spaces this registry has not seen are ignored.
    pub fn apply_signal(&mut self, signal: StoreSignal) -> bool {
        match signal {
            StoreSignal::NewSpace { key, space } => {
                self.upsert_all([(key, space)]);
                true
            }
            StoreSignal::NewWhere { space_key, entry } => {
                let Some(space) = self.spaces.get_mut(&space_key) else {
                    return false;
                };
                if entry.is_persisted() && space.wheres.iter().any(|w| w.hash == entry.hash) {
                    return false;
                }
                space.wheres.push(entry);
                true
            }
            StoreSignal::DeleteWhere { space_key, hash } => {
                let Some(space) = self.spaces.get_mut(&space_key) else {
                    return false;
                };
                let before = space.wheres.len();
                space.wheres.retain(|w| w.hash != hash);
                space.wheres.len() != before
            }
        }
    }
}

impl Default for SpaceRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Zoom factor rendered as a whole percentage (`1.0` → `100`).
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn zoom_percent(factor: f64) -> i64 {
    (factor * 100.0).round() as i64
}

#[cfg(test)]
#[path = "registry_test.rs"]
mod tests;
