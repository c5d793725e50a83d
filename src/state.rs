//! Shared data model for spaces, wheres and the local session.
//!
//! DESIGN
//! ======
//! These types mirror what the backing store holds. Field names serialize
//! in camelCase where the store's wire shape uses it (`authorPubKey`), so a
//! payload from the store deserializes without adapters.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Opaque key assigned to a space by the backing store.
pub type SpaceKey = String;

/// Free-form string metadata attached to spaces and wheres.
pub type Meta = HashMap<String, String>;

/// Space meta key controlling how many wheres a participant may own.
pub const META_MULTI: &str = "multi";

// =============================================================================
// GEOMETRY
// =============================================================================

/// A pixel coordinate in a surface's native resolution.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    #[must_use]
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// True when both dimensions are strictly positive.
    #[must_use]
    pub fn is_positive_area(&self) -> bool {
        self.x > 0.0 && self.y > 0.0
    }
}

// =============================================================================
// SPACE
// =============================================================================

/// Background a space is drawn on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Surface {
    /// Image locator. Empty only for abstract, overlay-only backgrounds.
    pub url: String,
    pub size: Coord,
    /// JSON-encoded overlay annotations. Opaque to this crate.
    pub data: String,
}

/// A named shared canvas participants place wheres on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Space {
    pub name: String,
    pub surface: Surface,
    #[serde(default)]
    pub meta: Meta,
    #[serde(default)]
    pub wheres: Vec<WhereEntry>,
}

impl Space {
    /// Whether participants may own more than one where in this space.
    #[must_use]
    pub fn allows_multiple_wheres(&self) -> bool {
        self.meta.get(META_MULTI).is_some_and(|v| v == "true")
    }

    /// Wheres authored by the given participant.
    pub fn wheres_by<'a>(&'a self, author_pub_key: &'a str) -> impl Iterator<Item = &'a WhereEntry> + 'a {
        self.wheres
            .iter()
            .filter(move |w| w.author_pub_key == author_pub_key)
    }
}

// =============================================================================
// WHERE
// =============================================================================

/// A marker location plus its display metadata (`img`, `name`, `tag`, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Where {
    pub location: Coord,
    #[serde(default)]
    pub meta: Meta,
}

/// A where as held by a space: the entry, its store hash and its author.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WhereEntry {
    pub entry: Where,
    /// Empty until the store has persisted the entry.
    #[serde(default)]
    pub hash: String,
    pub author_pub_key: String,
}

impl WhereEntry {
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        !self.hash.is_empty()
    }
}

// =============================================================================
// SESSION
// =============================================================================

/// Lifecycle of the controller. `Ready` is never left once reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Uninitialized,
    /// Reported while a first load is in flight; never stored.
    Bootstrapping,
    Ready,
}

/// Per-session view state owned by one controller.
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    /// `None` until the first load selects a space.
    pub current_space_key: Option<SpaceKey>,
    /// Either `Uninitialized` or `Ready`.
    pub phase: Phase,
    pub my_avatar_url: String,
}

impl SessionState {
    #[must_use]
    pub fn new(my_avatar_url: impl Into<String>) -> Self {
        Self { current_space_key: None, phase: Phase::Uninitialized, my_avatar_url: my_avatar_url.into() }
    }

    #[must_use]
    pub fn initialized(&self) -> bool {
        self.phase == Phase::Ready
    }
}

// =============================================================================
// TEST HELPERS
// =============================================================================

#[cfg(test)]
pub mod test_helpers {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use crate::probe::{ImageProbe, ProbeError};

    /// Probe answering from a fixed url table; unknown urls are a 404.
    pub struct FixedProbe {
        sizes: HashMap<String, Coord>,
        calls: AtomicUsize,
    }

    impl FixedProbe {
        #[must_use]
        pub fn new(entries: &[(&str, f64, f64)]) -> Self {
            let sizes = entries
                .iter()
                .map(|(url, x, y)| ((*url).to_owned(), Coord::new(*x, *y)))
                .collect();
            Self { sizes, calls: AtomicUsize::new(0) }
        }

        #[must_use]
        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ImageProbe for FixedProbe {
        async fn probe(&self, url: &str) -> Result<Coord, ProbeError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.sizes
                .get(url)
                .copied()
                .ok_or(ProbeError::Status { status: 404 })
        }
    }

    /// A validated-looking space with no wheres.
    #[must_use]
    pub fn dummy_space(name: &str) -> Space {
        Space {
            name: name.into(),
            surface: Surface {
                url: format!("https://img.test/{name}.png"),
                size: Coord::new(1024.0, 768.0),
                data: "[]".into(),
            },
            meta: Meta::new(),
            wheres: Vec::new(),
        }
    }

    /// A space with `meta.multi` set to `"true"`.
    #[must_use]
    pub fn dummy_multi_space(name: &str) -> Space {
        let mut space = dummy_space(name);
        space.meta.insert(META_MULTI.into(), "true".into());
        space
    }

    /// An unpersisted where for `author` at (`x`, `y`).
    #[must_use]
    pub fn dummy_where(author: &str, x: f64, y: f64) -> WhereEntry {
        let mut meta = Meta::new();
        meta.insert("name".into(), author.into());
        meta.insert("tag".into(), "here".into());
        WhereEntry { entry: Where { location: Coord::new(x, y), meta }, hash: String::new(), author_pub_key: author.into() }
    }
}
