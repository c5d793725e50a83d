//! Backing-store adapter for shared spaces and wheres.
//!
//! ARCHITECTURE
//! ============
//! The replicated store that durably holds spaces is an external
//! collaborator. `RemoteSpaceStore` is the seam the controller talks
//! through; `memory::InMemorySpaceStore` is the local reference backend
//! used by the binary and the tests.
//!
//! Stores also announce changes made by any participant as `StoreSignal`s.
//! How those signals travel is backend-specific; the controller only needs
//! them folded into its registry.

pub mod memory;

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::ErrorCode;
use crate::state::{Space, SpaceKey, WhereEntry};

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("invalid space spec: {0}")]
    InvalidSpec(String),
    #[error("space not found in store: {0}")]
    SpaceNotFound(SpaceKey),
}

impl ErrorCode for StoreError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::BackendUnavailable(_) => "E_BACKEND_UNAVAILABLE",
            Self::InvalidSpec(_) => "E_INVALID_SPEC",
            Self::SpaceNotFound(_) => "E_STORE_SPACE_NOT_FOUND",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_))
    }
}

// =============================================================================
// SIGNALS
// =============================================================================

/// Change notification emitted by the store for every participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content")]
pub enum StoreSignal {
    NewSpace { key: SpaceKey, space: Space },
    NewWhere { space_key: SpaceKey, entry: WhereEntry },
    DeleteWhere { space_key: SpaceKey, hash: String },
}

// =============================================================================
// ADAPTER
// =============================================================================

/// Async capability for listing and creating shared spaces.
#[async_trait::async_trait]
pub trait RemoteSpaceStore: Send + Sync {
    /// Every space the store currently knows, keyed by store-assigned key.
    async fn list_spaces(&self) -> Result<HashMap<SpaceKey, Space>, StoreError>;

    /// Persist a new space. The returned space carries hash-stamped wheres.
    async fn create_space(&self, spec: Space) -> Result<(SpaceKey, Space), StoreError>;

    /// Attach a where to a space and return its store hash.
    async fn add_where(&self, space_key: &str, entry: WhereEntry) -> Result<String, StoreError>;

    /// Detach a where from a space by hash.
    async fn delete_where(&self, space_key: &str, hash: &str) -> Result<(), StoreError>;
}
