//! Controller for first-load bootstrap, space selection, zoom and refresh.
//!
//! DESIGN
//! ======
//! One `WhereController` owns all view state for a session: the space
//! registry and the session (current space, phase, avatar). Consumers get
//! it by reference (usually `Arc<WhereController>` in axum state). There
//! is no ambient or global state.
//!
//! The first load runs through a `tokio::sync::OnceCell`. The first caller
//! starts it and every concurrent caller awaits the same in-flight load, so
//! an empty store is bootstrapped at most once. A failed or cancelled load
//! leaves the cell empty and the phase `Uninitialized`, so the next call
//! retries. `Bootstrapping` is reported only while a load future is alive;
//! a drop guard counts it, so a cancelled request cannot leave it stuck.
//!
//! A bootstrap interrupted by a store failure is resumed on retry: seeds
//! whose name is not in the store yet are submitted, the rest are skipped.
//!
//! Registry and session locks are never held across a store call, and are
//! locked separately and never nested. Where placement is the exception
//! that needs a critical section spanning store calls; it holds a per-space
//! `tokio::sync::Mutex` for the whole remove-then-add.
//!
//! SELECTION
//! =========
//! After the first load the current space is the smallest known key.
//! `refresh` never changes the selection, so it can dangle if the store
//! dropped that space. `view` then reports no current space.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use serde::Serialize;
use tokio::sync::{OnceCell, RwLock, broadcast};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::authoring::{SpaceAuthoringValidator, ValidationErrors};
use crate::error::ErrorCode;
use crate::identity::{IdentityDirectory, IdentityError, Participant, profile_from_meta};
use crate::probe::ImageProbe;
use crate::registry::{RegistryError, SpaceRegistry, zoom_percent};
use crate::seed::{self, SeedAuthor};
use crate::state::{Coord, Meta, Phase, SessionState, Space, SpaceKey, Where, WhereEntry};
use crate::store::{RemoteSpaceStore, StoreError, StoreSignal};

/// Nickname stamped on seed wheres when the identity directory is down.
const ANONYMOUS_NICKNAME: &str = "anonymous";

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, thiserror::Error)]
pub enum ControllerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error(transparent)]
    Registry(#[from] RegistryError),
    #[error(transparent)]
    Validation(#[from] ValidationErrors),
    #[error(transparent)]
    Identity(#[from] IdentityError),
    #[error("no space selected")]
    NoCurrentSpace,
}

impl ErrorCode for ControllerError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Store(e) => e.error_code(),
            Self::Registry(e) => e.error_code(),
            Self::Validation(e) => e.error_code(),
            Self::Identity(e) => e.error_code(),
            Self::NoCurrentSpace => "E_NO_CURRENT_SPACE",
        }
    }

    fn retryable(&self) -> bool {
        match self {
            Self::Store(e) => e.retryable(),
            Self::Identity(e) => e.retryable(),
            Self::Registry(_) | Self::Validation(_) | Self::NoCurrentSpace => false,
        }
    }
}

// =============================================================================
// COMMANDS AND VIEW MODEL
// =============================================================================

/// The only mutations the rendering surface may request.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    SelectSpace(SpaceKey),
    AdjustZoom(f64),
    OpenCreateDialog,
    Refresh,
}

#[derive(Debug)]
pub enum CommandOutcome {
    Selected(SpaceKey),
    Zoomed(f64),
    Dialog(SpaceAuthoringValidator),
    Refreshed(usize),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpaceListItem {
    pub key: SpaceKey,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ParticipantView {
    pub public_key: String,
    pub nickname: String,
    pub avatar_url: String,
}

/// Read-only snapshot handed to rendering.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpaceView {
    pub phase: Phase,
    /// `None` when nothing is selected or the selection dangles.
    pub current_space_key: Option<SpaceKey>,
    pub current_space: Option<Space>,
    pub zoom: Option<f64>,
    pub zoom_percent: Option<i64>,
    pub spaces: Vec<SpaceListItem>,
    pub participants: Vec<ParticipantView>,
    pub my_avatar_url: String,
}

// =============================================================================
// CONTROLLER
// =============================================================================

pub struct WhereController {
    store: Arc<dyn RemoteSpaceStore>,
    identity: Arc<dyn IdentityDirectory>,
    probe: Arc<dyn ImageProbe>,
    registry: RwLock<SpaceRegistry>,
    session: RwLock<SessionState>,
    init: OnceCell<()>,
    loading: AtomicUsize,
    bootstraps: AtomicUsize,
    seeding_incomplete: AtomicBool,
    placements: Mutex<HashMap<SpaceKey, Arc<tokio::sync::Mutex<()>>>>,
}

/// Counts a first load as in flight until dropped, including when the
/// load future is cancelled mid-await.
struct LoadingGuard<'a>(&'a AtomicUsize);

impl<'a> LoadingGuard<'a> {
    fn enter(counter: &'a AtomicUsize) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self(counter)
    }
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        self.0.fetch_sub(1, Ordering::SeqCst);
    }
}

impl WhereController {
    #[must_use]
    pub fn new(
        store: Arc<dyn RemoteSpaceStore>,
        identity: Arc<dyn IdentityDirectory>,
        probe: Arc<dyn ImageProbe>,
        my_avatar_url: impl Into<String>,
    ) -> Self {
        Self {
            store,
            identity,
            probe,
            registry: RwLock::new(SpaceRegistry::new()),
            session: RwLock::new(SessionState::new(my_avatar_url)),
            init: OnceCell::new(),
            loading: AtomicUsize::new(0),
            bootstraps: AtomicUsize::new(0),
            seeding_incomplete: AtomicBool::new(false),
            placements: Mutex::new(HashMap::new()),
        }
    }

    /// Replace the registry, e.g. to apply a configured zoom policy.
    #[must_use]
    pub fn with_registry(mut self, registry: SpaceRegistry) -> Self {
        self.registry = RwLock::new(registry);
        self
    }

    pub async fn phase(&self) -> Phase {
        let stored = self.session.read().await.phase;
        self.effective_phase(stored)
    }

    fn effective_phase(&self, stored: Phase) -> Phase {
        match stored {
            Phase::Ready => Phase::Ready,
            _ if self.loading.load(Ordering::SeqCst) > 0 => Phase::Bootstrapping,
            _ => Phase::Uninitialized,
        }
    }

    pub async fn current_space_key(&self) -> Option<SpaceKey> {
        self.session.read().await.current_space_key.clone()
    }

    /// Number of bootstrap attempts made by this controller.
    #[must_use]
    pub fn bootstrap_count(&self) -> usize {
        self.bootstraps.load(Ordering::SeqCst)
    }

    /// Look up a known space by key.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the registry does not hold the key.
    pub async fn space(&self, key: &str) -> Result<Space, ControllerError> {
        Ok(self.registry.read().await.get(key)?.clone())
    }

    // =========================================================================
    // FIRST LOAD
    // =========================================================================

    /// Load spaces once per controller, bootstrapping seed content if the
    /// store is empty. Idempotent after the first success.
    ///
    /// # Errors
    ///
    /// Returns the store error of a failed load. The controller stays
    /// `Uninitialized` and a later call retries.
    pub async fn check_init(&self) -> Result<(), ControllerError> {
        self.init.get_or_try_init(|| self.first_load()).await?;
        Ok(())
    }

    async fn first_load(&self) -> Result<(), ControllerError> {
        let _loading = LoadingGuard::enter(&self.loading);

        match self.load_or_bootstrap().await {
            Ok(current) => {
                let mut session = self.session.write().await;
                session.current_space_key.clone_from(&current);
                session.phase = Phase::Ready;
                info!(current = ?current, "controller ready");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, retryable = e.retryable(), "first load failed");
                Err(e)
            }
        }
    }

    async fn load_or_bootstrap(&self) -> Result<Option<SpaceKey>, ControllerError> {
        let mut spaces = self.store.list_spaces().await?;
        let resuming = self.seeding_incomplete.load(Ordering::SeqCst);
        if spaces.is_empty() || resuming {
            if resuming {
                info!(existing = spaces.len(), "resuming interrupted bootstrap");
            } else {
                info!("no spaces found, bootstrapping defaults");
            }
            if self.bootstrap_defaults(&spaces).await? > 0 {
                spaces = self.store.list_spaces().await?;
            }
            if spaces.is_empty() {
                warn!("store still empty after bootstrap");
            }
        }

        self.observe_authors(spaces.values());
        let mut registry = self.registry.write().await;
        registry.replace_all(spaces);
        Ok(registry.first_key().cloned())
    }

    /// Submit every seed whose name is not among `existing`. Returns how
    /// many were submitted.
    async fn bootstrap_defaults(&self, existing: &HashMap<SpaceKey, Space>) -> Result<usize, ControllerError> {
        self.bootstraps.fetch_add(1, Ordering::SeqCst);
        self.seeding_incomplete.store(true, Ordering::SeqCst);

        let me = match self.identity.current_participant().await {
            Ok(me) => me,
            Err(e) => {
                warn!(error = %e, "identity unavailable, seeding as anonymous");
                Participant { public_key: String::new(), nickname: ANONYMOUS_NICKNAME.into() }
            }
        };
        let avatar_url = self.session.read().await.my_avatar_url.clone();
        let author = SeedAuthor { public_key: &me.public_key, nickname: &me.nickname, avatar_url: &avatar_url };

        let present: HashSet<&str> = existing.values().map(|s| s.name.as_str()).collect();
        let mut submitted = 0;
        for spec in seed::seed_spaces(&author) {
            if present.contains(spec.name.as_str()) {
                debug!(name = %spec.name, "seed already present");
                continue;
            }
            let (key, space) = self.store.create_space(spec).await?;
            submitted += 1;
            info!(%key, name = %space.name, seed_version = seed::SEED_VERSION, "seeded space");
        }

        self.seeding_incomplete.store(false, Ordering::SeqCst);
        Ok(submitted)
    }

    // =========================================================================
    // COMMANDS
    // =========================================================================

    /// Dispatch one rendering-surface command.
    ///
    /// # Errors
    ///
    /// Propagates the error of the underlying operation.
    pub async fn handle(&self, command: Command) -> Result<CommandOutcome, ControllerError> {
        match command {
            Command::SelectSpace(key) => {
                self.select_space(&key).await?;
                Ok(CommandOutcome::Selected(key))
            }
            Command::AdjustZoom(delta) => Ok(CommandOutcome::Zoomed(self.adjust_zoom(delta).await?)),
            Command::OpenCreateDialog => Ok(CommandOutcome::Dialog(self.open_create_dialog())),
            Command::Refresh => Ok(CommandOutcome::Refreshed(self.refresh().await?)),
        }
    }

    /// # Errors
    ///
    /// Returns `NotFound` if the key is not in the registry. The selection
    /// is left unchanged.
    pub async fn select_space(&self, key: &str) -> Result<(), ControllerError> {
        if !self.registry.read().await.contains(key) {
            return Err(RegistryError::NotFound(key.to_owned()).into());
        }
        self.session.write().await.current_space_key = Some(key.to_owned());
        info!(%key, "space selected");
        Ok(())
    }

    /// Adjust the current space's zoom and return the new factor.
    ///
    /// # Errors
    ///
    /// Returns `NoCurrentSpace` before a space is selected, and `NotFound`
    /// if the selection dangles.
    pub async fn adjust_zoom(&self, delta: f64) -> Result<f64, ControllerError> {
        let key = self.current_space_key().await.ok_or(ControllerError::NoCurrentSpace)?;
        let zoom = self.registry.write().await.adjust_zoom(&key, delta)?;
        Ok(zoom)
    }

    /// Re-fetch spaces and make them the known set. Returns the space count.
    ///
    /// # Errors
    ///
    /// Returns `BackendUnavailable` if the store cannot be reached. The
    /// registry is left untouched.
    pub async fn refresh(&self) -> Result<usize, ControllerError> {
        let spaces = self.store.list_spaces().await?;
        let count = spaces.len();
        self.observe_authors(spaces.values());
        self.registry.write().await.replace_all(spaces);

        if let Some(current) = self.current_space_key().await {
            if !self.registry.read().await.contains(&current) {
                warn!(%current, "current space no longer exists after refresh");
            }
        }
        info!(count, "spaces refreshed");
        Ok(count)
    }

    /// A fresh authoring form bound to this controller's image probe.
    #[must_use]
    pub fn open_create_dialog(&self) -> SpaceAuthoringValidator {
        SpaceAuthoringValidator::new(self.probe.clone())
    }

    // =========================================================================
    // CREATION
    // =========================================================================

    /// Create a validated space, register it under its store key and select it.
    ///
    /// # Errors
    ///
    /// Returns the store error if creation fails; nothing changes locally.
    pub async fn submit_new_space(&self, spec: Space) -> Result<SpaceKey, ControllerError> {
        let (key, space) = self.store.create_space(spec).await?;
        info!(%key, name = %space.name, "space created");

        self.observe_authors([&space]);
        self.registry.write().await.upsert_all([(key.clone(), space)]);
        self.session.write().await.current_space_key = Some(key.clone());
        Ok(key)
    }

    /// Build the form's spec and submit it.
    ///
    /// # Errors
    ///
    /// Returns `Validation` if the form is incomplete, else as `submit_new_space`.
    pub async fn submit_form(&self, form: &SpaceAuthoringValidator) -> Result<SpaceKey, ControllerError> {
        let spec = form.build_spec()?;
        self.submit_new_space(spec).await
    }

    // =========================================================================
    // WHERES
    // =========================================================================

    /// Place a where for the local participant. When the space does not
    /// allow multiple wheres, the participant's existing ones are removed
    /// first. Missing `img`/`name` meta is filled from the local profile.
    /// Placements into one space are serialized.
    ///
    /// # Errors
    ///
    /// Returns `NotFound` for unknown spaces, `Identity` if the local
    /// participant is unknown, and store errors from the round-trip.
    pub async fn place_where(&self, space_key: &str, location: Coord, mut meta: Meta) -> Result<String, ControllerError> {
        let me = self.identity.current_participant().await?;
        if !self.registry.read().await.contains(space_key) {
            return Err(RegistryError::NotFound(space_key.to_owned()).into());
        }

        let lock = self.placement_lock(space_key);
        let _placing = lock.lock().await;

        let (multi, existing) = {
            let registry = self.registry.read().await;
            let space = registry.get(space_key)?;
            let mine: Vec<String> = space
                .wheres_by(&me.public_key)
                .filter(|w| w.is_persisted())
                .map(|w| w.hash.clone())
                .collect();
            (space.allows_multiple_wheres(), mine)
        };

        if !multi {
            for hash in existing {
                self.remove_where(space_key, &hash).await?;
            }
        }

        let avatar_url = self.session.read().await.my_avatar_url.clone();
        meta.entry("img".into()).or_insert(avatar_url);
        meta.entry("name".into()).or_insert_with(|| me.nickname.clone());

        let mut entry = WhereEntry { entry: Where { location, meta }, hash: String::new(), author_pub_key: me.public_key };
        let hash = self.store.add_where(space_key, entry.clone()).await?;
        entry.hash.clone_from(&hash);

        self.registry
            .write()
            .await
            .apply_signal(StoreSignal::NewWhere { space_key: space_key.to_owned(), entry });
        info!(%space_key, %hash, multi, "where placed");
        Ok(hash)
    }

    fn placement_lock(&self, space_key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.placements.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(space_key.to_owned()).or_default().clone()
    }

    /// # Errors
    ///
    /// Returns `NotFound` for unknown spaces and store errors from the round-trip.
    pub async fn remove_where(&self, space_key: &str, hash: &str) -> Result<(), ControllerError> {
        self.registry.read().await.get(space_key)?;
        self.store.delete_where(space_key, hash).await?;
        self.registry
            .write()
            .await
            .apply_signal(StoreSignal::DeleteWhere { space_key: space_key.to_owned(), hash: hash.to_owned() });
        Ok(())
    }

    /// Fold a live store signal into the registry.
    pub async fn apply_signal(&self, signal: StoreSignal) -> bool {
        match &signal {
            StoreSignal::NewSpace { space, .. } => self.observe_authors([space]),
            StoreSignal::NewWhere { entry, .. } => self.observe_author(entry),
            StoreSignal::DeleteWhere { .. } => {}
        }
        self.registry.write().await.apply_signal(signal)
    }

    fn observe_author(&self, entry: &WhereEntry) {
        if let Some(profile) = profile_from_meta(&entry.entry.meta) {
            self.identity.observe(&entry.author_pub_key, profile);
        }
    }

    fn observe_authors<'a>(&self, spaces: impl IntoIterator<Item = &'a Space>) {
        for entry in spaces.into_iter().flat_map(|space| &space.wheres) {
            self.observe_author(entry);
        }
    }

    // =========================================================================
    // VIEW
    // =========================================================================

    /// Snapshot of everything rendering needs.
    pub async fn view(&self) -> SpaceView {
        let (phase, current_key, my_avatar_url) = {
            let session = self.session.read().await;
            (session.phase, session.current_space_key.clone(), session.my_avatar_url.clone())
        };

        let (current, zoom, spaces) = {
            let registry = self.registry.read().await;
            let current = current_key
                .as_deref()
                .and_then(|key| registry.get(key).ok().map(|space| (key.to_owned(), space.clone())));
            let zoom = current
                .as_ref()
                .and_then(|(key, _)| registry.zoom(key).ok());
            let spaces = registry
                .iter()
                .map(|(key, space)| SpaceListItem { key: key.clone(), name: space.name.clone() })
                .collect();
            (current, zoom, spaces)
        };

        let (current_space_key, current_space) = match current {
            Some((key, space)) => (Some(key), Some(space)),
            None => (None, None),
        };

        SpaceView {
            phase: self.effective_phase(phase),
            current_space_key,
            current_space,
            zoom,
            zoom_percent: zoom.map(zoom_percent),
            spaces,
            participants: self.participants().await,
            my_avatar_url,
        }
    }

    /// Known participants sorted by nickname. Directory failures yield an empty list.
    pub async fn participants(&self) -> Vec<ParticipantView> {
        let known = match self.identity.known_participants().await {
            Ok(known) => known,
            Err(e) => {
                warn!(error = %e, "participant list unavailable");
                HashMap::new()
            }
        };
        let mut participants: Vec<ParticipantView> = known
            .into_iter()
            .map(|(public_key, profile)| ParticipantView {
                public_key,
                nickname: profile.nickname,
                avatar_url: profile.avatar_url,
            })
            .collect();
        participants.sort_by(|a, b| {
            a.nickname
                .cmp(&b.nickname)
                .then_with(|| a.public_key.cmp(&b.public_key))
        });
        participants
    }
}

// =============================================================================
// SIGNAL FORWARDING
// =============================================================================

/// Spawn a task that folds store signals into the controller. If the
/// receiver lags and drops signals, the controller re-fetches instead.
pub fn spawn_signal_listener(
    controller: Arc<WhereController>,
    mut signals: broadcast::Receiver<StoreSignal>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match signals.recv().await {
                Ok(signal) => {
                    controller.apply_signal(signal).await;
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "signal listener lagged, refreshing");
                    if let Err(e) = controller.refresh().await {
                        warn!(error = %e, "refresh after lag failed");
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
#[path = "controller_test.rs"]
mod tests;
