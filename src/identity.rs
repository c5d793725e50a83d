//! Identity directory: the local participant and everyone else known.
//!
//! The directory is an external collaborator. The controller only uses it
//! to label the local participant's seed where and to render a participant
//! list, so every failure here degrades instead of propagating. Authors of
//! wheres the controller loads or receives are passed to `observe`.

use std::collections::HashMap;
use std::sync::RwLock;

use serde::Serialize;

use crate::error::ErrorCode;
use crate::state::Meta;

#[derive(Debug, thiserror::Error)]
pub enum IdentityError {
    #[error("identity directory unavailable: {0}")]
    Unavailable(String),
}

impl ErrorCode for IdentityError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Unavailable(_) => "E_IDENTITY_UNAVAILABLE",
        }
    }

    fn retryable(&self) -> bool {
        true
    }
}

/// The local participant as the directory knows them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Participant {
    pub public_key: String,
    pub nickname: String,
}

/// Public profile of any known participant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Profile {
    pub nickname: String,
    pub avatar_url: String,
}

#[async_trait::async_trait]
pub trait IdentityDirectory: Send + Sync {
    async fn current_participant(&self) -> Result<Participant, IdentityError>;

    /// Known participants keyed by public key.
    async fn known_participants(&self) -> Result<HashMap<String, Profile>, IdentityError>;

    /// Record a participant seen as a where author. Directories that
    /// resolve identities elsewhere ignore this.
    fn observe(&self, _public_key: &str, _profile: Profile) {}
}

/// Fixed directory seeded from configuration. Other participants are added
/// as they are observed or registered.
pub struct StaticIdentityDirectory {
    me: Participant,
    known: RwLock<HashMap<String, Profile>>,
}

impl StaticIdentityDirectory {
    /// Directory whose only known participant is the local one.
    #[must_use]
    pub fn new(public_key: impl Into<String>, nickname: impl Into<String>, avatar_url: impl Into<String>) -> Self {
        let me = Participant { public_key: public_key.into(), nickname: nickname.into() };
        let mut known = HashMap::new();
        known.insert(me.public_key.clone(), Profile { nickname: me.nickname.clone(), avatar_url: avatar_url.into() });
        Self { me, known: RwLock::new(known) }
    }

    pub fn register(&self, public_key: impl Into<String>, profile: Profile) {
        if let Ok(mut known) = self.known.write() {
            known.insert(public_key.into(), profile);
        }
    }
}

/// Profile advertised by a where's `name` and `img` meta, if it names anyone.
#[must_use]
pub fn profile_from_meta(meta: &Meta) -> Option<Profile> {
    let nickname = meta.get("name").filter(|n| !n.is_empty())?;
    Some(Profile { nickname: nickname.clone(), avatar_url: meta.get("img").cloned().unwrap_or_default() })
}

#[async_trait::async_trait]
impl IdentityDirectory for StaticIdentityDirectory {
    async fn current_participant(&self) -> Result<Participant, IdentityError> {
        Ok(self.me.clone())
    }

    async fn known_participants(&self) -> Result<HashMap<String, Profile>, IdentityError> {
        self.known
            .read()
            .map(|known| known.clone())
            .map_err(|_| IdentityError::Unavailable("participant table poisoned".into()))
    }

    /// First sighting wins; the local participant's configured profile is never replaced.
    fn observe(&self, public_key: &str, profile: Profile) {
        if public_key.is_empty() {
            return;
        }
        if let Ok(mut known) = self.known.write() {
            known.entry(public_key.to_owned()).or_insert(profile);
        }
    }
}
