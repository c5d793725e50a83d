//! Space authoring: turns raw dialog input into a creatable `Space`.
//!
//! DESIGN
//! ======
//! The validator holds the dialog's form behind a mutex so the name field
//! and the image probe can be driven from different tasks. The image probe
//! is the only suspension point. Each url change issues a new probe token;
//! a probe result is applied only if its token is still the latest, so a
//! slow probe for an old url can never overwrite a newer one.
//!
//! Name and image rules are checked independently and reported together.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, warn};

use crate::probe::ImageProbe;
use crate::state::{Coord, META_MULTI, Meta, Space, Surface};

pub const NAME_MIN_CHARS: usize = 3;
pub const NAME_MAX_CHARS: usize = 64;

/// Validity marker shown when the image cannot be loaded.
pub const UNREACHABLE_IMAGE: &str = "unreachable image";

/// Overlay data for a freshly authored space.
const EMPTY_SURFACE_DATA: &str = "[]";

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NameError {
    #[error("name must be at least {min} characters (got {len})", min = NAME_MIN_CHARS)]
    TooShort { len: usize },
    #[error("name must be at most {max} characters (got {len})", max = NAME_MAX_CHARS)]
    TooLong { len: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, thiserror::Error)]
#[serde(rename_all = "snake_case")]
pub enum ImageError {
    #[error("image url is required")]
    Missing,
    #[error("image is still loading")]
    Pending,
    #[error("unreachable image")]
    Unreachable,
}

/// Every failing rule of a form, reported together.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    pub name: Option<NameError>,
    pub image: Option<ImageError>,
}

impl ValidationErrors {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.image.is_none()
    }
}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (&self.name, &self.image) {
            (Some(name), Some(image)) => write!(f, "{name}; {image}"),
            (Some(name), None) => write!(f, "{name}"),
            (None, Some(image)) => write!(f, "{image}"),
            (None, None) => write!(f, "valid"),
        }
    }
}

impl std::error::Error for ValidationErrors {}

impl crate::error::ErrorCode for ValidationErrors {
    fn error_code(&self) -> &'static str {
        "E_VALIDATION"
    }
}

/// Check the name length rule on its own.
///
/// # Errors
///
/// Returns the violated bound with the measured character count.
pub fn validate_name(name: &str) -> Result<(), NameError> {
    let len = name.chars().count();
    if len < NAME_MIN_CHARS {
        return Err(NameError::TooShort { len });
    }
    if len > NAME_MAX_CHARS {
        return Err(NameError::TooLong { len });
    }
    Ok(())
}

// =============================================================================
// FORM
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ImageState {
    Empty,
    Pending,
    Loaded,
    Unreachable,
}

#[derive(Debug)]
struct AuthoringForm {
    name: String,
    image_url: String,
    multi: bool,
    size: Coord,
    image: ImageState,
    probe_token: u64,
}

impl AuthoringForm {
    fn new() -> Self {
        Self {
            name: String::new(),
            image_url: String::new(),
            multi: false,
            size: Coord::default(),
            image: ImageState::Empty,
            probe_token: 0,
        }
    }

    fn image_error(&self) -> Option<ImageError> {
        match self.image {
            ImageState::Empty => Some(ImageError::Missing),
            ImageState::Pending => Some(ImageError::Pending),
            ImageState::Unreachable => Some(ImageError::Unreachable),
            ImageState::Loaded => None,
        }
    }

    fn check(&self) -> Result<(), ValidationErrors> {
        let errors = ValidationErrors { name: validate_name(&self.name).err(), image: self.image_error() };
        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }
}

/// What happened to one image probe.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProbeOutcome {
    Loaded(Coord),
    Unreachable,
    /// A newer url was set while this probe was in flight; its result was dropped.
    Stale,
    /// The url was empty, so nothing was probed.
    Skipped,
}

// =============================================================================
// VALIDATOR
// =============================================================================

pub struct SpaceAuthoringValidator {
    probe: Arc<dyn ImageProbe>,
    form: Mutex<AuthoringForm>,
}

impl fmt::Debug for SpaceAuthoringValidator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpaceAuthoringValidator")
            .field("form", &*self.form())
            .finish_non_exhaustive()
    }
}

impl SpaceAuthoringValidator {
    #[must_use]
    pub fn new(probe: Arc<dyn ImageProbe>) -> Self {
        Self { probe, form: Mutex::new(AuthoringForm::new()) }
    }

    fn form(&self) -> MutexGuard<'_, AuthoringForm> {
        self.form.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_name(&self, name: impl Into<String>) {
        self.form().name = name.into();
    }

    pub fn set_multi(&self, multi: bool) {
        self.form().multi = multi;
    }

    /// Change the image url and probe it. Size resets to `{0,0}` until the
    /// probe for this url resolves.
    pub async fn set_image_url(&self, url: impl Into<String>) -> ProbeOutcome {
        let url = url.into();
        let empty = url.trim().is_empty();
        let token = {
            let mut form = self.form();
            form.probe_token += 1;
            form.image_url.clone_from(&url);
            form.size = Coord::default();
            form.image = if empty { ImageState::Empty } else { ImageState::Pending };
            form.probe_token
        };
        if empty {
            return ProbeOutcome::Skipped;
        }

        let result = self.probe.probe(&url).await;

        let mut form = self.form();
        if form.probe_token != token {
            debug!(%url, token, latest = form.probe_token, "discarding stale image probe");
            return ProbeOutcome::Stale;
        }
        match result {
            Ok(size) if size.is_positive_area() => {
                form.size = size;
                form.image = ImageState::Loaded;
                ProbeOutcome::Loaded(size)
            }
            Ok(size) => {
                warn!(%url, width = size.x, height = size.y, "image has no area");
                form.image = ImageState::Unreachable;
                ProbeOutcome::Unreachable
            }
            Err(e) => {
                warn!(%url, error = %e, "image probe failed");
                form.image = ImageState::Unreachable;
                ProbeOutcome::Unreachable
            }
        }
    }

    #[must_use]
    pub fn name(&self) -> String {
        self.form().name.clone()
    }

    #[must_use]
    pub fn image_url(&self) -> String {
        self.form().image_url.clone()
    }

    #[must_use]
    pub fn multi(&self) -> bool {
        self.form().multi
    }

    /// Size of the most recently probed image, `{0,0}` if none.
    #[must_use]
    pub fn size(&self) -> Coord {
        self.form().size
    }

    /// The image validity marker, if the last probe failed.
    #[must_use]
    pub fn validity(&self) -> Option<&'static str> {
        (self.form().image == ImageState::Unreachable).then_some(UNREACHABLE_IMAGE)
    }

    /// # Errors
    ///
    /// Returns every failing rule: name length and image reachability.
    pub fn validate(&self) -> Result<(), ValidationErrors> {
        self.form().check()
    }

    /// Assemble a creation request from a fully valid form.
    ///
    /// # Errors
    ///
    /// Returns the failing rules if the form is not valid yet.
    pub fn build_spec(&self) -> Result<Space, ValidationErrors> {
        let form = self.form();
        form.check()?;
        let mut meta = Meta::new();
        meta.insert(META_MULTI.into(), if form.multi { "true".into() } else { String::new() });
        Ok(Space {
            name: form.name.clone(),
            surface: Surface { url: form.image_url.clone(), size: form.size, data: EMPTY_SURFACE_DATA.into() },
            meta,
            wheres: Vec::new(),
        })
    }

    /// Clear the form, as when the dialog closes. In-flight probes become stale.
    pub fn reset(&self) {
        let mut form = self.form();
        let token = form.probe_token;
        *form = AuthoringForm::new();
        form.probe_token = token + 1;
    }
}

#[cfg(test)]
#[path = "authoring_test.rs"]
mod tests;
