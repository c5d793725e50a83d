//! HTTP surface over the controller.
//!
//! SYSTEM CONTEXT
//! ==============
//! Rendering clients read `GET /api/view` and drive the controller through
//! the four command routes plus space creation. Every handler runs the
//! controller's first load before acting, so the first request against an
//! empty store bootstraps it. Errors map to a status code and a JSON body
//! carrying the stable error code.

use std::sync::Arc;

use axum::Router;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{delete, get, post};
use serde::{Deserialize, Serialize};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::warn;

use crate::controller::{ControllerError, SpaceView, WhereController};
use crate::error::ErrorCode;
use crate::registry::{RegistryError, zoom_percent};
use crate::state::{Coord, Meta, SpaceKey};
use crate::store::StoreError;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub controller: Arc<WhereController>,
}

impl AppState {
    #[must_use]
    pub fn new(controller: Arc<WhereController>) -> Self {
        Self { controller }
    }
}

/// Assemble the router with CORS and request tracing.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/view", get(view))
        .route("/api/space/select", post(select_space))
        .route("/api/zoom", post(adjust_zoom))
        .route("/api/refresh", post(refresh))
        .route("/api/spaces", post(create_space))
        .route("/api/spaces/{key}/wheres", post(place_where))
        .route("/api/spaces/{key}/wheres/{hash}", delete(remove_where))
        .route("/healthz", get(healthz))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// ERRORS
// =============================================================================

pub(crate) fn controller_error_to_status(err: &ControllerError) -> StatusCode {
    match err {
        ControllerError::Registry(RegistryError::NotFound(_)) | ControllerError::Store(StoreError::SpaceNotFound(_)) => {
            StatusCode::NOT_FOUND
        }
        ControllerError::Validation(_) | ControllerError::Store(StoreError::InvalidSpec(_)) => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        ControllerError::Store(StoreError::BackendUnavailable(_)) | ControllerError::Identity(_) => {
            StatusCode::SERVICE_UNAVAILABLE
        }
        ControllerError::Registry(RegistryError::InvalidZoom(_)) | ControllerError::NoCurrentSpace => {
            StatusCode::BAD_REQUEST
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

/// Controller error rendered as an HTTP response.
#[derive(Debug)]
pub struct ApiError(pub ControllerError);

impl From<ControllerError> for ApiError {
    fn from(err: ControllerError) -> Self {
        Self(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        controller_error_to_status(&self.0)
    }

    fn body(&self) -> ErrorBody {
        let details = match &self.0 {
            ControllerError::Validation(errors) => serde_json::to_value(errors).ok(),
            _ => None,
        };
        ErrorBody {
            code: self.0.error_code(),
            message: self.0.to_string(),
            retryable: self.0.retryable(),
            details,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            warn!(error = %self.0, code = self.0.error_code(), "request failed");
        }
        (status, Json(self.body())).into_response()
    }
}

// =============================================================================
// BODIES
// =============================================================================

#[derive(Debug, Deserialize)]
pub struct SelectSpaceBody {
    pub key: SpaceKey,
}

#[derive(Debug, Deserialize)]
pub struct ZoomBody {
    pub delta: f64,
}

#[derive(Debug, Serialize)]
pub struct ZoomResponse {
    pub zoom: f64,
    pub zoom_percent: i64,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub count: usize,
}

#[derive(Debug, Deserialize)]
pub struct CreateSpaceBody {
    pub name: String,
    pub image_url: String,
    #[serde(default)]
    pub multi: bool,
}

#[derive(Debug, Serialize)]
pub struct CreatedSpaceResponse {
    pub key: SpaceKey,
}

#[derive(Debug, Deserialize)]
pub struct PlaceWhereBody {
    pub x: f64,
    pub y: f64,
    #[serde(default)]
    pub meta: Meta,
}

#[derive(Debug, Serialize)]
pub struct PlacedWhereResponse {
    pub hash: String,
}

// =============================================================================
// HANDLERS
// =============================================================================

/// `GET /api/view`: current view model. A failed first load still
/// returns the (uninitialized) view so clients can render and retry.
pub async fn view(State(state): State<AppState>) -> Json<SpaceView> {
    if let Err(e) = state.controller.check_init().await {
        warn!(error = %e, "view served before first load succeeded");
    }
    Json(state.controller.view().await)
}

/// `POST /api/space/select`: change the current space.
pub async fn select_space(
    State(state): State<AppState>,
    Json(body): Json<SelectSpaceBody>,
) -> Result<Json<SpaceView>, ApiError> {
    state.controller.check_init().await?;
    state.controller.select_space(&body.key).await?;
    Ok(Json(state.controller.view().await))
}

/// `POST /api/zoom`: adjust the current space's zoom by `delta`.
pub async fn adjust_zoom(
    State(state): State<AppState>,
    Json(body): Json<ZoomBody>,
) -> Result<Json<ZoomResponse>, ApiError> {
    state.controller.check_init().await?;
    let zoom = state.controller.adjust_zoom(body.delta).await?;
    Ok(Json(ZoomResponse { zoom, zoom_percent: zoom_percent(zoom) }))
}

/// `POST /api/refresh`: re-fetch spaces from the store.
pub async fn refresh(State(state): State<AppState>) -> Result<Json<RefreshResponse>, ApiError> {
    state.controller.check_init().await?;
    let count = state.controller.refresh().await?;
    Ok(Json(RefreshResponse { count }))
}

/// `POST /api/spaces`: run the authoring form and create the space.
pub async fn create_space(
    State(state): State<AppState>,
    Json(body): Json<CreateSpaceBody>,
) -> Result<(StatusCode, Json<CreatedSpaceResponse>), ApiError> {
    state.controller.check_init().await?;

    let form = state.controller.open_create_dialog();
    form.set_name(body.name);
    form.set_multi(body.multi);
    form.set_image_url(body.image_url).await;

    let key = state.controller.submit_form(&form).await?;
    Ok((StatusCode::CREATED, Json(CreatedSpaceResponse { key })))
}

/// `POST /api/spaces/:key/wheres`: place the local participant's where.
pub async fn place_where(
    State(state): State<AppState>,
    Path(key): Path<SpaceKey>,
    Json(body): Json<PlaceWhereBody>,
) -> Result<(StatusCode, Json<PlacedWhereResponse>), ApiError> {
    state.controller.check_init().await?;
    let hash = state
        .controller
        .place_where(&key, Coord::new(body.x, body.y), body.meta)
        .await?;
    Ok((StatusCode::CREATED, Json(PlacedWhereResponse { hash })))
}

/// `DELETE /api/spaces/:key/wheres/:hash`: remove a where.
pub async fn remove_where(
    State(state): State<AppState>,
    Path((key, hash)): Path<(SpaceKey, String)>,
) -> Result<StatusCode, ApiError> {
    state.controller.check_init().await?;
    state.controller.remove_where(&key, &hash).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "routes_test.rs"]
mod tests;
