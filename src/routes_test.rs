use super::*;
use crate::authoring::ValidationErrors;
use crate::identity::{IdentityError, StaticIdentityDirectory};
use crate::state::Phase;
use crate::state::test_helpers::{self, FixedProbe};
use crate::store::RemoteSpaceStore;
use crate::store::memory::InMemorySpaceStore;

const MAP_URL: &str = "https://img.test/map.jpg";

fn test_state() -> (Arc<InMemorySpaceStore>, AppState) {
    let store = Arc::new(InMemorySpaceStore::new());
    let identity = Arc::new(StaticIdentityDirectory::new("agent-me", "Zippy", "https://img.test/me.jpg"));
    let probe = Arc::new(FixedProbe::new(&[(MAP_URL, 1024.0, 768.0)]));
    let controller = WhereController::new(store.clone(), identity, probe, "https://img.test/me.jpg");
    (store, AppState::new(Arc::new(controller)))
}

async fn error_json(err: ApiError) -> (StatusCode, serde_json::Value) {
    let response = err.into_response();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    (status, serde_json::from_slice(&bytes).unwrap())
}

// =========================================================================
// STATUS MAPPING
// =========================================================================

#[test]
fn controller_error_to_status_maps_not_found() {
    let err = ControllerError::Registry(RegistryError::NotFound("k".into()));
    assert_eq!(controller_error_to_status(&err), StatusCode::NOT_FOUND);
    let err = ControllerError::Store(StoreError::SpaceNotFound("k".into()));
    assert_eq!(controller_error_to_status(&err), StatusCode::NOT_FOUND);
}

#[test]
fn controller_error_to_status_maps_validation() {
    let err = ControllerError::Validation(ValidationErrors { name: None, image: None });
    assert_eq!(controller_error_to_status(&err), StatusCode::UNPROCESSABLE_ENTITY);
    let err = ControllerError::Store(StoreError::InvalidSpec("bad".into()));
    assert_eq!(controller_error_to_status(&err), StatusCode::UNPROCESSABLE_ENTITY);
}

#[test]
fn controller_error_to_status_maps_unavailable() {
    let err = ControllerError::Store(StoreError::BackendUnavailable("down".into()));
    assert_eq!(controller_error_to_status(&err), StatusCode::SERVICE_UNAVAILABLE);
    let err = ControllerError::Identity(IdentityError::Unavailable("down".into()));
    assert_eq!(controller_error_to_status(&err), StatusCode::SERVICE_UNAVAILABLE);
}

#[test]
fn controller_error_to_status_maps_bad_request() {
    let err = ControllerError::Registry(RegistryError::InvalidZoom(-1.0));
    assert_eq!(controller_error_to_status(&err), StatusCode::BAD_REQUEST);
    assert_eq!(controller_error_to_status(&ControllerError::NoCurrentSpace), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn api_error_body_carries_code_and_retryable() {
    let (status, body) = error_json(ApiError(ControllerError::Store(StoreError::BackendUnavailable("down".into())))).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["code"], "E_BACKEND_UNAVAILABLE");
    assert_eq!(body["retryable"], true);
    assert!(body.get("details").is_none());
}

#[test]
fn router_builds() {
    let (_, state) = test_state();
    let _router = app(state);
}

// =========================================================================
// HANDLERS
// =========================================================================

#[tokio::test]
async fn view_bootstraps_empty_store() {
    let (store, state) = test_state();

    let Json(view) = view(State(state.clone())).await;

    assert_eq!(view.phase, Phase::Ready);
    assert_eq!(view.spaces.len(), crate::seed::SEED_SPACES.len());
    assert!(view.current_space.is_some());
    assert_eq!(store.create_calls(), crate::seed::SEED_SPACES.len());
}

#[tokio::test]
async fn view_survives_failed_first_load() {
    let (store, state) = test_state();
    store.set_offline(true);

    let Json(view) = view(State(state)).await;

    assert_eq!(view.phase, Phase::Uninitialized);
    assert!(view.spaces.is_empty());
}

#[tokio::test]
async fn select_unknown_space_is_404() {
    let (_, state) = test_state();

    let err = select_space(State(state), Json(SelectSpaceBody { key: "ghost".into() }))
        .await
        .unwrap_err();

    let (status, body) = error_json(err).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "E_SPACE_NOT_FOUND");
}

#[tokio::test]
async fn select_known_space_returns_view() {
    let (store, state) = test_state();
    let (key, _) = store.create_space(test_helpers::dummy_space("alpha")).await.unwrap();
    store.create_space(test_helpers::dummy_space("beta")).await.unwrap();

    let Json(view) = select_space(State(state), Json(SelectSpaceBody { key: key.clone() }))
        .await
        .unwrap();

    assert_eq!(view.current_space_key, Some(key));
    assert_eq!(view.current_space.map(|s| s.name), Some("alpha".to_owned()));
}

#[tokio::test]
async fn zoom_reports_factor_and_percent() {
    let (_, state) = test_state();

    let Json(zoom) = adjust_zoom(State(state.clone()), Json(ZoomBody { delta: 0.1 })).await.unwrap();
    assert_eq!(zoom.zoom_percent, 110);

    let Json(zoom) = adjust_zoom(State(state), Json(ZoomBody { delta: -0.1 })).await.unwrap();
    assert!((zoom.zoom - 1.0).abs() < 1e-9);
    assert_eq!(zoom.zoom_percent, 100);
}

#[tokio::test]
async fn refresh_reports_count() {
    let (store, state) = test_state();
    store.create_space(test_helpers::dummy_space("alpha")).await.unwrap();

    let Json(resp) = refresh(State(state.clone())).await.unwrap();
    assert_eq!(resp.count, 1);

    store.create_space(test_helpers::dummy_space("beta")).await.unwrap();
    let Json(resp) = refresh(State(state)).await.unwrap();
    assert_eq!(resp.count, 2);
}

#[tokio::test]
async fn create_space_validates_before_submitting() {
    let (store, state) = test_state();
    store.create_space(test_helpers::dummy_space("alpha")).await.unwrap();

    let body = CreateSpaceBody { name: "ab".into(), image_url: "https://img.test/missing.jpg".into(), multi: false };
    let err = create_space(State(state), Json(body)).await.unwrap_err();

    let (status, body) = error_json(err).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(body["code"], "E_VALIDATION");
    assert_eq!(body["details"]["name"]["kind"], "too_short");
    assert_eq!(body["details"]["image"], "unreachable");
    assert_eq!(store.create_calls(), 1);
}

#[tokio::test]
async fn create_space_selects_new_space() {
    let (store, state) = test_state();
    store.create_space(test_helpers::dummy_space("alpha")).await.unwrap();

    let body = CreateSpaceBody { name: "Atlas".into(), image_url: MAP_URL.into(), multi: true };
    let (status, Json(created)) = create_space(State(state.clone()), Json(body)).await.unwrap();

    assert_eq!(status, StatusCode::CREATED);
    let view = state.controller.view().await;
    assert_eq!(view.current_space_key, Some(created.key));
    let space = view.current_space.unwrap();
    assert_eq!(space.surface.url, MAP_URL);
    assert!(space.allows_multiple_wheres());
}

#[tokio::test]
async fn place_and_remove_where() {
    let (store, state) = test_state();
    let (key, _) = store.create_space(test_helpers::dummy_multi_space("multi")).await.unwrap();

    let body = PlaceWhereBody { x: 10.0, y: 20.0, meta: Meta::new() };
    let (status, Json(placed)) = place_where(State(state.clone()), Path(key.clone()), Json(body))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(state.controller.space(&key).await.unwrap().wheres.len(), 1);

    let status = remove_where(State(state.clone()), Path((key.clone(), placed.hash)))
        .await
        .unwrap();
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert!(state.controller.space(&key).await.unwrap().wheres.is_empty());
}

#[tokio::test]
async fn command_routes_report_unavailable_store() {
    let (store, state) = test_state();
    store.set_offline(true);

    let err = refresh(State(state)).await.unwrap_err();
    let (status, body) = error_json(err).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["retryable"], true);
}
