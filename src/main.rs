use std::sync::Arc;

use whereabouts::config::WhereConfig;
use whereabouts::controller::{WhereController, spawn_signal_listener};
use whereabouts::identity::StaticIdentityDirectory;
use whereabouts::probe::HttpImageProbe;
use whereabouts::registry::SpaceRegistry;
use whereabouts::routes::{self, AppState};
use whereabouts::store::memory::InMemorySpaceStore;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt::init();

    let config = WhereConfig::from_env().expect("invalid configuration");

    let store = Arc::new(InMemorySpaceStore::new());
    let identity = Arc::new(StaticIdentityDirectory::new(
        config.agent_key.clone(),
        config.nickname.clone(),
        config.avatar_url.clone(),
    ));
    let probe = Arc::new(HttpImageProbe::new(config.probe_timeouts).expect("image probe init failed"));

    let controller = Arc::new(
        WhereController::new(store.clone(), identity, probe, config.avatar_url.clone())
            .with_registry(SpaceRegistry::with_zoom_policy(config.default_zoom, config.zoom_floor)),
    );

    // Forward store signals into the controller's registry.
    let _signals = spawn_signal_listener(controller.clone(), store.subscribe());

    if let Err(e) = controller.check_init().await {
        tracing::warn!(error = %e, "first load failed, will retry on next request");
    }

    let app = routes::app(AppState::new(controller));
    let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{}", config.port))
        .await
        .expect("failed to bind");

    tracing::info!(port = config.port, agent = %config.agent_key, "whereabouts listening");
    axum::serve(listener, app).await.expect("server failed");
}
