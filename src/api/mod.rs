mod snapshot;
mod ws;

use axum::{routing::get, Router};
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::{AppState, HubConfig};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/ws", get(ws::hub_ws))
        .route("/api/users", get(snapshot::users))
        .route("/api/users/{id}", get(snapshot::user))
        .route("/api/messages", get(snapshot::messages))
        .route("/api/statuses", get(snapshot::statuses))
        .route("/api/reels", get(snapshot::reels))
}

/// Full application: routes, shared state, CORS, request tracing and the
/// optional static file fallback.
pub fn app(config: &HubConfig, state: AppState) -> Router {
    let mut app = router().with_state(state);
    if let Some(dir) = &config.static_dir {
        app = app.fallback_service(ServeDir::new(dir));
    }
    app.layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}
