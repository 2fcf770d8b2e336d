use std::sync::Arc;

use axum::{routing::get, Extension, Json, Router};
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::{
    db::ReferralStore,
    handler::{admin::admin_handler, affiliate::affiliate_handler},
    AppState,
};

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "message": "Server is running"
    }))
}

pub fn create_router<S: ReferralStore>(app_state: Arc<AppState<S>>) -> Router {
    let api_route = Router::new()
        .nest("/affiliates", affiliate_handler::<S>())
        .nest("/admin", admin_handler::<S>())
        .layer(TraceLayer::new_for_http())
        .layer(Extension(app_state));

    Router::new()
        .route("/health", get(health_check))
        .nest("/api", api_route)
}
