use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;

use crate::server::handlers::{
    check_license_handler, deactivate_handler, health_handler, license_handler, AppState,
};
use crate::server::logging::request_logging_middleware;

/// Build the gateway router.
///
/// # Routes
///
/// - `POST /api/check` - Validate or activate (`?force=true` forces a re-check)
/// - `POST /api/deactivate` - Release the stored instance
/// - `GET /api/license` - Read the stored license key
/// - `GET /health` - Liveness and activation state
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/check", post(check_license_handler))
        .route("/api/deactivate", post(deactivate_handler))
        .route("/api/license", get(license_handler))
        .route("/health", get(health_handler))
        .layer(ServiceBuilder::new().layer(middleware::from_fn(request_logging_middleware)))
        .with_state(state)
}
