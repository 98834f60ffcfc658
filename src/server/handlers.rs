use std::sync::Arc;

use axum::{
    extract::{rejection::JsonRejection, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::logging::mask_key;
use crate::orchestrator::{CheckVerdict, LicenseOrchestrator};
use crate::server::api_error::ApiError;
use crate::server::logging::HealthResponse;

/// Shared application state for handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<LicenseOrchestrator>,
}

impl AppState {
    pub fn new(orchestrator: LicenseOrchestrator) -> Self {
        Self {
            orchestrator: Arc::new(orchestrator),
        }
    }
}

/// Body of `POST /api/check`.
#[derive(Debug, Deserialize, Serialize)]
pub struct CheckRequest {
    pub license_key: String,
    #[serde(default)]
    pub instance_name: String,
}

/// Query string of `POST /api/check`. Only the literal `true` forces.
#[derive(Debug, Default, Deserialize)]
pub struct CheckQuery {
    pub force: Option<String>,
}

impl CheckQuery {
    pub fn is_forced(&self) -> bool {
        self.force.as_deref() == Some("true")
    }
}

/// Body of `POST /api/deactivate`.
#[derive(Debug, Deserialize, Serialize)]
pub struct DeactivateRequest {
    pub license_key: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct DeactivateResponse {
    pub deactivated: bool,
    pub message: String,
}

/// Body of `GET /api/license`.
#[derive(Debug, Deserialize, Serialize)]
pub struct LicenseKeyResponse {
    pub key: String,
}

/// Handler for checking the license.
///
/// Always answers 200 with a verdict once the body decodes; remote and local
/// failures are reported in the verdict's `error` field.
pub async fn check_license_handler(
    State(state): State<AppState>,
    Query(query): Query<CheckQuery>,
    payload: Result<Json<CheckRequest>, JsonRejection>,
) -> Result<Json<CheckVerdict>, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::invalid_request(e.body_text()))?;

    if payload.license_key.trim().is_empty() {
        return Err(ApiError::missing_field("license_key"));
    }

    let force = query.is_forced();
    info!(
        license_key = %mask_key(&payload.license_key),
        instance_name = %payload.instance_name,
        force,
        "Checking license"
    );

    let verdict = state
        .orchestrator
        .check_license(&payload.license_key, &payload.instance_name, force)
        .await;

    Ok(Json(verdict))
}

/// Handler for deactivating the stored instance.
pub async fn deactivate_handler(
    State(state): State<AppState>,
    payload: Result<Json<DeactivateRequest>, JsonRejection>,
) -> Result<Json<DeactivateResponse>, ApiError> {
    let Json(payload) = payload.map_err(|e| ApiError::invalid_request(e.body_text()))?;

    if payload.license_key.trim().is_empty() {
        return Err(ApiError::missing_field("license_key"));
    }

    info!(license_key = %mask_key(&payload.license_key), "Deactivating license");

    state
        .orchestrator
        .deactivate(&payload.license_key)
        .await
        .map_err(|e| {
            warn!("Deactivation failed: {e}");
            ApiError::from(e)
        })?;

    Ok(Json(DeactivateResponse {
        deactivated: true,
        message: "Deactivated successfully".to_string(),
    }))
}

/// Handler returning the license key stored by the last activation.
pub async fn license_handler(
    State(state): State<AppState>,
) -> Result<Json<LicenseKeyResponse>, ApiError> {
    let record = state.orchestrator.stored_license().await?;
    Ok(Json(LicenseKeyResponse { key: record.key }))
}

pub async fn health_handler(State(state): State<AppState>) -> Json<HealthResponse> {
    let activated = state
        .orchestrator
        .store()
        .license_record_exists()
        .await
        .unwrap_or(false);
    Json(HealthResponse::healthy(activated))
}
