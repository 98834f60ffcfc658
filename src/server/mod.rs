// src/server/mod.rs

//! HTTP gateway for the license orchestrator.
//!
//! This module contains:
//! - `handlers`  → Axum handlers for check / deactivate / license / health
//! - `routes`    → Router builder
//! - `api_error` → Error envelope and status mapping
//! - `logging`   → Request logging middleware and health payload

pub mod api_error;
pub mod handlers;
pub mod logging;
pub mod routes;

pub use api_error::{ApiError, ErrorCode};
pub use handlers::{
    check_license_handler, deactivate_handler, health_handler, license_handler, AppState,
    CheckQuery, CheckRequest, DeactivateRequest, DeactivateResponse, LicenseKeyResponse,
};
pub use routes::build_router;
