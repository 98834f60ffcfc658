//! License Gateway - a local daemon mediating license activation for one machine.
//!
//! The gateway sits between the host and a remote license API. On every check
//! it validates the previously activated instance, or activates a new one when
//! no usable local record exists, and reports whether the license currently
//! grants premium status.
//!
//! # Features
//!
//! - `server` - Axum HTTP gateway and the `license_gateway` binary. Enabled by default.
//!
//! # Example
//!
//! ```rust,ignore
//! use license_gateway::config::GatewayConfig;
//! use license_gateway::orchestrator::LicenseOrchestrator;
//!
//! let config = GatewayConfig::load()?;
//! let orchestrator = LicenseOrchestrator::from_config(&config)?;
//! let verdict = orchestrator.check_license("LICENSE-KEY", "my-host", false).await;
//! println!("premium: {}", verdict.premium);
//! ```

// Core modules (always available)
pub mod config;
pub mod crypto;
pub mod errors;
pub mod logging;
pub mod machine;
pub mod orchestrator;
pub mod store;

// Remote license API client (always available)
pub mod remote {
    pub mod client;
    pub mod responses;

    pub use client::RemoteLicenseClient;
}

// HTTP gateway (requires "server" feature)
#[cfg(feature = "server")]
pub mod server;
