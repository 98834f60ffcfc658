//! Tracing setup and structured license lifecycle events.

use tracing::{info, info_span, warn};
use tracing_subscriber::EnvFilter;

/// License state change event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LicenseEvent {
    /// Remote activation succeeded and local records were written
    Activated,
    /// Activation refused because a license record already exists
    ActivationRefused,
    /// Remote validation succeeded
    Validated,
    /// Remote validation reported the license as not valid
    ValidationFailed,
    /// Remote deactivation succeeded and local records were removed
    Deactivated,
    /// Stored instance could not be decrypted and was ignored
    LocalStateDiscarded,
}

impl std::fmt::Display for LicenseEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            LicenseEvent::Activated => "activated",
            LicenseEvent::ActivationRefused => "activation_refused",
            LicenseEvent::Validated => "validated",
            LicenseEvent::ValidationFailed => "validation_failed",
            LicenseEvent::Deactivated => "deactivated",
            LicenseEvent::LocalStateDiscarded => "local_state_discarded",
        };
        write!(f, "{}", s)
    }
}

impl LicenseEvent {
    fn is_warning(&self) -> bool {
        matches!(
            self,
            LicenseEvent::ActivationRefused
                | LicenseEvent::ValidationFailed
                | LicenseEvent::LocalStateDiscarded
        )
    }
}

/// Mask a license key for logs, keeping only the last four characters.
pub fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

/// Log a license state change event.
///
/// The license key is always masked.
pub fn log_license_event(event: LicenseEvent, license_key: &str, details: Option<&str>) {
    let span = info_span!(
        "license_event",
        event = %event,
        license_key = %mask_key(license_key),
    );
    let _enter = span.enter();

    match (event.is_warning(), details) {
        (true, Some(d)) => warn!(reason = %d, "License event occurred"),
        (true, None) => warn!("License event occurred"),
        (false, Some(d)) => info!(details = %d, "License event occurred"),
        (false, None) => info!("License event occurred"),
    }
}

/// Install the global fmt subscriber.
///
/// `RUST_LOG` wins over the configured level when set. Calling this twice is
/// harmless; the second call is ignored.
pub fn init_tracing(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .try_init();
}
