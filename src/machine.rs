//! Machine identity used as key material for the instance cipher.

use std::env;
use std::fs;

use tracing::warn;

/// Used when no machine identifier can be found at all.
const FALLBACK_SECRET: &str = "license-gateway-default-machine";

/// Files consulted, in order, when no explicit secret or `HOSTNAME` is set.
#[cfg(target_os = "linux")]
const MACHINE_ID_FILES: &[&str] = &["/etc/machine-id", "/var/lib/dbus/machine-id", "/etc/hostname"];

#[cfg(not(target_os = "linux"))]
const MACHINE_ID_FILES: &[&str] = &["/etc/hostname"];

/// Returns the secret that identifies this machine.
///
/// Precedence:
/// 1. `configured` (from `crypto.machine_secret`), if non-empty
/// 2. `HOSTNAME` environment variable
/// 3. the first non-empty machine id file
/// 4. a fixed fallback (logged)
pub fn machine_secret(configured: Option<&str>) -> String {
    if let Some(secret) = configured.map(str::trim).filter(|s| !s.is_empty()) {
        return secret.to_string();
    }

    if let Ok(hostname) = env::var("HOSTNAME") {
        let hostname = hostname.trim();
        if !hostname.is_empty() {
            return hostname.to_string();
        }
    }

    for path in MACHINE_ID_FILES {
        if let Some(id) = read_id_file(path) {
            return id;
        }
    }

    warn!("No machine identifier found; falling back to a fixed secret");
    FALLBACK_SECRET.to_string()
}

fn read_id_file(path: &str) -> Option<String> {
    fs::read_to_string(path)
        .ok()
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}
