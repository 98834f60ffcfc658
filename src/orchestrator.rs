//! Activation / validation state machine.
//!
//! On every check the orchestrator decides between two remote calls:
//!
//! - **validate**, when a stored instance record exists and decrypts, using
//!   that instance id;
//! - **activate**, when there is no usable instance record, after which the
//!   new instance id is encrypted and stored and the license record created.
//!
//! Activation is refused while a license record exists. The record is created
//! with exclusive-create semantics, so two racing activations cannot both
//! persist. Everything else (transport failures, malformed bodies, remote
//! refusals) is reported in the verdict and leaves local state untouched.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use crate::config::{CryptoMode, ForceMode, GatewayConfig, DEFAULT_SENTINEL_INSTANCE_ID};
use crate::crypto::InstanceCipher;
use crate::errors::{GatewayError, GatewayResult};
use crate::logging::{log_license_event, mask_key, LicenseEvent};
use crate::machine::machine_secret;
use crate::remote::client::RemoteLicenseClient;
use crate::remote::responses::{LicenseKey, LicenseStatus};
use crate::store::{InstanceStore, StoredLicense};

/// Result of a license check, derived fresh from the remote response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckVerdict {
    pub premium: bool,
    pub instance_id: String,
    /// Empty when the license never expires.
    pub expires_at: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckVerdict {
    /// Verdict for a license key and the instance it was checked against.
    pub fn from_license(license: &LicenseKey, instance_id: impl Into<String>) -> Self {
        Self {
            premium: is_premium(license, &now_iso8601()),
            instance_id: instance_id.into(),
            expires_at: license.expiry().to_string(),
            error: None,
        }
    }

    /// Non-premium verdict carrying the error text.
    pub fn failed(err: &GatewayError) -> Self {
        Self {
            premium: false,
            instance_id: String::new(),
            expires_at: String::new(),
            error: Some(err.to_string()),
        }
    }
}

/// Current UTC time as `YYYY-MM-DDTHH:MM:SSZ`.
pub fn now_iso8601() -> String {
    Utc::now().format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

/// A license is premium when its status is `active` and it either never
/// expires or its expiry sorts strictly after `now`.
///
/// Timestamps are compared as strings; both sides are ISO 8601 UTC.
pub fn is_premium(license: &LicenseKey, now: &str) -> bool {
    let expiry = license.expiry();
    license.status == LicenseStatus::Active && (expiry.is_empty() || expiry > now)
}

pub struct LicenseOrchestrator {
    store: InstanceStore,
    cipher: InstanceCipher,
    remote: RemoteLicenseClient,
    force_mode: ForceMode,
    sentinel_instance_id: String,
}

impl LicenseOrchestrator {
    pub fn new(store: InstanceStore, cipher: InstanceCipher, remote: RemoteLicenseClient) -> Self {
        Self {
            store,
            cipher,
            remote,
            force_mode: ForceMode::Sentinel,
            sentinel_instance_id: DEFAULT_SENTINEL_INSTANCE_ID.to_string(),
        }
    }

    /// Select what `force` does (see [`ForceMode`]).
    pub fn with_force_mode(mut self, mode: ForceMode, sentinel_instance_id: impl Into<String>) -> Self {
        self.force_mode = mode;
        self.sentinel_instance_id = sentinel_instance_id.into();
        self
    }

    /// Wire up store, cipher and remote client from configuration.
    pub fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let store = InstanceStore::from_config(&config.storage);
        let cipher = match config.crypto.mode {
            CryptoMode::AesGcm => {
                let secret = machine_secret(Some(config.crypto.machine_secret.as_str()));
                InstanceCipher::from_secret(&secret)
            }
            CryptoMode::Marker => {
                warn!("Marker cipher selected: stored instance ids are not confidential");
                InstanceCipher::Marker
            }
        };
        let remote = RemoteLicenseClient::from_config(&config.remote)?;

        Ok(Self::new(store, cipher, remote).with_force_mode(
            config.license.force_mode,
            config.license.sentinel_instance_id.clone(),
        ))
    }

    pub fn store(&self) -> &InstanceStore {
        &self.store
    }

    pub fn force_mode(&self) -> ForceMode {
        self.force_mode
    }

    /// Check the license, activating or validating as needed.
    ///
    /// Never fails: errors come back as a non-premium verdict with `error` set.
    pub async fn check_license(&self, key: &str, instance_name: &str, force: bool) -> CheckVerdict {
        match self.resolve(key, instance_name, force).await {
            Ok(verdict) => verdict,
            Err(e) => {
                if e.is_remote() {
                    warn!(license_key = %mask_key(key), force, "License check failed: {e}");
                } else {
                    error!(license_key = %mask_key(key), force, "License check failed locally: {e}");
                }
                CheckVerdict::failed(&e)
            }
        }
    }

    async fn resolve(&self, key: &str, instance_name: &str, force: bool) -> GatewayResult<CheckVerdict> {
        if force {
            return match self.force_mode {
                ForceMode::Sentinel => {
                    debug!("Forced check: validating against sentinel instance");
                    self.validate(key, &self.sentinel_instance_id).await
                }
                ForceMode::Activate => {
                    debug!("Forced check: skipping stored instance");
                    self.activate(key, instance_name).await
                }
            };
        }

        match self.stored_instance_id(key).await {
            Some(instance_id) => self.validate(key, &instance_id).await,
            None => self.activate(key, instance_name).await,
        }
    }

    /// Decrypted instance id from the store, or `None` if absent or unusable.
    async fn stored_instance_id(&self, key: &str) -> Option<String> {
        let record = self.store.read_instance().await?;
        match self.cipher.decrypt(&record.encrypted_id) {
            Ok(id) => Some(id),
            Err(e) => {
                log_license_event(LicenseEvent::LocalStateDiscarded, key, Some(&e.to_string()));
                None
            }
        }
    }

    async fn activate(&self, key: &str, instance_name: &str) -> GatewayResult<CheckVerdict> {
        if self.store.license_record_exists().await? {
            log_license_event(LicenseEvent::ActivationRefused, key, None);
            return Err(GatewayError::AlreadyActivated);
        }

        let resp = self.remote.activate(key, instance_name).await?;

        if !resp.activated || resp.remote_error().is_some() {
            return Err(GatewayError::RemoteBusiness(format!(
                "activation failed: {}",
                resp.remote_error().unwrap_or("license was not activated")
            )));
        }

        let instance_id = resp
            .instance_id()
            .ok_or_else(|| {
                GatewayError::ResponseFormat("activation response has no instance id".to_string())
            })?
            .to_string();

        let issued_key = match resp.license_key.key.as_str() {
            "" => key,
            issued => issued,
        };

        // Encrypt first so a cipher failure leaves nothing on disk.
        let encrypted = self.cipher.encrypt(&instance_id)?;

        self.store.create_license_record(issued_key).await.inspect_err(|e| {
            if matches!(e, GatewayError::AlreadyActivated) {
                log_license_event(LicenseEvent::ActivationRefused, key, Some("lost activation race"));
            }
        })?;

        if let Err(e) = self.store.write_instance(&encrypted).await {
            error!("Failed to persist instance record, rolling back license record: {e}");
            if let Err(rollback) = self.store.delete_license_record().await {
                error!("Rollback of license record failed: {rollback}");
            }
            return Err(e);
        }

        log_license_event(
            LicenseEvent::Activated,
            key,
            Some(&format!("instance_name={instance_name}")),
        );

        Ok(CheckVerdict::from_license(&resp.license_key, instance_id))
    }

    async fn validate(&self, key: &str, instance_id: &str) -> GatewayResult<CheckVerdict> {
        let resp = self.remote.validate(key, instance_id).await?;

        if !resp.valid {
            let reason = resp.remote_error().unwrap_or("no reason given");
            log_license_event(LicenseEvent::ValidationFailed, key, Some(reason));
            return Err(GatewayError::RemoteBusiness(format!(
                "license not valid: {reason}"
            )));
        }

        log_license_event(
            LicenseEvent::Validated,
            key,
            Some(resp.license_key.status.as_str()),
        );

        let id = resp.instance_id().unwrap_or(instance_id);
        Ok(CheckVerdict::from_license(&resp.license_key, id))
    }

    /// Release the stored instance on the remote and remove both local records.
    ///
    /// Local records are only removed after the remote confirms.
    pub async fn deactivate(&self, key: &str) -> GatewayResult<()> {
        let record = self
            .store
            .read_instance()
            .await
            .ok_or(GatewayError::NoStoredInstance)?;

        let instance_id = self.cipher.decrypt(&record.encrypted_id)?;

        let resp = self.remote.deactivate(key, &instance_id).await?;
        if !resp.deactivated {
            return Err(GatewayError::RemoteBusiness(format!(
                "failed to deactivate: {}",
                resp.remote_error().unwrap_or("license was not deactivated")
            )));
        }

        // Attempt both removals even if the first fails.
        let instance_removed = self.store.delete_instance().await;
        let license_removed = self.store.delete_license_record().await;

        log_license_event(LicenseEvent::Deactivated, key, None);

        instance_removed?;
        license_removed?;
        info!("Local license records cleared");
        Ok(())
    }

    /// The license key recorded by the last successful activation.
    pub async fn stored_license(&self) -> GatewayResult<StoredLicense> {
        self.store.read_license_record().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn license(status: LicenseStatus, expires_at: Option<&str>) -> LicenseKey {
        LicenseKey {
            status,
            expires_at: expires_at.map(str::to_string),
            ..LicenseKey::default()
        }
    }

    const NOW: &str = "2026-10-19T12:00:00Z";

    #[test]
    fn active_without_expiry_is_premium() {
        assert!(is_premium(&license(LicenseStatus::Active, None), NOW));
        assert!(is_premium(&license(LicenseStatus::Active, Some("")), NOW));
    }

    #[test]
    fn expiry_must_be_strictly_in_the_future() {
        assert!(!is_premium(
            &license(LicenseStatus::Active, Some("2000-01-01T00:00:00Z")),
            NOW
        ));
        assert!(!is_premium(&license(LicenseStatus::Active, Some(NOW)), NOW));
        assert!(is_premium(
            &license(LicenseStatus::Active, Some("2099-01-01T00:00:00.000000Z")),
            NOW
        ));
    }

    #[test]
    fn only_active_status_is_premium() {
        for status in [
            LicenseStatus::Inactive,
            LicenseStatus::Expired,
            LicenseStatus::Disabled,
            LicenseStatus::Unknown,
        ] {
            assert!(!is_premium(&license(status, None), NOW), "{status:?}");
        }
    }

    #[test]
    fn now_is_rfc3339_utc_seconds() {
        let now = now_iso8601();
        assert_eq!(now.len(), 20);
        assert!(now.ends_with('Z'));
        assert_eq!(&now[10..11], "T");
    }

    #[test]
    fn failed_verdict_serializes_error_only_when_present() {
        let ok = CheckVerdict {
            premium: true,
            instance_id: "abc".into(),
            expires_at: String::new(),
            error: None,
        };
        let json = serde_json::to_value(&ok).unwrap();
        assert!(json.get("error").is_none());
        assert_eq!(json["expires_at"], "");

        let failed = CheckVerdict::failed(&GatewayError::AlreadyActivated);
        let json = serde_json::to_value(&failed).unwrap();
        assert_eq!(json["premium"], false);
        assert_eq!(json["error"], "license already activated on this machine");
    }
}
