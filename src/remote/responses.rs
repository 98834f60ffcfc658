//! Wire types for the remote license API.
//!
//! These match the JSON bodies returned by `/activate`, `/validate` and
//! `/deactivate`. Every field is optional or defaulted: the remote omits or
//! nulls fields freely depending on the outcome, and a missing field must not
//! be mistaken for a malformed body.

use serde::{Deserialize, Deserializer, Serialize};

/// Treat an explicit `null` like a missing field.
fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

/// Status of a license key as reported by the remote service.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LicenseStatus {
    Active,
    Inactive,
    Expired,
    Disabled,
    /// Any status this gateway does not know about.
    #[default]
    #[serde(other)]
    Unknown,
}

impl LicenseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            LicenseStatus::Active => "active",
            LicenseStatus::Inactive => "inactive",
            LicenseStatus::Expired => "expired",
            LicenseStatus::Disabled => "disabled",
            LicenseStatus::Unknown => "unknown",
        }
    }
}

/// The license credential issued by the remote service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LicenseKey {
    #[serde(deserialize_with = "null_as_default")]
    pub id: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub status: LicenseStatus,
    #[serde(deserialize_with = "null_as_default")]
    pub key: String,
    /// `None` means unlimited activations.
    pub activation_limit: Option<u32>,
    #[serde(deserialize_with = "null_as_default")]
    pub activation_usage: u32,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: String,
    /// `None` or empty means the key never expires.
    pub expires_at: Option<String>,
}

impl LicenseKey {
    /// Expiry as the gateway reports it: empty when the key never expires.
    pub fn expiry(&self) -> &str {
        self.expires_at.as_deref().unwrap_or("")
    }
}

/// One activation of a license on one machine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Instance {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(deserialize_with = "null_as_default")]
    pub name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub created_at: String,
}

/// Order and customer context attached to activate/validate responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Meta {
    #[serde(deserialize_with = "null_as_default")]
    pub store_id: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub order_id: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub order_item_id: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub product_id: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub product_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub variant_id: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub variant_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub customer_id: u64,
    #[serde(deserialize_with = "null_as_default")]
    pub customer_name: String,
    #[serde(deserialize_with = "null_as_default")]
    pub customer_email: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ActivateResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub activated: bool,
    pub error: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub license_key: LicenseKey,
    pub instance: Option<Instance>,
    pub meta: Option<Meta>,
}

/// Remote error text, ignoring `null` and empty strings.
fn remote_error(error: &Option<String>) -> Option<&str> {
    error.as_deref().filter(|e| !e.is_empty())
}

/// Instance id, ignoring a missing instance or an empty id.
fn instance_id(instance: &Option<Instance>) -> Option<&str> {
    instance.as_ref().map(|i| i.id.as_str()).filter(|id| !id.is_empty())
}

impl ActivateResponse {
    pub fn remote_error(&self) -> Option<&str> {
        remote_error(&self.error)
    }

    pub fn instance_id(&self) -> Option<&str> {
        instance_id(&self.instance)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidateResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub valid: bool,
    pub error: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub license_key: LicenseKey,
    pub instance: Option<Instance>,
    pub meta: Option<Meta>,
}

impl ValidateResponse {
    pub fn remote_error(&self) -> Option<&str> {
        remote_error(&self.error)
    }

    pub fn instance_id(&self) -> Option<&str> {
        instance_id(&self.instance)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DeactivateResponse {
    #[serde(deserialize_with = "null_as_default")]
    pub deactivated: bool,
    pub error: Option<String>,
    pub license_key: Option<LicenseKey>,
    pub meta: Option<Meta>,
}

impl DeactivateResponse {
    pub fn remote_error(&self) -> Option<&str> {
        remote_error(&self.error)
    }
}

/// Body of a non-2xx response when nothing richer can be parsed.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ErrorBody {
    pub error: Option<String>,
}
