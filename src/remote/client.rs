//! HTTP client for the remote license API.
//!
//! All three operations are form-encoded POSTs answered with JSON. The client
//! never retries and never touches local state; it only turns HTTP exchanges
//! into parsed responses or [`GatewayError`]s.

use std::time::Duration;

use reqwest::{header, Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::config::RemoteConfig;
use crate::errors::{GatewayError, GatewayResult};
use crate::remote::responses::{ActivateResponse, DeactivateResponse, ErrorBody, ValidateResponse};

#[derive(Debug, Clone)]
pub struct RemoteLicenseClient {
    http: Client,
    base_url: String,
}

impl RemoteLicenseClient {
    /// Build a client for `base_url` with a per-request timeout.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> GatewayResult<Self> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("license-gateway/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| GatewayError::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &RemoteConfig) -> GatewayResult<Self> {
        Self::new(
            config.base_url.clone(),
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// `POST {base}/activate` with `license_key` and `instance_name`.
    ///
    /// A 2xx body is returned as-is for the caller to inspect `activated`.
    /// Any 4xx/5xx becomes `RemoteBusiness` carrying the remote error text.
    pub async fn activate(
        &self,
        license_key: &str,
        instance_name: &str,
    ) -> GatewayResult<ActivateResponse> {
        let resp = self
            .post_form(
                "activate",
                &[("license_key", license_key), ("instance_name", instance_name)],
            )
            .await
            .map_err(|e| GatewayError::transport("activation failed", e))?;

        let status = resp.status();
        let body = read_body(resp, "activate").await?;

        if status.is_success() {
            return parse(&body);
        }

        if status.is_client_error() || status.is_server_error() {
            let err: ErrorBody = parse(&body)?;
            return Err(GatewayError::RemoteBusiness(format!(
                "activation failed: {}",
                err.error.unwrap_or_else(|| status_text(status))
            )));
        }

        Err(GatewayError::RemoteBusiness(format!(
            "activation failed: unexpected status code {}",
            status.as_u16()
        )))
    }

    /// `POST {base}/validate` with `license_key` and `instance_id`.
    ///
    /// The remote reports unknown keys and instances as `valid: false` with
    /// a 4xx, so the body is parsed regardless of status.
    pub async fn validate(
        &self,
        license_key: &str,
        instance_id: &str,
    ) -> GatewayResult<ValidateResponse> {
        let resp = self
            .post_form(
                "validate",
                &[("license_key", license_key), ("instance_id", instance_id)],
            )
            .await
            .map_err(|e| GatewayError::transport("validation failed", e))?;

        let body = read_body(resp, "validate").await?;
        parse(&body)
    }

    /// `POST {base}/deactivate` with `license_key` and `instance_id`.
    pub async fn deactivate(
        &self,
        license_key: &str,
        instance_id: &str,
    ) -> GatewayResult<DeactivateResponse> {
        let resp = self
            .post_form(
                "deactivate",
                &[("license_key", license_key), ("instance_id", instance_id)],
            )
            .await
            .map_err(|e| GatewayError::transport("deactivation failed", e))?;

        let body = read_body(resp, "deactivate").await?;
        parse(&body)
    }

    async fn post_form(&self, op: &str, form: &[(&str, &str)]) -> reqwest::Result<Response> {
        self.http
            .post(format!("{}/{}", self.base_url, op))
            .header(header::ACCEPT, "application/json")
            .form(form)
            .send()
            .await
    }
}

async fn read_body(resp: Response, label: &str) -> GatewayResult<String> {
    let status = resp.status();
    let body = resp
        .text()
        .await
        .map_err(|e| GatewayError::transport("failed to read response body", e))?;
    debug!(op = label, status = status.as_u16(), body = %body, "Remote license API response");
    Ok(body)
}

fn parse<T: DeserializeOwned>(body: &str) -> GatewayResult<T> {
    serde_json::from_str(body).map_err(|e| GatewayError::ResponseFormat(e.to_string()))
}

fn status_text(status: StatusCode) -> String {
    status
        .canonical_reason()
        .map(str::to_string)
        .unwrap_or_else(|| format!("HTTP {}", status.as_u16()))
}
