//! Secret resolution from Google Secret Manager.
//!
//! Secrets are versioned payloads addressed by project and id. Payloads
//! arrive base64-encoded; a payload that parses as a JSON object is
//! exposed structured (service account keys, token bundles), anything
//! else is raw text (bare access tokens).

use async_trait::async_trait;
use base64::Engine;
use serde::Deserialize;
use serde_json::Value;
use snafu::prelude::*;
use tracing::debug;

use crate::emit;
use crate::error::{
    AccessDeniedSnafu, AccessRequestSnafu, PayloadDecodeSnafu, PayloadShapeSnafu,
    PayloadUtf8Snafu, SecretError, SecretTokenSnafu,
};
use crate::google::auth::{access_token, GoogleAuthenticator};
use crate::metrics::events::SecretResolved;

const SECRET_MANAGER_SCOPE: &str = "https://www.googleapis.com/auth/cloud-platform";

/// A decoded secret payload.
#[derive(Debug, Clone, PartialEq)]
pub enum SecretPayload {
    /// Payload that parsed as a JSON object.
    Json(serde_json::Map<String, Value>),
    /// Anything else, verbatim.
    Text(String),
}

impl SecretPayload {
    /// Classify a raw payload string.
    pub fn parse(raw: String) -> Self {
        match serde_json::from_str::<Value>(&raw) {
            Ok(Value::Object(map)) => SecretPayload::Json(map),
            _ => SecretPayload::Text(raw),
        }
    }

    /// The payload as a service account key JSON string.
    ///
    /// Only structured payloads qualify; a bare-text secret cannot hold a
    /// key.
    pub fn service_account_json(&self, secret_id: &str) -> Result<String, SecretError> {
        match self {
            SecretPayload::Json(map) => Ok(Value::Object(map.clone()).to_string()),
            SecretPayload::Text(_) => PayloadShapeSnafu {
                secret_id,
                message: "expected a service account JSON payload".to_string(),
            }
            .fail(),
        }
    }

    /// An access token carried either as a bare string or under the
    /// `access_token` key of a structured payload.
    pub fn extract_access_token(&self, secret_id: &str) -> Result<String, SecretError> {
        let token = match self {
            SecretPayload::Text(text) => Some(text.clone()),
            SecretPayload::Json(map) => map
                .get("access_token")
                .and_then(Value::as_str)
                .map(String::from),
        };

        token
            .filter(|t| !t.is_empty())
            .context(PayloadShapeSnafu {
                secret_id,
                message: "access token was not found in the secret payload".to_string(),
            })
    }

    /// A named string field of a structured payload.
    pub fn string_field(&self, secret_id: &str, field: &str) -> Result<String, SecretError> {
        match self {
            SecretPayload::Json(map) => map
                .get(field)
                .and_then(Value::as_str)
                .map(String::from)
                .context(PayloadShapeSnafu {
                    secret_id,
                    message: format!("missing field {field}"),
                }),
            SecretPayload::Text(_) => PayloadShapeSnafu {
                secret_id,
                message: format!("expected a JSON payload with field {field}"),
            }
            .fail(),
        }
    }
}

/// Resolves versioned secrets by project and id.
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Fetch and decode one secret version (`"latest"` unless pinned).
    async fn resolve(
        &self,
        project_id: &str,
        secret_id: &str,
        version: &str,
    ) -> Result<SecretPayload, SecretError>;
}

#[derive(Debug, Deserialize)]
struct AccessResponse {
    payload: AccessPayload,
}

#[derive(Debug, Deserialize)]
struct AccessPayload {
    data: String,
}

/// Secret Manager REST resolver running on the host's own credentials.
pub struct SecretManagerResolver {
    http: reqwest::Client,
    auth: GoogleAuthenticator,
}

impl SecretManagerResolver {
    pub fn new(http: reqwest::Client, auth: GoogleAuthenticator) -> Self {
        Self { http, auth }
    }
}

#[async_trait]
impl SecretResolver for SecretManagerResolver {
    async fn resolve(
        &self,
        project_id: &str,
        secret_id: &str,
        version: &str,
    ) -> Result<SecretPayload, SecretError> {
        let token = access_token(&self.auth, &[SECRET_MANAGER_SCOPE])
            .await
            .context(SecretTokenSnafu)?;

        let url = format!(
            "https://secretmanager.googleapis.com/v1/projects/{project_id}/secrets/{secret_id}/versions/{version}:access"
        );
        let response = self
            .http
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .context(AccessRequestSnafu { secret_id })?;

        let status = response.status();
        ensure!(
            status.is_success(),
            AccessDeniedSnafu {
                secret_id,
                status: status.as_u16(),
            }
        );

        let body: AccessResponse = response
            .json()
            .await
            .context(AccessRequestSnafu { secret_id })?;

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(body.payload.data)
            .context(PayloadDecodeSnafu { secret_id })?;
        let text = String::from_utf8(decoded).context(PayloadUtf8Snafu { secret_id })?;

        emit!(SecretResolved);
        debug!(secret_id, version, "Secret version resolved");
        Ok(SecretPayload::parse(text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_object_payload_is_structured() {
        let payload =
            SecretPayload::parse(r#"{"access_token": "tok", "client_id": "c"}"#.to_string());
        assert!(matches!(payload, SecretPayload::Json(_)));
        assert_eq!(payload.extract_access_token("s").unwrap(), "tok");
        assert_eq!(payload.string_field("s", "client_id").unwrap(), "c");
    }

    #[test]
    fn bare_token_payload_is_text() {
        let payload = SecretPayload::parse("raw-token-value".to_string());
        assert_eq!(
            payload,
            SecretPayload::Text("raw-token-value".to_string())
        );
        assert_eq!(payload.extract_access_token("s").unwrap(), "raw-token-value");
    }

    #[test]
    fn json_array_payload_stays_text() {
        let payload = SecretPayload::parse("[1, 2, 3]".to_string());
        assert!(matches!(payload, SecretPayload::Text(_)));
    }

    #[test]
    fn text_payload_is_not_a_service_account() {
        let payload = SecretPayload::parse("raw".to_string());
        assert!(payload.service_account_json("s").is_err());
    }

    #[test]
    fn service_account_json_round_trips() {
        let payload = SecretPayload::parse(
            r#"{"type": "service_account", "project_id": "p"}"#.to_string(),
        );
        let rendered = payload.service_account_json("s").unwrap();
        let parsed: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["type"], json!("service_account"));
    }

    #[test]
    fn empty_access_token_is_rejected() {
        let payload = SecretPayload::parse(r#"{"access_token": ""}"#.to_string());
        assert!(payload.extract_access_token("s").is_err());
    }
}
