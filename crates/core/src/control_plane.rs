//! Control-plane client that hands out signed upload URLs

use crate::config::ControlPlaneConfig;
use crate::error::{Error, Result};
use reqwest::{Client, Response};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tracing::debug;

/// Path of the "create direct upload" call on the control plane
const UPLOADS_PATH: &str = "/on-demand/uploads/v2";

/// Control-plane API client
pub struct ControlPlaneClient {
    endpoint: String,
    token_id: String,
    secret_key: String,
    http_client: Client,
}

impl ControlPlaneClient {
    /// Create a new control-plane client
    pub fn new(endpoint: String, token_id: String, secret_key: String) -> Self {
        Self {
            endpoint: endpoint.trim_end_matches('/').to_string(),
            token_id,
            secret_key,
            http_client: Client::new(),
        }
    }

    pub fn from_config(config: &ControlPlaneConfig) -> Self {
        Self::new(
            config.endpoint.clone(),
            config.token_id.clone(),
            config.secret_key.clone(),
        )
    }

    /// Ask for a fresh signed URL to PUT a file to
    pub async fn create_upload(&self, request: &CreateUploadRequest) -> Result<SignedUpload> {
        let url = format!("{}{}", self.endpoint, UPLOADS_PATH);
        debug!(%url, "requesting signed upload url");

        let response = self
            .http_client
            .post(&url)
            .basic_auth(&self.token_id, Some(&self.secret_key))
            .header("Content-Type", "application/json")
            .json(request)
            .send()
            .await?;

        self.handle_response(response).await
    }

    async fn handle_response<T: for<'de> Deserialize<'de>>(&self, response: Response) -> Result<T> {
        let status = response.status();

        if status.is_success() {
            let envelope: ApiResponse<T> = response.json().await?;
            Ok(envelope.data)
        } else if status.as_u16() == 401 || status.as_u16() == 403 {
            Err(Error::Authentication(
                "Control plane rejected the token id / secret key".to_string(),
            ))
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(Error::ControlPlane(format!(
                "HTTP {}: {}",
                status.as_u16(),
                error_text
            )))
        }
    }
}

/// Control-plane response wrapper
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    data: T,
}

/// Body of the create-upload call
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUploadRequest {
    pub cors_origin: String,
    pub push_media_settings: PushMediaSettings,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PushMediaSettings {
    pub access_policy: String,
    pub max_resolution: String,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, String>,
}

impl Default for CreateUploadRequest {
    fn default() -> Self {
        Self {
            cors_origin: "*".to_string(),
            push_media_settings: PushMediaSettings {
                access_policy: "public".to_string(),
                max_resolution: "2160p".to_string(),
                metadata: BTreeMap::new(),
            },
        }
    }
}

impl CreateUploadRequest {
    pub fn access_policy(mut self, policy: impl Into<String>) -> Self {
        self.push_media_settings.access_policy = policy.into();
        self
    }

    pub fn max_resolution(mut self, resolution: impl Into<String>) -> Self {
        self.push_media_settings.max_resolution = resolution.into();
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push_media_settings
            .metadata
            .insert(key.into(), value.into());
        self
    }
}

/// Signed destination returned by the control plane
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedUpload {
    #[serde(default)]
    pub upload_id: Option<String>,
    pub url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_trims_trailing_slash() {
        let client = ControlPlaneClient::new(
            "https://api.example.com/".to_string(),
            "id".to_string(),
            "secret".to_string(),
        );
        assert_eq!(client.endpoint, "https://api.example.com");
        assert_eq!(client.token_id, "id");
    }

    #[test]
    fn test_default_request_body() {
        let body = serde_json::to_value(CreateUploadRequest::default()).unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "corsOrigin": "*",
                "pushMediaSettings": {
                    "accessPolicy": "public",
                    "maxResolution": "2160p"
                }
            })
        );
    }

    #[test]
    fn test_request_with_metadata() {
        let request = CreateUploadRequest::default()
            .access_policy("private")
            .metadata("source", "cli");
        let body = serde_json::to_value(request).unwrap();
        assert_eq!(body["pushMediaSettings"]["accessPolicy"], "private");
        assert_eq!(body["pushMediaSettings"]["metadata"]["source"], "cli");
    }

    #[test]
    fn test_signed_upload_parsing() {
        let envelope: ApiResponse<SignedUpload> = serde_json::from_str(
            r#"{"success": true, "data": {"uploadId": "u-1", "url": "https://storage.example.com/put?sig=1", "timeout": 3600}}"#,
        )
        .unwrap();
        assert_eq!(envelope.data.upload_id.as_deref(), Some("u-1"));
        assert_eq!(envelope.data.url, "https://storage.example.com/put?sig=1");
    }
}
