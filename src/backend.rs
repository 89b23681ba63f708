//! The conversion backend: where frame streams come from.
//!
//! [`ConversionBackend`] is the seam between a session and the network. The
//! production implementation, [`HttpBackend`], talks to the conversion
//! service over HTTP:
//!
//! | Request                 | Endpoint                                 |
//! |-------------------------|------------------------------------------|
//! | file conversion         | `POST /convert-stream` (multipart `file`) |
//! | URL conversion          | `GET /convert-url-stream?url=…`          |
//! | is a key stored?        | `GET /check-api-key`                     |
//! | store a key             | `POST /save-api-key`                     |
//! | forget the key          | `POST /reset-api-key`                    |
//!
//! Tests substitute scripted backends that replay byte fragments.

use crate::config::ClientConfig;
use crate::error::{MarkstreamError, TransportError};
use crate::input::ConversionRequest;
use crate::pipeline::parser::ByteStream;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Opens the frame transport for a conversion request.
#[async_trait]
pub trait ConversionBackend: Send + Sync {
    /// Submit the request and return the response body as raw fragments.
    ///
    /// Resolves once the backend has accepted the request (response headers
    /// received). A non-success response is a [`TransportError::Rejected`].
    async fn open(&self, request: &ConversionRequest) -> Result<ByteStream, TransportError>;
}

/// HTTP client for the conversion service.
#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    config: ClientConfig,
}

#[derive(Deserialize)]
struct HasKeyResponse {
    #[serde(rename = "hasKey")]
    has_key: bool,
}

#[derive(Deserialize)]
struct SuccessResponse {
    #[serde(default)]
    success: bool,
}

#[derive(Serialize)]
struct SaveKeyRequest<'a> {
    key: &'a str,
}

impl HttpBackend {
    pub fn new(config: &ClientConfig) -> Result<Self, MarkstreamError> {
        // No overall request timeout: conversions stream for minutes. Silence
        // is bounded per frame by the session instead.
        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .build()
            .map_err(|e| MarkstreamError::Internal(format!("HTTP client: {e}")))?;
        Ok(Self {
            client,
            config: config.clone(),
        })
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Ask the backend whether an API key is stored.
    pub async fn has_api_key(&self) -> Result<bool, MarkstreamError> {
        let url = self.config.endpoint("check-api-key");
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| credential_error(&url, e))?;
        let body: HasKeyResponse = response
            .error_for_status()
            .map_err(|e| credential_error(&url, e))?
            .json()
            .await
            .map_err(|e| credential_error(&url, e))?;
        debug!("Backend reports hasKey={}", body.has_key);
        Ok(body.has_key)
    }

    /// Store an API key on the backend.
    pub async fn save_api_key(&self, key: &str) -> Result<(), MarkstreamError> {
        if key.trim().is_empty() {
            return Err(MarkstreamError::InvalidConfig(
                "Please enter an API key".into(),
            ));
        }
        let url = self.config.endpoint("save-api-key");
        let response = self
            .client
            .post(&url)
            .json(&SaveKeyRequest { key })
            .send()
            .await
            .map_err(|e| credential_error(&url, e))?;
        self.expect_success(&url, response).await?;
        info!("API key saved on backend");
        Ok(())
    }

    /// Remove the stored API key.
    pub async fn reset_api_key(&self) -> Result<(), MarkstreamError> {
        let url = self.config.endpoint("reset-api-key");
        let response = self
            .client
            .post(&url)
            .send()
            .await
            .map_err(|e| credential_error(&url, e))?;
        self.expect_success(&url, response).await?;
        info!("API key reset on backend");
        Ok(())
    }

    async fn expect_success(
        &self,
        url: &str,
        response: reqwest::Response,
    ) -> Result<(), MarkstreamError> {
        let body: SuccessResponse = response
            .error_for_status()
            .map_err(|e| credential_error(url, e))?
            .json()
            .await
            .map_err(|e| credential_error(url, e))?;
        if body.success {
            Ok(())
        } else {
            Err(MarkstreamError::CredentialRequestFailed {
                url: url.to_string(),
                reason: "backend did not report success".into(),
            })
        }
    }

    async fn build_request(
        &self,
        request: &ConversionRequest,
    ) -> Result<(String, reqwest::RequestBuilder), TransportError> {
        match request {
            ConversionRequest::File(path) => {
                let url = self.config.endpoint("convert-stream");
                let bytes = tokio::fs::read(path)
                    .await
                    .map_err(|e| TransportError::Request(format!("{}: {e}", path.display())))?;
                let filename = path
                    .file_name()
                    .map(|n| n.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "document".to_string());
                debug!("Uploading {} ({} bytes)", filename, bytes.len());
                let part = reqwest::multipart::Part::bytes(bytes).file_name(filename);
                let form = reqwest::multipart::Form::new().part("file", part);
                let builder = self.client.post(&url).multipart(form);
                Ok((url, builder))
            }
            ConversionRequest::Url(target) => {
                let url = self.config.endpoint("convert-url-stream");
                let builder = self
                    .client
                    .get(&url)
                    .query(&[("url", target.as_str())]);
                Ok((url, builder))
            }
        }
    }
}

#[async_trait]
impl ConversionBackend for HttpBackend {
    async fn open(&self, request: &ConversionRequest) -> Result<ByteStream, TransportError> {
        let (url, builder) = self.build_request(request).await?;
        info!("Opening conversion stream: {} → {}", request, url);

        let response = builder.send().await.map_err(|e| TransportError::Connect {
            url: url.clone(),
            reason: e.to_string(),
        })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let detail = rejection_detail(status.as_u16(), &body);
            warn!("Backend rejected request: HTTP {}: {}", status, detail);
            return Err(TransportError::Rejected {
                status: status.as_u16(),
                detail,
            });
        }

        let stream = response.bytes_stream().map(|r| {
            r.map_err(|e| TransportError::Disconnected {
                reason: e.to_string(),
            })
        });
        Ok(Box::pin(stream))
    }
}

fn credential_error(url: &str, e: reqwest::Error) -> MarkstreamError {
    MarkstreamError::CredentialRequestFailed {
        url: url.to_string(),
        reason: e.to_string(),
    }
}

/// Pull a human-readable message out of a failed response body.
///
/// Tries JSON `error` / `detail` / `message` keys first, then a short plain
/// body, then falls back to a generic line naming the status code.
pub fn rejection_detail(status: u16, body: &str) -> String {
    if let Ok(value) = serde_json::from_str::<serde_json::Value>(body) {
        for key in ["error", "detail", "message"] {
            if let Some(msg) = value.get(key).and_then(|v| v.as_str()) {
                if !msg.trim().is_empty() {
                    return msg.trim().to_string();
                }
            }
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() && trimmed.len() <= 300 && !trimmed.starts_with('<') {
        return trimmed.to_string();
    }

    format!("Conversion request failed (HTTP {status})")
}
