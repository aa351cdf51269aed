//! HTTP proxy backend: forwards the uploads to a content-generation service.
//!
//! The service takes a multipart form with a `prompt` text field and one
//! `files` part per upload, renders and prompts on its side, and answers with
//! JSON. The generated text is normally under `response_text`; anything else
//! is passed on verbatim so the extractor can have a go at it.

use super::{GenerationBackend, GenerationRequest, PayloadKind};
use crate::error::VerifyError;
use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

/// Backend that POSTs to a content-generation HTTP endpoint.
pub struct HttpProxyBackend {
    client: reqwest::Client,
    url: String,
    timeout: Duration,
}

impl HttpProxyBackend {
    /// Create a backend for `url`.
    ///
    /// `timeout` is applied at the HTTP client as well as by the invoker, so a
    /// stalled connection is torn down rather than left dangling.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, VerifyError> {
        let url = url.into();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(VerifyError::InvalidConfig(format!(
                "Proxy URL must be http(s): '{}'",
                url
            )));
        }
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| VerifyError::InvalidConfig(format!("HTTP client: {}", e)))?;
        info!("Proxy backend targeting {}", url);
        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn build_form(request: &GenerationRequest) -> Result<Form, VerifyError> {
        let mut form = Form::new().text("prompt", request.prompt.clone());
        for attachment in &request.attachments {
            let part = Part::bytes(attachment.data.clone())
                .file_name(attachment.filename.clone())
                .mime_str(&attachment.mime_type)
                .map_err(|e| {
                    VerifyError::Internal(format!(
                        "Invalid MIME type '{}': {}",
                        attachment.mime_type, e
                    ))
                })?;
            form = form.part("files", part);
        }
        Ok(form)
    }
}

#[async_trait]
impl GenerationBackend for HttpProxyBackend {
    fn name(&self) -> &str {
        "proxy"
    }

    fn payload_kind(&self) -> PayloadKind {
        PayloadKind::OriginalFiles
    }

    async fn generate(&self, request: &GenerationRequest) -> Result<String, VerifyError> {
        let form = Self::build_form(request)?;

        let response = self
            .client
            .post(&self.url)
            .header(reqwest::header::ACCEPT, "application/json")
            .multipart(form)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    VerifyError::BackendTimeout {
                        secs: self.timeout.as_secs(),
                    }
                } else {
                    VerifyError::Backend(format!("Request to {} failed: {}", self.url, e))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(VerifyError::Backend(format!(
                "HTTP {} from {}: {}",
                status,
                self.url,
                truncate(&body, 200)
            )));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| VerifyError::Backend(format!("Unreadable reply from {}: {}", self.url, e)))?;
        debug!("Proxy reply received from {}", self.url);
        Ok(response_text_of(body))
    }
}

/// Pull the generated text out of a proxy reply.
pub fn response_text_of(body: Value) -> String {
    match body {
        Value::Object(mut map) => match map.remove("response_text") {
            Some(Value::String(text)) => text,
            Some(other) => other.to_string(),
            None => Value::Object(map).to_string(),
        },
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
