//! HTTP transport to the device's web server.
//!
//! The firmware serves its control API as `GET <base>/api/<payload>` where
//! the payload is the request JSON, UTF-8 encoded and hex'd into a single
//! path segment. Replies are plain JSON bodies; errors come back as a
//! non-2xx status with a `{"code": "..."}` envelope. This framing must not
//! change: it is what deployed firmwares understand.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::EngineConfig;
use crate::protocol::Request;
use crate::traits::{DeviceTransport, Notifier, TracingNotifier};
use crate::{Error, Result};

/// Builds the request path segment: `api/` + hex of the canonical JSON.
pub fn api_path(request: &Request) -> Result<String> {
    let body = serde_json::to_vec(request)?;
    Ok(format!("api/{}", hex::encode(body)))
}

pub struct HttpDevice {
    base_url: String,
    client: reqwest::Client,
    notifier: Arc<dyn Notifier>,
}

impl HttpDevice {
    pub fn new(config: &EngineConfig) -> Result<Self> {
        Self::with_notifier(config, Arc::new(TracingNotifier))
    }

    pub fn with_notifier(config: &EngineConfig, notifier: Arc<dyn Notifier>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        // The firmware concatenates base + "api/..." without a separator.
        let mut base_url = config.base_url.clone();
        if !base_url.ends_with('/') {
            base_url.push('/');
        }
        Ok(HttpDevice {
            base_url,
            client,
            notifier,
        })
    }

    async fn call_inner(&self, request: &Request) -> Result<Value> {
        let url = format!("{}{}", self.base_url, api_path(request)?);
        tracing::debug!(op = request.op(), "device call");

        let response = self.client.get(&url).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            // The device wraps errors as {"code": "500 Internal server error"}.
            let code = serde_json::from_str::<Value>(&body)
                .ok()
                .and_then(|envelope| envelope.get("code").and_then(Value::as_str).map(String::from))
                .unwrap_or_else(|| status.to_string());
            return Err(Error::DeviceRejected(code));
        }

        Ok(serde_json::from_str(&body)?)
    }
}

#[async_trait]
impl DeviceTransport for HttpDevice {
    async fn call(&self, request: &Request) -> Result<Value> {
        let result = self.call_inner(request).await;
        if let Err(err) = &result {
            // Surfaced exactly once per failed call; callers do not re-report.
            self.notifier.notify_error(&err.to_string());
        }
        result
    }
}
