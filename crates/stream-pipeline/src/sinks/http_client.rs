//! Sends each message as one HTTP request.
//!
//! A single-part message is sent as the raw body; a message with several
//! parts becomes one `multipart/mixed` body, so a message is accepted or
//! refused as a whole.

use crate::config::{HttpClientConfig, RetryConfig};
use crate::error::{PipelineError, PipelineResult};
use async_trait::async_trait;
use fallback_output::{Sink, SinkError};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{Client, Method};
use std::time::Duration;
use tracing::{debug, warn};
use transaction_protocol::Message;
use uuid::Uuid;

pub struct HttpClientSink {
    label: String,
    client: Client,
    url: String,
    method: Method,
    headers: HeaderMap,
    retry: RetryConfig,
}

impl HttpClientSink {
    /// The URL is not checked here; a bad URL fails each attempt instead.
    pub fn new(label: &str, config: &HttpClientConfig) -> PipelineResult<Self> {
        let method = Method::from_bytes(config.verb.to_uppercase().as_bytes())
            .map_err(|_| PipelineError::config(format!("invalid HTTP verb '{}'", config.verb)))?;

        let mut headers = HeaderMap::new();
        for (name, value) in &config.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|_| PipelineError::config(format!("invalid header name '{}'", name)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|_| PipelineError::config(format!("invalid value for header '{}'", name)))?;
            headers.insert(name, value);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()?;

        Ok(Self {
            label: label.to_string(),
            client,
            url: config.url.clone(),
            method,
            headers,
            retry: config.retry.clone(),
        })
    }

    /// Send one request body, retrying with exponential backoff.
    async fn send_with_retry(&self, body: &RequestBody) -> Result<(), SinkError> {
        let mut attempt = 0;
        let mut delay = self.retry.initial_retry_delay_ms;

        loop {
            attempt += 1;

            match self.try_send(body).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    if attempt > self.retry.max_retries {
                        return Err(e);
                    }

                    warn!(
                        target_label = %self.label,
                        attempt = attempt,
                        delay_ms = delay,
                        error = %e,
                        "Request failed, retrying"
                    );

                    tokio::time::sleep(Duration::from_millis(delay)).await;

                    // Exponential backoff with cap
                    delay = std::cmp::min(delay.saturating_mul(2), self.retry.max_retry_delay_ms);
                }
            }
        }
    }

    async fn try_send(&self, body: &RequestBody) -> Result<(), SinkError> {
        let mut request = self
            .client
            .request(self.method.clone(), &self.url)
            .headers(self.headers.clone());
        if let Some(content_type) = &body.content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }

        let response = request
            .body(body.bytes.clone())
            .send()
            .await
            .map_err(|e| SinkError::NotConnected(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            debug!(target_label = %self.label, status = %status, "Request accepted");
            Ok(())
        } else {
            let body = response.text().await.unwrap_or_default();
            Err(SinkError::Rejected(format!("HTTP {}: {}", status, body)))
        }
    }
}

#[async_trait]
impl Sink for HttpClientSink {
    fn label(&self) -> &str {
        &self.label
    }

    async fn attempt(&self, message: &Message) -> Result<(), SinkError> {
        let body = RequestBody::from_message(message);
        self.send_with_retry(&body).await
    }
}

struct RequestBody {
    /// Overrides any configured `Content-Type` header
    content_type: Option<String>,
    bytes: Vec<u8>,
}

impl RequestBody {
    fn from_message(message: &Message) -> Self {
        if message.len() == 1 {
            if let Some(part) = message.get(0) {
                return Self {
                    content_type: None,
                    bytes: part.data().to_vec(),
                };
            }
        }

        let boundary = Uuid::new_v4().simple().to_string();
        let mut bytes = Vec::new();
        for part in message {
            bytes.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
            bytes.extend_from_slice(b"Content-Type: application/octet-stream\r\n\r\n");
            bytes.extend_from_slice(part.data());
            bytes.extend_from_slice(b"\r\n");
        }
        bytes.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());

        Self {
            content_type: Some(format!("multipart/mixed; boundary={boundary}")),
            bytes,
        }
    }
}
