//! Model backend gateway
//!
//! Sends a prompt to the configured backend and normalizes the reply.
//! In local mode a failed local request is retried once against the remote
//! backend; remote failures come back as an `Error: ...` string rather than
//! an `Err`, so the caller always has text to send.

mod response;

use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

pub use response::{LOCAL_SHAPES, REMOTE_SHAPES, ResponseShape, extract_text};

use crate::Result;
use crate::config::{BackendConfig, BackendMode};

/// Longest error body echoed back in a failure message
const MAX_ERROR_BODY_CHARS: usize = 200;

/// Why a single backend attempt failed
#[derive(Debug, Error)]
pub enum BackendError {
    /// Network or protocol failure before a response arrived
    #[error("request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// Backend answered with a non-success status
    #[error("HTTP status {status}: {body}")]
    Status {
        /// Response status
        status: StatusCode,
        /// Start of the response body
        body: String,
    },

    /// 2xx response without the expected fields
    #[error("invalid response structure: {0}")]
    Malformed(String),
}

/// Anything that can turn a prompt into reply text
///
/// Implementations never fail: backend problems come back as text.
#[async_trait]
pub trait Completion: Send + Sync {
    /// Produce a completion for `prompt`
    async fn complete(&self, prompt: &str) -> String;
}

#[derive(Serialize)]
struct LocalRequest<'a> {
    prompt: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: Option<&'a str>,
    messages: [ChatMessage<'a>; 1],
    stop: Option<&'a str>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

/// HTTP gateway to the local and remote model backends
pub struct ModelGateway {
    config: Arc<BackendConfig>,
    client: Client,
    headers: HeaderMap,
}

impl ModelGateway {
    /// Create a gateway for `config`
    ///
    /// Header entries that are not valid HTTP headers are dropped with a warning.
    ///
    /// # Errors
    ///
    /// Returns error if the HTTP client cannot be built
    pub fn new(config: Arc<BackendConfig>) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        let headers = build_headers(&config);
        Ok(Self {
            config,
            client,
            headers,
        })
    }

    /// Backend configuration in use
    #[must_use]
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    /// One attempt against the local backend
    ///
    /// # Errors
    ///
    /// Returns the reason the attempt failed
    pub async fn send_local(&self, prompt: &str) -> std::result::Result<String, BackendError> {
        let url = self.config.local_url();
        let body = self
            .post_json(&url, self.headers.clone(), &LocalRequest { prompt })
            .await?;

        let (shape, text) = extract_text(&body, LOCAL_SHAPES)
            .ok_or_else(|| BackendError::Malformed("no generated text in local response".to_string()))?;
        tracing::debug!(?shape, "local completion received");

        let text = text.trim();
        if text.is_empty() {
            return Err(BackendError::Malformed("local response text is blank".to_string()));
        }
        Ok(text.to_string())
    }

    /// One attempt against the remote chat-completion backend
    ///
    /// # Errors
    ///
    /// Returns the reason the attempt failed
    pub async fn send_remote(&self, prompt: &str) -> std::result::Result<String, BackendError> {
        let mut headers = self.headers.clone();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let request = ChatRequest {
            model: self.config.model.as_deref(),
            messages: [ChatMessage {
                role: "user",
                content: prompt,
            }],
            stop: self.config.stop_sequence.as_deref(),
        };

        let body = self
            .post_json(&self.config.remote_address, headers, &request)
            .await?;

        extract_text(&body, REMOTE_SHAPES)
            .map(|(_, text)| text)
            .ok_or_else(|| BackendError::Malformed("no choices in remote response".to_string()))
    }

    async fn post_json<B: Serialize + Sync>(
        &self,
        url: &str,
        headers: HeaderMap,
        body: &B,
    ) -> std::result::Result<Value, BackendError> {
        let response = self.client.post(url).headers(headers).json(body).send().await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Status {
                status,
                body: body.chars().take(MAX_ERROR_BODY_CHARS).collect(),
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| BackendError::Malformed(format!("body is not JSON: {e}")))
    }
}

#[async_trait]
impl Completion for ModelGateway {
    async fn complete(&self, prompt: &str) -> String {
        let outcome = match self.config.mode {
            BackendMode::Local => match self.send_local(prompt).await {
                Ok(text) => Ok(text),
                Err(e) => {
                    tracing::warn!(error = %e, "local model failed, trying remote");
                    self.send_remote(prompt).await
                }
            },
            BackendMode::Remote => self.send_remote(prompt).await,
        };

        outcome.unwrap_or_else(|e| {
            tracing::error!(error = %e, "completion failed");
            format!("Error: {e}")
        })
    }
}

fn build_headers(config: &BackendConfig) -> HeaderMap {
    let mut headers = HeaderMap::new();

    for (name, value) in &config.headers {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                headers.insert(name, value);
            }
            _ => tracing::warn!(header = %name, "ignoring invalid backend header"),
        }
    }

    if let Some(auth) = &config.authorization {
        match HeaderValue::from_str(auth) {
            Ok(mut value) => {
                value.set_sensitive(true);
                headers.insert(AUTHORIZATION, value);
            }
            Err(_) => tracing::warn!("ignoring invalid authorization header"),
        }
    }

    headers
}
