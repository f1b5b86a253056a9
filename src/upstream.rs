//! Client side of the vLLM OpenAI-compatible chat-completions API.

use crate::model::ChatMessage;
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Serialize)]
pub struct ChatRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub stream: bool,
}

/// Transport failure, non-2xx status, or a body that is not JSON.
#[derive(Debug, Error)]
#[error("{0}")]
pub struct UpstreamError(pub String);

impl From<reqwest::Error> for UpstreamError {
    fn from(e: reqwest::Error) -> Self {
        UpstreamError(e.to_string())
    }
}

#[async_trait::async_trait]
pub trait ChatUpstream: Send + Sync + 'static {
    /// Returns the decoded JSON body; shape checks are left to the caller.
    async fn chat_completions(&self, req: &ChatRequest) -> Result<Value, UpstreamError>;
}

#[derive(Clone, Debug)]
pub struct HttpUpstream {
    base_url: String,
    api_key: String,
    timeout: Duration,
}

impl HttpUpstream {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), api_key: api_key.into(), timeout: UPSTREAM_TIMEOUT }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn endpoint(&self) -> String {
        format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'))
    }
}

#[async_trait::async_trait]
impl ChatUpstream for HttpUpstream {
    async fn chat_completions(&self, req: &ChatRequest) -> Result<Value, UpstreamError> {
        // one client per call, dropped with its connection afterwards
        let client = reqwest::Client::builder().timeout(self.timeout).build()?;
        let body = client
            .post(self.endpoint())
            .bearer_auth(&self.api_key)
            .json(req)
            .send()
            .await?
            .error_for_status()?
            .json::<Value>()
            .await?;
        Ok(body)
    }
}
