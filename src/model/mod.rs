use crate::completion::{ChatCompletion, LegacyCompletion};
use anyhow::Result;
use encoding_rs::{CoderResult, Decoder};
use serde::{Deserialize, Serialize};


#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SamplingParams {
    pub max_tokens: u32,
    pub temperature: f32,
    pub top_p: f32,
    pub stop: Vec<String>,
    pub repeat_penalty: f32,
}

impl Default for SamplingParams {
    fn default() -> Self {
        Self { max_tokens: 512, temperature: 0.2, top_p: 0.9, stop: Vec::new(), repeat_penalty: 1.1 }
    }
}


#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}


#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }
}


/// A local quantized-model engine offering both request styles.
#[async_trait::async_trait]
pub trait QuantizedEngine: Send + Sync + 'static {
    async fn chat(&self, messages: &[ChatMessage], params: &SamplingParams) -> Result<ChatCompletion>;
    async fn complete(&self, prompt: &str, params: &SamplingParams) -> Result<LegacyCompletion>;
}


/// A local Metal-accelerated engine that takes one flat prompt and reports no usage.
#[async_trait::async_trait]
pub trait MetalEngine: Send + Sync + 'static {
    async fn generate(&self, model: &str, prompt: &str, params: &SamplingParams) -> Result<String>;
}


/// Appends the UTF-8 text in `bytes` to `out`. A sequence split across calls
/// is held by `decoder` until its remaining bytes arrive; `last` flushes it.
pub fn push_utf8(decoder: &mut Decoder, bytes: &[u8], last: bool, out: &mut String) {
    let mut input = bytes;
    loop {
        let needed = decoder.max_utf8_buffer_length(input.len()).unwrap_or(input.len() * 3 + 4);
        out.reserve(needed);
        let (result, read, _) = decoder.decode_to_string(input, out, last);
        input = &input[read..];
        match result {
            CoderResult::InputEmpty => break,
            CoderResult::OutputFull => continue,
        }
    }
}


#[cfg(feature = "llama")]
pub mod llama;
pub mod mlx;
