//! Backend response shapes and their normalization into [`GenerationResult`].

use crate::error::{InferError, Result};
use serde::Deserialize;
use std::time::Duration;

/// Token count reported when a backend does no token accounting.
pub const NOT_REPORTED: i64 = -1;

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct Usage {
    #[serde(default)]
    pub prompt_tokens: Option<i64>,
    #[serde(default)]
    pub completion_tokens: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatChoice {
    pub message: ChatChoiceMessage,
}

/// `{choices:[{message:{content}}], usage}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChatCompletion {
    pub choices: Vec<ChatChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl ChatCompletion {
    pub fn single(content: impl Into<String>, usage: Option<Usage>) -> Self {
        Self {
            choices: vec![ChatChoice {
                message: ChatChoiceMessage { content: Some(content.into()) },
            }],
            usage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TextChoice {
    pub text: String,
}

/// `{choices:[{text}], usage}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LegacyCompletion {
    pub choices: Vec<TextChoice>,
    #[serde(default)]
    pub usage: Option<Usage>,
}

impl LegacyCompletion {
    pub fn single(text: impl Into<String>, usage: Option<Usage>) -> Self {
        Self { choices: vec![TextChoice { text: text.into() }], usage }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Completion {
    Chat(ChatCompletion),
    Legacy(LegacyCompletion),
    /// Plain text from a backend that reports no token usage.
    Untracked(String),
}

/// How to count tokens when a response carries no `usage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MissingUsage {
    Zero,
    Unreported,
}

impl MissingUsage {
    fn fill(self, n: Option<i64>) -> i64 {
        match (n, self) {
            (Some(n), _) => n,
            (None, MissingUsage::Zero) => 0,
            (None, MissingUsage::Unreported) => NOT_REPORTED,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationResult {
    pub text: String,
    pub input_tokens: i64,
    pub output_tokens: i64,
    pub latency_ms: u64,
}

impl GenerationResult {
    pub fn reported_input_tokens(&self) -> Option<i64> {
        reported(self.input_tokens)
    }

    pub fn reported_output_tokens(&self) -> Option<i64> {
        reported(self.output_tokens)
    }
}

fn reported(n: i64) -> Option<i64> {
    (n >= 0).then_some(n)
}

pub fn normalize(
    completion: Completion,
    elapsed: Duration,
    missing: MissingUsage,
) -> Result<GenerationResult> {
    let latency_ms = u64::try_from(elapsed.as_millis()).unwrap_or(u64::MAX);
    let (text, usage) = match completion {
        Completion::Chat(c) => {
            let choice = c
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| InferError::MalformedResponse("no choices in chat completion".into()))?;
            let content = choice
                .message
                .content
                .ok_or_else(|| InferError::MalformedResponse("chat choice has no content".into()))?;
            (content, c.usage)
        }
        Completion::Legacy(c) => {
            let choice = c
                .choices
                .into_iter()
                .next()
                .ok_or_else(|| InferError::MalformedResponse("no choices in completion".into()))?;
            (choice.text, c.usage)
        }
        Completion::Untracked(text) => {
            return Ok(GenerationResult {
                text: text.trim().to_string(),
                input_tokens: NOT_REPORTED,
                output_tokens: NOT_REPORTED,
                latency_ms,
            })
        }
    };
    let usage = usage.unwrap_or_default();
    Ok(GenerationResult {
        text: text.trim().to_string(),
        input_tokens: missing.fill(usage.prompt_tokens),
        output_tokens: missing.fill(usage.completion_tokens),
        latency_ms,
    })
}
