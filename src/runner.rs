//! The two local pipelines: quantized GGUF (chat with completion fallback)
//! and MLX (flat prompt only).

use crate::{
    completion::{normalize, Completion, GenerationResult, MissingUsage},
    error::{InferError, Result},
    model::{ChatMessage, MetalEngine, QuantizedEngine, SamplingParams},
    telemetry,
};
use std::time::Instant;

/// Chat-style call first; if it fails or its response has no usable text,
/// renders the template and issues a legacy completion. Only the second
/// failure is returned.
pub async fn run_gguf<E: QuantizedEngine>(
    engine: &E,
    template: &str,
    text: &str,
    params: &SamplingParams,
) -> Result<GenerationResult> {
    let messages = [ChatMessage::system(crate::template::extract_system(template)), ChatMessage::user(text)];

    let start = Instant::now();
    let chat = match engine.chat(&messages, params).await {
        Ok(chat) => normalize(Completion::Chat(chat), start.elapsed(), MissingUsage::Zero).map_err(anyhow::Error::from),
        Err(e) => Err(e),
    };
    let result = match chat {
        Ok(result) => result,
        Err(reason) => {
            tracing::warn!(reason = %format!("{reason:#}"), "chat completion failed; falling back to rendered prompt");
            telemetry::record_failure("gguf", "chat_fallback");
            let prompt = crate::template::render(template, text);
            let start = Instant::now();
            let legacy = engine
                .complete(&prompt, params)
                .await
                .map_err(|e| InferError::Engine(format!("{e:#}")))?;
            normalize(Completion::Legacy(legacy), start.elapsed(), MissingUsage::Zero)?
        }
    };

    telemetry::record_generation("gguf", &result);
    Ok(result)
}

pub async fn run_mlx<E: MetalEngine>(
    engine: &E,
    model: &str,
    template: &str,
    text: &str,
    params: &SamplingParams,
) -> Result<GenerationResult> {
    let prompt = crate::template::render(template, text);

    let start = Instant::now();
    let out = engine
        .generate(model, &prompt, params)
        .await
        .map_err(|e| InferError::Engine(format!("{e:#}")))?;
    let elapsed = start.elapsed();

    let result = normalize(Completion::Untracked(out), elapsed, MissingUsage::Unreported)?;
    telemetry::record_generation("mlx", &result);
    Ok(result)
}
