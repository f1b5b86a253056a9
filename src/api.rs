use crate::{
    completion::{normalize, ChatCompletion, Completion, GenerationResult, MissingUsage},
    config::ProxyConfig,
    error::InferError,
    model::ChatMessage,
    telemetry,
    template,
    upstream::{ChatRequest, ChatUpstream, UpstreamError},
};
use axum::{
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::{path::PathBuf, sync::Arc, time::Instant};

const BACKEND: &str = "vllm";

#[derive(Deserialize)]
pub struct GenerateIn {
    pub input: String,
}

#[derive(Debug, Serialize)]
pub struct GenerateOut {
    pub text: String,
    pub latency_ms: u64,
    pub prompt_tokens: Option<i64>,
    pub completion_tokens: Option<i64>,
}

impl From<GenerationResult> for GenerateOut {
    fn from(r: GenerationResult) -> Self {
        Self {
            prompt_tokens: r.reported_input_tokens(),
            completion_tokens: r.reported_output_tokens(),
            text: r.text,
            latency_ms: r.latency_ms,
        }
    }
}

/// The per-request part of [`ProxyConfig`].
#[derive(Clone, Debug)]
pub struct ProxySettings {
    pub model_id: String,
    pub temperature: f32,
    pub top_p: f32,
    pub max_tokens: u32,
    pub template_path: PathBuf,
}

impl From<&ProxyConfig> for ProxySettings {
    fn from(cfg: &ProxyConfig) -> Self {
        Self {
            model_id: cfg.model_id.clone(),
            temperature: cfg.temperature,
            top_p: cfg.top_p,
            max_tokens: cfg.max_tokens,
            template_path: cfg.template_path.clone(),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProxyError {
    #[error("prompt template unavailable: {0}")]
    Template(#[source] InferError),

    #[error("vLLM request failed: {0}")]
    Upstream(#[from] UpstreamError),

    #[error("malformed vLLM response: {0}")]
    Malformed(String),
}

impl IntoResponse for ProxyError {
    fn into_response(self) -> Response {
        // root cause goes to the log only; clients get a fixed detail
        tracing::error!(error = %self, "generate failed");
        let (status, reason, detail) = match self {
            ProxyError::Template(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "template", "Prompt template unavailable")
            }
            ProxyError::Upstream(_) => (StatusCode::BAD_GATEWAY, "upstream", "Upstream vLLM error"),
            ProxyError::Malformed(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "malformed", "Malformed vLLM response")
            }
        };
        telemetry::record_failure(BACKEND, reason);
        (status, Json(json!({ "detail": detail }))).into_response()
    }
}

struct AppState<U> {
    upstream: Arc<U>,
    settings: Arc<ProxySettings>,
}

impl<U> Clone for AppState<U> {
    fn clone(&self) -> Self {
        Self { upstream: self.upstream.clone(), settings: self.settings.clone() }
    }
}

pub fn routes<U: ChatUpstream + 'static>(upstream: U, settings: ProxySettings) -> Router {
    let state = AppState { upstream: Arc::new(upstream), settings: Arc::new(settings) };
    Router::new()
        .route("/health", get(health::<U>))
        .route("/generate", post(generate::<U>))
        .with_state(state)
}

async fn health<U: ChatUpstream>(State(state): State<AppState<U>>) -> Json<serde_json::Value> {
    Json(json!({ "status": "ok", "model": state.settings.model_id }))
}

async fn generate<U: ChatUpstream>(
    State(state): State<AppState<U>>,
    Json(body): Json<GenerateIn>,
) -> Result<Json<GenerateOut>, ProxyError> {
    let s = &state.settings;
    let template = template::load(&s.template_path).map_err(ProxyError::Template)?;
    let system_prompt = template::extract_system(&template);

    let req = ChatRequest {
        model: s.model_id.clone(),
        messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(body.input)],
        temperature: s.temperature,
        top_p: s.top_p,
        max_tokens: s.max_tokens,
        stream: false,
    };

    let start = Instant::now();
    let data = state.upstream.chat_completions(&req).await?;
    let elapsed = start.elapsed();

    let chat: ChatCompletion =
        serde_json::from_value(data).map_err(|e| ProxyError::Malformed(e.to_string()))?;
    let result = normalize(Completion::Chat(chat), elapsed, MissingUsage::Unreported)
        .map_err(|e| ProxyError::Malformed(e.to_string()))?;

    tracing::info!(
        latency_ms = result.latency_ms,
        prompt_tokens = ?result.reported_input_tokens(),
        completion_tokens = ?result.reported_output_tokens(),
        "generated"
    );
    telemetry::record_generation(BACKEND, &result);
    Ok(Json(result.into()))
}
