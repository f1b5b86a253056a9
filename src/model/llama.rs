// llama.cpp engine using `llama-cpp-2` (enabled with feature `llama`).
use super::{push_utf8, ChatMessage, QuantizedEngine, SamplingParams};
use crate::completion::{ChatCompletion, LegacyCompletion, Usage};
use anyhow::{anyhow, Context, Result};
use llama_cpp_2::context::params::LlamaContextParams;
use llama_cpp_2::llama_backend::LlamaBackend as LLBackend;
use llama_cpp_2::llama_batch::LlamaBatch;
use llama_cpp_2::model::params::LlamaModelParams;
use llama_cpp_2::model::{AddBos, LlamaChatMessage, LlamaModel, Special};
use llama_cpp_2::sampling::LlamaSampler;
use llama_cpp_2::{ggml_time_us, send_logs_to_tracing, LogOptions};
use std::num::NonZeroU32;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

// llama.cpp treats any layer count above the model depth as "offload everything".
const ALL_GPU_LAYERS: u32 = 999;

struct Inner {
    backend: LLBackend,
    model: LlamaModel,
    n_ctx: u32,
}

#[derive(Clone)]
pub struct LlamaEngine {
    inner: Arc<Inner>,
}

struct Generated {
    text: String,
    prompt_tokens: usize,
    completion_tokens: u32,
}

impl LlamaEngine {
    /// `n_gpu_layers < 0` offloads every layer.
    pub fn new(model_path: PathBuf, n_ctx: u32, n_gpu_layers: i32) -> Result<Self> {
        // route llama.cpp logs to tracing so they appear in logs when RUST_LOG is set
        send_logs_to_tracing(LogOptions::default());

        let backend = LLBackend::init().context("init llama backend")?;

        let mut model_params = LlamaModelParams::default();
        if n_gpu_layers < 0 {
            model_params = model_params.with_n_gpu_layers(ALL_GPU_LAYERS);
        } else if n_gpu_layers > 0 {
            model_params = model_params.with_n_gpu_layers(n_gpu_layers as u32);
        }

        let model = LlamaModel::load_from_file(&backend, &model_path, &model_params)
            .with_context(|| format!("load GGUF model {}", model_path.display()))?;

        Ok(Self { inner: Arc::new(Inner { backend, model, n_ctx }) })
    }

    fn chat_prompt(&self, messages: &[ChatMessage]) -> Result<String> {
        let template = self
            .inner
            .model
            .chat_template(None)
            .context("model has no embedded chat template")?;
        let chat = messages
            .iter()
            .map(|m| LlamaChatMessage::new(m.role.as_str().to_string(), m.content.clone()))
            .collect::<Result<Vec<_>, _>>()
            .context("build chat messages")?;
        self.inner
            .model
            .apply_chat_template(&template, &chat, true)
            .context("apply chat template")
    }

    fn sampler(p: &SamplingParams) -> LlamaSampler {
        let mut samplers = vec![LlamaSampler::penalties(64, p.repeat_penalty, 0.0, 0.0)];
        if p.temperature > 0.0 {
            samplers.push(LlamaSampler::top_p(p.top_p, 1));
            samplers.push(LlamaSampler::temp(p.temperature));
            samplers.push(LlamaSampler::dist(ggml_time_us() as u32));
        } else {
            samplers.push(LlamaSampler::greedy());
        }
        LlamaSampler::chain_simple(samplers)
    }

    fn generate(&self, prompt_text: &str, add_bos: AddBos, p: &SamplingParams) -> Result<Generated> {
        // Fresh context per request; nothing carries over between calls.
        let ctx_params = LlamaContextParams::default()
            .with_n_ctx(NonZeroU32::new(self.inner.n_ctx))
            .with_n_threads(num_cpus::get() as i32)
            .with_n_threads_batch(num_cpus::get() as i32);

        let mut ctx = self
            .inner
            .model
            .new_context(&self.inner.backend, ctx_params)
            .context("create llama context")?;

        let tokens_list = self
            .inner
            .model
            .str_to_token(prompt_text, add_bos)
            .context("tokenize prompt")?;
        if tokens_list.is_empty() {
            return Err(anyhow!("prompt tokenized to nothing"));
        }
        let prompt_tokens = tokens_list.len();

        // leave a small margin below the context window
        let n_ctx = ctx.n_ctx() as i64;
        let room = (n_ctx - 8 - prompt_tokens as i64).max(0);
        let max_new = (p.max_tokens as i64).min(room) as u32;
        if max_new == 0 {
            return Err(anyhow!("prompt too long for context ({prompt_tokens} tokens, n_ctx {n_ctx})"));
        }

        let mut batch = LlamaBatch::new(prompt_tokens.max(512), 1);
        let last_index: i32 = (prompt_tokens - 1) as i32;
        for (i, token) in (0_i32..).zip(tokens_list.into_iter()) {
            batch.add(token, i, &[0], i == last_index)?;
        }
        ctx.decode(&mut batch).context("decode prompt")?;

        let mut sampler = Self::sampler(p);

        let mut n_cur = batch.n_tokens();
        let mut n_decode = 0u32;
        let t_main_start = ggml_time_us();

        let mut out = String::new();
        let mut decoder = encoding_rs::UTF_8.new_decoder();
        let mut stopped = false;

        while n_decode < max_new {
            let token = sampler.sample(&ctx, batch.n_tokens() - 1);
            sampler.accept(token);

            if self.inner.model.is_eog_token(token) {
                break;
            }

            let output_bytes = self.inner.model.token_to_bytes(token, Special::Tokenize)?;
            push_utf8(&mut decoder, &output_bytes, false, &mut out);
            n_decode += 1;

            if let Some(cut) = p.stop.iter().filter(|s| !s.is_empty()).filter_map(|s| out.find(s.as_str())).min() {
                out.truncate(cut);
                stopped = true;
                break;
            }

            batch.clear();
            batch.add(token, n_cur, &[0], true)?;
            n_cur += 1;
            ctx.decode(&mut batch).context("decode step")?;
        }

        if !stopped {
            push_utf8(&mut decoder, &[], true, &mut out);
        }

        let duration = Duration::from_micros((ggml_time_us() - t_main_start).max(0) as u64);
        tracing::debug!(tokens = n_decode, ?duration, "llama.cpp decode finished");

        Ok(Generated { text: out, prompt_tokens, completion_tokens: n_decode })
    }
}

fn usage(g: &Generated) -> Usage {
    Usage {
        prompt_tokens: Some(g.prompt_tokens as i64),
        completion_tokens: Some(i64::from(g.completion_tokens)),
    }
}

#[async_trait::async_trait]
impl QuantizedEngine for LlamaEngine {
    async fn chat(&self, messages: &[ChatMessage], p: &SamplingParams) -> Result<ChatCompletion> {
        let prompt = self.chat_prompt(messages)?;
        // the rendered chat template already carries the model's BOS marker
        let g = self.generate(&prompt, AddBos::Never, p)?;
        let usage = usage(&g);
        Ok(ChatCompletion::single(g.text, Some(usage)))
    }

    async fn complete(&self, prompt: &str, p: &SamplingParams) -> Result<LegacyCompletion> {
        let g = self.generate(prompt, AddBos::Always, p)?;
        let usage = usage(&g);
        Ok(LegacyCompletion::single(g.text, Some(usage)))
    }
}
