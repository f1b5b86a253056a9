//! Runs the GGUF model from `configs/local_gguf.yaml` once on `--text` via llama.cpp.

use clap::Parser;
use openbio_infer::config::{GgufConfig, SamplingOverrides, DEFAULT_GGUF_CONFIG};
use openbio_infer::model::llama::LlamaEngine;
use openbio_infer::{runner, telemetry, template};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about = "Run GGUF model locally (llama.cpp)")]
struct Args {
    /// User input text
    #[arg(long)]
    text: String,
    /// Config path
    #[arg(long, default_value = DEFAULT_GGUF_CONFIG)]
    cfg: PathBuf,
    #[arg(long, default_value = template::DEFAULT_TEMPLATE_PATH)]
    template: PathBuf,
    #[arg(long)]
    max_tokens: Option<u32>,
    #[arg(long)]
    temperature: Option<f32>,
    #[arg(long)]
    top_p: Option<f32>,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_logging();
    let args = Args::parse();

    let overrides = SamplingOverrides {
        max_tokens: args.max_tokens,
        temperature: args.temperature,
        top_p: args.top_p,
    };
    let cfg = GgufConfig::load(&args.cfg, &overrides)?;
    let engine = LlamaEngine::new(cfg.model_path.clone(), cfg.n_ctx, cfg.n_gpu_layers)?;
    let tpl = template::load(&args.template)?;

    let resp = runner::run_gguf(&engine, &tpl, &args.text, &cfg.sampling()).await?;
    tracing::info!(
        latency_ms = resp.latency_ms,
        input_tokens = resp.input_tokens,
        output_tokens = resp.output_tokens,
        "generation finished"
    );
    println!("{}", resp.text);
    Ok(())
}
