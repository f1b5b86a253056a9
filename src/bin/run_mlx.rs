//! Runs an MLX model once on `--text` through `mlx_lm.generate`.

use clap::Parser;
use openbio_infer::model::mlx::{MlxCliEngine, DEFAULT_MLX_BIN};
use openbio_infer::model::SamplingParams;
use openbio_infer::{runner, telemetry, template};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(about = "Run MLX model locally")]
struct Args {
    /// MLX model id/path
    #[arg(long)]
    model: String,
    /// User input text
    #[arg(long)]
    text: String,
    #[arg(long, default_value_t = 512)]
    max_tokens: u32,
    #[arg(long, default_value_t = 0.2)]
    temperature: f32,
    #[arg(long, default_value_t = 0.9)]
    top_p: f32,
    #[arg(long, default_value = template::DEFAULT_TEMPLATE_PATH)]
    template: PathBuf,
    /// Executable used to run generation
    #[arg(long, env = "MLX_BIN", default_value = DEFAULT_MLX_BIN)]
    mlx_bin: PathBuf,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_logging();
    let args = Args::parse();

    let params = SamplingParams {
        max_tokens: args.max_tokens,
        temperature: args.temperature,
        top_p: args.top_p,
        ..SamplingParams::default()
    };
    let tpl = template::load(&args.template)?;
    let engine = MlxCliEngine::new(args.mlx_bin);

    let resp = runner::run_mlx(&engine, &args.model, &tpl, &args.text, &params).await?;
    tracing::info!(latency_ms = resp.latency_ms, "generation finished");
    println!("{}", resp.text);
    Ok(())
}
