//! Starts vLLM's OpenAI-compatible server for the proxy to talk to.

use anyhow::{bail, Context};
use clap::Parser;
use openbio_infer::telemetry;
use std::process::Command;

#[derive(Parser, Debug)]
struct Args {
    #[arg(long, env = "VLLM_MODEL_ID", default_value = "aaditya/Llama3-OpenBioLLM-8B")]
    model: String,
    #[arg(long, env = "VLLM_PORT", default_value_t = 8001)]
    port: u16,
    #[arg(long, env = "VLLM_MAX_MODEL_LEN", default_value_t = 8192)]
    max_model_len: u32,
    #[arg(long, env = "VLLM_TP_SIZE", default_value_t = 1)]
    tp_size: u32,
    #[arg(long, env = "PYTHON", default_value = "python")]
    python: String,
}

fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    telemetry::init_logging();
    let args = Args::parse();

    let mut cmd = Command::new(&args.python);
    cmd.args(["-m", "vllm.entrypoints.openai.api_server"])
        .arg("--model")
        .arg(&args.model)
        .arg("--max-model-len")
        .arg(args.max_model_len.to_string())
        .arg("--tensor-parallel-size")
        .arg(args.tp_size.to_string())
        .arg("--port")
        .arg(args.port.to_string())
        .args(["--dtype", "bfloat16"]);

    tracing::info!(model = %args.model, port = args.port, "starting vLLM");
    let status = cmd.status().with_context(|| format!("spawn {}", args.python))?;
    if !status.success() {
        bail!("vLLM exited with {status}");
    }
    Ok(())
}
