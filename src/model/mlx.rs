use super::{MetalEngine, SamplingParams};
use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use tokio::process::Command;

pub const DEFAULT_MLX_BIN: &str = "mlx_lm.generate";

/// Drives `mlx_lm.generate` as a child process. The model is loaded by the
/// child on every call.
#[derive(Clone, Debug)]
pub struct MlxCliEngine {
    program: PathBuf,
}

impl MlxCliEngine {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self { program: program.into() }
    }

    fn command(&self, model: &str, prompt: &str, p: &SamplingParams) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg("--model")
            .arg(model)
            .arg("--prompt")
            .arg(prompt)
            .arg("--max-tokens")
            .arg(p.max_tokens.to_string())
            .arg("--temp")
            .arg(p.temperature.to_string())
            .arg("--top-p")
            .arg(p.top_p.to_string())
            .arg("--ignore-chat-template")
            .arg("--verbose")
            .arg("False")
            .kill_on_drop(true);
        cmd
    }
}

impl Default for MlxCliEngine {
    fn default() -> Self {
        Self::new(DEFAULT_MLX_BIN)
    }
}

#[async_trait::async_trait]
impl MetalEngine for MlxCliEngine {
    async fn generate(&self, model: &str, prompt: &str, p: &SamplingParams) -> Result<String> {
        let output = self
            .command(model, prompt, p)
            .output()
            .await
            .with_context(|| format!("spawn {}", self.program.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("{} exited with {}: {}", self.program.display(), output.status, stderr.trim());
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}
