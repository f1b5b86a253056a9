use crate::error::{InferError, Result};
use crate::model::SamplingParams;
use clap::Parser;
use figment::{
    providers::{Format, Serialized, Yaml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_GGUF_CONFIG: &str = "configs/local_gguf.yaml";

/// Settings for the vLLM proxy, read once at startup from flags or the environment.
#[derive(Parser, Debug, Clone)]
pub struct ProxyConfig {
    #[arg(long, env, default_value = "0.0.0.0:8000")]
    pub bind_addr: String,
    #[arg(long, env = "VLLM_BASE_URL", default_value = "http://localhost:8001")]
    pub base_url: String,
    #[arg(long, env = "VLLM_API_KEY", default_value = "not-required", hide_env_values = true)]
    pub api_key: String,
    #[arg(long, env = "VLLM_MODEL_ID", default_value = "aaditya/Llama3-OpenBioLLM-8B")]
    pub model_id: String,
    #[arg(long, env, default_value_t = 0.2)]
    pub temperature: f32,
    #[arg(long, env, default_value_t = 0.9)]
    pub top_p: f32,
    #[arg(long, env, default_value_t = 512)]
    pub max_tokens: u32,
    #[arg(long, env = "PROMPT_TEMPLATE", default_value = crate::template::DEFAULT_TEMPLATE_PATH)]
    pub template_path: PathBuf,
    /// Serve Prometheus metrics on this address when set.
    #[arg(long, env)]
    pub metrics_addr: Option<String>,
}

fn default_n_ctx() -> u32 {
    8192
}

fn default_n_gpu_layers() -> i32 {
    -1
}

fn default_max_tokens() -> u32 {
    512
}

fn default_temperature() -> f32 {
    0.2
}

fn default_top_p() -> f32 {
    0.9
}

fn default_repeat_penalty() -> f32 {
    1.1
}

/// Contents of `configs/local_gguf.yaml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GgufConfig {
    pub model_path: PathBuf,
    #[serde(default = "default_n_ctx")]
    pub n_ctx: u32,
    #[serde(default = "default_n_gpu_layers")]
    pub n_gpu_layers: i32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_top_p")]
    pub top_p: f32,
    #[serde(default)]
    pub stop: Option<Vec<String>>,
    #[serde(default = "default_repeat_penalty")]
    pub repeat_penalty: f32,
}

/// Command-line values that take precedence over the YAML file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SamplingOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
}

impl GgufConfig {
    /// Loads the YAML file, applies `overrides` and checks that the model file exists.
    pub fn load(path: impl AsRef<Path>, overrides: &SamplingOverrides) -> Result<Self> {
        let path = path.as_ref();
        if !path.is_file() {
            return Err(InferError::Config(format!("config file not found: {}", path.display())));
        }

        let cfg: GgufConfig = Figment::new()
            .merge(Yaml::file(path))
            .merge(Serialized::defaults(overrides))
            .extract()
            .map_err(|e| InferError::Config(format!("{}: {e}", path.display())))?;

        if !cfg.model_path.exists() {
            return Err(InferError::Config(format!(
                "GGUF model not found at {}",
                cfg.model_path.display()
            )));
        }
        Ok(cfg)
    }

    pub fn sampling(&self) -> SamplingParams {
        SamplingParams {
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            top_p: self.top_p,
            stop: self.stop.clone().unwrap_or_default(),
            repeat_penalty: self.repeat_penalty,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_yaml(dir: &tempfile::TempDir, body: &str) -> PathBuf {
        let path = dir.path().join("local_gguf.yaml");
        let mut f = std::fs::File::create(&path).unwrap();
        f.write_all(body.as_bytes()).unwrap();
        path
    }

    fn fake_model(dir: &tempfile::TempDir) -> PathBuf {
        let model = dir.path().join("model.gguf");
        std::fs::write(&model, b"GGUF").unwrap();
        model
    }

    #[test]
    fn defaults_fill_optional_keys() {
        let dir = tempfile::tempdir().unwrap();
        let model = fake_model(&dir);
        let path = write_yaml(&dir, &format!("model_path: {}\n", model.display()));

        let cfg = GgufConfig::load(&path, &SamplingOverrides::default()).unwrap();
        assert_eq!(cfg.n_ctx, 8192);
        assert_eq!(cfg.n_gpu_layers, -1);
        assert_eq!(cfg.sampling(), SamplingParams::default());
    }

    #[test]
    fn file_values_and_overrides() {
        let dir = tempfile::tempdir().unwrap();
        let model = fake_model(&dir);
        let path = write_yaml(
            &dir,
            &format!(
                "model_path: {}\nmax_tokens: 128\ntemperature: 0.7\nstop: [\"</s>\", \"<|eot_id|>\"]\nrepeat_penalty: 1.3\n",
                model.display()
            ),
        );
        let overrides = SamplingOverrides { max_tokens: Some(64), ..Default::default() };

        let p = GgufConfig::load(&path, &overrides).unwrap().sampling();
        assert_eq!(p.max_tokens, 64);
        assert_eq!(p.temperature, 0.7);
        assert_eq!(p.stop, vec!["</s>".to_string(), "<|eot_id|>".to_string()]);
        assert_eq!(p.repeat_penalty, 1.3);
    }

    #[test]
    fn null_stop_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let model = fake_model(&dir);
        let path = write_yaml(&dir, &format!("model_path: {}\nstop: null\n", model.display()));

        let cfg = GgufConfig::load(&path, &SamplingOverrides::default()).unwrap();
        assert!(cfg.sampling().stop.is_empty());
    }

    #[test]
    fn missing_model_path_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_yaml(&dir, "n_ctx: 2048\n");
        let err = GgufConfig::load(&path, &SamplingOverrides::default()).unwrap_err();
        assert!(matches!(err, InferError::Config(_)));
    }

    #[test]
    fn nonexistent_model_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_yaml(&dir, "model_path: /nowhere/openbiollm.gguf\n");
        let err = GgufConfig::load(&path, &SamplingOverrides::default()).unwrap_err();
        assert!(err.to_string().contains("GGUF model not found"));
    }

    #[test]
    fn missing_config_file_is_config_error() {
        let err = GgufConfig::load("no/such/config.yaml", &SamplingOverrides::default()).unwrap_err();
        assert!(matches!(err, InferError::Config(_)));
    }

    #[test]
    fn proxy_defaults() {
        let cfg = ProxyConfig::try_parse_from(["openbio-proxy", "--base-url", "http://gpu:8001"]).unwrap();
        assert_eq!(cfg.base_url, "http://gpu:8001");
        assert_eq!(cfg.max_tokens, 512);
        assert_eq!(cfg.template_path, PathBuf::from("configs/prompt_template.txt"));
    }
}
