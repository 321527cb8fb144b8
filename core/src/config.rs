//! Layered configuration: hardcoded defaults, an optional `config.toml`,
//! then environment overrides. Modeled on the teacher's config-loader
//! precedence chain, scoped down to this engine's own knobs.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::{EngineError, EngineResult};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmProvider {
    Cloud,
    Local,
}

impl std::str::FromStr for LlmProvider {
    type Err = EngineError;

    fn from_str(s: &str) -> EngineResult<Self> {
        match s.to_ascii_lowercase().as_str() {
            "cloud" => Ok(LlmProvider::Cloud),
            "local" => Ok(LlmProvider::Local),
            other => Err(EngineError::Config(format!(
                "invalid LLM_PROVIDER '{other}': expected 'cloud' or 'local'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub llm_provider: LlmProvider,
    pub llm_api_key: Option<String>,
    pub llm_base_url: Option<String>,
    pub llm_model: Option<String>,
    pub llm_timeout: Duration,
    pub max_execution_time: Duration,
    pub max_memory_mb: u64,
    pub sandbox_container_enabled: bool,
    pub scripts_dir: PathBuf,
    pub llm_responses_dir: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            llm_provider: LlmProvider::Cloud,
            llm_api_key: None,
            llm_base_url: None,
            llm_model: None,
            llm_timeout: Duration::from_secs(60),
            max_execution_time: Duration::from_secs(30),
            max_memory_mb: 512,
            sandbox_container_enabled: false,
            scripts_dir: PathBuf::from("scripts"),
            llm_responses_dir: PathBuf::from("llm_responses"),
        }
    }
}

/// On-disk shape of `config.toml`. Every field optional: absence means
/// "fall through to the next layer".
#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    llm_provider: Option<String>,
    llm_base_url: Option<String>,
    llm_model: Option<String>,
    llm_timeout_secs: Option<u64>,
    max_execution_time_secs: Option<u64>,
    max_memory_mb: Option<u64>,
    sandbox_container_enabled: Option<bool>,
    scripts_dir: Option<String>,
    llm_responses_dir: Option<String>,
}

pub struct ConfigLoader {
    config_path: Option<PathBuf>,
    skip_file_layer: bool,
    skip_env_layer: bool,
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            config_path: None,
            skip_file_layer: false,
            skip_env_layer: false,
            env_prefix: String::new(),
        }
    }

    pub fn with_config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    pub fn skip_file_layer(mut self) -> Self {
        self.skip_file_layer = true;
        self
    }

    pub fn skip_env_layer(mut self) -> Self {
        self.skip_env_layer = true;
        self
    }

    pub fn load(&self) -> EngineResult<EngineConfig> {
        let mut cfg = EngineConfig::default();
        let mut timeout_overridden = false;

        if !self.skip_file_layer {
            let path = self
                .config_path
                .clone()
                .unwrap_or_else(default_config_path);
            self.apply_file_layer(&path, &mut cfg, &mut timeout_overridden)?;
        }

        if !self.skip_env_layer {
            self.apply_env_layer(&mut cfg, &mut timeout_overridden)?;
        }

        // LLM_TIMEOUT's default depends on which provider actually won the
        // layering, not which provider was default at construction time, so
        // it is resolved last rather than baked into `EngineConfig::default`.
        if !timeout_overridden {
            cfg.llm_timeout = match cfg.llm_provider {
                LlmProvider::Cloud => Duration::from_secs(60),
                LlmProvider::Local => Duration::from_secs(600),
            };
        }

        Ok(cfg)
    }

    fn apply_file_layer(
        &self,
        path: &Path,
        cfg: &mut EngineConfig,
        timeout_overridden: &mut bool,
    ) -> EngineResult<()> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            // Missing file is not an error: defaults carry through.
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(err) => return Err(EngineError::Io(err)),
        };
        let parsed: FileConfig = toml::from_str(&text)
            .map_err(|err| EngineError::Config(format!("invalid config.toml: {err}")))?;

        if let Some(provider) = parsed.llm_provider {
            cfg.llm_provider = provider.parse()?;
        }
        if let Some(url) = parsed.llm_base_url {
            cfg.llm_base_url = Some(url);
        }
        if let Some(model) = parsed.llm_model {
            cfg.llm_model = Some(model);
        }
        if let Some(secs) = parsed.llm_timeout_secs {
            cfg.llm_timeout = Duration::from_secs(secs);
            *timeout_overridden = true;
        }
        if let Some(secs) = parsed.max_execution_time_secs {
            cfg.max_execution_time = Duration::from_secs(secs);
        }
        if let Some(mb) = parsed.max_memory_mb {
            cfg.max_memory_mb = mb;
        }
        if let Some(enabled) = parsed.sandbox_container_enabled {
            cfg.sandbox_container_enabled = enabled;
        }
        if let Some(dir) = parsed.scripts_dir {
            cfg.scripts_dir = PathBuf::from(dir);
        }
        if let Some(dir) = parsed.llm_responses_dir {
            cfg.llm_responses_dir = PathBuf::from(dir);
        }

        Ok(())
    }

    fn apply_env_layer(
        &self,
        cfg: &mut EngineConfig,
        timeout_overridden: &mut bool,
    ) -> EngineResult<()> {
        let var = |name: &str| std::env::var(format!("{}{name}", self.env_prefix)).ok();

        if let Some(v) = var("LLM_PROVIDER") {
            cfg.llm_provider = v.parse()?;
        }
        if let Some(v) = var("LLM_API_KEY") {
            cfg.llm_api_key = Some(v);
        }
        if let Some(v) = var("LLM_BASE_URL") {
            cfg.llm_base_url = Some(v);
        }
        if let Some(v) = var("LLM_MODEL") {
            cfg.llm_model = Some(v);
        }
        if let Some(v) = var("LLM_TIMEOUT") {
            cfg.llm_timeout = Duration::from_secs(parse_env_u64("LLM_TIMEOUT", &v)?);
            *timeout_overridden = true;
        }
        if let Some(v) = var("MAX_EXECUTION_TIME") {
            cfg.max_execution_time = Duration::from_secs(parse_env_u64("MAX_EXECUTION_TIME", &v)?);
        }
        if let Some(v) = var("MAX_MEMORY_MB") {
            cfg.max_memory_mb = parse_env_u64("MAX_MEMORY_MB", &v)?;
        }
        if let Some(v) = var("SANDBOX_CONTAINER_ENABLED") {
            cfg.sandbox_container_enabled = parse_env_bool("SANDBOX_CONTAINER_ENABLED", &v)?;
        }

        Ok(())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn parse_env_u64(var: &str, value: &str) -> EngineResult<u64> {
    value.parse().map_err(|_| {
        EngineError::Config(format!("invalid value '{value}' for {var}: expected an integer"))
    })
}

fn parse_env_bool(var: &str, value: &str) -> EngineResult<bool> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Ok(true),
        "false" | "0" | "no" | "off" => Ok(false),
        other => Err(EngineError::Config(format!(
            "invalid value '{other}' for {var}: expected true/false"
        ))),
    }
}

fn default_config_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".intentcad")
        .join("config.toml")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_file_or_env() {
        let cfg = ConfigLoader::new()
            .skip_file_layer()
            .skip_env_layer()
            .load()
            .expect("defaults always load");
        assert_eq!(cfg.llm_provider, LlmProvider::Cloud);
        assert_eq!(cfg.max_memory_mb, 512);
        assert_eq!(cfg.llm_timeout, Duration::from_secs(60));
    }

    #[test]
    fn local_provider_defaults_to_a_longer_timeout() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "llm_provider = \"local\"\n").expect("write config");
        let cfg = ConfigLoader::new()
            .with_config_path(&path)
            .skip_env_layer()
            .load()
            .expect("valid file loads");
        assert_eq!(cfg.llm_provider, LlmProvider::Local);
        assert_eq!(cfg.llm_timeout, Duration::from_secs(600));
    }

    #[test]
    fn explicit_timeout_survives_regardless_of_provider_default() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "llm_provider = \"local\"\nllm_timeout_secs = 45\n")
            .expect("write config");
        let cfg = ConfigLoader::new()
            .with_config_path(&path)
            .skip_env_layer()
            .load()
            .expect("valid file loads");
        assert_eq!(cfg.llm_timeout, Duration::from_secs(45));
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let cfg = ConfigLoader::new()
            .with_config_path("/nonexistent/path/config.toml")
            .skip_env_layer()
            .load()
            .expect("missing file is not fatal");
        assert_eq!(cfg.max_execution_time, Duration::from_secs(30));
    }

    #[test]
    fn file_layer_overrides_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "max_memory_mb = 1024\nllm_provider = \"local\"\n")
            .expect("write config");
        let cfg = ConfigLoader::new()
            .with_config_path(&path)
            .skip_env_layer()
            .load()
            .expect("valid file loads");
        assert_eq!(cfg.max_memory_mb, 1024);
        assert_eq!(cfg.llm_provider, LlmProvider::Local);
    }

    #[test]
    fn bad_env_value_is_an_error() {
        assert!(parse_env_u64("MAX_EXECUTION_TIME", "not-a-number").is_err());
        assert!(parse_env_bool("SANDBOX_CONTAINER_ENABLED", "maybe").is_err());
    }
}
