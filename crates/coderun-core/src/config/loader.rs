//! Configuration loader for YAML files and environment resolution
//!
//! Values from the environment win over the file, so a deployment can flip
//! the execution method or point at another Judge0 instance without editing
//! the YAML.

use std::env;
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::config::types::*;
use crate::errors::ExecutionError;

pub const ENV_EXECUTION_METHOD: &str = "CODERUN_EXECUTION_METHOD";
pub const ENV_FALLBACK_ENABLED: &str = "CODERUN_FALLBACK_ENABLED";
pub const ENV_EXECUTION_ROOT: &str = "CODERUN_EXECUTION_ROOT";
pub const ENV_JUDGE0_URL: &str = "JUDGE0_URL";
pub const ENV_JUDGE0_API_KEY: &str = "JUDGE0_API_KEY";
pub const ENV_RAPIDAPI_HOST: &str = "RAPIDAPI_HOST";

/// Configuration loader with environment resolution
pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path` when given, otherwise starts from defaults. Environment
    /// resolution and validation run in both cases.
    pub async fn load(path: Option<&Path>) -> Result<CoderunConfig, ExecutionError> {
        match path {
            Some(path) => Self::from_file(path).await,
            None => Self::finish(CoderunConfig::default(), None),
        }
    }

    /// Load configuration from a YAML file
    pub async fn from_file<P: AsRef<Path>>(path: P) -> Result<CoderunConfig, ExecutionError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path).await.map_err(|e| {
            ExecutionError::ConfigError(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        Self::from_str(&content, path.parent())
    }

    /// Load configuration from a YAML string. Relative paths in the document
    /// are resolved against `base_dir` when one is given.
    pub fn from_str(content: &str, base_dir: Option<&Path>) -> Result<CoderunConfig, ExecutionError> {
        let config: CoderunConfig = if content.trim().is_empty() {
            CoderunConfig::default()
        } else {
            serde_yaml::from_str(content).map_err(|e| {
                ExecutionError::ConfigError(format!("Failed to parse YAML config: {}", e))
            })?
        };
        Self::finish(config, base_dir)
    }

    fn finish(
        mut config: CoderunConfig,
        base_dir: Option<&Path>,
    ) -> Result<CoderunConfig, ExecutionError> {
        Self::resolve_environment(&mut config)?;
        if let Some(base_dir) = base_dir {
            Self::resolve_paths(&mut config, base_dir);
        }
        config.validate()?;
        Ok(config)
    }

    /// Resolve environment variables in the configuration
    fn resolve_environment(config: &mut CoderunConfig) -> Result<(), ExecutionError> {
        if let Ok(method) = env::var(ENV_EXECUTION_METHOD) {
            config.execution.method = method.parse()?;
            log::debug!("Execution method set from environment: {:?}", config.execution.method);
        }

        if let Ok(value) = env::var(ENV_FALLBACK_ENABLED) {
            config.execution.fallback_enabled = parse_bool(ENV_FALLBACK_ENABLED, &value)?;
        }

        if let Ok(root) = env::var(ENV_EXECUTION_ROOT) {
            if !root.trim().is_empty() {
                config.sandbox.execution_root = PathBuf::from(root);
            }
        }

        if let Ok(url) = env::var(ENV_JUDGE0_URL) {
            if !url.trim().is_empty() {
                config.remote.base_url = url.trim_end_matches('/').to_string();
            }
        }

        Self::resolve_remote_auth(&mut config.remote);

        if let Ok(host) = env::var(ENV_RAPIDAPI_HOST) {
            config.remote.rapidapi_host = Some(host);
        }

        Ok(())
    }

    fn resolve_remote_auth(remote: &mut RemoteConfig) {
        if let Some(env_var) = &remote.api_key_env {
            if let Ok(api_key) = env::var(env_var) {
                remote.api_key = Some(api_key);
            }
        }

        if remote.api_key.is_none() {
            if let Ok(api_key) = env::var(ENV_JUDGE0_API_KEY) {
                remote.api_key = Some(api_key);
            }
        }
    }

    fn resolve_paths(config: &mut CoderunConfig, base_dir: &Path) {
        if let Some(catalog) = &config.languages.catalog {
            if catalog.is_relative() {
                config.languages.catalog = Some(base_dir.join(catalog));
            }
        }
        if let Some(history) = &config.history.path {
            if history.is_relative() {
                config.history.path = Some(base_dir.join(history));
            }
        }
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ExecutionError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(ExecutionError::ConfigError(format!(
            "{} must be a boolean, got '{}'",
            name, other
        ))),
    }
}
