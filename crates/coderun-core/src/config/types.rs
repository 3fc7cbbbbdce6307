//! Configuration type definitions
//!
//! Every section is optional in YAML; an empty document yields a working
//! configuration that runs the built-in language catalog in the local
//! sandbox and falls back to the public Judge0 instance.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::str::FromStr;

use crate::errors::ExecutionError;
use crate::languages::{CodeLanguage, LanguageOverride};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CoderunConfig {
    #[serde(default)]
    pub execution: ExecutionConfig,
    #[serde(default)]
    pub sandbox: SandboxConfig,
    #[serde(default)]
    pub remote: RemoteConfig,
    #[serde(default)]
    pub languages: LanguagesConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub history: HistoryConfig,
}

/// Which backend a request goes to first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreferredMethod {
    Sandbox,
    Remote,
    #[default]
    Auto,
}

impl FromStr for PreferredMethod {
    type Err = ExecutionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sandbox" | "docker" => Ok(PreferredMethod::Sandbox),
            "remote" | "judge0" => Ok(PreferredMethod::Remote),
            "auto" => Ok(PreferredMethod::Auto),
            other => Err(ExecutionError::ConfigError(format!(
                "Unknown execution method '{}', expected auto, sandbox or remote",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionConfig {
    #[serde(default)]
    pub method: PreferredMethod,
    #[serde(default = "default_true")]
    pub fallback_enabled: bool,
    #[serde(default = "default_true")]
    pub enforce_safety_check: bool,
    /// Languages that `auto` sends to the remote backend first.
    #[serde(default = "default_remote_preferred_languages")]
    pub remote_preferred_languages: Vec<CodeLanguage>,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            method: PreferredMethod::Auto,
            fallback_enabled: true,
            enforce_safety_check: true,
            remote_preferred_languages: default_remote_preferred_languages(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SandboxConfig {
    /// Parent directory of the per-job scratch directories.
    #[serde(default = "default_execution_root")]
    pub execution_root: PathBuf,
    /// Unix socket of the Docker daemon; `DOCKER_HOST` or the platform
    /// default is used when unset.
    #[serde(default)]
    pub docker_socket: Option<String>,
    #[serde(default = "default_cpu_percent")]
    pub cpu_percent: u32,
    #[serde(default = "default_pids_limit")]
    pub pids_limit: i64,
    #[serde(default = "default_sandbox_user")]
    pub user: String,
    #[serde(default = "default_tmpfs_size_mb")]
    pub tmpfs_size_mb: u64,
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self {
            execution_root: default_execution_root(),
            docker_socket: None,
            cpu_percent: default_cpu_percent(),
            pids_limit: default_pids_limit(),
            user: default_sandbox_user(),
            tmpfs_size_mb: default_tmpfs_size_mb(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_remote_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Environment variable holding the API key.
    #[serde(default)]
    pub api_key_env: Option<String>,
    #[serde(default)]
    pub rapidapi_host: Option<String>,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_max_wait")]
    pub max_wait_seconds: u64,
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

impl RemoteConfig {
    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key.clone().or_else(|| {
            self.api_key_env
                .as_ref()
                .and_then(|var| std::env::var(var).ok())
        })
    }
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_url: default_remote_url(),
            api_key: None,
            api_key_env: None,
            rapidapi_host: None,
            request_timeout_seconds: default_request_timeout(),
            max_wait_seconds: default_max_wait(),
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LanguagesConfig {
    /// YAML catalog replacing the built-in language list.
    #[serde(default)]
    pub catalog: Option<PathBuf>,
    #[serde(default)]
    pub overrides: HashMap<String, LanguageOverride>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// JSON-lines file receiving one record per finished execution.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

fn default_true() -> bool {
    true
}

fn default_remote_preferred_languages() -> Vec<CodeLanguage> {
    vec![
        CodeLanguage::CSharp,
        CodeLanguage::Php,
        CodeLanguage::Ruby,
        CodeLanguage::Swift,
        CodeLanguage::Kotlin,
        CodeLanguage::Scala,
        CodeLanguage::TypeScript,
        CodeLanguage::Dart,
    ]
}

fn default_execution_root() -> PathBuf {
    std::env::temp_dir().join("coderun-executions")
}

fn default_cpu_percent() -> u32 {
    50
}

fn default_pids_limit() -> i64 {
    50
}

fn default_sandbox_user() -> String {
    "nobody".to_string()
}

fn default_tmpfs_size_mb() -> u64 {
    64
}

fn default_remote_url() -> String {
    "https://ce.judge0.com".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

fn default_max_wait() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    1000
}

fn default_log_level() -> String {
    "info".to_string()
}

impl CoderunConfig {
    pub fn validate(&self) -> Result<(), ExecutionError> {
        if self.sandbox.cpu_percent == 0 || self.sandbox.cpu_percent > 100 {
            return Err(ExecutionError::ConfigError(
                "sandbox.cpu_percent must be between 1 and 100".to_string(),
            ));
        }

        if self.sandbox.pids_limit <= 0 {
            return Err(ExecutionError::ConfigError(
                "sandbox.pids_limit must be greater than 0".to_string(),
            ));
        }

        if self.sandbox.user.trim().is_empty() {
            return Err(ExecutionError::ConfigError(
                "sandbox.user cannot be empty".to_string(),
            ));
        }

        if self.sandbox.tmpfs_size_mb == 0 {
            return Err(ExecutionError::ConfigError(
                "sandbox.tmpfs_size_mb must be greater than 0".to_string(),
            ));
        }

        if self.remote.enabled {
            let url = &self.remote.base_url;
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ExecutionError::ConfigError(format!(
                    "remote.base_url must be an http(s) URL, got '{}'",
                    url
                )));
            }
            if self.remote.poll_interval_ms == 0 {
                return Err(ExecutionError::ConfigError(
                    "remote.poll_interval_ms must be greater than 0".to_string(),
                ));
            }
            if self.remote.max_wait_seconds == 0 {
                return Err(ExecutionError::ConfigError(
                    "remote.max_wait_seconds must be greater than 0".to_string(),
                ));
            }
        } else if self.execution.method == PreferredMethod::Remote {
            return Err(ExecutionError::ConfigError(
                "execution.method is 'remote' but the remote backend is disabled".to_string(),
            ));
        }

        match self.logging.level.to_ascii_lowercase().as_str() {
            "error" | "warn" | "info" | "debug" | "trace" | "off" => {}
            other => {
                return Err(ExecutionError::ConfigError(format!(
                    "Unknown logging.level '{}'",
                    other
                )))
            }
        }

        Ok(())
    }
}
