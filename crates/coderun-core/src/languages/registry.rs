use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::{CodeLanguage, LanguageProfile};
use crate::config::LanguagesConfig;
use crate::errors::ExecutionError;

/// Configuration-level adjustments applied on top of a catalog entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LanguageOverride {
    #[serde(default)]
    pub timeout_seconds: Option<u64>,
    #[serde(default)]
    pub memory_limit_mb: Option<u64>,
    #[serde(default)]
    pub enabled: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    languages: Vec<LanguageProfile>,
}

/// Read-only catalog of supported languages.
///
/// Built once at startup and shared behind an `Arc`; nothing mutates it
/// while requests are being served.
#[derive(Debug, Clone)]
pub struct LanguageRegistry {
    profiles: Vec<LanguageProfile>,
}

impl LanguageRegistry {
    pub fn new(profiles: Vec<LanguageProfile>) -> Result<Self, ExecutionError> {
        let mut seen = HashSet::new();
        for profile in &profiles {
            if !seen.insert(profile.id.as_str()) {
                return Err(ExecutionError::ConfigError(format!(
                    "duplicate language id '{}'",
                    profile.id
                )));
            }
            if profile.is_enabled {
                profile.validate().map_err(ExecutionError::ConfigError)?;
            }
        }
        Ok(Self { profiles })
    }

    /// Built-in catalog used when no backing store is configured.
    pub fn with_defaults() -> Self {
        Self {
            profiles: default_profiles(),
        }
    }

    pub fn from_yaml_str(content: &str) -> Result<Self, ExecutionError> {
        let catalog: CatalogFile = serde_yaml::from_str(content).map_err(|e| {
            ExecutionError::ConfigError(format!("Failed to parse language catalog: {}", e))
        })?;
        Self::new(catalog.languages)
    }

    pub async fn from_yaml_file<P: AsRef<Path>>(path: P) -> Result<Self, ExecutionError> {
        let path = path.as_ref();
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ExecutionError::ConfigError(format!(
                "Failed to read language catalog {}: {}",
                path.display(),
                e
            ))
        })?;
        log::info!("Loading language catalog from {}", path.display());
        Self::from_yaml_str(&content)
    }

    /// Loads the configured catalog (or the built-in one) and applies the
    /// configured overrides.
    pub async fn from_config(config: &LanguagesConfig) -> Result<Self, ExecutionError> {
        let registry = match &config.catalog {
            Some(path) => Self::from_yaml_file(path).await?,
            None => Self::with_defaults(),
        };
        registry.apply_overrides(&config.overrides)
    }

    /// Applies per-language overrides; unknown ids are rejected so that a
    /// typo in configuration does not silently do nothing.
    pub fn apply_overrides(
        mut self,
        overrides: &HashMap<String, LanguageOverride>,
    ) -> Result<Self, ExecutionError> {
        for (id, adjustment) in overrides {
            let profile = self
                .profiles
                .iter_mut()
                .find(|p| &p.id == id)
                .ok_or_else(|| {
                    ExecutionError::ConfigError(format!(
                        "override refers to unknown language '{}'",
                        id
                    ))
                })?;
            if let Some(timeout) = adjustment.timeout_seconds {
                profile.timeout_seconds = timeout;
            }
            if let Some(memory) = adjustment.memory_limit_mb {
                profile.memory_limit_mb = memory;
            }
            if let Some(enabled) = adjustment.enabled {
                profile.is_enabled = enabled;
            }
            log::debug!("Applied override to language '{}': {:?}", id, adjustment);
        }
        // Re-check invariants with the adjusted values
        Self::new(self.profiles)
    }

    /// Looks up an enabled profile by id.
    pub fn resolve(&self, language_id: &str) -> Result<&LanguageProfile, ExecutionError> {
        self.profiles
            .iter()
            .find(|p| p.id == language_id && p.is_enabled)
            .ok_or_else(|| ExecutionError::UnsupportedLanguage(language_id.to_string()))
    }

    pub fn find_by_language(&self, language: CodeLanguage) -> Option<&LanguageProfile> {
        self.profiles
            .iter()
            .find(|p| p.language == language && p.is_enabled)
    }

    pub fn list_enabled(&self) -> Vec<LanguageProfile> {
        self.profiles
            .iter()
            .filter(|p| p.is_enabled)
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.profiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.profiles.is_empty()
    }
}

impl Default for LanguageRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[allow(clippy::too_many_arguments)]
fn profile(
    id: &str,
    name: &str,
    language: CodeLanguage,
    version: &str,
    image: &str,
    extension: &str,
    compile: Option<&str>,
    run: &str,
    timeout_seconds: u64,
    memory_limit_mb: u64,
) -> LanguageProfile {
    LanguageProfile {
        id: id.to_string(),
        name: name.to_string(),
        language,
        version: version.to_string(),
        docker_image: image.to_string(),
        file_extension: extension.to_string(),
        compile_command: compile.map(str::to_string),
        run_command: run.to_string(),
        timeout_seconds,
        memory_limit_mb,
        is_enabled: true,
        env: Vec::new(),
    }
}

fn default_profiles() -> Vec<LanguageProfile> {
    let mut go = profile(
        "go121",
        "Go 1.21",
        CodeLanguage::Go,
        "1.21",
        "golang:1.21-alpine",
        ".go",
        Some("go build -o /build/main {file}"),
        "/build/main",
        15,
        256,
    );
    // The root filesystem is read-only; the Go toolchain needs a writable cache.
    go.env = vec!["GOCACHE=/tmp/gocache".to_string(), "GOPATH=/tmp/go".to_string()];

    vec![
        profile(
            "python39",
            "Python 3.9",
            CodeLanguage::Python,
            "3.9",
            "python:3.9-alpine",
            ".py",
            None,
            "python3 {file}",
            10,
            128,
        ),
        profile(
            "node18",
            "Node.js 18",
            CodeLanguage::JavaScript,
            "18",
            "node:18-alpine",
            ".js",
            None,
            "node {file}",
            10,
            128,
        ),
        profile(
            "java17",
            "Java 17",
            CodeLanguage::Java,
            "17",
            "eclipse-temurin:17-jdk-alpine",
            ".java",
            None,
            "java {file}",
            15,
            512,
        ),
        profile(
            "cpp17",
            "C++ 17",
            CodeLanguage::Cpp,
            "17",
            "gcc:13",
            ".cpp",
            Some("g++ -O2 -std=c++17 -o /build/main {file}"),
            "/build/main",
            10,
            256,
        ),
        profile(
            "c11",
            "C 11",
            CodeLanguage::C,
            "11",
            "gcc:13",
            ".c",
            Some("gcc -O2 -std=c11 -o /build/main {file}"),
            "/build/main",
            10,
            256,
        ),
        go,
        profile(
            "rust170",
            "Rust 1.70",
            CodeLanguage::Rust,
            "1.70",
            "rust:1.70-slim",
            ".rs",
            Some("rustc -O -o /build/main {file}"),
            "/build/main",
            15,
            256,
        ),
    ]
}
