//! Language catalog
//!
//! A `LanguageProfile` is pure data: the image to run, the file extension of
//! the submitted source, and shell command templates in which `{file}` is
//! replaced by the generated source file name. Every language is executed
//! through the same code path; the only structural difference between
//! languages is whether a compile step precedes the run step.

use serde::{Deserialize, Serialize};

pub mod registry;

pub use registry::{LanguageOverride, LanguageRegistry};

#[cfg(test)]
mod tests;

/// Placeholder substituted with the generated source file name.
pub const FILE_PLACEHOLDER: &str = "{file}";

/// Base name of the generated source file inside the scratch directory.
pub const SOURCE_STEM: &str = "main";

/// Mount point of the per-job build directory used by compile steps.
pub const BUILD_MOUNT: &str = "/build";

/// Upper bound on a profile's memory ceiling (64 GiB).
pub const MAX_MEMORY_LIMIT_MB: u64 = 64 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CodeLanguage {
    Python,
    JavaScript,
    Java,
    Cpp,
    C,
    Go,
    Rust,
    CSharp,
    Php,
    Ruby,
    Swift,
    Kotlin,
    Scala,
    TypeScript,
    Dart,
}

impl CodeLanguage {
    pub fn as_str(&self) -> &'static str {
        match self {
            CodeLanguage::Python => "python",
            CodeLanguage::JavaScript => "javascript",
            CodeLanguage::Java => "java",
            CodeLanguage::Cpp => "cpp",
            CodeLanguage::C => "c",
            CodeLanguage::Go => "go",
            CodeLanguage::Rust => "rust",
            CodeLanguage::CSharp => "csharp",
            CodeLanguage::Php => "php",
            CodeLanguage::Ruby => "ruby",
            CodeLanguage::Swift => "swift",
            CodeLanguage::Kotlin => "kotlin",
            CodeLanguage::Scala => "scala",
            CodeLanguage::TypeScript => "typescript",
            CodeLanguage::Dart => "dart",
        }
    }
}

impl std::fmt::Display for CodeLanguage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LanguageProfile {
    pub id: String,
    pub name: String,
    pub language: CodeLanguage,
    pub version: String,
    pub docker_image: String,
    pub file_extension: String,
    #[serde(default)]
    pub compile_command: Option<String>,
    pub run_command: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_memory_limit_mb")]
    pub memory_limit_mb: u64,
    #[serde(default = "default_enabled")]
    pub is_enabled: bool,
    /// Extra `KEY=VALUE` variables passed to the container.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub env: Vec<String>,
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_memory_limit_mb() -> u64 {
    128
}

fn default_enabled() -> bool {
    true
}

impl LanguageProfile {
    /// `main.py`, `main.cpp`, ...
    pub fn source_file_name(&self) -> String {
        let ext = self.file_extension.trim_start_matches('.');
        format!("{}.{}", SOURCE_STEM, ext)
    }

    pub fn has_compile_step(&self) -> bool {
        self.compile_command
            .as_deref()
            .map(|c| !c.trim().is_empty())
            .unwrap_or(false)
    }

    pub fn render(&self, template: &str) -> String {
        template.replace(FILE_PLACEHOLDER, &self.source_file_name())
    }

    pub fn run_command_line(&self) -> String {
        self.render(&self.run_command)
    }

    pub fn compile_command_line(&self) -> Option<String> {
        if self.has_compile_step() {
            self.compile_command.as_deref().map(|c| self.render(c))
        } else {
            None
        }
    }

    /// Checks that the profile can produce a runnable command.
    pub fn validate(&self) -> Result<(), String> {
        if self.id.trim().is_empty() {
            return Err("language id must not be empty".to_string());
        }
        if self.docker_image.trim().is_empty() {
            return Err(format!("language '{}' has no docker image", self.id));
        }
        if self.run_command.trim().is_empty() {
            return Err(format!("language '{}' has an empty run command", self.id));
        }
        if self.timeout_seconds == 0 {
            return Err(format!("language '{}' has a zero timeout", self.id));
        }
        if self.memory_limit_mb == 0 {
            return Err(format!("language '{}' has a zero memory limit", self.id));
        }
        if self.memory_limit_mb > MAX_MEMORY_LIMIT_MB {
            return Err(format!(
                "language '{}' has a memory limit of {} MB, the maximum is {} MB",
                self.id, self.memory_limit_mb, MAX_MEMORY_LIMIT_MB
            ));
        }
        let template_with_file = match self.compile_command_line() {
            Some(_) => self.compile_command.as_deref().unwrap_or_default(),
            None => self.run_command.as_str(),
        };
        // A fixed command naming the generated file is as good as the placeholder.
        if !template_with_file.contains(FILE_PLACEHOLDER)
            && !template_with_file.contains(&self.source_file_name())
        {
            return Err(format!(
                "language '{}' references neither {} nor {}",
                self.id,
                FILE_PLACEHOLDER,
                self.source_file_name()
            ));
        }
        Ok(())
    }
}
