//! Static pre-check for submitted source code
//!
//! A cheap deny-list scan that runs before any scratch directory or
//! container is allocated. It is defense in depth only: the sandbox's
//! OS-level restrictions are what actually contain a hostile program. The
//! scanner never looks at program output, only at the submitted text.

use std::collections::HashMap;

use regex::{RegexSet, RegexSetBuilder};

use crate::core_types::MAX_SOURCE_BYTES;
use crate::languages::CodeLanguage;

// ============================================================================
// DENY LISTS
// ============================================================================

const COMMON_PATTERNS: &[&str] = &[
    // Filesystem access
    r"\bopen\s*\(",
    r"\bfile\s*\(",
    r"\bwith\s+open",
    r"\.write\s*\(",
    r"\.read\s*\(",
    // Process and exec primitives
    r"\bos\.",
    r"\bsystem\s*\(",
    r"\bsubprocess\.",
    r"\beval\s*\(",
    r"\bexec\s*\(",
    // Network libraries
    r"\bsocket\.",
    r"\brequests\.",
    r"\burllib\.",
    r"\bhttplib\.",
    // Raw OS modules
    r"import\s+os\b",
    r"import\s+sys\b",
    r"import\s+subprocess\b",
    r"import\s+socket\b",
    r"from\s+os\s+import",
    r"from\s+sys\s+import",
    r"from\s+subprocess\s+import",
    // Infinite loop idioms
    r"while\s+true\s*:",
    r"while\s*\(\s*(true|1)\s*\)",
    r"for\s*\(\s*;\s*;\s*\)",
];

const PYTHON_PATTERNS: &[&str] = &[
    r"__import__\s*\(",
    r"\bglobals\s*\(",
    r"\blocals\s*\(",
    r"\bvars\s*\(",
    r"\bdir\s*\(",
    r"\bimportlib\b",
];

const JAVASCRIPT_PATTERNS: &[&str] = &[
    r"\brequire\s*\(",
    r"\bimport\s*\(",
    r"\bfs\.",
    r"\bprocess\.",
    r"child_process",
];

const NATIVE_PATTERNS: &[&str] = &[
    r"#include\s*<fstream>",
    r"#include\s*<cstdlib>",
    r"#include\s*<unistd\.h>",
    r"#include\s*<sys/socket\.h>",
    r"\bpopen\s*\(",
    r"\bfork\s*\(",
];

const JAVA_PATTERNS: &[&str] = &[
    r"Runtime\s*\.\s*getRuntime",
    r"\bProcessBuilder\b",
    r"\bjava\.io\.File",
    r"\bjava\.nio\.file",
    r"\bjava\.net\b",
];

const GO_PATTERNS: &[&str] = &[r#""os/exec""#, r#""net(/[a-z]+)?""#, r#""syscall""#, r#""os""#];

const RUST_PATTERNS: &[&str] = &[
    r"std::process",
    r"std::fs",
    r"std::net",
    r"\bunsafe\b",
];

fn language_patterns(language: CodeLanguage) -> &'static [&'static str] {
    match language {
        CodeLanguage::Python => PYTHON_PATTERNS,
        CodeLanguage::JavaScript | CodeLanguage::TypeScript => JAVASCRIPT_PATTERNS,
        CodeLanguage::C | CodeLanguage::Cpp => NATIVE_PATTERNS,
        CodeLanguage::Java | CodeLanguage::Kotlin | CodeLanguage::Scala => JAVA_PATTERNS,
        CodeLanguage::Go => GO_PATTERNS,
        CodeLanguage::Rust => RUST_PATTERNS,
        _ => &[],
    }
}

// ============================================================================
// CHECKER
// ============================================================================

/// Result of inspecting one piece of source code
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SafetyVerdict {
    Safe,
    /// Source exceeds the size limit
    TooLarge { size: usize, limit: usize },
    /// Source matched a deny-list pattern
    Denied { pattern: String },
}

impl SafetyVerdict {
    pub fn is_safe(&self) -> bool {
        matches!(self, SafetyVerdict::Safe)
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            SafetyVerdict::Safe => None,
            SafetyVerdict::TooLarge { size, limit } => Some(format!(
                "source is {} bytes, the limit is {} bytes",
                size, limit
            )),
            SafetyVerdict::Denied { pattern } => {
                Some(format!("matched forbidden pattern '{}'", pattern))
            }
        }
    }
}

struct CompiledDenyList {
    patterns: Vec<&'static str>,
    set: RegexSet,
}

impl CompiledDenyList {
    fn compile(patterns: Vec<&'static str>) -> Self {
        let set = RegexSetBuilder::new(&patterns)
            .case_insensitive(true)
            .build()
            .expect("built-in deny-list patterns are valid regular expressions");
        Self { patterns, set }
    }

    fn first_match(&self, source: &str) -> Option<&'static str> {
        self.set
            .matches(source)
            .iter()
            .next()
            .map(|idx| self.patterns[idx])
    }
}

/// Case-insensitive deny-list scanner, compiled once per language.
pub struct CodeSafetyChecker {
    max_source_bytes: usize,
    common: CompiledDenyList,
    per_language: HashMap<CodeLanguage, CompiledDenyList>,
}

impl CodeSafetyChecker {
    pub fn new() -> Self {
        let languages = [
            CodeLanguage::Python,
            CodeLanguage::JavaScript,
            CodeLanguage::C,
            CodeLanguage::Java,
            CodeLanguage::Go,
            CodeLanguage::Rust,
        ];
        let mut per_language = HashMap::new();
        for language in languages {
            per_language.insert(
                language,
                CompiledDenyList::compile(language_patterns(language).to_vec()),
            );
        }
        Self {
            max_source_bytes: MAX_SOURCE_BYTES,
            common: CompiledDenyList::compile(COMMON_PATTERNS.to_vec()),
            per_language,
        }
    }

    pub fn with_max_source_bytes(mut self, max_source_bytes: usize) -> Self {
        self.max_source_bytes = max_source_bytes;
        self
    }

    pub fn max_source_bytes(&self) -> usize {
        self.max_source_bytes
    }

    fn extras_for(&self, language: CodeLanguage) -> Option<&CompiledDenyList> {
        let key = match language {
            CodeLanguage::Cpp => CodeLanguage::C,
            CodeLanguage::TypeScript => CodeLanguage::JavaScript,
            CodeLanguage::Kotlin | CodeLanguage::Scala => CodeLanguage::Java,
            other => other,
        };
        self.per_language.get(&key)
    }

    pub fn inspect(&self, source_code: &str, language: CodeLanguage) -> SafetyVerdict {
        if source_code.len() > self.max_source_bytes {
            log::warn!(
                "Code size {} exceeds limit of {} bytes",
                source_code.len(),
                self.max_source_bytes
            );
            return SafetyVerdict::TooLarge {
                size: source_code.len(),
                limit: self.max_source_bytes,
            };
        }

        let matched = self.common.first_match(source_code).or_else(|| {
            self.extras_for(language)
                .and_then(|list| list.first_match(source_code))
        });

        match matched {
            Some(pattern) => {
                log::warn!("Dangerous code pattern found in user code: '{}'", pattern);
                SafetyVerdict::Denied {
                    pattern: pattern.to_string(),
                }
            }
            None => SafetyVerdict::Safe,
        }
    }

    pub fn is_safe(&self, source_code: &str, language: CodeLanguage) -> bool {
        self.inspect(source_code, language).is_safe()
    }
}

impl Default for CodeSafetyChecker {
    fn default() -> Self {
        Self::new()
    }
}
