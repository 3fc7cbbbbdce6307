use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Upper bound on submitted source size, in bytes.
pub const MAX_SOURCE_BYTES: usize = 10_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionStatus {
    Success,
    Error,
    Timeout,
}

/// Why a run did not succeed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    ImageUnavailable,
    CompilationFailure,
    RuntimeFailure,
    Timeout,
    InfrastructureFailure,
}

/// Backend that produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ExecutionMethod {
    #[serde(rename = "sandbox")]
    Sandbox,
    #[serde(rename = "remote-fallback")]
    RemoteFallback,
}

impl std::fmt::Display for ExecutionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecutionMethod::Sandbox => write!(f, "sandbox"),
            ExecutionMethod::RemoteFallback => write!(f, "remote-fallback"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRequest {
    pub source_code: String,
    pub language_id: String,
    #[serde(default)]
    pub stdin: Option<String>,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub block_id: Option<String>,
}

impl ExecutionRequest {
    pub fn new(source_code: impl Into<String>, language_id: impl Into<String>) -> Self {
        Self {
            source_code: source_code.into(),
            language_id: language_id.into(),
            stdin: None,
            user_id: None,
            block_id: None,
        }
    }

    pub fn with_stdin(mut self, stdin: impl Into<String>) -> Self {
        self.stdin = Some(stdin.into());
        self
    }

    pub fn with_user(mut self, user_id: i64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn with_block(mut self, block_id: impl Into<String>) -> Self {
        self.block_id = Some(block_id.into());
        self
    }

    /// Stdin is only forwarded when it carries something.
    pub fn stdin_payload(&self) -> Option<&str> {
        self.stdin.as_deref().filter(|s| !s.is_empty())
    }
}

/// Outcome of a single run attempt on one backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionResult {
    pub status: ExecutionStatus,
    pub stdout: Option<String>,
    pub stderr: Option<String>,
    pub exit_code: Option<i64>,
    pub execution_time_ms: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_used_mb: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub failure: Option<FailureKind>,
}

impl ExecutionResult {
    pub fn success(stdout: String, stderr: Option<String>, execution_time_ms: u64) -> Self {
        Self {
            status: ExecutionStatus::Success,
            stdout: Some(stdout),
            stderr,
            exit_code: Some(0),
            execution_time_ms,
            error_message: None,
            diagnostics: None,
            memory_used_mb: None,
            failure: None,
        }
    }

    pub fn failed(kind: FailureKind, message: impl Into<String>) -> Self {
        let status = if kind == FailureKind::Timeout {
            ExecutionStatus::Timeout
        } else {
            ExecutionStatus::Error
        };
        Self {
            status,
            stdout: None,
            stderr: None,
            exit_code: None,
            execution_time_ms: 0,
            error_message: Some(message.into()),
            diagnostics: None,
            memory_used_mb: None,
            failure: Some(kind),
        }
    }

    pub fn with_output(mut self, stdout: Option<String>, stderr: Option<String>) -> Self {
        self.stdout = stdout;
        self.stderr = stderr;
        self
    }

    pub fn with_exit_code(mut self, exit_code: i64) -> Self {
        // A timed-out process has no meaningful exit status.
        if self.status != ExecutionStatus::Timeout {
            self.exit_code = Some(exit_code);
        }
        self
    }

    pub fn with_duration(mut self, execution_time_ms: u64) -> Self {
        self.execution_time_ms = execution_time_ms;
        self
    }

    pub fn with_diagnostics(mut self, diagnostics: impl Into<String>) -> Self {
        self.diagnostics = Some(diagnostics.into());
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Success
    }
}

/// Canonical, immutable outcome of one execution request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub id: Uuid,
    pub language_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub block_id: Option<String>,
    pub method: ExecutionMethod,
    pub result: ExecutionResult,
    pub created_at: DateTime<Utc>,
    pub completed_at: DateTime<Utc>,
}

impl ExecutionRecord {
    pub fn status(&self) -> ExecutionStatus {
        self.result.status
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_result_shape() {
        let result = ExecutionResult::success("hi\n".to_string(), None, 12);
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.stdout.as_deref(), Some("hi\n"));
        assert!(result.error_message.is_none());
    }

    #[test]
    fn test_timeout_result_ignores_exit_code() {
        let result = ExecutionResult::failed(FailureKind::Timeout, "too slow").with_exit_code(137);
        assert_eq!(result.status, ExecutionStatus::Timeout);
        assert_eq!(result.exit_code, None);
    }

    #[test]
    fn test_method_serializes_with_hyphen() {
        let json = serde_json::to_string(&ExecutionMethod::RemoteFallback).unwrap();
        assert_eq!(json, "\"remote-fallback\"");
        assert_eq!(ExecutionMethod::Sandbox.to_string(), "sandbox");
    }

    #[test]
    fn test_blank_stdin_is_not_forwarded() {
        let request = ExecutionRequest::new("print(1)", "python39").with_stdin("");
        assert_eq!(request.stdin_payload(), None);
        let request = request.with_stdin("5\n");
        assert_eq!(request.stdin_payload(), Some("5\n"));
    }
}
