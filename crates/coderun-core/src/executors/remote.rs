// src/executors/remote.rs
use async_trait::async_trait;
use base64::Engine;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use super::CodeExecutor;
use crate::config::RemoteConfig;
use crate::core_types::{ExecutionRequest, ExecutionResult, FailureKind};
use crate::errors::ExecutionError;
use crate::languages::{CodeLanguage, LanguageProfile};

/// Judge0 status ids up to this value mean "queued" or "processing".
const LAST_PENDING_STATUS: u32 = 2;
const STATUS_ACCEPTED: u32 = 3;
const STATUS_TIME_LIMIT_EXCEEDED: u32 = 5;
const STATUS_COMPILATION_ERROR: u32 = 6;
const STATUS_INTERNAL_ERROR: u32 = 13;
const STATUS_EXEC_FORMAT_ERROR: u32 = 14;

/// Consecutive transient poll failures (5xx, 429) tolerated before giving up.
const MAX_TRANSIENT_POLL_FAILURES: u32 = 3;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionRequest {
    pub source_code: String,
    pub language_id: u32,
    pub stdin: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SubmissionToken {
    pub token: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionStatus {
    pub id: u32,
    #[serde(default)]
    pub description: String,
}

/// Subset of a Judge0 submission we read back. Text fields are base64.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SubmissionResponse {
    #[serde(default)]
    pub stdout: Option<String>,
    #[serde(default)]
    pub stderr: Option<String>,
    #[serde(default)]
    pub compile_output: Option<String>,
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub exit_code: Option<i64>,
    /// Peak memory in kilobytes
    #[serde(default)]
    pub memory: Option<f64>,
    #[serde(default)]
    pub status: SubmissionStatus,
}

/// Remote execution backend speaking the Judge0 REST API.
#[derive(Debug, Clone)]
pub struct Judge0Executor {
    client: Client,
    base_url: String,
    api_key: Option<String>,
    rapidapi_host: Option<String>,
    max_wait: Duration,
    poll_interval: Duration,
}

impl Judge0Executor {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: None,
            rapidapi_host: None,
            max_wait: Duration::from_secs(60),
            poll_interval: Duration::from_secs(1),
        }
    }

    pub fn from_config(config: &RemoteConfig) -> Result<Self, ExecutionError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_seconds))
            .build()
            .map_err(|e| ExecutionError::ConfigError(format!("Failed to build HTTP client: {}", e)))?;

        let mut executor = Self::new(config.base_url.clone())
            .with_max_wait(Duration::from_secs(config.max_wait_seconds))
            .with_poll_interval(Duration::from_millis(config.poll_interval_ms));
        executor.client = client;
        if let Some(key) = config.resolved_api_key() {
            executor = executor.with_api_key(key);
        }
        if let Some(host) = &config.rapidapi_host {
            executor = executor.with_rapidapi_host(host.clone());
        }
        Ok(executor)
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_rapidapi_host(mut self, host: impl Into<String>) -> Self {
        self.rapidapi_host = Some(host.into());
        self
    }

    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Judge0 language id for a language family.
    pub fn language_id(language: CodeLanguage) -> u32 {
        match language {
            CodeLanguage::Python => 71,
            CodeLanguage::JavaScript => 63,
            CodeLanguage::Java => 62,
            CodeLanguage::Cpp => 54,
            CodeLanguage::C => 50,
            CodeLanguage::CSharp => 51,
            CodeLanguage::Go => 60,
            CodeLanguage::Rust => 73,
            CodeLanguage::Php => 68,
            CodeLanguage::Ruby => 72,
            CodeLanguage::Swift => 83,
            CodeLanguage::Kotlin => 78,
            CodeLanguage::Scala => 81,
            CodeLanguage::TypeScript => 74,
            CodeLanguage::Dart => 90,
        }
    }

    fn is_rapidapi(&self) -> bool {
        self.base_url.contains("rapidapi.com")
    }

    fn with_auth(&self, builder: RequestBuilder) -> RequestBuilder {
        let Some(key) = &self.api_key else {
            return builder;
        };
        if self.is_rapidapi() {
            let builder = builder.header("X-RapidAPI-Key", key);
            match &self.rapidapi_host {
                Some(host) => builder.header("X-RapidAPI-Host", host),
                None => builder,
            }
        } else {
            builder.header("X-Auth-Token", key)
        }
    }

    async fn submit(
        &self,
        request: &ExecutionRequest,
        language_id: u32,
    ) -> Result<String, ExecutionError> {
        let body = SubmissionRequest {
            source_code: encode(&request.source_code),
            language_id,
            stdin: request.stdin_payload().map(encode),
        };

        let url = format!("{}/submissions", self.base_url);
        let response = self
            .with_auth(self.client.post(&url))
            .query(&[("base64_encoded", "true"), ("wait", "false")])
            .json(&body)
            .send()
            .await
            .map_err(|e| ExecutionError::Infrastructure(format!("Remote submission failed: {}", e)))?;

        let status = response.status();
        if status != StatusCode::CREATED {
            let text = response.text().await.unwrap_or_default();
            return Err(ExecutionError::Infrastructure(format!(
                "Remote submission rejected with status {}: {}",
                status, text
            )));
        }

        let token: SubmissionToken = response.json().await.map_err(|e| {
            ExecutionError::Infrastructure(format!("Invalid submission response: {}", e))
        })?;
        Ok(token.token)
    }

    /// Polls until the submission leaves the queue. `None` means the wait
    /// budget ran out first.
    async fn wait_for_result(
        &self,
        token: &str,
    ) -> Result<Option<SubmissionResponse>, ExecutionError> {
        let url = format!("{}/submissions/{}", self.base_url, token);
        let started = Instant::now();
        let mut transient_failures = 0;

        while started.elapsed() < self.max_wait {
            let response = self
                .with_auth(self.client.get(&url))
                .query(&[("base64_encoded", "true")])
                .send()
                .await
                .map_err(|e| {
                    ExecutionError::Infrastructure(format!("Remote result polling failed: {}", e))
                })?;

            let status = response.status();
            if status == StatusCode::OK {
                transient_failures = 0;
                let submission: SubmissionResponse = response.json().await.map_err(|e| {
                    ExecutionError::Infrastructure(format!("Invalid submission payload: {}", e))
                })?;
                if submission.status.id > LAST_PENDING_STATUS {
                    return Ok(Some(submission));
                }
                log::debug!(
                    "Submission {} still pending ({})",
                    token,
                    submission.status.description
                );
            } else if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
                transient_failures += 1;
                log::warn!(
                    "Polling {} returned {} ({}/{})",
                    token,
                    status,
                    transient_failures,
                    MAX_TRANSIENT_POLL_FAILURES
                );
                if transient_failures >= MAX_TRANSIENT_POLL_FAILURES {
                    return Err(ExecutionError::Infrastructure(format!(
                        "Remote result polling failed {} times in a row, last status {}",
                        transient_failures, status
                    )));
                }
            } else {
                let text = response.text().await.unwrap_or_default();
                return Err(ExecutionError::Infrastructure(format!(
                    "Remote result polling rejected with status {}: {}",
                    status, text
                )));
            }

            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(None)
    }

    pub(crate) fn decode_result(submission: SubmissionResponse) -> ExecutionResult {
        let stdout = submission.stdout.as_deref().map(decode);
        let stderr = submission.stderr.as_deref().map(decode);
        let memory_used_mb = submission.memory.map(|kb| kb / 1024.0);
        let status = submission.status;

        let mut result = match status.id {
            STATUS_ACCEPTED => ExecutionResult::success(stdout.unwrap_or_default(), stderr, 0),
            STATUS_TIME_LIMIT_EXCEEDED => {
                ExecutionResult::failed(FailureKind::Timeout, status.description)
                    .with_output(stdout, stderr)
            }
            STATUS_COMPILATION_ERROR => {
                let compile_output = submission.compile_output.as_deref().map(decode);
                ExecutionResult::failed(FailureKind::CompilationFailure, "Compilation error")
                    .with_output(stdout, compile_output.or(stderr))
                    .with_exit_code(submission.exit_code.unwrap_or(1))
            }
            STATUS_INTERNAL_ERROR | STATUS_EXEC_FORMAT_ERROR => {
                let mut failed =
                    ExecutionResult::failed(FailureKind::InfrastructureFailure, status.description)
                        .with_output(stdout, stderr)
                        .with_exit_code(submission.exit_code.unwrap_or(1));
                if let Some(message) = submission.message.as_deref().map(decode) {
                    failed = failed.with_diagnostics(message);
                }
                failed
            }
            _ => {
                let description = if status.description.is_empty() {
                    "Runtime error".to_string()
                } else {
                    status.description
                };
                ExecutionResult::failed(FailureKind::RuntimeFailure, description)
                    .with_output(stdout, stderr)
                    .with_exit_code(submission.exit_code.unwrap_or(1))
            }
        };
        result.memory_used_mb = memory_used_mb;
        result
    }
}

fn encode(text: &str) -> String {
    base64::engine::general_purpose::STANDARD.encode(text.as_bytes())
}

/// Judge0 wraps its base64 output in lines; anything undecodable is kept raw.
fn decode(text: &str) -> String {
    let compact: String = text.chars().filter(|c| !c.is_whitespace()).collect();
    match base64::engine::general_purpose::STANDARD.decode(compact.as_bytes()) {
        Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
        Err(_) => text.to_string(),
    }
}

#[async_trait]
impl CodeExecutor for Judge0Executor {
    fn name(&self) -> &'static str {
        "judge0"
    }

    async fn execute(
        &self,
        request: &ExecutionRequest,
        profile: &LanguageProfile,
    ) -> Result<ExecutionResult, ExecutionError> {
        let started = Instant::now();
        let language_id = Self::language_id(profile.language);

        log::info!(
            "Submitting {} code to remote backend {}",
            profile.id,
            self.base_url
        );
        let token = self.submit(request, language_id).await?;

        let result = match self.wait_for_result(&token).await? {
            Some(submission) => Self::decode_result(submission),
            None => {
                log::warn!(
                    "Remote submission {} did not finish within {:?}",
                    token,
                    self.max_wait
                );
                // The backend never reported a verdict, so this is not the
                // program's time limit.
                ExecutionResult::failed(
                    FailureKind::InfrastructureFailure,
                    format!(
                        "Execution timeout exceeded: remote backend gave no result within {} ms",
                        self.max_wait.as_millis()
                    ),
                )
            }
        };

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let diagnostics = result
            .diagnostics
            .clone()
            .unwrap_or_else(|| format!("Remote execution completed with token {}", token));
        Ok(result.with_duration(elapsed_ms).with_diagnostics(diagnostics))
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/about", self.base_url);
        match self.with_auth(self.client.get(&url)).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core_types::ExecutionStatus;
    use crate::languages::LanguageRegistry;
    use crate::test_utils::mock_judge0_server::MockJudge0Server;

    fn profile(id: &str) -> LanguageProfile {
        LanguageRegistry::with_defaults().resolve(id).unwrap().clone()
    }

    fn finished(status_id: u32, description: &str) -> SubmissionResponse {
        SubmissionResponse {
            status: SubmissionStatus {
                id: status_id,
                description: description.to_string(),
            },
            ..Default::default()
        }
    }

    fn fast(executor: Judge0Executor) -> Judge0Executor {
        executor
            .with_poll_interval(Duration::from_millis(10))
            .with_max_wait(Duration::from_secs(5))
    }

    #[test]
    fn test_language_ids() {
        assert_eq!(Judge0Executor::language_id(CodeLanguage::Python), 71);
        assert_eq!(Judge0Executor::language_id(CodeLanguage::Cpp), 54);
        assert_eq!(Judge0Executor::language_id(CodeLanguage::Dart), 90);
    }

    #[test]
    fn test_decode_accepted_submission() {
        let mut submission = finished(3, "Accepted");
        submission.stdout = Some(encode("hi\n"));
        submission.exit_code = Some(0);
        submission.memory = Some(2048.0);

        let result = Judge0Executor::decode_result(submission);
        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.stdout.as_deref(), Some("hi\n"));
        assert_eq!(result.exit_code, Some(0));
        assert_eq!(result.memory_used_mb, Some(2.0));
    }

    #[test]
    fn test_decode_failure_statuses() {
        let timeout = Judge0Executor::decode_result(finished(5, "Time Limit Exceeded"));
        assert_eq!(timeout.status, ExecutionStatus::Timeout);
        assert_eq!(timeout.exit_code, None);

        let mut compile = finished(6, "Compilation Error");
        compile.compile_output = Some(encode("main.cpp:1: error"));
        let compile = Judge0Executor::decode_result(compile);
        assert_eq!(compile.failure, Some(FailureKind::CompilationFailure));
        assert_eq!(compile.stderr.as_deref(), Some("main.cpp:1: error"));

        let runtime = Judge0Executor::decode_result(finished(11, "Runtime Error (NZEC)"));
        assert_eq!(runtime.status, ExecutionStatus::Error);
        assert_eq!(runtime.failure, Some(FailureKind::RuntimeFailure));
        assert_eq!(runtime.exit_code, Some(1));
        assert_eq!(runtime.error_message.as_deref(), Some("Runtime Error (NZEC)"));

        let internal = Judge0Executor::decode_result(finished(13, "Internal Error"));
        assert_eq!(internal.failure, Some(FailureKind::InfrastructureFailure));
    }

    #[test]
    fn test_decode_tolerates_wrapped_and_raw_text() {
        let wrapped = "aGVsbG8g\nd29ybGQ=\n";
        assert_eq!(decode(wrapped), "hello world");
        assert_eq!(decode("not base64!"), "not base64!");
    }

    #[tokio::test]
    async fn test_execute_submits_and_polls() {
        let mut done = finished(3, "Accepted");
        done.stdout = Some(encode("5\n"));
        let server = MockJudge0Server::start(vec![finished(1, "In Queue"), finished(2, "Processing"), done]).await;

        let executor = fast(Judge0Executor::new(server.address()));
        let request = ExecutionRequest::new("print(input())", "python39").with_stdin("5\n");
        let result = executor.execute(&request, &profile("python39")).await.unwrap();

        assert_eq!(result.status, ExecutionStatus::Success);
        assert_eq!(result.stdout.as_deref(), Some("5\n"));
        assert!(result.diagnostics.unwrap().contains("token"));

        let submissions = server.get_submissions();
        assert_eq!(submissions.len(), 1);
        assert_eq!(submissions[0].language_id, 71);
        assert_eq!(decode(&submissions[0].source_code), "print(input())");
        assert_eq!(submissions[0].stdin.as_deref().map(decode).as_deref(), Some("5\n"));
        assert_eq!(server.poll_count(), 3);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_exhausted_wait_is_an_infrastructure_error_result() {
        let server = MockJudge0Server::start(vec![finished(1, "In Queue")]).await;
        let executor = Judge0Executor::new(server.address())
            .with_poll_interval(Duration::from_millis(10))
            .with_max_wait(Duration::from_millis(100));

        let request = ExecutionRequest::new("print(1)", "python39");
        let result = executor.execute(&request, &profile("python39")).await.unwrap();
        assert_eq!(result.status, ExecutionStatus::Error);
        assert_eq!(result.failure, Some(FailureKind::InfrastructureFailure));
        assert!(result.error_message.unwrap().contains("100 ms"));
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejected_poll_fails_fast() {
        let server = MockJudge0Server::start_failing_polls(StatusCode::NOT_FOUND).await;
        let executor = fast(Judge0Executor::new(server.address()));

        let request = ExecutionRequest::new("print(1)", "python39");
        let err = executor
            .execute(&request, &profile("python39"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Infrastructure(ref m) if m.contains("404")));
        assert_eq!(server.poll_count(), 1);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_repeated_server_errors_while_polling_fail() {
        let server = MockJudge0Server::start_failing_polls(StatusCode::BAD_GATEWAY).await;
        let executor = fast(Judge0Executor::new(server.address()));

        let request = ExecutionRequest::new("print(1)", "python39");
        let err = executor
            .execute(&request, &profile("python39"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Infrastructure(_)));
        assert_eq!(server.poll_count(), MAX_TRANSIENT_POLL_FAILURES as usize);
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_rejected_submission_is_infrastructure_error() {
        let server = MockJudge0Server::start_rejecting().await;
        let executor = fast(Judge0Executor::new(server.address()));

        let request = ExecutionRequest::new("print(1)", "python39");
        let err = executor
            .execute(&request, &profile("python39"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Infrastructure(_)));
        server.shutdown().await;
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_infrastructure_error() {
        let executor = fast(Judge0Executor::new("http://127.0.0.1:9"));
        let request = ExecutionRequest::new("print(1)", "python39");
        let err = executor
            .execute(&request, &profile("python39"))
            .await
            .unwrap_err();
        assert!(matches!(err, ExecutionError::Infrastructure(_)));
        assert!(!executor.is_available().await);
    }

    #[tokio::test]
    async fn test_api_key_is_sent_as_auth_token() {
        let server = MockJudge0Server::start(vec![finished(3, "Accepted")]).await;
        let executor = fast(Judge0Executor::new(server.address())).with_api_key("secret");
        let request = ExecutionRequest::new("print(1)", "python39");
        executor.execute(&request, &profile("python39")).await.unwrap();
        assert_eq!(server.auth_tokens(), vec!["secret".to_string()]);
        server.shutdown().await;
    }
}
