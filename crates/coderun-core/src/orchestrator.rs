//! Execution orchestrator
//!
//! The single public entry point. For each request it validates the input,
//! picks a backend, fails over from the sandbox to the remote backend when
//! the sandbox itself breaks, and always answers a validated request with
//! exactly one `ExecutionRecord`.
//!
//! A backend returning an `error` or `timeout` result has done its job; only
//! an `Err` from the backend counts as a failure worth failing over for.

use chrono::Utc;
use serde::Serialize;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::config::{CoderunConfig, ExecutionConfig, PreferredMethod};
use crate::core_types::{
    ExecutionMethod, ExecutionRecord, ExecutionRequest, ExecutionResult, FailureKind,
};
use crate::errors::ExecutionError;
use crate::executors::{CodeExecutor, DockerEngine, Judge0Executor, SandboxRunner};
use crate::guardrails::CodeSafetyChecker;
use crate::languages::{CodeLanguage, LanguageProfile, LanguageRegistry};
use crate::sink::{ExecutionSink, JsonLinesSink};

/// Backend picked for the first attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Route {
    Sandbox,
    Remote,
}

/// Read-only snapshot of how the orchestrator is wired.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutorStats {
    pub preferred_method: PreferredMethod,
    pub fallback_enabled: bool,
    pub safety_check_enforced: bool,
    pub sandbox_backend: &'static str,
    pub remote_backend: Option<&'static str>,
    pub supported_languages_count: usize,
}

pub struct ExecutionOrchestrator {
    registry: Arc<LanguageRegistry>,
    checker: CodeSafetyChecker,
    sandbox: Arc<dyn CodeExecutor>,
    remote: Option<Arc<dyn CodeExecutor>>,
    settings: ExecutionConfig,
    sink: Option<Arc<dyn ExecutionSink>>,
}

/// Assembles an orchestrator from explicitly constructed parts.
pub struct OrchestratorBuilder {
    registry: Option<Arc<LanguageRegistry>>,
    checker: Option<CodeSafetyChecker>,
    sandbox: Arc<dyn CodeExecutor>,
    remote: Option<Arc<dyn CodeExecutor>>,
    settings: ExecutionConfig,
    sink: Option<Arc<dyn ExecutionSink>>,
}

impl OrchestratorBuilder {
    pub fn new(sandbox: Arc<dyn CodeExecutor>) -> Self {
        Self {
            registry: None,
            checker: None,
            sandbox,
            remote: None,
            settings: ExecutionConfig::default(),
            sink: None,
        }
    }

    pub fn registry(mut self, registry: Arc<LanguageRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn safety_checker(mut self, checker: CodeSafetyChecker) -> Self {
        self.checker = Some(checker);
        self
    }

    pub fn remote(mut self, remote: Arc<dyn CodeExecutor>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn settings(mut self, settings: ExecutionConfig) -> Self {
        self.settings = settings;
        self
    }

    pub fn sink(mut self, sink: Arc<dyn ExecutionSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    pub fn build(self) -> ExecutionOrchestrator {
        ExecutionOrchestrator {
            registry: self
                .registry
                .unwrap_or_else(|| Arc::new(LanguageRegistry::with_defaults())),
            checker: self.checker.unwrap_or_default(),
            sandbox: self.sandbox,
            remote: self.remote,
            settings: self.settings,
            sink: self.sink,
        }
    }
}

impl ExecutionOrchestrator {
    pub fn builder(sandbox: Arc<dyn CodeExecutor>) -> OrchestratorBuilder {
        OrchestratorBuilder::new(sandbox)
    }

    /// Wires the Docker sandbox, the Judge0 backend and the history sink
    /// described by `config`.
    pub async fn from_config(config: &CoderunConfig) -> Result<Self, ExecutionError> {
        let registry = LanguageRegistry::from_config(&config.languages).await?;

        let engine = DockerEngine::connect(config.sandbox.docker_socket.as_deref())
            .map_err(|e| ExecutionError::ConfigError(format!("Invalid Docker settings: {}", e)))?;
        let sandbox = SandboxRunner::new(Arc::new(engine), config.sandbox.clone());

        let mut builder = Self::builder(Arc::new(sandbox))
            .registry(Arc::new(registry))
            .settings(config.execution.clone());

        if config.remote.enabled {
            let remote = Judge0Executor::from_config(&config.remote)?;
            log::info!("Remote backend configured at {}", remote.base_url());
            builder = builder.remote(Arc::new(remote));
        }

        if let Some(path) = &config.history.path {
            log::info!("Execution history will be appended to {}", path.display());
            builder = builder.sink(Arc::new(JsonLinesSink::new(path.clone())));
        }

        Ok(builder.build())
    }

    /// Runs one request to completion.
    ///
    /// Validation failures come back as `Err`; anything that passed
    /// validation yields a record, even when every backend failed.
    pub async fn execute(
        &self,
        request: &ExecutionRequest,
    ) -> Result<ExecutionRecord, ExecutionError> {
        let created_at = Utc::now();
        let profile = self.validate(request)?;
        let route = self.select_route(profile);

        log::info!(
            "Executing {} code for user {:?} via {:?}",
            profile.id,
            request.user_id,
            route
        );
        let (method, result) = self.run_with_failover(route, request, profile).await;

        let record = ExecutionRecord {
            id: Uuid::new_v4(),
            language_id: profile.id.clone(),
            user_id: request.user_id,
            block_id: request.block_id.clone(),
            method,
            result,
            created_at,
            completed_at: Utc::now(),
        };
        log::info!(
            "Execution {} finished: {:?} via {} in {}ms",
            record.id,
            record.status(),
            record.method,
            record.result.execution_time_ms
        );

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.save(&record).await {
                log::warn!("Failed to persist execution {}: {}", record.id, e);
            }
        }
        Ok(record)
    }

    /// Like `execute`, but gives up as soon as `token` is cancelled. The
    /// in-flight container and scratch directory are released on the way out.
    pub async fn execute_with_cancellation(
        &self,
        request: &ExecutionRequest,
        token: CancellationToken,
    ) -> Result<ExecutionRecord, ExecutionError> {
        tokio::select! {
            biased;
            _ = token.cancelled() => {
                log::info!("Execution of {} cancelled by caller", request.language_id);
                Err(ExecutionError::Cancelled)
            }
            outcome = self.execute(request) => outcome,
        }
    }

    pub fn list_supported_languages(&self) -> Vec<LanguageProfile> {
        self.registry.list_enabled()
    }

    pub fn is_code_safe(&self, source_code: &str, language: CodeLanguage) -> bool {
        self.checker.is_safe(source_code, language)
    }

    pub fn stats(&self) -> ExecutorStats {
        ExecutorStats {
            preferred_method: self.settings.method,
            fallback_enabled: self.settings.fallback_enabled,
            safety_check_enforced: self.settings.enforce_safety_check,
            sandbox_backend: self.sandbox.name(),
            remote_backend: self.remote.as_ref().map(|r| r.name()),
            supported_languages_count: self.registry.list_enabled().len(),
        }
    }

    /// Whether the sandbox backend can reach its container engine right now.
    pub async fn engine_available(&self) -> bool {
        self.sandbox.is_available().await
    }

    pub async fn remote_available(&self) -> Option<bool> {
        match &self.remote {
            Some(remote) => Some(remote.is_available().await),
            None => None,
        }
    }

    fn validate(&self, request: &ExecutionRequest) -> Result<&LanguageProfile, ExecutionError> {
        if request.source_code.trim().is_empty() {
            return Err(ExecutionError::InvalidRequest(
                "source code is empty".to_string(),
            ));
        }

        let limit = self.checker.max_source_bytes();
        if request.source_code.len() > limit {
            return Err(ExecutionError::InvalidRequest(format!(
                "source code is {} bytes, the limit is {} bytes",
                request.source_code.len(),
                limit
            )));
        }

        let profile = self.registry.resolve(&request.language_id)?;

        if self.settings.enforce_safety_check {
            let verdict = self.checker.inspect(&request.source_code, profile.language);
            if !verdict.is_safe() {
                return Err(ExecutionError::UnsafeCode(
                    verdict.reason().unwrap_or_default(),
                ));
            }
        }

        Ok(profile)
    }

    fn select_route(&self, profile: &LanguageProfile) -> Route {
        let route = match self.settings.method {
            PreferredMethod::Sandbox => Route::Sandbox,
            PreferredMethod::Remote => Route::Remote,
            PreferredMethod::Auto => {
                if self
                    .settings
                    .remote_preferred_languages
                    .contains(&profile.language)
                {
                    Route::Remote
                } else {
                    Route::Sandbox
                }
            }
        };

        if route == Route::Remote && self.remote.is_none() {
            log::warn!(
                "Remote backend requested for {} but none is configured; using the sandbox",
                profile.id
            );
            return Route::Sandbox;
        }
        route
    }

    async fn run_with_failover(
        &self,
        route: Route,
        request: &ExecutionRequest,
        profile: &LanguageProfile,
    ) -> (ExecutionMethod, ExecutionResult) {
        if let (Route::Remote, Some(remote)) = (route, &self.remote) {
            return match remote.execute(request, profile).await {
                Ok(result) => (ExecutionMethod::RemoteFallback, result),
                Err(e) => {
                    log::error!("Remote execution failed for {}: {}", profile.id, e);
                    (
                        ExecutionMethod::RemoteFallback,
                        Self::not_run(format!("Remote execution failed: {}", e)),
                    )
                }
            };
        }

        let sandbox_error = match self.sandbox.execute(request, profile).await {
            Ok(result) => return (ExecutionMethod::Sandbox, result),
            Err(e) => e,
        };

        let remote = match (&self.remote, self.settings.fallback_enabled) {
            (Some(remote), true) => remote,
            _ => {
                log::error!(
                    "Sandbox execution failed for {} and no fallback applies: {}",
                    profile.id,
                    sandbox_error
                );
                return (
                    ExecutionMethod::Sandbox,
                    Self::not_run(format!("Sandbox execution failed: {}", sandbox_error)),
                );
            }
        };

        log::warn!(
            "Sandbox execution failed for {}, falling back to {}: {}",
            profile.id,
            remote.name(),
            sandbox_error
        );
        match remote.execute(request, profile).await {
            Ok(result) => (ExecutionMethod::RemoteFallback, result),
            Err(remote_error) => {
                log::error!(
                    "Remote fallback failed for {}: {}",
                    profile.id,
                    remote_error
                );
                (
                    ExecutionMethod::RemoteFallback,
                    Self::not_run(format!(
                        "Sandbox execution failed: {}; remote fallback failed: {}",
                        sandbox_error, remote_error
                    )),
                )
            }
        }
    }

    /// Terminal result for a request no backend could run. Exit code zero
    /// and zero duration mark "not run".
    fn not_run(message: String) -> ExecutionResult {
        ExecutionResult::failed(FailureKind::InfrastructureFailure, message).with_exit_code(0)
    }
}
