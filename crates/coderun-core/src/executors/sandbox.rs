//! Sandbox runner
//!
//! Runs one submission inside throwaway containers:
//!
//! 1. a private scratch directory is allocated under the execution root and
//!    the source (plus optional stdin) is written into it,
//! 2. an optional compile step runs with the source mounted read-only and a
//!    writable `build/` directory for the artifacts,
//! 3. the run step executes with every mount read-only, no network, no
//!    capabilities, capped memory/CPU/pids, as an unprivileged user,
//! 4. the raw outcome is classified into an `ExecutionResult`.
//!
//! The scratch directory is a `TempDir`, so it is removed on every exit path,
//! including when the caller drops the future mid-flight.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tempfile::TempDir;
use uuid::Uuid;

use super::engine::{Bind, ContainerEngine, ContainerExit, ContainerSpec, ResourceLimits};
use super::CodeExecutor;
use crate::config::SandboxConfig;
use crate::core_types::{ExecutionRequest, ExecutionResult, FailureKind};
use crate::errors::{EngineError, ExecutionError};
use crate::languages::{LanguageProfile, BUILD_MOUNT};

const CODE_MOUNT: &str = "/code";
const STDIN_FILE: &str = "input.txt";
const BUILD_DIR: &str = "build";

/// Files of one job on the host.
struct JobWorkspace {
    dir: TempDir,
    has_stdin: bool,
    has_build_dir: bool,
}

impl JobWorkspace {
    fn path(&self) -> &Path {
        self.dir.path()
    }

    fn binds(&self, build_writable: bool) -> Vec<Bind> {
        let mut binds = vec![Bind {
            host_path: self.path().to_string_lossy().into_owned(),
            container_path: CODE_MOUNT.to_string(),
            read_only: true,
        }];
        if self.has_build_dir {
            binds.push(Bind {
                host_path: self.path().join(BUILD_DIR).to_string_lossy().into_owned(),
                container_path: BUILD_MOUNT.to_string(),
                read_only: !build_writable,
            });
        }
        binds
    }

    fn close(self) {
        let path = self.path().to_path_buf();
        if let Err(e) = self.dir.close() {
            log::warn!("Failed to remove scratch directory {}: {}", path.display(), e);
        }
    }
}

enum Step {
    Compile,
    Run,
}

impl Step {
    fn label(&self) -> &'static str {
        match self {
            Step::Compile => "compile",
            Step::Run => "run",
        }
    }
}

pub struct SandboxRunner {
    engine: Arc<dyn ContainerEngine>,
    settings: SandboxConfig,
}

impl SandboxRunner {
    pub fn new(engine: Arc<dyn ContainerEngine>, settings: SandboxConfig) -> Self {
        Self { engine, settings }
    }

    pub fn execution_root(&self) -> &Path {
        &self.settings.execution_root
    }

    fn absolute_root(&self) -> Result<PathBuf, ExecutionError> {
        let root = &self.settings.execution_root;
        if root.is_absolute() {
            Ok(root.clone())
        } else {
            Ok(std::env::current_dir()?.join(root))
        }
    }

    async fn prepare_workspace(
        &self,
        request: &ExecutionRequest,
        profile: &LanguageProfile,
    ) -> Result<JobWorkspace, ExecutionError> {
        let root = self.absolute_root()?;
        tokio::fs::create_dir_all(&root).await?;

        let dir = tempfile::Builder::new().prefix("exec-").tempdir_in(&root)?;
        // The container user is unprivileged and must still read the mount.
        set_mode(dir.path(), 0o777).await?;

        let source_path = dir.path().join(profile.source_file_name());
        tokio::fs::write(&source_path, request.source_code.as_bytes()).await?;
        set_mode(&source_path, 0o666).await?;

        let has_stdin = match request.stdin_payload() {
            Some(stdin) => {
                let stdin_path = dir.path().join(STDIN_FILE);
                tokio::fs::write(&stdin_path, stdin.as_bytes()).await?;
                set_mode(&stdin_path, 0o666).await?;
                true
            }
            None => false,
        };

        let has_build_dir = profile.has_compile_step();
        if has_build_dir {
            let build_path = dir.path().join(BUILD_DIR);
            tokio::fs::create_dir(&build_path).await?;
            set_mode(&build_path, 0o777).await?;
        }

        Ok(JobWorkspace {
            dir,
            has_stdin,
            has_build_dir,
        })
    }

    fn build_spec(
        &self,
        job_id: &Uuid,
        step: Step,
        workspace: &JobWorkspace,
        profile: &LanguageProfile,
        command: Vec<String>,
    ) -> ContainerSpec {
        let mut env = vec!["HOME=/tmp".to_string()];
        env.extend(profile.env.iter().cloned());

        let mut tmpfs = HashMap::new();
        tmpfs.insert(
            "/tmp".to_string(),
            format!("rw,exec,nosuid,size={}m", self.settings.tmpfs_size_mb),
        );

        let build_writable = matches!(step, Step::Compile);
        ContainerSpec {
            name: format!("coderun-{}-{}", job_id.simple(), step.label()),
            image: profile.docker_image.clone(),
            command,
            working_dir: CODE_MOUNT.to_string(),
            env,
            binds: workspace.binds(build_writable),
            tmpfs,
            user: self.settings.user.clone(),
            limits: ResourceLimits::new(
                profile.memory_limit_mb,
                self.settings.cpu_percent,
                self.settings.pids_limit,
            ),
            network_disabled: true,
            read_only_rootfs: true,
            drop_all_capabilities: true,
            no_new_privileges: true,
            timeout: Duration::from_secs(profile.timeout_seconds),
        }
    }

    /// Turns an engine failure into a result, or into a thrown error when the
    /// engine could not be reached at all.
    fn classify_engine_error(
        err: EngineError,
        profile: &LanguageProfile,
    ) -> Result<ExecutionResult, ExecutionError> {
        match err {
            EngineError::Unreachable(message) => Err(ExecutionError::Infrastructure(message)),
            EngineError::ImageUnavailable(image) => Ok(ExecutionResult::failed(
                FailureKind::ImageUnavailable,
                format!("Docker image {} not found", image),
            )
            .with_diagnostics("Docker image not available")),
            EngineError::Timeout(_) => Ok(ExecutionResult::failed(
                FailureKind::Timeout,
                format!(
                    "Execution exceeded the time limit of {} seconds",
                    profile.timeout_seconds
                ),
            )),
            EngineError::Api(message) | EngineError::Io(message) => Ok(ExecutionResult::failed(
                FailureKind::InfrastructureFailure,
                format!("Container execution failed: {}", message),
            )
            .with_diagnostics(message)),
        }
    }

    fn classify_exit(exit: ContainerExit, compile_step: bool) -> ExecutionResult {
        let stderr = Some(exit.stderr).filter(|s| !s.is_empty());
        if exit.exit_code == 0 {
            return ExecutionResult::success(exit.stdout, stderr, 0);
        }
        let (kind, message) = if compile_step {
            (
                FailureKind::CompilationFailure,
                format!("Compilation failed (exit code {})", exit.exit_code),
            )
        } else {
            (
                FailureKind::RuntimeFailure,
                format!("Runtime error (exit code {})", exit.exit_code),
            )
        };
        ExecutionResult::failed(kind, message)
            .with_output(Some(exit.stdout), stderr)
            .with_exit_code(exit.exit_code)
    }

    async fn run_steps(
        &self,
        job_id: &Uuid,
        request: &ExecutionRequest,
        profile: &LanguageProfile,
        workspace: &JobWorkspace,
    ) -> Result<ExecutionResult, ExecutionError> {
        if let Some(compile) = profile.compile_command_line() {
            let spec = self.build_spec(job_id, Step::Compile, workspace, profile, command_argv(&compile, false));
            let compiled = match self.engine.run(spec).await {
                Ok(exit) => Self::classify_exit(exit, true),
                Err(err) => Self::classify_engine_error(err, profile)?,
            };
            if !compiled.is_success() {
                log::info!(
                    "Compile step failed for language {}; run step skipped",
                    profile.id
                );
                return Ok(compiled);
            }
        }

        let run = profile.run_command_line();
        let spec = self.build_spec(
            job_id,
            Step::Run,
            workspace,
            profile,
            command_argv(&run, workspace.has_stdin),
        );
        log::debug!("Sandbox spec for {}: {:?}", request.language_id, spec);
        match self.engine.run(spec).await {
            Ok(exit) => Ok(Self::classify_exit(exit, false)),
            Err(err) => Self::classify_engine_error(err, profile),
        }
    }
}

/// Builds the container command. The rendered line is always handed to
/// `sh -c` so catalog templates may use quoting and shell operators whether or
/// not the request carries input.
fn command_argv(command_line: &str, redirect_stdin: bool) -> Vec<String> {
    let script = if redirect_stdin {
        format!("{} < {}", command_line, STDIN_FILE)
    } else {
        command_line.to_string()
    };
    vec!["sh".to_string(), "-c".to_string(), script]
}

#[cfg(unix)]
async fn set_mode(path: &Path, mode: u32) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;
    tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(mode)).await
}

#[cfg(not(unix))]
async fn set_mode(_path: &Path, _mode: u32) -> std::io::Result<()> {
    Ok(())
}

#[async_trait]
impl CodeExecutor for SandboxRunner {
    fn name(&self) -> &'static str {
        "sandbox"
    }

    async fn execute(
        &self,
        request: &ExecutionRequest,
        profile: &LanguageProfile,
    ) -> Result<ExecutionResult, ExecutionError> {
        let job_id = Uuid::new_v4();
        let workspace = self
            .prepare_workspace(request, profile)
            .await
            .map_err(|e| {
                ExecutionError::Infrastructure(format!("Failed to prepare scratch directory: {}", e))
            })?;
        log::debug!(
            "Job {} using scratch directory {}",
            job_id,
            workspace.path().display()
        );

        let started = Instant::now();
        let outcome = self.run_steps(&job_id, request, profile, &workspace).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;
        workspace.close();

        let result = outcome?.with_duration(elapsed_ms);
        log::info!(
            "Sandbox job {} ({}) finished with {:?} in {}ms",
            job_id,
            profile.id,
            result.status,
            elapsed_ms
        );
        Ok(result)
    }

    async fn is_available(&self) -> bool {
        self.engine.ping().await.is_ok()
    }
}
