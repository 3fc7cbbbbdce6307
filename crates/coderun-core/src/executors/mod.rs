//! Execution backends
//!
//! Every backend sits behind the same `CodeExecutor` capability: given a
//! request and the resolved language profile, produce an `ExecutionResult`.
//! Returning `Ok` with an `error` or `timeout` status is a normal completion.
//! Returning `Err(ExecutionError::Infrastructure)` means the backend itself
//! could not do its job, which is what the orchestrator reacts to with
//! failover. Keeping both backends behind one trait means the failover policy
//! never needs to know which concrete backend it is talking to.

use async_trait::async_trait;

use crate::core_types::{ExecutionRequest, ExecutionResult};
use crate::errors::ExecutionError;
use crate::languages::LanguageProfile;

#[async_trait]
pub trait CodeExecutor: Send + Sync {
    /// Short backend name used in logs.
    fn name(&self) -> &'static str;

    async fn execute(
        &self,
        request: &ExecutionRequest,
        profile: &LanguageProfile,
    ) -> Result<ExecutionResult, ExecutionError>;

    /// Whether the backend can currently be reached. Informational only;
    /// the orchestrator never skips a backend based on this.
    async fn is_available(&self) -> bool {
        true
    }
}

pub mod docker;
pub mod engine;
pub mod remote;
pub mod sandbox;

pub use docker::DockerEngine;
pub use engine::{Bind, ContainerEngine, ContainerExit, ContainerSpec, ResourceLimits};
pub use remote::Judge0Executor;
pub use sandbox::SandboxRunner;
