//! Container engine boundary
//!
//! The sandbox runner describes *what* to run as a `ContainerSpec` and hands
//! it to a `ContainerEngine`. The engine owns the daemon connection, the
//! container's lifetime (create, start, wait, kill on timeout, remove) and
//! the one-time translation of daemon failures into `EngineError`.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;

use crate::errors::EngineError;

/// Host directory mounted into the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Bind {
    pub host_path: String,
    pub container_path: String,
    pub read_only: bool,
}

impl Bind {
    pub fn to_docker_bind(&self) -> String {
        let mode = if self.read_only { "ro" } else { "rw" };
        format!("{}:{}:{}", self.host_path, self.container_path, mode)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceLimits {
    pub memory_bytes: i64,
    /// Memory plus swap; equal to `memory_bytes` so the job cannot swap.
    pub memory_swap_bytes: i64,
    pub cpu_period: i64,
    pub cpu_quota: i64,
    pub pids_limit: i64,
}

impl ResourceLimits {
    pub const CPU_PERIOD_MICROS: i64 = 100_000;

    pub fn new(memory_limit_mb: u64, cpu_percent: u32, pids_limit: i64) -> Self {
        let memory_bytes = i64::try_from(memory_limit_mb)
            .unwrap_or(i64::MAX)
            .saturating_mul(1024 * 1024);
        Self {
            memory_bytes,
            memory_swap_bytes: memory_bytes,
            cpu_period: Self::CPU_PERIOD_MICROS,
            cpu_quota: Self::CPU_PERIOD_MICROS * i64::from(cpu_percent) / 100,
            pids_limit,
        }
    }
}

/// Everything needed to start one throwaway container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    /// Name used for the container; unique per job and step.
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    pub working_dir: String,
    pub env: Vec<String>,
    pub binds: Vec<Bind>,
    /// tmpfs mount point -> mount options
    pub tmpfs: HashMap<String, String>,
    pub user: String,
    pub limits: ResourceLimits,
    pub network_disabled: bool,
    pub read_only_rootfs: bool,
    pub drop_all_capabilities: bool,
    pub no_new_privileges: bool,
    /// Wall-clock budget; the engine kills the container once it elapses.
    pub timeout: Duration,
}

/// What a container left behind when it exited on its own.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ContainerExit {
    pub exit_code: i64,
    pub stdout: String,
    pub stderr: String,
}

#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Runs the container to completion.
    ///
    /// Must remove the container on every path, including when the returned
    /// future is dropped before completion.
    async fn run(&self, spec: ContainerSpec) -> Result<ContainerExit, EngineError>;

    /// Cheap reachability check.
    async fn ping(&self) -> Result<(), EngineError>;
}
