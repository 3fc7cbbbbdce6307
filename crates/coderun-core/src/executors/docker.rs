// src/executors/docker.rs
use async_trait::async_trait;
use bollard::container::LogOutput; // For LogOutput::StdOut, LogOutput::StdErr
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions as BollardCreateContainerOptionsQuery,
    LogsOptions as BollardLogsOptionsQuery,
    RemoveContainerOptions as BollardRemoveContainerOptionsQuery,
    StartContainerOptions as BollardStartContainerOptionsQuery,
    WaitContainerOptions as BollardWaitContainerOptionsQuery,
};
use bollard::Docker;
use futures_util::stream::StreamExt;
use std::default::Default;

use super::engine::{ContainerEngine, ContainerExit, ContainerSpec};
use crate::errors::EngineError;

/// Container engine backed by the local Docker daemon.
///
/// The client is built once and injected; `bollard` connects lazily per
/// request, so a daemon that is down fails the individual call and the next
/// request simply tries again.
#[derive(Clone)]
pub struct DockerEngine {
    docker: Docker,
}

impl DockerEngine {
    /// Connects through `DOCKER_HOST` or the platform default socket, or
    /// through an explicit unix socket path when one is given.
    pub fn connect(socket_path: Option<&str>) -> Result<Self, EngineError> {
        let docker = match socket_path {
            Some(socket) => Docker::connect_with_socket(socket, 120, bollard::API_DEFAULT_VERSION),
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| EngineError::classify(e, ""))?;
        Ok(Self { docker })
    }

    pub fn from_client(docker: Docker) -> Self {
        Self { docker }
    }

    fn create_body(spec: &ContainerSpec) -> ContainerCreateBody {
        let mut security_opt = Vec::new();
        if spec.no_new_privileges {
            security_opt.push("no-new-privileges".to_string());
        }
        let cap_drop = if spec.drop_all_capabilities {
            Some(vec!["ALL".to_string()])
        } else {
            None
        };

        ContainerCreateBody {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: Some(spec.working_dir.clone()),
            user: Some(spec.user.clone()),
            env: Some(spec.env.clone()),
            network_disabled: Some(spec.network_disabled),
            host_config: Some(HostConfig {
                binds: Some(spec.binds.iter().map(|b| b.to_docker_bind()).collect()),
                memory: Some(spec.limits.memory_bytes),
                memory_swap: Some(spec.limits.memory_swap_bytes),
                cpu_period: Some(spec.limits.cpu_period),
                cpu_quota: Some(spec.limits.cpu_quota),
                pids_limit: Some(spec.limits.pids_limit),
                network_mode: if spec.network_disabled {
                    Some("none".to_string())
                } else {
                    None
                },
                readonly_rootfs: Some(spec.read_only_rootfs),
                tmpfs: Some(spec.tmpfs.clone()),
                cap_drop,
                security_opt: Some(security_opt),
                // Removal is done by ContainerGuard once the logs are collected;
                // daemon-side auto-remove races the log read.
                auto_remove: Some(false),
                ..Default::default()
            }),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            ..Default::default()
        }
    }

    async fn collect_logs(&self, container_id: &str, image: &str) -> Result<(String, String), EngineError> {
        let mut output_stream = self.docker.logs(
            container_id,
            Some(BollardLogsOptionsQuery {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut stdout = String::new();
        let mut stderr = String::new();
        while let Some(log_result) = output_stream.next().await {
            match log_result {
                Ok(LogOutput::StdOut { message }) => stdout.push_str(&String::from_utf8_lossy(&message)),
                Ok(LogOutput::StdErr { message }) => stderr.push_str(&String::from_utf8_lossy(&message)),
                Ok(_) => {}
                Err(e) => return Err(EngineError::classify(e, image)),
            }
        }
        Ok((stdout, stderr))
    }
}

#[async_trait]
impl ContainerEngine for DockerEngine {
    async fn run(&self, spec: ContainerSpec) -> Result<ContainerExit, EngineError> {
        // Armed before create: if this future is dropped at any await point the
        // container is still force-removed.
        let guard = ContainerGuard::new(self.docker.clone(), spec.name.clone());

        log::debug!(
            "Creating container {} from {} with command {:?}",
            spec.name,
            spec.image,
            spec.command
        );
        let options = Some(BollardCreateContainerOptionsQuery {
            name: Some(spec.name.clone()),
            ..Default::default()
        });
        let container = self
            .docker
            .create_container(options, Self::create_body(&spec))
            .await
            .map_err(|e| EngineError::classify(e, &spec.image))?;

        self.docker
            .start_container(&container.id, None::<BollardStartContainerOptionsQuery>)
            .await
            .map_err(|e| EngineError::classify(e, &spec.image))?;

        let mut wait_stream = self
            .docker
            .wait_container(&container.id, None::<BollardWaitContainerOptionsQuery>);

        let exit_code = match tokio::time::timeout(spec.timeout, wait_stream.next()).await {
            Err(_) => {
                log::warn!(
                    "Execution timed out for container {} after {}s",
                    spec.name,
                    spec.timeout.as_secs()
                );
                guard.remove().await;
                return Err(EngineError::Timeout(spec.timeout.as_secs()));
            }
            Ok(Some(Ok(response))) => response.status_code,
            // bollard reports a non-zero exit status as an error carrying the code
            Ok(Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. }))) => code,
            Ok(Some(Err(e))) => return Err(EngineError::classify(e, &spec.image)),
            Ok(None) => {
                return Err(EngineError::Api(
                    "Container wait stream ended unexpectedly".to_string(),
                ))
            }
        };

        let (stdout, stderr) = self.collect_logs(&container.id, &spec.image).await?;
        guard.remove().await;

        Ok(ContainerExit {
            exit_code,
            stdout,
            stderr,
        })
    }

    async fn ping(&self) -> Result<(), EngineError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| EngineError::classify(e, ""))
    }
}

/// Force-removes a container when the surrounding job ends, however it ends.
struct ContainerGuard {
    docker: Docker,
    name: Option<String>,
}

impl ContainerGuard {
    fn new(docker: Docker, name: String) -> Self {
        Self {
            docker,
            name: Some(name),
        }
    }

    fn remove_options() -> Option<BollardRemoveContainerOptionsQuery> {
        Some(BollardRemoveContainerOptionsQuery {
            force: true,
            ..Default::default()
        })
    }

    async fn remove(mut self) {
        if let Some(name) = self.name.take() {
            if let Err(e) = self
                .docker
                .remove_container(&name, Self::remove_options())
                .await
            {
                log::warn!("Failed to remove container {}: {}", name, e);
            }
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        let Some(name) = self.name.take() else {
            return;
        };
        let docker = self.docker.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    log::debug!("Removing abandoned container {}", name);
                    // The container may never have been created
                    let _ = docker.remove_container(&name, Self::remove_options()).await;
                });
            }
            Err(_) => log::warn!("No runtime available to remove container {}", name),
        }
    }
}
