use anyhow::Context;
use async_trait::async_trait;
use bollard::Docker;
use bollard::container::LogOutput;
use bollard::models::{ContainerCreateBody, HostConfig};
use bollard::query_parameters::{
    CreateContainerOptions, LogsOptions, RemoveContainerOptions, StartContainerOptions,
    UploadToContainerOptions, WaitContainerOptions,
};
use bytes::Bytes;
use futures_util::stream::StreamExt;
use std::time::Duration;
use uuid::Uuid;

use crate::config::GraderConfig;
use crate::error::SandboxError;
use crate::sandbox::{RawOutput, SandboxRunner};

const WORK_DIR: &str = "/sandbox";

/// Runs each grading archive in a throwaway container: fixed image, no
/// network device, memory and CPU ceilings from deployment config. One
/// container per run, force-removed whatever happens to the run.
pub struct DockerSandbox {
    docker: Docker,
    image: String,
    timeout: Duration,
    memory_bytes: i64,
    nano_cpus: i64,
}

impl DockerSandbox {
    /// Connects to the local daemon and verifies the sandbox image exists.
    /// The image is pre-vetted infrastructure; refusing to start without it
    /// beats failing on the first submission.
    pub async fn new(config: &GraderConfig) -> anyhow::Result<Self> {
        let docker =
            Docker::connect_with_local_defaults().context("connecting to docker daemon")?;
        docker
            .inspect_image(&config.sandbox_image)
            .await
            .with_context(|| format!("sandbox image {} not found locally", config.sandbox_image))?;

        Ok(Self {
            docker,
            image: config.sandbox_image.clone(),
            timeout: config.sandbox_timeout(),
            memory_bytes: config.sandbox_memory_bytes,
            nano_cpus: config.sandbox_nano_cpus(),
        })
    }

    fn container_body(&self) -> ContainerCreateBody {
        ContainerCreateBody {
            image: Some(self.image.clone()),
            cmd: Some(
                ["go", "test", "-v", "-json", "-count=1", "./..."]
                    .into_iter()
                    .map(String::from)
                    .collect(),
            ),
            working_dir: Some(WORK_DIR.to_string()),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            network_disabled: Some(true),
            host_config: Some(HostConfig {
                network_mode: Some("none".to_string()),
                memory: Some(self.memory_bytes),
                nano_cpus: Some(self.nano_cpus),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    /// Everything between container creation and log retrieval. Bound to
    /// the run deadline by the caller; must not remove the container
    /// itself, the guard owns that.
    async fn drive(&self, guard: &mut ContainerGuard, archive: Bytes) -> anyhow::Result<RawOutput> {
        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: Some(format!("grader-{}", Uuid::new_v4())),
                    ..Default::default()
                }),
                self.container_body(),
            )
            .await
            .context("container create")?;
        let id = created.id.clone();
        guard.id = Some(created.id);

        self.docker
            .upload_to_container(
                &id,
                Some(UploadToContainerOptions {
                    path: WORK_DIR.to_string(),
                    ..Default::default()
                }),
                bollard::body_full(archive),
            )
            .await
            .context("archive injection")?;

        self.docker
            .start_container(&id, None::<StartContainerOptions>)
            .await
            .context("container start")?;

        let mut wait = self.docker.wait_container(&id, None::<WaitContainerOptions>);
        match wait.next().await {
            // go test exits non-zero when any test fails; that is a
            // verdict for the parser, not an infrastructure failure.
            Some(Err(bollard::errors::Error::DockerContainerWaitError { .. })) => {}
            Some(Err(err)) => return Err(err).context("container wait"),
            Some(Ok(_)) | None => {}
        }

        let mut logs = self.docker.logs(
            &id,
            Some(LogsOptions {
                stdout: true,
                stderr: true,
                ..Default::default()
            }),
        );

        let mut output = RawOutput::default();
        while let Some(entry) = logs.next().await {
            match entry.context("log retrieval")? {
                LogOutput::StdOut { message } => {
                    output.stdout.push_str(&String::from_utf8_lossy(&message));
                }
                LogOutput::StdErr { message } => {
                    output.stderr.push_str(&String::from_utf8_lossy(&message));
                }
                _ => {}
            }
        }

        Ok(output)
    }
}

#[async_trait]
impl SandboxRunner for DockerSandbox {
    async fn run(&self, archive: Bytes) -> Result<RawOutput, SandboxError> {
        let mut guard = ContainerGuard {
            docker: self.docker.clone(),
            id: None,
        };

        let outcome = tokio::time::timeout(self.timeout, self.drive(&mut guard, archive)).await;
        guard.release().await;

        match outcome {
            Ok(Ok(output)) => Ok(output),
            Ok(Err(err)) => Err(SandboxError::Internal(err)),
            Err(_) => Err(SandboxError::Timeout),
        }
    }
}

/// Scoped ownership of one container id. `release` removes it inline;
/// `Drop` covers a caller that cancels the whole run future.
struct ContainerGuard {
    docker: Docker,
    id: Option<String>,
}

impl ContainerGuard {
    async fn release(&mut self) {
        if let Some(id) = self.id.take() {
            if let Err(err) = force_remove(&self.docker, &id).await {
                tracing::warn!(container = %id, error = %err, "sandbox container removal failed");
            } else {
                tracing::debug!(container = %id, "sandbox container removed");
            }
        }
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if let Some(id) = self.id.take() {
            let docker = self.docker.clone();
            if let Ok(handle) = tokio::runtime::Handle::try_current() {
                handle.spawn(async move {
                    if let Err(err) = force_remove(&docker, &id).await {
                        tracing::warn!(container = %id, error = %err, "sandbox container removal failed");
                    }
                });
            }
        }
    }
}

async fn force_remove(docker: &Docker, id: &str) -> Result<(), bollard::errors::Error> {
    docker
        .remove_container(
            id,
            Some(RemoveContainerOptions {
                force: true,
                ..Default::default()
            }),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sandbox() -> DockerSandbox {
        DockerSandbox {
            // constructing a client handle does not touch the daemon
            docker: Docker::connect_with_local_defaults().unwrap(),
            image: "golang:1.25-alpine".to_string(),
            timeout: Duration::from_secs(10),
            memory_bytes: 256 * 1024 * 1024,
            nano_cpus: 500_000_000,
        }
    }

    #[test]
    fn container_body_enforces_isolation_constraints() {
        let body = sandbox().container_body();

        assert_eq!(body.network_disabled, Some(true));
        assert_eq!(body.working_dir.as_deref(), Some("/sandbox"));

        let host = body.host_config.unwrap();
        assert_eq!(host.network_mode.as_deref(), Some("none"));
        assert_eq!(host.memory, Some(256 * 1024 * 1024));
        assert_eq!(host.nano_cpus, Some(500_000_000));
    }

    #[test]
    fn container_body_runs_single_iteration_json_verifier() {
        let cmd = sandbox().container_body().cmd.unwrap();
        assert_eq!(cmd, ["go", "test", "-v", "-json", "-count=1", "./..."]);
    }
}
