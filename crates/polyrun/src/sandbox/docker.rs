//! Docker-backed sandbox runtime using `bollard`

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::Docker;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    ListContainersOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
};
use bollard::errors::Error as DockerError;
use bollard::image::CreateImageOptions;
use bollard::models::{ContainerSummary, HostConfig, Mount, MountTypeEnum};
use futures::StreamExt;
use tracing::{debug, info, instrument};

use crate::config::DockerConfig;
use crate::sandbox::{
    JobHandle, JobSpec, LogAttachment, MANAGED_BY_LABEL, MANAGED_BY_VALUE, SandboxError,
    SandboxRuntime, WORKDIR,
};
use crate::types::SandboxUnit;

/// Seconds bollard waits for the daemon to answer a request
const DOCKER_TIMEOUT_SECS: u64 = 120;

/// Sandbox runtime talking to a Docker daemon
///
/// The underlying client is cheap to clone and safe to share between tasks.
#[derive(Debug, Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connect using the socket from the config, or the local defaults
    pub fn connect(config: &DockerConfig) -> Result<Self, SandboxError> {
        let docker = match config.socket {
            Some(ref socket) => {
                Docker::connect_with_socket(socket, DOCKER_TIMEOUT_SECS, bollard::API_DEFAULT_VERSION)
            }
            None => Docker::connect_with_local_defaults(),
        }
        .map_err(|e| SandboxError::Connect(e.to_string()))?;

        Ok(Self { docker })
    }

    /// Check that the daemon answers
    pub async fn ping(&self) -> Result<(), SandboxError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| SandboxError::Connect(e.to_string()))
    }
}

/// Whether an error means the container is already gone or going
fn is_already_removed(error: &DockerError) -> bool {
    matches!(
        error,
        DockerError::DockerResponseServerError {
            status_code: 404 | 409,
            ..
        }
    )
}

fn container_config(spec: &JobSpec) -> Config<String> {
    let mount = Mount {
        typ: Some(MountTypeEnum::BIND),
        source: Some(spec.workspace.to_string_lossy().into_owned()),
        target: Some(WORKDIR.to_owned()),
        read_only: Some(false),
        ..Default::default()
    };

    Config {
        image: Some(spec.image.clone()),
        cmd: Some(spec.command.clone()),
        working_dir: Some(WORKDIR.to_owned()),
        attach_stdin: Some(spec.open_stdin),
        attach_stdout: Some(true),
        attach_stderr: Some(true),
        open_stdin: Some(spec.open_stdin),
        stdin_once: Some(spec.open_stdin),
        tty: Some(false),
        labels: Some(HashMap::from([(
            MANAGED_BY_LABEL.to_owned(),
            MANAGED_BY_VALUE.to_owned(),
        )])),
        host_config: Some(HostConfig {
            mounts: Some(vec![mount]),
            auto_remove: Some(true),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn sandbox_unit(summary: ContainerSummary) -> SandboxUnit {
    SandboxUnit {
        id: summary.id.unwrap_or_default(),
        names: summary.names.unwrap_or_default(),
        image: summary.image.unwrap_or_default(),
        command: summary.command.unwrap_or_default(),
        created: summary.created.unwrap_or_default(),
        state: summary.state.map(|state| state.to_string()).unwrap_or_default(),
        status: summary.status.unwrap_or_default(),
        labels: summary.labels.unwrap_or_default(),
    }
}

#[async_trait]
impl SandboxRuntime for DockerRuntime {
    #[instrument(skip(self))]
    async fn pull_image(&self, image: &str) -> Result<(), SandboxError> {
        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut progress = self.docker.create_image(options, None, None);
        while let Some(update) = progress.next().await {
            let update = update.map_err(|e| SandboxError::ImagePull {
                image: image.to_owned(),
                message: e.to_string(),
            })?;
            if let Some(status) = update.status {
                debug!(image, status, "pull progress");
            }
        }

        info!(image, "image ready");
        Ok(())
    }

    #[instrument(skip(self, spec), fields(image = %spec.image))]
    async fn create(&self, spec: &JobSpec) -> Result<JobHandle, SandboxError> {
        let response = self
            .docker
            .create_container(None::<CreateContainerOptions<String>>, container_config(spec))
            .await
            .map_err(|e| SandboxError::Create(e.to_string()))?;

        for warning in &response.warnings {
            debug!(id = %response.id, warning, "container created with warning");
        }

        Ok(JobHandle::new(response.id, spec.open_stdin))
    }

    #[instrument(skip(self), fields(id = %handle))]
    async fn attach(&self, handle: &JobHandle) -> Result<LogAttachment, SandboxError> {
        let options = AttachContainerOptions::<String> {
            stdin: Some(handle.has_stdin()),
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            logs: Some(true),
            detach_keys: None,
        };

        let AttachContainerResults { output, input } = self
            .docker
            .attach_container(handle.id(), Some(options))
            .await
            .map_err(|e| SandboxError::Logs {
                id: handle.id().to_owned(),
                message: e.to_string(),
            })?;

        let id = handle.id().to_owned();
        let output = output.filter_map(move |frame| {
            let item = match frame {
                Ok(LogOutput::StdOut { message })
                | Ok(LogOutput::StdErr { message })
                | Ok(LogOutput::Console { message }) => Some(Ok(message)),
                Ok(LogOutput::StdIn { .. }) => None,
                Err(e) => Some(Err(SandboxError::Logs {
                    id: id.clone(),
                    message: e.to_string(),
                })),
            };
            futures::future::ready(item)
        });

        Ok(LogAttachment {
            output: Box::pin(output),
            stdin: handle.has_stdin().then_some(input),
        })
    }

    #[instrument(skip(self), fields(id = %handle))]
    async fn start(&self, handle: &JobHandle) -> Result<(), SandboxError> {
        self.docker
            .start_container(handle.id(), None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| SandboxError::Start {
                id: handle.id().to_owned(),
                message: e.to_string(),
            })
    }

    #[instrument(skip(self), fields(id = %handle))]
    async fn remove(&self, handle: &JobHandle) -> Result<(), SandboxError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        match self.docker.remove_container(handle.id(), Some(options)).await {
            Ok(()) => Ok(()),
            Err(e) if is_already_removed(&e) => {
                debug!("container already removed");
                Ok(())
            }
            Err(e) => Err(SandboxError::Remove {
                id: handle.id().to_owned(),
                message: e.to_string(),
            }),
        }
    }

    async fn list(&self) -> Result<Vec<SandboxUnit>, SandboxError> {
        let options = ListContainersOptions::<String> {
            all: true,
            ..Default::default()
        };

        let containers = self
            .docker
            .list_containers(Some(options))
            .await
            .map_err(|e| SandboxError::List(e.to_string()))?;

        Ok(containers.into_iter().map(sandbox_unit).collect())
    }
}
