// Container runtime client
//
// `ContainerRuntime` is the seam between the supervisor and the container
// engine. `BollardRuntime` talks to a local Docker daemon; tests swap in an
// in-memory fake.

use crate::error::{RuntimeError, RuntimeOperation};
use crate::logs::{encode_frame, StreamKind};
use async_trait::async_trait;
use bollard::container::{
    AttachContainerOptions, AttachContainerResults, Config, CreateContainerOptions,
    KillContainerOptions, LogOutput, RemoveContainerOptions, StartContainerOptions,
    WaitContainerOptions,
};
use bollard::image::{CreateImageOptions, ListImagesOptions};
use bollard::models::HostConfig;
use bollard::{Docker, API_DEFAULT_VERSION};
use crucible_common::EngineConfig;
use futures_util::stream::{BoxStream, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info};

/// Where the workspace is mounted inside every container
pub const CODE_MOUNT_PATH: &str = "/app/code";

/// Ceiling on processes inside one sandbox (fork bombs)
const PIDS_LIMIT: i64 = 256;

/// Raw multiplexed output, in the frame format decoded by `logs::Demultiplexer`
pub type LogStream = BoxStream<'static, Result<Vec<u8>, RuntimeError>>;

/// Opaque container id
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContainerHandle(String);

impl ContainerHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn id(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContainerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Everything needed to create one sandbox container
#[derive(Debug, Clone, PartialEq)]
pub struct ContainerSpec {
    pub name: String,
    pub image: String,
    pub command: Vec<String>,
    /// Host directory bind-mounted read-only at `CODE_MOUNT_PATH`
    pub workspace: PathBuf,
    pub nano_cpus: i64,
    pub memory_bytes: i64,
}

impl ContainerSpec {
    pub fn bind(&self) -> String {
        format!("{}:{}:ro", self.workspace.display(), CODE_MOUNT_PATH)
    }
}

/// Lifecycle operations the supervisor needs from a container engine.
///
/// Implementations must be safe to share between concurrent executions.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn ping(&self) -> Result<(), RuntimeError>;

    async fn image_present(&self, image: &str) -> Result<bool, RuntimeError>;

    /// Pull and wait for completion
    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError>;

    /// Create with limits, no network, read-only code mount and auto-removal
    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError>;

    /// Open the container's stdio. Must be called before `start`: `stdin` is
    /// delivered then closed, and the returned stream carries all output
    /// from the first byte until the container exits.
    async fn attach(&self, handle: &ContainerHandle, stdin: Vec<u8>) -> Result<LogStream, RuntimeError>;

    async fn start(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;

    /// Suspend until the main process next exits; returns its exit code.
    /// May be called before `start`.
    async fn wait(&self, handle: &ContainerHandle) -> Result<i64, RuntimeError>;

    /// SIGKILL. A container that already stopped is not an error.
    async fn kill(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;

    /// Force removal. A container that is already gone is not an error.
    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError>;
}

/// Docker runtime backed by bollard. Cheap to share: bollard pools connections.
#[derive(Debug, Clone)]
pub struct BollardRuntime {
    docker: Docker,
}

impl BollardRuntime {
    pub fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Connect using the configured endpoint, or the local defaults
    /// (`DOCKER_HOST`, then the platform socket) when none is set.
    pub fn connect(config: &EngineConfig) -> Result<Self, RuntimeError> {
        let timeout = config.docker_timeout_secs;

        let docker = match config.docker_endpoint.as_deref() {
            None => Docker::connect_with_local_defaults()
                .map(|docker| docker.with_timeout(Duration::from_secs(timeout))),
            #[cfg(unix)]
            Some(endpoint) if endpoint.starts_with("unix://") => {
                Docker::connect_with_unix(endpoint, timeout, API_DEFAULT_VERSION)
            }
            Some(endpoint) if endpoint.starts_with("tcp://") || endpoint.starts_with("http://") => {
                Docker::connect_with_http(endpoint, timeout, API_DEFAULT_VERSION)
            }
            Some(endpoint) => {
                return Err(RuntimeError::rejected(
                    RuntimeOperation::Connect,
                    format!("unsupported endpoint '{}'", endpoint),
                ))
            }
        }
        .map_err(|e| RuntimeError::docker(RuntimeOperation::Connect, e))?;

        info!(
            endpoint = config.docker_endpoint.as_deref().unwrap_or("local defaults"),
            timeout_secs = timeout,
            "Docker client configured"
        );

        Ok(Self::new(docker))
    }
}

fn is_status(err: &bollard::errors::Error, codes: &[u16]) -> bool {
    matches!(
        err,
        bollard::errors::Error::DockerResponseServerError { status_code, .. } if codes.contains(status_code)
    )
}

/// Bollard hands back output already split per channel; put it back into
/// the wire framing so every runtime feeds the same decoder.
fn reframe(chunk: LogOutput) -> Vec<u8> {
    let mut raw = Vec::new();
    match chunk {
        LogOutput::StdOut { message } | LogOutput::Console { message } => {
            encode_frame(StreamKind::Stdout, &message, &mut raw)
        }
        LogOutput::StdErr { message } => encode_frame(StreamKind::Stderr, &message, &mut raw),
        LogOutput::StdIn { .. } => {}
    }
    raw
}

#[async_trait]
impl ContainerRuntime for BollardRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.docker
            .ping()
            .await
            .map(|_| ())
            .map_err(|e| RuntimeError::docker(RuntimeOperation::Connect, e))
    }

    async fn image_present(&self, image: &str) -> Result<bool, RuntimeError> {
        let mut filters = HashMap::new();
        filters.insert("reference".to_string(), vec![image.to_string()]);

        let images = self
            .docker
            .list_images(Some(ListImagesOptions::<String> {
                filters,
                ..Default::default()
            }))
            .await
            .map_err(|e| RuntimeError::docker(RuntimeOperation::ListImages, e))?;

        Ok(!images.is_empty())
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        let options = Some(CreateImageOptions {
            from_image: image,
            ..Default::default()
        });

        let mut stream = self.docker.create_image(options, None, None);
        while let Some(progress) = stream.next().await {
            let progress = progress.map_err(|e| RuntimeError::docker(RuntimeOperation::PullImage, e))?;
            if let Some(status) = progress.status {
                debug!(image = image, status = %status, progress = ?progress.progress, "Pulling image");
            }
        }

        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError> {
        let config = Config {
            image: Some(spec.image.clone()),
            cmd: Some(spec.command.clone()),
            working_dir: Some(CODE_MOUNT_PATH.to_string()),
            attach_stdin: Some(true),
            attach_stdout: Some(true),
            attach_stderr: Some(true),
            open_stdin: Some(true),
            stdin_once: Some(true),
            tty: Some(false),
            network_disabled: Some(true), // SECURITY: No network access
            host_config: Some(HostConfig {
                binds: Some(vec![spec.bind()]),
                nano_cpus: Some(spec.nano_cpus),
                memory: Some(spec.memory_bytes),
                memory_swap: Some(spec.memory_bytes),
                pids_limit: Some(PIDS_LIMIT),
                network_mode: Some("none".to_string()),
                auto_remove: Some(true),
                ..Default::default()
            }),
            ..Default::default()
        };

        let options = CreateContainerOptions {
            name: spec.name.as_str(),
            platform: None,
        };

        let created = self
            .docker
            .create_container(Some(options), config)
            .await
            .map_err(|e| RuntimeError::docker(RuntimeOperation::Create, e))?;

        for warning in &created.warnings {
            debug!(container_id = %created.id, warning = %warning, "Docker create warning");
        }

        Ok(ContainerHandle::new(created.id))
    }

    async fn attach(&self, handle: &ContainerHandle, stdin: Vec<u8>) -> Result<LogStream, RuntimeError> {
        let options = AttachContainerOptions::<String> {
            stdin: Some(true),
            stdout: Some(true),
            stderr: Some(true),
            stream: Some(true),
            logs: Some(true),
            detach_keys: None,
        };

        let AttachContainerResults { output, mut input } = self
            .docker
            .attach_container(handle.id(), Some(options))
            .await
            .map_err(|e| RuntimeError::docker(RuntimeOperation::Attach, e))?;

        // Writes block until the container reads, so feed stdin off the
        // request path. Closing it gives the program EOF.
        let container_id = handle.id().to_string();
        tokio::spawn(async move {
            if !stdin.is_empty() {
                if let Err(e) = input.write_all(&stdin).await {
                    debug!(container_id = %container_id, error = %e, "stdin write interrupted");
                    return;
                }
            }
            if let Err(e) = input.shutdown().await {
                debug!(container_id = %container_id, error = %e, "stdin close failed");
            }
        });

        Ok(output
            .map(|chunk| {
                chunk
                    .map(reframe)
                    .map_err(|e| RuntimeError::docker(RuntimeOperation::Attach, e))
            })
            .boxed())
    }

    async fn start(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.docker
            .start_container(handle.id(), None::<StartContainerOptions<String>>)
            .await
            .map_err(|e| RuntimeError::docker(RuntimeOperation::Start, e))
    }

    async fn wait(&self, handle: &ContainerHandle) -> Result<i64, RuntimeError> {
        // "not-running" would return at once for a container not yet started
        let options = WaitContainerOptions {
            condition: "next-exit",
        };

        let mut stream = self.docker.wait_container(handle.id(), Some(options));
        match stream.next().await {
            Some(Ok(response)) => Ok(response.status_code),
            // bollard reports a non-zero exit as an error; it is still an exit
            Some(Err(bollard::errors::Error::DockerContainerWaitError { code, .. })) => Ok(code),
            Some(Err(e)) => Err(RuntimeError::docker(RuntimeOperation::Wait, e)),
            None => Err(RuntimeError::rejected(
                RuntimeOperation::Wait,
                "wait stream ended without an exit status",
            )),
        }
    }

    async fn kill(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        match self
            .docker
            .kill_container(handle.id(), None::<KillContainerOptions<String>>)
            .await
        {
            Ok(()) => Ok(()),
            // 404: already removed, 409: not running
            Err(e) if is_status(&e, &[404, 409]) => {
                debug!(container_id = %handle, "Container already stopped before kill");
                Ok(())
            }
            Err(e) => Err(RuntimeError::docker(RuntimeOperation::Kill, e)),
        }
    }

    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        let options = RemoveContainerOptions {
            force: true,
            ..Default::default()
        };

        match self.docker.remove_container(handle.id(), Some(options)).await {
            Ok(()) => Ok(()),
            // 404: auto-removal got there first, 409: removal in progress
            Err(e) if is_status(&e, &[404, 409]) => Ok(()),
            Err(e) => Err(RuntimeError::docker(RuntimeOperation::Remove, e)),
        }
    }
}
