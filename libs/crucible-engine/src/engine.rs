//! Execution Supervisor - one submission, end to end
//!
//! **Lifecycle:**
//! ```text
//! Created → Started → {Completed | TimedOut} → Finalized
//! ```
//!
//! 1. Resolve the language profile (first gate, no side effects before it)
//! 2. Validate the request
//! 3. Acquire a workspace and write the source
//! 4. Ensure the image is present
//! 5. Create the container (limits, no network, read-only code mount,
//!    auto-remove) and attach to its stdio
//! 6. Issue the wait, start it and race its exit against the deadline
//! 7. On deadline: kill. On exit: drain remaining output.
//! 8. Decode output, assemble the result, release the workspace
//!
//! **Guarantees:**
//! - The workspace outlives the container's run: it is released only after
//!   the container exited or was killed, and always released
//! - A container whose exit was not observed is force-removed by a guard,
//!   even if the execution future is dropped
//! - Timeouts and non-zero exits are results, not errors

use crate::docker::{BollardRuntime, ContainerHandle, ContainerRuntime, ContainerSpec, LogStream};
use crate::error::{ExecutionError, RuntimeError, RuntimeOperation};
use crate::image::ImageProvisioner;
use crate::logs::Demultiplexer;
use crate::result::{self, Termination};
use crate::workspace::Workspace;
use crucible_common::{EngineConfig, ExecutionRequest, ExecutionResult, Language};
use futures_util::stream::StreamExt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, instrument, warn, Span};
use uuid::Uuid;

/// How long output may keep arriving after the container exited
const OUTPUT_DRAIN_GRACE: Duration = Duration::from_secs(2);

/// Container cleanup guard - force-removes the container on drop unless
/// disarmed. Covers every path where auto-removal cannot be relied on:
/// never started, start failed, lost track of it, killed on timeout, or the
/// execution future itself was dropped.
struct ContainerGuard {
    runtime: Arc<dyn ContainerRuntime>,
    handle: ContainerHandle,
    armed: bool,
}

impl ContainerGuard {
    fn new(runtime: Arc<dyn ContainerRuntime>, handle: ContainerHandle) -> Self {
        Self {
            runtime,
            handle,
            armed: true,
        }
    }

    /// The container exited on its own; auto-removal takes it from here
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for ContainerGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }

        // Cannot be async in Drop
        let runtime = Arc::clone(&self.runtime);
        let handle = self.handle.clone();
        match tokio::runtime::Handle::try_current() {
            Ok(rt) => {
                rt.spawn(async move {
                    if let Err(e) = runtime.remove(&handle).await {
                        warn!(container_id = %handle, error = %e, "Failed to clean up container");
                    }
                });
            }
            Err(_) => {
                warn!(container_id = %handle, "No async runtime left to clean up container");
            }
        }
    }
}

/// Exit watcher running alongside the execution. Aborted when dropped, so
/// it never outlives the execution that spawned it.
struct WaitTask(JoinHandle<Result<i64, RuntimeError>>);

impl WaitTask {
    fn spawn(runtime: Arc<dyn ContainerRuntime>, handle: ContainerHandle) -> Self {
        Self(tokio::spawn(async move { runtime.wait(&handle).await }))
    }

    async fn exit(&mut self) -> Result<i64, RuntimeError> {
        match (&mut self.0).await {
            Ok(status) => status,
            Err(e) => Err(RuntimeError::rejected(RuntimeOperation::Wait, e.to_string())),
        }
    }
}

impl Drop for WaitTask {
    fn drop(&mut self) {
        self.0.abort();
    }
}

enum Race {
    Exited(Result<i64, RuntimeError>),
    DeadlineElapsed,
}

/// Entry point for the rest of the system. Cheap to share behind an `Arc`;
/// concurrent executions share nothing but the runtime client.
pub struct ExecutionEngine {
    runtime: Arc<dyn ContainerRuntime>,
    images: ImageProvisioner,
    workspace_root: PathBuf,
    max_output_bytes: usize,
}

impl ExecutionEngine {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, config: &EngineConfig) -> Self {
        Self {
            images: ImageProvisioner::new(Arc::clone(&runtime)),
            runtime,
            workspace_root: config.workspace_root.clone(),
            max_output_bytes: config.max_output_bytes,
        }
    }

    /// Engine backed by the Docker daemon described in `config`
    pub fn connect(config: &EngineConfig) -> Result<Self, RuntimeError> {
        let runtime = BollardRuntime::connect(config)?;
        Ok(Self::new(Arc::new(runtime), config))
    }

    pub fn images(&self) -> &ImageProvisioner {
        &self.images
    }

    /// Is the container runtime reachable
    pub async fn ping(&self) -> Result<(), RuntimeError> {
        self.runtime.ping().await
    }

    /// Run one submission to completion.
    ///
    /// Timeouts and non-zero exits come back as `Ok`. Errors are either the
    /// request's fault (`is_client_error`) or infrastructure failures.
    #[instrument(
        skip(self, request),
        fields(
            execution_id = tracing::field::Empty,
            language = %request.language,
        )
    )]
    pub async fn execute(&self, request: &ExecutionRequest) -> Result<ExecutionResult, ExecutionError> {
        let language: Language = request.language.parse().map_err(|e| {
            warn!(error = %e, "Rejected submission");
            ExecutionError::from(e)
        })?;
        request.validate().map_err(|reason| {
            warn!(reason = %reason, "Rejected submission");
            ExecutionError::InvalidRequest(reason)
        })?;

        let execution_id = Uuid::new_v4();
        Span::current().record("execution_id", tracing::field::display(execution_id));

        let profile = language.profile();
        info!(
            image = profile.image,
            timeout_ms = request.timeout_ms,
            cpu_quota = request.cpu_quota,
            memory_limit_bytes = request.memory_limit_bytes,
            source_size = request.source_code.len(),
            stdin_size = request.stdin.len(),
            "Starting execution"
        );

        let workspace = Workspace::acquire(&self.workspace_root, profile.filename, &request.source_code)
            .await
            .map_err(|e| {
                error!(workspace_root = %self.workspace_root.display(), error = %e, "Failed to prepare workspace");
                ExecutionError::Workspace(e)
            })?;

        let outcome = self.run_in_workspace(execution_id, language, request, &workspace).await;

        // The container has exited or been killed by now
        if let Err(e) = workspace.release().await {
            warn!(error = %e, "Failed to remove workspace");
        }

        match &outcome {
            Ok(result) => info!(
                status = ?result.status,
                exit_code = ?result.exit_code,
                execution_ms = result.execution_time_ms,
                output_truncated = result.output_truncated,
                "Execution finished"
            ),
            Err(e) => error!(error = %e, "Execution failed"),
        }

        outcome
    }

    async fn run_in_workspace(
        &self,
        execution_id: Uuid,
        language: Language,
        request: &ExecutionRequest,
        workspace: &Workspace,
    ) -> Result<ExecutionResult, ExecutionError> {
        let profile = language.profile();
        self.images.ensure(profile.image).await?;

        let memory_bytes = i64::try_from(request.memory_limit_bytes)
            .map_err(|_| ExecutionError::InvalidRequest("memoryLimitBytes is too large".to_string()))?;

        let spec = ContainerSpec {
            name: format!("crucible-{}", execution_id),
            image: profile.image.to_string(),
            command: language.command(),
            workspace: workspace.path().to_path_buf(),
            nano_cpus: request.nano_cpus(),
            memory_bytes,
        };

        let handle = self.runtime.create(&spec).await?;
        // CRITICAL: guard goes up immediately after creation
        let mut guard = ContainerGuard::new(Arc::clone(&self.runtime), handle.clone());
        debug!(container_id = %handle, name = %spec.name, "Container created");

        let output = self
            .runtime
            .attach(&handle, request.stdin.as_bytes().to_vec())
            .await?;

        // Wait goes out before start: a fast program can exit and be
        // auto-removed before a wait sent afterwards reaches the daemon.
        let mut wait = WaitTask::spawn(Arc::clone(&self.runtime), handle.clone());
        tokio::task::yield_now().await;

        let timeout = Duration::from_millis(request.timeout_ms);
        let started_at = Instant::now();
        self.runtime.start(&handle).await?;
        debug!(container_id = %handle, "Container started");

        let mut demux = Demultiplexer::new(self.max_output_bytes);
        let termination = self
            .supervise(&handle, &mut wait, output, &mut demux, started_at, timeout)
            .await?;

        if let Termination::Exited { .. } = termination {
            guard.disarm();
        }

        Ok(result::assemble(termination, demux.finish()))
    }

    /// Race the container's exit against the deadline while collecting output
    async fn supervise(
        &self,
        handle: &ContainerHandle,
        wait: &mut WaitTask,
        mut output: LogStream,
        demux: &mut Demultiplexer,
        started_at: Instant,
        timeout: Duration,
    ) -> Result<Termination, ExecutionError> {
        let deadline = tokio::time::sleep_until(started_at + timeout);
        tokio::pin!(deadline);

        let mut streaming = true;

        let race = loop {
            tokio::select! {
                // a tie goes to the natural exit
                biased;

                status = wait.exit() => break Race::Exited(status),
                () = &mut deadline => break Race::DeadlineElapsed,
                chunk = output.next(), if streaming => match chunk {
                    Some(Ok(bytes)) => demux.feed(&bytes),
                    Some(Err(e)) => {
                        warn!(container_id = %handle, error = %e, "Output stream failed; keeping what arrived");
                        streaming = false;
                    }
                    None => streaming = false,
                },
            }
        };

        match race {
            Race::Exited(Ok(exit_code)) => {
                let elapsed = started_at.elapsed();
                debug!(container_id = %handle, exit_code = exit_code, elapsed_ms = elapsed.as_millis() as u64, "Container exited");
                if streaming {
                    drain(handle, &mut output, demux).await;
                }
                Ok(Termination::Exited { exit_code, elapsed })
            }
            Race::Exited(Err(e)) => {
                error!(container_id = %handle, error = %e, "Lost track of container, killing it");
                if let Err(kill_err) = self.runtime.kill(handle).await {
                    warn!(container_id = %handle, error = %kill_err, "Failed to kill container");
                }
                Err(e.into())
            }
            Race::DeadlineElapsed => {
                warn!(
                    container_id = %handle,
                    timeout_ms = timeout.as_millis() as u64,
                    "Execution timed out, killing container"
                );
                if let Err(e) = self.runtime.kill(handle).await {
                    error!(container_id = %handle, error = %e, "Failed to kill timed-out container");
                }
                Ok(Termination::TimedOut { timeout })
            }
        }
    }
}

/// Collect output still in flight after the exit, for a bounded time
async fn drain(handle: &ContainerHandle, output: &mut LogStream, demux: &mut Demultiplexer) {
    let collected = tokio::time::timeout(OUTPUT_DRAIN_GRACE, async {
        while let Some(chunk) = output.next().await {
            match chunk {
                Ok(bytes) => demux.feed(&bytes),
                Err(e) => {
                    debug!(container_id = %handle, error = %e, "Output stream closed with error");
                    break;
                }
            }
        }
    })
    .await;

    if collected.is_err() {
        warn!(container_id = %handle, "Output stream still open after exit; keeping what arrived");
    }
}
