// In-memory container runtime for deterministic tests

use crate::docker::{ContainerHandle, ContainerRuntime, ContainerSpec, LogStream};
use crate::error::{RuntimeError, RuntimeOperation};
use crate::logs::{encode_frame, StreamKind};
use async_trait::async_trait;
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::watch;

pub const FAKE_CONTAINER_ID: &str = "fake-container";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    Ping,
    ImagePresent(String),
    PullImage(String),
    Create(String),
    Attach,
    Start,
    Wait,
    Kill,
    Remove,
}

/// What the workspace looked like when the container was started
#[derive(Debug, Clone)]
pub struct StartSnapshot {
    pub workspace: PathBuf,
    pub workspace_exists: bool,
    pub files: Vec<(String, String)>,
}

#[derive(Default)]
struct Recorded {
    calls: Vec<Call>,
    specs: Vec<ContainerSpec>,
    workspaces: HashMap<ContainerHandle, PathBuf>,
    stdin: Vec<Vec<u8>>,
    at_start: Vec<StartSnapshot>,
    workspace_exists_at_kill: Vec<bool>,
}

pub struct FakeRuntime {
    image_present: bool,
    list_fails: bool,
    pull_fails: bool,
    create_fails: bool,
    start_fails: bool,
    wait_fails: bool,
    removed_on_exit: bool,
    started: watch::Sender<bool>,
    /// `None` means the program never exits on its own
    exit_code: Option<i64>,
    run_time: Duration,
    output: Vec<u8>,
    recorded: Mutex<Recorded>,
}

impl FakeRuntime {
    /// Image cached, program exits 0 immediately with no output
    pub fn new() -> Self {
        Self {
            image_present: true,
            list_fails: false,
            pull_fails: false,
            create_fails: false,
            start_fails: false,
            wait_fails: false,
            removed_on_exit: false,
            started: watch::channel(false).0,
            exit_code: Some(0),
            run_time: Duration::ZERO,
            output: Vec::new(),
            recorded: Mutex::new(Recorded::default()),
        }
    }

    pub fn image_missing(mut self) -> Self {
        self.image_present = false;
        self
    }

    pub fn list_fails(mut self) -> Self {
        self.list_fails = true;
        self
    }

    pub fn pull_fails(mut self) -> Self {
        self.pull_fails = true;
        self
    }

    pub fn create_fails(mut self) -> Self {
        self.create_fails = true;
        self
    }

    pub fn start_fails(mut self) -> Self {
        self.start_fails = true;
        self
    }

    pub fn wait_fails(mut self) -> Self {
        self.wait_fails = true;
        self
    }

    /// The program finishes and is auto-removed the moment it starts, so
    /// only a wait issued before `start` sees its exit
    pub fn exits_on_start(mut self) -> Self {
        self.removed_on_exit = true;
        self
    }

    pub fn exits_with(mut self, code: i64) -> Self {
        self.exit_code = Some(code);
        self
    }

    pub fn runs_for(mut self, run_time: Duration) -> Self {
        self.run_time = run_time;
        self
    }

    pub fn never_exits(mut self) -> Self {
        self.exit_code = None;
        self
    }

    pub fn stdout(mut self, text: &str) -> Self {
        encode_frame(StreamKind::Stdout, text.as_bytes(), &mut self.output);
        self
    }

    pub fn stderr(mut self, text: &str) -> Self {
        encode_frame(StreamKind::Stderr, text.as_bytes(), &mut self.output);
        self
    }

    pub fn raw_output(mut self, raw: &[u8]) -> Self {
        self.output.extend_from_slice(raw);
        self
    }

    pub fn calls(&self) -> Vec<Call> {
        self.recorded.lock().unwrap().calls.clone()
    }

    pub fn specs(&self) -> Vec<ContainerSpec> {
        self.recorded.lock().unwrap().specs.clone()
    }

    pub fn stdin(&self) -> Vec<Vec<u8>> {
        self.recorded.lock().unwrap().stdin.clone()
    }

    pub fn at_start(&self) -> Vec<StartSnapshot> {
        self.recorded.lock().unwrap().at_start.clone()
    }

    pub fn workspace_exists_at_kill(&self) -> Vec<bool> {
        self.recorded.lock().unwrap().workspace_exists_at_kill.clone()
    }

    fn record(&self, call: Call) {
        self.recorded.lock().unwrap().calls.push(call);
    }

    fn workspace(&self, handle: &ContainerHandle) -> Option<PathBuf> {
        self.recorded.lock().unwrap().workspaces.get(handle).cloned()
    }

    fn fail(operation: RuntimeOperation) -> RuntimeError {
        RuntimeError::rejected(operation, "scripted failure")
    }
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn ping(&self) -> Result<(), RuntimeError> {
        self.record(Call::Ping);
        Ok(())
    }

    async fn image_present(&self, image: &str) -> Result<bool, RuntimeError> {
        self.record(Call::ImagePresent(image.to_string()));
        if self.list_fails {
            return Err(Self::fail(RuntimeOperation::ListImages));
        }
        Ok(self.image_present)
    }

    async fn pull_image(&self, image: &str) -> Result<(), RuntimeError> {
        self.record(Call::PullImage(image.to_string()));
        if self.pull_fails {
            return Err(Self::fail(RuntimeOperation::PullImage));
        }
        Ok(())
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError> {
        self.record(Call::Create(spec.image.clone()));
        if self.create_fails {
            return Err(Self::fail(RuntimeOperation::Create));
        }
        let mut recorded = self.recorded.lock().unwrap();
        let handle = ContainerHandle::new(format!("{}-{}", FAKE_CONTAINER_ID, recorded.specs.len()));
        recorded.specs.push(spec.clone());
        recorded.workspaces.insert(handle.clone(), spec.workspace.clone());
        Ok(handle)
    }

    async fn attach(&self, _handle: &ContainerHandle, stdin: Vec<u8>) -> Result<LogStream, RuntimeError> {
        self.record(Call::Attach);
        self.recorded.lock().unwrap().stdin.push(stdin);

        let chunks = stream::iter(vec![Ok::<_, RuntimeError>(self.output.clone())]);
        if self.exit_code.is_some() {
            Ok(chunks.boxed())
        } else {
            // a running program keeps its output stream open
            Ok(chunks.chain(stream::pending()).boxed())
        }
    }

    async fn start(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.record(Call::Start);
        if self.start_fails {
            return Err(Self::fail(RuntimeOperation::Start));
        }
        self.started.send_replace(true);

        if let Some(workspace) = self.workspace(handle) {
            let files: Vec<(String, String)> = std::fs::read_dir(&workspace)
                .map(|entries| {
                    entries
                        .filter_map(Result::ok)
                        .map(|entry| {
                            let name = entry.file_name().to_string_lossy().into_owned();
                            let contents = std::fs::read_to_string(entry.path()).unwrap_or_default();
                            (name, contents)
                        })
                        .collect()
                })
                .unwrap_or_default();
            self.recorded.lock().unwrap().at_start.push(StartSnapshot {
                workspace_exists: workspace.is_dir(),
                workspace,
                files,
            });
        }
        Ok(())
    }

    async fn wait(&self, _handle: &ContainerHandle) -> Result<i64, RuntimeError> {
        self.record(Call::Wait);
        if self.wait_fails {
            return Err(Self::fail(RuntimeOperation::Wait));
        }
        if self.removed_on_exit && *self.started.borrow() {
            return Err(RuntimeError::rejected(RuntimeOperation::Wait, "no such container"));
        }

        // the run time counts from start, like a real container's
        let mut started = self.started.subscribe();
        if started.wait_for(|started| *started).await.is_err() {
            return Err(Self::fail(RuntimeOperation::Wait));
        }
        match self.exit_code {
            Some(code) => {
                tokio::time::sleep(self.run_time).await;
                Ok(code)
            }
            None => futures_util::future::pending().await,
        }
    }

    async fn kill(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.record(Call::Kill);
        let exists = self.workspace(handle).map(|w| w.is_dir()).unwrap_or(false);
        self.recorded.lock().unwrap().workspace_exists_at_kill.push(exists);
        Ok(())
    }

    async fn remove(&self, _handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.record(Call::Remove);
        Ok(())
    }
}
