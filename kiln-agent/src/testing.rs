//! In-memory container runtime for tests

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::runtime::{
    CapturedOutput, ContainerHandle, ContainerRuntime, ContainerSpec, RuntimeError,
};

/// Scripted behaviour of one fake container
#[derive(Debug, Clone, Default)]
pub(crate) struct FakeRun {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub hang: bool,
}

impl FakeRun {
    pub fn exit(exit_code: i32) -> Self {
        Self {
            exit_code,
            ..Default::default()
        }
    }

    /// Container that never exits on its own
    pub fn hang() -> Self {
        Self {
            hang: true,
            ..Default::default()
        }
    }

    pub fn stdout(mut self, stdout: &str) -> Self {
        self.stdout = stdout.to_string();
        self
    }

    pub fn stderr(mut self, stderr: &str) -> Self {
        self.stderr = stderr.to_string();
        self
    }
}

type Behavior = Box<dyn Fn(&ContainerSpec) -> FakeRun + Send + Sync>;

/// Runtime whose containers follow a script instead of running anything
///
/// The behaviour closure runs at container start, so it can inspect the
/// workspace exactly as the container would see it.
pub(crate) struct FakeRuntime {
    behavior: Behavior,
    images: Mutex<HashSet<String>>,
    pull_error: Option<String>,
    run_error: Option<String>,
    unavailable: bool,
    hanging_pull: bool,
    hanging_logs: bool,
    live: Mutex<HashMap<String, FakeRun>>,
    started: Mutex<Vec<ContainerSpec>>,
    pulled: Mutex<Vec<String>>,
    removed: Mutex<Vec<String>>,
    next_id: AtomicUsize,
}

impl FakeRuntime {
    pub fn new<F>(behavior: F) -> Self
    where
        F: Fn(&ContainerSpec) -> FakeRun + Send + Sync + 'static,
    {
        Self {
            behavior: Box::new(behavior),
            images: Mutex::new(HashSet::new()),
            pull_error: None,
            run_error: None,
            unavailable: false,
            hanging_pull: false,
            hanging_logs: false,
            live: Mutex::new(HashMap::new()),
            started: Mutex::new(Vec::new()),
            pulled: Mutex::new(Vec::new()),
            removed: Mutex::new(Vec::new()),
            next_id: AtomicUsize::new(1),
        }
    }

    pub fn with_image(self, image: &str) -> Self {
        self.images.lock().unwrap().insert(image.to_string());
        self
    }

    pub fn failing_pull(mut self, message: &str) -> Self {
        self.pull_error = Some(message.to_string());
        self
    }

    pub fn failing_run(mut self, message: &str) -> Self {
        self.run_error = Some(message.to_string());
        self
    }

    /// Engine that cannot be reached at all
    pub fn unavailable(mut self) -> Self {
        self.unavailable = true;
        self
    }

    /// Pulls that never finish, like a stalled registry
    pub fn hanging_pull(mut self) -> Self {
        self.hanging_pull = true;
        self
    }

    /// Log reads that never finish
    pub fn hanging_logs(mut self) -> Self {
        self.hanging_logs = true;
        self
    }

    pub fn started(&self) -> Vec<ContainerSpec> {
        self.started.lock().unwrap().clone()
    }

    pub fn pulled(&self) -> Vec<String> {
        self.pulled.lock().unwrap().clone()
    }

    /// Names of removed containers, in removal order
    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().unwrap().clone()
    }

    /// Containers started and not yet removed
    pub fn live_containers(&self) -> usize {
        self.live.lock().unwrap().len()
    }

    fn failure(command: &str, message: &str) -> RuntimeError {
        RuntimeError::CommandFailed {
            command: format!("fake {}", command),
            exit_code: Some(125),
            stderr: message.to_string(),
        }
    }

    fn script(&self, handle: &ContainerHandle) -> Result<FakeRun, RuntimeError> {
        self.live
            .lock()
            .unwrap()
            .get(&handle.id)
            .cloned()
            .ok_or_else(|| Self::failure("inspect", "no such container"))
    }
}

fn cap(text: &str, limit: usize) -> (String, bool) {
    if text.len() <= limit {
        return (text.to_string(), false);
    }
    let mut end = limit;
    while !text.is_char_boundary(end) {
        end -= 1;
    }
    (text[..end].to_string(), true)
}

#[async_trait]
impl ContainerRuntime for FakeRuntime {
    async fn version(&self) -> Result<String, RuntimeError> {
        if self.unavailable {
            return Err(Self::failure("info", "cannot connect to engine"));
        }
        Ok("fake version 1.0".to_string())
    }

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        if self.unavailable {
            return Err(Self::failure("image inspect", "cannot connect to engine"));
        }
        Ok(self.images.lock().unwrap().contains(image))
    }

    async fn pull(&self, image: &str) -> Result<(), RuntimeError> {
        if self.hanging_pull {
            std::future::pending::<()>().await;
        }
        if let Some(message) = &self.pull_error {
            return Err(Self::failure("pull", message));
        }
        self.pulled.lock().unwrap().push(image.to_string());
        self.images.lock().unwrap().insert(image.to_string());
        Ok(())
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError> {
        if let Some(message) = &self.run_error {
            return Err(Self::failure("run", message));
        }
        let script = (self.behavior)(spec);
        let id = format!("fake{:08}", self.next_id.fetch_add(1, Ordering::SeqCst));

        self.started.lock().unwrap().push(spec.clone());
        self.live.lock().unwrap().insert(id.clone(), script);
        Ok(ContainerHandle {
            id,
            name: spec.name.clone(),
        })
    }

    async fn wait(&self, handle: &ContainerHandle) -> Result<i32, RuntimeError> {
        let script = self.script(handle)?;
        if script.hang {
            std::future::pending::<()>().await;
        }
        Ok(script.exit_code)
    }

    async fn logs(
        &self,
        handle: &ContainerHandle,
        limit: usize,
    ) -> Result<CapturedOutput, RuntimeError> {
        let script = self.script(handle)?;
        if self.hanging_logs {
            std::future::pending::<()>().await;
        }
        let (stdout, out_truncated) = cap(&script.stdout, limit);
        let (stderr, err_truncated) = cap(&script.stderr, limit);
        Ok(CapturedOutput {
            stdout,
            stderr,
            truncated: out_truncated || err_truncated,
        })
    }

    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        self.live.lock().unwrap().remove(&handle.id);
        self.removed.lock().unwrap().push(handle.name.clone());
        Ok(())
    }
}
