//! Podman (or docker) CLI driver
//!
//! Implements [`ContainerRuntime`] by invoking a docker-compatible CLI:
//! - Checking the runtime is reachable
//! - Pulling missing images
//! - Starting detached job containers with the workspace mounted
//! - Waiting for exit, reading capped logs, force-removing

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::Path;
use std::process::{Output, Stdio};
use tempfile::NamedTempFile;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::runtime::{
    CONTAINER_WORKDIR, CapturedOutput, ContainerHandle, ContainerRuntime, ContainerSpec,
    RuntimeError,
};

const READ_CHUNK: usize = 8 * 1024;

/// Drives containers through the `podman` or `docker` command line
#[derive(Debug, Clone)]
pub struct PodmanRuntime {
    binary: String,
}

impl PodmanRuntime {
    /// # Arguments
    /// * `binary` - CLI to invoke (e.g. `podman`, `docker`, or an absolute path)
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    pub fn binary(&self) -> &str {
        &self.binary
    }

    fn command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command.stdin(Stdio::null()).kill_on_drop(true);
        command
    }

    async fn output(&self, mut command: Command, label: &str) -> Result<Output, RuntimeError> {
        debug!("Running {} {}", self.binary, label);
        command.output().await.map_err(|source| RuntimeError::Spawn {
            binary: self.binary.clone(),
            source,
        })
    }

    /// Runs a command and returns its stdout, failing on non-zero exit
    async fn checked(&self, args: &[&str]) -> Result<String, RuntimeError> {
        let mut command = self.command();
        command.args(args);
        let label = args.first().copied().unwrap_or_default();
        let output = self.output(command, label).await?;
        self.check(output, label)
    }

    fn check(&self, output: Output, label: &str) -> Result<String, RuntimeError> {
        let stdout = String::from_utf8_lossy(&output.stdout).to_string();
        if output.status.success() {
            return Ok(stdout);
        }

        let stderr = String::from_utf8_lossy(&output.stderr);
        Err(RuntimeError::CommandFailed {
            command: format!("{} {}", self.binary, label),
            exit_code: output.status.code(),
            stderr: stderr.trim().to_string(),
        })
    }
}

/// Arguments for `<runtime> run` starting `spec` detached
///
/// Job environment reaches the container only through `env_file`; neither
/// names nor values go on the command line or into the CLI's own
/// environment.
pub fn run_args(spec: &ContainerSpec, env_file: Option<&Path>) -> Vec<String> {
    let mut args = vec![
        "run".to_string(),
        "-d".to_string(),
        "--name".to_string(),
        spec.name.clone(),
        "--security-opt".to_string(),
        "no-new-privileges".to_string(),
        "-v".to_string(),
        format!("{}:{}:Z", spec.workspace.display(), CONTAINER_WORKDIR),
        "-w".to_string(),
        CONTAINER_WORKDIR.to_string(),
    ];

    for (key, value) in &spec.labels {
        args.push("--label".to_string());
        args.push(format!("{}={}", key, value));
    }

    if let Some(path) = env_file {
        args.push("--env-file".to_string());
        args.push(path.display().to_string());
    }

    if let Some(cpus) = &spec.cpu_limit {
        args.push("--cpus".to_string());
        args.push(cpus.clone());
    }

    if let Some(memory) = &spec.memory_limit {
        args.push("--memory".to_string());
        args.push(memory.clone());
        // Equal swap limit disables swap so the memory limit is enforced
        args.push("--memory-swap".to_string());
        args.push(memory.clone());
    }

    args.push(spec.image.clone());
    args.extend(spec.command.iter().cloned());
    args
}

/// Writes `env` as `NAME=value` lines to a private temporary file
///
/// The file is created with owner-only permissions outside any workspace
/// and deleted when the returned handle drops. Values must not contain line
/// breaks.
pub fn write_env_file(env: &BTreeMap<String, String>) -> std::io::Result<NamedTempFile> {
    let mut file = tempfile::Builder::new().prefix("kiln-env-").tempfile()?;
    for (key, value) in env {
        if value.contains(['\n', '\r']) {
            return Err(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("value of {} contains a line break", key),
            ));
        }
        writeln!(file, "{}={}", key, value)?;
    }
    file.flush()?;
    Ok(file)
}

/// Parses the exit code printed by `<runtime> wait`
pub fn parse_exit_code(output: &str) -> Option<i32> {
    output
        .lines()
        .rev()
        .map(str::trim)
        .find(|line| !line.is_empty())
        .and_then(|line| line.parse::<i32>().ok())
}

/// Reads a stream to the end, keeping at most `limit` bytes
///
/// The remainder is drained and discarded so the writer never blocks on a
/// full pipe.
pub async fn read_capped<R>(mut reader: R, limit: usize) -> std::io::Result<(Vec<u8>, bool)>
where
    R: AsyncRead + Unpin,
{
    let mut kept = Vec::new();
    let mut truncated = false;
    let mut chunk = vec![0u8; READ_CHUNK];

    loop {
        let n = reader.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = limit.saturating_sub(kept.len());
        if n > room {
            truncated = true;
        }
        kept.extend_from_slice(&chunk[..n.min(room)]);
    }

    Ok((kept, truncated))
}

/// Converts captured bytes to text
///
/// A truncated stream may end inside a multi-byte character; that partial
/// character is dropped instead of turning into a replacement character.
pub fn decode_output(mut bytes: Vec<u8>, truncated: bool) -> String {
    if truncated {
        if let Err(e) = std::str::from_utf8(&bytes) {
            if e.error_len().is_none() {
                bytes.truncate(e.valid_up_to());
            }
        }
    }
    match String::from_utf8(bytes) {
        Ok(text) => text,
        Err(e) => String::from_utf8_lossy(e.as_bytes()).into_owned(),
    }
}

#[async_trait]
impl ContainerRuntime for PodmanRuntime {
    async fn version(&self) -> Result<String, RuntimeError> {
        // `info` needs a working engine, `--version` only the binary
        self.checked(&["info"]).await?;
        let version = self.checked(&["--version"]).await?;
        Ok(version.trim().to_string())
    }

    async fn image_exists(&self, image: &str) -> Result<bool, RuntimeError> {
        let mut command = self.command();
        command.args(["image", "inspect", "--format", "{{.Id}}", image]);
        let output = self.output(command, "image inspect").await?;
        Ok(output.status.success())
    }

    async fn pull(&self, image: &str) -> Result<(), RuntimeError> {
        info!("Pulling image {}", image);
        self.checked(&["pull", "-q", image]).await?;
        info!("Pulled image {}", image);
        Ok(())
    }

    async fn run(&self, spec: &ContainerSpec) -> Result<ContainerHandle, RuntimeError> {
        // Kept alive until the CLI has read it
        let env_file = if spec.env.is_empty() {
            None
        } else {
            Some(write_env_file(&spec.env).map_err(|source| RuntimeError::EnvFile { source })?)
        };

        let mut command = self.command();
        command.args(run_args(spec, env_file.as_ref().map(NamedTempFile::path)));

        let output = self.output(command, "run").await?;
        drop(env_file);
        let stdout = self.check(output, "run")?;

        let id = stdout
            .lines()
            .rev()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .ok_or_else(|| RuntimeError::UnexpectedOutput {
                command: format!("{} run", self.binary),
                output: stdout.trim().to_string(),
            })?
            .to_string();

        info!("Container {} started with ID: {}", spec.name, id);
        Ok(ContainerHandle {
            id,
            name: spec.name.clone(),
        })
    }

    async fn wait(&self, handle: &ContainerHandle) -> Result<i32, RuntimeError> {
        let stdout = self.checked(&["wait", &handle.id]).await?;
        parse_exit_code(&stdout).ok_or_else(|| RuntimeError::UnexpectedOutput {
            command: format!("{} wait", self.binary),
            output: stdout.trim().to_string(),
        })
    }

    async fn logs(
        &self,
        handle: &ContainerHandle,
        limit: usize,
    ) -> Result<CapturedOutput, RuntimeError> {
        let mut command = self.command();
        command
            .args(["logs", &handle.id])
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let spawn_err = |source| RuntimeError::Spawn {
            binary: self.binary.clone(),
            source,
        };
        let mut child = command.spawn().map_err(spawn_err)?;

        let (Some(stdout), Some(stderr)) = (child.stdout.take(), child.stderr.take()) else {
            return Err(RuntimeError::UnexpectedOutput {
                command: format!("{} logs", self.binary),
                output: "output pipes unavailable".to_string(),
            });
        };

        let (out, err) = tokio::join!(read_capped(stdout, limit), read_capped(stderr, limit));
        let status = child.wait().await.map_err(spawn_err)?;
        let (out, out_truncated) = out.map_err(spawn_err)?;
        let (err, err_truncated) = err.map_err(spawn_err)?;

        let captured = CapturedOutput {
            stdout: decode_output(out, out_truncated),
            stderr: decode_output(err, err_truncated),
            truncated: out_truncated || err_truncated,
        };

        if !status.success() {
            return Err(RuntimeError::CommandFailed {
                command: format!("{} logs", self.binary),
                exit_code: status.code(),
                stderr: captured.stderr.trim().to_string(),
            });
        }

        if captured.truncated {
            warn!(
                "Output of container {} exceeded {} bytes and was truncated",
                handle.name, limit
            );
        }
        Ok(captured)
    }

    async fn remove(&self, handle: &ContainerHandle) -> Result<(), RuntimeError> {
        match self.checked(&["rm", "-f", &handle.id]).await {
            Ok(_) => {
                debug!("Container {} removed", handle.name);
                Ok(())
            }
            Err(RuntimeError::CommandFailed { stderr, .. })
                if stderr.to_ascii_lowercase().contains("no such container") =>
            {
                debug!("Container {} already gone", handle.name);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
