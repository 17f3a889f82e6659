// ABOUTME: Local execution backend running Python cells and shell commands as child processes
// ABOUTME: Concurrent output draining, wall-clock timeout with kill, scoped temp files

use std::io::Write;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Result, SandboxError};
use crate::settings::SandboxSettings;
use crate::types::{ContentKind, ExecutionResult, TextContent};

/// How long output pipes may stay open after the process has exited
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Captured result of one child process
#[derive(Debug, Clone, PartialEq, Eq)]
struct ProcessOutput {
    stdout: String,
    stderr: String,
    exit_code: i32,
}

impl ProcessOutput {
    fn is_error(&self) -> bool {
        self.exit_code != 0 || !self.stderr.is_empty()
    }
}

/// Runs code on the manager host
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    python_bin: String,
    shell_bin: String,
    workdir: Option<PathBuf>,
    timeout: Duration,
}

impl LocalExecutor {
    pub fn new(python_bin: impl Into<String>, shell_bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            python_bin: python_bin.into(),
            shell_bin: shell_bin.into(),
            workdir: None,
            timeout,
        }
    }

    pub fn from_settings(settings: &SandboxSettings) -> Self {
        Self {
            python_bin: settings.python_bin.clone(),
            shell_bin: settings.shell_bin.clone(),
            workdir: settings.local_workdir.clone(),
            timeout: settings.local_timeout,
        }
    }

    pub fn with_workdir(mut self, workdir: impl Into<PathBuf>) -> Self {
        self.workdir = Some(workdir.into());
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run a Python cell through the configured interpreter
    pub async fn run_python_cell(&self, code: &str, split_output: bool) -> Result<ExecutionResult> {
        if code.trim().is_empty() {
            return Err(SandboxError::InvalidRequest("code must not be empty".to_string()));
        }

        // Removed when `script` drops, on every return path
        let mut script = tempfile::Builder::new()
            .prefix("sandbox_")
            .suffix(".py")
            .tempfile()?;
        script.write_all(code.as_bytes())?;
        script.flush()?;

        let mut command = Command::new(&self.python_bin);
        command.arg(script.path());
        let output = self.run(command).await?;

        Ok(shape(output, split_output, false))
    }

    /// Run a shell command through `<shell> -c`
    pub async fn run_shell_command(
        &self,
        command: &str,
        split_output: bool,
    ) -> Result<ExecutionResult> {
        if command.trim().is_empty() {
            return Err(SandboxError::InvalidRequest(
                "command must not be empty".to_string(),
            ));
        }

        let mut cmd = Command::new(&self.shell_bin);
        cmd.arg("-c").arg(command);
        let output = self.run(cmd).await?;

        Ok(shape(output, split_output, true))
    }

    async fn run(&self, mut command: Command) -> Result<ProcessOutput> {
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        #[cfg(unix)]
        command.process_group(0);
        if let Some(dir) = &self.workdir {
            command.current_dir(dir);
        }

        let mut child = command.spawn()?;
        let stdout = Drain::spawn(child.stdout.take());
        let stderr = Drain::spawn(child.stderr.take());

        // The budget covers process exit, not pipe EOF: a background job may
        // keep the pipes open after the process itself is done
        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(status) => status?,
            Err(_) => {
                warn!("Local process exceeded {:?}, killing it", self.timeout);
                kill_process_group(&mut child).await;
                stdout.abort();
                stderr.abort();
                return Err(SandboxError::Timeout(self.timeout));
            }
        };

        let exit_code = status.code().unwrap_or(-1);
        debug!("Local process exited with {}", exit_code);

        Ok(ProcessOutput {
            stdout: stdout.finish().await,
            stderr: stderr.finish().await,
            exit_code,
        })
    }
}

/// Bytes collected from one child pipe by a background task
struct Drain {
    buffer: Arc<Mutex<Vec<u8>>>,
    task: Option<JoinHandle<()>>,
}

impl Drain {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let task = pipe.map(|mut pipe| {
            let buffer = buffer.clone();
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) => break,
                        Ok(n) => {
                            buffer
                                .lock()
                                .unwrap_or_else(PoisonError::into_inner)
                                .extend_from_slice(&chunk[..n]);
                        }
                        Err(e) => {
                            debug!("Reading child output failed: {}", e);
                            break;
                        }
                    }
                }
            })
        });
        Self { buffer, task }
    }

    /// Wait up to `DRAIN_GRACE` for EOF, then keep whatever has arrived
    async fn finish(mut self) -> String {
        if let Some(task) = self.task.take() {
            let abort = task.abort_handle();
            if tokio::time::timeout(DRAIN_GRACE, task).await.is_err() {
                debug!("Child output still open after exit, keeping partial output");
                abort.abort();
            }
        }
        let bytes = self.buffer.lock().unwrap_or_else(PoisonError::into_inner);
        String::from_utf8_lossy(&bytes).trim().to_string()
    }

    fn abort(&self) {
        if let Some(task) = &self.task {
            task.abort();
        }
    }
}

/// Kill the child and, on unix, every process left in its group
async fn kill_process_group(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{killpg, Signal};
        use nix::unistd::Pid;

        // The child leads its own group, so this also reaches background jobs
        if let Some(pid) = child.id() {
            if let Err(e) = killpg(Pid::from_raw(pid as i32), Signal::SIGKILL) {
                debug!("Failed to signal process group {}: {}", pid, e);
            }
        }
    }
    if let Err(e) = child.kill().await {
        debug!("Failed to kill local process: {}", e);
    }
}

/// Turn an execution outcome into a wire result; failures become a single `error` entry
pub fn into_execution_result(outcome: Result<ExecutionResult>) -> ExecutionResult {
    match outcome {
        Ok(result) => result,
        Err(e) => ExecutionResult::error(e.to_string()),
    }
}

fn shape(output: ProcessOutput, split_output: bool, with_exit_code: bool) -> ExecutionResult {
    let is_error = output.is_error();

    if split_output {
        let mut content = Vec::new();
        if !output.stdout.is_empty() || output.stderr.is_empty() {
            content.push(TextContent::new(ContentKind::Stdout, output.stdout));
        }
        if !output.stderr.is_empty() {
            content.push(TextContent::new(ContentKind::Stderr, output.stderr));
        }
        if with_exit_code {
            content.push(TextContent::new(
                ContentKind::Returncode,
                output.exit_code.to_string(),
            ));
        }
        return ExecutionResult::new(content, is_error);
    }

    let exit_code = output.exit_code.to_string();
    let mut parts: Vec<&str> = [output.stdout.as_str(), output.stderr.as_str()]
        .into_iter()
        .filter(|p| !p.is_empty())
        .collect();
    if with_exit_code {
        parts.push(exit_code.as_str());
    }
    ExecutionResult::new(
        vec![TextContent::new(ContentKind::Output, parts.join("\n"))],
        is_error,
    )
}
