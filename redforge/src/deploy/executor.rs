//! External tool execution and log aggregation

use std::path::PathBuf;
use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::deploy::credentials::ToolEnv;
use crate::errors::ForgeError;
use crate::models::activity::{ActivityLog, LogSource, LogStatus};
use crate::store::Store;

/// One external program invocation
#[derive(Debug, Default)]
pub struct ToolInvocation {
    pub program: String,
    pub args: Vec<String>,
    pub env: ToolEnv,
    pub cwd: Option<PathBuf>,
    /// Overrides the executor's default watchdog
    pub timeout: Option<Duration>,
    /// Directories appended to the restricted PATH
    pub extra_path: Vec<String>,
}

impl ToolInvocation {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Default::default()
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, env: ToolEnv) -> Self {
        self.env = env;
        self
    }

    pub fn cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn extend_path(mut self, dir: impl Into<String>) -> Self {
        self.extra_path.push(dir.into());
        self
    }

    /// Program and subcommand, safe to log
    pub fn describe(&self) -> String {
        match self.args.first() {
            Some(first) => format!("{} {}", self.program, first),
            None => self.program.clone(),
        }
    }
}

/// Output stream of a chunk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputStream {
    Stdout,
    Stderr,
}

/// A piece of tool output as it was read
#[derive(Debug, Clone)]
pub struct OutputChunk {
    pub stream: OutputStream,
    pub text: String,
}

/// How a tool run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolExit {
    Exited(i32),
    TimedOut,
    Cancelled,
}

/// Spawns external programs
#[async_trait]
pub trait ToolRunner: Send + Sync {
    /// Run `invocation` with only `path` and its env, streaming output into
    /// `output` until exit, watchdog expiry or cancellation
    async fn run(
        &self,
        invocation: &ToolInvocation,
        path: &str,
        timeout: Duration,
        output: mpsc::UnboundedSender<OutputChunk>,
        cancel: CancellationToken,
    ) -> Result<ToolExit, ForgeError>;
}

/// Runs tools as child processes
pub struct ProcessRunner;

fn forward<R>(
    mut reader: R,
    stream: OutputStream,
    output: mpsc::UnboundedSender<OutputChunk>,
) -> JoinHandle<()>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut buf = vec![0u8; 4096];
        let mut pending = Vec::new();
        loop {
            match reader.read(&mut buf).await {
                Ok(0) => break,
                Ok(n) => {
                    pending.extend_from_slice(&buf[..n]);
                    let text = take_decoded(&mut pending);
                    if text.is_empty() {
                        continue;
                    }
                    if output.send(OutputChunk { stream, text }).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!("Failed to read tool output: {}", e);
                    break;
                }
            }
        }
        if !pending.is_empty() {
            let text = String::from_utf8_lossy(&pending).into_owned();
            let _ = output.send(OutputChunk { stream, text });
        }
    })
}

/// Length of an unfinished UTF-8 sequence at the end of `bytes`
fn incomplete_tail(bytes: &[u8]) -> usize {
    for back in 1..=bytes.len().min(3) {
        let b = bytes[bytes.len() - back];
        if b & 0xC0 == 0x80 {
            continue;
        }
        let width = match b {
            0xF0.. => 4,
            0xE0.. => 3,
            0xC0.. => 2,
            _ => 1,
        };
        return if width > back { back } else { 0 };
    }
    0
}

/// Decode `pending`, keeping a trailing partial character for the next read
fn take_decoded(pending: &mut Vec<u8>) -> String {
    let tail = pending.split_off(pending.len() - incomplete_tail(pending));
    let text = String::from_utf8_lossy(pending).into_owned();
    *pending = tail;
    text
}

#[async_trait]
impl ToolRunner for ProcessRunner {
    async fn run(
        &self,
        invocation: &ToolInvocation,
        path: &str,
        timeout: Duration,
        output: mpsc::UnboundedSender<OutputChunk>,
        cancel: CancellationToken,
    ) -> Result<ToolExit, ForgeError> {
        let mut command = tokio::process::Command::new(&invocation.program);
        command
            .args(&invocation.args)
            .env_clear()
            .env("PATH", path)
            .envs(invocation.env.exposed())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(cwd) = &invocation.cwd {
            command.current_dir(cwd);
        }

        let mut child = command.spawn().map_err(|e| {
            ForgeError::Internal(format!("Failed to spawn {}: {}", invocation.program, e))
        })?;

        let mut readers = Vec::new();
        if let Some(stdout) = child.stdout.take() {
            readers.push(forward(stdout, OutputStream::Stdout, output.clone()));
        }
        if let Some(stderr) = child.stderr.take() {
            readers.push(forward(stderr, OutputStream::Stderr, output.clone()));
        }
        drop(output);

        let exit = tokio::select! {
            status = child.wait() => ToolExit::Exited(status?.code().unwrap_or(-1)),
            () = tokio::time::sleep(timeout) => {
                let _ = child.kill().await;
                ToolExit::TimedOut
            }
            () = cancel.cancelled() => {
                let _ = child.kill().await;
                ToolExit::Cancelled
            }
        };

        // Grandchildren of a killed process may still hold the pipes
        for reader in readers {
            if matches!(exit, ToolExit::Exited(_)) {
                let _ = reader.await;
            } else {
                reader.abort();
            }
        }
        Ok(exit)
    }
}

/// Deployment a tool run is attributed to
#[derive(Debug, Clone)]
pub struct RunContext {
    pub deployment_id: String,
    pub project_id: String,
    pub cancel: CancellationToken,
}

/// Collected output of a successful run
#[derive(Debug, Clone, Default)]
pub struct ToolOutput {
    /// stdout and stderr interleaved in arrival order
    pub combined: String,
    pub stdout: String,
}

/// Runs tools on behalf of deployments, recording their output
pub struct Executor {
    runner: Arc<dyn ToolRunner>,
    store: Arc<Store>,
    tool_path: String,
    default_timeout: Duration,
}

impl Executor {
    pub fn new(
        runner: Arc<dyn ToolRunner>,
        store: Arc<Store>,
        tool_path: impl Into<String>,
        default_timeout: Duration,
    ) -> Self {
        Self {
            runner,
            store,
            tool_path: tool_path.into(),
            default_timeout,
        }
    }

    pub fn tool_path(&self) -> &str {
        &self.tool_path
    }

    /// Run `invocation`, append its output to the deployment log and emit
    /// one activity entry
    pub async fn run(
        &self,
        ctx: &RunContext,
        invocation: ToolInvocation,
    ) -> Result<ToolOutput, ForgeError> {
        if ctx.cancel.is_cancelled() {
            return Err(ForgeError::Cancelled);
        }

        let description = invocation.describe();
        let timeout = invocation.timeout.unwrap_or(self.default_timeout);
        info!(
            "Running '{}' for deployment {}",
            description, ctx.deployment_id
        );

        let path = std::iter::once(self.tool_path.as_str())
            .chain(invocation.extra_path.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(":");

        let (tx, mut rx) = mpsc::unbounded_channel::<OutputChunk>();
        let store = self.store.clone();
        let deployment_id = ctx.deployment_id.clone();
        let writer = tokio::spawn(async move {
            let mut collected = ToolOutput::default();
            while let Some(chunk) = rx.recv().await {
                store.append_log(&deployment_id, &chunk.text).await;
                if chunk.stream == OutputStream::Stdout {
                    collected.stdout.push_str(&chunk.text);
                }
                collected.combined.push_str(&chunk.text);
            }
            collected
        });

        let result = self
            .runner
            .run(&invocation, &path, timeout, tx, ctx.cancel.clone())
            .await;
        let collected = writer
            .await
            .map_err(|e| ForgeError::Internal(format!("Log writer failed: {}", e)))?;

        let (status, message) = match &result {
            Ok(ToolExit::Exited(0)) => (LogStatus::Info, format!("{} completed", description)),
            Ok(ToolExit::Exited(code)) => (
                LogStatus::Error,
                format!("{} failed with exit code {}", description, code),
            ),
            Ok(ToolExit::TimedOut) => (
                LogStatus::Error,
                format!("{} timed out after {}s", description, timeout.as_secs()),
            ),
            Ok(ToolExit::Cancelled) => (LogStatus::Error, format!("{} cancelled", description)),
            Err(e) => (LogStatus::Error, format!("{} failed: {}", description, e)),
        };
        let entry = ActivityLog::new(
            message,
            &ctx.project_id,
            LogSource::from_program(&invocation.program),
            status,
            &ctx.deployment_id,
        );
        if let Err(e) = self.store.add_activity(entry).await {
            error!("Failed to record activity: {}", e);
        }

        match result? {
            ToolExit::Exited(0) => {
                debug!("'{}' finished", description);
                Ok(collected)
            }
            ToolExit::Exited(code) => Err(ForgeError::ExternalToolError {
                tool: invocation.program,
                code,
            }),
            ToolExit::TimedOut => Err(ForgeError::ToolTimeout {
                tool: invocation.program,
                secs: timeout.as_secs(),
            }),
            ToolExit::Cancelled => Err(ForgeError::Cancelled),
        }
    }
}
