//! Sandbox trait and process types.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc};

use crate::error::SandboxResult;
use crate::tree::FileTree;

/// Which pipe a line of process output came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStream {
    Stdout,
    Stderr,
}

impl std::fmt::Display for OutputStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdout => write!(f, "stdout"),
            Self::Stderr => write!(f, "stderr"),
        }
    }
}

/// One line of output from a sandboxed process.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputLine {
    pub timestamp: DateTime<Utc>,
    pub stream: OutputStream,
    pub text: String,
}

impl OutputLine {
    pub fn stdout(text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream: OutputStream::Stdout,
            text: text.into(),
        }
    }

    pub fn stderr(text: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            stream: OutputStream::Stderr,
            text: text.into(),
        }
    }
}

/// Receiving end of a process's output, delivered line by line as produced.
pub type OutputReceiver = mpsc::UnboundedReceiver<OutputLine>;

/// Fired once a spawned process starts listening on a port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerReady {
    pub port: u16,
    pub url: String,
}

/// Handle to a process running inside a sandbox.
#[async_trait]
pub trait SandboxProcess: Send + Sync {
    /// Sandbox-local process id.
    fn id(&self) -> u32;

    /// The command line this process was spawned with.
    fn command_line(&self) -> &str;

    /// Take the output receiver. Returns `None` after the first call.
    fn take_output(&mut self) -> Option<OutputReceiver>;

    /// Wait for the process to exit and return its exit code.
    async fn wait(&mut self) -> SandboxResult<i32>;

    /// Exit code if the process has already finished.
    fn try_exit_code(&mut self) -> SandboxResult<Option<i32>>;

    /// Forcibly terminate the process.
    async fn kill(&mut self) -> SandboxResult<()>;
}

/// The execution environment the core drives: one filesystem, one process table.
#[async_trait]
pub trait Sandbox: Send + Sync {
    /// Materialize a file tree. Calling it twice with the same tree is harmless.
    async fn mount(&self, tree: &FileTree) -> SandboxResult<()>;

    async fn write_file(&self, path: &str, contents: &str) -> SandboxResult<()>;

    async fn read_file(&self, path: &str) -> SandboxResult<String>;

    async fn mkdir(&self, path: &str, recursive: bool) -> SandboxResult<()>;

    /// List the entries of a directory. Fails with `NotFound` when absent.
    async fn read_dir(&self, path: &str) -> SandboxResult<Vec<String>>;

    async fn spawn(&self, program: &str, args: &[String]) -> SandboxResult<Box<dyn SandboxProcess>>;

    /// Subscribe to server-ready notifications.
    fn subscribe_server_ready(&self) -> broadcast::Receiver<ServerReady>;

    /// Existence check built on `read_dir`.
    async fn dir_exists(&self, path: &str) -> SandboxResult<bool> {
        match self.read_dir(path).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }
}

/// Join a program and its arguments back into a display command line.
pub fn command_line(program: &str, args: &[String]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

/// Look for a local dev-server URL in a line of output.
pub fn detect_server_url(line: &str) -> Option<ServerReady> {
    let re = Regex::new(r"(https?://(?:localhost|127\.0\.0\.1|0\.0\.0\.0|\[::1?\]):(\d{2,5})/?)").ok()?;
    let caps = re.captures(line)?;
    let port = caps[2].parse::<u16>().ok()?;
    Some(ServerReady {
        port,
        url: caps[1].to_string(),
    })
}
