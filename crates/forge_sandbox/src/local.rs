//! Host-directory sandbox backed by `tokio::process`.
//!
//! Every sandbox path is resolved under a root directory; paths that try to
//! climb out of it with `..` are rejected. Processes run with the root as
//! their working directory and stream their output line by line.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::{Child, Command};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, info, warn};

use crate::error::{SandboxError, SandboxResult};
use crate::sandbox::{
    command_line, detect_server_url, OutputLine, OutputReceiver, OutputStream, Sandbox,
    SandboxProcess, ServerReady,
};
use crate::tree::FileTree;

/// Options for a [`LocalSandbox`].
#[derive(Debug, Clone)]
pub struct LocalSandboxOptions {
    /// Extra environment variables for spawned processes
    pub env: HashMap<String, String>,
    /// Scan process output for a local server URL
    pub detect_server_ready: bool,
}

impl Default for LocalSandboxOptions {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalSandboxOptions {
    pub fn new() -> Self {
        Self {
            env: HashMap::new(),
            detect_server_ready: true,
        }
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn detect_server_ready(mut self, enabled: bool) -> Self {
        self.detect_server_ready = enabled;
        self
    }
}

/// Sandbox rooted at a directory on the host.
pub struct LocalSandbox {
    root: PathBuf,
    options: LocalSandboxOptions,
    server_ready: broadcast::Sender<ServerReady>,
}

impl LocalSandbox {
    /// Create a sandbox rooted at `root`, creating the directory if needed.
    pub fn new(root: impl Into<PathBuf>, options: LocalSandboxOptions) -> SandboxResult<Self> {
        let root = root.into();
        std::fs::create_dir_all(&root)?;
        info!("Local sandbox rooted at {}", root.display());
        let (server_ready, _) = broadcast::channel(16);
        Ok(Self {
            root,
            options,
            server_ready,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a sandbox path onto the host filesystem.
    pub fn resolve(&self, path: &str) -> SandboxResult<PathBuf> {
        let mut resolved = self.root.clone();
        for component in Path::new(path.trim_start_matches('/')).components() {
            match component {
                Component::Normal(part) => resolved.push(part),
                Component::CurDir => {}
                _ => return Err(SandboxError::InvalidPath(path.to_string())),
            }
        }
        Ok(resolved)
    }
}

#[async_trait]
impl Sandbox for LocalSandbox {
    async fn mount(&self, tree: &FileTree) -> SandboxResult<()> {
        debug!("Mounting {} files into {}", tree.len(), self.root.display());
        for (path, contents) in tree.files() {
            let target = self.resolve(path)?;
            if let Some(parent) = target.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }
            tokio::fs::write(&target, contents).await?;
        }
        Ok(())
    }

    async fn write_file(&self, path: &str, contents: &str) -> SandboxResult<()> {
        let target = self.resolve(path)?;
        tokio::fs::write(&target, contents).await?;
        Ok(())
    }

    async fn read_file(&self, path: &str) -> SandboxResult<String> {
        let target = self.resolve(path)?;
        match tokio::fs::read_to_string(&target).await {
            Ok(contents) => Ok(contents),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(SandboxError::NotFound(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> SandboxResult<()> {
        let target = self.resolve(path)?;
        if recursive {
            tokio::fs::create_dir_all(&target).await?;
            return Ok(());
        }
        match tokio::fs::create_dir(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(SandboxError::AlreadyExists(path.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn read_dir(&self, path: &str) -> SandboxResult<Vec<String>> {
        let target = self.resolve(path)?;
        let mut entries = match tokio::fs::read_dir(&target).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SandboxError::NotFound(path.to_string()))
            }
            Err(e) => return Err(e.into()),
        };

        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            names.push(entry.file_name().to_string_lossy().to_string());
        }
        names.sort();
        Ok(names)
    }

    async fn spawn(&self, program: &str, args: &[String]) -> SandboxResult<Box<dyn SandboxProcess>> {
        let line = command_line(program, args);

        // npm and friends are .cmd shims on Windows and need a shell to resolve.
        let mut command = if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(program).args(args);
            c
        } else {
            let mut c = Command::new(program);
            c.args(args);
            c
        };

        command
            .current_dir(&self.root)
            .envs(&self.options.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        #[cfg(windows)]
        {
            const CREATE_NO_WINDOW: u32 = 0x08000000;
            command.creation_flags(CREATE_NO_WINDOW);
        }

        let mut child = command.spawn().map_err(|e| SandboxError::SpawnFailed {
            command: line.clone(),
            message: e.to_string(),
        })?;
        let id = child.id().unwrap_or(0);
        debug!(pid = id, command = %line, "Spawned process");

        let (tx, rx) = mpsc::unbounded_channel();
        let announced = Arc::new(AtomicBool::new(false));
        let notifier = self
            .options
            .detect_server_ready
            .then(|| self.server_ready.clone());

        if let Some(stdout) = child.stdout.take() {
            tokio::spawn(forward_lines(
                stdout,
                OutputStream::Stdout,
                tx.clone(),
                notifier.clone(),
                announced.clone(),
            ));
        }
        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(forward_lines(
                stderr,
                OutputStream::Stderr,
                tx,
                notifier,
                announced,
            ));
        }

        Ok(Box::new(LocalProcess {
            id,
            command_line: line,
            child,
            output: Some(rx),
        }))
    }

    fn subscribe_server_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.server_ready.subscribe()
    }
}

/// Read a pipe line by line and forward each line as it arrives.
async fn forward_lines<R>(
    reader: R,
    stream: OutputStream,
    tx: mpsc::UnboundedSender<OutputLine>,
    notifier: Option<broadcast::Sender<ServerReady>>,
    announced: Arc<AtomicBool>,
) where
    R: AsyncRead + Unpin,
{
    let mut lines = BufReader::new(reader).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(text)) => {
                if let Some(notifier) = &notifier {
                    if !announced.load(Ordering::SeqCst) {
                        if let Some(ready) = detect_server_url(&text) {
                            announced.store(true, Ordering::SeqCst);
                            info!("Server ready at {}", ready.url);
                            let _ = notifier.send(ready);
                        }
                    }
                }
                let line = match stream {
                    OutputStream::Stdout => OutputLine::stdout(text),
                    OutputStream::Stderr => OutputLine::stderr(text),
                };
                // Receiver dropped means nobody is listening any more.
                if tx.send(line).is_err() {
                    break;
                }
            }
            Ok(None) => break,
            Err(e) => {
                warn!("Failed to read {} from process: {}", stream, e);
                break;
            }
        }
    }
}

/// A host process spawned by [`LocalSandbox`].
pub struct LocalProcess {
    id: u32,
    command_line: String,
    child: Child,
    output: Option<OutputReceiver>,
}

#[async_trait]
impl SandboxProcess for LocalProcess {
    fn id(&self) -> u32 {
        self.id
    }

    fn command_line(&self) -> &str {
        &self.command_line
    }

    fn take_output(&mut self) -> Option<OutputReceiver> {
        self.output.take()
    }

    async fn wait(&mut self) -> SandboxResult<i32> {
        let status = self.child.wait().await?;
        Ok(status.code().unwrap_or(-1))
    }

    fn try_exit_code(&mut self) -> SandboxResult<Option<i32>> {
        Ok(self.child.try_wait()?.map(|status| status.code().unwrap_or(-1)))
    }

    async fn kill(&mut self) -> SandboxResult<()> {
        if self.child.try_wait()?.is_some() {
            return Ok(());
        }
        self.child
            .kill()
            .await
            .map_err(|e| SandboxError::Process(format!("failed to kill `{}`: {}", self.command_line, e)))
    }
}
