//! Mock sandbox for testing.
//!
//! Provides an in-memory implementation of the [`Sandbox`] trait with
//! scripted process responses, so executor and boot logic can be tested
//! without a real filesystem or real processes.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::RwLock;
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;

use crate::error::{SandboxError, SandboxResult};
use crate::sandbox::{
    command_line, detect_server_url, OutputLine, OutputReceiver, Sandbox, SandboxProcess,
    ServerReady,
};
use crate::tree::{clean_path, FileTree};

/// Exit code reported for a killed mock process.
pub const KILLED_EXIT_CODE: i32 = 137;

/// Predefined response for a spawned command.
#[derive(Debug, Clone)]
pub struct MockResponse {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
    pub delay_ms: u64,
    /// Process never exits on its own (dev servers)
    pub long_running: bool,
    /// Files written into the sandbox when the process exits successfully
    pub creates: Vec<String>,
    /// Make `spawn` itself fail with this message
    pub spawn_error: Option<String>,
}

impl MockResponse {
    pub fn success(stdout: impl Into<String>) -> Self {
        Self {
            exit_code: 0,
            stdout: stdout.into(),
            stderr: String::new(),
            delay_ms: 0,
            long_running: false,
            creates: Vec::new(),
            spawn_error: None,
        }
    }

    pub fn failure(exit_code: i32, stderr: impl Into<String>) -> Self {
        Self {
            exit_code,
            stderr: stderr.into(),
            ..Self::success("")
        }
    }

    /// A process that runs until killed, such as a dev server.
    pub fn long_running(stdout: impl Into<String>) -> Self {
        Self {
            long_running: true,
            ..Self::success(stdout)
        }
    }

    pub fn spawn_error(message: impl Into<String>) -> Self {
        Self {
            spawn_error: Some(message.into()),
            ..Self::success("")
        }
    }

    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Create `path` (empty) in the sandbox once the process exits with 0.
    pub fn creates(mut self, path: impl Into<String>) -> Self {
        self.creates.push(path.into());
        self
    }
}

/// Captured call information for verification.
#[derive(Debug, Clone)]
pub struct CapturedCall {
    pub method: String,
    pub path: Option<String>,
    pub command: Option<String>,
}

/// Process lifecycle event, recorded in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MockEvent {
    Spawned(String),
    Exited { command: String, code: i32 },
    Killed(String),
}

#[derive(Default)]
struct MockState {
    files: BTreeMap<String, String>,
    dirs: BTreeSet<String>,
    responses: HashMap<String, VecDeque<MockResponse>>,
    calls: Vec<CapturedCall>,
    events: Vec<MockEvent>,
    simulate_failure: Option<String>,
}

/// Mock sandbox for testing.
///
/// Commands are matched against scripted responses by full command line
/// first, then by program name. When several responses are queued for a
/// command they are consumed in order and the last one repeats. Unscripted
/// commands succeed with no output.
#[derive(Clone)]
pub struct MockSandbox {
    state: Arc<RwLock<MockState>>,
    next_pid: Arc<AtomicU32>,
    server_ready: broadcast::Sender<ServerReady>,
}

impl Default for MockSandbox {
    fn default() -> Self {
        Self::new()
    }
}

impl MockSandbox {
    /// Create a new mock sandbox.
    pub fn new() -> Self {
        let (server_ready, _) = broadcast::channel(16);
        Self {
            state: Arc::new(RwLock::new(MockState::default())),
            next_pid: Arc::new(AtomicU32::new(1)),
            server_ready,
        }
    }

    /// Queue a response for a command line (or bare program name).
    pub fn on_command(self, command: impl Into<String>, response: MockResponse) -> Self {
        self.state
            .write()
            .responses
            .entry(command.into())
            .or_default()
            .push_back(response);
        self
    }

    /// Seed a file.
    pub fn with_file(self, path: &str, contents: impl Into<String>) -> Self {
        self.state.write().files.insert(clean_path(path), contents.into());
        self
    }

    /// Seed an empty directory.
    pub fn with_dir(self, path: &str) -> Self {
        self.state.write().dirs.insert(clean_path(path));
        self
    }

    /// Make every filesystem operation fail with this message.
    pub fn simulate_failure(self, message: impl Into<String>) -> Self {
        self.state.write().simulate_failure = Some(message.into());
        self
    }

    /// Current contents of a file.
    pub fn file(&self, path: &str) -> Option<String> {
        self.state.read().files.get(&clean_path(path)).cloned()
    }

    /// All files currently in the sandbox.
    pub fn files(&self) -> BTreeMap<String, String> {
        self.state.read().files.clone()
    }

    /// Get all captured calls.
    pub fn get_calls(&self) -> Vec<CapturedCall> {
        self.state.read().calls.clone()
    }

    /// Get calls to a specific method.
    pub fn get_method_calls(&self, method: &str) -> Vec<CapturedCall> {
        self.state
            .read()
            .calls
            .iter()
            .filter(|c| c.method == method)
            .cloned()
            .collect()
    }

    /// Command lines passed to `spawn`, in order.
    pub fn spawned_commands(&self) -> Vec<String> {
        self.get_method_calls("spawn")
            .into_iter()
            .filter_map(|c| c.command)
            .collect()
    }

    /// Number of times a command line was spawned.
    pub fn spawn_count(&self, command: &str) -> usize {
        self.spawned_commands().iter().filter(|c| *c == command).count()
    }

    /// Process lifecycle events, in the order they happened.
    pub fn events(&self) -> Vec<MockEvent> {
        self.state.read().events.clone()
    }

    fn record_call(&self, method: &str, path: Option<&str>, command: Option<&str>) {
        self.state.write().calls.push(CapturedCall {
            method: method.to_string(),
            path: path.map(|p| p.to_string()),
            command: command.map(|c| c.to_string()),
        });
    }

    fn record_event(&self, event: MockEvent) {
        self.state.write().events.push(event);
    }

    fn check_failure(&self) -> SandboxResult<()> {
        if let Some(msg) = self.state.read().simulate_failure.clone() {
            return Err(SandboxError::Unavailable(msg));
        }
        Ok(())
    }

    fn next_response(&self, line: &str, program: &str) -> MockResponse {
        let mut state = self.state.write();
        for key in [line, program] {
            if let Some(queue) = state.responses.get_mut(key) {
                if queue.len() > 1 {
                    if let Some(response) = queue.pop_front() {
                        return response;
                    }
                }
                if let Some(response) = queue.front() {
                    return response.clone();
                }
            }
        }
        MockResponse::success("")
    }

    fn insert_file(&self, path: &str, contents: &str) {
        let path = clean_path(path);
        let mut state = self.state.write();
        let mut current = path.as_str();
        while let Some((parent, _)) = current.rsplit_once('/') {
            state.dirs.insert(parent.to_string());
            current = parent;
        }
        state.files.insert(path, contents.to_string());
    }
}

#[async_trait]
impl Sandbox for MockSandbox {
    async fn mount(&self, tree: &FileTree) -> SandboxResult<()> {
        self.record_call("mount", None, None);
        self.check_failure()?;
        for (path, contents) in tree.files() {
            self.insert_file(path, contents);
        }
        Ok(())
    }

    async fn write_file(&self, path: &str, contents: &str) -> SandboxResult<()> {
        self.record_call("write_file", Some(path), None);
        self.check_failure()?;
        self.insert_file(path, contents);
        Ok(())
    }

    async fn read_file(&self, path: &str) -> SandboxResult<String> {
        self.record_call("read_file", Some(path), None);
        self.check_failure()?;
        self.file(path)
            .ok_or_else(|| SandboxError::NotFound(path.to_string()))
    }

    async fn mkdir(&self, path: &str, recursive: bool) -> SandboxResult<()> {
        self.record_call("mkdir", Some(path), None);
        self.check_failure()?;
        let path = clean_path(path);
        let mut state = self.state.write();
        if !recursive && state.dirs.contains(&path) {
            return Err(SandboxError::AlreadyExists(path));
        }
        let mut current = path.as_str();
        state.dirs.insert(current.to_string());
        if recursive {
            while let Some((parent, _)) = current.rsplit_once('/') {
                state.dirs.insert(parent.to_string());
                current = parent;
            }
        }
        Ok(())
    }

    async fn read_dir(&self, path: &str) -> SandboxResult<Vec<String>> {
        self.record_call("read_dir", Some(path), None);
        self.check_failure()?;
        let path = clean_path(path);
        let prefix = format!("{}/", path);
        let state = self.state.read();

        let mut names = BTreeSet::new();
        for entry in state.files.keys().chain(state.dirs.iter()) {
            if let Some(rest) = entry.strip_prefix(&prefix) {
                if let Some(name) = rest.split('/').next() {
                    names.insert(name.to_string());
                }
            }
        }

        if names.is_empty() && !state.dirs.contains(&path) {
            return Err(SandboxError::NotFound(path));
        }
        Ok(names.into_iter().collect())
    }

    async fn spawn(&self, program: &str, args: &[String]) -> SandboxResult<Box<dyn SandboxProcess>> {
        let line = command_line(program, args);
        self.record_call("spawn", None, Some(&line));

        let response = self.next_response(&line, program);
        if let Some(message) = response.spawn_error.clone() {
            return Err(SandboxError::SpawnFailed {
                command: line,
                message,
            });
        }
        self.record_event(MockEvent::Spawned(line.clone()));

        let (tx, rx) = mpsc::unbounded_channel();
        for text in response.stdout.lines() {
            if response.long_running {
                if let Some(ready) = detect_server_url(text) {
                    let _ = self.server_ready.send(ready);
                }
            }
            let _ = tx.send(OutputLine::stdout(text));
        }
        for text in response.stderr.lines() {
            let _ = tx.send(OutputLine::stderr(text));
        }

        Ok(Box::new(MockProcess {
            id: self.next_pid.fetch_add(1, Ordering::SeqCst),
            command_line: line,
            response,
            output: Some(rx),
            kill: CancellationToken::new(),
            exit_code: None,
            sandbox: self.clone(),
        }))
    }

    fn subscribe_server_ready(&self) -> broadcast::Receiver<ServerReady> {
        self.server_ready.subscribe()
    }
}

/// Process spawned by [`MockSandbox`].
struct MockProcess {
    id: u32,
    command_line: String,
    response: MockResponse,
    output: Option<OutputReceiver>,
    kill: CancellationToken,
    exit_code: Option<i32>,
    sandbox: MockSandbox,
}

impl MockProcess {
    fn finish(&mut self) -> i32 {
        let code = self.response.exit_code;
        if code == 0 {
            for path in &self.response.creates {
                self.sandbox.insert_file(path, "");
            }
        }
        self.sandbox.record_event(MockEvent::Exited {
            command: self.command_line.clone(),
            code,
        });
        self.exit_code = Some(code);
        code
    }

    fn mark_killed(&mut self) -> i32 {
        if self.exit_code.is_none() {
            self.sandbox
                .record_event(MockEvent::Killed(self.command_line.clone()));
            self.exit_code = Some(KILLED_EXIT_CODE);
        }
        KILLED_EXIT_CODE
    }
}

#[async_trait]
impl SandboxProcess for MockProcess {
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
        if let Some(code) = self.exit_code {
            return Ok(code);
        }

        let kill = self.kill.clone();
        if self.response.long_running {
            kill.cancelled().await;
            return Ok(self.mark_killed());
        }

        let delay = Duration::from_millis(self.response.delay_ms);
        tokio::select! {
            _ = tokio::time::sleep(delay) => Ok(self.finish()),
            _ = kill.cancelled() => Ok(self.mark_killed()),
        }
    }

    fn try_exit_code(&mut self) -> SandboxResult<Option<i32>> {
        Ok(self.exit_code)
    }

    async fn kill(&mut self) -> SandboxResult<()> {
        self.kill.cancel();
        self.mark_killed();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_sandbox_scripted_responses() {
        let sandbox = MockSandbox::new()
            .on_command("npm install", MockResponse::failure(1, "npm ERR! ERESOLVE"))
            .on_command("npm install", MockResponse::success("added 10 packages"));

        let mut first = sandbox.spawn("npm", &["install".to_string()]).await.unwrap();
        assert_eq!(first.wait().await.unwrap(), 1);

        let mut second = sandbox.spawn("npm", &["install".to_string()]).await.unwrap();
        let mut output = second.take_output().unwrap();
        assert_eq!(second.wait().await.unwrap(), 0);
        assert_eq!(output.recv().await.unwrap().text, "added 10 packages");

        // The last scripted response repeats.
        let mut third = sandbox.spawn("npm", &["install".to_string()]).await.unwrap();
        assert_eq!(third.wait().await.unwrap(), 0);
        assert_eq!(sandbox.spawn_count("npm install"), 3);
    }

    #[tokio::test]
    async fn test_mock_sandbox_unscripted_command_succeeds() {
        let sandbox = MockSandbox::new();
        let mut process = sandbox.spawn("npx", &["tsc".to_string()]).await.unwrap();
        assert_eq!(process.wait().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_mock_sandbox_creates_files_on_success() {
        let sandbox = MockSandbox::new().on_command(
            "npm install",
            MockResponse::success("").creates("node_modules/.package-lock.json"),
        );

        assert!(!sandbox.dir_exists("node_modules").await.unwrap());
        let mut process = sandbox.spawn("npm", &["install".to_string()]).await.unwrap();
        process.wait().await.unwrap();
        assert!(sandbox.dir_exists("node_modules").await.unwrap());
    }

    #[tokio::test]
    async fn test_mock_sandbox_long_running_until_killed() {
        let sandbox = MockSandbox::new().on_command(
            "npm run dev",
            MockResponse::long_running("Local: http://localhost:5173/"),
        );
        let mut ready = sandbox.subscribe_server_ready();

        let mut process = sandbox
            .spawn("npm", &["run".to_string(), "dev".to_string()])
            .await
            .unwrap();
        assert_eq!(ready.recv().await.unwrap().port, 5173);
        assert_eq!(process.try_exit_code().unwrap(), None);

        process.kill().await.unwrap();
        assert_eq!(process.wait().await.unwrap(), KILLED_EXIT_CODE);
        assert_eq!(
            sandbox.events(),
            vec![
                MockEvent::Spawned("npm run dev".to_string()),
                MockEvent::Killed("npm run dev".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_mock_sandbox_filesystem() {
        let sandbox = MockSandbox::new().with_file("package.json", "{}");

        sandbox.mkdir("src/components", true).await.unwrap();
        sandbox.write_file("src/App.tsx", "app").await.unwrap();

        assert_eq!(sandbox.read_file("src/App.tsx").await.unwrap(), "app");
        assert_eq!(
            sandbox.read_dir("src").await.unwrap(),
            vec!["App.tsx".to_string(), "components".to_string()]
        );
        assert!(sandbox.mkdir("src", false).await.unwrap_err().is_already_exists());
        assert!(sandbox.read_dir("dist").await.unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn test_mock_sandbox_failure_simulation() {
        let sandbox = MockSandbox::new().simulate_failure("sandbox crashed");
        let result = sandbox.write_file("a.txt", "x").await;
        assert!(matches!(result, Err(SandboxError::Unavailable(_))));
    }
}
