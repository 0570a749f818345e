//! FIFO action executor.
//!
//! One executor owns one sandbox. Actions are appended to a queue and run
//! strictly one after another by a single worker task. Callers never see
//! action failures as errors from [`ActionExecutor::enqueue`]; they are
//! recorded on the [`ActionRecord`] and broadcast as a [`StatusChange`].

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use forge_sandbox::{clean_path, parent_dir, FileTree, OutputLine, OutputReceiver, Sandbox, SandboxProcess};
use forge_stream::{ActionKind, BuildAction};
use parking_lot::{Mutex, RwLock};
use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, trace, warn};

use crate::config::ExecutorConfig;
use crate::error::{CoreError, CoreResult};
use crate::guards::ContentGuards;

/// Identifier assigned at enqueue time, increasing from 1.
pub type ActionId = u64;

/// Receives every output line of every process the executor runs.
pub type OutputSink = Arc<dyn Fn(ActionId, &OutputLine) + Send + Sync>;

/// Lines of output kept for failure messages.
const OUTPUT_TAIL_LINES: usize = 20;

/// How long to wait for a finished process's output to drain.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Lifecycle of an action. Terminal states are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionStatus {
    Pending,
    Running,
    Complete,
    Failed,
    Aborted,
}

impl ActionStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete | Self::Failed | Self::Aborted)
    }
}

impl std::fmt::Display for ActionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Complete => write!(f, "complete"),
            Self::Failed => write!(f, "failed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// Executor-side bookkeeping for one action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActionRecord {
    pub id: ActionId,
    pub action: BuildAction,
    pub description: String,
    pub status: ActionStatus,
    /// Set only when the action failed
    pub error: Option<String>,
    pub exit_code: Option<i32>,
    /// For an install run on behalf of a dev server start, that action's id
    pub prerequisite_of: Option<ActionId>,
    pub queued_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl ActionRecord {
    fn new(id: ActionId, action: BuildAction) -> Self {
        Self {
            id,
            description: action.description(),
            action,
            status: ActionStatus::Pending,
            error: None,
            exit_code: None,
            prerequisite_of: None,
            queued_at: Utc::now(),
            started_at: None,
            finished_at: None,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.status == ActionStatus::Complete
    }
}

/// Broadcast whenever an action changes status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub id: ActionId,
    pub status: ActionStatus,
    pub error: Option<String>,
}

#[derive(Debug, Clone)]
enum Outcome {
    Complete(Option<i32>),
    Failed {
        message: String,
        exit_code: Option<i32>,
    },
    Aborted(String),
}

impl Outcome {
    fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
            exit_code: None,
        }
    }
}

enum Signal {
    Exited(forge_sandbox::SandboxResult<i32>),
    TimedOut,
    Aborted,
}

struct Job {
    id: ActionId,
    action: BuildAction,
    cancel: CancellationToken,
}

struct DevServer {
    action_id: ActionId,
    command: String,
    process: Box<dyn SandboxProcess>,
}

struct ExecutorInner {
    sandbox: Arc<dyn Sandbox>,
    config: ExecutorConfig,
    guards: ContentGuards,
    records: Mutex<HashMap<ActionId, ActionRecord>>,
    tokens: Mutex<HashMap<ActionId, CancellationToken>>,
    next_id: AtomicU64,
    critical_failure: AtomicBool,
    disposed: AtomicBool,
    status_tx: broadcast::Sender<StatusChange>,
    outstanding: watch::Sender<usize>,
    dev_server: Mutex<Option<DevServer>>,
    output_sink: RwLock<Option<OutputSink>>,
}

/// Handle to an executor. Clones share the same queue and sandbox.
#[derive(Clone)]
pub struct ActionExecutor {
    inner: Arc<ExecutorInner>,
    queue: mpsc::UnboundedSender<Job>,
}

impl ActionExecutor {
    /// Create an executor and start its worker. Requires a Tokio runtime.
    pub fn new(sandbox: Arc<dyn Sandbox>, config: ExecutorConfig) -> Self {
        let (queue, jobs) = mpsc::unbounded_channel();
        let (status_tx, _) = broadcast::channel(256);
        let (outstanding, _) = watch::channel(0usize);

        let inner = Arc::new(ExecutorInner {
            sandbox,
            guards: ContentGuards::from_config(&config),
            config,
            records: Mutex::new(HashMap::new()),
            tokens: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            critical_failure: AtomicBool::new(false),
            disposed: AtomicBool::new(false),
            status_tx,
            outstanding,
            dev_server: Mutex::new(None),
            output_sink: RwLock::new(None),
        });

        tokio::spawn(run_worker(inner.clone(), jobs));
        Self { inner, queue }
    }

    pub fn with_output_sink(
        self,
        sink: impl Fn(ActionId, &OutputLine) + Send + Sync + 'static,
    ) -> Self {
        self.set_output_sink(sink);
        self
    }

    /// Route process output to `sink`. Applies to processes started afterwards.
    pub fn set_output_sink(&self, sink: impl Fn(ActionId, &OutputLine) + Send + Sync + 'static) {
        *self.inner.output_sink.write() = Some(Arc::new(sink));
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.inner.config
    }

    pub fn sandbox(&self) -> Arc<dyn Sandbox> {
        self.inner.sandbox.clone()
    }

    /// Append an action to the queue. Returns `None` once the executor has
    /// been cleaned up.
    pub fn enqueue(&self, action: BuildAction) -> Option<ActionId> {
        if self.is_disposed() {
            warn!(action = %action.description(), "Executor disposed; ignoring action");
            return None;
        }

        let id = self.inner.next_id();
        let cancel = CancellationToken::new();
        debug!(action_id = id, action = %action.description(), "Queued action");

        self.inner
            .records
            .lock()
            .insert(id, ActionRecord::new(id, action.clone()));
        self.inner.tokens.lock().insert(id, cancel.clone());
        self.inner.outstanding.send_modify(|n| *n += 1);

        if self.queue.send(Job { id, action, cancel }).is_err() {
            warn!(action_id = id, "Action worker is gone; dropping action");
            self.inner.outstanding.send_modify(|n| *n = n.saturating_sub(1));
            self.inner.tokens.lock().remove(&id);
            self.inner.set_status(id, ActionStatus::Aborted, None, None);
            return Some(id);
        }

        self.inner.emit(StatusChange {
            id,
            status: ActionStatus::Pending,
            error: None,
        });
        Some(id)
    }

    /// Enqueue and wait for the action to finish.
    pub async fn execute(&self, action: BuildAction) -> CoreResult<ActionRecord> {
        let id = self.enqueue(action).ok_or(CoreError::Disposed)?;
        self.wait_for(id).await
    }

    pub fn status(&self, id: ActionId) -> Option<ActionStatus> {
        self.inner.records.lock().get(&id).map(|r| r.status)
    }

    pub fn record(&self, id: ActionId) -> Option<ActionRecord> {
        self.inner.records.lock().get(&id).cloned()
    }

    /// All records, ordered by id.
    pub fn records(&self) -> Vec<ActionRecord> {
        let mut records: Vec<_> = self.inner.records.lock().values().cloned().collect();
        records.sort_by_key(|r| r.id);
        records
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StatusChange> {
        self.inner.status_tx.subscribe()
    }

    /// Wait until the action reaches a terminal state.
    pub async fn wait_for(&self, id: ActionId) -> CoreResult<ActionRecord> {
        let mut changes = self.subscribe();
        loop {
            match self.record(id) {
                None => return Err(CoreError::ActionNotFound(id)),
                Some(record) if record.status.is_terminal() => return Ok(record),
                Some(_) => {}
            }
            match changes.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => return Err(CoreError::Disposed),
            }
        }
    }

    /// Wait until every queued action has been processed.
    pub async fn wait_idle(&self) {
        let mut outstanding = self.inner.outstanding.subscribe();
        let idle = outstanding.wait_for(|n| *n == 0).await.is_ok();
        if !idle {
            warn!("Outstanding action counter closed");
        }
    }

    /// Cancel one action. Pending actions are skipped, running ones killed.
    /// Aborting the action that started the tracked dev server stops it.
    pub fn abort(&self, id: ActionId) -> bool {
        let mut signalled = false;
        if let Some(token) = self.inner.tokens.lock().get(&id) {
            token.cancel();
            signalled = true;
        }
        if self.inner.claim_pending(id, ActionStatus::Aborted) {
            info!(action_id = id, "Action aborted before start");
            self.inner.set_status(id, ActionStatus::Aborted, None, None);
        }

        let server = {
            let mut guard = self.inner.dev_server.lock();
            if guard.as_ref().map_or(false, |s| s.action_id == id) {
                guard.take()
            } else {
                None
            }
        };
        if let Some(mut server) = server {
            signalled = true;
            info!(action_id = id, command = %server.command, "Stopping dev server");
            tokio::spawn(async move {
                if let Err(e) = server.process.kill().await {
                    warn!("Failed to stop dev server: {}", e);
                }
            });
        }

        if signalled {
            debug!(action_id = id, "Abort requested");
        }
        signalled
    }

    /// Cancel every queued and running action. The dev server keeps running.
    pub fn abort_all(&self) {
        let tokens = self.inner.tokens.lock();
        debug!(count = tokens.len(), "Aborting all actions");
        for token in tokens.values() {
            token.cancel();
        }
    }

    /// Abort everything, stop the dev server and drop all bookkeeping.
    /// Later calls to `enqueue` are rejected.
    pub async fn cleanup(&self) {
        if self.inner.disposed.swap(true, Ordering::SeqCst) {
            debug!("Executor already cleaned up");
            return;
        }
        info!("Cleaning up action executor");
        self.abort_all();
        self.stop_dev_server().await;
        self.inner.tokens.lock().clear();
        self.inner.records.lock().clear();
    }

    pub fn is_disposed(&self) -> bool {
        self.inner.disposed.load(Ordering::SeqCst)
    }

    pub fn has_critical_failure(&self) -> bool {
        self.inner.critical_failure.load(Ordering::SeqCst)
    }

    /// Re-open the queue after a failed install, before retrying it.
    pub fn clear_critical_failure(&self) {
        if self.inner.critical_failure.swap(false, Ordering::SeqCst) {
            info!("Critical failure cleared");
        }
    }

    /// Mount a project once the queue has drained.
    pub async fn mount(&self, tree: &FileTree) -> CoreResult<()> {
        if self.is_disposed() {
            return Err(CoreError::Disposed);
        }
        self.wait_idle().await;
        info!(files = tree.len(), "Mounting project");
        self.inner.sandbox.mount(tree).await?;
        Ok(())
    }

    pub fn dev_server_running(&self) -> bool {
        self.inner.dev_server_running()
    }

    /// Kill the tracked dev server. Returns whether one was tracked.
    pub async fn stop_dev_server(&self) -> bool {
        let server = self.inner.dev_server.lock().take();
        match server {
            Some(mut server) => {
                info!(command = %server.command, "Stopping dev server");
                if let Err(e) = server.process.kill().await {
                    warn!("Failed to stop dev server: {}", e);
                }
                true
            }
            None => false,
        }
    }
}

async fn run_worker(inner: Arc<ExecutorInner>, mut jobs: mpsc::UnboundedReceiver<Job>) {
    debug!("Action worker started");
    while let Some(job) = jobs.recv().await {
        inner.process(job).await;
        inner.outstanding.send_modify(|n| *n = n.saturating_sub(1));
    }
    debug!("Action worker stopped");
}

impl ExecutorInner {
    fn next_id(&self) -> ActionId {
        self.next_id.fetch_add(1, Ordering::SeqCst) + 1
    }

    fn emit(&self, change: StatusChange) {
        // No subscribers is fine.
        let _ = self.status_tx.send(change);
    }

    fn set_status(
        &self,
        id: ActionId,
        status: ActionStatus,
        error: Option<String>,
        exit_code: Option<i32>,
    ) {
        if let Some(record) = self.records.lock().get_mut(&id) {
            record.status = status;
            record.error = error.clone();
            record.exit_code = exit_code.or(record.exit_code);
            let now = Utc::now();
            if status == ActionStatus::Running {
                record.started_at = Some(now);
            }
            if status.is_terminal() {
                record.finished_at = Some(now);
            }
        }
        self.emit(StatusChange { id, status, error });
    }

    /// Move a record out of `Pending`. Only the first caller wins.
    fn claim_pending(&self, id: ActionId, status: ActionStatus) -> bool {
        match self.records.lock().get_mut(&id) {
            Some(record) if record.status == ActionStatus::Pending => {
                record.status = status;
                true
            }
            _ => false,
        }
    }

    async fn process(&self, job: Job) {
        let Job { id, action, cancel } = job;
        let description = action.description();

        let skip = if self.disposed.load(Ordering::SeqCst) {
            Some("executor disposed")
        } else if cancel.is_cancelled() {
            Some("aborted before start")
        } else if self.critical_failure.load(Ordering::SeqCst) {
            Some("skipped after critical failure")
        } else {
            None
        };

        if let Some(reason) = skip {
            if self.claim_pending(id, ActionStatus::Aborted) {
                self.finish(id, &action, Outcome::Aborted(reason.to_string()));
            }
            self.tokens.lock().remove(&id);
            return;
        }

        if !self.claim_pending(id, ActionStatus::Running) {
            debug!(action_id = id, "Action already settled; not running it");
            self.tokens.lock().remove(&id);
            return;
        }
        self.set_status(id, ActionStatus::Running, None, None);
        info!(action_id = id, "{}", description);
        let outcome = match &action.kind {
            ActionKind::File { path, content } => self.write_file(path, content, &cancel).await,
            ActionKind::Shell { command } => self.run_shell(id, command, &cancel).await,
        };

        self.finish(id, &action, outcome);
        self.tokens.lock().remove(&id);
    }

    fn finish(&self, id: ActionId, action: &BuildAction, outcome: Outcome) {
        match outcome {
            Outcome::Complete(exit_code) => {
                debug!(action_id = id, "Action complete");
                self.set_status(id, ActionStatus::Complete, None, exit_code);
            }
            Outcome::Failed { message, exit_code } => {
                let install = matches!(
                    &action.kind,
                    ActionKind::Shell { command } if self.config.is_install(command)
                );
                if install {
                    self.critical_failure.store(true, Ordering::SeqCst);
                    error!(
                        action_id = id,
                        "Dependency install failed; skipping remaining actions: {}", message
                    );
                } else {
                    warn!(action_id = id, "Action failed: {}", message);
                }
                self.set_status(id, ActionStatus::Failed, Some(message), exit_code);
            }
            Outcome::Aborted(reason) => {
                info!(action_id = id, reason = %reason, "Action aborted");
                self.set_status(id, ActionStatus::Aborted, None, None);
            }
        }
    }

    async fn write_file(&self, path: &str, content: &str, cancel: &CancellationToken) -> Outcome {
        let path = normalize_action_path(path);
        if path.is_empty() {
            return Outcome::failed("File action has an empty path");
        }

        if let Some(parent) = parent_dir(&path) {
            if let Err(e) = self.sandbox.mkdir(parent, true).await {
                if !e.is_already_exists() {
                    return Outcome::failed(format!("Failed to create {}: {}", parent, e));
                }
            }
        }
        if cancel.is_cancelled() {
            return Outcome::Aborted("aborted while running".to_string());
        }

        let guarded = self.guards.apply(&path, content);
        match self.sandbox.write_file(&path, &guarded.content).await {
            Ok(()) => {
                debug!(path = %path, bytes = guarded.content.len(), "Wrote file");
                Outcome::Complete(None)
            }
            Err(e) => Outcome::failed(format!("Failed to write {}: {}", path, e)),
        }
    }

    async fn run_shell(&self, id: ActionId, command: &str, cancel: &CancellationToken) -> Outcome {
        let mut parts = command.split_whitespace();
        let Some(program) = parts.next() else {
            return Outcome::failed("Shell action has an empty command");
        };
        let args: Vec<String> = parts.map(str::to_string).collect();

        if self.config.is_dev_server(command) {
            return self.start_dev_server(id, command, program, &args, cancel).await;
        }

        let limit = self.config.timeout_for(command);
        self.run_to_exit(id, command, program, &args, limit, cancel).await
    }

    async fn run_to_exit(
        &self,
        id: ActionId,
        command: &str,
        program: &str,
        args: &[String],
        limit: Duration,
        cancel: &CancellationToken,
    ) -> Outcome {
        let mut process = match self.sandbox.spawn(program, args).await {
            Ok(process) => process,
            Err(e) => return Outcome::failed(format!("Failed to start `{}`: {}", command, e)),
        };
        let tail = Arc::new(Mutex::new(VecDeque::with_capacity(OUTPUT_TAIL_LINES)));
        let pump = self.pump_output(id, process.take_output(), Some(tail.clone()));

        let signal = tokio::select! {
            result = process.wait() => Signal::Exited(result),
            _ = tokio::time::sleep(limit) => Signal::TimedOut,
            _ = cancel.cancelled() => Signal::Aborted,
        };

        let outcome = match signal {
            Signal::Exited(Ok(0)) => Outcome::Complete(Some(0)),
            Signal::Exited(Ok(code)) => Outcome::Failed {
                message: format!("`{}` exited with code {}", command, code),
                exit_code: Some(code),
            },
            Signal::Exited(Err(e)) => Outcome::failed(format!("`{}` failed: {}", command, e)),
            Signal::TimedOut => {
                warn!(action_id = id, "`{}` exceeded {}s; killing it", command, limit.as_secs());
                if let Err(e) = process.kill().await {
                    warn!("Failed to kill `{}`: {}", command, e);
                }
                Outcome::failed(format!("`{}` timed out after {}s", command, limit.as_secs()))
            }
            Signal::Aborted => {
                if let Err(e) = process.kill().await {
                    warn!("Failed to kill `{}`: {}", command, e);
                }
                Outcome::Aborted("aborted while running".to_string())
            }
        };
        drop(process);

        if let Some(pump) = pump {
            if tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, pump).await.is_err() {
                trace!(action_id = id, "Output still open after exit");
            }
        }

        match outcome {
            Outcome::Failed { message, exit_code } => {
                let tail = tail.lock();
                let message = if tail.is_empty() {
                    message
                } else {
                    let lines: Vec<&str> = tail.iter().map(String::as_str).collect();
                    format!("{}\n{}", message, lines.join("\n"))
                };
                Outcome::Failed { message, exit_code }
            }
            other => other,
        }
    }

    async fn start_dev_server(
        &self,
        id: ActionId,
        command: &str,
        program: &str,
        args: &[String],
        cancel: &CancellationToken,
    ) -> Outcome {
        if self.dev_server_running() {
            info!(action_id = id, "Dev server already running; skipping `{}`", command);
            return Outcome::Complete(None);
        }

        let dependency_dir = &self.config.dependency_dir;
        match self.sandbox.dir_exists(dependency_dir).await {
            Ok(true) => {}
            Ok(false) => {
                info!("{} is missing; installing dependencies first", dependency_dir);
                match self.run_prerequisite_install(id, cancel).await {
                    Outcome::Complete(_) => {}
                    Outcome::Failed { message, exit_code } => {
                        return Outcome::Failed {
                            message: format!("Dependency install failed: {}", message),
                            exit_code,
                        };
                    }
                    aborted @ Outcome::Aborted(_) => return aborted,
                }
            }
            Err(e) => warn!("Could not check {}: {}", dependency_dir, e),
        }

        let limit = Duration::from_secs(self.config.timeouts.dev_server_seconds);
        let spawned = tokio::select! {
            biased;
            result = tokio::time::timeout(limit, self.sandbox.spawn(program, args)) => result,
            _ = cancel.cancelled() => {
                return Outcome::Aborted("aborted while starting dev server".to_string());
            }
        };
        let mut process = match spawned {
            Ok(Ok(process)) => process,
            Ok(Err(e)) => return Outcome::failed(format!("Failed to start `{}`: {}", command, e)),
            Err(_) => {
                return Outcome::failed(format!(
                    "`{}` did not start within {}s",
                    command,
                    limit.as_secs()
                ))
            }
        };

        // Cleanup may have run while the spawn was in flight.
        if cancel.is_cancelled() || self.disposed.load(Ordering::SeqCst) {
            if let Err(e) = process.kill().await {
                warn!("Failed to stop dev server started after abort: {}", e);
            }
            return Outcome::Aborted("aborted while starting dev server".to_string());
        }

        // Output keeps flowing for the life of the server.
        let _ = self.pump_output(id, process.take_output(), None);
        info!(action_id = id, pid = process.id(), "Dev server started: {}", command);
        *self.dev_server.lock() = Some(DevServer {
            action_id: id,
            command: command.to_string(),
            process,
        });
        Outcome::Complete(None)
    }

    /// Run the install command inline, recorded as its own action.
    async fn run_prerequisite_install(&self, parent: ActionId, cancel: &CancellationToken) -> Outcome {
        let command = self.config.install_command.clone();
        let action = BuildAction::shell(command.clone());
        let id = self.next_id();
        let mut record = ActionRecord::new(id, action.clone());
        record.prerequisite_of = Some(parent);
        self.records.lock().insert(id, record);
        self.set_status(id, ActionStatus::Running, None, None);

        let mut parts = command.split_whitespace();
        let outcome = match parts.next() {
            Some(program) => {
                let args: Vec<String> = parts.map(str::to_string).collect();
                let limit = self.config.timeout_for(&command);
                self.run_to_exit(id, &command, program, &args, limit, cancel)
                    .await
            }
            None => Outcome::failed("Install command is empty"),
        };

        self.finish(id, &action, outcome.clone());
        outcome
    }

    fn dev_server_running(&self) -> bool {
        let mut guard = self.dev_server.lock();
        match guard.as_mut() {
            None => return false,
            Some(server) => match server.process.try_exit_code() {
                Ok(None) => return true,
                Ok(Some(code)) => info!(command = %server.command, "Dev server exited with code {}", code),
                Err(e) => warn!("Could not poll dev server: {}", e),
            },
        }
        *guard = None;
        false
    }

    fn pump_output(
        &self,
        id: ActionId,
        output: Option<OutputReceiver>,
        tail: Option<Arc<Mutex<VecDeque<String>>>>,
    ) -> Option<JoinHandle<()>> {
        let mut output = output?;
        let sink = self.output_sink.read().clone();
        Some(tokio::spawn(async move {
            while let Some(line) = output.recv().await {
                trace!(action_id = id, stream = %line.stream, "{}", line.text);
                if let Some(sink) = &sink {
                    sink(id, &line);
                }
                if let Some(tail) = &tail {
                    let mut tail = tail.lock();
                    if tail.len() == OUTPUT_TAIL_LINES {
                        tail.pop_front();
                    }
                    tail.push_back(line.text);
                }
            }
        }))
    }
}

/// Clean a generated path and collapse duplicated `src/src` segments.
pub fn normalize_action_path(path: &str) -> String {
    let mut cleaned = clean_path(path);
    while let Some(rest) = cleaned.strip_prefix("src/src/") {
        cleaned = format!("src/{}", rest);
    }
    while cleaned.contains("/src/src/") {
        cleaned = cleaned.replace("/src/src/", "/src/");
    }
    cleaned
}
