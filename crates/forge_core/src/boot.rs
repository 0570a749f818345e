//! Boot sequence for a generated project: mount, install, serve.
//!
//! Every phase runs inside a checkpoint. When a phase fails, the failure is
//! classified and the strategist is asked for a fix:
//!
//! - no suggestion: the boot stops
//! - a suggestion that needs approval: the boot stops and the suggestion is
//!   kept for the caller
//! - a file patch: the fix is written into the sandbox and the boot moves on
//!   without re-running the phase
//! - a command retry: the alternate command runs and its exit status decides

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use forge_recovery::{
    apply_suggestion, classify, ErrorCategory, ErrorClassification, FixTarget,
    RecoveryStrategist, RecoverySuggestion,
};
use forge_sandbox::FileTree;
use forge_stream::BuildAction;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::RecoveryConfig;
use crate::executor::ActionExecutor;
use crate::guards::normalize_stylesheet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BootPhase {
    Mount,
    Install,
    Serve,
}

impl BootPhase {
    pub const ALL: [BootPhase; 3] = [BootPhase::Mount, BootPhase::Install, BootPhase::Serve];
}

impl std::fmt::Display for BootPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Mount => write!(f, "mount"),
            Self::Install => write!(f, "install"),
            Self::Serve => write!(f, "serve"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "state", content = "phase")]
pub enum BootState {
    Idle,
    Running(BootPhase),
    Ready,
    Failed(BootPhase),
}

impl Default for BootState {
    fn default() -> Self {
        Self::Idle
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepOutcome {
    Started,
    Succeeded,
    Failed,
    Recovered,
    NeedsApproval,
}

impl std::fmt::Display for StepOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Started => write!(f, "started"),
            Self::Succeeded => write!(f, "ok"),
            Self::Failed => write!(f, "failed"),
            Self::Recovered => write!(f, "recovered"),
            Self::NeedsApproval => write!(f, "needs approval"),
        }
    }
}

/// One line of the boot narrative.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootProgress {
    pub phase: BootPhase,
    pub outcome: StepOutcome,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Snapshot of the most recent boot.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BootReport {
    pub success: bool,
    pub attempt: u32,
    pub state: BootState,
    pub progress: Vec<BootProgress>,
    pub failure: Option<ErrorClassification>,
    pub pending_suggestion: Option<RecoverySuggestion>,
}

impl BootReport {
    /// Human-readable account of what happened, one line per step.
    pub fn narrative(&self) -> String {
        let mut lines: Vec<String> = self
            .progress
            .iter()
            .filter(|p| p.outcome != StepOutcome::Started)
            .map(|p| format!("[{}] {}: {}", p.phase, p.outcome, p.message))
            .collect();
        if let Some(suggestion) = &self.pending_suggestion {
            lines.push(format!("Pending fix: {}", suggestion.description));
        }
        lines.join("\n")
    }
}

pub struct BootOrchestrator {
    executor: ActionExecutor,
    strategist: RecoveryStrategist,
    files: BTreeMap<String, String>,
    attempts: u32,
    state: BootState,
    progress: Vec<BootProgress>,
    last_failure: Option<ErrorClassification>,
    pending_suggestion: Option<RecoverySuggestion>,
}

impl BootOrchestrator {
    pub fn new(executor: ActionExecutor, recovery: &RecoveryConfig) -> Self {
        let strategist = RecoveryStrategist::new(recovery.max_retries)
            .with_install_command(executor.config().install_command.clone());
        Self {
            executor,
            strategist,
            files: BTreeMap::new(),
            attempts: 0,
            state: BootState::Idle,
            progress: Vec::new(),
            last_failure: None,
            pending_suggestion: None,
        }
    }

    /// Run mount, install and serve. Returns whether the dev server is up.
    pub async fn run_boot_sequence(&mut self, tree: &FileTree) -> bool {
        self.attempts += 1;
        self.strategist.reset();
        self.executor.clear_critical_failure();
        self.progress.clear();
        self.last_failure = None;
        self.pending_suggestion = None;
        self.files = tree.files().clone();
        info!(attempt = self.attempts, files = tree.len(), "Starting boot sequence");

        for phase in BootPhase::ALL {
            self.state = BootState::Running(phase);
            if !self.checkpoint(phase, tree).await {
                self.state = BootState::Failed(phase);
                warn!(attempt = self.attempts, phase = %phase, "Boot failed");
                return false;
            }
        }

        self.state = BootState::Ready;
        info!(attempt = self.attempts, "Boot complete");
        true
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    pub fn progress(&self) -> &[BootProgress] {
        &self.progress
    }

    pub fn last_failure(&self) -> Option<&ErrorClassification> {
        self.last_failure.as_ref()
    }

    pub fn pending_suggestion(&self) -> Option<&RecoverySuggestion> {
        self.pending_suggestion.as_ref()
    }

    /// Hand the approval-gated suggestion to the caller.
    pub fn take_pending_suggestion(&mut self) -> Option<RecoverySuggestion> {
        self.pending_suggestion.take()
    }

    pub fn report(&self) -> BootReport {
        BootReport {
            success: self.state == BootState::Ready,
            attempt: self.attempts,
            state: self.state,
            progress: self.progress.clone(),
            failure: self.last_failure.clone(),
            pending_suggestion: self.pending_suggestion.clone(),
        }
    }

    async fn checkpoint(&mut self, phase: BootPhase, tree: &FileTree) -> bool {
        self.note(phase, StepOutcome::Started, phase_label(phase, &self.executor));

        let raw = match self.run_phase(phase, tree).await {
            Ok(()) => {
                self.note(phase, StepOutcome::Succeeded, phase_label(phase, &self.executor));
                return true;
            }
            Err(raw) => raw,
        };

        let classification = classify(&raw);
        self.note(phase, StepOutcome::Failed, describe_failure(&classification));
        let suggestion = self.strategist.suggest(&classification, &self.files);
        self.last_failure = Some(classification);

        let Some(suggestion) = suggestion else {
            self.note(phase, StepOutcome::Failed, "No automatic recovery available");
            return false;
        };
        if !suggestion.is_unattended() {
            self.note(phase, StepOutcome::NeedsApproval, suggestion.description.clone());
            self.pending_suggestion = Some(suggestion);
            return false;
        }

        self.recover(phase, suggestion).await
    }

    async fn run_phase(&self, phase: BootPhase, tree: &FileTree) -> Result<(), String> {
        match phase {
            BootPhase::Mount => self.executor.mount(tree).await.map_err(|e| e.to_string()),
            BootPhase::Install => {
                let command = self.executor.config().install_command.clone();
                self.run_command(&command).await
            }
            BootPhase::Serve => {
                let command = self.executor.config().serve_command().to_string();
                self.run_command(&command).await
            }
        }
    }

    async fn run_command(&self, command: &str) -> Result<(), String> {
        match self.executor.execute(BuildAction::shell(command)).await {
            Ok(record) if record.succeeded() => Ok(()),
            Ok(record) => Err(record
                .error
                .unwrap_or_else(|| format!("`{}` was {}", command, record.status))),
            Err(e) => Err(e.to_string()),
        }
    }

    async fn recover(&mut self, phase: BootPhase, suggestion: RecoverySuggestion) -> bool {
        let result = match suggestion.target {
            FixTarget::RetryWithFlags => match suggestion.alternate_command.as_deref() {
                Some(command) => {
                    self.executor.clear_critical_failure();
                    self.run_command(command).await
                }
                None => Err("retry suggestion has no command".to_string()),
            },
            _ if suggestion.is_patch() => self.patch_file(&suggestion).await,
            FixTarget::FixSyntax if suggestion.category == ErrorCategory::CssSyntax => {
                self.fix_stylesheet(&suggestion).await
            }
            _ => Err(format!("cannot apply `{}` automatically", suggestion.description)),
        };

        match result {
            Ok(()) => {
                // A patched file counts as recovered; let later phases run.
                self.executor.clear_critical_failure();
                let message = match suggestion.file.as_deref() {
                    Some(file) => format!("{} ({})", suggestion.description, file),
                    None => suggestion.description.clone(),
                };
                self.note(phase, StepOutcome::Recovered, message);
                true
            }
            Err(e) => {
                self.note(phase, StepOutcome::Failed, format!("Recovery failed: {}", e));
                false
            }
        }
    }

    async fn patch_file(&mut self, suggestion: &RecoverySuggestion) -> Result<(), String> {
        let file = suggestion
            .file
            .as_deref()
            .ok_or_else(|| "no file to patch".to_string())?;
        let content = self.current_content(file).await?;
        let fixed = apply_suggestion(suggestion, &content).map_err(|e| e.to_string())?;
        self.write_back(file, fixed).await
    }

    async fn fix_stylesheet(&mut self, suggestion: &RecoverySuggestion) -> Result<(), String> {
        let file = suggestion
            .file
            .as_deref()
            .ok_or_else(|| "no stylesheet to fix".to_string())?;
        let content = self.current_content(file).await?;
        match normalize_stylesheet(&content) {
            Some(fixed) => self.write_back(file, fixed).await,
            None => Err(format!("nothing to fix in {}", file)),
        }
    }

    /// Live sandbox contents, falling back to the mounted tree.
    async fn current_content(&self, file: &str) -> Result<String, String> {
        match self.executor.sandbox().read_file(file).await {
            Ok(content) => Ok(content),
            Err(e) => self
                .files
                .get(file)
                .cloned()
                .ok_or_else(|| format!("cannot read {}: {}", file, e)),
        }
    }

    async fn write_back(&mut self, file: &str, content: String) -> Result<(), String> {
        self.executor
            .sandbox()
            .write_file(file, &content)
            .await
            .map_err(|e| e.to_string())?;
        info!(file, "Wrote recovery fix into sandbox");
        self.files.insert(file.to_string(), content);
        Ok(())
    }

    fn note(&mut self, phase: BootPhase, outcome: StepOutcome, message: impl Into<String>) {
        let message = message.into();
        match outcome {
            StepOutcome::Failed | StepOutcome::NeedsApproval => {
                warn!(phase = %phase, outcome = %outcome, "{}", message)
            }
            _ => info!(phase = %phase, outcome = %outcome, "{}", message),
        }
        self.progress.push(BootProgress {
            phase,
            outcome,
            message,
            timestamp: Utc::now(),
        });
    }
}

fn phase_label(phase: BootPhase, executor: &ActionExecutor) -> String {
    match phase {
        BootPhase::Mount => "Mounting project files".to_string(),
        BootPhase::Install => format!("Running {}", executor.config().install_command),
        BootPhase::Serve => format!("Starting {}", executor.config().serve_command()),
    }
}

fn describe_failure(classification: &ErrorClassification) -> String {
    match classification.location() {
        Some(at) => format!("{} at {}", classification.category.label(), at),
        None => classification.category.label().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutorConfig;
    use forge_sandbox::{MockResponse, MockSandbox};
    use std::sync::Arc;

    const LOCKFILE: &str = "node_modules/.package-lock.json";

    fn project() -> FileTree {
        FileTree::new()
            .file("package.json", r#"{ "name": "demo", "scripts": { "dev": "vite" } }"#)
            .file("src/App.tsx", "export const App = () => null;\n")
    }

    fn orchestrator(sandbox: &MockSandbox) -> BootOrchestrator {
        let executor = ActionExecutor::new(Arc::new(sandbox.clone()), ExecutorConfig::default());
        BootOrchestrator::new(executor, &RecoveryConfig::default())
    }

    #[tokio::test]
    async fn test_boot_happy_path() {
        let sandbox = MockSandbox::new()
            .on_command("npm install", MockResponse::success("added 3 packages").creates(LOCKFILE))
            .on_command("npm run dev", MockResponse::long_running("Local: http://localhost:5173/"));
        let mut boot = orchestrator(&sandbox);

        assert!(boot.run_boot_sequence(&project()).await);
        assert_eq!(boot.state(), BootState::Ready);
        assert_eq!(sandbox.spawned_commands(), vec!["npm install", "npm run dev"]);
        assert!(sandbox.file("src/App.tsx").is_some());

        let succeeded: Vec<_> = boot
            .progress()
            .iter()
            .filter(|p| p.outcome == StepOutcome::Succeeded)
            .map(|p| p.phase)
            .collect();
        assert_eq!(succeeded, BootPhase::ALL.to_vec());
    }

    #[tokio::test]
    async fn test_boot_recovers_from_eresolve() {
        let sandbox = MockSandbox::new()
            .on_command(
                "npm install",
                MockResponse::failure(1, "npm ERR! code ERESOLVE\nnpm ERR! ERESOLVE unable to resolve dependency tree"),
            )
            .on_command(
                "npm install --legacy-peer-deps",
                MockResponse::success("added 3 packages").creates(LOCKFILE),
            )
            .on_command("npm run dev", MockResponse::long_running(""));
        let mut boot = orchestrator(&sandbox);

        assert!(boot.run_boot_sequence(&project()).await);
        assert_eq!(
            sandbox.spawned_commands(),
            vec!["npm install", "npm install --legacy-peer-deps", "npm run dev"]
        );
        assert_eq!(
            boot.last_failure().map(|f| f.category),
            Some(ErrorCategory::NpmVersionConflict)
        );
        assert!(boot
            .progress()
            .iter()
            .any(|p| p.phase == BootPhase::Install && p.outcome == StepOutcome::Recovered));
        assert!(boot.report().narrative().contains("--legacy-peer-deps"));
    }

    #[tokio::test]
    async fn test_boot_stops_without_suggestion() {
        let sandbox = MockSandbox::new()
            .on_command("npm install", MockResponse::failure(1, "Killed: out of memory"));
        let mut boot = orchestrator(&sandbox);

        assert!(!boot.run_boot_sequence(&project()).await);
        assert_eq!(boot.state(), BootState::Failed(BootPhase::Install));
        assert_eq!(sandbox.spawn_count("npm run dev"), 0);

        let report = boot.report();
        assert!(!report.success);
        assert!(report.narrative().contains("No automatic recovery available"));
    }

    #[tokio::test]
    async fn test_boot_surfaces_approval_gated_fix() {
        let sandbox = MockSandbox::new().on_command(
            "npm install",
            MockResponse::failure(1, "Error: Cannot find module 'left-pad'"),
        );
        let mut boot = orchestrator(&sandbox);

        assert!(!boot.run_boot_sequence(&project()).await);
        let suggestion = boot.take_pending_suggestion().unwrap();
        assert_eq!(suggestion.target, FixTarget::ModifyDependencyManifest);
        assert!(suggestion.requires_approval);
        assert!(boot.pending_suggestion().is_none());
    }

    #[tokio::test]
    async fn test_boot_patches_file_and_moves_on() {
        let sandbox = MockSandbox::new()
            .on_command(
                "npm install",
                MockResponse::failure(1, "src/App.tsx:1:20: Expecting Unicode escape sequence \\uXXXX"),
            )
            .on_command("npm install", MockResponse::success("").creates(LOCKFILE))
            .on_command("npm run dev", MockResponse::long_running(""));
        let mut boot = orchestrator(&sandbox);
        let tree = FileTree::new()
            .file("package.json", "{}")
            .file("src/App.tsx", "export const s = \\`hi \\${name}\\`;\n");

        assert!(boot.run_boot_sequence(&tree).await);
        assert_eq!(
            sandbox.file("src/App.tsx").unwrap(),
            "export const s = `hi ${name}`;\n"
        );
        // The install was not re-run by the checkpoint; the dev server ran it.
        assert_eq!(
            sandbox.spawned_commands(),
            vec!["npm install", "npm install", "npm run dev"]
        );
    }

    #[tokio::test]
    async fn test_boot_normalizes_stylesheet() {
        let sandbox = MockSandbox::new()
            .on_command(
                "npm install",
                MockResponse::failure(
                    1,
                    "[postcss] src/index.css:3:1: @import must precede all other statements",
                ),
            )
            .on_command("npm install", MockResponse::success("").creates(LOCKFILE))
            .on_command("npm run dev", MockResponse::long_running(""));
        let mut boot = orchestrator(&sandbox);
        let tree = FileTree::new()
            .file("package.json", "{}")
            .file("src/index.css", "body { margin: 0; }\n@import url('x.css');\n");

        assert!(boot.run_boot_sequence(&tree).await);
        assert_eq!(boot.last_failure().map(|f| f.category), Some(ErrorCategory::CssSyntax));

        let css = sandbox.file("src/index.css").unwrap();
        assert!(css.starts_with("@import url('x.css');"));
        assert!(css.contains("body { margin: 0; }"));
        assert!(boot
            .report()
            .narrative()
            .contains("[install] recovered:"));
    }

    #[tokio::test]
    async fn test_boot_converts_commonjs_config() {
        let sandbox = MockSandbox::new()
            .on_command("npm install", MockResponse::success("").creates(LOCKFILE))
            .on_command(
                "npm run dev",
                MockResponse::spawn_error("ReferenceError: module is not defined in ES module scope"),
            );
        let mut boot = orchestrator(&sandbox);
        let tree = FileTree::new()
            .file("package.json", r#"{ "type": "module" }"#)
            .file("postcss.config.js", "module.exports = {\n  plugins: { tailwindcss: {} },\n};\n");

        assert!(boot.run_boot_sequence(&tree).await);
        assert_eq!(
            boot.last_failure().map(|f| f.category),
            Some(ErrorCategory::EsmCjsConflict)
        );
        assert_eq!(
            sandbox.file("postcss.config.js").unwrap(),
            "export default {\n  plugins: { tailwindcss: {} },\n};\n"
        );
        assert!(boot
            .progress()
            .iter()
            .any(|p| p.phase == BootPhase::Serve && p.outcome == StepOutcome::Recovered));
    }

    #[tokio::test]
    async fn test_boot_fails_when_patch_finds_nothing() {
        let sandbox = MockSandbox::new().on_command(
            "npm install",
            MockResponse::failure(1, "src/App.tsx:1:1: Expecting Unicode escape sequence \\uXXXX"),
        );
        let mut boot = orchestrator(&sandbox);

        assert!(!boot.run_boot_sequence(&project()).await);
        assert_eq!(boot.state(), BootState::Failed(BootPhase::Install));
        assert_eq!(
            sandbox.file("src/App.tsx").unwrap(),
            "export const App = () => null;\n"
        );
        assert!(boot.report().narrative().contains("Recovery failed"));
        assert_eq!(sandbox.spawn_count("npm run dev"), 0);
    }

    #[tokio::test]
    async fn test_each_boot_starts_fresh() {
        let sandbox = MockSandbox::new()
            .on_command("npm install", MockResponse::failure(1, "Killed"));
        let mut boot = orchestrator(&sandbox);

        assert!(!boot.run_boot_sequence(&project()).await);
        assert!(!boot.run_boot_sequence(&project()).await);
        assert_eq!(boot.attempts(), 2);
        assert_eq!(sandbox.spawn_count("npm install"), 2);
        assert_eq!(
            boot.progress()
                .iter()
                .filter(|p| p.phase == BootPhase::Mount)
                .count(),
            2
        );
    }
}
