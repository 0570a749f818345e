//! # forge_core
//!
//! Action execution and boot orchestration for appforge.
//!
//! # Features
//!
//! - **Action Executor**: FIFO queue of file writes and shell commands over a
//!   [`forge_sandbox::Sandbox`], with timeouts, abort and a critical-failure latch
//! - **Content Guards**: Fix-ups applied to generated files before they are written
//! - **Stream Pipeline**: Streamed model output parsed into queued actions
//! - **Boot Orchestrator**: Mount, install and serve, with failure triage and recovery
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use forge_core::{ActionExecutor, BootOrchestrator, ForgeConfig};
//! use forge_sandbox::{FileTree, LocalSandbox, LocalSandboxOptions};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ForgeConfig::default();
//!     let sandbox = LocalSandbox::new("./work", LocalSandboxOptions::default())?;
//!     let executor = ActionExecutor::new(Arc::new(sandbox), config.executor.clone());
//!
//!     let tree = FileTree::new().file("package.json", r#"{ "name": "demo" }"#);
//!     let mut boot = BootOrchestrator::new(executor, &config.recovery);
//!     if !boot.run_boot_sequence(&tree).await {
//!         eprintln!("{}", boot.report().narrative());
//!     }
//!     Ok(())
//! }
//! ```

pub mod boot;
pub mod config;
pub mod error;
pub mod executor;
pub mod guards;
pub mod pipeline;

pub use boot::{BootOrchestrator, BootPhase, BootProgress, BootReport, BootState, StepOutcome};
pub use config::{ExecutorConfig, ForgeConfig, GuardConfig, RecoveryConfig, TimeoutConfig};
pub use error::{CoreError, CoreResult};
pub use executor::{
    normalize_action_path, ActionExecutor, ActionId, ActionRecord, ActionStatus, OutputSink,
    StatusChange,
};
pub use guards::{ContentGuards, Guarded};
pub use pipeline::{PipelineReport, StreamPipeline};
