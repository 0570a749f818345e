//! CLI command definitions.
//!
//! Each subcommand drives one part of the build pipeline against a
//! directory on the host.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use forge_core::{ActionExecutor, ForgeConfig};
use forge_sandbox::{FileTree, OutputStream};
use tracing::{debug, warn};
use walkdir::WalkDir;

pub mod boot;
pub mod classify;
pub mod replay;

/// Config file picked up from the working directory when `--config` is absent
pub const DEFAULT_CONFIG_FILE: &str = "forge.toml";

/// Directories never read into a project tree
const SKIPPED_DIRS: &[&str] = &["node_modules", ".git", "dist", "build", ".next"];

/// appforge - run model-generated web projects
#[derive(Parser)]
#[command(name = "forge")]
#[command(version, about = "appforge - run model-generated web projects")]
#[command(long_about = r#"
appforge turns streamed model output into files and commands, runs them in
a sandbox directory and boots the resulting project with automatic recovery.

COMMANDS:
  replay    → Apply a recorded model response to a directory
  boot      → Mount, install and serve a project
  classify  → Triage a build failure log

EXIT CODES:
  0 - Success
  1 - General error
  2 - Invalid arguments
  3 - Boot failure
  4 - Fix needs approval
  5 - Stream error
"#)]
#[command(propagate_version = true)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Args, Debug, Clone)]
pub struct GlobalArgs {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress process output and progress lines
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    pub json_logs: bool,

    /// Path to a forge.toml config file
    #[arg(short, long, global = true, env = "FORGE_CONFIG")]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Apply a recorded model response (raw text or SSE) to a directory
    Replay(replay::ReplayArgs),

    /// Mount, install and serve a project directory
    Boot(boot::BootArgs),

    /// Classify a failure log and print the suggested fix
    Classify(classify::ClassifyArgs),
}

/// Explicit config path, then `forge.toml` in the working directory, then defaults.
pub fn load_config(global: &GlobalArgs) -> Result<ForgeConfig> {
    if let Some(path) = &global.config {
        return ForgeConfig::load(path)
            .with_context(|| format!("Failed to load config from {}", path.display()));
    }

    let local = Path::new(DEFAULT_CONFIG_FILE);
    if local.is_file() {
        debug!("Using {}", DEFAULT_CONFIG_FILE);
        return ForgeConfig::load(local).context("Failed to load forge.toml");
    }

    Ok(ForgeConfig::from_env())
}

/// Print process output unless running quiet.
pub fn attach_output(executor: &ActionExecutor, global: &GlobalArgs) {
    if global.quiet {
        return;
    }
    executor.set_output_sink(|id, line| match line.stream {
        OutputStream::Stdout => println!("   │ [{}] {}", id, line.text),
        OutputStream::Stderr => eprintln!("   │ [{}] {}", id, line.text),
    });
}

/// Read a project directory into a tree of UTF-8 files.
pub fn read_project(root: &Path) -> Result<FileTree> {
    if !root.is_dir() {
        anyhow::bail!("Project directory not found: {}", root.display());
    }

    let mut tree = FileTree::new();
    let walker = WalkDir::new(root).into_iter().filter_entry(|entry| {
        entry.depth() == 0
            || !(entry.file_type().is_dir()
                && SKIPPED_DIRS.iter().any(|dir| entry.file_name() == *dir))
    });

    for entry in walker {
        let entry = entry?;
        if !entry.file_type().is_file() {
            continue;
        }
        let relative = entry.path().strip_prefix(root)?;
        let key = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        match std::fs::read_to_string(entry.path()) {
            Ok(contents) => {
                tree.insert(&key, contents);
            }
            Err(e) => warn!("Skipping {}: {}", key, e),
        }
    }

    debug!("Read {} files from {}", tree.len(), root.display());
    Ok(tree)
}

/// Block until Ctrl-C while the dev server is up, then shut the executor down.
pub async fn serve_until_interrupted(executor: &ActionExecutor) -> Result<()> {
    if executor.dev_server_running() {
        println!("🌐 Dev server running. Press Ctrl-C to stop.");
        tokio::signal::ctrl_c().await?;
        println!();
    }
    executor.cleanup().await;
    Ok(())
}
