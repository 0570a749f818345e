//! Boot command - Mount, install and serve a project.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::Args;
use forge_core::{ActionExecutor, BootOrchestrator, StepOutcome};
use forge_sandbox::{LocalSandbox, LocalSandboxOptions, Sandbox};
use tracing::info;

use super::{attach_output, load_config, read_project, serve_until_interrupted, GlobalArgs};

#[derive(Args)]
pub struct BootArgs {
    /// Project directory to boot
    #[arg(default_value = ".")]
    project: PathBuf,

    /// Directory to mount the project into (defaults to the project itself)
    #[arg(short, long)]
    workdir: Option<PathBuf>,

    /// Stop the dev server as soon as the boot succeeds
    #[arg(long)]
    check: bool,

    /// Print the boot report as JSON
    #[arg(long)]
    json: bool,
}

pub async fn execute(args: BootArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let tree = read_project(&args.project)?;
    let workdir = args.workdir.unwrap_or_else(|| args.project.clone());

    info!("Booting {} ({} files)", args.project.display(), tree.len());
    println!("🚀 Booting {}", args.project.display());

    let sandbox = LocalSandbox::new(&workdir, LocalSandboxOptions::default())?;
    let mut server_ready = sandbox.subscribe_server_ready();
    let executor = ActionExecutor::new(Arc::new(sandbox), config.executor.clone());
    attach_output(&executor, global);

    let mut boot = BootOrchestrator::new(executor.clone(), &config.recovery);
    let ready = boot.run_boot_sequence(&tree).await;
    let report = boot.report();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        for step in report.progress.iter().filter(|p| p.outcome != StepOutcome::Started) {
            let icon = match step.outcome {
                StepOutcome::Succeeded => "✅",
                StepOutcome::Recovered => "🔧",
                StepOutcome::NeedsApproval => "✋",
                _ => "❌",
            };
            println!("   {} [{}] {}", icon, step.phase, step.message);
        }
    }

    if !ready {
        executor.cleanup().await;
        if let Some(suggestion) = &report.pending_suggestion {
            if !args.json {
                println!("   Suggested fix: {}", suggestion.description);
            }
            anyhow::bail!("Boot stopped: fix needs approval");
        }
        anyhow::bail!("Boot failed after attempt {}", report.attempt);
    }

    if let Ok(server) = server_ready.try_recv() {
        println!("🌐 {}", server.url);
    }

    if args.check {
        println!("✅ Boot complete");
        executor.cleanup().await;
        return Ok(());
    }

    serve_until_interrupted(&executor).await
}
