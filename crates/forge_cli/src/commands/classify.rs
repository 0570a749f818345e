//! Classify command - Triage a build failure log.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use forge_recovery::{classify, ErrorClassification, RecoveryStrategist, RecoverySuggestion};
use serde::Serialize;

use super::{load_config, read_project, GlobalArgs};

#[derive(Args)]
pub struct ClassifyArgs {
    /// Failure log to read (stdin when omitted)
    log: Option<PathBuf>,

    /// Project directory used to resolve files named in the log
    #[arg(short, long)]
    project: Option<PathBuf>,
}

#[derive(Serialize)]
struct Triage {
    classification: ErrorClassification,
    suggestion: Option<RecoverySuggestion>,
}

pub async fn execute(args: ClassifyArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;

    let raw = match &args.log {
        Some(path) => std::fs::read_to_string(path)
            .with_context(|| format!("Log file not found: {}", path.display()))?,
        None => {
            let mut buf = String::new();
            std::io::stdin().read_to_string(&mut buf)?;
            buf
        }
    };

    let files = match &args.project {
        Some(dir) => read_project(dir)?.into_files(),
        None => BTreeMap::new(),
    };

    let mut strategist = RecoveryStrategist::new(config.recovery.max_retries)
        .with_install_command(config.executor.install_command);
    let classification = classify(&raw);
    let suggestion = strategist.suggest(&classification, &files);

    let triage = Triage {
        classification,
        suggestion,
    };
    println!("{}", serde_json::to_string_pretty(&triage)?);
    Ok(())
}
