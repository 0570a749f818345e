//! Replay command - Apply a recorded model response to a directory.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Args;
use forge_core::{ActionExecutor, ActionStatus, StreamPipeline};
use forge_sandbox::{LocalSandbox, LocalSandboxOptions};
use forge_stream::RateLimiter;
use tracing::info;

use super::{attach_output, load_config, serve_until_interrupted, GlobalArgs};

/// Bytes fed to the pipeline per push, to mimic network chunking
const CHUNK_SIZE: usize = 256;

#[derive(Args)]
pub struct ReplayArgs {
    /// Recorded response: raw model text or an SSE capture
    transcript: PathBuf,

    /// Directory the actions run in
    #[arg(short, long, default_value = ".")]
    workdir: PathBuf,

    /// Keep a dev server started by the response running until Ctrl-C
    #[arg(long)]
    serve: bool,

    /// Minimum delay between chunks in milliseconds (0 replays at once)
    #[arg(long, default_value_t = 0)]
    pace_ms: u64,
}

pub async fn execute(args: ReplayArgs, global: &GlobalArgs) -> Result<()> {
    let config = load_config(global)?;
    let body = std::fs::read(&args.transcript)
        .with_context(|| format!("Transcript not found: {}", args.transcript.display()))?;

    let sandbox = LocalSandbox::new(&args.workdir, LocalSandboxOptions::default())?;
    let executor = ActionExecutor::new(Arc::new(sandbox), config.executor);
    attach_output(&executor, global);

    let stream_id = uuid::Uuid::new_v4().to_string();
    info!("Replaying {} as stream {}", args.transcript.display(), stream_id);

    let mut pacer = (args.pace_ms > 0).then(|| RateLimiter::new(Duration::from_millis(args.pace_ms)));
    let mut pipeline = StreamPipeline::new(executor.clone(), stream_id);
    if is_sse(&body) {
        for chunk in body.chunks(CHUNK_SIZE) {
            pace(&mut pacer).await;
            pipeline.push_bytes(chunk);
            if pipeline.is_done() {
                break;
            }
        }
    } else {
        let text = String::from_utf8_lossy(&body);
        let chars: Vec<char> = text.chars().collect();
        for chunk in chars.chunks(CHUNK_SIZE) {
            pace(&mut pacer).await;
            pipeline.push_text(&chunk.iter().collect::<String>());
        }
    }
    let report = pipeline.finish();
    executor.wait_idle().await;

    if !global.quiet && !report.text.trim().is_empty() {
        println!("💬 {}", report.text.trim());
    }
    for title in &report.artifacts {
        println!("📦 {}", title);
    }

    let mut failed = 0;
    for id in &report.queued {
        let Some(record) = executor.record(*id) else {
            continue;
        };
        let icon = match record.status {
            ActionStatus::Complete => "✅",
            ActionStatus::Failed => {
                failed += 1;
                "❌"
            }
            _ => "⏭️ ",
        };
        println!("   {} {}", icon, record.description);
        if let Some(error) = record.error.as_deref().filter(|_| global.verbose) {
            println!("      {}", error.replace('\n', "\n      "));
        }
    }

    if args.serve {
        serve_until_interrupted(&executor).await?;
    } else {
        executor.cleanup().await;
    }

    if failed > 0 {
        anyhow::bail!("{} of {} streamed actions failed", failed, report.queued.len());
    }
    println!("✅ Replayed {} actions", report.queued.len());
    Ok(())
}

async fn pace(pacer: &mut Option<RateLimiter>) {
    if let Some(limiter) = pacer {
        limiter.acquire().await;
    }
}

/// SSE captures start their payload lines with `data:`.
fn is_sse(body: &[u8]) -> bool {
    String::from_utf8_lossy(body)
        .lines()
        .map(str::trim_start)
        .find(|line| !line.is_empty())
        .map(|line| line.starts_with("data:") || line.starts_with("event:") || line.starts_with(':'))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_sse() {
        assert!(is_sse(b"\ndata: {\"choices\":[]}\n\n"));
        assert!(is_sse(b": keep-alive\ndata: [DONE]\n"));
        assert!(!is_sse(b"Sure! <artifact id=\"a\">"));
        assert!(!is_sse(b""));
    }
}
