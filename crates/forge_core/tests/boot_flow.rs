use std::sync::Arc;

use forge_core::{
    ActionExecutor, ActionStatus, BootOrchestrator, BootState, ExecutorConfig, RecoveryConfig,
    StreamPipeline,
};
use forge_sandbox::{FileTree, MockResponse, MockSandbox};

const RESPONSE: &str = r#"Here is your app.
<artifact id="todo" title="Todo app">
<action type="file" path="package.json">{"name":"todo","dependencies":{"react":"^18.3.1"}}</action>
<action type="file" path="src/src/main.tsx">import { App } from "../../../lib/app";</action>
<action type="shell">npm install</action>
<action type="shell">npm run dev</action>
</artifact>"#;

#[tokio::test]
async fn streamed_project_boots_again_from_sandbox_files() {
    let sandbox = MockSandbox::new()
        .on_command(
            "npm install",
            MockResponse::success("added 42 packages").creates("node_modules/.package-lock.json"),
        )
        .on_command("npm run dev", MockResponse::long_running("  ➜  Local:   http://localhost:5173/"));
    let executor = ActionExecutor::new(Arc::new(sandbox.clone()), ExecutorConfig::default());

    let mut pipeline = StreamPipeline::new(executor.clone(), "msg-1");
    for chunk in RESPONSE.as_bytes().chunks(5) {
        pipeline.push_text(std::str::from_utf8(chunk).unwrap());
    }
    let report = pipeline.finish();
    assert_eq!(report.queued.len(), 4);
    executor.wait_idle().await;

    for id in &report.queued {
        assert_eq!(executor.status(*id), Some(ActionStatus::Complete));
    }
    assert!(executor.dev_server_running());

    let manifest: serde_json::Value =
        serde_json::from_str(&sandbox.file("package.json").unwrap()).unwrap();
    assert_eq!(manifest["dependencies"]["react"], "^18.3.1");
    assert!(manifest["dependencies"]["zustand"].is_string());

    let main = sandbox.file("src/main.tsx").unwrap();
    assert!(main.contains("\"@/lib/app\""));
    assert!(sandbox.file("src/src/main.tsx").is_none());

    let tree = FileTree::from_files(sandbox.files());
    let mut boot = BootOrchestrator::new(executor.clone(), &RecoveryConfig::default());
    assert!(boot.run_boot_sequence(&tree).await);
    assert_eq!(boot.state(), BootState::Ready);

    // The server from the stream is reused.
    assert_eq!(sandbox.spawn_count("npm run dev"), 1);
    assert_eq!(sandbox.spawn_count("npm install"), 2);

    executor.cleanup().await;
    assert!(!executor.dev_server_running());
}

#[cfg(unix)]
#[tokio::test]
async fn local_sandbox_boot() {
    use forge_sandbox::{LocalSandbox, LocalSandboxOptions};

    let dir = tempfile::tempdir().unwrap();
    let sandbox = LocalSandbox::new(dir.path(), LocalSandboxOptions::default()).unwrap();
    let config = ExecutorConfig::default()
        .install_command("mkdir node_modules")
        .dev_command("sleep 30");
    let executor = ActionExecutor::new(Arc::new(sandbox), config);

    let tree = FileTree::new()
        .file("package.json", r#"{ "name": "local" }"#)
        .file("src/index.ts", "export {};\n");
    let mut boot = BootOrchestrator::new(executor.clone(), &RecoveryConfig::default());

    assert!(boot.run_boot_sequence(&tree).await, "{}", boot.report().narrative());
    assert!(dir.path().join("node_modules").is_dir());
    assert!(dir.path().join("src/index.ts").is_file());
    assert!(executor.dev_server_running());

    assert!(executor.stop_dev_server().await);
    assert!(!executor.dev_server_running());
}
