#![cfg(unix)]

use std::time::Duration;

use forge_sandbox::{FileTree, LocalSandbox, LocalSandboxOptions, Sandbox};
use tempfile::TempDir;

fn args(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

#[tokio::test]
async fn server_url_is_announced_once() {
    let temp_dir = TempDir::new().unwrap();
    let sandbox = LocalSandbox::new(temp_dir.path(), LocalSandboxOptions::new()).unwrap();
    let mut ready = sandbox.subscribe_server_ready();

    let mut process = sandbox
        .spawn(
            "sh",
            &args(&["-c", "echo 'Local: http://localhost:5173/'; echo 'Network: http://127.0.0.1:5173/'"]),
        )
        .await
        .unwrap();
    assert_eq!(process.wait().await.unwrap(), 0);

    let event = tokio::time::timeout(Duration::from_secs(5), ready.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.port, 5173);
    assert_eq!(event.url, "http://localhost:5173/");
    assert!(ready.try_recv().is_err());
}

#[tokio::test]
async fn killed_process_stops_running() {
    let temp_dir = TempDir::new().unwrap();
    let sandbox = LocalSandbox::new(temp_dir.path(), LocalSandboxOptions::new()).unwrap();

    let mut process = sandbox.spawn("sleep", &args(&["30"])).await.unwrap();
    assert_eq!(process.command_line(), "sleep 30");
    assert_eq!(process.try_exit_code().unwrap(), None);

    process.kill().await.unwrap();
    process.wait().await.unwrap();
    assert!(process.try_exit_code().unwrap().is_some());

    // A second kill is a no-op.
    process.kill().await.unwrap();
}

#[tokio::test]
async fn processes_run_in_the_sandbox_root() {
    let temp_dir = TempDir::new().unwrap();
    let sandbox = LocalSandbox::new(temp_dir.path(), LocalSandboxOptions::new()).unwrap();
    sandbox
        .mount(&FileTree::new().file("src/main.ts", "console.log(1);\n"))
        .await
        .unwrap();

    let mut process = sandbox.spawn("mkdir", &args(&["node_modules"])).await.unwrap();
    assert_eq!(process.wait().await.unwrap(), 0);

    assert!(sandbox.dir_exists("node_modules").await.unwrap());
    assert!(sandbox.dir_exists("src").await.unwrap());
    assert!(!sandbox.dir_exists("dist").await.unwrap());
}
