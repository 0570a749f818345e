//! # forge_sandbox
//!
//! Sandbox capability surface for appforge.
//!
//! The core never touches a filesystem or process table directly. It drives
//! a [`Sandbox`]: something that can mount a file tree, read and write files,
//! spawn processes, stream their output and report their exit codes.
//!
//! # Implementations
//!
//! - **LocalSandbox**: a host directory plus `tokio::process`
//! - **MockSandbox**: in-memory files and scripted processes for tests
//!
//! # Example
//!
//! ```rust,no_run
//! use forge_sandbox::{FileTree, LocalSandbox, LocalSandboxOptions, Sandbox};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let sandbox = LocalSandbox::new("/tmp/my-app", LocalSandboxOptions::new())?;
//!
//!     let tree = FileTree::new()
//!         .file("package.json", r#"{ "name": "my-app" }"#)
//!         .file("src/main.tsx", "console.log('hi');\n");
//!     sandbox.mount(&tree).await?;
//!
//!     let mut process = sandbox.spawn("npm", &["install".to_string()]).await?;
//!     println!("Exit code: {}", process.wait().await?);
//!
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod local;
pub mod mock;
pub mod sandbox;
pub mod tree;

pub use error::{SandboxError, SandboxResult};
pub use local::{LocalProcess, LocalSandbox, LocalSandboxOptions};
pub use mock::{CapturedCall, MockEvent, MockResponse, MockSandbox, KILLED_EXIT_CODE};
pub use sandbox::{
    command_line, detect_server_url, OutputLine, OutputReceiver, OutputStream, Sandbox,
    SandboxProcess, ServerReady,
};
pub use tree::{clean_path, parent_dir, FileTree};
