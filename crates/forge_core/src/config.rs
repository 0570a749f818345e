//! Executor and recovery configuration.
//!
//! Loaded from TOML; every field has a default so an empty file is valid.
//!
//! ```toml
//! [executor]
//! install_command = "pnpm install"
//!
//! [executor.timeouts]
//! install_seconds = 600
//!
//! [executor.guards]
//! import_paths = false
//!
//! [recovery]
//! max_retries = 5
//! ```

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{CoreError, CoreResult};

/// Top-level configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForgeConfig {
    pub executor: ExecutorConfig,
    pub recovery: RecoveryConfig,
}

impl ForgeConfig {
    /// Read a TOML file and apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> CoreResult<Self> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Loading config");
        let content = std::fs::read_to_string(path)?;
        Ok(Self::from_toml_str(&content)?.apply_env())
    }

    pub fn from_toml_str(content: &str) -> CoreResult<Self> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults plus environment overrides.
    pub fn from_env() -> Self {
        Self::default().apply_env()
    }

    /// Apply `FORGE_INSTALL_COMMAND`, `FORGE_DEV_COMMAND` and `FORGE_MAX_RETRIES`.
    pub fn apply_env(self) -> Self {
        self.apply_overrides(|key| std::env::var(key).ok())
    }

    pub fn apply_overrides(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(command) = lookup("FORGE_INSTALL_COMMAND").filter(|c| !c.trim().is_empty()) {
            self.executor.install_command = command.trim().to_string();
        }

        if let Some(command) = lookup("FORGE_DEV_COMMAND").filter(|c| !c.trim().is_empty()) {
            let command = command.trim().to_string();
            self.executor.dev_server_commands.retain(|c| c != &command);
            self.executor.dev_server_commands.insert(0, command);
        }

        if let Some(retries) = lookup("FORGE_MAX_RETRIES") {
            if let Ok(value) = retries.trim().parse::<u32>() {
                self.recovery.max_retries = value;
            }
        }

        self
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.executor.install_command.trim().is_empty() {
            return Err(CoreError::Config("install_command must not be empty".into()));
        }
        if self.executor.dev_server_commands.is_empty() {
            return Err(CoreError::Config(
                "at least one dev server command is required".into(),
            ));
        }
        Ok(())
    }
}

/// Settings for the action executor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutorConfig {
    /// Dependency install command. Failing it latches a critical failure.
    pub install_command: String,
    /// Long-running dev server invocations. The first one is used to serve.
    pub dev_server_commands: Vec<String>,
    /// Directory whose absence means dependencies are not installed
    pub dependency_dir: String,
    pub timeouts: TimeoutConfig,
    pub guards: GuardConfig,
    /// Runtime libraries injected into every package manifest
    pub mandatory_dependencies: BTreeMap<String, String>,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            install_command: "npm install".to_string(),
            dev_server_commands: [
                "npm run dev",
                "npm start",
                "vite",
                "yarn dev",
                "pnpm dev",
                "npx vite",
            ]
            .into_iter()
            .map(String::from)
            .collect(),
            dependency_dir: "node_modules".to_string(),
            timeouts: TimeoutConfig::default(),
            guards: GuardConfig::default(),
            mandatory_dependencies: default_mandatory_dependencies(),
        }
    }
}

impl ExecutorConfig {
    pub fn install_command(mut self, command: impl Into<String>) -> Self {
        self.install_command = command.into();
        self
    }

    pub fn dev_command(mut self, command: impl Into<String>) -> Self {
        self.dev_server_commands.insert(0, command.into());
        self
    }

    pub fn timeouts(mut self, timeouts: TimeoutConfig) -> Self {
        self.timeouts = timeouts;
        self
    }

    pub fn guards(mut self, guards: GuardConfig) -> Self {
        self.guards = guards;
        self
    }

    pub fn without_mandatory_dependencies(mut self) -> Self {
        self.mandatory_dependencies.clear();
        self
    }

    /// Command used to start the dev server during boot.
    pub fn serve_command(&self) -> &str {
        self.dev_server_commands
            .first()
            .map(String::as_str)
            .unwrap_or("npm run dev")
    }

    /// Matches a configured dev server command, optionally followed by
    /// extra arguments (`npm run dev -- --host`).
    pub fn is_dev_server(&self, command: &str) -> bool {
        let command = normalize_whitespace(command);
        self.dev_server_commands.iter().any(|known| {
            let known = normalize_whitespace(known);
            command == known || command.starts_with(&format!("{} ", known))
        })
    }

    pub fn is_install(&self, command: &str) -> bool {
        let command = normalize_whitespace(command);
        let install = normalize_whitespace(&self.install_command);
        if command == install || command.starts_with(&format!("{} ", install)) {
            return true;
        }
        let mut parts = command.split(' ');
        match (parts.next(), parts.next()) {
            (Some("npm" | "pnpm"), Some("install" | "i" | "ci")) => true,
            (Some("yarn"), None | Some("install")) => true,
            _ => false,
        }
    }

    /// Timeout for a non-dev-server command.
    pub fn timeout_for(&self, command: &str) -> Duration {
        if self.is_install(command) {
            Duration::from_secs(self.timeouts.install_seconds)
        } else {
            Duration::from_secs(self.timeouts.default_seconds)
        }
    }
}

/// Per-command time allowances, in seconds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    pub install_seconds: u64,
    pub default_seconds: u64,
    /// Allowance for spawning the dev server. It is never awaited after that.
    pub dev_server_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            install_seconds: 300, // 5 minutes
            default_seconds: 60,
            dev_server_seconds: 30,
        }
    }
}

impl TimeoutConfig {
    pub fn install(mut self, seconds: u64) -> Self {
        self.install_seconds = seconds;
        self
    }

    pub fn default_command(mut self, seconds: u64) -> Self {
        self.default_seconds = seconds;
        self
    }
}

/// Toggles for the content guards applied to written files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardConfig {
    pub manifest: bool,
    pub tsconfig: bool,
    pub stylesheet: bool,
    pub import_paths: bool,
}

impl Default for GuardConfig {
    fn default() -> Self {
        Self {
            manifest: true,
            tsconfig: true,
            stylesheet: true,
            import_paths: true,
        }
    }
}

impl GuardConfig {
    pub fn disabled() -> Self {
        Self {
            manifest: false,
            tsconfig: false,
            stylesheet: false,
            import_paths: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecoveryConfig {
    /// Suggestions allowed per boot
    pub max_retries: u32,
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            max_retries: forge_recovery::DEFAULT_MAX_RETRIES,
        }
    }
}

fn default_mandatory_dependencies() -> BTreeMap<String, String> {
    [
        ("lucide-react", "^0.460.0"),
        ("zustand", "^5.0.1"),
        ("framer-motion", "^11.11.17"),
        ("clsx", "^2.1.1"),
        ("tailwind-merge", "^2.5.4"),
        ("uuid", "^11.0.3"),
        ("date-fns", "^4.1.0"),
    ]
    .into_iter()
    .map(|(name, version)| (name.to_string(), version.to_string()))
    .collect()
}

fn normalize_whitespace(command: &str) -> String {
    command.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_toml_is_default() {
        assert_eq!(ForgeConfig::from_toml_str("").unwrap(), ForgeConfig::default());
    }

    #[test]
    fn test_partial_toml() {
        let config = ForgeConfig::from_toml_str(
            r#"
            [executor]
            install_command = "pnpm install"

            [executor.timeouts]
            install_seconds = 600

            [executor.guards]
            import_paths = false

            [recovery]
            max_retries = 5
            "#,
        )
        .unwrap();

        assert_eq!(config.executor.install_command, "pnpm install");
        assert_eq!(config.executor.timeouts.install_seconds, 600);
        assert_eq!(config.executor.timeouts.default_seconds, 60);
        assert!(!config.executor.guards.import_paths);
        assert!(config.executor.guards.manifest);
        assert_eq!(config.recovery.max_retries, 5);
        assert_eq!(config.executor.mandatory_dependencies.len(), 7);
    }

    #[test]
    fn test_rejects_empty_install_command() {
        let result = ForgeConfig::from_toml_str("[executor]\ninstall_command = \" \"\n");
        assert!(matches!(result, Err(CoreError::Config(_))));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("FORGE_INSTALL_COMMAND", "yarn install"),
            ("FORGE_DEV_COMMAND", "vite"),
            ("FORGE_MAX_RETRIES", "not-a-number"),
        ]
        .into_iter()
        .collect();

        let config = ForgeConfig::default()
            .apply_overrides(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.executor.install_command, "yarn install");
        assert_eq!(config.executor.serve_command(), "vite");
        assert_eq!(
            config
                .executor
                .dev_server_commands
                .iter()
                .filter(|c| c.as_str() == "vite")
                .count(),
            1
        );
        assert_eq!(config.recovery.max_retries, 3);
    }

    #[test]
    fn test_command_detection() {
        let config = ExecutorConfig::default();
        assert!(config.is_dev_server("npm run dev"));
        assert!(config.is_dev_server("npm  run dev -- --host"));
        assert!(!config.is_dev_server("npm run devtools"));
        assert!(!config.is_dev_server("npm run build"));

        assert!(config.is_install("npm install"));
        assert!(config.is_install("npm i zustand"));
        assert!(config.is_install("npm install --legacy-peer-deps"));
        assert!(!config.is_install("npm run build"));

        assert_eq!(config.timeout_for("npm install"), Duration::from_secs(300));
        assert_eq!(config.timeout_for("ls"), Duration::from_secs(60));
    }
}
