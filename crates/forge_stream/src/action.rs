//! Build actions extracted from a generation stream.

use serde::{Deserialize, Serialize};

/// What a build action does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ActionKind {
    /// Write `content` to `path`, replacing any previous file.
    File { path: String, content: String },
    /// Run a single command line.
    Shell { command: String },
}

/// A single unit of work for the executor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildAction {
    /// Artifact this action was emitted in, for grouping only
    pub artifact_id: Option<String>,
    #[serde(flatten)]
    pub kind: ActionKind,
}

impl BuildAction {
    pub fn file(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self {
            artifact_id: None,
            kind: ActionKind::File {
                path: path.into(),
                content: content.into(),
            },
        }
    }

    pub fn shell(command: impl Into<String>) -> Self {
        Self {
            artifact_id: None,
            kind: ActionKind::Shell {
                command: command.into(),
            },
        }
    }

    pub fn in_artifact(mut self, artifact_id: impl Into<String>) -> Self {
        self.artifact_id = Some(artifact_id.into());
        self
    }

    pub fn is_shell(&self) -> bool {
        matches!(self.kind, ActionKind::Shell { .. })
    }

    /// Human-readable one-liner, e.g. `Write src/App.tsx` or `Run npm install`.
    pub fn description(&self) -> String {
        match &self.kind {
            ActionKind::File { path, .. } => format!("Write {}", path),
            ActionKind::Shell { command } => format!("Run {}", command),
        }
    }
}

/// Action type named by the `type` attribute of an action tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionType {
    File,
    Shell,
}

impl ActionType {
    /// Parse a `type` attribute. Missing or unrecognized values mean `file`.
    pub fn from_attr(value: Option<&str>) -> Self {
        match value.map(|v| v.trim().to_ascii_lowercase()) {
            Some(v) if v == "shell" => Self::Shell,
            _ => Self::File,
        }
    }
}

impl std::fmt::Display for ActionType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::File => write!(f, "file"),
            Self::Shell => write!(f, "shell"),
        }
    }
}
