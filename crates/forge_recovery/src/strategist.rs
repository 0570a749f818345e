//! Maps a classified failure to a concrete remediation.

use std::collections::BTreeMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::classifier::{ErrorCategory, ErrorClassification};

/// Default lifetime ceiling on suggestions per strategist.
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Flag appended to the install command for dependency conflicts.
pub const LEGACY_PEER_DEPS_FLAG: &str = "--legacy-peer-deps";

/// Config file rewritten when a module-system mismatch names no file.
pub const DEFAULT_ESM_TARGET: &str = "postcss.config.js";

const DEFAULT_STYLESHEET: &str = "src/index.css";
const MANIFEST: &str = "package.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixKind {
    AutoFix,
    ManualFix,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FixTarget {
    FixSyntax,
    ModifyDependencyManifest,
    RetryWithFlags,
    ManualIntervention,
}

/// A proposed remediation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoverySuggestion {
    pub category: ErrorCategory,
    pub kind: FixKind,
    pub target: FixTarget,
    pub description: String,
    pub file: Option<String>,
    /// Regex to replace in `file`
    pub match_pattern: Option<String>,
    pub replacement: Option<String>,
    pub requires_approval: bool,
    /// Command to run instead of the failed one
    pub alternate_command: Option<String>,
}

impl RecoverySuggestion {
    fn new(
        category: ErrorCategory,
        kind: FixKind,
        target: FixTarget,
        description: impl Into<String>,
    ) -> Self {
        Self {
            category,
            kind,
            target,
            description: description.into(),
            file: None,
            match_pattern: None,
            replacement: None,
            requires_approval: false,
            alternate_command: None,
        }
    }

    fn file(mut self, file: impl Into<String>) -> Self {
        self.file = Some(file.into());
        self
    }

    fn patch(mut self, pattern: &str, replacement: &str) -> Self {
        self.match_pattern = Some(pattern.to_string());
        self.replacement = Some(replacement.to_string());
        self
    }

    fn approval(mut self) -> Self {
        self.requires_approval = true;
        self
    }

    /// Can be applied without asking anyone.
    pub fn is_unattended(&self) -> bool {
        self.kind == FixKind::AutoFix && !self.requires_approval
    }

    /// Carries a pattern/replacement for a file.
    pub fn is_patch(&self) -> bool {
        self.file.is_some() && self.match_pattern.is_some()
    }
}

/// Produces suggestions, up to a lifetime retry ceiling.
#[derive(Debug, Clone)]
pub struct RecoveryStrategist {
    max_retries: u32,
    attempts: u32,
    install_command: String,
}

impl Default for RecoveryStrategist {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRIES)
    }
}

impl RecoveryStrategist {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            attempts: 0,
            install_command: "npm install".to_string(),
        }
    }

    pub fn with_install_command(mut self, command: impl Into<String>) -> Self {
        self.install_command = command.into();
        self
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    pub fn exhausted(&self) -> bool {
        self.attempts >= self.max_retries
    }

    /// Start a fresh budget, e.g. at the beginning of a boot.
    pub fn reset(&mut self) {
        self.attempts = 0;
    }

    /// Propose a fix for `classification` given the current project files.
    pub fn suggest(
        &mut self,
        classification: &ErrorClassification,
        files: &BTreeMap<String, String>,
    ) -> Option<RecoverySuggestion> {
        if self.exhausted() {
            warn!(
                attempts = self.attempts,
                max = self.max_retries,
                category = %classification.category,
                "Recovery retry limit reached"
            );
            return None;
        }

        let suggestion = self.build(classification, files)?;
        self.attempts += 1;
        info!(
            attempt = self.attempts,
            category = %classification.category,
            file = ?suggestion.file,
            approval = suggestion.requires_approval,
            "{}",
            suggestion.description
        );
        Some(suggestion)
    }

    fn build(
        &self,
        classification: &ErrorClassification,
        files: &BTreeMap<String, String>,
    ) -> Option<RecoverySuggestion> {
        let category = classification.category;
        let named = classification
            .file
            .as_deref()
            .map(|f| resolve_file(files, f));

        let suggestion = match category {
            ErrorCategory::TemplateLiteralEscapeError => {
                let file = named.or_else(|| {
                    files
                        .iter()
                        .find(|(_, body)| body.contains("\\`") || body.contains("\\${"))
                        .map(|(path, _)| path.clone())
                });
                let mut s = RecoverySuggestion::new(
                    category,
                    FixKind::AutoFix,
                    FixTarget::FixSyntax,
                    "Remove escaped backticks and ${ from template literals",
                )
                .patch(r"\\(\$)\\?(\{)|\\(`)", "${1}${2}${3}");
                s.file = file;
                s
            }
            ErrorCategory::NpmVersionConflict | ErrorCategory::PeerDependencyError => {
                let command = format!("{} {}", self.install_command, LEGACY_PEER_DEPS_FLAG);
                let mut s = RecoverySuggestion::new(
                    category,
                    FixKind::AutoFix,
                    FixTarget::RetryWithFlags,
                    format!("Retry install with {}", LEGACY_PEER_DEPS_FLAG),
                );
                s.alternate_command = Some(command);
                s
            }
            ErrorCategory::SyntaxError => {
                let mut s = RecoverySuggestion::new(
                    category,
                    FixKind::ManualFix,
                    FixTarget::FixSyntax,
                    match classification.location() {
                        Some(at) => format!("Fix the syntax error at {}", at),
                        None => "Fix the syntax error".to_string(),
                    },
                )
                .approval();
                s.file = named;
                s
            }
            ErrorCategory::EsmCjsConflict => RecoverySuggestion::new(
                category,
                FixKind::AutoFix,
                FixTarget::FixSyntax,
                "Convert module.exports to export default",
            )
            .file(named.unwrap_or_else(|| resolve_file(files, DEFAULT_ESM_TARGET)))
            .patch(r"module\.exports\s*=\s*", "export default "),
            ErrorCategory::MissingDependency => {
                let description = match missing_module(&classification.message) {
                    Some(module) => format!("Review package.json for missing module '{}'", module),
                    None => "Review package.json for a missing module".to_string(),
                };
                RecoverySuggestion::new(
                    category,
                    FixKind::AutoFix,
                    FixTarget::ModifyDependencyManifest,
                    description,
                )
                .file(MANIFEST)
                .approval()
            }
            ErrorCategory::CircularDependency => RecoverySuggestion::new(
                category,
                FixKind::ManualFix,
                FixTarget::ManualIntervention,
                "Restructure the modules to break the circular import",
            )
            .approval(),
            ErrorCategory::CssSyntax => {
                let file = named.unwrap_or_else(|| {
                    files
                        .keys()
                        .find(|p| p.ends_with(".css"))
                        .cloned()
                        .unwrap_or_else(|| DEFAULT_STYLESHEET.to_string())
                });
                RecoverySuggestion::new(
                    category,
                    FixKind::AutoFix,
                    FixTarget::FixSyntax,
                    "Normalize the stylesheet",
                )
                .file(file)
            }
            ErrorCategory::Unknown => {
                debug!("No recovery for unclassified failure");
                return None;
            }
        };
        Some(suggestion)
    }
}

/// Match an error-reported path against the project's relative paths.
fn resolve_file(files: &BTreeMap<String, String>, reported: &str) -> String {
    let trimmed = reported.trim_start_matches("./");
    if files.contains_key(trimmed) {
        return trimmed.to_string();
    }
    files
        .keys()
        .filter(|path| trimmed.ends_with(&format!("/{}", path)))
        .max_by_key(|path| path.len())
        .cloned()
        .unwrap_or_else(|| trimmed.to_string())
}

fn missing_module(message: &str) -> Option<String> {
    let re = Regex::new(r#"(?i)(?:cannot find module|failed to resolve import|could not resolve)\s+['"]([^'"]+)['"]"#)
        .ok()?;
    re.captures(message).map(|c| c[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::classify;

    fn files(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(p, c)| (p.to_string(), c.to_string()))
            .collect()
    }

    #[test]
    fn test_dependency_conflict_retries_with_flag() {
        let mut strategist = RecoveryStrategist::default();
        let s = strategist
            .suggest(&classify("npm ERR! code ERESOLVE"), &BTreeMap::new())
            .unwrap();

        assert_eq!(s.target, FixTarget::RetryWithFlags);
        assert_eq!(s.alternate_command.as_deref(), Some("npm install --legacy-peer-deps"));
        assert!(s.is_unattended());
        assert_eq!(strategist.attempts(), 1);
    }

    #[test]
    fn test_template_fix_resolves_reported_path() {
        let project = files(&[("src/App.tsx", "const a = \\`x\\`;\n")]);
        let mut strategist = RecoveryStrategist::default();
        let s = strategist
            .suggest(
                &classify("/home/project/src/App.tsx:1:10: Expecting Unicode escape sequence"),
                &project,
            )
            .unwrap();

        assert_eq!(s.file.as_deref(), Some("src/App.tsx"));
        assert!(s.is_patch());
        assert!(!s.requires_approval);
    }

    #[test]
    fn test_template_fix_finds_file_by_content() {
        let project = files(&[
            ("src/a.ts", "ok\n"),
            ("src/b.ts", "const s = \\${x};\n"),
        ]);
        let mut strategist = RecoveryStrategist::default();
        let s = strategist
            .suggest(&classify("Expecting Unicode escape sequence \\uXXXX"), &project)
            .unwrap();
        assert_eq!(s.file.as_deref(), Some("src/b.ts"));
    }

    #[test]
    fn test_esm_defaults_to_postcss_config() {
        let mut strategist = RecoveryStrategist::default();
        let s = strategist
            .suggest(
                &classify("ReferenceError: module is not defined in ES module scope"),
                &BTreeMap::new(),
            )
            .unwrap();
        assert_eq!(s.file.as_deref(), Some(DEFAULT_ESM_TARGET));
        assert!(s.is_unattended());
    }

    #[test]
    fn test_approval_policy() {
        let mut strategist = RecoveryStrategist::new(10);
        let empty = BTreeMap::new();

        let syntax = strategist.suggest(&classify("Unexpected token"), &empty).unwrap();
        assert_eq!(syntax.kind, FixKind::ManualFix);
        assert!(syntax.requires_approval);

        let missing = strategist
            .suggest(&classify("Error: Cannot find module 'zustand'"), &empty)
            .unwrap();
        assert_eq!(missing.kind, FixKind::AutoFix);
        assert_eq!(missing.target, FixTarget::ModifyDependencyManifest);
        assert!(missing.requires_approval);
        assert!(missing.description.contains("zustand"));

        let circular = strategist
            .suggest(&classify("Circular dependency detected"), &empty)
            .unwrap();
        assert_eq!(circular.target, FixTarget::ManualIntervention);
        assert!(circular.requires_approval);

        let css = strategist
            .suggest(&classify("[postcss] Unknown at rule @tailwindcss"), &empty)
            .unwrap();
        assert_eq!(css.file.as_deref(), Some("src/index.css"));
        assert!(css.is_unattended());
        assert!(!css.is_patch());
    }

    #[test]
    fn test_unknown_has_no_suggestion_and_costs_nothing() {
        let mut strategist = RecoveryStrategist::default();
        assert!(strategist.suggest(&classify("weird"), &BTreeMap::new()).is_none());
        assert_eq!(strategist.attempts(), 0);
    }

    #[test]
    fn test_retry_ceiling_and_reset() {
        let mut strategist = RecoveryStrategist::new(2);
        let conflict = classify("ERESOLVE unable to resolve dependency tree");
        let empty = BTreeMap::new();

        assert!(strategist.suggest(&conflict, &empty).is_some());
        assert!(strategist.suggest(&conflict, &empty).is_some());
        assert!(strategist.suggest(&conflict, &empty).is_none());
        assert!(strategist.exhausted());

        strategist.reset();
        assert!(strategist.suggest(&conflict, &empty).is_some());
    }
}
