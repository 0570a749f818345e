//! Failure classification.
//!
//! Raw failure text from the sandbox (install logs, compiler output, dev
//! server stderr) is matched against a closed set of categories. The order
//! categories are tried in is fixed; the first match wins.

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Known failure categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ErrorCategory {
    TemplateLiteralEscapeError,
    NpmVersionConflict,
    PeerDependencyError,
    SyntaxError,
    EsmCjsConflict,
    MissingDependency,
    CircularDependency,
    CssSyntax,
    Unknown,
}

impl ErrorCategory {
    /// Categories in the order they are tested.
    pub const PRIORITY: [ErrorCategory; 8] = [
        ErrorCategory::TemplateLiteralEscapeError,
        ErrorCategory::NpmVersionConflict,
        ErrorCategory::PeerDependencyError,
        ErrorCategory::SyntaxError,
        ErrorCategory::EsmCjsConflict,
        ErrorCategory::MissingDependency,
        ErrorCategory::CircularDependency,
        ErrorCategory::CssSyntax,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::TemplateLiteralEscapeError => "template-literal-escape-error",
            Self::NpmVersionConflict => "npm-version-conflict",
            Self::PeerDependencyError => "peer-dependency-error",
            Self::SyntaxError => "syntax-error",
            Self::EsmCjsConflict => "esm-cjs-conflict",
            Self::MissingDependency => "missing-dependency",
            Self::CircularDependency => "circular-dependency",
            Self::CssSyntax => "css-syntax",
            Self::Unknown => "unknown",
        }
    }

    /// Short label for progress messages.
    pub fn label(&self) -> &'static str {
        match self {
            Self::TemplateLiteralEscapeError => "Escaped template literal",
            Self::NpmVersionConflict => "Dependency version conflict",
            Self::PeerDependencyError => "Peer dependency conflict",
            Self::SyntaxError => "Syntax error",
            Self::EsmCjsConflict => "ES module / CommonJS mismatch",
            Self::MissingDependency => "Missing dependency",
            Self::CircularDependency => "Circular dependency",
            Self::CssSyntax => "Stylesheet error",
            Self::Unknown => "Unknown error",
        }
    }

    fn hint(&self) -> Option<&'static str> {
        match self {
            Self::TemplateLiteralEscapeError => {
                Some("Remove the backslashes before ` and ${ in template literals")
            }
            Self::NpmVersionConflict | Self::PeerDependencyError => {
                Some("Retry the install with --legacy-peer-deps")
            }
            Self::SyntaxError => Some("Check the reported line for invalid syntax"),
            Self::EsmCjsConflict => {
                Some("Use `export default` instead of `module.exports` in ES module projects")
            }
            Self::MissingDependency => {
                Some("Add the missing package to package.json or fix the import path")
            }
            Self::CircularDependency => Some("Break the import cycle between the modules"),
            Self::CssSyntax => {
                Some("Move @import rules to the top and drop @apply of unknown classes")
            }
            Self::Unknown => None,
        }
    }

    fn matches(&self, raw: &str, lower: &str) -> bool {
        let any = |needles: &[&str]| needles.iter().any(|n| lower.contains(n));
        match self {
            Self::TemplateLiteralEscapeError => {
                lower.contains("expecting unicode escape sequence")
                    || raw.contains("\\`")
                    || raw.contains("\\${")
            }
            Self::NpmVersionConflict => any(&[
                "eresolve",
                "unable to resolve dependency tree",
                "etarget",
                "no matching version",
            ]),
            Self::PeerDependencyError => any(&["peer dep", "incompatible peer"]),
            Self::SyntaxError => {
                any(&["syntax error", "unexpected token", "unterminated"])
                    || Regex::new(r"\bsyntaxerror\b")
                        .map(|re| re.is_match(lower))
                        .unwrap_or(false)
            }
            Self::EsmCjsConflict => any(&[
                "module is not defined in es module scope",
                "require is not defined",
                "cannot use import statement outside a module",
                "err_require_esm",
            ]),
            Self::MissingDependency => any(&[
                "cannot find module",
                "failed to resolve import",
                "module not found",
                "could not resolve",
            ]),
            Self::CircularDependency => lower.contains("circular"),
            Self::CssSyntax => any(&[
                "csssyntaxerror",
                "[postcss]",
                "vite:css",
                "unknown at rule",
                "class does not exist",
            ]),
            Self::Unknown => false,
        }
    }
}

impl std::fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A classified failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorClassification {
    pub category: ErrorCategory,
    pub file: Option<String>,
    pub line: Option<u32>,
    /// The raw failure text
    pub message: String,
    pub hint: Option<String>,
}

impl ErrorClassification {
    pub fn is_known(&self) -> bool {
        self.category != ErrorCategory::Unknown
    }

    /// `file:line`, `file`, or nothing.
    pub fn location(&self) -> Option<String> {
        match (&self.file, self.line) {
            (Some(file), Some(line)) => Some(format!("{}:{}", file, line)),
            (Some(file), None) => Some(file.clone()),
            _ => None,
        }
    }
}

/// Classify raw failure text.
pub fn classify(raw: &str) -> ErrorClassification {
    let lower = raw.to_lowercase();
    let category = ErrorCategory::PRIORITY
        .into_iter()
        .find(|c| c.matches(raw, &lower))
        .unwrap_or(ErrorCategory::Unknown);

    let classification = ErrorClassification {
        category,
        file: extract_file(raw),
        line: extract_line(raw),
        message: raw.to_string(),
        hint: category.hint().map(str::to_string),
    };
    debug!(
        category = %classification.category,
        location = ?classification.location(),
        "Classified failure"
    );
    classification
}

/// First path-like token with a known source extension.
pub fn extract_file(raw: &str) -> Option<String> {
    let re = Regex::new(
        r"(?:\.{0,2}/)?(?:[\w@.\-]+/)*[\w@.\-]+\.(?:tsx|ts|jsx|json|js|mjs|cjs|css|scss|html|vue)\b",
    )
    .ok()?;
    re.find(raw).map(|m| m.as_str().to_string())
}

/// First `:<line>:` number.
pub fn extract_line(raw: &str) -> Option<u32> {
    let re = Regex::new(r":(\d+):").ok()?;
    re.captures(raw).and_then(|c| c[1].parse().ok())
}
