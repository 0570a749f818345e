//! Content guards applied to generated files before they are written.
//!
//! Each guard is a pure text transform keyed on the file path. Guards never
//! fail: when they cannot make sense of a file they leave it alone (or, for
//! the compiler config, replace it with a known-good default).

use std::collections::BTreeMap;

use regex::Regex;
use serde_json::{json, Map, Value};
use tracing::{info, warn};

use crate::config::{ExecutorConfig, GuardConfig};

/// Outcome of parsing a JSON document that must be an object.
#[derive(Debug, Clone, PartialEq)]
pub enum ParsedJson {
    Object(Map<String, Value>),
    Fallback { reason: String },
}

pub fn parse_json_object(content: &str) -> ParsedJson {
    match serde_json::from_str::<Value>(content) {
        Ok(Value::Object(map)) => ParsedJson::Object(map),
        Ok(_) => ParsedJson::Fallback {
            reason: "top-level value is not an object".to_string(),
        },
        Err(e) => ParsedJson::Fallback {
            reason: e.to_string(),
        },
    }
}

/// Result of running the guards over one file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Guarded {
    pub content: String,
    /// Names of the guards that changed the content
    pub applied: Vec<&'static str>,
}

#[derive(Debug, Clone)]
pub struct ContentGuards {
    config: GuardConfig,
    mandatory_dependencies: BTreeMap<String, String>,
}

impl ContentGuards {
    pub fn new(config: GuardConfig, mandatory_dependencies: BTreeMap<String, String>) -> Self {
        Self {
            config,
            mandatory_dependencies,
        }
    }

    pub fn from_config(config: &ExecutorConfig) -> Self {
        Self::new(config.guards.clone(), config.mandatory_dependencies.clone())
    }

    pub fn apply(&self, path: &str, content: &str) -> Guarded {
        let name = path.rsplit('/').next().unwrap_or(path);
        let mut guarded = Guarded {
            content: content.to_string(),
            applied: Vec::new(),
        };

        let mut run = |label: &'static str, enabled: bool, f: &dyn Fn(&str) -> Option<String>| {
            if !enabled {
                return;
            }
            if let Some(updated) = f(&guarded.content) {
                info!(path, guard = label, "Guard rewrote file");
                guarded.content = updated;
                guarded.applied.push(label);
            }
        };

        if name == "package.json" && !path.contains("node_modules/") {
            run("manifest", self.config.manifest, &|c: &str| {
                ensure_dependencies(c, &self.mandatory_dependencies)
            });
        } else if name == "tsconfig.json" || name == "tsconfig.app.json" {
            run("tsconfig", self.config.tsconfig, &ensure_react_jsx);
        } else if name.ends_with(".css") {
            run("stylesheet", self.config.stylesheet, &normalize_stylesheet);
        } else if [".ts", ".tsx", ".js", ".jsx"].iter().any(|ext| name.ends_with(ext)) {
            run("import_paths", self.config.import_paths, &rewrite_import_paths);
        }

        guarded
    }
}

/// Add missing mandatory packages to `dependencies`. `None` when nothing changed.
pub fn ensure_dependencies(content: &str, mandatory: &BTreeMap<String, String>) -> Option<String> {
    let mut manifest = match parse_json_object(content) {
        ParsedJson::Object(map) => map,
        ParsedJson::Fallback { reason } => {
            warn!("Leaving unparseable package.json untouched: {}", reason);
            return None;
        }
    };

    let declared = |section: &str, name: &str| {
        manifest
            .get(section)
            .and_then(Value::as_object)
            .map_or(false, |deps| deps.contains_key(name))
    };
    let missing: Vec<(&String, &String)> = mandatory
        .iter()
        .filter(|(name, _)| !declared("dependencies", name) && !declared("devDependencies", name))
        .collect();
    if missing.is_empty() {
        return None;
    }

    let deps = manifest
        .entry("dependencies")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(deps) = deps.as_object_mut() else {
        warn!("package.json dependencies is not an object");
        return None;
    };
    for (name, version) in &missing {
        deps.insert((*name).clone(), Value::String((*version).clone()));
    }
    info!(
        added = ?missing.iter().map(|(n, _)| n.as_str()).collect::<Vec<_>>(),
        "Injected mandatory dependencies"
    );

    to_pretty(&Value::Object(manifest))
}

/// Force `compilerOptions.jsx` to `react-jsx`; replace unparseable configs.
pub fn ensure_react_jsx(content: &str) -> Option<String> {
    let mut config = match parse_json_object(content) {
        ParsedJson::Object(map) => map,
        ParsedJson::Fallback { reason } => {
            warn!("Replacing unparseable tsconfig with defaults: {}", reason);
            return to_pretty(&default_tsconfig());
        }
    };

    let options = config
        .entry("compilerOptions")
        .or_insert_with(|| Value::Object(Map::new()));
    let Some(options) = options.as_object_mut() else {
        return to_pretty(&default_tsconfig());
    };
    if options.get("jsx").and_then(Value::as_str) == Some("react-jsx") {
        return None;
    }
    options.insert("jsx".to_string(), Value::String("react-jsx".to_string()));
    to_pretty(&Value::Object(config))
}

/// Compiler config for a Vite React TypeScript project.
pub fn default_tsconfig() -> Value {
    json!({
        "compilerOptions": {
            "target": "ES2020",
            "useDefineForClassFields": true,
            "lib": ["ES2020", "DOM", "DOM.Iterable"],
            "module": "ESNext",
            "skipLibCheck": true,
            "moduleResolution": "bundler",
            "allowImportingTsExtensions": true,
            "resolveJsonModule": true,
            "isolatedModules": true,
            "noEmit": true,
            "jsx": "react-jsx",
            "strict": true,
            "noUnusedLocals": false,
            "noUnusedParameters": false,
            "noFallthroughCasesInSwitch": true,
            "baseUrl": ".",
            "paths": { "@/*": ["./src/*"] }
        },
        "include": ["src"]
    })
}

/// Hoist `@import` rules above everything but `@charset`, and drop `@apply`
/// entries that name the class of the rule they sit in.
pub fn normalize_stylesheet(content: &str) -> Option<String> {
    let hoisted = hoist_imports(content);
    let cleaned = remove_self_apply(hoisted.as_deref().unwrap_or(content));
    match (hoisted, cleaned) {
        (_, Some(cleaned)) => Some(cleaned),
        (Some(hoisted), None) => Some(hoisted),
        (None, None) => None,
    }
}

fn hoist_imports(content: &str) -> Option<String> {
    let lines: Vec<&str> = content.lines().collect();
    let is_import = |line: &str| line.trim_start().starts_with("@import");
    let is_preamble = |line: &str| {
        let t = line.trim();
        t.is_empty() || t.starts_with("@charset") || t.starts_with("/*") || t.starts_with("*")
    };

    let first_rule = lines.iter().position(|l| !is_preamble(l) && !is_import(l))?;
    if !lines[first_rule..].iter().any(|l| is_import(l)) {
        return None;
    }

    let charset: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|l| l.trim_start().starts_with("@charset"))
        .collect();
    let imports: Vec<&str> = lines.iter().copied().filter(|l| is_import(l)).collect();
    let rest: Vec<&str> = lines
        .iter()
        .copied()
        .filter(|l| !is_import(l) && !l.trim_start().starts_with("@charset"))
        .collect();

    let mut out: Vec<&str> = charset;
    out.extend(imports.iter().map(|l| l.trim_start()));
    out.push("");
    out.extend(rest.iter().skip_while(|l| l.trim().is_empty()));

    let mut result = out.join("\n");
    if content.ends_with('\n') {
        result.push('\n');
    }
    info!(count = imports.len(), "Hoisted @import rules");
    Some(result)
}

fn remove_self_apply(content: &str) -> Option<String> {
    let block = Regex::new(r"([^{}]+)\{([^{}]*)\}").ok()?;
    let class = Regex::new(r"\.([A-Za-z_][\w-]*)").ok()?;
    let apply = Regex::new(r"@apply\s+([^;}]+);?").ok()?;

    let mut changed = false;
    let result = block.replace_all(content, |caps: &regex::Captures| {
        let selector = &caps[1];
        let own: Vec<&str> = class
            .captures_iter(selector)
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str())
            .collect();
        if own.is_empty() || !caps[2].contains("@apply") {
            return caps[0].to_string();
        }

        let body = apply.replace_all(&caps[2], |a: &regex::Captures| {
            let tokens: Vec<&str> = a[1].split_whitespace().collect();
            let kept: Vec<&str> = tokens.iter().copied().filter(|t| !own.contains(t)).collect();
            if kept.len() == tokens.len() {
                return a[0].to_string();
            }
            changed = true;
            if kept.is_empty() {
                String::new()
            } else {
                format!("@apply {};", kept.join(" "))
            }
        });
        format!("{}{{{}}}", selector, body)
    });

    if !changed {
        return None;
    }
    info!("Removed self-referential @apply");
    Some(result.into_owned())
}

/// `../../../lib/x` and `../../../utils/x` become `@/lib/x` and `@/utils/x`.
pub fn rewrite_import_paths(content: &str) -> Option<String> {
    let re = Regex::new(r#"(['"])(?:\.\./){3,}(lib|utils)\b"#).ok()?;
    if !re.is_match(content) {
        return None;
    }
    Some(re.replace_all(content, "${1}@/${2}").into_owned())
}

fn to_pretty(value: &Value) -> Option<String> {
    serde_json::to_string_pretty(value)
        .ok()
        .map(|mut s| {
            s.push('\n');
            s
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn guards() -> ContentGuards {
        ContentGuards::from_config(&ExecutorConfig::default())
    }

    #[test]
    fn test_manifest_gets_mandatory_dependencies() {
        let manifest = r#"{
  "name": "app",
  "dependencies": { "react": "^18.3.1", "zustand": "^4.5.0" },
  "devDependencies": { "clsx": "^2.0.0" }
}"#;
        let guarded = guards().apply("package.json", manifest);
        assert_eq!(guarded.applied, vec!["manifest"]);

        let value: Value = serde_json::from_str(&guarded.content).unwrap();
        let deps = value["dependencies"].as_object().unwrap();
        assert_eq!(deps["zustand"], "^4.5.0");
        assert_eq!(deps["lucide-react"], "^0.460.0");
        assert!(!deps.contains_key("clsx"));
        let keys: Vec<_> = value.as_object().unwrap().keys().cloned().collect();
        assert_eq!(keys, vec!["name", "dependencies", "devDependencies"]);
    }

    #[test]
    fn test_manifest_parse_failure_is_left_alone() {
        let guarded = guards().apply("package.json", "{ not json");
        assert_eq!(guarded.content, "{ not json");
        assert!(guarded.applied.is_empty());
    }

    #[test]
    fn test_tsconfig_jsx() {
        let fixed = ensure_react_jsx(r#"{ "compilerOptions": { "jsx": "preserve" } }"#).unwrap();
        assert!(fixed.contains("\"jsx\": \"react-jsx\""));
        assert!(ensure_react_jsx(&fixed).is_none());
    }

    #[test]
    fn test_tsconfig_with_comments_is_replaced() {
        let fixed = guards().apply(
            "tsconfig.json",
            "{\n  // bundler mode\n  \"compilerOptions\": {}\n}",
        );
        let value: Value = serde_json::from_str(&fixed.content).unwrap();
        assert_eq!(value, default_tsconfig());
    }

    #[test]
    fn test_stylesheet_hoists_imports() {
        let css = "@tailwind base;\n@tailwind components;\n@import url('https://fonts.googleapis.com/css2?family=Inter');\n\nbody { margin: 0; }\n";
        let fixed = normalize_stylesheet(css).unwrap();
        assert!(fixed.starts_with("@import url("));
        assert!(fixed.ends_with("body { margin: 0; }\n"));
        assert_eq!(fixed.matches("@import").count(), 1);
        assert!(normalize_stylesheet(&fixed).is_none());
    }

    #[test]
    fn test_stylesheet_removes_self_apply() {
        let css = "@layer components {\n  .btn {\n    @apply btn px-4 py-2;\n  }\n  .card { @apply card; }\n}\n";
        let fixed = normalize_stylesheet(css).unwrap();
        assert!(fixed.contains("@apply px-4 py-2;"));
        assert!(!fixed.contains("@apply btn"));
        assert!(!fixed.contains("@apply card"));
        assert!(fixed.contains(".card {"));
    }

    #[test]
    fn test_import_paths() {
        let src = "import { cn } from '../../../lib/utils';\nimport x from '../../components/x';\n";
        let fixed = guards().apply("src/components/ui/deep/button.tsx", src);
        assert_eq!(fixed.applied, vec!["import_paths"]);
        assert!(fixed.content.contains("from '@/lib/utils'"));
        assert!(fixed.content.contains("'../../components/x'"));
    }

    #[test]
    fn test_disabled_guards() {
        let guards = ContentGuards::new(GuardConfig::disabled(), BTreeMap::new());
        let src = "import { cn } from '../../../lib/utils';\n";
        assert_eq!(guards.apply("src/a/b/c/d.ts", src).content, src);
    }
}
