//! # Isolation Configuration
//!
//! A small typed configuration for the isolation manager, loaded from TOML.
//! Every field has a default, so an empty file yields the stock protected
//! roster rooted at the current directory.
//!
//! ```toml
//! project_root = "."
//! match_policy = "strict"
//! audit_log = ".warden/audit.jsonl"
//!
//! [[protected_paths]]
//! pattern = "secrets/"
//! protection_level = "CRITICAL"
//! description = "API keys"
//! ```
//!
//! Relative `project_root` values in a file are resolved against the file's
//! directory; relative `sandbox_root` and `audit_log` values against the
//! project root.

use anyhow::{Context, Result, bail};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::isolation::{
    MatchPolicy, ProtectedPathMatcher, ProtectedPathRule, RuleAction, SafetyRule,
    normalize_path_lexically,
};

/// Sandbox namespace used when `sandbox_root` is not configured.
pub const DEFAULT_SANDBOX_DIR: &str = ".warden/sandboxes";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct IsolationConfig {
    /// Base for resolving relative paths and protected patterns.
    #[serde(default = "default_project_root")]
    pub project_root: PathBuf,
    /// Directory holding one sandbox per caller. Defaults to `.warden/sandboxes`
    /// under the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sandbox_root: Option<PathBuf>,
    #[serde(default)]
    pub match_policy: MatchPolicy,
    #[serde(default = "ProtectedPathRule::default_set")]
    pub protected_paths: Vec<ProtectedPathRule>,
    #[serde(default = "SafetyRule::default_set")]
    pub safety_rules: Vec<SafetyRule>,
    /// Optional JSON-lines file mirroring the audit trail.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub audit_log: Option<PathBuf>,
    /// Record checksums of concrete protected files at startup so later
    /// integrity checks can detect in-place modification.
    #[serde(default)]
    pub capture_baseline: bool,
}

fn default_project_root() -> PathBuf {
    PathBuf::from(".")
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self::new(default_project_root())
    }
}

impl IsolationConfig {
    /// A configuration with the default rosters rooted at `project_root`.
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            sandbox_root: None,
            match_policy: MatchPolicy::default(),
            protected_paths: ProtectedPathRule::default_set(),
            safety_rules: SafetyRule::default_set(),
            audit_log: None,
            capture_baseline: false,
        }
    }

    pub fn with_sandbox_root(mut self, sandbox_root: impl Into<PathBuf>) -> Self {
        self.sandbox_root = Some(sandbox_root.into());
        self
    }

    pub fn with_match_policy(mut self, policy: MatchPolicy) -> Self {
        self.match_policy = policy;
        self
    }

    pub fn with_protected_paths(mut self, rules: Vec<ProtectedPathRule>) -> Self {
        self.protected_paths = rules;
        self
    }

    pub fn with_safety_rules(mut self, rules: Vec<SafetyRule>) -> Self {
        self.safety_rules = rules;
        self
    }

    pub fn with_audit_log(mut self, path: impl Into<PathBuf>) -> Self {
        self.audit_log = Some(path.into());
        self
    }

    pub fn with_capture_baseline(mut self, enabled: bool) -> Self {
        self.capture_baseline = enabled;
        self
    }

    /// Parse a TOML document. Relative paths are left untouched.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).context("Invalid isolation configuration")
    }

    /// Load a TOML configuration file, resolving a relative `project_root`
    /// against the directory containing the file.
    pub fn load_from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read configuration file {}", path.display()))?;
        let mut config = Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))?;

        if config.project_root.is_relative()
            && let Some(dir) = path.parent()
        {
            config.project_root = dir.join(&config.project_root);
        }
        Ok(config)
    }

    /// Absolute project root with symlinks resolved.
    ///
    /// A root that does not exist yet is only normalized lexically.
    pub fn resolved_project_root(&self) -> Result<PathBuf> {
        let absolute = std::path::absolute(&self.project_root).with_context(|| {
            format!(
                "Failed to resolve project root {}",
                self.project_root.display()
            )
        })?;
        Ok(std::fs::canonicalize(&absolute)
            .unwrap_or_else(|_| normalize_path_lexically(&absolute)))
    }

    /// Absolute sandbox namespace.
    pub fn resolved_sandbox_root(&self) -> Result<PathBuf> {
        let root = self.resolved_project_root()?;
        Ok(match &self.sandbox_root {
            Some(dir) => normalize_path_lexically(&root.join(dir)),
            None => root.join(DEFAULT_SANDBOX_DIR),
        })
    }

    /// Absolute audit log path, if configured.
    pub fn resolved_audit_log(&self) -> Result<Option<PathBuf>> {
        let root = self.resolved_project_root()?;
        Ok(self
            .audit_log
            .as_ref()
            .map(|p| normalize_path_lexically(&root.join(p))))
    }

    /// Check the configuration for problems.
    ///
    /// Hard problems (bad glob syntax, duplicate safety rule ids) are errors.
    /// Soft problems are returned as warnings.
    pub fn validate(&self) -> Result<Vec<String>> {
        let root = self.resolved_project_root()?;
        ProtectedPathMatcher::new(&root, self.match_policy, self.protected_paths.clone())
            .context("Invalid protected path pattern")?;

        let mut ids = HashSet::new();
        for rule in &self.safety_rules {
            if !ids.insert(rule.id.as_str()) {
                bail!("Duplicate safety rule id '{}'", rule.id);
            }
        }

        let mut warnings = Vec::new();
        let mut patterns = HashSet::new();
        for rule in &self.protected_paths {
            if !patterns.insert(rule.pattern.as_str()) {
                warnings.push(format!("Protected pattern '{}' is listed twice", rule.pattern));
            }
            if rule.expected_checksum.is_some() && rule.is_glob() {
                warnings.push(format!(
                    "Expected checksum on glob pattern '{}' is ignored",
                    rule.pattern
                ));
            }
        }
        for rule in self.safety_rules.iter().filter(|r| r.enforced) {
            if rule.action != RuleAction::Block {
                warnings.push(format!(
                    "Safety rule '{}' requests action {} which is not implemented; it is treated as BLOCK",
                    rule.id, rule.action
                ));
            }
        }

        if let Some(sandbox_root) = &self.sandbox_root
            && sandbox_root.as_os_str().is_empty()
        {
            bail!("sandbox_root must not be empty");
        }

        Ok(warnings)
    }
}
