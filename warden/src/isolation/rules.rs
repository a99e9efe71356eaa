//! Protected-path and safety rule definitions.
//!
//! Both registries are fixed at construction time. The default sets mirror the
//! roster the agent supervisor has always shipped with.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ProtectionLevel {
    Critical,
    High,
    Medium,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Severity {
    Critical,
    High,
    Medium,
    Low,
}

/// What a safety rule asks the manager to do on violation.
///
/// Only `Block` is implemented; `Warn` and `Allow` are accepted in
/// configuration but behave like `Block`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RuleAction {
    #[default]
    Block,
    Warn,
    Allow,
}

impl std::fmt::Display for RuleAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RuleAction::Block => write!(f, "BLOCK"),
            RuleAction::Warn => write!(f, "WARN"),
            RuleAction::Allow => write!(f, "ALLOW"),
        }
    }
}

/// A path or glob pattern whose matches may never be read directly or modified.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct ProtectedPathRule {
    /// Path or glob pattern. `**` spans directories, `*` a single segment.
    pub pattern: String,
    #[serde(default = "default_protection_level")]
    pub protection_level: ProtectionLevel,
    #[serde(default)]
    pub description: String,
    /// SHA-256 the file is expected to have. Only meaningful for concrete paths.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expected_checksum: Option<String>,
}

fn default_protection_level() -> ProtectionLevel {
    ProtectionLevel::Critical
}

impl ProtectedPathRule {
    pub fn new(
        pattern: impl Into<String>,
        protection_level: ProtectionLevel,
        description: impl Into<String>,
    ) -> Self {
        Self {
            pattern: pattern.into(),
            protection_level,
            description: description.into(),
            expected_checksum: None,
        }
    }

    /// Shorthand for a CRITICAL rule with a generated description.
    pub fn critical(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let description = format!("Original project source: {pattern}");
        Self::new(pattern, ProtectionLevel::Critical, description)
    }

    pub fn with_expected_checksum(mut self, checksum: impl Into<String>) -> Self {
        self.expected_checksum = Some(checksum.into());
        self
    }

    /// True when the pattern contains any wildcard.
    pub fn is_glob(&self) -> bool {
        self.pattern.contains('*')
    }

    /// True when the pattern contains the recursive wildcard.
    pub fn is_recursive_glob(&self) -> bool {
        self.pattern.contains("**")
    }

    /// The default protected roster.
    pub fn default_set() -> Vec<Self> {
        [
            "agents/",
            "coordination/",
            "checkpoints/",
            "security-review/",
            "validation/",
            "**/*.rs",
            "**/*.toml",
            "**/*.lock",
            "**/*.md",
            "**/*.txt",
            "**/*.json",
            "**/*.yaml",
            "**/*.yml",
            ".git/",
            ".gitignore",
            "**/proof*",
            "**/verifier*",
            "**/stark*",
            "**/winterfell*",
        ]
        .into_iter()
        .map(Self::critical)
        .collect()
    }
}

/// A declarative safety rule. Enforcement is implicit in the safe operations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SafetyRule {
    pub id: String,
    pub description: String,
    pub severity: Severity,
    #[serde(default = "default_enforced")]
    pub enforced: bool,
    #[serde(default)]
    pub action: RuleAction,
}

fn default_enforced() -> bool {
    true
}

impl SafetyRule {
    pub fn new(id: impl Into<String>, description: impl Into<String>, severity: Severity) -> Self {
        Self {
            id: id.into(),
            description: description.into(),
            severity,
            enforced: true,
            action: RuleAction::Block,
        }
    }

    pub fn is_critical(&self) -> bool {
        self.severity == Severity::Critical
    }

    pub fn default_set() -> Vec<Self> {
        vec![
            Self::new(
                "NO_DELETION",
                "No files or folders can be deleted",
                Severity::Critical,
            ),
            Self::new(
                "NO_MODIFICATION",
                "No in-place modification of original project code",
                Severity::Critical,
            ),
            Self::new(
                "SANDBOX_ONLY",
                "All operations must happen inside caller sandboxes",
                Severity::Critical,
            ),
            Self::new(
                "COPY_ONLY",
                "All changes must be made on copies only",
                Severity::Critical,
            ),
            Self::new(
                "AUDIT_TRAIL",
                "All operations must be recorded in the audit trail",
                Severity::High,
            ),
            Self::new(
                "CHECKSUM_VERIFICATION",
                "File integrity must be verified for every copy",
                Severity::Critical,
            ),
        ]
    }
}
