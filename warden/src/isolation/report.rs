use std::collections::BTreeMap;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::audit::AuditEntry;
use super::matcher::MatchPolicy;
use super::sandbox::SandboxRecord;

/// Snapshot of the manager's in-memory state.
#[derive(Debug, Clone, Serialize)]
pub struct SafetyReport {
    pub safety_status: &'static str,
    pub match_policy: MatchPolicy,
    pub protected_path_count: usize,
    pub safety_rule_count: usize,
    pub critical_rule_count: usize,
    pub sandbox_count: usize,
    pub audit_trail_length: usize,
    pub sandboxes: BTreeMap<String, SandboxRecord>,
    /// The last ten audit entries, oldest first.
    pub recent_operations: Vec<AuditEntry>,
    pub safety_summary: SafetySummary,
}

/// Invariants that hold for every manager by construction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SafetySummary {
    pub no_deletion_enforced: bool,
    pub no_modification_enforced: bool,
    pub sandbox_isolation_active: bool,
    pub copy_only_operations: bool,
    pub audit_trail_maintained: bool,
    pub checksum_verification_active: bool,
}

impl SafetySummary {
    pub(crate) const ACTIVE: SafetySummary = SafetySummary {
        no_deletion_enforced: true,
        no_modification_enforced: true,
        sandbox_isolation_active: true,
        copy_only_operations: true,
        audit_trail_maintained: true,
        checksum_verification_active: true,
    };
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IntegrityIssue {
    IntegrityViolation {
        file: PathBuf,
        expected_checksum: String,
        current_checksum: String,
    },
    VerificationError {
        file: PathBuf,
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct IntegrityReport {
    pub verified_at: DateTime<Utc>,
    pub verified_count: usize,
    pub issues: Vec<IntegrityIssue>,
    pub all_valid: bool,
}

impl IntegrityReport {
    pub(crate) fn new(verified_count: usize, issues: Vec<IntegrityIssue>) -> Self {
        Self {
            verified_at: Utc::now(),
            verified_count,
            all_valid: issues.is_empty(),
            issues,
        }
    }
}
