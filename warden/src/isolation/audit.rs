//! Append-only audit trail of safe operations.
//!
//! Every successful safe operation appends one [`AuditEntry`]. Entries are
//! never mutated or removed. When configured, each entry is also appended as a
//! JSON line to an on-disk audit log.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OperationKind {
    SafeCopy,
    SafeRead,
    SafeWrite,
}

impl std::fmt::Display for OperationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            OperationKind::SafeCopy => write!(f, "SAFE_COPY"),
            OperationKind::SafeRead => write!(f, "SAFE_READ"),
            OperationKind::SafeWrite => write!(f, "SAFE_WRITE"),
        }
    }
}

/// Operation-specific audit details.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AuditDetails {
    Copy {
        source: PathBuf,
        destination: PathBuf,
        checksum: String,
        integrity_verified: bool,
    },
    Read {
        original_path: PathBuf,
        copy_path: PathBuf,
        content_length: usize,
    },
    Write {
        filename: String,
        output_path: PathBuf,
        content_length: usize,
        checksum: String,
    },
}

impl AuditDetails {
    pub fn operation(&self) -> OperationKind {
        match self {
            AuditDetails::Copy { .. } => OperationKind::SafeCopy,
            AuditDetails::Read { .. } => OperationKind::SafeRead,
            AuditDetails::Write { .. } => OperationKind::SafeWrite,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    /// Position in the trail, starting at 0.
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub caller: String,
    pub operation: OperationKind,
    pub details: AuditDetails,
    /// Ids of the safety rules that were enforced when the entry was written.
    pub rules_enforced: Vec<String>,
}

/// In-memory trail plus optional JSON-lines mirror.
#[derive(Debug, Default)]
pub(crate) struct AuditTrail {
    entries: Vec<AuditEntry>,
    log_path: Option<PathBuf>,
}

impl AuditTrail {
    pub(crate) fn new(log_path: Option<PathBuf>) -> Self {
        Self {
            entries: Vec::new(),
            log_path,
        }
    }

    /// Append a new entry and return a copy of it.
    pub(crate) fn append(
        &mut self,
        caller: &str,
        details: AuditDetails,
        rules_enforced: Vec<String>,
    ) -> AuditEntry {
        let entry = AuditEntry {
            sequence: self.entries.len() as u64,
            timestamp: Utc::now(),
            caller: caller.to_string(),
            operation: details.operation(),
            details,
            rules_enforced,
        };

        if let Some(path) = &self.log_path
            && let Err(e) = append_json_line(path, &entry)
        {
            // The in-memory trail stays authoritative.
            tracing::warn!(
                audit_log = %path.display(),
                error = %e,
                "Failed to mirror audit entry to disk"
            );
        }

        self.entries.push(entry.clone());
        entry
    }

    pub(crate) fn entries(&self) -> &[AuditEntry] {
        &self.entries
    }

    pub(crate) fn recent(&self, n: usize) -> Vec<AuditEntry> {
        let start = self.entries.len().saturating_sub(n);
        self.entries[start..].to_vec()
    }
}

fn append_json_line(path: &Path, entry: &AuditEntry) -> std::io::Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)?;
    }
    let line = serde_json::to_string(entry).map_err(std::io::Error::other)?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{line}")
}

/// Read back an on-disk audit log written by the manager.
pub fn read_audit_log(path: &Path) -> anyhow::Result<Vec<AuditEntry>> {
    use anyhow::Context;

    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read audit log {}", path.display()))?;
    content
        .lines()
        .filter(|line| !line.trim().is_empty())
        .enumerate()
        .map(|(i, line)| {
            serde_json::from_str(line)
                .with_context(|| format!("Invalid audit entry on line {}", i + 1))
        })
        .collect()
}
