use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::audit::AuditEntry;
use super::error::IsolationError;

/// Subareas created inside every sandbox.
pub const SANDBOX_SUBDIRS: [&str; 4] = [WORKING_DIR, COPIES_DIR, OUTPUT_DIR, LOGS_DIR];

pub const WORKING_DIR: &str = "working";
pub const COPIES_DIR: &str = "copies";
pub const OUTPUT_DIR: &str = "output";
pub const LOGS_DIR: &str = "logs";

/// In-memory bookkeeping for one caller's sandbox.
#[derive(Debug, Clone, Serialize)]
pub struct SandboxRecord {
    pub caller: String,
    pub root: PathBuf,
    pub created_at: DateTime<Utc>,
    pub operations_count: u64,
    pub last_operation: Option<AuditEntry>,
}

impl SandboxRecord {
    pub(crate) fn new(caller: &str, root: PathBuf) -> Self {
        Self {
            caller: caller.to_string(),
            root,
            created_at: Utc::now(),
            operations_count: 0,
            last_operation: None,
        }
    }

    pub fn copies_dir(&self) -> PathBuf {
        self.root.join(COPIES_DIR)
    }

    pub fn output_dir(&self) -> PathBuf {
        self.root.join(OUTPUT_DIR)
    }

    pub(crate) fn record(&mut self, entry: AuditEntry) {
        self.operations_count += 1;
        self.last_operation = Some(entry);
    }
}

/// Create the sandbox directory tree under `root` if any part is missing.
pub(crate) fn create_layout(root: &Path) -> Result<(), IsolationError> {
    for sub in SANDBOX_SUBDIRS {
        let dir = root.join(sub);
        std::fs::create_dir_all(&dir).map_err(|e| {
            IsolationError::storage(format!("creating sandbox directory {}", dir.display()), e)
        })?;
    }
    Ok(())
}
