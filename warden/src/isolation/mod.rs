//! # Isolation and Safe File Access
//!
//! Every file access performed on behalf of a background caller goes through
//! an [`IsolationManager`]. Callers never touch originals directly:
//!
//! - reads copy the original into the caller's sandbox, verify the copy by
//!   SHA-256, and return the copy's contents;
//! - writes land only in the caller's `output/` area;
//! - paths matching a protected rule are refused before anything is touched.
//!
//! Each completed operation is appended to an audit trail, and the manager can
//! produce a safety report and an integrity report over the protected files.
//!
//! ## Layout
//!
//! Each caller gets `<sandbox_root>/<caller>/{working,copies,output,logs}`.
//! The sandbox root defaults to `.warden/sandboxes` under the project root.

mod audit;
mod checksum;
mod copier;
pub(crate) mod core;
mod error;
mod matcher;
mod report;
mod rules;
mod sandbox;
mod scopes;

pub use audit::{AuditDetails, AuditEntry, OperationKind, read_audit_log};
pub use checksum::{file_sha256, sha256_hex};
pub use copier::{FileCopier, StdFileCopier};
pub use core::IsolationManager;
pub use error::{ErrorKind, IsolationError};
pub use matcher::{MatchPolicy, ProtectedPathMatcher};
pub use report::{IntegrityIssue, IntegrityReport, SafetyReport, SafetySummary};
pub use rules::{ProtectedPathRule, ProtectionLevel, RuleAction, SafetyRule, Severity};
pub use sandbox::{
    COPIES_DIR, LOGS_DIR, OUTPUT_DIR, SANDBOX_SUBDIRS, SandboxRecord, WORKING_DIR,
};
pub use scopes::normalize_path_lexically;
