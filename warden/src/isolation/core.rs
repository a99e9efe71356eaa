use std::collections::{BTreeMap, HashMap};
use std::ffi::OsStr;
use std::io;
use std::path::{Component, Path, PathBuf};
use std::sync::{Mutex, MutexGuard, PoisonError};

use anyhow::{Context, Result};

use super::audit::{AuditDetails, AuditEntry, AuditTrail};
use super::checksum::file_sha256;
use super::copier::{FileCopier, StdFileCopier};
use super::error::IsolationError;
use super::matcher::ProtectedPathMatcher;
use super::report::{IntegrityIssue, IntegrityReport, SafetyReport, SafetySummary};
use super::rules::{ProtectedPathRule, RuleAction, SafetyRule};
use super::sandbox::{self, COPIES_DIR, OUTPUT_DIR, SandboxRecord};
use super::scopes::{join_within, validate_caller_id};
use crate::config::IsolationConfig;

/// Number of audit entries included in a safety report.
const RECENT_OPERATIONS: usize = 10;

#[derive(Debug)]
struct ManagerState {
    sandboxes: BTreeMap<String, SandboxRecord>,
    audit: AuditTrail,
}

/// Mediates every file access made on behalf of a caller.
///
/// Originals are only ever read to produce a verified sandbox copy; all writes
/// land inside the caller's sandbox. One instance is shared by all callers of a
/// process (wrap it in an `Arc`).
#[derive(Debug)]
pub struct IsolationManager {
    project_root: PathBuf,
    sandbox_root: PathBuf,
    matcher: ProtectedPathMatcher,
    safety_rules: Vec<SafetyRule>,
    /// Checksums captured at startup for concrete protected files.
    baseline: HashMap<PathBuf, String>,
    copier: Box<dyn FileCopier>,
    state: Mutex<ManagerState>,
}

impl IsolationManager {
    pub fn new(config: IsolationConfig) -> Result<Self> {
        Self::with_copier(config, Box::new(StdFileCopier))
    }

    /// Build a manager that transfers bytes through `copier`.
    pub fn with_copier(config: IsolationConfig, copier: Box<dyn FileCopier>) -> Result<Self> {
        let project_root = config.resolved_project_root()?;
        let sandbox_root = config.resolved_sandbox_root()?;
        let audit_log = config.resolved_audit_log()?;

        let matcher =
            ProtectedPathMatcher::new(&project_root, config.match_policy, config.protected_paths)
                .context("Invalid protected path pattern")?;

        for rule in config.safety_rules.iter().filter(|r| r.enforced) {
            if rule.action != RuleAction::Block {
                tracing::warn!(
                    rule = %rule.id,
                    action = %rule.action,
                    "Safety rule action is not implemented; treating it as BLOCK"
                );
            }
        }

        let baseline = if config.capture_baseline {
            capture_baseline(&matcher)
        } else {
            HashMap::new()
        };

        tracing::info!(
            project_root = %project_root.display(),
            sandbox_root = %sandbox_root.display(),
            protected_paths = matcher.len(),
            safety_rules = config.safety_rules.len(),
            baseline_files = baseline.len(),
            policy = ?matcher.policy(),
            "Isolation manager initialized"
        );

        Ok(Self {
            project_root,
            sandbox_root,
            matcher,
            safety_rules: config.safety_rules,
            baseline,
            copier,
            state: Mutex::new(ManagerState {
                sandboxes: BTreeMap::new(),
                audit: AuditTrail::new(audit_log),
            }),
        })
    }

    pub fn project_root(&self) -> &Path {
        &self.project_root
    }

    pub fn sandbox_root(&self) -> &Path {
        &self.sandbox_root
    }

    pub fn matcher(&self) -> &ProtectedPathMatcher {
        &self.matcher
    }

    pub fn safety_rules(&self) -> &[SafetyRule] {
        &self.safety_rules
    }

    pub fn is_protected(&self, path: impl AsRef<Path>) -> bool {
        self.matcher.is_protected(path.as_ref())
    }

    /// Ensure `caller` has a sandbox and return its root. Idempotent.
    pub fn ensure_sandbox(&self, caller: &str) -> Result<PathBuf, IsolationError> {
        let root = self.sandbox_path(caller)?;
        sandbox::create_layout(&root)?;

        let mut state = self.state();
        state.sandboxes.entry(caller.to_string()).or_insert_with(|| {
            tracing::info!(
                caller,
                sandbox = %root.display(),
                "Created sandbox"
            );
            SandboxRecord::new(caller, root.clone())
        });
        Ok(root)
    }

    /// Copy `source` into the caller's `copies/` area and verify the copy.
    ///
    /// The copy is named `destination_name`, or after the source file when
    /// `None`. A copy whose checksum differs from the source is deleted and
    /// reported as [`IsolationError::IntegrityFault`].
    pub fn safe_copy(
        &self,
        caller: &str,
        source: impl AsRef<Path>,
        destination_name: Option<&str>,
    ) -> Result<PathBuf, IsolationError> {
        let requested = source.as_ref();
        let resolved = self.matcher.resolve(requested);

        if !resolved.exists() {
            tracing::warn!(caller, path = %requested.display(), "Source file does not exist");
            return Err(IsolationError::NotFound {
                path: requested.to_path_buf(),
            });
        }
        self.deny_if_protected(caller, requested)?;

        let root = self.ensure_sandbox(caller)?;
        let name = match destination_name {
            Some(name) => name.to_string(),
            None => resolved
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .ok_or_else(|| {
                    IsolationError::invalid_name(
                        requested.display().to_string(),
                        "source has no file name",
                    )
                })?,
        };
        let destination = join_within(&root.join(COPIES_DIR), &name)?;
        if same_file(&resolved, &destination) {
            return Err(IsolationError::invalid_name(
                name,
                "destination is the source file itself",
            ));
        }
        create_parent(&destination)?;

        let source_checksum = file_sha256(&resolved).map_err(|e| {
            IsolationError::storage(format!("checksumming {}", resolved.display()), e)
        })?;

        self.copier.copy(&resolved, &destination).map_err(|e| {
            IsolationError::storage(
                format!(
                    "copying {} to {}",
                    resolved.display(),
                    destination.display()
                ),
                e,
            )
        })?;

        // An unreadable copy counts as a mismatch.
        let copy_checksum = file_sha256(&destination).unwrap_or_default();
        if copy_checksum != source_checksum {
            tracing::error!(
                severity = "CRITICAL",
                caller,
                source = %resolved.display(),
                copy = %destination.display(),
                expected = %source_checksum,
                actual = %copy_checksum,
                "COPY INTEGRITY FAILED: removing corrupted sandbox copy"
            );
            if let Err(e) = std::fs::remove_file(&destination) {
                tracing::error!(
                    copy = %destination.display(),
                    error = %e,
                    "Failed to remove corrupted sandbox copy"
                );
            }
            return Err(IsolationError::IntegrityFault {
                path: requested.to_path_buf(),
                expected: source_checksum,
                actual: copy_checksum,
            });
        }

        self.record(
            caller,
            AuditDetails::Copy {
                source: resolved.clone(),
                destination: destination.clone(),
                checksum: source_checksum,
                integrity_verified: true,
            },
        );
        tracing::info!(
            caller,
            source = %resolved.display(),
            destination = %destination.display(),
            "Safe copy completed"
        );

        Ok(destination)
    }

    /// Read a file as UTF-8 text through a verified sandbox copy.
    pub fn safe_read(&self, caller: &str, path: impl AsRef<Path>) -> Result<String, IsolationError> {
        let path = path.as_ref();
        let (copy, bytes) = self.materialize(caller, path)?;
        let content = String::from_utf8(bytes).map_err(|e| {
            IsolationError::storage(
                format!("decoding {} as UTF-8", copy.display()),
                io::Error::new(io::ErrorKind::InvalidData, e),
            )
        })?;
        self.record_read(caller, path, copy, content.len());
        Ok(content)
    }

    /// Read a file's raw bytes through a verified sandbox copy.
    pub fn safe_read_bytes(
        &self,
        caller: &str,
        path: impl AsRef<Path>,
    ) -> Result<Vec<u8>, IsolationError> {
        let path = path.as_ref();
        let (copy, bytes) = self.materialize(caller, path)?;
        self.record_read(caller, path, copy, bytes.len());
        Ok(bytes)
    }

    /// Write `content` to `output/<filename>` inside the caller's sandbox.
    pub fn safe_write(
        &self,
        caller: &str,
        content: impl AsRef<[u8]>,
        filename: &str,
    ) -> Result<PathBuf, IsolationError> {
        let content = content.as_ref();
        let output_dir = self.sandbox_path(caller)?.join(OUTPUT_DIR);
        let output_path = join_within(&output_dir, filename)?;

        self.ensure_sandbox(caller)?;
        create_parent(&output_path)?;

        std::fs::write(&output_path, content).map_err(|e| {
            IsolationError::storage(format!("writing {}", output_path.display()), e)
        })?;
        let checksum = file_sha256(&output_path).map_err(|e| {
            IsolationError::storage(format!("checksumming {}", output_path.display()), e)
        })?;

        self.record(
            caller,
            AuditDetails::Write {
                filename: filename.to_string(),
                output_path: output_path.clone(),
                content_length: content.len(),
                checksum,
            },
        );
        tracing::info!(
            caller,
            filename,
            output_path = %output_path.display(),
            "Safe write completed"
        );

        Ok(output_path)
    }

    /// Pure snapshot of the manager's state.
    pub fn safety_report(&self) -> SafetyReport {
        let state = self.state();
        SafetyReport {
            safety_status: "ACTIVE",
            match_policy: self.matcher.policy(),
            protected_path_count: self.matcher.len(),
            safety_rule_count: self.safety_rules.len(),
            critical_rule_count: self.safety_rules.iter().filter(|r| r.is_critical()).count(),
            sandbox_count: state.sandboxes.len(),
            audit_trail_length: state.audit.entries().len(),
            sandboxes: state.sandboxes.clone(),
            recent_operations: state.audit.recent(RECENT_OPERATIONS),
            safety_summary: SafetySummary::ACTIVE,
        }
    }

    /// Re-checksum every concrete protected file that has an expected checksum.
    ///
    /// Files without one are counted as verified without comparison.
    /// Mismatches are reported, never corrected.
    pub fn verify_integrity(&self) -> IntegrityReport {
        let mut verified = 0;
        let mut issues = Vec::new();

        for rule in self.matcher.rules().filter(|r| !r.is_glob()) {
            let path = self.matcher.resolve(Path::new(&rule.pattern));
            if !std::fs::metadata(&path).is_ok_and(|m| m.is_file()) {
                continue;
            }

            let current = match file_sha256(&path) {
                Ok(checksum) => checksum,
                Err(e) => {
                    issues.push(IntegrityIssue::VerificationError {
                        file: path,
                        error: e.to_string(),
                    });
                    continue;
                }
            };

            match self.expected_checksum(rule, &path) {
                Some(expected) if !expected.eq_ignore_ascii_case(&current) => {
                    tracing::error!(
                        severity = "CRITICAL",
                        file = %path.display(),
                        expected = %expected,
                        current = %current,
                        "INTEGRITY VIOLATION on protected file"
                    );
                    issues.push(IntegrityIssue::IntegrityViolation {
                        file: path,
                        expected_checksum: expected.to_string(),
                        current_checksum: current,
                    });
                }
                _ => verified += 1,
            }
        }

        let report = IntegrityReport::new(verified, issues);
        tracing::info!(
            verified = report.verified_count,
            issues = report.issues.len(),
            all_valid = report.all_valid,
            "Integrity verification completed"
        );
        report
    }

    /// All audit entries recorded so far, oldest first.
    pub fn audit_trail(&self) -> Vec<AuditEntry> {
        self.state().audit.entries().to_vec()
    }

    pub fn audit_len(&self) -> usize {
        self.state().audit.entries().len()
    }

    pub fn sandbox(&self, caller: &str) -> Option<SandboxRecord> {
        self.state().sandboxes.get(caller).cloned()
    }

    fn state(&self) -> MutexGuard<'_, ManagerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn sandbox_path(&self, caller: &str) -> Result<PathBuf, IsolationError> {
        validate_caller_id(caller)?;
        Ok(self.sandbox_root.join(caller))
    }

    fn expected_checksum<'a>(&'a self, rule: &'a ProtectedPathRule, path: &Path) -> Option<&'a str> {
        rule.expected_checksum
            .as_deref()
            .or_else(|| self.baseline.get(path).map(String::as_str))
    }

    fn deny_if_protected(&self, caller: &str, path: &Path) -> Result<(), IsolationError> {
        let resolved = self.matcher.resolve(path);
        // Symlinks are followed so an innocent-looking alias cannot reach a protected file.
        let canonical = std::fs::canonicalize(&resolved).ok();

        if let Some(rule) = self
            .matcher
            .matching_rule(path)
            .or_else(|| canonical.as_deref().and_then(|c| self.matcher.matching_rule(c)))
        {
            tracing::error!(
                severity = "CRITICAL",
                caller,
                path = %path.display(),
                rule = %rule.pattern,
                protection_level = ?rule.protection_level,
                "BLOCKED: attempt to access protected path"
            );
            return Err(IsolationError::Denied {
                caller: caller.to_string(),
                path: path.to_path_buf(),
                pattern: rule.pattern.clone(),
            });
        }

        if let Some(owner) = std::iter::once(resolved.as_path())
            .chain(canonical.as_deref())
            .find_map(|candidate| self.foreign_sandbox(caller, candidate))
        {
            tracing::error!(
                severity = "CRITICAL",
                caller,
                path = %path.display(),
                sandbox = %owner.display(),
                "BLOCKED: attempt to access another caller's sandbox"
            );
            return Err(IsolationError::Denied {
                caller: caller.to_string(),
                path: path.to_path_buf(),
                pattern: owner.display().to_string(),
            });
        }

        Ok(())
    }

    /// The sandbox directory containing `path` when it belongs to a caller
    /// other than `caller`.
    fn foreign_sandbox(&self, caller: &str, path: &Path) -> Option<PathBuf> {
        let canonical_root = std::fs::canonicalize(&self.sandbox_root).ok();
        [Some(self.sandbox_root.as_path()), canonical_root.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|root| {
                let owner = path.strip_prefix(root).ok()?.components().next()?;
                match owner {
                    Component::Normal(name) if name != OsStr::new(caller) => Some(root.join(name)),
                    _ => None,
                }
            })
    }

    /// Produce a verified copy of `path` and read it back.
    fn materialize(&self, caller: &str, path: &Path) -> Result<(PathBuf, Vec<u8>), IsolationError> {
        self.deny_if_protected(caller, path)?;
        let copy = self.safe_copy(caller, path, None)?;
        let bytes = std::fs::read(&copy)
            .map_err(|e| IsolationError::storage(format!("reading {}", copy.display()), e))?;
        Ok((copy, bytes))
    }

    fn record_read(&self, caller: &str, original: &Path, copy: PathBuf, content_length: usize) {
        self.record(
            caller,
            AuditDetails::Read {
                original_path: original.to_path_buf(),
                copy_path: copy,
                content_length,
            },
        );
    }

    /// Append to the audit trail and bump the caller's counter under one lock.
    fn record(&self, caller: &str, details: AuditDetails) -> AuditEntry {
        let enforced: Vec<String> = self
            .safety_rules
            .iter()
            .filter(|r| r.enforced)
            .map(|r| r.id.clone())
            .collect();

        let mut state = self.state();
        let entry = state.audit.append(caller, details, enforced);
        if let Some(record) = state.sandboxes.get_mut(caller) {
            record.record(entry.clone());
        }
        entry
    }
}

fn create_parent(path: &Path) -> Result<(), IsolationError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            IsolationError::storage(format!("creating directory {}", parent.display()), e)
        })?;
    }
    Ok(())
}

fn same_file(a: &Path, b: &Path) -> bool {
    match (std::fs::canonicalize(a), std::fs::canonicalize(b)) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn capture_baseline(matcher: &ProtectedPathMatcher) -> HashMap<PathBuf, String> {
    let mut baseline = HashMap::new();
    for rule in matcher
        .rules()
        .filter(|r| !r.is_glob() && r.expected_checksum.is_none())
    {
        let path = matcher.resolve(Path::new(&rule.pattern));
        if !path.is_file() {
            continue;
        }
        match file_sha256(&path) {
            Ok(checksum) => {
                baseline.insert(path, checksum);
            }
            Err(e) => tracing::warn!(
                file = %path.display(),
                error = %e,
                "Could not capture baseline checksum"
            ),
        }
    }
    baseline
}
