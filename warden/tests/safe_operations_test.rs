//! Safe copy / read / write behavior of the isolation manager.

use std::path::PathBuf;

use tempfile::tempdir;
use warden::config::IsolationConfig;
use warden::isolation::{
    AuditDetails, COPIES_DIR, ErrorKind, IsolationError, IsolationManager, OUTPUT_DIR,
    OperationKind, ProtectedPathRule, SANDBOX_SUBDIRS, sha256_hex,
};
use warden::test_utils::{CorruptingCopier, FailingCopier, TestProject};

fn sandbox_files(project: &TestProject) -> Vec<PathBuf> {
    project
        .files()
        .unwrap()
        .into_iter()
        .filter(|p| p.starts_with(".warden"))
        .collect()
}

#[test]
fn test_read_of_protected_path_is_denied_without_side_effects() {
    let project = TestProject::scaffold().unwrap();
    let manager = project.manager(&["secrets/"]).unwrap();
    let before = project.files().unwrap();

    let err = manager.safe_read("agentA", "secrets/key.txt").unwrap_err();
    match &err {
        IsolationError::Denied {
            caller, pattern, ..
        } => {
            assert_eq!(caller, "agentA");
            assert_eq!(pattern, "secrets/");
        }
        other => panic!("expected Denied, got {other:?}"),
    }

    assert_eq!(project.files().unwrap(), before);
    assert_eq!(manager.audit_len(), 0);
    assert!(manager.sandbox("agentA").is_none());
}

#[test]
fn test_copy_of_protected_path_is_denied() {
    let project = TestProject::scaffold().unwrap();
    let manager = project.manager(&["Cargo.toml", "secrets/"]).unwrap();

    for path in ["Cargo.toml", "./secrets/../Cargo.toml", "secrets/key.txt"] {
        let err = manager.safe_copy("agentA", path, None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Denied, "{path}");
    }
    let absolute = project.path("secrets/key.txt");
    let err = manager.safe_copy("agentA", &absolute, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Denied);

    assert!(sandbox_files(&project).is_empty());
    assert_eq!(project.read("secrets/key.txt").unwrap(), b"s3cr3t");
}

#[test]
fn test_copy_readme_is_verified_and_audited() {
    let project = TestProject::scaffold().unwrap();
    let manager = project.manager(&["secrets/"]).unwrap();

    let copy = manager.safe_copy("agentB", "README.md", None).unwrap();
    assert_eq!(std::fs::read_to_string(&copy).unwrap(), "hello");
    assert_eq!(
        copy,
        manager.sandbox_root().join("agentB").join(COPIES_DIR).join("README.md")
    );

    let trail = manager.audit_trail();
    assert_eq!(trail.len(), 1);
    let entry = &trail[0];
    assert_eq!(entry.operation, OperationKind::SafeCopy);
    assert_eq!(entry.caller, "agentB");
    match &entry.details {
        AuditDetails::Copy {
            checksum,
            integrity_verified,
            destination,
            ..
        } => {
            assert_eq!(checksum, &sha256_hex(b"hello"));
            assert_eq!(
                checksum,
                "2cf24dba5fb0a30e26e83b2ac5b9e29e1b161e5c1fa7425e73043362938b9824"
            );
            assert!(integrity_verified);
            assert_eq!(destination, &copy);
        }
        other => panic!("expected copy details, got {other:?}"),
    }
}

#[test]
fn test_copy_is_byte_identical_for_binary_content() {
    let project = TestProject::new().unwrap();
    let bytes: Vec<u8> = (0..=255u8).cycle().take(200_000).collect();
    project.write("data/blob.bin", &bytes).unwrap();
    let manager = project.manager(&[]).unwrap();

    let copy = manager
        .safe_copy("agentA", "data/blob.bin", Some("renamed.bin"))
        .unwrap();
    assert!(copy.ends_with("copies/renamed.bin"));
    assert_eq!(std::fs::read(copy).unwrap(), bytes);
    assert_eq!(manager.safe_read_bytes("agentA", "data/blob.bin").unwrap(), bytes);
}

#[test]
fn test_corrupted_copy_is_removed_and_reported() {
    let project = TestProject::scaffold().unwrap();
    let copier = CorruptingCopier::default();
    let manager =
        IsolationManager::with_copier(project.config(&["secrets/"]), Box::new(copier)).unwrap();

    let err = manager.safe_copy("agentA", "README.md", None).unwrap_err();
    match &err {
        IsolationError::IntegrityFault {
            expected, actual, ..
        } => {
            assert_eq!(expected, &sha256_hex(b"hello"));
            assert_ne!(expected, actual);
        }
        other => panic!("expected IntegrityFault, got {other:?}"),
    }

    let sandbox = manager.sandbox("agentA").unwrap();
    assert!(!sandbox.copies_dir().join("README.md").exists());
    assert_eq!(project.read("README.md").unwrap(), b"hello");
    assert_eq!(manager.audit_len(), 0);

    let err = manager.safe_read("agentA", "README.md").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::IntegrityFault);
}

#[test]
fn test_copier_failure_is_storage_fault() {
    let project = TestProject::scaffold().unwrap();
    let manager = IsolationManager::with_copier(
        project.config(&[]),
        Box::new(FailingCopier(std::io::ErrorKind::PermissionDenied)),
    )
    .unwrap();

    let err = manager.safe_copy("agentA", "README.md", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageFault);
    assert_eq!(manager.audit_len(), 0);
}

#[test]
fn test_missing_source_is_not_found() {
    let project = TestProject::new().unwrap();
    let manager = project.manager(&["secrets/"]).unwrap();

    let err = manager.safe_copy("agentA", "nope.txt", None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::NotFound);
    assert!(manager.sandbox("agentA").is_none());

    // Reads check protection before existence.
    let err = manager.safe_read("agentA", "secrets/missing.txt").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Denied);
}

#[test]
fn test_read_records_copy_then_read() {
    let project = TestProject::scaffold().unwrap();
    let manager = project.manager(&["secrets/"]).unwrap();

    let content = manager.safe_read("agentA", "src/lib.rs").unwrap();
    assert_eq!(content, "pub fn answer() -> u32 { 42 }\n");

    let trail = manager.audit_trail();
    let ops: Vec<_> = trail.iter().map(|e| e.operation).collect();
    assert_eq!(ops, vec![OperationKind::SafeCopy, OperationKind::SafeRead]);
    match &trail[1].details {
        AuditDetails::Read {
            original_path,
            content_length,
            copy_path,
        } => {
            assert_eq!(original_path, &PathBuf::from("src/lib.rs"));
            assert_eq!(*content_length, content.len());
            assert!(copy_path.starts_with(manager.sandbox_root()));
        }
        other => panic!("expected read details, got {other:?}"),
    }

    let record = manager.sandbox("agentA").unwrap();
    assert_eq!(record.operations_count, 2);
    assert_eq!(record.last_operation.as_ref(), trail.last());
}

#[test]
fn test_read_of_non_utf8_is_storage_fault() {
    let project = TestProject::new().unwrap();
    project.write("bin.dat", [0xFFu8, 0xFE, 0x00]).unwrap();
    let manager = project.manager(&[]).unwrap();

    let err = manager.safe_read("agentA", "bin.dat").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::StorageFault);
    assert_eq!(
        manager.safe_read_bytes("agentA", "bin.dat").unwrap(),
        vec![0xFF, 0xFE, 0x00]
    );
}

#[test]
fn test_write_is_idempotent_and_audited_per_call() {
    let project = TestProject::new().unwrap();
    let manager = project.manager(&[]).unwrap();

    let first = manager.safe_write("agentA", "report body", "report.txt").unwrap();
    let second = manager.safe_write("agentA", "report body", "report.txt").unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first,
        manager.sandbox_root().join("agentA").join(OUTPUT_DIR).join("report.txt")
    );
    assert_eq!(std::fs::read_to_string(&first).unwrap(), "report body");

    let trail = manager.audit_trail();
    assert_eq!(trail.len(), 2);
    let checksums: Vec<_> = trail
        .iter()
        .map(|e| match &e.details {
            AuditDetails::Write {
                checksum,
                content_length,
                ..
            } => {
                assert_eq!(*content_length, 11);
                checksum.clone()
            }
            other => panic!("expected write details, got {other:?}"),
        })
        .collect();
    assert_eq!(checksums[0], checksums[1]);
    assert_eq!(checksums[0], sha256_hex(b"report body"));
}

#[test]
fn test_write_creates_full_sandbox_layout() {
    let project = TestProject::new().unwrap();
    let manager = project.manager(&[]).unwrap();
    manager.safe_write("agentA", "x", "nested/dir/file.txt").unwrap();

    let root = manager.sandbox_root().join("agentA");
    for sub in SANDBOX_SUBDIRS {
        assert!(root.join(sub).is_dir(), "{sub}");
    }
    assert!(root.join(OUTPUT_DIR).join("nested/dir/file.txt").is_file());
}

#[test]
fn test_names_that_escape_the_sandbox_are_rejected() {
    let project = TestProject::scaffold().unwrap();
    let manager = project.manager(&[]).unwrap();

    for filename in ["../escape.txt", "/etc/passwd", "a/../../b", ""] {
        let err = manager.safe_write("agentA", "x", filename).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidName, "{filename:?}");
    }
    for caller in ["", "..", "a/b", "agent A"] {
        let err = manager.safe_write(caller, "x", "ok.txt").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidName, "{caller:?}");
    }
    let err = manager
        .safe_copy("agentA", "README.md", Some("../../README.md"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidName);

    assert!(!project.path("escape.txt").exists());
    assert_eq!(manager.audit_len(), 0);
}

#[test]
fn test_audit_trail_is_append_only() {
    let project = TestProject::scaffold().unwrap();
    let manager = project.manager(&["secrets/"]).unwrap();

    manager.safe_copy("agentA", "README.md", None).unwrap();
    manager.safe_write("agentB", "b", "b.txt").unwrap();
    let snapshot = manager.audit_trail();

    manager.safe_read("agentA", "src/lib.rs").unwrap();
    let _ = manager.safe_read("agentA", "secrets/key.txt");
    manager.safe_write("agentA", "a", "a.txt").unwrap();

    let trail = manager.audit_trail();
    assert_eq!(trail.len(), snapshot.len() + 3);
    assert_eq!(&trail[..snapshot.len()], snapshot.as_slice());
    for (i, entry) in trail.iter().enumerate() {
        assert_eq!(entry.sequence, i as u64);
    }
}

#[cfg(unix)]
#[test]
fn test_symlink_to_protected_file_is_denied() {
    let project = TestProject::scaffold().unwrap();
    std::os::unix::fs::symlink(project.path("secrets/key.txt"), project.path("innocent.txt"))
        .unwrap();
    let manager = project.manager(&["secrets/"]).unwrap();

    let err = manager.safe_read("agentA", "innocent.txt").unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Denied);
}

#[test]
fn test_copying_a_copy_onto_itself_is_rejected() {
    let project = TestProject::scaffold().unwrap();
    let manager = project.manager(&["secrets/"]).unwrap();
    let copy = manager.safe_copy("agentA", "README.md", None).unwrap();

    let err = manager.safe_copy("agentA", &copy, None).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidName);
    assert_eq!(std::fs::read_to_string(&copy).unwrap(), "hello");

    let second = manager
        .safe_copy("agentA", &copy, Some("README.again.md"))
        .unwrap();
    assert_eq!(std::fs::read_to_string(second).unwrap(), "hello");
}

#[cfg(unix)]
#[test]
fn test_symlinked_project_root_still_denies_aliases() {
    let temp = tempdir().unwrap();
    let real = temp.path().join("real");
    std::fs::create_dir_all(real.join("secrets")).unwrap();
    std::fs::write(real.join("secrets/key.txt"), "s3cr3t").unwrap();
    std::os::unix::fs::symlink(real.join("secrets/key.txt"), real.join("innocent.txt")).unwrap();
    let link = temp.path().join("link");
    std::os::unix::fs::symlink(&real, &link).unwrap();

    let manager = IsolationManager::new(
        IsolationConfig::new(&link)
            .with_protected_paths(vec![ProtectedPathRule::critical("secrets/")]),
    )
    .unwrap();

    for path in ["innocent.txt", "secrets/key.txt"] {
        let err = manager.safe_read("agentA", path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Denied, "{path}");
    }
    let err = manager
        .safe_copy("agentA", link.join("innocent.txt"), None)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Denied);
    assert_eq!(manager.audit_len(), 0);
}

#[test]
fn test_relative_parent_path_reads_the_file_outside_the_root() {
    let temp = tempdir().unwrap();
    let project = temp.path().join("project");
    std::fs::create_dir_all(&project).unwrap();
    std::fs::write(project.join("outside.txt"), "INSIDE").unwrap();
    std::fs::write(temp.path().join("outside.txt"), "OUTSIDE").unwrap();

    let manager = IsolationManager::new(
        IsolationConfig::new(&project)
            .with_protected_paths(vec![ProtectedPathRule::critical("secrets/")]),
    )
    .unwrap();

    assert_eq!(manager.safe_read("agentA", "../outside.txt").unwrap(), "OUTSIDE");
    match &manager.audit_trail()[1].details {
        AuditDetails::Read { original_path, .. } => {
            assert_eq!(original_path, &PathBuf::from("../outside.txt"));
        }
        other => panic!("expected read details, got {other:?}"),
    }

    std::fs::remove_file(project.join("outside.txt")).unwrap();
    assert_eq!(manager.safe_read("agentB", "../outside.txt").unwrap(), "OUTSIDE");
}

#[test]
fn test_relative_parent_path_is_still_checked_against_rules() {
    let project = TestProject::scaffold().unwrap();
    let manager = project.manager(&["secrets/"]).unwrap();

    let err = manager
        .safe_read("agentA", "src/../secrets/key.txt")
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Denied);
}

#[test]
fn test_another_callers_sandbox_cannot_be_read() {
    let project = TestProject::scaffold().unwrap();
    let manager = project.manager(&["secrets/"]).unwrap();
    let written = manager.safe_write("agentA", "private notes", "x.txt").unwrap();
    let relative = PathBuf::from(".warden/sandboxes/agentA").join(OUTPUT_DIR).join("x.txt");
    assert_eq!(
        std::fs::canonicalize(project.path(&relative)).unwrap(),
        std::fs::canonicalize(&written).unwrap()
    );

    let owner = manager.sandbox_root().join("agentA");
    for source in [relative.clone(), written.clone()] {
        match manager.safe_copy("agentB", &source, None).unwrap_err() {
            IsolationError::Denied {
                caller, pattern, ..
            } => {
                assert_eq!(caller, "agentB");
                assert_eq!(pattern, owner.display().to_string());
            }
            other => panic!("expected Denied, got {other:?}"),
        }
        let err = manager.safe_read("agentB", &source).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Denied);
    }
    assert!(manager.sandbox("agentB").is_none());
    assert_eq!(manager.audit_len(), 1);

    let copy = manager.safe_copy("agentA", &relative, None).unwrap();
    assert_eq!(std::fs::read_to_string(copy).unwrap(), "private notes");
}
