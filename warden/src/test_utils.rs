//! Test helper utilities for Warden.
//!
//! Temporary project scaffolding and fault-injecting copiers for unit and
//! integration tests. These APIs are intended for test-only code paths.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use anyhow::Result;
use tempfile::TempDir;

use crate::config::IsolationConfig;
use crate::isolation::{FileCopier, IsolationManager, ProtectedPathRule, StdFileCopier};

/// A throwaway project directory that is removed on drop.
#[derive(Debug)]
pub struct TestProject {
    dir: TempDir,
}

impl TestProject {
    pub fn new() -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(&format!("warden_test_{}_", std::process::id()))
            .tempdir()?;
        Ok(Self { dir })
    }

    /// A project pre-populated with a README, a source file, a manifest and a
    /// `secrets/` directory.
    pub fn scaffold() -> Result<Self> {
        let project = Self::new()?;
        project.write("README.md", "hello")?;
        project.write("Cargo.toml", "[package]\nname = \"demo\"\n")?;
        project.write("src/lib.rs", "pub fn answer() -> u32 { 42 }\n")?;
        project.write("secrets/key.txt", "s3cr3t")?;
        Ok(project)
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn path(&self, relative: impl AsRef<Path>) -> PathBuf {
        self.root().join(relative)
    }

    /// Write `content` at `relative`, creating parent directories.
    pub fn write(&self, relative: impl AsRef<Path>, content: impl AsRef<[u8]>) -> Result<PathBuf> {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&path, content)?;
        Ok(path)
    }

    pub fn read(&self, relative: impl AsRef<Path>) -> Result<Vec<u8>> {
        Ok(std::fs::read(self.path(relative))?)
    }

    /// Configuration rooted at this project protecting only `patterns`.
    pub fn config(&self, patterns: &[&str]) -> IsolationConfig {
        IsolationConfig::new(self.root()).with_protected_paths(
            patterns
                .iter()
                .map(|p| ProtectedPathRule::critical(*p))
                .collect(),
        )
    }

    pub fn manager(&self, patterns: &[&str]) -> Result<IsolationManager> {
        IsolationManager::new(self.config(patterns))
    }

    /// Every file under the project, relative to its root, sorted.
    pub fn files(&self) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        collect_files(self.root(), self.root(), &mut files)?;
        files.sort();
        Ok(files)
    }
}

fn collect_files(root: &Path, dir: &Path, files: &mut Vec<PathBuf>) -> io::Result<()> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_files(root, &path, files)?;
        } else if let Ok(relative) = path.strip_prefix(root) {
            files.push(relative.to_path_buf());
        }
    }
    Ok(())
}

/// Copies normally, then flips the first byte of the destination.
#[derive(Debug, Default)]
pub struct CorruptingCopier {
    calls: AtomicUsize,
}

impl CorruptingCopier {
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::Relaxed)
    }
}

impl FileCopier for CorruptingCopier {
    fn copy(&self, source: &Path, destination: &Path) -> io::Result<u64> {
        self.calls.fetch_add(1, Ordering::Relaxed);
        let copied = StdFileCopier.copy(source, destination)?;
        let mut bytes = std::fs::read(destination)?;
        match bytes.first_mut() {
            Some(first) => *first ^= 0xFF,
            None => bytes.push(0),
        }
        std::fs::write(destination, bytes)?;
        Ok(copied)
    }
}

/// Fails every copy with the given error kind.
#[derive(Debug, Clone, Copy)]
pub struct FailingCopier(pub io::ErrorKind);

impl FileCopier for FailingCopier {
    fn copy(&self, _source: &Path, _destination: &Path) -> io::Result<u64> {
        Err(io::Error::new(self.0, "simulated copy failure"))
    }
}
