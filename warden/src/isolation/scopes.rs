use std::path::{Component, Path, PathBuf};

use super::error::IsolationError;

/// Normalize a path lexically (without filesystem access).
///
/// `..` never climbs above the root of an absolute path. Leading `..`
/// components of a relative path are kept, so joining the result onto a base
/// still names the same file.
pub fn normalize_path_lexically(path: &Path) -> PathBuf {
    let mut stack = Vec::new();

    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => match stack.last() {
                Some(Component::Normal(_)) => {
                    stack.pop();
                }
                Some(Component::RootDir | Component::Prefix(_)) => {}
                Some(Component::ParentDir | Component::CurDir) | None => {
                    stack.push(Component::ParentDir)
                }
            },
            c => stack.push(c),
        }
    }

    stack.iter().collect()
}

/// Validate a caller identity before it is used as a sandbox directory name.
///
/// Must be exactly one path component of ASCII alphanumerics, `-`, `_` or `.`.
pub(crate) fn validate_caller_id(caller: &str) -> Result<(), IsolationError> {
    if caller.is_empty() {
        return Err(IsolationError::invalid_name(caller, "caller id is empty"));
    }
    if caller == "." || caller == ".." {
        return Err(IsolationError::invalid_name(
            caller,
            "caller id must not be a relative directory reference",
        ));
    }
    if let Some(bad) = caller
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')))
    {
        return Err(IsolationError::invalid_name(
            caller,
            format!("caller id contains disallowed character {bad:?}"),
        ));
    }
    Ok(())
}

/// Resolve `name` beneath `base`, rejecting anything that could land outside it.
///
/// Nested relative names (`reports/daily.json`) are allowed.
pub(crate) fn join_within(base: &Path, name: &str) -> Result<PathBuf, IsolationError> {
    let relative = Path::new(name);
    let mut has_normal = false;
    for component in relative.components() {
        match component {
            Component::Normal(_) => has_normal = true,
            Component::CurDir => {}
            Component::ParentDir => {
                return Err(IsolationError::invalid_name(
                    name,
                    "parent directory references are not allowed",
                ));
            }
            Component::RootDir | Component::Prefix(_) => {
                return Err(IsolationError::invalid_name(
                    name,
                    "absolute paths are not allowed",
                ));
            }
        }
    }
    if !has_normal {
        return Err(IsolationError::invalid_name(name, "file name is empty"));
    }
    Ok(base.join(normalize_path_lexically(relative)))
}
