use std::path::PathBuf;

/// Errors returned by every safe operation of the isolation manager.
///
/// All variants are recoverable: callers are expected to log them and keep
/// going with their next polling cycle.
#[derive(Debug, thiserror::Error)]
pub enum IsolationError {
    #[error("Source path '{path:?}' does not exist")]
    NotFound { path: PathBuf },

    #[error("BLOCKED: caller '{caller}' attempted to access protected path '{path:?}' (rule '{pattern}')")]
    Denied {
        caller: String,
        path: PathBuf,
        pattern: String,
    },

    #[error(
        "Copy integrity failed for '{path:?}': expected checksum {expected}, got {}",
        format_actual(.actual)
    )]
    IntegrityFault {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    #[error("Storage fault while {context}: {source}")]
    StorageFault {
        context: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid name '{name}': {reason}")]
    InvalidName { name: String, reason: String },
}

/// Coarse category of an [`IsolationError`], for callers that branch on it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    Denied,
    IntegrityFault,
    StorageFault,
    InvalidName,
}

impl IsolationError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            IsolationError::NotFound { .. } => ErrorKind::NotFound,
            IsolationError::Denied { .. } => ErrorKind::Denied,
            IsolationError::IntegrityFault { .. } => ErrorKind::IntegrityFault,
            IsolationError::StorageFault { .. } => ErrorKind::StorageFault,
            IsolationError::InvalidName { .. } => ErrorKind::InvalidName,
        }
    }

    pub(crate) fn storage(context: impl Into<String>, source: std::io::Error) -> Self {
        IsolationError::StorageFault {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn invalid_name(name: impl Into<String>, reason: impl Into<String>) -> Self {
        IsolationError::InvalidName {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

fn format_actual(actual: &str) -> &str {
    if actual.is_empty() { "<unreadable>" } else { actual }
}
