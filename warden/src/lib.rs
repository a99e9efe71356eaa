//! # Warden
//!
//! Isolation and safe file access for background callers running alongside a
//! project. Callers read originals only through verified sandbox copies, write
//! only inside their own sandbox, and can never touch protected paths. Every
//! operation is audited.
//!
//! The main entry point is [`isolation::IsolationManager`]. The
//! [`supervisor::Supervisor`] drives periodic callers on the tokio runtime, and
//! the `warden` binary exposes the operations on the command line.

pub mod config;
pub mod isolation;
pub mod shell;
pub mod supervisor;
pub mod test_utils;
pub mod utils;
