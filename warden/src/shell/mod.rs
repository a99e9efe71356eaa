//! # Shell Module
//!
//! Entry point and command-line handling for the `warden` binary: argument
//! parsing, configuration resolution and dispatch to the isolation manager.

pub mod cli;

pub use cli::{Cli, Command, load_config, run, run_command};
