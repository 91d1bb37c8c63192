//! bount: deploys Django projects to Ubuntu hosts.
//!
//! The heavy lifting lives in the workspace crates (`stack`, `postgres`,
//! `storage`, `ssh`); this crate wires them from the configuration file and
//! exposes the command set used by the binary.

pub mod builder;
pub mod commands;

pub use builder::{build_stack, registry, remote_for, Layout};
pub use commands::Command;
