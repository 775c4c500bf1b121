//! Test utilities for document builds.
//!
//! This crate provides temporary project directories, executable tool stubs
//! and a scripted [`settle::process::ProcessRunner`] used by the integration
//! tests.

pub mod exec;
pub mod project;
pub mod runner;

pub use exec::{fake_latex, make_executable, write_exec};
pub use project::Project;
pub use runner::{ScriptedRunner, command_dir, succeeded};
