//! Settle core library.
//!
//! An incremental build execution engine for document toolchains. It binds
//! actions to batches of target and source nodes, discovers LaTeX
//! dependencies, and reruns multi-pass tools until their auxiliary outputs
//! stop changing.

pub mod action;
pub mod cli;
pub mod config;
pub mod env;
pub mod executor;
pub mod hasher;
pub mod node;
pub mod process;
pub mod runner;
pub mod scanner;
pub mod subst;
pub mod tex;
