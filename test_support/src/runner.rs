//! A scripted process runner.
//!
//! [`ScriptedRunner`] records every command line and hands it to a closure
//! that plays the part of the external tool, usually by writing the files the
//! real tool would write.

use camino::Utf8PathBuf;
use settle::env::Environment;
use settle::process::{ProcessOutput, ProcessRunner};
use std::io;
use std::sync::Mutex;

type Handler = dyn Fn(&str) -> io::Result<ProcessOutput> + Send + Sync;

/// Records commands and answers them with a handler.
pub struct ScriptedRunner {
    commands: Mutex<Vec<String>>,
    handler: Box<Handler>,
}

impl std::fmt::Debug for ScriptedRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScriptedRunner").finish_non_exhaustive()
    }
}

impl ScriptedRunner {
    /// Answer every command with `handler`.
    pub fn new<F>(handler: F) -> Self
    where
        F: Fn(&str) -> io::Result<ProcessOutput> + Send + Sync + 'static,
    {
        Self {
            commands: Mutex::new(Vec::new()),
            handler: Box::new(handler),
        }
    }

    /// Commands run so far, in order.
    pub fn commands(&self) -> Vec<String> {
        self.commands
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .clone()
    }

    /// How many commands mentioned `tool`.
    pub fn count(&self, tool: &str) -> usize {
        self.commands()
            .iter()
            .filter(|command| command.contains(tool))
            .count()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&self, command: &str, _env: &Environment) -> io::Result<ProcessOutput> {
        self.commands
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(command.to_owned());
        (self.handler)(command)
    }
}

/// Output of a successful command.
pub fn succeeded() -> ProcessOutput {
    ProcessOutput {
        status: Some(0),
        ..ProcessOutput::default()
    }
}

/// The directory a `cd DIR && ...` command line changes into.
pub fn command_dir(command: &str) -> Option<Utf8PathBuf> {
    let rest = command.strip_prefix("cd ")?;
    let (dir, _) = rest.split_once(" && ")?;
    Some(Utf8PathBuf::from(dir.trim_matches('\'')))
}
