//! compile_commands.json reading and writing.
//!
//! zmake writes an entry for the generated unit so that editor tooling can
//! index the amalgamated source with the exact flags it was compiled with.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{BuildError, Result};
use crate::invocation::Invocation;

/// File name of the compilation database.
pub const COMPILE_COMMANDS_FILE: &str = "compile_commands.json";

/// A single compile command from compile_commands.json.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompileCommand {
    /// The working directory for compilation.
    pub directory: PathBuf,

    /// The source file path.
    pub file: PathBuf,

    /// The full compilation command (shell-quoted).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<String>,

    /// The compilation arguments (array form).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub arguments: Option<Vec<String>>,

    /// Output file (optional).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub output: Option<PathBuf>,
}

impl CompileCommand {
    /// Entry for `file` compiled by `invocation` from `directory`.
    pub fn from_invocation(invocation: &Invocation, directory: &Path, file: &Path) -> Self {
        let mut arguments = Vec::with_capacity(invocation.args.len() + 1);
        arguments.push(invocation.program.clone());
        arguments.extend(invocation.args.iter().cloned());
        Self {
            directory: directory.to_path_buf(),
            file: file.to_path_buf(),
            command: None,
            arguments: Some(arguments),
            output: invocation.output.clone(),
        }
    }
}

/// Collection of compile commands (from compile_commands.json).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CompileCommands {
    commands: Vec<CompileCommand>,
}

impl CompileCommands {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load compile commands from a JSON file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| BuildError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Load `path` if it exists, otherwise start empty.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::new())
        }
    }

    /// Parse compile commands from a JSON string.
    pub fn parse(json: &str) -> Result<Self> {
        let commands: Vec<CompileCommand> = serde_json::from_str(json)?;
        Ok(Self { commands })
    }

    /// Get all compile commands.
    pub fn commands(&self) -> &[CompileCommand] {
        &self.commands
    }

    /// Add `command`, replacing any entry for the same file.
    pub fn upsert(&mut self, command: CompileCommand) {
        match self.commands.iter_mut().find(|c| c.file == command.file) {
            Some(existing) => *existing = command,
            None => self.commands.push(command),
        }
    }

    /// Serialize as pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.commands)?)
    }

    /// Write the database to `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        let json = self.to_json()?;
        std::fs::write(path, json).map_err(|source| BuildError::WriteFile {
            path: path.to_path_buf(),
            source,
        })
    }
}
