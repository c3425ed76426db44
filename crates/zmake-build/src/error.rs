//! Error types for zmake-build.

use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for zmake-build operations.
pub type Result<T> = std::result::Result<T, BuildError>;

/// Errors that can occur while loading configuration or building a command.
#[derive(Error, Debug, Diagnostic)]
pub enum BuildError {
    /// Failed to read a configuration file.
    #[error("Failed to read {}", .path.display())]
    #[diagnostic(code(zmake::build::read_config))]
    ReadConfig {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write a generated file.
    #[error("Failed to write {}", .path.display())]
    #[diagnostic(code(zmake::build::write_file))]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to parse TOML configuration.
    #[error("Failed to parse TOML config: {0}")]
    #[diagnostic(code(zmake::build::toml))]
    ParseToml(#[from] toml::de::Error),

    /// Failed to parse or produce JSON (compile_commands.json).
    #[error("Failed to parse JSON: {0}")]
    #[diagnostic(code(zmake::build::json))]
    ParseJson(#[from] serde_json::Error),

    /// A configured include or library path does not exist.
    #[error("{kind} path \"{}\" in config doesn't exist", .path.display())]
    #[diagnostic(
        code(zmake::build::missing_path),
        help("create the directory or remove it from zmake.cfg")
    )]
    MissingPath { kind: PathKind, path: PathBuf },

    /// The requested profile has no `[profile.<name>]` section.
    #[error("Unknown build profile \"{0}\"")]
    #[diagnostic(
        code(zmake::build::unknown_profile),
        help("add a matching [profile.*] section to zmake.cfg or pass --compiler")
    )]
    UnknownProfile(String),

    /// Configuration validation error.
    #[error("Config validation error: {0}")]
    #[diagnostic(code(zmake::build::validation))]
    Validation(String),
}

/// Which path list a configured path came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathKind {
    Include,
    Library,
}

impl std::fmt::Display for PathKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PathKind::Include => write!(f, "Include"),
            PathKind::Library => write!(f, "Library"),
        }
    }
}
