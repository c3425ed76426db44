use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;
use zmake_amalgam::AmalgamError;
use zmake_build::BuildError;

pub type Result<T> = std::result::Result<T, DriverError>;

#[derive(Error, Debug, Diagnostic)]
pub enum DriverError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Amalgam(#[from] AmalgamError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Build(#[from] BuildError),

    #[error("I/O error on {}", .path.display())]
    #[diagnostic(code(zmake::driver::io))]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{0}")]
    #[diagnostic(code(zmake::driver::discovery))]
    Discovery(String),

    #[error("Couldn't start compiler \"{program}\"")]
    #[diagnostic(
        code(zmake::driver::compiler_spawn),
        help("check that the compiler is installed and on PATH, or pick another with --compiler")
    )]
    CompilerSpawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} failed with {status}")]
    #[diagnostic(code(zmake::driver::compiler_failed))]
    CompilerFailed { program: String, status: String },

    #[error("Nothing to run: the compiler flags choose their own output")]
    #[diagnostic(code(zmake::driver::nothing_to_run))]
    NothingToRun,
}
