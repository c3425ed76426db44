//! Spawning the compiler and the built program.

use std::path::Path;
use std::process::{Command, ExitStatus};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use zmake_build::Invocation;

use crate::error::{DriverError, Result};

/// Run `invocation` from `cwd` and wait for it.
pub fn compile(invocation: &Invocation, cwd: &Path) -> Result<Duration> {
    debug!(command = %invocation.command_line(), "spawning compiler");
    let start = Instant::now();
    let status = Command::new(&invocation.program)
        .args(&invocation.args)
        .current_dir(cwd)
        .status()
        .map_err(|source| DriverError::CompilerSpawn {
            program: invocation.program.clone(),
            source,
        })?;

    if !status.success() {
        return Err(DriverError::CompilerFailed {
            program: invocation.program.clone(),
            status: describe(status),
        });
    }
    Ok(start.elapsed())
}

/// Run the built executable in the foreground.
pub fn run_program(program: &Path, cwd: &Path) -> Result<ExitStatus> {
    let program = if program.is_absolute() {
        program.to_path_buf()
    } else {
        cwd.join(program)
    };
    let status = Command::new(&program)
        .current_dir(cwd)
        .status()
        .map_err(|source| DriverError::Io {
            path: program.clone(),
            source,
        })?;
    if !status.success() {
        warn!(program = %program.display(), status = %describe(status), "program exited unsuccessfully");
    }
    Ok(status)
}

fn describe(status: ExitStatus) -> String {
    match status.code() {
        Some(code) => format!("exit code {code}"),
        None => "a signal".to_string(),
    }
}
