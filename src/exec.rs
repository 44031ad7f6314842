//! Process execution and file helpers used by steps.

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use crate::error::AppError;

/// Runs external programs to completion.
pub trait ExecRunner {
    /// Run `program` with `args`; a non-zero exit status is an error.
    fn run_executable(&mut self, program: &str, args: &[String]) -> Result<(), AppError>;
}

/// File system operations a step needs besides running programs.
pub trait FileUtils {
    fn remove_all(&mut self, path: &Path) -> Result<(), AppError>;
    /// Entries of `dir`, sorted. Missing directory yields an empty list.
    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, AppError>;
}

/// Spawns real processes in the current working directory.
#[derive(Debug, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    pub fn new() -> Self {
        Self
    }
}

impl ExecRunner for ProcessRunner {
    fn run_executable(&mut self, program: &str, args: &[String]) -> Result<(), AppError> {
        tracing::info!(program = %program, args = %args.join(" "), "running command");
        let status = Command::new(program)
            .args(args)
            .status()
            .map_err(|e| AppError::Exec(format!("failed to start '{program}': {e}")))?;
        if !status.success() {
            return Err(AppError::Exec(format!("'{program}' exited with {status}")));
        }
        Ok(())
    }
}

impl FileUtils for ProcessRunner {
    fn remove_all(&mut self, path: &Path) -> Result<(), AppError> {
        match fs::remove_dir_all(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Exec(format!("cannot remove {}: {e}", path.display()))),
        }
    }

    fn list_dir(&self, dir: &Path) -> Result<Vec<PathBuf>, AppError> {
        let entries = match fs::read_dir(dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(AppError::Exec(format!("cannot list {}: {e}", dir.display()))),
        };
        let mut paths = entries
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        paths.sort();
        Ok(paths)
    }
}
