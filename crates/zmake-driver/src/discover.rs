//! Source discovery.
//!
//! In project mode every fragment and plain source under `src/` is picked up.
//! In explicit mode the files named on the command line are used instead; a
//! `dir/*.zpp` argument stands for every fragment directly inside `dir`.

use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use walkdir::WalkDir;
use zmake_amalgam::{SourceKind, ENTRY_POINT};

use crate::error::{DriverError, Result};

/// Directory scanned in project mode.
pub const SOURCE_DIR: &str = "src";

/// File name of the bootstrap fragment.
pub const BOOTSTRAP_FILE: &str = "defaultinclude.hpp";

/// Files found for one build.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sources {
    /// Project fragments, a fragment with stem `main` first.
    pub fragments: Vec<PathBuf>,
    /// Fragments found in configured include directories.
    pub library_fragments: Vec<PathBuf>,
    /// Plain `.c/.cpp/.cc` files, compiled as they are.
    pub plain_files: Vec<PathBuf>,
    pub bootstrap: Option<PathBuf>,
}

impl Sources {
    fn add(&mut self, path: PathBuf) {
        match SourceKind::from_path(&path) {
            Some(SourceKind::Fragment) => push_unique(&mut self.fragments, path),
            Some(SourceKind::Plain) => push_unique(&mut self.plain_files, path),
            None => {}
        }
    }

    /// Move fragments named `main` to the front, keeping relative order.
    fn main_first(&mut self) {
        let (mut ordered, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.fragments)
            .into_iter()
            .partition(|p| p.file_stem().is_some_and(|s| s == ENTRY_POINT));
        ordered.extend(rest);
        self.fragments = ordered;
    }
}

fn push_unique(list: &mut Vec<PathBuf>, path: PathBuf) {
    if !list.contains(&path) {
        list.push(path);
    }
}

/// Every file below `dir`, sorted by name for a stable order.
fn walk(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.map_err(|e| {
            DriverError::Discovery(format!("Couldn't read {}: {}", dir.display(), e))
        })?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Discover the sources of the project rooted at `project_dir`.
pub fn discover_project(project_dir: &Path) -> Result<Sources> {
    let src = project_dir.join(SOURCE_DIR);
    if !src.is_dir() {
        return Err(DriverError::Discovery(format!(
            "Not a zmake directory: {} has no {}/ folder",
            project_dir.display(),
            SOURCE_DIR
        )));
    }

    let mut sources = Sources::default();
    for path in walk(&src)? {
        sources.add(path);
    }
    sources.main_first();
    debug!(
        fragments = sources.fragments.len(),
        plain_files = sources.plain_files.len(),
        "discovered project sources"
    );
    Ok(sources)
}

/// Use the files named on the command line.
pub fn discover_files(files: &[PathBuf]) -> Result<Sources> {
    let mut sources = Sources::default();
    for file in files {
        let text = file.to_string_lossy();
        if text.ends_with("*.z") || text.ends_with("*.zpp") {
            let dir = match file.parent() {
                Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
                _ => PathBuf::from("."),
            };
            let entries = WalkDir::new(&dir).min_depth(1).max_depth(1).sort_by_file_name();
            for entry in entries {
                let entry = entry.map_err(|e| {
                    DriverError::Discovery(format!("Couldn't read {}: {}", dir.display(), e))
                })?;
                let path = entry.into_path();
                if path.is_file() && SourceKind::from_path(&path) == Some(SourceKind::Fragment) {
                    push_unique(&mut sources.fragments, path);
                }
            }
        } else if SourceKind::from_path(file).is_some() {
            if !file.is_file() {
                return Err(DriverError::Discovery(format!(
                    "Couldn't find file \"{}\"",
                    file.display()
                )));
            }
            sources.add(file.clone());
        } else {
            return Err(DriverError::Discovery(format!(
                "Unsupported file \"{}\": expected .z, .zpp, .c, .cpp or .cc",
                file.display()
            )));
        }
    }
    sources.main_first();
    Ok(sources)
}

/// Fragments below the configured include directories.
pub fn library_fragments(include_dirs: &[PathBuf]) -> Result<Vec<PathBuf>> {
    let mut found = Vec::new();
    for dir in include_dirs.iter().filter(|d| d.is_dir()) {
        for path in walk(dir)? {
            if SourceKind::from_path(&path) == Some(SourceKind::Fragment) {
                push_unique(&mut found, path);
            }
        }
    }
    Ok(found)
}

/// The bootstrap fragment: the project's own copy, else the global one.
pub fn find_bootstrap(project_dir: &Path, zmake_root: &Path) -> Option<PathBuf> {
    let local = project_dir.join(BOOTSTRAP_FILE);
    if local.is_file() {
        return Some(local);
    }
    let global = zmake_root.join("global").join(BOOTSTRAP_FILE);
    if global.is_file() {
        return Some(global);
    }
    warn!(
        "no {} in {} or {}, building without it",
        BOOTSTRAP_FILE,
        project_dir.display(),
        zmake_root.join("global").display()
    );
    None
}
