//! Fragment sources and the set they are interned in.

use rustc_hash::FxHashMap;
use std::ops::Index;
use std::path::{Path, PathBuf};

use crate::error::{AmalgamError, Result};

/// Unique identifier for a fragment within a [`FragmentSet`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FragmentId(u32);

impl FragmentId {
    pub fn as_u32(self) -> u32 {
        self.0
    }

    fn index(self) -> usize {
        self.0 as usize
    }
}

/// The role a source file plays in a build.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SourceKind {
    /// A `.z` / `.zpp` fragment, merged into the generated unit.
    Fragment,
    /// A plain `.c` / `.cpp` / `.cc` file, handed to the compiler as is.
    Plain,
}

impl SourceKind {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext {
            "z" | "zpp" => Some(SourceKind::Fragment),
            "c" | "cpp" | "cc" => Some(SourceKind::Plain),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|e| e.to_str())
            .and_then(SourceKind::from_extension)
    }
}

/// Whether an include target names another fragment.
pub fn is_fragment_target(target: &str) -> bool {
    target.ends_with(".zpp") || target.ends_with(".z")
}

/// A fragment file with its lines. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fragment {
    path: PathBuf,
    lines: Vec<String>,
}

impl Fragment {
    /// Build a fragment from in-memory text.
    pub fn from_source(path: impl Into<PathBuf>, content: &str) -> Self {
        let lines = content
            .split('\n')
            .map(|line| line.strip_suffix('\r').unwrap_or(line).to_string())
            .collect::<Vec<_>>();

        // A trailing newline does not start another line.
        let lines = match lines.split_last() {
            Some((last, rest)) if last.is_empty() => rest.to_vec(),
            _ => lines,
        };

        Self {
            path: path.into(),
            lines,
        }
    }

    /// Read a fragment from disk.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).map_err(|source| AmalgamError::FragmentUnreadable {
                path: path.to_path_buf(),
                source,
            })?;
        Ok(Self::from_source(path, &content))
    }

    /// Read a fragment from disk, recording its path relative to `base` when
    /// it lies inside it.
    pub fn load_relative(path: impl AsRef<Path>, base: &Path) -> Result<Self> {
        let path = path.as_ref();
        let mut fragment = Self::load(path)?;
        if let Ok(relative) = path.strip_prefix(base) {
            fragment.path = relative.to_path_buf();
        }
        Ok(fragment)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File name used to resolve fragment includes.
    pub fn name(&self) -> &str {
        self.path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// File stem, `main` for `src/main.zpp`.
    pub fn stem(&self) -> &str {
        self.path
            .file_stem()
            .and_then(|n| n.to_str())
            .unwrap_or_default()
    }

    /// Path as shown in provenance comments.
    pub fn display_path(&self) -> String {
        self.path.display().to_string()
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    pub fn line_count(&self) -> usize {
        self.lines.len()
    }
}

/// Registry of every fragment known to one amalgamation.
#[derive(Debug, Default, Clone)]
pub struct FragmentSet {
    fragments: Vec<Fragment>,
    by_name: FxHashMap<String, FragmentId>,
}

impl FragmentSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a fragment. When two fragments share a file name, lookups by name
    /// resolve to the first one added.
    pub fn push(&mut self, fragment: Fragment) -> FragmentId {
        let id = FragmentId(self.fragments.len() as u32);
        self.by_name
            .entry(fragment.name().to_string())
            .or_insert(id);
        self.fragments.push(fragment);
        id
    }

    pub fn get(&self, id: FragmentId) -> Option<&Fragment> {
        self.fragments.get(id.index())
    }

    pub fn find_by_name(&self, name: &str) -> Option<FragmentId> {
        self.by_name.get(name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (FragmentId, &Fragment)> {
        self.fragments
            .iter()
            .enumerate()
            .map(|(i, f)| (FragmentId(i as u32), f))
    }

    pub fn len(&self) -> usize {
        self.fragments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fragments.is_empty()
    }
}

impl Index<FragmentId> for FragmentSet {
    type Output = Fragment;

    fn index(&self, id: FragmentId) -> &Fragment {
        &self.fragments[id.index()]
    }
}
