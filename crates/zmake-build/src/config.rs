//! Build configuration types (zmake.cfg format).

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::{Path, PathBuf};

use crate::error::{BuildError, PathKind, Result};

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = "zmake.cfg";

/// Placeholder expanded to the tool root in path lists.
pub const ROOT_VARIABLE: &str = "$ZMAKE_ROOT";

/// Profile used when none is requested.
pub const DEFAULT_PROFILE: &str = "dev";

static PATH_ENTRY_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^([^()]*)\(([^()]*)\)").expect("path entry pattern"));

/// Root build configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildConfig {
    /// Project metadata.
    #[serde(default)]
    pub package: PackageConfig,

    /// Settings shared by every profile.
    #[serde(default)]
    pub build: BuildSettings,

    /// Named profiles (`[profile.dev]`, `[profile.release]`, ...).
    #[serde(rename = "profile", default)]
    pub profiles: BTreeMap<String, ProfileConfig>,
}

/// Project metadata.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackageConfig {
    /// Program name; the output is named `<name>_<profile>`.
    #[serde(default)]
    pub name: Option<String>,

    #[serde(default)]
    pub version: Option<String>,

    #[serde(default)]
    pub author: Option<String>,
}

/// The `[build]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BuildSettings {
    /// C++ standard, e.g. `c++17`.
    #[serde(default)]
    pub version: Option<String>,

    /// Flags passed to every profile.
    #[serde(default)]
    pub autoflags: String,

    /// Include directories as `path (options)` pairs.
    #[serde(default)]
    pub include: String,

    /// Library directories as `path (options)` pairs.
    #[serde(default)]
    pub libraries: String,
}

/// A `[profile.<name>]` section.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProfileConfig {
    #[serde(default)]
    pub compiler: Option<String>,

    #[serde(default)]
    pub optimization: String,

    #[serde(default)]
    pub flags: String,
}

/// One directory of an include or library path list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PathEntry {
    pub path: PathBuf,
    /// Option string written between the parentheses, e.g. `-w`.
    pub options: String,
}

impl PathEntry {
    /// Whether warnings from this include directory are silenced.
    pub fn is_system(&self) -> bool {
        matches!(self.options.as_str(), "-w" | "-W")
    }

    /// `path` joined onto `base` unless it is already absolute.
    pub fn resolved(&self, base: &Path) -> PathBuf {
        if self.path.is_absolute() {
            self.path.clone()
        } else {
            base.join(&self.path)
        }
    }
}

/// Parse a list such as `include () $ZMAKE_ROOT/global/include (-w)`.
///
/// Entries without a parenthesized option group are ignored, as is anything
/// after the last complete pair.
pub fn parse_path_list(list: &str, zmake_root: &Path) -> Vec<PathEntry> {
    let root = zmake_root.to_string_lossy();
    let mut entries = Vec::new();
    let mut rest = list;

    while let Some(captures) = PATH_ENTRY_RE.captures(rest) {
        let path = captures[1].trim().replace(ROOT_VARIABLE, &root);
        let options = captures[2].trim().to_string();
        if !path.is_empty() {
            entries.push(PathEntry {
                path: PathBuf::from(path),
                options,
            });
        }
        rest = &rest[captures[0].len()..];
    }
    entries
}

impl BuildConfig {
    /// Load configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| BuildError::ReadConfig {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: BuildConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// The configuration used when a project has no `zmake.cfg`.
    pub fn host_default() -> Self {
        let apple_like = cfg!(any(windows, target_os = "macos"));
        let (compiler, warnings) = if apple_like {
            (
                "clang",
                "-Weverything -Wno-c++98-compat -Wno-c++98-compat-pedantic",
            )
        } else {
            ("gcc", "")
        };
        let join = |a: &str, b: &str| {
            [a, b]
                .iter()
                .filter(|s| !s.is_empty())
                .copied()
                .collect::<Vec<_>>()
                .join(" ")
        };

        let mut profiles = BTreeMap::new();
        profiles.insert(
            "dev".to_string(),
            ProfileConfig {
                compiler: Some(compiler.to_string()),
                optimization: String::new(),
                flags: warnings.to_string(),
            },
        );
        profiles.insert(
            "release".to_string(),
            ProfileConfig {
                compiler: Some(compiler.to_string()),
                optimization: "-Ofast".to_string(),
                flags: join(warnings, "-march=native"),
            },
        );
        let debug_compiler = if cfg!(target_os = "macos") { "clang" } else { "gcc" };
        let debug_warnings = if cfg!(target_os = "macos") { warnings } else { "" };
        profiles.insert(
            "debug".to_string(),
            ProfileConfig {
                compiler: Some(debug_compiler.to_string()),
                optimization: "-Og".to_string(),
                flags: join("-g", debug_warnings),
            },
        );

        let sep = std::path::MAIN_SEPARATOR;
        BuildConfig {
            package: PackageConfig::default(),
            build: BuildSettings {
                version: Some("c++17".to_string()),
                autoflags: "-Wall -Wextra -Wpedantic".to_string(),
                include: format!("include () {ROOT_VARIABLE}{sep}global{sep}include (-w)"),
                libraries: format!("lib () {ROOT_VARIABLE}{sep}global{sep}lib ()"),
            },
            profiles,
        }
    }

    /// Look up a profile section.
    pub fn profile(&self, name: &str) -> Result<&ProfileConfig> {
        self.profiles
            .get(name)
            .ok_or_else(|| BuildError::UnknownProfile(name.to_string()))
    }

    /// Include directories with `$ZMAKE_ROOT` expanded.
    pub fn include_paths(&self, zmake_root: &Path) -> Vec<PathEntry> {
        parse_path_list(&self.build.include, zmake_root)
    }

    /// Library directories with `$ZMAKE_ROOT` expanded.
    pub fn library_paths(&self, zmake_root: &Path) -> Vec<PathEntry> {
        parse_path_list(&self.build.libraries, zmake_root)
    }

    /// Fail on the first configured path that does not exist.
    ///
    /// Relative paths are resolved against `base`, the project directory.
    pub fn validate_paths(&self, zmake_root: &Path, base: &Path) -> Result<()> {
        let includes = self
            .include_paths(zmake_root)
            .into_iter()
            .map(|e| (PathKind::Include, e));
        let libraries = self
            .library_paths(zmake_root)
            .into_iter()
            .map(|e| (PathKind::Library, e));

        for (kind, entry) in includes.chain(libraries) {
            let path = entry.resolved(base);
            if !path.exists() {
                return Err(BuildError::MissingPath { kind, path });
            }
        }
        Ok(())
    }

    /// Drop configured paths that do not exist, returning how many were
    /// removed. Used for the built-in configuration, whose global
    /// directories are optional.
    pub fn prune_missing_paths(&mut self, zmake_root: &Path, base: &Path) -> usize {
        let keep = |entries: Vec<PathEntry>, removed: &mut usize| {
            entries
                .into_iter()
                .filter(|e| {
                    let exists = e.resolved(base).exists();
                    if !exists {
                        *removed += 1;
                    }
                    exists
                })
                .map(|e| format!("{} ({})", e.path.display(), e.options))
                .collect::<Vec<_>>()
                .join(" ")
        };

        let mut removed = 0;
        self.build.include = keep(self.include_paths(zmake_root), &mut removed);
        self.build.libraries = keep(self.library_paths(zmake_root), &mut removed);
        removed
    }

    fn validate(&self) -> Result<()> {
        if let Some(name) = &self.package.name {
            if name.trim().is_empty() {
                return Err(BuildError::Validation(
                    "[package].name must not be empty".to_string(),
                ));
            }
        }
        for (name, profile) in &self.profiles {
            if profile.compiler.as_deref().is_some_and(|c| c.trim().is_empty()) {
                return Err(BuildError::Validation(format!(
                    "[profile.{name}].compiler must not be empty"
                )));
            }
        }
        Ok(())
    }
}

/// The tool root: `$ZMAKE_ROOT`, else `$HOME/zmake`, else
/// `/usr/local/opt/zmake`.
pub fn zmake_root() -> PathBuf {
    zmake_root_from(std::env::var_os("ZMAKE_ROOT"), std::env::var_os("HOME"))
}

fn zmake_root_from(root: Option<OsString>, home: Option<OsString>) -> PathBuf {
    match (root, home) {
        (Some(root), _) if !root.is_empty() => PathBuf::from(root),
        (_, Some(home)) if !home.is_empty() => PathBuf::from(home).join("zmake"),
        _ => PathBuf::from("/usr/local/opt/zmake"),
    }
}
