//! Compiler invocation synthesis.
//!
//! Merges the configuration, the selected profile and command-line overrides
//! into one ordered argument list:
//!
//! ```text
//! <compiler> -std=<v> <sources> <includes> <libraries> <config flags>
//!            <explicit flags> <optimization> -o <output> [-link <libpaths>]
//! ```

use std::path::{Path, PathBuf};
use tracing::debug;

use crate::config::{BuildConfig, PathEntry, ProfileConfig, DEFAULT_PROFILE};
use crate::error::{BuildError, Result};

/// Flags that make the compiler choose its own output.
const OUTPUT_FLAGS: &[&str] = &["-o", "-c", "-S", "-E", "/o", "/c", "/S", "/E"];

/// Profile name used when the compiler is chosen on the command line.
pub const CUSTOM_PROFILE: &str = "custom";

/// Platform the compiler runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Host {
    Windows,
    Unix,
}

impl Host {
    pub fn current() -> Self {
        if cfg!(windows) {
            Host::Windows
        } else {
            Host::Unix
        }
    }
}

/// Command-line spelling the compiler understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompilerFamily {
    /// gcc, clang and friends.
    Posix,
    /// cl and clang-cl.
    Msvc,
}

impl CompilerFamily {
    pub fn of(compiler: &str) -> Self {
        if compiler.ends_with("cl") {
            CompilerFamily::Msvc
        } else {
            CompilerFamily::Posix
        }
    }
}

/// Map a configured compiler name to the program to run.
pub fn normalize_compiler(name: &str, host: Host) -> String {
    let name = strip_switch(name.trim());
    match name {
        "gcc" => "g++".to_string(),
        "msvc" => "cl".to_string(),
        "clang" if host == Host::Windows => "clang-cl".to_string(),
        other => other.to_string(),
    }
}

/// Reduce `-std=c++17`, `/std:c++17` or `c++17` to `c++17`.
pub fn normalize_std(version: &str) -> &str {
    let version = strip_switch(version.trim());
    version
        .strip_prefix("std=")
        .or_else(|| version.strip_prefix("std:"))
        .unwrap_or(version)
}

fn strip_switch(s: &str) -> &str {
    s.strip_prefix('-')
        .or_else(|| s.strip_prefix('/'))
        .unwrap_or(s)
}

/// Values given on the command line; each replaces its configured default.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildOverrides {
    pub profile: Option<String>,
    pub compiler: Option<String>,
    pub std: Option<String>,
    pub optimization: Option<String>,
    pub name: Option<String>,
    /// Flags passed through to the compiler as written.
    pub flags: Vec<String>,
}

impl BuildOverrides {
    /// Whether the explicit flags already choose an output mode.
    pub fn has_output_flag(&self) -> bool {
        self.flags.iter().any(|f| OUTPUT_FLAGS.contains(&f.as_str()))
    }
}

/// A synthesized compiler command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub program: String,
    pub args: Vec<String>,
    /// Executable path, unless the explicit flags chose the output.
    pub output: Option<PathBuf>,
    pub family: CompilerFamily,
    pub profile: String,
    /// Program name without the profile suffix.
    pub name: String,
}

impl Invocation {
    /// Shell-quoted rendering for display.
    pub fn command_line(&self) -> String {
        let words = std::iter::once(self.program.as_str()).chain(self.args.iter().map(String::as_str));
        shlex::try_join(words.clone()).unwrap_or_else(|_| words.collect::<Vec<_>>().join(" "))
    }
}

/// Builds [`Invocation`]s from one configuration.
#[derive(Debug, Clone)]
pub struct Synthesizer<'a> {
    config: &'a BuildConfig,
    zmake_root: PathBuf,
    host: Host,
}

impl<'a> Synthesizer<'a> {
    pub fn new(config: &'a BuildConfig, zmake_root: impl Into<PathBuf>, host: Host) -> Self {
        Self {
            config,
            zmake_root: zmake_root.into(),
            host,
        }
    }

    /// Program name: the override, else `[package].name`, else `fallback`.
    pub fn program_name(&self, overrides: &BuildOverrides, fallback: &str) -> String {
        overrides
            .name
            .clone()
            .or_else(|| self.config.package.name.clone())
            .unwrap_or_else(|| fallback.to_string())
    }

    /// The profile a build with `overrides` ends up using.
    pub fn profile_name(&self, overrides: &BuildOverrides) -> String {
        if overrides.compiler.is_some() {
            CUSTOM_PROFILE.to_string()
        } else {
            overrides
                .profile
                .clone()
                .unwrap_or_else(|| DEFAULT_PROFILE.to_string())
        }
    }

    /// Build the command for `sources`, the generated unit first.
    ///
    /// Relative configured paths are resolved against `project_dir`; the
    /// executable goes to `target_dir/<name>_<profile>`.
    pub fn synthesize(
        &self,
        overrides: &BuildOverrides,
        sources: &[PathBuf],
        project_dir: &Path,
        target_dir: &Path,
        fallback_name: &str,
    ) -> Result<Invocation> {
        let requested = overrides.profile.as_deref().unwrap_or(DEFAULT_PROFILE);
        let custom_compiler = overrides.compiler.is_some();
        let profile_config = match self.config.profile(requested) {
            Ok(profile) => Some(profile),
            Err(_) if custom_compiler => None,
            Err(err) => return Err(err),
        };

        let compiler = overrides
            .compiler
            .clone()
            .or_else(|| profile_config.and_then(|p| p.compiler.clone()))
            .ok_or_else(|| {
                BuildError::Validation(format!("profile \"{requested}\" names no compiler"))
            })?;
        let program = normalize_compiler(&compiler, self.host);
        let family = CompilerFamily::of(&program);
        let profile = self.profile_name(overrides);

        let std = overrides
            .std
            .as_deref()
            .or(self.config.build.version.as_deref())
            .map(normalize_std)
            .filter(|v| !v.is_empty());
        let optimization = overrides
            .optimization
            .clone()
            .or_else(|| profile_config.map(|p| p.optimization.clone()))
            .unwrap_or_default();

        let has_output_flag = overrides.has_output_flag();
        let mut taken: Vec<&str> = overrides.flags.iter().map(String::as_str).collect();
        taken.push(optimization.as_str());
        let config_flags = self.config_flags(profile_config, custom_compiler, has_output_flag, &taken);

        let mut args = Vec::new();
        if let Some(std) = std {
            args.push(match family {
                CompilerFamily::Posix => format!("-std={std}"),
                CompilerFamily::Msvc => format!("-std:{std}"),
            });
        }
        args.extend(sources.iter().map(|s| s.display().to_string()));

        for entry in self.config.include_paths(&self.zmake_root) {
            self.include_args(&entry, &program, project_dir, &mut args);
        }
        let mut link = Vec::new();
        for entry in self.config.library_paths(&self.zmake_root) {
            let path = entry.resolved(project_dir).display().to_string();
            let options = entry.options.split_whitespace().map(str::to_string);
            match family {
                CompilerFamily::Posix => {
                    args.push(format!("-L{path}"));
                    args.extend(options);
                }
                CompilerFamily::Msvc => {
                    link.push(format!("-libpath:{path}"));
                    link.extend(options);
                }
            }
        }

        args.extend(config_flags);
        args.extend(overrides.flags.iter().cloned());
        args.push(optimization);

        let name = self.program_name(overrides, fallback_name);
        let output = (!has_output_flag).then(|| target_dir.join(format!("{name}_{profile}")));
        let mut args = translate_flags(args, family);
        if let Some(output) = &output {
            args.push("-o".to_string());
            args.push(output.display().to_string());
        }
        if !link.is_empty() {
            args.push("-link".to_string());
            args.extend(link);
        }

        debug!(%program, %profile, args = args.len(), "synthesized compiler invocation");
        Ok(Invocation {
            program,
            args,
            output,
            family,
            profile,
            name,
        })
    }

    /// `[build].autoflags` then the profile's flags, split on whitespace.
    ///
    /// A flag already in `taken` or repeated later in the list is skipped, so
    /// the last occurrence wins.
    fn config_flags(
        &self,
        profile: Option<&ProfileConfig>,
        custom_compiler: bool,
        has_output_flag: bool,
        taken: &[&str],
    ) -> Vec<String> {
        let mut words: Vec<&str> = self.config.build.autoflags.split_whitespace().collect();
        if let Some(profile) = profile.filter(|_| !custom_compiler) {
            words.extend(profile.flags.split_whitespace());
        }

        let mut kept: Vec<String> = Vec::new();
        for word in words.into_iter().rev() {
            if has_output_flag && OUTPUT_FLAGS.contains(&word) {
                continue;
            }
            if taken.contains(&word) || kept.iter().any(|k| k == word) {
                continue;
            }
            kept.push(word.to_string());
        }
        kept.reverse();
        kept
    }

    fn include_args(&self, entry: &PathEntry, program: &str, base: &Path, args: &mut Vec<String>) {
        let path = entry.resolved(base).display().to_string();
        if !entry.is_system() {
            args.push(format!("-I{path}"));
        } else if program == "clang-cl" {
            args.push("-Xclang".to_string());
            args.push(format!("-isystem{path}"));
        } else {
            args.push(format!("-isystem{path}"));
        }
    }
}

/// Rewrite flags into the compiler's spelling, dropping empty tokens and
/// rewritten flags that are already present.
fn translate_flags(args: Vec<String>, family: CompilerFamily) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(args.len());
    let all = args.clone();
    for arg in args {
        if arg.is_empty() {
            continue;
        }
        let translated = match (family, arg.as_str()) {
            (CompilerFamily::Msvc, "-fexceptions") => Some("-EHsc"),
            (CompilerFamily::Msvc, "-O0") => Some("-Od"),
            (_, "-pedantic") => Some("-Wpedantic"),
            _ => None,
        };
        match translated {
            Some(flag) if all.iter().chain(out.iter()).any(|a| a == flag) => continue,
            Some(flag) => out.push(flag.to_string()),
            None => out.push(arg),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BuildConfig {
        BuildConfig::parse(
            r#"
[package]
name = "demo"

[build]
version = "c++17"
autoflags = "-Wall -Wextra -Wpedantic"
include = "include () $ZMAKE_ROOT/global/include (-w)"
libraries = "lib ()"

[profile.dev]
compiler = "gcc"
optimization = ""
flags = "-g -Wall"

[profile.release]
compiler = "-msvc"
optimization = "-O2"
flags = "-fexceptions -pedantic"
            "#,
        )
        .unwrap()
    }

    fn synthesize(config: &BuildConfig, overrides: &BuildOverrides, host: Host) -> Invocation {
        Synthesizer::new(config, "/zr", host)
            .synthesize(
                overrides,
                &[PathBuf::from("target/demo_dev_zmake.cpp"), PathBuf::from("src/extra.cpp")],
                Path::new("/p"),
                Path::new("/p/target"),
                "folder",
            )
            .unwrap()
    }

    #[test]
    fn test_posix_argument_order() {
        let config = config();
        let overrides = BuildOverrides {
            flags: vec!["-DX=1".to_string()],
            ..Default::default()
        };
        let inv = synthesize(&config, &overrides, Host::Unix);
        assert_eq!(inv.program, "g++");
        assert_eq!(inv.family, CompilerFamily::Posix);
        assert_eq!(inv.profile, "dev");
        assert_eq!(
            inv.args,
            vec![
                "-std=c++17",
                "target/demo_dev_zmake.cpp",
                "src/extra.cpp",
                "-I/p/include",
                "-isystem/zr/global/include",
                "-L/p/lib",
                "-Wextra",
                "-Wpedantic",
                "-g",
                "-Wall",
                "-DX=1",
                "-o",
                "/p/target/demo_dev",
            ]
        );
        assert_eq!(inv.output, Some(PathBuf::from("/p/target/demo_dev")));
    }

    #[test]
    fn test_msvc_spelling_and_link_group() {
        let config = config();
        let overrides = BuildOverrides {
            profile: Some("release".to_string()),
            flags: vec!["-EHsc".to_string()],
            ..Default::default()
        };
        let inv = synthesize(&config, &overrides, Host::Windows);
        assert_eq!(inv.program, "cl");
        assert_eq!(inv.family, CompilerFamily::Msvc);
        assert_eq!(inv.args[0], "-std:c++17");
        assert!(!inv.args.contains(&"-fexceptions".to_string()));
        assert_eq!(inv.args.iter().filter(|a| *a == "-EHsc").count(), 1);
        assert!(!inv.args.contains(&"-pedantic".to_string()));
        assert!(!inv.args.iter().any(|a| a.starts_with("-L")));
        let link = inv.args.iter().position(|a| a == "-link").unwrap();
        assert_eq!(inv.args[link + 1..], ["-libpath:/p/lib".to_string()]);
        let out = inv.args.iter().position(|a| a == "-o").unwrap();
        assert_eq!(inv.args[out - 1], "-O2");
    }

    #[test]
    fn test_compiler_override_uses_custom_profile() {
        let config = config();
        let overrides = BuildOverrides {
            compiler: Some("clang".to_string()),
            ..Default::default()
        };
        let inv = synthesize(&config, &overrides, Host::Unix);
        assert_eq!(inv.program, "clang");
        assert_eq!(inv.profile, CUSTOM_PROFILE);
        assert!(!inv.args.contains(&"-g".to_string()));
        assert!(inv.args.contains(&"-Wall".to_string()));
        assert_eq!(inv.output, Some(PathBuf::from("/p/target/demo_custom")));

        let inv = synthesize(&config, &overrides, Host::Windows);
        assert_eq!(inv.program, "clang-cl");
        assert_eq!(inv.family, CompilerFamily::Msvc);
        let system = inv.args.iter().position(|a| a == "-Xclang").unwrap();
        assert_eq!(inv.args[system + 1], "-isystem/zr/global/include");
    }

    #[test]
    fn test_explicit_output_flag_suppresses_output() {
        let mut config = config();
        config.build.autoflags.push_str(" -c");
        let overrides = BuildOverrides {
            flags: vec!["-c".to_string()],
            ..Default::default()
        };
        let inv = synthesize(&config, &overrides, Host::Unix);
        assert_eq!(inv.output, None);
        assert!(!inv.args.contains(&"-o".to_string()));
        assert_eq!(inv.args.iter().filter(|a| *a == "-c").count(), 1);
    }

    #[test]
    fn test_overrides_replace_defaults() {
        let config = config();
        let overrides = BuildOverrides {
            std: Some("-std=c++20".to_string()),
            optimization: Some("-O1".to_string()),
            name: Some("tool".to_string()),
            ..Default::default()
        };
        let inv = synthesize(&config, &overrides, Host::Unix);
        assert_eq!(inv.args[0], "-std=c++20");
        assert!(inv.args.contains(&"-O1".to_string()));
        assert_eq!(inv.name, "tool");
        assert_eq!(inv.output, Some(PathBuf::from("/p/target/tool_dev")));
    }

    #[test]
    fn test_unknown_profile_without_compiler_override() {
        let config = config();
        let overrides = BuildOverrides {
            profile: Some("nightly".to_string()),
            ..Default::default()
        };
        let err = Synthesizer::new(&config, "/zr", Host::Unix)
            .synthesize(&overrides, &[], Path::new("/p"), Path::new("/p/target"), "x")
            .unwrap_err();
        assert!(matches!(err, BuildError::UnknownProfile(_)));
    }

    #[test]
    fn test_name_falls_back_to_directory() {
        let mut config = config();
        config.package.name = None;
        let inv = synthesize(&config, &BuildOverrides::default(), Host::Unix);
        assert_eq!(inv.name, "folder");
    }

    #[test]
    fn test_normalization_helpers() {
        assert_eq!(normalize_compiler("gcc", Host::Unix), "g++");
        assert_eq!(normalize_compiler("/msvc", Host::Unix), "cl");
        assert_eq!(normalize_compiler("clang", Host::Unix), "clang");
        assert_eq!(normalize_compiler("clang", Host::Windows), "clang-cl");
        assert_eq!(normalize_std("/std:c++latest"), "c++latest");
        assert_eq!(normalize_std("c++17"), "c++17");
    }

    #[test]
    fn test_command_line_quotes_arguments() {
        let inv = Invocation {
            program: "g++".to_string(),
            args: vec!["my file.cpp".to_string(), "-o".to_string(), "out".to_string()],
            output: Some(PathBuf::from("out")),
            family: CompilerFamily::Posix,
            profile: "dev".to_string(),
            name: "out".to_string(),
        };
        assert_eq!(inv.command_line(), "g++ 'my file.cpp' -o out");
    }
}
