//! Build configuration and compiler invocation for zmake.
//!
//! This crate provides:
//! - The project configuration format (`zmake.cfg`)
//! - Synthesis of the compiler command from configuration and overrides
//! - compile_commands.json reading and writing
//!
//! # Example
//!
//! ```toml
//! # zmake.cfg
//! [package]
//! name = "demo"
//! version = "0.1.0"
//!
//! [build]
//! version = "c++17"
//! autoflags = "-Wall -Wextra -Wpedantic"
//! include = "include () $ZMAKE_ROOT/global/include (-w)"
//! libraries = "lib () $ZMAKE_ROOT/global/lib ()"
//!
//! [profile.dev]
//! compiler = "gcc"
//! optimization = ""
//! flags = ""
//! ```

mod compile_commands;
mod config;
mod error;
mod invocation;

pub use compile_commands::{CompileCommand, CompileCommands, COMPILE_COMMANDS_FILE};
pub use config::{
    parse_path_list, zmake_root, BuildConfig, BuildSettings, PackageConfig, PathEntry,
    ProfileConfig, CONFIG_FILE, DEFAULT_PROFILE, ROOT_VARIABLE,
};
pub use error::{BuildError, PathKind, Result};
pub use invocation::{
    normalize_compiler, normalize_std, BuildOverrides, CompilerFamily, Host, Invocation,
    Synthesizer, CUSTOM_PROFILE,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_basic_config() {
        let toml = r#"
[package]
name = "test-project"

[profile.dev]
compiler = "gcc"
        "#;

        let config = BuildConfig::parse(toml).expect("Failed to parse config");
        assert_eq!(config.package.name.as_deref(), Some("test-project"));
        assert_eq!(config.profiles.len(), 1);
        assert!(config.build.autoflags.is_empty());
    }
}
