//! Build driver for zmake.
//!
//! Ties discovery, amalgamation and compiler invocation together. A build is
//! split into [`Driver::plan`], which reads everything and decides what to
//! do without touching the disk, and [`Driver::compile`], which writes the
//! generated unit and the compilation database and runs the compiler.

mod compiler;
mod discover;
mod error;

pub use discover::{
    discover_files, discover_project, find_bootstrap, library_fragments, Sources,
    BOOTSTRAP_FILE, SOURCE_DIR,
};
pub use error::{DriverError, Result};

use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::time::{Duration, Instant};
use tracing::{info, warn};
use zmake_amalgam::{
    amalgamate, AmalgamInput, AmalgamOptions, Amalgamation, AssemblyOptions, Fragment, ScanPolicy,
};
use zmake_build::{
    zmake_root, BuildConfig, BuildOverrides, CompileCommand, CompileCommands, Host, Invocation,
    Synthesizer, COMPILE_COMMANDS_FILE, CONFIG_FILE,
};

/// Directory that receives build outputs in project mode.
pub const TARGET_DIR: &str = "target";

/// Global configuration used when files are given explicitly.
pub const GLOBAL_CONFIG_FILE: &str = "defaultconfig.cfg";

/// Everything the user asked for.
#[derive(Debug, Clone)]
pub struct BuildRequest {
    pub project_dir: PathBuf,
    /// Files named on the command line; empty means project mode.
    pub files: Vec<PathBuf>,
    pub overrides: BuildOverrides,
    pub scan_policy: ScanPolicy,
    /// Tool root; defaults to [`zmake_root`].
    pub zmake_root: Option<PathBuf>,
    pub host: Host,
}

impl BuildRequest {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            files: Vec::new(),
            overrides: BuildOverrides::default(),
            scan_policy: ScanPolicy::default(),
            zmake_root: None,
            host: Host::current(),
        }
    }

    pub fn is_explicit(&self) -> bool {
        !self.files.is_empty()
    }
}

/// The outcome of [`Driver::plan`].
#[derive(Debug, Clone)]
pub struct BuildPlan {
    pub sources: Sources,
    pub amalgamation: Amalgamation,
    /// Where the generated unit goes, when there is one.
    pub unit_path: Option<PathBuf>,
    pub invocation: Invocation,
    pub target_dir: PathBuf,
}

impl BuildPlan {
    pub fn unit_text(&self) -> Option<&str> {
        self.amalgamation.unit().map(|u| u.text())
    }
}

/// Compiler driver that orchestrates one build.
pub struct Driver {
    request: BuildRequest,
    project_dir: PathBuf,
    zmake_root: PathBuf,
}

impl Driver {
    pub fn new(request: BuildRequest) -> Result<Self> {
        let project_dir = if request.project_dir.is_absolute() {
            request.project_dir.clone()
        } else {
            let cwd = std::env::current_dir().map_err(|source| DriverError::Io {
                path: request.project_dir.clone(),
                source,
            })?;
            cwd.join(&request.project_dir)
        };
        let zmake_root = request.zmake_root.clone().unwrap_or_else(zmake_root);
        Ok(Self {
            request,
            project_dir,
            zmake_root,
        })
    }

    pub fn project_dir(&self) -> &Path {
        &self.project_dir
    }

    /// Load `zmake.cfg`, or the global default configuration in explicit
    /// mode. Falls back to the built-in configuration when neither exists.
    pub fn load_config(&self) -> Result<BuildConfig> {
        let path = if self.request.is_explicit() {
            self.zmake_root.join("global").join(GLOBAL_CONFIG_FILE)
        } else {
            self.project_dir.join(CONFIG_FILE)
        };

        if path.is_file() {
            let config = BuildConfig::from_file(&path)?;
            config.validate_paths(&self.zmake_root, &self.project_dir)?;
            info!(config = %path.display(), "loaded configuration");
            return Ok(config);
        }

        if !self.request.is_explicit() {
            warn!("{} missing in {}, using the default configuration", CONFIG_FILE, self.project_dir.display());
        }
        let mut config = BuildConfig::host_default();
        let pruned = config.prune_missing_paths(&self.zmake_root, &self.project_dir);
        if pruned > 0 {
            info!(pruned, "skipping default include and library paths that don't exist");
        }
        Ok(config)
    }

    /// Find the sources for this build.
    pub fn discover(&self, config: &BuildConfig) -> Result<Sources> {
        let mut sources = if self.request.is_explicit() {
            let files: Vec<PathBuf> = self
                .request
                .files
                .iter()
                .map(|f| self.project_dir.join(f))
                .collect();
            discover_files(&files)?
        } else {
            discover_project(&self.project_dir)?
        };

        let include_dirs: Vec<PathBuf> = config
            .include_paths(&self.zmake_root)
            .iter()
            .map(|e| e.resolved(&self.project_dir))
            .collect();
        sources.library_fragments = library_fragments(&include_dirs)?;
        if !sources.fragments.is_empty() {
            sources.bootstrap = find_bootstrap(&self.project_dir, &self.zmake_root);
        }
        Ok(sources)
    }

    /// Read all inputs and decide what to build, without writing anything.
    pub fn plan(&self) -> Result<BuildPlan> {
        let start = Instant::now();
        let config = self.load_config()?;
        let sources = self.discover(&config)?;

        let input = self.amalgam_input(&sources)?;
        let options = AmalgamOptions {
            scan_policy: self.request.scan_policy,
            assembly: AssemblyOptions::now(),
        };
        let amalgamation = amalgamate(&input, &options)?;

        let target_dir = if self.request.is_explicit() {
            self.project_dir.clone()
        } else {
            self.project_dir.join(TARGET_DIR)
        };

        let overrides = &self.request.overrides;
        let synthesizer = Synthesizer::new(&config, &self.zmake_root, self.request.host);
        let name = synthesizer.program_name(overrides, &self.fallback_name());
        let profile = synthesizer.profile_name(overrides);

        let unit_path = amalgamation
            .unit()
            .map(|_| target_dir.join(format!("{name}_{profile}_zmake.cpp")));
        let files: Vec<PathBuf> = unit_path
            .iter()
            .cloned()
            .chain(sources.plain_files.iter().cloned())
            .collect();

        let invocation =
            synthesizer.synthesize(overrides, &files, &self.project_dir, &target_dir, &name)?;
        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            profile = %invocation.profile,
            "build planned"
        );

        Ok(BuildPlan {
            sources,
            amalgamation,
            unit_path,
            invocation,
            target_dir,
        })
    }

    /// Write the generated unit and the compilation database.
    pub fn write_outputs(&self, plan: &BuildPlan) -> Result<()> {
        std::fs::create_dir_all(&plan.target_dir).map_err(|source| DriverError::Io {
            path: plan.target_dir.clone(),
            source,
        })?;

        if let (Some(path), Some(text)) = (&plan.unit_path, plan.unit_text()) {
            std::fs::write(path, text).map_err(|source| DriverError::Io {
                path: path.clone(),
                source,
            })?;
            info!(unit = %path.display(), "wrote translation unit");
        }

        let db_path = plan.target_dir.join(COMPILE_COMMANDS_FILE);
        let mut commands = CompileCommands::load_or_default(&db_path)?;
        let files = plan.unit_path.iter().chain(plan.sources.plain_files.iter());
        for file in files {
            commands.upsert(CompileCommand::from_invocation(
                &plan.invocation,
                &self.project_dir,
                file,
            ));
        }
        commands.write(&db_path)?;
        Ok(())
    }

    /// Write outputs and run the compiler.
    pub fn compile(&self, plan: &BuildPlan) -> Result<Duration> {
        self.write_outputs(plan)?;
        let elapsed = compiler::compile(&plan.invocation, &self.project_dir)?;
        info!(
            compiler = %plan.invocation.program,
            elapsed_ms = elapsed.as_millis() as u64,
            "compiled"
        );
        Ok(elapsed)
    }

    /// Run the executable a successful [`Driver::compile`] produced.
    pub fn run(&self, plan: &BuildPlan) -> Result<ExitStatus> {
        let output = plan
            .invocation
            .output
            .as_ref()
            .ok_or(DriverError::NothingToRun)?;
        compiler::run_program(output, &self.project_dir)
    }

    fn amalgam_input(&self, sources: &Sources) -> Result<AmalgamInput> {
        let base = &self.project_dir;
        let mut input = AmalgamInput::new();
        for path in &sources.fragments {
            input.add_fragment(Fragment::load_relative(path, base)?);
        }
        for path in &sources.library_fragments {
            input.add_library_fragment(Fragment::load_relative(path, base)?);
        }
        if let Some(path) = &sources.bootstrap {
            input.set_bootstrap(Fragment::load_relative(path, base)?);
        }
        for path in &sources.plain_files {
            input.add_plain_file(path.strip_prefix(base).unwrap_or(path));
        }
        Ok(input)
    }

    /// Program name when neither the command line nor the config sets one.
    fn fallback_name(&self) -> String {
        self.project_dir
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| "main".to_string())
    }
}
