use clap::{Args, Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use std::io::Write;
use std::path::PathBuf;
use std::time::Instant;
use tracing::info;
use tracing_subscriber::EnvFilter;
use zmake_amalgam::{Amalgamation, ScanPolicy};
use zmake_build::BuildOverrides;
use zmake_driver::{BuildRequest, Driver};

#[derive(Parser)]
#[command(name = "zmake")]
#[command(author, version, about = "Build C++ fragment projects without headers")]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Build with the dev profile and run the program
    Run(BuildArgs),

    /// Build with the release profile
    Build(BuildArgs),

    /// Build with the debug profile
    Debug(BuildArgs),

    /// Print the generated translation unit
    Emit(BuildArgs),
}

#[derive(Args)]
struct BuildArgs {
    /// Fragments or sources to build instead of src/ (`dir/*.zpp` picks every fragment in dir)
    files: Vec<PathBuf>,

    /// Project directory
    #[arg(short = 'C', long, default_value = ".")]
    dir: PathBuf,

    /// Build profile from zmake.cfg
    #[arg(long)]
    profile: Option<String>,

    /// Compiler to use; ignores the profile's flags
    #[arg(long)]
    compiler: Option<String>,

    /// C++ standard, e.g. c++20
    #[arg(long = "std")]
    std: Option<String>,

    /// Optimization level, passed as -O<LEVEL>
    #[arg(short = 'O', value_name = "LEVEL")]
    optimization: Option<String>,

    /// Program name
    #[arg(long)]
    name: Option<String>,

    /// Don't run the program after building
    #[arg(long, conflicts_with = "run")]
    no_run: bool,

    /// Run the program after building
    #[arg(long)]
    run: bool,

    /// Don't print the compiler command
    #[arg(long)]
    no_cmd: bool,

    /// Print the compiler command without writing or compiling anything
    #[arg(long)]
    dry_run: bool,

    /// Fail when a fragment ends inside a raw string or block comment
    #[arg(long)]
    strict: bool,

    /// Extra arguments passed to the compiler
    #[arg(last = true)]
    compiler_args: Vec<String>,
}

impl BuildArgs {
    fn request(&self, default_profile: &str) -> BuildRequest {
        let mut request = BuildRequest::new(&self.dir);
        request.files = self.files.clone();
        request.scan_policy = if self.strict {
            ScanPolicy::Deny
        } else {
            ScanPolicy::Warn
        };
        request.overrides = BuildOverrides {
            profile: Some(
                self.profile
                    .clone()
                    .unwrap_or_else(|| default_profile.to_string()),
            ),
            compiler: self.compiler.clone(),
            std: self.std.clone(),
            optimization: self.optimization.as_ref().map(|o| format!("-O{}", o)),
            name: self.name.clone(),
            flags: self.compiler_args.clone(),
        };
        request
    }

    fn should_run(&self, by_default: bool) -> bool {
        if self.no_run {
            false
        } else {
            self.run || by_default
        }
    }
}

fn init_logging(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn build(args: &BuildArgs, profile: &str, run_by_default: bool) -> Result<()> {
    let start = Instant::now();
    let driver = Driver::new(args.request(profile))?;
    let plan = driver.plan()?;

    if let Amalgamation::Passthrough { plain_files } = &plan.amalgamation {
        info!(files = plain_files.len(), "no main in fragments, compiling plain sources");
    }
    if !args.no_cmd || args.dry_run {
        println!(
            "- Compiling \"{}_{}\" with the following:\n{}\n",
            plan.invocation.name,
            plan.invocation.profile,
            plan.invocation.command_line()
        );
    }
    if args.dry_run {
        return Ok(());
    }

    let planned = start.elapsed();
    let compiled = driver.compile(&plan)?;
    println!(
        "- zmake took {} ms, {} took {} ms.",
        planned.as_millis(),
        plan.invocation.program,
        compiled.as_millis()
    );

    if args.should_run(run_by_default) {
        println!(
            "- Opening \"{}_{}\":\n",
            plan.invocation.name, plan.invocation.profile
        );
        let status = driver.run(&plan)?;
        if let Some(code) = status.code().filter(|c| *c != 0) {
            std::process::exit(code);
        }
    }
    Ok(())
}

fn emit(args: &BuildArgs) -> Result<()> {
    let driver = Driver::new(args.request("dev"))?;
    let plan = driver.plan()?;
    match plan.unit_text() {
        Some(text) => {
            let mut stdout = std::io::stdout().lock();
            stdout.write_all(text.as_bytes()).into_diagnostic()?;
            Ok(())
        }
        None => Err(miette::miette!(
            "No fragment defines main; nothing to emit"
        )),
    }
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    match &cli.command {
        Commands::Run(args) => build(args, "dev", true),
        Commands::Build(args) => build(args, "release", false),
        Commands::Debug(args) => build(args, "debug", false),
        Commands::Emit(args) => emit(args),
    }
}
