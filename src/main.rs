//! `tdx`: thin dispatcher over a user-authored definition-file crate.
//!
//! The SDK's "load a user program, locate its `Image`, resolve, compile,
//! optionally assemble" pipeline from the governing spec is, in a
//! statically-compiled language, split across two binaries: this one,
//! and the definition-file crate itself (which depends on
//! `tdx_vm_sdk` and calls [`tdx_vm_sdk::cli::run`] from its own
//! `fn main()`). `tdx <verb> <deffile>` builds and runs that crate,
//! forwarding the verb and flags, and passes its exit code straight
//! through — `anyhow` prints a nicely formatted error if dispatch
//! itself fails before the child ever runs.
use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use duct::cmd;
use env_logger::Builder;
use log::LevelFilter;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

const DEFAULT_LEVEL_FILTER: LevelFilter = LevelFilter::Warn;

/// Compile and run a TDX VM image definition.
#[derive(Debug, Parser)]
#[clap(about, long_about = None, version)]
struct Args {
    /// Set the logging level. One of [off|error|warn|info|debug|trace].
    /// Defaults to warn. You can also leave this unset and use RUST_LOG.
    #[clap(long = "log-level")]
    log_level: Option<LevelFilter>,

    #[clap(subcommand)]
    verb: Verb,
}

#[derive(Debug, Subcommand)]
enum Verb {
    /// Compile the image and, unless `--emit-mkosi` is given, build it.
    Build {
        /// Path to the definition-file crate directory.
        deffile: PathBuf,
        #[clap(long)]
        profile: Option<String>,
        #[clap(long)]
        emit_mkosi: Option<PathBuf>,
        #[clap(long)]
        mkosi_override: Option<PathBuf>,
    },
    /// Reserved for measurement computation; currently a stub.
    Measure {
        deffile: PathBuf,
        #[clap(long)]
        profile: Option<String>,
    },
    /// Print the resolved image's scalars and list counts/names.
    Inspect {
        deffile: PathBuf,
        #[clap(long)]
        profile: Option<String>,
    },
}

fn main() -> ExitCode {
    let args = Args::parse();
    init_logger(args.log_level);

    match dispatch(args.verb) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:?}", err);
            ExitCode::FAILURE
        }
    }
}

fn dispatch(verb: Verb) -> Result<ExitCode> {
    let (deffile, forwarded) = match &verb {
        Verb::Build {
            deffile,
            profile,
            emit_mkosi,
            mkosi_override,
        } => {
            let mut forwarded = vec!["build".to_string()];
            if let Some(profile) = profile {
                forwarded.push("--profile".to_string());
                forwarded.push(profile.clone());
            }
            if let Some(dir) = emit_mkosi {
                forwarded.push("--emit-mkosi".to_string());
                forwarded.push(dir.display().to_string());
            }
            if let Some(dir) = mkosi_override {
                forwarded.push("--mkosi-override".to_string());
                forwarded.push(dir.display().to_string());
            }
            (deffile, forwarded)
        }
        Verb::Measure { deffile, profile } => {
            let mut forwarded = vec!["measure".to_string()];
            if let Some(profile) = profile {
                forwarded.push("--profile".to_string());
                forwarded.push(profile.clone());
            }
            (deffile, forwarded)
        }
        Verb::Inspect { deffile, profile } => {
            let mut forwarded = vec!["inspect".to_string()];
            if let Some(profile) = profile {
                forwarded.push("--profile".to_string());
                forwarded.push(profile.clone());
            }
            (deffile, forwarded)
        }
    };

    run_deffile(deffile, &forwarded)
}

/// `cargo run` the definition-file crate, forwarding `args` after `--`, and
/// pass its exit status straight through. A manifest that doesn't exist or
/// doesn't build is a `LoadError`-equivalent failure (exit 1); anything
/// past that point is the definition-file binary's own exit code, which
/// for `build` is ultimately the external assembler's.
fn run_deffile(deffile: &Path, forwarded_args: &[String]) -> Result<ExitCode> {
    let manifest_path = deffile.join("Cargo.toml");
    if !manifest_path.is_file() {
        bail!(
            "{} does not look like a definition-file crate (no Cargo.toml found)",
            deffile.display()
        );
    }

    let mut cargo_args: Vec<String> = vec![
        "run".to_string(),
        "--manifest-path".to_string(),
        manifest_path.display().to_string(),
        "--quiet".to_string(),
        "--".to_string(),
    ];
    cargo_args.extend(forwarded_args.iter().cloned());

    let output = cmd("cargo", &cargo_args)
        .unchecked()
        .run()
        .context("failed to launch `cargo run` for the definition-file crate")?;

    match output.status.code() {
        Some(0) => Ok(ExitCode::SUCCESS),
        Some(code) => {
            let code: u8 = code.try_into().unwrap_or(1);
            Ok(ExitCode::from(code))
        }
        None => Ok(ExitCode::FAILURE),
    }
}

/// Use `level` if present, or else `RUST_LOG` if present, or else a
/// crate-local default. Matches the teacher's own `init_logger` exactly.
fn init_logger(level: Option<LevelFilter>) {
    match (std::env::var(env_logger::DEFAULT_FILTER_ENV).ok(), level) {
        (Some(_), None) => {
            Builder::from_default_env().init();
        }
        _ => {
            Builder::new()
                .filter(
                    Some(env!("CARGO_CRATE_NAME")),
                    level.unwrap_or(DEFAULT_LEVEL_FILTER),
                )
                .init();
        }
    }
}
