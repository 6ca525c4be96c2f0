/*!
The orchestrator: resolves and compiles a declared [`Image`] and,
for `build`, optionally shells out to the external assembler.

A definition file is an ordinary Rust binary crate that depends on this
library, builds exactly one [`Image`] in its own `fn main()`, and hands it
to [`run`]. There is no runtime `eval` of a host program in Rust; `run`
plays the role the governing spec's "load a user program, locate the
`Image` instance" orchestrator step plays in a dynamic language, except the
"locating" is done at compile time by the definition file's own source
instead of at runtime by introspection.
*/
use crate::compile::{self, inspect_summary};
use crate::error::{AssemblerFailedSnafu, Error};
use crate::image::Image;
use clap::{Parser, Subcommand};
use duct::cmd;
use snafu::ResultExt;
use std::path::PathBuf;
use std::process::ExitCode;

/// Command line surface for a definition-file binary built on this SDK.
#[derive(Debug, Parser)]
#[clap(about, long_about = None, version)]
pub struct Args {
    #[clap(subcommand)]
    pub verb: Verb,
}

#[derive(Debug, Subcommand)]
pub enum Verb {
    /// Resolve and compile the image, then (unless `--emit-mkosi` is
    /// given) invoke the external assembler against the compiled tree.
    Build(BuildArgs),
    /// Reserved for measurement computation; currently a stub.
    Measure(CommonArgs),
    /// Print the resolved image's scalars and list counts/names.
    Inspect(CommonArgs),
}

#[derive(Debug, Parser)]
pub struct CommonArgs {
    /// Resolve against this named profile overlay instead of the base image.
    #[clap(long)]
    pub profile: Option<String>,
}

#[derive(Debug, Parser)]
pub struct BuildArgs {
    #[clap(flatten)]
    pub common: CommonArgs,
    /// Compile into this directory and exit without invoking the assembler.
    #[clap(long)]
    pub emit_mkosi: Option<PathBuf>,
    /// Append `<DIR>/mkosi.conf` to the generated `mkosi.conf` via mkosi's
    /// own config-layering (`--include`).
    #[clap(long)]
    pub mkosi_override: Option<PathBuf>,
}

/// Parse `std::env::args()` and dispatch. Intended to be the entire body
/// of a definition-file binary's `fn main()`:
///
/// ```no_run
/// fn main() -> std::process::ExitCode {
///     let image = tdx_vm_sdk::Image::new("my-image", "debian/bookworm");
///     tdx_vm_sdk::cli::run(image)
/// }
/// ```
pub fn run(image: Image) -> ExitCode {
    let args = Args::parse();
    match run_with_args(image, args.verb) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {}", err);
            ExitCode::FAILURE
        }
    }
}

fn run_with_args(image: Image, verb: Verb) -> Result<(), Error> {
    match verb {
        Verb::Build(args) => build(&image, args),
        Verb::Measure(args) => measure(&image, args),
        Verb::Inspect(args) => inspect(&image, args),
    }
}

fn build(image: &Image, args: BuildArgs) -> Result<(), Error> {
    let resolved = image.resolve(args.common.profile.as_deref())?;
    let out_dir = args
        .emit_mkosi
        .clone()
        .unwrap_or_else(|| PathBuf::from("mkosi.output"));
    compile::compile(&resolved, &out_dir)?;

    if let Some(override_dir) = &args.mkosi_override {
        append_override(&out_dir, override_dir)?;
    }

    if args.emit_mkosi.is_some() {
        return Ok(());
    }

    invoke_assembler(&out_dir)
}

/// Append `<override_dir>/mkosi.conf`'s contents to the generated
/// `mkosi.conf` verbatim, as the spec's `--mkosi-override` literally
/// describes — not an `[Include]=` reference, which would require the
/// override directory to remain reachable at assembler-invocation time.
fn append_override(out_dir: &std::path::Path, override_dir: &std::path::Path) -> Result<(), Error> {
    use crate::error::IoSnafu;
    use std::fs::OpenOptions;
    use std::io::Write;

    let override_path = override_dir.join("mkosi.conf");
    let addition = std::fs::read_to_string(&override_path).context(IoSnafu {
        path: override_path,
    })?;

    let conf_path = out_dir.join("mkosi.conf");
    let mut conf = OpenOptions::new()
        .append(true)
        .open(&conf_path)
        .context(IoSnafu {
            path: conf_path.clone(),
        })?;
    writeln!(conf).context(IoSnafu {
        path: conf_path.clone(),
    })?;
    conf.write_all(addition.as_bytes()).context(IoSnafu { path: conf_path })
}

fn invoke_assembler(out_dir: &std::path::Path) -> Result<(), Error> {
    let output = cmd!("mkosi", "--directory", out_dir, "build")
        .unchecked()
        .run()
        .map_err(|source| Error::SubprocessStart {
            command: format!("mkosi --directory {} build", out_dir.display()),
            source,
        })?;

    if !output.status.success() {
        return AssemblerFailedSnafu {
            status: output.status.code().unwrap_or(-1),
        }
        .fail();
    }
    Ok(())
}

fn measure(image: &Image, args: CommonArgs) -> Result<(), Error> {
    let resolved = image.resolve(args.profile.as_deref())?;
    println!(
        "measure: not yet implemented (stub). Image {:?} resolved with {} packages.",
        resolved.name,
        resolved.packages.len()
    );
    Ok(())
}

fn inspect(image: &Image, args: CommonArgs) -> Result<(), Error> {
    let resolved = image.resolve(args.profile.as_deref())?;
    let summary = inspect_summary(&resolved);

    println!("name:           {}", summary.name);
    println!("base:           {}", summary.base);
    println!("kernel:         {}", summary.kernel_version);
    println!("default target: {}", summary.default_target);
    println!("secure boot:    {}", summary.secure_boot);
    println!("packages:       {}", summary.package_count);
    println!("builds:         {}", summary.build_names.join(", "));
    println!("services:       {}", summary.service_names.join(", "));
    println!(
        "partitions:     {}",
        summary.partition_mountpoints.join(", ")
    );
    println!("users:          {}", summary.user_names.join(", "));
    println!("secrets:        {}", summary.secret_names.join(", "));
    Ok(())
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn emit_mkosi_compiles_without_invoking_assembler() {
        let mut image = Image::new("x", "debian/bookworm");
        image.install(["ca-certificates"]);
        let out_dir = tempfile::tempdir().unwrap();

        let args = BuildArgs {
            common: CommonArgs { profile: None },
            emit_mkosi: Some(out_dir.path().to_path_buf()),
            mkosi_override: None,
        };
        build(&image, args).unwrap();
        assert!(out_dir.path().join("mkosi.conf").exists());
    }

    #[test]
    fn inspect_runs_against_unresolved_profile_cleanly() {
        let image = Image::new("x", "debian/bookworm");
        inspect(&image, CommonArgs { profile: None }).unwrap();
    }

    #[test]
    fn inspect_with_unknown_profile_errors() {
        let image = Image::new("x", "debian/bookworm");
        let result = inspect(
            &image,
            CommonArgs {
                profile: Some("nope".to_string()),
            },
        );
        assert!(result.is_err());
    }

    #[test]
    fn mkosi_override_appends_include_section() {
        let mut image = Image::new("x", "debian/bookworm");
        image.install(["ca-certificates"]);
        let out_dir = tempfile::tempdir().unwrap();
        let override_dir = tempfile::tempdir().unwrap();
        std::fs::write(override_dir.path().join("mkosi.conf"), "[Content]\n").unwrap();

        let args = BuildArgs {
            common: CommonArgs { profile: None },
            emit_mkosi: Some(out_dir.path().to_path_buf()),
            mkosi_override: Some(override_dir.path().to_path_buf()),
        };
        build(&image, args).unwrap();

        let conf = std::fs::read_to_string(out_dir.path().join("mkosi.conf")).unwrap();
        assert!(conf.contains("[Content]"));
    }
}
