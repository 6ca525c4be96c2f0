/*!
A small SDK for declaring TDX confidential-VM images in Rust and compiling
them down to an `mkosi` assembler input tree.

A definition file constructs one [`image::Image`], optionally mutates it
under one or more named profiles, resolves it against a profile, and hands
the resolved image to [`cli::run`]. Everything in between — package lists,
kernel config, build scripts, systemd units, secret delivery — is pure data
until [`compile`] renders it to disk.
*/

pub mod build;
pub mod builders;
pub mod cli;
pub mod compile;
pub mod error;
pub mod fetch;
pub mod image;
pub mod kernel;
pub mod service;

pub use build::Build;
pub use error::Error;
pub use fetch::{fetch, fetch_git, hash_dir, hash_of};
pub use image::{Image, Profile};
pub use kernel::Kernel;
pub use service::Service;

/// Read a value from the environment for use while declaring an image.
///
/// ```no_run
/// use tdx_vm_sdk::env;
/// let contract = env("CONTRACT_ADDRESS", None);
/// ```
///
/// Panics if `name` is unset and no `default` is given, since a TDXfile that
/// cannot determine its own configuration cannot produce a meaningful image.
pub fn env(name: &str, default: Option<&str>) -> String {
    match (std::env::var(name), default) {
        (Ok(val), _) => val,
        (Err(_), Some(default)) => default.to_string(),
        (Err(_), None) => panic!(
            "environment variable {:?} is not set and no default was provided. \
             Set it before running `tdx build` or provide a default: env({:?}, Some(\"...\"))",
            name, name
        ),
    }
}
