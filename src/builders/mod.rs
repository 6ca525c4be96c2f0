/*!
Typed per-language build-artifact constructors.

Each submodule owns one language's compiler-sourcing and build-invocation
logic; [`crate::build::Build`] wraps them into the [`crate::build::BuildArtifact`]
enum so `to_build_script()` dispatches over a closed set of variants
instead of a string-keyed table.
*/
pub mod c;
pub mod dotnet;
pub mod go;
pub mod rust;

pub use c::CBuild;
pub use dotnet::DotnetBuild;
pub use go::GoBuild;
pub use rust::RustBuild;
