/*!
Per-language build artifacts: one compiled payload to include in the
image, produced by a typed constructor from [`crate::builders`] and
rendered to a deterministic shell fragment by [`BuildArtifact::to_build_script`].

The builder kind is a closed enum (not a string-keyed dispatch table) so
`to_build_script()` is a total match and an unrecognized kind cannot
arise through this facade. [`Error::UnknownBuilder`](crate::error::Error::UnknownBuilder)
is kept in the error taxonomy for callers that parse a builder-kind name
from outside this API (e.g. a future manifest-driven frontend); use
[`BuilderKind::parse_name`] for that case.
*/
use crate::builders::{c::CBuild, dotnet::DotnetBuild, go::GoBuild, rust::RustBuild};
use crate::error::{Error, UnknownBuilderSnafu};
use std::path::PathBuf;

/// A build artifact's output: a single path inside the image, or a map of
/// `{build_path: image_path}` for builders that produce multiple outputs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Output {
    Single(String),
    Map(Vec<(String, String)>),
}

/// The language-specific configuration and renderer for one build artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuilderKind {
    Go(GoBuild),
    Rust(RustBuild),
    Dotnet(DotnetBuild),
    C(CBuild),
    Script(ScriptBuild),
}

impl BuilderKind {
    pub fn name(&self) -> &'static str {
        match self {
            BuilderKind::Go(_) => "go",
            BuilderKind::Rust(_) => "rust",
            BuilderKind::Dotnet(_) => "dotnet",
            BuilderKind::C(_) => "c",
            BuilderKind::Script(_) => "script",
        }
    }

    /// Validate a builder-kind name against the recognized set. Used by
    /// frontends that accept the kind as a string rather than constructing
    /// a typed builder directly.
    pub fn parse_name(name: &str) -> Result<(), Error> {
        match name {
            "go" | "rust" | "dotnet" | "c" | "script" => Ok(()),
            other => UnknownBuilderSnafu {
                kind: other.to_string(),
            }
            .fail(),
        }
    }
}

/// Universal fallback builder: a raw shell `build_script` plus artifact
/// copies, for build systems with no dedicated typed constructor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptBuild {
    pub name: String,
    pub src: PathBuf,
    pub build_script: String,
    pub env: Vec<(String, String)>,
    pub build_deps: Vec<String>,
}

impl ScriptBuild {
    fn render(&self) -> String {
        format!(
            "# Build: {} (custom script)\n{}",
            self.name,
            [
                env_exports(&self.env),
                install_deps(&self.build_deps),
                format!("cd {}", crate::builders::go::shell_quote(&self.src.display().to_string())),
                self.build_script.clone(),
            ]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n")
        )
    }
}

fn env_exports(env: &[(String, String)]) -> String {
    let mut lines = vec!["export SOURCE_DATE_EPOCH=0".to_string()];
    for (k, v) in env {
        lines.push(format!("export {}={}", k, crate::builders::go::shell_quote(v)));
    }
    lines.join("\n")
}

fn install_deps(build_deps: &[String]) -> String {
    if build_deps.is_empty() {
        return String::new();
    }
    format!(
        "apt-get install -y --no-install-recommends {}",
        build_deps.join(" ")
    )
}

/// One compiled payload to include in the VM image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildArtifact {
    pub name: String,
    pub src: PathBuf,
    pub output: Output,
    pub build_deps: Vec<String>,
    pub env: Vec<(String, String)>,
    pub kind: BuilderKind,
}

impl BuildArtifact {
    /// Render the deterministic shell fragment for this artifact. Pure
    /// function of the artifact's fields: same input, byte-identical output.
    pub fn to_build_script(&self) -> String {
        match &self.kind {
            BuilderKind::Go(g) => g.render(),
            BuilderKind::Rust(r) => r.render(),
            BuilderKind::Dotnet(d) => d.render(),
            BuilderKind::C(c) => c.render(),
            BuilderKind::Script(s) => s.render(),
        }
    }
}

/// Factory for typed build-artifact constructors. Returns the
/// language-specific builder so callers can set additional fields before
/// converting with `.into_artifact()`.
pub struct Build;

impl Build {
    pub fn go(src: impl Into<PathBuf>, output: impl Into<PathBuf>) -> GoBuild {
        GoBuild::new(src, output)
    }

    pub fn rust(src: impl Into<PathBuf>, output: impl Into<PathBuf>) -> RustBuild {
        RustBuild::new(src, output)
    }

    pub fn dotnet(src: impl Into<PathBuf>, output: impl Into<PathBuf>) -> DotnetBuild {
        DotnetBuild::new(src, output)
    }

    pub fn c(src: impl Into<PathBuf>) -> CBuild {
        CBuild::new(src)
    }

    pub fn script(
        name: impl Into<String>,
        src: impl Into<PathBuf>,
        build_script: impl Into<String>,
    ) -> ScriptBuild {
        ScriptBuild {
            name: name.into(),
            src: src.into(),
            build_script: build_script.into(),
            env: Vec::new(),
            build_deps: Vec::new(),
        }
    }
}

impl GoBuild {
    pub fn into_artifact(self) -> BuildArtifact {
        BuildArtifact {
            name: self.artifact_name(),
            src: self.src.clone(),
            output: Output::Single(self.output.display().to_string()),
            build_deps: self.build_deps.clone(),
            env: self.env.clone(),
            kind: BuilderKind::Go(self),
        }
    }
}

impl RustBuild {
    pub fn into_artifact(self) -> BuildArtifact {
        BuildArtifact {
            name: self.artifact_name(),
            src: self.src.clone(),
            output: Output::Single(self.output.display().to_string()),
            build_deps: self.build_deps.clone(),
            env: self.env.clone(),
            kind: BuilderKind::Rust(self),
        }
    }
}

impl DotnetBuild {
    pub fn into_artifact(self) -> BuildArtifact {
        BuildArtifact {
            name: self.artifact_name(),
            src: self.src.clone(),
            output: Output::Single(self.output.display().to_string()),
            build_deps: self.build_deps.clone(),
            env: self.env.clone(),
            kind: BuilderKind::Dotnet(self),
        }
    }
}

impl CBuild {
    pub fn into_artifact(self) -> Result<BuildArtifact, Error> {
        let name = self.artifact_name()?;
        let output = if !self.artifacts.is_empty() {
            Output::Map(self.artifacts.clone())
        } else {
            Output::Single(
                self.output
                    .as_ref()
                    .expect("artifact_name() already validated output or artifacts is present")
                    .display()
                    .to_string(),
            )
        };
        Ok(BuildArtifact {
            name,
            src: self.src.clone(),
            output,
            build_deps: self.build_deps.clone(),
            env: self.env.clone(),
            kind: BuilderKind::C(self),
        })
    }
}

impl ScriptBuild {
    pub fn into_artifact(self) -> BuildArtifact {
        BuildArtifact {
            name: self.name.clone(),
            src: self.src.clone(),
            output: Output::Single(String::new()),
            build_deps: self.build_deps.clone(),
            env: self.env.clone(),
            kind: BuilderKind::Script(self),
        }
    }

    /// A script build with an explicit single output path to copy to.
    pub fn with_output(mut self, build_path: impl Into<String>, image_path: impl Into<String>) -> BuildArtifact {
        let build_path = build_path.into();
        let image_path = image_path.into();
        self.build_script = format!(
            "{}\ncp {} {}",
            self.build_script,
            crate::builders::go::shell_quote(&build_path),
            crate::builders::go::shell_quote(&image_path)
        );
        BuildArtifact {
            name: self.name.clone(),
            src: self.src.clone(),
            output: Output::Single(image_path),
            build_deps: self.build_deps.clone(),
            env: self.env.clone(),
            kind: BuilderKind::Script(self),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn go_build_derives_name_from_output() {
        let artifact = Build::go("./prover", "/usr/local/bin/my-prover")
            .into_artifact();
        assert_eq!(artifact.name, "my-prover");
        assert!(artifact.to_build_script().contains("go build"));
    }

    #[test]
    fn script_build_renders_custom_script() {
        let artifact = Build::script("thing", "./src", "make all").into_artifact();
        let script = artifact.to_build_script();
        assert!(script.contains("make all"));
        assert!(script.contains("Build: thing (custom script)"));
    }

    #[test]
    fn unknown_builder_name_is_rejected() {
        assert!(BuilderKind::parse_name("cobol").is_err());
        assert!(BuilderKind::parse_name("go").is_ok());
    }
}
