/*!
Rust builder: rustup toolchain selector or tarball sourcing, plus the
actual `cargo build --release` invocation.
*/
use crate::builders::go::shell_quote;
use std::path::PathBuf;

/// How the Rust compiler used to build this artifact is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RustCompiler {
    Tarball(PathBuf),
    Toolchain(String),
}

/// Build a Rust project, with reproducibility flags on by default
/// (`SOURCE_DATE_EPOCH`, `--remap-path-prefix`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RustBuild {
    pub src: PathBuf,
    pub output: PathBuf,
    pub compiler: Option<RustCompiler>,
    pub features: Vec<String>,
    pub no_default_features: bool,
    pub target: Option<String>,
    pub env: Vec<(String, String)>,
    pub build_deps: Vec<String>,
    pub reproducible: bool,
}

impl RustBuild {
    pub fn new(src: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        RustBuild {
            src: src.into(),
            output: output.into(),
            compiler: None,
            features: Vec::new(),
            no_default_features: false,
            target: None,
            env: Vec::new(),
            build_deps: Vec::new(),
            reproducible: true,
        }
    }

    pub fn artifact_name(&self) -> String {
        self.output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "rust-build".to_string())
    }

    pub fn render(&self) -> String {
        let mut parts = self.compiler_setup();
        parts.extend(self.build_commands());
        parts.join("\n")
    }

    fn compiler_setup(&self) -> Vec<String> {
        match &self.compiler {
            Some(RustCompiler::Tarball(path)) => vec![
                "# Install Rust from provided tarball".to_string(),
                format!(
                    "tar -xf {} -C /tmp/rust-install",
                    shell_quote(&path.display().to_string())
                ),
                "/tmp/rust-install/*/install.sh --prefix=/usr/local".to_string(),
                "rm -rf /tmp/rust-install".to_string(),
            ],
            Some(RustCompiler::Toolchain(toolchain)) => vec![
                format!("# Install Rust toolchain {}", toolchain),
                format!("rustup default {}", toolchain),
            ],
            None => Vec::new(),
        }
    }

    fn build_commands(&self) -> Vec<String> {
        let mut parts = vec![String::new()];
        if self.reproducible {
            parts.push("export SOURCE_DATE_EPOCH=0".to_string());
            parts.push("export RUSTFLAGS='--remap-path-prefix=$PWD=.'".to_string());
        }
        for (k, v) in &self.env {
            parts.push(format!("export {}={}", k, shell_quote(v)));
        }
        parts.push(format!("cd {}", shell_quote(&self.src.display().to_string())));

        let mut build_cmd = "cargo build --release".to_string();
        if !self.features.is_empty() {
            build_cmd.push_str(&format!(" --features {}", self.features.join(",")));
        }
        if self.no_default_features {
            build_cmd.push_str(" --no-default-features");
        }
        if let Some(target) = &self.target {
            build_cmd.push_str(&format!(" --target {}", target));
        }
        parts.push(build_cmd);

        let binary_name = self
            .output
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let release_path = match &self.target {
            Some(target) => format!("target/{}/release/{}", target, binary_name),
            None => format!("target/release/{}", binary_name),
        };
        parts.push(format!(
            "cp {} {}",
            release_path,
            shell_quote(&self.output.display().to_string())
        ));
        parts
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn toolchain_build_matches_expected_shape() {
        let mut r = RustBuild::new("./svc", "/usr/local/bin/svc");
        r.compiler = Some(RustCompiler::Toolchain("1.83.0".to_string()));
        let script = r.render();
        assert!(script.contains("rustup default 1.83.0"));
        assert!(script.contains("export RUSTFLAGS='--remap-path-prefix=$PWD=.'"));
        assert!(script.contains("cargo build --release"));
        assert!(script.contains("cp target/release/svc '/usr/local/bin/svc'"));
    }

    #[test]
    fn target_changes_release_path_and_flag() {
        let mut r = RustBuild::new("./svc", "/out/svc");
        r.target = Some("x86_64-unknown-linux-musl".to_string());
        let script = r.render();
        assert!(script.contains("--target x86_64-unknown-linux-musl"));
        assert!(script.contains("cp target/x86_64-unknown-linux-musl/release/svc '/out/svc'"));
    }

    #[test]
    fn features_are_comma_joined() {
        let mut r = RustBuild::new("./svc", "/out/svc");
        r.features = vec!["a".to_string(), "b".to_string()];
        r.no_default_features = true;
        let script = r.render();
        assert!(script.contains("--features a,b"));
        assert!(script.contains("--no-default-features"));
    }
}
