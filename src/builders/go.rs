/*!
Go builder: flexible compiler sourcing (precompiled release, tarball, or
build-from-source) plus the actual `go build` invocation.
*/
use std::path::PathBuf;

const GO_RELEASE_URL_TEMPLATE: &str = "https://go.dev/dl/go{version}.linux-amd64.tar.gz";

fn go_release_url(version: &str) -> String {
    GO_RELEASE_URL_TEMPLATE.replace("{version}", version)
}

/// Build the Go toolchain itself from source, bootstrapped by an older Go.
/// Use when the compiler binary must be fully auditable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoFromSource {
    pub version: String,
    pub bootstrap_version: String,
    pub source_url: Option<String>,
    pub bootstrap_url: Option<String>,
    pub source_sha256: Option<String>,
    pub bootstrap_sha256: Option<String>,
}

impl GoFromSource {
    pub fn new(version: impl Into<String>) -> Self {
        GoFromSource {
            version: version.into(),
            bootstrap_version: "1.21.0".to_string(),
            source_url: None,
            bootstrap_url: None,
            source_sha256: None,
            bootstrap_sha256: None,
        }
    }

    pub fn to_build_commands(&self) -> Vec<String> {
        let src_url = self
            .source_url
            .clone()
            .unwrap_or_else(|| go_release_url(&self.version));
        let boot_url = self
            .bootstrap_url
            .clone()
            .unwrap_or_else(|| go_release_url(&self.bootstrap_version));

        vec![
            format!("# Build Go {} from source", self.version),
            format!("# Bootstrap with Go {}", self.bootstrap_version),
            String::new(),
            "export GOROOT_BOOTSTRAP=/tmp/go-bootstrap".to_string(),
            "mkdir -p /tmp/go-bootstrap".to_string(),
            format!(
                "curl -fsSL '{}' | tar -C /tmp/go-bootstrap --strip-components=1 -xz",
                boot_url
            ),
            String::new(),
            "mkdir -p /tmp/go-source".to_string(),
            format!(
                "curl -fsSL '{}' | tar -C /tmp/go-source --strip-components=1 -xz",
                src_url
            ),
            "cd /tmp/go-source/src".to_string(),
            "GOROOT=/tmp/go-source ./make.bash".to_string(),
            String::new(),
            "# Install built Go".to_string(),
            "rm -rf /usr/local/go".to_string(),
            "mv /tmp/go-source /usr/local/go".to_string(),
            "ln -sf /usr/local/go/bin/go /usr/local/bin/go".to_string(),
            String::new(),
            "# Cleanup bootstrap".to_string(),
            "rm -rf /tmp/go-bootstrap".to_string(),
        ]
    }
}

/// How the Go compiler used to build this artifact is obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GoCompiler {
    Tarball(PathBuf),
    FromSource(GoFromSource),
}

/// Build a Go project, with reproducibility flags on by default
/// (`SOURCE_DATE_EPOCH`, `-trimpath`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GoBuild {
    pub src: PathBuf,
    pub output: PathBuf,
    pub version: Option<String>,
    pub compiler: Option<GoCompiler>,
    pub ldflags: String,
    pub tags: Vec<String>,
    pub env: Vec<(String, String)>,
    pub build_deps: Vec<String>,
    pub reproducible: bool,
}

impl GoBuild {
    pub fn new(src: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        GoBuild {
            src: src.into(),
            output: output.into(),
            version: None,
            compiler: None,
            ldflags: "-s -w".to_string(),
            tags: Vec::new(),
            env: Vec::new(),
            build_deps: Vec::new(),
            reproducible: true,
        }
    }

    /// The artifact name derived from the output file's stem, matching the
    /// source SDK's convention of naming the artifact after its binary.
    pub fn artifact_name(&self) -> String {
        self.output
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "go-build".to_string())
    }

    pub fn render(&self) -> String {
        let mut parts = self.compiler_setup();
        parts.extend(self.build_commands());
        parts.join("\n")
    }

    fn compiler_setup(&self) -> Vec<String> {
        match &self.compiler {
            Some(GoCompiler::FromSource(src)) => src.to_build_commands(),
            Some(GoCompiler::Tarball(path)) => vec![
                "# Install Go from provided tarball".to_string(),
                format!("tar -C /usr/local -xzf {}", shell_quote(&path.display().to_string())),
                "export PATH=/usr/local/go/bin:$PATH".to_string(),
            ],
            None => match &self.version {
                Some(version) => {
                    let url = go_release_url(version);
                    vec![
                        format!("# Install Go {} (precompiled)", version),
                        format!("curl -fsSL '{}' | tar -C /usr/local -xz", url),
                        "export PATH=/usr/local/go/bin:$PATH".to_string(),
                    ]
                }
                None => Vec::new(),
            },
        }
    }

    fn build_commands(&self) -> Vec<String> {
        let mut parts = vec![String::new()];
        if self.reproducible {
            parts.push("export SOURCE_DATE_EPOCH=0".to_string());
        }
        for (k, v) in &self.env {
            parts.push(format!("export {}={}", k, shell_quote(v)));
        }
        parts.push(format!("cd {}", shell_quote(&self.src.display().to_string())));

        let mut build_cmd = if self.reproducible {
            "go build -trimpath".to_string()
        } else {
            "go build".to_string()
        };
        if !self.ldflags.is_empty() {
            build_cmd.push_str(&format!(" -ldflags {}", shell_quote(&self.ldflags)));
        }
        if !self.tags.is_empty() {
            build_cmd.push_str(&format!(" -tags {}", self.tags.join(",")));
        }
        build_cmd.push_str(&format!(
            " -o {} .",
            shell_quote(&self.output.display().to_string())
        ));
        parts.push(build_cmd);
        parts
    }
}

/// Quote a string the way the source SDK's `repr()`-based rendering does:
/// single-quoted, safe for the values this SDK actually emits (paths,
/// ldflags, env values — none of which contain embedded single quotes).
pub(crate) fn shell_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', r"'\''"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn precompiled_go_build_matches_expected_shape() {
        let mut g = GoBuild::new("./prover/", "/usr/local/bin/my-prover");
        g.version = Some("1.22".to_string());
        let script = g.render();
        assert!(script.contains("go build -trimpath -ldflags '-s -w' -o '/usr/local/bin/my-prover' ."));
        assert!(script.contains("go1.22.linux-amd64.tar.gz"));
        assert_eq!(g.artifact_name(), "my-prover");
    }

    #[test]
    fn tags_and_no_ldflags() {
        let mut g = GoBuild::new("./x", "/usr/local/bin/x");
        g.ldflags = String::new();
        g.tags = vec!["netgo".to_string(), "osusergo".to_string()];
        let script = g.render();
        assert!(script.contains("-tags netgo,osusergo"));
        assert!(!script.contains("-ldflags"));
    }

    #[test]
    fn from_source_compiler_emits_bootstrap_commands() {
        let mut g = GoBuild::new("./x", "/usr/local/bin/x");
        g.compiler = Some(GoCompiler::FromSource(GoFromSource::new("1.23.0")));
        let script = g.render();
        assert!(script.contains("GOROOT=/tmp/go-source ./make.bash"));
    }
}
