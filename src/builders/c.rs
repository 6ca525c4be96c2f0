/*!
C/C++ builder: optional compiler-from-source or compiler-tarball sourcing,
reproducible `CFLAGS`/`CXXFLAGS`, user build script, artifact copies.
*/
use crate::builders::go::shell_quote;
use crate::error::{Error, MissingContentSnafu};
use snafu::ensure;
use std::path::PathBuf;

/// Build a C/C++ project. By default uses the system GCC/Clang.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CBuild {
    pub src: PathBuf,
    pub build_script: String,
    /// `{build_path: image_path}`, preserving insertion order.
    pub artifacts: Vec<(String, String)>,
    pub output: Option<PathBuf>,
    pub compiler: Option<PathBuf>,
    pub compiler_source: Option<PathBuf>,
    pub cc: Option<String>,
    pub cxx: Option<String>,
    pub cflags: String,
    pub env: Vec<(String, String)>,
    pub build_deps: Vec<String>,
    pub reproducible: bool,
}

impl CBuild {
    pub fn new(src: impl Into<PathBuf>) -> Self {
        CBuild {
            src: src.into(),
            build_script: "make".to_string(),
            artifacts: Vec::new(),
            output: None,
            compiler: None,
            compiler_source: None,
            cc: None,
            cxx: None,
            cflags: String::new(),
            env: Vec::new(),
            build_deps: Vec::new(),
            reproducible: true,
        }
    }

    /// Derives the artifact's name: the stem of its single output, or a
    /// fixed placeholder for the multi-artifact map form.
    pub fn artifact_name(&self) -> Result<String, Error> {
        ensure!(
            !self.artifacts.is_empty() || self.output.is_some(),
            MissingContentSnafu {
                what: "CBuild requires either artifacts or output".to_string(),
            }
        );
        if !self.artifacts.is_empty() {
            return Ok("c-build".to_string());
        }
        Ok(self
            .output
            .as_ref()
            .and_then(|o| o.file_stem())
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "c-build".to_string()))
    }

    pub fn render(&self) -> String {
        let mut parts = self.compiler_setup();
        parts.extend(self.build_commands());
        parts.join("\n")
    }

    fn compiler_setup(&self) -> Vec<String> {
        if let Some(source) = &self.compiler_source {
            vec![
                "# Build compiler from source".to_string(),
                format!("cd {}", shell_quote(&source.display().to_string())),
                "./configure --prefix=/opt/custom-gcc --disable-multilib".to_string(),
                "make -j$(nproc)".to_string(),
                "make install".to_string(),
                "export PATH=/opt/custom-gcc/bin:$PATH".to_string(),
                "cd -".to_string(),
            ]
        } else if let Some(compiler) = &self.compiler {
            vec![
                "# Install compiler from archive".to_string(),
                format!(
                    "tar -xf {} -C /opt/custom-compiler",
                    shell_quote(&compiler.display().to_string())
                ),
                "export PATH=/opt/custom-compiler/bin:$PATH".to_string(),
            ]
        } else {
            Vec::new()
        }
    }

    fn build_commands(&self) -> Vec<String> {
        let mut parts = vec![String::new()];
        if self.reproducible {
            parts.push("export SOURCE_DATE_EPOCH=0".to_string());
        }
        if let Some(cc) = &self.cc {
            parts.push(format!("export CC={}", shell_quote(cc)));
        }
        if let Some(cxx) = &self.cxx {
            parts.push(format!("export CXX={}", shell_quote(cxx)));
        }

        let mut base_flags = self.cflags.clone();
        if self.reproducible && !base_flags.contains("-fdebug-prefix-map") {
            base_flags.push_str(" -fdebug-prefix-map=$PWD=.");
        }
        let trimmed = base_flags.trim();
        if !trimmed.is_empty() {
            parts.push(format!("export CFLAGS={}", shell_quote(trimmed)));
            parts.push(format!("export CXXFLAGS={}", shell_quote(trimmed)));
        }

        for (k, v) in &self.env {
            parts.push(format!("export {}={}", k, shell_quote(v)));
        }

        parts.push(format!("cd {}", shell_quote(&self.src.display().to_string())));
        parts.push(self.build_script.clone());

        for (build_path, image_path) in &self.artifacts {
            parts.push(format!(
                "cp {} {}",
                shell_quote(build_path),
                shell_quote(image_path)
            ));
        }
        parts
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn single_output_build() {
        let mut c = CBuild::new("./lib");
        c.output = Some(PathBuf::from("/usr/local/bin/tool"));
        let script = c.render();
        assert!(script.contains("-fdebug-prefix-map=$PWD=."));
        assert!(script.contains("make"));
        assert_eq!(c.artifact_name().unwrap(), "tool");
    }

    #[test]
    fn artifacts_map_copies_each_entry() {
        let mut c = CBuild::new("./lib");
        c.artifacts.push(("a.out".to_string(), "/usr/bin/a".to_string()));
        c.artifacts.push(("b.out".to_string(), "/usr/bin/b".to_string()));
        let script = c.render();
        assert!(script.contains("cp 'a.out' '/usr/bin/a'"));
        assert!(script.contains("cp 'b.out' '/usr/bin/b'"));
        assert_eq!(c.artifact_name().unwrap(), "c-build");
    }

    #[test]
    fn custom_cflags_not_duplicated() {
        let mut c = CBuild::new("./lib");
        c.output = Some(PathBuf::from("/out/x"));
        c.cflags = "-O2 -fdebug-prefix-map=$PWD=.".to_string();
        let script = c.render();
        assert_eq!(script.matches("-fdebug-prefix-map").count(), 2);
    }

    #[test]
    fn missing_output_and_artifacts_errors() {
        let c = CBuild::new("./lib");
        assert!(c.artifact_name().is_err());
    }
}
