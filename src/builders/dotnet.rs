/*!
.NET builder: optional SDK sourcing plus `dotnet publish`.
*/
use crate::builders::go::shell_quote;
use std::path::PathBuf;

/// Build a .NET project. By default uses whatever SDK is already present
/// in the build environment; `sdk_version` or `compiler` pin a specific one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DotnetBuild {
    pub src: PathBuf,
    pub output: PathBuf,
    pub sdk_version: Option<String>,
    pub compiler: Option<PathBuf>,
    pub project: String,
    pub self_contained: bool,
    pub runtime: String,
    pub env: Vec<(String, String)>,
    pub build_deps: Vec<String>,
    pub reproducible: bool,
}

impl DotnetBuild {
    pub fn new(src: impl Into<PathBuf>, output: impl Into<PathBuf>) -> Self {
        DotnetBuild {
            src: src.into(),
            output: output.into(),
            sdk_version: None,
            compiler: None,
            project: ".".to_string(),
            self_contained: true,
            runtime: "linux-x64".to_string(),
            env: Vec::new(),
            build_deps: Vec::new(),
            reproducible: true,
        }
    }

    pub fn artifact_name(&self) -> String {
        self.output
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| "dotnet-app".to_string())
    }

    pub fn render(&self) -> String {
        let mut parts = self.compiler_setup();
        parts.extend(self.build_commands());
        parts.join("\n")
    }

    fn compiler_setup(&self) -> Vec<String> {
        if let Some(compiler) = &self.compiler {
            vec![
                "# Install .NET SDK from provided archive".to_string(),
                "mkdir -p /usr/share/dotnet".to_string(),
                format!(
                    "tar -xzf {} -C /usr/share/dotnet",
                    shell_quote(&compiler.display().to_string())
                ),
                "ln -sf /usr/share/dotnet/dotnet /usr/local/bin/dotnet".to_string(),
            ]
        } else if let Some(version) = &self.sdk_version {
            vec![
                format!("# Install .NET SDK {}", version),
                "export DOTNET_CLI_TELEMETRY_OPTOUT=1".to_string(),
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
        parts.push("export DOTNET_CLI_TELEMETRY_OPTOUT=1".to_string());
        for (k, v) in &self.env {
            parts.push(format!("export {}={}", k, shell_quote(v)));
        }
        parts.push(format!("cd {}", shell_quote(&self.src.display().to_string())));

        let sc_flag = if self.self_contained {
            "--self-contained"
        } else {
            "--no-self-contained"
        };
        let mut publish_cmd = format!(
            "dotnet publish {} -c Release -o {} -r {} {}",
            self.project,
            shell_quote(&self.output.display().to_string()),
            self.runtime,
            sc_flag,
        );
        if self.reproducible {
            publish_cmd.push_str(" /p:Deterministic=true");
        }
        parts.push(publish_cmd);
        parts
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn publish_command_matches_expected_shape() {
        let mut d = DotnetBuild::new("./svc", "/out/svc");
        d.sdk_version = Some("10.0".to_string());
        let script = d.render();
        assert!(script.contains("dotnet publish . -c Release -o '/out/svc' -r linux-x64 --self-contained /p:Deterministic=true"));
    }

    #[test]
    fn non_self_contained_flag() {
        let mut d = DotnetBuild::new("./svc", "/out/svc");
        d.self_contained = false;
        let script = d.render();
        assert!(script.contains("--no-self-contained"));
    }
}
