/*!
Kernel build/config intent for a TDX guest.

[`Kernel::tdx`] gives sensible hardened defaults for a confidential-VM
guest kernel; every knob can still be overridden. [`Kernel::to_kconfig`]
renders the resolved `.config` text consumed by `mkosi.kernel/.config`.
*/
use regex::Regex;
use std::path::{Path, PathBuf};

/// Kernel command line baked into every TDX image unless overridden.
pub const DEFAULT_CMDLINE: &str = "console=hvc0 root=/dev/vda2 ro quiet";

lazy_static::lazy_static! {
    /// Minimal kconfig defaults for a TDX guest kernel. Keep these keys and
    /// values stable: they preserve measurement equivalence with existing
    /// deployments.
    static ref TDX_KCONFIG_DEFAULTS: Vec<(&'static str, &'static str)> = vec![
        ("CONFIG_INTEL_TDX_GUEST", "y"),
        ("CONFIG_TDX_GUEST_DRIVER", "y"),
        ("CONFIG_X86_X2APIC", "y"),
        ("CONFIG_VSOCK", "m"),
        ("CONFIG_VIRTIO_VSOCKETS", "m"),
        ("CONFIG_VHOST_VSOCK", "y"),
        ("CONFIG_CRYPTO_DEV_VIRTIO", "m"),
        ("CONFIG_HW_RANDOM_VIRTIO", "m"),
        ("CONFIG_VIRTIO_NET", "y"),
        ("CONFIG_VIRTIO_BLK", "y"),
        ("CONFIG_VIRTIO_CONSOLE", "y"),
        ("CONFIG_EFI", "y"),
        ("CONFIG_EFI_STUB", "y"),
        ("CONFIG_DMI", "y"),
        ("CONFIG_DMIID", "y"),
        ("CONFIG_RANDOMIZE_BASE", "y"),
        ("CONFIG_RANDOMIZE_MEMORY", "y"),
        ("CONFIG_STACKPROTECTOR_STRONG", "y"),
        ("CONFIG_SECURITY", "y"),
        ("CONFIG_SECURITY_LOCKDOWN_LSM", "y"),
    ];
}

/// Kernel build/config intent. Value type: cheap to clone, carried unchanged
/// through `resolve()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Kernel {
    pub version: String,
    pub config: Vec<(String, String)>,
    pub config_file: Option<PathBuf>,
    pub cmdline: String,
    pub extra_config: Vec<(String, String)>,
}

impl Default for Kernel {
    fn default() -> Self {
        Kernel::tdx("6.8", None, None, &[])
    }
}

impl Kernel {
    /// Sensible TDX guest defaults. `extra_config` entries override the
    /// built-in defaults by key; `config_file` replaces the rendered dict
    /// entirely at `to_kconfig()` time with an overlay of `extra_config`.
    pub fn tdx(
        version: impl Into<String>,
        cmdline: Option<String>,
        config_file: Option<PathBuf>,
        extra_config: &[(&str, &str)],
    ) -> Self {
        let mut merged: Vec<(String, String)> = TDX_KCONFIG_DEFAULTS
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        for (k, v) in extra_config {
            if let Some(existing) = merged.iter_mut().find(|(ek, _)| ek == k) {
                existing.1 = v.to_string();
            } else {
                merged.push((k.to_string(), v.to_string()));
            }
        }

        Kernel {
            version: version.into(),
            config: merged,
            config_file,
            cmdline: cmdline.unwrap_or_else(|| DEFAULT_CMDLINE.to_string()),
            extra_config: extra_config
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    /// Render the resolved kconfig as `.config` text: sorted `key=value`
    /// lines from `config`, or the user's `config_file` with `extra_config`
    /// overlaid line-by-line (replace existing key, else append).
    pub fn to_kconfig(&self) -> std::io::Result<String> {
        if let Some(path) = &self.config_file {
            return Ok(self.overlay_config_file(path)?);
        }

        let mut sorted = self.config.clone();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));
        let mut out = sorted
            .into_iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect::<Vec<_>>()
            .join("\n");
        out.push('\n');
        Ok(out)
    }

    fn overlay_config_file(&self, path: &Path) -> std::io::Result<String> {
        let mut content = std::fs::read_to_string(path)?;
        for (key, val) in &self.extra_config {
            let line = format!("{}={}", key, val);
            let pattern = format!(r"(?m)^{}=.*$", regex::escape(key));
            let re = Regex::new(&pattern).expect("kconfig overlay pattern is well-formed");
            if re.is_match(&content) {
                content = re.replace(&content, line.as_str()).into_owned();
            } else {
                content.push('\n');
                content.push_str(&line);
            }
        }
        Ok(content)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn default_tdx_kernel_has_stable_cmdline() {
        let k = Kernel::default();
        assert_eq!(k.cmdline, "console=hvc0 root=/dev/vda2 ro quiet");
    }

    #[test]
    fn to_kconfig_is_sorted() {
        let k = Kernel::tdx("6.8", None, None, &[]);
        let rendered = k.to_kconfig().unwrap();
        let lines: Vec<&str> = rendered.lines().collect();
        let mut sorted = lines.clone();
        sorted.sort();
        assert_eq!(lines, sorted);
        assert!(rendered.ends_with('\n'));
    }

    #[test]
    fn extra_config_overrides_default() {
        let k = Kernel::tdx("6.8", None, None, &[("CONFIG_VSOCK", "y")]);
        let rendered = k.to_kconfig().unwrap();
        assert!(rendered.contains("CONFIG_VSOCK=y"));
        assert!(!rendered.contains("CONFIG_VSOCK=m"));
    }

    #[test]
    fn overlay_replaces_existing_line_in_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(".config");
        std::fs::write(&path, "CONFIG_FOO=y\nCONFIG_BAR=n\n").unwrap();

        let k = Kernel::tdx(
            "6.8",
            None,
            Some(path.clone()),
            &[("CONFIG_FOO", "n"), ("CONFIG_BAZ", "y")],
        );
        let rendered = k.to_kconfig().unwrap();
        assert!(rendered.contains("CONFIG_FOO=n"));
        assert!(rendered.contains("CONFIG_BAR=n"));
        assert!(rendered.contains("CONFIG_BAZ=y"));
    }
}
