/*!
The mutable root definition ([`Image`]) for a TDX VM image, its named
profile overlays, and the flattened, immutable snapshot ([`ResolvedImage`])
that [`crate::compile`] consumes.

Every mutator on `Image` consults the currently active profile scope: if
one is entered (via [`Image::profile`]), the mutation records into that
profile's overlay; otherwise it records into the base image. This mirrors
the source SDK's `with image.profile(name): ...` context manager, modeled
here as a closure that borrows the image mutably for its duration instead
of a generator-based context manager — there is no analogue to Python's
`contextmanager` in Rust, and none is needed: ordinary `&mut` borrowing
already guarantees the scope is exited on every path out of the closure.
*/
use crate::build::BuildArtifact;
use crate::error::{
    DuplicateProfileScopeSnafu, Error, MissingContentSnafu, UnknownProfileSnafu,
};
use crate::kernel::Kernel;
use crate::service::Service;
use snafu::ensure;
use std::collections::BTreeMap;
use std::path::PathBuf;

/// One GPT partition in the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub mountpoint: String,
    pub fs: String,
    pub size: String,
    pub readonly: bool,
}

impl Partition {
    pub fn new(mountpoint: impl Into<String>) -> Self {
        Partition {
            mountpoint: mountpoint.into(),
            fs: "ext4".to_string(),
            size: "2G".to_string(),
            readonly: false,
        }
    }
}

/// Root-partition encryption configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptionConfig {
    pub kind: String,
    pub key_source: String,
    pub cipher: String,
    pub key_size: u32,
}

impl Default for EncryptionConfig {
    fn default() -> Self {
        EncryptionConfig {
            kind: "luks2".to_string(),
            key_source: "tpm".to_string(),
            cipher: "aes-xts-plain64".to_string(),
            key_size: 512,
        }
    }
}

/// Guest network configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetworkConfig {
    pub interfaces: Vec<String>,
    pub vsock: bool,
    pub firewall_rules: Vec<String>,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        NetworkConfig {
            interfaces: vec!["virtio-net".to_string()],
            vsock: true,
            firewall_rules: Vec::new(),
        }
    }
}

/// SSH access configuration. Base-only: profile overlays do not extend it
/// (see the source SDK's own design note — preserved here deliberately).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SSHConfig {
    pub enabled: bool,
    pub key_delivery: String,
    pub restrictions: Vec<String>,
}

impl Default for SSHConfig {
    fn default() -> Self {
        SSHConfig {
            enabled: false,
            key_delivery: "http".to_string(),
            restrictions: vec![
                "no-port-forwarding".to_string(),
                "no-agent-forwarding".to_string(),
            ],
        }
    }
}

/// A file placed into the image, either copied verbatim or from inline
/// content. Exactly one of `src`/`content` must be set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub dest: String,
    pub src: Option<PathBuf>,
    pub content: Option<String>,
}

/// A file placed into the image and rendered from a `{{ var }}` template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEntry {
    pub src: PathBuf,
    pub dest: String,
    pub vars: Vec<(String, String)>,
}

/// A file placed in `mkosi.skeleton/`, copied before the package manager
/// runs. Exactly one of `src`/`content` must be set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkeletonEntry {
    pub dest: String,
    pub src: Option<PathBuf>,
    pub content: Option<String>,
}

/// One lifecycle phase a [`RunCommand`] executes in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Sync,
    Prepare,
    Build,
    Postinst,
    Finalize,
    Postoutput,
    Clean,
    Boot,
}

impl Phase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Sync => "sync",
            Phase::Prepare => "prepare",
            Phase::Build => "build",
            Phase::Postinst => "postinst",
            Phase::Finalize => "finalize",
            Phase::Postoutput => "postoutput",
            Phase::Clean => "clean",
            Phase::Boot => "boot",
        }
    }

    /// The assembler script hook this phase's commands are emitted into, or
    /// `None` for `build` and `boot`. `build` commands are folded into
    /// `mkosi.postinst` (matching the original's `_write_postinst` routing)
    /// rather than a standalone `mkosi.build` hook — that name is reserved
    /// for the `mkosi.build.d/NN-*.sh` artifact scripts. `boot` is
    /// materialized as a guest-side service instead of an assembler hook.
    pub fn mkosi_hook(&self) -> Option<&'static str> {
        match self {
            Phase::Sync => Some("mkosi.sync"),
            Phase::Prepare => Some("mkosi.prepare"),
            Phase::Build => None,
            Phase::Postinst => Some("mkosi.postinst"),
            Phase::Finalize => Some("mkosi.finalize"),
            Phase::Postoutput => Some("mkosi.postoutput"),
            Phase::Clean => Some("mkosi.clean"),
            Phase::Boot => None,
        }
    }
}

/// A shell command or script run at a given lifecycle phase. Phases map
/// directly to mkosi's script hooks, in execution order — except `boot`,
/// which runs at VM boot time via a generated oneshot systemd unit rather
/// than at assembly time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunCommand {
    pub command: Option<String>,
    pub script: Option<String>,
    pub phase: Phase,
}

/// A system user to create in the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserEntry {
    pub name: String,
    pub system: bool,
    pub home: Option<String>,
    pub shell: Option<String>,
    pub groups: Vec<String>,
    pub uid: Option<u32>,
}

impl UserEntry {
    /// An idempotent `useradd` invocation, gated on `id -u $name` exactly
    /// like the per-service user-creation line the compiler also emits.
    pub fn create_command(&self) -> String {
        let mut useradd = String::from("useradd");
        if self.system {
            useradd.push_str(" -r");
        }
        if let Some(uid) = self.uid {
            useradd.push_str(&format!(" -u {}", uid));
        }
        if let Some(home) = &self.home {
            useradd.push_str(&format!(" -d {} -m", home));
        } else {
            useradd.push_str(" -M");
        }
        useradd.push_str(&format!(
            " -s {}",
            self.shell.as_deref().unwrap_or("/usr/sbin/nologin")
        ));
        if !self.groups.is_empty() {
            useradd.push_str(&format!(" -G {}", self.groups.join(",")));
        }
        useradd.push(' ');
        useradd.push_str(&self.name);

        format!(
            "id -u {name} &>/dev/null || {useradd}",
            name = self.name,
            useradd = useradd
        )
    }
}

/// How a declared secret's value is retrieved by the guest at boot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryMethod {
    Ssh,
    Vsock,
    Script { fetch_script: PathBuf },
}

impl DeliveryMethod {
    /// The flag the generated `receive-secrets.sh` invocation ends in.
    pub fn flag(&self) -> String {
        match self {
            DeliveryMethod::Ssh => "--ssh".to_string(),
            DeliveryMethod::Vsock => "--vsock".to_string(),
            DeliveryMethod::Script { fetch_script } => {
                format!("--script {}", fetch_script.display())
            }
        }
    }
}

/// A declared-but-not-baked secret. Never holds the secret value itself —
/// only enough metadata for the delivery unit to fetch and place it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SecretEntry {
    pub name: String,
    pub description: Option<String>,
    pub dest: String,
    pub owner: String,
    pub mode: String,
    pub delivery: DeliveryMethod,
}

/// An additional apt repository to configure before packages are installed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepositoryEntry {
    pub url: String,
    pub suite: String,
    pub components: Vec<String>,
    pub types: Vec<String>,
    pub keyring: Option<PathBuf>,
    pub signed_by: Option<String>,
}

/// Scalar fields a profile may override at resolve time. Rust has no
/// `setattr`-by-name, so unlike the source SDK's `overrides: dict[str, Any]`
/// this is a fixed, typed set of the scalars that are meaningful to vary
/// per profile.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileOverrides {
    pub locale: Option<String>,
    pub docs: Option<bool>,
    pub secure_boot: Option<bool>,
    pub default_target: Option<String>,
    pub cloud: Option<String>,
    pub attestation_backend: Option<String>,
}

/// A named overlay collecting a subset of mutations, applied atop the
/// base `Image` at resolve time.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Profile {
    pub name: String,
    pub packages: Vec<String>,
    pub services: Vec<Service>,
    pub files: Vec<FileEntry>,
    pub run_commands: Vec<RunCommand>,
    pub overrides: ProfileOverrides,
}

impl Profile {
    fn new(name: impl Into<String>) -> Self {
        Profile {
            name: name.into(),
            ..Default::default()
        }
    }
}

/// Which scope mutator calls currently record into. Mirrors the source
/// SDK's `_active_profile` pointer; a scope is entered and exited around
/// one closure call instead of a `contextmanager`.
#[derive(Debug, Clone, PartialEq, Eq)]
enum ActiveScope {
    Base,
    Profile(String),
}

/// Mutable root definition of a TDX VM image.
///
/// Provides opinionated defaults for a hardened TDX guest; every field is
/// exposed for full control. Construct with [`Image::new`], mutate with
/// the builder methods, and call [`Image::resolve`] to produce the
/// flattened [`ResolvedImage`] the compiler consumes.
pub struct Image {
    pub name: String,
    pub base: String,
    pub kernel: Kernel,
    pub init: String,
    pub default_target: String,
    pub firmware: String,
    pub secure_boot: bool,
    pub locale: Option<String>,
    pub docs: bool,
    pub cloud: Option<String>,
    pub attestation_backend: Option<String>,

    partitions: Vec<Partition>,
    encryption: Option<EncryptionConfig>,
    network: NetworkConfig,
    ssh: SSHConfig,
    packages: Vec<String>,
    builds: Vec<BuildArtifact>,
    services: Vec<Service>,
    files: Vec<FileEntry>,
    templates: Vec<TemplateEntry>,
    skeleton: Vec<SkeletonEntry>,
    run_commands: Vec<RunCommand>,
    users: Vec<UserEntry>,
    secrets: Vec<SecretEntry>,
    repositories: Vec<RepositoryEntry>,
    profiles: BTreeMap<String, Profile>,
    active_scope: ActiveScope,
}

impl Image {
    pub fn new(name: impl Into<String>, base: impl Into<String>) -> Self {
        Image {
            name: name.into(),
            base: base.into(),
            kernel: Kernel::default(),
            init: "systemd".to_string(),
            default_target: "minimal.target".to_string(),
            firmware: "ovmf".to_string(),
            secure_boot: false,
            locale: None,
            docs: false,
            cloud: None,
            attestation_backend: None,
            partitions: vec![Partition::new("/")],
            encryption: None,
            network: NetworkConfig::default(),
            ssh: SSHConfig::default(),
            packages: Vec::new(),
            builds: Vec::new(),
            services: Vec::new(),
            files: Vec::new(),
            templates: Vec::new(),
            skeleton: Vec::new(),
            run_commands: Vec::new(),
            users: Vec::new(),
            secrets: Vec::new(),
            repositories: Vec::new(),
            profiles: BTreeMap::new(),
            active_scope: ActiveScope::Base,
        }
    }

    fn active_profile_mut(&mut self) -> Option<&mut Profile> {
        match &self.active_scope {
            ActiveScope::Base => None,
            ActiveScope::Profile(name) => self.profiles.get_mut(name),
        }
    }

    /// Enter a named profile scope for the duration of `f`. Inside `f`,
    /// profile-aware mutators record into the named overlay instead of the
    /// base image. Profiles used more than once accumulate; re-entering a
    /// profile scope while one is already active is an error.
    pub fn profile(
        &mut self,
        name: impl Into<String>,
        f: impl FnOnce(&mut Image),
    ) -> Result<(), Error> {
        ensure!(
            self.active_scope == ActiveScope::Base,
            DuplicateProfileScopeSnafu {
                active: match &self.active_scope {
                    ActiveScope::Base => "base".to_string(),
                    ActiveScope::Profile(n) => n.clone(),
                }
            }
        );
        let name = name.into();
        self.profiles
            .entry(name.clone())
            .or_insert_with(|| Profile::new(&name));
        self.active_scope = ActiveScope::Profile(name);
        f(self);
        self.active_scope = ActiveScope::Base;
        Ok(())
    }

    // --- Partitions (base-only) ---

    pub fn partitions(&mut self, parts: Vec<Partition>) {
        self.partitions = parts;
    }

    // --- Encryption (base-only) ---

    pub fn encryption(&mut self, config: EncryptionConfig) {
        self.encryption = Some(config);
    }

    // --- Network (base-only) ---

    pub fn network(&mut self, config: NetworkConfig) {
        self.network = config;
    }

    // --- SSH (base-only; preserved design decision, see module docs) ---

    pub fn ssh(&mut self, config: SSHConfig) {
        self.ssh = config;
    }

    // --- Packages (profile-aware) ---

    pub fn install<I, S>(&mut self, packages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let packages = packages.into_iter().map(Into::into);
        match self.active_profile_mut() {
            Some(profile) => profile.packages.extend(packages),
            None => self.packages.extend(packages),
        }
    }

    // --- Builds (not profile-aware; always base, matching the source SDK) ---

    pub fn build(&mut self, artifact: BuildArtifact) {
        self.builds.push(artifact);
    }

    // --- Services (profile-aware) ---

    pub fn service(&mut self, svc: Service) {
        match self.active_profile_mut() {
            Some(profile) => profile.services.push(svc),
            None => self.services.push(svc),
        }
    }

    // --- Files (profile-aware) ---

    pub fn file(&mut self, entry: FileEntry) -> Result<(), Error> {
        ensure!(
            entry.src.is_some() || entry.content.is_some(),
            MissingContentSnafu {
                what: "file() requires either src or content".to_string(),
            }
        );
        match self.active_profile_mut() {
            Some(profile) => profile.files.push(entry),
            None => self.files.push(entry),
        }
        Ok(())
    }

    // --- Templates (always base; rendering is global) ---

    pub fn template(&mut self, entry: TemplateEntry) {
        self.templates.push(entry);
    }

    // --- Skeleton (base-only) ---

    pub fn skeleton(&mut self, entry: SkeletonEntry) -> Result<(), Error> {
        ensure!(
            entry.src.is_some() || entry.content.is_some(),
            MissingContentSnafu {
                what: "skeleton() requires either src or content".to_string(),
            }
        );
        self.skeleton.push(entry);
        Ok(())
    }

    // --- Users (base-only) ---

    pub fn user(&mut self, entry: UserEntry) {
        self.users.push(entry);
    }

    // --- Secrets (base-only) ---

    pub fn secret(&mut self, entry: SecretEntry) {
        self.secrets.push(entry);
    }

    // --- Repositories (base-only) ---

    pub fn repository(&mut self, entry: RepositoryEntry) {
        self.repositories.push(entry);
    }

    // --- Lifecycle run-commands (profile-aware for all phases but boot) ---

    fn append_run(&mut self, cmd: RunCommand) {
        match self.active_profile_mut() {
            Some(profile) => profile.run_commands.push(cmd),
            None => self.run_commands.push(cmd),
        }
    }

    pub fn sync(&mut self, command: impl Into<String>) {
        self.append_run(RunCommand {
            command: Some(command.into()),
            script: None,
            phase: Phase::Sync,
        });
    }

    pub fn prepare(&mut self, command: impl Into<String>) {
        self.append_run(RunCommand {
            command: Some(command.into()),
            script: None,
            phase: Phase::Prepare,
        });
    }

    pub fn run(&mut self, command: impl Into<String>) {
        self.append_run(RunCommand {
            command: Some(command.into()),
            script: None,
            phase: Phase::Postinst,
        });
    }

    pub fn finalize(&mut self, command: impl Into<String>) {
        self.append_run(RunCommand {
            command: Some(command.into()),
            script: None,
            phase: Phase::Finalize,
        });
    }

    pub fn postoutput(&mut self, command: impl Into<String>) {
        self.append_run(RunCommand {
            command: Some(command.into()),
            script: None,
            phase: Phase::Postoutput,
        });
    }

    pub fn clean(&mut self, command: impl Into<String>) {
        self.append_run(RunCommand {
            command: Some(command.into()),
            script: None,
            phase: Phase::Clean,
        });
    }

    /// Run a command at VM boot time. Not an assembler phase: materialized
    /// as a guest-side systemd oneshot unit instead.
    pub fn on_boot(&mut self, command: impl Into<String>) {
        // Boot commands are never profile-scoped overlays in the source
        // SDK either way, since on_boot() appends straight to
        // _run_commands without consulting _active_profile.
        self.run_commands.push(RunCommand {
            command: Some(command.into()),
            script: None,
            phase: Phase::Boot,
        });
    }

    // --- Scalar overrides (profile-aware) ---

    pub fn set_locale(&mut self, locale: impl Into<String>) {
        let locale = locale.into();
        match &self.active_scope {
            ActiveScope::Base => self.locale = Some(locale),
            ActiveScope::Profile(name) => {
                if let Some(p) = self.profiles.get_mut(name) {
                    p.overrides.locale = Some(locale);
                }
            }
        }
    }

    pub fn set_docs(&mut self, docs: bool) {
        match &self.active_scope {
            ActiveScope::Base => self.docs = docs,
            ActiveScope::Profile(name) => {
                if let Some(p) = self.profiles.get_mut(name) {
                    p.overrides.docs = Some(docs);
                }
            }
        }
    }

    pub fn set_secure_boot(&mut self, secure_boot: bool) {
        match &self.active_scope {
            ActiveScope::Base => self.secure_boot = secure_boot,
            ActiveScope::Profile(name) => {
                if let Some(p) = self.profiles.get_mut(name) {
                    p.overrides.secure_boot = Some(secure_boot);
                }
            }
        }
    }

    pub fn set_default_target(&mut self, target: impl Into<String>) {
        let target = target.into();
        match &self.active_scope {
            ActiveScope::Base => self.default_target = target,
            ActiveScope::Profile(name) => {
                if let Some(p) = self.profiles.get_mut(name) {
                    p.overrides.default_target = Some(target);
                }
            }
        }
    }

    /// Flatten base configuration plus, if named, one profile's overlay
    /// into an immutable snapshot. Calling `resolve` twice on an
    /// unmodified `Image` yields equal `ResolvedImage` values.
    pub fn resolve(&self, profile: Option<&str>) -> Result<ResolvedImage, Error> {
        let mut resolved = ResolvedImage {
            name: self.name.clone(),
            base: self.base.clone(),
            kernel: self.kernel.clone(),
            init: self.init.clone(),
            default_target: self.default_target.clone(),
            firmware: self.firmware.clone(),
            secure_boot: self.secure_boot,
            locale: self.locale.clone(),
            docs: self.docs,
            cloud: self.cloud.clone(),
            attestation_backend: self.attestation_backend.clone(),
            partitions: self.partitions.clone(),
            encryption: self.encryption.clone(),
            network: self.network.clone(),
            ssh: self.ssh.clone(),
            packages: self.packages.clone(),
            builds: self.builds.clone(),
            services: self.services.clone(),
            files: self.files.clone(),
            templates: self.templates.clone(),
            skeleton: self.skeleton.clone(),
            run_commands: self.run_commands.clone(),
            users: self.users.clone(),
            secrets: self.secrets.clone(),
            repositories: self.repositories.clone(),
        };

        if let Some(name) = profile {
            let p = self
                .profiles
                .get(name)
                .context_unknown_profile(name)?;
            resolved.packages.extend(p.packages.clone());
            resolved.services.extend(p.services.clone());
            resolved.files.extend(p.files.clone());
            resolved.run_commands.extend(p.run_commands.clone());

            if let Some(locale) = &p.overrides.locale {
                resolved.locale = Some(locale.clone());
            }
            if let Some(docs) = p.overrides.docs {
                resolved.docs = docs;
            }
            if let Some(secure_boot) = p.overrides.secure_boot {
                resolved.secure_boot = secure_boot;
            }
            if let Some(default_target) = &p.overrides.default_target {
                resolved.default_target = default_target.clone();
            }
            if let Some(cloud) = &p.overrides.cloud {
                resolved.cloud = Some(cloud.clone());
            }
            if let Some(backend) = &p.overrides.attestation_backend {
                resolved.attestation_backend = Some(backend.clone());
            }
        }

        Ok(resolved)
    }
}

trait UnknownProfileContext<T> {
    fn context_unknown_profile(self, name: &str) -> Result<T, Error>;
}

impl<T> UnknownProfileContext<T> for Option<T> {
    fn context_unknown_profile(self, name: &str) -> Result<T, Error> {
        self.ok_or_else(|| {
            UnknownProfileSnafu {
                name: name.to_string(),
            }
            .build()
        })
    }
}

/// Flat, fully-resolved image configuration ready for compilation.
/// Immutable after `resolve`: the compiler must not write back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedImage {
    pub name: String,
    pub base: String,
    pub kernel: Kernel,
    pub init: String,
    pub default_target: String,
    pub firmware: String,
    pub secure_boot: bool,
    pub locale: Option<String>,
    pub docs: bool,
    pub cloud: Option<String>,
    pub attestation_backend: Option<String>,
    pub partitions: Vec<Partition>,
    pub encryption: Option<EncryptionConfig>,
    pub network: NetworkConfig,
    pub ssh: SSHConfig,
    pub packages: Vec<String>,
    pub builds: Vec<BuildArtifact>,
    pub services: Vec<Service>,
    pub files: Vec<FileEntry>,
    pub templates: Vec<TemplateEntry>,
    pub skeleton: Vec<SkeletonEntry>,
    pub run_commands: Vec<RunCommand>,
    pub users: Vec<UserEntry>,
    pub secrets: Vec<SecretEntry>,
    pub repositories: Vec<RepositoryEntry>,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn resolve_without_profile_is_idempotent() {
        let mut image = Image::new("my-prover", "debian/bookworm");
        image.install(["ca-certificates"]);

        let a = image.resolve(None).unwrap();
        let b = image.resolve(None).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.packages, vec!["ca-certificates".to_string()]);
    }

    #[test]
    fn profile_overlay_extends_base_packages() {
        let mut image = Image::new("my-prover", "debian/bookworm");
        image.install(["ca-certificates"]);
        image
            .profile("dev", |img| {
                img.install(["strace", "gdb"]);
            })
            .unwrap();

        let base = image.resolve(None).unwrap();
        let dev = image.resolve(Some("dev")).unwrap();
        assert_eq!(base.packages, vec!["ca-certificates"]);
        assert_eq!(dev.packages, vec!["ca-certificates", "strace", "gdb"]);
        assert!(dev.packages.starts_with(&base.packages));
    }

    #[test]
    fn ssh_is_base_only_even_inside_a_profile_scope() {
        let mut image = Image::new("x", "debian/bookworm");
        image
            .profile("dev", |img| {
                let mut ssh = SSHConfig::default();
                ssh.enabled = true;
                img.ssh(ssh);
            })
            .unwrap();

        // ssh() always writes straight to the base image regardless of
        // the active profile scope.
        assert!(image.resolve(None).unwrap().ssh.enabled);
        assert!(image.resolve(Some("dev")).unwrap().ssh.enabled);
    }

    #[test]
    fn unknown_profile_is_an_error() {
        let image = Image::new("x", "debian/bookworm");
        assert!(image.resolve(Some("nope")).is_err());
    }

    #[test]
    fn reentrant_profile_scope_is_an_error() {
        let mut image = Image::new("x", "debian/bookworm");
        let result = image.profile("dev", |img| {
            let inner = img.profile("dev", |_| {});
            assert!(inner.is_err());
        });
        assert!(result.is_ok());
    }

    #[test]
    fn file_without_src_or_content_errors() {
        let mut image = Image::new("x", "debian/bookworm");
        let result = image.file(FileEntry {
            dest: "/etc/x".to_string(),
            src: None,
            content: None,
        });
        assert!(result.is_err());
    }

    #[test]
    fn on_boot_is_never_profile_scoped() {
        let mut image = Image::new("x", "debian/bookworm");
        image
            .profile("dev", |img| {
                img.on_boot("echo hi");
            })
            .unwrap();
        let resolved = image.resolve(None).unwrap();
        assert_eq!(resolved.run_commands.len(), 1);
        assert_eq!(resolved.run_commands[0].phase, Phase::Boot);
    }
}
