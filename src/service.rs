/*!
Systemd service unit generation.

Covers the common service knobs declaratively, with `extra_unit` as an
escape hatch for any systemd directive the typed fields don't expose.
*/
use std::collections::BTreeMap;

/// One systemd service to be installed in the image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Service {
    pub name: String,
    pub exec_start: String,
    pub after: Vec<String>,
    pub requires: Vec<String>,
    pub wants: Vec<String>,
    pub restart: String,
    pub user: Option<String>,
    pub group: Option<String>,
    pub working_directory: Option<String>,
    /// Escape hatch: section name -> (directive -> value) overrides merged
    /// on top of the typed fields.
    pub extra_unit: BTreeMap<String, Vec<(String, String)>>,
}

impl Service {
    pub fn new(name: impl Into<String>, exec_start: impl Into<String>) -> Self {
        Service {
            name: name.into(),
            exec_start: exec_start.into(),
            after: Vec::new(),
            requires: Vec::new(),
            wants: Vec::new(),
            restart: "on-failure".to_string(),
            user: None,
            group: None,
            working_directory: None,
            extra_unit: BTreeMap::new(),
        }
    }

    /// Render a complete systemd `.service` unit file.
    pub fn to_unit_file(&self) -> String {
        let mut unit: Vec<(String, String)> = vec![("Description".to_string(), self.name.clone())];
        if !self.after.is_empty() {
            unit.push(("After".to_string(), self.after.join(" ")));
        }
        if !self.requires.is_empty() {
            unit.push(("Requires".to_string(), self.requires.join(" ")));
        }
        if !self.wants.is_empty() {
            unit.push(("Wants".to_string(), self.wants.join(" ")));
        }
        merge_section(&mut unit, self.extra_unit.get("Unit"));

        let mut service: Vec<(String, String)> = vec![
            ("ExecStart".to_string(), self.exec_start.clone()),
            ("Restart".to_string(), self.restart.clone()),
        ];
        if let Some(user) = &self.user {
            service.push(("User".to_string(), user.clone()));
        }
        if let Some(group) = &self.group {
            service.push(("Group".to_string(), group.clone()));
        }
        if let Some(dir) = &self.working_directory {
            service.push(("WorkingDirectory".to_string(), dir.clone()));
        }
        merge_section(&mut service, self.extra_unit.get("Service"));

        let mut install: Vec<(String, String)> =
            vec![("WantedBy".to_string(), "multi-user.target".to_string())];
        merge_section(&mut install, self.extra_unit.get("Install"));

        let mut out = String::new();
        render_section(&mut out, "Unit", &unit);
        out.push('\n');
        render_section(&mut out, "Service", &service);
        out.push('\n');
        render_section(&mut out, "Install", &install);
        out
    }

    /// Idempotent shell commands that create the service's user (if any)
    /// and enable the unit. Used by the compiler's postinst writer.
    pub fn setup_commands(&self) -> Vec<String> {
        let mut cmds = Vec::new();
        if let Some(user) = &self.user {
            cmds.push(format!(
                "id -u {user} &>/dev/null || useradd -r -s /usr/sbin/nologin {user}",
                user = user
            ));
        }
        cmds.push(format!("systemctl enable {}.service", self.name));
        cmds
    }
}

fn merge_section(base: &mut Vec<(String, String)>, overrides: Option<&Vec<(String, String)>>) {
    let Some(overrides) = overrides else { return };
    for (k, v) in overrides {
        if let Some(existing) = base.iter_mut().find(|(ek, _)| ek == k) {
            existing.1 = v.clone();
        } else {
            base.push((k.clone(), v.clone()));
        }
    }
}

fn render_section(out: &mut String, name: &str, kvs: &[(String, String)]) {
    out.push('[');
    out.push_str(name);
    out.push_str("]\n");
    for (k, v) in kvs {
        out.push_str(k);
        out.push('=');
        out.push_str(v);
        out.push('\n');
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn renders_minimal_unit() {
        let svc = Service::new("my-prover", "/usr/local/bin/my-prover");
        let unit = svc.to_unit_file();
        assert!(unit.contains("[Unit]"));
        assert!(unit.contains("Description=my-prover"));
        assert!(unit.contains("ExecStart=/usr/local/bin/my-prover"));
        assert!(unit.contains("Restart=on-failure"));
        assert!(unit.contains("WantedBy=multi-user.target"));
    }

    #[test]
    fn user_adds_directive_and_setup_command() {
        let mut svc = Service::new("my-prover", "/usr/local/bin/my-prover");
        svc.user = Some("prover".to_string());
        let unit = svc.to_unit_file();
        assert!(unit.contains("User=prover"));

        let cmds = svc.setup_commands();
        assert!(cmds[0].contains("id -u prover"));
        assert!(cmds[0].contains("useradd -r -s /usr/sbin/nologin prover"));
        assert_eq!(cmds[1], "systemctl enable my-prover.service");
    }

    #[test]
    fn extra_unit_overrides_typed_fields() {
        let mut svc = Service::new("x", "/bin/true");
        svc.extra_unit.insert(
            "Service".to_string(),
            vec![("Restart".to_string(), "always".to_string())],
        );
        let unit = svc.to_unit_file();
        assert!(unit.contains("Restart=always"));
        assert!(!unit.contains("Restart=on-failure"));
    }
}
