use crate::keys::KeySymbol;
use crate::model::ResourceKind;
use crate::view::StatusGate;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::SystemTime;
use tracing::warn;

const DEFAULT_TAIL_LINES: i64 = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KindGates {
    pub logs: StatusGate,
    pub port_forward: StatusGate,
}

impl Default for KindGates {
    fn default() -> Self {
        Self {
            logs: StatusGate::new(["Running", "Completed"]),
            port_forward: StatusGate::new(["Running"]),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HotkeyDef {
    pub key: KeySymbol,
    pub command: String,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub source: Option<String>,
    gates: BTreeMap<ResourceKind, KindGates>,
    pub shell_command: Vec<String>,
    pub log_tail_lines: i64,
    pub hotkeys: Vec<HotkeyDef>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            source: None,
            gates: BTreeMap::new(),
            shell_command: default_shell_command(),
            log_tail_lines: DEFAULT_TAIL_LINES,
            hotkeys: Vec::new(),
        }
    }
}

impl Settings {
    pub fn gates_for(&self, kind: ResourceKind) -> KindGates {
        self.gates.get(&kind).cloned().unwrap_or_default()
    }

    pub fn set_gates(&mut self, kind: ResourceKind, gates: KindGates) {
        self.gates.insert(kind, gates);
    }

    /// Shell argv with `$NAMESPACE`, `$POD`, `$CONTAINER`, `$NAME` and any
    /// other env key substituted.
    pub fn shell_argv(&self, env: &BTreeMap<String, String>) -> Vec<String> {
        self.shell_command
            .iter()
            .map(|arg| expand_template(arg, env))
            .collect()
    }
}

#[derive(Debug, Clone)]
pub struct RuntimeConfigWatcher {
    explicit: Option<PathBuf>,
    path: Option<PathBuf>,
    modified: Option<SystemTime>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct KdeckConfigFile {
    #[serde(default)]
    gates: BTreeMap<String, GateSpec>,
    #[serde(default)]
    shell: ShellSpec,
    #[serde(default)]
    logs: LogSpec,
    #[serde(default)]
    hotkeys: Vec<HotkeySpec>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct GateSpec {
    #[serde(default)]
    logs: Option<Vec<String>>,
    #[serde(default, alias = "port-forward", alias = "forward")]
    port_forward: Option<Vec<String>>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct ShellSpec {
    #[serde(default, alias = "cmd")]
    command: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct LogSpec {
    #[serde(default, alias = "tail")]
    tail_lines: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
struct HotkeySpec {
    key: String,
    #[serde(default)]
    command: String,
    #[serde(default)]
    description: String,
}

impl RuntimeConfigWatcher {
    pub fn discover(explicit: Option<PathBuf>) -> Self {
        let path = explicit.clone().or_else(discover_config_path);
        Self {
            explicit,
            path,
            modified: None,
        }
    }

    pub fn load_current(&mut self) -> Result<Settings> {
        let Some(path) = self.path.clone() else {
            return Ok(Settings::default());
        };

        let raw = fs::read_to_string(&path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        // a broken file is reported once per edit, not on every poll
        self.modified = fs::metadata(&path)
            .ok()
            .and_then(|meta| meta.modified().ok());
        let mut settings = parse_settings(&raw)
            .with_context(|| format!("failed to parse config {}", path.display()))?;
        settings.source = Some(path.display().to_string());
        Ok(settings)
    }

    pub fn reload_if_changed(&mut self) -> Result<Option<Settings>> {
        let Some(current_path) = self.path.clone() else {
            self.path = self.rediscover();
            if self.path.is_some() {
                return self.load_current().map(Some);
            }
            return Ok(None);
        };

        if !current_path.exists() {
            self.path = self.rediscover();
            self.modified = None;
            if self.path.is_some() {
                return self.load_current().map(Some);
            }
            return Ok(Some(Settings::default()));
        }

        let modified = fs::metadata(&current_path)
            .ok()
            .and_then(|meta| meta.modified().ok());
        if modified != self.modified {
            return self.load_current().map(Some);
        }

        Ok(None)
    }

    fn rediscover(&self) -> Option<PathBuf> {
        match &self.explicit {
            Some(path) if path.exists() => Some(path.clone()),
            Some(_) => None,
            None => discover_config_path(),
        }
    }
}

pub fn parse_settings(raw: &str) -> Result<Settings> {
    let parsed: KdeckConfigFile = if raw.trim().is_empty() {
        KdeckConfigFile::default()
    } else {
        serde_yaml::from_str(raw)?
    };

    let mut settings = Settings::default();
    for (token, spec) in parsed.gates {
        let Some(kind) = ResourceKind::from_token(&token) else {
            warn!("ignoring gates for unknown resource kind {token:?}");
            continue;
        };
        let mut gates = KindGates::default();
        if let Some(logs) = spec.logs {
            gates.logs = StatusGate::new(logs);
        }
        if let Some(port_forward) = spec.port_forward {
            gates.port_forward = StatusGate::new(port_forward);
        }
        settings.set_gates(kind, gates);
    }

    if !parsed.shell.command.is_empty() {
        settings.shell_command = parsed.shell.command;
    }
    if let Some(tail_lines) = parsed.logs.tail_lines
        && tail_lines > 0
    {
        settings.log_tail_lines = tail_lines;
    }

    for hotkey in parsed.hotkeys {
        let Some(key) = KeySymbol::parse(&hotkey.key) else {
            warn!("ignoring hotkey with invalid key {:?}", hotkey.key);
            continue;
        };
        if hotkey.command.trim().is_empty() {
            warn!("ignoring hotkey {key} without a command");
            continue;
        }
        let description = if hotkey.description.trim().is_empty() {
            hotkey.command.clone()
        } else {
            hotkey.description
        };
        settings.hotkeys.push(HotkeyDef {
            key,
            command: hotkey.command,
            description,
        });
    }

    Ok(settings)
}

fn default_shell_command() -> Vec<String> {
    [
        "kubectl",
        "exec",
        "-it",
        "-n",
        "$NAMESPACE",
        "$POD",
        "-c",
        "$CONTAINER",
        "--",
        "sh",
        "-c",
        "command -v bash >/dev/null && exec bash || exec sh",
    ]
    .into_iter()
    .map(str::to_string)
    .collect()
}

fn expand_template(arg: &str, env: &BTreeMap<String, String>) -> String {
    // longest keys first so $POD never clobbers a $PODNAME-style key
    let mut keys = env.keys().collect::<Vec<_>>();
    keys.sort_by_key(|key| std::cmp::Reverse(key.len()));

    let mut expanded = arg.to_string();
    for key in keys {
        let token = format!("${key}");
        if expanded.contains(&token) {
            expanded = expanded.replace(&token, &env[key]);
        }
    }
    expanded
}

fn discover_config_path() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("KDECK_CONFIG")
        && !path.trim().is_empty()
    {
        return Some(PathBuf::from(path));
    }

    let cwd_candidates = [
        PathBuf::from("kdeck.yaml"),
        PathBuf::from("kdeck.yml"),
        PathBuf::from(".kdeck.yaml"),
    ];
    for candidate in cwd_candidates {
        if candidate.exists() {
            return Some(candidate);
        }
    }

    if let Ok(home) = std::env::var("HOME") {
        let user_candidates = [
            PathBuf::from(&home).join(".config/kdeck/config.yaml"),
            PathBuf::from(&home).join(".config/kdeck/config.yml"),
        ];
        for candidate in user_candidates {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::{KindGates, RuntimeConfigWatcher, Settings, parse_settings};
    use crate::keys::KeySymbol;
    use crate::model::ResourceKind;
    use std::collections::BTreeMap;
    use std::fs;

    #[test]
    fn empty_config_yields_defaults() {
        let settings = parse_settings("").expect("parse");
        assert_eq!(settings, Settings::default());
        let gates = settings.gates_for(ResourceKind::Pods);
        assert!(gates.logs.permits("Completed"));
        assert!(!gates.port_forward.permits("Completed"));
    }

    #[test]
    fn gates_are_configurable_per_kind() {
        let raw = r#"
gates:
  containers:
    logs: [Running, Terminated]
  po:
    port-forward: [Running, Pending]
  widgets:
    logs: [Running]
"#;
        let settings = parse_settings(raw).expect("parse");
        let containers = settings.gates_for(ResourceKind::Containers);
        assert!(containers.logs.permits("terminated"));
        assert!(!containers.logs.permits("Completed"));
        assert_eq!(containers.port_forward, KindGates::default().port_forward);

        let pods = settings.gates_for(ResourceKind::Pods);
        assert!(pods.port_forward.permits("Pending"));
        assert!(pods.logs.permits("Completed"));
    }

    #[test]
    fn hotkeys_and_shell_template_are_loaded() {
        let raw = r#"
shell:
  command: [kubectl, exec, -it, -n, $NAMESPACE, $POD, -c, $CONTAINER, --, bash]
logs:
  tail_lines: 50
hotkeys:
  - key: Shift-0
    command: pf
  - key: ctrl+f99
    command: po
"#;
        let settings = parse_settings(raw).expect("parse");
        assert_eq!(settings.log_tail_lines, 50);
        assert_eq!(settings.hotkeys.len(), 1);
        assert_eq!(settings.hotkeys[0].key, KeySymbol::from("shift+0"));
        assert_eq!(settings.hotkeys[0].description, "pf");

        let env = BTreeMap::from([
            ("NAMESPACE".to_string(), "ns1".to_string()),
            ("POD".to_string(), "pod1".to_string()),
            ("CONTAINER".to_string(), "c1".to_string()),
        ]);
        assert_eq!(
            settings.shell_argv(&env),
            vec!["kubectl", "exec", "-it", "-n", "ns1", "pod1", "-c", "c1", "--", "bash"]
        );
    }

    #[test]
    fn watcher_reloads_after_the_file_changes() {
        let path = std::env::temp_dir().join(format!("kdeck-config-{}.yaml", std::process::id()));
        fs::write(&path, "logs:\n  tail_lines: 10\n").expect("write config");

        let mut watcher = RuntimeConfigWatcher::discover(Some(path.clone()));
        let first = watcher.load_current().expect("load");
        assert_eq!(first.log_tail_lines, 10);
        assert!(watcher.reload_if_changed().expect("reload").is_none());

        fs::remove_file(&path).expect("remove config");
        let reverted = watcher.reload_if_changed().expect("reload");
        assert_eq!(reverted, Some(Settings::default()));
    }
}
