use chrono::{DateTime, Local};
use std::collections::BTreeMap;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::config::Settings;
use crate::keys::KeyActions;
use crate::model::{ResourceKind, ResourcePath, RowData, TableData};
use crate::session::SessionError;

pub const PORT_PLACEHOLDER: &str = "MY_TCP_PORT!";

const PAGE_STEP: usize = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusGate {
    allowed: Vec<String>,
}

impl StatusGate {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            allowed: allowed.into_iter().map(Into::into).collect(),
        }
    }

    pub fn permits(&self, status: &str) -> bool {
        let status = status.trim();
        self.allowed
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(status))
    }

    pub fn allowed(&self) -> &[String] {
        &self.allowed
    }
}

/// A behaviour slice composed into a view on top of the listable base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Capability {
    Logs { gate: StatusGate },
    Shell,
    Forward { gate: StatusGate },
    Decode,
    StopForward,
}

impl Capability {
    fn bind_into(&self, actions: &mut KeyActions<ViewAction>) {
        match self {
            Self::Logs { .. } => {
                actions.bind("l", "Logs", ViewAction::ViewLogs { previous: false }, true);
                actions.bind(
                    "shift+l",
                    "Logs Previous",
                    ViewAction::ViewLogs { previous: true },
                    true,
                );
            }
            Self::Shell => {
                actions.bind("s", "Shell", ViewAction::Shell, true);
            }
            Self::Forward { .. } => {
                actions.bind("shift+f", "Port-Forward", ViewAction::PortForward, true);
            }
            Self::Decode => {
                actions.bind("x", "Decode", ViewAction::Decode, true);
            }
            Self::StopForward => {
                actions.bind("ctrl+d", "Stop", ViewAction::StopForward, true);
                actions.unbind("d");
            }
        }
    }

    fn contribute_env(&self, target: Option<&ContainerTarget>, env: &mut BTreeMap<String, String>) {
        match self {
            Self::Logs { .. } | Self::Shell | Self::Forward { .. } => {
                if let Some(target) = target {
                    if let Some(pod) = target.path.object_name() {
                        env.insert("POD".to_string(), pod.to_string());
                    }
                    if let Some(container) = &target.container {
                        env.insert("CONTAINER".to_string(), container.clone());
                    }
                }
            }
            Self::Decode | Self::StopForward => {}
        }
    }

    fn refresh_gates(&mut self, kind: ResourceKind, settings: &Settings) {
        let gates = settings.gates_for(kind);
        match self {
            Self::Logs { gate } => *gate = gates.logs,
            Self::Forward { gate } => *gate = gates.port_forward,
            _ => {}
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewAction {
    Enter,
    Back,
    Describe,
    Refresh,
    SortByName,
    SortByAge,
    CursorDown,
    CursorUp,
    PageDown,
    PageUp,
    Top,
    Bottom,
    ViewLogs { previous: bool },
    Shell,
    PortForward,
    Decode,
    StopForward,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Created,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ActionError {
    #[error("Nothing selected")]
    NoSelection,
    #[error("{action} unavailable while status is {status}")]
    GateClosed { action: &'static str, status: String },
    #[error("{action} is not supported on {kind}")]
    Unsupported {
        action: &'static str,
        kind: ResourceKind,
    },
    #[error("No container found for the selected row")]
    NoContainer,
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("Invalid port {0:?}")]
    InvalidPort(String),
}

impl ActionError {
    pub fn is_warning(&self) -> bool {
        matches!(
            self,
            Self::NoSelection | Self::GateClosed { .. } | Self::Unsupported { .. }
        )
    }
}

/// Selected row as action handlers see it, derived from the rows and the
/// cursor. Status and ports come from the kind's agreed column offsets.
#[derive(Debug, Clone, Copy)]
pub struct Selection<'a> {
    pub index: usize,
    pub row: &'a RowData,
    pub status: Option<&'a str>,
    pub ports: Option<&'a str>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogTarget {
    pub namespace: String,
    pub pod: String,
    pub container: String,
    pub previous: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ForwardTarget {
    pub path: ResourcePath,
    pub container: String,
    pub port: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ContainerTarget {
    path: ResourcePath,
    container: Option<String>,
}

#[derive(Debug, Clone)]
pub enum TableUpdate {
    Rows {
        headers: Vec<String>,
        rows: Vec<RowData>,
        refreshed_at: DateTime<Local>,
    },
    Failed {
        message: String,
        refreshed_at: DateTime<Local>,
    },
}

#[derive(Debug, Clone)]
pub struct ResourceView {
    kind: ResourceKind,
    path: ResourcePath,
    table: TableData,
    capabilities: Vec<Capability>,
    actions: KeyActions<ViewAction>,
    lifecycle: Lifecycle,
    deferred: Option<TableUpdate>,
    sort: Option<(usize, bool)>,
    cancel: Option<CancellationToken>,
}

impl ResourceView {
    pub fn new(kind: ResourceKind, path: ResourcePath, settings: &Settings) -> Self {
        let capabilities = capabilities_for(kind, settings);
        let actions = build_actions(&capabilities);
        Self {
            kind,
            path,
            table: TableData::default(),
            capabilities,
            actions,
            lifecycle: Lifecycle::Created,
            deferred: None,
            sort: None,
            cancel: None,
        }
    }

    pub fn kind(&self) -> ResourceKind {
        self.kind
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn table(&self) -> &TableData {
        &self.table
    }

    pub fn actions(&self) -> &KeyActions<ViewAction> {
        &self.actions
    }

    pub fn capabilities(&self) -> &[Capability] {
        &self.capabilities
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.lifecycle
    }

    pub fn sort(&self) -> Option<(usize, bool)> {
        self.sort
    }

    pub fn title(&self) -> String {
        if self.path.is_all() {
            format!("{}(all)", self.kind.short_token())
        } else {
            format!("{}({})", self.kind.short_token(), self.path)
        }
    }

    pub fn init(&mut self, cancel: CancellationToken) {
        self.cancel = Some(cancel);
    }

    pub fn start(&mut self) {
        self.lifecycle = Lifecycle::Running;
        if let Some(update) = self.deferred.take() {
            self.apply_now(update);
        }
    }

    pub fn stop(&mut self) {
        if self.lifecycle == Lifecycle::Running {
            self.lifecycle = Lifecycle::Stopped;
        }
    }

    pub fn worker_token(&self) -> Option<CancellationToken> {
        self.cancel.as_ref().map(CancellationToken::child_token)
    }

    pub fn teardown(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        self.lifecycle = Lifecycle::Stopped;
    }

    pub fn apply_update(&mut self, update: TableUpdate) {
        if self.lifecycle == Lifecycle::Stopped {
            self.deferred = Some(update);
        } else {
            self.apply_now(update);
        }
    }

    fn apply_now(&mut self, update: TableUpdate) {
        let selected = self.table.selected_row().map(|row| row.name.clone());
        match update {
            TableUpdate::Rows {
                headers,
                rows,
                refreshed_at,
            } => self.table.set_rows(headers, rows, refreshed_at),
            TableUpdate::Failed {
                message,
                refreshed_at,
            } => self.table.set_error(message, refreshed_at),
        }
        if let Some((column, ascending)) = self.sort {
            self.table.sort_by_column(column, ascending, self.is_age_column(column));
        }
        if let Some(name) = selected
            && let Some(index) = self.table.rows.iter().position(|row| row.name == name)
        {
            self.table.selected = index;
        }
    }

    pub fn apply_settings(&mut self, settings: &Settings) {
        for capability in &mut self.capabilities {
            capability.refresh_gates(self.kind, settings);
        }
    }

    pub fn move_cursor(&mut self, action: ViewAction) {
        let last = self.table.rows.len().saturating_sub(1);
        let selected = self.table.selected;
        self.table.selected = match action {
            ViewAction::CursorDown => (selected + 1).min(last),
            ViewAction::CursorUp => selected.saturating_sub(1),
            ViewAction::PageDown => (selected + PAGE_STEP).min(last),
            ViewAction::PageUp => selected.saturating_sub(PAGE_STEP),
            ViewAction::Top => 0,
            ViewAction::Bottom => last,
            _ => selected,
        };
    }

    pub fn toggle_sort(&mut self, column: usize) {
        let ascending = match self.sort {
            Some((current, ascending)) if current == column => !ascending,
            _ => true,
        };
        self.sort = Some((column, ascending));
        self.table.sort_by_column(column, ascending, self.is_age_column(column));
    }

    fn is_age_column(&self, column: usize) -> bool {
        self.kind.age_column() == Some(column)
    }

    pub fn selection(&self) -> Option<Selection<'_>> {
        let row = self.table.selected_row()?;
        Some(Selection {
            index: self.table.selected,
            row,
            status: self.kind.status_column().and_then(|column| row.cell(column)),
            ports: self.kind.ports_column().and_then(|column| row.cell(column)),
        })
    }

    pub fn selected_status(&self) -> Option<&str> {
        self.selection()?.status
    }

    pub fn env(&self) -> BTreeMap<String, String> {
        let mut env = BTreeMap::new();
        if let Some(namespace) = self.path.namespace_name() {
            env.insert("NAMESPACE".to_string(), namespace.to_string());
        }
        let Some(Selection { row, .. }) = self.selection() else {
            return env;
        };

        if let Some(namespace) = &row.namespace {
            env.insert("NAMESPACE".to_string(), namespace.clone());
        }
        env.insert("NAME".to_string(), row.name.clone());
        for (header, cell) in self.table.headers.iter().zip(&row.columns) {
            let key = format!("COL-{}", header.to_ascii_uppercase().replace(' ', "-"));
            env.insert(key, cell.clone());
        }

        let target = self.container_target(row);
        for capability in &self.capabilities {
            capability.contribute_env(target.as_ref(), &mut env);
        }
        env
    }

    pub fn row_path(&self, row: &RowData) -> Option<ResourcePath> {
        let namespace = row
            .namespace
            .as_deref()
            .or_else(|| self.path.namespace_name())?;
        Some(ResourcePath::object(namespace, &row.name))
    }

    fn container_target(&self, row: &RowData) -> Option<ContainerTarget> {
        match self.kind {
            ResourceKind::Pods => Some(ContainerTarget {
                path: self.row_path(row)?,
                container: row.default_container.clone(),
            }),
            ResourceKind::Containers => {
                self.path.object_name()?;
                Some(ContainerTarget {
                    path: self.path.clone(),
                    container: Some(row.name.clone()),
                })
            }
            _ => None,
        }
    }

    fn selected(&self) -> Result<Selection<'_>, ActionError> {
        self.selection().ok_or(ActionError::NoSelection)
    }

    fn check_gate(&self, action: &'static str, gate: &StatusGate) -> Result<(), ActionError> {
        let status = self.selected_status().unwrap_or_default();
        if gate.permits(status) {
            Ok(())
        } else {
            Err(ActionError::GateClosed {
                action,
                status: if status.is_empty() {
                    "unknown".to_string()
                } else {
                    status.to_string()
                },
            })
        }
    }

    fn selected_container(&self) -> Result<(ResourcePath, String), ActionError> {
        let row = self.selected()?.row;
        let target = self.container_target(row).ok_or(ActionError::NoContainer)?;
        let container = target.container.ok_or(ActionError::NoContainer)?;
        Ok((target.path, container))
    }

    pub fn logs_target(&self, previous: bool) -> Result<LogTarget, ActionError> {
        let gate = self
            .capabilities
            .iter()
            .find_map(|capability| match capability {
                Capability::Logs { gate } => Some(gate),
                _ => None,
            })
            .ok_or(ActionError::Unsupported {
                action: "Logs",
                kind: self.kind,
            })?;
        self.selected()?;
        if !previous {
            self.check_gate("Logs", gate)?;
        }

        let (path, container) = self.selected_container()?;
        match (path.namespace_name(), path.object_name()) {
            (Some(namespace), Some(pod)) => Ok(LogTarget {
                namespace: namespace.to_string(),
                pod: pod.to_string(),
                container,
                previous,
            }),
            _ => Err(ActionError::NoContainer),
        }
    }

    pub fn shell_env(&self) -> Result<BTreeMap<String, String>, ActionError> {
        if !self.capabilities.contains(&Capability::Shell) {
            return Err(ActionError::Unsupported {
                action: "Shell",
                kind: self.kind,
            });
        }
        self.selected_container()?;
        Ok(self.env())
    }

    pub fn forward_target(&self) -> Result<ForwardTarget, ActionError> {
        let gate = self
            .capabilities
            .iter()
            .find_map(|capability| match capability {
                Capability::Forward { gate } => Some(gate),
                _ => None,
            })
            .ok_or(ActionError::Unsupported {
                action: "Port-forward",
                kind: self.kind,
            })?;
        let selection = self.selected()?;
        self.check_gate("Port-forward", gate)?;

        let (path, container) = self.selected_container()?;
        let port = selection.ports.and_then(select_tcp_port);
        Ok(ForwardTarget {
            path,
            container,
            port,
        })
    }

    pub fn decode_target(&self) -> Result<ResourcePath, ActionError> {
        if !self.capabilities.contains(&Capability::Decode) {
            return Err(ActionError::Unsupported {
                action: "Decode",
                kind: self.kind,
            });
        }
        let row = self.selected()?.row;
        self.row_path(row).ok_or(ActionError::NoSelection)
    }

    pub fn stop_target(&self) -> Result<String, ActionError> {
        if !self.capabilities.contains(&Capability::StopForward) {
            return Err(ActionError::Unsupported {
                action: "Stop",
                kind: self.kind,
            });
        }
        Ok(self.selected()?.row.name.clone())
    }

    pub fn describe_target(&self) -> Result<&RowData, ActionError> {
        Ok(self.selected()?.row)
    }
}

fn capabilities_for(kind: ResourceKind, settings: &Settings) -> Vec<Capability> {
    let gates = settings.gates_for(kind);
    match kind {
        ResourceKind::Pods | ResourceKind::Containers => vec![
            Capability::Logs { gate: gates.logs },
            Capability::Shell,
            Capability::Forward {
                gate: gates.port_forward,
            },
        ],
        ResourceKind::Secrets => vec![Capability::Decode],
        ResourceKind::PortForwards => vec![Capability::StopForward],
        ResourceKind::Namespaces
        | ResourceKind::Services
        | ResourceKind::Deployments
        | ResourceKind::ConfigMaps => Vec::new(),
    }
}

fn build_actions(capabilities: &[Capability]) -> KeyActions<ViewAction> {
    let mut actions = KeyActions::new();
    actions.bind("enter", "View", ViewAction::Enter, true);
    actions.bind("esc", "Back", ViewAction::Back, true);
    actions.bind("p", "Previous", ViewAction::Back, false);
    actions.bind("d", "Describe", ViewAction::Describe, true);
    actions.bind("ctrl+r", "Refresh", ViewAction::Refresh, true);
    actions.bind("shift+n", "Sort Name", ViewAction::SortByName, true);
    actions.bind("shift+a", "Sort Age", ViewAction::SortByAge, true);
    for (key, action) in [
        ("j", ViewAction::CursorDown),
        ("down", ViewAction::CursorDown),
        ("k", ViewAction::CursorUp),
        ("up", ViewAction::CursorUp),
        ("pagedown", ViewAction::PageDown),
        ("pageup", ViewAction::PageUp),
        ("g", ViewAction::Top),
        ("shift+g", ViewAction::Bottom),
    ] {
        actions.bind(key, "Move", action, false);
    }

    for capability in capabilities {
        capability.bind_into(&mut actions);
    }
    actions
}

pub fn select_tcp_port(cell: &str) -> Option<String> {
    cell.split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .find_map(tcp_port_of)
}

fn tcp_port_of(token: &str) -> Option<String> {
    let port = if let Some((protocol, port)) = token.split_once('/') {
        if !protocol.trim().eq_ignore_ascii_case("tcp") {
            return None;
        }
        port
    } else if let Some((_, port)) = token.split_once(':') {
        port
    } else {
        token
    };
    let port = port.trim();
    match port.parse::<u16>() {
        Ok(number) if number > 0 => Some(port.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::{
        ActionError, Capability, Lifecycle, PORT_PLACEHOLDER, ResourceView, StatusGate,
        TableUpdate, ViewAction, select_tcp_port,
    };
    use crate::config::{KindGates, Settings};
    use crate::keys::KeySymbol;
    use crate::model::{ResourceKind, ResourcePath, RowData};
    use chrono::Local;
    use tokio_util::sync::CancellationToken;

    fn pod_row(name: &str, status: &str, ports: &str) -> RowData {
        RowData {
            name: name.to_string(),
            namespace: Some("ns1".to_string()),
            columns: vec![
                name.to_string(),
                "ns1".to_string(),
                "1/1".to_string(),
                status.to_string(),
                "0".to_string(),
                ports.to_string(),
                "node-a".to_string(),
                "5m".to_string(),
            ],
            detail: String::new(),
            default_container: Some("app".to_string()),
        }
    }

    fn pod_headers() -> Vec<String> {
        ["Name", "Namespace", "Ready", "Status", "Restarts", "Ports", "Node", "Age"]
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    fn rows_update(rows: Vec<RowData>) -> TableUpdate {
        TableUpdate::Rows {
            headers: pod_headers(),
            rows,
            refreshed_at: Local::now(),
        }
    }

    fn pods_view(rows: Vec<RowData>) -> ResourceView {
        let mut view = ResourceView::new(
            ResourceKind::Pods,
            ResourcePath::namespace("ns1"),
            &Settings::default(),
        );
        view.start();
        view.apply_update(rows_update(rows));
        view
    }

    #[test]
    fn port_auto_selection_picks_first_tcp_port() {
        assert_eq!(select_tcp_port("80,udp/53,8080"), Some("80".to_string()));
        assert_eq!(select_tcp_port("udp/53,http:8080"), Some("8080".to_string()));
        assert_eq!(select_tcp_port("TCP/443"), Some("443".to_string()));
        assert_eq!(select_tcp_port("udp/53"), None);
        assert_eq!(select_tcp_port("-"), None);
        assert_eq!(select_tcp_port(""), None);
    }

    #[test]
    fn forward_without_tcp_port_leaves_port_for_placeholder() {
        let view = pods_view(vec![pod_row("dns", "Running", "udp/53")]);
        let target = view.forward_target().expect("forward target");
        assert_eq!(target.port, None);
        assert_eq!(target.path, ResourcePath::object("ns1", "dns"));
        assert_eq!(target.container, "app");
        assert_eq!(target.port.as_deref().unwrap_or(PORT_PLACEHOLDER), "MY_TCP_PORT!");
    }

    #[test]
    fn gates_are_rechecked_against_the_live_row() {
        let mut view = pods_view(vec![pod_row("web", "Running", "80")]);
        assert!(view.logs_target(false).is_ok());
        assert!(view.forward_target().is_ok());

        view.apply_update(rows_update(vec![pod_row("web", "Pending", "80")]));
        assert!(matches!(
            view.logs_target(false),
            Err(ActionError::GateClosed { .. })
        ));
        assert!(matches!(
            view.forward_target(),
            Err(ActionError::GateClosed { .. })
        ));
        // previous logs only need a selection
        assert!(view.logs_target(true).is_ok());

        view.apply_update(rows_update(vec![pod_row("web", "Completed", "80")]));
        assert!(view.logs_target(false).is_ok());
        assert!(view.forward_target().is_err());
    }

    #[test]
    fn reloaded_gates_apply_to_existing_views() {
        let mut view = pods_view(vec![pod_row("web", "Pending", "80")]);
        assert!(view.forward_target().is_err());

        let mut settings = Settings::default();
        settings.set_gates(
            ResourceKind::Pods,
            KindGates {
                port_forward: StatusGate::new(["Running", "Pending"]),
                ..KindGates::default()
            },
        );
        view.apply_settings(&settings);
        assert!(view.forward_target().is_ok());
    }

    #[test]
    fn actions_on_empty_table_report_no_selection() {
        let view = pods_view(Vec::new());
        assert_eq!(view.logs_target(false), Err(ActionError::NoSelection));
        assert_eq!(view.forward_target(), Err(ActionError::NoSelection));
        assert_eq!(view.shell_env(), Err(ActionError::NoSelection));
        assert!(view.selection().is_none());
    }

    #[test]
    fn stop_start_preserves_actions_and_cursor() {
        let mut view = pods_view(vec![
            pod_row("a", "Running", "80"),
            pod_row("b", "Running", "80"),
            pod_row("c", "Running", "80"),
        ]);
        view.move_cursor(ViewAction::CursorDown);
        view.move_cursor(ViewAction::CursorDown);
        let actions_before = view.actions().clone();

        view.stop();
        assert_eq!(view.lifecycle(), Lifecycle::Stopped);
        view.apply_update(rows_update(vec![
            pod_row("0", "Running", "80"),
            pod_row("a", "Running", "80"),
            pod_row("b", "Running", "80"),
            pod_row("c", "Running", "80"),
        ]));
        assert_eq!(view.table().rows.len(), 3);

        view.start();
        assert_eq!(view.lifecycle(), Lifecycle::Running);
        assert_eq!(view.actions(), &actions_before);
        assert_eq!(view.table().rows.len(), 4);
        assert_eq!(
            view.table().selected_row().map(|row| row.name.as_str()),
            Some("c")
        );
    }

    #[test]
    fn env_carries_path_row_and_container() {
        let view = pods_view(vec![pod_row("web", "Running", "80")]);
        let env = view.env();
        assert_eq!(env.get("NAMESPACE").map(String::as_str), Some("ns1"));
        assert_eq!(env.get("POD").map(String::as_str), Some("web"));
        assert_eq!(env.get("CONTAINER").map(String::as_str), Some("app"));
        assert_eq!(env.get("COL-STATUS").map(String::as_str), Some("Running"));
    }

    #[test]
    fn containers_view_targets_the_parent_pod() {
        let mut view = ResourceView::new(
            ResourceKind::Containers,
            ResourcePath::object("ns1", "web"),
            &Settings::default(),
        );
        view.start();
        view.apply_update(TableUpdate::Rows {
            headers: Vec::new(),
            rows: vec![RowData {
                name: "sidecar".to_string(),
                namespace: Some("ns1".to_string()),
                columns: vec![
                    "sidecar".to_string(),
                    "envoy".to_string(),
                    "true".to_string(),
                    "Running".to_string(),
                    "false".to_string(),
                    "0".to_string(),
                    "http:15000,udp/53".to_string(),
                    "1h".to_string(),
                ],
                ..RowData::default()
            }],
            refreshed_at: Local::now(),
        });

        let target = view.logs_target(false).expect("log target");
        assert_eq!(target.pod, "web");
        assert_eq!(target.container, "sidecar");
        let forward = view.forward_target().expect("forward target");
        assert_eq!(forward.port.as_deref(), Some("15000"));
    }

    #[test]
    fn secrets_view_adds_decode_to_the_base_hints() {
        let view = ResourceView::new(
            ResourceKind::Secrets,
            ResourcePath::all(),
            &Settings::default(),
        );
        assert_eq!(view.title(), "secrets(all)");
        assert_eq!(view.capabilities(), &[Capability::Decode]);
        let hints = view.actions().hints();
        assert_eq!(hints.len(), 7);
        assert!(hints.iter().any(|(_, description)| *description == "Decode"));
        assert!(view.actions().resolve(&KeySymbol::from("l")).is_none());
        assert!(matches!(
            view.logs_target(false),
            Err(ActionError::Unsupported { .. })
        ));
    }

    #[test]
    fn pods_view_layers_every_container_capability() {
        let view = pods_view(Vec::new());
        let hints = view.actions().hints();
        assert_eq!(hints.len(), 10);
        for key in ["l", "shift+l", "s", "shift+f", "p", "j"] {
            assert!(view.actions().resolve(&KeySymbol::from(key)).is_some(), "{key}");
        }
    }

    #[test]
    fn repeated_sort_flips_direction() {
        let mut view = pods_view(vec![
            pod_row("b", "Running", "80"),
            pod_row("a", "Running", "80"),
        ]);
        view.toggle_sort(0);
        assert_eq!(view.sort(), Some((0, true)));
        assert_eq!(view.table().rows[0].name, "a");
        view.toggle_sort(0);
        assert_eq!(view.sort(), Some((0, false)));
        assert_eq!(view.table().rows[0].name, "b");
    }

    #[test]
    fn teardown_cancels_view_scoped_work() {
        let mut view = pods_view(Vec::new());
        assert!(view.worker_token().is_none());

        view.init(CancellationToken::new());
        let refresh = view.worker_token().expect("token after init");
        let logs = view.worker_token().expect("token after init");
        assert!(!refresh.is_cancelled());

        view.teardown();
        assert!(refresh.is_cancelled());
        assert!(logs.is_cancelled());
        assert_eq!(view.lifecycle(), Lifecycle::Stopped);
    }
}
