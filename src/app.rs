use crate::config::Settings;
use crate::keys::{Dispatch, KeyActions};
use crate::model::{ResourceKind, ResourcePath, RowData, format_elapsed_seconds};
use crate::nav::NavigationStack;
use crate::session::{Fqn, SessionChange, SessionRegistry, SessionReport};
use crate::view::{
    ActionError, LogTarget, PORT_PLACEHOLDER, ResourceView, TableUpdate, ViewAction,
};
use chrono::Local;
use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};
use std::collections::{BTreeMap, VecDeque};
use std::time::Instant;
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

pub const LOG_PANE_CAPACITY: usize = 5_000;
const DEFAULT_TEXT_VIEWPORT: usize = 20;
const INFO_FLASH_TTL: Duration = Duration::from_secs(4);
const ALERT_FLASH_TTL: Duration = Duration::from_secs(8);

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum InputMode {
    Normal,
    Command,
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum FlashLevel {
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone)]
pub struct Flash {
    pub level: FlashLevel,
    pub message: String,
    raised_at: Instant,
}

impl Flash {
    pub fn info(message: impl Into<String>) -> Self {
        Self::raise(FlashLevel::Info, message)
    }

    pub fn warn(message: impl Into<String>) -> Self {
        Self::raise(FlashLevel::Warn, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::raise(FlashLevel::Error, message)
    }

    fn raise(level: FlashLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            raised_at: Instant::now(),
        }
    }

    pub fn expired(&self, now: Instant) -> bool {
        let ttl = match self.level {
            FlashLevel::Info => INFO_FLASH_TTL,
            FlashLevel::Warn | FlashLevel::Error => ALERT_FLASH_TTL,
        };
        now.duration_since(self.raised_at) >= ttl
    }
}

#[derive(Debug, Clone)]
pub struct DetailPage {
    pub title: String,
    pub text: String,
    pub scroll: u16,
}

#[derive(Debug, Clone)]
pub struct LogPane {
    pub stream: u64,
    pub title: String,
    pub lines: VecDeque<String>,
    pub scroll: u16,
    pub follow: bool,
    pub ended: bool,
    cancel: CancellationToken,
}

impl LogPane {
    fn push_line(&mut self, line: String) {
        if self.lines.len() >= LOG_PANE_CAPACITY {
            self.lines.pop_front();
        }
        self.lines.push_back(line);
    }
}

#[derive(Debug, Clone)]
pub enum Page {
    Resource(ResourceView),
    Detail(DetailPage),
    Logs(LogPane),
}

impl Page {
    pub fn title(&self) -> String {
        match self {
            Self::Resource(view) => view.title(),
            Self::Detail(page) => page.title.clone(),
            Self::Logs(pane) => pane.title.clone(),
        }
    }

    fn start(&mut self) {
        if let Self::Resource(view) = self {
            view.start();
        }
    }

    fn stop(&mut self) {
        if let Self::Resource(view) = self {
            view.stop();
        }
    }

    fn teardown(&mut self) {
        match self {
            Self::Resource(view) => view.teardown(),
            Self::Logs(pane) => pane.cancel.cancel(),
            Self::Detail(_) => {}
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DialogField {
    Local,
    Remote,
}

#[derive(Debug, Clone)]
pub struct PortForwardDialog {
    pub path: ResourcePath,
    pub container: String,
    pub local: String,
    pub remote: String,
    pub field: DialogField,
    pub pending: Option<Fqn>,
}

impl PortForwardDialog {
    fn active_field(&mut self) -> &mut String {
        match self.field {
            DialogField::Local => &mut self.local,
            DialogField::Remote => &mut self.remote,
        }
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum DialogAction {
    Cancel,
    Confirm,
    NextField,
    Backspace,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum GlobalAction {
    Quit,
    Command,
    Help,
    Hotkey(String),
}

#[derive(Debug, Clone)]
pub enum LogEvent {
    Line { stream: u64, line: String },
    Ended { stream: u64, error: Option<String> },
}

#[derive(Debug, Clone)]
pub enum UiEvent {
    Session(SessionReport),
    Log(LogEvent),
    Table {
        kind: ResourceKind,
        path: ResourcePath,
        update: TableUpdate,
    },
    Decoded {
        path: ResourcePath,
        result: Result<String, String>,
    },
}

#[derive(Debug, Clone)]
pub enum AppCommand {
    None,
    Refresh,
    StreamLogs {
        stream: u64,
        target: LogTarget,
        tail_lines: i64,
        cancel: CancellationToken,
    },
    OpenShell {
        argv: Vec<String>,
        label: String,
    },
    StartForward {
        fqn: Fqn,
        cancel: CancellationToken,
    },
    DecodeSecret {
        path: ResourcePath,
        cancel: CancellationToken,
    },
}

#[derive(Debug)]
pub struct App {
    running: bool,
    mode: InputMode,
    input: String,
    cluster: String,
    context: String,
    namespace: Option<String>,
    settings: Settings,
    nav: NavigationStack<Page>,
    sessions: SessionRegistry,
    forward_cancels: BTreeMap<Fqn, CancellationToken>,
    dialog: Option<PortForwardDialog>,
    flash: Option<Flash>,
    show_help: bool,
    suspended: bool,
    queued: VecDeque<UiEvent>,
    root_token: CancellationToken,
    next_log_stream: u64,
    text_viewport: usize,
    global_actions: KeyActions<GlobalAction>,
    dialog_actions: KeyActions<DialogAction>,
    text_actions: KeyActions<ViewAction>,
}

impl App {
    pub fn new(
        cluster: String,
        context: String,
        namespace: Option<String>,
        settings: Settings,
    ) -> Self {
        let root_token = CancellationToken::new();
        let path = namespace
            .clone()
            .map(ResourcePath::namespace)
            .unwrap_or_default();
        let mut root = ResourceView::new(ResourceKind::Pods, path, &settings);
        root.init(root_token.child_token());
        root.start();
        let global_actions = global_actions(&settings);

        Self {
            running: true,
            mode: InputMode::Normal,
            input: String::new(),
            cluster,
            context,
            namespace,
            settings,
            nav: NavigationStack::new(Page::Resource(root)),
            sessions: SessionRegistry::default(),
            forward_cancels: BTreeMap::new(),
            dialog: None,
            flash: None,
            show_help: false,
            suspended: false,
            queued: VecDeque::new(),
            root_token,
            next_log_stream: 0,
            text_viewport: DEFAULT_TEXT_VIEWPORT,
            global_actions,
            dialog_actions: dialog_actions(),
            text_actions: text_actions(),
        }
    }

    pub fn running(&self) -> bool {
        self.running
    }

    pub fn mode(&self) -> InputMode {
        self.mode
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn namespace(&self) -> Option<&str> {
        self.namespace.as_deref()
    }

    pub fn flash(&self) -> Option<&Flash> {
        self.flash.as_ref()
    }

    pub fn dialog(&self) -> Option<&PortForwardDialog> {
        self.dialog.as_ref()
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    pub fn sessions(&self) -> &SessionRegistry {
        &self.sessions
    }

    pub fn current_page(&self) -> &Page {
        self.nav.current()
    }

    pub fn breadcrumbs(&self) -> Vec<String> {
        self.nav.breadcrumbs(Page::title)
    }

    pub fn root_token(&self) -> &CancellationToken {
        &self.root_token
    }

    pub fn is_suspended(&self) -> bool {
        self.suspended
    }

    pub fn active_resource(&self) -> Option<(ResourceKind, ResourcePath)> {
        match self.nav.current() {
            Page::Resource(view) => Some((view.kind(), view.path().clone())),
            _ => None,
        }
    }

    pub fn refresh_target(&self) -> Option<(ResourceKind, ResourcePath, CancellationToken)> {
        match self.nav.current() {
            Page::Resource(view) => Some((
                view.kind(),
                view.path().clone(),
                self.view_token(view),
            )),
            _ => None,
        }
    }

    fn view_token(&self, view: &ResourceView) -> CancellationToken {
        view.worker_token()
            .unwrap_or_else(|| self.root_token.child_token())
    }

    pub fn set_screen_rows(&mut self, rows: u16) {
        // header, footer and the pane borders
        self.text_viewport = usize::from(rows.saturating_sub(4)).max(1);
    }

    pub fn active_hints(&self) -> Vec<(String, String)> {
        let hints = if self.dialog.is_some() {
            self.dialog_actions.hints()
        } else {
            Vec::new()
        };
        if !hints.is_empty() {
            return to_owned_hints(hints);
        }
        match self.nav.current() {
            Page::Resource(view) => to_owned_hints(view.actions().hints()),
            Page::Detail(_) | Page::Logs(_) => to_owned_hints(self.text_actions.hints()),
        }
    }

    pub fn global_hints(&self) -> Vec<(String, String)> {
        to_owned_hints(self.global_actions.hints())
    }

    pub fn set_flash(&mut self, flash: Flash) {
        match flash.level {
            FlashLevel::Info => debug!("flash: {}", flash.message),
            FlashLevel::Warn | FlashLevel::Error => warn!("flash: {}", flash.message),
        }
        self.flash = Some(flash);
    }

    pub fn on_tick(&mut self, now: Instant) {
        if self.flash.as_ref().is_some_and(|flash| flash.expired(now)) {
            self.flash = None;
        }
        self.refresh_port_forward_views();
    }

    pub fn apply_settings(&mut self, settings: Settings) {
        for page in self.nav.iter_mut() {
            if let Page::Resource(view) = page {
                view.apply_settings(&settings);
            }
        }
        self.global_actions = global_actions(&settings);
        self.settings = settings;
    }

    pub fn apply_table_update(
        &mut self,
        kind: ResourceKind,
        path: &ResourcePath,
        update: TableUpdate,
    ) {
        for page in self.nav.iter_mut() {
            if let Page::Resource(view) = page
                && view.kind() == kind
                && view.path() == path
            {
                view.apply_update(update.clone());
            }
        }
    }

    pub fn push_detail(&mut self, title: impl Into<String>, text: impl Into<String>) {
        self.drill_in(Page::Detail(DetailPage {
            title: title.into(),
            text: text.into(),
            scroll: 0,
        }));
    }

    /// Routes a worker report. While suspended, reports are buffered in
    /// arrival order and applied on resume.
    pub fn enqueue(&mut self, event: UiEvent) {
        if self.suspended {
            self.queued.push_back(event);
        } else {
            self.apply_event(event);
        }
    }

    pub fn suspend(&mut self) {
        self.suspended = true;
        self.nav.current_mut().stop();
    }

    pub fn resume(&mut self) {
        self.suspended = false;
        self.nav.current_mut().start();
        while let Some(event) = self.queued.pop_front() {
            self.apply_event(event);
        }
    }

    fn apply_event(&mut self, event: UiEvent) {
        match event {
            UiEvent::Session(report) => self.apply_session_report(report),
            UiEvent::Log(event) => self.apply_log_event(event),
            UiEvent::Table { kind, path, update } => self.apply_table_update(kind, &path, update),
            UiEvent::Decoded { path, result } => match result {
                Ok(text) => self.push_detail(format!("decode({path})"), text),
                Err(message) => self.set_flash(Flash::error(message)),
            },
        }
    }

    fn apply_session_report(&mut self, report: SessionReport) {
        match self.sessions.apply(&report, Local::now()) {
            SessionChange::Activated(fqn) => {
                info!("port-forward active: {fqn}");
                if self
                    .dialog
                    .as_ref()
                    .is_some_and(|dialog| dialog.pending.as_ref() == Some(&fqn))
                {
                    self.dialog = None;
                }
                self.set_flash(Flash::info(format!(
                    "Port-forward {} established on {}",
                    fqn.port_pair(),
                    fqn.path()
                )));
            }
            SessionChange::Closed { fqn, error } => {
                self.forward_cancels.remove(&fqn);
                match error {
                    Some(error) => self.set_flash(Flash::error(format!(
                        "Port-forward {} on {} ended: {error}",
                        fqn.port_pair(),
                        fqn.path()
                    ))),
                    None => self.set_flash(Flash::info(format!(
                        "Port-forward {} on {} stopped",
                        fqn.port_pair(),
                        fqn.path()
                    ))),
                }
            }
            SessionChange::FailedToEstablish { fqn, error } => {
                self.forward_cancels.remove(&fqn);
                if self
                    .dialog
                    .as_ref()
                    .is_some_and(|dialog| dialog.pending.as_ref() == Some(&fqn))
                {
                    self.dialog = None;
                }
                self.set_flash(Flash::error(format!(
                    "Port-forward {} on {} failed: {}",
                    fqn.port_pair(),
                    fqn.path(),
                    error.as_deref().unwrap_or("cancelled")
                )));
            }
            SessionChange::Ignored => {
                debug!("ignoring stale session report for {}", report.fqn);
            }
        }
        self.refresh_port_forward_views();
    }

    fn apply_log_event(&mut self, event: LogEvent) {
        let stream = match &event {
            LogEvent::Line { stream, .. } | LogEvent::Ended { stream, .. } => *stream,
        };
        let Some(pane) = self.nav.iter_mut().find_map(|page| match page {
            Page::Logs(pane) if pane.stream == stream => Some(pane),
            _ => None,
        }) else {
            debug!("dropping event of closed log stream {stream}");
            return;
        };

        match event {
            LogEvent::Line { line, .. } => pane.push_line(line),
            LogEvent::Ended { error, .. } => {
                pane.ended = true;
                if let Some(error) = error {
                    let title = pane.title.clone();
                    self.set_flash(Flash::error(format!("{title}: {error}")));
                }
            }
        }
    }

    pub fn refresh_port_forward_views(&mut self) {
        let now = Local::now();
        let rows = self
            .sessions
            .iter()
            .map(|session| {
                let path = session.fqn.path().to_string();
                let age = format_elapsed_seconds(session.age(now).num_seconds());
                RowData {
                    name: session.fqn.to_string(),
                    namespace: session.fqn.path().namespace_name().map(str::to_string),
                    columns: vec![
                        path.clone(),
                        session.fqn.container().to_string(),
                        session.fqn.port_pair(),
                        if session.active { "Active" } else { "Idle" }.to_string(),
                        age,
                    ],
                    detail: format!(
                        "target: {path}\ncontainer: {}\nports: {}\nstarted: {}\n",
                        session.fqn.container(),
                        session.fqn.port_pair(),
                        session.started_at.format("%Y-%m-%d %H:%M:%S")
                    ),
                    default_container: None,
                }
            })
            .collect::<Vec<_>>();
        let headers = ["Name", "Container", "Ports", "Status", "Age"]
            .into_iter()
            .map(str::to_string)
            .collect::<Vec<_>>();

        self.apply_table_update(
            ResourceKind::PortForwards,
            &ResourcePath::all(),
            TableUpdate::Rows {
                headers,
                rows,
                refreshed_at: now,
            },
        );
    }

    pub fn handle_key(&mut self, key: KeyEvent) -> AppCommand {
        if self.show_help {
            self.show_help = false;
            return AppCommand::None;
        }
        if self.mode == InputMode::Command {
            return self.handle_prompt_key(key);
        }

        let key = match self.dispatch_dialog(key) {
            Dispatch::Absorbed(command) => return command,
            Dispatch::Fallthrough(key) => key,
        };
        let key = match self.dispatch_page(key) {
            Dispatch::Absorbed(command) => return command,
            Dispatch::Fallthrough(key) => key,
        };
        match self.dispatch_global(key) {
            Dispatch::Absorbed(command) => command,
            Dispatch::Fallthrough(_) => AppCommand::None,
        }
    }

    fn dispatch_dialog(&mut self, key: KeyEvent) -> Dispatch<AppCommand> {
        if self.dialog.is_none() {
            return Dispatch::Fallthrough(key);
        }
        if let Some(action) = self.dialog_actions.action_for(key) {
            return Dispatch::Absorbed(self.run_dialog_action(action));
        }
        if let KeyCode::Char(c) = key.code
            && !key
                .modifiers
                .intersects(KeyModifiers::CONTROL | KeyModifiers::ALT)
            && let Some(dialog) = self.dialog.as_mut()
        {
            dialog.active_field().push(c);
            return Dispatch::Absorbed(AppCommand::None);
        }
        Dispatch::Fallthrough(key)
    }

    fn run_dialog_action(&mut self, action: DialogAction) -> AppCommand {
        match action {
            DialogAction::Cancel => {
                self.dialog = None;
                AppCommand::None
            }
            DialogAction::NextField => {
                if let Some(dialog) = self.dialog.as_mut() {
                    dialog.field = match dialog.field {
                        DialogField::Local => DialogField::Remote,
                        DialogField::Remote => DialogField::Local,
                    };
                }
                AppCommand::None
            }
            DialogAction::Backspace => {
                if let Some(dialog) = self.dialog.as_mut() {
                    dialog.active_field().pop();
                }
                AppCommand::None
            }
            DialogAction::Confirm => match self.submit_dialog() {
                Ok(command) => command,
                Err(error) => {
                    self.raise_action_error(&error);
                    AppCommand::None
                }
            },
        }
    }

    fn submit_dialog(&mut self) -> Result<AppCommand, ActionError> {
        let Some(dialog) = self.dialog.as_ref() else {
            return Ok(AppCommand::None);
        };
        if dialog.pending.is_some() {
            return Ok(AppCommand::None);
        }
        let local = validate_port(&dialog.local)?;
        let remote = validate_port(&dialog.remote)?;
        let fqn = Fqn::new(dialog.path.clone(), dialog.container.clone(), local, remote);

        self.sessions.request(&fqn)?;
        let cancel = self.root_token.child_token();
        self.forward_cancels.insert(fqn.clone(), cancel.clone());
        if let Some(dialog) = self.dialog.as_mut() {
            dialog.pending = Some(fqn.clone());
        }
        info!("port-forward requested: {fqn}");
        Ok(AppCommand::StartForward { fqn, cancel })
    }

    fn dispatch_page(&mut self, key: KeyEvent) -> Dispatch<AppCommand> {
        let action = match self.nav.current() {
            Page::Resource(view) => view.actions().action_for(key),
            Page::Detail(_) | Page::Logs(_) => self.text_actions.action_for(key),
        };
        let Some(action) = action else {
            return Dispatch::Fallthrough(key);
        };
        debug!("view action={action:?}");

        let is_resource = matches!(self.nav.current(), Page::Resource(_));
        let outcome = if is_resource {
            self.run_view_action(action)
        } else {
            Ok(self.run_text_action(action))
        };
        match outcome {
            Ok(command) => Dispatch::Absorbed(command),
            Err(error) => {
                self.raise_action_error(&error);
                Dispatch::Absorbed(AppCommand::None)
            }
        }
    }

    fn dispatch_global(&mut self, key: KeyEvent) -> Dispatch<AppCommand> {
        let Some(action) = self.global_actions.action_for(key) else {
            return Dispatch::Fallthrough(key);
        };
        let command = match action {
            GlobalAction::Quit => {
                self.running = false;
                AppCommand::None
            }
            GlobalAction::Command => {
                self.mode = InputMode::Command;
                self.input.clear();
                AppCommand::None
            }
            GlobalAction::Help => {
                self.show_help = true;
                AppCommand::None
            }
            GlobalAction::Hotkey(command) => self.run_command(&command),
        };
        Dispatch::Absorbed(command)
    }

    fn raise_action_error(&mut self, error: &ActionError) {
        if error.is_warning() {
            self.set_flash(Flash::warn(error.to_string()));
        } else {
            self.set_flash(Flash::error(error.to_string()));
        }
    }

    fn current_view(&self) -> Option<&ResourceView> {
        match self.nav.current() {
            Page::Resource(view) => Some(view),
            _ => None,
        }
    }

    fn current_view_mut(&mut self) -> Option<&mut ResourceView> {
        match self.nav.current_mut() {
            Page::Resource(view) => Some(view),
            _ => None,
        }
    }

    fn run_view_action(&mut self, action: ViewAction) -> Result<AppCommand, ActionError> {
        let Some(view) = self.current_view() else {
            return Ok(AppCommand::None);
        };
        let kind = view.kind();

        match action {
            ViewAction::Enter => match kind {
                ResourceKind::Namespaces => {
                    let namespace = view
                        .table()
                        .selected_row()
                        .map(|row| row.name.clone())
                        .ok_or(ActionError::NoSelection)?;
                    self.namespace = Some(namespace.clone());
                    self.open_view(ResourceKind::Pods, ResourcePath::namespace(namespace));
                    Ok(AppCommand::Refresh)
                }
                ResourceKind::Pods => {
                    let path = view
                        .table()
                        .selected_row()
                        .and_then(|row| view.row_path(row))
                        .ok_or(ActionError::NoSelection)?;
                    self.open_view(ResourceKind::Containers, path);
                    Ok(AppCommand::Refresh)
                }
                ResourceKind::Containers => self.run_view_action(ViewAction::ViewLogs {
                    previous: false,
                }),
                _ => self.run_view_action(ViewAction::Describe),
            },
            ViewAction::Back => {
                self.back();
                Ok(AppCommand::Refresh)
            }
            ViewAction::Describe => {
                let row = view.describe_target()?;
                let title = match &row.namespace {
                    Some(namespace) if kind.namespaced() => {
                        format!("describe {}/{namespace}/{}", kind.short_token(), row.name)
                    }
                    _ => format!("describe {}/{}", kind.short_token(), row.name),
                };
                let text = if row.detail.is_empty() {
                    row.columns.join("\n")
                } else {
                    row.detail.clone()
                };
                self.push_detail(title, text);
                Ok(AppCommand::None)
            }
            ViewAction::Refresh => {
                if kind == ResourceKind::PortForwards {
                    self.refresh_port_forward_views();
                    return Ok(AppCommand::None);
                }
                Ok(AppCommand::Refresh)
            }
            ViewAction::SortByName => {
                if let Some(view) = self.current_view_mut() {
                    view.toggle_sort(0);
                }
                Ok(AppCommand::None)
            }
            ViewAction::SortByAge => {
                let column = kind.age_column().ok_or(ActionError::Unsupported {
                    action: "Sort by age",
                    kind,
                })?;
                if let Some(view) = self.current_view_mut() {
                    view.toggle_sort(column);
                }
                Ok(AppCommand::None)
            }
            ViewAction::CursorDown
            | ViewAction::CursorUp
            | ViewAction::PageDown
            | ViewAction::PageUp
            | ViewAction::Top
            | ViewAction::Bottom => {
                if let Some(view) = self.current_view_mut() {
                    view.move_cursor(action);
                }
                Ok(AppCommand::None)
            }
            ViewAction::ViewLogs { previous } => {
                let target = view.logs_target(previous)?;
                let cancel = self.view_token(view);
                Ok(self.open_log_pane(target, cancel))
            }
            ViewAction::Shell => {
                let env = view.shell_env()?;
                let argv = self.settings.shell_argv(&env);
                let label = format!(
                    "{}/{}:{}",
                    env.get("NAMESPACE").map(String::as_str).unwrap_or("-"),
                    env.get("POD").map(String::as_str).unwrap_or("-"),
                    env.get("CONTAINER").map(String::as_str).unwrap_or("-"),
                );
                Ok(AppCommand::OpenShell { argv, label })
            }
            ViewAction::PortForward => {
                let target = view.forward_target()?;
                let port = match target.port {
                    Some(port) => port,
                    None => {
                        self.set_flash(Flash::warn(
                            "No TCP port found; enter the ports to forward",
                        ));
                        PORT_PLACEHOLDER.to_string()
                    }
                };
                self.dialog = Some(PortForwardDialog {
                    path: target.path,
                    container: target.container,
                    local: port.clone(),
                    remote: port,
                    field: DialogField::Local,
                    pending: None,
                });
                Ok(AppCommand::None)
            }
            ViewAction::Decode => {
                let path = view.decode_target()?;
                let cancel = self.view_token(view);
                Ok(AppCommand::DecodeSecret { path, cancel })
            }
            ViewAction::StopForward => {
                let name = view.stop_target()?;
                let Some((fqn, cancel)) = self
                    .forward_cancels
                    .iter()
                    .find(|(fqn, _)| fqn.to_string() == name)
                else {
                    self.set_flash(Flash::warn(format!("No active port-forward {name}")));
                    return Ok(AppCommand::None);
                };
                cancel.cancel();
                let message = format!("Stopping port-forward {} on {}", fqn.port_pair(), fqn.path());
                self.set_flash(Flash::info(message));
                Ok(AppCommand::None)
            }
        }
    }

    fn run_text_action(&mut self, action: ViewAction) -> AppCommand {
        if action == ViewAction::Back {
            self.back();
            return AppCommand::Refresh;
        }

        let viewport = self.text_viewport;
        let (scroll, follow) = match self.nav.current_mut() {
            Page::Detail(page) => (&mut page.scroll, None),
            Page::Logs(pane) => {
                if pane.follow && action != ViewAction::Bottom {
                    let bottom = pane.lines.len().saturating_sub(viewport);
                    pane.scroll = u16::try_from(bottom).unwrap_or(u16::MAX);
                }
                (&mut pane.scroll, Some(&mut pane.follow))
            }
            Page::Resource(_) => return AppCommand::None,
        };
        match action {
            ViewAction::CursorDown => *scroll = scroll.saturating_add(1),
            ViewAction::CursorUp => *scroll = scroll.saturating_sub(1),
            ViewAction::PageDown => *scroll = scroll.saturating_add(20),
            ViewAction::PageUp => *scroll = scroll.saturating_sub(20),
            ViewAction::Top => *scroll = 0,
            ViewAction::Bottom => *scroll = u16::MAX,
            _ => {}
        }
        if let Some(follow) = follow {
            *follow = action == ViewAction::Bottom;
        }
        AppCommand::None
    }

    fn open_log_pane(&mut self, target: LogTarget, cancel: CancellationToken) -> AppCommand {
        self.next_log_stream += 1;
        let stream = self.next_log_stream;
        let title = format!(
            "logs{} {}/{}:{}",
            if target.previous { " (previous)" } else { "" },
            target.namespace,
            target.pod,
            target.container
        );
        self.drill_in(Page::Logs(LogPane {
            stream,
            title,
            lines: VecDeque::new(),
            scroll: 0,
            follow: true,
            ended: false,
            cancel: cancel.clone(),
        }));
        AppCommand::StreamLogs {
            stream,
            target,
            tail_lines: self.settings.log_tail_lines,
            cancel,
        }
    }

    fn open_view(&mut self, kind: ResourceKind, path: ResourcePath) {
        let mut view = ResourceView::new(kind, path, &self.settings);
        view.init(self.root_token.child_token());
        self.drill_in(Page::Resource(view));
        if kind == ResourceKind::PortForwards {
            self.refresh_port_forward_views();
        }
    }

    fn drill_in(&mut self, mut page: Page) {
        self.nav.current_mut().stop();
        page.start();
        debug!("opening {} at depth {}", page.title(), self.nav.depth() + 1);
        self.nav.drill_in(page);
    }

    fn back(&mut self) {
        if self.nav.at_root() {
            return;
        }
        if let Some(mut page) = self.nav.back() {
            page.teardown();
            self.nav.current_mut().start();
        }
    }

    fn reset_to(&mut self, kind: ResourceKind, path: ResourcePath) {
        let mut view = ResourceView::new(kind, path, &self.settings);
        view.init(self.root_token.child_token());
        view.start();
        for mut page in self.nav.reset(Page::Resource(view)) {
            page.teardown();
        }
        if kind == ResourceKind::PortForwards {
            self.refresh_port_forward_views();
        }
    }

    fn handle_prompt_key(&mut self, key: KeyEvent) -> AppCommand {
        match key.code {
            KeyCode::Esc => {
                self.mode = InputMode::Normal;
                self.input.clear();
                AppCommand::None
            }
            KeyCode::Enter => {
                self.mode = InputMode::Normal;
                let line = std::mem::take(&mut self.input);
                self.run_command(&line)
            }
            KeyCode::Backspace => {
                self.input.pop();
                AppCommand::None
            }
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                self.mode = InputMode::Normal;
                self.input.clear();
                AppCommand::None
            }
            KeyCode::Char(c) => {
                self.input.push(c);
                AppCommand::None
            }
            _ => AppCommand::None,
        }
    }

    pub fn run_command(&mut self, line: &str) -> AppCommand {
        let mut tokens = line.split_whitespace();
        let Some(head) = tokens.next() else {
            return AppCommand::None;
        };
        let argument = tokens.next();

        match head.to_ascii_lowercase().as_str() {
            "q" | "q!" | "quit" | "exit" => {
                self.running = false;
                return AppCommand::None;
            }
            "help" | "?" => {
                self.show_help = true;
                return AppCommand::None;
            }
            _ => {}
        }

        let Some(kind) = ResourceKind::from_token(head) else {
            self.set_flash(Flash::warn(format!("Unknown command {head:?}")));
            return AppCommand::None;
        };

        let path = match (kind, argument) {
            (ResourceKind::Namespaces | ResourceKind::PortForwards, _) => ResourcePath::all(),
            (ResourceKind::Containers, Some(argument)) => {
                let path = ResourcePath::parse(argument);
                if path.object_name().is_none() {
                    self.set_flash(Flash::warn("Containers need a namespace/pod path"));
                    return AppCommand::None;
                }
                path
            }
            (ResourceKind::Containers, None) => {
                let selected = self.current_view().and_then(|view| {
                    if view.kind() != ResourceKind::Pods {
                        return None;
                    }
                    view.table()
                        .selected_row()
                        .and_then(|row| view.row_path(row))
                });
                let Some(path) = selected else {
                    self.set_flash(Flash::warn("Containers need a namespace/pod path"));
                    return AppCommand::None;
                };
                path
            }
            (_, Some(argument)) => {
                let path = ResourcePath::parse(argument);
                self.namespace = path.namespace_name().map(str::to_string);
                path
            }
            (_, None) => self
                .namespace
                .clone()
                .map(ResourcePath::namespace)
                .unwrap_or_default(),
        };

        info!("switching to {} {}", kind.short_token(), path);
        self.reset_to(kind, path);
        AppCommand::Refresh
    }

    pub fn shutdown(&mut self) {
        self.running = false;
        self.root_token.cancel();
    }
}

fn validate_port(raw: &str) -> Result<String, ActionError> {
    let raw = raw.trim();
    match raw.parse::<u16>() {
        Ok(port) if port > 0 => Ok(port.to_string()),
        _ => Err(ActionError::InvalidPort(raw.to_string())),
    }
}

fn to_owned_hints(hints: Vec<(&crate::keys::KeySymbol, &str)>) -> Vec<(String, String)> {
    hints
        .into_iter()
        .map(|(key, description)| (key.to_string(), description.to_string()))
        .collect()
}

fn global_actions(settings: &Settings) -> KeyActions<GlobalAction> {
    let mut actions = KeyActions::new();
    actions.bind(":", "Command", GlobalAction::Command, true);
    actions.bind("?", "Help", GlobalAction::Help, true);
    actions.bind("q", "Quit", GlobalAction::Quit, true);
    actions.bind("ctrl+c", "Quit", GlobalAction::Quit, false);
    for hotkey in &settings.hotkeys {
        actions.bind(
            hotkey.key.clone(),
            hotkey.description.clone(),
            GlobalAction::Hotkey(hotkey.command.clone()),
            true,
        );
    }
    actions
}

fn dialog_actions() -> KeyActions<DialogAction> {
    let mut actions = KeyActions::new();
    actions.bind("esc", "Cancel", DialogAction::Cancel, true);
    actions.bind("enter", "OK", DialogAction::Confirm, true);
    actions.bind("tab", "Next Field", DialogAction::NextField, true);
    actions.bind("backtab", "Next Field", DialogAction::NextField, false);
    actions.bind("backspace", "Delete", DialogAction::Backspace, false);
    actions
}

fn text_actions() -> KeyActions<ViewAction> {
    let mut actions = KeyActions::new();
    actions.bind("esc", "Back", ViewAction::Back, true);
    actions.bind("p", "Previous", ViewAction::Back, false);
    actions.bind("shift+g", "Follow", ViewAction::Bottom, true);
    actions.bind("g", "Top", ViewAction::Top, true);
    for (key, action) in [
        ("j", ViewAction::CursorDown),
        ("down", ViewAction::CursorDown),
        ("k", ViewAction::CursorUp),
        ("up", ViewAction::CursorUp),
        ("pagedown", ViewAction::PageDown),
        ("pageup", ViewAction::PageUp),
    ] {
        actions.bind(key, "Scroll", action, false);
    }
    actions
}

#[cfg(test)]
mod tests {
    use super::{
        App, AppCommand, FlashLevel, InputMode, LOG_PANE_CAPACITY, LogEvent, Page, UiEvent,
    };
    use crate::config::Settings;
    use crate::model::{ResourceKind, ResourcePath, RowData};
    use crate::session::{Fqn, SessionEvent, SessionReport};
    use crate::view::{Lifecycle, TableUpdate};
    use chrono::Local;
    use crossterm::event::{KeyCode, KeyEvent, KeyModifiers};

    fn app() -> App {
        App::new(
            "cluster".to_string(),
            "context".to_string(),
            Some("ns1".to_string()),
            Settings::default(),
        )
    }

    fn key(code: KeyCode) -> KeyEvent {
        KeyEvent::new(code, KeyModifiers::NONE)
    }

    fn char_key(c: char) -> KeyEvent {
        key(KeyCode::Char(c))
    }

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
            detail: format!("metadata:\n  name: {name}\n"),
            default_container: Some("app".to_string()),
        }
    }

    fn load_pods(app: &mut App, rows: Vec<RowData>) {
        app.apply_table_update(
            ResourceKind::Pods,
            &ResourcePath::namespace("ns1"),
            TableUpdate::Rows {
                headers: Vec::new(),
                rows,
                refreshed_at: Local::now(),
            },
        );
    }

    fn forward_fqn(port: &str) -> Fqn {
        Fqn::new(ResourcePath::object("ns1", "web"), "app", port, port)
    }

    fn report(fqn: &Fqn, event: SessionEvent) -> UiEvent {
        UiEvent::Session(SessionReport {
            fqn: fqn.clone(),
            event,
        })
    }

    fn flash_level(app: &App) -> Option<FlashLevel> {
        app.flash().map(|flash| flash.level)
    }

    #[test]
    fn dialog_escape_wins_over_view_back() {
        let mut app = app();
        load_pods(&mut app, vec![pod_row("web", "Running", "80")]);
        app.handle_key(key(KeyCode::Enter));
        let mut container = pod_row("app", "Running", "80");
        container.default_container = None;
        app.apply_table_update(
            ResourceKind::Containers,
            &ResourcePath::object("ns1", "web"),
            TableUpdate::Rows {
                headers: Vec::new(),
                rows: vec![container],
                refreshed_at: Local::now(),
            },
        );

        app.handle_key(char_key('F'));
        assert!(app.dialog().is_some());
        app.handle_key(key(KeyCode::Esc));
        assert!(app.dialog().is_none());
        assert_eq!(
            app.active_resource(),
            Some((ResourceKind::Containers, ResourcePath::object("ns1", "web")))
        );

        app.handle_key(key(KeyCode::Esc));
        assert_eq!(app.active_resource().map(|(kind, _)| kind), Some(ResourceKind::Pods));
    }

    #[test]
    fn dialog_typing_edits_the_active_field() {
        let mut app = app();
        load_pods(&mut app, vec![pod_row("web", "Running", "80")]);
        app.handle_key(char_key('F'));
        app.handle_key(key(KeyCode::Backspace));
        app.handle_key(key(KeyCode::Backspace));
        for c in "9090".chars() {
            app.handle_key(char_key(c));
        }
        app.handle_key(key(KeyCode::Tab));
        app.handle_key(char_key('8'));

        let dialog = app.dialog().expect("dialog open");
        assert_eq!(dialog.local, "9090");
        assert_eq!(dialog.remote, "808");
        // typed characters never reach the view or global layers
        assert!(app.running());
    }

    #[test]
    fn port_forward_dialog_prefills_first_tcp_port() {
        let mut app = app();
        load_pods(
            &mut app,
            vec![pod_row("web", "Running", "udp/53,http:8080,9090")],
        );
        app.handle_key(char_key('F'));

        let dialog = app.dialog().expect("dialog open");
        assert_eq!(dialog.local, "8080");
        assert_eq!(dialog.remote, "8080");
        assert_eq!(dialog.container, "app");
    }

    #[test]
    fn port_forward_without_tcp_port_uses_placeholder_and_warns() {
        let mut app = app();
        load_pods(&mut app, vec![pod_row("dns", "Running", "udp/53")]);
        app.handle_key(char_key('F'));

        let dialog = app.dialog().expect("dialog open");
        assert_eq!(dialog.local, "MY_TCP_PORT!");
        assert_eq!(flash_level(&app), Some(FlashLevel::Warn));

        // the placeholder is not a port, so confirming is rejected
        assert!(matches!(app.handle_key(key(KeyCode::Enter)), AppCommand::None));
        assert_eq!(flash_level(&app), Some(FlashLevel::Error));
        assert!(app.sessions().is_empty());
    }

    #[test]
    fn gate_closed_flashes_warning_without_opening_dialog() {
        let mut app = app();
        load_pods(&mut app, vec![pod_row("web", "Pending", "80")]);
        app.handle_key(char_key('F'));
        assert!(app.dialog().is_none());
        assert_eq!(flash_level(&app), Some(FlashLevel::Warn));

        assert!(matches!(app.handle_key(char_key('l')), AppCommand::None));
        assert_eq!(app.breadcrumbs().len(), 1);
    }

    #[test]
    fn confirmed_forward_establishes_then_terminates_once() {
        let mut app = app();
        load_pods(&mut app, vec![pod_row("web", "Running", "80")]);
        app.handle_key(char_key('F'));
        let command = app.handle_key(key(KeyCode::Enter));
        let AppCommand::StartForward { fqn, .. } = command else {
            panic!("expected StartForward, got {command:?}");
        };
        assert_eq!(fqn, forward_fqn("80"));
        assert!(app.dialog().is_some());
        assert!(app.sessions().is_empty());

        app.enqueue(report(&fqn, SessionEvent::Established));
        assert!(app.dialog().is_none());
        assert_eq!(app.sessions().len(), 1);
        assert_eq!(flash_level(&app), Some(FlashLevel::Info));

        app.enqueue(report(
            &fqn,
            SessionEvent::Terminated {
                error: Some("connection reset".to_string()),
            },
        ));
        assert!(app.sessions().is_empty());
        assert_eq!(flash_level(&app), Some(FlashLevel::Error));

        app.enqueue(report(&fqn, SessionEvent::Terminated { error: None }));
        assert!(app.sessions().is_empty());
        assert_eq!(flash_level(&app), Some(FlashLevel::Error));
    }

    #[test]
    fn duplicate_forward_is_rejected_without_new_worker() {
        let mut app = app();
        load_pods(&mut app, vec![pod_row("web", "Running", "80")]);
        app.handle_key(char_key('F'));
        let AppCommand::StartForward { fqn, .. } = app.handle_key(key(KeyCode::Enter)) else {
            panic!("expected StartForward");
        };
        app.enqueue(report(&fqn, SessionEvent::Established));

        app.handle_key(char_key('F'));
        assert!(matches!(app.handle_key(key(KeyCode::Enter)), AppCommand::None));
        assert_eq!(flash_level(&app), Some(FlashLevel::Error));
        assert_eq!(app.sessions().len(), 1);
        let message = app.flash().map(|flash| flash.message.clone()).unwrap_or_default();
        assert!(message.contains("already active"));
    }

    #[test]
    fn back_on_root_keeps_the_root_view() {
        let mut app = app();
        for _ in 0..5 {
            app.handle_key(key(KeyCode::Esc));
        }
        assert_eq!(app.breadcrumbs(), vec!["po(ns1)".to_string()]);
        assert!(app.running());
    }

    #[test]
    fn enter_drills_into_containers_and_back_restores_cursor() {
        let mut app = app();
        load_pods(
            &mut app,
            vec![pod_row("a", "Running", "80"), pod_row("web", "Running", "80")],
        );
        app.handle_key(char_key('j'));
        assert!(matches!(app.handle_key(key(KeyCode::Enter)), AppCommand::Refresh));
        assert_eq!(
            app.active_resource(),
            Some((ResourceKind::Containers, ResourcePath::object("ns1", "web")))
        );

        app.handle_key(key(KeyCode::Esc));
        let Page::Resource(view) = app.current_page() else {
            panic!("expected resource page");
        };
        assert_eq!(view.lifecycle(), Lifecycle::Running);
        assert_eq!(view.table().selected_row().map(|row| row.name.as_str()), Some("web"));
    }

    #[test]
    fn reports_are_buffered_while_suspended() {
        let mut app = app();
        let fqn = forward_fqn("80");
        load_pods(&mut app, vec![pod_row("web", "Running", "80")]);
        app.handle_key(char_key('F'));
        app.handle_key(key(KeyCode::Enter));

        app.suspend();
        assert!(matches!(
            app.current_page(),
            Page::Resource(view) if view.lifecycle() == Lifecycle::Stopped
        ));
        app.enqueue(report(&fqn, SessionEvent::Established));
        assert!(app.sessions().is_empty());
        assert!(app.dialog().is_some());

        app.resume();
        assert_eq!(app.sessions().len(), 1);
        assert!(app.dialog().is_none());
        assert!(matches!(
            app.current_page(),
            Page::Resource(view) if view.lifecycle() == Lifecycle::Running
        ));
    }

    #[test]
    fn shell_uses_templated_command_for_selected_container() {
        let mut app = app();
        load_pods(&mut app, vec![pod_row("web", "Pending", "80")]);
        let command = app.handle_key(char_key('s'));
        let AppCommand::OpenShell { argv, label } = command else {
            panic!("expected OpenShell, got {command:?}");
        };
        assert_eq!(label, "ns1/web:app");
        assert!(argv.windows(2).any(|pair| pair == ["-n", "ns1"]));
        assert!(argv.windows(2).any(|pair| pair == ["-c", "app"]));
        assert!(argv.contains(&"web".to_string()));
    }

    #[test]
    fn log_pane_drops_stale_streams_and_caps_lines() {
        let mut app = app();
        load_pods(&mut app, vec![pod_row("web", "Running", "80")]);
        let AppCommand::StreamLogs { stream, cancel, .. } = app.handle_key(char_key('l')) else {
            panic!("expected StreamLogs");
        };

        for index in 0..(LOG_PANE_CAPACITY + 10) {
            app.enqueue(UiEvent::Log(LogEvent::Line {
                stream,
                line: format!("line {index}"),
            }));
        }
        app.enqueue(UiEvent::Log(LogEvent::Line {
            stream: stream + 1,
            line: "stale".to_string(),
        }));
        let Page::Logs(pane) = app.current_page() else {
            panic!("expected log pane");
        };
        assert_eq!(pane.lines.len(), LOG_PANE_CAPACITY);
        assert_eq!(pane.lines.front().map(String::as_str), Some("line 10"));
        assert!(pane.lines.iter().all(|line| line != "stale"));

        app.handle_key(key(KeyCode::Esc));
        assert!(cancel.is_cancelled());
        app.enqueue(UiEvent::Log(LogEvent::Line {
            stream,
            line: "late".to_string(),
        }));
        assert!(matches!(app.current_page(), Page::Resource(_)));
    }

    #[test]
    fn command_prompt_resets_stack_to_requested_view() {
        let mut app = app();
        load_pods(&mut app, vec![pod_row("web", "Running", "80")]);
        app.handle_key(key(KeyCode::Enter));
        assert_eq!(app.breadcrumbs().len(), 2);

        app.handle_key(char_key(':'));
        assert_eq!(app.mode(), InputMode::Command);
        for c in "secrets kube-system".chars() {
            app.handle_key(char_key(c));
        }
        assert!(matches!(app.handle_key(key(KeyCode::Enter)), AppCommand::Refresh));
        assert_eq!(app.mode(), InputMode::Normal);
        assert_eq!(app.breadcrumbs(), vec!["secrets(kube-system)".to_string()]);
        assert_eq!(app.namespace(), Some("kube-system"));
    }

    #[test]
    fn port_forward_view_lists_and_stops_sessions() {
        let mut app = app();
        load_pods(&mut app, vec![pod_row("web", "Running", "80")]);
        app.handle_key(char_key('F'));
        let AppCommand::StartForward { fqn, cancel } = app.handle_key(key(KeyCode::Enter)) else {
            panic!("expected StartForward");
        };
        app.enqueue(report(&fqn, SessionEvent::Established));

        app.run_command("pf");
        let Page::Resource(view) = app.current_page() else {
            panic!("expected resource page");
        };
        assert_eq!(view.table().rows.len(), 1);
        assert_eq!(view.table().rows[0].cell(2), Some("80:80"));

        app.handle_key(KeyEvent::new(KeyCode::Char('d'), KeyModifiers::CONTROL));
        assert!(cancel.is_cancelled());
        app.enqueue(report(&fqn, SessionEvent::Terminated { error: None }));
        let Page::Resource(view) = app.current_page() else {
            panic!("expected resource page");
        };
        assert!(view.table().rows.is_empty());
    }

    #[test]
    fn describe_pushes_yaml_detail_page() {
        let mut app = app();
        load_pods(&mut app, vec![pod_row("web", "Running", "80")]);
        app.handle_key(char_key('d'));
        let Page::Detail(page) = app.current_page() else {
            panic!("expected detail page");
        };
        assert_eq!(page.title, "describe po/ns1/web");
        assert!(page.text.contains("name: web"));
    }

    #[test]
    fn configured_hotkey_runs_its_command() {
        let mut settings = Settings::default();
        settings.hotkeys.push(crate::config::HotkeyDef {
            key: "f2".into(),
            command: "pf".to_string(),
            description: "Forwards".to_string(),
        });
        let mut app = App::new("c".to_string(), "x".to_string(), None, settings);
        assert!(matches!(app.handle_key(key(KeyCode::F(2))), AppCommand::Refresh));
        assert_eq!(
            app.active_resource(),
            Some((ResourceKind::PortForwards, ResourcePath::all()))
        );

        app.handle_key(char_key('q'));
        assert!(!app.running());
    }

    #[test]
    fn table_update_queued_while_suspended_applies_on_resume() {
        let mut app = app();
        app.suspend();
        app.enqueue(UiEvent::Table {
            kind: ResourceKind::Pods,
            path: ResourcePath::namespace("ns1"),
            update: TableUpdate::Rows {
                headers: Vec::new(),
                rows: vec![pod_row("web", "Running", "80")],
                refreshed_at: Local::now(),
            },
        });
        let Page::Resource(view) = app.current_page() else {
            panic!("expected resource page");
        };
        assert!(view.table().rows.is_empty());

        app.resume();
        let Page::Resource(view) = app.current_page() else {
            panic!("expected resource page");
        };
        assert_eq!(view.table().rows.len(), 1);
        assert_eq!(view.table().rows[0].name, "web");
    }

    #[test]
    fn decoded_secret_opens_detail_or_flashes_error() {
        let mut app = app();
        app.enqueue(UiEvent::Decoded {
            path: ResourcePath::object("ns1", "db"),
            result: Err("secrets \"db\" is forbidden".to_string()),
        });
        assert_eq!(flash_level(&app), Some(FlashLevel::Error));
        assert_eq!(app.breadcrumbs().len(), 1);

        app.enqueue(UiEvent::Decoded {
            path: ResourcePath::object("ns1", "db"),
            result: Ok("{\n  \"password\": \"hunter2\"\n}".to_string()),
        });
        let Page::Detail(page) = app.current_page() else {
            panic!("expected detail page");
        };
        assert_eq!(page.title, "decode(ns1/db)");
        assert!(page.text.contains("hunter2"));
    }

    #[test]
    fn scrolling_up_from_follow_starts_one_line_above_the_tail() {
        let mut app = app();
        app.set_screen_rows(24);
        load_pods(&mut app, vec![pod_row("web", "Running", "80")]);
        let AppCommand::StreamLogs { stream, .. } = app.handle_key(char_key('l')) else {
            panic!("expected StreamLogs");
        };
        for index in 0..1000 {
            app.enqueue(UiEvent::Log(LogEvent::Line {
                stream,
                line: format!("line {index}"),
            }));
        }

        app.handle_key(char_key('k'));
        let Page::Logs(pane) = app.current_page() else {
            panic!("expected log pane");
        };
        assert!(!pane.follow);
        assert_eq!(pane.scroll, 979);

        app.handle_key(char_key('G'));
        let Page::Logs(pane) = app.current_page() else {
            panic!("expected log pane");
        };
        assert!(pane.follow);
    }

    #[test]
    fn leaving_a_view_cancels_its_refreshes_and_log_streams() {
        let mut app = app();
        load_pods(&mut app, vec![pod_row("web", "Running", "80")]);
        app.handle_key(key(KeyCode::Enter));
        let Some((kind, _, refresh)) = app.refresh_target() else {
            panic!("expected resource view");
        };
        assert_eq!(kind, ResourceKind::Containers);

        app.handle_key(key(KeyCode::Esc));
        assert!(refresh.is_cancelled());

        let Some((_, _, root_refresh)) = app.refresh_target() else {
            panic!("expected resource view");
        };
        let AppCommand::StreamLogs { cancel, .. } = app.handle_key(char_key('l')) else {
            panic!("expected StreamLogs");
        };
        app.run_command("secrets");
        assert!(root_refresh.is_cancelled());
        assert!(cancel.is_cancelled());
        assert!(!app.root_token().is_cancelled());
    }
}
