mod app;
mod cli;
mod config;
mod k8s;
mod keys;
mod model;
mod nav;
mod session;
mod transport;
mod ui;
mod view;

use anyhow::{Context, Result};
use app::{App, AppCommand, Flash, UiEvent};
use chrono::Local;
use clap::Parser;
use cli::CliArgs;
use config::{RuntimeConfigWatcher, Settings};
use crossterm::event::{
    Event, EventStream, KeyEventKind, KeyboardEnhancementFlags, PopKeyboardEnhancementFlags,
    PushKeyboardEnhancementFlags,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
    supports_keyboard_enhancement,
};
use futures::{StreamExt, TryStreamExt};
use k8s::KubeGateway;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{ConfigMap, Namespace, Pod, Secret, Service};
use kube::runtime::watcher::{Config as WatchConfig, watcher};
use kube::{Api, Client};
use model::{ResourceKind, ResourcePath};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use session::{SessionReport, WorkerSet, spawn_forward_worker};
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{self, Stdout};
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{Duration, MissedTickBehavior, interval, timeout};
use tracing::{debug, info, warn};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use transport::{ForwardTransport, KubectlForwarder};
use view::TableUpdate;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;
const TABLE_REFRESH_TIMEOUT: Duration = Duration::from_secs(4);
const SHUTDOWN_GRACE: Duration = Duration::from_secs(2);

struct Runtime {
    gateway: KubeGateway,
    transport: Arc<dyn ForwardTransport>,
    workers: WorkerSet,
    ui_tx: mpsc::UnboundedSender<UiEvent>,
    ui_rx: mpsc::UnboundedReceiver<UiEvent>,
    session_tx: mpsc::UnboundedSender<SessionReport>,
    session_rx: mpsc::UnboundedReceiver<SessionReport>,
    refreshing: HashMap<(ResourceKind, ResourcePath), AbortHandle>,
    config: RuntimeConfigWatcher,
}

impl Runtime {
    fn new(gateway: KubeGateway, config: RuntimeConfigWatcher) -> Self {
        let (ui_tx, ui_rx) = mpsc::unbounded_channel();
        let (session_tx, session_rx) = mpsc::unbounded_channel();
        Self {
            gateway,
            transport: Arc::new(KubectlForwarder::default()),
            workers: WorkerSet::default(),
            ui_tx,
            ui_rx,
            session_tx,
            session_rx,
            refreshing: HashMap::new(),
            config,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(&args.log_filter, args.log_file.as_deref())?;

    let mut config = RuntimeConfigWatcher::discover(args.config.clone());
    let (settings, config_error) = match config.load_current() {
        Ok(settings) => (settings, None),
        Err(error) => (Settings::default(), Some(error)),
    };

    let gateway = KubeGateway::new().await?;
    let namespace = resolve_namespace(&args, &gateway);
    info!(
        "starting against context {} in {}",
        gateway.context(),
        namespace.as_deref().unwrap_or("all namespaces")
    );

    let mut app = App::new(
        gateway.cluster().to_string(),
        gateway.context().to_string(),
        namespace,
        settings,
    );
    if let Some(error) = config_error {
        app.set_flash(Flash::warn(format!(
            "Using default settings: {}",
            compact_error(&error)
        )));
    }

    let mut runtime = Runtime::new(gateway, config);
    run(&mut app, &mut runtime, args.refresh_ms.max(500)).await
}

fn init_tracing(level_filter: &str, log_file: Option<&Path>) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact();

    // stdout belongs to the terminal UI
    let _ = match log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("failed to open log file {}", path.display()))?;
            builder
                .with_ansi(false)
                .with_writer(Mutex::new(file))
                .try_init()
        }
        None => builder.with_writer(std::io::sink).try_init(),
    };

    Ok(())
}

fn resolve_namespace(args: &CliArgs, gateway: &KubeGateway) -> Option<String> {
    if args.all_namespaces {
        None
    } else if let Some(namespace) = &args.namespace {
        Some(namespace.clone())
    } else {
        Some(gateway.default_namespace().to_string())
    }
}

async fn run(app: &mut App, runtime: &mut Runtime, refresh_ms: u64) -> Result<()> {
    let (mut terminal, keyboard_enhanced) = init_terminal()?;
    let run_result = run_loop(&mut terminal, app, runtime, refresh_ms).await;
    let restore_result = restore_terminal(&mut terminal, keyboard_enhanced);

    app.shutdown();
    debug!("waiting for {} workers", runtime.workers.len());
    runtime
        .workers
        .shutdown(app.root_token(), SHUTDOWN_GRACE)
        .await;

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal() -> Result<(TuiTerminal, bool)> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    let keyboard_enhanced = matches!(supports_keyboard_enhancement(), Ok(true));
    if keyboard_enhanced {
        execute!(
            stdout,
            EnterAlternateScreen,
            PushKeyboardEnhancementFlags(
                KeyboardEnhancementFlags::DISAMBIGUATE_ESCAPE_CODES
                    | KeyboardEnhancementFlags::REPORT_ALL_KEYS_AS_ESCAPE_CODES
                    | KeyboardEnhancementFlags::REPORT_ALTERNATE_KEYS
                    | KeyboardEnhancementFlags::REPORT_EVENT_TYPES
            )
        )
        .context("failed to enter alternate screen with keyboard enhancement")?;
    } else {
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok((terminal, keyboard_enhanced))
}

fn restore_terminal(terminal: &mut TuiTerminal, keyboard_enhanced: bool) -> Result<()> {
    if keyboard_enhanced {
        execute!(terminal.backend_mut(), PopKeyboardEnhancementFlags)
            .context("failed to pop keyboard enhancement flags")?;
    }
    disable_raw_mode().context("failed to disable raw mode")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(
    terminal: &mut TuiTerminal,
    app: &mut App,
    runtime: &mut Runtime,
    refresh_ms: u64,
) -> Result<()> {
    if let Ok((_, rows)) = crossterm::terminal::size() {
        app.set_screen_rows(rows);
    }
    refresh_active(app, runtime);

    let mut reader = EventStream::new();
    let mut ticker = interval(Duration::from_millis(refresh_ms));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let (watch_tx, mut watch_rx) = mpsc::unbounded_channel::<ResourceKind>();
    let watch_tasks = start_resource_watchers(runtime.gateway.client(), watch_tx);
    let mut watch_throttle = HashMap::<ResourceKind, Instant>::new();

    let result = loop {
        if let Err(error) = terminal
            .draw(|frame| ui::render(frame, app))
            .context("failed to render terminal frame")
        {
            break Err(error);
        }

        if !app.running() {
            break Ok(());
        }

        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        let command = app.handle_key(key);
                        if let Err(error) = terminal
                            .draw(|frame| ui::render(frame, app))
                            .context("failed to render terminal frame")
                        {
                            break Err(error);
                        }
                        let executed = execute_app_command(terminal, app, runtime, command).await;
                        if let Err(error) = executed {
                            break Err(error);
                        }
                    }
                    Some(Ok(Event::Resize(_, rows))) => app.set_screen_rows(rows),
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        app.set_flash(Flash::error(format!("terminal event error: {error}")));
                    }
                    None => {
                        warn!("terminal event stream closed");
                        break Ok(());
                    }
                }
            }
            _ = ticker.tick() => {
                app.on_tick(Instant::now());
                reload_settings(app, &mut runtime.config);
                refresh_active(app, runtime);
            }
            maybe_kind = watch_rx.recv() => {
                if let Some(kind) = maybe_kind
                    && watch_affects_active(app, kind)
                    && should_process_watch_event(kind, &mut watch_throttle)
                {
                    refresh_active(app, runtime);
                }
            }
            Some(event) = runtime.ui_rx.recv() => app.enqueue(event),
            Some(report) = runtime.session_rx.recv() => app.enqueue(UiEvent::Session(report)),
        }
    };

    for task in watch_tasks {
        task.abort();
    }
    result
}

async fn execute_app_command(
    terminal: &mut TuiTerminal,
    app: &mut App,
    runtime: &mut Runtime,
    command: AppCommand,
) -> Result<()> {
    match command {
        AppCommand::None => {}
        AppCommand::Refresh => refresh_active(app, runtime),
        AppCommand::StreamLogs {
            stream,
            target,
            tail_lines,
            cancel,
        } => {
            debug!(
                "streaming logs {}/{}:{} as stream {stream}",
                target.namespace, target.pod, target.container
            );
            let handle = runtime.gateway.spawn_log_stream(
                stream,
                target,
                tail_lines,
                cancel,
                runtime.ui_tx.clone(),
            );
            runtime.workers.track(handle);
        }
        AppCommand::StartForward { fqn, cancel } => {
            info!("starting port-forward {fqn}");
            let handle = spawn_forward_worker(
                runtime.transport.clone(),
                fqn,
                cancel,
                runtime.session_tx.clone(),
            );
            runtime.workers.track(handle);
        }
        AppCommand::DecodeSecret { path, cancel } => {
            debug!("decoding secret {path}");
            let handle = spawn_secret_decode(
                runtime.gateway.clone(),
                path,
                cancel,
                runtime.ui_tx.clone(),
            );
            runtime.workers.track(handle);
        }
        AppCommand::OpenShell { argv, label } => {
            open_shell(terminal, app, runtime, &argv, &label).await?;
        }
    }

    Ok(())
}

/// Hands the terminal to an interactive shell. Worker reports keep arriving
/// meanwhile and are queued by the suspended app.
async fn open_shell(
    terminal: &mut TuiTerminal,
    app: &mut App,
    runtime: &mut Runtime,
    argv: &[String],
    label: &str,
) -> Result<()> {
    info!("opening shell in {label}");
    app.suspend();
    if let Err(error) = suspend_terminal_for_subprocess(terminal) {
        app.resume();
        app.set_flash(Flash::error(compact_error(&error)));
        return Ok(());
    }

    let shell = transport::run_interactive(argv);
    tokio::pin!(shell);
    let result = loop {
        tokio::select! {
            result = &mut shell => break result,
            Some(event) = runtime.ui_rx.recv() => app.enqueue(event),
            Some(report) = runtime.session_rx.recv() => app.enqueue(UiEvent::Session(report)),
        }
    };

    resume_terminal_after_subprocess(terminal)?;
    app.resume();
    match result {
        Ok(()) => app.set_flash(Flash::info(format!("Shell in {label} closed"))),
        Err(error) => app.set_flash(Flash::error(format!(
            "Shell in {label} failed: {}",
            compact_error(&error)
        ))),
    }
    refresh_active(app, runtime);
    Ok(())
}

fn refresh_active(app: &mut App, runtime: &mut Runtime) {
    let Some((kind, path, cancel)) = app.refresh_target() else {
        return;
    };
    if kind == ResourceKind::PortForwards {
        app.refresh_port_forward_views();
        return;
    }

    runtime.refreshing.retain(|_, handle| !handle.is_finished());
    let key = (kind, path);
    if runtime.refreshing.contains_key(&key) {
        debug!("refresh of {} {} still running", kind.short_token(), key.1);
        return;
    }

    let handle = spawn_table_refresh(
        runtime.gateway.clone(),
        kind,
        key.1.clone(),
        cancel,
        runtime.ui_tx.clone(),
    );
    runtime.refreshing.insert(key, handle.abort_handle());
    runtime.workers.track(handle);
}

fn spawn_table_refresh(
    gateway: KubeGateway,
    kind: ResourceKind,
    path: ResourcePath,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<UiEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let update = tokio::select! {
            _ = cancel.cancelled() => return,
            update = load_table(&gateway, kind, &path) => update,
        };
        let _ = tx.send(UiEvent::Table { kind, path, update });
    })
}

async fn load_table(
    gateway: &KubeGateway,
    kind: ResourceKind,
    path: &ResourcePath,
) -> TableUpdate {
    match timeout(TABLE_REFRESH_TIMEOUT, gateway.fetch_table(kind, path)).await {
        Ok(Ok((headers, rows))) => TableUpdate::Rows {
            headers,
            rows,
            refreshed_at: Local::now(),
        },
        Ok(Err(error)) => {
            warn!("failed to refresh {} {path}: {error:#}", kind.short_token());
            TableUpdate::Failed {
                message: compact_error(&error),
                refreshed_at: Local::now(),
            }
        }
        Err(_) => TableUpdate::Failed {
            message: format!(
                "Timed out loading {} after {}s",
                kind.title(),
                TABLE_REFRESH_TIMEOUT.as_secs()
            ),
            refreshed_at: Local::now(),
        },
    }
}

fn spawn_secret_decode(
    gateway: KubeGateway,
    path: ResourcePath,
    cancel: CancellationToken,
    tx: mpsc::UnboundedSender<UiEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = tokio::select! {
            _ = cancel.cancelled() => return,
            outcome = timeout(TABLE_REFRESH_TIMEOUT, gateway.decode_secret(&path)) => outcome,
        };
        let result = match outcome {
            Ok(Ok(text)) => Ok(text),
            Ok(Err(error)) => Err(compact_error(&error)),
            Err(_) => Err(format!("Timed out decoding secret {path}")),
        };
        let _ = tx.send(UiEvent::Decoded { path, result });
    })
}

fn reload_settings(app: &mut App, config: &mut RuntimeConfigWatcher) {
    match config.reload_if_changed() {
        Ok(Some(settings)) => {
            let source = settings
                .source
                .clone()
                .unwrap_or_else(|| "defaults".to_string());
            info!("settings reloaded from {source}");
            app.apply_settings(settings);
            app.set_flash(Flash::info(format!("Settings reloaded from {source}")));
        }
        Ok(None) => {}
        Err(error) => app.set_flash(Flash::warn(format!(
            "Settings reload failed: {}",
            compact_error(&error)
        ))),
    }
}

fn suspend_terminal_for_subprocess(terminal: &mut TuiTerminal) -> Result<()> {
    disable_raw_mode().context("failed to disable raw mode for subprocess")?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)
        .context("failed to leave alternate screen for subprocess")?;
    terminal
        .show_cursor()
        .context("failed to show cursor for subprocess")?;
    Ok(())
}

fn resume_terminal_after_subprocess(terminal: &mut TuiTerminal) -> Result<()> {
    enable_raw_mode().context("failed to re-enable raw mode after subprocess")?;
    execute!(terminal.backend_mut(), EnterAlternateScreen)
        .context("failed to re-enter alternate screen after subprocess")?;
    terminal
        .clear()
        .context("failed to clear terminal after subprocess")?;
    Ok(())
}

fn watch_affects_active(app: &App, kind: ResourceKind) -> bool {
    match app.active_resource() {
        Some((active, _)) => {
            active == kind || (kind == ResourceKind::Pods && active == ResourceKind::Containers)
        }
        None => false,
    }
}

fn should_process_watch_event(
    kind: ResourceKind,
    throttle: &mut HashMap<ResourceKind, Instant>,
) -> bool {
    let now = Instant::now();
    let min_interval = Duration::from_millis(350);
    let Some(last) = throttle.get(&kind) else {
        throttle.insert(kind, now);
        return true;
    };

    if now.duration_since(*last) >= min_interval {
        throttle.insert(kind, now);
        true
    } else {
        false
    }
}

fn start_resource_watchers(
    client: Client,
    tx: mpsc::UnboundedSender<ResourceKind>,
) -> Vec<JoinHandle<()>> {
    vec![
        spawn_watch_task::<Pod>(client.clone(), ResourceKind::Pods, tx.clone()),
        spawn_watch_task::<Service>(client.clone(), ResourceKind::Services, tx.clone()),
        spawn_watch_task::<Deployment>(client.clone(), ResourceKind::Deployments, tx.clone()),
        spawn_watch_task::<ConfigMap>(client.clone(), ResourceKind::ConfigMaps, tx.clone()),
        spawn_watch_task::<Secret>(client.clone(), ResourceKind::Secrets, tx.clone()),
        spawn_watch_task::<Namespace>(client, ResourceKind::Namespaces, tx),
    ]
}

fn spawn_watch_task<K>(
    client: Client,
    kind: ResourceKind,
    tx: mpsc::UnboundedSender<ResourceKind>,
) -> JoinHandle<()>
where
    K: Clone + std::fmt::Debug + serde::de::DeserializeOwned + kube::Resource + Send + 'static,
    <K as kube::Resource>::DynamicType: Default + Eq + std::hash::Hash + Clone + Send,
{
    tokio::spawn(async move {
        loop {
            let api: Api<K> = Api::all(client.clone());
            let mut events = watcher(api, WatchConfig::default()).boxed();
            loop {
                match events.try_next().await {
                    Ok(Some(_)) => {
                        if tx.send(kind).is_err() {
                            return;
                        }
                    }
                    Ok(None) => break,
                    Err(error) => {
                        warn!("watch stream error for {}: {error}", kind.short_token());
                        break;
                    }
                }
            }
            tokio::time::sleep(Duration::from_millis(900)).await;
        }
    })
}

fn compact_error(error: &anyhow::Error) -> String {
    let mut out = Vec::new();
    for (index, cause) in error.chain().enumerate() {
        if index == 0 {
            out.push(cause.to_string());
        } else if index <= 2 {
            out.push(format!("caused by: {cause}"));
        } else {
            break;
        }
    }

    out.join("\n")
}

#[cfg(test)]
mod tests {
    use super::{compact_error, should_process_watch_event};
    use crate::model::ResourceKind;
    use std::collections::HashMap;

    #[test]
    fn watch_events_are_throttled_per_kind() {
        let mut throttle = HashMap::new();
        assert!(should_process_watch_event(ResourceKind::Pods, &mut throttle));
        assert!(!should_process_watch_event(ResourceKind::Pods, &mut throttle));
        assert!(should_process_watch_event(ResourceKind::Secrets, &mut throttle));
    }

    #[test]
    fn compact_error_keeps_two_causes() {
        let error = anyhow::anyhow!("root")
            .context("middle")
            .context("outer")
            .context("top");
        assert_eq!(
            compact_error(&error),
            "top\ncaused by: outer\ncaused by: middle"
        );
    }
}
