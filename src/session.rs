use anyhow::anyhow;
use chrono::{DateTime, Local};
use futures::FutureExt;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt::{Display, Formatter};
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio::time::{Duration, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::model::ResourcePath;
use crate::transport::ForwardTransport;

#[derive(Debug, Clone, Eq, PartialEq, Hash, PartialOrd, Ord)]
pub struct Fqn {
    path: ResourcePath,
    container: String,
    local_port: String,
    remote_port: String,
}

impl Fqn {
    pub fn new(
        path: ResourcePath,
        container: impl Into<String>,
        local_port: impl Into<String>,
        remote_port: impl Into<String>,
    ) -> Self {
        Self {
            path,
            container: container.into(),
            local_port: local_port.into(),
            remote_port: remote_port.into(),
        }
    }

    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    pub fn container(&self) -> &str {
        &self.container
    }

    pub fn port_pair(&self) -> String {
        format!("{}:{}", self.local_port, self.remote_port)
    }
}

impl Display for Fqn {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}|{}", self.path, self.container, self.port_pair())
    }
}

#[derive(Debug, Clone)]
pub struct PortForwardSession {
    pub fqn: Fqn,
    pub active: bool,
    pub started_at: DateTime<Local>,
}

impl PortForwardSession {
    pub fn age(&self, now: DateTime<Local>) -> chrono::Duration {
        now.signed_duration_since(self.started_at)
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum SessionState {
    Requested,
    Active,
    Terminated,
}

#[derive(Debug, Clone, Error, Eq, PartialEq)]
pub enum SessionError {
    #[error("A port-forward is already active on {0}")]
    AlreadyExists(Fqn),
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct SessionReport {
    pub fqn: Fqn,
    pub event: SessionEvent,
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SessionEvent {
    Established,
    Terminated { error: Option<String> },
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum SessionChange {
    Activated(Fqn),
    Closed { fqn: Fqn, error: Option<String> },
    FailedToEstablish { fqn: Fqn, error: Option<String> },
    Ignored,
}

/// Active port-forward sessions keyed by FQN. Requests that have not yet
/// established are held as reservations so a second request for the same
/// FQN is rejected before a tunnel is opened.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    sessions: BTreeMap<Fqn, PortForwardSession>,
    pending: BTreeSet<Fqn>,
}

impl SessionRegistry {
    pub fn request(&mut self, fqn: &Fqn) -> Result<(), SessionError> {
        if self.sessions.contains_key(fqn) || self.pending.contains(fqn) {
            return Err(SessionError::AlreadyExists(fqn.clone()));
        }
        self.pending.insert(fqn.clone());
        Ok(())
    }

    pub fn apply(&mut self, report: &SessionReport, now: DateTime<Local>) -> SessionChange {
        let fqn = &report.fqn;
        match &report.event {
            SessionEvent::Established => {
                if !self.pending.remove(fqn) || self.sessions.contains_key(fqn) {
                    return SessionChange::Ignored;
                }
                self.sessions.insert(
                    fqn.clone(),
                    PortForwardSession {
                        fqn: fqn.clone(),
                        active: true,
                        started_at: now,
                    },
                );
                SessionChange::Activated(fqn.clone())
            }
            SessionEvent::Terminated { error } => {
                if self.sessions.remove(fqn).is_some() {
                    SessionChange::Closed {
                        fqn: fqn.clone(),
                        error: error.clone(),
                    }
                } else if self.pending.remove(fqn) {
                    SessionChange::FailedToEstablish {
                        fqn: fqn.clone(),
                        error: error.clone(),
                    }
                } else {
                    SessionChange::Ignored
                }
            }
        }
    }

    pub fn state(&self, fqn: &Fqn) -> SessionState {
        if self.sessions.contains_key(fqn) {
            SessionState::Active
        } else if self.pending.contains(fqn) {
            SessionState::Requested
        } else {
            SessionState::Terminated
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PortForwardSession> {
        self.sessions.values()
    }

    pub fn targets(&self, path: &ResourcePath) -> bool {
        self.sessions.keys().any(|fqn| fqn.path() == path)
    }
}

/// Runs one port-forward session off the render loop. Always reports
/// `Terminated` last, even when the tunnel panics.
pub fn spawn_forward_worker(
    transport: Arc<dyn ForwardTransport>,
    fqn: Fqn,
    cancel: CancellationToken,
    reports: UnboundedSender<SessionReport>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let outcome = AssertUnwindSafe(run_forward(
            transport.as_ref(),
            &fqn,
            &cancel,
            &reports,
        ))
        .catch_unwind()
        .await;

        let error = match outcome {
            Ok(Ok(())) => None,
            Ok(Err(error)) => Some(format!("{error:#}")),
            Err(_) => Some(format!("port-forward worker for {fqn} panicked")),
        };
        match &error {
            Some(error) => warn!("port-forward {fqn} ended: {error}"),
            None => info!("port-forward {fqn} closed"),
        }

        let _ = reports.send(SessionReport {
            fqn,
            event: SessionEvent::Terminated { error },
        });
    })
}

async fn run_forward(
    transport: &dyn ForwardTransport,
    fqn: &Fqn,
    cancel: &CancellationToken,
    reports: &UnboundedSender<SessionReport>,
) -> anyhow::Result<()> {
    let mut tunnel = tokio::select! {
        _ = cancel.cancelled() => return Ok(()),
        tunnel = transport.open(fqn) => tunnel?,
    };

    info!("port-forward {fqn} established");
    reports
        .send(SessionReport {
            fqn: fqn.clone(),
            event: SessionEvent::Established,
        })
        .map_err(|_| anyhow!("dashboard stopped listening for session reports"))?;

    let cancelled = tokio::select! {
        _ = cancel.cancelled() => true,
        result = tunnel.forward_ports() => {
            result?;
            false
        }
    };
    if cancelled {
        debug!("port-forward {fqn} stop requested");
        tunnel.close().await?;
    }
    Ok(())
}

#[derive(Debug, Default)]
pub struct WorkerSet {
    handles: Vec<JoinHandle<()>>,
}

impl WorkerSet {
    pub fn track(&mut self, handle: JoinHandle<()>) {
        self.handles.retain(|handle| !handle.is_finished());
        self.handles.push(handle);
    }

    pub fn len(&self) -> usize {
        self.handles.iter().filter(|handle| !handle.is_finished()).count()
    }

    pub async fn shutdown(&mut self, root: &CancellationToken, grace: Duration) {
        root.cancel();
        for mut handle in self.handles.drain(..) {
            if timeout(grace, &mut handle).await.is_err() {
                warn!("worker did not stop within {grace:?}, aborting");
                handle.abort();
            }
        }
    }
}
