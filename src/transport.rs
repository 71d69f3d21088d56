use anyhow::{Context, Result};
use futures::FutureExt;
use futures::future::BoxFuture;
use std::process::{ExitStatus, Stdio};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command as TokioCommand};
use tokio::time::{Duration, timeout};
use tracing::debug;

use crate::session::Fqn;

const ESTABLISH_TIMEOUT: Duration = Duration::from_secs(15);

/// Opens port-forward tunnels. Implementations must not touch dashboard
/// state; they run inside session workers.
pub trait ForwardTransport: Send + Sync {
    fn open(&self, fqn: &Fqn) -> BoxFuture<'static, Result<Box<dyn Tunnel>>>;
}

pub trait Tunnel: Send {
    fn forward_ports(&mut self) -> BoxFuture<'_, Result<()>>;

    fn close(&mut self) -> BoxFuture<'_, Result<()>>;
}

#[derive(Debug, Clone)]
pub struct KubectlForwarder {
    command: Vec<String>,
    establish_timeout: Duration,
}

impl Default for KubectlForwarder {
    fn default() -> Self {
        Self {
            command: vec!["kubectl".to_string()],
            establish_timeout: ESTABLISH_TIMEOUT,
        }
    }
}

struct KubectlTunnel {
    child: Child,
    stdout: Lines<BufReader<ChildStdout>>,
}

impl ForwardTransport for KubectlForwarder {
    fn open(&self, fqn: &Fqn) -> BoxFuture<'static, Result<Box<dyn Tunnel>>> {
        let fqn = fqn.clone();
        let command = self.command.clone();
        let establish_timeout = self.establish_timeout;
        async move {
            let Some((program, leading)) = command.split_first() else {
                anyhow::bail!("port-forward command is empty");
            };
            let namespace = fqn
                .path()
                .namespace_name()
                .context("port-forward target has no namespace")?
                .to_string();
            let pod = fqn
                .path()
                .object_name()
                .context("port-forward target has no pod")?
                .to_string();

            let mut child = TokioCommand::new(program)
                .args(leading)
                .arg("port-forward")
                .arg("-n")
                .arg(&namespace)
                .arg(format!("pod/{pod}"))
                .arg(fqn.port_pair())
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .spawn()
                .with_context(|| format!("failed to spawn port-forward for {namespace}/{pod}"))?;

            let stdout = child
                .stdout
                .take()
                .context("kubectl port-forward stdout unavailable")?;
            let mut stdout = BufReader::new(stdout).lines();

            let established = timeout(establish_timeout, async {
                while let Some(line) = stdout.next_line().await? {
                    debug!("port-forward {fqn}: {line}");
                    if line.starts_with("Forwarding from") {
                        return Ok(true);
                    }
                }
                Ok::<bool, std::io::Error>(false)
            })
            .await;

            match established {
                Ok(Ok(true)) => Ok(Box::new(KubectlTunnel { child, stdout }) as Box<dyn Tunnel>),
                Ok(Ok(false)) => {
                    let status = child.wait().await.ok();
                    let stderr = drain_stderr(&mut child).await;
                    Err(anyhow::anyhow!(
                        "kubectl port-forward exited{}: {}",
                        status.map(|status| format!(" ({status})")).unwrap_or_default(),
                        first_line_or(&stderr, "no output")
                    ))
                }
                Ok(Err(error)) => {
                    let _ = child.kill().await;
                    Err(error).context("failed reading kubectl port-forward output")
                }
                Err(_) => {
                    let _ = child.kill().await;
                    anyhow::bail!("timed out establishing port-forward {fqn}")
                }
            }
        }
        .boxed()
    }
}

impl Tunnel for KubectlTunnel {
    fn forward_ports(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            loop {
                tokio::select! {
                    line = self.stdout.next_line() => match line {
                        Ok(Some(line)) => debug!("port-forward: {line}"),
                        Ok(None) | Err(_) => break,
                    },
                    status = self.child.wait() => {
                        let status = status.context("failed waiting for kubectl port-forward")?;
                        return self.exit_result(status).await;
                    }
                }
            }

            let status = self
                .child
                .wait()
                .await
                .context("failed waiting for kubectl port-forward")?;
            self.exit_result(status).await
        }
        .boxed()
    }

    fn close(&mut self) -> BoxFuture<'_, Result<()>> {
        async move {
            self.child
                .kill()
                .await
                .context("failed to stop kubectl port-forward")
        }
        .boxed()
    }
}

impl KubectlTunnel {
    async fn exit_result(&mut self, status: ExitStatus) -> Result<()> {
        if status.success() {
            return Ok(());
        }
        let stderr = drain_stderr(&mut self.child).await;
        Err(anyhow::anyhow!(
            "kubectl port-forward exited with {status}: {}",
            first_line_or(&stderr, "connection lost")
        ))
    }
}

async fn drain_stderr(child: &mut Child) -> String {
    let mut output = String::new();
    if let Some(mut stderr) = child.stderr.take() {
        let _ = stderr.read_to_string(&mut output).await;
    }
    output
}

fn first_line_or(text: &str, fallback: &str) -> String {
    text.lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.trim().to_string())
        .unwrap_or_else(|| fallback.to_string())
}

pub async fn run_interactive(argv: &[String]) -> Result<()> {
    let Some((program, args)) = argv.split_first() else {
        anyhow::bail!("shell command is empty");
    };

    let status = TokioCommand::new(program)
        .args(args)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await
        .with_context(|| format!("failed to run {program}"))?;

    if status.success() {
        Ok(())
    } else {
        Err(anyhow::anyhow!("{program} exited with {status}"))
    }
}
