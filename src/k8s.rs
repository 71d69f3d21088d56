use anyhow::{Context, Result};
use futures::{AsyncBufReadExt, TryStreamExt};
use k8s_openapi::api::apps::v1::Deployment;
use k8s_openapi::api::core::v1::{
    ConfigMap, ContainerPort, ContainerStatus, Namespace, Pod, Secret, Service,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{ListParams, LogParams};
use kube::config::{KubeConfigOptions, Kubeconfig};
use kube::{Api, Client, Config, ResourceExt};
use serde::Serialize;
use std::collections::BTreeMap;
use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::app::{LogEvent, UiEvent};
use crate::model::{ResourceKind, ResourcePath, RowData, format_elapsed_seconds};
use crate::view::LogTarget;

pub type TableRows = (Vec<String>, Vec<RowData>);

#[derive(Clone)]
pub struct KubeGateway {
    client: Client,
    context: String,
    cluster: String,
    default_namespace: String,
}

impl KubeGateway {
    pub async fn new() -> Result<Self> {
        let kubeconfig = Kubeconfig::read().ok();

        let config = if let Some(kubeconfig_value) = kubeconfig.clone() {
            Config::from_custom_kubeconfig(kubeconfig_value, &KubeConfigOptions::default())
                .await
                .context("failed to infer Kubernetes configuration")?
        } else {
            Config::infer()
                .await
                .context("failed to infer Kubernetes configuration")?
        };

        let cluster = config.cluster_url.to_string();
        let default_namespace = config.default_namespace.clone();
        let client = Client::try_from(config).context("failed to initialize Kubernetes client")?;
        let context = kubeconfig
            .as_ref()
            .and_then(|cfg| cfg.current_context.clone())
            .unwrap_or_else(|| "in-cluster".to_string());

        Ok(Self {
            client,
            context,
            cluster,
            default_namespace,
        })
    }

    pub fn cluster(&self) -> &str {
        &self.cluster
    }

    pub fn context(&self) -> &str {
        &self.context
    }

    pub fn default_namespace(&self) -> &str {
        &self.default_namespace
    }

    pub fn client(&self) -> Client {
        self.client.clone()
    }

    /// Lists `kind` under `path` with the column layout agreed in
    /// [`ResourceKind`]. Port-forwards are local state and never fetched.
    pub async fn fetch_table(&self, kind: ResourceKind, path: &ResourcePath) -> Result<TableRows> {
        let (headers, mut rows) = match kind {
            ResourceKind::Namespaces => self.fetch_namespaces().await?,
            ResourceKind::Pods => self.fetch_pods(path).await?,
            ResourceKind::Containers => self.fetch_containers(path).await?,
            ResourceKind::Services => self.fetch_services(path).await?,
            ResourceKind::Deployments => self.fetch_deployments(path).await?,
            ResourceKind::ConfigMaps => self.fetch_configmaps(path).await?,
            ResourceKind::Secrets => self.fetch_secrets(path).await?,
            ResourceKind::PortForwards => {
                anyhow::bail!("port-forwards are tracked locally")
            }
        };

        if kind != ResourceKind::Containers {
            rows.sort_by(|left, right| {
                left.namespace
                    .cmp(&right.namespace)
                    .then_with(|| left.name.cmp(&right.name))
            });
        }
        Ok((headers, rows))
    }

    fn scoped_api<K>(&self, path: &ResourcePath) -> Api<K>
    where
        K: kube::Resource<Scope = k8s_openapi::NamespaceResourceScope>,
        <K as kube::Resource>::DynamicType: Default,
    {
        match path.namespace_name() {
            Some(namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }

    async fn fetch_namespaces(&self) -> Result<TableRows> {
        let namespaces: Api<Namespace> = Api::all(self.client.clone());
        let list = namespaces.list(&list_params()).await?;
        let rows = list
            .into_iter()
            .map(|namespace| {
                let name = namespace.name_any();
                let phase = namespace
                    .status
                    .as_ref()
                    .and_then(|status| status.phase.clone())
                    .unwrap_or_else(|| "Active".to_string());
                let age = human_age(namespace.metadata.creation_timestamp.as_ref());

                RowData {
                    name: name.clone(),
                    namespace: Some(name.clone()),
                    columns: vec![name, phase, age],
                    detail: yaml_detail(&namespace),
                    default_container: None,
                }
            })
            .collect::<Vec<_>>();

        Ok((headers(&["Name", "Status", "Age"]), rows))
    }

    async fn fetch_pods(&self, path: &ResourcePath) -> Result<TableRows> {
        let pods: Api<Pod> = self.scoped_api(path);
        let list = pods.list(&list_params()).await?;
        let rows = list
            .into_iter()
            .map(|pod| {
                let name = pod.name_any();
                let namespace = pod.namespace();
                let status = pod_status(&pod);
                let node = pod
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.node_name.clone())
                    .unwrap_or_else(|| "-".to_string());
                let (ready, total, restarts) =
                    pod.status.as_ref().map(pod_readiness).unwrap_or((0, 0, 0));
                let ports = pod
                    .spec
                    .as_ref()
                    .map(|spec| {
                        ports_summary(
                            spec.containers
                                .iter()
                                .flat_map(|container| container.ports.iter().flatten()),
                        )
                    })
                    .unwrap_or_else(|| "-".to_string());
                let age = human_age(pod.metadata.creation_timestamp.as_ref());

                RowData {
                    name: name.clone(),
                    namespace: namespace.clone(),
                    columns: vec![
                        name,
                        namespace.unwrap_or_else(|| "-".to_string()),
                        format!("{ready}/{total}"),
                        status,
                        restarts.to_string(),
                        ports,
                        node,
                        age,
                    ],
                    detail: yaml_detail(&pod),
                    default_container: first_pod_container(&pod),
                }
            })
            .collect::<Vec<_>>();

        Ok((
            headers(&[
                "Name", "Namespace", "Ready", "Status", "Restarts", "Ports", "Node", "Age",
            ]),
            rows,
        ))
    }

    async fn fetch_containers(&self, path: &ResourcePath) -> Result<TableRows> {
        let (Some(namespace), Some(pod_name)) = (path.namespace_name(), path.object_name()) else {
            anyhow::bail!("containers need a namespace/pod path, got {path}");
        };
        let pods: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let pod = pods
            .get(pod_name)
            .await
            .with_context(|| format!("failed to fetch pod {namespace}/{pod_name}"))?;
        let pod_age = human_age(pod.metadata.creation_timestamp.as_ref());

        let statuses = pod
            .status
            .as_ref()
            .map(|status| {
                status
                    .container_statuses
                    .iter()
                    .flatten()
                    .chain(status.init_container_statuses.iter().flatten())
                    .map(|container| (container.name.clone(), container.clone()))
                    .collect::<BTreeMap<_, _>>()
            })
            .unwrap_or_default();

        let mut rows = Vec::new();
        if let Some(spec) = pod.spec.as_ref() {
            let containers = spec.containers.iter().map(|container| (container, false));
            let init_containers = spec
                .init_containers
                .iter()
                .flatten()
                .map(|container| (container, true));
            for (container, init) in containers.chain(init_containers) {
                let status = statuses.get(&container.name);
                let (state, age) = status
                    .map(|status| container_state_and_age(status, &pod_age))
                    .unwrap_or_else(|| ("Unknown".to_string(), pod_age.clone()));
                let ready = status.map(|status| status.ready).unwrap_or(false);
                let restarts = status.map(|status| status.restart_count).unwrap_or(0);
                let image = container.image.clone().unwrap_or_else(|| "-".to_string());

                rows.push(RowData {
                    name: container.name.clone(),
                    namespace: Some(namespace.to_string()),
                    columns: vec![
                        container.name.clone(),
                        truncate(&image, 48),
                        ready.to_string(),
                        state,
                        init.to_string(),
                        restarts.to_string(),
                        ports_summary(container.ports.iter().flatten()),
                        age,
                    ],
                    detail: yaml_detail(container),
                    default_container: None,
                });
            }
        }

        Ok((
            headers(&[
                "Name", "Image", "Ready", "State", "Init", "Restarts", "Ports", "Age",
            ]),
            rows,
        ))
    }

    async fn fetch_services(&self, path: &ResourcePath) -> Result<TableRows> {
        let services: Api<Service> = self.scoped_api(path);
        let list = services.list(&list_params()).await?;
        let rows = list
            .into_iter()
            .map(|service| {
                let name = service.name_any();
                let namespace = service.namespace();
                let service_type = service
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.type_.clone())
                    .unwrap_or_else(|| "ClusterIP".to_string());
                let age = human_age(service.metadata.creation_timestamp.as_ref());

                RowData {
                    name: name.clone(),
                    namespace: namespace.clone(),
                    columns: vec![
                        name,
                        namespace.unwrap_or_else(|| "-".to_string()),
                        service_type,
                        service_ports_summary(&service),
                        age,
                    ],
                    detail: yaml_detail(&service),
                    default_container: None,
                }
            })
            .collect::<Vec<_>>();

        Ok((headers(&["Name", "Namespace", "Type", "Ports", "Age"]), rows))
    }

    async fn fetch_deployments(&self, path: &ResourcePath) -> Result<TableRows> {
        let deployments: Api<Deployment> = self.scoped_api(path);
        let list = deployments.list(&list_params()).await?;
        let rows = list
            .into_iter()
            .map(|deployment| {
                let name = deployment.name_any();
                let namespace = deployment.namespace();
                let desired = deployment
                    .spec
                    .as_ref()
                    .and_then(|spec| spec.replicas)
                    .unwrap_or(1);
                let status = deployment.status.as_ref();
                let ready = status.and_then(|status| status.ready_replicas).unwrap_or(0);
                let updated = status
                    .and_then(|status| status.updated_replicas)
                    .unwrap_or(0);
                let available = status
                    .and_then(|status| status.available_replicas)
                    .unwrap_or(0);
                let age = human_age(deployment.metadata.creation_timestamp.as_ref());

                RowData {
                    name: name.clone(),
                    namespace: namespace.clone(),
                    columns: vec![
                        name,
                        namespace.unwrap_or_else(|| "-".to_string()),
                        format!("{ready}/{desired}"),
                        updated.to_string(),
                        available.to_string(),
                        age,
                    ],
                    detail: yaml_detail(&deployment),
                    default_container: None,
                }
            })
            .collect::<Vec<_>>();

        Ok((
            headers(&["Name", "Namespace", "Ready", "Updated", "Available", "Age"]),
            rows,
        ))
    }

    async fn fetch_configmaps(&self, path: &ResourcePath) -> Result<TableRows> {
        let configmaps: Api<ConfigMap> = self.scoped_api(path);
        let list = configmaps.list(&list_params()).await?;
        let rows = list
            .into_iter()
            .map(|configmap| {
                let name = configmap.name_any();
                let namespace = configmap.namespace();
                let data = configmap.data.as_ref().map(BTreeMap::len).unwrap_or(0)
                    + configmap
                        .binary_data
                        .as_ref()
                        .map(BTreeMap::len)
                        .unwrap_or(0);
                let age = human_age(configmap.metadata.creation_timestamp.as_ref());

                RowData {
                    name: name.clone(),
                    namespace: namespace.clone(),
                    columns: vec![
                        name,
                        namespace.unwrap_or_else(|| "-".to_string()),
                        data.to_string(),
                        age,
                    ],
                    detail: yaml_detail(&configmap),
                    default_container: None,
                }
            })
            .collect::<Vec<_>>();

        Ok((headers(&["Name", "Namespace", "Data", "Age"]), rows))
    }

    async fn fetch_secrets(&self, path: &ResourcePath) -> Result<TableRows> {
        let secrets: Api<Secret> = self.scoped_api(path);
        let list = secrets.list(&list_params()).await?;
        let rows = list
            .into_iter()
            .map(|secret| {
                let name = secret.name_any();
                let namespace = secret.namespace();
                let kind = secret.type_.clone().unwrap_or_else(|| "Opaque".to_string());
                let data_count = secret.data.as_ref().map(BTreeMap::len).unwrap_or(0);
                let age = human_age(secret.metadata.creation_timestamp.as_ref());

                RowData {
                    name: name.clone(),
                    namespace: namespace.clone(),
                    columns: vec![
                        name,
                        namespace.unwrap_or_else(|| "-".to_string()),
                        truncate(&kind, 20),
                        data_count.to_string(),
                        age,
                    ],
                    detail: yaml_detail(&secret),
                    default_container: None,
                }
            })
            .collect::<Vec<_>>();

        Ok((headers(&["Name", "Namespace", "Type", "Data", "Age"]), rows))
    }

    pub async fn decode_secret(&self, path: &ResourcePath) -> Result<String> {
        let (Some(namespace), Some(name)) = (path.namespace_name(), path.object_name()) else {
            anyhow::bail!("secret decode needs a namespace/name path, got {path}");
        };
        let secrets: Api<Secret> = Api::namespaced(self.client.clone(), namespace);
        let secret = secrets
            .get(name)
            .await
            .with_context(|| format!("failed to fetch secret {namespace}/{name}"))?;

        let decoded = secret
            .data
            .unwrap_or_default()
            .into_iter()
            .map(|(key, value)| {
                let text = String::from_utf8(value.0)
                    .unwrap_or_else(|error| format!("<{} binary bytes>", error.into_bytes().len()));
                (key, text)
            })
            .chain(secret.string_data.unwrap_or_default())
            .collect::<BTreeMap<_, _>>();

        serde_json::to_string_pretty(&decoded).context("failed to render decoded secret")
    }

    pub fn spawn_log_stream(
        &self,
        stream: u64,
        target: LogTarget,
        tail_lines: i64,
        cancel: CancellationToken,
        tx: UnboundedSender<UiEvent>,
    ) -> JoinHandle<()> {
        let client = self.client.clone();
        tokio::spawn(async move {
            let pods: Api<Pod> = Api::namespaced(client, &target.namespace);
            let params = LogParams {
                container: Some(target.container.clone()),
                follow: !target.previous,
                previous: target.previous,
                tail_lines: Some(tail_lines),
                timestamps: false,
                ..LogParams::default()
            };

            let result = tokio::select! {
                _ = cancel.cancelled() => Ok(()),
                result = pump_logs(&pods, &target, &params, stream, &tx) => result,
            };
            let error = result.err().map(|error| format!("{error:#}"));
            if let Some(error) = &error {
                warn!("log stream {stream} failed: {error}");
            } else {
                debug!("log stream {stream} ended");
            }
            let _ = tx.send(UiEvent::Log(LogEvent::Ended { stream, error }));
        })
    }
}

async fn pump_logs(
    pods: &Api<Pod>,
    target: &LogTarget,
    params: &LogParams,
    stream: u64,
    tx: &UnboundedSender<UiEvent>,
) -> Result<()> {
    let reader = pods.log_stream(&target.pod, params).await.with_context(|| {
        format!(
            "failed to stream logs for {}/{}:{}",
            target.namespace, target.pod, target.container
        )
    })?;
    let mut lines = std::pin::pin!(reader.lines());
    while let Some(line) = lines.try_next().await? {
        if tx
            .send(UiEvent::Log(LogEvent::Line { stream, line }))
            .is_err()
        {
            break;
        }
    }
    Ok(())
}

fn headers(names: &[&str]) -> Vec<String> {
    names.iter().map(|name| name.to_string()).collect()
}

fn first_pod_container(pod: &Pod) -> Option<String> {
    pod.spec
        .as_ref()
        .and_then(|spec| spec.containers.first())
        .map(|container| container.name.clone())
}

fn pod_status(pod: &Pod) -> String {
    if pod.metadata.deletion_timestamp.is_some() {
        return "Terminating".to_string();
    }
    match pod.status.as_ref().and_then(|status| status.phase.as_deref()) {
        Some("Succeeded") => "Completed".to_string(),
        Some(phase) => phase.to_string(),
        None => "Unknown".to_string(),
    }
}

fn container_state_and_age(container: &ContainerStatus, pod_age: &str) -> (String, String) {
    if let Some(state) = container.state.as_ref() {
        if let Some(running) = state.running.as_ref() {
            let age = running
                .started_at
                .as_ref()
                .map(|time| human_age(Some(time)))
                .unwrap_or_else(|| pod_age.to_string());
            return ("Running".to_string(), age);
        }
        if let Some(waiting) = state.waiting.as_ref() {
            let label = waiting
                .reason
                .clone()
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| "Waiting".to_string());
            return (label, pod_age.to_string());
        }
        if let Some(terminated) = state.terminated.as_ref() {
            let label = terminated
                .reason
                .clone()
                .filter(|value| !value.is_empty())
                .unwrap_or_else(|| format!("Exit({})", terminated.exit_code));
            let age = terminated
                .finished_at
                .as_ref()
                .map(|time| human_age(Some(time)))
                .unwrap_or_else(|| pod_age.to_string());
            return (label, age);
        }
    }

    ("Unknown".to_string(), pod_age.to_string())
}

fn list_params() -> ListParams {
    ListParams::default().limit(500)
}

fn ports_summary<'a>(ports: impl Iterator<Item = &'a ContainerPort>) -> String {
    let ports = ports
        .map(|port| {
            let protocol = port.protocol.as_deref().unwrap_or("TCP");
            match (&port.name, protocol.eq_ignore_ascii_case("tcp")) {
                (_, false) => format!("{}/{}", protocol.to_ascii_lowercase(), port.container_port),
                (Some(name), true) => format!("{name}:{}", port.container_port),
                (None, true) => port.container_port.to_string(),
            }
        })
        .collect::<Vec<_>>();
    if ports.is_empty() {
        "-".to_string()
    } else {
        ports.join(",")
    }
}

fn service_ports_summary(service: &Service) -> String {
    let ports = service
        .spec
        .as_ref()
        .and_then(|spec| spec.ports.clone())
        .unwrap_or_default();
    if ports.is_empty() {
        return "-".to_string();
    }

    ports
        .into_iter()
        .map(|port| {
            let protocol = port.protocol.unwrap_or_else(|| "TCP".to_string());
            format!("{}/{}", protocol.to_ascii_lowercase(), port.port)
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn pod_readiness(status: &k8s_openapi::api::core::v1::PodStatus) -> (usize, usize, i32) {
    let container_statuses = status.container_statuses.as_deref().unwrap_or(&[]);
    let total = container_statuses.len();
    let ready = container_statuses
        .iter()
        .filter(|container| container.ready)
        .count();
    let restarts = container_statuses
        .iter()
        .map(|container| container.restart_count)
        .sum();

    (ready, total, restarts)
}

fn truncate(value: &str, max: usize) -> String {
    if value.chars().count() <= max {
        return value.to_string();
    }

    let mut out = value
        .chars()
        .take(max.saturating_sub(1))
        .collect::<String>();
    out.push('…');
    out
}

fn human_age(timestamp: Option<&Time>) -> String {
    let Some(timestamp) = timestamp else {
        return "-".to_string();
    };

    let elapsed = k8s_openapi::jiff::Timestamp::now().as_second() - timestamp.0.as_second();
    format_elapsed_seconds(elapsed)
}

fn yaml_detail<T>(value: &T) -> String
where
    T: Serialize,
{
    serde_yaml::to_string(value).unwrap_or_else(|error| format!("failed to format detail: {error}"))
}

#[cfg(test)]
mod tests {
    use super::{pod_status, ports_summary, truncate};
    use crate::view::select_tcp_port;
    use k8s_openapi::api::core::v1::{ContainerPort, Pod, PodStatus};

    fn port(number: i32, name: Option<&str>, protocol: Option<&str>) -> ContainerPort {
        ContainerPort {
            container_port: number,
            name: name.map(str::to_string),
            protocol: protocol.map(str::to_string),
            ..ContainerPort::default()
        }
    }

    #[test]
    fn ports_cell_distinguishes_named_and_non_tcp_ports() {
        let ports = [
            port(53, Some("dns"), Some("UDP")),
            port(8080, Some("http"), None),
            port(9090, None, Some("TCP")),
        ];
        let cell = ports_summary(ports.iter());
        assert_eq!(cell, "udp/53,http:8080,9090");
        assert_eq!(select_tcp_port(&cell), Some("8080".to_string()));
        assert_eq!(ports_summary([].iter()), "-");
    }

    #[test]
    fn succeeded_pods_show_as_completed() {
        let pod = Pod {
            status: Some(PodStatus {
                phase: Some("Succeeded".to_string()),
                ..PodStatus::default()
            }),
            ..Pod::default()
        };
        assert_eq!(pod_status(&pod), "Completed");
        assert_eq!(pod_status(&Pod::default()), "Unknown");
    }

    #[test]
    fn truncate_marks_cut_values() {
        assert_eq!(truncate("registry.local/app:1.0", 10), "registry.…");
        assert_eq!(truncate("short", 10), "short");
    }
}
