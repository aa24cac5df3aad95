//! Workload (Pod) domain.
//!
//! Dependents: placement node, service account, referenced secrets and
//! config maps, persistent volume claims, plus container logs when requested.

pub mod checks;
pub mod extract;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    ConfigMap, Node, PersistentVolumeClaim, Pod, Secret, ServiceAccount,
};
use std::collections::BTreeMap;

use crate::cluster::{ClusterReader, FetchResult, LogRequest};
use crate::diagnostics::context::{CapturedLogs, Dependent, SubjectInfo};
use crate::diagnostics::engine::Domain;
use crate::diagnostics::gather::{DependentFetcher, capture_container_logs};
use crate::diagnostics::registry::CheckRegistry;
use crate::diagnostics::types::{ResourceKind, Target};
use extract::{ObjectRef, PodReferences};

/// Checks run when the caller selects none, in order.
pub const DEFAULT_CHECKS: &[&str] = &[
    "status",
    "scheduling",
    "images",
    "permissions",
    "init-containers",
    "resources",
    "network",
];

/// Everything fetched around a pod.
#[derive(Debug, Clone)]
pub struct PodDependents {
    pub references: PodReferences,
    /// `None` while the pod is unscheduled.
    pub node: Option<Dependent<Node>>,
    /// `None` when the pod runs as the namespace default account.
    pub service_account: Option<Dependent<ServiceAccount>>,
    pub secrets: Vec<(ObjectRef, Dependent<Secret>)>,
    pub config_maps: Vec<(ObjectRef, Dependent<ConfigMap>)>,
    pub claims: Vec<(String, Dependent<PersistentVolumeClaim>)>,
}

pub type PodInfo = SubjectInfo<PodDomain>;

#[derive(Debug, Clone, Copy, Default)]
pub struct PodDomain;

fn default_selection(subject: &PodInfo) -> Vec<&'static str> {
    let mut selection = DEFAULT_CHECKS.to_vec();
    if subject.logs_requested && extract::is_failing(&subject.primary) {
        selection.push("logs");
    }
    selection
}

/// Containers whose logs are worth capturing: every regular container plus
/// init containers that have not completed successfully.
fn log_containers(pod: &Pod) -> Vec<String> {
    let completed = |name: &str| {
        extract::init_container_statuses(pod).iter().any(|s| {
            s.name == name
                && s.state
                    .as_ref()
                    .and_then(|st| st.terminated.as_ref())
                    .is_some_and(|t| t.exit_code == 0)
        })
    };
    let started = |name: &str| {
        extract::init_container_statuses(pod).iter().any(|s| {
            s.name == name
                && (s.restart_count > 0 || s.state.as_ref().is_some_and(|st| st.waiting.is_none()))
        })
    };

    extract::init_containers(pod)
        .iter()
        .filter(|c| started(&c.name) && !completed(&c.name))
        .chain(extract::containers(pod))
        .map(|c| c.name.clone())
        .collect()
}

#[async_trait]
impl Domain for PodDomain {
    type Primary = Pod;
    type Dependents = PodDependents;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Pod
    }

    async fn fetch_primary(
        &self,
        reader: &dyn ClusterReader,
        namespace: &str,
        name: &str,
    ) -> FetchResult<Pod> {
        reader.get_pod(namespace, name).await
    }

    async fn list_primaries(
        &self,
        reader: &dyn ClusterReader,
        namespace: Option<&str>,
    ) -> FetchResult<Vec<Target>> {
        let pods = reader.list_pods(namespace, None).await?;
        Ok(pods
            .iter()
            .filter_map(|pod| {
                let name = pod.metadata.name.as_deref()?;
                let ns = pod
                    .metadata
                    .namespace
                    .as_deref()
                    .or(namespace)
                    .unwrap_or("default");
                Some(Target::new(ResourceKind::Pod, ns, name))
            })
            .collect())
    }

    async fn fetch_dependents(
        &self,
        reader: &dyn ClusterReader,
        target: &Target,
        pod: &Pod,
        fetcher: &mut DependentFetcher,
    ) -> PodDependents {
        let ns = target.namespace.as_str();
        let references = extract::references(pod);

        let node = match extract::node_name(pod) {
            Some(node) => Some(fetcher.fetch(format!("node/{}", node), reader.get_node(node)).await),
            None => None,
        };

        let service_account = match references.service_account.as_deref() {
            Some(sa) => Some(
                fetcher
                    .fetch(
                        format!("serviceaccount/{}", sa),
                        reader.get_service_account(ns, sa),
                    )
                    .await,
            ),
            None => None,
        };

        let mut secrets = Vec::with_capacity(references.secrets.len());
        for secret in &references.secrets {
            let fetched = fetcher
                .fetch(
                    format!("secret/{}", secret.name),
                    reader.get_secret(ns, &secret.name),
                )
                .await;
            secrets.push((secret.clone(), fetched));
        }

        let mut config_maps = Vec::with_capacity(references.config_maps.len());
        for config_map in &references.config_maps {
            let fetched = fetcher
                .fetch(
                    format!("configmap/{}", config_map.name),
                    reader.get_config_map(ns, &config_map.name),
                )
                .await;
            config_maps.push((config_map.clone(), fetched));
        }

        let mut claims = Vec::with_capacity(references.claims.len());
        for claim in &references.claims {
            let fetched = fetcher
                .fetch(
                    format!("pvc/{}", claim),
                    reader.get_persistent_volume_claim(ns, claim),
                )
                .await;
            claims.push((claim.clone(), fetched));
        }

        PodDependents {
            references,
            node,
            service_account,
            secrets,
            config_maps,
            claims,
        }
    }

    fn is_failing(&self, pod: &Pod) -> bool {
        extract::is_failing(pod)
    }

    async fn capture_logs(
        &self,
        reader: &dyn ClusterReader,
        target: &Target,
        pod: &Pod,
        tail_lines: Option<i64>,
        fetcher: &mut DependentFetcher,
    ) -> BTreeMap<String, Dependent<CapturedLogs>> {
        let mut logs = BTreeMap::new();
        for container in log_containers(pod) {
            let captured = capture_container_logs(
                reader,
                fetcher,
                &target.namespace,
                &target.name,
                LogRequest::current(&container, tail_lines),
            )
            .await;
            logs.insert(container, captured);
        }
        logs
    }

    fn catalog(&self) -> CheckRegistry<Self> {
        CheckRegistry::new(default_selection)
            .register_fn("status", "Pod phase and container readiness", checks::status)
            .register_fn(
                "scheduling",
                "Placement on a node, classified from FailedScheduling events",
                checks::scheduling,
            )
            .register_fn("images", "Image pull failures and unpinned tags", checks::images)
            .register_fn(
                "permissions",
                "Referenced service account, secrets and config maps exist",
                checks::permissions,
            )
            .register_fn(
                "init-containers",
                "Init containers completed successfully",
                checks::init_containers,
            )
            .register_fn(
                "resources",
                "OOM kills, missing requests/limits and restart counts",
                checks::resources,
            )
            .register_fn("network", "Pod IP assignment and readiness", checks::network)
            .register_fn(
                "volumes",
                "Persistent volume claims are bound",
                checks::volumes,
            )
            .register_fn("node", "Health of the node the pod runs on", checks::node)
            .register_fn(
                "logs",
                "Known failure signatures in container logs",
                checks::logs,
            )
    }
}
