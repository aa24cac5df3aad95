//! Live cluster reader backed by `kube::Client`.
//!
//! # Prerequisites
//!
//! - Valid kubeconfig (uses default context or specified context)
//! - RBAC permissions to get/list/watch the diagnosed kinds; missing
//!   permissions on dependents only degrade the diagnosis
//!
//! # Example
//!
//! ```rust,ignore
//! use kubediag::cluster::{ClusterReader, KubeReader};
//!
//! let reader = KubeReader::new().await?;
//! let pod = reader.get_pod("default", "web-0").await?;
//! ```

use async_trait::async_trait;
use futures_util::StreamExt;
use k8s_openapi::NamespaceResourceScope;
use k8s_openapi::api::core::v1::{
    ConfigMap, Event, Node, PersistentVolumeClaim, Pod, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use kube::{
    Client, Config, Resource,
    api::{Api, ListParams, LogParams},
    runtime::watcher,
};
use serde::de::DeserializeOwned;
use std::fmt::Debug;

use super::{
    ClusterReader, FetchError, FetchResult, LabelSelector, LogRequest, WatchEvent, WatchStream,
    selector_string,
};
use crate::diagnostics::types::{ResourceKind, Target};

/// Cluster reader for a live API server.
#[derive(Clone)]
pub struct KubeReader {
    client: Client,
}

impl KubeReader {
    /// Create a reader using the inferred kubeconfig or in-cluster config.
    pub async fn new() -> FetchResult<Self> {
        let config = Config::infer()
            .await
            .map_err(|e| FetchError::Config(e.to_string()))?;
        let client = Client::try_from(config)?;
        Ok(Self { client })
    }

    /// Create a reader for a specific kubeconfig context.
    pub async fn with_context(context: &str) -> FetchResult<Self> {
        let kubeconfig =
            kube::config::Kubeconfig::read().map_err(|e| FetchError::Config(e.to_string()))?;
        let config = Config::from_custom_kubeconfig(
            kubeconfig,
            &kube::config::KubeConfigOptions {
                context: Some(context.to_string()),
                ..Default::default()
            },
        )
        .await
        .map_err(|e| FetchError::Config(e.to_string()))?;
        let client = Client::try_from(config)?;
        Ok(Self { client })
    }

    /// Create a reader from an existing client.
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }

    /// Namespace the inferred config defaults to.
    pub fn default_namespace(&self) -> &str {
        self.client.default_namespace()
    }

    async fn get_namespaced<K>(&self, namespace: &str, name: &str) -> FetchResult<K>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let api: Api<K> = Api::namespaced(self.client.clone(), namespace);
        api.get(name)
            .await
            .map_err(|e| map_kube_error(e, &K::kind(&()), name))
    }

    async fn list_in<K>(&self, namespace: Option<&str>, params: &ListParams) -> FetchResult<Vec<K>>
    where
        K: Resource<Scope = NamespaceResourceScope, DynamicType = ()>
            + Clone
            + DeserializeOwned
            + Debug,
    {
        let api: Api<K> = match namespace {
            Some(ns) => Api::namespaced(self.client.clone(), ns),
            None => Api::all(self.client.clone()),
        };
        let list = api
            .list(params)
            .await
            .map_err(|e| map_kube_error(e, &K::kind(&()), namespace.unwrap_or("*")))?;
        Ok(list.items)
    }
}

/// Map a kube error onto the fetch taxonomy, keeping 404 and 403 apart.
fn map_kube_error(err: kube::Error, kind: &str, name: &str) -> FetchError {
    match err {
        kube::Error::Api(response) => match response.code {
            404 => FetchError::not_found(kind, name),
            403 => FetchError::forbidden(kind, name, response.message.clone()),
            code => FetchError::Api {
                code,
                message: response.message.clone(),
            },
        },
        other => FetchError::Client(other),
    }
}

fn watch_events<K>(api: Api<K>, name: &str) -> WatchStream
where
    K: Resource + Clone + DeserializeOwned + Debug + Send + 'static,
{
    let config = watcher::Config::default().fields(&format!("metadata.name={}", name));
    watcher(api, config)
        .filter_map(|event| async move {
            match event {
                Ok(watcher::Event::InitApply(_)) => Some(Ok(WatchEvent::Added)),
                Ok(watcher::Event::Apply(_)) => Some(Ok(WatchEvent::Modified)),
                Ok(watcher::Event::Delete(_)) => Some(Ok(WatchEvent::Deleted)),
                Ok(watcher::Event::Init) | Ok(watcher::Event::InitDone) => None,
                Err(e) => Some(Err(FetchError::Api {
                    code: 0,
                    message: e.to_string(),
                })),
            }
        })
        .boxed()
}

#[async_trait]
impl ClusterReader for KubeReader {
    async fn get_pod(&self, namespace: &str, name: &str) -> FetchResult<Pod> {
        self.get_namespaced(namespace, name).await
    }

    async fn list_pods(
        &self,
        namespace: Option<&str>,
        selector: Option<&LabelSelector>,
    ) -> FetchResult<Vec<Pod>> {
        let params = match selector {
            Some(selector) => ListParams::default().labels(&selector_string(selector)),
            None => ListParams::default(),
        };
        self.list_in(namespace, &params).await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> FetchResult<Service> {
        self.get_namespaced(namespace, name).await
    }

    async fn list_services(&self, namespace: Option<&str>) -> FetchResult<Vec<Service>> {
        self.list_in(namespace, &ListParams::default()).await
    }

    async fn get_ingress(&self, namespace: &str, name: &str) -> FetchResult<Ingress> {
        self.get_namespaced(namespace, name).await
    }

    async fn list_ingresses(&self, namespace: Option<&str>) -> FetchResult<Vec<Ingress>> {
        self.list_in(namespace, &ListParams::default()).await
    }

    async fn get_ingress_class(&self, name: &str) -> FetchResult<IngressClass> {
        let api: Api<IngressClass> = Api::all(self.client.clone());
        api.get(name)
            .await
            .map_err(|e| map_kube_error(e, "IngressClass", name))
    }

    async fn list_endpoint_slices(
        &self,
        namespace: &str,
        service: &str,
    ) -> FetchResult<Vec<EndpointSlice>> {
        let params =
            ListParams::default().labels(&format!("kubernetes.io/service-name={}", service));
        self.list_in(Some(namespace), &params).await
    }

    async fn get_node(&self, name: &str) -> FetchResult<Node> {
        let api: Api<Node> = Api::all(self.client.clone());
        api.get(name)
            .await
            .map_err(|e| map_kube_error(e, "Node", name))
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> FetchResult<Secret> {
        self.get_namespaced(namespace, name).await
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> FetchResult<ConfigMap> {
        self.get_namespaced(namespace, name).await
    }

    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> FetchResult<ServiceAccount> {
        self.get_namespaced(namespace, name).await
    }

    async fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> FetchResult<PersistentVolumeClaim> {
        self.get_namespaced(namespace, name).await
    }

    async fn list_events(
        &self,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> FetchResult<Vec<Event>> {
        let params = ListParams::default().fields(&format!(
            "involvedObject.kind={},involvedObject.name={}",
            kind, name
        ));
        self.list_in(Some(namespace), &params).await
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        request: &LogRequest,
    ) -> FetchResult<String> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let params = LogParams {
            container: Some(request.container.clone()),
            tail_lines: request.tail_lines,
            previous: request.previous,
            ..Default::default()
        };
        api.logs(pod, &params)
            .await
            .map_err(|e| map_kube_error(e, "Pod logs", pod))
    }

    async fn watch(&self, target: &Target) -> FetchResult<WatchStream> {
        let client = self.client.clone();
        let ns = target.namespace.as_str();
        let stream = match target.kind {
            ResourceKind::Pod => watch_events(Api::<Pod>::namespaced(client, ns), &target.name),
            ResourceKind::Service => {
                watch_events(Api::<Service>::namespaced(client, ns), &target.name)
            }
            ResourceKind::Ingress => {
                watch_events(Api::<Ingress>::namespaced(client, ns), &target.name)
            }
        };
        Ok(stream)
    }
}
