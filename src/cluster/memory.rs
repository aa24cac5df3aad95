//! In-memory cluster reader.
//!
//! Holds typed Kubernetes objects as JSON and answers the same queries the
//! live reader does. It backs offline diagnosis from a YAML dump
//! (`kubectl get pods,svc,ingress,... -o yaml`) and serves as the test double
//! for the engine.
//!
//! Besides regular objects a snapshot may carry captured container logs:
//!
//! ```yaml
//! apiVersion: kubediag/v1
//! kind: ContainerLog
//! metadata:
//!   namespace: default
//!   name: web-0          # pod name
//! container: app
//! previous: false
//! text: |
//!   starting server
//! ```

use async_trait::async_trait;
use futures_util::StreamExt;
use k8s_openapi::api::core::v1::{
    ConfigMap, Event, Node, PersistentVolumeClaim, Pod, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

use super::{
    ClusterReader, FetchError, FetchResult, LabelSelector, LogRequest, WatchEvent, WatchStream,
};
use crate::diagnostics::types::Target;

const DEFAULT_NAMESPACE: &str = "default";
const CONTAINER_LOG_KIND: &str = "ContainerLog";

/// Key of a captured log stream: namespace, pod, container, previous.
type LogKey = (String, String, String, bool);

/// In-memory object store implementing [`ClusterReader`].
#[derive(Default)]
pub struct MemoryReader {
    objects: RwLock<Vec<Value>>,
    logs: RwLock<HashMap<LogKey, String>>,
    /// `(kind, name)` pairs whose reads are denied; name `*` denies the whole kind.
    forbidden: RwLock<HashSet<(String, String)>>,
    /// Artificial delay before reads of a kind answer.
    latency: RwLock<HashMap<String, Duration>>,
    watch_events: Mutex<Option<mpsc::UnboundedReceiver<FetchResult<WatchEvent>>>>,
}

impl MemoryReader {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a store from a multi-document YAML string.
    ///
    /// Documents of kind `List` are flattened into their items.
    pub fn from_yaml(content: &str) -> FetchResult<Self> {
        let reader = Self::new();
        for document in serde_yaml::Deserializer::from_str(content) {
            let value =
                Value::deserialize(document).map_err(|e| FetchError::Decode(e.to_string()))?;
            match value {
                Value::Null => continue,
                value if kind_of(&value) == Some("List") => {
                    if let Some(items) = value.get("items").and_then(Value::as_array) {
                        for item in items {
                            reader.insert_value(item.clone())?;
                        }
                    }
                }
                value => reader.insert_value(value)?,
            }
        }
        Ok(reader)
    }

    /// Load a store from a YAML snapshot file.
    pub fn from_file(path: &Path) -> FetchResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| FetchError::Decode(format!("{}: {}", path.display(), e)))?;
        Self::from_yaml(&content)
    }

    /// Add a typed object, replacing any object with the same identity.
    pub fn with<K: Serialize>(self, object: &K) -> Self {
        self.insert(object);
        self
    }

    /// Add or replace a typed object.
    pub fn insert<K: Serialize>(&self, object: &K) {
        match serde_json::to_value(object) {
            Ok(value) => {
                if let Err(e) = self.insert_value(value) {
                    log::warn!("ignoring object: {}", e);
                }
            }
            Err(e) => log::warn!("failed to serialize object: {}", e),
        }
    }

    /// Remove an object by identity. Returns whether it existed.
    pub fn remove(&self, kind: &str, namespace: &str, name: &str) -> bool {
        let Ok(mut objects) = self.objects.write() else {
            return false;
        };
        let before = objects.len();
        objects.retain(|v| !identity_matches(v, kind, Some(namespace), name));
        before != objects.len()
    }

    /// Record captured log text for a container.
    pub fn with_logs(self, namespace: &str, pod: &str, container: &str, text: &str) -> Self {
        self.set_logs(namespace, pod, container, false, text);
        self
    }

    /// Record log text of the previous (pre-restart) container instance.
    pub fn with_previous_logs(
        self,
        namespace: &str,
        pod: &str,
        container: &str,
        text: &str,
    ) -> Self {
        self.set_logs(namespace, pod, container, true, text);
        self
    }

    /// Deny reads of `kind`/`name` (`*` for every object of the kind).
    pub fn forbid(self, kind: &str, name: &str) -> Self {
        if let Ok(mut forbidden) = self.forbidden.write() {
            forbidden.insert((kind.to_string(), name.to_string()));
        }
        self
    }

    /// Delay every read of `kind` by `delay`.
    pub fn with_latency(self, kind: &str, delay: Duration) -> Self {
        if let Ok(mut latency) = self.latency.write() {
            latency.insert(kind.to_string(), delay);
        }
        self
    }

    /// Script the watch stream. Events sent on the returned channel are
    /// delivered to the next `watch` subscription.
    pub fn watch_channel(&self) -> mpsc::UnboundedSender<FetchResult<WatchEvent>> {
        let (tx, rx) = mpsc::unbounded_channel();
        if let Ok(mut slot) = self.watch_events.lock() {
            *slot = Some(rx);
        }
        tx
    }

    /// Number of stored objects.
    pub fn len(&self) -> usize {
        self.objects.read().map(|o| o.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn set_logs(&self, namespace: &str, pod: &str, container: &str, previous: bool, text: &str) {
        if let Ok(mut logs) = self.logs.write() {
            logs.insert(
                (
                    namespace.to_string(),
                    pod.to_string(),
                    container.to_string(),
                    previous,
                ),
                text.to_string(),
            );
        }
    }

    fn insert_value(&self, value: Value) -> FetchResult<()> {
        let kind = kind_of(&value)
            .ok_or_else(|| FetchError::Decode("object without kind".to_string()))?
            .to_string();
        let name = name_of(&value)
            .ok_or_else(|| FetchError::Decode(format!("{} without metadata.name", kind)))?
            .to_string();

        if kind == CONTAINER_LOG_KIND {
            let container = value
                .get("container")
                .and_then(Value::as_str)
                .ok_or_else(|| FetchError::Decode("ContainerLog without container".to_string()))?;
            let previous = value
                .get("previous")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            let text = value.get("text").and_then(Value::as_str).unwrap_or("");
            self.set_logs(namespace_of(&value), &name, container, previous, text);
            return Ok(());
        }

        let namespace = namespace_of(&value).to_string();
        let mut objects = self
            .objects
            .write()
            .map_err(|_| FetchError::Decode("object store poisoned".to_string()))?;
        objects.retain(|v| !identity_matches(v, &kind, Some(&namespace), &name));
        objects.push(value);
        Ok(())
    }

    fn check_access(&self, kind: &str, name: &str) -> FetchResult<()> {
        let denied = self
            .forbidden
            .read()
            .map(|f| {
                f.contains(&(kind.to_string(), name.to_string()))
                    || f.contains(&(kind.to_string(), "*".to_string()))
            })
            .unwrap_or(false);
        if denied {
            Err(FetchError::forbidden(
                kind,
                name,
                format!("reads of {} are not permitted", kind),
            ))
        } else {
            Ok(())
        }
    }

    async fn delay(&self, kind: &str) {
        let delay = self.latency.read().ok().and_then(|l| l.get(kind).copied());
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }

    async fn find<K: DeserializeOwned>(
        &self,
        kind: &str,
        namespace: Option<&str>,
        name: &str,
    ) -> FetchResult<K> {
        self.delay(kind).await;
        self.check_access(kind, name)?;
        let objects = self
            .objects
            .read()
            .map_err(|_| FetchError::Decode("object store poisoned".to_string()))?;
        let value = objects
            .iter()
            .find(|v| identity_matches(v, kind, namespace, name))
            .cloned()
            .ok_or_else(|| FetchError::not_found(kind, name))?;
        serde_json::from_value(value).map_err(|e| FetchError::Decode(e.to_string()))
    }

    async fn list<K: DeserializeOwned>(
        &self,
        kind: &str,
        namespace: Option<&str>,
        filter: impl Fn(&Value) -> bool + Send,
    ) -> FetchResult<Vec<K>> {
        self.delay(kind).await;
        self.check_access(kind, "*")?;
        let objects = self
            .objects
            .read()
            .map_err(|_| FetchError::Decode("object store poisoned".to_string()))?;
        objects
            .iter()
            .filter(|v| kind_of(v) == Some(kind))
            .filter(|v| namespace.is_none_or(|ns| namespace_of(v) == ns))
            .filter(|v| filter(v))
            .map(|v| serde_json::from_value(v.clone()).map_err(|e| FetchError::Decode(e.to_string())))
            .collect()
    }
}

fn kind_of(value: &Value) -> Option<&str> {
    value.get("kind").and_then(Value::as_str)
}

fn name_of(value: &Value) -> Option<&str> {
    value.pointer("/metadata/name").and_then(Value::as_str)
}

fn namespace_of(value: &Value) -> &str {
    value
        .pointer("/metadata/namespace")
        .and_then(Value::as_str)
        .unwrap_or(DEFAULT_NAMESPACE)
}

/// Cluster-scoped lookups pass `None` for the namespace.
fn identity_matches(value: &Value, kind: &str, namespace: Option<&str>, name: &str) -> bool {
    kind_of(value) == Some(kind)
        && name_of(value) == Some(name)
        && namespace.is_none_or(|ns| namespace_of(value) == ns)
}

fn labels_match(value: &Value, selector: &LabelSelector) -> bool {
    let labels = value.pointer("/metadata/labels");
    selector.iter().all(|(key, expected)| {
        labels
            .and_then(|l| l.get(key))
            .and_then(Value::as_str)
            .is_some_and(|actual| actual == expected)
    })
}

fn tail(text: &str, lines: Option<i64>) -> String {
    match lines {
        Some(n) if n >= 0 => {
            let all: Vec<&str> = text.lines().collect();
            let start = all.len().saturating_sub(n as usize);
            all[start..].join("\n")
        }
        _ => text.to_string(),
    }
}

#[async_trait]
impl ClusterReader for MemoryReader {
    async fn get_pod(&self, namespace: &str, name: &str) -> FetchResult<Pod> {
        self.find("Pod", Some(namespace), name).await
    }

    async fn list_pods(
        &self,
        namespace: Option<&str>,
        selector: Option<&LabelSelector>,
    ) -> FetchResult<Vec<Pod>> {
        self.list("Pod", namespace, |v| {
            selector.is_none_or(|s| labels_match(v, s))
        })
        .await
    }

    async fn get_service(&self, namespace: &str, name: &str) -> FetchResult<Service> {
        self.find("Service", Some(namespace), name).await
    }

    async fn list_services(&self, namespace: Option<&str>) -> FetchResult<Vec<Service>> {
        self.list("Service", namespace, |_| true).await
    }

    async fn get_ingress(&self, namespace: &str, name: &str) -> FetchResult<Ingress> {
        self.find("Ingress", Some(namespace), name).await
    }

    async fn list_ingresses(&self, namespace: Option<&str>) -> FetchResult<Vec<Ingress>> {
        self.list("Ingress", namespace, |_| true).await
    }

    async fn get_ingress_class(&self, name: &str) -> FetchResult<IngressClass> {
        self.find("IngressClass", None, name).await
    }

    async fn list_endpoint_slices(
        &self,
        namespace: &str,
        service: &str,
    ) -> FetchResult<Vec<EndpointSlice>> {
        let mut selector = LabelSelector::new();
        selector.insert("kubernetes.io/service-name".to_string(), service.to_string());
        self.list("EndpointSlice", Some(namespace), |v| labels_match(v, &selector))
            .await
    }

    async fn get_node(&self, name: &str) -> FetchResult<Node> {
        self.find("Node", None, name).await
    }

    async fn get_secret(&self, namespace: &str, name: &str) -> FetchResult<Secret> {
        self.find("Secret", Some(namespace), name).await
    }

    async fn get_config_map(&self, namespace: &str, name: &str) -> FetchResult<ConfigMap> {
        self.find("ConfigMap", Some(namespace), name).await
    }

    async fn get_service_account(
        &self,
        namespace: &str,
        name: &str,
    ) -> FetchResult<ServiceAccount> {
        self.find("ServiceAccount", Some(namespace), name).await
    }

    async fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> FetchResult<PersistentVolumeClaim> {
        self.find("PersistentVolumeClaim", Some(namespace), name).await
    }

    async fn list_events(
        &self,
        namespace: &str,
        kind: &str,
        name: &str,
    ) -> FetchResult<Vec<Event>> {
        self.list("Event", Some(namespace), |v| {
            v.pointer("/involvedObject/kind").and_then(Value::as_str) == Some(kind)
                && v.pointer("/involvedObject/name").and_then(Value::as_str) == Some(name)
        })
        .await
    }

    async fn pod_logs(
        &self,
        namespace: &str,
        pod: &str,
        request: &LogRequest,
    ) -> FetchResult<String> {
        self.check_access("Pod logs", pod)?;
        let logs = self
            .logs
            .read()
            .map_err(|_| FetchError::Decode("log store poisoned".to_string()))?;
        let key = (
            namespace.to_string(),
            pod.to_string(),
            request.container.clone(),
            request.previous,
        );
        match logs.get(&key) {
            Some(text) => Ok(tail(text, request.tail_lines)),
            None => Err(FetchError::not_found(
                "Pod logs",
                format!("{}/{}", pod, request.container),
            )),
        }
    }

    async fn watch(&self, target: &Target) -> FetchResult<WatchStream> {
        let scripted = self
            .watch_events
            .lock()
            .map_err(|_| FetchError::Unsupported("watch channel poisoned".to_string()))?
            .take();
        match scripted {
            Some(rx) => Ok(UnboundedReceiverStream::new(rx).boxed()),
            None => {
                // A static snapshot never changes: one ADDED, then the stream closes.
                log::debug!("static watch for {}", target);
                Ok(futures_util::stream::once(async { Ok(WatchEvent::Added) }).boxed())
            }
        }
    }
}
