//! Read-only access to cluster state.
//!
//! The diagnostic engine never talks to the API server directly. It consumes
//! the [`ClusterReader`] capability, which has two implementations:
//!
//! - [`KubeReader`] - a live cluster through `kube::Client`
//! - [`MemoryReader`] - an in-memory object store, loadable from a YAML
//!   snapshot, used for offline diagnosis and in tests
//!
//! Every method is a read. Nothing here mutates cluster state.

pub mod live;
pub mod memory;

pub use live::KubeReader;
pub use memory::MemoryReader;

use async_trait::async_trait;
use futures_util::stream::BoxStream;
use k8s_openapi::api::core::v1::{
    ConfigMap, Event, Node, PersistentVolumeClaim, Pod, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::api::networking::v1::{Ingress, IngressClass};
use std::collections::BTreeMap;

use crate::diagnostics::types::Target;

/// Error type for fetch operations.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("{kind} '{name}' not found")]
    NotFound { kind: String, name: String },

    #[error("access to {kind} '{name}' is forbidden: {message}")]
    Forbidden {
        kind: String,
        name: String,
        message: String,
    },

    #[error("request timed out")]
    Timeout,

    #[error("operation not supported: {0}")]
    Unsupported(String),

    #[error("API request failed ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("failed to decode object: {0}")]
    Decode(String),

    #[error("Kubernetes client error: {0}")]
    Client(#[from] kube::Error),

    #[error("failed to load Kubernetes config: {0}")]
    Config(String),
}

impl FetchError {
    pub fn not_found(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::NotFound {
            kind: kind.into(),
            name: name.into(),
        }
    }

    pub fn forbidden(
        kind: impl Into<String>,
        name: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::Forbidden {
            kind: kind.into(),
            name: name.into(),
            message: message.into(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    pub fn is_forbidden(&self) -> bool {
        matches!(self, Self::Forbidden { .. })
    }
}

/// Result alias for fetch operations.
pub type FetchResult<T> = std::result::Result<T, FetchError>;

/// Log retrieval options for one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRequest {
    pub container: String,
    pub tail_lines: Option<i64>,
    /// Read the stream of the previous (pre-restart) container instance.
    pub previous: bool,
}

impl LogRequest {
    pub fn current(container: impl Into<String>, tail_lines: Option<i64>) -> Self {
        Self {
            container: container.into(),
            tail_lines,
            previous: false,
        }
    }

    /// Same request against the pre-restart stream.
    pub fn previous(&self) -> Self {
        Self {
            previous: true,
            ..self.clone()
        }
    }
}

/// A change notification for a watched resource.
///
/// Carries no payload: every evaluation re-reads fresh state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchEvent {
    Added,
    Modified,
    Deleted,
}

/// Stream of change notifications. An `Err` item is a stream error.
pub type WatchStream = BoxStream<'static, FetchResult<WatchEvent>>;

/// Equality label selector, e.g. a Service's `spec.selector`.
pub type LabelSelector = BTreeMap<String, String>;

/// Render an equality selector in API query form (`a=b,c=d`).
pub fn selector_string(selector: &LabelSelector) -> String {
    selector
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// Read-only fetch capability consumed by the diagnostic engine.
#[async_trait]
pub trait ClusterReader: Send + Sync {
    async fn get_pod(&self, namespace: &str, name: &str) -> FetchResult<Pod>;

    /// List pods. `None` namespace lists across all namespaces.
    async fn list_pods(
        &self,
        namespace: Option<&str>,
        selector: Option<&LabelSelector>,
    ) -> FetchResult<Vec<Pod>>;

    async fn get_service(&self, namespace: &str, name: &str) -> FetchResult<Service>;

    async fn list_services(&self, namespace: Option<&str>) -> FetchResult<Vec<Service>>;

    async fn get_ingress(&self, namespace: &str, name: &str) -> FetchResult<Ingress>;

    async fn list_ingresses(&self, namespace: Option<&str>) -> FetchResult<Vec<Ingress>>;

    async fn get_ingress_class(&self, name: &str) -> FetchResult<IngressClass>;

    /// Endpoint slices owned by a service.
    async fn list_endpoint_slices(
        &self,
        namespace: &str,
        service: &str,
    ) -> FetchResult<Vec<EndpointSlice>>;

    async fn get_node(&self, name: &str) -> FetchResult<Node>;

    async fn get_secret(&self, namespace: &str, name: &str) -> FetchResult<Secret>;

    async fn get_config_map(&self, namespace: &str, name: &str) -> FetchResult<ConfigMap>;

    async fn get_service_account(&self, namespace: &str, name: &str)
    -> FetchResult<ServiceAccount>;

    async fn get_persistent_volume_claim(
        &self,
        namespace: &str,
        name: &str,
    ) -> FetchResult<PersistentVolumeClaim>;

    /// Events whose involved object is `kind`/`name` in `namespace`.
    async fn list_events(&self, namespace: &str, kind: &str, name: &str)
    -> FetchResult<Vec<Event>>;

    async fn pod_logs(&self, namespace: &str, pod: &str, request: &LogRequest)
    -> FetchResult<String>;

    /// Subscribe to changes of a single resource.
    async fn watch(&self, target: &Target) -> FetchResult<WatchStream>;
}
