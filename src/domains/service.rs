//! Network routing object (Service) domain.
//!
//! Dependents: the pods matched by the selector and the service's endpoint
//! slices. Detail labels: `selector`, `matched_pods`, `ready_endpoints`,
//! `not_ready_endpoints`, `port`, `target_port`, `type`.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Service, ServicePort};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::cluster::{ClusterReader, FetchResult, LabelSelector, selector_string};
use crate::diagnostics::config::CheckConfig;
use crate::diagnostics::context::{Absence, Dependent, SubjectInfo};
use crate::diagnostics::engine::Domain;
use crate::diagnostics::gather::DependentFetcher;
use crate::diagnostics::registry::CheckRegistry;
use crate::diagnostics::suggest;
use crate::diagnostics::types::{CheckResult, ResourceKind, Target};
use crate::domains::pod::extract;

pub const DEFAULT_CHECKS: &[&str] = &["selector", "endpoints", "ports", "pods"];

#[derive(Debug, Clone, Default)]
pub struct ServiceDependents {
    /// `None` when the service has no selector or is ExternalName.
    pub pods: Option<Dependent<Vec<Pod>>>,
    /// `None` for ExternalName services.
    pub endpoint_slices: Option<Dependent<Vec<EndpointSlice>>>,
}

pub type ServiceInfo = SubjectInfo<ServiceDomain>;

#[derive(Debug, Clone, Copy, Default)]
pub struct ServiceDomain;

pub fn service_type(service: &Service) -> &str {
    service
        .spec
        .as_ref()
        .and_then(|s| s.type_.as_deref())
        .unwrap_or("ClusterIP")
}

pub fn selector(service: &Service) -> Option<&LabelSelector> {
    service
        .spec
        .as_ref()
        .and_then(|s| s.selector.as_ref())
        .filter(|s| !s.is_empty())
}

pub fn ports(service: &Service) -> &[ServicePort] {
    service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_deref())
        .unwrap_or_default()
}

/// `(ready, not_ready)` endpoint counts across slices.
///
/// An endpoint without a ready condition counts as ready.
pub fn endpoint_counts(slices: &[EndpointSlice]) -> (usize, usize) {
    slices
        .iter()
        .flat_map(|slice| slice.endpoints.iter())
        .fold((0, 0), |(ready, not_ready), endpoint| {
            let is_ready = endpoint
                .conditions
                .as_ref()
                .and_then(|c| c.ready)
                .unwrap_or(true);
            if is_ready {
                (ready + 1, not_ready)
            } else {
                (ready, not_ready + 1)
            }
        })
}

fn is_external_name(service: &Service) -> bool {
    service_type(service) == "ExternalName"
}

fn selector_detail(service: &Service) -> String {
    selector(service)
        .map(selector_string)
        .unwrap_or_else(|| "<none>".to_string())
}

fn backing_pods(subject: &ServiceInfo) -> Option<&[Pod]> {
    subject
        .dependents
        .pods
        .as_ref()
        .and_then(|p| p.present())
        .map(Vec::as_slice)
        .filter(|p| !p.is_empty())
}

fn default_selection(_subject: &ServiceInfo) -> Vec<&'static str> {
    DEFAULT_CHECKS.to_vec()
}

#[async_trait]
impl Domain for ServiceDomain {
    type Primary = Service;
    type Dependents = ServiceDependents;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Service
    }

    async fn fetch_primary(
        &self,
        reader: &dyn ClusterReader,
        namespace: &str,
        name: &str,
    ) -> FetchResult<Service> {
        reader.get_service(namespace, name).await
    }

    async fn list_primaries(
        &self,
        reader: &dyn ClusterReader,
        namespace: Option<&str>,
    ) -> FetchResult<Vec<Target>> {
        let services = reader.list_services(namespace).await?;
        Ok(services
            .iter()
            .filter_map(|svc| {
                let name = svc.metadata.name.as_deref()?;
                let ns = svc
                    .metadata
                    .namespace
                    .as_deref()
                    .or(namespace)
                    .unwrap_or("default");
                Some(Target::new(ResourceKind::Service, ns, name))
            })
            .collect())
    }

    async fn fetch_dependents(
        &self,
        reader: &dyn ClusterReader,
        target: &Target,
        service: &Service,
        fetcher: &mut DependentFetcher,
    ) -> ServiceDependents {
        if is_external_name(service) {
            return ServiceDependents::default();
        }
        let ns = target.namespace.as_str();

        let pods = match selector(service) {
            Some(selector) => Some(
                fetcher
                    .fetch("pods", reader.list_pods(Some(ns), Some(selector)))
                    .await,
            ),
            None => None,
        };
        let endpoint_slices = Some(
            fetcher
                .fetch(
                    "endpointslices",
                    reader.list_endpoint_slices(ns, &target.name),
                )
                .await,
        );

        ServiceDependents {
            pods,
            endpoint_slices,
        }
    }

    fn catalog(&self) -> CheckRegistry<Self> {
        CheckRegistry::new(default_selection)
            .register_fn("selector", "Selector matches running pods", check_selector)
            .register_fn("endpoints", "Ready endpoints back the service", check_endpoints)
            .register_fn(
                "ports",
                "Target ports are declared by the backing pods",
                check_ports,
            )
            .register_fn("pods", "Readiness of each backing pod", check_pods)
            .register_fn("type", "Service type specific state", check_type)
    }
}

fn check_selector(subject: &ServiceInfo, _config: &CheckConfig) -> Vec<CheckResult> {
    let service = &subject.primary;
    if is_external_name(service) {
        return vec![CheckResult::skipped(
            "selector",
            "ExternalName services have no selector",
        )];
    }
    let detail = selector_detail(service);
    if selector(service).is_none() {
        return vec![
            CheckResult::warning("selector", "Service has no selector")
                .with_suggestion(
                    "Without a selector no endpoints are created automatically; add a selector matching the backing pods' labels or manage EndpointSlices yourself",
                )
                .with_detail("selector", detail),
        ];
    }

    let mut result = match subject.dependents.pods.as_ref() {
        Some(Dependent::Absent(absence)) => {
            let result = CheckResult::warning(
                "selector",
                format!("Could not list pods matching the selector: {}", absence),
            )
            .with_suggestion(suggest::absence("Pod list for selector", &detail, absence));
            match absence.raw_error() {
                Some(raw) => result.with_error(raw),
                None => result,
            }
        }
        Some(Dependent::Present(pods)) if !pods.is_empty() => CheckResult::passed(
            "selector",
            format!("Selector matches {} pods", pods.len()),
        )
        .with_detail("matched_pods", pods.len().to_string()),
        _ => CheckResult::failed("selector", format!("No pods match selector {}", detail))
            .with_suggestion(
                "Check that the pod labels match the selector exactly and that the pods run in this namespace",
            )
            .with_detail("matched_pods", "0"),
    };
    result.details.prepend("selector", detail);
    vec![result]
}

fn check_endpoints(subject: &ServiceInfo, _config: &CheckConfig) -> Vec<CheckResult> {
    let service = &subject.primary;
    let Some(slices) = subject.dependents.endpoint_slices.as_ref() else {
        return vec![CheckResult::skipped(
            "endpoints",
            "ExternalName services have no endpoints",
        )];
    };

    let slices = match slices {
        Dependent::Absent(absence) => {
            let result = match absence {
                Absence::NotFound => CheckResult::failed("endpoints", "Service has no endpoints"),
                other => CheckResult::warning(
                    "endpoints",
                    format!("Could not verify endpoints: {}", other),
                ),
            }
            .with_suggestion(suggest::absence(
                "EndpointSlices of service",
                &subject.target.name,
                absence,
            ));
            return vec![match absence.raw_error() {
                Some(raw) => result.with_error(raw),
                None => result,
            }];
        }
        Dependent::Present(slices) => slices,
    };

    let (ready, not_ready) = endpoint_counts(slices);
    let result = if ready == 0 {
        let suggestion = if not_ready > 0 {
            "Backing pods exist but none is ready; check their readiness probes"
        } else if selector(service).is_none() {
            "The service has no selector; create EndpointSlices for its backends or add a selector"
        } else {
            "No running pod backs the service; check the selector and the pods it should match"
        };
        CheckResult::failed(
            "endpoints",
            format!("Service has 0 ready endpoints ({} not ready)", not_ready),
        )
        .with_suggestion(suggestion)
    } else if not_ready > 0 {
        CheckResult::warning(
            "endpoints",
            format!("{} endpoints ready, {} not ready", ready, not_ready),
        )
        .with_suggestion("Some backing pods are not ready; run the pods check for details")
    } else {
        CheckResult::passed("endpoints", format!("{} endpoints ready", ready))
    };
    vec![
        result
            .with_detail("ready_endpoints", ready.to_string())
            .with_detail("not_ready_endpoints", not_ready.to_string()),
    ]
}

fn declared_ports(pods: &[Pod]) -> Vec<(Option<&str>, i32)> {
    pods.iter()
        .flat_map(extract::containers)
        .flat_map(|c| c.ports.iter().flatten())
        .map(|p| (p.name.as_deref(), p.container_port))
        .collect()
}

fn check_ports(subject: &ServiceInfo, _config: &CheckConfig) -> Vec<CheckResult> {
    let service = &subject.primary;
    if is_external_name(service) {
        return vec![CheckResult::skipped("ports", "ExternalName services map no ports")];
    }
    let service_ports = ports(service);
    if service_ports.is_empty() {
        return vec![
            CheckResult::failed("ports", "Service defines no ports")
                .with_suggestion("Add at least one port to spec.ports"),
        ];
    }
    let Some(pods) = backing_pods(subject) else {
        return vec![CheckResult::skipped(
            "ports",
            "No backing pods to compare target ports against",
        )];
    };

    let declared = declared_ports(pods);
    service_ports
        .iter()
        .map(|port| {
            let label = port
                .name
                .as_deref()
                .map(|n| format!("{} ({})", port.port, n))
                .unwrap_or_else(|| port.port.to_string());
            let target = port
                .target_port
                .clone()
                .unwrap_or(IntOrString::Int(port.port));
            let result = match &target {
                IntOrString::String(name) => {
                    if declared.iter().any(|(n, _)| *n == Some(name.as_str())) {
                        CheckResult::passed(
                            "ports",
                            format!("Port {} targets named port '{}'", label, name),
                        )
                    } else {
                        CheckResult::failed(
                            "ports",
                            format!(
                                "Port {} targets named port '{}' which no backing pod declares",
                                label, name
                            ),
                        )
                        .with_suggestion(format!(
                            "Name a containerPort '{}' in the pod template or target the port number",
                            name
                        ))
                    }
                }
                IntOrString::Int(number) => {
                    if declared.is_empty() || declared.iter().any(|(_, p)| p == number) {
                        CheckResult::passed(
                            "ports",
                            format!("Port {} targets container port {}", label, number),
                        )
                    } else {
                        CheckResult::warning(
                            "ports",
                            format!(
                                "Port {} targets {} which the backing pods do not declare",
                                label, number
                            ),
                        )
                        .with_suggestion(format!(
                            "Check that the container listens on {}; declared ports are {}",
                            number,
                            declared
                                .iter()
                                .map(|(_, p)| p.to_string())
                                .collect::<Vec<_>>()
                                .join(", ")
                        ))
                    }
                }
            };
            let target_detail = match &target {
                IntOrString::Int(n) => n.to_string(),
                IntOrString::String(s) => s.clone(),
            };
            result
                .with_detail("port", port.port.to_string())
                .with_detail("target_port", target_detail)
        })
        .collect()
}

fn check_pods(subject: &ServiceInfo, _config: &CheckConfig) -> Vec<CheckResult> {
    let Some(pods) = backing_pods(subject) else {
        return vec![CheckResult::skipped("pods", "Service has no backing pods")];
    };

    pods.iter()
        .map(|pod| {
            let name = pod.metadata.name.as_deref().unwrap_or("<unnamed>");
            if extract::condition_true(pod, "Ready") {
                return CheckResult::passed("pods", format!("Pod {} is ready", name));
            }
            let waiting = extract::container_statuses(pod)
                .iter()
                .find_map(extract::waiting_reason);
            let reason = waiting.unwrap_or_else(|| extract::phase(pod));
            CheckResult::failed("pods", format!("Pod {} is not ready ({})", name, reason))
                .with_suggestion(
                    waiting
                        .and_then(suggest::waiting_reason)
                        .map(str::to_string)
                        .unwrap_or_else(|| format!("Run `kubediag pod {}` for a full diagnosis", name)),
                )
                .with_detail("reason", reason)
        })
        .collect()
}

fn check_type(subject: &ServiceInfo, _config: &CheckConfig) -> Vec<CheckResult> {
    let service = &subject.primary;
    let type_ = service_type(service);
    let result = match type_ {
        "LoadBalancer" => {
            let addresses: Vec<&str> = service
                .status
                .as_ref()
                .and_then(|s| s.load_balancer.as_ref())
                .and_then(|lb| lb.ingress.as_ref())
                .into_iter()
                .flatten()
                .filter_map(|i| i.ip.as_deref().or(i.hostname.as_deref()))
                .collect();
            if addresses.is_empty() {
                CheckResult::warning("type", "LoadBalancer has no external address yet")
                    .with_suggestion(
                        "Check the cloud controller or load-balancer provider events for this service",
                    )
            } else {
                CheckResult::passed(
                    "type",
                    format!("LoadBalancer is reachable at {}", addresses.join(", ")),
                )
            }
        }
        "ExternalName" => {
            let external = service
                .spec
                .as_ref()
                .and_then(|s| s.external_name.as_deref())
                .unwrap_or("");
            if external.is_empty() {
                CheckResult::failed("type", "ExternalName service has no externalName")
                    .with_suggestion("Set spec.externalName to the DNS name to alias")
            } else {
                CheckResult::passed(
                    "type",
                    format!("ExternalName service points to {}", external),
                )
            }
        }
        other => CheckResult::passed("type", format!("Service type {}", other)),
    };
    vec![result.with_detail("type", type_)]
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn slice(ready: &[bool]) -> EndpointSlice {
        let endpoints: Vec<_> = ready
            .iter()
            .enumerate()
            .map(|(i, r)| json!({"addresses": [format!("10.0.0.{}", i)], "conditions": {"ready": r}}))
            .collect();
        serde_json::from_value(json!({
            "apiVersion": "discovery.k8s.io/v1",
            "kind": "EndpointSlice",
            "metadata": {"name": "web-abc", "namespace": "default"},
            "addressType": "IPv4",
            "endpoints": endpoints,
        }))
        .unwrap()
    }

    #[test]
    fn test_endpoint_counts() {
        assert_eq!(endpoint_counts(&[slice(&[true, false]), slice(&[true])]), (2, 1));
        assert_eq!(endpoint_counts(&[]), (0, 0));
    }

    fn service(spec: serde_json::Value) -> Service {
        serde_json::from_value(json!({
            "metadata": {"name": "web", "namespace": "default"},
            "spec": spec
        }))
        .unwrap()
    }

    fn backing_pod(name: &str, ready: bool, ports: serde_json::Value) -> Pod {
        let condition = if ready { "True" } else { "False" };
        let state = if ready {
            json!({"running": {}})
        } else {
            json!({"waiting": {"reason": "CrashLoopBackOff"}})
        };
        serde_json::from_value(json!({
            "metadata": {"name": name, "namespace": "default", "labels": {"app": "web"}},
            "spec": {"containers": [{"name": "app", "image": "nginx:1.27", "ports": ports}]},
            "status": {
                "phase": "Running",
                "conditions": [{"type": "Ready", "status": condition}],
                "containerStatuses": [{
                    "name": "app", "image": "nginx:1.27", "imageID": "", "ready": ready,
                    "restartCount": 4,
                    "state": state
                }]
            }
        }))
        .unwrap()
    }

    fn subject(service: Service, pods: Vec<Pod>) -> ServiceInfo {
        ServiceInfo {
            target: Target::new(ResourceKind::Service, "default", "web"),
            primary: service,
            dependents: ServiceDependents {
                pods: Some(Dependent::Present(pods)),
                endpoint_slices: Some(Dependent::Present(vec![slice(&[true])])),
            },
            events: Dependent::Present(Vec::new()),
            logs: Default::default(),
            logs_requested: false,
            absences: Vec::new(),
        }
    }

    #[test]
    fn test_ports_named_and_numeric_targets() {
        use crate::diagnostics::types::CheckStatus;

        let svc = service(json!({
            "selector": {"app": "web"},
            "ports": [
                {"name": "http", "port": 80, "targetPort": "http"},
                {"name": "admin", "port": 9000, "targetPort": "admin"},
                {"name": "metrics", "port": 9100, "targetPort": 9100},
                {"name": "alt", "port": 8080}
            ]
        }));
        let pods = vec![backing_pod("web-0", true, json!([
            {"name": "http", "containerPort": 8080}
        ]))];
        let results = check_ports(&subject(svc, pods), &CheckConfig::default());
        let statuses: Vec<CheckStatus> = results.iter().map(|r| r.status).collect();
        assert_eq!(
            statuses,
            vec![
                CheckStatus::Passed,
                CheckStatus::Failed,
                CheckStatus::Warning,
                CheckStatus::Passed
            ]
        );
        assert_eq!(results[0].details.get("port"), Some("80"));
        assert_eq!(results[0].details.get("target_port"), Some("http"));
        assert_eq!(results[2].details.get("target_port"), Some("9100"));
        assert_eq!(results[3].details.get("target_port"), Some("8080"));
    }

    #[test]
    fn test_ports_edge_cases() {
        use crate::diagnostics::types::CheckStatus;

        let no_ports = service(json!({"selector": {"app": "web"}}));
        let results = check_ports(&subject(no_ports, Vec::new()), &CheckConfig::default());
        assert_eq!(results[0].status, CheckStatus::Failed);

        let no_pods = service(json!({"selector": {"app": "web"}, "ports": [{"port": 80}]}));
        let results = check_ports(&subject(no_pods, Vec::new()), &CheckConfig::default());
        assert_eq!(results[0].status, CheckStatus::Skipped);
    }

    #[test]
    fn test_pods_one_result_per_backing_pod() {
        use crate::diagnostics::types::CheckStatus;

        let svc = service(json!({"selector": {"app": "web"}, "ports": [{"port": 80}]}));
        let pods = vec![
            backing_pod("web-0", true, json!([])),
            backing_pod("web-1", false, json!([])),
        ];
        let results = check_pods(&subject(svc.clone(), pods), &CheckConfig::default());
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].status, CheckStatus::Passed);
        assert_eq!(results[1].status, CheckStatus::Failed);
        assert_eq!(results[1].details.get("reason"), Some("CrashLoopBackOff"));

        let results = check_pods(&subject(svc, Vec::new()), &CheckConfig::default());
        assert_eq!(results[0].status, CheckStatus::Skipped);
    }

    #[test]
    fn test_type_check() {
        use crate::diagnostics::types::CheckStatus;

        let pending_lb = service(json!({"type": "LoadBalancer", "ports": [{"port": 80}]}));
        let results = check_type(&subject(pending_lb, Vec::new()), &CheckConfig::default());
        assert_eq!(results[0].status, CheckStatus::Warning);
        assert_eq!(results[0].details.get("type"), Some("LoadBalancer"));

        let mut ready_lb = service(json!({"type": "LoadBalancer", "ports": [{"port": 80}]}));
        ready_lb.status = serde_json::from_value(json!({
            "loadBalancer": {"ingress": [{"ip": "203.0.113.10"}]}
        }))
        .unwrap();
        let results = check_type(&subject(ready_lb, Vec::new()), &CheckConfig::default());
        assert_eq!(results[0].status, CheckStatus::Passed);
        assert!(results[0].message.contains("203.0.113.10"));

        let external = service(json!({"type": "ExternalName", "externalName": "db.example.com"}));
        let results = check_type(&subject(external, Vec::new()), &CheckConfig::default());
        assert_eq!(results[0].status, CheckStatus::Passed);
        assert_eq!(results[0].details.get("type"), Some("ExternalName"));
    }

    #[test]
    fn test_service_type_defaults_to_cluster_ip() {
        let service: Service = serde_json::from_value(json!({
            "metadata": {"name": "web"},
            "spec": {"ports": [{"port": 80}]}
        }))
        .unwrap();
        assert_eq!(service_type(&service), "ClusterIP");
        assert!(selector(&service).is_none());
    }
}
