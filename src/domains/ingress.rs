//! Ingress route domain.
//!
//! Dependents: the ingress class, every backend service by name, endpoint
//! slices per backend service, and the TLS secrets. Detail labels: `class`,
//! `controller`, `service`, `missing`, `secret`, `hosts`, `address`, plus
//! `ready_endpoints` on endpoint results.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Secret, Service};
use k8s_openapi::api::discovery::v1::EndpointSlice;
use k8s_openapi::api::networking::v1::{Ingress, IngressBackend, IngressClass};

use crate::cluster::{ClusterReader, FetchResult};
use crate::diagnostics::config::CheckConfig;
use crate::diagnostics::context::{Absence, Dependent, SubjectInfo};
use crate::diagnostics::engine::Domain;
use crate::diagnostics::gather::DependentFetcher;
use crate::diagnostics::registry::CheckRegistry;
use crate::diagnostics::suggest;
use crate::diagnostics::types::{CheckResult, ResourceKind, Target};
use crate::domains::absent_result;
use crate::domains::service::{endpoint_counts, ports as service_ports};

pub const DEFAULT_CHECKS: &[&str] = &[
    "ingress-class",
    "rules",
    "backends",
    "endpoints",
    "tls",
    "address",
];

/// Annotation used before `spec.ingressClassName` existed.
const LEGACY_CLASS_ANNOTATION: &str = "kubernetes.io/ingress.class";
const TLS_SECRET_TYPE: &str = "kubernetes.io/tls";
const TLS_KEYS: &[&str] = &["tls.crt", "tls.key"];

/// Port a backend addresses on its service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PortRef {
    Number(i32),
    Name(String),
}

impl std::fmt::Display for PortRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{}", n),
            Self::Name(name) => write!(f, "{}", name),
        }
    }
}

/// A service backend referenced by the ingress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackendRef {
    pub service: String,
    pub port: Option<PortRef>,
}

#[derive(Debug, Clone, Default)]
pub struct IngressDependents {
    pub class_name: Option<String>,
    /// `None` when the ingress names no class.
    pub class: Option<Dependent<IngressClass>>,
    /// Backends in encounter order, default backend first.
    pub backends: Vec<BackendRef>,
    /// One entry per distinct backend service name.
    pub services: Vec<(String, Dependent<Service>)>,
    pub endpoints: Vec<(String, Dependent<Vec<EndpointSlice>>)>,
    pub tls_secrets: Vec<(String, Dependent<Secret>)>,
}

impl IngressDependents {
    fn service(&self, name: &str) -> Option<&Dependent<Service>> {
        self.services
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, s)| s)
    }
}

pub type IngressInfo = SubjectInfo<IngressDomain>;

#[derive(Debug, Clone, Copy, Default)]
pub struct IngressDomain;

pub fn class_name(ingress: &Ingress) -> Option<&str> {
    ingress
        .spec
        .as_ref()
        .and_then(|s| s.ingress_class_name.as_deref())
        .or_else(|| {
            ingress
                .metadata
                .annotations
                .as_ref()
                .and_then(|a| a.get(LEGACY_CLASS_ANNOTATION))
                .map(String::as_str)
        })
        .filter(|c| !c.is_empty())
}

fn backend_ref(backend: &IngressBackend) -> Option<BackendRef> {
    let service = backend.service.as_ref()?;
    let port = service.port.as_ref().and_then(|p| {
        p.number
            .map(PortRef::Number)
            .or_else(|| p.name.clone().filter(|n| !n.is_empty()).map(PortRef::Name))
    });
    Some(BackendRef {
        service: service.name.clone(),
        port,
    })
}

/// Every service backend, default backend first, duplicates removed.
pub fn backends(ingress: &Ingress) -> Vec<BackendRef> {
    let Some(spec) = ingress.spec.as_ref() else {
        return Vec::new();
    };
    let mut refs: Vec<BackendRef> = Vec::new();
    let paths = spec
        .rules
        .iter()
        .flatten()
        .filter_map(|rule| rule.http.as_ref())
        .flat_map(|http| http.paths.iter().map(|p| &p.backend));
    for backend in spec.default_backend.iter().chain(paths) {
        if let Some(r) = backend_ref(backend)
            && !refs.contains(&r)
        {
            refs.push(r);
        }
    }
    refs
}

/// Hosts named by rules, in order.
pub fn rule_hosts(ingress: &Ingress) -> Vec<&str> {
    ingress
        .spec
        .as_ref()
        .and_then(|s| s.rules.as_ref())
        .into_iter()
        .flatten()
        .filter_map(|r| r.host.as_deref())
        .filter(|h| !h.is_empty())
        .collect()
}

fn service_names(backends: &[BackendRef]) -> Vec<String> {
    let mut names: Vec<String> = Vec::new();
    for backend in backends {
        if !names.contains(&backend.service) {
            names.push(backend.service.clone());
        }
    }
    names
}

/// Whether `pattern` (possibly `*.example.com`) covers `host`.
fn host_matches(pattern: &str, host: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(suffix) => host
            .split_once('.')
            .is_some_and(|(_, rest)| rest == suffix),
        None => pattern == host,
    }
}

fn default_selection(_subject: &IngressInfo) -> Vec<&'static str> {
    DEFAULT_CHECKS.to_vec()
}

#[async_trait]
impl Domain for IngressDomain {
    type Primary = Ingress;
    type Dependents = IngressDependents;

    fn kind(&self) -> ResourceKind {
        ResourceKind::Ingress
    }

    async fn fetch_primary(
        &self,
        reader: &dyn ClusterReader,
        namespace: &str,
        name: &str,
    ) -> FetchResult<Ingress> {
        reader.get_ingress(namespace, name).await
    }

    async fn list_primaries(
        &self,
        reader: &dyn ClusterReader,
        namespace: Option<&str>,
    ) -> FetchResult<Vec<Target>> {
        let ingresses = reader.list_ingresses(namespace).await?;
        Ok(ingresses
            .iter()
            .filter_map(|ing| {
                let name = ing.metadata.name.as_deref()?;
                let ns = ing
                    .metadata
                    .namespace
                    .as_deref()
                    .or(namespace)
                    .unwrap_or("default");
                Some(Target::new(ResourceKind::Ingress, ns, name))
            })
            .collect())
    }

    async fn fetch_dependents(
        &self,
        reader: &dyn ClusterReader,
        target: &Target,
        ingress: &Ingress,
        fetcher: &mut DependentFetcher,
    ) -> IngressDependents {
        let ns = target.namespace.as_str();
        let class_name = class_name(ingress).map(str::to_string);

        let class = match class_name.as_deref() {
            Some(class) => Some(
                fetcher
                    .fetch(
                        format!("ingressclass/{}", class),
                        reader.get_ingress_class(class),
                    )
                    .await,
            ),
            None => None,
        };

        let backends = backends(ingress);
        let mut services = Vec::new();
        let mut endpoints = Vec::new();
        for name in service_names(&backends) {
            let service = fetcher
                .fetch(format!("service/{}", name), reader.get_service(ns, &name))
                .await;
            let slices = fetcher
                .fetch(
                    format!("endpointslices/{}", name),
                    reader.list_endpoint_slices(ns, &name),
                )
                .await;
            services.push((name.clone(), service));
            endpoints.push((name, slices));
        }

        let mut tls_secrets: Vec<(String, Dependent<Secret>)> = Vec::new();
        let secret_names = ingress
            .spec
            .as_ref()
            .and_then(|s| s.tls.as_ref())
            .into_iter()
            .flatten()
            .filter_map(|tls| tls.secret_name.as_deref())
            .filter(|n| !n.is_empty());
        for name in secret_names {
            if tls_secrets.iter().any(|(n, _)| n == name) {
                continue;
            }
            let secret = fetcher
                .fetch(format!("secret/{}", name), reader.get_secret(ns, name))
                .await;
            tls_secrets.push((name.to_string(), secret));
        }

        IngressDependents {
            class_name,
            class,
            backends,
            services,
            endpoints,
            tls_secrets,
        }
    }

    fn catalog(&self) -> CheckRegistry<Self> {
        CheckRegistry::new(default_selection)
            .register_fn(
                "ingress-class",
                "Ingress class exists and names a controller",
                check_ingress_class,
            )
            .register_fn("rules", "Rules or a default backend are defined", check_rules)
            .register_fn(
                "backends",
                "Backend services exist and expose the referenced ports",
                check_backends,
            )
            .register_fn(
                "endpoints",
                "Each backend service has ready endpoints",
                check_endpoints,
            )
            .register_fn("tls", "TLS secrets exist, are valid and cover the hosts", check_tls)
            .register_fn("address", "Load balancer address is assigned", check_address)
    }
}

fn check_ingress_class(subject: &IngressInfo, _config: &CheckConfig) -> Vec<CheckResult> {
    let deps = &subject.dependents;
    let (Some(name), Some(class)) = (deps.class_name.as_deref(), deps.class.as_ref()) else {
        return vec![
            CheckResult::warning("ingress-class", "Ingress names no ingress class")
                .with_suggestion(
                    "Set spec.ingressClassName; without it only a controller with a default IngressClass picks the ingress up",
                ),
        ];
    };

    let mut result = match class {
        Dependent::Absent(absence) => {
            absent_result("ingress-class", "IngressClass", name, absence, false)
        }
        Dependent::Present(class) => {
            let controller = class
                .spec
                .as_ref()
                .and_then(|s| s.controller.as_deref())
                .unwrap_or("<unset>");
            CheckResult::passed(
                "ingress-class",
                format!("IngressClass {} is handled by {}", name, controller),
            )
            .with_detail("controller", controller)
        }
    };
    result.details.prepend("class", name);
    vec![result]
}

fn check_rules(subject: &IngressInfo, _config: &CheckConfig) -> Vec<CheckResult> {
    let ingress = &subject.primary;
    let spec = ingress.spec.as_ref();
    let rules = spec.and_then(|s| s.rules.as_deref()).unwrap_or_default();
    let has_default = spec.is_some_and(|s| s.default_backend.is_some());

    if rules.is_empty() && !has_default {
        return vec![
            CheckResult::failed("rules", "Ingress has no rules and no default backend")
                .with_suggestion("Add rules or a defaultBackend; the controller has nothing to route"),
        ];
    }

    let hosts = rule_hosts(ingress).join(",");
    let hostless = rules
        .iter()
        .filter(|r| r.host.as_deref().is_none_or(str::is_empty))
        .count();
    let result = if hostless > 0 {
        CheckResult::warning(
            "rules",
            format!("{} of {} rules have no host and match every hostname", hostless, rules.len()),
        )
        .with_suggestion("Set a host on each rule unless a catch-all route is intended")
    } else if rules.is_empty() {
        CheckResult::passed("rules", "Ingress routes all traffic to its default backend")
    } else {
        CheckResult::passed("rules", format!("Ingress defines {} rules", rules.len()))
    };
    vec![result.with_detail("hosts", hosts)]
}

fn service_exposes(service: &Service, port: &PortRef) -> bool {
    let ports = service_ports(service);
    match port {
        PortRef::Number(n) => ports.iter().any(|p| p.port == *n),
        PortRef::Name(name) => ports.iter().any(|p| p.name.as_deref() == Some(name.as_str())),
    }
}

fn check_backends(subject: &IngressInfo, _config: &CheckConfig) -> Vec<CheckResult> {
    let deps = &subject.dependents;
    if deps.backends.is_empty() {
        return vec![CheckResult::skipped("backends", "Ingress has no service backends")];
    }

    let missing: Vec<&str> = deps
        .services
        .iter()
        .filter(|(_, s)| s.absence().is_some_and(Absence::is_not_found))
        .map(|(n, _)| n.as_str())
        .collect();
    if !missing.is_empty() {
        return vec![
            CheckResult::failed(
                "backends",
                format!("Backend services not found: {}", missing.join(", ")),
            )
            .with_suggestion("Create the missing Services or fix the backend service names")
            .with_detail("missing", missing.join(",")),
        ];
    }

    for backend in &deps.backends {
        let (Some(port), Some(Dependent::Present(service))) =
            (backend.port.as_ref(), deps.service(&backend.service))
        else {
            continue;
        };
        if !service_exposes(service, port) {
            return vec![
                CheckResult::failed(
                    "backends",
                    format!("Service {} does not expose port {}", backend.service, port),
                )
                .with_suggestion("Point the backend at a port the Service exposes")
                .with_detail("service", &backend.service),
            ];
        }
    }

    let unverified: Vec<(&str, &Absence)> = deps
        .services
        .iter()
        .filter_map(|(n, s)| s.absence().map(|a| (n.as_str(), a)))
        .collect();
    if let Some((name, absence)) = unverified.first() {
        let names: Vec<&str> = unverified.iter().map(|(n, _)| *n).collect();
        let mut result = CheckResult::warning(
            "backends",
            format!("Could not verify backend services: {} ({})", names.join(", "), absence),
        )
        .with_suggestion(suggest::absence("Service", name, absence))
        .with_detail("service", names.join(","));
        if let Some(raw) = absence.raw_error() {
            result = result.with_error(raw);
        }
        return vec![result];
    }

    let names = service_names(&deps.backends);
    vec![
        CheckResult::passed(
            "backends",
            format!("All {} backend services exist", names.len()),
        )
        .with_detail("service", names.join(",")),
    ]
}

fn check_endpoints(subject: &IngressInfo, _config: &CheckConfig) -> Vec<CheckResult> {
    let deps = &subject.dependents;
    if deps.endpoints.is_empty() {
        return vec![CheckResult::skipped("endpoints", "Ingress has no service backends")];
    }

    deps.endpoints
        .iter()
        .map(|(name, slices)| {
            let service_missing = deps
                .service(name)
                .and_then(Dependent::absence)
                .is_some_and(Absence::is_not_found);
            let mut result = match slices {
                Dependent::Absent(absence) if !service_missing => {
                    let result = CheckResult::warning(
                        "endpoints",
                        format!("Could not verify endpoints of {}: {}", name, absence),
                    )
                    .with_suggestion(suggest::absence("EndpointSlices of service", name, absence));
                    match absence.raw_error() {
                        Some(raw) => result.with_error(raw),
                        None => result,
                    }
                }
                _ => {
                    let ready = slices.present().map(|s| endpoint_counts(s).0).unwrap_or(0);
                    let result = if ready == 0 {
                        CheckResult::failed(
                            "endpoints",
                            format!("Backend service {} has 0 ready endpoints", name),
                        )
                        .with_suggestion(if service_missing {
                            format!("Service {} does not exist; create it or fix the backend name", name)
                        } else {
                            format!(
                                "No ready pod backs service {}; run `kubediag service {}`",
                                name, name
                            )
                        })
                    } else {
                        CheckResult::passed(
                            "endpoints",
                            format!("Backend service {} has {} ready endpoints", name, ready),
                        )
                    };
                    result.with_detail("ready_endpoints", ready.to_string())
                }
            };
            result.details.prepend("service", name.as_str());
            result
        })
        .collect()
}

fn check_tls(subject: &IngressInfo, _config: &CheckConfig) -> Vec<CheckResult> {
    let ingress = &subject.primary;
    let entries = ingress
        .spec
        .as_ref()
        .and_then(|s| s.tls.as_deref())
        .unwrap_or_default();
    if entries.is_empty() {
        return vec![CheckResult::skipped("tls", "Ingress has no TLS configuration")];
    }
    let rule_hosts = rule_hosts(ingress);

    entries
        .iter()
        .map(|entry| {
            let hosts: Vec<&str> = entry.hosts.iter().flatten().map(String::as_str).collect();
            let Some(secret_name) = entry.secret_name.as_deref().filter(|n| !n.is_empty()) else {
                return CheckResult::warning(
                    "tls",
                    "TLS entry has no secretName and relies on the controller's default certificate",
                )
                .with_suggestion("Set secretName unless the controller default certificate is intended")
                .with_detail("hosts", hosts.join(","));
            };

            let secret = subject
                .dependents
                .tls_secrets
                .iter()
                .find(|(n, _)| n == secret_name)
                .map(|(_, s)| s);
            let mut result = match secret {
                None => CheckResult::warning(
                    "tls",
                    format!("TLS secret {} was not fetched", secret_name),
                )
                .with_suggestion("Re-run the diagnosis"),
                Some(Dependent::Absent(absence)) => {
                    absent_result("tls", "Secret", secret_name, absence, false)
                }
                Some(Dependent::Present(secret)) => {
                    let type_ = secret.type_.as_deref().unwrap_or("Opaque");
                    let has_key = |key: &str| {
                        secret.data.as_ref().is_some_and(|d| d.contains_key(key))
                            || secret.string_data.as_ref().is_some_and(|d| d.contains_key(key))
                    };
                    let missing: Vec<&str> =
                        TLS_KEYS.iter().copied().filter(|k| !has_key(k)).collect();
                    let uncovered: Vec<&str> = hosts
                        .iter()
                        .copied()
                        .filter(|h| !rule_hosts.iter().any(|r| host_matches(h, r) || host_matches(r, h)))
                        .collect();

                    if type_ != TLS_SECRET_TYPE || !missing.is_empty() {
                        let mut problems = Vec::new();
                        if type_ != TLS_SECRET_TYPE {
                            problems.push(format!("type {}", type_));
                        }
                        if !missing.is_empty() {
                            problems.push(format!("missing {}", missing.join(", ")));
                        }
                        CheckResult::failed(
                            "tls",
                            format!(
                                "Secret {} is not a valid TLS secret ({})",
                                secret_name,
                                problems.join("; ")
                            ),
                        )
                        .with_suggestion(format!(
                            "Recreate it with `kubectl create secret tls {} --cert=... --key=...`",
                            secret_name
                        ))
                    } else if !uncovered.is_empty() {
                        CheckResult::warning(
                            "tls",
                            format!("TLS hosts not routed by any rule: {}", uncovered.join(", ")),
                        )
                        .with_suggestion("Add rules for these hosts or drop them from the TLS entry")
                    } else {
                        CheckResult::passed(
                            "tls",
                            format!("TLS secret {} is valid", secret_name),
                        )
                    }
                }
            };
            result.details.prepend("secret", secret_name);
            result.with_detail("hosts", hosts.join(","))
        })
        .collect()
}

fn check_address(subject: &IngressInfo, _config: &CheckConfig) -> Vec<CheckResult> {
    let addresses: Vec<&str> = subject
        .primary
        .status
        .as_ref()
        .and_then(|s| s.load_balancer.as_ref())
        .and_then(|lb| lb.ingress.as_ref())
        .into_iter()
        .flatten()
        .filter_map(|i| i.ip.as_deref().or(i.hostname.as_deref()))
        .collect();

    let result = if addresses.is_empty() {
        CheckResult::warning("address", "Ingress has no load-balancer address yet").with_suggestion(
            "Check that the ingress controller is running and has admitted this ingress",
        )
    } else {
        CheckResult::passed(
            "address",
            format!("Ingress is reachable at {}", addresses.join(", ")),
        )
        .with_detail("address", addresses.join(","))
    };
    vec![result]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostics::types::CheckStatus;
    use serde_json::json;

    fn ingress(value: serde_json::Value) -> Ingress {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_backends_dedup_default_first() {
        let ing = ingress(json!({
            "metadata": {"name": "shop", "namespace": "default"},
            "spec": {
                "defaultBackend": {"service": {"name": "fallback", "port": {"number": 80}}},
                "rules": [
                    {"host": "shop.example.com", "http": {"paths": [
                        {"path": "/", "pathType": "Prefix", "backend": {"service": {"name": "web", "port": {"name": "http"}}}},
                        {"path": "/api", "pathType": "Prefix", "backend": {"service": {"name": "web", "port": {"name": "http"}}}}
                    ]}}
                ]
            }
        }));
        let refs = backends(&ing);
        assert_eq!(refs.len(), 2);
        assert_eq!(refs[0].service, "fallback");
        assert_eq!(refs[0].port, Some(PortRef::Number(80)));
        assert_eq!(refs[1].port, Some(PortRef::Name("http".into())));
        assert_eq!(rule_hosts(&ing), vec!["shop.example.com"]);
    }

    fn subject(ing: Ingress, services: Vec<(&str, Dependent<Service>)>) -> IngressInfo {
        let class_name = class_name(&ing).map(str::to_string);
        IngressInfo {
            target: Target::new(ResourceKind::Ingress, "default", "shop"),
            dependents: IngressDependents {
                class: class_name.as_ref().map(|_| Dependent::Absent(Absence::NotFound)),
                class_name,
                backends: backends(&ing),
                services: services
                    .into_iter()
                    .map(|(name, service)| (name.to_string(), service))
                    .collect(),
                ..Default::default()
            },
            primary: ing,
            events: Dependent::Present(Vec::new()),
            logs: Default::default(),
            logs_requested: false,
            absences: Vec::new(),
        }
    }

    fn web_service() -> Service {
        serde_json::from_value(json!({
            "metadata": {"name": "web", "namespace": "default"},
            "spec": {"ports": [{"name": "http", "port": 80}]}
        }))
        .unwrap()
    }

    fn routed(host: Option<&str>, port: serde_json::Value) -> Ingress {
        ingress(json!({
            "metadata": {"name": "shop", "namespace": "default"},
            "spec": {
                "ingressClassName": "nginx",
                "rules": [{"host": host, "http": {"paths": [
                    {"path": "/", "pathType": "Prefix", "backend": {"service": {"name": "web", "port": port}}}
                ]}}]
            }
        }))
    }

    #[test]
    fn test_rules() {
        let config = CheckConfig::default();
        let empty = ingress(json!({"metadata": {"name": "shop"}, "spec": {}}));
        let results = check_rules(&subject(empty, Vec::new()), &config);
        assert_eq!(results[0].status, CheckStatus::Failed);

        let hostless = routed(None, json!({"number": 80}));
        let results = check_rules(&subject(hostless, Vec::new()), &config);
        assert_eq!(results[0].status, CheckStatus::Warning);

        let hosted = routed(Some("shop.example.com"), json!({"number": 80}));
        let results = check_rules(&subject(hosted, Vec::new()), &config);
        assert_eq!(results[0].status, CheckStatus::Passed);
        assert_eq!(results[0].details.get("hosts"), Some("shop.example.com"));
    }

    #[test]
    fn test_backend_port_not_exposed() {
        let config = CheckConfig::default();
        let wrong_port = routed(Some("shop.example.com"), json!({"number": 8080}));
        let results = check_backends(
            &subject(wrong_port, vec![("web", Dependent::Present(web_service()))]),
            &config,
        );
        assert_eq!(results[0].status, CheckStatus::Failed);
        assert_eq!(results[0].details.get("service"), Some("web"));

        let named = routed(Some("shop.example.com"), json!({"name": "http"}));
        let results = check_backends(
            &subject(named, vec![("web", Dependent::Present(web_service()))]),
            &config,
        );
        assert_eq!(results[0].status, CheckStatus::Passed);

        let denied = routed(Some("shop.example.com"), json!({"number": 80}));
        let results = check_backends(
            &subject(
                denied,
                vec![("web", Dependent::Absent(Absence::Forbidden("denied".to_string())))],
            ),
            &config,
        );
        assert_eq!(results[0].status, CheckStatus::Warning);
    }

    #[test]
    fn test_class_detail_and_address() {
        let config = CheckConfig::default();
        let mut ing = routed(Some("shop.example.com"), json!({"number": 80}));
        let results = check_ingress_class(&subject(ing.clone(), Vec::new()), &config);
        assert_eq!(results[0].status, CheckStatus::Failed);
        assert_eq!(results[0].details.get("class"), Some("nginx"));

        let results = check_address(&subject(ing.clone(), Vec::new()), &config);
        assert_eq!(results[0].status, CheckStatus::Warning);

        ing.status = serde_json::from_value(json!({
            "loadBalancer": {"ingress": [{"hostname": "lb.example.com"}]}
        }))
        .unwrap();
        let results = check_address(&subject(ing, Vec::new()), &config);
        assert_eq!(results[0].status, CheckStatus::Passed);
        assert_eq!(results[0].details.get("address"), Some("lb.example.com"));
    }

    #[test]
    fn test_legacy_class_annotation() {
        let ing = ingress(json!({
            "metadata": {"name": "old", "annotations": {"kubernetes.io/ingress.class": "nginx"}},
            "spec": {}
        }));
        assert_eq!(class_name(&ing), Some("nginx"));
    }

    #[test]
    fn test_wildcard_host_match() {
        assert!(host_matches("*.example.com", "shop.example.com"));
        assert!(!host_matches("*.example.com", "a.b.example.com"));
        assert!(host_matches("shop.example.com", "shop.example.com"));
    }
}
