use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use kubediag::cluster::{FetchError, MemoryReader, WatchEvent};
use kubediag::diagnostics::{
    CheckConfig, CheckStatus, DiagnoseError, DiagnoseRequest, Engine, WatchError, WatchState,
};
use kubediag::domains::{IngressDomain, PodDomain, ServiceDomain};

/// End-to-end diagnosis scenarios against the in-memory reader.

const PENDING_POD: &str = r#"
apiVersion: v1
kind: Pod
metadata:
  name: api-0
  namespace: shop
spec:
  containers:
  - name: api
    image: registry.example.com/api:1.4.2
    resources:
      requests: {cpu: "8", memory: 1Gi}
      limits: {cpu: "8", memory: 1Gi}
status:
  phase: Pending
  conditions:
  - type: PodScheduled
    status: "False"
    reason: Unschedulable
    message: "0/3 nodes are available: 3 Insufficient cpu."
---
apiVersion: v1
kind: Event
metadata:
  name: api-0.17a1
  namespace: shop
involvedObject:
  kind: Pod
  name: api-0
  namespace: shop
reason: FailedScheduling
type: Warning
message: "0/3 nodes are available: 3 Insufficient cpu. preemption: 0/3 nodes are available."
"#;

const IMAGE_PULL_POD: &str = r#"
apiVersion: v1
kind: Pod
metadata:
  name: web-0
  namespace: default
spec:
  nodeName: worker-1
  containers:
  - name: web
    image: nginx:does-not-exist
status:
  phase: Pending
  containerStatuses:
  - name: web
    image: nginx:does-not-exist
    imageID: ""
    ready: false
    restartCount: 0
    state:
      waiting:
        reason: ErrImagePull
        message: "rpc error: code = NotFound desc = failed to pull and unpack image: manifest unknown"
---
apiVersion: v1
kind: Node
metadata:
  name: worker-1
status:
  conditions:
  - type: Ready
    status: "True"
"#;

fn engine_for<D: kubediag::diagnostics::Domain>(domain: D, reader: MemoryReader) -> Engine<D> {
    Engine::new(domain, Arc::new(reader))
}

fn running_pod(namespace: &str, name: &str, labels: &str) -> String {
    format!(
        r#"
apiVersion: v1
kind: Pod
metadata:
  name: {name}
  namespace: {namespace}
  labels: {labels}
spec:
  nodeName: worker-1
  containers:
  - name: app
    image: example/app:2.0
    ports:
    - containerPort: 8080
      name: http
    resources:
      requests: {{cpu: 100m, memory: 64Mi}}
      limits: {{cpu: 500m, memory: 128Mi}}
status:
  phase: Running
  podIP: 10.0.0.12
  conditions:
  - type: Ready
    status: "True"
  containerStatuses:
  - name: app
    image: example/app:2.0
    imageID: ""
    ready: true
    restartCount: 0
    state:
      running: {{}}
---
"#
    )
}

#[tokio::test]
async fn test_unschedulable_pod_reports_cpu_shortage() {
    let reader = MemoryReader::from_yaml(PENDING_POD).unwrap();
    let engine = engine_for(PodDomain, reader);

    let report = engine
        .diagnose(&DiagnoseRequest::new("shop", "api-0"))
        .await
        .unwrap();

    let scheduling = report.result("scheduling").unwrap();
    assert_eq!(scheduling.status, CheckStatus::Failed);
    let suggestion = scheduling.suggestion.as_deref().unwrap();
    assert!(suggestion.contains("CPU resource requests"), "{}", suggestion);

    assert_eq!(report.result("status").unwrap().status, CheckStatus::Failed);
    assert!(report.has_failures());
    assert_eq!(report.metadata["domain"], "pod");
    assert_eq!(
        report.metadata["checks_requested"],
        "status,scheduling,images,permissions,init-containers,resources,network"
    );
}

#[tokio::test]
async fn test_manifest_unknown_suggests_verifying_image() {
    let reader = MemoryReader::from_yaml(IMAGE_PULL_POD).unwrap();
    let engine = engine_for(PodDomain, reader);

    let report = engine
        .diagnose(&DiagnoseRequest::new("default", "web-0").with_checks(["images"]))
        .await
        .unwrap();

    assert_eq!(report.checks.len(), 1);
    let images = &report.checks[0];
    assert_eq!(images.status, CheckStatus::Failed);
    assert!(images
        .suggestion
        .as_deref()
        .unwrap()
        .contains("verify image name and tag"));
    assert_eq!(images.details.get("container"), Some("web"));
    assert!(images.error.as_deref().unwrap().contains("manifest unknown"));
}

#[tokio::test]
async fn test_benign_logs_pass() {
    let text: String = (1..=50)
        .map(|i| format!("GET /healthz 200 served in {}ms\n", i))
        .collect();
    let reader = MemoryReader::from_yaml(&running_pod("default", "web-0", "{app: web}"))
        .unwrap()
        .with_logs("default", "web-0", "app", &text);
    let engine = engine_for(PodDomain, reader);

    let report = engine
        .diagnose(
            &DiagnoseRequest::new("default", "web-0")
                .with_checks(["logs"])
                .with_logs(true),
        )
        .await
        .unwrap();

    let logs = report.result("logs").unwrap();
    assert_eq!(logs.status, CheckStatus::Passed);
    assert!(logs.message.contains("analyzed 50 log lines"));
    assert_eq!(logs.details.get("container"), Some("app"));
    assert_eq!(logs.details.get("analyzed"), Some("50 log lines"));
    assert_eq!(report.metadata["logs_captured"], "1");
}

#[tokio::test]
async fn test_crash_loop_uses_previous_logs() {
    let yaml = r#"
apiVersion: v1
kind: Pod
metadata:
  name: worker-0
  namespace: jobs
spec:
  nodeName: worker-1
  containers:
  - name: worker
    image: example/worker:3.1
status:
  phase: Running
  containerStatuses:
  - name: worker
    image: example/worker:3.1
    imageID: ""
    ready: false
    restartCount: 6
    state:
      waiting:
        reason: CrashLoopBackOff
    lastState:
      terminated:
        exitCode: 1
        reason: Error
"#;
    let reader = MemoryReader::from_yaml(yaml).unwrap().with_previous_logs(
        "jobs",
        "worker-0",
        "worker",
        "booting\nconnecting to db:5432\ndial tcp 10.0.0.9:5432: connect: connection refused\n",
    );
    let engine = engine_for(PodDomain, reader);

    let report = engine
        .diagnose(&DiagnoseRequest::new("jobs", "worker-0").with_logs(true))
        .await
        .unwrap();

    // The failing pod pulls the logs check into the default selection.
    let logs = report.result("logs").unwrap();
    assert_eq!(logs.status, CheckStatus::Failed);
    assert_eq!(logs.details.get("exit_code"), Some("1"));
    assert!(logs.details.get("last_lines").unwrap().contains("connection refused"));
    assert!(logs.message.contains("previous container instance"));
}

#[tokio::test]
async fn test_forbidden_dependent_is_not_fatal() {
    let yaml = r#"
apiVersion: v1
kind: Pod
metadata:
  name: web-0
  namespace: default
spec:
  nodeName: worker-1
  containers:
  - name: web
    image: nginx:1.27
    env:
    - name: DB_PASSWORD
      valueFrom:
        secretKeyRef: {name: db-creds, key: password}
status:
  phase: Running
"#;
    let reader = MemoryReader::from_yaml(yaml)
        .unwrap()
        .forbid("Secret", "*")
        .forbid("Node", "*");
    let engine = engine_for(PodDomain, reader);

    let report = engine
        .diagnose(&DiagnoseRequest::new("default", "web-0"))
        .await
        .unwrap();

    let permissions = report.result("permissions").unwrap();
    assert_eq!(permissions.status, CheckStatus::Warning);
    assert!(permissions.message.starts_with("Could not verify"));
    assert!(permissions.error.is_some());

    let absent = &report.metadata["absent_dependents"];
    assert!(absent.contains("secret/db-creds"));
    assert!(absent.contains("node/worker-1"));
}

#[tokio::test]
async fn test_missing_secret_fails_permissions() {
    let yaml = r#"
apiVersion: v1
kind: Pod
metadata:
  name: web-0
  namespace: default
spec:
  containers:
  - name: web
    image: nginx:1.27
    envFrom:
    - secretRef: {name: app-env}
status:
  phase: Pending
"#;
    let engine = engine_for(PodDomain, MemoryReader::from_yaml(yaml).unwrap());
    let report = engine
        .diagnose(&DiagnoseRequest::new("default", "web-0").with_checks(["permissions"]))
        .await
        .unwrap();

    let result = report.result("permissions").unwrap();
    assert_eq!(result.status, CheckStatus::Failed);
    assert!(result.message.contains("app-env"));
}

#[tokio::test]
async fn test_missing_primary_is_target_unreachable() {
    let engine = engine_for(PodDomain, MemoryReader::new());
    let err = engine
        .diagnose(&DiagnoseRequest::new("default", "ghost"))
        .await
        .unwrap_err();
    match err {
        DiagnoseError::TargetUnreachable { target, source } => {
            assert_eq!(target.name, "ghost");
            assert!(source.is_not_found());
        }
        other => panic!("unexpected error: {}", other),
    }
}

#[tokio::test]
async fn test_checks_are_pure_over_a_snapshot() {
    let reader = MemoryReader::from_yaml(PENDING_POD).unwrap();
    let engine = engine_for(PodDomain, reader);
    let request = DiagnoseRequest::new("shop", "api-0");
    let target = engine.target(&request);

    let subject = engine.gather(&target, &request).await.unwrap();
    let selection: Vec<String> = ["status", "scheduling", "resources", "volumes"]
        .iter()
        .map(|s| s.to_string())
        .collect();
    let first = engine.run(&subject, &selection);
    let second = engine.run(&subject, &selection);
    assert_eq!(first, second);
    assert!(!first.is_empty());
}

#[tokio::test]
async fn test_service_without_selector_never_passes_endpoints() {
    let yaml = r#"
apiVersion: v1
kind: Service
metadata:
  name: legacy
  namespace: default
spec:
  ports:
  - port: 80
    targetPort: 8080
"#;
    let engine = engine_for(ServiceDomain, MemoryReader::from_yaml(yaml).unwrap());
    let report = engine
        .diagnose(&DiagnoseRequest::new("default", "legacy"))
        .await
        .unwrap();

    let selector = report.result("selector").unwrap();
    assert_eq!(selector.status, CheckStatus::Warning);
    assert!(selector.message.contains("no selector"));

    let endpoints: Vec<_> = report.results_for("endpoints").collect();
    assert!(!endpoints.is_empty());
    assert!(endpoints.iter().all(|r| r.status != CheckStatus::Passed));
}

#[tokio::test]
async fn test_service_with_ready_backends_passes() {
    let mut yaml = running_pod("shop", "web-0", "{app: web}");
    yaml.push_str(
        r#"
apiVersion: v1
kind: Service
metadata:
  name: web
  namespace: shop
spec:
  selector: {app: web}
  ports:
  - port: 80
    targetPort: http
---
apiVersion: discovery.k8s.io/v1
kind: EndpointSlice
metadata:
  name: web-abc12
  namespace: shop
  labels:
    kubernetes.io/service-name: web
addressType: IPv4
endpoints:
- addresses: ["10.0.0.12"]
  conditions: {ready: true}
"#,
    );
    let engine = engine_for(ServiceDomain, MemoryReader::from_yaml(&yaml).unwrap());
    let report = engine
        .diagnose(&DiagnoseRequest::new("shop", "web"))
        .await
        .unwrap();

    assert_eq!(report.summary.failed, 0, "{:#?}", report.checks);
    let selector = report.result("selector").unwrap();
    assert_eq!(selector.status, CheckStatus::Passed);
    assert_eq!(selector.details.get("matched_pods"), Some("1"));
    assert_eq!(
        report.result("endpoints").unwrap().details.get("ready_endpoints"),
        Some("1")
    );
}

#[tokio::test]
async fn test_ingress_with_missing_backend() {
    let yaml = r#"
apiVersion: networking.k8s.io/v1
kind: Ingress
metadata:
  name: shop
  namespace: default
spec:
  ingressClassName: nginx
  rules:
  - host: shop.example.com
    http:
      paths:
      - path: /
        pathType: Prefix
        backend:
          service:
            name: storefront
            port: {number: 80}
---
apiVersion: networking.k8s.io/v1
kind: IngressClass
metadata:
  name: nginx
spec:
  controller: k8s.io/ingress-nginx
"#;
    let engine = engine_for(IngressDomain, MemoryReader::from_yaml(yaml).unwrap());
    let report = engine
        .diagnose(&DiagnoseRequest::new("default", "shop"))
        .await
        .unwrap();

    let backends = report.result("backends").unwrap();
    assert_eq!(backends.status, CheckStatus::Failed);
    assert_eq!(backends.details.get("missing"), Some("storefront"));

    let endpoints = report.result("endpoints").unwrap();
    assert_eq!(endpoints.status, CheckStatus::Failed);
    assert!(endpoints.message.contains("0 ready endpoints"));
    assert_eq!(endpoints.details.get("service"), Some("storefront"));

    let class = report.result("ingress-class").unwrap();
    assert_eq!(class.status, CheckStatus::Passed);
    assert_eq!(class.details.get("controller"), Some("k8s.io/ingress-nginx"));

    assert_eq!(report.result("tls").unwrap().status, CheckStatus::Skipped);
    assert_eq!(report.result("address").unwrap().status, CheckStatus::Warning);
}

#[tokio::test]
async fn test_ingress_tls_secret_validation() {
    let yaml = r#"
apiVersion: networking.k8s.io/v1
kind: Ingress
metadata:
  name: shop
  namespace: default
spec:
  tls:
  - hosts: [shop.example.com]
    secretName: shop-tls
  - hosts: [admin.example.com]
    secretName: admin-tls
  rules:
  - host: shop.example.com
---
apiVersion: v1
kind: Secret
metadata:
  name: shop-tls
  namespace: default
type: kubernetes.io/tls
data:
  tls.crt: Y2VydA==
  tls.key: a2V5
"#;
    let engine = engine_for(IngressDomain, MemoryReader::from_yaml(yaml).unwrap());
    let report = engine
        .diagnose(&DiagnoseRequest::new("default", "shop").with_checks(["tls"]))
        .await
        .unwrap();

    let tls: Vec<_> = report.results_for("tls").collect();
    assert_eq!(tls.len(), 2);
    assert_eq!(tls[0].status, CheckStatus::Passed);
    assert_eq!(tls[0].details.get("secret"), Some("shop-tls"));
    assert_eq!(tls[1].status, CheckStatus::Failed);
    assert_eq!(tls[1].details.get("secret"), Some("admin-tls"));
}

#[tokio::test]
async fn test_bulk_results_grouped_in_name_order() {
    let yaml: String = ["c-pod", "a-pod", "b-pod"]
        .iter()
        .map(|name| running_pod("team", name, "{app: x}"))
        .collect();
    let engine = engine_for(PodDomain, MemoryReader::from_yaml(&yaml).unwrap());

    let report = engine
        .diagnose_all(
            Some("team"),
            &DiagnoseRequest::default().with_checks(["status", "network"]),
            3,
        )
        .await
        .unwrap();

    let resources: Vec<&str> = report
        .checks
        .iter()
        .map(|r| r.details.get("resource").unwrap())
        .collect();
    assert_eq!(
        resources,
        vec!["team/a-pod", "team/a-pod", "team/b-pod", "team/b-pod", "team/c-pod", "team/c-pod"]
    );
    assert_eq!(report.metadata["resources"], "3");
    assert_eq!(report.target.name, "*");
    assert_eq!(report.summary.total, 6);
}

#[tokio::test]
async fn test_bulk_run_reports_ungatherable_resource() {
    let yaml: String = ["a-pod", "b-pod"]
        .iter()
        .map(|name| running_pod("team", name, "{app: x}"))
        .collect();
    let reader = MemoryReader::from_yaml(&yaml).unwrap().forbid("Pod", "b-pod");
    let engine = engine_for(PodDomain, reader);

    let report = engine
        .diagnose_all(Some("team"), &DiagnoseRequest::default().with_checks(["status"]), 2)
        .await
        .unwrap();

    assert_eq!(report.checks.len(), 2);
    let failed = &report.checks[1];
    assert_eq!(failed.name, "gather");
    assert_eq!(failed.status, CheckStatus::Failed);
    assert_eq!(failed.details.get("resource"), Some("team/b-pod"));
    assert!(failed.error.is_some());
    assert_eq!(report.checks[0].status, CheckStatus::Passed);
    assert_eq!(report.summary.failed, 1);
}

#[tokio::test]
async fn test_primary_past_deadline_is_fatal() {
    let reader = MemoryReader::from_yaml(PENDING_POD)
        .unwrap()
        .with_latency("Pod", Duration::from_secs(5));
    let engine = engine_for(PodDomain, reader);

    let err = engine
        .diagnose(
            &DiagnoseRequest::new("shop", "api-0").with_deadline(Some(Duration::from_millis(50))),
        )
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DiagnoseError::TargetUnreachable {
            source: FetchError::Timeout,
            ..
        }
    ));
}

#[tokio::test]
async fn test_dependent_past_deadline_is_absent() {
    let reader = MemoryReader::from_yaml(IMAGE_PULL_POD)
        .unwrap()
        .with_latency("Node", Duration::from_secs(5));
    let engine = engine_for(PodDomain, reader);

    let report = engine
        .diagnose(
            &DiagnoseRequest::new("default", "web-0")
                .with_checks(["node", "images"])
                .with_deadline(Some(Duration::from_millis(100))),
        )
        .await
        .unwrap();

    let node = report.result("node").unwrap();
    assert_eq!(node.status, CheckStatus::Warning);
    assert!(node.message.starts_with("Could not verify"));
    assert_eq!(report.result("images").unwrap().status, CheckStatus::Failed);
    let absent = &report.metadata["absent_dependents"];
    assert!(absent.contains("node/worker-1"));
    assert!(absent.contains("events"));
}

#[tokio::test]
async fn test_repeating_scheduling_event_survives_event_bound() {
    // Listed by name, so the long-repeating FailedScheduling event comes first.
    let mut yaml = PENDING_POD.replace(
        "reason: FailedScheduling",
        "reason: FailedScheduling\nfirstTimestamp: \"2024-05-01T09:00:00Z\"\nlastTimestamp: \"2024-05-01T12:00:00Z\"",
    );
    for (i, reason) in ["Pulling", "BackOff", "Failed"].iter().enumerate() {
        yaml.push_str(&format!(
            r#"---
apiVersion: v1
kind: Event
metadata:
  name: api-0.17b{i}
  namespace: shop
involvedObject:
  kind: Pod
  name: api-0
  namespace: shop
reason: {reason}
type: Normal
message: "unrelated"
lastTimestamp: "2024-05-01T10:0{i}:00Z"
"#
        ));
    }
    let config = CheckConfig {
        max_events: 2,
        ..CheckConfig::default()
    };
    let engine = engine_for(PodDomain, MemoryReader::from_yaml(&yaml).unwrap()).with_config(config);

    let report = engine
        .diagnose(&DiagnoseRequest::new("shop", "api-0").with_checks(["scheduling"]))
        .await
        .unwrap();

    let scheduling = report.result("scheduling").unwrap();
    assert_eq!(scheduling.status, CheckStatus::Failed);
    assert!(scheduling.message.contains("Insufficient cpu"));
}

#[tokio::test]
async fn test_watch_reports_until_deleted() {
    let reader = MemoryReader::from_yaml(&running_pod("default", "web-0", "{app: web}")).unwrap();
    let events = reader.watch_channel();
    events.send(Ok(WatchEvent::Added)).unwrap();
    events.send(Ok(WatchEvent::Modified)).unwrap();
    events.send(Ok(WatchEvent::Deleted)).unwrap();

    let engine = engine_for(PodDomain, reader);
    let reports: Vec<_> = engine
        .watch(DiagnoseRequest::new("default", "web-0"), CancellationToken::new())
        .into_stream()
        .collect()
        .await;

    assert_eq!(reports.len(), 2);
    assert!(reports.iter().all(|r| r.is_ok()));
}

#[tokio::test]
async fn test_watch_cancel_stops_without_report() {
    let reader = MemoryReader::from_yaml(&running_pod("default", "web-0", "{app: web}")).unwrap();
    let _events = reader.watch_channel();
    let engine = engine_for(PodDomain, reader);
    let cancel = CancellationToken::new();

    let mut controller = engine.watch(DiagnoseRequest::new("default", "web-0"), cancel.clone());
    let stopper = tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(20)).await;
        cancel.cancel();
    });

    assert!(controller.next_report().await.is_none());
    assert!(controller.state().is_terminated());
    stopper.await.unwrap();
}

#[tokio::test]
async fn test_watch_stream_error_surfaces_once() {
    let reader = MemoryReader::from_yaml(&running_pod("default", "web-0", "{app: web}")).unwrap();
    let events = reader.watch_channel();
    events.send(Ok(WatchEvent::Added)).unwrap();
    events
        .send(Err(FetchError::Api {
            code: 410,
            message: "too old resource version".to_string(),
        }))
        .unwrap();

    let engine = engine_for(PodDomain, reader);
    let mut controller = engine.watch(
        DiagnoseRequest::new("default", "web-0"),
        CancellationToken::new(),
    );

    assert!(controller.next_report().await.unwrap().is_ok());
    assert!(matches!(
        controller.next_report().await,
        Some(Err(WatchError::Stream { .. }))
    ));
    assert!(controller.next_report().await.is_none());
    assert!(matches!(controller.state(), WatchState::Terminated(_)));
}
