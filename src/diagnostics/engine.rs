//! Generic diagnostic engine.
//!
//! One [`Engine`] drives Gather → Run → Summarize for any [`Domain`]. A domain
//! supplies how to fetch its primary and dependents plus its check catalog;
//! the control flow is shared.

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cluster::{ClusterReader, FetchError, FetchResult};
use crate::diagnostics::aggregate;
use crate::diagnostics::config::CheckConfig;
use crate::diagnostics::context::{CapturedLogs, Dependent, SubjectInfo};
use crate::diagnostics::gather::{self, DependentFetcher, GatherOptions, LogCapture};
use crate::diagnostics::registry::CheckRegistry;
use crate::diagnostics::suggest;
use crate::diagnostics::types::{CheckResult, DiagnosticReport, ResourceKind, Target};
use crate::diagnostics::watch::WatchController;

/// Name of the result a bulk run emits for a resource it could not gather.
pub const GATHER_CHECK: &str = "gather";

/// Per-domain capability set the engine is instantiated with.
#[async_trait]
pub trait Domain: Sized + Send + Sync + 'static {
    type Primary: Send + Sync;
    type Dependents: Send + Sync;

    fn kind(&self) -> ResourceKind;

    /// Fetch the primary object. Failure aborts the run.
    async fn fetch_primary(
        &self,
        reader: &dyn ClusterReader,
        namespace: &str,
        name: &str,
    ) -> FetchResult<Self::Primary>;

    /// Enumerate primaries for a bulk run. `None` means all namespaces.
    async fn list_primaries(
        &self,
        reader: &dyn ClusterReader,
        namespace: Option<&str>,
    ) -> FetchResult<Vec<Target>>;

    /// Fetch dependents best-effort, recording every absence on `fetcher`.
    async fn fetch_dependents(
        &self,
        reader: &dyn ClusterReader,
        target: &Target,
        primary: &Self::Primary,
        fetcher: &mut DependentFetcher,
    ) -> Self::Dependents;

    /// Whether the primary looks unhealthy enough to capture logs.
    fn is_failing(&self, _primary: &Self::Primary) -> bool {
        false
    }

    /// Capture logs keyed by sub-component. Domains without logs keep the default.
    async fn capture_logs(
        &self,
        _reader: &dyn ClusterReader,
        _target: &Target,
        _primary: &Self::Primary,
        _tail_lines: Option<i64>,
        _fetcher: &mut DependentFetcher,
    ) -> BTreeMap<String, Dependent<CapturedLogs>> {
        BTreeMap::new()
    }

    /// Build the check catalog with its default-selection rule.
    fn catalog(&self) -> CheckRegistry<Self>;
}

/// Errors that abort a diagnosis.
#[derive(Debug, thiserror::Error)]
pub enum DiagnoseError {
    /// The primary could not be fetched; no report is produced.
    #[error("target {target} unreachable: {source}")]
    TargetUnreachable {
        target: Target,
        #[source]
        source: FetchError,
    },

    #[error("failed to list {kind} resources: {source}")]
    Listing {
        kind: ResourceKind,
        #[source]
        source: FetchError,
    },
}

/// What to diagnose and how.
#[derive(Debug, Clone, Default)]
pub struct DiagnoseRequest {
    pub namespace: String,
    pub name: String,
    /// Explicit check names. Empty selects the domain defaults.
    pub checks: Vec<String>,
    pub capture_logs: bool,
    pub tail_lines: Option<i64>,
    /// Bound on the whole gather pass.
    pub deadline: Option<Duration>,
}

impl DiagnoseRequest {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
            tail_lines: Some(100),
            ..Default::default()
        }
    }

    pub fn with_checks<I, S>(mut self, checks: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.checks = checks.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_logs(mut self, capture: bool) -> Self {
        self.capture_logs = capture;
        self
    }

    pub fn with_tail_lines(mut self, tail_lines: Option<i64>) -> Self {
        self.tail_lines = tail_lines;
        self
    }

    pub fn with_deadline(mut self, deadline: Option<Duration>) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Shared Gather → Run → Summarize control flow for one domain.
pub struct Engine<D: Domain> {
    domain: Arc<D>,
    reader: Arc<dyn ClusterReader>,
    registry: Arc<CheckRegistry<D>>,
    config: CheckConfig,
}

impl<D: Domain> Clone for Engine<D> {
    fn clone(&self) -> Self {
        Self {
            domain: Arc::clone(&self.domain),
            reader: Arc::clone(&self.reader),
            registry: Arc::clone(&self.registry),
            config: self.config.clone(),
        }
    }
}

impl<D: Domain> Engine<D> {
    /// Engine over the domain's own catalog.
    pub fn new(domain: D, reader: Arc<dyn ClusterReader>) -> Self {
        let registry = Arc::new(domain.catalog());
        Self {
            domain: Arc::new(domain),
            reader,
            registry,
            config: CheckConfig::default(),
        }
    }

    /// Replace the catalog, e.g. with a test double.
    pub fn with_registry(mut self, registry: CheckRegistry<D>) -> Self {
        self.registry = Arc::new(registry);
        self
    }

    pub fn with_config(mut self, config: CheckConfig) -> Self {
        self.config = config;
        self
    }

    pub fn kind(&self) -> ResourceKind {
        self.domain.kind()
    }

    pub fn registry(&self) -> &CheckRegistry<D> {
        &self.registry
    }

    pub fn config(&self) -> &CheckConfig {
        &self.config
    }

    pub fn reader(&self) -> &dyn ClusterReader {
        self.reader.as_ref()
    }

    pub fn target(&self, request: &DiagnoseRequest) -> Target {
        Target::new(self.kind(), &request.namespace, &request.name)
    }

    fn gather_options(&self, request: &DiagnoseRequest) -> GatherOptions {
        let logs = if !request.capture_logs {
            LogCapture::Off
        } else if request.checks.is_empty() {
            LogCapture::IfFailing
        } else if request.checks.iter().any(|c| c == crate::diagnostics::logs::LOGS_CHECK) {
            LogCapture::Always
        } else {
            LogCapture::Off
        };
        GatherOptions {
            logs,
            tail_lines: request.tail_lines,
            deadline: request.deadline,
            max_events: self.config.max_events,
        }
    }

    /// Gather a snapshot of `target`.
    pub async fn gather(
        &self,
        target: &Target,
        request: &DiagnoseRequest,
    ) -> FetchResult<SubjectInfo<D>> {
        gather::gather(
            self.domain.as_ref(),
            self.reader.as_ref(),
            target,
            &self.gather_options(request),
        )
        .await
    }

    /// Run the selected checks against a snapshot.
    pub fn run(&self, subject: &SubjectInfo<D>, selection: &[String]) -> Vec<CheckResult> {
        self.registry.run(subject, selection, &self.config)
    }

    /// One full cycle for `target`. The snapshot is dropped before returning.
    pub(crate) async fn evaluate(
        &self,
        target: &Target,
        request: &DiagnoseRequest,
    ) -> FetchResult<DiagnosticReport> {
        let subject = self.gather(target, request).await?;
        let selection = self.registry.resolve(&subject, &request.checks);
        let results = self.registry.run(&subject, &selection, &self.config);
        let metadata = self.metadata(&subject, &selection);
        Ok(aggregate::build_report(target.clone(), results, metadata))
    }

    fn metadata(&self, subject: &SubjectInfo<D>, selection: &[String]) -> BTreeMap<String, String> {
        let mut metadata = BTreeMap::new();
        metadata.insert("domain".to_string(), self.kind().to_string());
        metadata.insert("namespace".to_string(), subject.target.namespace.clone());
        metadata.insert("checks_requested".to_string(), selection.join(","));
        let captured = subject.logs.values().filter(|l| l.is_present()).count();
        metadata.insert("logs_captured".to_string(), captured.to_string());
        if !subject.absences.is_empty() {
            metadata.insert(
                "absent_dependents".to_string(),
                subject
                    .absences
                    .iter()
                    .map(|(label, _)| label.as_str())
                    .collect::<Vec<_>>()
                    .join(","),
            );
        }
        metadata
    }

    /// Diagnose the resource named by the request.
    pub async fn diagnose(&self, request: &DiagnoseRequest) -> Result<DiagnosticReport, DiagnoseError> {
        let target = self.target(request);
        log::info!("diagnosing {}", target);
        self.evaluate(&target, request)
            .await
            .map_err(|source| DiagnoseError::TargetUnreachable { target, source })
    }

    /// Diagnose every resource of this kind in `namespace` (all when `None`).
    ///
    /// Resources are evaluated independently with at most `concurrency` in
    /// flight and folded into one combined report.
    pub async fn diagnose_all(
        &self,
        namespace: Option<&str>,
        request: &DiagnoseRequest,
        concurrency: usize,
    ) -> Result<DiagnosticReport, DiagnoseError> {
        let kind = self.kind();
        let targets = self
            .domain
            .list_primaries(self.reader.as_ref(), namespace)
            .await
            .map_err(|source| DiagnoseError::Listing { kind, source })?;
        log::info!(
            "diagnosing {} {} resource(s) with concurrency {}",
            targets.len(),
            kind,
            concurrency
        );

        let per_resource: Vec<(Target, Vec<CheckResult>)> = stream::iter(targets)
            .map(|target| async move {
                let results = match self.evaluate(&target, request).await {
                    Ok(report) => report.checks,
                    Err(err) => {
                        log::warn!("could not gather {}: {}", target, err);
                        vec![gather_failure(&target, &err)]
                    }
                };
                (target, results)
            })
            .buffer_unordered(concurrency.max(1))
            .collect()
            .await;

        let mut metadata = BTreeMap::new();
        metadata.insert("domain".to_string(), kind.to_string());
        metadata.insert("namespace".to_string(), namespace.unwrap_or("*").to_string());
        metadata.insert(
            "checks_requested".to_string(),
            if request.checks.is_empty() {
                "default".to_string()
            } else {
                request.checks.join(",")
            },
        );
        Ok(aggregate::combine(
            Target::all(kind, namespace),
            per_resource,
            metadata,
        ))
    }

    /// Keep the diagnosis current until the resource is deleted, the stream
    /// fails or `cancel` fires.
    pub fn watch(&self, request: DiagnoseRequest, cancel: CancellationToken) -> WatchController<D> {
        WatchController::new(self.clone(), request, cancel)
    }
}

fn gather_failure(target: &Target, err: &FetchError) -> CheckResult {
    CheckResult::failed(
        GATHER_CHECK,
        format!("Could not gather {}", target.qualified_name()),
    )
    .with_suggestion(suggest::gather_failure(err))
    .with_error(err.to_string())
}
