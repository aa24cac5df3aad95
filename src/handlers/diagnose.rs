use futures_util::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::cli::{DiagnoseArgs, OutputFormatArg};
use crate::cluster::{ClusterReader, KubeReader, MemoryReader};
use crate::config::Config;
use crate::diagnostics::{DiagnoseRequest, DiagnosticReport, Domain, Engine, ResourceKind};
use crate::domains::{IngressDomain, PodDomain, ServiceDomain};
use crate::error::{KubeDiagError, Result};
use crate::formatter::{self, OutputFormat};

const SNAPSHOT_NAMESPACE: &str = "default";

/// Flags merged over config defaults.
#[derive(Debug, Clone)]
struct Settings {
    format: OutputFormat,
    /// Set for bulk runs; the inner `None` means every namespace.
    bulk: Option<Option<String>>,
    request: DiagnoseRequest,
    watch: bool,
    concurrency: usize,
}

impl Settings {
    fn resolve(args: &DiagnoseArgs, config: &Config, default_namespace: &str) -> Result<Self> {
        let defaults = &config.defaults;
        let format = match args.output {
            Some(OutputFormatArg::Text) => OutputFormat::Text,
            Some(OutputFormatArg::Json) => OutputFormat::Json,
            Some(OutputFormatArg::Yaml) => OutputFormat::Yaml,
            None => OutputFormat::parse(&defaults.output).ok_or_else(|| {
                KubeDiagError::usage(format!(
                    "unknown output format '{}' in config (expected text, json or yaml)",
                    defaults.output
                ))
            })?,
        };

        let namespace = args
            .namespace
            .clone()
            .or_else(|| defaults.namespace.clone())
            .unwrap_or_else(|| default_namespace.to_string());
        let bulk = if args.all_namespaces {
            Some(None)
        } else if args.all {
            Some(Some(namespace.clone()))
        } else {
            None
        };

        let timeout = args.timeout.unwrap_or(defaults.timeout_secs);
        let request = DiagnoseRequest::new(&namespace, args.name.clone().unwrap_or_default())
            .with_checks(args.checks.iter().map(|c| c.trim()).filter(|c| !c.is_empty()))
            .with_logs(args.logs_flag().unwrap_or(defaults.capture_logs))
            .with_tail_lines(Some(args.tail.unwrap_or(defaults.tail_lines)))
            .with_deadline((timeout > 0).then(|| Duration::from_secs(timeout)));

        Ok(Self {
            format,
            bulk,
            request,
            watch: args.watch,
            concurrency: args.concurrency.unwrap_or(defaults.concurrency).max(1),
        })
    }
}

async fn open_reader(
    args: &DiagnoseArgs,
    config: &Config,
) -> Result<(Arc<dyn ClusterReader>, String)> {
    if let Some(ref path) = args.snapshot {
        log::info!("reading snapshot {}", path.display());
        let reader = MemoryReader::from_file(path)?;
        return Ok((Arc::new(reader), SNAPSHOT_NAMESPACE.to_string()));
    }

    // Install rustls crypto provider (required for TLS connections to K8s API)
    let _ = rustls::crypto::ring::default_provider().install_default();

    let context = args.context.as_deref().or(config.defaults.context.as_deref());
    let reader = match context {
        Some(context) => KubeReader::with_context(context).await?,
        None => KubeReader::new().await?,
    };
    let namespace = reader.default_namespace().to_string();
    Ok((Arc::new(reader), namespace))
}

/// Diagnose the resource(s) named on the command line.
///
/// Returns the process exit code: 1 when any check FAILED, else 0.
pub async fn handle_diagnose(kind: ResourceKind, args: DiagnoseArgs, config: &Config) -> Result<i32> {
    let (reader, default_namespace) = open_reader(&args, config).await?;
    let settings = Settings::resolve(&args, config, &default_namespace)?;
    log::debug!("resolved settings: {:?}", settings);

    match kind {
        ResourceKind::Pod => run(PodDomain, reader, settings, config).await,
        ResourceKind::Service => run(ServiceDomain, reader, settings, config).await,
        ResourceKind::Ingress => run(IngressDomain, reader, settings, config).await,
    }
}

async fn run<D: Domain>(
    domain: D,
    reader: Arc<dyn ClusterReader>,
    settings: Settings,
    config: &Config,
) -> Result<i32> {
    let engine = Engine::new(domain, reader).with_config(config.checks.clone());
    for check in &settings.request.checks {
        if !engine.registry().contains(check) {
            log::warn!(
                "unknown {} check '{}' ignored (available: {})",
                engine.kind(),
                check,
                engine.registry().names().join(", ")
            );
        }
    }

    if settings.watch {
        return watch(engine, settings).await;
    }

    let report = match settings.bulk {
        Some(ref namespace) => {
            engine
                .diagnose_all(namespace.as_deref(), &settings.request, settings.concurrency)
                .await?
        }
        None => engine.diagnose(&settings.request).await?,
    };
    log::debug!("diagnosed {}: {:?}", report.target, report.summary);
    formatter::format_report(&report, settings.format);
    Ok(exit_code(&report))
}

/// Print one report per cycle until the resource is deleted or Ctrl-C.
async fn watch<D: Domain>(engine: Engine<D>, settings: Settings) -> Result<i32> {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("interrupted, stopping watch");
            on_signal.cancel();
        }
    });

    let mut code = 0;
    let mut reports = Box::pin(engine.watch(settings.request, cancel).into_stream());
    while let Some(report) = reports.next().await {
        let report = report?;
        formatter::format_report(&report, settings.format);
        code = exit_code(&report);
    }
    Ok(code)
}

fn exit_code(report: &DiagnosticReport) -> i32 {
    if report.has_failures() { 1 } else { 0 }
}
