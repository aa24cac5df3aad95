use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

use crate::diagnostics::ResourceKind;

#[derive(Parser)]
#[command(name = "kubediag")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Diagnose why a Kubernetes pod, service or ingress is unhealthy")]
#[command(long_about = "Gathers a resource together with the objects it depends on, runs a catalog of checks against that snapshot and reports each finding with a status, an explanation and a suggested fix.")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE", env = "KUBEDIAG_CONFIG")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Diagnose a pod
    #[command(visible_alias = "po")]
    Pod(DiagnoseArgs),

    /// Diagnose a service and the pods behind it
    #[command(visible_alias = "svc")]
    Service(DiagnoseArgs),

    /// Diagnose an ingress and its backends
    #[command(visible_alias = "ing")]
    Ingress(DiagnoseArgs),

    /// List the available checks and which run by default
    Checks {
        /// Only list checks for this resource kind
        #[arg(long, value_enum)]
        domain: Option<DomainArg>,
    },
}

#[derive(Args, Debug, Clone, Default)]
pub struct DiagnoseArgs {
    /// Name of the resource
    #[arg(value_name = "NAME", required_unless_present_any = ["all", "all_namespaces"])]
    pub name: Option<String>,

    /// Diagnose every resource of this kind in the namespace
    #[arg(long, conflicts_with = "name")]
    pub all: bool,

    /// Namespace (defaults to the config value, then the kubeconfig namespace)
    #[arg(short, long)]
    pub namespace: Option<String>,

    /// Diagnose every resource of this kind in all namespaces
    #[arg(short = 'A', long, conflicts_with_all = ["name", "namespace"])]
    pub all_namespaces: bool,

    /// Run only these checks
    #[arg(long, value_delimiter = ',')]
    pub checks: Vec<String>,

    /// Output format
    #[arg(short, long, value_enum)]
    pub output: Option<OutputFormatArg>,

    /// Capture container logs for failing pods
    #[arg(long, overrides_with = "no_logs")]
    pub logs: bool,

    /// Never capture container logs
    #[arg(long, overrides_with = "logs")]
    pub no_logs: bool,

    /// Log lines to fetch per container
    #[arg(long, value_name = "N")]
    pub tail: Option<i64>,

    /// Gather deadline in seconds
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Re-run the diagnosis whenever the resource changes
    #[arg(short, long, conflicts_with_all = ["all", "all_namespaces"])]
    pub watch: bool,

    /// Resources diagnosed at once with --all
    #[arg(long, value_name = "N")]
    pub concurrency: Option<usize>,

    /// Kubeconfig context to use
    #[arg(long, value_name = "CTX")]
    pub context: Option<String>,

    /// Read resources from a YAML snapshot instead of a cluster
    #[arg(long, value_name = "FILE", conflicts_with = "context")]
    pub snapshot: Option<PathBuf>,
}

impl DiagnoseArgs {
    /// `Some(true)` for `--logs`, `Some(false)` for `--no-logs`.
    pub fn logs_flag(&self) -> Option<bool> {
        match (self.logs, self.no_logs) {
            (true, _) => Some(true),
            (_, true) => Some(false),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormatArg {
    Text,
    Json,
    Yaml,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum DomainArg {
    Pod,
    Service,
    Ingress,
}

impl From<DomainArg> for ResourceKind {
    fn from(arg: DomainArg) -> Self {
        match arg {
            DomainArg::Pod => ResourceKind::Pod,
            DomainArg::Service => ResourceKind::Service,
            DomainArg::Ingress => ResourceKind::Ingress,
        }
    }
}

impl Cli {
    /// Initialize logging based on verbosity level
    pub fn init_logging(&self) {
        if self.quiet {
            return;
        }

        let level = match self.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        };

        env_logger::Builder::from_default_env()
            .filter_level(level)
            .init();
    }
}
