//! # kubediag
//!
//! Explains why a Kubernetes pod, service or ingress is unhealthy.
//!
//! A diagnosis gathers the resource together with the objects it depends on
//! into one immutable snapshot, runs a catalog of checks against it and folds
//! the results into a [`DiagnosticReport`]. Dependents that cannot be fetched
//! degrade individual checks instead of failing the run.
//!
//! ## Example
//!
//! ```rust,no_run
//! use kubediag::cluster::MemoryReader;
//! use kubediag::diagnostics::{DiagnoseRequest, Engine};
//! use kubediag::domains::PodDomain;
//! use std::path::Path;
//! use std::sync::Arc;
//!
//! # async fn demo() -> kubediag::Result<()> {
//! let reader = MemoryReader::from_file(Path::new("snapshot.yaml"))?;
//! let engine = Engine::new(PodDomain, Arc::new(reader));
//! let report = engine.diagnose(&DiagnoseRequest::new("default", "web")).await?;
//! println!("{} failed", report.summary.failed);
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod cluster;
pub mod config;
pub mod diagnostics;
pub mod domains;
pub mod error;
pub mod formatter;
pub mod handlers;

// Re-export commonly used types and functions
pub use diagnostics::{CheckResult, CheckStatus, DiagnoseRequest, DiagnosticReport, Engine};
pub use error::{KubeDiagError, Result};
use cli::Commands;
use config::Config;

/// The current version of the CLI tool
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Run a parsed command, returning the process exit code.
pub async fn run_command(command: Commands, config: &Config) -> Result<i32> {
    match command {
        Commands::Checks { domain } => handlers::handle_checks(domain.map(Into::into)),
        Commands::Pod(args) => {
            handlers::handle_diagnose(diagnostics::ResourceKind::Pod, args, config).await
        }
        Commands::Service(args) => {
            handlers::handle_diagnose(diagnostics::ResourceKind::Service, args, config).await
        }
        Commands::Ingress(args) => {
            handlers::handle_diagnose(diagnostics::ResourceKind::Ingress, args, config).await
        }
    }
}
