//! Diagnostic engine.
//!
//! - `gather` - builds a [`SubjectInfo`] snapshot, best-effort for dependents
//! - `registry` - check catalog and runner
//! - `logs` - log pattern analyzer
//! - `aggregate` - summaries and report composition
//! - `engine` - generic Gather → Run → Summarize driver, single and bulk
//! - `watch` - live re-evaluation from a change-event stream

pub mod aggregate;
pub mod config;
pub mod context;
pub mod engine;
pub mod gather;
pub mod logs;
pub mod registry;
pub mod suggest;
pub mod types;
pub mod watch;

pub use aggregate::{build_report, combine, summarize};
pub use config::CheckConfig;
pub use context::{Absence, CapturedLogs, Dependent, SubjectInfo};
pub use engine::{DiagnoseError, DiagnoseRequest, Domain, Engine};
pub use gather::{DependentFetcher, GatherOptions, LogCapture};
pub use logs::{LogAnalyzer, Signature};
pub use registry::{Check, CheckRegistry, SimpleCheck};
pub use types::{
    CheckResult, CheckStatus, Details, DiagnosticReport, ResourceKind, Summary, Target,
};
pub use watch::{Termination, WatchController, WatchError, WatchState};
