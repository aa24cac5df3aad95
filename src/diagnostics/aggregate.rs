//! Result aggregation.
//!
//! Pure functions: tally results into a [`Summary`] and compose reports.
//! Bulk callers fold many per-resource result lists into one combined report
//! here without re-running any check.

use chrono::Utc;
use std::collections::BTreeMap;

use crate::diagnostics::types::{CheckResult, CheckStatus, DiagnosticReport, Summary, Target};

/// Detail label identifying the source resource in a combined report.
pub const RESOURCE_DETAIL: &str = "resource";

/// Tally a result sequence. Order-independent.
pub fn summarize(results: &[CheckResult]) -> Summary {
    results.iter().fold(Summary::default(), |mut summary, result| {
        summary.total += 1;
        match result.status {
            CheckStatus::Passed => summary.passed += 1,
            CheckStatus::Failed => summary.failed += 1,
            CheckStatus::Warning => summary.warnings += 1,
            CheckStatus::Skipped => summary.skipped += 1,
        }
        summary
    })
}

/// Compose a report for one evaluation, stamped now.
pub fn build_report(
    target: Target,
    checks: Vec<CheckResult>,
    metadata: BTreeMap<String, String>,
) -> DiagnosticReport {
    let summary = summarize(&checks);
    DiagnosticReport {
        target,
        timestamp: Utc::now(),
        checks,
        summary,
        metadata,
    }
}

/// Fold per-resource results into one report.
///
/// Results are grouped by resource in identity order regardless of the order
/// the resources completed in, and each gains a leading `resource` detail.
pub fn combine(
    target: Target,
    per_resource: Vec<(Target, Vec<CheckResult>)>,
    mut metadata: BTreeMap<String, String>,
) -> DiagnosticReport {
    let mut per_resource = per_resource;
    per_resource.sort_by(|a, b| a.0.cmp(&b.0));

    metadata.insert("resources".to_string(), per_resource.len().to_string());

    let checks = per_resource
        .into_iter()
        .flat_map(|(resource, results)| {
            let qualified = resource.qualified_name();
            results.into_iter().map(move |mut result| {
                result.details.prepend(RESOURCE_DETAIL, qualified.clone());
                result
            })
        })
        .collect();

    build_report(target, checks, metadata)
}
