//! Plain text formatter.
//!
//! Colors come from `colored`, which drops them when stdout is not a
//! terminal or `NO_COLOR` is set.

use colored::Colorize;

use crate::diagnostics::{
    CheckResult, CheckStatus, DiagnosticReport, ResourceKind, Summary, Target,
};

fn badge(status: CheckStatus) -> String {
    let label = format!("{:<7}", status.as_str());
    match status {
        CheckStatus::Passed => label.green().to_string(),
        CheckStatus::Failed => label.red().bold().to_string(),
        CheckStatus::Warning => label.yellow().to_string(),
        CheckStatus::Skipped => label.dimmed().to_string(),
    }
}

fn heading(target: &Target) -> String {
    if target.name == "*" {
        let plural = match target.kind {
            ResourceKind::Ingress => "ingresses",
            ResourceKind::Pod => "pods",
            ResourceKind::Service => "services",
        };
        format!("{}/{}", plural, target.namespace)
    } else {
        target.to_string()
    }
}

fn format_result(output: &mut String, result: &CheckResult) {
    output.push_str(&format!(
        "  {} {:<16} {}\n",
        badge(result.status),
        result.name,
        result.message
    ));
    for (label, value) in result.details.iter() {
        let mut lines = value.lines();
        let first = lines.next().unwrap_or_default();
        output.push_str(&format!("      {} {}\n", format!("{}:", label).dimmed(), first));
        for line in lines {
            output.push_str(&format!("        {}\n", line));
        }
    }
    if let Some(ref suggestion) = result.suggestion {
        output.push_str(&format!("      {} {}\n", "→".cyan(), suggestion));
    }
    if let Some(ref error) = result.error {
        output.push_str(&format!("      {} {}\n", "error:".red(), error));
    }
}

fn format_summary(summary: &Summary) -> String {
    let failed = format!("{} failed", summary.failed);
    let failed = if summary.failed > 0 {
        failed.red().bold().to_string()
    } else {
        failed
    };
    format!(
        "{} checks: {} passed, {}, {} warnings, {} skipped\n",
        summary.total, summary.passed, failed, summary.warnings, summary.skipped
    )
}

/// Format a report as text.
pub fn format(report: &DiagnosticReport) -> String {
    let mut output = String::new();
    output.push_str(&format!(
        "{} {}\n",
        heading(&report.target).bold(),
        report.timestamp.to_rfc3339().dimmed()
    ));
    if let Some(absent) = report.metadata.get("absent_dependents") {
        output.push_str(&format!("{} {}\n", "unverified:".yellow(), absent));
    }
    output.push('\n');

    if report.checks.is_empty() {
        output.push_str("  No checks were run.\n");
    }
    for result in &report.checks {
        format_result(&mut output, result);
    }

    output.push('\n');
    output.push_str(&format_summary(&report.summary));
    output
}
