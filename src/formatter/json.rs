//! JSON formatter.

use crate::diagnostics::DiagnosticReport;

/// Format a report as pretty JSON, newline terminated.
pub fn format(report: &DiagnosticReport) -> String {
    let mut output = serde_json::to_string_pretty(report).unwrap_or_else(|e| {
        log::error!("failed to serialize report: {}", e);
        "{}".to_string()
    });
    output.push('\n');
    output
}
