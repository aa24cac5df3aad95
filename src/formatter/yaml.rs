//! YAML formatter. Each report is its own document so watch output streams.

use crate::diagnostics::DiagnosticReport;

pub fn format(report: &DiagnosticReport) -> String {
    match serde_yaml::to_string(report) {
        Ok(body) => format!("---\n{}", body),
        Err(e) => {
            log::error!("failed to serialize report: {}", e);
            "--- {}\n".to_string()
        }
    }
}
