//! Output formatters for diagnostic reports.

pub mod json;
pub mod plain;
pub mod yaml;

use crate::diagnostics::DiagnosticReport;

/// Output format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human readable text, colored when stdout is a terminal.
    #[default]
    Text,
    /// Pretty-printed JSON.
    Json,
    Yaml,
}

impl OutputFormat {
    /// Parse from a string.
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "text" | "plain" => Some(Self::Text),
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            _ => None,
        }
    }
}

/// Format a report to a string.
pub fn format_report_to_string(report: &DiagnosticReport, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => plain::format(report),
        OutputFormat::Json => json::format(report),
        OutputFormat::Yaml => yaml::format(report),
    }
}

/// Format and print a report.
pub fn format_report(report: &DiagnosticReport, format: OutputFormat) {
    print!("{}", format_report_to_string(report, format));
}
