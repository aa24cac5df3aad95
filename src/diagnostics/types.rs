//! Core types for the diagnostic engine.
//!
//! - `ResourceKind` / `Target` - what is being diagnosed
//! - `CheckStatus` - classification of a single check outcome
//! - `CheckResult` - one classified outcome with suggestion and details
//! - `Summary` - derived tallies over a result sequence
//! - `DiagnosticReport` - the immutable output of one evaluation

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::fmt;

/// Resource kinds the engine knows how to diagnose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A workload instance.
    Pod,
    /// A network-routing object.
    Service,
    /// An ingress route.
    Ingress,
}

impl ResourceKind {
    /// All diagnosable kinds, in catalog listing order.
    pub const ALL: [ResourceKind; 3] = [Self::Pod, Self::Service, Self::Ingress];

    /// Short lowercase name used in target identities and on the command line.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pod => "pod",
            Self::Service => "service",
            Self::Ingress => "ingress",
        }
    }

    /// The Kubernetes kind name.
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Pod => "Pod",
            Self::Service => "Service",
            Self::Ingress => "Ingress",
        }
    }

    /// Parse from a short name, plural or common abbreviation (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pod" | "pods" | "po" => Some(Self::Pod),
            "service" | "services" | "svc" => Some(Self::Service),
            "ingress" | "ingresses" | "ing" => Some(Self::Ingress),
            _ => None,
        }
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Identity of the diagnosed resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Target {
    pub kind: ResourceKind,
    pub namespace: String,
    pub name: String,
}

impl Target {
    pub fn new(kind: ResourceKind, namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            kind,
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Identity of a bulk run. `None` namespace means all namespaces.
    pub fn all(kind: ResourceKind, namespace: Option<&str>) -> Self {
        Self::new(kind, namespace.unwrap_or("*"), "*")
    }

    /// `namespace/name`, the form used in `resource` details.
    pub fn qualified_name(&self) -> String {
        format!("{}/{}", self.namespace, self.name)
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.kind, self.namespace, self.name)
    }
}

/// Classification of one check outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum CheckStatus {
    Passed,
    Failed,
    Warning,
    /// The check's precondition was not met. Never a stand-in for `Passed`.
    Skipped,
}

impl CheckStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Passed => "PASSED",
            Self::Failed => "FAILED",
            Self::Warning => "WARNING",
            Self::Skipped => "SKIPPED",
        }
    }

    /// Parse a status from a string (case-insensitive).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_uppercase().as_str() {
            "PASSED" | "PASS" => Some(Self::Passed),
            "FAILED" | "FAIL" => Some(Self::Failed),
            "WARNING" | "WARN" => Some(Self::Warning),
            "SKIPPED" | "SKIP" => Some(Self::Skipped),
            _ => None,
        }
    }

    /// Whether this outcome needs operator attention.
    pub fn is_problem(&self) -> bool {
        matches!(self, Self::Failed | Self::Warning)
    }
}

impl fmt::Display for CheckStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Ordered label → value pairs attached to a result.
///
/// Renderers depend on the labels, so they are part of the output contract.
/// Serializes as a map in insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Details(Vec<(String, String)>);

impl Details {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a pair. A repeated label replaces the earlier value in place.
    pub fn insert(&mut self, label: impl Into<String>, value: impl Into<String>) {
        let label = label.into();
        let value = value.into();
        match self.0.iter_mut().find(|(l, _)| *l == label) {
            Some(entry) => entry.1 = value,
            None => self.0.push((label, value)),
        }
    }

    /// Insert a pair at the front, shifting existing labels back.
    pub fn prepend(&mut self, label: impl Into<String>, value: impl Into<String>) {
        let label = label.into();
        self.0.retain(|(l, _)| *l != label);
        self.0.insert(0, (label, value.into()));
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }

    pub fn labels(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(l, _)| l.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(l, v)| (l.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

impl Serialize for Details {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.0.len()))?;
        for (label, value) in &self.0 {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Details {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // Reports read back from disk lose insertion order; BTreeMap keeps it stable.
        let map = BTreeMap::<String, String>::deserialize(deserializer)?;
        Ok(Self(map.into_iter().collect()))
    }
}

/// One classified outcome of a check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckResult {
    /// Name of the check that produced this result.
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
    /// Remediation advice. Present on every classifiable FAILED/WARNING.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
    #[serde(default, skip_serializing_if = "Details::is_empty")]
    pub details: Details,
    /// Raw error text for causes that could not be classified.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CheckResult {
    pub fn new(name: impl Into<String>, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            status,
            message: message.into(),
            suggestion: None,
            details: Details::new(),
            error: None,
        }
    }

    pub fn passed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Passed, message)
    }

    pub fn failed(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Failed, message)
    }

    pub fn warning(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Warning, message)
    }

    pub fn skipped(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(name, CheckStatus::Skipped, message)
    }

    /// Set remediation advice.
    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    /// Set remediation advice if one is known.
    pub fn with_optional_suggestion(mut self, suggestion: Option<impl Into<String>>) -> Self {
        if let Some(s) = suggestion {
            self.suggestion = Some(s.into());
        }
        self
    }

    /// Append a detail pair.
    pub fn with_detail(mut self, label: impl Into<String>, value: impl Into<String>) -> Self {
        self.details.insert(label, value);
        self
    }

    /// Attach raw error text.
    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}

/// Derived tallies over a result sequence.
///
/// Always recomputed from results, so `total == passed + failed + warnings + skipped`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Summary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub warnings: usize,
    pub skipped: usize,
}

impl Summary {
    /// Whether the caller should exit non-zero.
    pub fn has_failures(&self) -> bool {
        self.failed > 0
    }
}

/// Output of one evaluation. Built once, never mutated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiagnosticReport {
    pub target: Target,
    pub timestamp: DateTime<Utc>,
    pub checks: Vec<CheckResult>,
    pub summary: Summary,
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

impl DiagnosticReport {
    /// Results produced by the named check, in output order.
    pub fn results_for<'a>(&'a self, check: &'a str) -> impl Iterator<Item = &'a CheckResult> + 'a {
        self.checks.iter().filter(move |r| r.name == check)
    }

    /// First result produced by the named check.
    pub fn result(&self, check: &str) -> Option<&CheckResult> {
        self.checks.iter().find(|r| r.name == check)
    }

    /// Whether the caller should exit non-zero.
    pub fn has_failures(&self) -> bool {
        self.summary.has_failures()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resource_kind_parse() {
        assert_eq!(ResourceKind::parse("po"), Some(ResourceKind::Pod));
        assert_eq!(ResourceKind::parse("SVC"), Some(ResourceKind::Service));
        assert_eq!(ResourceKind::parse("ingresses"), Some(ResourceKind::Ingress));
        assert_eq!(ResourceKind::parse("deployment"), None);
    }

    #[test]
    fn test_target_display() {
        let target = Target::new(ResourceKind::Pod, "default", "web-0");
        assert_eq!(target.to_string(), "pod/default/web-0");
        assert_eq!(target.qualified_name(), "default/web-0");
        assert_eq!(Target::all(ResourceKind::Service, None).to_string(), "service/*/*");
    }

    #[test]
    fn test_details_keep_insertion_order() {
        let mut details = Details::new();
        details.insert("phase", "Running");
        details.insert("ready", "1/1");
        details.insert("restarts", "0");
        details.insert("phase", "Pending");
        details.prepend("resource", "default/web");

        let labels: Vec<_> = details.labels().collect();
        assert_eq!(labels, vec!["resource", "phase", "ready", "restarts"]);
        assert_eq!(details.get("phase"), Some("Pending"));

        let json = serde_json::to_string(&details).unwrap();
        assert_eq!(
            json,
            r#"{"resource":"default/web","phase":"Pending","ready":"1/1","restarts":"0"}"#
        );
    }

    #[test]
    fn test_check_result_serialization_omits_empty_fields() {
        let result = CheckResult::passed("status", "Pod is running");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "PASSED");
        assert!(json.get("suggestion").is_none());
        assert!(json.get("details").is_none());
        assert!(json.get("error").is_none());

        let result = CheckResult::failed("images", "pull failed")
            .with_suggestion("verify image name and tag")
            .with_detail("container", "app")
            .with_error("manifest unknown");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "FAILED");
        assert_eq!(json["suggestion"], "verify image name and tag");
        assert_eq!(json["details"]["container"], "app");
        assert_eq!(json["error"], "manifest unknown");
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(CheckStatus::parse("warn"), Some(CheckStatus::Warning));
        assert_eq!(CheckStatus::parse("Skipped"), Some(CheckStatus::Skipped));
        assert_eq!(CheckStatus::parse("ok"), None);
        assert!(CheckStatus::Failed.is_problem());
        assert!(!CheckStatus::Skipped.is_problem());
    }
}
