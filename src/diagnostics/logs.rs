//! Log pattern analyzer.
//!
//! Classifies unstructured container output against an ordered list of
//! failure signatures. Lines are scanned in order and the first line matching
//! any signature decides; within that line, declaration order decides. Specific
//! causes therefore sit above the generic `error|fatal|exception` catch-all.

use k8s_openapi::api::core::v1::ContainerStatus;
use regex::Regex;
use std::sync::LazyLock;

use crate::diagnostics::types::{CheckResult, CheckStatus};

/// Name of results produced by the analyzer.
pub const LOGS_CHECK: &str = "logs";

const MAX_LINE_LEN: usize = 200;

/// One known failure signature.
#[derive(Debug, Clone)]
pub struct Signature {
    pub name: String,
    pattern: Regex,
    pub status: CheckStatus,
    pub message: String,
    pub suggestion: String,
}

impl Signature {
    /// Build a signature. The pattern is matched case-insensitively.
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        status: CheckStatus,
        message: impl Into<String>,
        suggestion: impl Into<String>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            name: name.into(),
            pattern: Regex::new(&format!("(?i){}", pattern))?,
            status,
            message: message.into(),
            suggestion: suggestion.into(),
        })
    }

    pub fn is_match(&self, line: &str) -> bool {
        self.pattern.is_match(line)
    }
}

/// A signature hit.
#[derive(Debug, Clone, Copy)]
pub struct Match<'a> {
    pub signature: &'a Signature,
    pub line: &'a str,
}

// (name, pattern, status, message, suggestion), highest precedence first.
const BUILTIN: &[(&str, &str, CheckStatus, &str, &str)] = &[
    (
        "connection-refused",
        r"connection refused|econnrefused",
        CheckStatus::Failed,
        "Connection refused by a dependency",
        "Check that the target service is running and listening on the expected port",
    ),
    (
        "dns",
        r"no such host|name or service not known|could not resolve|temporary failure in name resolution|getaddrinfo|nxdomain",
        CheckStatus::Failed,
        "DNS resolution failure",
        "Check the hostname and that the service it names exists in the expected namespace",
    ),
    (
        "tls",
        r"x509|certificate (has expired|is not valid|signed by unknown)|tls handshake|ssl routines|unknown authority",
        CheckStatus::Failed,
        "TLS certificate error",
        "Check the certificate chain, its expiry and the CA bundle mounted into the container",
    ),
    (
        "timeout",
        r"timed out|timeout|deadline exceeded",
        CheckStatus::Failed,
        "Operation timed out",
        "Check network policies and that the remote dependency is reachable and responsive",
    ),
    (
        "permission-denied",
        r"permission denied|eacces|operation not permitted",
        CheckStatus::Failed,
        "Permission denied",
        "Check the securityContext (runAsUser, fsGroup) and the file or volume permissions",
    ),
    (
        "auth",
        r"unauthorized|authentication failed|access denied|invalid credentials|invalid password|401 ",
        CheckStatus::Failed,
        "Authentication failure",
        "Check the credentials the container receives from its Secrets",
    ),
    (
        "address-in-use",
        r"address already in use|eaddrinuse",
        CheckStatus::Failed,
        "Address already in use",
        "Another process in the pod binds the same port; change the port or the sidecar",
    ),
    (
        "oom",
        r"out of memory|outofmemoryerror|cannot allocate memory|oom-?kill",
        CheckStatus::Failed,
        "Out of memory",
        "Raise the container memory limit or reduce the process's memory use",
    ),
    (
        "missing-file",
        r"no such file or directory|file not found|enoent",
        CheckStatus::Failed,
        "Missing file",
        "Check the volume mounts, ConfigMap keys and the image's working directory",
    ),
    (
        "missing-config",
        r"(environment variable|env var)\S*\s.*(not set|missing|required|undefined)|missing required (config|configuration|environment)",
        CheckStatus::Failed,
        "Missing configuration",
        "Set the missing environment variable in the container spec or its ConfigMap",
    ),
    (
        "panic",
        r"panic|segmentation fault|sigsegv|core dumped",
        CheckStatus::Failed,
        "Process crashed",
        "The process crashed; check the stack trace in the logs and the recent image change",
    ),
    (
        "generic-error",
        r"\berror\b|\bfatal\b|exception",
        CheckStatus::Warning,
        "Errors found in logs",
        "Review the matched log line for the failing component",
    ),
];

static BUILTIN_ANALYZER: LazyLock<LogAnalyzer> = LazyLock::new(|| {
    LogAnalyzer::new(
        BUILTIN
            .iter()
            .map(|(name, pattern, status, message, suggestion)| {
                Signature::new(*name, pattern, *status, *message, *suggestion).unwrap()
            })
            .collect(),
    )
});

/// Ordered signature list.
#[derive(Debug, Clone)]
pub struct LogAnalyzer {
    signatures: Vec<Signature>,
}

impl Default for LogAnalyzer {
    fn default() -> Self {
        Self::builtin().clone()
    }
}

impl LogAnalyzer {
    pub fn new(signatures: Vec<Signature>) -> Self {
        Self { signatures }
    }

    /// The built-in signature list.
    pub fn builtin() -> &'static LogAnalyzer {
        &BUILTIN_ANALYZER
    }

    pub fn signatures(&self) -> &[Signature] {
        &self.signatures
    }

    /// First signature matching the first offending line.
    pub fn first_match<'a>(&'a self, lines: &[&'a str]) -> Option<Match<'a>> {
        lines.iter().find_map(|line| {
            self.signatures
                .iter()
                .find(|s| s.is_match(line))
                .map(|signature| Match { signature, line })
        })
    }

    /// Classify log text into one result named `logs`.
    pub fn classify(&self, text: &str) -> CheckResult {
        let lines = non_empty_lines(text);
        let analyzed = format!("{} log lines", lines.len());

        match self.first_match(&lines) {
            Some(hit) => CheckResult::new(LOGS_CHECK, hit.signature.status, &hit.signature.message)
                .with_suggestion(&hit.signature.suggestion)
                .with_detail("matched_line", truncate(hit.line.trim()))
                .with_detail("analyzed", analyzed),
            None => CheckResult::passed(
                LOGS_CHECK,
                format!(
                    "No known error patterns found (analyzed {} log lines)",
                    lines.len()
                ),
            )
            .with_detail("analyzed", analyzed),
        }
    }

    /// Crash-loop diagnosis for one container, if it is crash-looping.
    ///
    /// Separates a process that exited on its own from one killed from
    /// outside (OOM, signal), and names the first signature in the tail.
    pub fn classify_crash_loop(
        &self,
        status: &ContainerStatus,
        text: &str,
        tail: usize,
    ) -> Option<CheckResult> {
        let waiting_reason = status
            .state
            .as_ref()
            .and_then(|s| s.waiting.as_ref())
            .and_then(|w| w.reason.as_deref());
        if status.restart_count == 0 || waiting_reason != Some("CrashLoopBackOff") {
            return None;
        }

        let lines = non_empty_lines(text);
        let last_lines = &lines[lines.len().saturating_sub(tail)..];
        let terminated = status
            .last_state
            .as_ref()
            .and_then(|s| s.terminated.as_ref());

        let (cause, exit_code, suggestion) = match terminated {
            Some(t) => {
                let reason = t.reason.as_deref().unwrap_or("");
                let signal = t.signal.filter(|s| *s != 0);
                if reason == "OOMKilled" {
                    (
                        "killed externally (OOMKilled)".to_string(),
                        Some(t.exit_code),
                        "Raise the container memory limit or reduce the process's memory use",
                    )
                } else if signal.is_some() || matches!(t.exit_code, 137 | 143) {
                    (
                        format!("killed externally (exit code {})", t.exit_code),
                        Some(t.exit_code),
                        "The process was killed by a signal; check the liveness probe and memory limits",
                    )
                } else if t.exit_code == 0 {
                    (
                        "exited with code 0".to_string(),
                        Some(0),
                        "The process finishes and is restarted; run a long-lived process or use a Job",
                    )
                } else {
                    (
                        format!("exited with code {}", t.exit_code),
                        Some(t.exit_code),
                        "The process exited on its own; the last log lines show why",
                    )
                }
            }
            None => (
                "exited".to_string(),
                None,
                "The process keeps exiting; inspect its logs from the previous run",
            ),
        };

        let signature = self.first_match(last_lines);
        let mut message = format!(
            "Container {} is crash-looping ({} restarts): {}",
            status.name, status.restart_count, cause
        );
        let mut advice = suggestion.to_string();
        if let Some(hit) = signature {
            message.push_str(&format!("; last logs show: {}", hit.signature.message));
            if hit.signature.status == CheckStatus::Failed && !cause.starts_with("killed") {
                advice = hit.signature.suggestion.clone();
            }
        }

        let mut result = CheckResult::failed(LOGS_CHECK, message)
            .with_suggestion(advice)
            .with_detail("container", &status.name)
            .with_detail("reason", "CrashLoopBackOff");
        if let Some(code) = exit_code {
            result = result.with_detail("exit_code", code.to_string());
        }
        if !last_lines.is_empty() {
            result = result.with_detail("last_lines", last_lines.join("\n"));
        }
        Some(result)
    }
}

fn non_empty_lines(text: &str) -> Vec<&str> {
    text.lines().filter(|l| !l.trim().is_empty()).collect()
}

fn truncate(line: &str) -> String {
    if line.chars().count() <= MAX_LINE_LEN {
        return line.to_string();
    }
    let cut: String = line.chars().take(MAX_LINE_LEN).collect();
    format!("{}...", cut)
}
