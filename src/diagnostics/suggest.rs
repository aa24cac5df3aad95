//! Remediation heuristics.
//!
//! Ordered `(needle, advice)` tables matched case-insensitively against a
//! failure message; the first hit wins.

use crate::cluster::FetchError;
use crate::diagnostics::context::Absence;

/// Image pull advice the tests pin.
pub const VERIFY_IMAGE: &str = "verify image name and tag";

const SCHEDULING: &[(&str, &str)] = &[
    (
        "insufficient cpu",
        "Lower the pod's CPU resource requests or add nodes with spare CPU capacity",
    ),
    (
        "insufficient memory",
        "Lower the pod's memory resource requests or add nodes with spare memory",
    ),
    (
        "insufficient",
        "Lower the pod's resource requests or add nodes with spare capacity",
    ),
    (
        "unbound immediate persistentvolumeclaims",
        "Check that the PersistentVolumeClaim is bound and a matching StorageClass exists",
    ),
    (
        "persistentvolumeclaim",
        "Check that the PersistentVolumeClaim exists and can be bound",
    ),
    (
        "untolerated taint",
        "Add a toleration for the node taints or remove the taints from a node",
    ),
    (
        "taint",
        "Add a toleration for the node taints or remove the taints from a node",
    ),
    (
        "didn't match pod's node affinity",
        "Relax the pod's node selector or affinity rules, or label a node to match",
    ),
    (
        "node selector",
        "Relax the pod's node selector or affinity rules, or label a node to match",
    ),
    (
        "affinity",
        "Relax the pod's affinity or anti-affinity rules",
    ),
    (
        "too many pods",
        "The nodes are at their pod limit; add nodes or remove idle pods",
    ),
    (
        "free ports",
        "Another pod already binds the requested hostPort; drop hostPort or spread pods",
    ),
];

const IMAGE_PULL: &[(&str, &str)] = &[
    ("manifest unknown", VERIFY_IMAGE),
    ("not found", VERIFY_IMAGE),
    ("invalidimagename", VERIFY_IMAGE),
    ("invalid reference format", VERIFY_IMAGE),
    (
        "unauthorized",
        "Check the imagePullSecrets: the registry rejected the credentials",
    ),
    (
        "authentication required",
        "Check the imagePullSecrets: the registry requires credentials",
    ),
    (
        "denied",
        "Check the imagePullSecrets and that the account may read this repository",
    ),
    (
        "no such host",
        "Check that the registry hostname resolves from the nodes",
    ),
    (
        "timeout",
        "Check network reachability of the registry from the nodes",
    ),
    (
        "toomanyrequests",
        "The registry rate-limited the pull; authenticate or use a mirror",
    ),
];

const WAITING: &[(&str, &str)] = &[
    (
        "createcontainerconfigerror",
        "A referenced Secret or ConfigMap key is missing; check the container's env and volume references",
    ),
    (
        "createcontainererror",
        "The container runtime could not create the container; check the command and volume mounts",
    ),
    (
        "crashloopbackoff",
        "The container keeps exiting; inspect its logs from the previous run",
    ),
    (
        "runcontainererror",
        "The container failed to start; check the entrypoint and security context",
    ),
    (
        "containercannotrun",
        "The container failed to start; check the entrypoint and security context",
    ),
];

fn lookup(table: &[(&str, &'static str)], message: &str) -> Option<&'static str> {
    let lower = message.to_lowercase();
    table
        .iter()
        .find(|(needle, _)| lower.contains(needle))
        .map(|(_, advice)| *advice)
}

/// Advice for a FailedScheduling event message.
pub fn scheduling(message: &str) -> Option<&'static str> {
    lookup(SCHEDULING, message)
}

/// Advice for an image pull failure, falling back to the reason.
pub fn image_pull(reason: &str, message: &str) -> Option<&'static str> {
    lookup(IMAGE_PULL, message).or_else(|| lookup(IMAGE_PULL, reason))
}

/// Advice for a container waiting reason.
pub fn waiting_reason(reason: &str) -> Option<&'static str> {
    lookup(WAITING, reason)
}

/// Advice for a dependent that is absent from the snapshot.
pub fn absence(kind: &str, name: &str, absence: &Absence) -> String {
    match absence {
        Absence::NotFound => format!("Create {} '{}' or fix the reference to it", kind, name),
        Absence::Forbidden(_) => format!(
            "Grant get access on {} '{}' to verify it; it may exist",
            kind, name
        ),
        Absence::DeadlineExceeded => format!(
            "Increase --timeout to finish fetching {} '{}'",
            kind, name
        ),
        Absence::Failed(_) => format!(
            "Retry once the API server is reachable; {} '{}' could not be read",
            kind, name
        ),
    }
}

/// Advice for a resource whose primary fetch failed during a bulk run.
pub fn gather_failure(err: &FetchError) -> &'static str {
    match err {
        FetchError::NotFound { .. } => {
            "The resource disappeared while the run was in progress; re-run to confirm"
        }
        FetchError::Forbidden { .. } => "Grant get access on this resource to diagnose it",
        FetchError::Timeout => "Increase --timeout",
        _ => "Check connectivity to the API server and re-run",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheduling_prefers_specific_resource() {
        let advice =
            scheduling("0/3 nodes are available: 3 Insufficient cpu.").unwrap_or_default();
        assert!(advice.contains("CPU resource requests"));
        assert!(
            scheduling("0/1 nodes are available: 1 node(s) had untolerated taint")
                .is_some_and(|a| a.contains("toleration"))
        );
        assert_eq!(scheduling("something new"), None);
    }

    #[test]
    fn test_image_pull_advice() {
        assert_eq!(
            image_pull("ErrImagePull", "manifest unknown: manifest unknown"),
            Some(VERIFY_IMAGE)
        );
        assert!(image_pull("ErrImagePull", "401 Unauthorized").is_some_and(|a| a.contains("imagePullSecrets")));
        assert_eq!(image_pull("InvalidImageName", ""), Some(VERIFY_IMAGE));
    }

    #[test]
    fn test_absence_advice_differs_by_cause() {
        assert!(absence("Secret", "db", &Absence::NotFound).starts_with("Create"));
        assert!(absence("Secret", "db", &Absence::Forbidden("rbac".into())).contains("may exist"));
    }
}
