//! Per-domain capability sets: how to fetch each kind and what to check.

pub mod ingress;
pub mod pod;
pub mod service;

pub use ingress::IngressDomain;
pub use pod::PodDomain;
pub use service::ServiceDomain;

use crate::diagnostics::context::Absence;
use crate::diagnostics::suggest;
use crate::diagnostics::types::CheckResult;

/// Result for a named dependent that is missing from the snapshot.
///
/// A confirmed miss is FAILED (WARNING when the reference is optional);
/// anything else could not be verified and is a WARNING.
pub(crate) fn absent_result(
    check: &str,
    kind: &str,
    name: &str,
    absence: &Absence,
    optional: bool,
) -> CheckResult {
    let result = match absence {
        Absence::NotFound if optional => CheckResult::warning(
            check,
            format!("Optional {} '{}' not found", kind, name),
        )
        .with_suggestion(format!(
            "The reference is optional so the pod starts without it; create {} '{}' if its values are expected",
            kind, name
        )),
        Absence::NotFound => CheckResult::failed(check, format!("{} '{}' not found", kind, name))
            .with_suggestion(suggest::absence(kind, name, absence)),
        other => CheckResult::warning(
            check,
            format!("Could not verify {} '{}': {}", kind, name, other),
        )
        .with_suggestion(suggest::absence(kind, name, absence)),
    };
    match absence.raw_error() {
        Some(raw) => result.with_error(raw),
        None => result,
    }
}
