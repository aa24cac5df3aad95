//! Pod check catalog.
//!
//! Every check is a pure function of the snapshot. Detail labels used here
//! (`phase`, `ready`, `restarts`, `node`, `pod_ip`, `container`, `reason`,
//! `exit_code`, plus `analyzed`/`matched_line`/`last_lines` from the log
//! analyzer) are part of the report contract.

use k8s_openapi::api::core::v1::{ContainerStatus, Event};

use super::PodInfo;
use super::extract;
use crate::diagnostics::config::CheckConfig;
use crate::diagnostics::context::{Absence, Dependent};
use crate::diagnostics::gather::event_time;
use crate::diagnostics::logs::{LOGS_CHECK, LogAnalyzer};
use crate::diagnostics::suggest;
use crate::diagnostics::types::CheckResult;
use crate::domains::absent_result;

fn latest_event<'a>(subject: &'a PodInfo, reason: &'a str) -> Option<&'a Event> {
    subject.events_with_reason(reason).max_by_key(|e| event_time(e))
}

fn terminated_reason(status: &ContainerStatus) -> Option<(&str, i32)> {
    status
        .state
        .as_ref()
        .and_then(|s| s.terminated.as_ref())
        .or_else(|| status.last_state.as_ref().and_then(|s| s.terminated.as_ref()))
        .map(|t| (t.reason.as_deref().unwrap_or(""), t.exit_code))
}

/// Pod phase and container readiness.
pub fn status(subject: &PodInfo, _config: &CheckConfig) -> Vec<CheckResult> {
    let pod = &subject.primary;
    let phase = extract::phase(pod);
    let (ready, total) = extract::ready_counts(pod);
    let restarts = extract::restarts(pod);

    let first_waiting = extract::container_statuses(pod)
        .iter()
        .chain(extract::init_container_statuses(pod))
        .find_map(|s| extract::waiting_reason(s).filter(|r| *r != "PodInitializing" && *r != "ContainerCreating"));

    let result = match phase {
        "Running" if total > 0 && ready == total => CheckResult::passed(
            "status",
            format!("Pod is running and all {} containers are ready", total),
        ),
        "Running" => CheckResult::warning(
            "status",
            format!("Pod is running but only {}/{} containers are ready", ready, total),
        )
        .with_suggestion(
            first_waiting
                .and_then(suggest::waiting_reason)
                .unwrap_or("Check the readiness probes and the logs of the unready containers"),
        ),
        "Succeeded" => CheckResult::passed("status", "Pod completed successfully"),
        "Pending" => {
            let message = match first_waiting {
                Some(reason) => format!("Pod is pending ({})", reason),
                None => "Pod is pending".to_string(),
            };
            let suggestion = if extract::node_name(pod).is_none() {
                "The pod is not scheduled; see the scheduling check for the cause"
            } else {
                first_waiting.and_then(suggest::waiting_reason).unwrap_or(
                    "Containers have not started; check the images check and volume mounts",
                )
            };
            CheckResult::failed("status", message).with_suggestion(suggestion)
        }
        "Failed" => {
            let status = pod.status.as_ref();
            let reason = status.and_then(|s| s.reason.as_deref());
            let mut result = CheckResult::failed(
                "status",
                match reason {
                    Some(reason) => format!("Pod failed ({})", reason),
                    None => "Pod failed".to_string(),
                },
            )
            .with_suggestion(match reason {
                Some("Evicted") => "The kubelet evicted the pod under node pressure; check the node and the pod's resource requests",
                _ => "Inspect the container exit codes and the logs of the failed run",
            });
            if let Some(message) = status.and_then(|s| s.message.as_deref()) {
                result = result.with_error(message);
            }
            result
        }
        other => CheckResult::warning("status", format!("Pod phase is {}", other))
            .with_suggestion("The node may be unreachable; check the node check and node status"),
    };

    vec![
        result
            .with_detail("phase", phase)
            .with_detail("ready", format!("{}/{}", ready, total))
            .with_detail("restarts", restarts.to_string()),
    ]
}

/// Placement on a node.
pub fn scheduling(subject: &PodInfo, _config: &CheckConfig) -> Vec<CheckResult> {
    let pod = &subject.primary;
    if let Some(node) = extract::node_name(pod) {
        return vec![
            CheckResult::passed("scheduling", format!("Pod is scheduled on node {}", node))
                .with_detail("node", node),
        ];
    }

    let result = match &subject.events {
        Dependent::Absent(absence) => {
            let result = CheckResult::warning(
                "scheduling",
                format!("Pod is not scheduled and its events could not be read ({})", absence),
            )
            .with_suggestion(suggest::absence("Event list for pod", &subject.target.name, absence));
            match absence.raw_error() {
                Some(raw) => result.with_error(raw),
                None => result,
            }
        }
        Dependent::Present(_) => match latest_event(subject, "FailedScheduling") {
            Some(event) => {
                let message = event.message.as_deref().unwrap_or("");
                let result = CheckResult::failed(
                    "scheduling",
                    format!("Pod cannot be scheduled: {}", message.trim()),
                )
                .with_detail("reason", "FailedScheduling");
                match suggest::scheduling(message) {
                    Some(advice) => result.with_suggestion(advice),
                    None => result
                        .with_suggestion(
                            "Check node capacity, taints and the pod's scheduling constraints",
                        )
                        .with_error(message),
                }
            }
            None => {
                let condition = extract::condition(pod, "PodScheduled");
                let message = condition.and_then(|c| c.message.as_deref());
                CheckResult::warning("scheduling", "Pod is not scheduled yet").with_suggestion(
                    message
                        .and_then(suggest::scheduling)
                        .unwrap_or("No scheduling event recorded yet; re-run shortly or check the scheduler"),
                )
            }
        },
    };
    vec![result]
}

/// Image pull failures and unpinned tags.
pub fn images(subject: &PodInfo, config: &CheckConfig) -> Vec<CheckResult> {
    let pod = &subject.primary;
    let mut failures = Vec::new();

    for status in extract::init_container_statuses(pod)
        .iter()
        .chain(extract::container_statuses(pod))
    {
        let Some(reason) = extract::waiting_reason(status)
            .filter(|r| extract::IMAGE_PULL_REASONS.contains(r))
        else {
            continue;
        };
        let status_message = extract::waiting_message(status).unwrap_or("");
        // The waiting message often only says "Back-off pulling image"; the
        // kubelet's Failed event carries the registry's answer.
        let event_message = subject
            .events_with_reason("Failed")
            .filter(|e| {
                e.message
                    .as_deref()
                    .is_some_and(|m| m.contains(&status.image))
            })
            .max_by_key(|e| event_time(e))
            .and_then(|e| e.message.as_deref())
            .unwrap_or("");
        let advice = suggest::image_pull(reason, status_message)
            .or_else(|| suggest::image_pull(reason, event_message))
            .unwrap_or("Check the image reference and that the nodes can reach the registry");
        let raw = if status_message.is_empty() {
            event_message
        } else {
            status_message
        };

        let mut result = CheckResult::failed(
            "images",
            format!(
                "Container {} cannot pull image {} ({})",
                status.name, status.image, reason
            ),
        )
        .with_suggestion(advice)
        .with_detail("container", &status.name)
        .with_detail("reason", reason);
        if !raw.is_empty() {
            result = result.with_error(raw);
        }
        failures.push(result);
    }
    if !failures.is_empty() {
        return failures;
    }

    let containers = extract::all_containers(pod);
    let mut warnings = Vec::new();
    if config.flag_latest_tag {
        for container in &containers {
            let Some(image) = container.image.as_deref() else {
                continue;
            };
            if extract::uses_latest_tag(image) {
                warnings.push(
                    CheckResult::warning(
                        "images",
                        format!("Container {} uses an unpinned image tag ({})", container.name, image),
                    )
                    .with_suggestion("Pin the image to a version tag or digest so restarts run the same code")
                    .with_detail("container", &container.name),
                );
            }
        }
    }
    if !warnings.is_empty() {
        return warnings;
    }

    vec![CheckResult::passed(
        "images",
        format!("All {} container images resolved", containers.len()),
    )]
}

/// Referenced service account, secrets and config maps exist.
pub fn permissions(subject: &PodInfo, _config: &CheckConfig) -> Vec<CheckResult> {
    let deps = &subject.dependents;
    if deps.references.service_account.is_none()
        && deps.secrets.is_empty()
        && deps.config_maps.is_empty()
    {
        return vec![CheckResult::passed(
            "permissions",
            "Pod uses the default service account and references no secrets or config maps",
        )];
    }

    let mut results = Vec::new();
    if let (Some(name), Some(account)) = (
        deps.references.service_account.as_deref(),
        deps.service_account.as_ref(),
    ) {
        results.push(match account.absence() {
            None => CheckResult::passed("permissions", format!("ServiceAccount '{}' exists", name)),
            Some(absence) => absent_result("permissions", "ServiceAccount", name, absence, false),
        });
    }
    for (reference, secret) in &deps.secrets {
        results.push(match secret.absence() {
            None => CheckResult::passed(
                "permissions",
                format!("Secret '{}' exists", reference.name),
            ),
            Some(absence) => absent_result(
                "permissions",
                "Secret",
                &reference.name,
                absence,
                reference.optional,
            )
            .with_detail("reason", format!("referenced by {}", reference.source)),
        });
    }
    for (reference, config_map) in &deps.config_maps {
        results.push(match config_map.absence() {
            None => CheckResult::passed(
                "permissions",
                format!("ConfigMap '{}' exists", reference.name),
            ),
            Some(absence) => absent_result(
                "permissions",
                "ConfigMap",
                &reference.name,
                absence,
                reference.optional,
            )
            .with_detail("reason", format!("referenced by {}", reference.source)),
        });
    }
    results
}

/// Init containers completed successfully.
pub fn init_containers(subject: &PodInfo, _config: &CheckConfig) -> Vec<CheckResult> {
    let pod = &subject.primary;
    let declared = extract::init_containers(pod);
    if declared.is_empty() {
        return vec![CheckResult::skipped("init-containers", "Pod has no init containers")];
    }
    if extract::node_name(pod).is_none() {
        return vec![CheckResult::skipped("init-containers", "Pod is not scheduled")];
    }

    let statuses = extract::init_container_statuses(pod);
    let failed = statuses.iter().find(|s| {
        s.state
            .as_ref()
            .and_then(|st| st.terminated.as_ref())
            .is_some_and(|t| t.exit_code != 0)
            || extract::waiting_reason(s).is_some_and(|r| extract::FAILURE_WAITING_REASONS.contains(&r))
            || (s.restart_count > 0
                && !s
                    .state
                    .as_ref()
                    .and_then(|st| st.terminated.as_ref())
                    .is_some_and(|t| t.exit_code == 0))
    });

    if let Some(status) = failed {
        let waiting = extract::waiting_reason(status);
        let terminated = terminated_reason(status);
        let reason = waiting
            .or(terminated.map(|(r, _)| r).filter(|r| !r.is_empty()))
            .unwrap_or("Error");
        let mut result = CheckResult::failed(
            "init-containers",
            format!("Init container {} failed ({})", status.name, reason),
        )
        .with_suggestion(waiting.and_then(suggest::waiting_reason).unwrap_or(
            "The pod will not start until this init container succeeds; inspect its logs",
        ))
        .with_detail("container", &status.name)
        .with_detail("reason", reason);
        if let Some((_, code)) = terminated {
            result = result.with_detail("exit_code", code.to_string());
        }
        return vec![result];
    }

    let completed = statuses
        .iter()
        .filter(|s| {
            s.state
                .as_ref()
                .and_then(|st| st.terminated.as_ref())
                .is_some_and(|t| t.exit_code == 0)
        })
        .count();
    if completed < declared.len() {
        return vec![
            CheckResult::warning(
                "init-containers",
                format!(
                    "Init containers still running: {}/{} completed",
                    completed,
                    declared.len()
                ),
            )
            .with_suggestion(
                "Init containers run in order; check the running one for a slow or unreachable dependency",
            ),
        ];
    }

    vec![CheckResult::passed(
        "init-containers",
        format!("All {} init containers completed", declared.len()),
    )]
}

/// OOM kills, missing requests/limits and restart counts.
pub fn resources(subject: &PodInfo, config: &CheckConfig) -> Vec<CheckResult> {
    let pod = &subject.primary;

    let oom: Vec<CheckResult> = extract::container_statuses(pod)
        .iter()
        .filter_map(|status| {
            let (reason, code) = terminated_reason(status)?;
            (reason == "OOMKilled").then(|| {
                CheckResult::failed(
                    "resources",
                    format!("Container {} was OOMKilled", status.name),
                )
                .with_suggestion("Raise the container memory limit or reduce the process's memory use")
                .with_detail("container", &status.name)
                .with_detail("reason", "OOMKilled")
                .with_detail("exit_code", code.to_string())
            })
        })
        .collect();
    if !oom.is_empty() {
        return oom;
    }

    let mut warnings = Vec::new();
    let unbounded: Vec<&str> = extract::containers(pod)
        .iter()
        .filter(|c| {
            let resources = c.resources.as_ref();
            let requests = resources.and_then(|r| r.requests.as_ref()).is_some_and(|r| !r.is_empty());
            let limits = resources.and_then(|r| r.limits.as_ref()).is_some_and(|l| !l.is_empty());
            !(requests && limits)
        })
        .map(|c| c.name.as_str())
        .collect();
    if !unbounded.is_empty() {
        warnings.push(
            CheckResult::warning(
                "resources",
                format!(
                    "Containers without resource requests or limits: {}",
                    unbounded.join(", ")
                ),
            )
            .with_suggestion(
                "Set CPU and memory requests and limits so the scheduler can place the pod and the kubelet can protect the node",
            ),
        );
    }

    for status in extract::container_statuses(pod) {
        if status.restart_count >= config.restart_warning_threshold {
            warnings.push(
                CheckResult::warning(
                    "resources",
                    format!(
                        "Container {} restarted {} times",
                        status.name, status.restart_count
                    ),
                )
                .with_suggestion("Frequent restarts point at crashes or failing liveness probes; run the logs check")
                .with_detail("container", &status.name)
                .with_detail("restarts", status.restart_count.to_string()),
            );
        }
    }
    if !warnings.is_empty() {
        return warnings;
    }

    vec![
        CheckResult::passed("resources", "Resource requests and limits are set")
            .with_detail("restarts", extract::restarts(pod).to_string()),
    ]
}

/// Pod IP assignment and readiness.
pub fn network(subject: &PodInfo, _config: &CheckConfig) -> Vec<CheckResult> {
    let pod = &subject.primary;
    if extract::node_name(pod).is_none() {
        return vec![CheckResult::skipped("network", "Pod is not scheduled")];
    }
    let phase = extract::phase(pod);
    if phase == "Succeeded" {
        return vec![CheckResult::skipped("network", "Pod has completed")];
    }

    let ip = extract::pod_ip(pod);
    if phase == "Running" && ip.is_none() {
        return vec![
            CheckResult::failed("network", "Pod is running without an IP address").with_suggestion(
                "The network plugin failed to assign an address; check the CNI pods on the node",
            ),
        ];
    }

    let ready = extract::condition(pod, "Ready");
    if ready.is_some_and(|c| c.status != "True") {
        let mut result = CheckResult::warning(
            "network",
            "Pod is not Ready, so Services do not route traffic to it",
        )
        .with_suggestion("Check the readiness probes; unready pods are left out of Service endpoints");
        if let Some(ip) = ip {
            result = result.with_detail("pod_ip", ip);
        }
        return vec![result];
    }

    match ip {
        Some(ip) => vec![
            CheckResult::passed("network", format!("Pod has IP {}", ip)).with_detail("pod_ip", ip),
        ],
        None => vec![CheckResult::skipped("network", "Pod has no IP address yet")],
    }
}

/// Persistent volume claims are bound.
pub fn volumes(subject: &PodInfo, _config: &CheckConfig) -> Vec<CheckResult> {
    let claims = &subject.dependents.claims;
    if claims.is_empty() {
        return vec![CheckResult::skipped(
            "volumes",
            "Pod mounts no PersistentVolumeClaims",
        )];
    }

    claims
        .iter()
        .map(|(name, claim)| match claim {
            Dependent::Absent(absence) => {
                absent_result("volumes", "PersistentVolumeClaim", name, absence, false)
            }
            Dependent::Present(pvc) => {
                let phase = pvc
                    .status
                    .as_ref()
                    .and_then(|s| s.phase.as_deref())
                    .unwrap_or("Pending");
                let result = match phase {
                    "Bound" => CheckResult::passed("volumes", format!("PVC '{}' is bound", name)),
                    "Lost" => CheckResult::failed("volumes", format!("PVC '{}' lost its volume", name))
                        .with_suggestion("The bound PersistentVolume is gone; restore it or recreate the claim"),
                    other => CheckResult::failed(
                        "volumes",
                        format!("PVC '{}' is {}", name, other),
                    )
                    .with_suggestion(
                        "Check the StorageClass and its provisioner; no volume satisfies the claim",
                    ),
                };
                result.with_detail("reason", phase)
            }
        })
        .collect()
}

const PRESSURE_CONDITIONS: &[&str] = &["MemoryPressure", "DiskPressure", "PIDPressure"];

/// Health of the node the pod runs on.
pub fn node(subject: &PodInfo, _config: &CheckConfig) -> Vec<CheckResult> {
    let Some(name) = extract::node_name(&subject.primary) else {
        return vec![CheckResult::skipped("node", "Pod is not scheduled")];
    };
    let Some(node) = subject.dependents.node.as_ref() else {
        return vec![CheckResult::skipped("node", "Pod is not scheduled")];
    };

    let node = match node {
        Dependent::Absent(absence) => {
            let mut result = CheckResult::warning(
                "node",
                format!("Could not verify node {}: {}", name, absence),
            )
            .with_suggestion(suggest::absence("Node", name, absence))
            .with_detail("node", name);
            if let Some(raw) = absence.raw_error() {
                result = result.with_error(raw);
            }
            return vec![result];
        }
        Dependent::Present(node) => node,
    };

    let conditions = node
        .status
        .as_ref()
        .and_then(|s| s.conditions.as_deref())
        .unwrap_or_default();
    let ready = conditions.iter().find(|c| c.type_ == "Ready");
    let result = if !ready.is_some_and(|c| c.status == "True") {
        CheckResult::failed("node", format!("Node {} is not Ready", name))
            .with_suggestion("Check the kubelet and container runtime on the node; pods on a NotReady node get evicted")
    } else if let Some(pressure) = conditions
        .iter()
        .find(|c| PRESSURE_CONDITIONS.contains(&c.type_.as_str()) && c.status == "True")
    {
        CheckResult::warning("node", format!("Node {} reports {}", name, pressure.type_))
            .with_suggestion("The node is short on resources and may evict pods; free capacity or add nodes")
            .with_detail("reason", &pressure.type_)
    } else if node
        .spec
        .as_ref()
        .and_then(|s| s.unschedulable)
        .unwrap_or(false)
    {
        CheckResult::warning("node", format!("Node {} is cordoned", name))
            .with_suggestion("The node accepts no new pods; uncordon it or expect rescheduling elsewhere")
    } else {
        CheckResult::passed("node", format!("Node {} is Ready", name))
    };
    vec![result.with_detail("node", name)]
}

/// Known failure signatures in container logs, one result per container.
pub fn logs(subject: &PodInfo, config: &CheckConfig) -> Vec<CheckResult> {
    if !subject.logs_requested {
        return vec![CheckResult::skipped(LOGS_CHECK, "Log capture was not requested")];
    }
    if subject.logs.is_empty() {
        return vec![CheckResult::skipped(LOGS_CHECK, "No container logs were captured")];
    }

    let pod = &subject.primary;
    let analyzer = LogAnalyzer::builtin();
    let statuses: Vec<&ContainerStatus> = extract::init_container_statuses(pod)
        .iter()
        .chain(extract::container_statuses(pod))
        .collect();

    let mut order: Vec<&str> = extract::all_containers(pod)
        .iter()
        .map(|c| c.name.as_str())
        .filter(|name| subject.logs.contains_key(*name))
        .collect();
    for name in subject.logs.keys() {
        if !order.contains(&name.as_str()) {
            order.push(name.as_str());
        }
    }

    order
        .into_iter()
        .filter_map(|container| subject.logs.get(container).map(|logs| (container, logs)))
        .map(|(container, captured)| {
            let mut result = match captured {
                Dependent::Absent(absence) => {
                    let result = CheckResult::warning(
                        LOGS_CHECK,
                        format!("Could not read logs of container {}: {}", container, absence),
                    )
                    .with_suggestion(match absence {
                        Absence::NotFound => {
                            "The container has not started yet or its logs were rotated away".to_string()
                        }
                        other => suggest::absence("logs of container", container, other),
                    });
                    match absence.raw_error() {
                        Some(raw) => result.with_error(raw),
                        None => result,
                    }
                }
                Dependent::Present(logs) => {
                    let status = statuses.iter().find(|s| s.name == container);
                    let crash = status.and_then(|s| {
                        analyzer.classify_crash_loop(s, &logs.text, config.crash_tail_lines)
                    });
                    let mut result = crash.unwrap_or_else(|| analyzer.classify(&logs.text));
                    if logs.previous {
                        result.message.push_str(" (previous container instance)");
                    }
                    result
                }
            };
            result.details.prepend("container", container);
            result
        })
        .collect()
}
