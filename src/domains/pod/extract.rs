//! Pod field extraction.

use k8s_openapi::api::core::v1::{Container, ContainerStatus, Pod, PodCondition};

/// Waiting reasons that mean the container will not start without help.
pub const FAILURE_WAITING_REASONS: &[&str] = &[
    "CrashLoopBackOff",
    "ErrImagePull",
    "ImagePullBackOff",
    "InvalidImageName",
    "CreateContainerConfigError",
    "CreateContainerError",
    "RunContainerError",
];

/// Waiting reasons of an image pull failure.
pub const IMAGE_PULL_REASONS: &[&str] = &["ErrImagePull", "ImagePullBackOff", "InvalidImageName"];

/// Reference names are `String` in recent API versions and `Option<String>`
/// in older ones; both read the same here.
pub(crate) trait ReferenceName {
    fn reference_name(&self) -> Option<&str>;
}

impl ReferenceName for String {
    fn reference_name(&self) -> Option<&str> {
        (!self.is_empty()).then_some(self.as_str())
    }
}

impl ReferenceName for Option<String> {
    fn reference_name(&self) -> Option<&str> {
        self.as_deref().filter(|n| !n.is_empty())
    }
}

pub fn phase(pod: &Pod) -> &str {
    pod.status
        .as_ref()
        .and_then(|s| s.phase.as_deref())
        .unwrap_or("Unknown")
}

pub fn node_name(pod: &Pod) -> Option<&str> {
    pod.spec
        .as_ref()
        .and_then(|s| s.node_name.as_deref())
        .filter(|n| !n.is_empty())
}

pub fn pod_ip(pod: &Pod) -> Option<&str> {
    pod.status
        .as_ref()
        .and_then(|s| s.pod_ip.as_deref())
        .filter(|ip| !ip.is_empty())
}

/// Init containers followed by regular containers.
pub fn all_containers(pod: &Pod) -> Vec<&Container> {
    let Some(spec) = pod.spec.as_ref() else {
        return Vec::new();
    };
    spec.init_containers
        .iter()
        .flatten()
        .chain(spec.containers.iter())
        .collect()
}

pub fn containers(pod: &Pod) -> &[Container] {
    pod.spec
        .as_ref()
        .map(|s| s.containers.as_slice())
        .unwrap_or_default()
}

pub fn init_containers(pod: &Pod) -> &[Container] {
    pod.spec
        .as_ref()
        .and_then(|s| s.init_containers.as_deref())
        .unwrap_or_default()
}

pub fn container_statuses(pod: &Pod) -> &[ContainerStatus] {
    pod.status
        .as_ref()
        .and_then(|s| s.container_statuses.as_deref())
        .unwrap_or_default()
}

pub fn init_container_statuses(pod: &Pod) -> &[ContainerStatus] {
    pod.status
        .as_ref()
        .and_then(|s| s.init_container_statuses.as_deref())
        .unwrap_or_default()
}

pub fn condition<'a>(pod: &'a Pod, type_: &str) -> Option<&'a PodCondition> {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .and_then(|conditions| conditions.iter().find(|c| c.type_ == type_))
}

/// Whether the condition is present with status `True`.
pub fn condition_true(pod: &Pod, type_: &str) -> bool {
    condition(pod, type_).is_some_and(|c| c.status == "True")
}

/// `(ready, total)` over regular containers.
pub fn ready_counts(pod: &Pod) -> (usize, usize) {
    let statuses = container_statuses(pod);
    let ready = statuses.iter().filter(|s| s.ready).count();
    (ready, containers(pod).len().max(statuses.len()))
}

/// Total restarts across regular containers.
pub fn restarts(pod: &Pod) -> i32 {
    container_statuses(pod).iter().map(|s| s.restart_count).sum()
}

pub fn waiting_reason(status: &ContainerStatus) -> Option<&str> {
    status
        .state
        .as_ref()
        .and_then(|s| s.waiting.as_ref())
        .and_then(|w| w.reason.as_deref())
}

pub fn waiting_message(status: &ContainerStatus) -> Option<&str> {
    status
        .state
        .as_ref()
        .and_then(|s| s.waiting.as_ref())
        .and_then(|w| w.message.as_deref())
}

/// Whether the pod looks unhealthy enough to justify fetching logs.
///
/// Errs on the side of `true`.
pub fn is_failing(pod: &Pod) -> bool {
    if matches!(phase(pod), "Failed" | "Pending") {
        return true;
    }
    container_statuses(pod)
        .iter()
        .chain(init_container_statuses(pod))
        .any(|s| {
            s.restart_count > 0
                || waiting_reason(s).is_some_and(|r| FAILURE_WAITING_REASONS.contains(&r))
        })
}

/// A named object a pod depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectRef {
    pub name: String,
    /// Every use of the reference is marked optional.
    pub optional: bool,
    /// First place the reference was seen, e.g. `env app/DB_PASSWORD`.
    pub source: String,
}

/// Everything a pod references by name.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PodReferences {
    /// Explicit service account, `None` for the namespace default.
    pub service_account: Option<String>,
    pub secrets: Vec<ObjectRef>,
    pub config_maps: Vec<ObjectRef>,
    pub claims: Vec<String>,
}

impl PodReferences {
    pub fn is_empty(&self) -> bool {
        self.service_account.is_none()
            && self.secrets.is_empty()
            && self.config_maps.is_empty()
            && self.claims.is_empty()
    }
}

fn add_ref(refs: &mut Vec<ObjectRef>, name: &str, optional: bool, source: String) {
    match refs.iter_mut().find(|r| r.name == name) {
        Some(existing) => existing.optional &= optional,
        None => refs.push(ObjectRef {
            name: name.to_string(),
            optional,
            source,
        }),
    }
}

/// Collect secret, config map, claim and service account references.
///
/// Each name appears once, in first-seen order.
pub fn references(pod: &Pod) -> PodReferences {
    let mut refs = PodReferences::default();
    let Some(spec) = pod.spec.as_ref() else {
        return refs;
    };

    refs.service_account = spec
        .service_account_name
        .as_deref()
        .filter(|n| !n.is_empty() && *n != "default")
        .map(str::to_string);

    for secret in spec.image_pull_secrets.iter().flatten() {
        if let Some(name) = secret.name.reference_name() {
            add_ref(&mut refs.secrets, name, false, "imagePullSecrets".to_string());
        }
    }

    for container in all_containers(pod) {
        for env in container.env.iter().flatten() {
            let Some(source) = env.value_from.as_ref() else {
                continue;
            };
            let origin = format!("env {}/{}", container.name, env.name);
            if let Some(key) = source.secret_key_ref.as_ref()
                && let Some(name) = key.name.reference_name()
            {
                add_ref(&mut refs.secrets, name, key.optional.unwrap_or(false), origin.clone());
            }
            if let Some(key) = source.config_map_key_ref.as_ref()
                && let Some(name) = key.name.reference_name()
            {
                add_ref(&mut refs.config_maps, name, key.optional.unwrap_or(false), origin);
            }
        }
        for env_from in container.env_from.iter().flatten() {
            let origin = format!("envFrom {}", container.name);
            if let Some(source) = env_from.secret_ref.as_ref()
                && let Some(name) = source.name.reference_name()
            {
                add_ref(&mut refs.secrets, name, source.optional.unwrap_or(false), origin.clone());
            }
            if let Some(source) = env_from.config_map_ref.as_ref()
                && let Some(name) = source.name.reference_name()
            {
                add_ref(&mut refs.config_maps, name, source.optional.unwrap_or(false), origin);
            }
        }
    }

    for volume in spec.volumes.iter().flatten() {
        let origin = format!("volume {}", volume.name);
        if let Some(secret) = volume.secret.as_ref()
            && let Some(name) = secret.secret_name.reference_name()
        {
            add_ref(&mut refs.secrets, name, secret.optional.unwrap_or(false), origin.clone());
        }
        if let Some(config_map) = volume.config_map.as_ref()
            && let Some(name) = config_map.name.reference_name()
        {
            add_ref(
                &mut refs.config_maps,
                name,
                config_map.optional.unwrap_or(false),
                origin.clone(),
            );
        }
        if let Some(projected) = volume.projected.as_ref() {
            for source in projected.sources.iter().flatten() {
                if let Some(secret) = source.secret.as_ref()
                    && let Some(name) = secret.name.reference_name()
                {
                    add_ref(&mut refs.secrets, name, secret.optional.unwrap_or(false), origin.clone());
                }
                if let Some(config_map) = source.config_map.as_ref()
                    && let Some(name) = config_map.name.reference_name()
                {
                    add_ref(
                        &mut refs.config_maps,
                        name,
                        config_map.optional.unwrap_or(false),
                        origin.clone(),
                    );
                }
            }
        }
        if let Some(claim) = volume.persistent_volume_claim.as_ref()
            && let Some(name) = claim.claim_name.reference_name()
            && !refs.claims.iter().any(|c| c == name)
        {
            refs.claims.push(name.to_string());
        }
    }

    refs
}

/// Whether an image reference pins no tag or the `latest` tag.
pub fn uses_latest_tag(image: &str) -> bool {
    if image.contains('@') {
        return false;
    }
    let last_segment = image.rsplit('/').next().unwrap_or(image);
    match last_segment.split_once(':') {
        Some((_, tag)) => tag == "latest",
        None => true,
    }
}
