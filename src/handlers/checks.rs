use colored::Colorize;

use crate::diagnostics::{Domain, ResourceKind};
use crate::domains::{IngressDomain, PodDomain, ServiceDomain, ingress, pod, service};
use crate::error::Result;

/// One catalog entry as listed by `kubediag checks`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    pub name: String,
    pub description: String,
    pub default: bool,
}

fn entries<D: Domain>(domain: &D, defaults: &[&str]) -> Vec<CatalogEntry> {
    domain
        .catalog()
        .checks()
        .map(|check| CatalogEntry {
            name: check.name().to_string(),
            description: check.description().to_string(),
            default: defaults.contains(&check.name()),
        })
        .collect()
}

/// Catalog of one resource kind, in registration order.
pub fn catalog(kind: ResourceKind) -> Vec<CatalogEntry> {
    match kind {
        ResourceKind::Pod => entries(&PodDomain, pod::DEFAULT_CHECKS),
        ResourceKind::Service => entries(&ServiceDomain, service::DEFAULT_CHECKS),
        ResourceKind::Ingress => entries(&IngressDomain, ingress::DEFAULT_CHECKS),
    }
}

/// Print check catalogs, all kinds unless `only` is set.
pub fn handle_checks(only: Option<ResourceKind>) -> Result<i32> {
    let kinds: Vec<ResourceKind> = match only {
        Some(kind) => vec![kind],
        None => ResourceKind::ALL.to_vec(),
    };

    for (i, kind) in kinds.iter().enumerate() {
        if i > 0 {
            println!();
        }
        println!("{}", kind.kind_name().bold());
        for entry in catalog(*kind) {
            let marker = if entry.default {
                "default".green().to_string()
            } else if *kind == ResourceKind::Pod && entry.name == crate::diagnostics::logs::LOGS_CHECK {
                "when failing".yellow().to_string()
            } else {
                "opt-in".dimmed().to_string()
            };
            println!("  {:<16} {:<14} {}", entry.name, marker, entry.description);
        }
    }
    Ok(0)
}
