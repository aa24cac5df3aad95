//! Check registry and runner.
//!
//! Each domain builds one immutable [`CheckRegistry`] holding its catalog in
//! listing order plus its default-selection rule. The registry is injected
//! into the engine, so tests can swap in a double with their own checks.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::diagnostics::config::CheckConfig;
use crate::diagnostics::context::SubjectInfo;
use crate::diagnostics::engine::Domain;
use crate::diagnostics::types::CheckResult;

/// A named, side-effect-free evaluation of a snapshot.
pub trait Check<D: Domain>: Send + Sync {
    /// Catalog name, e.g. `scheduling`.
    fn name(&self) -> &str;

    /// One-line description shown by `kubediag checks`.
    fn description(&self) -> &str;

    /// Evaluate the snapshot. May return several results (one per dependent);
    /// their order is preserved in the report.
    fn check(&self, subject: &SubjectInfo<D>, config: &CheckConfig) -> Vec<CheckResult>;
}

/// A check backed by a plain function.
pub struct SimpleCheck<D, F>
where
    F: Fn(&SubjectInfo<D>, &CheckConfig) -> Vec<CheckResult> + Send + Sync,
    D: Domain,
{
    name: String,
    description: String,
    check_fn: F,
    _domain: PhantomData<fn() -> D>,
}

impl<D, F> SimpleCheck<D, F>
where
    F: Fn(&SubjectInfo<D>, &CheckConfig) -> Vec<CheckResult> + Send + Sync,
    D: Domain,
{
    pub fn new(name: impl Into<String>, description: impl Into<String>, check_fn: F) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            check_fn,
            _domain: PhantomData,
        }
    }
}

impl<D, F> Check<D> for SimpleCheck<D, F>
where
    F: Fn(&SubjectInfo<D>, &CheckConfig) -> Vec<CheckResult> + Send + Sync,
    D: Domain,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn description(&self) -> &str {
        &self.description
    }

    fn check(&self, subject: &SubjectInfo<D>, config: &CheckConfig) -> Vec<CheckResult> {
        (self.check_fn)(subject, config)
    }
}

/// Picks the check names to run when the caller selected none.
pub type DefaultSelection<D> = fn(&SubjectInfo<D>) -> Vec<&'static str>;

/// Immutable name → check catalog for one domain.
pub struct CheckRegistry<D: Domain> {
    checks: Vec<Arc<dyn Check<D>>>,
    defaults: DefaultSelection<D>,
}

impl<D: Domain> CheckRegistry<D> {
    pub fn new(defaults: DefaultSelection<D>) -> Self {
        Self {
            checks: Vec::new(),
            defaults,
        }
    }

    /// Add a check. A later check with the same name replaces the earlier one
    /// in its original slot.
    pub fn register(mut self, check: impl Check<D> + 'static) -> Self {
        let check: Arc<dyn Check<D>> = Arc::new(check);
        match self.checks.iter_mut().find(|c| c.name() == check.name()) {
            Some(slot) => *slot = check,
            None => self.checks.push(check),
        }
        self
    }

    /// Register a function-backed check.
    pub fn register_fn<F>(self, name: &str, description: &str, check_fn: F) -> Self
    where
        F: Fn(&SubjectInfo<D>, &CheckConfig) -> Vec<CheckResult> + Send + Sync + 'static,
    {
        self.register(SimpleCheck::new(name, description, check_fn))
    }

    pub fn get(&self, name: &str) -> Option<&dyn Check<D>> {
        self.checks
            .iter()
            .find(|c| c.name() == name)
            .map(|c| c.as_ref())
    }

    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Catalog in listing order.
    pub fn checks(&self) -> impl Iterator<Item = &dyn Check<D>> {
        self.checks.iter().map(|c| c.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.checks.iter().map(|c| c.name()).collect()
    }

    pub fn len(&self) -> usize {
        self.checks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.checks.is_empty()
    }

    /// Names the default rule picks for this snapshot.
    pub fn default_selection(&self, subject: &SubjectInfo<D>) -> Vec<String> {
        (self.defaults)(subject)
            .into_iter()
            .map(str::to_string)
            .collect()
    }

    /// Resolve a selection: empty means the default rule.
    pub fn resolve(&self, subject: &SubjectInfo<D>, selection: &[String]) -> Vec<String> {
        if selection.is_empty() {
            self.default_selection(subject)
        } else {
            selection.to_vec()
        }
    }

    /// Run the selected checks in selection order.
    ///
    /// Unknown names are skipped so selections written against another
    /// catalog version still run.
    pub fn run(
        &self,
        subject: &SubjectInfo<D>,
        selection: &[String],
        config: &CheckConfig,
    ) -> Vec<CheckResult> {
        let mut results = Vec::new();
        for name in self.resolve(subject, selection) {
            match self.get(&name) {
                Some(check) => {
                    let produced = check.check(subject, config);
                    log::trace!("check {} produced {} result(s)", name, produced.len());
                    results.extend(produced);
                }
                None => log::debug!("ignoring unknown check '{}'", name),
            }
        }
        results
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::{ClusterReader, FetchResult};
    use crate::diagnostics::context::Dependent;
    use crate::diagnostics::gather::DependentFetcher;
    use crate::diagnostics::types::{CheckStatus, ResourceKind, Target};
    use async_trait::async_trait;
    use std::collections::BTreeMap;

    /// Domain whose primary is just a phase string.
    struct Phase;

    #[async_trait]
    impl Domain for Phase {
        type Primary = String;
        type Dependents = ();

        fn kind(&self) -> ResourceKind {
            ResourceKind::Pod
        }

        async fn fetch_primary(
            &self,
            _reader: &dyn ClusterReader,
            _namespace: &str,
            _name: &str,
        ) -> FetchResult<String> {
            Ok("Running".to_string())
        }

        async fn list_primaries(
            &self,
            _reader: &dyn ClusterReader,
            _namespace: Option<&str>,
        ) -> FetchResult<Vec<Target>> {
            Ok(Vec::new())
        }

        async fn fetch_dependents(
            &self,
            _reader: &dyn ClusterReader,
            _target: &Target,
            _primary: &String,
            _fetcher: &mut DependentFetcher,
        ) {
        }

        fn catalog(&self) -> CheckRegistry<Self> {
            registry()
        }
    }

    fn subject(phase: &str) -> SubjectInfo<Phase> {
        SubjectInfo {
            target: Target::new(ResourceKind::Pod, "default", "web"),
            primary: phase.to_string(),
            dependents: (),
            events: Dependent::Present(Vec::new()),
            logs: BTreeMap::new(),
            logs_requested: false,
            absences: Vec::new(),
        }
    }

    fn defaults(subject: &SubjectInfo<Phase>) -> Vec<&'static str> {
        if subject.primary == "Failed" {
            vec!["phase", "extra"]
        } else {
            vec!["phase"]
        }
    }

    fn registry() -> CheckRegistry<Phase> {
        CheckRegistry::new(defaults)
            .register_fn("phase", "Phase is Running", |s: &SubjectInfo<Phase>, _| {
                let result = if s.primary == "Running" {
                    CheckResult::passed("phase", "running")
                } else {
                    CheckResult::failed("phase", format!("phase is {}", s.primary))
                };
                vec![result]
            })
            .register_fn("extra", "Two results", |_: &SubjectInfo<Phase>, _| {
                vec![
                    CheckResult::warning("extra", "first"),
                    CheckResult::skipped("extra", "second"),
                ]
            })
    }

    #[test]
    fn test_register_keeps_listing_order() {
        let registry = registry();
        assert_eq!(registry.names(), vec!["phase", "extra"]);
        assert_eq!(registry.len(), 2);
        assert!(registry.contains("extra"));
        assert!(registry.get("missing").is_none());
    }

    #[test]
    fn test_reregister_replaces_in_place() {
        let registry = registry().register_fn("phase", "Always fails", |_: &SubjectInfo<Phase>, _| {
            vec![CheckResult::failed("phase", "replaced")]
        });
        assert_eq!(registry.names(), vec!["phase", "extra"]);
        assert_eq!(registry.get("phase").map(|c| c.description()), Some("Always fails"));
    }

    #[test]
    fn test_empty_selection_uses_default_rule() {
        let registry = registry();
        let config = CheckConfig::default();

        let healthy = registry.run(&subject("Running"), &[], &config);
        assert_eq!(healthy.len(), 1);
        assert_eq!(healthy[0].status, CheckStatus::Passed);

        let failing = registry.run(&subject("Failed"), &[], &config);
        let names: Vec<&str> = failing.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["phase", "extra", "extra"]);
    }

    #[test]
    fn test_selection_order_and_unknown_names() {
        let registry = registry();
        let selection = vec!["extra".to_string(), "nope".to_string(), "phase".to_string()];
        let results = registry.run(&subject("Running"), &selection, &CheckConfig::default());
        let names: Vec<&str> = results.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, vec!["extra", "extra", "phase"]);
        assert_eq!(results[1].status, CheckStatus::Skipped);
    }

    #[test]
    fn test_run_is_pure() {
        let registry = registry();
        let snapshot = subject("Failed");
        let config = CheckConfig::default();
        assert_eq!(
            registry.run(&snapshot, &[], &config),
            registry.run(&snapshot, &[], &config)
        );
    }
}
