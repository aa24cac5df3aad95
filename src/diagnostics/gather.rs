//! Snapshot gathering.
//!
//! The primary fetch is fatal on failure. Every dependent fetch after it is
//! best-effort: a failure becomes a recorded [`Absence`], never an error.
//! All fetches share one deadline; once it expires, remaining fetches resolve
//! to [`Absence::DeadlineExceeded`] immediately.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Event;
use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::cluster::{ClusterReader, FetchError, FetchResult, LogRequest};
use crate::diagnostics::context::{Absence, CapturedLogs, Dependent, SubjectInfo};
use crate::diagnostics::engine::Domain;
use crate::diagnostics::types::Target;

/// When container logs are fetched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogCapture {
    Off,
    /// Only for subjects the domain judges failing.
    IfFailing,
    Always,
}

/// Options for one gather pass.
#[derive(Debug, Clone)]
pub struct GatherOptions {
    pub logs: LogCapture,
    pub tail_lines: Option<i64>,
    /// Bound on the sum of all fetch calls.
    pub deadline: Option<Duration>,
    /// Most recent events kept.
    pub max_events: usize,
}

impl Default for GatherOptions {
    fn default() -> Self {
        Self {
            logs: LogCapture::Off,
            tail_lines: Some(100),
            deadline: None,
            max_events: 20,
        }
    }
}

/// Runs dependent fetches under the shared deadline and records absences.
pub struct DependentFetcher {
    deadline: Option<Instant>,
    absences: Vec<(String, Absence)>,
}

impl DependentFetcher {
    pub fn new(deadline: Option<Duration>) -> Self {
        Self {
            deadline: deadline.map(|d| Instant::now() + d),
            absences: Vec::new(),
        }
    }

    /// Whether the deadline has passed.
    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Run a fetch under the deadline without recording anything.
    pub async fn attempt<T, F>(&self, fut: F) -> FetchResult<T>
    where
        F: Future<Output = FetchResult<T>>,
    {
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(FetchError::Timeout),
            Some(deadline) => tokio::time::timeout_at(deadline, fut)
                .await
                .unwrap_or(Err(FetchError::Timeout)),
            None => fut.await,
        }
    }

    /// Fetch a dependent; a failure is recorded under `label`.
    pub async fn fetch<T, F>(&mut self, label: impl Into<String>, fut: F) -> Dependent<T>
    where
        F: Future<Output = FetchResult<T>>,
    {
        match self.attempt(fut).await {
            Ok(value) => Dependent::Present(value),
            Err(err) => self.absent(label, Absence::from(err)),
        }
    }

    /// Record an absence and return it as a dependent.
    pub fn absent<T>(&mut self, label: impl Into<String>, absence: Absence) -> Dependent<T> {
        let label = label.into();
        log::debug!("dependent absent: {} ({})", label, absence);
        self.absences.push((label, absence.clone()));
        Dependent::Absent(absence)
    }

    pub fn absences(&self) -> &[(String, Absence)] {
        &self.absences
    }

    pub fn into_absences(self) -> Vec<(String, Absence)> {
        self.absences
    }
}

/// Fetch one container's logs, falling back once to the pre-restart stream.
pub async fn capture_container_logs(
    reader: &dyn ClusterReader,
    fetcher: &mut DependentFetcher,
    namespace: &str,
    pod: &str,
    request: LogRequest,
) -> Dependent<CapturedLogs> {
    let label = format!("logs/{}", request.container);
    match fetcher
        .attempt(reader.pod_logs(namespace, pod, &request))
        .await
    {
        Ok(text) => Dependent::Present(CapturedLogs::current(text)),
        Err(err) => {
            log::debug!(
                "current logs of {}/{} unavailable ({}), trying previous instance",
                pod,
                request.container,
                err
            );
            match fetcher
                .attempt(reader.pod_logs(namespace, pod, &request.previous()))
                .await
            {
                Ok(text) => Dependent::Present(CapturedLogs::previous(text)),
                Err(previous) => fetcher.absent(label, log_absence(err, previous)),
            }
        }
    }
}

/// Absence recorded when both log streams fail. A missing previous instance
/// says nothing new, so any other failure of the current stream wins.
fn log_absence(current: FetchError, previous: FetchError) -> Absence {
    let previous = Absence::from(previous);
    match Absence::from(current) {
        Absence::NotFound => previous,
        current if matches!(previous, Absence::NotFound) => current,
        _ => previous,
    }
}

/// When an event last fired: `lastTimestamp`, else `eventTime`, else
/// `firstTimestamp`.
pub fn event_time(event: &Event) -> Option<DateTime<Utc>> {
    let stamp = event
        .last_timestamp
        .as_ref()
        .map(serde_json::to_value)
        .or_else(|| event.event_time.as_ref().map(serde_json::to_value))
        .or_else(|| event.first_timestamp.as_ref().map(serde_json::to_value))?
        .ok()?;
    DateTime::parse_from_rfc3339(stamp.as_str()?)
        .ok()
        .map(|t| t.with_timezone(&Utc))
}

/// Order events oldest first. The API lists them by name, and a repeating
/// event keeps its first name while its timestamp moves on. Undated events
/// keep their list order ahead of dated ones.
pub fn sort_events(events: &mut [Event]) {
    events.sort_by_key(event_time);
}

/// Keep the `max` most recent events, oldest first.
pub fn bound_events<T>(mut events: Vec<T>, max: usize) -> Vec<T> {
    if events.len() > max {
        events.drain(..events.len() - max);
    }
    events
}

/// Build a snapshot of `target`. Only a primary fetch failure is an error.
pub async fn gather<D: Domain>(
    domain: &D,
    reader: &dyn ClusterReader,
    target: &Target,
    options: &GatherOptions,
) -> FetchResult<SubjectInfo<D>> {
    let mut fetcher = DependentFetcher::new(options.deadline);

    let primary = fetcher
        .attempt(domain.fetch_primary(reader, &target.namespace, &target.name))
        .await?;

    let dependents = domain
        .fetch_dependents(reader, target, &primary, &mut fetcher)
        .await;

    let events = fetcher
        .fetch(
            "events",
            reader.list_events(&target.namespace, target.kind.kind_name(), &target.name),
        )
        .await
        .map(|mut events| {
            sort_events(&mut events);
            bound_events(events, options.max_events)
        });

    let capture = match options.logs {
        LogCapture::Off => false,
        LogCapture::IfFailing => domain.is_failing(&primary),
        LogCapture::Always => true,
    };
    let logs = if capture {
        domain
            .capture_logs(reader, target, &primary, options.tail_lines, &mut fetcher)
            .await
    } else {
        BTreeMap::new()
    };

    Ok(SubjectInfo {
        target: target.clone(),
        primary,
        dependents,
        events,
        logs,
        logs_requested: options.logs != LogCapture::Off,
        absences: fetcher.into_absences(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cluster::MemoryReader;

    #[test]
    fn test_bound_events_keeps_most_recent() {
        assert_eq!(bound_events(vec![1, 2, 3, 4, 5], 3), vec![3, 4, 5]);
        assert_eq!(bound_events(vec![1, 2], 3), vec![1, 2]);
        assert!(bound_events(vec![1, 2], 0).is_empty());
    }

    fn event(name: &str, last: Option<&str>, first: &str) -> Event {
        serde_json::from_value(serde_json::json!({
            "metadata": {"name": name, "namespace": "default"},
            "involvedObject": {"kind": "Pod", "name": "web"},
            "reason": "FailedScheduling",
            "firstTimestamp": first,
            "lastTimestamp": last,
        }))
        .unwrap()
    }

    #[test]
    fn test_events_sorted_by_last_seen() {
        // Listed by name; the repeating event kept its first-seen name.
        let mut events = vec![
            event("web.a", Some("2024-05-01T10:30:00Z"), "2024-05-01T09:00:00Z"),
            event("web.b", Some("2024-05-01T09:10:00Z"), "2024-05-01T09:10:00Z"),
            event("web.c", None, "2024-05-01T09:20:00Z"),
        ];
        sort_events(&mut events);
        let names: Vec<&str> = events
            .iter()
            .filter_map(|e| e.metadata.name.as_deref())
            .collect();
        assert_eq!(names, vec!["web.b", "web.c", "web.a"]);

        let kept = bound_events(events, 1);
        assert_eq!(kept[0].metadata.name.as_deref(), Some("web.a"));
    }

    #[test]
    fn test_event_time_falls_back_to_first_timestamp() {
        let undated_last = event("web.c", None, "2024-05-01T09:20:00Z");
        let time = event_time(&undated_last).unwrap();
        assert_eq!(time.to_rfc3339(), "2024-05-01T09:20:00+00:00");
    }

    #[test]
    fn test_log_absence_prefers_informative_failure() {
        let denied = || FetchError::forbidden("Pod logs", "web", "pods/log is forbidden");
        let missing = || FetchError::not_found("Pod logs", "web/app");

        let absence = log_absence(denied(), missing());
        assert!(matches!(absence, Absence::Forbidden(_)));
        assert_eq!(log_absence(missing(), missing()), Absence::NotFound);
        assert_eq!(log_absence(missing(), FetchError::Timeout), Absence::DeadlineExceeded);
    }

    #[tokio::test]
    async fn test_fetch_records_absence() {
        let mut fetcher = DependentFetcher::new(None);
        let found: Dependent<u32> = fetcher.fetch("ok", async { Ok(1) }).await;
        assert!(found.is_present());

        let missing: Dependent<u32> = fetcher
            .fetch("secret/db", async { Err(FetchError::not_found("Secret", "db")) })
            .await;
        assert_eq!(missing.absence(), Some(&Absence::NotFound));
        assert_eq!(
            fetcher.absences(),
            &[("secret/db".to_string(), Absence::NotFound)]
        );
    }

    #[tokio::test]
    async fn test_expired_deadline_marks_fetch_absent() {
        let mut fetcher = DependentFetcher::new(Some(Duration::from_millis(10)));
        let slow: Dependent<u32> = fetcher
            .fetch("node", async {
                tokio::time::sleep(Duration::from_secs(5)).await;
                Ok(1)
            })
            .await;
        assert_eq!(slow.absence(), Some(&Absence::DeadlineExceeded));
        assert!(fetcher.expired());

        let instant: Dependent<u32> = fetcher.fetch("events", async { Ok(2) }).await;
        assert_eq!(instant.absence(), Some(&Absence::DeadlineExceeded));
        assert_eq!(fetcher.absences().len(), 2);
    }

    #[tokio::test]
    async fn test_log_capture_falls_back_to_previous_once() {
        let reader = MemoryReader::new().with_previous_logs("default", "web", "app", "boom");
        let mut fetcher = DependentFetcher::new(None);
        let logs = capture_container_logs(
            &reader,
            &mut fetcher,
            "default",
            "web",
            LogRequest::current("app", Some(10)),
        )
        .await;
        assert_eq!(logs.present(), Some(&CapturedLogs::previous("boom")));
        assert!(fetcher.absences().is_empty());
    }

    #[tokio::test]
    async fn test_log_capture_records_absence_when_both_streams_fail() {
        let reader = MemoryReader::new();
        let mut fetcher = DependentFetcher::new(None);
        let logs = capture_container_logs(
            &reader,
            &mut fetcher,
            "default",
            "web",
            LogRequest::current("app", None),
        )
        .await;
        assert_eq!(logs.absence(), Some(&Absence::NotFound));
        assert_eq!(fetcher.absences()[0].0, "logs/app");
    }
}
