//! The gathered snapshot every check runs against.
//!
//! A [`SubjectInfo`] holds the primary resource plus whatever dependents the
//! domain could fetch. Dependents are never silently dropped: a failed fetch
//! is kept as [`Dependent::Absent`] with the reason, and checks must surface it.

use k8s_openapi::api::core::v1::Event;
use std::collections::BTreeMap;
use std::fmt;

use crate::cluster::FetchError;
use crate::diagnostics::engine::Domain;
use crate::diagnostics::types::Target;

/// Why a dependent is missing from the snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Absence {
    /// The API server says the object does not exist.
    NotFound,
    /// The object may exist but reading it was denied.
    Forbidden(String),
    /// The gather deadline expired before the fetch completed.
    DeadlineExceeded,
    /// Any other fetch failure, with the raw error text.
    Failed(String),
}

impl Absence {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound)
    }

    /// Whether the object might still exist (access or transport problem).
    pub fn is_unverified(&self) -> bool {
        !self.is_not_found()
    }

    /// Short human description, e.g. "access denied".
    pub fn describe(&self) -> String {
        match self {
            Self::NotFound => "not found".to_string(),
            Self::Forbidden(_) => "access denied".to_string(),
            Self::DeadlineExceeded => "gather deadline exceeded".to_string(),
            Self::Failed(reason) => format!("fetch failed: {}", reason),
        }
    }

    /// Raw error text, when there is one worth surfacing.
    pub fn raw_error(&self) -> Option<&str> {
        match self {
            Self::Forbidden(reason) | Self::Failed(reason) => Some(reason),
            _ => None,
        }
    }
}

impl fmt::Display for Absence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.describe())
    }
}

impl From<&FetchError> for Absence {
    fn from(err: &FetchError) -> Self {
        match err {
            FetchError::NotFound { .. } => Self::NotFound,
            FetchError::Forbidden { message, .. } => Self::Forbidden(message.clone()),
            FetchError::Timeout => Self::DeadlineExceeded,
            other => Self::Failed(other.to_string()),
        }
    }
}

impl From<FetchError> for Absence {
    fn from(err: FetchError) -> Self {
        Self::from(&err)
    }
}

/// A dependent lookup: either the object or the recorded reason it is absent.
#[derive(Debug, Clone, PartialEq)]
pub enum Dependent<T> {
    Present(T),
    Absent(Absence),
}

impl<T> Dependent<T> {
    pub fn present(&self) -> Option<&T> {
        match self {
            Self::Present(value) => Some(value),
            Self::Absent(_) => None,
        }
    }

    pub fn absence(&self) -> Option<&Absence> {
        match self {
            Self::Present(_) => None,
            Self::Absent(absence) => Some(absence),
        }
    }

    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Dependent<U> {
        match self {
            Self::Present(value) => Dependent::Present(f(value)),
            Self::Absent(absence) => Dependent::Absent(absence),
        }
    }

    pub fn as_ref(&self) -> Dependent<&T> {
        match self {
            Self::Present(value) => Dependent::Present(value),
            Self::Absent(absence) => Dependent::Absent(absence.clone()),
        }
    }
}

/// Log text captured for one container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedLogs {
    pub text: String,
    /// The current stream failed and this text came from the pre-restart instance.
    pub previous: bool,
}

impl CapturedLogs {
    pub fn current(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            previous: false,
        }
    }

    pub fn previous(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            previous: true,
        }
    }

    /// Non-empty lines, in order.
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.text.lines().filter(|l| !l.trim().is_empty())
    }
}

/// One evaluation cycle's snapshot. Owned by that cycle and dropped with it.
pub struct SubjectInfo<D: Domain> {
    pub target: Target,
    pub primary: D::Primary,
    pub dependents: D::Dependents,
    /// Most recent events about the primary, oldest first.
    pub events: Dependent<Vec<Event>>,
    /// Captured logs keyed by container name.
    pub logs: BTreeMap<String, Dependent<CapturedLogs>>,
    /// Whether the caller asked for log capture at all.
    pub logs_requested: bool,
    /// Every degraded fetch, labelled, in fetch order.
    pub absences: Vec<(String, Absence)>,
}

impl<D: Domain> SubjectInfo<D> {
    /// Events with the given reason, oldest first. Empty when events are absent.
    pub fn events_with_reason<'a>(&'a self, reason: &'a str) -> impl Iterator<Item = &'a Event> + 'a {
        self.events
            .present()
            .into_iter()
            .flatten()
            .filter(move |e| e.reason.as_deref() == Some(reason))
    }

    /// Events of type `Warning`, oldest first.
    pub fn warning_events(&self) -> impl Iterator<Item = &Event> {
        self.events
            .present()
            .into_iter()
            .flatten()
            .filter(|e| e.type_.as_deref() == Some("Warning"))
    }

    /// Comma-separated `label (reason)` list of degraded fetches.
    pub fn absence_summary(&self) -> String {
        self.absences
            .iter()
            .map(|(label, absence)| format!("{} ({})", label, absence))
            .collect::<Vec<_>>()
            .join(", ")
    }
}
