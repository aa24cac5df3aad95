//! Live watch controller.
//!
//! Turns a change-event subscription into a lazy, cancellable sequence of
//! reports for one resource:
//!
//! ```text
//! Idle --subscribe--> Watching --ADDED/MODIFIED--> Evaluating --emit--> Watching
//! Watching/Evaluating --DELETED | stream error | cancel | end--> Terminated
//! ```
//!
//! Events are handled one at a time. Event payloads are never used; every
//! evaluation re-reads fresh state, so a backlog of events only costs extra
//! cycles and never produces a report for a stale state.

use futures_util::{Stream, StreamExt};
use std::fmt;
use tokio_util::sync::CancellationToken;

use crate::cluster::{FetchError, WatchEvent, WatchStream};
use crate::diagnostics::engine::{DiagnoseRequest, Domain, Engine};
use crate::diagnostics::types::{DiagnosticReport, Target};

/// Why a watch ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// The resource was deleted.
    Deleted,
    /// The caller cancelled the subscription.
    Cancelled,
    /// The event stream ended on its own.
    StreamClosed,
    /// Subscribing, the stream or an evaluation failed.
    Failed,
}

impl fmt::Display for Termination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Deleted => "deleted",
            Self::Cancelled => "cancelled",
            Self::StreamClosed => "stream closed",
            Self::Failed => "failed",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatchState {
    Idle,
    Watching,
    Evaluating,
    Terminated(Termination),
}

impl WatchState {
    pub fn is_terminated(&self) -> bool {
        matches!(self, Self::Terminated(_))
    }
}

/// Errors that end a watch abnormally.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("failed to subscribe to {target}: {source}")]
    Subscribe {
        target: Target,
        #[source]
        source: FetchError,
    },

    #[error("watch stream for {target} failed: {source}")]
    Stream {
        target: Target,
        #[source]
        source: FetchError,
    },

    #[error("evaluation of {target} failed: {source}")]
    Evaluation {
        target: Target,
        #[source]
        source: FetchError,
    },
}

enum Next {
    Cancelled,
    Event(Option<Result<WatchEvent, FetchError>>),
}

/// Drives repeated evaluation cycles from a change-event stream.
pub struct WatchController<D: Domain> {
    engine: Engine<D>,
    request: DiagnoseRequest,
    target: Target,
    cancel: CancellationToken,
    events: Option<WatchStream>,
    state: WatchState,
}

impl<D: Domain> WatchController<D> {
    pub fn new(engine: Engine<D>, request: DiagnoseRequest, cancel: CancellationToken) -> Self {
        let target = engine.target(&request);
        Self {
            engine,
            request,
            target,
            cancel,
            events: None,
            state: WatchState::Idle,
        }
    }

    pub fn state(&self) -> WatchState {
        self.state
    }

    pub fn target(&self) -> &Target {
        &self.target
    }

    fn transition(&mut self, next: WatchState) {
        log::debug!("watch {}: {:?} -> {:?}", self.target, self.state, next);
        self.state = next;
        if next.is_terminated() {
            self.events = None;
        }
    }

    /// Wait for the next report.
    ///
    /// `None` means the watch ended cleanly; an `Err` is returned once and
    /// the controller is terminated afterwards.
    pub async fn next_report(&mut self) -> Option<Result<DiagnosticReport, WatchError>> {
        loop {
            match self.state {
                WatchState::Terminated(_) => return None,
                WatchState::Idle => {
                    if self.cancel.is_cancelled() {
                        self.transition(WatchState::Terminated(Termination::Cancelled));
                        return None;
                    }
                    match self.engine.reader().watch(&self.target).await {
                        Ok(stream) => {
                            self.events = Some(stream);
                            self.transition(WatchState::Watching);
                        }
                        Err(source) => {
                            self.transition(WatchState::Terminated(Termination::Failed));
                            return Some(Err(WatchError::Subscribe {
                                target: self.target.clone(),
                                source,
                            }));
                        }
                    }
                }
                // A dropped `next_report` future can leave Evaluating behind;
                // the next call simply waits for the next event.
                WatchState::Watching | WatchState::Evaluating => {
                    let Some(events) = self.events.as_mut() else {
                        self.transition(WatchState::Terminated(Termination::StreamClosed));
                        return None;
                    };
                    let next = tokio::select! {
                        biased;
                        _ = self.cancel.cancelled() => Next::Cancelled,
                        event = events.next() => Next::Event(event),
                    };

                    match next {
                        Next::Cancelled => {
                            self.transition(WatchState::Terminated(Termination::Cancelled));
                            return None;
                        }
                        Next::Event(None) => {
                            self.transition(WatchState::Terminated(Termination::StreamClosed));
                            return None;
                        }
                        Next::Event(Some(Err(source))) => {
                            self.transition(WatchState::Terminated(Termination::Failed));
                            return Some(Err(WatchError::Stream {
                                target: self.target.clone(),
                                source,
                            }));
                        }
                        Next::Event(Some(Ok(WatchEvent::Deleted))) => {
                            self.transition(WatchState::Terminated(Termination::Deleted));
                            return None;
                        }
                        Next::Event(Some(Ok(event))) => {
                            log::debug!("watch {}: {:?}", self.target, event);
                            self.transition(WatchState::Evaluating);
                            match self.engine.evaluate(&self.target, &self.request).await {
                                Ok(report) => {
                                    self.transition(WatchState::Watching);
                                    return Some(Ok(report));
                                }
                                Err(err) if err.is_not_found() => {
                                    // Gone between the event and the fetch; DELETED follows.
                                    log::debug!("watch {}: primary gone, skipping cycle", self.target);
                                    self.transition(WatchState::Watching);
                                }
                                Err(source) => {
                                    self.transition(WatchState::Terminated(Termination::Failed));
                                    return Some(Err(WatchError::Evaluation {
                                        target: self.target.clone(),
                                        source,
                                    }));
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    /// The report sequence as a stream. Ends when the controller terminates.
    pub fn into_stream(self) -> impl Stream<Item = Result<DiagnosticReport, WatchError>> {
        futures_util::stream::unfold(self, |mut controller| async move {
            controller
                .next_report()
                .await
                .map(|item| (item, controller))
        })
    }
}
