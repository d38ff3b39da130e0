//! The event-to-state reducer: folds a run's event log into per-step and
//! run-level execution state.
//!
//! ## Replay model
//!
//! The reducer is a pure function of the full ordered log. The external log
//! collaborator may redeliver already-seen events after a reconnect and may
//! deliver batches out of order relative to true event time, so the fold is:
//!
//! 1. Applied in log order.
//! 2. Resolved by event timestamp when log order and timestamps disagree,
//!    with log order as the tie-breaker.
//! 3. Idempotent: folding a log with every event duplicated produces the
//!    same lifecycle states as the unduplicated log.
//!
//! Recomputation over the accumulated log is always correct, so callers
//! simply re-run the reducer on every log growth instead of patching
//! incremental state.

use std::collections::{BTreeMap, HashMap};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::{RunEvent, RunEventData, StepError};
use crate::plan::ExecutionPlanGraph;

/// Per-step lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StepLifecycle {
    /// No event has started the step yet.
    #[default]
    Preparing,
    /// A start event has been observed.
    Running,
    /// Terminal: the step succeeded.
    Succeeded,
    /// Terminal: the step failed.
    Failed,
    /// Terminal: the step was skipped.
    Skipped,
    /// A retry was requested; awaiting the next start event.
    Retry,
    /// The run ended without a terminal event for a started step.
    Unknown,
}

impl StepLifecycle {
    /// Returns true if this is a terminal state.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Skipped)
    }
}

impl std::fmt::Display for StepLifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Preparing => write!(f, "PREPARING"),
            Self::Running => write!(f, "RUNNING"),
            Self::Succeeded => write!(f, "SUCCEEDED"),
            Self::Failed => write!(f, "FAILED"),
            Self::Skipped => write!(f, "SKIPPED"),
            Self::Retry => write!(f, "RETRY"),
            Self::Unknown => write!(f, "UNKNOWN"),
        }
    }
}

/// A marker attributed to a step, kept in log order and never deduplicated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepMarker {
    /// When the marker was produced.
    pub timestamp: DateTime<Utc>,
    /// What the marker records.
    #[serde(flatten)]
    pub kind: StepMarkerKind,
}

/// The kinds of markers a step accumulates.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "markerType", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum StepMarkerKind {
    /// A durable asset was materialized.
    Materialization {
        /// Key of the materialized asset.
        asset_key: String,
    },
    /// A data-quality expectation was evaluated.
    Expectation {
        /// Expectation label.
        label: String,
        /// Whether the expectation passed.
        passed: bool,
    },
    /// An engine-internal marker.
    Marker {
        /// Marker text.
        text: String,
    },
}

/// Derived execution state for a single step.
///
/// Mutable only by the reducer; callers receive it as part of an immutable
/// snapshot.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepRuntimeState {
    /// The step key.
    pub key: String,
    /// Current lifecycle state.
    pub lifecycle: StepLifecycle,
    /// Attempt number (0 until the first start event, increments on retry).
    pub attempt: u32,
    /// Timestamp of the first start-equivalent event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Timestamp of the terminal event.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Last structured error attributed to the step.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<StepError>,
    /// Materializations, expectation results, and engine markers in log order.
    #[serde(default)]
    pub markers: Vec<StepMarker>,
}

impl StepRuntimeState {
    fn new(key: &str) -> Self {
        Self {
            key: key.to_string(),
            lifecycle: StepLifecycle::Preparing,
            attempt: 0,
            started_at: None,
            finished_at: None,
            error: None,
            markers: Vec::new(),
        }
    }

    /// Returns the wall-clock duration of the step, when both endpoints
    /// are known.
    #[must_use]
    pub fn duration(&self) -> Option<chrono::Duration> {
        match (self.started_at, self.finished_at) {
            (Some(start), Some(end)) => Some(end - start),
            _ => None,
        }
    }
}

/// Overall run outcome, once a run-terminal event has been observed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    /// The run finished successfully.
    Succeeded,
    /// The run failed.
    Failed,
}

/// How to classify started-but-unterminated steps when the run ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UnknownTerminalPolicy {
    /// Mark such steps `UNKNOWN` (default).
    #[default]
    MarkUnknown,
    /// Treat a missing terminal event as an implicit failure.
    MarkFailed,
}

/// The derived snapshot for one run at a point in time.
///
/// Owned exclusively by the caller that invoked the reducer; each
/// recomputation produces a fresh snapshot rather than mutating a prior one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunMetadataSnapshot {
    /// Per-step state, keyed by step key.
    pub steps: BTreeMap<String, StepRuntimeState>,
    /// Earliest step start time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    /// Latest step end time or run-terminal timestamp.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,
    /// Overall run outcome, if a run-terminal event was observed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_status: Option<RunStatus>,
    /// Structured run-level error, substituted with a generic payload when
    /// the source's payload was absent or malformed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_error: Option<StepError>,
    /// Count of unrecognized events folded past without state effect.
    #[serde(default)]
    pub ignored: usize,
}

impl RunMetadataSnapshot {
    /// Returns the per-step state for a key, if any event or the plan
    /// referenced it.
    #[must_use]
    pub fn step(&self, key: &str) -> Option<&StepRuntimeState> {
        self.steps.get(key)
    }
}

/// Ordering authority for the lifecycle-affecting event most recently
/// applied to a step: `(timestamp, log index)`.
type Authority = (DateTime<Utc>, usize);

#[derive(Debug)]
struct StepFold {
    state: StepRuntimeState,
    authority: Option<Authority>,
}

impl StepFold {
    fn new(key: &str) -> Self {
        Self {
            state: StepRuntimeState::new(key),
            authority: None,
        }
    }

    /// True when an event at `(timestamp, index)` should win against the
    /// recorded authority: strictly newer timestamp, or equal timestamp and
    /// later log position.
    fn is_newer(&self, timestamp: DateTime<Utc>, index: usize) -> bool {
        match self.authority {
            None => true,
            Some((at, ai)) => timestamp > at || (timestamp == at && index > ai),
        }
    }

    fn apply_start(&mut self, timestamp: DateTime<Utc>, index: usize) {
        // Timing is derived independently of state-machine acceptance so a
        // stale start still contributes the bar's left edge.
        self.state.started_at = Some(match self.state.started_at {
            Some(existing) => existing.min(timestamp),
            None => timestamp,
        });

        match self.state.lifecycle {
            StepLifecycle::Preparing => {
                self.state.lifecycle = StepLifecycle::Running;
                self.state.attempt = self.state.attempt.max(1);
                self.authority = Some((timestamp, index));
            }
            StepLifecycle::Retry => {
                if self.is_newer(timestamp, index) {
                    self.state.lifecycle = StepLifecycle::Running;
                    self.state.attempt = self.state.attempt.saturating_add(1);
                    self.state.finished_at = None;
                    self.authority = Some((timestamp, index));
                }
            }
            StepLifecycle::Running | StepLifecycle::Unknown => {}
            StepLifecycle::Succeeded | StepLifecycle::Failed | StepLifecycle::Skipped => {
                // A terminal state is only reopened by a start that is
                // strictly newer than the terminal event; a duplicate or
                // stale start never overwrites a recorded outcome.
                if self
                    .authority
                    .is_some_and(|(at, _)| timestamp > at)
                {
                    self.state.lifecycle = StepLifecycle::Running;
                    self.state.attempt = self.state.attempt.saturating_add(1);
                    self.state.finished_at = None;
                    self.authority = Some((timestamp, index));
                }
            }
        }
    }

    fn apply_terminal(
        &mut self,
        target: StepLifecycle,
        timestamp: DateTime<Utc>,
        index: usize,
        error: Option<&StepError>,
    ) {
        if !self.is_newer(timestamp, index) {
            return;
        }

        self.state.lifecycle = target;
        self.state.finished_at = Some(timestamp);
        self.state.attempt = self.state.attempt.max(1);
        if target == StepLifecycle::Failed {
            self.state.error = Some(error.cloned().unwrap_or_else(StepError::unknown));
        }
        self.authority = Some((timestamp, index));
    }

    fn apply_retry(&mut self, timestamp: DateTime<Utc>, index: usize) {
        if !self.is_newer(timestamp, index) {
            return;
        }
        match self.state.lifecycle {
            StepLifecycle::Running
            | StepLifecycle::Succeeded
            | StepLifecycle::Failed
            | StepLifecycle::Skipped => {
                self.state.lifecycle = StepLifecycle::Retry;
                self.authority = Some((timestamp, index));
            }
            // A retry request for a step that never started carries no
            // state-machine meaning.
            StepLifecycle::Preparing | StepLifecycle::Retry | StepLifecycle::Unknown => {}
        }
    }

    fn push_marker(&mut self, timestamp: DateTime<Utc>, kind: StepMarkerKind) {
        self.state.markers.push(StepMarker { timestamp, kind });
    }
}

/// Folds an ordered event log into a [`RunMetadataSnapshot`].
///
/// Pure and idempotent: identical input yields identical output, and the
/// fold tolerates duplicated events and out-of-order timestamps as
/// described in the module docs. A plan, when supplied, pre-seeds every
/// planned step at `PREPARING` so unreferenced steps still appear in the
/// snapshot; events may also reference steps absent from the plan.
///
/// Data-quality problems never abort the fold: unrecognized variants are
/// counted and skipped, and a missing or malformed failure payload is
/// substituted with a generic error.
#[must_use]
#[tracing::instrument(skip_all, fields(events = events.len(), planned = plan.map_or(0, ExecutionPlanGraph::len)))]
pub fn derive_run_metadata(
    plan: Option<&ExecutionPlanGraph>,
    events: &[RunEvent],
    policy: UnknownTerminalPolicy,
) -> RunMetadataSnapshot {
    let mut folds: HashMap<String, StepFold> = HashMap::new();

    if let Some(plan) = plan {
        for step in plan.steps() {
            folds.insert(step.key.clone(), StepFold::new(&step.key));
        }
    }

    let mut run_status: Option<RunStatus> = None;
    let mut run_error: Option<StepError> = None;
    let mut run_authority: Option<Authority> = None;
    let mut run_terminal_at: Option<DateTime<Utc>> = None;
    let mut ignored = 0usize;

    for (index, event) in events.iter().enumerate() {
        let step_fold = event.step_key.as_deref().map(|key| {
            folds
                .entry(key.to_string())
                .or_insert_with(|| StepFold::new(key))
        });

        match &event.data {
            RunEventData::StepStarted => {
                if let Some(fold) = step_fold {
                    fold.apply_start(event.timestamp, index);
                }
            }
            RunEventData::StepSucceeded => {
                if let Some(fold) = step_fold {
                    fold.apply_terminal(StepLifecycle::Succeeded, event.timestamp, index, None);
                }
            }
            RunEventData::StepFailed { error } => {
                if let Some(fold) = step_fold {
                    fold.apply_terminal(
                        StepLifecycle::Failed,
                        event.timestamp,
                        index,
                        error.as_ref(),
                    );
                }
            }
            RunEventData::StepSkipped => {
                if let Some(fold) = step_fold {
                    fold.apply_terminal(StepLifecycle::Skipped, event.timestamp, index, None);
                }
            }
            RunEventData::StepRetryRequested => {
                if let Some(fold) = step_fold {
                    fold.apply_retry(event.timestamp, index);
                }
            }
            RunEventData::AssetMaterialized { asset_key } => {
                if let Some(fold) = step_fold {
                    fold.push_marker(
                        event.timestamp,
                        StepMarkerKind::Materialization {
                            asset_key: asset_key.clone(),
                        },
                    );
                }
            }
            RunEventData::ExpectationResult { label, passed } => {
                if let Some(fold) = step_fold {
                    fold.push_marker(
                        event.timestamp,
                        StepMarkerKind::Expectation {
                            label: label.clone(),
                            passed: *passed,
                        },
                    );
                }
            }
            RunEventData::EngineMarker { marker } => {
                if let Some(fold) = step_fold {
                    fold.push_marker(
                        event.timestamp,
                        StepMarkerKind::Marker {
                            text: marker.clone(),
                        },
                    );
                }
            }
            RunEventData::RunFailure { error } => {
                let newer = match run_authority {
                    None => true,
                    Some((at, ai)) => {
                        event.timestamp > at || (event.timestamp == at && index > ai)
                    }
                };
                if newer {
                    run_status = Some(RunStatus::Failed);
                    run_error = Some(error.clone().unwrap_or_else(StepError::unknown));
                    run_authority = Some((event.timestamp, index));
                }
                run_terminal_at = Some(
                    run_terminal_at.map_or(event.timestamp, |at| at.max(event.timestamp)),
                );
            }
            RunEventData::RunSucceeded => {
                let newer = match run_authority {
                    None => true,
                    Some((at, ai)) => {
                        event.timestamp > at || (event.timestamp == at && index > ai)
                    }
                };
                if newer {
                    run_status = Some(RunStatus::Succeeded);
                    run_error = None;
                    run_authority = Some((event.timestamp, index));
                }
                run_terminal_at = Some(
                    run_terminal_at.map_or(event.timestamp, |at| at.max(event.timestamp)),
                );
            }
            RunEventData::LogMessage => {}
            RunEventData::Unrecognized { .. } => {
                ignored = ignored.saturating_add(1);
            }
        }
    }

    let mut steps: BTreeMap<String, StepRuntimeState> = folds
        .into_iter()
        .map(|(key, fold)| (key, fold.state))
        .collect();

    // The run ended: classify started-but-unterminated steps.
    if run_status.is_some() {
        for state in steps.values_mut() {
            if matches!(state.lifecycle, StepLifecycle::Running | StepLifecycle::Retry) {
                state.lifecycle = match policy {
                    UnknownTerminalPolicy::MarkUnknown => StepLifecycle::Unknown,
                    UnknownTerminalPolicy::MarkFailed => StepLifecycle::Failed,
                };
            }
        }
    }

    let started_at = steps.values().filter_map(|s| s.started_at).min();
    let finished_at = steps
        .values()
        .filter_map(|s| s.finished_at)
        .chain(run_terminal_at)
        .max();

    RunMetadataSnapshot {
        steps,
        started_at,
        finished_at,
        run_status,
        run_error,
        ignored,
    }
}
