//! Run events: the append-only input stream for timeline derivation.
//!
//! Events are immutable once observed and are never retracted. Delivery is
//! at-least-once, so duplicates must be tolerated downstream; nothing in
//! this module deduplicates.
//!
//! ## Lenient ingestion
//!
//! The event schema is owned by the external data source and evolves ahead
//! of this crate. [`RunEvent::from_json`] therefore never fails: missing
//! fields take defaults and unknown discriminants become
//! [`RunEventData::Unrecognized`], which folds through the reducer as an
//! opaque log line.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use runview_core::{EventId, LogLevel};

/// Structured error payload attached to failure events.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepError {
    /// Human-readable error message.
    pub message: String,
    /// Stack trace or detail (truncated).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl StepError {
    /// Creates an error payload with a message only.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            stack: None,
        }
    }

    /// The generic substitute for an absent or malformed error payload.
    #[must_use]
    pub fn unknown() -> Self {
        Self::new("Unknown error")
    }
}

/// Discriminated payload of a run event.
///
/// The variant set is extensible on the wire; anything this crate does not
/// recognize is preserved as [`Self::Unrecognized`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "eventType", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum RunEventData {
    /// A step began executing.
    StepStarted,
    /// A step finished successfully.
    StepSucceeded,
    /// A step failed.
    StepFailed {
        /// Structured error, when the source supplied one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<StepError>,
    },
    /// A step was skipped (typically because an upstream step failed).
    StepSkipped,
    /// A retry was requested for a step.
    StepRetryRequested,
    /// A step materialized a durable asset.
    AssetMaterialized {
        /// Key of the materialized asset.
        asset_key: String,
    },
    /// A data-quality expectation was evaluated.
    ExpectationResult {
        /// Expectation label.
        label: String,
        /// Whether the expectation passed.
        passed: bool,
    },
    /// An engine-internal marker (e.g. resource setup).
    EngineMarker {
        /// Marker text.
        marker: String,
    },
    /// An ordinary log line with no state-machine significance.
    LogMessage,
    /// The run failed at run level.
    RunFailure {
        /// Structured error, when the source supplied one.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<StepError>,
    },
    /// The run finished successfully.
    RunSucceeded,
    /// A variant this crate does not recognize; kept verbatim.
    Unrecognized {
        /// The original payload.
        raw: serde_json::Value,
    },
}

impl RunEventData {
    /// Returns the `snake_case` variant label used by `type:` filters.
    #[must_use]
    pub const fn variant_label(&self) -> &'static str {
        match self {
            Self::StepStarted => "step_started",
            Self::StepSucceeded => "step_succeeded",
            Self::StepFailed { .. } => "step_failed",
            Self::StepSkipped => "step_skipped",
            Self::StepRetryRequested => "step_retry_requested",
            Self::AssetMaterialized { .. } => "materialization",
            Self::ExpectationResult { .. } => "expectation",
            Self::EngineMarker { .. } => "engine",
            Self::LogMessage => "log",
            Self::RunFailure { .. } => "run_failure",
            Self::RunSucceeded => "run_succeeded",
            Self::Unrecognized { .. } => "unrecognized",
        }
    }

    /// Returns true if this payload belongs to the given `type:` filter
    /// category.
    ///
    /// A category is usually a single [`Self::variant_label`]; `failure`
    /// additionally covers both step-level and run-level failures.
    #[must_use]
    pub fn matches_type_label(&self, label: &str) -> bool {
        if label == "failure" {
            return matches!(self, Self::StepFailed { .. } | Self::RunFailure { .. });
        }
        self.variant_label() == label
    }

    /// Returns true for start-equivalent step events.
    #[must_use]
    pub const fn is_step_start(&self) -> bool {
        matches!(self, Self::StepStarted)
    }

    /// Returns true for terminal step events.
    #[must_use]
    pub const fn is_step_terminal(&self) -> bool {
        matches!(
            self,
            Self::StepSucceeded | Self::StepFailed { .. } | Self::StepSkipped
        )
    }

    /// Returns true for run-terminal events.
    #[must_use]
    pub const fn is_run_terminal(&self) -> bool {
        matches!(self, Self::RunFailure { .. } | Self::RunSucceeded)
    }
}

/// A single timestamped, leveled record from the run's event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunEvent {
    /// Source-assigned event identifier, when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<EventId>,
    /// Human-readable message.
    pub message: String,
    /// When the event occurred (source clock).
    pub timestamp: DateTime<Utc>,
    /// Severity.
    #[serde(default)]
    pub level: LogLevel,
    /// The step this event is attributed to, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub step_key: Option<String>,
    /// The discriminated payload.
    #[serde(flatten)]
    pub data: RunEventData,
}

impl RunEvent {
    /// Creates a run-level event at `Info` severity.
    #[must_use]
    pub fn new(
        timestamp: DateTime<Utc>,
        message: impl Into<String>,
        data: RunEventData,
    ) -> Self {
        Self {
            id: None,
            message: message.into(),
            timestamp,
            level: LogLevel::Info,
            step_key: None,
            data,
        }
    }

    /// Creates an event attributed to a step at `Info` severity.
    #[must_use]
    pub fn for_step(
        step_key: impl Into<String>,
        timestamp: DateTime<Utc>,
        message: impl Into<String>,
        data: RunEventData,
    ) -> Self {
        let mut event = Self::new(timestamp, message, data);
        event.step_key = Some(step_key.into());
        event
    }

    /// Sets the severity.
    #[must_use]
    pub const fn with_level(mut self, level: LogLevel) -> Self {
        self.level = level;
        self
    }

    /// Sets the source-assigned event identifier.
    #[must_use]
    pub const fn with_id(mut self, id: EventId) -> Self {
        self.id = Some(id);
        self
    }

    /// Builds an event from an arbitrary JSON value without failing.
    ///
    /// Missing envelope fields take defaults (empty message, epoch
    /// timestamp, `Info` level); a payload that does not deserialize into a
    /// known variant is preserved as [`RunEventData::Unrecognized`].
    #[must_use]
    pub fn from_json(value: serde_json::Value) -> Self {
        let object = value.as_object();

        let message = object
            .and_then(|obj| obj.get("message"))
            .and_then(serde_json::Value::as_str)
            .unwrap_or_default()
            .to_string();

        let timestamp = object
            .and_then(|obj| obj.get("timestamp"))
            .and_then(parse_timestamp)
            .unwrap_or(DateTime::UNIX_EPOCH);

        let level = object
            .and_then(|obj| obj.get("level"))
            .and_then(serde_json::Value::as_str)
            .and_then(|label| label.parse().ok())
            .unwrap_or_default();

        let step_key = object
            .and_then(|obj| obj.get("stepKey"))
            .and_then(serde_json::Value::as_str)
            .map(ToString::to_string);

        let id = object
            .and_then(|obj| obj.get("id"))
            .and_then(serde_json::Value::as_str)
            .and_then(|raw| raw.parse().ok());

        let data = match serde_json::from_value::<RunEventData>(value.clone()) {
            Ok(data) => data,
            Err(reason) => {
                tracing::debug!(%reason, "unrecognized run event payload");
                RunEventData::Unrecognized { raw: value }
            }
        };

        Self {
            id,
            message,
            timestamp,
            level,
            step_key,
            data,
        }
    }
}

fn parse_timestamp(value: &serde_json::Value) -> Option<DateTime<Utc>> {
    if let Some(raw) = value.as_str() {
        return raw.parse().ok();
    }
    value.as_i64().and_then(DateTime::from_timestamp_millis)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn at(millis: i64) -> DateTime<Utc> {
        DateTime::from_timestamp_millis(millis).unwrap()
    }

    #[test]
    fn events_serialize_with_flattened_discriminant() {
        let event = RunEvent::for_step(
            "ingest",
            at(1_000),
            "Started execution of ingest",
            RunEventData::StepStarted,
        );
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"eventType\":\"stepStarted\""));
        assert!(json.contains("\"stepKey\":\"ingest\""));
    }

    #[test]
    fn events_roundtrip_through_json() {
        let event = RunEvent::for_step(
            "transform",
            at(2_000),
            "transform failed",
            RunEventData::StepFailed {
                error: Some(StepError::new("boom")),
            },
        )
        .with_level(LogLevel::Error);

        let json = serde_json::to_value(&event).unwrap();
        let parsed: RunEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, event);
    }

    #[test]
    fn from_json_reads_camel_case_fields() {
        let event = RunEvent::from_json(json!({
            "eventType": "assetMaterialized",
            "message": "materialized users table",
            "timestamp": "2024-03-01T12:00:00Z",
            "level": "INFO",
            "stepKey": "load",
            "assetKey": "analytics.users"
        }));

        assert_eq!(event.step_key.as_deref(), Some("load"));
        assert_eq!(
            event.data,
            RunEventData::AssetMaterialized {
                asset_key: "analytics.users".into()
            }
        );
    }

    #[test]
    fn from_json_accepts_epoch_millis_timestamps() {
        let event = RunEvent::from_json(json!({
            "eventType": "logMessage",
            "message": "hello",
            "timestamp": 1_700_000_000_000_i64
        }));
        assert_eq!(event.timestamp.timestamp_millis(), 1_700_000_000_000);
    }

    #[test]
    fn from_json_degrades_unknown_variants() {
        let raw = json!({
            "eventType": "hologramProjected",
            "message": "novel event",
            "timestamp": "2024-03-01T12:00:00Z"
        });
        let event = RunEvent::from_json(raw.clone());
        assert_eq!(event.message, "novel event");
        assert_eq!(event.data, RunEventData::Unrecognized { raw });
    }

    #[test]
    fn from_json_defaults_missing_fields() {
        let event = RunEvent::from_json(json!({"eventType": "stepStarted"}));
        assert_eq!(event.message, "");
        assert_eq!(event.timestamp, DateTime::UNIX_EPOCH);
        assert_eq!(event.level, LogLevel::Info);
        assert!(event.step_key.is_none());
        assert_eq!(event.data, RunEventData::StepStarted);
    }

    #[test]
    fn from_json_never_fails_on_non_objects() {
        let event = RunEvent::from_json(json!("just a string"));
        assert!(matches!(event.data, RunEventData::Unrecognized { .. }));
    }

    #[test]
    fn failure_category_covers_step_and_run_failures() {
        assert!(RunEventData::StepFailed { error: None }.matches_type_label("failure"));
        assert!(RunEventData::RunFailure { error: None }.matches_type_label("failure"));
        assert!(!RunEventData::StepSucceeded.matches_type_label("failure"));
        assert!(RunEventData::StepFailed { error: None }.matches_type_label("step_failed"));
        assert!(!RunEventData::RunFailure { error: None }.matches_type_label("step_failed"));
    }

    #[test]
    fn classifiers_partition_the_variants() {
        assert!(RunEventData::StepStarted.is_step_start());
        assert!(RunEventData::StepSucceeded.is_step_terminal());
        assert!(RunEventData::StepFailed { error: None }.is_step_terminal());
        assert!(RunEventData::StepSkipped.is_step_terminal());
        assert!(RunEventData::RunSucceeded.is_run_terminal());
        assert!(!RunEventData::LogMessage.is_step_terminal());
        assert!(!RunEventData::StepRetryRequested.is_run_terminal());
    }
}
