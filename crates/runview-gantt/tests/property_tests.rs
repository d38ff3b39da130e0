//! Property-based tests for reducer and filter invariants.
//!
//! These use proptest to verify invariants hold across randomly generated
//! event logs.

#![allow(clippy::expect_used, clippy::unwrap_used)]

use chrono::DateTime;
use proptest::prelude::*;

use runview_gantt::events::{RunEvent, RunEventData, StepError};
use runview_gantt::filter::{apply_filter, FilterState};
use runview_gantt::metadata::{derive_run_metadata, StepLifecycle, UnknownTerminalPolicy};

fn arb_step_key() -> impl Strategy<Value = String> {
    prop::sample::select(vec!["ingest", "transform", "load", "publish"]).prop_map(String::from)
}

fn arb_event_data() -> impl Strategy<Value = RunEventData> {
    prop_oneof![
        Just(RunEventData::StepStarted),
        Just(RunEventData::StepSucceeded),
        Just(RunEventData::StepFailed {
            error: Some(StepError::new("boom"))
        }),
        Just(RunEventData::StepSkipped),
        Just(RunEventData::StepRetryRequested),
        Just(RunEventData::LogMessage),
        "[a-z]{3,8}".prop_map(|asset_key| RunEventData::AssetMaterialized { asset_key }),
    ]
}

fn arb_event() -> impl Strategy<Value = RunEvent> {
    (arb_step_key(), 0i64..10_000, arb_event_data(), "[a-z ]{0,20}").prop_map(
        |(step_key, millis, data, message)| {
            RunEvent::for_step(
                step_key,
                DateTime::from_timestamp_millis(millis).unwrap(),
                message,
                data,
            )
        },
    )
}

fn arb_log() -> impl Strategy<Value = Vec<RunEvent>> {
    prop::collection::vec(arb_event(), 0..40)
}

proptest! {
    #[test]
    fn reducer_is_idempotent_on_identical_input(events in arb_log()) {
        let first = derive_run_metadata(None, &events, UnknownTerminalPolicy::default());
        let second = derive_run_metadata(None, &events, UnknownTerminalPolicy::default());
        prop_assert_eq!(first, second);
    }

    #[test]
    fn duplicating_the_log_preserves_lifecycles(events in arb_log()) {
        let mut duplicated = events.clone();
        duplicated.extend(events.clone());

        let base = derive_run_metadata(None, &events, UnknownTerminalPolicy::default());
        let doubled = derive_run_metadata(None, &duplicated, UnknownTerminalPolicy::default());

        for (key, state) in &base.steps {
            prop_assert_eq!(state.lifecycle, doubled.steps[key].lifecycle);
            prop_assert_eq!(state.started_at, doubled.steps[key].started_at);
            prop_assert_eq!(state.finished_at, doubled.steps[key].finished_at);
        }
    }

    #[test]
    fn extending_the_log_never_reverts_a_terminal_to_preparing(events in arb_log(), extra in arb_event()) {
        let base = derive_run_metadata(None, &events, UnknownTerminalPolicy::default());

        let mut extended_events = events.clone();
        extended_events.push(extra);
        let extended = derive_run_metadata(None, &extended_events, UnknownTerminalPolicy::default());

        for (key, state) in &base.steps {
            if state.lifecycle.is_terminal() {
                prop_assert_ne!(extended.steps[key].lifecycle, StepLifecycle::Preparing);
            }
        }
    }

    #[test]
    fn filter_views_are_nested_subsets(events in arb_log(), raw in "[a-z :]{0,25}") {
        let state = FilterState::parse(&raw);
        let logs = apply_filter(&state, &events, &[]);

        prop_assert!(logs.filtered_nodes.len() <= logs.all_nodes.len());
        prop_assert!(logs.text_match_nodes.len() <= logs.filtered_nodes.len());
        for node in &logs.text_match_nodes {
            prop_assert!(logs.filtered_nodes.contains(node));
        }
        for node in &logs.filtered_nodes {
            prop_assert!(logs.all_nodes.contains(node));
        }
    }
}
