//! # runview-gantt
//!
//! Execution-timeline ("Gantt") and log-view derivation for a single
//! pipeline run.
//!
//! This crate turns two inputs — a static execution plan and an
//! append-only stream of run events — into the immutable snapshots a
//! rendering layer consumes:
//!
//! - **Event-to-State Reducer**: folds the (out-of-order-tolerant,
//!   possibly-duplicated) event log into per-step and run-level state
//! - **Selection Query Engine**: resolves step-selection expressions
//!   (`+name`, `name+`, globs) against the plan's dependency graph
//! - **Log/Selection Filter**: partitions the log into "all", "filtered",
//!   and "text-matched" views from a `token:value` query string
//!
//! ## Guarantees
//!
//! - **Pure**: every derivation is a synchronous function of its inputs;
//!   recomputing on each log growth is always correct
//! - **Idempotent**: redelivered events cannot change the derived state
//! - **Degrading**: data-quality problems in the stream produce degraded
//!   output, never errors
//!
//! ## Example
//!
//! ```rust
//! use runview_gantt::metadata::{derive_run_metadata, StepLifecycle, UnknownTerminalPolicy};
//! use runview_gantt::plan::{ExecutionPlanGraph, ExecutionStep};
//! use runview_gantt::selection::resolve_selection;
//!
//! # fn main() -> runview_gantt::error::Result<()> {
//! let plan = ExecutionPlanGraph::from_steps(vec![
//!     ExecutionStep::new("ingest"),
//!     ExecutionStep::new("transform").depends_on("ingest"),
//! ])?;
//!
//! let selected = resolve_selection(&plan, "+transform");
//! assert_eq!(selected, vec!["ingest", "transform"]);
//!
//! let snapshot = derive_run_metadata(Some(&plan), &[], UnknownTerminalPolicy::default());
//! assert_eq!(snapshot.step("ingest").unwrap().lifecycle, StepLifecycle::Preparing);
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]
#![deny(missing_docs)]
#![deny(rust_2018_idioms)]
#![warn(clippy::pedantic)]

// Internal module - not exposed in public API.
pub(crate) mod graph;

pub mod error;
pub mod events;
pub mod filter;
pub mod metadata;
pub mod plan;
pub mod selection;

/// Prelude module for convenient imports.
pub mod prelude {
    pub use crate::error::{Error, Result};
    pub use crate::events::{RunEvent, RunEventData, StepError};
    pub use crate::filter::{apply_filter, FilterState, FilterToken, FilteredLogs, LogNode};
    pub use crate::metadata::{
        derive_run_metadata, RunMetadataSnapshot, RunStatus, StepLifecycle, StepRuntimeState,
        UnknownTerminalPolicy,
    };
    pub use crate::plan::{ExecutionPlanGraph, ExecutionStep, PlanDescription};
    pub use crate::selection::{resolve_selection, resolve_selection_without_plan};
}
