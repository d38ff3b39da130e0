//! Error types for the timeline-derivation domain.
//!
//! Per the propagation policy, data-quality problems in the event stream
//! never surface as errors; these variants cover programmer errors caught
//! at plan-construction time and internal graph failures.

/// The result type used throughout runview-gantt.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur when building an execution plan graph.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Two steps in the plan description share the same key.
    #[error("duplicate step key in plan: {key}")]
    DuplicateStep {
        /// The step key that appeared more than once.
        key: String,
    },

    /// A cycle was detected in the dependency graph.
    #[error("cycle detected in dependency graph: {cycle:?}")]
    CycleDetected {
        /// The cycle path (step keys).
        cycle: Vec<String>,
    },

    /// A graph node was not found (internal graph operation error).
    #[error("graph node not found: {node}")]
    GraphNodeNotFound {
        /// The node identifier (index or key).
        node: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_step_display() {
        let err = Error::DuplicateStep {
            key: "ingest".into(),
        };
        assert!(err.to_string().contains("ingest"));
    }

    #[test]
    fn cycle_error_display() {
        let err = Error::CycleDetected {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert!(err.to_string().contains("cycle detected"));
    }
}
