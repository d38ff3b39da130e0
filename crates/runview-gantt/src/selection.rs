//! The selection query engine: resolves step-selection expressions against
//! the execution plan graph.
//!
//! A query is a comma-separated union of clauses. Each clause names steps
//! by exact key or glob pattern and may request transitive expansion:
//!
//! - `*` — every step in the plan
//! - `name` — exact match
//! - `+name` — `name` plus all transitive upstream dependencies
//! - `name+` — `name` plus all transitive downstream dependents
//! - `+name+` — both directions plus `name`
//! - `name*` / `*name` — glob-style prefix/suffix match
//!
//! An empty query resolves to an empty selection; `*` explicitly resolves
//! to everything. The distinction is load-bearing for the UI and is
//! preserved here.
//!
//! Data-quality degradations: a clause matching zero steps contributes
//! nothing, and an unparseable glob degrades that clause to an empty match
//! rather than failing the whole query.

use std::collections::HashSet;

use globset::{Glob, GlobMatcher};

use crate::plan::ExecutionPlanGraph;

/// One parsed clause of a selection expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectionClause {
    /// The name pattern with direction operators stripped.
    pub pattern: String,
    /// Include transitive upstream dependencies (`+name`).
    pub include_upstream: bool,
    /// Include transitive downstream dependents (`name+`).
    pub include_downstream: bool,
}

impl SelectionClause {
    fn parse(raw: &str) -> Option<Self> {
        let mut pattern = raw.trim();
        if pattern.is_empty() {
            return None;
        }

        let mut include_upstream = false;
        let mut include_downstream = false;

        // `*` alone is a match-all pattern, not a direction operator.
        if pattern != "*" {
            if let Some(rest) = pattern.strip_prefix('+') {
                include_upstream = true;
                pattern = rest;
            }
            if let Some(rest) = pattern.strip_suffix('+') {
                include_downstream = true;
                pattern = rest;
            }
        }

        let pattern = pattern.trim();
        if pattern.is_empty() {
            return None;
        }

        Some(Self {
            pattern: pattern.to_string(),
            include_upstream,
            include_downstream,
        })
    }

    fn matcher(&self) -> Option<PatternMatcher> {
        if self.pattern == "*" {
            return Some(PatternMatcher::All);
        }
        if self.pattern.contains('*') {
            return match Glob::new(&self.pattern) {
                Ok(glob) => Some(PatternMatcher::Glob(glob.compile_matcher())),
                Err(reason) => {
                    tracing::warn!(pattern = %self.pattern, %reason, "unparseable selection glob");
                    None
                }
            };
        }
        Some(PatternMatcher::Exact(self.pattern.clone()))
    }
}

enum PatternMatcher {
    All,
    Exact(String),
    Glob(GlobMatcher),
}

impl PatternMatcher {
    fn matches(&self, key: &str) -> bool {
        match self {
            Self::All => true,
            Self::Exact(name) => name == key,
            Self::Glob(matcher) => matcher.is_match(key),
        }
    }
}

/// Parses a raw selection expression into its clauses.
///
/// Empty clauses (consecutive commas, trailing comma, bare `+`) are
/// dropped.
#[must_use]
pub fn parse_clauses(query: &str) -> Vec<SelectionClause> {
    query.split(',').filter_map(SelectionClause::parse).collect()
}

/// Resolves a selection expression against a plan graph.
///
/// Returns the matching step keys ordered deterministically: the union is
/// accumulated clause by clause, each clause's matches emitted in plan
/// order, de-duplicated with first occurrence winning.
#[must_use]
pub fn resolve_selection(plan: &ExecutionPlanGraph, query: &str) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for clause in parse_clauses(query) {
        let Some(matcher) = clause.matcher() else {
            continue;
        };

        let mut selected: HashSet<String> = HashSet::new();
        for step in plan.steps() {
            if !matcher.matches(&step.key) {
                continue;
            }
            selected.insert(step.key.clone());
            if clause.include_upstream {
                selected.extend(plan.upstream_closure(&step.key));
            }
            if clause.include_downstream {
                selected.extend(plan.downstream_closure(&step.key));
            }
        }

        // Emit in plan order so the union is stable regardless of
        // traversal order inside the closures.
        for step in plan.steps() {
            if selected.contains(&step.key) && seen.insert(step.key.clone()) {
                result.push(step.key.clone());
            }
        }
    }

    result
}

/// Resolves a selection expression when no plan is available.
///
/// Without a graph there is nothing to expand or glob against, so the
/// query degrades to its literal names: direction operators are stripped
/// and glob patterns contribute nothing.
#[must_use]
pub fn resolve_selection_without_plan(query: &str) -> Vec<String> {
    let mut result: Vec<String> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    for clause in parse_clauses(query) {
        if clause.pattern.contains('*') {
            continue;
        }
        if seen.insert(clause.pattern.clone()) {
            result.push(clause.pattern);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::ExecutionStep;

    fn linear_plan() -> ExecutionPlanGraph {
        ExecutionPlanGraph::from_steps(vec![
            ExecutionStep::new("a"),
            ExecutionStep::new("b").depends_on("a"),
            ExecutionStep::new("c").depends_on("b"),
        ])
        .unwrap()
    }

    #[test]
    fn empty_query_selects_nothing() {
        assert!(resolve_selection(&linear_plan(), "").is_empty());
        assert!(resolve_selection(&linear_plan(), " , ,").is_empty());
    }

    #[test]
    fn star_selects_everything() {
        assert_eq!(resolve_selection(&linear_plan(), "*"), vec!["a", "b", "c"]);
    }

    #[test]
    fn exact_name_selects_one_step() {
        assert_eq!(resolve_selection(&linear_plan(), "b"), vec!["b"]);
    }

    #[test]
    fn upstream_operator_collects_ancestors() {
        assert_eq!(resolve_selection(&linear_plan(), "+c"), vec!["a", "b", "c"]);
        assert_eq!(resolve_selection(&linear_plan(), "+b"), vec!["a", "b"]);
    }

    #[test]
    fn downstream_operator_collects_descendants() {
        assert_eq!(resolve_selection(&linear_plan(), "a+"), vec!["a", "b", "c"]);
        assert_eq!(resolve_selection(&linear_plan(), "b+"), vec!["b", "c"]);
    }

    #[test]
    fn both_operators_collect_both_directions() {
        assert_eq!(
            resolve_selection(&linear_plan(), "+b+"),
            vec!["a", "b", "c"]
        );
    }

    #[test]
    fn union_deduplicates_preserving_first_occurrence() {
        let resolved = resolve_selection(&linear_plan(), "a, +c");
        assert_eq!(resolved, vec!["a", "b", "c"]);
    }

    #[test]
    fn unknown_names_contribute_nothing() {
        assert!(resolve_selection(&linear_plan(), "zzz").is_empty());
        assert_eq!(resolve_selection(&linear_plan(), "zzz, b"), vec!["b"]);
    }

    #[test]
    fn glob_patterns_match_prefixes_and_suffixes() {
        let plan = ExecutionPlanGraph::from_steps(vec![
            ExecutionStep::new("ingest_users"),
            ExecutionStep::new("ingest_orders"),
            ExecutionStep::new("transform_users").depends_on("ingest_users"),
        ])
        .unwrap();

        assert_eq!(
            resolve_selection(&plan, "ingest*"),
            vec!["ingest_users", "ingest_orders"]
        );
        assert_eq!(
            resolve_selection(&plan, "*users"),
            vec!["ingest_users", "transform_users"]
        );
    }

    #[test]
    fn glob_with_direction_expands_every_match() {
        let plan = ExecutionPlanGraph::from_steps(vec![
            ExecutionStep::new("ingest_users"),
            ExecutionStep::new("transform_users").depends_on("ingest_users"),
            ExecutionStep::new("load_users").depends_on("transform_users"),
        ])
        .unwrap();

        assert_eq!(
            resolve_selection(&plan, "transform*+"),
            vec!["transform_users", "load_users"]
        );
    }

    #[test]
    fn unparseable_glob_degrades_to_empty_match() {
        // An unclosed character class fails glob compilation.
        let resolved = resolve_selection(&linear_plan(), "a[*, b");
        assert_eq!(resolved, vec!["b"]);
    }

    #[test]
    fn clause_parsing_strips_direction_operators() {
        let clauses = parse_clauses("+a, b+, +c+, *");
        assert_eq!(
            clauses,
            vec![
                SelectionClause {
                    pattern: "a".into(),
                    include_upstream: true,
                    include_downstream: false,
                },
                SelectionClause {
                    pattern: "b".into(),
                    include_upstream: false,
                    include_downstream: true,
                },
                SelectionClause {
                    pattern: "c".into(),
                    include_upstream: true,
                    include_downstream: true,
                },
                SelectionClause {
                    pattern: "*".into(),
                    include_upstream: false,
                    include_downstream: false,
                },
            ]
        );
    }

    #[test]
    fn missing_plan_degrades_to_literal_names() {
        assert_eq!(
            resolve_selection_without_plan("+c, b+, name*, b"),
            vec!["c", "b"]
        );
        assert!(resolve_selection_without_plan("*").is_empty());
    }
}
