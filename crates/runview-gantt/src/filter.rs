//! The log/selection filter: partitions the event log into display views.
//!
//! A filter query string mixes `token:value` pairs with free text, e.g.
//!
//! ```text
//! step:ingest type:failure level:ERROR connection refused
//! ```
//!
//! Recognized tokens of distinct kinds are intersected (logical AND);
//! repeated tokens of the same kind are unioned (logical OR). Unrecognized
//! tokens are ignored so querystrings written against a newer vocabulary
//! degrade gracefully. The free-text remainder narrows the token-filtered
//! view by case-insensitive substring match.
//!
//! The `query:` token restricts to a step selection. Its resolution lives
//! in [`crate::selection`]; callers resolve each expression there and pass
//! the unioned result in, so the two engines never drift apart.

use std::collections::HashSet;

use chrono::{DateTime, Utc};

use runview_core::LogLevel;

use crate::events::RunEvent;

/// One recognized `token:value` pair from a filter query string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FilterToken {
    /// Restrict to events attributed to a literal step key.
    Step(String),
    /// Restrict to the resolved step selection for this expression.
    Query(String),
    /// Restrict to an event variant category (see
    /// [`crate::events::RunEventData::matches_type_label`]).
    Type(String),
    /// Restrict to events at exactly this level.
    Level(LogLevel),
    /// Restrict to events at or after this time (`after:` in the query).
    Since(DateTime<Utc>),
    /// A token this crate does not recognize; kept for display, ignored
    /// for filtering.
    Unrecognized {
        /// The token kind as written.
        token: String,
        /// The value as written.
        value: String,
    },
}

/// The parsed filter: tokens, free text, and cross-highlighting state.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilterState {
    /// Recognized and unrecognized tokens, in query order.
    pub tokens: Vec<FilterToken>,
    /// The non-token remainder of the query string.
    pub free_text: String,
    /// A timestamp the timeline is focused on. Does not filter; threaded
    /// through to the caller for cross-highlighting.
    pub focused_time: Option<DateTime<Utc>>,
    /// Lower bound applied to every view, typically "since last reload".
    pub since_time: Option<DateTime<Utc>>,
}

impl FilterState {
    /// Parses a raw query string (from the filter input or a URL query
    /// parameter) into tokens and free text.
    ///
    /// This is the single tokenizer for both internally- and
    /// externally-sourced query strings.
    #[must_use]
    pub fn parse(raw: &str) -> Self {
        let mut tokens = Vec::new();
        let mut free_words: Vec<&str> = Vec::new();

        for word in raw.split_whitespace() {
            let Some((kind, value)) = word.split_once(':') else {
                free_words.push(word);
                continue;
            };
            if value.is_empty() {
                free_words.push(word);
                continue;
            }
            tokens.push(Self::parse_token(kind, value));
        }

        Self {
            tokens,
            free_text: free_words.join(" "),
            focused_time: None,
            since_time: None,
        }
    }

    fn parse_token(kind: &str, value: &str) -> FilterToken {
        match kind.to_ascii_lowercase().as_str() {
            "step" => FilterToken::Step(value.to_string()),
            "query" => FilterToken::Query(value.to_string()),
            "type" => FilterToken::Type(value.to_ascii_lowercase()),
            "level" => match value.parse() {
                Ok(level) => FilterToken::Level(level),
                Err(_) => FilterToken::Unrecognized {
                    token: kind.to_string(),
                    value: value.to_string(),
                },
            },
            "after" => match parse_time(value) {
                Some(time) => FilterToken::Since(time),
                None => FilterToken::Unrecognized {
                    token: kind.to_string(),
                    value: value.to_string(),
                },
            },
            _ => FilterToken::Unrecognized {
                token: kind.to_string(),
                value: value.to_string(),
            },
        }
    }

    /// Sets the focused timestamp.
    #[must_use]
    pub const fn with_focused_time(mut self, time: DateTime<Utc>) -> Self {
        self.focused_time = Some(time);
        self
    }

    /// Sets the since-timestamp lower bound.
    #[must_use]
    pub const fn with_since_time(mut self, time: DateTime<Utc>) -> Self {
        self.since_time = Some(time);
        self
    }

    /// Returns every `query:` token's expression, in query order.
    ///
    /// Repeated `query:` tokens are unioned like any other repeated token
    /// kind: callers resolve each expression through the selection engine
    /// and pass the union of the resolved sets to [`apply_filter`].
    #[must_use]
    pub fn selection_expressions(&self) -> Vec<&str> {
        self.tokens
            .iter()
            .filter_map(|token| match token {
                FilterToken::Query(expression) => Some(expression.as_str()),
                _ => None,
            })
            .collect()
    }
}

fn parse_time(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(time) = value.parse() {
        return Some(time);
    }
    value
        .parse::<i64>()
        .ok()
        .and_then(DateTime::from_timestamp_millis)
}

/// A log entry annotated with a stable identity for list rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct LogNode {
    /// Stable per-entry identity: the source event ID when present,
    /// otherwise derived from the log position.
    pub node_id: String,
    /// Position in the full log.
    pub index: usize,
    /// The event itself.
    pub event: RunEvent,
}

/// The three display views produced by [`apply_filter`].
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FilteredLogs {
    /// Every log entry, in log order.
    pub all_nodes: Vec<LogNode>,
    /// Entries matching every recognized token kind.
    pub filtered_nodes: Vec<LogNode>,
    /// Subset of `filtered_nodes` whose message contains the free text.
    pub text_match_nodes: Vec<LogNode>,
    /// Threaded through from the filter state for cross-highlighting.
    pub focused_time: Option<DateTime<Utc>>,
}

/// Partitions the event log into display views.
///
/// `resolved_selection` is the union of the selection engine's results for
/// the filter's `query:` expressions (see
/// [`FilterState::selection_expressions`]; empty when there are none).
/// Distinct token kinds are ANDed; repeated tokens of one kind are ORed;
/// unrecognized tokens have no effect.
#[must_use]
pub fn apply_filter(
    state: &FilterState,
    events: &[RunEvent],
    resolved_selection: &[String],
) -> FilteredLogs {
    let mut steps: Vec<&str> = Vec::new();
    let mut types: Vec<&str> = Vec::new();
    let mut levels: Vec<LogLevel> = Vec::new();
    let mut sinces: Vec<DateTime<Utc>> = Vec::new();
    let mut has_query = false;

    for token in &state.tokens {
        match token {
            FilterToken::Step(key) => steps.push(key),
            FilterToken::Query(_) => has_query = true,
            FilterToken::Type(label) => types.push(label),
            FilterToken::Level(level) => levels.push(*level),
            FilterToken::Since(time) => sinces.push(*time),
            FilterToken::Unrecognized { .. } => {}
        }
    }

    let selection: HashSet<&str> = resolved_selection.iter().map(String::as_str).collect();

    let all_nodes: Vec<LogNode> = events
        .iter()
        .enumerate()
        .map(|(index, event)| LogNode {
            node_id: event
                .id
                .map_or_else(|| format!("log-{index}"), |id| id.to_string()),
            index,
            event: event.clone(),
        })
        .collect();

    let filtered_nodes: Vec<LogNode> = all_nodes
        .iter()
        .filter(|node| {
            let event = &node.event;

            if !steps.is_empty()
                && !event
                    .step_key
                    .as_deref()
                    .is_some_and(|key| steps.contains(&key))
            {
                return false;
            }
            if has_query
                && !event
                    .step_key
                    .as_deref()
                    .is_some_and(|key| selection.contains(key))
            {
                return false;
            }
            if !types.is_empty()
                && !types.iter().any(|label| event.data.matches_type_label(label))
            {
                return false;
            }
            if !levels.is_empty() && !levels.contains(&event.level) {
                return false;
            }
            if !sinces.is_empty() && !sinces.iter().any(|since| event.timestamp >= *since) {
                return false;
            }
            if let Some(since) = state.since_time {
                if event.timestamp < since {
                    return false;
                }
            }
            true
        })
        .cloned()
        .collect();

    let needle = state.free_text.to_lowercase();
    let text_match_nodes: Vec<LogNode> = filtered_nodes
        .iter()
        .filter(|node| node.event.message.to_lowercase().contains(&needle))
        .cloned()
        .collect();

    FilteredLogs {
        all_nodes,
        filtered_nodes,
        text_match_nodes,
        focused_time: state.focused_time,
    }
}
