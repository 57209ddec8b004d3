//! Topic selection by exact name or pattern.
//!
//! The selector does not know where its catalog comes from. Playback feeds it
//! the log store's topics; the recorder feeds it the topics advertised on the
//! live bus.

use crate::store::LogStore;
use regex::Regex;
use std::collections::BTreeSet;
use tracing::{debug, warn};
use tracklog_core::Topic;

/// A deduplicated set of selected topic names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicSelector {
    selected: BTreeSet<String>,
}

impl TopicSelector {
    /// Create an empty selection.
    pub fn new() -> Self {
        Self::default()
    }

    /// Select `name` if the catalog contains it.
    ///
    /// Returns `false`, leaving the selection unchanged, when it does not.
    pub fn add_exact<'a, I>(&mut self, catalog: I, name: &str) -> bool
    where
        I: IntoIterator<Item = &'a Topic>,
    {
        if catalog.into_iter().any(|t| t.name == name) {
            self.selected.insert(name.to_string());
            true
        } else {
            debug!(topic = name, "topic not in catalog");
            false
        }
    }

    /// Select every catalog topic whose whole name matches `pattern`.
    ///
    /// Returns the number of distinct catalog names matching, or `-1` when
    /// the catalog is empty and there is nothing to search.
    pub fn add_pattern<'a, I>(&mut self, catalog: I, pattern: &Regex) -> i64
    where
        I: IntoIterator<Item = &'a Topic>,
    {
        let names: BTreeSet<&str> = catalog.into_iter().map(|t| t.name.as_str()).collect();
        if names.is_empty() {
            return -1;
        }

        let matcher = FullMatch::new(pattern);
        let mut matched = 0;
        for name in names {
            if matcher.is_match(name) {
                self.selected.insert(name.to_string());
                matched += 1;
            }
        }
        debug!(pattern = pattern.as_str(), matched, "pattern selection");
        matched
    }

    /// Select `name` if the store's catalog contains it.
    ///
    /// A store whose catalog cannot be read selects nothing.
    pub fn add_from_store(&mut self, store: &LogStore, name: &str) -> bool {
        match store.topics() {
            Ok(catalog) => self.add_exact(&catalog, name),
            Err(e) => {
                warn!(error = %e, "cannot read topic catalog");
                false
            }
        }
    }

    /// Select matching topics from the store's catalog.
    ///
    /// Returns `-1` when the catalog is empty or cannot be read.
    pub fn add_pattern_from_store(&mut self, store: &LogStore, pattern: &Regex) -> i64 {
        match store.topics() {
            Ok(catalog) => self.add_pattern(&catalog, pattern),
            Err(e) => {
                warn!(error = %e, "cannot read topic catalog");
                -1
            }
        }
    }

    /// Number of selected topics.
    pub fn len(&self) -> usize {
        self.selected.len()
    }

    /// Whether nothing is selected.
    pub fn is_empty(&self) -> bool {
        self.selected.is_empty()
    }

    /// Whether a topic is selected.
    pub fn contains(&self, name: &str) -> bool {
        self.selected.contains(name)
    }

    /// Selected names in sorted order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.selected.iter().map(String::as_str)
    }

    /// The selected names.
    pub fn selection(&self) -> &BTreeSet<String> {
        &self.selected
    }

    /// Drop every selected topic.
    pub fn clear(&mut self) {
        self.selected.clear();
    }

    /// Consume the selector, returning the selected names.
    pub fn into_set(self) -> BTreeSet<String> {
        self.selected
    }
}

/// Whole-string matching for a compiled pattern.
///
/// `Regex::is_match` finds a match anywhere in the haystack, so the pattern
/// is re-compiled with anchors. If that fails (it should not for a valid
/// pattern) the leftmost match is required to span the whole name.
struct FullMatch<'a> {
    pattern: &'a Regex,
    anchored: Option<Regex>,
}

impl<'a> FullMatch<'a> {
    fn new(pattern: &'a Regex) -> Self {
        let anchored = Regex::new(&format!("^(?:{})$", pattern.as_str())).ok();
        Self { pattern, anchored }
    }

    fn is_match(&self, name: &str) -> bool {
        match &self.anchored {
            Some(anchored) => anchored.is_match(name),
            None => self
                .pattern
                .find(name)
                .is_some_and(|m| m.start() == 0 && m.end() == name.len()),
        }
    }
}
