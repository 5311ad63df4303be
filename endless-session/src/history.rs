//! The branchable log of generated entries and its cursor.

use chrono::{DateTime, Utc};
use endless_markup::{MetadataRecord, SanitizedFragment};
use serde::Serialize;
use uuid::Uuid;

/// One generation pass inside a multi-step sequence.
#[derive(Debug, Clone, Serialize)]
pub struct AgenticStepRecord {
    pub id: Uuid,
    /// 1-based.
    pub step_index: usize,
    pub total_steps: usize,
    pub fragment: SanitizedFragment,
    pub summary: String,
    pub created_at: DateTime<Utc>,
}

impl AgenticStepRecord {
    pub fn new(
        step_index: usize,
        total_steps: usize,
        fragment: SanitizedFragment,
        summary: String,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            step_index,
            total_steps,
            fragment,
            summary,
            created_at: Utc::now(),
        }
    }
}

/// A committed, renderable unit of history. Never modified after commit.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryEntry {
    pub id: Uuid,
    pub fragment: SanitizedFragment,
    pub context_label: String,
    pub metadata: MetadataRecord,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub agentic_steps: Vec<AgenticStepRecord>,
}

/// Ordered entries plus a cursor that is `None` only while the log is empty.
#[derive(Debug, Default)]
pub struct History {
    entries: Vec<HistoryEntry>,
    cursor: Option<usize>,
}

impl History {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn cursor(&self) -> Option<usize> {
        self.cursor
    }

    /// The cursor as a signed index, `-1` while empty.
    pub fn cursor_index(&self) -> isize {
        self.cursor.map_or(-1, |c| c as isize)
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.entries.get(self.cursor?)
    }

    pub fn get(&self, index: usize) -> Option<&HistoryEntry> {
        self.entries.get(index)
    }

    pub fn entries(&self) -> &[HistoryEntry] {
        &self.entries
    }

    pub fn can_go_back(&self) -> bool {
        self.cursor.is_some_and(|c| c > 0)
    }

    pub fn can_go_forward(&self) -> bool {
        self.cursor.is_some_and(|c| c + 1 < self.entries.len())
    }

    /// Drops every entry after the cursor, appends a new entry and moves the cursor onto it.
    ///
    /// Returns the new entry's index.
    pub fn commit(
        &mut self,
        fragment: SanitizedFragment,
        context_label: String,
        metadata: MetadataRecord,
        agentic_steps: Vec<AgenticStepRecord>,
    ) -> usize {
        let keep = self.cursor.map_or(0, |c| c + 1);
        if keep < self.entries.len() {
            tracing::debug!(
                dropped = self.entries.len() - keep,
                "forking history, discarding forward entries"
            );
            self.entries.truncate(keep);
        }
        self.entries.push(HistoryEntry {
            id: Uuid::new_v4(),
            fragment,
            context_label,
            metadata,
            created_at: Utc::now(),
            agentic_steps,
        });
        let index = self.entries.len() - 1;
        self.cursor = Some(index);
        tracing::info!(
            index,
            label = %self.entries[index].context_label,
            "history entry committed"
        );
        index
    }

    /// Moves the cursor. Out-of-range indices are ignored and return `None`.
    pub fn navigate(&mut self, index: usize) -> Option<&HistoryEntry> {
        if index >= self.entries.len() {
            tracing::debug!(index, len = self.entries.len(), "ignoring navigation out of range");
            return None;
        }
        self.cursor = Some(index);
        self.entries.get(index)
    }

    /// Labels of entries `0..=cursor`, keeping only the last `limit`.
    pub fn context_chain(&self, limit: usize) -> Vec<String> {
        let Some(cursor) = self.cursor else {
            return Vec::new();
        };
        let start = (cursor + 1).saturating_sub(limit);
        self.entries[start..=cursor]
            .iter()
            .map(|e| e.context_label.clone())
            .collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.cursor = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use endless_markup::sanitize;

    fn commit(history: &mut History, label: &str) -> usize {
        history.commit(
            sanitize(&format!("<h1>{}</h1>", label)),
            label.to_string(),
            MetadataRecord::default(),
            Vec::new(),
        )
    }

    fn labels(history: &History) -> Vec<&str> {
        history
            .entries()
            .iter()
            .map(|e| e.context_label.as_str())
            .collect()
    }

    #[test]
    fn test_empty_cursor_is_minus_one() {
        let history = History::new();
        assert_eq!(history.cursor_index(), -1);
        assert!(history.current().is_none());
        assert!(history.context_chain(5).is_empty());
    }

    #[test]
    fn test_commit_advances_cursor() {
        let mut history = History::new();
        assert_eq!(commit(&mut history, "A"), 0);
        assert_eq!(commit(&mut history, "B"), 1);
        assert_eq!(history.cursor(), Some(1));
        assert_eq!(history.current().map(|e| e.context_label.as_str()), Some("B"));
    }

    #[test]
    fn test_fork_truncates_forward_entries() {
        let mut history = History::new();
        for label in ["A", "B", "C"] {
            commit(&mut history, label);
        }
        assert!(history.navigate(0).is_some());
        assert_eq!(commit(&mut history, "D"), 1);
        assert_eq!(labels(&history), vec!["A", "D"]);
        assert!(!history.can_go_forward());
    }

    #[test]
    fn test_invalid_navigation_is_noop() {
        let mut history = History::new();
        commit(&mut history, "A");
        commit(&mut history, "B");
        assert!(history.navigate(7).is_none());
        assert_eq!(history.cursor(), Some(1));
    }

    #[test]
    fn test_context_chain_stops_at_cursor() {
        let mut history = History::new();
        for label in ["A", "B", "C", "D"] {
            commit(&mut history, label);
        }
        history.navigate(2);
        assert_eq!(history.context_chain(2), vec!["B", "C"]);
        assert_eq!(history.context_chain(10), vec!["A", "B", "C"]);
    }
}
