//! Synchronization with the platform's native back/forward stack.
//!
//! The platform stores one opaque state value per stack entry. Sessions write
//! `{"historyIndex": n}` and read it back when the platform signals a traversal.

use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const HISTORY_INDEX_KEY: &str = "historyIndex";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NavState {
    pub history_index: usize,
}

impl NavState {
    pub fn new(history_index: usize) -> Self {
        Self { history_index }
    }

    pub fn to_value(self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert(HISTORY_INDEX_KEY.to_string(), Value::from(self.history_index));
        Value::Object(map)
    }

    /// Reads the index from a platform state value. Anything else yields `None`.
    pub fn from_value(state: &Value) -> Option<Self> {
        let index = state.get(HISTORY_INDEX_KEY)?.as_u64()?;
        usize::try_from(index).ok().map(Self::new)
    }
}

/// The platform's navigation stack, as seen by a session.
pub trait NavigationStack: Send {
    /// Overwrites the state of the current stack entry.
    fn replace_state(&mut self, state: Value);

    /// Adds an entry after the current one, dropping any forward entries.
    fn push_state(&mut self, state: Value);

    /// Moves `delta` entries and returns the state the platform would deliver, if any.
    fn traverse(&mut self, delta: isize) -> Option<Value>;
}

/// Browser-like stack kept in memory.
#[derive(Debug, Clone)]
pub struct MemoryNavigationStack {
    states: Vec<Value>,
    position: usize,
}

impl Default for MemoryNavigationStack {
    /// Starts with the single initial entry every platform stack has.
    fn default() -> Self {
        Self {
            states: vec![Value::Null],
            position: 0,
        }
    }
}

impl MemoryNavigationStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn position(&self) -> usize {
        self.position
    }

    pub fn states(&self) -> &[Value] {
        &self.states
    }
}

impl NavigationStack for MemoryNavigationStack {
    fn replace_state(&mut self, state: Value) {
        self.states[self.position] = state;
    }

    fn push_state(&mut self, state: Value) {
        self.states.truncate(self.position + 1);
        self.states.push(state);
        self.position = self.states.len() - 1;
    }

    fn traverse(&mut self, delta: isize) -> Option<Value> {
        let target = self.position.checked_add_signed(delta)?;
        if target >= self.states.len() || target == self.position {
            return None;
        }
        self.position = target;
        Some(self.states[target].clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nav_state_wire_shape() {
        assert_eq!(NavState::new(3).to_value(), json!({"historyIndex": 3}));
        assert_eq!(
            NavState::from_value(&json!({"historyIndex": 2, "other": true})),
            Some(NavState::new(2))
        );
        assert_eq!(NavState::from_value(&json!({"index": 2})), None);
        assert_eq!(NavState::from_value(&Value::Null), None);
        assert_eq!(NavState::from_value(&json!({"historyIndex": -1})), None);
    }

    #[test]
    fn test_memory_stack_behaves_like_browser() {
        let mut stack = MemoryNavigationStack::new();
        stack.replace_state(json!({"historyIndex": 0}));
        stack.push_state(json!({"historyIndex": 1}));
        stack.push_state(json!({"historyIndex": 2}));
        assert_eq!(stack.traverse(-1), Some(json!({"historyIndex": 1})));
        assert_eq!(stack.traverse(-5), None);
        stack.push_state(json!({"historyIndex": 3}));
        assert_eq!(stack.len(), 3);
        assert_eq!(stack.traverse(1), None);
    }
}
