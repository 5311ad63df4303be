//! The rendering collaborator: whatever mounts sanitized markup for the reader.

use crate::error::SessionError;
use crate::orchestrator::Phase;
use endless_markup::SanitizedFragment;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub trait Renderer: Send {
    /// Replaces the visible surface with `fragment`, the entry at history `index`.
    fn mount(&mut self, fragment: &SanitizedFragment, index: usize);

    fn show_phase(&mut self, phase: &Phase);

    /// Shows a failure where the fragment would have rendered.
    fn show_error(&mut self, error: &SessionError, retryable: bool);

    /// Last-resort panel offering a full reload.
    fn show_failure_panel(&mut self, message: &str);

    /// Interaction controls are disabled while a request is in flight.
    fn set_controls_enabled(&mut self, enabled: bool);

    /// Text produced by a resolved directive.
    fn notify(&mut self, message: &str);
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderEvent {
    Mounted { markup: String, index: usize },
    Phase(String),
    Error { message: String, retryable: bool },
    FailurePanel(String),
    Controls(bool),
    Notice(String),
}

/// Keeps every call as a [`RenderEvent`]. Clones share the log.
#[derive(Debug, Clone, Default)]
pub struct RecordingRenderer {
    events: Arc<Mutex<Vec<RenderEvent>>>,
}

impl RecordingRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<RenderEvent> {
        self.log().clone()
    }

    /// Markup of the most recent mount.
    pub fn mounted(&self) -> Option<String> {
        self.log().iter().rev().find_map(|event| match event {
            RenderEvent::Mounted { markup, .. } => Some(markup.clone()),
            _ => None,
        })
    }

    pub fn clear(&self) {
        self.log().clear();
    }

    fn log(&self) -> MutexGuard<'_, Vec<RenderEvent>> {
        self.events.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, event: RenderEvent) {
        self.log().push(event);
    }
}

impl Renderer for RecordingRenderer {
    fn mount(&mut self, fragment: &SanitizedFragment, index: usize) {
        self.record(RenderEvent::Mounted {
            markup: fragment.as_str().to_string(),
            index,
        });
    }

    fn show_phase(&mut self, phase: &Phase) {
        self.record(RenderEvent::Phase(phase.to_string()));
    }

    fn show_error(&mut self, error: &SessionError, retryable: bool) {
        self.record(RenderEvent::Error {
            message: error.to_string(),
            retryable,
        });
    }

    fn show_failure_panel(&mut self, message: &str) {
        self.record(RenderEvent::FailurePanel(message.to_string()));
    }

    fn set_controls_enabled(&mut self, enabled: bool) {
        self.record(RenderEvent::Controls(enabled));
    }

    fn notify(&mut self, message: &str) {
        self.record(RenderEvent::Notice(message.to_string()));
    }
}
