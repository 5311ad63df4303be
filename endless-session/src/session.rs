//! The session context object and its request state machine.
//!
//! A [`Session`] owns everything one reader's run needs: configuration, the generation
//! backend, the history log, the platform navigation stack and the renderer. It is created
//! on session start and discarded (or [`Session::reset`]) when the reader starts over.

use crate::backend::{GenerationBackend, GenerationOptions};
use crate::config::SessionConfig;
use crate::context::{
    self, AGENTIC_STEPS_KEY, COMPLEX_KEY, EXPERIENCE_KIND_KEY, INTERACTION_COUNT_KEY,
    INTERACTION_TYPE_KEY,
};
use crate::error::{SessionError, SessionResult};
use crate::history::{History, HistoryEntry};
use crate::navigation::{NavState, NavigationStack};
use crate::orchestrator::{GenerationOutput, GenerationRequest, Orchestrator, Progress};
use crate::planner::{self, Plan};
use crate::prompt::PromptContext;
use crate::renderer::Renderer;
use endless_markup::{
    extract_label_with_fallback, extract_metadata, InteractiveElement, MetadataRecord,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

// ─── State machine ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    #[default]
    Idle,
    Generating,
    Rendered,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionEvent {
    RequestIssued,
    StepCompleted,
    SequenceCompleted,
    Failed,
    /// The reader moved to an existing entry.
    Navigated,
}

impl SessionState {
    /// The state after `event`. Issuing a request while one is in flight is `Busy`.
    pub fn on(self, event: SessionEvent) -> SessionResult<SessionState> {
        match (self, event) {
            (SessionState::Generating, SessionEvent::RequestIssued) => Err(SessionError::Busy),
            (_, SessionEvent::RequestIssued) => Ok(SessionState::Generating),
            (SessionState::Generating, SessionEvent::StepCompleted) => Ok(SessionState::Generating),
            (SessionState::Generating, SessionEvent::SequenceCompleted) => {
                Ok(SessionState::Rendered)
            }
            (SessionState::Generating, SessionEvent::Failed) => Ok(SessionState::Failed),
            (SessionState::Rendered | SessionState::Failed, SessionEvent::Navigated) => {
                Ok(SessionState::Rendered)
            }
            (from, event) => Err(SessionError::InvalidTransition {
                from: from.to_string(),
                event: event.to_string(),
            }),
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionState::Idle => "idle",
            SessionState::Generating => "generating",
            SessionState::Rendered => "rendered",
            SessionState::Failed => "failed",
        };
        f.write_str(name)
    }
}

impl fmt::Display for SessionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            SessionEvent::RequestIssued => "request-issued",
            SessionEvent::StepCompleted => "step-completed",
            SessionEvent::SequenceCompleted => "sequence-completed",
            SessionEvent::Failed => "failed",
            SessionEvent::Navigated => "navigated",
        };
        f.write_str(name)
    }
}

fn advance(state: &mut SessionState, event: SessionEvent) -> SessionResult<()> {
    let next = state.on(event)?;
    if next != *state {
        tracing::info!(from = %state, to = %next, %event, "session transition");
    }
    *state = next;
    Ok(())
}

// ─── Session ─────────────────────────────────────────────────────────────────

/// Outcome of activating an interactive element.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Activation {
    /// A directive was resolved locally. Nothing was generated.
    Notified(String),
    /// A new entry was committed at this history index.
    Generated(usize),
}

/// A request as issued, kept so a failure can be retried unchanged.
#[derive(Debug, Clone)]
struct PendingRequest {
    context: PromptContext,
    /// `None` plans from the theme and experience kind when the request runs.
    plan: Option<Plan>,
}

pub struct Session {
    id: Uuid,
    config: SessionConfig,
    backend: Box<dyn GenerationBackend>,
    history: History,
    nav: Box<dyn NavigationStack>,
    renderer: Box<dyn Renderer>,
    state: SessionState,
    theme: Option<String>,
    experience_kind: Option<String>,
    pending: Option<PendingRequest>,
    rng: StdRng,
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("provider", &self.backend.provider_key())
            .field("state", &self.state)
            .field("entries", &self.history.len())
            .field("cursor", &self.history.cursor_index())
            .finish()
    }
}

impl Session {
    pub fn new(
        config: SessionConfig,
        backend: Box<dyn GenerationBackend>,
        nav: Box<dyn NavigationStack>,
        renderer: Box<dyn Renderer>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            config,
            backend,
            history: History::new(),
            nav,
            renderer,
            state: SessionState::Idle,
            theme: None,
            experience_kind: None,
            pending: None,
            rng: StdRng::from_entropy(),
        }
    }

    /// Fixes the RNG used to resolve directives.
    pub fn with_rng_seed(mut self, seed: u64) -> Self {
        self.rng = StdRng::seed_from_u64(seed);
        self
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_busy(&self) -> bool {
        self.state == SessionState::Generating
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn history(&self) -> &History {
        &self.history
    }

    pub fn current(&self) -> Option<&HistoryEntry> {
        self.history.current()
    }

    pub fn theme(&self) -> Option<&str> {
        self.theme.as_deref()
    }

    pub fn experience_kind(&self) -> Option<&str> {
        self.experience_kind.as_deref()
    }

    /// Activatable elements of the entry on screen.
    pub fn interactive_elements(&self) -> Vec<InteractiveElement> {
        self.history
            .current()
            .map(|entry| entry.fragment.interactive_elements())
            .unwrap_or_default()
    }

    /// Validates the credential, then generates the first entry.
    ///
    /// A missing theme or experience kind is asked of the backend. A rejected credential
    /// stops here: nothing is generated and the session stays idle.
    pub async fn start(
        &mut self,
        theme: Option<String>,
        experience_kind: Option<String>,
    ) -> SessionResult<usize> {
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        if let Err(err) = self.backend.validate_credential().await {
            tracing::error!(provider = self.backend.provider_key(), error = %err, "credential rejected");
            let err = SessionError::from(err);
            self.renderer.show_error(&err, false);
            return Err(err);
        }

        self.history.clear();
        self.pending = None;
        self.theme = theme.filter(|t| !t.trim().is_empty());
        self.experience_kind = experience_kind.filter(|k| !k.trim().is_empty());
        tracing::info!(session = %self.id, provider = self.backend.provider_key(), "session started");

        self.execute(PendingRequest {
            context: PromptContext::default(),
            plan: None,
        })
        .await
    }

    /// Activates element `index` of the current entry.
    ///
    /// An element carrying an alert directive is resolved locally and shown as a notice.
    /// Any other element starts a follow-up request whose metadata merges the element's
    /// `data-*` attributes over the current entry's metadata.
    pub async fn activate(&mut self, index: usize) -> SessionResult<Activation> {
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        let entry = self.history.current().ok_or(SessionError::NotStarted)?;
        let element = entry
            .fragment
            .interactive_elements()
            .into_iter()
            .nth(index)
            .ok_or(SessionError::NoSuchElement(index))?;

        if let Some(directive) = &element.directive {
            return match directive.resolve(&mut self.rng) {
                Ok(text) => {
                    tracing::info!(index, notice = %text, "directive resolved");
                    self.renderer.notify(&text);
                    Ok(Activation::Notified(text))
                }
                Err(err) => {
                    tracing::warn!(index, error = %err, "directive could not be resolved");
                    self.renderer
                        .show_failure_panel("This interaction failed. Reload to start over.");
                    Err(err.into())
                }
            };
        }

        let request = PendingRequest {
            context: PromptContext {
                context_chain: self.history.context_chain(self.config.context_chain_limit),
                metadata: context::collect(&element, &entry.metadata),
                interaction: Some(format!("{} \"{}\"", element.kind.as_str(), element.label)),
            },
            plan: Some(planner::plan_follow_up(
                &entry.metadata,
                self.config.follow_up_max_steps(),
            )),
        };
        tracing::debug!(index, kind = element.kind.as_str(), label = %element.label, "element activated");
        self.execute(request).await.map(Activation::Generated)
    }

    /// Generates a fresh entry in the same theme, following the current one.
    pub async fn regenerate(&mut self) -> SessionResult<usize> {
        if self.is_busy() {
            return Err(SessionError::Busy);
        }
        let entry = self.history.current().ok_or(SessionError::NotStarted)?;
        let request = PendingRequest {
            context: PromptContext {
                context_chain: self.history.context_chain(self.config.context_chain_limit),
                metadata: entry.metadata.clone(),
                interaction: None,
            },
            plan: None,
        };
        self.execute(request).await
    }

    /// Re-issues the request that failed last.
    pub async fn retry(&mut self) -> SessionResult<usize> {
        if self.state != SessionState::Failed {
            return Err(SessionError::NothingToRetry);
        }
        let request = self.pending.clone().ok_or(SessionError::NothingToRetry)?;
        self.execute(request).await
    }

    /// Shows entry `index` without generating. Invalid indices are ignored.
    pub fn navigate(&mut self, index: usize) -> bool {
        if self.is_busy() {
            tracing::debug!(index, "ignoring navigation while generating");
            return false;
        }
        if self.history.navigate(index).is_none() {
            return false;
        }
        self.nav.replace_state(NavState::new(index).to_value());
        self.settle_navigation();
        true
    }

    /// Handles a platform back/forward traversal carrying `state`.
    ///
    /// States without a history index are ignored, as are indices out of range.
    pub fn handle_pop_state(&mut self, state: &Value) -> bool {
        let Some(nav) = NavState::from_value(state) else {
            tracing::debug!("pop state without a history index");
            return false;
        };
        if self.is_busy() || self.history.navigate(nav.history_index).is_none() {
            return false;
        }
        self.settle_navigation();
        true
    }

    /// Drops any failed request and mounts the entry under the cursor.
    fn settle_navigation(&mut self) {
        if self.pending.take().is_some() {
            tracing::debug!("discarding failed request after navigation");
        }
        if let Err(err) = advance(&mut self.state, SessionEvent::Navigated) {
            tracing::warn!(error = %err, "unexpected navigation");
        }
        self.mount_current();
    }

    /// Moves the platform stack by `delta` and applies the state it delivers.
    pub fn traverse(&mut self, delta: isize) -> bool {
        if self.is_busy() {
            return false;
        }
        match self.nav.traverse(delta) {
            Some(state) => self.handle_pop_state(&state),
            None => false,
        }
    }

    /// Discards history, theme and any pending request.
    pub fn reset(&mut self) {
        self.history.clear();
        self.pending = None;
        self.theme = None;
        self.experience_kind = None;
        if self.state != SessionState::Idle {
            tracing::info!(from = %self.state, to = %SessionState::Idle, "session reset");
        }
        self.state = SessionState::Idle;
        self.renderer.set_controls_enabled(true);
    }

    // ─── Request lifecycle ───────────────────────────────────────────────────

    async fn execute(&mut self, request: PendingRequest) -> SessionResult<usize> {
        advance(&mut self.state, SessionEvent::RequestIssued)?;
        self.renderer.set_controls_enabled(false);
        self.pending = Some(request.clone());

        match self.generate(&request).await {
            Ok(index) => {
                self.pending = None;
                Ok(index)
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    async fn generate(&mut self, request: &PendingRequest) -> SessionResult<usize> {
        let options = GenerationOptions::from(&self.config);
        let theme = match &self.theme {
            Some(theme) => theme.clone(),
            None => {
                let theme = self.backend.generate_theme(&options).await?;
                tracing::info!(theme = %theme, "theme suggested");
                self.theme = Some(theme.clone());
                theme
            }
        };
        let kind = match &self.experience_kind {
            Some(kind) => kind.clone(),
            None => {
                let kind = self.backend.generate_experience_kind(&options).await?;
                tracing::info!(kind = %kind, "experience kind suggested");
                self.experience_kind = Some(kind.clone());
                kind
            }
        };
        let plan = request
            .plan
            .unwrap_or_else(|| planner::plan(&theme, &kind, self.config.max_steps));
        tracing::info!(steps = plan.steps, complex = plan.complex, "request planned");

        let orchestrator = Orchestrator::new(&*self.backend, &self.config);
        let renderer = &mut self.renderer;
        let state = &mut self.state;
        let mut on_progress = |progress: Progress| match progress {
            Progress::Phase(phase) => renderer.show_phase(&phase),
            Progress::StepCompleted { step, total, .. } => {
                if let Err(err) = advance(&mut *state, SessionEvent::StepCompleted) {
                    tracing::warn!(step, total, error = %err, "unexpected step completion");
                }
            }
        };
        let output = orchestrator
            .run(
                GenerationRequest {
                    theme: &theme,
                    experience_kind: &kind,
                    context: &request.context,
                    plan,
                },
                &mut on_progress,
            )
            .await?;

        self.commit(output, &request.context.metadata, &kind)
    }

    fn commit(
        &mut self,
        output: GenerationOutput,
        carried: &MetadataRecord,
        kind: &str,
    ) -> SessionResult<usize> {
        let mut metadata = carried.clone();
        metadata.overlay(&extract_metadata(&output.fragment));
        for key in [INTERACTION_TYPE_KEY, INTERACTION_COUNT_KEY] {
            if let Some(value) = carried.get(key) {
                metadata.insert(key, value.clone());
            }
        }
        metadata.insert(EXPERIENCE_KIND_KEY, kind);
        metadata.insert(COMPLEX_KEY, output.plan.complex);
        metadata.insert(AGENTIC_STEPS_KEY, output.plan.steps);

        let label = extract_label_with_fallback(&output.fragment, &self.config.fallback_label);
        let first = self.history.is_empty();
        let index = self
            .history
            .commit(output.fragment, label, metadata, output.steps);

        let nav_state = NavState::new(index).to_value();
        if first {
            self.nav.replace_state(nav_state);
        } else {
            self.nav.push_state(nav_state);
        }

        advance(&mut self.state, SessionEvent::SequenceCompleted)?;
        self.mount_current();
        self.renderer.set_controls_enabled(true);
        Ok(index)
    }

    fn fail(&mut self, err: &SessionError) {
        if let Err(transition) = advance(&mut self.state, SessionEvent::Failed) {
            tracing::warn!(error = %transition, "failure outside a request");
        }
        let retryable = err.is_retryable();
        tracing::error!(error = %err, retryable, "request failed");
        self.renderer.show_error(err, retryable);
        self.renderer.set_controls_enabled(true);
    }

    fn mount_current(&mut self) {
        if let (Some(index), Some(entry)) = (self.history.cursor(), self.history.current()) {
            self.renderer.mount(&entry.fragment, index);
        }
    }
}
