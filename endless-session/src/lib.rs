//! # Endless Session
//!
//! Session orchestration for endlessly chained generated experiences.
//!
//! ## Features
//! - Generation backends behind one async trait, built from a provider registry
//! - Planner that splits complex requests into supervised multi-step sequences
//! - Agentic loop that sanitizes and summarizes every step before reusing it
//! - Branchable history synchronized with a platform navigation stack
//! - Session state machine with single-flight requests and retry
//!
//! ## Example
//! ```
//! use endless_session::{
//!     MemoryNavigationStack, RecordingRenderer, ScriptedBackend, Session, SessionConfig,
//! };
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let backend = ScriptedBackend::new().with_response("<h1>Harbor</h1><a href='/dock'>Dock</a>");
//! let mut session = Session::new(
//!     SessionConfig::default(),
//!     Box::new(backend),
//!     Box::new(MemoryNavigationStack::new()),
//!     Box::new(RecordingRenderer::new()),
//! );
//! session.start(Some("Foggy harbor".into()), Some("photo essay".into())).await.unwrap();
//! assert_eq!(session.current().unwrap().context_label, "Harbor");
//! # });
//! ```

pub mod backend;
pub mod config;
pub mod context;
pub mod error;
pub mod history;
pub mod logging;
pub mod navigation;
pub mod orchestrator;
pub mod planner;
pub mod prompt;
pub mod renderer;
pub mod session;

// --- Core types ---
pub use backend::{
    GenerationBackend, GenerationOptions, ProviderRegistry, ProviderSettings, ScriptedBackend,
};
pub use config::SessionConfig;
pub use error::{BackendError, ConfigError, CredentialError, SessionError, SessionResult};
pub use history::{AgenticStepRecord, History, HistoryEntry};
pub use navigation::{MemoryNavigationStack, NavState, NavigationStack};
pub use orchestrator::{Orchestrator, Phase, Progress};
pub use planner::Plan;
pub use prompt::PromptContext;
pub use renderer::{RecordingRenderer, RenderEvent, Renderer};
pub use session::{Activation, Session, SessionEvent, SessionState};

// --- Re-exports from the markup crate ---
pub use endless_markup::{
    InteractiveElement, MetadataRecord, SanitizedFragment, DEFAULT_FALLBACK_LABEL,
};
