//! The agentic loop: one or several sequential generation passes producing one entry.

use crate::backend::{GenerationBackend, GenerationOptions};
use crate::config::SessionConfig;
use crate::error::BackendError;
use crate::history::AgenticStepRecord;
use crate::planner::Plan;
use crate::prompt::{strip_code_fences, PromptBuilder, PromptContext};
use endless_markup::{extract_label, sanitize_with_report, SanitizedFragment};
use std::fmt;

/// Live status shown while a sequence runs. Cosmetic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Thinking,
    Planning { steps: usize },
    Building { step: usize, total: usize },
    Refining { step: usize, total: usize },
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Thinking => write!(f, "thinking"),
            Phase::Planning { steps } if *steps > 1 => write!(f, "planning {} steps", steps),
            Phase::Planning { .. } => write!(f, "planning"),
            Phase::Building { total: 1, .. } => write!(f, "building"),
            Phase::Building { step, total } => write!(f, "building ({}/{})", step, total),
            Phase::Refining { step, total } => write!(f, "refining ({}/{})", step, total),
        }
    }
}

/// Reported to the caller as a sequence advances.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Progress {
    Phase(Phase),
    StepCompleted {
        step: usize,
        total: usize,
        summary: String,
    },
}

/// What to generate. Theme and kind are fixed for the life of a session.
#[derive(Debug, Clone, Copy)]
pub struct GenerationRequest<'r> {
    pub theme: &'r str,
    pub experience_kind: &'r str,
    pub context: &'r PromptContext,
    pub plan: Plan,
}

#[derive(Debug, Clone)]
pub struct GenerationOutput {
    pub fragment: SanitizedFragment,
    /// Empty for single-pass requests.
    pub steps: Vec<AgenticStepRecord>,
    pub plan: Plan,
}

pub struct Orchestrator<'a> {
    backend: &'a dyn GenerationBackend,
    config: &'a SessionConfig,
}

impl<'a> Orchestrator<'a> {
    pub fn new(backend: &'a dyn GenerationBackend, config: &'a SessionConfig) -> Self {
        Self { backend, config }
    }

    /// Runs every pass of `request.plan` in order.
    ///
    /// Each raw response is sanitized and summarized before the next prompt is built, so
    /// later prompts only ever quote sanitized markup. Fails on the first backend error, or
    /// when the final fragment is empty.
    pub async fn run(
        &self,
        request: GenerationRequest<'_>,
        progress: &mut (dyn FnMut(Progress) + Send),
    ) -> Result<GenerationOutput, BackendError> {
        let plan = request.plan;
        let total = plan.steps.max(1);
        let options = GenerationOptions::from(self.config);
        let prompts = PromptBuilder::new(self.config);

        progress(Progress::Phase(Phase::Thinking));
        progress(Progress::Phase(Phase::Planning { steps: total }));

        if !plan.is_multi_step() {
            progress(Progress::Phase(Phase::Building { step: 1, total }));
            let prompt =
                prompts.single_pass(request.theme, request.experience_kind, request.context);
            let fragment = self.pass(&prompt, &options).await?;
            if fragment.is_empty() {
                return Err(BackendError::EmptyResponse);
            }
            progress(Progress::StepCompleted {
                step: 1,
                total,
                summary: extract_label(&fragment),
            });
            return Ok(GenerationOutput {
                fragment,
                steps: Vec::new(),
                plan,
            });
        }

        let mut records: Vec<AgenticStepRecord> = Vec::with_capacity(total);
        for step in 1..=total {
            let phase = if step == 1 {
                Phase::Building { step, total }
            } else {
                Phase::Refining { step, total }
            };
            progress(Progress::Phase(phase));

            let prompt = prompts.step(
                step,
                total,
                request.theme,
                request.experience_kind,
                request.context,
                &records,
            );
            let fragment = self.pass(&prompt, &options).await?;
            let summary = extract_label(&fragment);
            tracing::info!(step, total, summary = %summary, "agentic step completed");
            progress(Progress::StepCompleted {
                step,
                total,
                summary: summary.clone(),
            });
            records.push(AgenticStepRecord::new(step, total, fragment, summary));
        }

        let fragment = records
            .last()
            .map(|record| record.fragment.clone())
            .unwrap_or_default();
        if fragment.is_empty() {
            return Err(BackendError::EmptyResponse);
        }
        Ok(GenerationOutput {
            fragment,
            steps: records,
            plan,
        })
    }

    async fn pass(
        &self,
        prompt: &str,
        options: &GenerationOptions,
    ) -> Result<SanitizedFragment, BackendError> {
        let raw = self
            .backend
            .generate_content(prompt, options)
            .await
            .map_err(|err| {
                tracing::error!(
                    provider = self.backend.provider_key(),
                    error = %err,
                    "generation failed"
                );
                err
            })?;
        let (fragment, report) = sanitize_with_report(strip_code_fences(&raw));
        if !report.is_clean() {
            tracing::debug!(?report, "generated fragment needed sanitizing");
        }
        Ok(fragment)
    }
}
