//! Prompt construction. Every section is capped so prompts stay bounded however long a
//! session runs.

use crate::config::SessionConfig;
use crate::context::{self, RESERVED_KEYS};
use crate::history::AgenticStepRecord;
use endless_markup::{truncate_chars, MetadataRecord};
use regex::Regex;
use std::sync::OnceLock;

pub const THEME_PROMPT: &str = "Suggest one evocative theme for an interactive web experience. \
Reply with the theme only, in at most eight words, without quotes or explanation.";

pub const EXPERIENCE_KIND_PROMPT: &str = "Suggest one format for an interactive web experience, \
such as a game, a tool, an illustrated guide or a branching story. Reply with the format only, \
in at most six words, without quotes or explanation.";

const FORMAT_RULES: &str = "\
Output rules:
- Reply with a single HTML fragment only. No <html>, <head> or <body>, no markdown fences, no commentary.
- Do not use <script>, inline event handlers, iframes or external scripts. They are removed.
- The only allowed handler is onclick=\"alert(...)\" on a <button>, whose argument uses only \
string literals, numbers, + - * / % and Math.floor/ceil/round/random/abs/min/max/pow/sqrt/sign. \
Use it for quick feedback such as dice rolls.
- Every choice the reader can make is an <a> or <button>. Put the state a choice implies in \
data-* attributes on it (for example data-item=\"rope\" data-cost=\"3\").
- Put the state that must carry forward as a JSON object in a data-metadata attribute on the \
outermost element.
- Inline <style> is allowed; keep all styling inside the fragment.";

fn code_fence_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?s)```[A-Za-z0-9_+-]*[ \t]*\r?\n?(.*?)(?:```|\z)").expect("valid fence regex")
    })
}

/// The fenced body when the response wraps its markup in a code fence, else the trimmed text.
pub fn strip_code_fences(raw: &str) -> &str {
    let fenced = code_fence_re()
        .captures(raw)
        .and_then(|caps| caps.get(1))
        .filter(|body| !body.as_str().trim().is_empty());
    match fenced {
        Some(body) => body.as_str().trim(),
        None => raw.trim(),
    }
}

/// What a request knows about where the reader has been.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PromptContext {
    /// Labels of the entries leading to this request, oldest first.
    pub context_chain: Vec<String>,
    pub metadata: MetadataRecord,
    /// Description of the element the reader activated, for follow-ups.
    pub interaction: Option<String>,
}

pub struct PromptBuilder<'a> {
    config: &'a SessionConfig,
}

impl<'a> PromptBuilder<'a> {
    pub fn new(config: &'a SessionConfig) -> Self {
        Self { config }
    }

    /// Prompt for a request satisfied in one pass.
    pub fn single_pass(&self, theme: &str, kind: &str, ctx: &PromptContext) -> String {
        let mut out = self.header(theme, kind, ctx);
        out.push_str(
            "Build the complete experience in one pass. Choose as many interactive choices as \
             this format genuinely calls for; do not default to a fixed small number such as \
             two or three.\n\n",
        );
        out.push_str(FORMAT_RULES);
        out
    }

    /// Prompt for step `step` (1-based) of a `total`-step sequence.
    pub fn step(
        &self,
        step: usize,
        total: usize,
        theme: &str,
        kind: &str,
        ctx: &PromptContext,
        prior: &[AgenticStepRecord],
    ) -> String {
        let mut out = self.header(theme, kind, ctx);
        if step <= 1 {
            out.push_str(&format!(
                "This is step 1 of {total}. Produce only the foundational structure and the \
                 initial state: layout, core sections and the starting data-metadata. Later steps \
                 will enrich it.\n\n"
            ));
        } else {
            out.push_str(&self.section("Summary of previous steps", &summaries(prior)));
            if let Some(last) = prior.last() {
                out.push_str(&self.section("Current build", last.fragment.as_str()));
            }
            if step < total {
                out.push_str(&format!(
                    "This is step {step} of {total}. Enrich the current build incrementally: add \
                     depth, interactions and detail without discarding what exists. Return the \
                     whole updated fragment.\n\n"
                ));
            } else {
                out.push_str(&format!(
                    "This is the final step ({step} of {total}). Complete and polish the current \
                     build so it is ready to use. Return the whole finished fragment.\n\n"
                ));
            }
        }
        out.push_str(FORMAT_RULES);
        out
    }

    fn header(&self, theme: &str, kind: &str, ctx: &PromptContext) -> String {
        let mut out = String::new();
        out.push_str(&self.section("Theme", theme));
        out.push_str(&self.section("Experience format", kind));
        if !ctx.context_chain.is_empty() {
            let limit = self.config.context_chain_limit;
            let skip = ctx.context_chain.len().saturating_sub(limit);
            let chain = ctx.context_chain[skip..].join(" → ");
            out.push_str(&self.section("Path so far", &chain));
        }
        if let Some(interaction) = &ctx.interaction {
            out.push_str(&self.section("The reader just activated", interaction));
        }
        let capped = ctx.metadata.capped(
            self.config.metadata_max_depth,
            self.config.metadata_max_keys,
            RESERVED_KEYS,
        );
        let state = context::format(&capped);
        if !state.is_empty() {
            out.push_str(&self.section("Current state", &state));
        }
        out
    }

    fn section(&self, title: &str, body: &str) -> String {
        format!(
            "## {}\n{}\n\n",
            title,
            truncate_chars(body.trim(), self.config.prompt_section_limit)
        )
    }
}

fn summaries(prior: &[AgenticStepRecord]) -> String {
    prior
        .iter()
        .map(|record| format!("- Step {}: {}", record.step_index, record.summary))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_code_fences() {
        assert_eq!(strip_code_fences("```html\n<p>x</p>\n```"), "<p>x</p>");
        assert_eq!(strip_code_fences("Here you go:\n```\n<p>y</p>\n```\nEnjoy!"), "<p>y</p>");
        assert_eq!(strip_code_fences("```html\n<p>cut off"), "<p>cut off");
        assert_eq!(strip_code_fences("  <p>plain</p> "), "<p>plain</p>");
    }

    #[test]
    fn test_single_pass_mentions_theme_and_density() {
        let config = SessionConfig::default();
        let prompt = PromptBuilder::new(&config).single_pass(
            "Sunken cathedral",
            "puzzle game",
            &PromptContext::default(),
        );
        assert!(prompt.contains("## Theme\nSunken cathedral"));
        assert!(prompt.contains("## Experience format\npuzzle game"));
        assert!(prompt.contains("do not default to a fixed small number"));
        assert!(!prompt.contains("## Current state"));
    }

    #[test]
    fn test_context_chain_is_limited() {
        let config = SessionConfig {
            context_chain_limit: 2,
            ..SessionConfig::default()
        };
        let ctx = PromptContext {
            context_chain: vec!["A".into(), "B".into(), "C".into()],
            ..PromptContext::default()
        };
        let prompt = PromptBuilder::new(&config).single_pass("t", "k", &ctx);
        assert!(prompt.contains("## Path so far\nB → C\n"));
    }

    #[test]
    fn test_sections_are_truncated() {
        let config = SessionConfig {
            prompt_section_limit: 10,
            ..SessionConfig::default()
        };
        let prompt = PromptBuilder::new(&config).single_pass(&"x".repeat(50), "k", &PromptContext::default());
        assert!(prompt.contains(&format!("## Theme\n{}…\n", "x".repeat(9))));
    }

    #[test]
    fn test_state_section() {
        let config = SessionConfig::default();
        let ctx = PromptContext {
            metadata: MetadataRecord::from_value(json!({"gold": 3}), "t").unwrap(),
            ..PromptContext::default()
        };
        let prompt = PromptBuilder::new(&config).single_pass("t", "k", &ctx);
        assert!(prompt.contains("## Current state\n- gold: 3\n"));
    }
}
