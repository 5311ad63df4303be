//! Decides how many generation passes a request gets.
//!
//! The experience kind is tokenized and matched against keyword families. Any match marks
//! the request complex; each family matched adds a step, within `2..=max_steps`.

use crate::context::{AGENTIC_STEPS_KEY, COMPLEX_KEY};
use endless_markup::MetadataRecord;
use serde::Serialize;

/// Shortest token that may match as a fragment of a longer keyword.
const MIN_PARTIAL_TOKEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Category {
    Game,
    Application,
    ContentRich,
    InteractiveMedia,
}

impl Category {
    pub const ALL: [Category; 4] = [
        Category::Game,
        Category::Application,
        Category::ContentRich,
        Category::InteractiveMedia,
    ];

    fn keywords(self) -> &'static [&'static str] {
        match self {
            Category::Game => &[
                "game", "play", "battle", "quest", "rpg", "adventure", "puzzle", "dungeon",
                "combat", "turn-based", "arcade", "strategy", "simulator", "simulation", "dice",
                "card", "roguelike", "platformer",
            ],
            Category::Application => &[
                "app", "application", "tool", "dashboard", "calculator", "tracker", "editor",
                "planner", "manager", "builder", "system", "generator", "converter", "organizer",
                "configurator",
            ],
            Category::ContentRich => &[
                "encyclopedia", "wiki", "guide", "tutorial", "course", "documentation",
                "magazine", "catalog", "atlas", "handbook", "almanac", "compendium", "lesson",
            ],
            Category::InteractiveMedia => &[
                "interactive", "story", "novel", "branching", "quiz", "comic", "music", "timeline",
                "choose", "mystery", "escape", "explorer", "exploration",
            ],
        }
    }

    fn matches(self, token: &str) -> bool {
        self.keywords().iter().any(|keyword| {
            token.contains(keyword)
                || (token.chars().count() >= MIN_PARTIAL_TOKEN && keyword.contains(token))
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Plan {
    pub steps: usize,
    pub complex: bool,
}

impl Plan {
    pub const SINGLE: Plan = Plan {
        steps: 1,
        complex: false,
    };

    pub fn is_multi_step(&self) -> bool {
        self.steps > 1
    }
}

/// Lowercased words of `kind`, split on anything but letters, digits and `-`.
pub fn tokenize(kind: &str) -> Vec<String> {
    kind.to_lowercase()
        .split(|c: char| !(c.is_alphanumeric() || c == '-'))
        .map(|t| t.trim_matches('-'))
        .filter(|t| !t.is_empty())
        .map(str::to_string)
        .collect()
}

/// Keyword families the experience kind touches.
pub fn categories(kind: &str) -> Vec<Category> {
    let tokens = tokenize(kind);
    Category::ALL
        .into_iter()
        .filter(|category| tokens.iter().any(|t| category.matches(t)))
        .collect()
}

/// Plan for an initial request. The theme never affects the outcome.
pub fn plan(_theme: &str, kind: &str, max_steps: usize) -> Plan {
    let matched = categories(kind);
    if matched.is_empty() {
        return Plan::SINGLE;
    }
    Plan {
        steps: bounded_steps(1 + matched.len(), max_steps),
        complex: true,
    }
}

/// Plan for a follow-up, read from the metadata of the entry being responded to.
///
/// `cap` is the follow-up step cap, one below the initial cap.
pub fn plan_follow_up(metadata: &MetadataRecord, cap: usize) -> Plan {
    if !metadata.get_bool(COMPLEX_KEY).unwrap_or(false) {
        return Plan::SINGLE;
    }
    let prior = metadata
        .get_u64(AGENTIC_STEPS_KEY)
        .and_then(|n| usize::try_from(n).ok())
        .unwrap_or(2);
    Plan {
        steps: bounded_steps(prior, cap),
        complex: true,
    }
}

fn bounded_steps(wanted: usize, max_steps: usize) -> usize {
    if max_steps < 2 {
        1
    } else {
        wanted.clamp(2, max_steps)
    }
}
