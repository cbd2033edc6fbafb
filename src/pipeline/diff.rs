//! Token-level diff between two script sets.
//!
//! Computes a coarse, lexical view of what changed between the previous and
//! the current build. The output is plain text meant as a hint for the
//! summarizer, not a precise patch.
//!
//! Only modules present in the new build are inspected: a module that
//! disappeared is never reported.

use std::collections::HashSet;

use crate::models::{DiffConfig, ScriptSet};

/// Change detected for one module of the new build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModuleChange {
    /// Module did not exist in the previous build
    Added { name: String },
    /// Module content differs and at least one token list is non-empty
    Changed {
        name: String,
        added_tokens: Vec<String>,
        removed_tokens: Vec<String>,
    },
}

/// Result of comparing two script sets.
#[derive(Debug, Clone, Default)]
pub struct DiffResult {
    pub changes: Vec<ModuleChange>,
    /// Modules whose content was byte-identical
    pub unchanged: usize,
    /// Modules whose content differed only in short tokens
    pub suppressed: usize,
}

impl DiffResult {
    /// Check if there are any reportable changes.
    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Render the changes as text, truncated to `max_chars` characters.
    pub fn render(&self, max_chars: usize) -> String {
        let mut out = String::new();
        for change in &self.changes {
            match change {
                ModuleChange::Added { name } => {
                    out.push_str(&format!("+ added module: {name}\n"));
                }
                ModuleChange::Changed {
                    name,
                    added_tokens,
                    removed_tokens,
                } => {
                    out.push_str(&format!("~ changed module: {name}\n"));
                    if !added_tokens.is_empty() {
                        out.push_str(&format!("  added: {}\n", added_tokens.join(", ")));
                    }
                    if !removed_tokens.is_empty() {
                        out.push_str(&format!("  removed: {}\n", removed_tokens.join(", ")));
                    }
                }
            }
        }
        truncate_chars(&out, max_chars)
    }
}

/// Unique tokens of a text in first-seen order.
#[derive(Debug, Default)]
pub struct TokenSet<'a> {
    ordered: Vec<&'a str>,
    members: HashSet<&'a str>,
}

impl<'a> TokenSet<'a> {
    pub fn from_text(text: &'a str) -> Self {
        let mut set = Self::default();
        for token in text.split(|c: char| !is_token_char(c)) {
            if !token.is_empty() && set.members.insert(token) {
                set.ordered.push(token);
            }
        }
        set
    }

    pub fn contains(&self, token: &str) -> bool {
        self.members.contains(token)
    }

    pub fn len(&self) -> usize {
        self.ordered.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ordered.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.ordered.iter().copied()
    }

    /// Tokens of `self` missing from `other`, keeping `self`'s order.
    pub fn difference<'b>(&'b self, other: &'b TokenSet<'_>) -> impl Iterator<Item = &'a str> + 'b {
        self.iter().filter(move |token| !other.contains(token))
    }
}

/// ASCII word characters, quotes, and CJK unified ideographs.
fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '\'' | '"' | '\u{4e00}'..='\u{9fa5}')
}

/// Cut `text` to at most `max_chars` characters.
fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text.to_string(),
    }
}

/// Calculator for token diffs between builds.
#[derive(Debug, Clone, Default)]
pub struct ScriptDiffer {
    config: DiffConfig,
}

impl ScriptDiffer {
    pub fn new(config: DiffConfig) -> Self {
        Self { config }
    }

    /// Classify every module of `current` against `previous`.
    pub fn calculate(&self, previous: &ScriptSet, current: &ScriptSet) -> DiffResult {
        let mut result = DiffResult::default();

        for (name, content) in current.iter() {
            let Some(old_content) = previous.get(name) else {
                result.changes.push(ModuleChange::Added {
                    name: name.to_string(),
                });
                continue;
            };

            if old_content == content {
                result.unchanged += 1;
                continue;
            }

            let old_tokens = TokenSet::from_text(old_content);
            let new_tokens = TokenSet::from_text(content);
            let added_tokens = self.listed(new_tokens.difference(&old_tokens));
            let removed_tokens = self.listed(old_tokens.difference(&new_tokens));

            if added_tokens.is_empty() && removed_tokens.is_empty() {
                result.suppressed += 1;
                continue;
            }

            result.changes.push(ModuleChange::Changed {
                name: name.to_string(),
                added_tokens,
                removed_tokens,
            });
        }

        result
    }

    /// Calculate and render in one step.
    pub fn diff_text(&self, previous: &ScriptSet, current: &ScriptSet) -> String {
        self.calculate(previous, current).render(self.config.max_chars)
    }

    fn listed<'a>(&self, tokens: impl Iterator<Item = &'a str>) -> Vec<String> {
        tokens
            .filter(|token| token.chars().count() > self.config.min_token_length)
            .take(self.config.max_tokens_per_list)
            .map(str::to_string)
            .collect()
    }
}

/// Convenience function using default limits.
pub fn diff_scripts(previous: &ScriptSet, current: &ScriptSet) -> String {
    ScriptDiffer::default().diff_text(previous, current)
}
