// src/pipeline/extract.rs

//! Build id and script reference extraction from page markup.

use std::collections::HashSet;

use regex::Regex;

use crate::error::Result;

/// Return the first `"buildId":"<token>"` value in the markup.
///
/// A blank token counts as missing.
pub fn extract_build_id(markup: &str) -> Option<String> {
    Regex::new(r#""buildId":"([^"]+)""#)
        .ok()?
        .captures(markup)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|id| !id.is_empty())
}

/// Compiled matcher for `src="<prefix><name>.js"` references.
#[derive(Debug, Clone)]
pub struct ScriptPathExtractor {
    pattern: Regex,
}

impl ScriptPathExtractor {
    pub fn new(prefix: &str) -> Result<Self> {
        let pattern = Regex::new(&format!(r#"src="({}[^"]+?\.js)""#, regex::escape(prefix)))?;
        Ok(Self { pattern })
    }

    /// Script paths in order of first appearance.
    pub fn extract(&self, markup: &str) -> Vec<String> {
        let mut seen = HashSet::new();
        self.pattern
            .captures_iter(markup)
            .filter_map(|caps| caps.get(1))
            .map(|m| m.as_str().to_string())
            .filter(|path| seen.insert(path.clone()))
            .collect()
    }
}

/// Convenience wrapper for a one-off extraction.
pub fn extract_script_paths(markup: &str, prefix: &str) -> Result<Vec<String>> {
    Ok(ScriptPathExtractor::new(prefix)?.extract(markup))
}
