//! Observed site state for a single run.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::{AppError, Result};

/// Canonical module name to script content.
///
/// Ordered so diff output and digests are reproducible.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScriptSet(BTreeMap<String, String>);

impl ScriptSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a module; an existing entry with the same name is replaced.
    pub fn insert(&mut self, name: impl Into<String>, content: impl Into<String>) {
        self.0.insert(name.into(), content.into());
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.0.get(name).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// SHA-256 over every name/content pair, hex encoded.
    pub fn digest(&self) -> String {
        let mut hasher = Sha256::new();
        for (name, content) in &self.0 {
            hasher.update(name.as_bytes());
            hasher.update([0u8]);
            hasher.update(content.as_bytes());
            hasher.update([0u8]);
        }
        hex::encode(hasher.finalize())
    }

    /// Serialize to the single text blob stored under `LAST_JS_FILES`.
    pub fn to_blob(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_blob(blob: &str) -> Result<Self> {
        Ok(serde_json::from_str(blob)?)
    }
}

impl FromIterator<(String, String)> for ScriptSet {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Build id plus the scripts observed alongside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    build_id: String,
    pub scripts: ScriptSet,
}

impl Snapshot {
    /// Create a snapshot; an empty build id is rejected.
    pub fn new(build_id: impl Into<String>, scripts: ScriptSet) -> Result<Self> {
        let build_id = build_id.into();
        if build_id.trim().is_empty() {
            return Err(AppError::validation("snapshot requires a build id"));
        }
        Ok(Self { build_id, scripts })
    }

    pub fn build_id(&self) -> &str {
        &self.build_id
    }
}
