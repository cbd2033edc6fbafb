//! Persistence of the last accepted snapshot.
//!
//! The watcher only needs two string keys:
//!
//! ```text
//! LAST_BUILD_ID   # raw build id token
//! LAST_JS_FILES   # JSON object: canonical module name -> script content
//! ```
//!
//! Backends implement [`KeyValueStore`]; [`StateStore`] layers the typed
//! reads and writes on top.

pub mod local;
pub mod memory;
#[cfg(feature = "s3")]
pub mod s3;

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{ScriptSet, Snapshot};

// Re-export for convenience
pub use local::LocalStore;
pub use memory::MemoryStore;

/// Key holding the last accepted build id.
pub const LAST_BUILD_ID: &str = "LAST_BUILD_ID";

/// Key holding the serialized scripts of the last accepted build.
pub const LAST_JS_FILES: &str = "LAST_JS_FILES";

/// Minimal string key-value backend.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Read a key; `None` if it was never written.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn put(&self, key: &str, value: &str) -> Result<()>;
}

/// Typed access to the persisted snapshot.
#[derive(Clone)]
pub struct StateStore {
    backend: Arc<dyn KeyValueStore>,
}

impl StateStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    /// Last accepted build id; empty values read as absent.
    pub async fn last_build_id(&self) -> Result<Option<String>> {
        Ok(self
            .backend
            .get(LAST_BUILD_ID)
            .await?
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty()))
    }

    /// Scripts of the last accepted build.
    ///
    /// A blob that no longer parses is logged and treated as empty, so the
    /// next change reports every module as added instead of failing forever.
    pub async fn last_scripts(&self) -> Result<Option<ScriptSet>> {
        let Some(blob) = self.backend.get(LAST_JS_FILES).await? else {
            return Ok(None);
        };
        match ScriptSet::from_blob(&blob) {
            Ok(scripts) => Ok(Some(scripts)),
            Err(e) => {
                log::warn!("Stored {} is unreadable, ignoring it: {}", LAST_JS_FILES, e);
                Ok(Some(ScriptSet::new()))
            }
        }
    }

    pub async fn put_last_build_id(&self, build_id: &str) -> Result<()> {
        self.backend.put(LAST_BUILD_ID, build_id).await
    }

    pub async fn put_last_scripts(&self, scripts: &ScriptSet) -> Result<()> {
        self.backend.put(LAST_JS_FILES, &scripts.to_blob()?).await
    }

    /// Persist both keys of a snapshot.
    ///
    /// Scripts go first and the build id last: if the second write fails the
    /// old build id stays in place and the next run diffs again.
    pub async fn save_snapshot(&self, snapshot: &Snapshot) -> Result<()> {
        self.put_last_scripts(&snapshot.scripts).await?;
        self.put_last_build_id(snapshot.build_id()).await?;
        log::info!(
            "Saved snapshot {} ({} modules, digest {})",
            snapshot.build_id(),
            snapshot.scripts.len(),
            &snapshot.scripts.digest()[..12]
        );
        Ok(())
    }
}
