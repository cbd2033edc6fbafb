//! Change-detection pipeline.
//!
//! - `extract`: build id and script references from page markup
//! - `normalize`: hash-free canonical module names
//! - `diff`: token-set diff between builds
//! - `run`: the `Watcher` orchestrating one detection run

pub mod diff;
pub mod extract;
pub mod normalize;
pub mod run;

pub use diff::{DiffResult, ModuleChange, ScriptDiffer, TokenSet, diff_scripts};
pub use extract::{ScriptPathExtractor, extract_build_id, extract_script_paths};
pub use normalize::{MIN_HASH_LEN, canonical_name};
pub use run::{RunOutcome, Watcher, log_outcome};
