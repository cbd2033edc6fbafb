// src/pipeline/normalize.rs

//! Canonical module names for hashed script paths.
//!
//! Bundlers append a content hash to every chunk (`main-3f9a...e1.js`), so the
//! same logical module gets a new path on every deployment. Stripping the hash
//! lets two builds be compared module by module.

use regex::Regex;

/// Minimum hex length treated as a content hash.
pub const MIN_HASH_LEN: usize = 16;

/// Map a script path to its canonical name.
///
/// A trailing `-<hex>.js` with at least [`MIN_HASH_LEN`] hex digits becomes
/// `.js`; any other path is returned unchanged. Two modules that differ only
/// by hash collapse to one name, and the caller keeps whichever came last.
pub fn canonical_name(path: &str) -> String {
    let Ok(pattern) = Regex::new(&format!(r"-[0-9a-fA-F]{{{MIN_HASH_LEN},}}\.js$")) else {
        return path.to_string();
    };
    pattern.replace(path, ".js").into_owned()
}
