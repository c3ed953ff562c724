//! Glob patterns for bulk invalidation.
//!
//! Both backends accept the same dialect: `*` and `?` wildcards, everything
//! else literal. Character classes and backslash escapes are rejected, since
//! Redis `SCAN MATCH` would interpret them and the in-memory matcher would not.

use regex::Regex;

use qgate_core::ports::CacheError;

/// Characters with special meaning in a Redis `MATCH` pattern.
const GLOB_META: [char; 5] = ['*', '?', '[', ']', '\\'];

/// Reject patterns using glob syntax beyond `*` and `?`.
pub(crate) fn check_glob(pattern: &str) -> Result<(), CacheError> {
    match pattern.chars().find(|ch| matches!(ch, '[' | ']' | '\\')) {
        Some(ch) => Err(CacheError::Operation(format!(
            "unsupported character {ch:?} in pattern {pattern:?}"
        ))),
        None => Ok(()),
    }
}

/// Escape `literal` so Redis `MATCH` treats every character literally.
#[cfg_attr(not(feature = "redis"), allow(dead_code))]
pub(crate) fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for ch in literal.chars() {
        if GLOB_META.contains(&ch) {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Compile a glob (`*`, `?`) into an anchored regex.
pub(crate) fn glob_to_regex(pattern: &str) -> Result<Regex, CacheError> {
    check_glob(pattern)?;

    let mut source = String::with_capacity(pattern.len() + 8);
    source.push('^');
    for ch in pattern.chars() {
        match ch {
            '*' => source.push_str(".*"),
            '?' => source.push('.'),
            other => source.push_str(&regex::escape(other.encode_utf8(&mut [0; 4]))),
        }
    }
    source.push('$');

    Regex::new(&source)
        .map_err(|e| CacheError::Operation(format!("invalid pattern {pattern:?}: {e}")))
}
