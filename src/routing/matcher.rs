//! Path matching for static tables.
//!
//! # Design Decisions
//! - Prefix matching is segment-aware: `/threads` matches `/threads/abc`
//!   but not `/threadsafe`
//! - Keyword matching is a plain substring test
//! - Path matching is case-sensitive
//! - No regex, tables stay `const`

/// A condition on an upstream path.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathMatch {
    /// Path equals the prefix or continues it with `/`.
    Prefix(&'static str),
    /// Path contains the keyword anywhere.
    Contains(&'static str),
}

impl PathMatch {
    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathMatch::Prefix(prefix) => {
                path.strip_prefix(prefix)
                    .map(|rest| rest.is_empty() || rest.starts_with('/') || rest.starts_with('?'))
                    .unwrap_or(false)
            }
            PathMatch::Contains(keyword) => path.contains(keyword),
        }
    }
}

/// Drop a leading `/v1` so tables can be written against bare resource paths.
pub fn strip_version(path: &str) -> &str {
    match path.strip_prefix("/v1") {
        Some(rest) if rest.is_empty() => "/",
        Some(rest) if rest.starts_with('/') => rest,
        _ => path,
    }
}

/// True when any segment is `.` or `..`, literally or percent-encoded, or
/// the path holds a backslash. URL parsers resolve all of these.
pub fn has_dot_segment(path: &str) -> bool {
    if path.contains('\\') {
        return true;
    }
    path.split('/').any(|segment| {
        let decoded = segment.to_ascii_lowercase().replace("%2e", ".");
        decoded == "." || decoded == ".."
    })
}
