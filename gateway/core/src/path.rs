//! Segment-aware path prefix helpers.
//!
//! Prefixes are compared on `/` boundaries: `/api` matches `/api` and `/api/v1` but not
//! `/apiary`. Prefixes are normalized so that a trailing slash is insignificant and the root
//! prefix is the empty string.

/// Normalizes a declared prefix: ensures a leading `/` and strips trailing slashes. The root
/// prefix normalizes to `""`.
pub fn normalize_prefix(prefix: &str) -> String {
    let trimmed = prefix.trim().trim_end_matches('/');
    if trimmed.is_empty() {
        return String::new();
    }
    if trimmed.starts_with('/') {
        trimmed.to_string()
    } else {
        format!("/{trimmed}")
    }
}

/// Strips a normalized `prefix` from `path`, returning the remainder if the prefix matches on a
/// segment boundary. The remainder is either empty or begins with `/`.
pub fn strip_prefix<'p>(path: &'p str, prefix: &str) -> Option<&'p str> {
    let rest = path.strip_prefix(prefix)?;
    if rest.is_empty() || rest.starts_with('/') {
        Some(rest)
    } else {
        None
    }
}

/// Joins a normalized prefix with a remainder produced by [`strip_prefix`].
pub fn join(prefix: &str, rest: &str) -> String {
    let joined = format!("{prefix}{rest}");
    if joined.is_empty() {
        "/".to_string()
    } else {
        joined
    }
}

/// Compares two request paths, ignoring trailing slashes.
pub fn same_path(a: &str, b: &str) -> bool {
    normalize_prefix(a) == normalize_prefix(b)
}
