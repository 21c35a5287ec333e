//! Skip-path matching.
//!
//! Patterns come in three shapes:
//! - exact: `/health` matches only `/health`
//! - prefix: `/public/*` matches `/public` and everything below it
//! - inline wildcard: `/api/*/status` or `/wild*card`, where each `*` is
//!   confined to a single `/`-delimited segment and the segment counts of
//!   path and pattern must agree

use crate::config;

/// Trailing marker that turns a pattern into a prefix pattern.
const PREFIX_MARKER: &str = "/*";

/// Check whether `path` is exempt from authentication under the
/// process-wide configuration.
pub fn is_skipped(path: &str) -> bool {
    config::current().is_path_skipped(path)
}

/// Check whether `path` matches any of `patterns`.
/// An empty pattern list never matches.
pub fn matches_any<S: AsRef<str>>(patterns: &[S], path: &str) -> bool {
    patterns
        .iter()
        .any(|pattern| match_pattern(path, pattern.as_ref()))
}

/// Match a request path against one skip-path pattern.
pub fn match_pattern(path: &str, pattern: &str) -> bool {
    if let Some(prefix) = pattern.strip_suffix(PREFIX_MARKER) {
        return path == prefix
            || path
                .strip_prefix(prefix)
                .is_some_and(|rest| rest.starts_with('/'));
    }

    if pattern.contains('*') {
        return match_wildcard(path, pattern);
    }

    path == pattern
}

/// Segment-wise wildcard match.
///
/// `candidate` and `pattern` are split on `/` and must have the same number
/// of segments. Literal segments compare for equality; segments containing
/// `*` are globbed without ever crossing a `/`.
pub fn match_wildcard(candidate: &str, pattern: &str) -> bool {
    let candidate_segments: Vec<&str> = candidate.split('/').collect();
    let pattern_segments: Vec<&str> = pattern.split('/').collect();

    if candidate_segments.len() != pattern_segments.len() {
        return false;
    }

    candidate_segments
        .iter()
        .zip(&pattern_segments)
        .all(|(segment, pattern)| {
            segment == pattern || (pattern.contains('*') && glob_segment(segment, pattern))
        })
}

/// Glob a single segment where `*` matches any run of bytes, including none.
fn glob_segment(segment: &str, pattern: &str) -> bool {
    let text = segment.as_bytes();
    let pat = pattern.as_bytes();

    let (mut t, mut p) = (0, 0);
    // Position of the last `*` seen in the pattern and the text index it
    // was tried against, for backtracking.
    let mut star: Option<(usize, usize)> = None;

    while t < text.len() {
        if p < pat.len() && pat[p] == b'*' {
            star = Some((p, t));
            p += 1;
        } else if p < pat.len() && pat[p] == text[t] {
            p += 1;
            t += 1;
        } else if let Some((star_p, star_t)) = star {
            p = star_p + 1;
            t = star_t + 1;
            star = Some((star_p, star_t + 1));
        } else {
            return false;
        }
    }

    pat[p..].iter().all(|&b| b == b'*')
}
