//! Wildcard patterns that scope interceptors to groups of paths.
//!
//! This is deliberately *not* the route matcher. Routes capture parameters;
//! interceptor patterns only answer yes or no.
//!
//! | Pattern      | Matches                                   |
//! |--------------|-------------------------------------------|
//! | `/users`     | `/users` only (trailing slash ignored)    |
//! | `/users/*`   | `/users` and `/users/{one segment}`       |
//! | `/users/**`  | `/users` and anything below it            |
//!
//! Both sides are split on `/` with empty segments dropped, so leading and
//! trailing slashes never matter. Strip the query string before matching.

const ONE: &str = "*";
const ANY: &str = "**";

fn segments(s: &str) -> Vec<&str> {
    s.split('/').filter(|seg| !seg.is_empty()).collect()
}

/// Returns `true` if `path` falls under `pattern`.
///
/// Only the *trailing* segment of a pattern is treated as a wildcard; a `*`
/// anywhere else is compared literally.
pub fn matches(pattern: &str, path: &str) -> bool {
    let pattern = segments(pattern);
    let path = segments(path);

    match pattern.split_last() {
        Some((&ONE, prefix)) => {
            // `*` stands for zero or exactly one trailing segment.
            (prefix.len()..=pattern.len()).contains(&path.len())
                && prefix.iter().zip(&path).all(|(p, s)| p == s)
        }
        Some((&ANY, prefix)) => {
            path.len() >= prefix.len() && prefix.iter().zip(&path).all(|(p, s)| p == s)
        }
        _ => pattern == path,
    }
}

/// Returns the first pattern, in iteration order, that matches `path`.
///
/// There is no best-match heuristic: register specific patterns before
/// general ones, otherwise the general one shadows them.
pub fn first_matching<'a, I>(patterns: I, path: &str) -> Option<&'a str>
where
    I: IntoIterator<Item = &'a str>,
{
    patterns.into_iter().find(|pattern| matches(pattern, path))
}
