//! Pattern-keyed interceptor registry.

use std::fmt;

use super::BoxedInterceptor;
use crate::method::Method;
use crate::pattern;

/// The interceptors registered under one pattern.
pub struct InterceptorEntry<R> {
    pattern: String,
    interceptors: Vec<BoxedInterceptor<R>>,
    /// Empty means every method.
    methods: Vec<Method>,
}

impl<R> InterceptorEntry<R> {
    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }

    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    fn admits(&self, method: &str) -> bool {
        self.methods.is_empty() || self.methods.iter().any(|m| m.matches(method))
    }
}

/// Interceptors of one stage, keyed by wildcard pattern in registration order.
///
/// Entries never sit empty: one left without interceptors after a change is
/// removed on the spot.
pub struct InterceptorRegistry<R> {
    entries: Vec<InterceptorEntry<R>>,
}

impl<R> InterceptorRegistry<R> {
    pub fn new() -> Self {
        Self { entries: Vec::new() }
    }

    /// Appends `interceptors` to the entry of every pattern in `patterns`,
    /// creating entries as needed. `methods`, when given, replaces the
    /// method filter of those entries.
    pub fn append<P: AsRef<str>>(
        &mut self,
        patterns: &[P],
        methods: Option<&[Method]>,
        interceptors: &[BoxedInterceptor<R>],
    ) {
        for pattern in patterns {
            let pattern = pattern.as_ref();
            let idx = match self.entries.iter().position(|e| e.pattern == pattern) {
                Some(idx) => idx,
                None => {
                    self.entries.push(InterceptorEntry {
                        pattern: pattern.to_owned(),
                        interceptors: Vec::new(),
                        methods: Vec::new(),
                    });
                    self.entries.len() - 1
                }
            };

            let entry = &mut self.entries[idx];
            entry.interceptors.extend(interceptors.iter().cloned());
            if let Some(methods) = methods {
                entry.methods = methods.to_vec();
            }
        }
        self.prune();
    }

    fn prune(&mut self) {
        self.entries.retain(|e| !e.interceptors.is_empty());
    }

    /// The interceptors to run for a request, in order.
    ///
    /// Only the first pattern matching `path` is considered. If its method
    /// filter rejects `method` the result is empty; a later, more general
    /// pattern does not get a turn.
    pub fn select_for(&self, path: &str, method: &str) -> Vec<BoxedInterceptor<R>> {
        let Some(found) = pattern::first_matching(self.patterns(), path) else {
            return Vec::new();
        };
        self.entries
            .iter()
            .find(|e| e.pattern == found)
            .filter(|e| e.admits(method))
            .map(|e| e.interceptors.clone())
            .unwrap_or_default()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.pattern.as_str())
    }

    pub fn entries(&self) -> &[InterceptorEntry<R>] {
        &self.entries
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<R> Default for InterceptorRegistry<R> {
    fn default() -> Self {
        Self::new()
    }
}

impl<R> fmt::Debug for InterceptorRegistry<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.entries.iter().map(|e| (&e.pattern, (e.interceptors.len(), &e.methods))))
            .finish()
    }
}
