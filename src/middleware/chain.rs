//! Chain execution.
//!
//! A [`Next`] is the rest of the chain: the selected interceptors, the index
//! of the one to run next, and the terminal step that runs once the list is
//! exhausted. `run` takes `self`, so each continuation can be used at most
//! once.

use std::sync::Arc;

use super::BoxedInterceptor;
use crate::handler::BoxFuture;

/// The step that runs after the last interceptor.
pub(crate) type Terminal<R> = Box<dyn FnOnce(R) -> BoxFuture + Send + 'static>;

/// The remainder of an interceptor chain.
pub struct Next<R> {
    chain: Arc<[BoxedInterceptor<R>]>,
    index: usize,
    terminal: Terminal<R>,
}

impl<R: Send + 'static> Next<R> {
    /// Passes `req` on: to the next interceptor if there is one, otherwise
    /// to the terminal step.
    pub fn run(self, req: R) -> BoxFuture {
        let Self { chain, index, terminal } = self;
        match chain.get(index).cloned() {
            Some(interceptor) => {
                let next = Self { chain, index: index + 1, terminal };
                interceptor.intercept(req, next)
            }
            None => terminal(req),
        }
    }
}

impl<R> std::fmt::Debug for Next<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Next")
            .field("index", &self.index)
            .field("len", &self.chain.len())
            .finish_non_exhaustive()
    }
}

/// Runs `chain` in order against `req`, then `terminal`, unless an
/// interceptor answers first.
pub fn execute<R, T>(chain: Vec<BoxedInterceptor<R>>, req: R, terminal: T) -> BoxFuture
where
    R: Send + 'static,
    T: FnOnce(R) -> BoxFuture + Send + 'static,
{
    Next { chain: chain.into(), index: 0, terminal: Box::new(terminal) }.run(req)
}
