//! Interceptors: middleware scoped by path pattern.
//!
//! Two stages run for every request, each with its own registry:
//!
//! | Stage        | Sees                          | Runs                            |
//! |--------------|-------------------------------|---------------------------------|
//! | network      | [`RawRequest`](crate::RawRequest) | before routing and body parsing |
//! | application  | [`Request`](crate::Request)   | after both, right before the handler |
//!
//! An interceptor receives the request and a [`Next`]. Calling
//! `next.run(req).await` hands the request to the following interceptor (or,
//! at the end of the chain, to the next stage) and yields its response.
//! Returning a response *without* calling `next` answers the request right
//! there: nothing after it runs.
//!
//! ```rust
//! use primo::middleware::Next;
//! use primo::{Request, Response};
//! use http::StatusCode;
//!
//! async fn require_token(req: Request, next: Next<Request>) -> Response {
//!     if req.header("authorization").is_none() {
//!         return Response::status(StatusCode::UNAUTHORIZED);
//!     }
//!     next.run(req).await
//! }
//! ```
//!
//! Which interceptors run is decided by the *first* registered pattern that
//! matches the path (see [`crate::pattern`]), so register specific patterns
//! before general ones.

mod chain;
mod registry;

pub use chain::{Next, execute};
pub use registry::{InterceptorEntry, InterceptorRegistry};

use std::future::Future;
use std::sync::Arc;

use crate::handler::BoxFuture;
use crate::response::IntoResponse;

/// A unit of middleware for requests of type `R`.
///
/// Implemented for every `Fn(R, Next<R>) -> impl Future<Output = impl IntoResponse>`.
pub trait Interceptor<R>: Send + Sync + 'static {
    fn intercept(&self, req: R, next: Next<R>) -> BoxFuture;
}

/// A shared, type-erased interceptor.
pub type BoxedInterceptor<R> = Arc<dyn Interceptor<R>>;

impl<R, F, Fut, Out> Interceptor<R> for F
where
    R: Send + 'static,
    F: Fn(R, Next<R>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Out> + Send + 'static,
    Out: IntoResponse + Send + 'static,
{
    fn intercept(&self, req: R, next: Next<R>) -> BoxFuture {
        let fut = self(req, next);
        Box::pin(async move { fut.await.into_response() })
    }
}

/// Erases an interceptor so differently-typed ones can share a list.
pub fn boxed<R, I: Interceptor<R>>(interceptor: I) -> BoxedInterceptor<R> {
    Arc::new(interceptor)
}
