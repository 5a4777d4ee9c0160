//! Route handlers.
//!
//! A handler is the last step of the pipeline: it receives the routed,
//! decoded [`Request`] once every application interceptor has let it
//! through. Any `async fn(Request) -> impl IntoResponse` qualifies.
//!
//! Routes of different handler types live in the same table, so each one
//! is stored as a [`BoxedHandler`]. Interceptors use the same scheme, see
//! [`crate::middleware`].

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A heap-allocated, type-erased future that resolves to a [`Response`].
pub type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

/// Something that can answer a routed request.
pub trait Handler: Send + Sync + 'static {
    fn call(&self, req: Request) -> BoxFuture;
}

/// A shared, type-erased handler as stored on a route.
pub type BoxedHandler = Arc<dyn Handler>;

impl<F, Fut, Out> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Out> + Send + 'static,
    Out: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = self(req);
        Box::pin(async move { fut.await.into_response() })
    }
}
