//! The application: routes plus the two interceptor stages.
//!
//! Build it once at startup, then hand it to [`Server::serve`](crate::Server::serve).
//! Every builder method takes and returns `self`, so registrations chain:
//!
//! ```rust,no_run
//! use primo::middleware::Next;
//! use primo::{Method, Request, Response, Router, UploadOptions};
//!
//! async fn get_user(req: Request) -> Response {
//!     Response::text(req.param("id").unwrap_or_default().to_owned())
//! }
//! async fn upload(_req: Request) -> Response { Response::text("stored") }
//! async fn audit(req: Request, next: Next<Request>) -> Response { next.run(req).await }
//!
//! let app = Router::new()
//!     .get("/users/:id", get_user)
//!     .post_with("/upload", UploadOptions::new().filename(|f, _| format!("file_{f}")), upload)
//!     .paths(["/upload"]).methods([Method::Post]).add_interceptor(audit);
//! ```

use std::sync::Arc;

use bytes::Bytes;
use http_body_util::BodyExt;

use crate::dispatch;
use crate::error::{BoxError, Error};
use crate::handler::Handler;
use crate::method::Method;
use crate::middleware::{BoxedInterceptor, Interceptor, InterceptorRegistry, boxed};
use crate::request::{RawRequest, Request};
use crate::response::Response;
use crate::routes::RouteTable;
use crate::upload::UploadOptions;

/// The application router.
#[derive(Default)]
pub struct Router {
    pub(crate) routes: RouteTable,
    pub(crate) network: InterceptorRegistry<RawRequest>,
    pub(crate) app: InterceptorRegistry<Request>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a handler for a method + path pair.
    ///
    /// Path parameters use `:name` syntax; `req.param("name")` retrieves them.
    ///
    /// # Panics
    ///
    /// Panics if the path conflicts with an existing route or the method is
    /// already registered for it. Use [`Router::try_on`] to handle that instead.
    pub fn on(self, method: Method, path: &str, handler: impl Handler) -> Self {
        self.add(method, path, None, handler)
    }

    /// Like [`Router::on`], with upload rules for multipart bodies.
    pub fn on_with(
        self,
        method: Method,
        path: &str,
        options: UploadOptions,
        handler: impl Handler,
    ) -> Self {
        self.add(method, path, Some(options), handler)
    }

    /// Fallible registration.
    pub fn try_on(
        mut self,
        method: Method,
        path: &str,
        options: Option<UploadOptions>,
        handler: impl Handler,
    ) -> Result<Self, Error> {
        self.routes.register(method, path, options, handler)?;
        Ok(self)
    }

    fn add(
        self,
        method: Method,
        path: &str,
        options: Option<UploadOptions>,
        handler: impl Handler,
    ) -> Self {
        self.try_on(method, path, options, handler)
            .unwrap_or_else(|e| panic!("{e}"))
    }

    pub fn get(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Get, path, handler)
    }

    pub fn post(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Post, path, handler)
    }

    pub fn post_with(self, path: &str, options: UploadOptions, handler: impl Handler) -> Self {
        self.on_with(Method::Post, path, options, handler)
    }

    pub fn put(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Put, path, handler)
    }

    pub fn put_with(self, path: &str, options: UploadOptions, handler: impl Handler) -> Self {
        self.on_with(Method::Put, path, options, handler)
    }

    pub fn patch(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Patch, path, handler)
    }

    pub fn patch_with(self, path: &str, options: UploadOptions, handler: impl Handler) -> Self {
        self.on_with(Method::Patch, path, options, handler)
    }

    pub fn delete(self, path: &str, handler: impl Handler) -> Self {
        self.on(Method::Delete, path, handler)
    }

    /// Starts scoping interceptors to one or more wildcard patterns.
    ///
    /// Only the first registered pattern matching a path runs, so go from
    /// specific to general:
    ///
    /// ```rust
    /// # use primo::middleware::Next;
    /// # use primo::{Request, Response, Router};
    /// # async fn users(req: Request, next: Next<Request>) -> Response { next.run(req).await }
    /// # async fn everything(req: Request, next: Next<Request>) -> Response { next.run(req).await }
    /// Router::new()
    ///     .paths(["/users/**"]).add_interceptor(users)
    ///     .paths(["/**"]).add_interceptor(everything);
    /// ```
    pub fn paths<I, S>(self, patterns: I) -> Scope
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Scope {
            router: self,
            patterns: patterns.into_iter().map(Into::into).collect(),
            methods: None,
        }
    }

    pub fn routes(&self) -> &RouteTable {
        &self.routes
    }

    pub fn network_interceptors(&self) -> &InterceptorRegistry<RawRequest> {
        &self.network
    }

    pub fn interceptors(&self) -> &InterceptorRegistry<Request> {
        &self.app
    }

    /// Runs one request through both interceptor stages and the router.
    ///
    /// This is what the server calls per request; it is public so the whole
    /// pipeline can be driven without a socket.
    pub async fn handle<B>(self: Arc<Self>, req: http::Request<B>) -> Response
    where
        B: hyper::body::Body<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let raw = req.map(|body| body.map_err(Into::into).boxed_unsync());
        dispatch::dispatch(self, raw).await
    }
}

/// Interceptor configuration for a set of patterns.
///
/// Obtained from [`Router::paths`]; the `add_*` methods hand the router back.
#[must_use = "interceptors are only registered by an add_* call"]
pub struct Scope {
    router: Router,
    patterns: Vec<String>,
    methods: Option<Vec<Method>>,
}

impl Scope {
    /// Restricts the interceptors of these patterns to the given methods.
    pub fn methods(mut self, methods: impl IntoIterator<Item = Method>) -> Self {
        self.methods = Some(methods.into_iter().collect());
        self
    }

    pub fn add_interceptor(self, interceptor: impl Interceptor<Request>) -> Router {
        self.add_interceptors([boxed(interceptor)])
    }

    pub fn add_interceptors(
        mut self,
        interceptors: impl IntoIterator<Item = BoxedInterceptor<Request>>,
    ) -> Router {
        let interceptors: Vec<_> = interceptors.into_iter().collect();
        self.router
            .app
            .append(self.patterns.as_slice(), self.methods.as_deref(), &interceptors);
        self.router
    }

    pub fn add_network_interceptor(self, interceptor: impl Interceptor<RawRequest>) -> Router {
        self.add_network_interceptors([boxed(interceptor)])
    }

    pub fn add_network_interceptors(
        mut self,
        interceptors: impl IntoIterator<Item = BoxedInterceptor<RawRequest>>,
    ) -> Router {
        let interceptors: Vec<_> = interceptors.into_iter().collect();
        self.router
            .network
            .append(self.patterns.as_slice(), self.methods.as_deref(), &interceptors);
        self.router
    }
}
